//! Claim management REST client: external claim mappings under a claim dialect.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use idkit_telemetry::{log_resource_created, log_resource_deleted};

use crate::config::TestkitConfig;
use crate::credentials::TenantCredentials;
use crate::error::ClientError;
use crate::http::{
    build_http_client, expect_status, expect_success, tenant_base_path, to_json_string,
    RestClient,
};

/// Root of the server management API.
pub const API_SERVER_BASE_PATH: &str = "/api/server/v1";

const CLAIM_DIALECTS_ENDPOINT: &str = "/claim-dialects";

pub const CLAIMS_ENDPOINT: &str = "/claims";

/// Dialect id of the server's local claim dialect.
pub const LOCAL_DIALECT_ID: &str = "local";

/// Request body for creating an external claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalClaimReq {
    /// Application-facing claim URI.
    #[serde(rename = "claimURI")]
    pub claim_uri: String,
    /// Local claim the external claim maps to.
    #[serde(rename = "mappedLocalClaimURI")]
    pub mapped_local_claim_uri: String,
}

impl ExternalClaimReq {
    pub fn new(claim_uri: impl Into<String>, mapped_local_claim_uri: impl Into<String>) -> Self {
        Self {
            claim_uri: claim_uri.into(),
            mapped_local_claim_uri: mapped_local_claim_uri.into(),
        }
    }
}

/// Dialect id for a dialect URI, as the server encodes it in paths
/// (unpadded base64url).
pub fn dialect_id(dialect_uri: &str) -> String {
    URL_SAFE_NO_PAD.encode(dialect_uri)
}

/// Client for `/claim-dialects/{dialectId}/claims`.
#[derive(Clone)]
pub struct ClaimManagementClient {
    rest: RestClient,
}

impl ClaimManagementClient {
    /// Create a client for the tenant's server API.
    pub fn new(client: Client, backend_url: &str, credentials: TenantCredentials) -> Self {
        let base = tenant_base_path(backend_url, credentials.domain(), API_SERVER_BASE_PATH);
        Self {
            rest: RestClient::new(client, base, credentials),
        }
    }

    /// Create a client from a test kit configuration.
    pub fn from_config(config: &TestkitConfig) -> Result<Self, ClientError> {
        let client = build_http_client(&config.server, reqwest::redirect::Policy::none(), None)?;
        Ok(Self::new(
            client,
            &config.server.backend_url,
            config.credentials(),
        ))
    }

    /// Full URL of the server API root this client talks to.
    pub fn base_path(&self) -> &str {
        self.rest.base_path()
    }

    fn claims_path(dialect_id: &str) -> String {
        format!("{}/{}{}", CLAIM_DIALECTS_ENDPOINT, dialect_id, CLAIMS_ENDPOINT)
    }

    fn claim_path(dialect_id: &str, claim_id: &str) -> String {
        format!("{}/{}", Self::claims_path(dialect_id), claim_id)
    }

    /// Add an external claim; returns the new claim id taken from the
    /// `Location` header.
    pub async fn add_external_claim(
        &self,
        dialect_id: &str,
        request: &ExternalClaimReq,
    ) -> Result<String, ClientError> {
        let path = Self::claims_path(dialect_id);
        let response = self.rest.post(&path, to_json_string(request)?, &[]).await?;
        let response = expect_success(response, "external claim creation")?;
        let claim_id = response.created_id(&format!("POST {}", path))?;

        log_resource_created!(
            kind = "external_claim",
            dialect_id,
            claim_id = %claim_id,
            claim_uri = %request.claim_uri
        );
        Ok(claim_id)
    }

    /// Fetch an external claim as raw JSON.
    pub async fn get_external_claim(
        &self,
        dialect_id: &str,
        claim_id: &str,
    ) -> Result<serde_json::Value, ClientError> {
        let response = self
            .rest
            .get(&Self::claim_path(dialect_id, claim_id), &[])
            .await?;
        expect_success(response, "external claim lookup")?.json()
    }

    /// Delete an external claim; the server must answer 204.
    pub async fn delete_external_claim(
        &self,
        dialect_id: &str,
        claim_id: &str,
    ) -> Result<(), ClientError> {
        let response = self
            .rest
            .delete(&Self::claim_path(dialect_id, claim_id), &[])
            .await?;
        expect_status(response, 204, "external claim deletion")?;

        log_resource_deleted!(kind = "external_claim", dialect_id, claim_id);
        Ok(())
    }
}
