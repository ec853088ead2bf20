//! Application management REST client and payload models.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use idkit_telemetry::{log_resource_created, log_resource_deleted};

use crate::claims::API_SERVER_BASE_PATH;
use crate::credentials::TenantCredentials;
use crate::error::ClientError;
use crate::http::{expect_status, expect_success, tenant_base_path, to_json_string, RestClient};

const APPLICATIONS_ENDPOINT: &str = "/applications";
const OIDC_INBOUND_ENDPOINT: &str = "/inbound-protocols/oidc";

/// Application creation payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationModel {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound_protocol_configuration: Option<InboundProtocols>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_configuration: Option<ClaimConfiguration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundProtocols {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc: Option<OpenIdConnectConfiguration>,
}

/// OIDC inbound settings; the server fills in the client id and secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenIdConnectConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default, rename = "callbackURLs")]
    pub callback_urls: Vec<String>,
}

/// Claim dialect used by an application's claim configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClaimDialect {
    #[default]
    Local,
    Custom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimConfiguration {
    pub dialect: ClaimDialect,
    #[serde(default)]
    pub claim_mappings: Vec<ClaimMapping>,
    #[serde(default)]
    pub requested_claims: Vec<RequestedClaim>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRef {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimMapping {
    pub application_claim: String,
    pub local_claim: ClaimRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedClaim {
    pub claim: ClaimRef,
}

impl ClaimConfiguration {
    /// Custom dialect where every claim maps to itself and is requested.
    pub fn custom_identity(claim_uris: &[String]) -> Self {
        let mut config = Self {
            dialect: ClaimDialect::Custom,
            ..Self::default()
        };
        for uri in claim_uris {
            config.claim_mappings.push(ClaimMapping {
                application_claim: uri.clone(),
                local_claim: ClaimRef { uri: uri.clone() },
            });
            config.requested_claims.push(RequestedClaim {
                claim: ClaimRef { uri: uri.clone() },
            });
        }
        config
    }
}

/// Client for `/applications`.
#[derive(Clone)]
pub struct ApplicationManagementClient {
    rest: RestClient,
}

impl ApplicationManagementClient {
    pub fn new(client: Client, backend_url: &str, credentials: TenantCredentials) -> Self {
        let base = tenant_base_path(backend_url, credentials.domain(), API_SERVER_BASE_PATH);
        Self {
            rest: RestClient::new(client, base, credentials),
        }
    }

    /// Register an application; returns its id from the `Location` header.
    pub async fn add_application(&self, model: &ApplicationModel) -> Result<String, ClientError> {
        let response = self
            .rest
            .post(APPLICATIONS_ENDPOINT, to_json_string(model)?, &[])
            .await?;
        let response = expect_success(response, "application creation")?;
        let app_id = response.created_id(&format!("POST {}", APPLICATIONS_ENDPOINT))?;

        log_resource_created!(kind = "application", name = %model.name, app_id = %app_id);
        Ok(app_id)
    }

    /// OIDC inbound configuration of an application, including its
    /// server-assigned client id and secret.
    pub async fn get_oidc_inbound_config(
        &self,
        app_id: &str,
    ) -> Result<OpenIdConnectConfiguration, ClientError> {
        let path = format!("{}/{}{}", APPLICATIONS_ENDPOINT, app_id, OIDC_INBOUND_ENDPOINT);
        let response = self.rest.get(&path, &[]).await?;
        expect_success(response, "OIDC inbound configuration lookup")?.json()
    }

    /// Delete an application; the server must answer 204.
    pub async fn delete_application(&self, app_id: &str) -> Result<(), ClientError> {
        let path = format!("{}/{}", APPLICATIONS_ENDPOINT, app_id);
        let response = self.rest.delete(&path, &[]).await?;
        expect_status(response, 204, "application deletion")?;

        log_resource_deleted!(kind = "application", app_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_identity_claim_configuration() {
        let claims = vec![
            "http://wso2.org/claims/username".to_string(),
            "http://wso2.org/claims/emailaddress".to_string(),
        ];
        let config = ClaimConfiguration::custom_identity(&claims);
        let json = serde_json::to_value(&config).expect("serialize");

        assert_eq!(json["dialect"], "CUSTOM");
        assert_eq!(json["claimMappings"].as_array().map(Vec::len), Some(2));
        assert_eq!(
            json["claimMappings"][0],
            serde_json::json!({
                "applicationClaim": "http://wso2.org/claims/username",
                "localClaim": {"uri": "http://wso2.org/claims/username"}
            })
        );
        assert_eq!(
            json["requestedClaims"][1]["claim"]["uri"],
            "http://wso2.org/claims/emailaddress"
        );
    }

    #[test]
    fn test_application_model_serialization() {
        let model = ApplicationModel {
            name: "app1".into(),
            inbound_protocol_configuration: Some(InboundProtocols {
                oidc: Some(OpenIdConnectConfiguration {
                    grant_types: vec!["authorization_code".into()],
                    callback_urls: vec!["http://localhost:8490/app1/oauth2client".into()],
                    ..Default::default()
                }),
            }),
            claim_configuration: None,
        };
        let json = serde_json::to_value(&model).expect("serialize");

        let oidc = &json["inboundProtocolConfiguration"]["oidc"];
        assert_eq!(oidc["grantTypes"][0], "authorization_code");
        assert_eq!(
            oidc["callbackURLs"][0],
            "http://localhost:8490/app1/oauth2client"
        );
        // Unassigned credentials are not sent
        assert!(oidc.get("clientId").is_none());
        assert!(json.get("claimConfiguration").is_none());
    }

    #[test]
    fn test_oidc_config_deserialization() {
        let config: OpenIdConnectConfiguration = serde_json::from_str(
            r#"{
                "clientId": "cid",
                "clientSecret": "csecret",
                "grantTypes": ["implicit"],
                "callbackURLs": ["http://cb"],
                "publicClient": false
            }"#,
        )
        .expect("deserialize");

        assert_eq!(config.client_id.as_deref(), Some("cid"));
        assert_eq!(config.client_secret.as_deref(), Some("csecret"));
        assert_eq!(config.grant_types, vec!["implicit"]);
    }
}
