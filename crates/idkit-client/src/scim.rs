//! SCIM2 REST client for users and roles.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use idkit_telemetry::{log_resource_created, log_resource_deleted, log_role_updated};

use crate::credentials::TenantCredentials;
use crate::error::ClientError;
use crate::http::{expect_status, expect_success, tenant_base_path, to_json_string, RestClient};

/// Root of the SCIM2 API.
pub const SCIM2_BASE_PATH: &str = "/scim2";

const USERS_ENDPOINT: &str = "/Users";
const ROLES_ENDPOINT: &str = "/v2/Roles";

pub const SCIM_USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const SCIM_PATCH_OP_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// SCIM2 user payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserObject {
    pub schemas: Vec<String>,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Name>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<Email>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    pub given_name: String,
    pub family_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub value: String,
    #[serde(default)]
    pub primary: bool,
}

impl UserObject {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            schemas: vec![SCIM_USER_SCHEMA.to_string()],
            user_name: user_name.into(),
            password: None,
            name: None,
            emails: Vec::new(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_name(mut self, given: impl Into<String>, family: impl Into<String>) -> Self {
        self.name = Some(Name {
            given_name: given.into(),
            family_name: family.into(),
        });
        self
    }

    pub fn with_primary_email(mut self, email: impl Into<String>) -> Self {
        self.emails.push(Email {
            value: email.into(),
            primary: true,
        });
        self
    }
}

/// SCIM PatchOp request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOperationRequest {
    pub schemas: Vec<String>,
    #[serde(rename = "Operations")]
    pub operations: Vec<PatchOperation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    pub value: Vec<ListObject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListObject {
    pub value: String,
}

impl PatchOperationRequest {
    /// Patch adding the given users to a role.
    pub fn add_users(user_ids: &[&str]) -> Self {
        Self {
            schemas: vec![SCIM_PATCH_OP_SCHEMA.to_string()],
            operations: vec![PatchOperation {
                op: PatchOp::Add,
                path: "users".to_string(),
                value: user_ids
                    .iter()
                    .map(|id| ListObject {
                        value: (*id).to_string(),
                    })
                    .collect(),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(rename = "Resources", default)]
    resources: Vec<CreatedResource>,
}

/// Client for the tenant's SCIM2 endpoints.
#[derive(Clone)]
pub struct Scim2Client {
    rest: RestClient,
}

impl Scim2Client {
    pub fn new(client: Client, backend_url: &str, credentials: TenantCredentials) -> Self {
        let base = tenant_base_path(backend_url, credentials.domain(), SCIM2_BASE_PATH);
        Self {
            rest: RestClient::new(client, base, credentials),
        }
    }

    /// Create a user; returns the id from the response body.
    pub async fn create_user(&self, user: &UserObject) -> Result<String, ClientError> {
        let response = self
            .rest
            .post(USERS_ENDPOINT, to_json_string(user)?, &[])
            .await?;
        let created: CreatedResource = expect_success(response, "user creation")?.json()?;
        let user_id = created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::MissingResponseField {
                field: "id",
                context: format!("POST {}", USERS_ENDPOINT),
            })?;

        log_resource_created!(kind = "user", user_name = %user.user_name, user_id = %user_id);
        Ok(user_id)
    }

    /// Delete a user; the server must answer 204.
    pub async fn delete_user(&self, user_id: &str) -> Result<(), ClientError> {
        let response = self
            .rest
            .delete(&format!("{}/{}", USERS_ENDPOINT, user_id), &[])
            .await?;
        expect_status(response, 204, "user deletion")?;

        log_resource_deleted!(kind = "user", user_id);
        Ok(())
    }

    /// Id of the role with the given display name.
    pub async fn get_role_id_by_name(&self, role_name: &str) -> Result<String, ClientError> {
        let filter = format!("displayName eq {}", role_name);
        let url = reqwest::Url::parse_with_params(
            &self.rest.url(ROLES_ENDPOINT),
            &[("filter", filter.as_str())],
        )
        .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let query = url.query().map(|q| format!("?{}", q)).unwrap_or_default();

        let response = self
            .rest
            .get(&format!("{}{}", ROLES_ENDPOINT, query), &[])
            .await?;
        let list: ListResponse = expect_success(response, "role lookup")?.json()?;

        list.resources
            .into_iter()
            .find_map(|r| r.id)
            .ok_or_else(|| ClientError::MissingResponseField {
                field: "Resources[0].id",
                context: format!("GET {} ({})", ROLES_ENDPOINT, filter),
            })
    }

    /// Apply a PatchOp to a role.
    pub async fn update_user_role(
        &self,
        patch: &PatchOperationRequest,
        role_id: &str,
    ) -> Result<(), ClientError> {
        let response = self
            .rest
            .patch(
                &format!("{}/{}", ROLES_ENDPOINT, role_id),
                to_json_string(patch)?,
                &[],
            )
            .await?;
        expect_success(response, "role update")?;
        log_role_updated!(
            role_id,
            operations = patch.operations.len(),
            "role membership updated"
        );
        Ok(())
    }
}
