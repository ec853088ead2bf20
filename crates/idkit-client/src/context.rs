//! Test context: provisions applications and users for an OIDC test and
//! hands out authorization flows.

use reqwest::redirect::Policy;

use crate::applications::{
    ApplicationManagementClient, ApplicationModel, ClaimConfiguration, InboundProtocols,
    OpenIdConnectConfiguration,
};
use crate::claims::ClaimManagementClient;
use crate::config::TestkitConfig;
use crate::error::ClientError;
use crate::http::build_http_client;
use crate::oidc::{AuthorizationFlow, FlowEndpoints};
use crate::scim::{PatchOperationRequest, Scim2Client, UserObject};

/// Role every provisioned user is added to.
pub const DEFAULT_ROLE: &str = "everyone";

/// Grant types enabled on applications created by [`OidcTestContext`].
pub const OIDC_GRANT_TYPES: &[&str] = &[
    "authorization_code",
    "implicit",
    "password",
    "client_credentials",
    "refresh_token",
    "urn:ietf:params:oauth:grant-type:saml2-bearer",
    "iwa:ntlm",
];

/// An OIDC application the test wants registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcApplication {
    /// Application name on the server.
    pub name: String,
    /// Context path of the playground deployment, e.g. `/playground2`.
    pub context: String,
    /// Redirect URI registered for the application.
    pub callback_url: String,
    /// Claims the application requires from the user.
    pub required_claims: Vec<String>,
}

impl OidcApplication {
    pub fn new(
        name: impl Into<String>,
        context: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            context: context.into(),
            callback_url: callback_url.into(),
            required_claims: Vec::new(),
        }
    }

    /// Add a required claim URI.
    pub fn with_required_claim(mut self, claim_uri: impl Into<String>) -> Self {
        self.required_claims.push(claim_uri.into());
        self
    }

    /// Creation payload for this application.
    pub fn to_model(&self) -> ApplicationModel {
        let claim_configuration = if self.required_claims.is_empty() {
            None
        } else {
            Some(ClaimConfiguration::custom_identity(&self.required_claims))
        };

        ApplicationModel {
            name: self.name.clone(),
            inbound_protocol_configuration: Some(InboundProtocols {
                oidc: Some(OpenIdConnectConfiguration {
                    client_id: None,
                    client_secret: None,
                    grant_types: OIDC_GRANT_TYPES.iter().map(|g| g.to_string()).collect(),
                    callback_urls: vec![self.callback_url.clone()],
                }),
            }),
            claim_configuration,
        }
    }
}

/// An application the server has accepted, with its assigned identifiers.
///
/// Only obtainable from [`OidcTestContext::create_application`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredApplication {
    application: OidcApplication,
    application_id: String,
    client_id: String,
    client_secret: String,
}

impl RegisteredApplication {
    pub(crate) fn new(
        application: OidcApplication,
        application_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            application,
            application_id: application_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn application(&self) -> &OidcApplication {
        &self.application
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

/// A user created through SCIM2 and added to [`DEFAULT_ROLE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedUser {
    pub user_id: String,
    pub role_id: String,
    pub user_name: String,
}

/// Provisioning clients plus the flow settings for one test.
#[derive(Clone)]
pub struct OidcTestContext {
    config: TestkitConfig,
    applications: ApplicationManagementClient,
    claims: ClaimManagementClient,
    scim: Scim2Client,
}

impl OidcTestContext {
    /// Build the REST clients for a validated configuration.
    pub fn new(config: TestkitConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let http = build_http_client(&config.server, Policy::none(), None)?;
        let backend = config.server.backend_url.as_str();
        let applications =
            ApplicationManagementClient::new(http.clone(), backend, config.credentials());
        let claims = ClaimManagementClient::new(http.clone(), backend, config.credentials());
        let scim = Scim2Client::new(http, backend, config.credentials());

        Ok(Self {
            config,
            applications,
            claims,
            scim,
        })
    }

    pub fn config(&self) -> &TestkitConfig {
        &self.config
    }

    pub fn claims(&self) -> &ClaimManagementClient {
        &self.claims
    }

    pub fn applications(&self) -> &ApplicationManagementClient {
        &self.applications
    }

    pub fn scim(&self) -> &Scim2Client {
        &self.scim
    }

    /// Register an application and read back its client credentials.
    pub async fn create_application(
        &self,
        application: OidcApplication,
    ) -> Result<RegisteredApplication, ClientError> {
        let app_id = self
            .applications
            .add_application(&application.to_model())
            .await?;
        let oidc = self.applications.get_oidc_inbound_config(&app_id).await?;

        let context = format!("inbound OIDC configuration of {}", app_id);
        let client_id = oidc
            .client_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ClientError::MissingResponseField {
                field: "clientId",
                context: context.clone(),
            })?;
        let client_secret = oidc
            .client_secret
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ClientError::MissingResponseField {
                field: "clientSecret",
                context,
            })?;

        Ok(RegisteredApplication::new(
            application,
            app_id,
            client_id,
            client_secret,
        ))
    }

    /// Delete a registered application. Consumes it: its identifiers are
    /// invalid afterwards.
    pub async fn delete_application(&self, app: RegisteredApplication) -> Result<(), ClientError> {
        self.applications
            .delete_application(app.application_id())
            .await
    }

    /// Create a user and add it to [`DEFAULT_ROLE`].
    ///
    /// When the role assignment fails the user is deleted again and the
    /// assignment error is returned.
    pub async fn create_user(&self, user: &UserObject) -> Result<ProvisionedUser, ClientError> {
        let user_id = self.scim.create_user(user).await?;
        match self.assign_default_role(&user_id).await {
            Ok(role_id) => Ok(ProvisionedUser {
                user_id,
                role_id,
                user_name: user.user_name.clone(),
            }),
            Err(err) => {
                if let Err(cleanup) = self.scim.delete_user(&user_id).await {
                    tracing::warn!(
                        user_id = %user_id,
                        error = %cleanup,
                        "user left on the server after failed role assignment"
                    );
                }
                Err(err)
            }
        }
    }

    async fn assign_default_role(&self, user_id: &str) -> Result<String, ClientError> {
        let role_id = self.scim.get_role_id_by_name(DEFAULT_ROLE).await?;
        self.scim
            .update_user_role(&PatchOperationRequest::add_users(&[user_id]), &role_id)
            .await?;
        Ok(role_id)
    }

    /// Delete a provisioned user.
    pub async fn delete_user(&self, user: ProvisionedUser) -> Result<(), ClientError> {
        self.scim.delete_user(&user.user_id).await
    }

    /// Start a new authorization flow with its own cookie jar.
    pub fn authorization_flow(&self) -> Result<AuthorizationFlow, ClientError> {
        AuthorizationFlow::new(&self.config.server, FlowEndpoints::from_config(&self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const APPS_PATH: &str = "/t/carbon.super/api/server/v1/applications";

    fn app1() -> OidcApplication {
        OidcApplication::new("app1", "/app1", "http://localhost:8490/app1/oauth2client")
            .with_required_claim("http://wso2.org/claims/username")
    }

    async fn context(server: &MockServer) -> OidcTestContext {
        OidcTestContext::new(TestkitConfig::new().with_backend_url(server.uri())).expect("context")
    }

    #[test]
    fn test_application_model() {
        let model = app1().to_model();
        let oidc = model
            .inbound_protocol_configuration
            .and_then(|p| p.oidc)
            .expect("oidc config");
        assert_eq!(oidc.grant_types.len(), OIDC_GRANT_TYPES.len());
        assert_eq!(oidc.callback_urls, vec!["http://localhost:8490/app1/oauth2client"]);

        let claims = model.claim_configuration.expect("claim configuration");
        assert_eq!(claims.requested_claims.len(), 1);
        assert_eq!(
            claims.claim_mappings[0].local_claim.uri,
            "http://wso2.org/claims/username"
        );
    }

    #[test]
    fn test_application_without_claims_has_no_claim_configuration() {
        let app = OidcApplication::new("plain", "/plain", "http://cb");
        assert!(app.to_model().claim_configuration.is_none());
    }

    #[test]
    fn test_context_rejects_invalid_config() {
        let config = TestkitConfig::new().with_backend_url("not a url");
        assert!(matches!(
            OidcTestContext::new(config),
            Err(ClientError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_create_application_reads_client_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(APPS_PATH))
            .and(body_partial_json(serde_json::json!({"name": "app1"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("{}{}/app-42", server.uri(), APPS_PATH)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/app-42/inbound-protocols/oidc", APPS_PATH)))
            .and(header("Authorization", "Basic YWRtaW46YWRtaW4="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "clientId": "cid-42",
                "clientSecret": "secret-42",
                "grantTypes": ["authorization_code"],
                "callbackURLs": ["http://localhost:8490/app1/oauth2client"]
            })))
            .mount(&server)
            .await;

        let registered = context(&server)
            .await
            .create_application(app1())
            .await
            .expect("created");

        assert_eq!(registered.application_id(), "app-42");
        assert_eq!(registered.client_id(), "cid-42");
        assert_eq!(registered.client_secret(), "secret-42");
        assert_eq!(registered.application().name, "app1");
    }

    #[tokio::test]
    async fn test_create_application_without_secret_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(APPS_PATH))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("{}{}/app-1", server.uri(), APPS_PATH)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/app-1/inbound-protocols/oidc", APPS_PATH)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"clientId": "cid"})),
            )
            .mount(&server)
            .await;

        let err = context(&server)
            .await
            .create_application(app1())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::MissingResponseField {
                field: "clientSecret",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_create_user_adds_default_role() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/t/carbon.super/scim2/Users"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "u-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/t/carbon.super/scim2/v2/Roles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalResults": 1,
                "Resources": [{"id": "role-everyone", "displayName": "everyone"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/t/carbon.super/scim2/v2/Roles/role-everyone"))
            .and(body_partial_json(serde_json::json!({
                "Operations": [{"op": "add", "path": "users", "value": [{"value": "u-1"}]}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let user = context(&server)
            .await
            .create_user(&UserObject::new("oidcuser").with_password("Oidcuser@123"))
            .await
            .expect("user created");

        assert_eq!(
            user,
            ProvisionedUser {
                user_id: "u-1".into(),
                role_id: "role-everyone".into(),
                user_name: "oidcuser".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_create_user_removes_user_when_role_lookup_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/t/carbon.super/scim2/Users"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "u-1"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/t/carbon.super/scim2/v2/Roles"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/t/carbon.super/scim2/Users/u-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let err = context(&server)
            .await
            .create_user(&UserObject::new("oidcuser"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnexpectedStatus { actual: 500, .. }
        ));
    }

    #[tokio::test]
    async fn test_delete_user_expects_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/t/carbon.super/scim2/Users/u-1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = context(&server)
            .await
            .delete_user(ProvisionedUser {
                user_id: "u-1".into(),
                role_id: "r".into(),
                user_name: "u".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnexpectedStatus { actual: 200, .. }
        ));
    }
}
