//! Browser-less OIDC authorization flow driver.
//!
//! The flow runs in two explicit steps:
//!
//! 1. [`FlowStep::Initial`]: POST the authorization form to the playground
//!    application, follow the resulting redirect chain automatically and read
//!    the session data key from the login page.
//! 2. [`FlowStep::Subsequent`]: POST the form again, follow only the first
//!    redirect with automatic redirection disabled, and fail if the server
//!    asks for missing claims.
//!
//! Both clients of a flow share one cookie jar, and every flow gets its own.

use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};

use idkit_telemetry::{log_flow_step, log_missing_claims_prompt};

use crate::config::{ServerConfig, TestkitConfig, PATH_PLACEHOLDER};
use crate::context::RegisteredApplication;
use crate::error::ClientError;
use crate::http::build_http_client;
use crate::oidc::redirect::RedirectTarget;
use crate::oidc::session::{
    extract_session_data_key, requests_missing_claims, SessionDataKey, SESSION_DATA_KEY,
};

/// Grant type requested through the playground application.
pub const GRANT_TYPE_CODE: &str = "code";

/// Value of the playground's `authorize` submit button.
pub const AUTHORIZE_PARAM: &str = "Authorize";

/// Where a flow is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStep {
    /// First authentication request: no session yet.
    Initial,
    /// A later request within the session started by the initial step.
    Subsequent(SessionDataKey),
}

/// Result of one authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The initial step reached the login page and found its session key.
    SessionStarted(SessionDataKey),
    /// The subsequent step redirected somewhere other than the claims prompt.
    NoClaimsPrompt(RedirectTarget),
}

/// Playground and server endpoints the flow talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEndpoints {
    /// Playground URL template containing `{path}`.
    pub target_application_url: String,
    /// Playground page relaying the authorization request.
    pub user_authorize_path: String,
    /// Server authorization endpoint.
    pub authorize_endpoint: String,
    /// Server login form endpoint.
    pub commonauth_url: String,
    /// Requested scopes.
    pub scope: String,
}

impl FlowEndpoints {
    pub fn from_config(config: &TestkitConfig) -> Self {
        Self {
            target_application_url: config.flow.target_application_url.clone(),
            user_authorize_path: config.flow.user_authorize_path.clone(),
            authorize_endpoint: config.authorize_endpoint(),
            commonauth_url: config.commonauth_url(),
            scope: config.flow.scope.clone(),
        }
    }

    /// Playground URL for an application context, e.g. `/playground2`.
    pub fn target_url(&self, application_context: &str) -> String {
        let path = format!("{}{}", application_context, self.user_authorize_path);
        self.target_application_url.replace(PATH_PLACEHOLDER, &path)
    }
}

/// Drives authorization requests for one browser session.
pub struct AuthorizationFlow {
    /// Follows redirects like a browser.
    following: Client,
    /// Stops at the first redirect so intermediate pages can be inspected.
    manual: Client,
    jar: Arc<Jar>,
    endpoints: FlowEndpoints,
}

impl AuthorizationFlow {
    /// Start a flow with a fresh cookie jar.
    pub fn new(server: &ServerConfig, endpoints: FlowEndpoints) -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        let following = build_http_client(server, Policy::default(), Some(Arc::clone(&jar)))?;
        let manual = build_http_client(server, Policy::none(), Some(Arc::clone(&jar)))?;
        Ok(Self {
            following,
            manual,
            jar,
            endpoints,
        })
    }

    pub fn endpoints(&self) -> &FlowEndpoints {
        &self.endpoints
    }

    /// Cookie jar shared by both clients of this flow.
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    /// Form parameters posted to the playground application.
    pub fn authorization_parameters(&self, app: &RegisteredApplication) -> Vec<(&'static str, String)> {
        vec![
            ("grantType", GRANT_TYPE_CODE.to_string()),
            ("consumerKey", app.client_id().to_string()),
            ("callbackurl", app.application().callback_url.clone()),
            ("authorizeEndpoint", self.endpoints.authorize_endpoint.clone()),
            ("authorize", AUTHORIZE_PARAM.to_string()),
            ("scope", self.endpoints.scope.clone()),
        ]
    }

    /// Send one authentication request for `app` at the given step.
    pub async fn send_authentication_request(
        &self,
        app: &RegisteredApplication,
        step: &FlowStep,
    ) -> Result<FlowOutcome, ClientError> {
        let redirect = self.request_authorization(app).await?;

        match step {
            FlowStep::Initial => {
                let response = self.following.get(redirect.url().clone()).send().await?;
                let page_url = response.url().clone();
                let status = response.status();
                // Reading the body to the end releases the connection
                let body = response.text().await?;
                if !status.is_success() {
                    return Err(ClientError::UnexpectedStatus {
                        operation: "initial authentication request",
                        expected: "2xx login page".to_string(),
                        actual: status.as_u16(),
                        body,
                    });
                }
                let session = extract_session_data_key(&body, &page_url)?;

                log_flow_step!(
                    step = "initial",
                    app = %app.application().name,
                    session = %session.fingerprint(),
                    "session data key extracted"
                );
                Ok(FlowOutcome::SessionStarted(session))
            }
            FlowStep::Subsequent(session) => {
                let request_url = redirect.url().clone();
                let response = self.manual.get(request_url.clone()).send().await?;
                let status = response.status();
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body = response.text().await?;

                let redirected = status.is_redirection() && location.is_some();
                if !redirected && !status.is_success() {
                    return Err(ClientError::UnexpectedStatus {
                        operation: "subsequent authentication request",
                        expected: "2xx or 3xx with Location".to_string(),
                        actual: status.as_u16(),
                        body,
                    });
                }

                if requests_missing_claims(location.as_deref(), &body) {
                    let prompt = location.unwrap_or_else(|| request_url.to_string());
                    log_missing_claims_prompt!(
                        app = %app.application().name,
                        session = %session.fingerprint(),
                        location = %prompt
                    );
                    return Err(ClientError::MissingClaimsPrompt { location: prompt });
                }

                let target = match location {
                    Some(location) => RedirectTarget::resolve(&request_url, &location)?,
                    None => RedirectTarget::resolve(&request_url, request_url.as_str())?,
                };
                log_flow_step!(
                    step = "subsequent",
                    app = %app.application().name,
                    session = %session.fingerprint(),
                    status = status.as_u16(),
                    target = %target.as_str(),
                    "no missing claims requested"
                );
                Ok(FlowOutcome::NoClaimsPrompt(target))
            }
        }
    }

    /// Run the initial step and return the session data key.
    pub async fn first_authentication_request(
        &self,
        app: &RegisteredApplication,
    ) -> Result<SessionDataKey, ClientError> {
        match self
            .send_authentication_request(app, &FlowStep::Initial)
            .await?
        {
            FlowOutcome::SessionStarted(session) => Ok(session),
            FlowOutcome::NoClaimsPrompt(target) => Err(ClientError::MissingResponseField {
                field: SESSION_DATA_KEY,
                context: format!("initial authentication request ended at {}", target.as_str()),
            }),
        }
    }

    /// Run a subsequent step within the session started by
    /// [`AuthorizationFlow::first_authentication_request`].
    pub async fn subsequent_authentication_request(
        &self,
        app: &RegisteredApplication,
        session: &SessionDataKey,
    ) -> Result<RedirectTarget, ClientError> {
        let step = FlowStep::Subsequent(session.clone());
        match self.send_authentication_request(app, &step).await? {
            FlowOutcome::NoClaimsPrompt(target) => Ok(target),
            FlowOutcome::SessionStarted(_) => Err(ClientError::MissingResponseField {
                field: "Location",
                context: "subsequent authentication request".to_string(),
            }),
        }
    }

    /// Submit the login form for a session; returns where the server
    /// redirected afterwards.
    pub async fn login(
        &self,
        session: &SessionDataKey,
        username: &str,
        password: &str,
    ) -> Result<RedirectTarget, ClientError> {
        let url = parse_url(&self.endpoints.commonauth_url)?;
        let response = self
            .manual
            .post(url.clone())
            .form(&[
                (SESSION_DATA_KEY, session.as_str()),
                ("username", username),
                ("password", password),
            ])
            .send()
            .await?;
        let location = redirect_location(response, "POST commonauth").await?;
        let target = RedirectTarget::resolve(&url, &location)?;

        log_flow_step!(
            step = "login",
            session = %session.fingerprint(),
            target = %target.as_str(),
            "login form submitted"
        );
        Ok(target)
    }

    /// POST the authorization form to the playground and return the
    /// redirect it answers with.
    async fn request_authorization(
        &self,
        app: &RegisteredApplication,
    ) -> Result<RedirectTarget, ClientError> {
        let url = parse_url(&self.endpoints.target_url(&app.application().context))?;
        let response = self
            .manual
            .post(url.clone())
            .form(&self.authorization_parameters(app))
            .send()
            .await?;
        let location = redirect_location(response, "POST authorization request").await?;
        RedirectTarget::resolve(&url, &location)
    }
}

fn parse_url(raw: &str) -> Result<Url, ClientError> {
    Url::parse(raw).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", raw, e)))
}

/// Take the `Location` header and drain the body.
async fn redirect_location(
    response: reqwest::Response,
    context: &str,
) -> Result<String, ClientError> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    response.bytes().await?;

    location.ok_or_else(|| ClientError::MissingResponseField {
        field: "Location",
        context: context.to_string(),
    })
}
