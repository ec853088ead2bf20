//! MockIdentityServer: in-process identity server double.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Url;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use idkit_client::basic_auth_header;

use crate::oidc::{Authorize, ClaimsPage, CommonAuth, LoginPage, Playground};
use crate::rest::RestApi;

/// Id of the built-in `everyone` role.
pub const EVERYONE_ROLE_ID: &str = "2a8e5b0c-everyone";

pub(crate) const USERNAME_CLAIM: &str = "http://wso2.org/claims/username";
pub(crate) const EMAIL_CLAIM: &str = "http://wso2.org/claims/emailaddress";
pub(crate) const GIVEN_NAME_CLAIM: &str = "http://wso2.org/claims/givenname";
pub(crate) const LAST_NAME_CLAIM: &str = "http://wso2.org/claims/lastname";

/// Cookie marking an authenticated browser session.
pub(crate) const COMMON_AUTH_COOKIE: &str = "commonAuthId";

/// Tenant and admin account the mock server accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockOptions {
    pub username: String,
    pub password: String,
    pub domain: String,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
            domain: "carbon.super".to_string(),
        }
    }
}

impl MockOptions {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
        }
    }

    /// `Authorization` header value REST calls must carry.
    pub fn authorization(&self) -> String {
        basic_auth_header(&self.username, &self.password)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StoredClaim {
    pub claim_uri: String,
    pub mapped_local_claim_uri: String,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredApplication {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub grant_types: Vec<String>,
    pub callback_urls: Vec<String>,
    pub requested_claims: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredUser {
    pub user_name: String,
    pub password: Option<String>,
    pub claims: Vec<String>,
}

/// Authorization request waiting for the user to log in.
#[derive(Debug, Clone)]
pub(crate) struct PendingAuthorization {
    pub client_id: String,
    pub redirect_uri: String,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    /// Keyed by (dialect id, claim id).
    pub claims: BTreeMap<(String, String), StoredClaim>,
    pub applications: BTreeMap<String, StoredApplication>,
    pub users: BTreeMap<String, StoredUser>,
    pub role_members: BTreeSet<String>,
    /// Keyed by session data key.
    pub sessions: HashMap<String, PendingAuthorization>,
    /// Keyed by `commonAuthId` cookie value.
    pub logins: HashMap<String, Login>,
}

/// A successful login and the session it completed.
#[derive(Debug, Clone)]
pub(crate) struct Login {
    pub user_name: String,
    pub session_key: String,
}

impl State {
    /// Check login credentials against the admin account and SCIM users.
    pub fn authenticate(&self, options: &MockOptions, username: &str, password: &str) -> bool {
        if username == options.username && password == options.password {
            return true;
        }
        self.users
            .values()
            .any(|u| u.user_name == username && u.password.as_deref() == Some(password))
    }

    /// Claims with a value for the given user.
    pub fn claims_of(&self, user_name: &str) -> Vec<String> {
        self.users
            .values()
            .find(|u| u.user_name == user_name)
            .map(|u| u.claims.clone())
            .unwrap_or_else(|| vec![USERNAME_CLAIM.to_string()])
    }
}

pub(crate) type SharedState = Arc<Mutex<State>>;

/// Stateful mock of the identity server.
///
/// REST endpoints live under `/t/{domain}/api/server/v1` and
/// `/t/{domain}/scim2` and require Basic auth with the configured admin
/// account. The playground page, `/oauth2/authorize`, the login and claims
/// pages and `/commonauth` emulate a browser login.
///
/// The authorize endpoint redirects to the claims prompt when an
/// application requests claims the logged-in user has no value for.
pub struct MockIdentityServer {
    server: MockServer,
    options: MockOptions,
    state: SharedState,
}

impl MockIdentityServer {
    /// Start a server accepting `admin`/`admin` in `carbon.super`.
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let server = MockServer::start().await;
        let state = SharedState::default();
        let base = server.uri();

        Mock::given(path_regex(r"^/t/[^/]+/(api/server/v1|scim2)/"))
            .respond_with(RestApi::new(state.clone(), options.clone()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"/oauth2-authorize-user\.jsp$"))
            .respond_with(Playground)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oauth2/authorize"))
            .respond_with(Authorize::new(state.clone(), base.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/authenticationendpoint/login.do"))
            .respond_with(LoginPage)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/authenticationendpoint/claims.do"))
            .respond_with(ClaimsPage)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/commonauth"))
            .respond_with(CommonAuth::new(state.clone(), options.clone(), base))
            .mount(&server)
            .await;

        Self {
            server,
            options,
            state,
        }
    }

    /// Base URL of the server, without trailing slash.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Backend URL in the form clients are configured with.
    pub fn backend_url(&self) -> String {
        format!("{}/", self.server.uri())
    }

    /// Playground URL template pointing at this server.
    pub fn target_application_url(&self) -> String {
        format!("{}{{path}}", self.server.uri())
    }

    pub fn options(&self) -> &MockOptions {
        &self.options
    }

    pub fn claim_count(&self) -> usize {
        self.state.lock().claims.len()
    }

    pub fn application_count(&self) -> usize {
        self.state.lock().applications.len()
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().users.len()
    }

    /// User ids in the `everyone` role.
    pub fn role_members(&self) -> Vec<String> {
        self.state.lock().role_members.iter().cloned().collect()
    }

    /// Number of authorization requests waiting for a login.
    pub fn pending_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Every request the server has seen.
    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }
}

pub(crate) fn json_error(status: u16, code: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "code": code,
        "message": message,
        "description": message,
    }))
}

pub(crate) fn html(status: u16, body: String) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_raw(body, "text/html")
}

pub(crate) fn redirect(location: impl AsRef<str>) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("Location", location.as_ref())
}

/// URL on this server with the given path and query parameters.
///
/// `base` is the server's own URI: wiremock rebuilds `Request::url` without
/// the port, so it cannot be used as the redirect authority.
pub(crate) fn server_url(base: &str, path: &str, params: &[(&str, &str)]) -> String {
    let raw = format!("{}{}", base.trim_end_matches('/'), path);
    if params.is_empty() {
        return raw;
    }
    match Url::parse_with_params(&raw, params) {
        Ok(url) => url.to_string(),
        Err(_) => raw,
    }
}

/// Decode an `application/x-www-form-urlencoded` body.
pub(crate) fn form_params(body: &[u8]) -> HashMap<String, String> {
    let raw = String::from_utf8_lossy(body);
    Url::parse(&format!("http://form.invalid/?{}", raw))
        .map(|u| u.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

pub(crate) fn query_params(request: &Request) -> HashMap<String, String> {
    request.url.query_pairs().into_owned().collect()
}

/// Value of a request cookie.
pub(crate) fn cookie(request: &Request, name: &str) -> Option<String> {
    request
        .headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_params_decoding() {
        let params = form_params(b"callbackurl=http%3A%2F%2Flocalhost%3A8490%2Fcb&scope=openid+email");
        assert_eq!(
            params.get("callbackurl").map(String::as_str),
            Some("http://localhost:8490/cb")
        );
        assert_eq!(params.get("scope").map(String::as_str), Some("openid email"));
    }

    #[test]
    fn test_authenticate_admin_and_users() {
        let options = MockOptions::default();
        let mut state = State::default();
        state.users.insert(
            "u-1".into(),
            StoredUser {
                user_name: "oidcuser".into(),
                password: Some("pw".into()),
                claims: vec![USERNAME_CLAIM.into()],
            },
        );

        assert!(state.authenticate(&options, "admin", "admin"));
        assert!(state.authenticate(&options, "oidcuser", "pw"));
        assert!(!state.authenticate(&options, "oidcuser", "wrong"));
        assert!(!state.authenticate(&options, "nobody", "pw"));
    }

    #[test]
    fn test_admin_has_username_claim_only() {
        assert_eq!(State::default().claims_of("admin"), vec![USERNAME_CLAIM]);
    }

    #[test]
    fn test_server_url_keeps_port() {
        assert_eq!(
            server_url("http://127.0.0.1:41234", "/authenticationendpoint/retry.do", &[]),
            "http://127.0.0.1:41234/authenticationendpoint/retry.do"
        );
        assert_eq!(
            server_url(
                "http://127.0.0.1:41234/",
                "/oauth2/authorize",
                &[("sessionDataKey", "k 1")]
            ),
            "http://127.0.0.1:41234/oauth2/authorize?sessionDataKey=k+1"
        );
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(
            MockOptions::default().authorization(),
            "Basic YWRtaW46YWRtaW4="
        );
    }
}
