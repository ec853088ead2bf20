//! Playground application and browser login endpoints.

use reqwest::Url;
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use crate::server::{
    cookie, form_params, html, query_params, redirect, server_url, Login, MockOptions,
    PendingAuthorization, SharedState, COMMON_AUTH_COOKIE,
};

const SESSION_DATA_KEY: &str = "sessionDataKey";
const LOGIN_PAGE: &str = "/authenticationendpoint/login.do";
const CLAIMS_PAGE: &str = "/authenticationendpoint/claims.do";
const RETRY_PAGE: &str = "/authenticationendpoint/retry.do";

/// Playground `oauth2-authorize-user.jsp`: turns the posted form into an
/// authorization request against the server.
pub(crate) struct Playground;

impl Respond for Playground {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let form = form_params(&request.body);
        let (Some(client_id), Some(callback), Some(endpoint)) = (
            form.get("consumerKey"),
            form.get("callbackurl"),
            form.get("authorizeEndpoint"),
        ) else {
            return html(400, page("Error", "<p>Missing authorization parameters</p>"));
        };

        let response_type = match form.get("grantType").map(String::as_str) {
            Some("implicit") => "id_token token",
            _ => "code",
        };
        let scope = form.get("scope").map(String::as_str).unwrap_or("openid");

        match Url::parse_with_params(
            endpoint,
            &[
                ("response_type", response_type),
                ("client_id", client_id.as_str()),
                ("redirect_uri", callback.as_str()),
                ("scope", scope),
            ],
        ) {
            Ok(url) => redirect(url.as_str()),
            Err(_) => html(400, page("Error", "<p>Invalid authorize endpoint</p>")),
        }
    }
}

/// `/oauth2/authorize`.
///
/// Without a login cookie, parks the request under a new session data key
/// and sends the browser to the login page. With one, issues a code, or
/// redirects to the claims prompt when the user lacks a requested claim.
pub(crate) struct Authorize {
    state: SharedState,
    base: String,
}

impl Authorize {
    pub(crate) fn new(state: SharedState, base: String) -> Self {
        Self { state, base }
    }
}

impl Respond for Authorize {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let query = query_params(request);
        let mut state = self.state.lock();

        // Resumed after login, or a fresh request
        let pending = match query.get(SESSION_DATA_KEY).and_then(|k| state.sessions.get(k)) {
            Some(pending) => pending.clone(),
            None => match (query.get("client_id"), query.get("redirect_uri")) {
                (Some(client_id), Some(redirect_uri)) => PendingAuthorization {
                    client_id: client_id.clone(),
                    redirect_uri: redirect_uri.clone(),
                },
                _ => return html(400, page("Error", "<p>Invalid authorization request</p>")),
            },
        };

        let Some(app) = state
            .applications
            .values()
            .find(|a| a.client_id == pending.client_id)
            .cloned()
        else {
            return html(400, page("Error", "<p>Invalid client</p>"));
        };
        if !app.callback_urls.contains(&pending.redirect_uri) {
            return html(400, page("Error", "<p>Callback URL mismatch</p>"));
        }

        let login = cookie(request, COMMON_AUTH_COOKIE).and_then(|id| state.logins.get(&id).cloned());
        let Some(login) = login else {
            let key = Uuid::new_v4().to_string();
            state.sessions.insert(key.clone(), pending);
            return redirect(server_url(
                &self.base,
                LOGIN_PAGE,
                &[("client_id", app.client_id.as_str()), (SESSION_DATA_KEY, key.as_str())],
            ));
        };

        // The login's session, and the one being resumed, are done either way
        state.sessions.remove(&login.session_key);
        if let Some(resumed) = query.get(SESSION_DATA_KEY) {
            state.sessions.remove(resumed);
        }

        let user_claims = state.claims_of(&login.user_name);
        let missing: Vec<&str> = app
            .requested_claims
            .iter()
            .filter(|c| !user_claims.contains(c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            let key = Uuid::new_v4().to_string();
            let missing = missing.join(",");
            state.sessions.insert(key.clone(), pending);
            return redirect(server_url(
                &self.base,
                CLAIMS_PAGE,
                &[(SESSION_DATA_KEY, key.as_str()), ("missingClaims", missing.as_str())],
            ));
        }

        match Url::parse(&pending.redirect_uri) {
            Ok(mut callback) => {
                let code = Uuid::new_v4().to_string();
                let session_state = Uuid::new_v4().simple().to_string();
                callback
                    .query_pairs_mut()
                    .append_pair("code", &code)
                    .append_pair("session_state", &session_state);
                redirect(callback.as_str())
            }
            Err(_) => html(400, page("Error", "<p>Invalid callback URL</p>")),
        }
    }
}

/// `/authenticationendpoint/login.do`.
pub(crate) struct LoginPage;

impl Respond for LoginPage {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let query = query_params(request);
        let Some(key) = query.get(SESSION_DATA_KEY) else {
            return html(400, page("Error", "<p>Missing session</p>"));
        };

        let failure = if query.get("authFailure").map(String::as_str) == Some("true") {
            "<p class=\"error\">Login failed! Please check your username and password.</p>"
        } else {
            ""
        };
        let body = format!(
            r#"{}
<form action="../commonauth" method="post" id="loginForm">
  <input id="username" name="username" type="text"/>
  <input id="password" name="password" type="password"/>
  <input type="hidden" name="sessionDataKey" value="{}"/>
  <button type="submit">Sign In</button>
</form>"#,
            failure, key
        );
        html(200, page("Sign In", &body))
    }
}

/// `/authenticationendpoint/claims.do`: asks for missing claim values.
pub(crate) struct ClaimsPage;

impl Respond for ClaimsPage {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let query = query_params(request);
        let key = query.get(SESSION_DATA_KEY).cloned().unwrap_or_default();
        let inputs: String = query
            .get("missingClaims")
            .map(String::as_str)
            .unwrap_or_default()
            .split(',')
            .filter(|c| !c.is_empty())
            .map(|c| format!("  <input type=\"text\" name=\"claim_mand_{}\"/>\n", c))
            .collect();
        let body = format!(
            r#"<p>Provide values for the missingClaims below.</p>
<form action="../commonauth" method="post">
{}  <input type="hidden" name="sessionDataKey" value="{}"/>
</form>"#,
            inputs, key
        );
        html(200, page("Missing claims", &body))
    }
}

/// `/commonauth`: checks the login form and sets the login cookie.
pub(crate) struct CommonAuth {
    state: SharedState,
    options: MockOptions,
    base: String,
}

impl CommonAuth {
    pub(crate) fn new(state: SharedState, options: MockOptions, base: String) -> Self {
        Self {
            state,
            options,
            base,
        }
    }
}

impl Respond for CommonAuth {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let form = form_params(&request.body);
        let mut state = self.state.lock();

        let Some(key) = form
            .get(SESSION_DATA_KEY)
            .filter(|k| state.sessions.contains_key(*k))
        else {
            return redirect(server_url(&self.base, RETRY_PAGE, &[]));
        };

        let username = form.get("username").map(String::as_str).unwrap_or_default();
        let password = form.get("password").map(String::as_str).unwrap_or_default();
        if !state.authenticate(&self.options, username, password) {
            return redirect(server_url(
                &self.base,
                LOGIN_PAGE,
                &[(SESSION_DATA_KEY, key.as_str()), ("authFailure", "true")],
            ));
        }

        let login_id = Uuid::new_v4().to_string();
        state.logins.insert(
            login_id.clone(),
            Login {
                user_name: username.to_string(),
                session_key: key.clone(),
            },
        );
        redirect(server_url(
            &self.base,
            "/oauth2/authorize",
            &[(SESSION_DATA_KEY, key.as_str())],
        ))
        .insert_header(
            "Set-Cookie",
            format!("{}={}; Path=/; HttpOnly", COMMON_AUTH_COOKIE, login_id).as_str(),
        )
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{}</title></head>\n<body>\n{}\n</body>\n</html>\n",
        title, body
    )
}
