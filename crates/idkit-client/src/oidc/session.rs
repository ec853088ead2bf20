//! Session data key extraction and missing-claims detection.

use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;
use reqwest::Url;

use crate::error::ClientError;

/// Form field and query parameter carrying the session data key.
pub const SESSION_DATA_KEY: &str = "sessionDataKey";

/// Page the server redirects to when mandatory claims are missing.
pub const CLAIMS_PROMPT_PAGE: &str = "claims.do";

/// Query parameter listing the missing claims.
pub const MISSING_CLAIMS_PARAM: &str = "missingClaims";

/// Opaque token identifying an in-progress authentication session.
///
/// Never empty.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionDataKey(String);

impl SessionDataKey {
    pub fn new(value: impl Into<String>) -> Result<Self, ClientError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ClientError::MissingResponseField {
                field: SESSION_DATA_KEY,
                context: "empty session data key".to_string(),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form safe to put in logs.
    pub fn fingerprint(&self) -> String {
        let prefix: String = self.0.chars().take(8).collect();
        format!("{}…", prefix)
    }
}

impl fmt::Debug for SessionDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionDataKey")
            .field(&self.fingerprint())
            .finish()
    }
}

fn name_then_value() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"name\s*=\s*["']sessionDataKey["'][^>]*?value\s*=\s*["']([^"']*)["']"#)
            .expect("static regex")
    })
}

fn value_then_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"value\s*=\s*["']([^"']*)["'][^>]*?name\s*=\s*["']sessionDataKey["']"#)
            .expect("static regex")
    })
}

/// Find the session data key on a login page.
///
/// Looks for a `sessionDataKey` form input in `body` first, then for a
/// `sessionDataKey` query parameter on the page URL.
pub fn extract_session_data_key(body: &str, page_url: &Url) -> Result<SessionDataKey, ClientError> {
    let from_body = name_then_value()
        .captures(body)
        .or_else(|| value_then_name().captures(body))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|v| !v.is_empty());

    let value = from_body.or_else(|| {
        page_url
            .query_pairs()
            .find(|(k, _)| k == SESSION_DATA_KEY)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    });

    match value {
        Some(v) => SessionDataKey::new(v),
        None => Err(ClientError::MissingResponseField {
            field: SESSION_DATA_KEY,
            context: format!("login page {}", page_url),
        }),
    }
}

/// Whether a response sends the user to the missing-claims prompt.
///
/// Checks the redirect `location` when there is one, the body otherwise.
pub fn requests_missing_claims(location: Option<&str>, body: &str) -> bool {
    match location {
        Some(location) => {
            location.contains(CLAIMS_PROMPT_PAGE) || location.contains(MISSING_CLAIMS_PARAM)
        }
        None => body.contains(MISSING_CLAIMS_PARAM),
    }
}
