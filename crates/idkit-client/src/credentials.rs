//! Tenant credentials and HTTP Basic encoding (RFC 7617).

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};

/// Username, password and tenant domain of the account driving the tests.
///
/// Immutable once built; the password never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantCredentials {
    username: String,
    password: String,
    domain: String,
}

impl TenantCredentials {
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

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// `Authorization` header value: `Basic base64(username:password)`.
    pub fn basic_auth_header(&self) -> String {
        basic_auth_header(&self.username, &self.password)
    }
}

impl fmt::Debug for TenantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Encode a Basic authorization header value.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}
