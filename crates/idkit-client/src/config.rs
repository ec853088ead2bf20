//! Test kit configuration.
//!
//! Loaded from a TOML file, then adjusted with the `with_*` builders
//! (the CLI layers flags and environment variables on top).
//!
//! ```toml
//! [server]
//! backend_url = "https://localhost:9853/"
//! insecure = true
//!
//! [tenant]
//! username = "admin"
//! password = "admin"
//! domain = "carbon.super"
//!
//! [flow]
//! target_application_url = "http://localhost:8490{path}"
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::credentials::TenantCredentials;
use crate::error::ConfigError;

/// Placeholder substituted with the application path in
/// [`FlowConfig::target_application_url`].
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestkitConfig {
    pub server: ServerConfig,
    pub tenant: TenantConfig,
    pub flow: FlowConfig,
    pub logging: LoggingConfig,
}

/// Identity server connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Server root URL, e.g. `https://localhost:9853/`.
    pub backend_url: String,
    /// Accept self-signed server certificates.
    pub insecure: bool,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backend_url: "https://localhost:9853/".to_string(),
            insecure: false,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backend URL without its trailing slash.
    pub fn root(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }
}

/// Tenant admin account used for Basic authentication.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TenantConfig {
    pub username: String,
    pub password: String,
    pub domain: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
            domain: "carbon.super".to_string(),
        }
    }
}

impl fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Playground application and login endpoints used by the authorization flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowConfig {
    /// URL template of the playground web app; `{path}` receives the
    /// application context plus [`FlowConfig::user_authorize_path`].
    pub target_application_url: String,
    /// Playground page that relays the authorization request.
    pub user_authorize_path: String,
    /// Server authorization endpoint handed to the playground app.
    /// Defaults to `{backend}/oauth2/authorize`.
    pub authorize_endpoint: Option<String>,
    /// Login form endpoint, relative to the backend URL.
    pub commonauth_path: String,
    /// Space separated OAuth2 scopes.
    pub scope: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            target_application_url: "http://localhost:8490{path}".to_string(),
            user_authorize_path: "/oauth2-authorize-user.jsp".to_string(),
            authorize_endpoint: None,
            commonauth_path: "/commonauth".to_string(),
            scope: "openid email profile".to_string(),
        }
    }
}

/// Logging settings, handed to `idkit-telemetry`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl TestkitConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the backend URL.
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.server.backend_url = url.into();
        self
    }

    /// Set the tenant admin credentials and domain.
    pub fn with_tenant(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        self.tenant = TenantConfig {
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
        };
        self
    }

    /// Accept self-signed certificates.
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.server.insecure = insecure;
        self
    }

    /// Set the playground application URL template.
    pub fn with_target_application_url(mut self, template: impl Into<String>) -> Self {
        self.flow.target_application_url = template.into();
        self
    }

    /// Set the log level.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// Set the log format (`pretty` or `json`).
    pub fn with_log_format(mut self, format: impl Into<String>) -> Self {
        self.logging.format = format.into();
        self
    }

    /// Check values that would otherwise fail on first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let backend = reqwest::Url::parse(&self.server.backend_url).map_err(|e| {
            ConfigError::Invalid {
                key: "server.backend_url",
                reason: format!("{}: {}", self.server.backend_url, e),
            }
        })?;
        if !matches!(backend.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                key: "server.backend_url",
                reason: format!("unsupported scheme '{}'", backend.scheme()),
            });
        }
        if self.tenant.username.is_empty() {
            return Err(ConfigError::Invalid {
                key: "tenant.username",
                reason: "must not be empty".into(),
            });
        }
        if self.tenant.domain.is_empty() {
            return Err(ConfigError::Invalid {
                key: "tenant.domain",
                reason: "must not be empty".into(),
            });
        }
        if !self.flow.target_application_url.contains(PATH_PLACEHOLDER) {
            return Err(ConfigError::Invalid {
                key: "flow.target_application_url",
                reason: format!("missing '{}' placeholder", PATH_PLACEHOLDER),
            });
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "server.request_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Credentials of the tenant admin.
    pub fn credentials(&self) -> TenantCredentials {
        TenantCredentials::new(
            &self.tenant.username,
            &self.tenant.password,
            &self.tenant.domain,
        )
    }

    /// Server authorization endpoint, explicit or derived from the backend URL.
    pub fn authorize_endpoint(&self) -> String {
        match &self.flow.authorize_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("{}/oauth2/authorize", self.server.root()),
        }
    }

    /// Absolute URL of the login form endpoint.
    pub fn commonauth_url(&self) -> String {
        format!("{}{}", self.server.root(), self.flow.commonauth_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TestkitConfig::default();
        assert_eq!(config.server.backend_url, "https://localhost:9853/");
        assert_eq!(config.tenant.username, "admin");
        assert_eq!(config.tenant.domain, "carbon.super");
        assert_eq!(config.server.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = TestkitConfig::from_toml(
            r#"
            [server]
            backend_url = "https://is.example.com:9443/"
            insecure = true

            [tenant]
            username = "tenantadmin@wso2.com"
            password = "secret"
            domain = "wso2.com"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.server.backend_url, "https://is.example.com:9443/");
        assert!(config.server.insecure);
        assert_eq!(config.tenant.domain, "wso2.com");
        // Untouched sections keep their defaults
        assert_eq!(config.flow.user_authorize_path, "/oauth2-authorize-user.jsp");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let result = TestkitConfig::from_toml("[server]\nbackend = \"x\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_bad_backend_url() {
        let config = TestkitConfig::new().with_backend_url("not a url");
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "server.backend_url",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_unsupported_scheme() {
        let config = TestkitConfig::new().with_backend_url("ftp://localhost/");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_template_placeholder() {
        let config = TestkitConfig::new().with_target_application_url("http://localhost:8490/");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("{path}"));
    }

    #[test]
    fn test_validate_empty_username() {
        let config = TestkitConfig::new().with_tenant("", "pw", "carbon.super");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_endpoints() {
        let config = TestkitConfig::new().with_backend_url("https://localhost:9853/");
        assert_eq!(
            config.authorize_endpoint(),
            "https://localhost:9853/oauth2/authorize"
        );
        assert_eq!(config.commonauth_url(), "https://localhost:9853/commonauth");
    }

    #[test]
    fn test_explicit_authorize_endpoint() {
        let mut config = TestkitConfig::new();
        config.flow.authorize_endpoint = Some("https://sso.example.com/authorize".into());
        assert_eq!(
            config.authorize_endpoint(),
            "https://sso.example.com/authorize"
        );
    }

    #[test]
    fn test_tenant_debug_redacts_password() {
        let config = TestkitConfig::new().with_tenant("admin", "hunter2", "carbon.super");
        let debug = format!("{:?}", config.tenant);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_from_file_missing() {
        let err = TestkitConfig::from_file("/nonexistent/idkit.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("idkit.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\nformat = \"json\"\n")
            .expect("write config");

        let config = TestkitConfig::from_file(&path).expect("load config");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }
}
