//! Error types for the identity server clients.

use thiserror::Error;

/// Errors raised by the REST clients and the authorization flow driver.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to build the underlying HTTP client.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// Network or protocol failure while talking to the server.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request or response payload could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A URL could not be built or parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A header name or value is not valid HTTP.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The server answered with a status other than the expected one.
    #[error("{operation} failed: expected status {expected}, got {actual}{}", body_suffix(.body))]
    UnexpectedStatus {
        operation: &'static str,
        expected: String,
        actual: u16,
        body: String,
    },

    /// A response lacked a field the caller depends on (Location header,
    /// session data key, identifier in the body).
    #[error("missing expected response field '{field}' in {context}")]
    MissingResponseField { field: &'static str, context: String },

    /// The server redirected to the missing-claims prompt.
    #[error("server requested missing claims (redirected to {location})")]
    MissingClaimsPrompt { location: String },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {}", body)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_status_message_includes_body() {
        let err = ClientError::UnexpectedStatus {
            operation: "external claim deletion",
            expected: "204".into(),
            actual: 404,
            body: "{\"code\":\"CMT-50019\"}".into(),
        };
        assert_eq!(
            err.to_string(),
            "external claim deletion failed: expected status 204, got 404: {\"code\":\"CMT-50019\"}"
        );
    }

    #[test]
    fn test_unexpected_status_message_without_body() {
        let err = ClientError::UnexpectedStatus {
            operation: "application deletion",
            expected: "204".into(),
            actual: 500,
            body: String::new(),
        };
        assert_eq!(
            err.to_string(),
            "application deletion failed: expected status 204, got 500"
        );
    }

    #[test]
    fn test_missing_field_message() {
        let err = ClientError::MissingResponseField {
            field: "Location",
            context: "POST /claim-dialects/local/claims".into(),
        };
        assert!(err.to_string().contains("'Location'"));
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err: ClientError = ConfigError::Invalid {
            key: "server.backend_url",
            reason: "empty".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "invalid config value for 'server.backend_url': empty"
        );
    }
}
