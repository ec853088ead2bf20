//! Logging configuration.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Crates whose debug output drowns the kit's own events; capped at `warn`
/// unless `RUST_LOG` says otherwise.
pub const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Where log lines are meant to be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One compact line per event, for terminals.
    #[default]
    Pretty,
    /// One JSON object per event, for CI log collectors.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log format '{0}' (expected 'pretty' or 'json')")]
pub struct UnknownLogFormat(pub String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("pretty") {
            Ok(Self::Pretty)
        } else if s.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(UnknownLogFormat(s.to_string()))
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

/// How the kit logs.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Recorded on the startup event (default: "idkit").
    pub service_name: String,
    /// `EnvFilter` directives used when `RUST_LOG` is unset (default: "info").
    pub filter: String,
    pub format: LogFormat,
    /// Print the module path of each event.
    pub show_targets: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "idkit".to_string(),
            filter: "info".to_string(),
            format: LogFormat::Pretty,
            show_targets: false,
        }
    }
}

impl TelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the filter, either a bare level (`debug`) or full directives
    /// (`idkit_client=trace,info`).
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_targets(mut self, show: bool) -> Self {
        self.show_targets = show;
        self
    }

    /// Configured filter followed by a `warn` cap for each of
    /// [`QUIET_DEPENDENCIES`] the filter does not mention.
    pub fn directives(&self) -> String {
        let mut directives = vec![self.filter.clone()];
        for krate in QUIET_DEPENDENCIES {
            let mentioned = self
                .filter
                .split(',')
                .any(|d| d.trim().split('=').next() == Some(*krate));
            if !mentioned {
                directives.push(format!("{}=warn", krate));
            }
        }
        directives.join(",")
    }
}
