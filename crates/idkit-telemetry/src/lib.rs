//! Logging for the idkit identity server test kit.
//!
//! Installs a `tracing` subscriber writing JSON or compact lines to stderr
//! and defines the event names the clients log under, with one `log_*!`
//! macro per event.
//!
//! ```ignore
//! use idkit_telemetry::{LogFormat, Telemetry, TelemetryConfig};
//!
//! let telemetry = Telemetry::init(
//!     TelemetryConfig::new().with_filter("debug").with_format(LogFormat::Json),
//! )?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig, UnknownLogFormat, QUIET_DEPENDENCIES};
pub use logging::events;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed, or installing failed.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("invalid log filter '{directives}': {reason}")]
    InvalidFilter { directives: String, reason: String },
}

/// Handle for the installed logging setup.
pub struct Telemetry {
    config: TelemetryConfig,
    installed: bool,
}

impl Telemetry {
    /// Install the global subscriber.
    pub fn init(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        logging::init_logging(&config)?;
        tracing::debug!(
            service = %config.service_name,
            format = %config.format,
            "logging initialized"
        );
        Ok(Self {
            config,
            installed: true,
        })
    }

    /// Handle for a process whose subscriber is set up elsewhere
    /// (test harnesses, embedding programs).
    pub fn external(config: TelemetryConfig) -> Self {
        Self {
            config,
            installed: false,
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Whether [`Telemetry::init`] installed the subscriber.
    pub fn is_installed(&self) -> bool {
        self.installed
    }
}
