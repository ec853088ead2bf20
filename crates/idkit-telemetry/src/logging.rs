//! Subscriber setup, event names and logging macros.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::{LogFormat, TelemetryConfig, TelemetryError};

/// Install the global subscriber.
///
/// Events go to stderr; stdout carries command output. `RUST_LOG`, when set,
/// replaces the configured filter.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(config, env.as_deref())?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(config.show_targets)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .compact()
            .with_target(config.show_targets)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Filter from a `RUST_LOG` value when present and non-empty, from the
/// configured directives otherwise.
fn build_filter(config: &TelemetryConfig, env: Option<&str>) -> Result<EnvFilter, TelemetryError> {
    let directives = match env.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => value.to_string(),
        None => config.directives(),
    };
    EnvFilter::try_new(&directives).map_err(|e| TelemetryError::InvalidFilter {
        directives,
        reason: e.to_string(),
    })
}

/// Standard log event names.
pub mod events {
    /// An HTTP request completed (any status).
    pub const REQUEST_COMPLETED: &str = "request_completed";

    /// A server resource (claim, application, user) was created.
    pub const RESOURCE_CREATED: &str = "resource_created";

    /// A server resource was deleted.
    pub const RESOURCE_DELETED: &str = "resource_deleted";

    /// Members were added to or removed from a role.
    pub const ROLE_UPDATED: &str = "role_updated";

    /// The server answered with a status other than the expected one.
    pub const UNEXPECTED_STATUS: &str = "unexpected_status";

    /// An authorization flow moved to its next step.
    pub const FLOW_STEP: &str = "flow_step";

    /// The server redirected to the missing-claims prompt.
    pub const MISSING_CLAIMS_PROMPT: &str = "missing_claims_prompt";
}

/// `debug!` tagged with [`events::REQUEST_COMPLETED`].
#[macro_export]
macro_rules! log_request_completed {
    ($($field:tt)*) => {
        tracing::debug!(event = $crate::logging::events::REQUEST_COMPLETED, $($field)*)
    };
}

/// `info!` tagged with [`events::RESOURCE_CREATED`].
#[macro_export]
macro_rules! log_resource_created {
    ($($field:tt)*) => {
        tracing::info!(event = $crate::logging::events::RESOURCE_CREATED, $($field)*)
    };
}

/// `info!` tagged with [`events::RESOURCE_DELETED`].
#[macro_export]
macro_rules! log_resource_deleted {
    ($($field:tt)*) => {
        tracing::info!(event = $crate::logging::events::RESOURCE_DELETED, $($field)*)
    };
}

/// `info!` tagged with [`events::ROLE_UPDATED`].
#[macro_export]
macro_rules! log_role_updated {
    ($($field:tt)*) => {
        tracing::info!(event = $crate::logging::events::ROLE_UPDATED, $($field)*)
    };
}

/// `warn!` tagged with [`events::UNEXPECTED_STATUS`].
#[macro_export]
macro_rules! log_unexpected_status {
    ($($field:tt)*) => {
        tracing::warn!(event = $crate::logging::events::UNEXPECTED_STATUS, $($field)*)
    };
}

/// `info!` tagged with [`events::FLOW_STEP`].
#[macro_export]
macro_rules! log_flow_step {
    ($($field:tt)*) => {
        tracing::info!(event = $crate::logging::events::FLOW_STEP, $($field)*)
    };
}

/// `warn!` tagged with [`events::MISSING_CLAIMS_PROMPT`].
#[macro_export]
macro_rules! log_missing_claims_prompt {
    ($($field:tt)*) => {
        tracing::warn!(event = $crate::logging::events::MISSING_CLAIMS_PROMPT, $($field)*)
    };
}
