//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.
//!
//! `RUST_LOG` takes precedence over the configured level so operators can
//! raise verbosity for a single module (`RUST_LOG=ads_relay::xds=debug`)
//! without touching the rest of the configuration.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Create a tracing span for one relayed ADS session.
///
/// Every session gets a fresh `session_id`; `node_id` is recorded later,
/// once the first request has been read.
///
/// ```rust,ignore
/// let span = ads_session_span!("10.0.0.7:53122");
/// span.record("node_id", "sidecar~10.0.0.7~app.default");
/// ```
#[macro_export]
macro_rules! ads_session_span {
    ($peer:expr) => {
        tracing::info_span!(
            "ads_session",
            peer = %$peer,
            session_id = %uuid::Uuid::new_v4(),
            node_id = tracing::field::Empty
        )
    };
    ($peer:expr, $($field:tt)*) => {
        tracing::info_span!(
            "ads_session",
            peer = %$peer,
            session_id = %uuid::Uuid::new_v4(),
            node_id = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Install the global `tracing` subscriber.
///
/// Fails if a subscriber is already installed or the level directive is
/// malformed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            Error::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = if config.json_logging {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        service_name = %config.observability.service_name,
        listen_address = %config.proxy.listen_address,
        downstream_address = %config.proxy.downstream_address,
        transcoder_enabled = config.transcoder.is_enabled(),
        target_clusters = ?config.transcoder.target_clusters,
        metrics_enabled = config.observability.enable_metrics,
        "ADS relay configuration"
    );
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_compile() {
        let _span = ads_session_span!("127.0.0.1:5000");
        let _span = ads_session_span!("127.0.0.1:5000", downstream = "pilot:15010");
    }
}
