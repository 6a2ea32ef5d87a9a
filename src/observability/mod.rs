//! # Observability Infrastructure
//!
//! Structured logging and Prometheus metrics for the relay.

pub mod exporter;
pub mod logging;
pub mod metrics;

pub use exporter::{start_metrics_exporter, MetricsExporter};
pub use logging::{init_logging, log_config_info};
pub use metrics::{init_metrics, NodeCountersSnapshot, ProxyMetrics, RelayMetrics, UNKNOWN_NODE_ID};

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::metrics_exporter_prometheus::PrometheusHandle;
use ::tracing::info;

/// Initialize logging, then the metrics recorder when enabled.
///
/// The returned handle is `None` when metrics are disabled.
pub fn init_observability(config: &ObservabilityConfig) -> Result<Option<PrometheusHandle>> {
    init_logging(config)?;

    let handle = if config.enable_metrics { init_metrics(config)? } else { None };

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        metrics_enabled = %handle.is_some(),
        "Observability initialized successfully"
    );

    Ok(handle)
}
