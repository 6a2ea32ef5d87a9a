//! # Metrics Collection
//!
//! Per-node relay metrics behind an injected [`RelayMetrics`] port.
//!
//! Sessions call [`RelayMetrics::session_opened`] once the node identity is
//! known and [`RelayMetrics::session_closed`] exactly once when they end.
//! [`ProxyMetrics`] owns the per-node series and keeps a node's label set
//! only while at least one session for that node is connected; a closed node
//! disappears from the next scrape. The connected gauge and plugin error
//! counters have bounded labels and go through the `metrics` facade.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::{info, warn};
use dashmap::DashMap;
use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Label used when a client never presented a node identity
pub const UNKNOWN_NODE_ID: &str = "unknown";

/// Relay events recorded per connected node.
///
/// Implementations are shared by every session and must be safe for
/// concurrent use.
pub trait RelayMetrics: Send + Sync + std::fmt::Debug {
    /// A session for `node_id` captured its node identity
    fn session_opened(&self, node_id: &str);
    /// The session for `node_id` ended; releases its label set
    fn session_closed(&self, node_id: &str);

    fn request_received(&self, node_id: &str);
    fn request_receive_failed(&self, node_id: &str);
    fn request_forwarded(&self, node_id: &str);
    fn request_forward_failed(&self, node_id: &str);

    fn response_received(&self, node_id: &str);
    fn response_receive_failed(&self, node_id: &str);
    fn response_forwarded(&self, node_id: &str);
    fn response_forward_failed(&self, node_id: &str);

    /// A plugin rejected a response of `type_url`
    fn plugin_failed(&self, type_url: &str, plugin: &str);
}

/// Point-in-time copy of one node's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCountersSnapshot {
    pub sessions: u64,
    pub requests_received: u64,
    pub requests_forwarded: u64,
    pub responses_received: u64,
    pub responses_forwarded: u64,
    pub request_receive_errors: u64,
    pub request_forward_errors: u64,
    pub response_receive_errors: u64,
    pub response_forward_errors: u64,
}

#[derive(Debug, Default)]
struct NodeCounters {
    sessions: AtomicU64,
    requests_received: AtomicU64,
    requests_forwarded: AtomicU64,
    responses_received: AtomicU64,
    responses_forwarded: AtomicU64,
    request_receive_errors: AtomicU64,
    request_forward_errors: AtomicU64,
    response_receive_errors: AtomicU64,
    response_forward_errors: AtomicU64,
}

impl NodeCounters {
    fn snapshot(&self) -> NodeCountersSnapshot {
        NodeCountersSnapshot {
            sessions: self.sessions.load(Ordering::Relaxed),
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_forwarded: self.requests_forwarded.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            responses_forwarded: self.responses_forwarded.load(Ordering::Relaxed),
            request_receive_errors: self.request_receive_errors.load(Ordering::Relaxed),
            request_forward_errors: self.request_forward_errors.load(Ordering::Relaxed),
            response_receive_errors: self.response_receive_errors.load(Ordering::Relaxed),
            response_forward_errors: self.response_forward_errors.load(Ordering::Relaxed),
        }
    }
}

type SeriesValue = fn(&NodeCountersSnapshot) -> u64;

/// Per-node counter families: name, help text, value
const NODE_SERIES: [(&str, &str, SeriesValue); 8] = [
    (
        "ads_relay_requests_received_total",
        "ADS requests received from each node",
        |s| s.requests_received,
    ),
    (
        "ads_relay_requests_received_errors_total",
        "ADS receive errors by node",
        |s| s.request_receive_errors,
    ),
    (
        "ads_relay_requests_forwarded_total",
        "ADS requests forwarded to the control plane",
        |s| s.requests_forwarded,
    ),
    (
        "ads_relay_requests_forwarded_errors_total",
        "ADS requests that failed to reach the control plane",
        |s| s.request_forward_errors,
    ),
    (
        "ads_relay_downstream_responses_received_total",
        "ADS responses received from the control plane",
        |s| s.responses_received,
    ),
    (
        "ads_relay_downstream_responses_received_errors_total",
        "ADS response errors received from the control plane",
        |s| s.response_receive_errors,
    ),
    (
        "ads_relay_responses_forwarded_total",
        "ADS responses forwarded to each node",
        |s| s.responses_forwarded,
    ),
    (
        "ads_relay_responses_forwarded_errors_total",
        "ADS response forwarding errors per node",
        |s| s.response_forward_errors,
    ),
];

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Default [`RelayMetrics`] implementation.
#[derive(Debug, Default)]
pub struct ProxyMetrics {
    nodes: DashMap<String, NodeCounters>,
    connected: AtomicI64,
    plugin_errors: DashMap<(String, String), AtomicU64>,
}

impl ProxyMetrics {
    /// Create an empty metrics registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently connected
    pub fn connected_sessions(&self) -> i64 {
        self.connected.load(Ordering::Relaxed)
    }

    /// Counters for `node_id`, if any session for it is connected
    pub fn node_snapshot(&self, node_id: &str) -> Option<NodeCountersSnapshot> {
        self.nodes.get(node_id).map(|counters| counters.snapshot())
    }

    /// Number of nodes with a live label set
    pub fn tracked_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Errors recorded for a (type URL, plugin) pair
    pub fn plugin_error_count(&self, type_url: &str, plugin: &str) -> u64 {
        self.plugin_errors
            .get(&(type_url.to_string(), plugin.to_string()))
            .map(|count| count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render the live per-node series in the Prometheus text format.
    ///
    /// Only nodes with a connected session appear. `service` is added as a
    /// label to every sample when given.
    pub fn render_node_series(&self, service: Option<&str>) -> String {
        let mut nodes: Vec<(String, NodeCountersSnapshot)> = self
            .nodes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        if nodes.is_empty() {
            return String::new();
        }
        nodes.sort_by(|a, b| a.0.cmp(&b.0));

        let service_label = service
            .map(|service| format!("service=\"{}\",", escape_label_value(service)))
            .unwrap_or_default();

        let mut out = String::new();
        for (name, help, value) in NODE_SERIES {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            for (node_id, snapshot) in &nodes {
                let _ = writeln!(
                    out,
                    "{}{{{}node=\"{}\"}} {}",
                    name,
                    service_label,
                    escape_label_value(node_id),
                    value(snapshot)
                );
            }
            out.push('\n');
        }
        out
    }

    fn bump(&self, node_id: &str, field: fn(&NodeCounters) -> &AtomicU64) {
        if let Some(counters) = self.nodes.get(node_id) {
            field(&counters).fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl RelayMetrics for ProxyMetrics {
    fn session_opened(&self, node_id: &str) {
        self.nodes
            .entry(node_id.to_string())
            .or_default()
            .sessions
            .fetch_add(1, Ordering::Relaxed);
        let connected = self.connected.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("ads_relay_clients_connected").set(connected as f64);
    }

    fn session_closed(&self, node_id: &str) {
        let released = self
            .nodes
            .remove_if(node_id, |_, counters| {
                counters.sessions.fetch_sub(1, Ordering::Relaxed) == 1
            })
            .is_some();
        if released {
            ::tracing::debug!(node_id = %node_id, "Released per-node metric labels");
        }
        let connected = self.connected.fetch_sub(1, Ordering::Relaxed) - 1;
        gauge!("ads_relay_clients_connected").set(connected as f64);
    }

    fn request_received(&self, node_id: &str) {
        self.bump(node_id, |c| &c.requests_received);
    }

    fn request_receive_failed(&self, node_id: &str) {
        self.bump(node_id, |c| &c.request_receive_errors);
    }

    fn request_forwarded(&self, node_id: &str) {
        self.bump(node_id, |c| &c.requests_forwarded);
    }

    fn request_forward_failed(&self, node_id: &str) {
        self.bump(node_id, |c| &c.request_forward_errors);
    }

    fn response_received(&self, node_id: &str) {
        self.bump(node_id, |c| &c.responses_received);
    }

    fn response_receive_failed(&self, node_id: &str) {
        self.bump(node_id, |c| &c.response_receive_errors);
    }

    fn response_forwarded(&self, node_id: &str) {
        self.bump(node_id, |c| &c.responses_forwarded);
    }

    fn response_forward_failed(&self, node_id: &str) {
        self.bump(node_id, |c| &c.response_forward_errors);
    }

    fn plugin_failed(&self, type_url: &str, plugin: &str) {
        self.plugin_errors
            .entry((type_url.to_string(), plugin.to_string()))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
        let labels = [("type", type_url.to_string()), ("plugin", plugin.to_string())];
        counter!("ads_relay_plugin_apply_errors_total", &labels).increment(1);
    }
}

/// Register descriptions for the metrics recorded through the facade.
pub fn describe_relay_metrics() {
    describe_gauge!(
        "ads_relay_clients_connected",
        Unit::Count,
        "Number of clients connected to the relay"
    );
    describe_counter!(
        "ads_relay_plugin_apply_errors_total",
        Unit::Count,
        "Errors returned per plugin when applied to an ADS response"
    );
}

/// Install the Prometheus recorder for the facade metrics.
///
/// Returns `None` when metrics are disabled or no port is configured. The
/// handle is served together with the per-node series by
/// [`super::exporter::start_metrics_exporter`].
pub fn init_metrics(config: &ObservabilityConfig) -> Result<Option<PrometheusHandle>> {
    if config.metrics_bind_address().is_none() {
        warn!("Metrics disabled: no bind address configured");
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .add_global_label("service", &config.service_name)
        .install_recorder()
        .map_err(|e| Error::config(format!("Failed to initialize metrics recorder: {}", e)))?;

    describe_relay_metrics();

    info!(service_name = %config.service_name, "Metrics collection initialized");

    Ok(Some(handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_session_lifecycle_releases_labels() {
        let metrics = ProxyMetrics::new();

        metrics.session_opened("node-a");
        metrics.request_received("node-a");
        metrics.request_forwarded("node-a");
        metrics.response_received("node-a");
        metrics.response_forwarded("node-a");

        let snapshot = metrics.node_snapshot("node-a").unwrap();
        assert_eq!(snapshot.sessions, 1);
        assert_eq!(snapshot.requests_received, 1);
        assert_eq!(snapshot.responses_forwarded, 1);
        assert_eq!(metrics.connected_sessions(), 1);

        metrics.session_closed("node-a");
        assert!(metrics.node_snapshot("node-a").is_none());
        assert_eq!(metrics.connected_sessions(), 0);
    }

    #[test]
    fn test_labels_survive_until_last_session_for_node_closes() {
        let metrics = ProxyMetrics::new();

        metrics.session_opened("node-a");
        metrics.session_opened("node-a");
        metrics.session_closed("node-a");
        assert_eq!(metrics.node_snapshot("node-a").unwrap().sessions, 1);

        metrics.session_closed("node-a");
        assert!(metrics.node_snapshot("node-a").is_none());
        assert_eq!(metrics.tracked_nodes(), 0);
    }

    #[test]
    fn test_events_for_untracked_node_are_ignored_locally() {
        let metrics = ProxyMetrics::new();
        metrics.request_received("ghost");
        assert!(metrics.node_snapshot("ghost").is_none());
    }

    #[test]
    fn test_plugin_errors_by_type_and_plugin() {
        let metrics = ProxyMetrics::new();
        let listener = "type.googleapis.com/envoy.config.listener.v3.Listener";

        metrics.plugin_failed(listener, "grpc_json_transcoder");
        metrics.plugin_failed(listener, "grpc_json_transcoder");
        metrics.plugin_failed(listener, "log");

        assert_eq!(metrics.plugin_error_count(listener, "grpc_json_transcoder"), 2);
        assert_eq!(metrics.plugin_error_count(listener, "log"), 1);
        assert_eq!(metrics.plugin_error_count("other", "log"), 0);
    }

    #[test]
    fn test_concurrent_sessions() {
        let metrics = Arc::new(ProxyMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    let node = format!("node-{}", i % 2);
                    for _ in 0..100 {
                        metrics.session_opened(&node);
                        metrics.request_received(&node);
                        metrics.session_closed(&node);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.connected_sessions(), 0);
        assert_eq!(metrics.tracked_nodes(), 0);
    }

    #[test]
    fn test_init_metrics_disabled() {
        let config = ObservabilityConfig { enable_metrics: false, ..Default::default() };
        assert!(init_metrics(&config).unwrap().is_none());
    }
}
