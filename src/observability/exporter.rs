//! Prometheus scrape endpoint.
//!
//! Serves the facade metrics from the installed recorder followed by the
//! live per-node series from [`ProxyMetrics`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::metrics::ProxyMetrics;
use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// Renders one scrape.
pub struct MetricsExporter {
    handle: PrometheusHandle,
    nodes: Arc<ProxyMetrics>,
    service: String,
}

impl MetricsExporter {
    pub fn new(handle: PrometheusHandle, nodes: Arc<ProxyMetrics>, service: impl Into<String>) -> Self {
        Self { handle, nodes, service: service.into() }
    }

    /// Full exposition body
    pub fn render(&self) -> String {
        let mut body = self.handle.render();
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        body.push_str(&self.nodes.render_node_series(Some(&self.service)));
        body
    }

    fn respond(&self, request: &Request<Incoming>) -> Response<Full<Bytes>> {
        if request.uri().path() != "/metrics" {
            let mut response = Response::new(Full::new(Bytes::from_static(b"not found\n")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            return response;
        }

        let mut response = Response::new(Full::new(Bytes::from(self.render())));
        response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
        response
    }

    /// Accept scrapes on `listener` until the task is dropped.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "failed to accept metrics connection");
                    continue;
                }
            };

            let exporter = Arc::clone(&self);
            tokio::spawn(async move {
                let service = service_fn(move |request: Request<Incoming>| {
                    let exporter = Arc::clone(&exporter);
                    async move { Ok::<_, Infallible>(exporter.respond(&request)) }
                });

                if let Err(e) =
                    http1::Builder::new().serve_connection(TokioIo::new(stream), service).await
                {
                    debug!(peer = %peer, error = %e, "metrics connection closed with error");
                }
            });
        }
    }
}

/// Bind the scrape endpoint and serve it on a background task.
pub async fn start_metrics_exporter(
    config: &ObservabilityConfig,
    handle: PrometheusHandle,
    nodes: Arc<ProxyMetrics>,
) -> Result<Option<JoinHandle<()>>> {
    let Some(metrics_addr) = config.metrics_bind_address() else {
        return Ok(None);
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    let listener = TcpListener::bind(socket_addr).await.map_err(|e| {
        Error::transport(format!("Metrics exporter failed to bind to {}: {}", socket_addr, e))
    })?;

    info!(metrics_addr = %socket_addr, "Prometheus exporter listening");

    let exporter = Arc::new(MetricsExporter::new(handle, nodes, config.service_name.clone()));
    Ok(Some(tokio::spawn(exporter.serve(listener))))
}
