//! gRPC server hosting the relayed ADS endpoint

use std::future::Future;
use std::sync::Arc;

use envoy_types::pb::envoy::service::discovery::v3::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::info;

use crate::config::ProxyConfig;
use crate::errors::{Error, Result};
use crate::observability::RelayMetrics;
use crate::xds::plugins::PluginPipeline;
use crate::xds::services::{AdsProxyService, ControlPlane, GrpcControlPlane};

/// Start the relay on `config.listen_address` and serve until
/// `shutdown_signal` resolves.
pub async fn start_proxy_server<F>(
    config: &ProxyConfig,
    pipeline: Arc<PluginPipeline>,
    metrics: Arc<dyn RelayMetrics>,
    shutdown_signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.listen_socket_addr()?;
    let control_plane: Arc<dyn ControlPlane> = Arc::new(GrpcControlPlane::new(config)?);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        Error::transport(format!(
            "ADS relay failed to bind to {}: {}. Please use a different address or stop the existing service.",
            addr, e
        ))
    })?;

    serve_with_listener(listener, control_plane, pipeline, metrics, shutdown_signal).await
}

/// Serve the relay on an already bound listener.
///
/// On shutdown every live session is drained before the server returns.
pub async fn serve_with_listener<F>(
    listener: TcpListener,
    control_plane: Arc<dyn ControlPlane>,
    pipeline: Arc<PluginPipeline>,
    metrics: Arc<dyn RelayMetrics>,
    shutdown_signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener
        .local_addr()
        .map_err(|e| Error::io(e, "Failed to read relay listener address"))?;

    info!(
        address = %local_addr,
        downstream = %control_plane.address(),
        plugins = ?pipeline,
        "ADS relay listening"
    );

    let sessions = CancellationToken::new();
    let service =
        AdsProxyService::new(control_plane, pipeline, metrics).with_shutdown(sessions.clone());

    let shutdown = async move {
        shutdown_signal.await;
        info!("Shutdown requested, draining ADS sessions");
        sessions.cancel();
    };

    Server::builder()
        .add_service(AggregatedDiscoveryServiceServer::new(service))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .map_err(|e| Error::transport(format!("ADS relay server failed: {}", e)))?;

    info!("ADS relay stopped");
    Ok(())
}
