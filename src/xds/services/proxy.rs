use std::pin::Pin;
use std::sync::Arc;

use envoy_types::pb::envoy::service::discovery::v3::{
    aggregated_discovery_service_server::AggregatedDiscoveryService, DeltaDiscoveryRequest,
    DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::debug;

use super::control_plane::ControlPlane;
use super::relay::{RequestStream, StreamRelay};
use crate::observability::RelayMetrics;
use crate::xds::plugins::PluginPipeline;

/// ADS endpoint that relays every session to the upstream control plane.
#[derive(Clone)]
pub struct AdsProxyService {
    control_plane: Arc<dyn ControlPlane>,
    pipeline: Arc<PluginPipeline>,
    metrics: Arc<dyn RelayMetrics>,
    shutdown: CancellationToken,
}

impl AdsProxyService {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        pipeline: Arc<PluginPipeline>,
        metrics: Arc<dyn RelayMetrics>,
    ) -> Self {
        Self { control_plane, pipeline, metrics, shutdown: CancellationToken::new() }
    }

    /// Sessions are drained when `shutdown` is cancelled
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for AdsProxyService {
    type StreamAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DiscoveryResponse, Status>> + Send>>;
    type DeltaAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DeltaDiscoveryResponse, Status>> + Send>>;

    async fn stream_aggregated_resources(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        let peer = request
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        debug!(peer = %peer, "new ADS stream");

        let inbound: RequestStream = Box::pin(request.into_inner());
        let relay = StreamRelay::new(
            Arc::clone(&self.control_plane),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.metrics),
        )
        .with_shutdown(self.shutdown.child_token());

        Ok(Response::new(Box::pin(relay.spawn(inbound, &peer))))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(Status::unimplemented("delta ADS is not supported by the relay"))
    }
}
