//! Outbound leg: the ADS stream to the real control plane.

use std::pin::Pin;

use envoy_types::pb::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use http::uri::PathAndQuery;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::client::Grpc;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tracing::debug;

use crate::config::ProxyConfig;
use crate::errors::{Error, Result};

const STREAM_AGGREGATED_RESOURCES_PATH: &str =
    "/envoy.service.discovery.v3.AggregatedDiscoveryService/StreamAggregatedResources";

/// Responses coming back from the control plane
pub type ResponseStream =
    Pin<Box<dyn Stream<Item = std::result::Result<DiscoveryResponse, Status>> + Send>>;

/// Something that can open an ADS stream on behalf of a relayed session.
#[tonic::async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// Open a stream fed by `requests`.
    ///
    /// Resolves once the control plane has accepted the call.
    async fn open_stream(
        &self,
        requests: ReceiverStream<DiscoveryRequest>,
    ) -> std::result::Result<ResponseStream, Status>;

    /// Address used in logs
    fn address(&self) -> &str;
}

/// ADS over a shared tonic channel.
///
/// The channel connects lazily, so dial failures show up when a session
/// opens its stream, not at startup.
#[derive(Debug, Clone)]
pub struct GrpcControlPlane {
    channel: Channel,
    address: String,
}

impl GrpcControlPlane {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let uri = config.downstream_uri();
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| Error::config(format!("Invalid downstream address '{}': {}", uri, e)))?
            .connect_timeout(config.connect_timeout());

        Ok(Self { channel: endpoint.connect_lazy(), address: config.downstream_address.clone() })
    }
}

#[tonic::async_trait]
impl ControlPlane for GrpcControlPlane {
    async fn open_stream(
        &self,
        requests: ReceiverStream<DiscoveryRequest>,
    ) -> std::result::Result<ResponseStream, Status> {
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready().await.map_err(|e| {
            Status::unavailable(format!("control plane {} is not reachable: {}", self.address, e))
        })?;

        debug!(address = %self.address, "opening ADS stream to control plane");

        let codec = tonic_prost::ProstCodec::<DiscoveryRequest, DiscoveryResponse>::default();
        let path = PathAndQuery::from_static(STREAM_AGGREGATED_RESOURCES_PATH);
        let response = grpc.streaming(tonic::Request::new(requests), path, codec).await?;

        Ok(Box::pin(response.into_inner()))
    }

    fn address(&self) -> &str {
        &self.address
    }
}
