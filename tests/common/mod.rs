//! Shared harness for relay integration tests
//!
//! Provides a scripted ADS control plane, a relay wired to it and an
//! Envoy-like client, all on ephemeral localhost ports.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use ads_relay::config::ProxyConfig;
use ads_relay::observability::ProxyMetrics;
use ads_relay::xds::filters::{
    any_from_message, HTTP_CONNECTION_MANAGER_FILTER, HTTP_CONNECTION_MANAGER_TYPE_URL,
};
use ads_relay::xds::resources::LISTENER_TYPE_URL;
use ads_relay::xds::services::{ControlPlane, GrpcControlPlane, ResponseStream};
use ads_relay::xds::{serve_with_listener, PluginPipeline};
use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::envoy::config::listener::v3::{filter, Filter, FilterChain, Listener};
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    HttpConnectionManager, HttpFilter,
};
use envoy_types::pb::envoy::service::discovery::v3::{
    aggregated_discovery_service_server::{
        AggregatedDiscoveryService, AggregatedDiscoveryServiceServer,
    },
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use envoy_types::pb::google::protobuf::Any;
use prost::Message;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_stream::{Stream, StreamExt};
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// Builds the control plane's answers to each request
pub type Responder =
    Arc<dyn Fn(&DiscoveryRequest) -> Vec<Result<DiscoveryResponse, Status>> + Send + Sync>;

struct MockControlPlane {
    responder: Responder,
    seen: mpsc::UnboundedSender<DiscoveryRequest>,
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for MockControlPlane {
    type StreamAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = Result<DiscoveryResponse, Status>> + Send>>;
    type DeltaAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = Result<DeltaDiscoveryResponse, Status>> + Send>>;

    async fn stream_aggregated_resources(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        let responder = Arc::clone(&self.responder);
        let seen = self.seen.clone();
        let mut inbound = request.into_inner();

        let output = async_stream::stream! {
            while let Some(Ok(request)) = inbound.next().await {
                let _ = seen.send(request.clone());
                for item in responder(&request) {
                    yield item;
                }
            }
        };

        Ok(Response::new(Box::pin(output)))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(Status::unimplemented("delta"))
    }
}

pub struct MockHandle {
    pub addr: SocketAddr,
    /// Every request the mock received, in order
    pub requests: mpsc::UnboundedReceiver<DiscoveryRequest>,
    _shutdown: oneshot::Sender<()>,
}

/// Serve a scripted control plane on 127.0.0.1:0
pub async fn start_mock_control_plane(responder: Responder) -> MockHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen, requests) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let service = MockControlPlane { responder, seen };
    tokio::spawn(async move {
        Server::builder()
            .add_service(AggregatedDiscoveryServiceServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    MockHandle { addr, requests, _shutdown: shutdown_tx }
}

pub struct RelayHandle {
    pub addr: SocketAddr,
    pub metrics: Arc<ProxyMetrics>,
    _shutdown: oneshot::Sender<()>,
}

/// Start the relay in front of `control_plane`
pub async fn start_relay(control_plane: SocketAddr, pipeline: PluginPipeline) -> RelayHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let metrics = Arc::new(ProxyMetrics::new());
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let upstream: Arc<dyn ControlPlane> = Arc::new(
        GrpcControlPlane::new(&ProxyConfig {
            downstream_address: control_plane.to_string(),
            connect_timeout_seconds: 2,
            ..Default::default()
        })
        .unwrap(),
    );

    tokio::spawn(serve_with_listener(
        listener,
        upstream,
        Arc::new(pipeline),
        metrics.clone(),
        async move {
            let _ = shutdown_rx.await;
        },
    ));

    RelayHandle { addr, metrics, _shutdown: shutdown_tx }
}

/// An ADS client standing in for Envoy
pub struct EnvoyClient {
    pub requests: mpsc::Sender<DiscoveryRequest>,
    pub responses: ResponseStream,
    _connection: GrpcControlPlane,
}

impl EnvoyClient {
    pub async fn connect(relay: SocketAddr) -> Self {
        let connection = GrpcControlPlane::new(&ProxyConfig {
            downstream_address: relay.to_string(),
            ..Default::default()
        })
        .unwrap();
        let (requests, rx) = mpsc::channel(4);
        let responses = connection.open_stream(ReceiverStream::new(rx)).await.unwrap();
        Self { requests, responses, _connection: connection }
    }

    pub async fn send(&self, request: DiscoveryRequest) {
        self.requests.send(request).await.unwrap();
    }

    /// Next item from the relay, failing the test after five seconds
    pub async fn next(&mut self) -> Option<Result<DiscoveryResponse, Status>> {
        tokio::time::timeout(Duration::from_secs(5), self.responses.next())
            .await
            .expect("timed out waiting for the relay")
    }
}

pub fn node(id: &str, cluster: &str) -> Node {
    Node { id: id.to_string(), cluster: cluster.to_string(), ..Default::default() }
}

pub fn request(node: &Node, type_url: &str) -> DiscoveryRequest {
    DiscoveryRequest { node: Some(node.clone()), type_url: type_url.to_string(), ..Default::default() }
}

/// A Listener with one HCM whose HTTP filters are named `http_filters`
pub fn listener_any(name: &str, http_filters: &[&str]) -> Any {
    let hcm = HttpConnectionManager {
        stat_prefix: name.to_string(),
        http_filters: http_filters
            .iter()
            .map(|n| HttpFilter { name: n.to_string(), ..Default::default() })
            .collect(),
        ..Default::default()
    };
    let listener = Listener {
        name: name.to_string(),
        filter_chains: vec![FilterChain {
            filters: vec![Filter {
                name: HTTP_CONNECTION_MANAGER_FILTER.to_string(),
                config_type: Some(filter::ConfigType::TypedConfig(any_from_message(
                    HTTP_CONNECTION_MANAGER_TYPE_URL,
                    &hcm,
                ))),
            }],
            ..Default::default()
        }],
        ..Default::default()
    };
    any_from_message(LISTENER_TYPE_URL, &listener)
}

/// The HTTP filters of the first HCM in a Listener resource
pub fn http_filters(resource: &Any) -> Vec<HttpFilter> {
    let listener = Listener::decode(&resource.value[..]).unwrap();
    match &listener.filter_chains[0].filters[0].config_type {
        Some(filter::ConfigType::TypedConfig(any)) => {
            HttpConnectionManager::decode(&any.value[..]).unwrap().http_filters
        }
        other => panic!("unexpected filter config: {other:?}"),
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
