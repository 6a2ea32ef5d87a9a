//! Duplex relay for a single ADS session.
//!
//! A session moves through `Opening → Streaming → Draining → Closed`:
//!
//! - **Opening**: read the first request from the client, capture its node,
//!   queue the request on the outbound hand-off and open the control-plane
//!   stream. A failed open ends only this session, with `UNAVAILABLE`.
//! - **Streaming**: two pumps run concurrently. Requests flow to the control
//!   plane untouched; responses are classified and passed through the plugin
//!   pipeline before reaching the client. The directions are independent,
//!   nothing assumes one response per request.
//! - **Draining**: the first pump to stop (EOF, cancellation, transport
//!   error) fires the session token so the other one unwinds too.
//! - **Closed**: both legs are dropped and the node's metric labels are
//!   released.
//!
//! Each direction hands off through a single-slot channel, so a slow reader
//! on either side stalls the opposite writer instead of queueing.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};
use tracing::{debug, info, warn, Instrument, Span};

use super::control_plane::{ControlPlane, ResponseStream};
use crate::errors::Error;
use crate::observability::{RelayMetrics, UNKNOWN_NODE_ID};
use crate::xds::plugins::PluginPipeline;
use crate::xds::resources::classify;

/// Requests arriving from the Envoy client
pub type RequestStream =
    Pin<Box<dyn Stream<Item = std::result::Result<DiscoveryRequest, Status>> + Send>>;

/// Items delivered to the Envoy client
pub type ClientItem = std::result::Result<DiscoveryResponse, Status>;

/// How a session ended.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// EOF or cancellation on either leg
    Completed,
    /// The control plane stream could not be opened
    Unavailable(Status),
    /// The control plane leg failed mid-stream
    ControlPlaneFailed(Status),
    /// The client leg failed mid-stream
    ClientFailed(Status),
}

impl SessionOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, SessionOutcome::Completed)
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Completed => f.write_str("completed"),
            SessionOutcome::Unavailable(s) => write!(f, "control plane unavailable: {}", s.message()),
            SessionOutcome::ControlPlaneFailed(s) => write!(f, "control plane failed: {}", s.message()),
            SessionOutcome::ClientFailed(s) => write!(f, "client failed: {}", s.message()),
        }
    }
}

/// Why a pump stopped
enum PumpEnd {
    Eof,
    Cancelled,
    Failed(Status),
}

fn is_cancellation(status: &Status) -> bool {
    status.code() == Code::Cancelled
}

/// State captured from the first request and shared by both pumps.
struct Session {
    node: Node,
    node_id: String,
    cancel: CancellationToken,
    pipeline: Arc<PluginPipeline>,
    metrics: Arc<dyn RelayMetrics>,
}

/// Relays one client session to the control plane.
pub struct StreamRelay {
    control_plane: Arc<dyn ControlPlane>,
    pipeline: Arc<PluginPipeline>,
    metrics: Arc<dyn RelayMetrics>,
    shutdown: CancellationToken,
}

impl StreamRelay {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        pipeline: Arc<PluginPipeline>,
        metrics: Arc<dyn RelayMetrics>,
    ) -> Self {
        Self { control_plane, pipeline, metrics, shutdown: CancellationToken::new() }
    }

    /// Tie the session to a parent token; cancelling it drains the session.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run the session on its own task and return the client-facing stream.
    pub fn spawn(self, inbound: RequestStream, peer: &str) -> ReceiverStream<ClientItem> {
        let (client_tx, client_rx) = mpsc::channel(1);
        let span = crate::ads_session_span!(peer, downstream = %self.control_plane.address());

        tokio::spawn(self.run(inbound, client_tx).instrument(span));

        ReceiverStream::new(client_rx)
    }

    /// Drive the session to completion.
    ///
    /// Items for the client go to `client_tx`; a terminal error status is
    /// sent as the last item when the control plane side fails.
    pub async fn run(
        self,
        mut inbound: RequestStream,
        client_tx: mpsc::Sender<ClientItem>,
    ) -> SessionOutcome {
        let cancel = self.shutdown.child_token();

        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionOutcome::Completed,
            first = inbound.next() => first,
        };

        let first = match first {
            None => {
                debug!("client closed before sending a request");
                return SessionOutcome::Completed;
            }
            Some(Err(status)) if is_cancellation(&status) => return SessionOutcome::Completed,
            Some(Err(status)) => {
                warn!(code = ?status.code(), error = %status.message(), "failed to read first request");
                return SessionOutcome::ClientFailed(status);
            }
            Some(Ok(request)) => request,
        };

        let node = first.node.clone().unwrap_or_default();
        let node_id = if node.id.is_empty() { UNKNOWN_NODE_ID.to_string() } else { node.id.clone() };
        Span::current().record("node_id", node_id.as_str());

        self.metrics.session_opened(&node_id);
        self.metrics.request_received(&node_id);
        info!(node_cluster = %node.cluster, "ADS session opened");

        let session = Session {
            node,
            node_id,
            cancel,
            pipeline: Arc::clone(&self.pipeline),
            metrics: Arc::clone(&self.metrics),
        };

        let outcome = self.stream(&session, first, inbound, client_tx).await;

        session.metrics.session_closed(&session.node_id);
        match &outcome {
            SessionOutcome::Completed => info!("ADS session closed"),
            other => warn!(outcome = %other, "ADS session closed with error"),
        }
        outcome
    }

    async fn stream(
        &self,
        session: &Session,
        first: DiscoveryRequest,
        inbound: RequestStream,
        client_tx: mpsc::Sender<ClientItem>,
    ) -> SessionOutcome {
        let (request_tx, request_rx) = mpsc::channel::<DiscoveryRequest>(1);

        // The slot is empty and the receiver is alive, so this cannot block.
        if request_tx.send(first).await.is_err() {
            session.metrics.request_forward_failed(&session.node_id);
            return SessionOutcome::Completed;
        }
        session.metrics.request_forwarded(&session.node_id);

        let opened = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => return SessionOutcome::Completed,
            opened = self.control_plane.open_stream(ReceiverStream::new(request_rx)) => opened,
        };

        let downstream = match opened {
            Ok(downstream) => downstream,
            Err(status) => {
                let status = Status::unavailable(format!(
                    "control plane {} unavailable: {}",
                    self.control_plane.address(),
                    status.message()
                ));
                warn!(error = %status.message(), "failed to open control plane stream");
                let _ = client_tx.send(Err(status.clone())).await;
                return SessionOutcome::Unavailable(status);
            }
        };

        debug!("control plane stream opened");

        let (request_end, response_end) = tokio::join!(
            request_pump(session, inbound, request_tx),
            response_pump(session, downstream, client_tx),
        );

        match (request_end, response_end) {
            (_, PumpEnd::Failed(status)) => SessionOutcome::ControlPlaneFailed(status),
            (PumpEnd::Failed(status), _) => SessionOutcome::ClientFailed(status),
            _ => SessionOutcome::Completed,
        }
    }
}

/// Client → control plane. Requests are forwarded unmodified.
async fn request_pump(
    session: &Session,
    mut inbound: RequestStream,
    request_tx: mpsc::Sender<DiscoveryRequest>,
) -> PumpEnd {
    let node_id = session.node_id.as_str();

    let end = loop {
        let next = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => break PumpEnd::Cancelled,
            next = inbound.next() => next,
        };

        let request = match next {
            None => {
                debug!("client closed request stream");
                break PumpEnd::Eof;
            }
            Some(Err(status)) if is_cancellation(&status) => break PumpEnd::Cancelled,
            Some(Err(status)) => {
                session.metrics.request_receive_failed(node_id);
                warn!(code = ?status.code(), error = %status.message(), "error reading from client");
                break PumpEnd::Failed(status);
            }
            Some(Ok(request)) => request,
        };
        session.metrics.request_received(node_id);

        let sent = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => break PumpEnd::Cancelled,
            sent = request_tx.send(request) => sent,
        };

        if sent.is_err() {
            session.metrics.request_forward_failed(node_id);
            debug!("control plane stopped accepting requests");
            break PumpEnd::Eof;
        }
        session.metrics.request_forwarded(node_id);
    };

    // Dropping the sender half-closes the control plane stream.
    drop(request_tx);
    session.cancel.cancel();
    end
}

/// Control plane → plugins → client.
async fn response_pump(
    session: &Session,
    mut downstream: ResponseStream,
    client_tx: mpsc::Sender<ClientItem>,
) -> PumpEnd {
    let node_id = session.node_id.as_str();

    let end = loop {
        let next = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => break PumpEnd::Cancelled,
            _ = client_tx.closed() => break PumpEnd::Cancelled,
            next = downstream.next() => next,
        };

        let response = match next {
            None => {
                info!("control plane closed the stream");
                break PumpEnd::Eof;
            }
            Some(Err(status)) if is_cancellation(&status) => break PumpEnd::Cancelled,
            Some(Err(status)) => {
                session.metrics.response_receive_failed(node_id);
                warn!(code = ?status.code(), error = %status.message(), "error reading from control plane");
                tokio::select! {
                    biased;
                    _ = session.cancel.cancelled() => {}
                    _ = client_tx.send(Err(status.clone())) => {}
                }
                break PumpEnd::Failed(status);
            }
            Some(Ok(response)) => response,
        };
        session.metrics.response_received(node_id);

        let type_url = response.type_url.clone();
        let kind = classify(&type_url);

        let response = match session.pipeline.apply(kind, &session.node, response) {
            Ok(response) => response,
            Err(e) => {
                let plugin = match &e {
                    Error::Plugin { plugin, .. } => plugin.as_str(),
                    _ => "unknown",
                };
                session.metrics.plugin_failed(&type_url, plugin);
                warn!(type_url = %type_url, plugin = %plugin, error = %e, "plugin failed, dropping response");
                continue;
            }
        };

        let sent = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => break PumpEnd::Cancelled,
            sent = client_tx.send(Ok(response)) => sent,
        };

        if sent.is_err() {
            session.metrics.response_forward_failed(node_id);
            debug!("client went away");
            break PumpEnd::Cancelled;
        }
        session.metrics.response_forwarded(node_id);
        debug!(type_url = %type_url, kind = %kind, "response forwarded");
    };

    session.cancel.cancel();
    end
}
