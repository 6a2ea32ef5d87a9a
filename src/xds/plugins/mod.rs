//! # Response Plugins
//!
//! A plugin receives every discovery response of the kinds it was registered
//! for, together with the node that opened the session, and returns the
//! (possibly rewritten) response to forward to the client.
//!
//! Plugins are registered explicitly on a [`PluginPipelineBuilder`] by the
//! entry point and shared read-only by every session.

pub mod log;
pub mod pipeline;
pub mod transcoder;

pub use log::LogPlugin;
pub use pipeline::{PluginPipeline, PluginPipelineBuilder};
pub use transcoder::TranscoderPlugin;

use crate::errors::Result;
use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::envoy::service::discovery::v3::DiscoveryResponse;

/// A transformation applied to discovery responses in flight.
///
/// Implementations must be safe to call concurrently from many sessions.
/// Returning an error stops the pipeline and the response is not delivered.
pub trait Plugin: Send + Sync {
    /// Stable name used in logs and metric labels
    fn name(&self) -> &str;

    fn apply(&self, node: &Node, response: DiscoveryResponse) -> Result<DiscoveryResponse>;
}
