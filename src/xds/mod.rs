//! Envoy xDS relay
//!
//! Sits between Envoy and its control plane on the Aggregated Discovery
//! Service (ADS):
//! - [`services`] relays each session in both directions
//! - [`plugins`] rewrite discovery responses on their way to Envoy
//! - [`resources`] classifies responses by type URL
//! - [`helpers`] and [`filters`] edit Listener resources in place

pub mod filters;
pub mod helpers;
pub mod plugins;
pub mod resources;
pub mod server;
pub mod services;

pub use plugins::{LogPlugin, Plugin, PluginPipeline, PluginPipelineBuilder, TranscoderPlugin};
pub use resources::{classify, ResourceKind};
pub use server::{serve_with_listener, start_proxy_server};
pub use services::{AdsProxyService, ControlPlane, GrpcControlPlane, SessionOutcome, StreamRelay};
