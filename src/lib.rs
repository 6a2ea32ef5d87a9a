//! # ads-relay
//!
//! An interception proxy for Envoy's Aggregated Discovery Service. Envoy
//! connects to the relay as if it were the control plane; the relay opens a
//! matching stream to the real control plane and forwards traffic in both
//! directions, passing every discovery response through a pipeline of
//! plugins on the way back.
//!
//! ```text
//! Envoy ──requests──▶ StreamRelay ──requests──▶ control plane
//!   ▲                     │
//!   └──responses── PluginPipeline ◀──responses──┘
//! ```
//!
//! The bundled [`xds::TranscoderPlugin`] injects Envoy's gRPC-JSON transcoder
//! HTTP filter into the listeners of selected workloads.

pub mod cli;
pub mod config;
pub mod errors;
pub mod manifest;
pub mod observability;
pub mod startup;
pub mod xds;

pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
