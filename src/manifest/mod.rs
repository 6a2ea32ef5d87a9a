//! # EnvoyFilter manifest generation
//!
//! Offline alternative to the relay: renders an Istio `EnvoyFilter` that
//! installs the gRPC-JSON transcoder on a workload's inbound listener.

pub mod descriptor;

pub use descriptor::{DescriptorSet, MAX_DESCRIPTOR_BYTES};

use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tracing::debug;
use validator::Validate;

use crate::errors::{Error, Result};

/// Inputs to [`generate_transcoder_manifest`].
#[derive(Debug, Clone, Validate)]
pub struct TranscoderManifestOptions {
    /// Value of the `app` workload label, also the manifest name
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service: String,

    /// Inbound port the filter attaches to
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Package prefixes to include; empty means all
    pub packages: Vec<String>,

    /// Service name patterns to include; empty means all
    pub services: Vec<String>,

    pub descriptor_path: PathBuf,
}

impl Default for TranscoderManifestOptions {
    fn default() -> Self {
        Self {
            service: "grpc-transcoder".to_string(),
            port: 80,
            packages: Vec::new(),
            services: Vec::new(),
            descriptor_path: PathBuf::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvoyFilterManifest<'a> {
    api_version: &'static str,
    kind: &'static str,
    metadata: Metadata<'a>,
    spec: EnvoyFilterSpec<'a>,
}

#[derive(Debug, Serialize)]
struct Metadata<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvoyFilterSpec<'a> {
    workload_labels: BTreeMap<&'static str, &'a str>,
    filters: Vec<FilterPatch<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FilterPatch<'a> {
    listener_match: ListenerMatch,
    insert_position: InsertPosition,
    filter_name: &'static str,
    filter_type: &'static str,
    filter_config: TranscoderFilterConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListenerMatch {
    port_number: u16,
    listener_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertPosition {
    index: &'static str,
    relative_to: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscoderFilterConfig<'a> {
    services: &'a [String],
    proto_descriptor_bin: String,
    print_options: PrintOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrintOptions {
    always_print_primitive_fields: bool,
}

/// Read the descriptor, select services and render the manifest.
pub fn generate_transcoder_manifest(options: &TranscoderManifestOptions) -> Result<String> {
    options.validate()?;

    let descriptor = DescriptorSet::load(&options.descriptor_path)?;
    descriptor.ensure_deliverable()?;

    let services = descriptor.select_services(&options.packages, &options.services)?;
    if services.is_empty() {
        return Err(Error::config(format!(
            "No services in '{}' match the requested packages and patterns",
            options.descriptor_path.display()
        )));
    }
    debug!(services = ?services, descriptor_bytes = descriptor.len(), "selected services");

    render_transcoder_manifest(&options.service, options.port, &services, descriptor.bytes())
}

/// Render the `EnvoyFilter` YAML document.
pub fn render_transcoder_manifest(
    service: &str,
    port: u16,
    proto_services: &[String],
    descriptor: &[u8],
) -> Result<String> {
    let manifest = EnvoyFilterManifest {
        api_version: "networking.istio.io/v1alpha3",
        kind: "EnvoyFilter",
        metadata: Metadata { name: service },
        spec: EnvoyFilterSpec {
            workload_labels: BTreeMap::from([("app", service)]),
            filters: vec![FilterPatch {
                listener_match: ListenerMatch { port_number: port, listener_type: "SIDECAR_INBOUND" },
                insert_position: InsertPosition { index: "BEFORE", relative_to: "envoy.router" },
                filter_name: "envoy.grpc_json_transcoder",
                filter_type: "HTTP",
                filter_config: TranscoderFilterConfig {
                    services: proto_services,
                    proto_descriptor_bin: STANDARD.encode(descriptor),
                    print_options: PrintOptions { always_print_primitive_fields: true },
                },
            }],
        },
    };

    let body = serde_yaml::to_string(&manifest)
        .map_err(|e| Error::internal(format!("Failed to render EnvoyFilter manifest: {}", e)))?;

    Ok(format!("# Generated by ads-relay gen-transcoder\n{}---\n", body))
}
