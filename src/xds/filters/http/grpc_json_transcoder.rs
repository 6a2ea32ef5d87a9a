//! gRPC-JSON transcoder HTTP filter configuration
//!
//! Builds the `HttpFilter` entry the relay injects into connection managers
//! of targeted workloads.

use crate::errors::{Error, Result};
use crate::xds::filters::any_from_message;
use envoy_types::pb::envoy::extensions::filters::http::grpc_json_transcoder::v3::{
    grpc_json_transcoder::DescriptorSet,
    GrpcJsonTranscoder,
};
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_filter::ConfigType as HttpFilterConfigType, HttpFilter,
};

/// Name the injected filter carries in the HCM filter list
pub const GRPC_JSON_TRANSCODER_FILTER: &str = "envoy.filters.http.grpc_json_transcoder";
pub const GRPC_JSON_TRANSCODER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.grpc_json_transcoder.v3.GrpcJsonTranscoder";

/// Transcoder settings: the services to expose and the descriptor set
/// describing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcJsonTranscoderConfig {
    /// Fully qualified gRPC service names, e.g. `pkg.v1.Greeter`
    pub services: Vec<String>,
    /// Serialized `FileDescriptorSet`
    pub descriptor: Vec<u8>,
}

impl GrpcJsonTranscoderConfig {
    pub fn new(services: Vec<String>, descriptor: Vec<u8>) -> Self {
        Self { services, descriptor }
    }

    fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(Error::validation_field(
                "gRPC-JSON transcoder requires at least one service",
                "services",
            ));
        }
        if self.services.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::validation_field(
                "gRPC-JSON transcoder service names must not be empty",
                "services",
            ));
        }
        if self.descriptor.is_empty() {
            return Err(Error::validation_field(
                "gRPC-JSON transcoder requires a non-empty descriptor set",
                "descriptor",
            ));
        }
        Ok(())
    }

    pub fn to_proto(&self) -> Result<GrpcJsonTranscoder> {
        self.validate()?;

        Ok(GrpcJsonTranscoder {
            descriptor_set: Some(DescriptorSet::ProtoDescriptorBin(self.descriptor.clone().into())),
            services: self.services.clone(),
            match_incoming_request_route: false,
            ..Default::default()
        })
    }

    /// Complete HCM filter entry, ready for insertion before the router.
    pub fn to_http_filter(&self) -> Result<HttpFilter> {
        let proto = self.to_proto()?;

        Ok(HttpFilter {
            name: GRPC_JSON_TRANSCODER_FILTER.to_string(),
            config_type: Some(HttpFilterConfigType::TypedConfig(any_from_message(
                GRPC_JSON_TRANSCODER_TYPE_URL,
                &proto,
            ))),
            is_optional: false,
            disabled: false,
        })
    }
}
