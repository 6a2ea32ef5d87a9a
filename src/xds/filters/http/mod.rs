//! HTTP filters the relay can inject into connection managers.

pub mod grpc_json_transcoder;

pub use grpc_json_transcoder::{
    GrpcJsonTranscoderConfig, GRPC_JSON_TRANSCODER_FILTER, GRPC_JSON_TRANSCODER_TYPE_URL,
};
