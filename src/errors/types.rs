//! # Error Types
//!
//! Error taxonomy for the ADS relay using `thiserror`.

use tonic::{Code, Status};

/// Custom result type for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the ADS relay
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors (bad flags, unreadable descriptor sets, bad patterns)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Network transport errors (gRPC dial, bind, stream failures)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// A resource embedded in a discovery response could not be decoded
    #[error("Transcoder failed to decode {resource}: {message}")]
    TranscoderDecode { resource: String, message: String },

    /// A plugin rejected a discovery response
    #[error("Plugin '{plugin}' failed: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: Box<Error>,
    },

    /// Descriptor set exceeds the delivery size ceiling
    #[error("Descriptor set is too large ({size} bytes); the limit is {limit} bytes")]
    DescriptorTooLarge { size: usize, limit: usize },

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Wrap an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create a transcoder decode error for the named resource
    pub fn transcoder_decode<R: Into<String>, M: Into<String>>(resource: R, message: M) -> Self {
        Self::TranscoderDecode { resource: resource.into(), message: message.into() }
    }

    /// Attribute an error to the plugin that produced it
    pub fn plugin<P: Into<String>>(plugin: P, source: Error) -> Self {
        Self::Plugin { plugin: plugin.into(), source: Box::new(source) }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// The gRPC status code a session reports for this error
    pub fn grpc_code(&self) -> Code {
        match self {
            Error::Config { .. } | Error::Validation { .. } => Code::InvalidArgument,
            Error::DescriptorTooLarge { .. } => Code::InvalidArgument,
            Error::Transport(_) => Code::Unavailable,
            Error::Plugin { source, .. } => source.grpc_code(),
            Error::TranscoderDecode { .. } | Error::Io { .. } | Error::Internal(_) => {
                Code::Internal
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().next().map(|k| k.to_string());
        Self::Validation { message: errors.to_string(), field }
    }
}

impl From<prost::DecodeError> for Error {
    fn from(error: prost::DecodeError) -> Self {
        Self::Internal(format!("protobuf decode failed: {}", error))
    }
}

impl From<Error> for Status {
    fn from(error: Error) -> Self {
        Status::new(error.grpc_code(), error.to_string())
    }
}
