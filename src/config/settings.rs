//! # Configuration Settings
//!
//! Defines the configuration structure for the ADS relay.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Proxy (listen + control plane) configuration
    #[validate(nested)]
    pub proxy: ProxyConfig,

    /// gRPC-JSON transcoder plugin configuration
    #[validate(nested)]
    pub transcoder: TranscoderSettings,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load every section from `ADS_RELAY_*` environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            proxy: ProxyConfig::from_env()?,
            transcoder: TranscoderSettings::from_env(),
            observability: ObservabilityConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        self.validate_custom()?;

        Ok(())
    }

    /// Cross-field checks the validator derive cannot express
    fn validate_custom(&self) -> Result<()> {
        let listen = self.proxy.listen_socket_addr()?;

        if self.observability.enable_metrics && listen.port() == self.observability.metrics_port {
            return Err(Error::validation("Listen and metrics ports cannot be the same"));
        }

        if self.transcoder.descriptor_path.is_some() && self.transcoder.proto_services.is_empty()
        {
            return Err(Error::validation_field(
                "A descriptor set was given but no proto services to transcode",
                "proto_services",
            ));
        }

        if self.transcoder.descriptor_path.is_none() && !self.transcoder.proto_services.is_empty()
        {
            return Err(Error::validation_field(
                "Proto services were given without a descriptor set",
                "descriptor_path",
            ));
        }

        Ok(())
    }
}

/// Relay listen/dial configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProxyConfig {
    /// Address of the upstream control plane we relay to (`host:port` or URI)
    #[validate(length(min = 1, message = "Downstream address cannot be empty"))]
    pub downstream_address: String,

    /// Address the relay listens on for Envoy connections
    #[validate(length(min = 1, message = "Listen address cannot be empty"))]
    pub listen_address: String,

    /// Dial timeout for the control plane connection in seconds
    #[validate(range(
        min = 1,
        max = 300,
        message = "Connect timeout must be between 1 and 300 seconds"
    ))]
    pub connect_timeout_seconds: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            downstream_address: "istiod.istio-system.svc:15010".to_string(),
            listen_address: "0.0.0.0:29000".to_string(),
            connect_timeout_seconds: 10,
        }
    }
}

impl ProxyConfig {
    /// Create ProxyConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let downstream_address =
            std::env::var("ADS_RELAY_DOWNSTREAM").unwrap_or(defaults.downstream_address);

        let listen_address = std::env::var("ADS_RELAY_LISTEN").unwrap_or(defaults.listen_address);

        let connect_timeout_seconds = match std::env::var("ADS_RELAY_CONNECT_TIMEOUT_SECONDS") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| {
                Error::config(format!("Invalid ADS_RELAY_CONNECT_TIMEOUT_SECONDS '{}': {}", raw, e))
            })?,
            Err(_) => defaults.connect_timeout_seconds,
        };

        Ok(Self { downstream_address, listen_address, connect_timeout_seconds })
    }

    /// Control plane address as a URI tonic can dial.
    ///
    /// Bare `host:port` addresses are treated as plaintext HTTP/2.
    pub fn downstream_uri(&self) -> String {
        if self.downstream_address.contains("://") {
            self.downstream_address.clone()
        } else {
            format!("http://{}", self.downstream_address)
        }
    }

    /// Parse the listen address.
    ///
    /// A bare `:port` listens on every interface.
    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        let raw = if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        };

        raw.parse().map_err(|e| {
            Error::config(format!("Invalid listen address '{}': {}", self.listen_address, e))
        })
    }

    /// Get the dial timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// Settings for the gRPC-JSON transcoder plugin.
///
/// The plugin is enabled only when a descriptor path is configured.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct TranscoderSettings {
    /// Envoy clusters (workloads) whose listeners get the transcoder filter
    pub target_clusters: Vec<String>,

    /// Fully-qualified proto service names the filter transcodes
    pub proto_services: Vec<String>,

    /// Path to a serialized `FileDescriptorSet`
    pub descriptor_path: Option<PathBuf>,
}

impl TranscoderSettings {
    /// Create TranscoderSettings from environment variables
    pub fn from_env() -> Self {
        Self {
            target_clusters: env_list("ADS_RELAY_TARGET_CLUSTERS"),
            proto_services: env_list("ADS_RELAY_PROTO_SERVICES"),
            descriptor_path: std::env::var("ADS_RELAY_DESCRIPTOR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Whether the transcoder plugin should be registered
    pub fn is_enabled(&self) -> bool {
        self.descriptor_path.is_some()
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Service name attached to logs and metrics
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Enable the Prometheus exporter
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "ads-relay".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
            enable_metrics: true,
            metrics_port: 9090,
        }
    }
}

impl ObservabilityConfig {
    /// Create ObservabilityConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let service_name =
            std::env::var("ADS_RELAY_SERVICE_NAME").unwrap_or(defaults.service_name);

        let log_level = std::env::var("ADS_RELAY_LOG_LEVEL").unwrap_or(defaults.log_level);

        let json_logging = std::env::var("ADS_RELAY_JSON_LOGS")
            .map(|s| s.to_lowercase() == "true" || s == "1")
            .unwrap_or(defaults.json_logging);

        let enable_metrics = std::env::var("ADS_RELAY_ENABLE_METRICS")
            .map(|s| s.to_lowercase() == "true" || s == "1")
            .unwrap_or(defaults.enable_metrics);

        let metrics_port = match std::env::var("ADS_RELAY_METRICS_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|e| {
                Error::config(format!("Invalid ADS_RELAY_METRICS_PORT '{}': {}", raw, e))
            })?,
            Err(_) => defaults.metrics_port,
        };

        Ok(Self { service_name, log_level, json_logging, enable_metrics, metrics_port })
    }

    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if !self.enable_metrics || self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

/// Read a comma separated list, skipping blanks
fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|raw| {
            raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.transcoder.is_enabled());
    }

    #[test]
    fn test_downstream_uri_adds_scheme() {
        let mut proxy = ProxyConfig::default();
        assert_eq!(proxy.downstream_uri(), "http://istiod.istio-system.svc:15010");

        proxy.downstream_address = "https://cp.example.com:443".to_string();
        assert_eq!(proxy.downstream_uri(), "https://cp.example.com:443");
    }

    #[test]
    fn test_listen_address_parsing() {
        let mut proxy = ProxyConfig { listen_address: ":29000".to_string(), ..Default::default() };
        assert_eq!(proxy.listen_socket_addr().unwrap().to_string(), "0.0.0.0:29000");

        proxy.listen_address = "127.0.0.1:18000".to_string();
        assert_eq!(proxy.listen_socket_addr().unwrap().port(), 18000);

        proxy.listen_address = "not-an-address".to_string();
        assert!(proxy.listen_socket_addr().is_err());
    }

    #[test]
    fn test_metrics_bind_address() {
        let mut config = ObservabilityConfig::default();
        assert_eq!(config.metrics_bind_address().as_deref(), Some("0.0.0.0:9090"));

        config.metrics_port = 0;
        assert!(config.metrics_bind_address().is_none());

        config.metrics_port = 9090;
        config.enable_metrics = false;
        assert!(config.metrics_bind_address().is_none());
    }

    #[test]
    fn test_config_validation_errors() {
        let mut config = AppConfig::default();
        config.proxy.listen_address = "0.0.0.0:9090".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.observability.service_name = String::new();
        assert!(matches!(config.validate(), Err(Error::Validation { .. })));

        let mut config = AppConfig::default();
        config.proxy.connect_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transcoder_requires_descriptor_and_services() {
        let mut config = AppConfig::default();
        config.transcoder.descriptor_path = Some(PathBuf::from("/tmp/descriptor.pb"));
        assert!(config.validate().is_err());

        config.transcoder.proto_services = vec!["pkg.v1.Svc".to_string()];
        assert!(config.validate().is_ok());
        assert!(config.transcoder.is_enabled());

        config.transcoder.descriptor_path = None;
        assert!(config.validate().is_err());
    }
}
