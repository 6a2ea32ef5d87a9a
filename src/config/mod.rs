//! # Configuration Management
//!
//! Relay configuration read from `ADS_RELAY_*` environment variables and
//! overridden by command line flags.

pub mod settings;

pub use settings::{AppConfig, ObservabilityConfig, ProxyConfig, TranscoderSettings};

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_config_from_env() {
        let _guard = ENV_MUTEX.lock().unwrap();

        env::set_var("ADS_RELAY_DOWNSTREAM", "pilot:15010");
        env::set_var("ADS_RELAY_LISTEN", "127.0.0.1:29001");
        env::set_var("ADS_RELAY_TARGET_CLUSTERS", "inventory, orders ,");
        env::set_var("ADS_RELAY_METRICS_PORT", "9191");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.proxy.downstream_address, "pilot:15010");
        assert_eq!(config.proxy.listen_address, "127.0.0.1:29001");
        assert_eq!(config.transcoder.target_clusters, vec!["inventory", "orders"]);
        assert_eq!(config.observability.metrics_port, 9191);

        env::set_var("ADS_RELAY_METRICS_PORT", "invalid");
        assert!(AppConfig::from_env().is_err());

        env::remove_var("ADS_RELAY_DOWNSTREAM");
        env::remove_var("ADS_RELAY_LISTEN");
        env::remove_var("ADS_RELAY_TARGET_CLUSTERS");
        env::remove_var("ADS_RELAY_METRICS_PORT");
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();

        env::remove_var("ADS_RELAY_DOWNSTREAM");
        env::remove_var("ADS_RELAY_LISTEN");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.proxy.listen_address, "0.0.0.0:29000");
        assert_eq!(config.proxy.downstream_address, "istiod.istio-system.svc:15010");
    }
}
