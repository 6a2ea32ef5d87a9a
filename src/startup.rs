//! Startup sequence for the relay
//!
//! Builds the plugin pipeline from configuration, installs observability and
//! runs the server until a shutdown signal arrives.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::Result;
use crate::manifest::DescriptorSet;
use crate::observability::{
    init_observability, log_config_info, start_metrics_exporter, ProxyMetrics, RelayMetrics,
};
use crate::xds::filters::http::GrpcJsonTranscoderConfig;
use crate::xds::plugins::{LogPlugin, PluginPipeline, TranscoderPlugin};
use crate::xds::resources::ResourceKind;
use crate::xds::start_proxy_server;

/// Assemble the plugin pipeline described by `config`.
///
/// The descriptor set is loaded and decoded here so a bad file fails
/// startup instead of the first session.
pub fn build_pipeline(config: &AppConfig, log_kinds: &[ResourceKind]) -> Result<PluginPipeline> {
    let mut builder = PluginPipeline::builder();

    if !log_kinds.is_empty() {
        builder = builder.register(log_kinds.iter().copied(), Arc::new(LogPlugin))?;
    }

    if let Some(path) = &config.transcoder.descriptor_path {
        let descriptor = DescriptorSet::load(path)?;
        let settings = &config.transcoder;

        let missing = descriptor.missing_services(&settings.proto_services);
        if !missing.is_empty() {
            warn!(
                services = ?missing,
                descriptor = %path.display(),
                "proto services not found in descriptor set"
            );
        }
        if settings.target_clusters.is_empty() {
            warn!("transcoder enabled without target clusters; no listener will be changed");
        }

        let transcoder = GrpcJsonTranscoderConfig::new(
            settings.proto_services.clone(),
            descriptor.into_bytes(),
        );
        let plugin = TranscoderPlugin::new(settings.target_clusters.iter().cloned(), &transcoder)?;

        info!(
            target_clusters = ?settings.target_clusters,
            proto_services = ?settings.proto_services,
            "gRPC-JSON transcoder plugin enabled"
        );
        builder = builder.register([ResourceKind::Listener], Arc::new(plugin))?;
    }

    Ok(builder.build())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

/// Validate configuration, start observability and serve until shutdown.
pub async fn run_relay(config: AppConfig, log_kinds: &[ResourceKind]) -> Result<()> {
    config.validate()?;
    let recorder = init_observability(&config.observability)?;

    info!(app_name = crate::APP_NAME, version = crate::VERSION, "Starting ADS relay");
    log_config_info(&config);

    let pipeline = Arc::new(build_pipeline(&config, log_kinds)?);
    let nodes = Arc::new(ProxyMetrics::new());

    let exporter = match recorder {
        Some(handle) => {
            start_metrics_exporter(&config.observability, handle, Arc::clone(&nodes)).await?
        }
        None => None,
    };

    let metrics: Arc<dyn RelayMetrics> = nodes;
    let result = start_proxy_server(&config.proxy, pipeline, metrics, shutdown_signal()).await;

    if let Some(exporter) = exporter {
        exporter.abort();
    }
    result
}
