//! # Command Line Interface
//!
//! `serve` runs the relay; `gen-transcoder` prints an Istio `EnvoyFilter`
//! for clusters where editing listeners in flight is not an option.
//!
//! Flags override the `ADS_RELAY_*` environment, which overrides defaults.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;
use crate::manifest::{generate_transcoder_manifest, TranscoderManifestOptions};
use crate::startup::run_relay;
use crate::xds::resources::ResourceKind;

#[derive(Parser, Debug)]
#[command(name = "ads-relay")]
#[command(about = "Envoy ADS interception proxy with response plugins")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Relay ADS sessions between Envoy and its control plane
    Serve(ServeArgs),

    /// Print an EnvoyFilter manifest installing the gRPC-JSON transcoder
    GenTranscoder(GenTranscoderArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Control plane ADS address (host:port)
    #[arg(long)]
    pub downstream: Option<String>,

    /// Address to accept Envoy connections on, e.g. :29000
    #[arg(long)]
    pub listen: Option<String>,

    /// Service name used in logs and metrics
    #[arg(long)]
    pub name: Option<String>,

    /// Envoy clusters whose listeners get the transcoder filter
    #[arg(long = "services", value_delimiter = ',')]
    pub target_clusters: Vec<String>,

    /// Fully qualified proto services to transcode (package.Service)
    #[arg(long, value_delimiter = ',')]
    pub proto_services: Vec<String>,

    /// Path to a serialized FileDescriptorSet
    #[arg(long)]
    pub descriptor: Option<PathBuf>,

    /// Log every relayed response at debug level
    #[arg(long)]
    pub log_responses: bool,

    /// Log only these resource kinds (cluster, endpoint, listener, route or cds, eds, lds, rds)
    #[arg(long, value_delimiter = ',')]
    pub log_kinds: Vec<ResourceKind>,

    /// Log level directive, e.g. info or ads_relay=debug
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Prometheus exporter port
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Do not start the Prometheus exporter
    #[arg(long)]
    pub disable_metrics: bool,
}

impl ServeArgs {
    /// Kinds the log plugin is registered for. `--log-kinds` implies logging.
    pub fn logged_kinds(&self) -> Vec<ResourceKind> {
        if !self.log_kinds.is_empty() {
            let mut kinds = self.log_kinds.clone();
            kinds.sort();
            kinds.dedup();
            kinds
        } else if self.log_responses {
            ResourceKind::KNOWN.to_vec()
        } else {
            Vec::new()
        }
    }

    /// Overlay flags that were given onto `config`
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(downstream) = &self.downstream {
            config.proxy.downstream_address = downstream.clone();
        }
        if let Some(listen) = &self.listen {
            config.proxy.listen_address = listen.clone();
        }
        if let Some(name) = &self.name {
            config.observability.service_name = name.clone();
        }
        if !self.target_clusters.is_empty() {
            config.transcoder.target_clusters = self.target_clusters.clone();
        }
        if !self.proto_services.is_empty() {
            config.transcoder.proto_services = self.proto_services.clone();
        }
        if let Some(descriptor) = &self.descriptor {
            config.transcoder.descriptor_path = Some(descriptor.clone());
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if self.json_logs {
            config.observability.json_logging = true;
        }
        if let Some(port) = self.metrics_port {
            config.observability.metrics_port = port;
        }
        if self.disable_metrics {
            config.observability.enable_metrics = false;
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct GenTranscoderArgs {
    /// Inbound port the filter attaches to
    #[arg(short, long, default_value_t = 80)]
    pub port: u16,

    /// Value of the workload's `app` label
    #[arg(short, long, default_value = "grpc-transcoder")]
    pub service: String,

    /// Proto package prefixes to include
    #[arg(long, value_delimiter = ',')]
    pub packages: Vec<String>,

    /// Regular expressions selecting service names
    #[arg(long, value_delimiter = ',')]
    pub services: Vec<String>,

    /// Path to a serialized FileDescriptorSet
    #[arg(short, long)]
    pub descriptor: PathBuf,
}

impl From<GenTranscoderArgs> for TranscoderManifestOptions {
    fn from(args: GenTranscoderArgs) -> Self {
        Self {
            service: args.service,
            port: args.port,
            packages: args.packages,
            services: args.services,
            descriptor_path: args.descriptor,
        }
    }
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let mut config = AppConfig::from_env()?;
            args.apply_to(&mut config);
            run_relay(config, &args.logged_kinds()).await?;
        }
        Commands::GenTranscoder(args) => {
            let manifest = generate_transcoder_manifest(&args.into())?;
            print!("{}", manifest);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from([
            "ads-relay",
            "serve",
            "--downstream",
            "istiod:15010",
            "--listen",
            ":29000",
            "--services",
            "inventory,orders",
            "--proto-services",
            "acme.v1.Inventory",
            "--descriptor",
            "/etc/relay/descriptor.pb",
            "--log-responses",
        ])
        .unwrap();

        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.target_clusters, vec!["inventory", "orders"]);
        assert!(args.log_responses);
        assert_eq!(args.logged_kinds(), ResourceKind::KNOWN.to_vec());

        let mut config = AppConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.proxy.downstream_address, "istiod:15010");
        assert_eq!(config.proxy.listen_address, ":29000");
        assert_eq!(config.transcoder.proto_services, vec!["acme.v1.Inventory"]);
        assert_eq!(
            config.transcoder.descriptor_path.as_deref(),
            Some(std::path::Path::new("/etc/relay/descriptor.pb"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_log_kinds() {
        let cli = Cli::try_parse_from(["ads-relay", "serve", "--log-kinds", "lds,route,LDS"]).unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.logged_kinds(), vec![ResourceKind::Listener, ResourceKind::Route]);

        assert!(Cli::try_parse_from(["ads-relay", "serve", "--log-kinds", "secrets"]).is_err());
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let mut config = AppConfig::default();
        ServeArgs::default().apply_to(&mut config);
        assert!(ServeArgs::default().logged_kinds().is_empty());
        assert_eq!(config.proxy.listen_address, AppConfig::default().proxy.listen_address);
        assert!(config.observability.enable_metrics);
    }

    #[test]
    fn test_parse_gen_transcoder_defaults() {
        let cli =
            Cli::try_parse_from(["ads-relay", "gen-transcoder", "--descriptor", "d.pb"]).unwrap();
        let Commands::GenTranscoder(args) = cli.command else {
            panic!("expected gen-transcoder");
        };

        let options: TranscoderManifestOptions = args.into();
        assert_eq!(options.port, 80);
        assert_eq!(options.service, "grpc-transcoder");
        assert!(options.packages.is_empty());
    }

    #[test]
    fn test_gen_transcoder_requires_descriptor() {
        assert!(Cli::try_parse_from(["ads-relay", "gen-transcoder"]).is_err());
    }
}
