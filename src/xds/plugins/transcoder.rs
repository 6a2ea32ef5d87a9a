//! Injects the gRPC-JSON transcoder filter into Listeners sent to selected
//! workloads.
//!
//! Only nodes whose `cluster` is in the target set are affected. For those,
//! every HTTP connection manager in every Listener gets one transcoder filter
//! placed at the router's position.

use std::collections::HashSet;

use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::HttpFilter;
use envoy_types::pb::envoy::service::discovery::v3::DiscoveryResponse;
use tracing::debug;

use super::Plugin;
use crate::errors::Result;
use crate::xds::filters::http::GrpcJsonTranscoderConfig;
use crate::xds::helpers::ListenerModifier;
use crate::xds::resources::{classify, ResourceKind, LISTENER_TYPE_URL};

pub struct TranscoderPlugin {
    target_clusters: HashSet<String>,
    filter: HttpFilter,
}

impl TranscoderPlugin {
    /// Build the plugin, encoding the transcoder filter once up front.
    pub fn new<I, S>(target_clusters: I, config: &GrpcJsonTranscoderConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            target_clusters: target_clusters.into_iter().map(Into::into).collect(),
            filter: config.to_http_filter()?,
        })
    }

    pub fn targets(&self, node: &Node) -> bool {
        self.target_clusters.contains(&node.cluster)
    }
}

impl Plugin for TranscoderPlugin {
    fn name(&self) -> &str {
        "grpc-transcoder"
    }

    fn apply(&self, node: &Node, mut response: DiscoveryResponse) -> Result<DiscoveryResponse> {
        if classify(&response.type_url) != ResourceKind::Listener || !self.targets(node) {
            return Ok(response);
        }

        for (idx, resource) in response.resources.iter_mut().enumerate() {
            if resource.type_url != LISTENER_TYPE_URL {
                continue;
            }

            let mut modifier = ListenerModifier::decode(&resource.value, &format!("resources[{}]", idx))?;
            let injected = modifier.insert_http_filter_at_router(self.filter.clone())?;

            if modifier.is_modified() {
                debug!(
                    node_id = %node.id,
                    listener = %modifier.name(),
                    filter_chains = modifier.filter_chain_count(),
                    connection_managers = injected,
                    "injected gRPC-JSON transcoder"
                );
            }

            if let Some(encoded) = modifier.finish_if_modified() {
                resource.value = encoded;
            }
        }

        Ok(response)
    }
}
