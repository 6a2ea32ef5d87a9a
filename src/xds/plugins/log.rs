//! Debug logging of relayed responses.

use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::envoy::service::discovery::v3::DiscoveryResponse;
use tracing::debug;

use super::Plugin;
use crate::errors::Result;

/// Logs a one-line summary of every response. Never mutates, never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPlugin;

impl Plugin for LogPlugin {
    fn name(&self) -> &str {
        "log"
    }

    fn apply(&self, node: &Node, response: DiscoveryResponse) -> Result<DiscoveryResponse> {
        debug!(
            node_id = %node.id,
            node_cluster = %node.cluster,
            type_url = %response.type_url,
            version = %response.version_info,
            nonce = %response.nonce,
            resources = response.resources.len(),
            "discovery response"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xds::resources::CLUSTER_TYPE_URL;
    use envoy_types::pb::google::protobuf::Any;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_logs_and_passes_through() {
        let node = Node { id: "sidecar~10.0.0.1".to_string(), ..Default::default() };
        let response = DiscoveryResponse {
            type_url: CLUSTER_TYPE_URL.to_string(),
            version_info: "v42".to_string(),
            resources: vec![Any::default(), Any::default()],
            ..Default::default()
        };

        let out = LogPlugin.apply(&node, response.clone()).unwrap();
        assert_eq!(out, response);
        assert!(logs_contain("discovery response"));
        assert!(logs_contain("v42"));
    }
}
