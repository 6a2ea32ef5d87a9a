use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::envoy::service::discovery::v3::DiscoveryResponse;
use tracing::trace;

use super::Plugin;
use crate::errors::{Error, Result};
use crate::xds::resources::ResourceKind;

/// Ordered plugin chains keyed by resource kind.
#[derive(Default, Clone)]
pub struct PluginPipeline {
    chains: HashMap<ResourceKind, Vec<Arc<dyn Plugin>>>,
}

impl PluginPipeline {
    pub fn builder() -> PluginPipelineBuilder {
        PluginPipelineBuilder::default()
    }

    /// A pipeline that forwards everything untouched
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.values().all(Vec::is_empty)
    }

    /// Names of the plugins registered for `kind`, in execution order
    pub fn plugin_names(&self, kind: ResourceKind) -> Vec<&str> {
        self.chains.get(&kind).map(|chain| chain.iter().map(|p| p.name()).collect()).unwrap_or_default()
    }

    /// Run the chain registered for `kind`.
    ///
    /// Each plugin receives the previous plugin's output. The first failure
    /// aborts the chain and is returned wrapped in [`Error::Plugin`].
    pub fn apply(
        &self,
        kind: ResourceKind,
        node: &Node,
        response: DiscoveryResponse,
    ) -> Result<DiscoveryResponse> {
        let Some(chain) = self.chains.get(&kind) else {
            return Ok(response);
        };

        chain.iter().try_fold(response, |response, plugin| {
            trace!(plugin = plugin.name(), kind = %kind, "applying plugin");
            plugin.apply(node, response).map_err(|e| Error::plugin(plugin.name(), e))
        })
    }
}

impl fmt::Debug for PluginPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in ResourceKind::KNOWN {
            if let Some(chain) = self.chains.get(&kind) {
                map.entry(&kind.as_str(), &chain.iter().map(|p| p.name()).collect::<Vec<_>>());
            }
        }
        map.finish()
    }
}

/// Collects plugin registrations before the relay starts.
#[derive(Default)]
pub struct PluginPipelineBuilder {
    chains: HashMap<ResourceKind, Vec<Arc<dyn Plugin>>>,
}

impl PluginPipelineBuilder {
    /// Append `plugin` to the chain of every kind in `kinds`.
    ///
    /// Registering for [`ResourceKind::Unknown`] is rejected.
    pub fn register<I>(mut self, kinds: I, plugin: Arc<dyn Plugin>) -> Result<Self>
    where
        I: IntoIterator<Item = ResourceKind>,
    {
        for kind in kinds {
            if kind == ResourceKind::Unknown {
                return Err(Error::config(format!(
                    "Plugin '{}' cannot be registered for unknown resource types",
                    plugin.name()
                )));
            }
            self.chains.entry(kind).or_default().push(Arc::clone(&plugin));
        }
        Ok(self)
    }

    pub fn build(self) -> PluginPipeline {
        PluginPipeline { chains: self.chains }
    }
}
