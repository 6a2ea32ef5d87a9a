//! Helper for editing Envoy Listener resources in flight.
//!
//! Decodes a Listener, walks every HTTP connection manager in its filter
//! chains (including the default chain), and re-encodes only when something
//! changed so untouched listeners keep their original bytes.

use crate::errors::{Error, Result};
use crate::xds::filters::{is_http_connection_manager, is_router, TypedFilterConfig};
use envoy_types::pb::envoy::config::listener::v3::filter::ConfigType;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    HttpConnectionManager, HttpFilter,
};
use prost::Message;

/// Decoded Listener plus a dirty flag.
///
/// ```rust,ignore
/// let mut modifier = ListenerModifier::decode(&any.value, "inbound|8080")?;
/// modifier.insert_http_filter_at_router(transcoder_filter)?;
///
/// if let Some(encoded) = modifier.finish_if_modified() {
///     any.value = encoded;
/// }
/// ```
#[derive(Debug)]
pub struct ListenerModifier {
    listener: Listener,
    label: String,
    modified: bool,
}

impl ListenerModifier {
    /// Decode a Listener from protobuf bytes.
    ///
    /// `label` only shows up in error messages; the listener's own name is
    /// not known until decoding succeeds.
    pub fn decode(bytes: &[u8], label: &str) -> Result<Self> {
        let listener = Listener::decode(bytes)
            .map_err(|e| Error::transcoder_decode(label, format!("listener: {}", e)))?;

        Ok(Self { listener, label: label.to_string(), modified: false })
    }

    /// Name carried inside the decoded Listener
    pub fn name(&self) -> &str {
        &self.listener.name
    }

    pub fn filter_chain_count(&self) -> usize {
        self.listener.filter_chains.len() + usize::from(self.listener.default_filter_chain.is_some())
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Apply `f` to every HTTP connection manager in the listener.
    ///
    /// The callback returns `Ok(true)` when it changed the HCM; only then is
    /// the filter's typed config re-encoded. Returns the number of HCMs
    /// changed.
    pub fn for_each_hcm<F>(&mut self, mut f: F) -> Result<usize>
    where
        F: FnMut(&mut HttpConnectionManager) -> Result<bool>,
    {
        let label = self.label.as_str();
        let mut modified_count = 0;

        let chains = self.listener.filter_chains.iter_mut().chain(self.listener.default_filter_chain.as_mut());

        for filter_chain in chains {
            for filter in filter_chain.filters.iter_mut() {
                if !is_http_connection_manager(&filter.name) {
                    continue;
                }
                let Some(ConfigType::TypedConfig(typed_config)) = &mut filter.config_type else {
                    continue;
                };

                let decoded = TypedFilterConfig::decode(typed_config).map_err(|e| {
                    Error::transcoder_decode(label, format!("http connection manager: {}", e))
                })?;

                if let TypedFilterConfig::HttpConnectionManager(mut hcm) = decoded {
                    if f(&mut hcm)? {
                        *typed_config = TypedFilterConfig::HttpConnectionManager(hcm).encode();
                        modified_count += 1;
                    }
                }
            }
        }

        if modified_count > 0 {
            self.modified = true;
        }
        Ok(modified_count)
    }

    /// Insert `filter` into every HCM at the router's position.
    ///
    /// The filter lands immediately before the last router entry, shifting
    /// the router and everything after it one slot right. An HCM without a
    /// router gets the filter at index 0. Returns the number of HCMs changed.
    pub fn insert_http_filter_at_router(&mut self, filter: HttpFilter) -> Result<usize> {
        self.for_each_hcm(|hcm| {
            let index = router_index(&hcm.http_filters);
            hcm.http_filters.insert(index, filter.clone());
            Ok(true)
        })
    }

    /// Re-encoded bytes, or `None` when nothing changed.
    pub fn finish_if_modified(self) -> Option<Vec<u8>> {
        self.modified.then(|| self.listener.encode_to_vec())
    }
}

/// Index of the last router filter, 0 when there is none.
pub fn router_index(filters: &[HttpFilter]) -> usize {
    filters.iter().rposition(|f| is_router(&f.name)).unwrap_or(0)
}
