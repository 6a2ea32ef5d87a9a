//! Envoy filter names and typed-config handling.
//!
//! Filters inside a Listener carry their configuration as a type-erased
//! `google.protobuf.Any`. [`TypedFilterConfig`] turns that into a tagged
//! union keyed by type URL: types the relay knows how to edit are decoded,
//! everything else is kept as opaque bytes and written back untouched.

pub mod http;

use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::HttpConnectionManager;
use envoy_types::pb::google::protobuf::Any;
use prost::Message;

/// Network filter name of the HTTP connection manager
pub const HTTP_CONNECTION_MANAGER_FILTER: &str = "envoy.filters.network.http_connection_manager";
/// Pre-v3 well-known name still emitted by some control planes
pub const LEGACY_HTTP_CONNECTION_MANAGER_FILTER: &str = "envoy.http_connection_manager";

/// HTTP filter name of the router
pub const ROUTER_FILTER: &str = "envoy.filters.http.router";
/// Pre-v3 well-known router name
pub const LEGACY_ROUTER_FILTER: &str = "envoy.router";

pub const HTTP_CONNECTION_MANAGER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";

/// Whether a network filter name identifies the HTTP connection manager
pub fn is_http_connection_manager(name: &str) -> bool {
    name == HTTP_CONNECTION_MANAGER_FILTER || name == LEGACY_HTTP_CONNECTION_MANAGER_FILTER
}

/// Whether an HTTP filter name identifies the router
pub fn is_router(name: &str) -> bool {
    name == ROUTER_FILTER || name == LEGACY_ROUTER_FILTER
}

/// Encode a prost message into an `Any` with the given type URL.
pub fn any_from_message<M: Message>(type_url: impl Into<String>, msg: &M) -> Any {
    Any { type_url: type_url.into(), value: msg.encode_to_vec() }
}

/// Decoded view of a filter's embedded configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedFilterConfig {
    HttpConnectionManager(Box<HttpConnectionManager>),
    /// A type the relay does not edit; preserved byte-for-byte
    Opaque(Any),
}

impl TypedFilterConfig {
    /// Decode `any` according to its type URL.
    ///
    /// Only known types can fail; unknown types always become [`Self::Opaque`].
    pub fn decode(any: &Any) -> Result<Self, prost::DecodeError> {
        match any.type_url.as_str() {
            HTTP_CONNECTION_MANAGER_TYPE_URL => {
                let hcm = HttpConnectionManager::decode(&any.value[..])?;
                Ok(Self::HttpConnectionManager(Box::new(hcm)))
            }
            _ => Ok(Self::Opaque(any.clone())),
        }
    }

    /// Encode back into an `Any` carrying the same type URL.
    pub fn encode(&self) -> Any {
        match self {
            Self::HttpConnectionManager(hcm) => {
                any_from_message(HTTP_CONNECTION_MANAGER_TYPE_URL, hcm.as_ref())
            }
            Self::Opaque(any) => any.clone(),
        }
    }

    pub fn type_url(&self) -> &str {
        match self {
            Self::HttpConnectionManager(_) => HTTP_CONNECTION_MANAGER_TYPE_URL,
            Self::Opaque(any) => &any.type_url,
        }
    }
}
