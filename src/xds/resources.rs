//! Resource type URLs and the classifier that maps them to [`ResourceKind`].

use std::fmt;
use std::str::FromStr;

use crate::errors::Error;

pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ENDPOINT_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";

/// Category of configuration carried by a discovery response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Cluster,
    Endpoint,
    Listener,
    Route,
    Unknown,
}

impl ResourceKind {
    /// The four kinds plugins can be registered for
    pub const KNOWN: [ResourceKind; 4] =
        [ResourceKind::Cluster, ResourceKind::Endpoint, ResourceKind::Listener, ResourceKind::Route];

    /// Short label used in logs and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "cluster",
            ResourceKind::Endpoint => "endpoint",
            ResourceKind::Listener => "listener",
            ResourceKind::Route => "route",
            ResourceKind::Unknown => "unknown",
        }
    }

    /// Canonical type URL, `None` for [`ResourceKind::Unknown`]
    pub fn type_url(&self) -> Option<&'static str> {
        match self {
            ResourceKind::Cluster => Some(CLUSTER_TYPE_URL),
            ResourceKind::Endpoint => Some(ENDPOINT_TYPE_URL),
            ResourceKind::Listener => Some(LISTENER_TYPE_URL),
            ResourceKind::Route => Some(ROUTE_TYPE_URL),
            ResourceKind::Unknown => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cluster" | "cds" => Ok(ResourceKind::Cluster),
            "endpoint" | "eds" => Ok(ResourceKind::Endpoint),
            "listener" | "lds" => Ok(ResourceKind::Listener),
            "route" | "rds" => Ok(ResourceKind::Route),
            other => Err(Error::config(format!("Unknown resource kind '{}'", other))),
        }
    }
}

/// Map a response type URL to its resource kind.
///
/// Unrecognised URLs are [`ResourceKind::Unknown`].
pub fn classify(type_url: &str) -> ResourceKind {
    match type_url {
        CLUSTER_TYPE_URL => ResourceKind::Cluster,
        ENDPOINT_TYPE_URL => ResourceKind::Endpoint,
        LISTENER_TYPE_URL => ResourceKind::Listener,
        ROUTE_TYPE_URL => ResourceKind::Route,
        _ => ResourceKind::Unknown,
    }
}
