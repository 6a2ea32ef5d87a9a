mod control_plane;
mod proxy;
pub mod relay;

pub use control_plane::{ControlPlane, GrpcControlPlane, ResponseStream};
pub use proxy::AdsProxyService;
pub use relay::{RequestStream, SessionOutcome, StreamRelay};
