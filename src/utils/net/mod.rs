pub mod metrics_server;
pub mod peer;
pub mod signaling;
pub mod webrtc_common;

pub use self::peer::PeerSession;
