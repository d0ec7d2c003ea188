// libs/video-call-cell/src/services/mod.rs

pub mod loopback;
pub mod media;
pub mod peer;
pub mod rendezvous;
pub mod session;

pub use loopback::{LoopbackExchange, LoopbackPeer};
pub use media::{MediaAcquisition, MediaDevices, SyntheticMediaDevices};
pub use peer::{PeerConnectionManager, PeerEvent, PeerTransport, TransportEvent};
pub use rendezvous::{RemoteAddressWatch, RendezvousClient};
pub use session::{CallCommand, CallHandle, CallSession, CallSessionDeps, CallSurface};
