// libs/video-call-cell/src/lib.rs
//! # Video Call Cell
//!
//! Peer-to-peer virtual appointments between a clinic worker and a client.
//! There is no signaling server: each side publishes the address its peer
//! transport was assigned onto the appointment record, and the client polls
//! the record until the worker's address shows up, then dials it.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                  Video Call Cell                    |
//! +-----------------------------------------------------+
//! |  models.rs      |  Call/peer states, media, errors  |
//! |  services/      |                                   |
//! |    media.rs     |  Camera/microphone acquisition    |
//! |    rendezvous.rs|  Address exchange via appointment |
//! |    peer.rs      |  Peer transport lifecycle         |
//! |    session.rs   |  Call session state machine       |
//! |    loopback.rs  |  In-process peer transport        |
//! +-----------------------------------------------------+
//! ```
//!
//! ## Call flow
//!
//! ```text
//! INITIALIZING -> WAITING_FOR_REMOTE -> DIALING -> IN_CALL -> ENDED
//!              \________________________/^  (client)
//!  worker:  INITIALIZING -> WAITING_FOR_REMOTE -> IN_CALL -> ENDED
//! ```
//!
//! When the worker ends the call the appointment moves from CONFIRMED to
//! COMPLETED, after local media is stopped and the transport destroyed.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use appointment_cell::RestAppointmentStore;
//! use shared_config::AppConfig;
//! use shared_models::{ParticipantRole, SessionContext};
//! use video_call_cell::{
//!     CallSession, CallSessionDeps, CallSettings, CallSurface, LoopbackExchange,
//!     SyntheticMediaDevices,
//! };
//! # fn surface() -> Arc<dyn CallSurface> { unimplemented!() }
//!
//! # async fn example() {
//! let config = AppConfig::from_env();
//! let context = SessionContext::new("user-1", ParticipantRole::Client).with_auth_token("jwt");
//! let deps = CallSessionDeps {
//!     store: Arc::new(RestAppointmentStore::for_session(&config, &context)),
//!     media_devices: Arc::new(SyntheticMediaDevices::new("front desk")),
//!     transport: Arc::new(LoopbackExchange::new().peer()),
//!     surface: surface(),
//! };
//! let (session, handle) =
//!     CallSession::new(uuid::Uuid::new_v4(), context, CallSettings::from(&config), deps);
//!
//! let running = session.spawn();
//! handle.end_call();
//! let outcome = running.await;
//! # let _ = outcome;
//! # }
//! ```

pub mod models;
pub mod services;

// Re-export commonly used types
pub use models::{
    CallOutcome, CallSettings, CallState, CallTrigger, CloseCause, DiscoveryEvent, EndReason,
    IncomingCall, MediaConstraints, MediaStream, MediaTrack, PeerState, TrackKind,
    VideoCallError,
};

pub use services::{
    CallCommand, CallHandle, CallSession, CallSessionDeps, CallSurface, LoopbackExchange,
    LoopbackPeer, MediaAcquisition, MediaDevices, PeerConnectionManager, PeerEvent,
    PeerTransport, RemoteAddressWatch, RendezvousClient, SyntheticMediaDevices, TransportEvent,
};
