// libs/video-call-cell/src/models.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use appointment_cell::AppointmentError;
use shared_config::AppConfig;
use shared_models::ParticipantRole;

// ==============================================================================
// MEDIA
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug)]
struct TrackState {
    enabled: AtomicBool,
    live: AtomicBool,
    stop_requests: AtomicUsize,
}

/// Handle to a single capture track. Clones share the same underlying track.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    label: String,
    state: Arc<TrackState>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            state: Arc::new(TrackState {
                enabled: AtomicBool::new(true),
                live: AtomicBool::new(true),
                stop_requests: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.state.live.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    /// Mutes or unmutes the track. Ended tracks are left untouched.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        if !self.is_live() {
            return false;
        }
        self.state.enabled.store(enabled, Ordering::SeqCst);
        true
    }

    pub fn stop(&self) {
        self.state.stop_requests.fetch_add(1, Ordering::SeqCst);
        self.state.live.store(false, Ordering::SeqCst);
    }

    /// Number of times `stop` was called on this track.
    pub fn stop_requests(&self) -> usize {
        self.state.stop_requests.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(move |track| track.kind() == kind)
    }

    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(MediaTrack::is_live)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self { audio: true, video: true }
    }
}

// ==============================================================================
// CALL STATE MACHINE
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The local participant pressed "end call".
    LocalHangup,
    /// The remote participant or the network closed the call.
    RemoteHangup,
    CallFailed(String),
    MediaUnavailable(String),
    TransportUnavailable(String),
    /// Polling gave up before the remote participant published an address.
    RemoteNeverJoined,
    /// The call page went away.
    Unmounted,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::LocalHangup => write!(f, "local hangup"),
            EndReason::RemoteHangup => write!(f, "remote hangup"),
            EndReason::CallFailed(msg) => write!(f, "call failed: {}", msg),
            EndReason::MediaUnavailable(msg) => write!(f, "media unavailable: {}", msg),
            EndReason::TransportUnavailable(msg) => write!(f, "transport unavailable: {}", msg),
            EndReason::RemoteNeverJoined => write!(f, "remote never joined"),
            EndReason::Unmounted => write!(f, "unmounted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Initializing,
    WaitingForRemote,
    Dialing { remote_address: String },
    InCall,
    Ended(EndReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTrigger {
    /// Initialization finished without a dialable remote address.
    BeginWaiting,
    RemoteDiscovered(String),
    RemoteStreamReceived,
    End(EndReason),
}

impl CallState {
    /// The only way a session moves between states.
    ///
    /// Transitions never go backwards and `Ended` accepts nothing. `InCall`
    /// is reachable only through `RemoteStreamReceived`, and only clients
    /// ever dial.
    pub fn next(&self, trigger: &CallTrigger, role: ParticipantRole) -> Result<CallState, VideoCallError> {
        let next = match (self, trigger) {
            (CallState::Ended(_), _) => None,
            (_, CallTrigger::End(reason)) => Some(CallState::Ended(reason.clone())),
            (CallState::Initializing, CallTrigger::BeginWaiting) => Some(CallState::WaitingForRemote),
            (CallState::Initializing | CallState::WaitingForRemote, CallTrigger::RemoteDiscovered(address))
                if role.is_caller() =>
            {
                Some(CallState::Dialing { remote_address: address.clone() })
            }
            (CallState::Dialing { .. }, CallTrigger::RemoteStreamReceived) => Some(CallState::InCall),
            (CallState::WaitingForRemote, CallTrigger::RemoteStreamReceived) if !role.is_caller() => {
                Some(CallState::InCall)
            }
            _ => None,
        };

        next.ok_or_else(|| VideoCallError::InvalidTransition {
            from: self.to_string(),
            trigger: format!("{:?}", trigger),
        })
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, CallState::Ended(_))
    }

    pub fn is_in_call(&self) -> bool {
        matches!(self, CallState::InCall)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Initializing => write!(f, "INITIALIZING"),
            CallState::WaitingForRemote => write!(f, "WAITING_FOR_REMOTE"),
            CallState::Dialing { .. } => write!(f, "DIALING"),
            CallState::InCall => write!(f, "IN_CALL"),
            CallState::Ended(_) => write!(f, "ENDED"),
        }
    }
}

/// What a finished session reports back to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub reason: EndReason,
    pub local_address: Option<String>,
    pub remote_address: Option<String>,
    pub reached_call: bool,
    pub appointment_completed: bool,
}

// ==============================================================================
// PEER CONNECTION
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Created,
    Ready,
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerState::Created => "created",
            PeerState::Ready => "ready",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// A remote party dialing this peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCall {
    pub call_id: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    RemoteHangup,
    Failed(String),
}

// ==============================================================================
// RENDEZVOUS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Discovered(String),
    TimedOut { waited: Duration, polls: u64 },
}

// ==============================================================================
// SETTINGS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct CallSettings {
    pub poll_interval: Duration,
    pub discovery_timeout: Option<Duration>,
    pub publish_attempts: u32,
    pub publish_backoff: Duration,
    pub clear_address_on_end: bool,
    pub constraints: MediaConstraints,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CallSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            discovery_timeout: config.discovery_timeout_secs.map(Duration::from_secs),
            publish_attempts: config.publish_attempts.max(1),
            publish_backoff: Duration::from_millis(config.publish_backoff_ms),
            clear_address_on_end: config.clear_address_on_end,
            constraints: MediaConstraints::default(),
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VideoCallError {
    #[error("Camera or microphone unavailable: {message}")]
    MediaAccess { message: String },

    #[error("Failed to publish call address after {attempts} attempt(s): {message}")]
    Publish { attempts: u32, message: String },

    #[error("Remote participant did not join within {waited_secs} seconds")]
    DiscoveryTimeout { waited_secs: u64 },

    #[error("Call failed: {message}")]
    Call { message: String },

    #[error("Failed to mark appointment completed: {message}")]
    StatusUpdate { message: String },

    #[error("Peer transport error: {message}")]
    Transport { message: String },

    #[error("Peer connection is {state}, cannot {operation}")]
    InvalidPeerState { state: PeerState, operation: String },

    #[error("Call state {from} does not accept {trigger}")]
    InvalidTransition { from: String, trigger: String },

    #[error(transparent)]
    Store(#[from] AppointmentError),
}
