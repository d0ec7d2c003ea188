// libs/video-call-cell/src/services/peer.rs
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{CloseCause, IncomingCall, MediaStream, PeerState, VideoCallError};

/// Raw events produced by a peer transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    IncomingCall(IncomingCall),
    RemoteStream(MediaStream),
    Closed,
    Error(String),
}

/// The media transport: "establish a direct media channel given an address".
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Registers with the broker and resolves with the address it assigns.
    /// Every later event for this peer is delivered through `events`.
    async fn open(&self, events: mpsc::UnboundedSender<TransportEvent>) -> Result<String, VideoCallError>;

    /// Places an outbound call carrying `local`.
    async fn dial(&self, remote_address: &str, local: MediaStream) -> Result<(), VideoCallError>;

    /// Answers a pending incoming call with `local`.
    async fn answer(&self, call: &IncomingCall, local: MediaStream) -> Result<(), VideoCallError>;

    /// Hangs up and unregisters. Must tolerate being called in any state.
    fn close(&self);
}

/// Events surfaced to the call session after state filtering.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    IncomingCall(IncomingCall),
    RemoteStream(MediaStream),
    Closed(CloseCause),
}

/// Lifecycle of one peer transport object.
///
/// `Created -> Ready -> Connecting -> Connected -> Closed`. A remote stream
/// is reported at most once, a close at most once, and nothing after close.
pub struct PeerConnectionManager {
    transport: Arc<dyn PeerTransport>,
    state: PeerState,
    local_address: Option<String>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    listening: bool,
    opened: bool,
    close_reported: bool,
    destroyed: bool,
}

impl PeerConnectionManager {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            transport,
            state: PeerState::Created,
            local_address: None,
            events: None,
            listening: false,
            opened: false,
            close_reported: false,
            destroyed: false,
        }
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn local_address(&self) -> Option<&str> {
        self.local_address.as_deref()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Opens the transport and waits for it to assign a local address.
    pub async fn initialize(&mut self) -> Result<String, VideoCallError> {
        self.expect_state(PeerState::Created, "initialize")?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(rx);
        self.opened = true;

        let address = match self.transport.open(tx).await {
            Ok(address) if !address.trim().is_empty() => address,
            Ok(_) => {
                self.state = PeerState::Closed;
                return Err(VideoCallError::Transport {
                    message: "Transport assigned an empty address".to_string(),
                });
            }
            Err(e) => {
                self.state = PeerState::Closed;
                return Err(e);
            }
        };

        info!("Peer transport ready at {}", address);
        self.local_address = Some(address.clone());
        self.state = PeerState::Ready;
        Ok(address)
    }

    /// Accept incoming calls from now on. Without this they are ignored.
    pub fn listen_for_calls(&mut self) {
        self.listening = true;
    }

    pub async fn call(&mut self, remote_address: &str, local: MediaStream) -> Result<(), VideoCallError> {
        self.expect_state(PeerState::Ready, "place a call")?;
        self.state = PeerState::Connecting;
        info!("Dialing {}", remote_address);

        let result = self.transport.dial(remote_address, local).await;
        result.map_err(|e| self.fail("dial", e))
    }

    pub async fn answer(&mut self, call: &IncomingCall, local: MediaStream) -> Result<(), VideoCallError> {
        self.expect_state(PeerState::Ready, "answer a call")?;
        self.state = PeerState::Connecting;
        info!("Answering call {} from {}", call.call_id, call.from);

        let result = self.transport.answer(call, local).await;
        result.map_err(|e| self.fail("answer", e))
    }

    fn fail(&mut self, operation: &str, error: VideoCallError) -> VideoCallError {
        warn!("Failed to {}: {}", operation, error);
        self.state = PeerState::Closed;
        self.close_reported = true;
        match error {
            VideoCallError::Call { .. } => error,
            other => VideoCallError::Call { message: other.to_string() },
        }
    }

    /// Next event worth acting on, or `None` once the connection is closed
    /// or was never opened.
    pub async fn next_event(&mut self) -> Option<PeerEvent> {
        loop {
            if self.close_reported {
                return None;
            }
            let events = self.events.as_mut()?;

            let Some(event) = events.recv().await else {
                return Some(self.report_close(CloseCause::Failed(
                    "Peer transport went away".to_string(),
                )));
            };

            match event {
                TransportEvent::IncomingCall(call) => {
                    if self.listening && self.state == PeerState::Ready {
                        return Some(PeerEvent::IncomingCall(call));
                    }
                    warn!(
                        "Ignoring incoming call from {} (listening={}, state={})",
                        call.from, self.listening, self.state
                    );
                }
                TransportEvent::RemoteStream(stream) => match self.state {
                    PeerState::Connecting => {
                        self.state = PeerState::Connected;
                        return Some(PeerEvent::RemoteStream(stream));
                    }
                    PeerState::Connected => debug!("Ignoring repeated remote stream {}", stream.id()),
                    state => warn!("Ignoring remote stream while {}", state),
                },
                TransportEvent::Closed => return Some(self.report_close(CloseCause::RemoteHangup)),
                TransportEvent::Error(message) => {
                    return Some(self.report_close(CloseCause::Failed(message)));
                }
            }
        }
    }

    fn report_close(&mut self, cause: CloseCause) -> PeerEvent {
        info!("Peer connection closed ({:?}) while {}", cause, self.state);
        self.state = PeerState::Closed;
        self.close_reported = true;
        PeerEvent::Closed(cause)
    }

    /// Tears the transport down. Idempotent and valid in every state.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if self.opened {
            self.transport.close();
            debug!("Peer transport destroyed");
        }
        self.state = PeerState::Closed;
        self.close_reported = true;
        self.events = None;
    }

    fn expect_state(&self, expected: PeerState, operation: &str) -> Result<(), VideoCallError> {
        if self.state != expected {
            return Err(VideoCallError::InvalidPeerState {
                state: self.state,
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

impl Drop for PeerConnectionManager {
    fn drop(&mut self) {
        self.destroy();
    }
}
