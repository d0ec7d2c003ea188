// libs/video-call-cell/src/services/loopback.rs
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{IncomingCall, MediaStream, VideoCallError};
use crate::services::peer::{PeerTransport, TransportEvent};

/// In-process peer broker.
///
/// Hands out addresses, routes dials to the registered callee and swaps
/// streams when the callee answers. A peer takes part in one call at a time.
#[derive(Clone, Default)]
pub struct LoopbackExchange {
    inner: Arc<Mutex<ExchangeState>>,
}

#[derive(Default)]
struct ExchangeState {
    peers: HashMap<String, PeerSlot>,
}

struct PeerSlot {
    events: mpsc::UnboundedSender<TransportEvent>,
    pending: HashMap<String, PendingCall>,
    connected_to: Option<String>,
}

struct PendingCall {
    from: String,
    stream: MediaStream,
}

impl LoopbackExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peer that receives a generated address on `open`.
    pub fn peer(&self) -> LoopbackPeer {
        LoopbackPeer {
            exchange: self.clone(),
            requested: None,
            address: Mutex::new(None),
        }
    }

    /// Peer that registers under a fixed address.
    pub fn peer_with_address(&self, address: impl Into<String>) -> LoopbackPeer {
        LoopbackPeer {
            exchange: self.clone(),
            requested: Some(address.into()),
            address: Mutex::new(None),
        }
    }

    pub fn is_registered(&self, address: &str) -> bool {
        self.lock().peers.contains_key(address)
    }

    pub fn registered_count(&self) -> usize {
        self.lock().peers.len()
    }

    fn lock(&self) -> MutexGuard<'_, ExchangeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct LoopbackPeer {
    exchange: LoopbackExchange,
    requested: Option<String>,
    address: Mutex<Option<String>>,
}

impl LoopbackPeer {
    pub fn address(&self) -> Option<String> {
        self.address.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn require_address(&self) -> Result<String, VideoCallError> {
        self.address().ok_or_else(|| VideoCallError::Transport {
            message: "Peer is not open".to_string(),
        })
    }
}

#[async_trait]
impl PeerTransport for LoopbackPeer {
    async fn open(&self, events: mpsc::UnboundedSender<TransportEvent>) -> Result<String, VideoCallError> {
        let address = self
            .requested
            .clone()
            .unwrap_or_else(|| format!("peer-{}", Uuid::new_v4().simple()));

        let mut state = self.exchange.lock();
        if state.peers.contains_key(&address) {
            return Err(VideoCallError::Transport {
                message: format!("Address {} is already taken", address),
            });
        }

        state.peers.insert(
            address.clone(),
            PeerSlot {
                events,
                pending: HashMap::new(),
                connected_to: None,
            },
        );
        *self.address.lock().unwrap_or_else(PoisonError::into_inner) = Some(address.clone());

        debug!("Loopback peer registered at {}", address);
        Ok(address)
    }

    async fn dial(&self, remote_address: &str, local: MediaStream) -> Result<(), VideoCallError> {
        let me = self.require_address()?;
        if me == remote_address {
            return Err(VideoCallError::Call {
                message: "Cannot dial own address".to_string(),
            });
        }

        let mut state = self.exchange.lock();
        let callee = state.peers.get_mut(remote_address).ok_or_else(|| VideoCallError::Call {
            message: format!("Peer {} is unreachable", remote_address),
        })?;

        if callee.connected_to.is_some() {
            return Err(VideoCallError::Call {
                message: format!("Peer {} is busy", remote_address),
            });
        }

        let call_id = format!("call-{}", Uuid::new_v4().simple());
        callee.pending.insert(
            call_id.clone(),
            PendingCall {
                from: me.clone(),
                stream: local,
            },
        );

        callee
            .events
            .send(TransportEvent::IncomingCall(IncomingCall {
                call_id,
                from: me.clone(),
            }))
            .map_err(|_| VideoCallError::Call {
                message: format!("Peer {} went away", remote_address),
            })?;

        info!("Loopback call placed {} -> {}", me, remote_address);
        Ok(())
    }

    async fn answer(&self, call: &IncomingCall, local: MediaStream) -> Result<(), VideoCallError> {
        let me = self.require_address()?;
        let mut state = self.exchange.lock();

        let pending = state
            .peers
            .get_mut(&me)
            .and_then(|slot| slot.pending.remove(&call.call_id))
            .ok_or_else(|| VideoCallError::Call {
                message: format!("Call {} is no longer pending", call.call_id),
            })?;

        let caller = state.peers.get_mut(&pending.from).ok_or_else(|| VideoCallError::Call {
            message: format!("Caller {} hung up", pending.from),
        })?;
        caller.connected_to = Some(me.clone());
        let _ = caller.events.send(TransportEvent::RemoteStream(local));

        if let Some(slot) = state.peers.get_mut(&me) {
            slot.connected_to = Some(pending.from.clone());
            let _ = slot.events.send(TransportEvent::RemoteStream(pending.stream));
        }

        info!("Loopback call {} connected {} <-> {}", call.call_id, pending.from, me);
        Ok(())
    }

    fn close(&self) {
        let Some(me) = self.address.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };

        let mut state = self.exchange.lock();
        let Some(slot) = state.peers.remove(&me) else {
            return;
        };

        let partners = slot
            .connected_to
            .into_iter()
            .chain(slot.pending.into_values().map(|call| call.from));
        for partner in partners {
            if let Some(other) = state.peers.get_mut(&partner) {
                other.connected_to = None;
                let _ = other.events.send(TransportEvent::Closed);
            }
        }

        debug!("Loopback peer {} unregistered", me);
    }
}
