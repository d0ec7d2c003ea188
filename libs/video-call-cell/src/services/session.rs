// libs/video-call-cell/src/services/session.rs
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::{AppointmentPatch, AppointmentStore};
use shared_models::SessionContext;

use crate::models::{
    CallOutcome, CallSettings, CallState, CallTrigger, CloseCause, DiscoveryEvent, EndReason,
    MediaStream, VideoCallError,
};
use crate::services::media::{MediaAcquisition, MediaDevices};
use crate::services::peer::{PeerConnectionManager, PeerEvent, PeerTransport};
use crate::services::rendezvous::{RemoteAddressWatch, RendezvousClient};

/// What the call page renders and where it goes when the call is over.
pub trait CallSurface: Send + Sync {
    fn attach_local(&self, stream: &MediaStream);
    fn attach_remote(&self, stream: &MediaStream);
    fn show_error(&self, error: &VideoCallError);
    fn navigate_away(&self, outcome: &CallOutcome);
}

/// Collaborators injected into a call session.
#[derive(Clone)]
pub struct CallSessionDeps {
    pub store: Arc<dyn AppointmentStore>,
    pub media_devices: Arc<dyn MediaDevices>,
    pub transport: Arc<dyn PeerTransport>,
    pub surface: Arc<dyn CallSurface>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCommand {
    EndCall,
    SetMicrophone(bool),
    SetCamera(bool),
    Unmount,
}

/// Page-side handle on a running session. Dropping every handle unmounts it.
#[derive(Clone)]
pub struct CallHandle {
    commands: mpsc::UnboundedSender<CallCommand>,
    state: watch::Receiver<CallState>,
}

impl CallHandle {
    pub fn end_call(&self) {
        self.send(CallCommand::EndCall);
    }

    pub fn unmount(&self) {
        self.send(CallCommand::Unmount);
    }

    pub fn set_microphone_enabled(&self, enabled: bool) {
        self.send(CallCommand::SetMicrophone(enabled));
    }

    pub fn set_camera_enabled(&self, enabled: bool) {
        self.send(CallCommand::SetCamera(enabled));
    }

    fn send(&self, command: CallCommand) {
        if self.commands.send(command.clone()).is_err() {
            debug!("Call session already finished, dropping {:?}", command);
        }
    }

    pub fn state(&self) -> CallState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallState> {
        self.state.clone()
    }

    /// Waits until the session reaches a state matching `predicate`.
    /// Returns `None` if the session finished without getting there.
    pub async fn wait_for<F>(&self, predicate: F) -> Option<CallState>
    where
        F: FnMut(&CallState) -> bool,
    {
        let mut state = self.state.clone();
        let reached = state.wait_for(predicate).await.ok()?.clone();
        Some(reached)
    }
}

enum Step {
    Command(Option<CallCommand>),
    Peer(PeerEvent),
    Discovery(DiscoveryEvent),
}

/// One visit to the call page for a given appointment.
///
/// Clients dial, workers answer. The session ends exactly once and always
/// tears down in the order: stop polling, stop local tracks, destroy the
/// transport, update the appointment, navigate away.
pub struct CallSession {
    appointment_id: Uuid,
    context: SessionContext,
    settings: CallSettings,
    store: Arc<dyn AppointmentStore>,
    rendezvous: RendezvousClient,
    media: MediaAcquisition,
    peer: PeerConnectionManager,
    surface: Arc<dyn CallSurface>,
    state: CallState,
    state_tx: watch::Sender<CallState>,
    commands: mpsc::UnboundedReceiver<CallCommand>,
    watch: Option<RemoteAddressWatch>,
    local_address: Option<String>,
    remote_address: Option<String>,
    address_published: bool,
    reached_call: bool,
}

impl CallSession {
    pub fn new(
        appointment_id: Uuid,
        context: SessionContext,
        settings: CallSettings,
        deps: CallSessionDeps,
    ) -> (Self, CallHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(CallState::Initializing);

        let session = Self {
            appointment_id,
            rendezvous: RendezvousClient::new(deps.store.clone(), &settings),
            media: MediaAcquisition::new(deps.media_devices, settings.constraints),
            peer: PeerConnectionManager::new(deps.transport),
            store: deps.store,
            surface: deps.surface,
            context,
            settings,
            state: CallState::Initializing,
            state_tx,
            commands: command_rx,
            watch: None,
            local_address: None,
            remote_address: None,
            address_published: false,
            reached_call: false,
        };
        let handle = CallHandle {
            commands: command_tx,
            state: state_rx,
        };

        (session, handle)
    }

    pub fn state(&self) -> &CallState {
        &self.state
    }

    pub fn spawn(self) -> JoinHandle<CallOutcome> {
        tokio::spawn(self.run())
    }

    #[instrument(skip(self), fields(appointment_id = %self.appointment_id, role = %self.context.role))]
    pub async fn run(mut self) -> CallOutcome {
        info!("Starting call session for user {}", self.context.user_id);
        let reason = self.drive().await;
        self.teardown(reason).await
    }

    async fn drive(&mut self) -> EndReason {
        if let Err(reason) = self.initialize().await {
            return reason;
        }

        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                Some(event) = self.peer.next_event() => Step::Peer(event),
                Some(event) = next_discovery(&mut self.watch) => Step::Discovery(event),
            };

            if let Some(reason) = self.handle_step(step).await {
                return reason;
            }
        }
    }

    async fn initialize(&mut self) -> Result<(), EndReason> {
        let role = self.context.role;

        let (media, peer) = (&mut self.media, &mut self.peer);
        let (media_result, peer_result) = tokio::select! {
            results = async { tokio::join!(media.acquire(), peer.initialize()) } => results,
            reason = wait_for_abort(&mut self.commands, None) => return Err(reason),
        };

        let local_stream = media_result.map_err(|e| {
            error!("Local media unavailable: {}", e);
            self.surface.show_error(&e);
            EndReason::MediaUnavailable(e.to_string())
        })?;
        self.surface.attach_local(&local_stream);

        let local_address = peer_result.map_err(|e| {
            error!("Peer transport unavailable: {}", e);
            self.surface.show_error(&e);
            EndReason::TransportUnavailable(e.to_string())
        })?;
        self.local_address = Some(local_address.clone());
        if !role.is_caller() {
            self.peer.listen_for_calls();
        }

        let published = tokio::select! {
            result = self.rendezvous.publish_local_address(self.appointment_id, role, &local_address) => result,
            reason = wait_for_abort(&mut self.commands, Some(&self.media)) => return Err(reason),
        };
        match published {
            Ok(()) => self.address_published = true,
            Err(e) => warn!("{}; continuing, the other participant cannot reach us", e),
        }

        let fetched = tokio::select! {
            result = self.rendezvous.fetch_remote_address(self.appointment_id, role) => result,
            reason = wait_for_abort(&mut self.commands, Some(&self.media)) => return Err(reason),
        };
        let existing = fetched.unwrap_or_else(|e| {
            warn!("Initial appointment fetch failed: {}", e);
            None
        });

        if role.is_caller() {
            match existing {
                Some(remote) => self.dial(remote).await,
                None => {
                    self.transition(CallTrigger::BeginWaiting)?;
                    self.watch = Some(self.rendezvous.poll_for_remote_address(self.appointment_id, role));
                    Ok(())
                }
            }
        } else {
            if let Some(remote) = existing {
                debug!("Client already published {}, waiting for their call", remote);
                self.remote_address = Some(remote);
            }
            self.transition(CallTrigger::BeginWaiting)
        }
    }

    async fn dial(&mut self, remote: String) -> Result<(), EndReason> {
        self.transition(CallTrigger::RemoteDiscovered(remote.clone()))?;
        self.remote_address = Some(remote.clone());

        let local = self.local_stream()?;
        let placed = tokio::select! {
            result = self.peer.call(&remote, local) => result,
            reason = wait_for_abort(&mut self.commands, Some(&self.media)) => return Err(reason),
        };

        placed.map_err(|e| {
            error!("Dialing {} failed: {}", remote, e);
            self.surface.show_error(&e);
            EndReason::CallFailed(e.to_string())
        })
    }

    async fn handle_step(&mut self, step: Step) -> Option<EndReason> {
        match step {
            Step::Command(None) | Step::Command(Some(CallCommand::Unmount)) => Some(EndReason::Unmounted),
            Step::Command(Some(CallCommand::EndCall)) => Some(EndReason::LocalHangup),
            Step::Command(Some(CallCommand::SetMicrophone(enabled))) => {
                self.media.set_microphone_enabled(enabled);
                None
            }
            Step::Command(Some(CallCommand::SetCamera(enabled))) => {
                self.media.set_camera_enabled(enabled);
                None
            }
            Step::Peer(PeerEvent::IncomingCall(call)) => {
                let local = match self.local_stream() {
                    Ok(local) => local,
                    Err(reason) => return Some(reason),
                };
                match self.peer.answer(&call, local).await {
                    Ok(()) => {
                        self.remote_address = Some(call.from);
                        None
                    }
                    Err(e) => {
                        self.surface.show_error(&e);
                        Some(EndReason::CallFailed(e.to_string()))
                    }
                }
            }
            Step::Peer(PeerEvent::RemoteStream(stream)) => {
                if let Err(reason) = self.transition(CallTrigger::RemoteStreamReceived) {
                    return Some(reason);
                }
                self.reached_call = true;
                self.surface.attach_remote(&stream);
                None
            }
            Step::Peer(PeerEvent::Closed(CloseCause::RemoteHangup)) => Some(EndReason::RemoteHangup),
            Step::Peer(PeerEvent::Closed(CloseCause::Failed(message))) => {
                self.surface.show_error(&VideoCallError::Call { message: message.clone() });
                Some(EndReason::CallFailed(message))
            }
            Step::Discovery(DiscoveryEvent::Discovered(remote)) => {
                self.stop_polling();
                self.dial(remote).await.err()
            }
            Step::Discovery(DiscoveryEvent::TimedOut { waited, polls }) => {
                self.stop_polling();
                warn!("Remote participant never joined ({} polls)", polls);
                self.surface.show_error(&VideoCallError::DiscoveryTimeout {
                    waited_secs: waited.as_secs(),
                });
                Some(EndReason::RemoteNeverJoined)
            }
        }
    }

    async fn teardown(mut self, reason: EndReason) -> CallOutcome {
        info!("Ending call session: {}", reason);

        self.stop_polling();
        self.media.release();
        self.peer.destroy();
        if let Err(e) = self.transition(CallTrigger::End(reason.clone())) {
            warn!("Session already ended: {:?}", e);
        }

        let appointment_completed = if self.owes_completion(&reason) {
            self.complete_appointment().await
        } else {
            false
        };

        if self.settings.clear_address_on_end && self.address_published {
            if let Err(e) = self
                .rendezvous
                .clear_local_address(self.appointment_id, self.context.role)
                .await
            {
                warn!("Failed to clear call address: {}", e);
            }
        }

        let outcome = CallOutcome {
            reason,
            local_address: self.local_address.take(),
            remote_address: self.remote_address.take(),
            reached_call: self.reached_call,
            appointment_completed,
        };
        self.surface.navigate_away(&outcome);
        outcome
    }

    /// Workers complete the appointment when either side hangs up on an
    /// established call. Leaving before the call connected completes nothing.
    fn owes_completion(&self, reason: &EndReason) -> bool {
        if !self.context.role.can_complete_appointment() {
            return false;
        }
        match reason {
            EndReason::LocalHangup | EndReason::RemoteHangup => self.reached_call,
            _ => false,
        }
    }

    async fn complete_appointment(&mut self) -> bool {
        match self
            .store
            .update_appointment(self.appointment_id, AppointmentPatch::complete())
            .await
        {
            Ok(()) => {
                info!("Appointment {} marked COMPLETED", self.appointment_id);
                true
            }
            Err(e) => {
                let error = VideoCallError::StatusUpdate { message: e.to_string() };
                error!("{}; appointment stays CONFIRMED", error);
                false
            }
        }
    }

    fn stop_polling(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.cancel();
            debug!("Stopped polling for remote address");
        }
    }

    fn local_stream(&self) -> Result<MediaStream, EndReason> {
        self.media
            .local_stream()
            .cloned()
            .ok_or_else(|| EndReason::MediaUnavailable("Local media was released".to_string()))
    }

    fn transition(&mut self, trigger: CallTrigger) -> Result<(), EndReason> {
        let next = self.state.next(&trigger, self.context.role).map_err(|e| {
            error!("{}", e);
            EndReason::CallFailed(e.to_string())
        })?;

        info!("Call state {} -> {}", self.state, next);
        self.state = next.clone();
        self.state_tx.send_replace(next);
        Ok(())
    }
}

async fn next_discovery(watch: &mut Option<RemoteAddressWatch>) -> Option<DiscoveryEvent> {
    match watch {
        Some(watch) => watch.next().await,
        None => None,
    }
}

/// Resolves when the page asks the session to stop, applying toggles in the
/// meantime. Toggles arriving before media exists are dropped.
async fn wait_for_abort(
    commands: &mut mpsc::UnboundedReceiver<CallCommand>,
    media: Option<&MediaAcquisition>,
) -> EndReason {
    loop {
        match (commands.recv().await, media) {
            (None | Some(CallCommand::Unmount), _) => return EndReason::Unmounted,
            (Some(CallCommand::EndCall), _) => return EndReason::LocalHangup,
            (Some(CallCommand::SetMicrophone(enabled)), Some(media)) => {
                media.set_microphone_enabled(enabled);
            }
            (Some(CallCommand::SetCamera(enabled)), Some(media)) => {
                media.set_camera_enabled(enabled);
            }
            (Some(command), None) => debug!("Ignoring {:?} before media is ready", command),
        }
    }
}
