#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use appointment_cell::{
    Appointment, AppointmentError, AppointmentPatch, AppointmentStore, InMemoryAppointmentStore,
};
use shared_models::ParticipantRole;
use shared_utils::test_utils::TestIdentity;
use video_call_cell::{
    CallHandle, CallOutcome, CallSession, CallSessionDeps, CallSettings, CallSurface,
    IncomingCall, MediaConstraints, MediaDevices, MediaStream, MediaTrack, PeerTransport,
    TrackKind, TransportEvent, VideoCallError,
};

/// Ordered record of side effects across every fake.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

pub fn publish_entry(role: ParticipantRole, address: &str) -> String {
    format!("patch:{}", AppointmentPatch::publish_address(role, address).to_body())
}

pub fn clear_entry(role: ParticipantRole) -> String {
    format!("patch:{}", AppointmentPatch::clear_address(role).to_body())
}

pub fn complete_entry() -> String {
    format!("patch:{}", AppointmentPatch::complete().to_body())
}

// ==============================================================================
// STORE
// ==============================================================================

pub struct RecordingStore {
    pub inner: InMemoryAppointmentStore,
    log: EventLog,
    reject_addresses: AtomicBool,
    reject_status: AtomicBool,
}

impl RecordingStore {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: InMemoryAppointmentStore::new(),
            log,
            reject_addresses: AtomicBool::new(false),
            reject_status: AtomicBool::new(false),
        }
    }

    /// Every `<role>_peer_id` write fails with a server error.
    pub fn reject_address_writes(&self) {
        self.reject_addresses.store(true, Ordering::SeqCst);
    }

    /// Every `status` write fails with a server error.
    pub fn reject_status_writes(&self) {
        self.reject_status.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AppointmentStore for RecordingStore {
    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.log.push("get");
        self.inner.get_appointment(appointment_id).await
    }

    async fn update_appointment(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<(), AppointmentError> {
        self.log.push(format!("patch:{}", patch.to_body()));
        let rejected = match &patch {
            AppointmentPatch::PeerAddress { .. } => self.reject_addresses.load(Ordering::SeqCst),
            AppointmentPatch::Status(_) => self.reject_status.load(Ordering::SeqCst),
        };
        if rejected {
            return Err(AppointmentError::Api("503 Service Unavailable".to_string()));
        }
        self.inner.update_appointment(appointment_id, patch).await
    }
}

// ==============================================================================
// MEDIA
// ==============================================================================

#[derive(Default)]
pub struct RecordingMediaDevices {
    deny: AtomicBool,
    issued: Mutex<Vec<MediaStream>>,
}

impl RecordingMediaDevices {
    pub fn denying() -> Self {
        Self {
            deny: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn issued_tracks(&self) -> Vec<MediaTrack> {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .flat_map(|stream| stream.tracks().to_vec())
            .collect()
    }
}

#[async_trait]
impl MediaDevices for RecordingMediaDevices {
    async fn get_user_media(&self, _constraints: &MediaConstraints) -> Result<MediaStream, VideoCallError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(VideoCallError::MediaAccess {
                message: "NotAllowedError: Permission denied".to_string(),
            });
        }
        let stream = MediaStream::new(vec![
            MediaTrack::new(TrackKind::Audio, "test microphone"),
            MediaTrack::new(TrackKind::Video, "test camera"),
        ]);
        self.issued.lock().unwrap().push(stream.clone());
        Ok(stream)
    }
}

// ==============================================================================
// TRANSPORT
// ==============================================================================

/// Transport whose remote side is driven by the test.
pub struct ScriptedTransport {
    address: String,
    log: EventLog,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    sent: Mutex<Vec<MediaStream>>,
    dials: Mutex<Vec<String>>,
    answers: Mutex<Vec<IncomingCall>>,
    closes: AtomicUsize,
    connect_on_dial: AtomicBool,
    hang_on_open: AtomicBool,
    fail_dial: AtomicBool,
}

impl ScriptedTransport {
    pub fn new(address: &str, log: EventLog) -> Self {
        Self {
            address: address.to_string(),
            log,
            events: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            dials: Mutex::new(Vec::new()),
            answers: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            connect_on_dial: AtomicBool::new(true),
            hang_on_open: AtomicBool::new(false),
            fail_dial: AtomicBool::new(false),
        }
    }

    /// Dialed peers never pick up.
    pub fn unanswered(self) -> Self {
        self.connect_on_dial.store(false, Ordering::SeqCst);
        self
    }

    /// `open` never resolves, so the session stays in INITIALIZING.
    pub fn hanging(self) -> Self {
        self.hang_on_open.store(true, Ordering::SeqCst);
        self
    }

    /// Every dial is rejected as unreachable.
    pub fn unreachable(self) -> Self {
        self.fail_dial.store(true, Ordering::SeqCst);
        self
    }

    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.events.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn ring(&self, from: &str) -> bool {
        self.emit(TransportEvent::IncomingCall(IncomingCall {
            call_id: format!("call-from-{}", from),
            from: from.to_string(),
        }))
    }

    pub fn dials(&self) -> Vec<String> {
        self.dials.lock().unwrap().clone()
    }

    pub fn answers(&self) -> Vec<IncomingCall> {
        self.answers.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn remote_stream() -> MediaStream {
        MediaStream::new(vec![
            MediaTrack::new(TrackKind::Audio, "remote microphone"),
            MediaTrack::new(TrackKind::Video, "remote camera"),
        ])
    }
}

#[async_trait]
impl PeerTransport for ScriptedTransport {
    async fn open(&self, events: mpsc::UnboundedSender<TransportEvent>) -> Result<String, VideoCallError> {
        *self.events.lock().unwrap() = Some(events);
        if self.hang_on_open.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        self.log.push("transport.open");
        Ok(self.address.clone())
    }

    async fn dial(&self, remote_address: &str, local: MediaStream) -> Result<(), VideoCallError> {
        self.log.push(format!("dial:{}", remote_address));
        self.dials.lock().unwrap().push(remote_address.to_string());
        if self.fail_dial.load(Ordering::SeqCst) {
            return Err(VideoCallError::Call {
                message: format!("Peer {} is unreachable", remote_address),
            });
        }
        self.sent.lock().unwrap().push(local);
        if self.connect_on_dial.load(Ordering::SeqCst) {
            self.emit(TransportEvent::RemoteStream(Self::remote_stream()));
        }
        Ok(())
    }

    async fn answer(&self, call: &IncomingCall, local: MediaStream) -> Result<(), VideoCallError> {
        self.log.push(format!("answer:{}", call.from));
        self.answers.lock().unwrap().push(call.clone());
        self.sent.lock().unwrap().push(local);
        self.emit(TransportEvent::RemoteStream(Self::remote_stream()));
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let media_live = self.sent.lock().unwrap().iter().any(MediaStream::is_active);
        if media_live {
            self.log.push("transport.close:media-live");
        } else {
            self.log.push("transport.close");
        }
        self.events.lock().unwrap().take();
    }
}

// ==============================================================================
// SURFACE
// ==============================================================================

pub struct RecordingSurface {
    log: EventLog,
    pub locals: Mutex<Vec<String>>,
    pub remotes: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub outcomes: Mutex<Vec<CallOutcome>>,
}

impl RecordingSurface {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            locals: Mutex::new(Vec::new()),
            remotes: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            outcomes: Mutex::new(Vec::new()),
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }
}

impl CallSurface for RecordingSurface {
    fn attach_local(&self, stream: &MediaStream) {
        self.locals.lock().unwrap().push(stream.id().to_string());
    }

    fn attach_remote(&self, stream: &MediaStream) {
        self.remotes.lock().unwrap().push(stream.id().to_string());
    }

    fn show_error(&self, error: &VideoCallError) {
        self.errors.lock().unwrap().push(error.to_string());
    }

    fn navigate_away(&self, outcome: &CallOutcome) {
        self.log.push("navigate");
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

// ==============================================================================
// HARNESS
// ==============================================================================

pub struct CallHarness {
    pub appointment_id: Uuid,
    pub log: EventLog,
    pub store: Arc<RecordingStore>,
    pub devices: Arc<RecordingMediaDevices>,
    pub transport: Arc<ScriptedTransport>,
    pub surface: Arc<RecordingSurface>,
}

impl CallHarness {
    /// One CONFIRMED appointment with the given call addresses already set.
    pub async fn new(local_address: &str, worker_peer_id: Option<&str>, client_peer_id: Option<&str>) -> Self {
        let log = EventLog::default();
        let appointment_id = Uuid::new_v4();

        let store = RecordingStore::new(log.clone());
        let mut appointment = Appointment::new(appointment_id);
        appointment.worker_peer_id = worker_peer_id.map(str::to_string);
        appointment.client_peer_id = client_peer_id.map(str::to_string);
        store.inner.insert(appointment).await;

        Self {
            appointment_id,
            store: Arc::new(store),
            devices: Arc::new(RecordingMediaDevices::default()),
            transport: Arc::new(ScriptedTransport::new(local_address, log.clone())),
            surface: Arc::new(RecordingSurface::new(log.clone())),
            log,
        }
    }

    pub fn with_devices(mut self, devices: RecordingMediaDevices) -> Self {
        self.devices = Arc::new(devices);
        self
    }

    pub fn with_transport(mut self, configure: impl FnOnce(ScriptedTransport) -> ScriptedTransport) -> Self {
        let fresh = ScriptedTransport::new(&self.transport.address, self.log.clone());
        self.transport = Arc::new(configure(fresh));
        self
    }

    pub fn deps(&self) -> CallSessionDeps {
        CallSessionDeps {
            store: self.store.clone(),
            media_devices: self.devices.clone(),
            transport: self.transport.clone(),
            surface: self.surface.clone(),
        }
    }

    pub fn start(&self, role: ParticipantRole) -> (JoinHandle<CallOutcome>, CallHandle) {
        self.start_with(role, CallSettings::default())
    }

    pub fn start_with(&self, role: ParticipantRole, settings: CallSettings) -> (JoinHandle<CallOutcome>, CallHandle) {
        let identity = match role {
            ParticipantRole::Worker => TestIdentity::worker("Marta Physio"),
            ParticipantRole::Client => TestIdentity::client("Jon Client"),
        };
        let (session, handle) = CallSession::new(
            self.appointment_id,
            identity.to_session_context(),
            settings,
            self.deps(),
        );
        (session.spawn(), handle)
    }

    pub async fn appointment(&self) -> Appointment {
        self.store.inner.snapshot(self.appointment_id).await.unwrap()
    }
}
