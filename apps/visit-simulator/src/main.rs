use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, Context};
use chrono::Utc;
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use appointment_cell::{Appointment, InMemoryAppointmentStore, ParticipantSummary};
use shared_config::AppConfig;
use shared_models::{ParticipantRole, SessionContext};
use video_call_cell::{
    CallOutcome, CallSession, CallSessionDeps, CallSettings, CallState, CallSurface,
    LoopbackExchange, MediaStream, SyntheticMediaDevices, VideoCallError,
};

/// Call page stand-in that writes what it would render to the log.
struct LoggingSurface {
    who: &'static str,
}

impl CallSurface for LoggingSurface {
    fn attach_local(&self, stream: &MediaStream) {
        info!("[{}] local preview {} ({} tracks)", self.who, stream.id(), stream.tracks().len());
    }

    fn attach_remote(&self, stream: &MediaStream) {
        info!("[{}] remote video {}", self.who, stream.id());
    }

    fn show_error(&self, error: &VideoCallError) {
        warn!("[{}] {}", self.who, error);
    }

    fn navigate_away(&self, outcome: &CallOutcome) {
        info!("[{}] leaving call page: {}", self.who, outcome.reason);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,video_call_cell=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting virtual visit simulation");

    let config = AppConfig::from_env();
    let mut settings = CallSettings::from(&config);
    settings.poll_interval = settings.poll_interval.min(Duration::from_millis(500));
    let call_length = Duration::from_secs(
        std::env::var("SIM_CALL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3),
    );

    // One confirmed appointment, nobody in the room yet
    let store = Arc::new(InMemoryAppointmentStore::new());
    let appointment_id = Uuid::new_v4();
    let mut appointment = Appointment::new(appointment_id);
    appointment.scheduled_at = Some(Utc::now());
    appointment.worker = Some(ParticipantSummary { id: Some(Uuid::new_v4()), full_name: "Marta Physio".into() });
    appointment.client = Some(ParticipantSummary { id: Some(Uuid::new_v4()), full_name: "Jon Client".into() });
    store.insert(appointment).await;

    let exchange = LoopbackExchange::new();
    let session_for = |role: ParticipantRole, who: &'static str| {
        let deps = CallSessionDeps {
            store: store.clone(),
            media_devices: Arc::new(SyntheticMediaDevices::new(who)),
            transport: Arc::new(exchange.peer()),
            surface: Arc::new(LoggingSurface { who }),
        };
        let context = SessionContext::new(Uuid::new_v4().to_string(), role).with_display_name(who);
        CallSession::new(appointment_id, context, settings.clone(), deps)
    };

    // The client usually opens the page first and has to wait for the worker
    let (client_session, client) = session_for(ParticipantRole::Client, "client");
    let client_run = client_session.spawn();
    client.wait_for(|s| *s == CallState::WaitingForRemote).await;

    let (worker_session, worker) = session_for(ParticipantRole::Worker, "worker");
    let worker_run = worker_session.spawn();

    let connected = tokio::time::timeout(Duration::from_secs(30), async {
        tokio::join!(
            worker.wait_for(CallState::is_in_call),
            client.wait_for(CallState::is_in_call)
        )
    })
    .await
    .context("participants never connected")?;
    if !matches!(connected, (Some(CallState::InCall), Some(CallState::InCall))) {
        worker.unmount();
        client.unmount();
        return Err(anyhow!("call ended before both sides connected: {:?}", connected));
    }

    info!("Both participants in call, talking for {:?}", call_length);
    client.set_camera_enabled(false);
    tokio::time::sleep(call_length).await;

    worker.end_call();
    let worker_outcome = worker_run.await?;
    let client_outcome = client_run.await?;
    info!("Worker session ended: {:?}", worker_outcome);
    info!("Client session ended: {:?}", client_outcome);

    let appointment = store
        .snapshot(appointment_id)
        .await
        .ok_or_else(|| anyhow!("appointment {} disappeared", appointment_id))?;
    info!(
        "Appointment {} is now {} (worker_peer_id={:?}, client_peer_id={:?})",
        appointment.id, appointment.status, appointment.worker_peer_id, appointment.client_peer_id
    );

    Ok(())
}
