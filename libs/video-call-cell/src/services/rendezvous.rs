// libs/video-call-cell/src/services/rendezvous.rs
use futures::stream::{self, AbortHandle, Abortable, BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::{AppointmentError, AppointmentPatch, AppointmentStore};
use shared_models::ParticipantRole;

use crate::models::{CallSettings, DiscoveryEvent, VideoCallError};

/// Exchanges call addresses through the appointment record.
///
/// There is no push channel: each participant writes its own
/// `<role>_peer_id` field and polls the other one.
#[derive(Clone)]
pub struct RendezvousClient {
    store: Arc<dyn AppointmentStore>,
    poll_interval: Duration,
    discovery_timeout: Option<Duration>,
    publish_attempts: u32,
    publish_backoff: Duration,
}

impl RendezvousClient {
    pub fn new(store: Arc<dyn AppointmentStore>, settings: &CallSettings) -> Self {
        Self {
            store,
            poll_interval: settings.poll_interval,
            discovery_timeout: settings.discovery_timeout,
            publish_attempts: settings.publish_attempts.max(1),
            publish_backoff: settings.publish_backoff,
        }
    }

    /// Writes `{role}_peer_id = address`, retrying transient failures with
    /// doubling backoff.
    #[instrument(skip(self))]
    pub async fn publish_local_address(
        &self,
        appointment_id: Uuid,
        role: ParticipantRole,
        address: &str,
    ) -> Result<(), VideoCallError> {
        let mut backoff = self.publish_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let patch = AppointmentPatch::publish_address(role, address);

            match self.store.update_appointment(appointment_id, patch).await {
                Ok(()) => {
                    info!("Published {} call address for appointment {}", role, appointment_id);
                    return Ok(());
                }
                Err(e) if attempt < self.publish_attempts && is_transient(&e) => {
                    warn!(
                        "Publishing call address failed (attempt {}/{}): {}",
                        attempt, self.publish_attempts, e
                    );
                    sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    return Err(VideoCallError::Publish {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Clears this participant's own address field.
    pub async fn clear_local_address(
        &self,
        appointment_id: Uuid,
        role: ParticipantRole,
    ) -> Result<(), VideoCallError> {
        self.store
            .update_appointment(appointment_id, AppointmentPatch::clear_address(role))
            .await?;
        debug!("Cleared {} call address on appointment {}", role, appointment_id);
        Ok(())
    }

    /// One-off read of the other participant's address.
    pub async fn fetch_remote_address(
        &self,
        appointment_id: Uuid,
        role: ParticipantRole,
    ) -> Result<Option<String>, VideoCallError> {
        let appointment = self.store.get_appointment(appointment_id).await?;
        Ok(appointment.peer_address(role.counterpart()).map(str::to_string))
    }

    /// Starts polling for the other participant's address.
    ///
    /// Nothing is fetched until the returned stream is polled. The first
    /// read happens one interval after that. The stream yields a single
    /// event and ends, or ends without yielding once cancelled.
    pub fn poll_for_remote_address(
        &self,
        appointment_id: Uuid,
        role: ParticipantRole,
    ) -> RemoteAddressWatch {
        let poller = Poller {
            store: self.store.clone(),
            appointment_id,
            watched: role.counterpart(),
            interval: self.poll_interval,
            timeout: self.discovery_timeout,
            started: None,
            polls: 0,
            finished: false,
        };

        let events = stream::unfold(poller, |mut poller| async move {
            let event = poller.next_event().await?;
            Some((event, poller))
        })
        .boxed();

        let (handle, registration) = AbortHandle::new_pair();
        RemoteAddressWatch {
            inner: Abortable::new(events, registration),
            handle,
        }
    }
}

fn is_transient(error: &AppointmentError) -> bool {
    matches!(error, AppointmentError::Api(_) | AppointmentError::Decode(_))
}

struct Poller {
    store: Arc<dyn AppointmentStore>,
    appointment_id: Uuid,
    watched: ParticipantRole,
    interval: Duration,
    timeout: Option<Duration>,
    started: Option<Instant>,
    polls: u64,
    finished: bool,
}

impl Poller {
    async fn next_event(&mut self) -> Option<DiscoveryEvent> {
        if self.finished {
            return None;
        }
        let started = *self.started.get_or_insert_with(Instant::now);

        loop {
            sleep(self.interval).await;

            if let Some(limit) = self.timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    info!(
                        "No {} address on appointment {} after {:?}",
                        self.watched, self.appointment_id, waited
                    );
                    self.finished = true;
                    return Some(DiscoveryEvent::TimedOut { waited, polls: self.polls });
                }
            }

            self.polls += 1;
            match self.store.get_appointment(self.appointment_id).await {
                Ok(appointment) => {
                    if let Some(address) = appointment.peer_address(self.watched) {
                        info!(
                            "Discovered {} address for appointment {} after {} poll(s)",
                            self.watched, self.appointment_id, self.polls
                        );
                        self.finished = true;
                        return Some(DiscoveryEvent::Discovered(address.to_string()));
                    }
                    debug!("Poll {}: {} not available yet", self.polls, self.watched);
                }
                Err(e) => warn!("Poll {} for appointment {} failed: {}", self.polls, self.appointment_id, e),
            }
        }
    }
}

/// Cancellable stream of address discovery events.
pub struct RemoteAddressWatch {
    inner: Abortable<BoxStream<'static, DiscoveryEvent>>,
    handle: AbortHandle,
}

impl RemoteAddressWatch {
    /// Stops polling. No store read is issued after this returns.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }
}

impl Stream for RemoteAddressWatch {
    type Item = DiscoveryEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for RemoteAddressWatch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
