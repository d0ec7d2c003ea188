// libs/appointment-cell/src/services/memory.rs
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentPatch};
use crate::services::store::AppointmentStore;

/// Process-local appointment store.
///
/// Keeps a log of every applied patch and counts reads.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
    patches: Mutex<Vec<(Uuid, AppointmentPatch)>>,
    reads: AtomicUsize,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, appointment: Appointment) {
        self.appointments.write().await.insert(appointment.id, appointment);
    }

    pub async fn snapshot(&self, appointment_id: Uuid) -> Option<Appointment> {
        self.appointments.read().await.get(&appointment_id).cloned()
    }

    pub async fn patches(&self) -> Vec<(Uuid, AppointmentPatch)> {
        self.patches.lock().await.clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.appointments
            .read()
            .await
            .get(&appointment_id)
            .cloned()
            .ok_or(AppointmentError::NotFound(appointment_id))
    }

    async fn update_appointment(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<(), AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&appointment_id)
            .ok_or(AppointmentError::NotFound(appointment_id))?;

        appointment.apply(&patch)?;
        debug!("Applied {:?} to appointment {}", patch, appointment_id);
        self.patches.lock().await.push((appointment_id, patch));
        Ok(())
    }
}
