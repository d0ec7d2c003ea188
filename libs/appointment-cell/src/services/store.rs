// libs/appointment-cell/src/services/store.rs
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::ApiClient;
use shared_models::{AppError, SessionContext};

use crate::models::{Appointment, AppointmentError, AppointmentPatch};

/// Appointment records shared by both participants of a call.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError>;

    async fn update_appointment(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<(), AppointmentError>;
}

/// Appointment store backed by the clinic REST API.
pub struct RestAppointmentStore {
    api: ApiClient,
    auth_token: Option<String>,
}

impl RestAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            api: ApiClient::new(config),
            auth_token: config.auth_token.clone(),
        }
    }

    /// Store acting as the signed-in user. Falls back to the configured
    /// token when the session carries none.
    pub fn for_session(config: &AppConfig, context: &SessionContext) -> Self {
        let store = Self::new(config);
        match &context.auth_token {
            Some(token) => store.with_auth_token(token.clone()),
            None => store,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn map_error(appointment_id: Uuid, err: anyhow::Error) -> AppointmentError {
        match err.downcast_ref::<AppError>() {
            Some(AppError::NotFound(_)) => AppointmentError::NotFound(appointment_id),
            Some(AppError::Auth(msg)) => AppointmentError::Unauthorized(msg.clone()),
            Some(AppError::Internal(msg)) => AppointmentError::Decode(msg.clone()),
            Some(other) => AppointmentError::Api(other.to_string()),
            None => AppointmentError::Api(err.to_string()),
        }
    }
}

#[async_trait]
impl AppointmentStore for RestAppointmentStore {
    #[instrument(skip(self))]
    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let path = format!("/appointments/{}", appointment_id);

        let appointment: Appointment = self
            .api
            .request(Method::GET, &path, self.auth_token.as_deref(), None)
            .await
            .map_err(|e| Self::map_error(appointment_id, e))?;

        debug!("Fetched appointment {} with status {}", appointment.id, appointment.status);
        Ok(appointment)
    }

    #[instrument(skip(self))]
    async fn update_appointment(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<(), AppointmentError> {
        let path = format!("/appointments/{}", appointment_id);
        let body = patch.to_body();

        let _response: Value = self
            .api
            .request(Method::PATCH, &path, self.auth_token.as_deref(), Some(body))
            .await
            .map_err(|e| {
                error!("Failed to patch appointment {}: {}", appointment_id, e);
                Self::map_error(appointment_id, e)
            })?;

        info!("Patched appointment {}", appointment_id);
        Ok(())
    }
}
