use std::sync::Arc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{ParticipantRole, SessionContext};

pub struct TestConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub poll_interval_ms: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:54321".to_string(),
            api_key: "test-api-key".to_string(),
            poll_interval_ms: 3_000,
        }
    }
}

impl TestConfig {
    pub fn with_base_url(url: impl Into<String>) -> Self {
        Self {
            api_base_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            api_base_url: self.api_base_url.clone(),
            api_key: self.api_key.clone(),
            auth_token: Some("test-token".to_string()),
            poll_interval_ms: self.poll_interval_ms,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestIdentity {
    pub id: String,
    pub name: String,
    pub role: ParticipantRole,
}

impl TestIdentity {
    pub fn new(name: &str, role: ParticipantRole) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            role,
        }
    }

    pub fn worker(name: &str) -> Self {
        Self::new(name, ParticipantRole::Worker)
    }

    pub fn client(name: &str) -> Self {
        Self::new(name, ParticipantRole::Client)
    }

    pub fn to_session_context(&self) -> SessionContext {
        SessionContext::new(self.id.clone(), self.role)
            .with_display_name(self.name.clone())
            .with_auth_token("test-token")
    }
}

pub struct MockApiResponses;

impl MockApiResponses {
    /// Appointment record as returned by `GET /appointments/{id}`.
    pub fn appointment(
        appointment_id: Uuid,
        worker_peer_id: Option<&str>,
        client_peer_id: Option<&str>,
        status: &str,
    ) -> Value {
        json!({
            "id": appointment_id,
            "status": status,
            "worker_peer_id": worker_peer_id,
            "client_peer_id": client_peer_id,
            "scheduled_at": "2026-03-02T09:30:00Z",
            "worker": {
                "id": Uuid::new_v4(),
                "full_name": "Marta Physio"
            },
            "client": {
                "id": Uuid::new_v4(),
                "full_name": "Jon Client"
            }
        })
    }

    pub fn confirmed_appointment(appointment_id: Uuid) -> Value {
        Self::appointment(appointment_id, None, None, "CONFIRMED")
    }

    pub fn not_found() -> Value {
        json!({
            "error": "appointment not found"
        })
    }
}
