// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;

use shared_models::ParticipantRole;

// ==============================================================================
// APPOINTMENT RECORD (subset used by virtual appointments)
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub worker_peer_id: Option<String>,
    #[serde(default)]
    pub client_peer_id: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub worker: Option<ParticipantSummary>,
    #[serde(default)]
    pub client: Option<ParticipantSummary>,
}

impl Appointment {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            status: AppointmentStatus::Confirmed,
            worker_peer_id: None,
            client_peer_id: None,
            scheduled_at: None,
            worker: None,
            client: None,
        }
    }

    /// Call address published by `role`, if any. Blank values count as absent.
    pub fn peer_address(&self, role: ParticipantRole) -> Option<&str> {
        let field = match role {
            ParticipantRole::Worker => &self.worker_peer_id,
            ParticipantRole::Client => &self.client_peer_id,
        };
        field.as_deref().filter(|address| !address.trim().is_empty())
    }

    pub fn display_name(&self, role: ParticipantRole) -> Option<&str> {
        let participant = match role {
            ParticipantRole::Worker => &self.worker,
            ParticipantRole::Client => &self.client,
        };
        participant.as_ref().map(|p| p.full_name.as_str())
    }

    /// Applies a patch locally, mirroring what the backend does on PATCH.
    pub fn apply(&mut self, patch: &AppointmentPatch) -> Result<(), AppointmentError> {
        match patch {
            AppointmentPatch::PeerAddress { role, address } => {
                let field = match role {
                    ParticipantRole::Worker => &mut self.worker_peer_id,
                    ParticipantRole::Client => &mut self.client_peer_id,
                };
                *field = address.clone();
            }
            AppointmentPatch::Status(next) => {
                if !self.status.can_transition_to(next) {
                    return Err(AppointmentError::InvalidStatusTransition {
                        from: self.status,
                        to: *next,
                    });
                }
                self.status = *next;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantSummary {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub full_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    #[serde(alias = "confirmed")]
    Confirmed,
    #[serde(alias = "completed")]
    Completed,
    #[serde(alias = "cancelled")]
    Cancelled,
}

impl AppointmentStatus {
    pub fn can_transition_to(&self, next: &AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (AppointmentStatus::Confirmed, AppointmentStatus::Completed)
                | (AppointmentStatus::Confirmed, AppointmentStatus::Cancelled)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Confirmed => write!(f, "CONFIRMED"),
            AppointmentStatus::Completed => write!(f, "COMPLETED"),
            AppointmentStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// ==============================================================================
// PATCHES
// ==============================================================================

/// Single-field write against an appointment record.
///
/// Every patch touches exactly one field so that the two participants never
/// write the same field.
#[derive(Debug, Clone, PartialEq)]
pub enum AppointmentPatch {
    /// `{ "<role>_peer_id": address }`; `None` clears the field.
    PeerAddress {
        role: ParticipantRole,
        address: Option<String>,
    },
    /// `{ "status": "COMPLETED" }`
    Status(AppointmentStatus),
}

impl AppointmentPatch {
    pub fn publish_address(role: ParticipantRole, address: impl Into<String>) -> Self {
        AppointmentPatch::PeerAddress {
            role,
            address: Some(address.into()),
        }
    }

    pub fn clear_address(role: ParticipantRole) -> Self {
        AppointmentPatch::PeerAddress { role, address: None }
    }

    pub fn complete() -> Self {
        AppointmentPatch::Status(AppointmentStatus::Completed)
    }

    pub fn to_body(&self) -> Value {
        match self {
            AppointmentPatch::PeerAddress { role, address } => {
                let mut body = serde_json::Map::new();
                body.insert(role.peer_id_field().to_string(), json!(address));
                Value::Object(body)
            }
            AppointmentPatch::Status(status) => json!({ "status": status }),
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Unauthorized access to appointment: {0}")]
    Unauthorized(String),

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment store error: {0}")]
    Api(String),

    #[error("Failed to decode appointment: {0}")]
    Decode(String),
}
