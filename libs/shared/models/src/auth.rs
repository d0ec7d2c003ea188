use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Functional identity of a participant in an appointment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    /// Clinic worker (clinician). Answers calls and owns the appointment status.
    Worker,
    /// Client (patient). Places the outbound call.
    Client,
}

impl ParticipantRole {
    pub fn counterpart(&self) -> ParticipantRole {
        match self {
            ParticipantRole::Worker => ParticipantRole::Client,
            ParticipantRole::Client => ParticipantRole::Worker,
        }
    }

    /// Appointment field holding this role's call address.
    pub fn peer_id_field(&self) -> &'static str {
        match self {
            ParticipantRole::Worker => "worker_peer_id",
            ParticipantRole::Client => "client_peer_id",
        }
    }

    pub fn is_caller(&self) -> bool {
        matches!(self, ParticipantRole::Client)
    }

    pub fn can_complete_appointment(&self) -> bool {
        matches!(self, ParticipantRole::Worker)
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantRole::Worker => write!(f, "worker"),
            ParticipantRole::Client => write!(f, "client"),
        }
    }
}

impl FromStr for ParticipantRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "worker" => Ok(ParticipantRole::Worker),
            "client" => Ok(ParticipantRole::Client),
            other => Err(AppError::ValidationError(format!("Unknown role: {}", other))),
        }
    }
}

/// The signed-in user as seen by a call page.
///
/// Passed explicitly into the call session instead of being read from
/// ambient application state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub role: ParticipantRole,
    pub display_name: Option<String>,
    pub auth_token: Option<String>,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            display_name: None,
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}
