pub mod auth;
pub mod error;

pub use auth::{ParticipantRole, SessionContext};
pub use error::AppError;
