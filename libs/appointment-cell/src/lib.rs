//! # Appointment Cell
//!
//! Read/update access to appointment records for virtual appointments.
//! Callers only touch the call-address fields and the status field.
//!
//! - `GET /appointments/{id}` returns the record
//! - `PATCH /appointments/{id}` writes a single field

pub mod models;
pub mod services;

pub use models::{
    Appointment, AppointmentError, AppointmentPatch, AppointmentStatus, ParticipantSummary,
};
pub use services::{AppointmentStore, InMemoryAppointmentStore, RestAppointmentStore};
