pub mod memory;
pub mod store;

pub use memory::InMemoryAppointmentStore;
pub use store::{AppointmentStore, RestAppointmentStore};
