pub mod availability;
pub mod doctor;
pub mod schedule;

pub use availability::{AvailabilityService, MAX_WINDOW_DAYS};
pub use doctor::DoctorService;
