pub mod handlers;
pub mod router;
pub mod models;
pub mod services;

pub use models::*;
pub use services::*;

pub use services::schedule::{
    ampm_to_time24, expand_weekdays_to_dates, parse_weekday, resolve_bookable_slots,
    time24_to_ampm, upcoming_dates, DoctorAvailability, ScheduleError, SlotRange, SlotTime,
};
