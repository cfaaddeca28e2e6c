use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::models::{AppointmentError, AppointmentStatus};

const SECONDS_PER_DAY: f64 = 86_400.0;

pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::TransitionNotAllowed {
                from: current_status,
                to: new_status,
            });
        }

        info!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![AppointmentStatus::Confirmed, AppointmentStatus::Cancelled],
            AppointmentStatus::Confirmed => vec![AppointmentStatus::Completed, AppointmentStatus::Cancelled],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Only upcoming appointments can be moved or cancelled by the patient.
    pub fn ensure_modifiable(&self, current_status: AppointmentStatus) -> Result<(), AppointmentError> {
        match current_status {
            AppointmentStatus::Pending | AppointmentStatus::Confirmed => Ok(()),
            other => Err(AppointmentError::InvalidStatusTransition(other)),
        }
    }

    /// Whole days, rounded up, from `now` until the start of `appointment_date`.
    pub fn days_until(&self, appointment_date: NaiveDate, now: NaiveDateTime) -> i64 {
        let seconds = (appointment_date.and_time(chrono::NaiveTime::MIN) - now).num_seconds();
        (seconds as f64 / SECONDS_PER_DAY).ceil() as i64
    }

    /// Reschedule is open while the appointment is more than one day away.
    pub fn ensure_reschedulable(
        &self,
        current_status: AppointmentStatus,
        appointment_date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<(), AppointmentError> {
        self.ensure_modifiable(current_status)?;

        if self.days_until(appointment_date, now) <= 1 {
            return Err(AppointmentError::RescheduleWindowClosed);
        }
        Ok(())
    }
}
