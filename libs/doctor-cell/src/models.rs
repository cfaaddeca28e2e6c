use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::{database_error, DatabaseError};
use shared_models::error::AppError;

use crate::services::schedule::{DoctorAvailability, ScheduleError, SlotTime};

pub const DEFAULT_CONSULTATION_FEE: f64 = 500.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: String,
    pub doctor_code: String,
    pub full_name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub qualification: String,
    #[serde(default)]
    pub license_number: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub available_days: Vec<String>,
    #[serde(default)]
    pub available_time_slots: Vec<String>,
    #[serde(default = "default_consultation_fee")]
    pub consultation_fee: f64,
    #[serde(default)]
    pub is_profile_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_consultation_fee() -> f64 {
    DEFAULT_CONSULTATION_FEE
}

impl Doctor {
    /// Stored availability; entries that no longer parse are skipped.
    pub fn availability(&self) -> DoctorAvailability {
        DoctorAvailability::parse_lenient(&self.available_days, &self.available_time_slots)
    }
}

pub fn profile_complete(
    specialty: &str,
    experience: &str,
    qualification: &str,
    bio: &str,
    available_days: &[String],
    available_time_slots: &[String],
) -> bool {
    [specialty, experience, qualification, bio]
        .iter()
        .all(|field| !field.trim().is_empty())
        && !available_days.is_empty()
        && !available_time_slots.is_empty()
}

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDoctorRequest {
    pub user_id: String,
    pub full_name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub qualification: String,
    #[serde(default)]
    pub license_number: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub available_days: Vec<String>,
    #[serde(default)]
    pub available_time_slots: Vec<String>,
    pub consultation_fee: Option<f64>,
}

/// Partial update of the caller's own profile. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDoctorProfileRequest {
    pub full_name: Option<String>,
    pub specialty: Option<String>,
    pub experience: Option<String>,
    pub qualification: Option<String>,
    pub license_number: Option<String>,
    pub bio: Option<String>,
    pub available_days: Option<Vec<String>>,
    pub available_time_slots: Option<Vec<String>>,
    pub consultation_fee: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorListQuery {
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailableDatesQuery {
    pub count: Option<usize>,
    pub window_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: NaiveDate,
    /// The caller's own appointment when rescheduling; its time stays offered.
    pub exclude_appointment: Option<Uuid>,
}

// ==============================================================================
// RESPONSES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookedSlot {
    pub appointment_id: Uuid,
    pub date: NaiveDate,
    pub time: SlotTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableDatesResponse {
    pub doctor_id: Uuid,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableSlotsResponse {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<SlotTime>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Doctor profile already exists for user {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("Doctor is not available on {0}")]
    DateNotOffered(NaiveDate),

    #[error("{0} is not one of the doctor's consultation slots")]
    SlotNotOffered(SlotTime),

    #[error("The {0} slot on {1} is already booked")]
    SlotTaken(SlotTime, NaiveDate),

    #[error("Appointment date cannot be in the past")]
    PastDate,

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => AppError::NotFound(err.to_string()),
            DoctorError::AlreadyExists(_) | DoctorError::SlotTaken(..) => {
                AppError::Conflict(err.to_string())
            }
            DoctorError::Schedule(_)
            | DoctorError::DateNotOffered(_)
            | DoctorError::SlotNotOffered(_)
            | DoctorError::PastDate
            | DoctorError::ValidationError(_) => AppError::ValidationError(err.to_string()),
        }
    }
}

/// Maps an error coming out of a doctor-cell service to its HTTP form.
pub fn map_service_error(err: anyhow::Error) -> AppError {
    let err = match err.downcast::<DoctorError>() {
        Ok(doctor_err) => return doctor_err.into(),
        Err(err) => err,
    };
    let err = match err.downcast::<ScheduleError>() {
        Ok(schedule_err) => return DoctorError::from(schedule_err).into(),
        Err(err) => err,
    };

    match database_error(&err) {
        Some(DatabaseError::Auth(msg)) => AppError::Auth(msg.clone()),
        Some(DatabaseError::NotFound(_)) => AppError::NotFound("Resource not found".to_string()),
        Some(DatabaseError::Conflict(msg)) => AppError::Conflict(msg.clone()),
        Some(DatabaseError::Api { .. }) => AppError::Database(err.to_string()),
        None => AppError::Internal(err.to_string()),
    }
}
