use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::models::DoctorError;
use doctor_cell::SlotTime;
use shared_database::{database_error, DatabaseError};
use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub appointment_code: String,
    pub patient_id: String,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub reason: String,
    #[serde(default)]
    pub symptoms: String,
    pub patient_name: String,
    pub patient_age: u32,
    pub patient_gender: String,
    pub patient_phone: String,
    #[serde(default)]
    pub emergency_contact: String,
    pub status: AppointmentStatus,
    pub consultation_fee: f64,
    #[serde(default)]
    pub payment_status: bool,
    pub payment_method: Option<String>,
    pub payment_id: Option<String>,
    pub company_fee: Option<f64>,
    pub refund_amount: Option<f64>,
    #[serde(default)]
    pub refunded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn slot_time(&self) -> SlotTime {
        SlotTime::from_naive_time(self.appointment_time)
    }

    pub fn is_owned_by_patient(&self, user_id: &str) -> bool {
        self.patient_id == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(AppointmentError::ValidationError(format!("Unknown status: {}", other))),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    /// Accepts `"9:00 AM"` as well as `"09:00:00"`.
    pub appointment_time: SlotTime,
    pub reason: String,
    #[serde(default)]
    pub symptoms: String,
    pub patient_name: String,
    pub patient_age: u32,
    pub patient_gender: String,
    pub patient_phone: String,
    #[serde(default)]
    pub emergency_contact: String,
    #[serde(default)]
    pub payment_status: bool,
    pub payment_method: Option<String>,
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<SlotTime>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub doctor: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

/// What the booking flow needs to know about someone else's appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookedAppointment {
    pub id: Uuid,
    pub appointment_time: NaiveTime,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct CancellationOutcome {
    pub company_fee: f64,
    pub refund_amount: f64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Only customers can book appointments")]
    CustomersOnly,

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Cannot move a {from} appointment to {to}")]
    TransitionNotAllowed { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Appointments can only be rescheduled more than one day in advance")]
    RescheduleWindowClosed,

    #[error(transparent)]
    Doctor(#[from] DoctorError),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound(err.to_string()),
            AppointmentError::CustomersOnly | AppointmentError::Unauthorized => {
                AppError::Forbidden(err.to_string())
            }
            AppointmentError::InvalidStatusTransition(_)
            | AppointmentError::TransitionNotAllowed { .. }
            | AppointmentError::RescheduleWindowClosed
            | AppointmentError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            AppointmentError::Doctor(doctor_err) => doctor_err.into(),
        }
    }
}

/// Maps an error coming out of the booking service to its HTTP form.
pub fn map_service_error(err: anyhow::Error) -> AppError {
    let err = match err.downcast::<AppointmentError>() {
        Ok(appointment_err) => return appointment_err.into(),
        Err(err) => err,
    };

    if err.is::<DoctorError>() || err.is::<doctor_cell::ScheduleError>() {
        return doctor_cell::models::map_service_error(err);
    }

    match database_error(&err) {
        Some(DatabaseError::Conflict(_)) => {
            AppError::Conflict("The selected time slot is no longer available".to_string())
        }
        Some(DatabaseError::Auth(msg)) => AppError::Auth(msg.clone()),
        Some(DatabaseError::NotFound(_)) => AppError::NotFound("Resource not found".to_string()),
        Some(DatabaseError::Api { .. }) => AppError::Database(err.to_string()),
        None => AppError::Internal(err.to_string()),
    }
}
