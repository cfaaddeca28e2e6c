use anyhow::{anyhow, Result};
use chrono::{Local, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use doctor_cell::services::{AvailabilityService, DoctorService};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{Role, User};
use shared_utils::codes::next_sequential_code;

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentStatus, BookAppointmentRequest,
    BookedAppointment, CancellationOutcome, RescheduleAppointmentRequest,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::pricing::CancellationPolicy;

const APPOINTMENT_CODE_PREFIX: &str = "APT";
const APPOINTMENT_CODE_WIDTH: usize = 5;
const MAX_PATIENT_AGE: u32 = 150;

#[derive(Debug, Deserialize)]
struct AppointmentCodeRow {
    appointment_code: Option<String>,
}

/// Result of a list request: the booking flow only gets ids and times for
/// other people's appointments, owners get full rows.
#[derive(Debug)]
pub enum AppointmentListing {
    Booked(Vec<BookedAppointment>),
    Full(Vec<Appointment>),
}

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    doctors: DoctorService,
    availability: AvailabilityService,
    lifecycle_service: AppointmentLifecycleService,
    cancellation_policy: CancellationPolicy,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
            availability: AvailabilityService::new(config),
            lifecycle_service: AppointmentLifecycleService::new(),
            cancellation_policy: CancellationPolicy::new(config),
        }
    }

    pub async fn list_appointments(
        &self,
        user: &User,
        query: AppointmentListQuery,
        auth_token: &str,
    ) -> Result<AppointmentListing> {
        if let (Some(doctor_id), Some(date)) = (query.doctor, query.date) {
            let path = format!(
                "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=neq.cancelled&select=id,appointment_time&order=appointment_time.asc",
                doctor_id, date
            );
            let booked: Vec<BookedAppointment> =
                self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
            debug!("{} booked appointments for doctor {} on {}", booked.len(), doctor_id, date);
            return Ok(AppointmentListing::Booked(booked));
        }

        let mut query_parts = match user.parsed_role() {
            Some(Role::Customer) => vec![format!("patient_id=eq.{}", urlencoding::encode(&user.id))],
            Some(Role::Doctor) => match self.doctors.find_by_user(&user.id, auth_token).await? {
                Some(doctor) => vec![format!("doctor_id=eq.{}", doctor.id)],
                None => return Ok(AppointmentListing::Full(Vec::new())),
            },
            _ => return Err(AppointmentError::Unauthorized.into()),
        };

        if let Some(date) = query.date {
            query_parts.push(format!("appointment_date=eq.{}", date));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=appointment_date.desc,appointment_time.desc",
            query_parts.join("&")
        );
        let appointments: Vec<Appointment> =
            self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        Ok(AppointmentListing::Full(appointments))
    }

    pub async fn book_appointment(
        &self,
        user: &User,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment> {
        if user.parsed_role() != Some(Role::Customer) {
            return Err(AppointmentError::CustomersOnly.into());
        }
        validate_patient_details(&request)?;

        let doctor = self.doctors.get_doctor(request.doctor_id, Some(auth_token)).await?;
        self.availability
            .ensure_bookable(
                &doctor,
                request.appointment_date,
                request.appointment_time,
                None,
                Some(auth_token),
            )
            .await?;

        let appointment_code = self.next_appointment_code(auth_token).await?;
        let now = Utc::now().to_rfc3339();

        let appointment_data = json!({
            "appointment_code": appointment_code,
            "patient_id": user.id,
            "doctor_id": doctor.id,
            "appointment_date": request.appointment_date,
            "appointment_time": request.appointment_time.to_24h(),
            "reason": request.reason.trim(),
            "symptoms": request.symptoms.trim(),
            "patient_name": request.patient_name.trim(),
            "patient_age": request.patient_age,
            "patient_gender": request.patient_gender.trim(),
            "patient_phone": request.patient_phone.trim(),
            "emergency_contact": request.emergency_contact.trim(),
            "status": AppointmentStatus::Pending,
            // the doctor's current fee, never a client-supplied one
            "consultation_fee": doctor.consultation_fee,
            "payment_status": request.payment_status,
            "payment_method": request.payment_method,
            "payment_id": request.payment_id,
            "refunded": false,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        let appointment = result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Failed to create appointment"))?;

        info!(
            "Appointment {} booked with doctor {} on {} at {}",
            appointment.appointment_code,
            doctor.id,
            appointment.appointment_date,
            appointment.slot_time()
        );
        Ok(appointment)
    }

    pub async fn get_appointment(&self, user: &User, appointment_id: Uuid, auth_token: &str) -> Result<Appointment> {
        let appointment = self.fetch_appointment(appointment_id, auth_token).await?;

        let allowed = match user.parsed_role() {
            Some(Role::Admin) => true,
            Some(Role::Customer) => appointment.is_owned_by_patient(&user.id),
            Some(Role::Doctor) => self.is_treating_doctor(user, &appointment, auth_token).await?,
            _ => false,
        };
        if !allowed {
            return Err(AppointmentError::Unauthorized.into());
        }

        Ok(appointment)
    }

    pub async fn reschedule_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment> {
        let current = self.fetch_own_appointment(user, appointment_id, auth_token).await?;
        self.lifecycle_service.ensure_reschedulable(
            current.status,
            current.appointment_date,
            Local::now().naive_local(),
        )?;

        let new_date = request.appointment_date.unwrap_or(current.appointment_date);
        let new_time = request.appointment_time.unwrap_or_else(|| current.slot_time());

        let mut update = Map::new();

        if new_date != current.appointment_date || new_time != current.slot_time() {
            let doctor = self.doctors.get_doctor(current.doctor_id, Some(auth_token)).await?;
            self.availability
                .ensure_bookable(&doctor, new_date, new_time, Some(current.id), Some(auth_token))
                .await?;

            update.insert("appointment_date".to_string(), json!(new_date));
            update.insert("appointment_time".to_string(), json!(new_time.to_24h()));
        }

        if let Some(reason) = request.reason {
            if reason.trim().is_empty() {
                return Err(AppointmentError::ValidationError("reason cannot be blank".to_string()).into());
            }
            update.insert("reason".to_string(), json!(reason.trim()));
        }

        if update.is_empty() {
            return Ok(current);
        }

        let appointment = self.patch_appointment(current.id, update, auth_token).await?;
        info!(
            "Appointment {} rescheduled to {} at {}",
            appointment.appointment_code,
            appointment.appointment_date,
            appointment.slot_time()
        );
        Ok(appointment)
    }

    pub async fn cancel_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(Appointment, CancellationOutcome)> {
        let current = self.fetch_own_appointment(user, appointment_id, auth_token).await?;
        self.lifecycle_service.ensure_modifiable(current.status)?;

        let outcome = self.cancellation_policy.split(current.consultation_fee);

        let mut update = Map::new();
        update.insert("status".to_string(), json!(AppointmentStatus::Cancelled));
        update.insert("company_fee".to_string(), json!(outcome.company_fee));
        update.insert("refund_amount".to_string(), json!(outcome.refund_amount));
        update.insert("refunded".to_string(), json!(current.payment_status));

        let appointment = self.patch_appointment(current.id, update, auth_token).await?;
        info!(
            "Appointment {} cancelled, refund {:.2} (fee retained {:.2})",
            appointment.appointment_code, outcome.refund_amount, outcome.company_fee
        );

        Ok((appointment, outcome))
    }

    /// Doctor-driven lifecycle move on one of their own appointments.
    pub async fn update_status(
        &self,
        user: &User,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment> {
        let current = self.fetch_appointment(appointment_id, auth_token).await?;

        if user.parsed_role() != Some(Role::Doctor)
            || !self.is_treating_doctor(user, &current, auth_token).await?
        {
            return Err(AppointmentError::Unauthorized.into());
        }

        self.lifecycle_service
            .validate_status_transition(current.status, new_status)?;

        let mut update = Map::new();
        update.insert("status".to_string(), json!(new_status));

        let appointment = self.patch_appointment(current.id, update, auth_token).await?;
        info!(
            "Appointment {} moved from {} to {}",
            appointment.appointment_code, current.status, appointment.status
        );
        Ok(appointment)
    }

    async fn fetch_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Appointment> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!(AppointmentError::NotFound))
    }

    async fn fetch_own_appointment(&self, user: &User, appointment_id: Uuid, auth_token: &str) -> Result<Appointment> {
        let appointment = self.fetch_appointment(appointment_id, auth_token).await?;
        if !appointment.is_owned_by_patient(&user.id) {
            return Err(AppointmentError::Unauthorized.into());
        }
        Ok(appointment)
    }

    async fn is_treating_doctor(&self, user: &User, appointment: &Appointment, auth_token: &str) -> Result<bool> {
        let doctor = self.doctors.find_by_user(&user.id, auth_token).await?;
        Ok(doctor.is_some_and(|d| d.id == appointment.doctor_id))
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        mut update: Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment> {
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update)),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!(AppointmentError::NotFound))
    }

    async fn next_appointment_code(&self, auth_token: &str) -> Result<String> {
        let latest: Vec<AppointmentCodeRow> = self
            .supabase
            .request(
                Method::GET,
                "/rest/v1/appointments?select=appointment_code&order=created_at.desc&limit=1",
                Some(auth_token),
                None,
            )
            .await?;

        let latest_code = latest.into_iter().next().and_then(|row| row.appointment_code);
        let fallback = match latest_code {
            Some(_) => 0,
            None => {
                let rows: Vec<Value> = self
                    .supabase
                    .request(Method::GET, "/rest/v1/appointments?select=id", Some(auth_token), None)
                    .await?;
                rows.len() as u64
            }
        };

        Ok(next_sequential_code(
            APPOINTMENT_CODE_PREFIX,
            APPOINTMENT_CODE_WIDTH,
            latest_code.as_deref(),
            fallback,
        ))
    }
}

fn validate_patient_details(request: &BookAppointmentRequest) -> Result<(), AppointmentError> {
    let required = [
        ("reason", &request.reason),
        ("patient_name", &request.patient_name),
        ("patient_gender", &request.patient_gender),
        ("patient_phone", &request.patient_phone),
    ];

    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| *field)
        .collect();
    if !missing.is_empty() {
        return Err(AppointmentError::ValidationError(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    if !(1..=MAX_PATIENT_AGE).contains(&request.patient_age) {
        return Err(AppointmentError::ValidationError(format!(
            "patient_age must be between 1 and {}",
            MAX_PATIENT_AGE
        )));
    }

    Ok(())
}
