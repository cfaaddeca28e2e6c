use chrono::NaiveDate;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use appointment_cell::models::{Appointment, BookedAppointment};
use doctor_cell::models::Doctor;
use doctor_cell::SlotTime;

use crate::error::ClientError;
use crate::session::AuthSession;
use crate::tracker::{RequestTicket, SlotRequestTracker};

pub type Result<T> = std::result::Result<T, ClientError>;

/// Body of `POST /appointments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAppointment {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: SlotTime,
    pub reason: String,
    pub symptoms: String,
    pub patient_name: String,
    pub patient_age: u32,
    pub patient_gender: String,
    pub patient_phone: String,
    pub emergency_contact: String,
    pub payment_status: bool,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RescheduleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_time: Option<SlotTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CancellationReceipt {
    pub message: String,
    pub company_fee: f64,
    pub refund_amount: f64,
}

/// Typed access to the booking API for one user session.
pub struct BookingApiClient {
    client: Client,
    base_url: String,
    session: Option<AuthSession>,
}

impl BookingApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session: None,
        }
    }

    pub fn with_session(mut self, session: AuthSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&AuthSession> {
        self.session.as_ref()
    }

    // ==========================================================================
    // DOCTORS
    // ==========================================================================

    pub async fn list_doctors(&self, specialty: Option<&str>) -> Result<Vec<Doctor>> {
        let mut request = self.request(Method::GET, "/doctors");
        if let Some(specialty) = specialty {
            request = request.query(&[("specialty", specialty)]);
        }
        self.send_field(request, "doctors").await
    }

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor> {
        let request = self.request(Method::GET, &format!("/doctors/{}", doctor_id));
        self.send_field(request, "doctor").await
    }

    pub async fn available_dates(&self, doctor_id: Uuid) -> Result<Vec<NaiveDate>> {
        let request = self.request(Method::GET, &format!("/doctors/{}/available-dates", doctor_id));
        self.send_field(request, "dates").await
    }

    /// Bookable start times on `date`. When rescheduling, pass the appointment
    /// being moved so its current time stays selectable.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_appointment: Option<Uuid>,
    ) -> Result<Vec<SlotTime>> {
        let mut request = self
            .request(Method::GET, &format!("/doctors/{}/available-slots", doctor_id))
            .query(&[("date", date.to_string())]);
        if let Some(appointment_id) = exclude_appointment {
            request = request.query(&[("exclude_appointment", appointment_id.to_string())]);
        }
        self.send_field(request, "slots").await
    }

    /// [`Self::available_slots`] guarded by `tracker`: `Ok(None)` means a newer
    /// lookup was issued while this one was in flight, whether this one
    /// succeeded or failed.
    pub async fn tracked_slots(
        &self,
        tracker: &SlotRequestTracker,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_appointment: Option<Uuid>,
    ) -> Result<Option<Vec<SlotTime>>> {
        let ticket: RequestTicket = tracker.issue(date);
        let result = self.available_slots(doctor_id, date, exclude_appointment).await;
        tracker.accept(&ticket, result).transpose()
    }

    // ==========================================================================
    // APPOINTMENTS
    // ==========================================================================

    /// Ids and times already taken with `doctor_id` on `date`.
    pub async fn booked_appointments(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<BookedAppointment>> {
        let request = self
            .authorized(Method::GET, "/appointments")?
            .query(&[("doctor", doctor_id.to_string()), ("date", date.to_string())]);
        self.send_field(request, "appointments").await
    }

    pub async fn my_appointments(&self) -> Result<Vec<Appointment>> {
        let request = self.authorized(Method::GET, "/appointments")?;
        self.send_field(request, "appointments").await
    }

    pub async fn book_appointment(&self, appointment: &NewAppointment) -> Result<Appointment> {
        let request = self.authorized(Method::POST, "/appointments")?.json(appointment);
        self.send_field(request, "appointment").await
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment> {
        let request = self.authorized(Method::GET, &format!("/appointments/{}", appointment_id))?;
        self.send_field(request, "appointment").await
    }

    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        changes: &RescheduleRequest,
    ) -> Result<Appointment> {
        let request = self
            .authorized(Method::PUT, &format!("/appointments/{}", appointment_id))?
            .json(changes);
        self.send_field(request, "appointment").await
    }

    pub async fn cancel_appointment(&self, appointment_id: Uuid) -> Result<CancellationReceipt> {
        let request = self.authorized(Method::POST, &format!("/appointments/{}/cancel", appointment_id))?;
        let body = self.send(request).await?;
        decode(body)
    }

    // ==========================================================================
    // PLUMBING
    // ==========================================================================

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("Booking API {} {}", method, url);

        let builder = self.client.request(method, &url);
        match &self.session {
            Some(session) => builder.bearer_auth(&session.token),
            None => builder,
        }
    }

    fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        if self.session.is_none() {
            return Err(ClientError::Unauthorized("Sign in to continue".to_string()));
        }
        Ok(self.request(method, path))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = ClientError::from_response(status, &body);
            warn!("Booking API call failed: {}", err);
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn send_field<T: DeserializeOwned>(&self, request: RequestBuilder, field: &str) -> Result<T> {
        let mut body = self.send(request).await?;
        let value = body
            .get_mut(field)
            .map(Value::take)
            .ok_or_else(|| ClientError::Decode(format!("response has no '{}' field", field)))?;
        decode(value)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}
