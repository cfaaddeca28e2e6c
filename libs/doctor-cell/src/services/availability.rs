use anyhow::Result;
use chrono::{Local, NaiveDate};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailableDatesResponse, AvailableSlotsResponse, BookedSlot, Doctor, DoctorError,
};
use crate::services::doctor::DoctorService;
use crate::services::schedule::{resolve_bookable_slots, upcoming_dates, SlotTime};

/// Longest look-ahead a caller may ask for.
pub const MAX_WINDOW_DAYS: u32 = 366;

#[derive(Debug, Deserialize)]
struct BookedAppointmentRow {
    id: Uuid,
    appointment_time: String,
}

/// Joins a doctor's declared schedule with the appointments already taken.
pub struct AvailabilityService {
    supabase: SupabaseClient,
    doctors: DoctorService,
    date_count: usize,
    window_days: u32,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
            date_count: config.booking_date_count,
            window_days: config.booking_window_days,
        }
    }

    pub async fn available_dates(
        &self,
        doctor_id: Uuid,
        count: Option<usize>,
        window_days: Option<u32>,
        auth_token: Option<&str>,
    ) -> Result<AvailableDatesResponse> {
        let doctor = self.doctors.get_doctor(doctor_id, auth_token).await?;
        let window_days = window_days.unwrap_or(self.window_days).min(MAX_WINDOW_DAYS);
        let count = count.unwrap_or(self.date_count).min(window_days as usize);

        let dates = upcoming_dates(&doctor.availability().days, count, window_days);
        debug!("Doctor {} has {} upcoming dates", doctor_id, dates.len());

        Ok(AvailableDatesResponse { doctor_id, dates })
    }

    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_appointment: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<AvailableSlotsResponse> {
        let doctor = self.doctors.get_doctor(doctor_id, auth_token).await?;
        let slots = self
            .bookable_slots(&doctor, date, exclude_appointment, auth_token)
            .await?;

        Ok(AvailableSlotsResponse { doctor_id, date, slots })
    }

    /// Declared start times on `date` that nobody holds yet.
    pub async fn bookable_slots(
        &self,
        doctor: &Doctor,
        date: NaiveDate,
        exclude_appointment: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Vec<SlotTime>> {
        let availability = doctor.availability();

        if date < today() || !availability.offers(date) {
            debug!("Doctor {} offers no slots on {}", doctor.id, date);
            return Ok(Vec::new());
        }

        let booked: Vec<SlotTime> = self
            .booked_slots(doctor.id, date, exclude_appointment, auth_token)
            .await?
            .into_iter()
            .map(|slot| slot.time)
            .collect();

        Ok(resolve_bookable_slots(&availability.slots, &booked))
    }

    /// Non-cancelled appointments for the doctor on `date`.
    pub async fn booked_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_appointment: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Vec<BookedSlot>> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=neq.cancelled&select=id,appointment_time",
            doctor_id, date
        );

        let rows: Vec<BookedAppointmentRow> =
            self.supabase.request(Method::GET, &path, auth_token, None).await?;

        let slots = rows
            .into_iter()
            .filter(|row| Some(row.id) != exclude_appointment)
            .filter_map(|row| match row.appointment_time.parse::<SlotTime>() {
                Ok(time) => Some(BookedSlot {
                    appointment_id: row.id,
                    date,
                    time,
                }),
                Err(e) => {
                    warn!("Skipping appointment {} with unreadable time: {}", row.id, e);
                    None
                }
            })
            .collect();

        Ok(slots)
    }

    /// Authoritative check used before an appointment is written.
    pub async fn ensure_bookable(
        &self,
        doctor: &Doctor,
        date: NaiveDate,
        time: SlotTime,
        exclude_appointment: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<()> {
        if date < today() {
            return Err(DoctorError::PastDate.into());
        }

        let availability = doctor.availability();
        if !availability.offers(date) {
            return Err(DoctorError::DateNotOffered(date).into());
        }
        if !availability.slots.iter().any(|range| range.start == time) {
            return Err(DoctorError::SlotNotOffered(time).into());
        }

        let taken = self
            .booked_slots(doctor.id, date, exclude_appointment, auth_token)
            .await?
            .iter()
            .any(|slot| slot.time == time);
        if taken {
            warn!("Slot {} on {} for doctor {} is already booked", time, date, doctor.id);
            return Err(DoctorError::SlotTaken(time, date).into());
        }

        Ok(())
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
