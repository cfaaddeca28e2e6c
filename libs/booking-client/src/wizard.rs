//! The four-step booking flow: pick a date and time, describe the patient,
//! pay, see the confirmation. Steps only move forward when the current one is
//! complete, and payment only completes through a successful submission.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use appointment_cell::models::Appointment;
use doctor_cell::SlotTime;

use crate::api::NewAppointment;

const MAX_PATIENT_AGE: u32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    SelectDateTime,
    PatientDetails,
    Payment,
    Confirmation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("Choose a date first")]
    MissingDate,

    #[error("Choose a time slot first")]
    MissingTime,

    #[error("Please fill in: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Patient age must be between 1 and 150")]
    InvalidAge,

    #[error("Not available at the {0:?} step")]
    WrongStep(WizardStep),

    #[error("Payment completes by submitting the booking")]
    SubmissionRequired,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientDetails {
    pub reason: String,
    pub symptoms: String,
    pub patient_name: String,
    pub patient_age: Option<u32>,
    pub patient_gender: String,
    pub patient_phone: String,
    pub emergency_contact: String,
}

impl PatientDetails {
    fn validate(&self) -> Result<u32, WizardError> {
        let missing: Vec<&'static str> = [
            ("reason", self.reason.as_str()),
            ("patient name", self.patient_name.as_str()),
            ("gender", self.patient_gender.as_str()),
            ("phone", self.patient_phone.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .chain(self.patient_age.is_none().then_some("age"))
        .collect();

        if !missing.is_empty() {
            return Err(WizardError::MissingFields(missing));
        }

        match self.patient_age {
            Some(age) if (1..=MAX_PATIENT_AGE).contains(&age) => Ok(age),
            _ => Err(WizardError::InvalidAge),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingWizard {
    doctor_id: Uuid,
    step: WizardStep,
    date: Option<NaiveDate>,
    time: Option<SlotTime>,
    pub details: PatientDetails,
    pub payment_method: Option<String>,
    confirmed: Option<Appointment>,
}

impl BookingWizard {
    pub fn new(doctor_id: Uuid) -> Self {
        Self {
            doctor_id,
            step: WizardStep::SelectDateTime,
            date: None,
            time: None,
            details: PatientDetails::default(),
            payment_method: None,
            confirmed: None,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn time(&self) -> Option<SlotTime> {
        self.time
    }

    pub fn confirmed(&self) -> Option<&Appointment> {
        self.confirmed.as_ref()
    }

    /// A new date invalidates the chosen time, which may not exist on it.
    pub fn select_date(&mut self, date: NaiveDate) -> Result<(), WizardError> {
        self.require_step(WizardStep::SelectDateTime)?;
        if self.date != Some(date) {
            self.time = None;
        }
        self.date = Some(date);
        Ok(())
    }

    pub fn select_time(&mut self, time: SlotTime) -> Result<(), WizardError> {
        self.require_step(WizardStep::SelectDateTime)?;
        if self.date.is_none() {
            return Err(WizardError::MissingDate);
        }
        self.time = Some(time);
        Ok(())
    }

    pub fn next(&mut self) -> Result<WizardStep, WizardError> {
        let next = match self.step {
            WizardStep::SelectDateTime => {
                self.date.ok_or(WizardError::MissingDate)?;
                self.time.ok_or(WizardError::MissingTime)?;
                WizardStep::PatientDetails
            }
            WizardStep::PatientDetails => {
                self.details.validate()?;
                WizardStep::Payment
            }
            WizardStep::Payment => return Err(WizardError::SubmissionRequired),
            WizardStep::Confirmation => return Err(WizardError::WrongStep(WizardStep::Confirmation)),
        };

        debug!("Booking wizard {:?} -> {:?}", self.step, next);
        self.step = next;
        Ok(next)
    }

    pub fn back(&mut self) -> Result<WizardStep, WizardError> {
        let previous = match self.step {
            WizardStep::PatientDetails => WizardStep::SelectDateTime,
            WizardStep::Payment => WizardStep::PatientDetails,
            other => return Err(WizardError::WrongStep(other)),
        };

        self.step = previous;
        Ok(previous)
    }

    /// The request to send once the patient pays.
    pub fn submission(&self) -> Result<NewAppointment, WizardError> {
        self.require_step(WizardStep::Payment)?;

        let appointment_date = self.date.ok_or(WizardError::MissingDate)?;
        let appointment_time = self.time.ok_or(WizardError::MissingTime)?;
        let patient_age = self.details.validate()?;

        Ok(NewAppointment {
            doctor_id: self.doctor_id,
            appointment_date,
            appointment_time,
            reason: self.details.reason.trim().to_string(),
            symptoms: self.details.symptoms.trim().to_string(),
            patient_name: self.details.patient_name.trim().to_string(),
            patient_age,
            patient_gender: self.details.patient_gender.trim().to_string(),
            patient_phone: self.details.patient_phone.trim().to_string(),
            emergency_contact: self.details.emergency_contact.trim().to_string(),
            payment_status: true,
            payment_method: self.payment_method.clone(),
        })
    }

    /// Records the booked appointment and moves to the confirmation.
    pub fn complete(&mut self, appointment: Appointment) -> Result<(), WizardError> {
        self.require_step(WizardStep::Payment)?;
        self.confirmed = Some(appointment);
        self.step = WizardStep::Confirmation;
        Ok(())
    }

    fn require_step(&self, expected: WizardStep) -> Result<(), WizardError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(WizardError::WrongStep(self.step))
        }
    }
}
