use anyhow::{anyhow, Result};
use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_utils::codes::next_sequential_code;

use crate::models::{
    profile_complete, CreateDoctorRequest, Doctor, DoctorError, UpdateDoctorProfileRequest,
    DEFAULT_CONSULTATION_FEE,
};
use crate::services::schedule::DoctorAvailability;

const DOCTOR_CODE_PREFIX: &str = "DOC";
const DOCTOR_CODE_WIDTH: usize = 3;

#[derive(Debug, Deserialize)]
struct DoctorCodeRow {
    doctor_code: Option<String>,
}

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// All doctors ordered by name, optionally narrowed to one specialty.
    pub async fn list_doctors(
        &self,
        specialty: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<Vec<Doctor>> {
        let mut path = "/rest/v1/doctor_profiles?order=full_name.asc".to_string();

        if let Some(specialty) = specialty.map(str::trim).filter(|s| !s.is_empty()) {
            // ilike without wildcards is a case-insensitive equality
            path.push_str(&format!("&specialty=ilike.{}", urlencoding::encode(specialty)));
        }

        debug!("Listing doctors with specialty filter {:?}", specialty);

        let doctors: Vec<Doctor> = self.supabase.request(Method::GET, &path, auth_token, None).await?;
        Ok(doctors)
    }

    pub async fn get_doctor(&self, doctor_id: Uuid, auth_token: Option<&str>) -> Result<Doctor> {
        debug!("Fetching doctor profile: {}", doctor_id);

        let path = format!("/rest/v1/doctor_profiles?id=eq.{}", doctor_id);
        let result: Vec<Doctor> = self.supabase.request(Method::GET, &path, auth_token, None).await?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!(DoctorError::NotFound))
    }

    pub async fn find_by_user(&self, user_id: &str, auth_token: &str) -> Result<Option<Doctor>> {
        let path = format!(
            "/rest/v1/doctor_profiles?user_id=eq.{}",
            urlencoding::encode(user_id)
        );
        let result: Vec<Doctor> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        Ok(result.into_iter().next())
    }

    /// The caller's own profile, created with empty availability on first access.
    pub async fn get_or_create_own_profile(&self, user: &User, auth_token: &str) -> Result<Doctor> {
        if let Some(doctor) = self.find_by_user(&user.id, auth_token).await? {
            return Ok(doctor);
        }

        info!("Creating doctor profile on first access for user {}", user.id);

        let request = CreateDoctorRequest {
            user_id: user.id.clone(),
            full_name: user
                .name
                .clone()
                .or_else(|| user.email.clone())
                .unwrap_or_default(),
            email: user.email.clone(),
            specialty: String::new(),
            experience: String::new(),
            qualification: String::new(),
            license_number: String::new(),
            bio: String::new(),
            available_days: Vec::new(),
            available_time_slots: Vec::new(),
            consultation_fee: None,
        };

        self.insert_doctor(request, auth_token).await
    }

    pub async fn update_own_profile(
        &self,
        user: &User,
        request: UpdateDoctorProfileRequest,
        auth_token: &str,
    ) -> Result<Doctor> {
        let current = self.get_or_create_own_profile(user, auth_token).await?;
        debug!("Updating doctor profile {}", current.id);

        let mut update = Map::new();

        if let Some(name) = request.full_name {
            if name.trim().is_empty() {
                return Err(DoctorError::ValidationError("full_name cannot be blank".to_string()).into());
            }
            update.insert("full_name".to_string(), json!(name.trim()));
        }

        let specialty = request.specialty.map(|s| title_case(&s));
        let experience = request.experience.map(|s| s.trim().to_string());
        let qualification = request.qualification.map(|s| s.trim().to_string());
        let bio = request.bio.map(|s| s.trim().to_string());

        let availability = normalize_availability(
            request.available_days.as_deref(),
            request.available_time_slots.as_deref(),
            &current,
        )?;

        if let Some(fee) = request.consultation_fee {
            validate_fee(fee)?;
            update.insert("consultation_fee".to_string(), json!(fee));
        }
        if let Some(license) = request.license_number {
            update.insert("license_number".to_string(), json!(license.trim()));
        }

        let complete = profile_complete(
            specialty.as_deref().unwrap_or(&current.specialty),
            experience.as_deref().unwrap_or(&current.experience),
            qualification.as_deref().unwrap_or(&current.qualification),
            bio.as_deref().unwrap_or(&current.bio),
            &availability.day_names(),
            &availability.slot_labels(),
        );

        for (column, value) in [
            ("specialty", specialty),
            ("experience", experience),
            ("qualification", qualification),
            ("bio", bio),
        ] {
            if let Some(value) = value {
                update.insert(column.to_string(), json!(value));
            }
        }

        update.insert("available_days".to_string(), json!(availability.day_names()));
        update.insert("available_time_slots".to_string(), json!(availability.slot_labels()));
        update.insert("is_profile_complete".to_string(), json!(complete));
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/doctor_profiles?id=eq.{}", current.id);
        let result: Vec<Doctor> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update)),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        let doctor = result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!(DoctorError::NotFound))?;

        info!("Doctor profile {} updated (complete: {})", doctor.id, doctor.is_profile_complete);
        Ok(doctor)
    }

    /// Admin path: creates a profile for an existing user account.
    pub async fn create_doctor(&self, request: CreateDoctorRequest, auth_token: &str) -> Result<Doctor> {
        if request.user_id.trim().is_empty() || request.full_name.trim().is_empty() {
            return Err(DoctorError::ValidationError("user_id and full_name are required".to_string()).into());
        }

        if self.find_by_user(&request.user_id, auth_token).await?.is_some() {
            return Err(DoctorError::AlreadyExists(request.user_id).into());
        }

        self.insert_doctor(request, auth_token).await
    }

    async fn insert_doctor(&self, request: CreateDoctorRequest, auth_token: &str) -> Result<Doctor> {
        let availability =
            DoctorAvailability::parse_strict(&request.available_days, &request.available_time_slots)?;
        let fee = request.consultation_fee.unwrap_or(DEFAULT_CONSULTATION_FEE);
        validate_fee(fee)?;

        let specialty = title_case(&request.specialty);
        let days = availability.day_names();
        let slots = availability.slot_labels();
        let complete = profile_complete(
            &specialty,
            &request.experience,
            &request.qualification,
            &request.bio,
            &days,
            &slots,
        );

        let doctor_code = self.next_doctor_code(auth_token).await?;
        let now = Utc::now().to_rfc3339();

        let doctor_data = json!({
            "user_id": request.user_id,
            "doctor_code": doctor_code,
            "full_name": request.full_name.trim(),
            "email": request.email,
            "specialty": specialty,
            "experience": request.experience.trim(),
            "qualification": request.qualification.trim(),
            "license_number": request.license_number.trim(),
            "bio": request.bio.trim(),
            "available_days": days,
            "available_time_slots": slots,
            "consultation_fee": fee,
            "is_profile_complete": complete,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Doctor> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctor_profiles",
                Some(auth_token),
                Some(doctor_data),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        let doctor = result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Failed to create doctor profile"))?;

        info!("Doctor profile {} created with code {}", doctor.id, doctor.doctor_code);
        Ok(doctor)
    }

    async fn next_doctor_code(&self, auth_token: &str) -> Result<String> {
        let latest: Vec<DoctorCodeRow> = self
            .supabase
            .request(
                Method::GET,
                "/rest/v1/doctor_profiles?select=doctor_code&order=created_at.desc&limit=1",
                Some(auth_token),
                None,
            )
            .await?;

        let latest_code = latest.into_iter().next().and_then(|row| row.doctor_code);
        let fallback = if latest_code.is_some() {
            0
        } else {
            self.count_doctors(auth_token).await?
        };

        Ok(next_sequential_code(
            DOCTOR_CODE_PREFIX,
            DOCTOR_CODE_WIDTH,
            latest_code.as_deref(),
            fallback,
        ))
    }

    async fn count_doctors(&self, auth_token: &str) -> Result<u64> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, "/rest/v1/doctor_profiles?select=id", Some(auth_token), None)
            .await?;
        Ok(rows.len() as u64)
    }
}

/// Validates incoming day and slot lists, falling back to the stored ones for
/// whichever list the request leaves out.
fn normalize_availability(
    days: Option<&[String]>,
    slots: Option<&[String]>,
    current: &Doctor,
) -> Result<DoctorAvailability> {
    let stored = current.availability();

    let days = match days {
        Some(days) => DoctorAvailability::parse_strict(days, &[] as &[String])?.days,
        None => stored.days,
    };
    let slots = match slots {
        Some(slots) => DoctorAvailability::parse_strict(&[] as &[String], slots)?.slots,
        None => stored.slots,
    };

    Ok(DoctorAvailability { days, slots })
}

fn validate_fee(fee: f64) -> Result<()> {
    if !fee.is_finite() || fee < 0.0 {
        return Err(DoctorError::ValidationError("consultation_fee must be a non-negative amount".to_string()).into());
    }
    Ok(())
}

/// `"internal   medicine"` → `"Internal Medicine"`
pub fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
