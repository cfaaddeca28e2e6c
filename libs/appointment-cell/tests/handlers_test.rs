use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::*;
use appointment_cell::models::*;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

fn config_for(server: &MockServer) -> Arc<AppConfig> {
    TestConfig::with_supabase_url(&server.uri()).to_arc()
}

fn auth_header() -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer("test-token").unwrap())
}

/// First `weekday` at least three days out, clear of the reschedule cutoff.
fn upcoming(weekday: Weekday) -> NaiveDate {
    let mut date = Local::now().date_naive() + Duration::days(3);
    while date.weekday() != weekday {
        date += Duration::days(1);
    }
    date
}

fn booking_request(doctor_id: Uuid, date: NaiveDate, time: &str) -> BookAppointmentRequest {
    serde_json::from_value(json!({
        "doctor_id": doctor_id,
        "appointment_date": date,
        "appointment_time": time,
        "reason": "Chest pain",
        "patient_name": "Ravi Kumar",
        "patient_age": 42,
        "patient_gender": "male",
        "patient_phone": "9876543210",
        "payment_status": true,
        "payment_method": "card"
    }))
    .unwrap()
}

async fn mount_doctor(server: &MockServer, doctor_id: Uuid, user_id: &str) {
    let profile = MockSupabaseResponses::doctor_profile_response(&doctor_id.to_string(), user_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_profiles"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([profile.clone()])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_profiles"))
        .and(query_param("user_id", format!("eq.{}", user_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([profile])))
        .mount(server)
        .await;
}

async fn mount_booked(server: &MockServer, date: NaiveDate, rows: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_date", format!("eq.{}", date)))
        .and(query_param("status", "neq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

async fn mount_appointment(server: &MockServer, row: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", row["id"].as_str().unwrap())))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(server)
        .await;
}

fn appointment_row(id: Uuid, patient: &User, doctor_id: Uuid, date: NaiveDate, status: &str) -> Value {
    MockSupabaseResponses::appointment_response(
        &id.to_string(),
        &patient.id,
        &doctor_id.to_string(),
        &date.to_string(),
        "09:00:00",
        status,
    )
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn test_book_appointment_success() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let doctor_id = Uuid::new_v4();
    let monday = upcoming(Weekday::Mon);

    mount_doctor(&server, doctor_id, "doctor-user").await;
    mount_booked(&server, monday, json!([{ "id": Uuid::new_v4(), "appointment_time": "10:00:00" }])).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "appointment_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "appointment_code": "APT00041" }])))
        .mount(&server)
        .await;

    let created = appointment_row(Uuid::new_v4(), &patient, doctor_id, monday, "pending");
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "appointment_code": "APT00042",
            "appointment_time": "09:00:00",
            "consultation_fee": 500.0,
            "status": "pending",
            "patient_id": patient.id
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([created])))
        .expect(1)
        .mount(&server)
        .await;

    let (status, Json(body)) = book_appointment(
        State(config_for(&server)),
        auth_header(),
        Extension(patient),
        Json(booking_request(doctor_id, monday, "9:00 AM")),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Appointment booked successfully");
    assert_eq!(body["appointment"]["status"], "pending");
}

#[tokio::test]
async fn test_book_taken_slot_conflicts() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let doctor_id = Uuid::new_v4();
    let wednesday = upcoming(Weekday::Wed);

    mount_doctor(&server, doctor_id, "doctor-user").await;
    mount_booked(&server, wednesday, json!([{ "id": Uuid::new_v4(), "appointment_time": "09:00:00" }])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let result = book_appointment(
        State(config_for(&server)),
        auth_header(),
        Extension(patient),
        Json(booking_request(doctor_id, wednesday, "9:00 AM")),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(_)));
}

#[tokio::test]
async fn test_book_insert_race_surfaces_conflict() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let doctor_id = Uuid::new_v4();
    let friday = upcoming(Weekday::Fri);

    mount_doctor(&server, doctor_id, "doctor-user").await;
    mount_booked(&server, friday, json!([])).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "appointment_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "appointment_code": "APT00001" }])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response("duplicate key value violates unique constraint", "23505"),
        ))
        .mount(&server)
        .await;

    let result = book_appointment(
        State(config_for(&server)),
        auth_header(),
        Extension(patient),
        Json(booking_request(doctor_id, friday, "2:00 PM")),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(_)));
}

#[tokio::test]
async fn test_book_rejects_unoffered_weekday() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let doctor_id = Uuid::new_v4();
    mount_doctor(&server, doctor_id, "doctor-user").await;

    let result = book_appointment(
        State(config_for(&server)),
        auth_header(),
        Extension(patient),
        Json(booking_request(doctor_id, upcoming(Weekday::Sun), "9:00 AM")),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(_)));
}

#[tokio::test]
async fn test_book_rejects_past_date() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let doctor_id = Uuid::new_v4();
    mount_doctor(&server, doctor_id, "doctor-user").await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    // an offered weekday, so only the date rule rejects it
    let mut past_monday = Local::now().date_naive() - Duration::days(1);
    while past_monday.weekday() != Weekday::Mon {
        past_monday -= Duration::days(1);
    }

    let result = book_appointment(
        State(config_for(&server)),
        auth_header(),
        Extension(patient),
        Json(booking_request(doctor_id, past_monday, "9:00 AM")),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(msg)) if msg.contains("past"));
}

#[tokio::test]
async fn test_book_rejects_undeclared_time() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let doctor_id = Uuid::new_v4();
    mount_doctor(&server, doctor_id, "doctor-user").await;

    let result = book_appointment(
        State(config_for(&server)),
        auth_header(),
        Extension(patient),
        Json(booking_request(doctor_id, upcoming(Weekday::Mon), "7:30 PM")),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(msg)) if msg.contains("7:30 PM"));
}

#[tokio::test]
async fn test_only_customers_can_book() {
    let server = MockServer::start().await;
    let doctor = TestUser::doctor("doc@example.com").to_user();

    let result = book_appointment(
        State(config_for(&server)),
        auth_header(),
        Extension(doctor),
        Json(booking_request(Uuid::new_v4(), upcoming(Weekday::Mon), "9:00 AM")),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_book_validates_patient_fields() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();

    let mut request = booking_request(Uuid::new_v4(), upcoming(Weekday::Mon), "9:00 AM");
    request.patient_age = 0;

    let result = book_appointment(State(config_for(&server)), auth_header(), Extension(patient), Json(request)).await;
    assert_matches!(result, Err(AppError::ValidationError(_)));
}

// ==============================================================================
// LISTING
// ==============================================================================

#[tokio::test]
async fn test_list_booked_times_for_doctor_and_date() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let doctor_id = Uuid::new_v4();
    let monday = upcoming(Weekday::Mon);
    let booked_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("select", "id,appointment_time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": booked_id, "appointment_time": "10:00:00" }
        ])))
        .mount(&server)
        .await;

    let query = AppointmentListQuery { doctor: Some(doctor_id), date: Some(monday) };
    let Json(body) = list_appointments(State(config_for(&server)), auth_header(), Extension(patient), Query(query))
        .await
        .unwrap();

    assert_eq!(body["appointments"], json!([{ "id": booked_id, "appointment_time": "10:00:00" }]));
}

#[tokio::test]
async fn test_list_own_appointments_as_customer() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let row = appointment_row(Uuid::new_v4(), &patient, Uuid::new_v4(), upcoming(Weekday::Mon), "pending");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .expect(1)
        .mount(&server)
        .await;

    let Json(body) = list_appointments(
        State(config_for(&server)),
        auth_header(),
        Extension(patient),
        Query(AppointmentListQuery::default()),
    )
    .await
    .unwrap();

    assert_eq!(body["appointments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_without_filters_forbidden_for_admin() {
    let server = MockServer::start().await;
    let admin = TestUser::admin("admin@example.com").to_user();

    let result = list_appointments(
        State(config_for(&server)),
        auth_header(),
        Extension(admin),
        Query(AppointmentListQuery::default()),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

// ==============================================================================
// DETAIL, RESCHEDULE, CANCEL
// ==============================================================================

#[tokio::test]
async fn test_get_appointment_of_another_patient_forbidden() {
    let server = MockServer::start().await;
    let owner = TestUser::patient("owner@example.com").to_user();
    let stranger = TestUser::patient("stranger@example.com").to_user();
    let appointment_id = Uuid::new_v4();

    mount_appointment(
        &server,
        appointment_row(appointment_id, &owner, Uuid::new_v4(), upcoming(Weekday::Mon), "pending"),
    )
    .await;

    let result = get_appointment(State(config_for(&server)), Path(appointment_id), auth_header(), Extension(stranger)).await;
    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_cancel_splits_fee_and_refunds() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let appointment_id = Uuid::new_v4();
    let row = appointment_row(appointment_id, &patient, Uuid::new_v4(), upcoming(Weekday::Mon), "confirmed");
    mount_appointment(&server, row.clone()).await;

    let mut cancelled = row;
    cancelled["status"] = json!("cancelled");
    cancelled["company_fee"] = json!(100.0);
    cancelled["refund_amount"] = json!(400.0);
    cancelled["refunded"] = json!(true);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(json!({
            "status": "cancelled",
            "company_fee": 100.0,
            "refund_amount": 400.0,
            "refunded": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled])))
        .expect(1)
        .mount(&server)
        .await;

    let Json(body) = cancel_appointment(State(config_for(&server)), Path(appointment_id), auth_header(), Extension(patient))
        .await
        .unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["company_fee"], 100.0);
    assert_eq!(body["refund_amount"], 400.0);
}

#[tokio::test]
async fn test_cancel_completed_appointment_rejected() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let appointment_id = Uuid::new_v4();
    mount_appointment(
        &server,
        appointment_row(appointment_id, &patient, Uuid::new_v4(), upcoming(Weekday::Mon), "completed"),
    )
    .await;

    let result = cancel_appointment(State(config_for(&server)), Path(appointment_id), auth_header(), Extension(patient)).await;
    assert_matches!(result, Err(AppError::ValidationError(_)));
}

#[tokio::test]
async fn test_reschedule_inside_one_day_rejected() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let appointment_id = Uuid::new_v4();
    let tomorrow = Local::now().date_naive() + Duration::days(1);
    mount_appointment(&server, appointment_row(appointment_id, &patient, Uuid::new_v4(), tomorrow, "pending")).await;

    let request = RescheduleAppointmentRequest {
        appointment_date: Some(upcoming(Weekday::Wed)),
        ..Default::default()
    };

    let result = reschedule_appointment(
        State(config_for(&server)),
        Path(appointment_id),
        auth_header(),
        Extension(patient),
        Json(request),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(msg)) if msg.contains("more than one day"));
}

#[tokio::test]
async fn test_reschedule_revalidates_excluding_itself() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let doctor_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let monday = upcoming(Weekday::Mon);
    let wednesday = upcoming(Weekday::Wed);

    mount_doctor(&server, doctor_id, "doctor-user").await;
    mount_appointment(&server, appointment_row(appointment_id, &patient, doctor_id, monday, "confirmed")).await;
    // the only booking on the new date is this same appointment
    mount_booked(&server, wednesday, json!([{ "id": appointment_id, "appointment_time": "10:00:00" }])).await;

    let mut moved = appointment_row(appointment_id, &patient, doctor_id, wednesday, "confirmed");
    moved["appointment_time"] = json!("10:00:00");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "appointment_date": wednesday,
            "appointment_time": "10:00:00"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([moved])))
        .expect(1)
        .mount(&server)
        .await;

    let request: RescheduleAppointmentRequest = serde_json::from_value(json!({
        "appointment_date": wednesday,
        "appointment_time": "10:00 AM"
    }))
    .unwrap();

    let Json(body) = reschedule_appointment(
        State(config_for(&server)),
        Path(appointment_id),
        auth_header(),
        Extension(patient),
        Json(request),
    )
    .await
    .unwrap();

    assert_eq!(body["appointment"]["appointment_time"], "10:00:00");
}

// ==============================================================================
// STATUS LIFECYCLE
// ==============================================================================

#[tokio::test]
async fn test_doctor_confirms_pending_appointment() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let doctor = TestUser::doctor("doc@example.com").to_user();
    let doctor_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let row = appointment_row(appointment_id, &patient, doctor_id, upcoming(Weekday::Mon), "pending");

    mount_doctor(&server, doctor_id, &doctor.id).await;
    mount_appointment(&server, row.clone()).await;

    let mut confirmed = row;
    confirmed["status"] = json!("confirmed");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "confirmed" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([confirmed])))
        .expect(1)
        .mount(&server)
        .await;

    let Json(body) = update_appointment_status(
        State(config_for(&server)),
        Path(appointment_id),
        auth_header(),
        Extension(doctor),
        Json(UpdateStatusRequest { status: AppointmentStatus::Confirmed }),
    )
    .await
    .unwrap();

    assert_eq!(body["appointment"]["status"], "confirmed");
}

#[tokio::test]
async fn test_doctor_cannot_skip_to_completed() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let doctor = TestUser::doctor("doc@example.com").to_user();
    let doctor_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mount_doctor(&server, doctor_id, &doctor.id).await;
    mount_appointment(&server, appointment_row(appointment_id, &patient, doctor_id, upcoming(Weekday::Mon), "pending")).await;

    let result = update_appointment_status(
        State(config_for(&server)),
        Path(appointment_id),
        auth_header(),
        Extension(doctor),
        Json(UpdateStatusRequest { status: AppointmentStatus::Completed }),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(_)));
}

#[tokio::test]
async fn test_other_doctor_cannot_change_status() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let other_doctor = TestUser::doctor("other@example.com").to_user();
    let appointment_id = Uuid::new_v4();

    // other_doctor owns a different profile than the appointment's doctor
    mount_doctor(&server, Uuid::new_v4(), &other_doctor.id).await;
    mount_appointment(
        &server,
        appointment_row(appointment_id, &patient, Uuid::new_v4(), upcoming(Weekday::Mon), "pending"),
    )
    .await;

    let result = update_appointment_status(
        State(config_for(&server)),
        Path(appointment_id),
        auth_header(),
        Extension(other_doctor),
        Json(UpdateStatusRequest { status: AppointmentStatus::Confirmed }),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}
