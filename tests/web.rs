use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower::ServiceExt;

use sweep::frequency::{Frequency, SlotTimes};
use sweep::ledger::Ledger;
use sweep::web::{self, ServerState, SharedState};

fn state(frequency: Frequency, data_dir: Option<std::path::PathBuf>) -> SharedState {
    let mut ledger = Ledger::new();
    let unit = ledger.add_unit("Gym", None);
    let created = NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap();
    ledger
        .add_activity(unit, "Clean mats", frequency, 90.0, created)
        .unwrap();
    Arc::new(Mutex::new(ServerState {
        ledger,
        data_dir,
        slots: SlotTimes::default(),
    }))
}

async fn send(state: &SharedState, req: Request<Body>) -> (StatusCode, Value) {
    let resp = web::router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn form(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// unit is id 1, activity is id 2

#[tokio::test]
async fn complete_then_reject_same_day() {
    let state = state(Frequency::Every2Days, None);

    let req = form("/activities/2/complete", "date=2025-01-05&actor=4");
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["status"], "COMPLETED");

    let (status, body) = send(&state, form("/activities/2/complete", "date=2025-01-06")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(
        body["error"],
        "This day is not part of the 2-day cycle starting on 2025-01-05."
    );

    let (status, body) = send(&state, get("/activities/2/eligibility?date=2025-01-07")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let state = state(Frequency::Daily, None);

    let (status, body) = send(&state, get("/activities/2/eligibility?date=nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid date");

    let (status, _) = send(&state, get("/activities/99/eligibility?date=2025-01-07")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&state, get("/activities/2/calendar/2025/13")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_and_calendar() {
    let state = state(Frequency::Daily, None);

    let bulk = json!({
        "assigned_to": 5,
        "status": "COMPLETED",
        "dates": ["2025-02-03", "2025-02-03", "2025-02-04"],
    });
    let req = json_post("/units/1/activities/2/records", bulk);
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"].as_array().unwrap().len(), 2);
    assert_eq!(body["skipped_count"], 1);

    let (status, body) = send(&state, get("/activities/2/calendar/2025/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["month_name"], "February");
    let cells: Vec<&Value> = body["weeks"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|w| w.as_array().unwrap())
        .filter(|c| c["has_completed"] == true)
        .collect();
    assert_eq!(cells.len(), 2);

    let (status, body) = send(&state, get("/activities/2/performance?year=2025&month=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expected"], 28);
    assert_eq!(body["actual"], 2);
}

#[tokio::test]
async fn verify_requires_manager() {
    let state = state(Frequency::Daily, None);
    let new = json!({
        "unit_id": 1,
        "activity_id": 2,
        "assigned_to": 5,
        "scheduled_date": "2025-02-10",
    });
    let (status, body) = send(&state, json_post("/records", new)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["record_id"].as_u64().unwrap();

    let assistant = json!({ "id": 5, "role": "ASSISTANT", "faculty": null });
    let complete = format!("/records/{id}/complete");
    let verify = format!("/records/{id}/verify");
    let (status, _) = send(&state, json_post(&complete, assistant.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&state, json_post(&verify, assistant)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let manager = json!({ "id": 8, "role": "MANAGER", "faculty": null });
    let (status, body) = send(&state, json_post(&verify, manager)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "VERIFIED");
}

#[tokio::test]
async fn writes_are_saved_to_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(Frequency::Daily, Some(dir.path().to_path_buf()));

    let (status, _) = send(&state, form("/activities/2/complete", "date=2025-03-01")).await;
    assert_eq!(status, StatusCode::OK);

    let reloaded = Ledger::load(dir.path()).unwrap();
    assert_eq!(reloaded.records().len(), 1);
    assert_eq!(reloaded.activities().len(), 1);
}

#[tokio::test]
async fn blank_assignee_in_form_means_none() {
    let state = state(Frequency::Daily, None);

    let fields = "date=2025-03-01&assigned_to=&actor=4";
    let (status, body) = send(&state, form("/activities/2/complete", fields)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let guard = state.lock().await;
    let records = guard.ledger.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].assigned_to, Some(4));
}

#[tokio::test]
async fn malformed_input_gets_json_400() {
    let state = state(Frequency::Daily, None);

    let req = form("/activities/2/complete", "date=2025-03-01&assigned_to=abc");
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "Invalid user id: abc");

    let (status, body) = send(&state, form("/activities/2/complete", "actor=4")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid date");

    let (status, body) = send(&state, get("/activities/2/eligibility")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid date");

    let (status, body) = send(&state, json_post("/records", json!({ "unit_id": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn dates_past_calendar_range_are_invalid() {
    let state = state(Frequency::Weekly, None);

    let req = form("/activities/2/complete", "date=%2B262142-12-31");
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid date");

    let uri = "/activities/2/eligibility?date=%2B262142-12-31";
    let (status, body) = send(&state, get(uri)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid date");

    let (status, _) = send(&state, get("/activities/2/calendar/10000/1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
