use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::{FormRejection, JsonRejection, QueryRejection};
use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::calendar::{self, MonthGrid, MonthWindow, PartialGrid, Performance, ReportRow};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::frequency::{Frequency, SlotTimes};
use crate::ledger::Ledger;
use crate::model::{ActivityId, Identity, Record, RecordId, UnitId, UserId};
use crate::recorder::{self, NewRecord};
use crate::service::{self, BulkResponse, EligibilityResponse, MarkResponse};

// -- App state --

pub struct ServerState {
    pub ledger: Ledger,
    // Where the ledger is saved after each write. `None` keeps it in memory.
    pub data_dir: Option<PathBuf>,
    pub slots: SlotTimes,
}

pub type SharedState = Arc<Mutex<ServerState>>;

#[derive(Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Transition(_) => StatusCode::FORBIDDEN,
        Error::Io(_) | Error::Csv(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("request failed: {err}");
    }
    (
        status,
        Json(ErrorBody {
            ok: false,
            error: err.to_string(),
        }),
    )
}

fn respond<T>(result: Result<T>) -> ApiResult<T> {
    result.map(Json).map_err(api_error)
}

// Malformed query strings and bodies get the same JSON error shape.
fn rejected(e: impl std::fmt::Display) -> ApiError {
    api_error(Error::validation(e.to_string()))
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn persist(state: &ServerState) {
    if let Some(dir) = &state.data_dir
        && let Err(e) = state.ledger.save(dir)
    {
        tracing::error!("Error saving ledger to {}: {e}", dir.display());
    }
}

// -- Eligibility and completion --

// A missing date parses as an invalid one.
#[derive(Deserialize)]
struct DateQuery {
    #[serde(default)]
    date: String,
}

async fn eligibility(
    State(state): State<SharedState>,
    Path(id): Path<ActivityId>,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> ApiResult<EligibilityResponse> {
    let Query(q) = query.map_err(rejected)?;
    let state = state.lock().await;
    respond(service::check_eligibility(&state.ledger, id, &q.date))
}

// HTML forms send unselected users as empty strings.
#[derive(Deserialize)]
struct CompleteForm {
    #[serde(default)]
    date: String,
    assigned_to: Option<String>,
    actor: Option<String>,
}

fn form_user(value: Option<&str>) -> Result<Option<UserId>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| Error::validation(format!("Invalid user id: {v}"))),
    }
}

async fn complete_day(
    State(state): State<SharedState>,
    Path(id): Path<ActivityId>,
    form: Result<Form<CompleteForm>, FormRejection>,
) -> Result<(StatusCode, Json<MarkResponse>), ApiError> {
    let Form(form) = form.map_err(rejected)?;
    let assigned_to = form_user(form.assigned_to.as_deref()).map_err(api_error)?;
    let actor = form_user(form.actor.as_deref()).map_err(api_error)?;
    let mut state = state.lock().await;
    let slots = state.slots;
    let resp = service::mark_completed_day(
        &mut state.ledger,
        id,
        &form.date,
        assigned_to,
        actor,
        now(),
        &slots,
    )
    .map_err(api_error)?;
    if resp.ok {
        persist(&state);
        Ok((StatusCode::OK, Json(resp)))
    } else {
        Ok((StatusCode::BAD_REQUEST, Json(resp)))
    }
}

// -- Calendars and reports --

async fn calendar_current(
    State(state): State<SharedState>,
    Path(id): Path<ActivityId>,
) -> ApiResult<MonthGrid> {
    let today = Local::now().date_naive();
    let (year, month) = (today.year(), today.month());
    let state = state.lock().await;
    let grid = service::project_month(&state.ledger, id, year, month, &state.slots);
    respond(grid)
}

async fn calendar_month(
    State(state): State<SharedState>,
    Path((id, year, month)): Path<(ActivityId, i32, u32)>,
) -> ApiResult<MonthGrid> {
    let state = state.lock().await;
    let grid = service::project_month(&state.ledger, id, year, month, &state.slots);
    respond(grid)
}

#[derive(Deserialize)]
struct MonthQuery {
    year: Option<String>,
    month: Option<String>,
    lock: Option<String>,
    unit: Option<UnitId>,
}

impl MonthQuery {
    // Requested month, falling back to the current one when either part is
    // missing or unparsable.
    fn year_month(&self) -> (i32, u32) {
        let today = Local::now().date_naive();
        let year = self.year.as_deref().map(str::parse::<i32>);
        let month = self.month.as_deref().map(str::parse::<u32>);
        match (year, month) {
            (Some(Ok(y)), Some(Ok(m))) => (y, m),
            (Some(Ok(y)), None) => (y, today.month()),
            (None, Some(Ok(m))) => (today.year(), m),
            _ => (today.year(), today.month()),
        }
    }

    fn lock_nav(&self) -> bool {
        matches!(self.lock.as_deref(), Some("1" | "true" | "yes"))
    }
}

async fn calendar_partial(
    State(state): State<SharedState>,
    Path(id): Path<ActivityId>,
    query: Result<Query<MonthQuery>, QueryRejection>,
) -> ApiResult<PartialGrid> {
    let Query(q) = query.map_err(rejected)?;
    let (year, month) = q.year_month();
    let lock_nav = q.lock_nav();
    let state = state.lock().await;
    let grid = service::project_month_partial(&state.ledger, id, year, month, lock_nav);
    respond(grid)
}

async fn activity_performance(
    State(state): State<SharedState>,
    Path(id): Path<ActivityId>,
    query: Result<Query<MonthQuery>, QueryRejection>,
) -> ApiResult<Performance> {
    let Query(q) = query.map_err(rejected)?;
    let (year, month) = q.year_month();
    let state = state.lock().await;
    let perf = service::expected_vs_actual(&state.ledger, id, year, month, &state.slots);
    respond(perf)
}

async fn performance_report(
    State(state): State<SharedState>,
    query: Result<Query<MonthQuery>, QueryRejection>,
) -> ApiResult<Vec<ReportRow>> {
    let Query(q) = query.map_err(rejected)?;
    let (year, month) = q.year_month();
    let state = state.lock().await;
    respond(
        MonthWindow::new(year, month)
            .and_then(|w| calendar::performance_report(&state.ledger, &w, q.unit, &state.slots)),
    )
}

// -- Activities --

#[derive(Serialize)]
struct ActivitySummary {
    id: ActivityId,
    name: String,
    frequency: Frequency,
}

async fn unit_activities(
    State(state): State<SharedState>,
    Path(unit_id): Path<UnitId>,
) -> ApiResult<Vec<ActivitySummary>> {
    let state = state.lock().await;
    respond(state.ledger.unit(unit_id).map(|_| {
        state
            .ledger
            .activities()
            .iter()
            .filter(|a| a.unit_id == unit_id && a.is_active)
            .map(|a| ActivitySummary {
                id: a.id,
                name: a.name.clone(),
                frequency: a.frequency,
            })
            .collect()
    }))
}

#[derive(Deserialize)]
struct ActiveForm {
    active: bool,
}

async fn set_active(
    State(state): State<SharedState>,
    Path(id): Path<ActivityId>,
    form: Result<Form<ActiveForm>, FormRejection>,
) -> ApiResult<bool> {
    let Form(form) = form.map_err(rejected)?;
    let mut state = state.lock().await;
    let result = state.ledger.set_activity_active(id, form.active);
    if result.is_ok() {
        persist(&state);
    }
    respond(result.map(|_| form.active))
}

// -- Records --

#[derive(Deserialize)]
struct BulkBody {
    assigned_to: Option<UserId>,
    status: String,
    dates: Vec<String>,
}

async fn bulk_records(
    State(state): State<SharedState>,
    Path((unit_id, activity_id)): Path<(UnitId, ActivityId)>,
    body: Result<Json<BulkBody>, JsonRejection>,
) -> ApiResult<BulkResponse> {
    let Json(body) = body.map_err(rejected)?;
    let mut state = state.lock().await;
    let slots = state.slots;
    let result = service::bulk_create_from_selected_days(
        &mut state.ledger,
        unit_id,
        activity_id,
        body.assigned_to,
        &body.status,
        &body.dates,
        now(),
        &slots,
    );
    if matches!(&result, Ok(r) if !r.created.is_empty()) {
        persist(&state);
    }
    respond(result)
}

#[derive(Serialize)]
struct Created {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn create_record(
    State(state): State<SharedState>,
    body: Result<Json<NewRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<Created>), ApiError> {
    let Json(body) = body.map_err(rejected)?;
    let mut state = state.lock().await;
    let slots = state.slots;
    let created = recorder::create_record(&mut state.ledger, body, &slots);
    match created.map_err(api_error)? {
        Ok(id) => {
            persist(&state);
            Ok((
                StatusCode::CREATED,
                Json(Created {
                    ok: true,
                    record_id: Some(id),
                    error: None,
                }),
            ))
        }
        Err(reason) => Ok((
            StatusCode::BAD_REQUEST,
            Json(Created {
                ok: false,
                record_id: None,
                error: Some(reason.to_string()),
            }),
        )),
    }
}

async fn get_record(
    State(state): State<SharedState>,
    Path(id): Path<RecordId>,
) -> ApiResult<Record> {
    let state = state.lock().await;
    respond(state.ledger.record(id).cloned())
}

async fn start_record(
    State(state): State<SharedState>,
    Path(id): Path<RecordId>,
    actor: Result<Json<Identity>, JsonRejection>,
) -> ApiResult<Record> {
    let Json(actor) = actor.map_err(rejected)?;
    let mut state = state.lock().await;
    let result = recorder::start_record(&mut state.ledger, id, &actor);
    if result.is_ok() {
        persist(&state);
    }
    respond(result)
}

async fn complete_record(
    State(state): State<SharedState>,
    Path(id): Path<RecordId>,
    actor: Result<Json<Identity>, JsonRejection>,
) -> ApiResult<Record> {
    let Json(actor) = actor.map_err(rejected)?;
    let mut state = state.lock().await;
    let result = recorder::complete_record(&mut state.ledger, id, &actor, now());
    if result.is_ok() {
        persist(&state);
    }
    respond(result)
}

async fn verify_record(
    State(state): State<SharedState>,
    Path(id): Path<RecordId>,
    verifier: Result<Json<Identity>, JsonRejection>,
) -> ApiResult<Record> {
    let Json(verifier) = verifier.map_err(rejected)?;
    let mut state = state.lock().await;
    let result = recorder::verify_record(&mut state.ledger, id, &verifier, now());
    if result.is_ok() {
        persist(&state);
    }
    respond(result)
}

async fn delete_record(
    State(state): State<SharedState>,
    Path(id): Path<RecordId>,
) -> ApiResult<Record> {
    let mut state = state.lock().await;
    let result = recorder::delete_record(&mut state.ledger, id);
    if result.is_ok() {
        persist(&state);
    }
    respond(result)
}

// -- Public entry points --

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/activities/{id}/eligibility", get(eligibility))
        .route("/activities/{id}/complete", post(complete_day))
        .route("/activities/{id}/active", post(set_active))
        .route("/activities/{id}/calendar", get(calendar_current))
        .route("/activities/{id}/calendar/partial", get(calendar_partial))
        .route(
            "/activities/{id}/calendar/{year}/{month}",
            get(calendar_month),
        )
        .route("/activities/{id}/performance", get(activity_performance))
        .route("/reports/performance", get(performance_report))
        .route("/units/{unit_id}/activities", get(unit_activities))
        .route(
            "/units/{unit_id}/activities/{activity_id}/records",
            post(bulk_records),
        )
        .route("/records", post(create_record))
        .route("/records/{id}", get(get_record).delete(delete_record))
        .route("/records/{id}/start", post(start_record))
        .route("/records/{id}/complete", post(complete_record))
        .route("/records/{id}/verify", post(verify_record))
        .with_state(state)
}

pub async fn serve(config: Config) -> Result<()> {
    let ledger = Ledger::load(&config.data_dir)?;
    tracing::info!(
        activities = ledger.activities().len(),
        records = ledger.records().len(),
        "Loaded ledger from {}",
        config.data_dir.display()
    );

    let state = Arc::new(Mutex::new(ServerState {
        ledger,
        data_dir: Some(config.data_dir.clone()),
        slots: config.slots,
    }));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Serving at http://localhost:{}", config.port);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
