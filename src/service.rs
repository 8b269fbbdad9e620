// Caller-facing operations: ids and raw strings in, serializable responses
// out. Shared by the web handlers and the command line.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::calendar::{self, MonthGrid, MonthWindow, PartialGrid, Performance};
use crate::eligibility::{self, Intent};
use crate::error::{Error, Result};
use crate::frequency::SlotTimes;
use crate::ledger::{self, Ledger};
use crate::model::{ActivityId, RecordId, Status, UnitId, UserId};
use crate::recorder::{self, BulkRequest, Marked};

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    ledger::parse_date(s).ok_or_else(|| Error::validation("Invalid date"))
}

// Runs a write, retrying once if it collided with another write for the
// same slot. The retry re-reads the ledger, so a slot taken in the meantime
// turns into an ordinary rejection.
fn with_retry<T>(ledger: &mut Ledger, mut op: impl FnMut(&mut Ledger) -> Result<T>) -> Result<T> {
    match op(ledger) {
        Err(Error::Conflict(msg)) => {
            tracing::warn!(%msg, "write conflict, retrying");
            op(ledger)
        }
        other => other,
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct EligibilityResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub fn check_eligibility(
    ledger: &Ledger,
    activity_id: ActivityId,
    date: &str,
) -> Result<EligibilityResponse> {
    let date = parse_date(date)?;
    let activity = ledger.activity(activity_id)?;
    let decision = eligibility::can_schedule(ledger, activity, date, Intent::Complete, None);
    Ok(EligibilityResponse {
        ok: decision.is_accepted(),
        reason: decision.reason(),
    })
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct MarkResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn mark_completed_day(
    ledger: &mut Ledger,
    activity_id: ActivityId,
    date: &str,
    assigned_to: Option<UserId>,
    actor: Option<UserId>,
    now: NaiveDateTime,
    slots: &SlotTimes,
) -> Result<MarkResponse> {
    let date = parse_date(date)?;
    let marked = with_retry(ledger, |l| {
        recorder::mark_completed(l, activity_id, date, assigned_to, actor, now, slots)
    })?;
    Ok(match marked {
        Marked::Completed { record, .. } => MarkResponse {
            ok: true,
            record_id: Some(record.id),
            status: Some(record.status),
            error: None,
        },
        Marked::Rejected(reason) => MarkResponse {
            ok: false,
            record_id: None,
            status: None,
            error: Some(reason.to_string()),
        },
    })
}

pub fn project_month(
    ledger: &Ledger,
    activity_id: ActivityId,
    year: i32,
    month: u32,
    slots: &SlotTimes,
) -> Result<MonthGrid> {
    let window = MonthWindow::new(year, month)?;
    let activity = ledger.activity(activity_id)?;
    Ok(calendar::project_month(ledger, activity, &window, slots))
}

pub fn project_month_partial(
    ledger: &Ledger,
    activity_id: ActivityId,
    year: i32,
    month: u32,
    lock_nav: bool,
) -> Result<PartialGrid> {
    let window = MonthWindow::new(year, month)?;
    let activity = ledger.activity(activity_id)?;
    let grid = calendar::project_month_partial(ledger, activity, &window, lock_nav);
    Ok(grid)
}

pub fn expected_vs_actual(
    ledger: &Ledger,
    activity_id: ActivityId,
    year: i32,
    month: u32,
    slots: &SlotTimes,
) -> Result<Performance> {
    let window = MonthWindow::new(year, month)?;
    let activity = ledger.activity(activity_id)?;
    Ok(calendar::performance(ledger, activity, &window, slots))
}

#[derive(Clone, Debug, Serialize)]
pub struct BulkResponse {
    pub created: Vec<RecordId>,
    pub skipped_count: usize,
    pub skipped: Vec<recorder::Skipped>,
}

#[allow(clippy::too_many_arguments)]
pub fn bulk_create_from_selected_days(
    ledger: &mut Ledger,
    unit_id: UnitId,
    activity_id: ActivityId,
    assigned_to: Option<UserId>,
    status: &str,
    dates: &[String],
    now: NaiveDateTime,
    slots: &SlotTimes,
) -> Result<BulkResponse> {
    let status = Status::parse(status)
        .ok_or_else(|| Error::validation(format!("Invalid status: {status}")))?;
    let dates = dates
        .iter()
        .map(|s| parse_date(s))
        .collect::<Result<Vec<_>>>()?;
    let req = BulkRequest {
        unit_id,
        activity_id,
        assigned_to,
        status,
        dates,
    };
    let outcome = recorder::bulk_create(ledger, &req, now, slots)?;
    Ok(BulkResponse {
        skipped_count: outcome.skipped_count(),
        created: outcome.created,
        skipped: outcome.skipped,
    })
}
