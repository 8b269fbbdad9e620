// Write path for cleaning records.
//
// Every function takes `&mut Ledger`, so the eligibility read and the write
// that follows happen under one exclusive borrow. Callers sharing a ledger
// across requests hold a single lock for the whole call.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::eligibility::{self, Decision, Intent, Rejection};
use crate::error::{Error, Result};
use crate::frequency::{Frequency, SlotTimes};
use crate::ledger::Ledger;
use crate::model::{ActivityId, Identity, Record, RecordId, Status, UnitId, UserId};

#[derive(Clone, Debug)]
pub enum Marked {
    Completed { record: Record, created: bool },
    Rejected(Rejection),
}

// First default slot not already used by a record on that day.
fn free_slot(day: &[&Record], slots: &SlotTimes) -> Option<NaiveTime> {
    slots
        .both()
        .into_iter()
        .find(|t| !day.iter().any(|r| r.scheduled_time == Some(*t)))
}

// Marks `date` as done for an activity.
//
// A non-done record already on that day is completed in place; otherwise a
// new record is created assigned to `assigned_to`, or to `actor` when no
// assignee is given. Rejections leave the ledger untouched.
pub fn mark_completed(
    ledger: &mut Ledger,
    activity_id: ActivityId,
    date: NaiveDate,
    assigned_to: Option<UserId>,
    actor: Option<UserId>,
    now: NaiveDateTime,
    slots: &SlotTimes,
) -> Result<Marked> {
    let activity = ledger.activity(activity_id)?.clone();

    let decision = eligibility::can_schedule(ledger, &activity, date, Intent::Complete, None);
    if let Decision::Rejected(reason) = decision {
        tracing::info!(activity = activity_id, %date, %reason, "completion rejected");
        return Ok(Marked::Rejected(reason));
    }

    let day = ledger.records_on(activity_id, date);
    let (reuse, slot) = if activity.frequency == Frequency::TwiceDaily {
        let reuse = day
            .iter()
            .find(|r| !r.status.is_done())
            .map(|r| (r.id, r.scheduled_time));
        let slot = free_slot(&day, slots);
        (reuse, slot)
    } else {
        (day.first().map(|r| (r.id, r.scheduled_time)), None)
    };

    let (id, created) = match reuse {
        Some((id, time)) => {
            let record = ledger.record_mut(id)?;
            if time.is_none() && activity.frequency == Frequency::TwiceDaily {
                record.scheduled_time = slot;
            }
            if record.assigned_to.is_none() {
                record.assigned_to = assigned_to;
            }
            record.mark_completed(now);
            (id, false)
        }
        None => {
            let mut record = Record::new(activity.unit_id, Some(activity_id), date);
            record.assigned_to = assigned_to.or(actor);
            record.scheduled_time = slot;
            record.mark_completed(now);
            (ledger.insert_record(record)?, true)
        }
    };

    tracing::info!(activity = activity_id, record = id, %date, created, "day marked completed");
    Ok(Marked::Completed {
        record: ledger.record(id)?.clone(),
        created,
    })
}

#[derive(Clone, Debug, Deserialize)]
pub struct BulkRequest {
    pub unit_id: UnitId,
    pub activity_id: ActivityId,
    pub assigned_to: Option<UserId>,
    pub status: Status,
    pub dates: Vec<NaiveDate>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Skipped {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BulkOutcome {
    pub created: Vec<RecordId>,
    pub skipped: Vec<Skipped>,
}

impl BulkOutcome {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

// Creates one record per selected calendar day. Dates are processed in
// ascending order and each is checked on its own; a rejected date is
// skipped without affecting the rest.
pub fn bulk_create(
    ledger: &mut Ledger,
    req: &BulkRequest,
    now: NaiveDateTime,
    slots: &SlotTimes,
) -> Result<BulkOutcome> {
    ledger.unit(req.unit_id)?;
    let activity = ledger.activity(req.activity_id)?.clone();
    if activity.unit_id != req.unit_id {
        return Err(Error::validation(format!(
            "activity {} does not belong to unit {}",
            activity.id, req.unit_id
        )));
    }
    if req.status == Status::Verified {
        return Err(Error::validation("records cannot be created as VERIFIED"));
    }

    let mut dates = req.dates.clone();
    dates.sort();
    let batch_first = dates.first().copied();

    let mut outcome = BulkOutcome::default();
    for date in dates {
        if let Decision::Rejected(reason) =
            eligibility::can_schedule(ledger, &activity, date, Intent::Schedule, batch_first)
        {
            tracing::warn!(activity = activity.id, %date, %reason, "skipping selected day");
            outcome.skipped.push(Skipped {
                date,
                reason: reason.to_string(),
            });
            continue;
        }

        let mut record = Record::new(req.unit_id, Some(activity.id), date);
        record.assigned_to = req.assigned_to;
        if activity.frequency == Frequency::TwiceDaily {
            record.scheduled_time = free_slot(&ledger.records_on(activity.id, date), slots);
        }
        record.status = req.status;
        if req.status.is_done() {
            record.completed_date = Some(now);
        }
        match ledger.insert_record(record) {
            Ok(id) => outcome.created.push(id),
            Err(Error::Conflict(reason)) => outcome.skipped.push(Skipped { date, reason }),
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        activity = activity.id,
        created = outcome.created.len(),
        skipped = outcome.skipped_count(),
        "bulk records created"
    );
    Ok(outcome)
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewRecord {
    pub unit_id: UnitId,
    pub activity_id: Option<ActivityId>,
    pub assigned_to: Option<UserId>,
    pub scheduled_date: NaiveDate,
    #[serde(default)]
    pub notes: String,
}

// Single manager data entry. Records tied to an activity go through the
// same eligibility check as every other write.
pub fn create_record(
    ledger: &mut Ledger,
    new: NewRecord,
    slots: &SlotTimes,
) -> Result<std::result::Result<RecordId, Rejection>> {
    ledger.unit(new.unit_id)?;
    let date = new.scheduled_date;
    let mut record = Record::new(new.unit_id, new.activity_id, date);
    record.assigned_to = new.assigned_to;
    record.notes = new.notes;

    if let Some(activity_id) = new.activity_id {
        let activity = ledger.activity(activity_id)?.clone();
        if activity.unit_id != new.unit_id {
            return Err(Error::validation(format!(
                "activity {activity_id} does not belong to unit {}",
                new.unit_id
            )));
        }
        let decision = eligibility::can_schedule(ledger, &activity, date, Intent::Schedule, None);
        if let Decision::Rejected(reason) = decision {
            return Ok(Err(reason));
        }
        if activity.frequency == Frequency::TwiceDaily {
            record.scheduled_time = free_slot(&ledger.records_on(activity_id, date), slots);
        }
    }

    let id = ledger.insert_record(record)?;
    tracing::info!(record = id, unit = new.unit_id, "record created");
    Ok(Ok(id))
}

pub fn start_record(ledger: &mut Ledger, id: RecordId, actor: &Identity) -> Result<Record> {
    let record = ledger.record_mut(id)?;
    record.start(actor)?;
    Ok(record.clone())
}

pub fn complete_record(
    ledger: &mut Ledger,
    id: RecordId,
    actor: &Identity,
    now: NaiveDateTime,
) -> Result<Record> {
    let record = ledger.record_mut(id)?;
    record.complete(actor, now)?;
    tracing::info!(record = id, actor = actor.id, "record completed");
    Ok(record.clone())
}

pub fn verify_record(
    ledger: &mut Ledger,
    id: RecordId,
    verifier: &Identity,
    now: NaiveDateTime,
) -> Result<Record> {
    let record = ledger.record_mut(id)?;
    record.verify(verifier, now)?;
    tracing::info!(record = id, verifier = verifier.id, "record verified");
    Ok(record.clone())
}

// Removes a record. Deleting an activity's earliest record moves its
// cycle anchor to the next earliest one.
pub fn delete_record(ledger: &mut Ledger, id: RecordId) -> Result<Record> {
    let record = ledger.delete_record(id)?;
    tracing::info!(record = id, "record deleted");
    Ok(record)
}
