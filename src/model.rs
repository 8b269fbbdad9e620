use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::frequency::Frequency;

pub type UnitId = u64;
pub type ActivityId = u64;
pub type RecordId = u64;
pub type UserId = u64;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Verified,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::InProgress => "IN_PROGRESS",
            Status::Completed => "COMPLETED",
            Status::Verified => "VERIFIED",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Status::Pending),
            "IN_PROGRESS" => Some(Status::InProgress),
            "COMPLETED" => Some(Status::Completed),
            "VERIFIED" => Some(Status::Verified),
            _ => None,
        }
    }

    // Completed or verified; counts toward caps and completion statistics.
    pub fn is_done(self) -> bool {
        matches!(self, Status::Completed | Status::Verified)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Manager,
    Assistant,
    DeanOffice,
}

// Who is acting. Supplied by the authentication layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub role: Role,
    pub faculty: Option<u64>,
}

impl Identity {
    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub faculty: Option<u64>,
    pub is_active: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub unit_id: UnitId,
    pub name: String,
    pub frequency: Frequency,
    pub is_active: bool,
    pub budget_percentage: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub unit_id: UnitId,
    // `None` for general cleaning that is not tied to an activity.
    pub activity_id: Option<ActivityId>,
    pub assigned_to: Option<UserId>,
    pub status: Status,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: Option<NaiveTime>,
    pub completed_date: Option<NaiveDateTime>,
    pub verified_by: Option<UserId>,
    pub verified_date: Option<NaiveDateTime>,
    pub notes: String,
}

impl Record {
    pub fn new(
        unit_id: UnitId,
        activity_id: Option<ActivityId>,
        scheduled_date: NaiveDate,
    ) -> Record {
        Record {
            id: 0,
            unit_id,
            activity_id,
            assigned_to: None,
            status: Status::Pending,
            scheduled_date,
            scheduled_time: None,
            completed_date: None,
            verified_by: None,
            verified_date: None,
            notes: String::new(),
        }
    }

    pub fn can_be_edited(&self) -> bool {
        matches!(self.status, Status::Pending | Status::InProgress)
    }

    pub fn can_be_verified(&self) -> bool {
        self.status == Status::Completed
    }

    pub fn start(&mut self, actor: &Identity) -> Result<()> {
        self.require_owner(actor)?;
        if self.status != Status::Pending {
            return Err(Error::Transition(format!(
                "cannot start a {} record",
                self.status.as_str()
            )));
        }
        self.status = Status::InProgress;
        Ok(())
    }

    pub fn complete(&mut self, actor: &Identity, now: NaiveDateTime) -> Result<()> {
        self.require_owner(actor)?;
        if !self.can_be_edited() {
            return Err(Error::Transition(
                "This cleaning record cannot be marked as completed.".into(),
            ));
        }
        self.mark_completed(now);
        Ok(())
    }

    pub fn verify(&mut self, verifier: &Identity, now: NaiveDateTime) -> Result<()> {
        if !verifier.is_manager() {
            return Err(Error::Transition(
                "Only managers can verify cleaning records.".into(),
            ));
        }
        if self.assigned_to == Some(verifier.id) {
            return Err(Error::Transition(
                "A record cannot be verified by its assignee.".into(),
            ));
        }
        if !self.can_be_verified() {
            return Err(Error::Transition(
                "This cleaning record cannot be verified yet.".into(),
            ));
        }
        self.status = Status::Verified;
        self.verified_by = Some(verifier.id);
        self.verified_date = Some(now);
        Ok(())
    }

    // Unconditional move to COMPLETED for callers that already checked
    // eligibility. Done records are left alone.
    pub(crate) fn mark_completed(&mut self, now: NaiveDateTime) {
        if self.status.is_done() {
            return;
        }
        self.status = Status::Completed;
        self.completed_date = Some(now);
    }

    fn require_owner(&self, actor: &Identity) -> Result<()> {
        match self.assigned_to {
            Some(owner) if owner == actor.id => Ok(()),
            _ => Err(Error::Transition(
                "You can only complete your own cleaning tasks.".into(),
            )),
        }
    }
}
