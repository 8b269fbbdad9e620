// In-memory store of units, activities and cleaning records, persisted as
// three CSV files in a data directory.

use std::path::Path;

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};

use crate::calendar::{self, MonthWindow};
use crate::error::{Error, Result};
use crate::frequency::Frequency;
use crate::model::{Activity, ActivityId, Record, RecordId, Status, Unit, UnitId};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";
const DATETIME_FMT: &str = "%Y-%m-%dT%H:%M:%S";

const UNITS_FILE: &str = "units.csv";
const ACTIVITIES_FILE: &str = "activities.csv";
const RECORDS_FILE: &str = "records.csv";

#[derive(Debug, Default, Clone)]
pub struct Ledger {
    units: Vec<Unit>,
    activities: Vec<Activity>,
    records: Vec<Record>,
    next_id: u64,
}

impl Ledger {
    pub fn new() -> Ledger {
        Ledger::default()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // -- Units and activities --

    pub fn add_unit(&mut self, name: &str, faculty: Option<u64>) -> UnitId {
        let id = self.allocate_id();
        self.units.push(Unit {
            id,
            name: name.to_string(),
            faculty,
            is_active: true,
        });
        id
    }

    pub fn unit(&self, id: UnitId) -> Result<&Unit> {
        self.units
            .iter()
            .find(|u| u.id == id)
            .ok_or_else(|| Error::not_found("unit", id))
    }

    pub fn add_activity(
        &mut self,
        unit_id: UnitId,
        name: &str,
        frequency: Frequency,
        budget_percentage: f64,
        created_at: NaiveDateTime,
    ) -> Result<ActivityId> {
        self.unit(unit_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("activity name is required"));
        }
        if !(0.0..=100.0).contains(&budget_percentage) {
            return Err(Error::validation(format!(
                "budget percentage must be between 0 and 100, got {budget_percentage}"
            )));
        }
        if self
            .activities
            .iter()
            .any(|a| a.unit_id == unit_id && a.name.eq_ignore_ascii_case(name))
        {
            return Err(Error::Conflict(format!(
                "activity \"{name}\" already exists for unit {unit_id}"
            )));
        }
        let id = self.allocate_id();
        self.activities.push(Activity {
            id,
            unit_id,
            name: name.to_string(),
            frequency,
            is_active: true,
            budget_percentage,
            created_at,
        });
        Ok(id)
    }

    pub fn activity(&self, id: ActivityId) -> Result<&Activity> {
        self.activities
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::not_found("activity", id))
    }

    pub fn set_activity_active(&mut self, id: ActivityId, active: bool) -> Result<()> {
        let activity = self
            .activities
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::not_found("activity", id))?;
        activity.is_active = active;
        Ok(())
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    // -- Records --

    pub fn record(&self, id: RecordId) -> Result<&Record> {
        self.records
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found("record", id))
    }

    pub fn record_mut(&mut self, id: RecordId) -> Result<&mut Record> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found("record", id))
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    // Inserts a record and returns its id. At most one record may exist per
    // (activity, date, time slot).
    pub fn insert_record(&mut self, mut record: Record) -> Result<RecordId> {
        if let Some(activity_id) = record.activity_id {
            let taken = self.records.iter().any(|r| {
                r.activity_id == Some(activity_id)
                    && r.scheduled_date == record.scheduled_date
                    && r.scheduled_time == record.scheduled_time
            });
            if taken {
                return Err(Error::Conflict(format!(
                    "activity {activity_id} already has a record for {}{}",
                    record.scheduled_date.format(DATE_FMT),
                    record
                        .scheduled_time
                        .map_or(String::new(), |t| format!(" {}", t.format(TIME_FMT)))
                )));
            }
        }
        record.id = self.allocate_id();
        let id = record.id;
        self.records.push(record);
        Ok(id)
    }

    pub fn delete_record(&mut self, id: RecordId) -> Result<Record> {
        let pos = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Error::not_found("record", id))?;
        Ok(self.records.remove(pos))
    }

    pub fn records_for_activity(&self, activity_id: ActivityId) -> impl Iterator<Item = &Record> {
        self.records
            .iter()
            .filter(move |r| r.activity_id == Some(activity_id))
    }

    pub fn records_on(&self, activity_id: ActivityId, date: NaiveDate) -> Vec<&Record> {
        self.records_for_activity(activity_id)
            .filter(|r| r.scheduled_date == date)
            .collect()
    }

    pub fn records_between(
        &self,
        activity_id: ActivityId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl Iterator<Item = &Record> {
        self.records_for_activity(activity_id)
            .filter(move |r| r.scheduled_date >= from && r.scheduled_date <= to)
    }

    pub fn completed_between(
        &self,
        activity_id: ActivityId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> usize {
        self.records_between(activity_id, from, to)
            .filter(|r| r.status.is_done())
            .count()
    }

    // Monday to Sunday, clamped at the ends of the representable range.
    pub fn completed_in_week(&self, activity_id: ActivityId, date: NaiveDate) -> usize {
        let back = Days::new(date.weekday().num_days_from_monday() as u64);
        let start = date.checked_sub_days(back).unwrap_or(NaiveDate::MIN);
        let end = start
            .checked_add_days(Days::new(6))
            .unwrap_or(NaiveDate::MAX);
        self.completed_between(activity_id, start, end)
    }

    pub fn completed_in_month(&self, activity_id: ActivityId, date: NaiveDate) -> usize {
        let window = MonthWindow::containing(date);
        self.completed_between(activity_id, window.first, window.last)
    }

    pub fn earliest_scheduled(&self, activity_id: ActivityId) -> Option<NaiveDate> {
        self.records_for_activity(activity_id)
            .map(|r| r.scheduled_date)
            .min()
    }

    // -- Persistence --

    pub fn load(dir: &Path) -> Result<Ledger> {
        let mut ledger = Ledger::new();
        if let Some(mut reader) = open_reader(&dir.join(UNITS_FILE))? {
            for row in reader.records() {
                let row = row?;
                ledger.units.push(Unit {
                    id: parse_id(&row, 0)?,
                    name: field(&row, 1),
                    faculty: parse_opt_u64(&field(&row, 2)),
                    is_active: parse_bool(&field(&row, 3)),
                });
            }
        }
        if let Some(mut reader) = open_reader(&dir.join(ACTIVITIES_FILE))? {
            for row in reader.records() {
                let row = row?;
                let frequency: Frequency = field(&row, 3).parse()?;
                let budget = field(&row, 5);
                let budget_percentage = budget
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|b| (0.0..=100.0).contains(b))
                    .ok_or_else(|| {
                        Error::validation(format!(
                            "bad budget_percentage in {ACTIVITIES_FILE}: {budget:?}"
                        ))
                    })?;
                ledger.activities.push(Activity {
                    id: parse_id(&row, 0)?,
                    unit_id: parse_id(&row, 1)?,
                    name: field(&row, 2),
                    frequency,
                    is_active: parse_bool(&field(&row, 4)),
                    budget_percentage,
                    created_at: parse_datetime(&field(&row, 6)).ok_or_else(|| {
                        Error::validation(format!("bad created_at in {ACTIVITIES_FILE}"))
                    })?,
                });
            }
        }
        if let Some(mut reader) = open_reader(&dir.join(RECORDS_FILE))? {
            for row in reader.records() {
                let row = row?;
                let raw_status = field(&row, 4);
                let status = Status::parse(&raw_status).ok_or_else(|| {
                    Error::validation(format!("bad status in {RECORDS_FILE}: {raw_status}"))
                })?;
                ledger.records.push(Record {
                    id: parse_id(&row, 0)?,
                    unit_id: parse_id(&row, 1)?,
                    activity_id: parse_opt_u64(&field(&row, 2)),
                    assigned_to: parse_opt_u64(&field(&row, 3)),
                    status,
                    scheduled_date: parse_date(&field(&row, 5)).ok_or_else(|| {
                        Error::validation(format!("bad scheduled_date in {RECORDS_FILE}"))
                    })?,
                    scheduled_time: parse_time(&field(&row, 6)),
                    completed_date: parse_datetime(&field(&row, 7)),
                    verified_by: parse_opt_u64(&field(&row, 8)),
                    verified_date: parse_datetime(&field(&row, 9)),
                    notes: field(&row, 10),
                });
            }
        }
        ledger.next_id = ledger
            .units
            .iter()
            .map(|u| u.id)
            .chain(ledger.activities.iter().map(|a| a.id))
            .chain(ledger.records.iter().map(|r| r.id))
            .max()
            .unwrap_or(0);
        ledger.records.sort_by_key(|r| r.id);
        Ok(ledger)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let mut w = csv::Writer::from_path(dir.join(UNITS_FILE))?;
        w.write_record(["id", "name", "faculty", "is_active"])?;
        for u in &self.units {
            w.write_record([
                u.id.to_string(),
                u.name.clone(),
                opt_to_string(u.faculty),
                u.is_active.to_string(),
            ])?;
        }
        w.flush()?;

        let mut w = csv::Writer::from_path(dir.join(ACTIVITIES_FILE))?;
        w.write_record([
            "id",
            "unit_id",
            "name",
            "frequency",
            "is_active",
            "budget_percentage",
            "created_at",
        ])?;
        for a in &self.activities {
            w.write_record([
                a.id.to_string(),
                a.unit_id.to_string(),
                a.name.clone(),
                a.frequency.as_str().to_string(),
                a.is_active.to_string(),
                format!("{:.2}", a.budget_percentage),
                a.created_at.format(DATETIME_FMT).to_string(),
            ])?;
        }
        w.flush()?;

        let mut w = csv::Writer::from_path(dir.join(RECORDS_FILE))?;
        w.write_record([
            "id",
            "unit_id",
            "activity_id",
            "assigned_to",
            "status",
            "scheduled_date",
            "scheduled_time",
            "completed_date",
            "verified_by",
            "verified_date",
            "notes",
        ])?;
        for r in &self.records {
            w.write_record([
                r.id.to_string(),
                r.unit_id.to_string(),
                opt_to_string(r.activity_id),
                opt_to_string(r.assigned_to),
                r.status.as_str().to_string(),
                r.scheduled_date.format(DATE_FMT).to_string(),
                r.scheduled_time
                    .map_or(String::new(), |t| t.format(TIME_FMT).to_string()),
                r.completed_date
                    .map_or(String::new(), |d| d.format(DATETIME_FMT).to_string()),
                opt_to_string(r.verified_by),
                r.verified_date
                    .map_or(String::new(), |d| d.format(DATETIME_FMT).to_string()),
                r.notes.clone(),
            ])?;
        }
        w.flush()?;
        Ok(())
    }
}

fn open_reader(path: &Path) -> Result<Option<csv::Reader<std::fs::File>>> {
    if !path.exists() {
        return Ok(None);
    }
    let reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    Ok(Some(reader))
}

fn field(row: &csv::StringRecord, index: usize) -> String {
    row.get(index).unwrap_or("").to_string()
}

fn parse_id(row: &csv::StringRecord, index: usize) -> Result<u64> {
    let raw = field(row, index);
    raw.trim()
        .parse()
        .map_err(|_| Error::validation(format!("bad id in column {index}: {raw:?}")))
}

fn parse_opt_u64(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        s.parse().ok()
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim(), "true" | "1" | "yes")
}

// Years outside the calendar range are refused.
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FMT)
        .ok()
        .filter(|d| (calendar::MIN_YEAR..=calendar::MAX_YEAR).contains(&d.year()))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        NaiveTime::parse_from_str(s, TIME_FMT).ok()
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        NaiveDateTime::parse_from_str(s, DATETIME_FMT).ok()
    }
}

fn opt_to_string(v: Option<u64>) -> String {
    v.map_or(String::new(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn created() -> NaiveDateTime {
        d(2025, 1, 1).and_hms_opt(8, 0, 0).unwrap()
    }

    fn fixture() -> (Ledger, ActivityId) {
        let mut ledger = Ledger::new();
        let unit = ledger.add_unit("Lecture Hall 1", Some(3));
        let activity = ledger
            .add_activity(unit, "Mop floor", Frequency::Weekly, 80.0, created())
            .unwrap();
        (ledger, activity)
    }

    fn completed(activity: ActivityId, date: NaiveDate) -> Record {
        let mut r = Record::new(1, Some(activity), date);
        r.status = Status::Completed;
        r
    }

    #[test]
    fn activity_name_unique_per_unit() {
        let (mut ledger, _) = fixture();
        let err = ledger.add_activity(1, "mop FLOOR", Frequency::Daily, 10.0, created());
        assert!(matches!(err, Err(Error::Conflict(_))));
        let other = ledger.add_unit("Lab A", None);
        let ok = ledger.add_activity(other, "Mop floor", Frequency::Daily, 10.0, created());
        assert!(ok.is_ok());
    }

    #[test]
    fn activity_budget_bounds() {
        let (mut ledger, _) = fixture();
        let over = ledger.add_activity(1, "Windows", Frequency::Daily, 101.0, created());
        assert!(over.is_err());
        let orphan = ledger.add_activity(99, "Windows", Frequency::Daily, 10.0, created());
        assert!(matches!(
            orphan,
            Err(Error::NotFound {
                kind: "unit",
                id: 99
            })
        ));
    }

    #[test]
    fn unique_slot_per_activity_day() {
        let (mut ledger, a) = fixture();
        let day = d(2025, 2, 3);
        ledger.insert_record(Record::new(1, Some(a), day)).unwrap();
        let dup = ledger.insert_record(Record::new(1, Some(a), day));
        assert!(matches!(dup, Err(Error::Conflict(_))));

        let mut pm = Record::new(1, Some(a), day);
        pm.scheduled_time = NaiveTime::from_hms_opt(15, 0, 0);
        assert!(ledger.insert_record(pm).is_ok());

        // general cleaning records are not slot-constrained
        ledger.insert_record(Record::new(1, None, day)).unwrap();
        ledger.insert_record(Record::new(1, None, day)).unwrap();
    }

    #[test]
    fn week_counts_are_monday_based() {
        let (mut ledger, a) = fixture();
        // Sunday 2025-02-09 closes the week that starts Monday 2025-02-03
        ledger.insert_record(completed(a, d(2025, 2, 9))).unwrap();
        assert_eq!(ledger.completed_in_week(a, d(2025, 2, 3)), 1);
        assert_eq!(ledger.completed_in_week(a, d(2025, 2, 10)), 0);
        assert_eq!(ledger.completed_in_month(a, d(2025, 2, 28)), 1);
        assert_eq!(ledger.completed_in_month(a, d(2025, 3, 1)), 0);
    }

    #[test]
    fn week_and_month_counts_at_range_edges() {
        let (mut ledger, a) = fixture();
        ledger.insert_record(completed(a, NaiveDate::MAX)).unwrap();
        assert_eq!(ledger.completed_in_week(a, NaiveDate::MAX), 1);
        assert_eq!(ledger.completed_in_month(a, NaiveDate::MAX), 1);
        assert_eq!(ledger.completed_in_week(a, NaiveDate::MIN), 0);
    }

    #[test]
    fn parse_date_refuses_years_outside_calendar() {
        assert_eq!(parse_date("2025-02-03"), Some(d(2025, 2, 3)));
        assert_eq!(parse_date(" 9999-12-31 "), Some(d(9999, 12, 31)));
        assert_eq!(parse_date("+262142-12-31"), None);
        assert_eq!(parse_date("10000-01-01"), None);
        assert_eq!(parse_date("0000-01-01"), None);
        assert_eq!(parse_date("2025-02-30"), None);
    }

    #[test]
    fn pending_records_do_not_count_as_completed() {
        let (mut ledger, a) = fixture();
        let pending = Record::new(1, Some(a), d(2025, 2, 4));
        ledger.insert_record(pending).unwrap();
        assert_eq!(ledger.completed_in_week(a, d(2025, 2, 4)), 0);
        assert_eq!(ledger.records_on(a, d(2025, 2, 4)).len(), 1);
    }

    #[test]
    fn earliest_follows_deletion() {
        let (mut ledger, a) = fixture();
        let first = ledger.insert_record(completed(a, d(2025, 2, 2))).unwrap();
        ledger.insert_record(completed(a, d(2025, 2, 12))).unwrap();
        assert_eq!(ledger.earliest_scheduled(a), Some(d(2025, 2, 2)));
        ledger.delete_record(first).unwrap();
        assert_eq!(ledger.earliest_scheduled(a), Some(d(2025, 2, 12)));
        assert!(ledger.delete_record(first).is_err());
    }

    #[test]
    fn csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ledger, a) = fixture();
        let mut r = completed(a, d(2025, 2, 5));
        r.assigned_to = Some(42);
        r.scheduled_time = NaiveTime::from_hms_opt(9, 0, 0);
        r.completed_date = d(2025, 2, 5).and_hms_opt(11, 30, 0);
        r.notes = "left, then came back".into();
        let rid = ledger.insert_record(r).unwrap();
        ledger.save(dir.path()).unwrap();

        let mut loaded = Ledger::load(dir.path()).unwrap();
        let act = loaded.activity(a).unwrap();
        assert_eq!(act.frequency, Frequency::Weekly);
        assert_eq!(act.created_at, created());
        assert!((act.budget_percentage - 80.0).abs() < 1e-9);
        let rec = loaded.record(rid).unwrap();
        assert_eq!(rec.status, Status::Completed);
        assert_eq!(rec.assigned_to, Some(42));
        assert_eq!(rec.scheduled_time, NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(rec.notes, "left, then came back");
        assert_eq!(loaded.unit(1).unwrap().faculty, Some(3));

        // ids keep increasing after a reload
        let next = Record::new(1, Some(a), d(2025, 2, 6));
        assert!(loaded.insert_record(next).unwrap() > rid);
    }

    #[test]
    fn load_rejects_bad_budget() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, _) = fixture();
        ledger.save(dir.path()).unwrap();

        let path = dir.path().join(ACTIVITIES_FILE);
        let text = std::fs::read_to_string(&path).unwrap();
        for bad in ["lots", "120.00"] {
            std::fs::write(&path, text.replace("80.00", bad)).unwrap();
            let err = Ledger::load(dir.path()).unwrap_err().to_string();
            assert!(err.contains("budget_percentage"), "{err}");
        }
    }

    #[test]
    fn load_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(&dir.path().join("nothing-here")).unwrap();
        assert!(ledger.records().is_empty());
        assert!(ledger.activities().is_empty());
    }
}
