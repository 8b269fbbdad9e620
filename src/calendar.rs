// Month calendar projection and expected-versus-actual statistics. Grids are
// Monday-first and cover whole weeks, so the first and last rows carry lead
// and trail days from the neighbouring months.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

use crate::anchor::{self, Anchor};
use crate::error::{Error, Result};
use crate::frequency::{self, SlotTimes};
use crate::ledger::Ledger;
use crate::model::{Activity, ActivityId, Record, RecordId, Status, UnitId};

// Years accepted for calendar input.
pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct MonthWindow {
    pub year: i32,
    pub month: u32,
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl MonthWindow {
    pub fn new(year: i32, month: u32) -> Result<MonthWindow> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .filter(|_| (MIN_YEAR..=MAX_YEAR).contains(&year))
            .ok_or_else(|| Error::validation(format!("invalid month: {year}-{month}")))?;
        Ok(MonthWindow {
            year,
            month,
            first,
            last: last_day_of_month(first),
        })
    }

    pub fn containing(date: NaiveDate) -> MonthWindow {
        let first = date.with_day(1).unwrap_or(date);
        MonthWindow {
            year: date.year(),
            month: date.month(),
            first,
            last: last_day_of_month(date),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first && date <= self.last
    }

    pub fn name(&self) -> &'static str {
        MONTH_NAMES[(self.month - 1) as usize]
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        self.first.iter_days().take_while({
            let last = self.last;
            move |d| *d <= last
        })
    }

    pub fn weeks(&self) -> Vec<[NaiveDate; 7]> {
        let lead = Days::new(self.first.weekday().num_days_from_monday() as u64);
        let mut start = self.first.checked_sub_days(lead).unwrap_or(NaiveDate::MIN);
        let mut rows = Vec::new();
        while start <= self.last {
            let mut row = [start; 7];
            for (i, slot) in row.iter_mut().enumerate() {
                *slot = start
                    .checked_add_days(Days::new(i as u64))
                    .unwrap_or(NaiveDate::MAX);
            }
            rows.push(row);
            match start.checked_add_days(Days::new(7)) {
                Some(next) => start = next,
                None => break,
            }
        }
        rows
    }

    pub fn prev(&self) -> (i32, u32) {
        if self.month == 1 {
            (self.year - 1, 12)
        } else {
            (self.year, self.month - 1)
        }
    }

    pub fn next(&self) -> (i32, u32) {
        if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        }
    }
}

pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let dim = frequency::days_in_month(date.year(), date.month());
    date.with_day(dim).unwrap_or(date)
}

// -- Grids --

#[derive(Clone, Debug, Serialize)]
pub struct RecordRef {
    pub id: RecordId,
    pub status: Status,
    pub time: String,
}

impl RecordRef {
    fn from_record(r: &Record) -> RecordRef {
        RecordRef {
            id: r.id,
            status: r.status,
            time: r
                .scheduled_time
                .map_or(String::new(), |t| t.format("%H:%M").to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DayCell {
    pub date: NaiveDate,
    pub in_month: bool,
    pub expected_slots: Vec<String>,
    pub records: Vec<RecordRef>,
    pub has_completed: bool,
    pub completed_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct MonthGrid {
    pub activity_id: ActivityId,
    pub unit_id: UnitId,
    pub year: i32,
    pub month: u32,
    pub month_name: &'static str,
    pub anchor: Anchor,
    pub weeks: Vec<Vec<DayCell>>,
    pub prev: (i32, u32),
    pub next: (i32, u32),
}

#[derive(Clone, Debug, Serialize)]
pub struct PartialGrid {
    pub activity_id: ActivityId,
    pub year: i32,
    pub month: u32,
    pub month_name: &'static str,
    pub weeks: Vec<Vec<DayCell>>,
    pub lock_nav: bool,
    pub monthly_completed_count: usize,
}

fn records_by_day<'a>(
    ledger: &'a Ledger,
    activity: &Activity,
    window: &MonthWindow,
) -> BTreeMap<NaiveDate, Vec<&'a Record>> {
    let mut by_day: BTreeMap<NaiveDate, Vec<&Record>> = BTreeMap::new();
    let (first, last) = (window.first, window.last);
    for r in ledger.records_between(activity.id, first, last) {
        by_day.entry(r.scheduled_date).or_default().push(r);
    }
    by_day
}

fn cell(
    date: NaiveDate,
    in_month: bool,
    expected_slots: Vec<String>,
    records: &[&Record],
) -> DayCell {
    let completed_count = records.iter().filter(|r| r.status.is_done()).count();
    DayCell {
        date,
        in_month,
        expected_slots,
        records: records.iter().map(|r| RecordRef::from_record(r)).collect(),
        has_completed: completed_count > 0,
        completed_count,
    }
}

// Full scheduling calendar: expected slots per the frequency and the records
// already present in the month.
pub fn project_month(
    ledger: &Ledger,
    activity: &Activity,
    window: &MonthWindow,
    slots: &SlotTimes,
) -> MonthGrid {
    let anchor = anchor::resolve_anchor(ledger, activity, None, Some(window));
    let by_day = records_by_day(ledger, activity, window);

    let weeks = window
        .weeks()
        .iter()
        .map(|row| {
            row.iter()
                .map(|&date| {
                    let in_month = window.contains(date);
                    let expected = if in_month {
                        activity
                            .frequency
                            .expected_slots(date, anchor.date, slots)
                            .iter()
                            .map(|t| t.format("%H:%M").to_string())
                            .collect()
                    } else {
                        Vec::new()
                    };
                    let records = by_day.get(&date).map(Vec::as_slice).unwrap_or(&[]);
                    cell(date, in_month, expected, records)
                })
                .collect()
        })
        .collect();

    MonthGrid {
        activity_id: activity.id,
        unit_id: activity.unit_id,
        year: window.year,
        month: window.month,
        month_name: window.name(),
        anchor,
        weeks,
        prev: window.prev(),
        next: window.next(),
    }
}

// Records only; cells outside the month are left empty.
pub fn project_month_partial(
    ledger: &Ledger,
    activity: &Activity,
    window: &MonthWindow,
    lock_nav: bool,
) -> PartialGrid {
    let by_day = records_by_day(ledger, activity, window);
    let weeks = window
        .weeks()
        .iter()
        .map(|row| {
            row.iter()
                .map(|&date| {
                    if !window.contains(date) {
                        return cell(date, false, Vec::new(), &[]);
                    }
                    let records = by_day.get(&date).map(Vec::as_slice).unwrap_or(&[]);
                    cell(date, true, Vec::new(), records)
                })
                .collect()
        })
        .collect();

    PartialGrid {
        activity_id: activity.id,
        year: window.year,
        month: window.month,
        month_name: window.name(),
        weeks,
        lock_nav,
        monthly_completed_count: actual_completions_for_month(ledger, activity, window),
    }
}

// -- Expected versus actual --

pub fn expected_completions_for_month(
    ledger: &Ledger,
    activity: &Activity,
    window: &MonthWindow,
    slots: &SlotTimes,
) -> usize {
    let anchor = anchor::resolve_anchor(ledger, activity, None, Some(window));
    let frequency = activity.frequency;
    window
        .days()
        .map(|d| frequency.expected_slots(d, anchor.date, slots).len())
        .sum()
}

pub fn actual_completions_for_month(
    ledger: &Ledger,
    activity: &Activity,
    window: &MonthWindow,
) -> usize {
    let (first, last) = (window.first, window.last);
    ledger.completed_between(activity.id, first, last)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn completion_percentage(expected: usize, actual: usize) -> f64 {
    if expected == 0 {
        return 0.0;
    }
    round2(actual as f64 / expected as f64 * 100.0)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Performance {
    pub expected: usize,
    pub actual: usize,
    pub actual_percentage: f64,
    pub budgeted_percentage: f64,
    pub variance: f64,
}

pub fn performance(
    ledger: &Ledger,
    activity: &Activity,
    window: &MonthWindow,
    slots: &SlotTimes,
) -> Performance {
    let expected = expected_completions_for_month(ledger, activity, window, slots);
    let actual = actual_completions_for_month(ledger, activity, window);
    let actual_percentage = completion_percentage(expected, actual);
    Performance {
        expected,
        actual,
        actual_percentage,
        budgeted_percentage: activity.budget_percentage,
        variance: round2(actual_percentage - activity.budget_percentage),
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportRow {
    pub activity_id: ActivityId,
    pub activity_name: String,
    pub unit_id: UnitId,
    pub unit_name: String,
    pub frequency: &'static str,
    #[serde(flatten)]
    pub performance: Performance,
}

// Performance of every active activity in the month, optionally limited to
// one unit, ordered by unit name then activity name.
pub fn performance_report(
    ledger: &Ledger,
    window: &MonthWindow,
    unit: Option<UnitId>,
    slots: &SlotTimes,
) -> Result<Vec<ReportRow>> {
    if let Some(id) = unit {
        ledger.unit(id)?;
    }
    let mut rows = Vec::new();
    for activity in ledger
        .activities()
        .iter()
        .filter(|a| a.is_active && unit.is_none_or(|u| a.unit_id == u))
    {
        let unit = ledger.unit(activity.unit_id)?;
        rows.push(ReportRow {
            activity_id: activity.id,
            activity_name: activity.name.clone(),
            unit_id: unit.id,
            unit_name: unit.name.clone(),
            frequency: activity.frequency.label(),
            performance: performance(ledger, activity, window, slots),
        });
    }
    rows.sort_by(|a, b| {
        a.unit_name
            .cmp(&b.unit_name)
            .then_with(|| a.activity_name.cmp(&b.activity_name))
    });
    Ok(rows)
}
