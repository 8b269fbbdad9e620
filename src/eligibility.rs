// Accept/reject decision for putting a record on a given date.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::anchor::{self, Anchor};
use crate::frequency::{Cycle, Frequency};
use crate::ledger::Ledger;
use crate::model::Activity;

// What the caller intends to do on the date. It decides which records
// count against the per-day cap.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Intent {
    Schedule,
    // Complete the day. Only done records count; a pending record on that
    // day is reused rather than duplicated.
    Complete,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
pub struct Usage {
    pub day: usize,
    pub week_completed: usize,
    pub month_completed: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rejection {
    DayLimit { cap: usize },
    WeeklyLimit,
    MonthlyLimit,
    OffCycle { length: u32, anchor: NaiveDate },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::DayLimit { cap: 2 } => f.write_str("Already marked twice for this day."),
            Rejection::DayLimit { .. } => f.write_str("Already marked for this day."),
            Rejection::WeeklyLimit => f.write_str("Weekly limit reached for this week."),
            Rejection::MonthlyLimit => f.write_str("Monthly limit reached for this month."),
            Rejection::OffCycle { length, anchor } => write!(
                f,
                "This day is not part of the {length}-day cycle starting on {}.",
                anchor.format("%Y-%m-%d")
            ),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Decision {
    Accepted,
    Rejected(Rejection),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            Decision::Accepted => None,
            Decision::Rejected(r) => Some(r.to_string()),
        }
    }
}

// Applies the frequency rules: cycle membership first, then the per-day
// cap, then the per-week or per-month cap.
pub fn evaluate(
    frequency: Frequency,
    date: NaiveDate,
    anchor: Option<NaiveDate>,
    usage: Usage,
) -> Decision {
    let cycle = frequency.cycle();

    if let (Cycle::Modulo(length), Some(anchor)) = (cycle, anchor)
        && (date - anchor).num_days().rem_euclid(length as i64) != 0
    {
        return Decision::Rejected(Rejection::OffCycle { length, anchor });
    }

    let cap = frequency.day_cap();
    if usage.day >= cap {
        return Decision::Rejected(Rejection::DayLimit { cap });
    }

    match cycle {
        Cycle::Week if usage.week_completed >= 1 => Decision::Rejected(Rejection::WeeklyLimit),
        Cycle::Month if usage.month_completed >= 1 => Decision::Rejected(Rejection::MonthlyLimit),
        _ => Decision::Accepted,
    }
}

pub fn usage(ledger: &Ledger, activity: &Activity, date: NaiveDate, intent: Intent) -> Usage {
    let day = ledger
        .records_on(activity.id, date)
        .into_iter()
        .filter(|r| intent == Intent::Schedule || r.status.is_done())
        .count();
    Usage {
        day,
        week_completed: ledger.completed_in_week(activity.id, date),
        month_completed: ledger.completed_in_month(activity.id, date),
    }
}

// Decides whether a record for `activity` may be placed on `date`, reading
// the current state of `ledger`. Nothing is written.
pub fn can_schedule(
    ledger: &Ledger,
    activity: &Activity,
    date: NaiveDate,
    intent: Intent,
    batch_first: Option<NaiveDate>,
) -> Decision {
    let anchor: Option<Anchor> = anchor::established_anchor(ledger, activity, batch_first);
    let usage = usage(ledger, activity, date, intent);
    let decision = evaluate(activity.frequency, date, anchor.map(|a| a.date), usage);
    tracing::debug!(
        activity = activity.id,
        %date,
        frequency = %activity.frequency,
        ?usage,
        ?decision,
        "eligibility"
    );
    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn used(day: usize, week: usize, month: usize) -> Usage {
        Usage {
            day,
            week_completed: week,
            month_completed: month,
        }
    }

    fn accepts(frequency: Frequency, date: NaiveDate, anchor: Option<NaiveDate>) -> bool {
        evaluate(frequency, date, anchor, Usage::default()).is_accepted()
    }

    #[test]
    fn daily_cap() {
        let day = d(2025, 1, 5);
        assert!(accepts(Frequency::Daily, day, None));
        assert_eq!(
            evaluate(Frequency::Daily, day, None, used(1, 1, 1)),
            Decision::Rejected(Rejection::DayLimit { cap: 1 })
        );
    }

    #[test]
    fn twice_daily_cap() {
        let day = d(2025, 1, 5);
        let second = evaluate(Frequency::TwiceDaily, day, None, used(1, 1, 1));
        assert!(second.is_accepted());
        let rejected = evaluate(Frequency::TwiceDaily, day, None, used(2, 2, 2));
        let reason = rejected.reason().unwrap();
        assert_eq!(reason, "Already marked twice for this day.");
    }

    #[test]
    fn weekly_rejects_on_week_count_not_day() {
        let decision = evaluate(Frequency::Weekly, d(2025, 1, 7), None, used(0, 1, 1));
        assert_eq!(decision, Decision::Rejected(Rejection::WeeklyLimit));
        let reason = decision.reason().unwrap();
        assert_eq!(reason, "Weekly limit reached for this week.");
    }

    #[test]
    fn monthly_cap() {
        let decision = evaluate(Frequency::Monthly, d(2025, 1, 20), None, used(0, 0, 1));
        let reason = decision.reason().unwrap();
        assert_eq!(reason, "Monthly limit reached for this month.");
        assert!(accepts(Frequency::Monthly, d(2025, 2, 20), None));
    }

    #[test]
    fn day_cap_checked_before_period_cap() {
        let decision = evaluate(Frequency::Weekly, d(2025, 1, 6), None, used(1, 1, 1));
        assert_eq!(decision, Decision::Rejected(Rejection::DayLimit { cap: 1 }));
    }

    #[test]
    fn cycle_checked_first() {
        let anchor = Some(d(2025, 1, 5));
        let decision = evaluate(Frequency::Every2Days, d(2025, 1, 6), anchor, used(1, 0, 0));
        assert_eq!(
            decision.reason().unwrap(),
            "This day is not part of the 2-day cycle starting on 2025-01-05."
        );
    }

    #[test]
    fn soft_anchor_accepts_anything_before_first_record() {
        for offset in 0..30 {
            let date = d(2025, 1, 1) + chrono::Duration::days(offset);
            assert!(accepts(Frequency::Biweekly, date, None));
            assert!(accepts(Frequency::Every2Days, date, None));
        }
    }

    #[test]
    fn biweekly_cycle() {
        let anchor = d(2025, 3, 3);
        let on = Some(anchor);
        assert!(accepts(Frequency::Biweekly, d(2025, 3, 17), on));
        assert_eq!(
            evaluate(Frequency::Biweekly, d(2025, 3, 10), on, used(0, 0, 0)),
            Decision::Rejected(Rejection::OffCycle { length: 14, anchor })
        );
        // dates before the anchor stay on the same lattice
        assert!(accepts(Frequency::Biweekly, d(2025, 2, 17), on));
    }

    #[test]
    fn weekly_and_monthly_ignore_anchor() {
        let anchor = Some(d(2025, 1, 1));
        assert!(accepts(Frequency::Weekly, d(2025, 1, 3), anchor));
        assert!(accepts(Frequency::Monthly, d(2025, 1, 30), anchor));
    }
}
