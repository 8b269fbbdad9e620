// Frequency policy: how often an activity is expected to happen and which
// caps apply when recording it.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    TwiceDaily,
    Daily,
    #[serde(rename = "EVERY_2_DAYS")]
    Every2Days,
    Weekly,
    Biweekly,
    Monthly,
}

// The cycle-level rule layered on top of the per-day cap.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cycle {
    None,
    Modulo(u32),
    Week,
    Month,
}

// Default times used to tell the two daily slots apart.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SlotTimes {
    pub morning: NaiveTime,
    pub afternoon: NaiveTime,
}

impl Default for SlotTimes {
    fn default() -> Self {
        SlotTimes {
            morning: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            afternoon: NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default(),
        }
    }
}

impl SlotTimes {
    pub fn both(&self) -> [NaiveTime; 2] {
        [self.morning, self.afternoon]
    }
}

impl Frequency {
    pub const ALL: [Frequency; 6] = [
        Frequency::TwiceDaily,
        Frequency::Daily,
        Frequency::Every2Days,
        Frequency::Weekly,
        Frequency::Biweekly,
        Frequency::Monthly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::TwiceDaily => "TWICE_DAILY",
            Frequency::Daily => "DAILY",
            Frequency::Every2Days => "EVERY_2_DAYS",
            Frequency::Weekly => "WEEKLY",
            Frequency::Biweekly => "BIWEEKLY",
            Frequency::Monthly => "MONTHLY",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Frequency::TwiceDaily => "Twice Daily",
            Frequency::Daily => "Daily",
            Frequency::Every2Days => "Every 2 Days",
            Frequency::Weekly => "Weekly",
            Frequency::Biweekly => "Bi-weekly",
            Frequency::Monthly => "Monthly",
        }
    }

    // Slots expected on every day regardless of any cycle. Cycle-gated
    // frequencies only get slots on their cycle days.
    pub fn slots_per_day(self) -> u32 {
        match self {
            Frequency::TwiceDaily => 2,
            Frequency::Daily => 1,
            Frequency::Every2Days
            | Frequency::Weekly
            | Frequency::Biweekly
            | Frequency::Monthly => 0,
        }
    }

    pub fn day_cap(self) -> usize {
        match self {
            Frequency::TwiceDaily => 2,
            _ => 1,
        }
    }

    pub fn cycle_length_days(self) -> Option<u32> {
        match self {
            Frequency::Every2Days => Some(2),
            Frequency::Weekly => Some(7),
            Frequency::Biweekly => Some(14),
            Frequency::TwiceDaily | Frequency::Daily | Frequency::Monthly => None,
        }
    }

    // Weekly is bounded by the calendar week rather than by the anchor,
    // so it reports `Cycle::Week` even though its length is seven days.
    pub fn cycle(self) -> Cycle {
        match self {
            Frequency::TwiceDaily | Frequency::Daily => Cycle::None,
            Frequency::Every2Days => Cycle::Modulo(2),
            Frequency::Biweekly => Cycle::Modulo(14),
            Frequency::Weekly => Cycle::Week,
            Frequency::Monthly => Cycle::Month,
        }
    }

    // Times at which an occurrence is expected on `date`, measured from
    // `anchor` for the cycle-based frequencies.
    pub fn expected_slots(
        self,
        date: NaiveDate,
        anchor: NaiveDate,
        slots: &SlotTimes,
    ) -> Vec<NaiveTime> {
        match self {
            Frequency::TwiceDaily => slots.both().to_vec(),
            Frequency::Daily => vec![slots.morning],
            Frequency::Every2Days | Frequency::Weekly | Frequency::Biweekly => {
                let len = self.cycle_length_days().unwrap_or(1) as i64;
                if (date - anchor).num_days().rem_euclid(len) == 0 {
                    vec![slots.morning]
                } else {
                    Vec::new()
                }
            }
            Frequency::Monthly => {
                let dim = days_in_month(date.year(), date.month());
                if date.day() == anchor.day().min(dim) {
                    vec![slots.morning]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::validation(format!("unknown frequency: {s}")))
    }
}

// Zero for an invalid year/month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    (28..=31)
        .rev()
        .find(|&day| NaiveDate::from_ymd_opt(year, month, day).is_some())
        .unwrap_or(0)
}
