// Cycle anchor resolution.
//
// The anchor is where an every-2-days or biweekly cycle starts. It is never
// stored: it is recomputed from the activity's records on every call, so
// deleting the earliest record moves the cycle.

use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar::MonthWindow;
use crate::ledger::Ledger;
use crate::model::Activity;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSource {
    EarliestRecord,
    Batch,
    Creation,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct Anchor {
    pub date: NaiveDate,
    pub source: AnchorSource,
}

impl Anchor {
    // Whether the anchor comes from actual scheduling data. Cycle membership
    // is only enforced against established anchors.
    pub fn is_established(&self) -> bool {
        self.source != AnchorSource::Creation
    }
}

// Resolves the anchor for `activity`.
//
// Precedence: earliest existing record, then `batch_first`, then the
// creation date. When `window` is given and the creation date falls after
// it, the first day of the window is used instead.
pub fn resolve_anchor(
    ledger: &Ledger,
    activity: &Activity,
    batch_first: Option<NaiveDate>,
    window: Option<&MonthWindow>,
) -> Anchor {
    if let Some(date) = ledger.earliest_scheduled(activity.id) {
        return Anchor {
            date,
            source: AnchorSource::EarliestRecord,
        };
    }
    if let Some(date) = batch_first {
        return Anchor {
            date,
            source: AnchorSource::Batch,
        };
    }
    let mut date = activity.created_at.date();
    if let Some(w) = window
        && date > w.last
    {
        date = w.first;
    }
    Anchor {
        date,
        source: AnchorSource::Creation,
    }
}

// The anchor that gates eligibility, if one is established.
pub fn established_anchor(
    ledger: &Ledger,
    activity: &Activity,
    batch_first: Option<NaiveDate>,
) -> Option<Anchor> {
    let anchor = resolve_anchor(ledger, activity, batch_first, None);
    anchor.is_established().then_some(anchor)
}
