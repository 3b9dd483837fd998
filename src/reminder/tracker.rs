//! Per-event reminder state.
//!
//! A pure state machine over a user's reminder records: no clock reads, no
//! I/O. The poller feeds it observations and is told which thresholds are due
//! and whether anything needs persisting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lead time before an event at which a reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Hour,
    TenMinutes,
}

impl Threshold {
    pub fn label(self) -> &'static str {
        match self {
            Threshold::Hour => "через 1 час",
            Threshold::TenMinutes => "через 10 минут",
        }
    }
}

/// Tracking state for one calendar event of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub title: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub sent60: bool,
    #[serde(default)]
    pub sent10: bool,
}

pub type ReminderMap = BTreeMap<String, ReminderRecord>;

/// Outcome of one observation: thresholds to fire now, and whether the
/// record set changed (the caller persists only in that case).
#[derive(Debug, Default)]
pub struct Observation {
    pub due: Vec<Threshold>,
    pub changed: bool,
}

// The poller runs on a coarse cadence, so each threshold gets a ±1 minute
// tolerance window; without it a threshold falling between two polls would
// never fire.
const HOUR_WINDOW: (f64, f64) = (59.0, 61.0);
const TEN_MINUTE_WINDOW: (f64, f64) = (9.0, 11.0);

/// Observe one event occurrence.
///
/// Creates the record on first sight, resets the fired flags when the start
/// time moved (a reschedule of the same event id), and fires each threshold
/// at most once per `(event, start)` pair.
pub fn observe(
    reminders: &mut ReminderMap,
    event_id: &str,
    title: &str,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Observation {
    let mut obs = Observation::default();

    let record = reminders.entry(event_id.to_string()).or_insert_with(|| {
        obs.changed = true;
        ReminderRecord { title: title.to_string(), start, sent60: false, sent10: false }
    });
    if record.start != start {
        record.start = start;
        record.title = title.to_string();
        record.sent60 = false;
        record.sent10 = false;
        obs.changed = true;
    }

    let remaining = (start - now).num_seconds() as f64 / 60.0;

    if !record.sent60 && remaining >= HOUR_WINDOW.0 && remaining <= HOUR_WINDOW.1 {
        record.sent60 = true;
        obs.due.push(Threshold::Hour);
        obs.changed = true;
    }
    if !record.sent10 && remaining >= TEN_MINUTE_WINDOW.0 && remaining <= TEN_MINUTE_WINDOW.1 {
        record.sent10 = true;
        obs.due.push(Threshold::TenMinutes);
        obs.changed = true;
    }

    obs
}

/// Drop records for events no longer present in the polling window
/// (past, cancelled, or moved far out). Returns whether anything was removed.
pub fn prune_departed(reminders: &mut ReminderMap, visible: &BTreeSet<String>) -> bool {
    let before = reminders.len();
    reminders.retain(|id, _| visible.contains(id));
    reminders.len() != before
}
