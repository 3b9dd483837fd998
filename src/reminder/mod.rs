//! Reminder pipeline: the pure per-event tracker and the polling loop that
//! drives it.

pub mod poller;
pub mod tracker;

pub use tracker::{ReminderMap, ReminderRecord, Threshold};
