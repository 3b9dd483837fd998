//! Calendar collaborator types and the client seam.

pub mod google;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::oauth::GoogleTokens;

pub use google::GoogleCalendar;

/// Start of a listed event: either a concrete instant or an all-day marker.
/// All-day events are never fed to the reminder tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum EventStart {
    Timed(DateTime<FixedOffset>),
    AllDay(NaiveDate),
}

/// One event returned by the windowed list call.
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: EventStart,
}

/// An event to be written to the calendar.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub summary: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub timezone: Tz,
}

/// The write call's result: the provider-assigned id plus a link for the user.
#[derive(Debug, Clone)]
pub struct CreatedEvent {
    pub id: String,
    pub html_link: Option<String>,
}

/// The calendar backend seam. One implementation talks to Google; tests can
/// substitute their own.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// Insert an event into the user's primary calendar.
    async fn insert_event(&self, tokens: &GoogleTokens, event: &NewEvent) -> Result<CreatedEvent>;

    /// List events with a start inside `[from, to)`, ordered by start time,
    /// with recurring events expanded into single instances.
    async fn list_events(
        &self,
        tokens: &GoogleTokens,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>>;
}
