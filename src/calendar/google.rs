//! Google Calendar REST client.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;

use super::{CalendarApi, CalendarEvent, CreatedEvent, EventStart, NewEvent};
use crate::oauth::GoogleTokens;

const EVENTS_URL: &str = "https://www.googleapis.com/calendar/v3/calendars/primary/events";

// Popup reminders attached to every created event. These are Google-side and
// independent of the bot's own notifications; both are wanted.
const POPUP_MINUTES: [u32; 2] = [60, 10];

pub struct GoogleCalendar {
    http: reqwest::Client,
}

impl GoogleCalendar {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
struct InsertResponse {
    id: String,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    items: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    summary: Option<String>,
    start: Option<RawEventTime>,
}

#[derive(Debug, Deserialize)]
struct RawEventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

impl RawEvent {
    fn into_event(self) -> Option<CalendarEvent> {
        let start = self.start?;
        let start = if let Some(stamp) = start.date_time {
            let parsed = DateTime::parse_from_rfc3339(&stamp)
                .map_err(|e| warn!("skipping event {} with bad start {stamp}: {e}", self.id))
                .ok()?;
            EventStart::Timed(parsed)
        } else {
            let date = start.date?;
            let parsed = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|e| warn!("skipping event {} with bad date {date}: {e}", self.id))
                .ok()?;
            EventStart::AllDay(parsed)
        };
        Some(CalendarEvent { id: self.id, summary: self.summary, start })
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendar {
    async fn insert_event(&self, tokens: &GoogleTokens, event: &NewEvent) -> Result<CreatedEvent> {
        let tz_name = event.timezone.name();
        let body = json!({
            "summary": event.summary,
            "start": { "dateTime": event.start.to_rfc3339(), "timeZone": tz_name },
            "end": { "dateTime": event.end.to_rfc3339(), "timeZone": tz_name },
            "reminders": {
                "useDefault": false,
                "overrides": POPUP_MINUTES
                    .iter()
                    .map(|m| json!({ "method": "popup", "minutes": m }))
                    .collect::<Vec<_>>(),
            },
        });

        let response = self
            .http
            .post(EVENTS_URL)
            .bearer_auth(&tokens.access_token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("Google API error ({status}): {detail}"));
        }

        let created: InsertResponse = response.json().await?;
        debug!("created event {}", created.id);
        Ok(CreatedEvent { id: created.id, html_link: created.html_link })
    }

    async fn list_events(
        &self,
        tokens: &GoogleTokens,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        let response = self
            .http
            .get(EVENTS_URL)
            .bearer_auth(&tokens.access_token)
            .query(&[
                ("timeMin", from.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("timeMax", to.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("Google API error ({status}): {detail}"));
        }

        let page: EventsPage = response.json().await?;
        Ok(page.items.into_iter().filter_map(RawEvent::into_event).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_and_all_day_starts_are_told_apart() {
        let timed = RawEvent {
            id: "a".into(),
            summary: Some("встреча".into()),
            start: Some(RawEventTime {
                date_time: Some("2024-01-02T14:30:00+03:00".into()),
                date: None,
            }),
        };
        let event = timed.into_event().unwrap();
        assert!(matches!(event.start, EventStart::Timed(_)));

        let all_day = RawEvent {
            id: "b".into(),
            summary: None,
            start: Some(RawEventTime { date_time: None, date: Some("2024-01-02".into()) }),
        };
        let event = all_day.into_event().unwrap();
        assert_eq!(
            event.start,
            EventStart::AllDay(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
    }

    #[test]
    fn events_without_a_start_are_skipped() {
        let broken = RawEvent { id: "c".into(), summary: None, start: None };
        assert!(broken.into_event().is_none());

        let garbled = RawEvent {
            id: "d".into(),
            summary: None,
            start: Some(RawEventTime { date_time: Some("yesterday-ish".into()), date: None }),
        };
        assert!(garbled.into_event().is_none());
    }

    #[test]
    fn zulu_timestamps_parse() {
        let zulu = RawEvent {
            id: "e".into(),
            summary: None,
            start: Some(RawEventTime {
                date_time: Some("2024-01-02T11:30:00Z".into()),
                date: None,
            }),
        };
        assert!(matches!(zulu.into_event().unwrap().start, EventStart::Timed(_)));
    }
}
