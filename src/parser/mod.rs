//! Event text parsing.
//!
//! Turns a free-form Russian sentence like "завтра в 14:30 встреча на 30 мин"
//! into a titled event window in the requester's timezone. Extraction is
//! rule-table driven (see `rules`); date resolution and the relative-day
//! fallback live in `datetime`.

pub mod datetime;
pub mod rules;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// A parse failure, with the user-facing message as its display form.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Пустой текст события")]
    EmptyInput,
    #[error("Не понял дату/время. Пример: 'завтра в 14:30 встреча на 30 мин'")]
    UnresolvedDateTime,
    #[error("Некорректное время")]
    InvalidTime,
    #[error("Неверный часовой пояс")]
    InvalidTimezone,
}

/// A successfully parsed event window. Handed to the calendar client as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub title: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub timezone: Tz,
}

const DEFAULT_DURATION_MINUTES: i64 = 60;
const PLACEHOLDER_TITLE: &str = "Событие";

// "в14:30" → "в 14:30": the preposition must be followed by a space for the
// clock-time rule to see a word boundary.
static RE_GLUED_PREPOSITION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bв(\d)").unwrap());
// "в 14.30" → "в 14:30", only directly after the preposition so dotted dates
// like "15.03" survive.
static RE_DOTTED_CLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?P<prep>в\s)(?P<h>\d{1,2})\.(?P<m>\d{2})\b").unwrap());

fn normalize(text: &str) -> String {
    let spaced = RE_GLUED_PREPOSITION.replace_all(text.trim(), "в $1");
    RE_DOTTED_CLOCK
        .replace_all(&spaced, "${prep}${h}:${m}")
        .into_owned()
}

fn derive_title(normalized: &str, tokens: &[rules::Token]) -> String {
    let stripped = rules::strip_tokens(normalized, tokens, rules::strips_for_title);
    let title = stripped
        .trim_matches(|c: char| matches!(c, ' ' | ',' | '.' | '-'))
        .to_string();
    if title.is_empty() {
        PLACEHOLDER_TITLE.to_string()
    } else {
        title
    }
}

fn resolve_end(
    start: DateTime<Tz>,
    tz: Tz,
    until: Option<(u32, u32)>,
    duration: Option<u32>,
) -> Result<DateTime<Tz>, ParseError> {
    if let Some((hour, minute)) = until {
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or(ParseError::InvalidTime)?;
        let date = start.date_naive();
        let end = datetime::localize(tz, date.and_time(time)).ok_or(ParseError::InvalidTime)?;
        if end > start {
            return Ok(end);
        }
        // An "until" earlier than the start means a time past midnight.
        let next = date.succ_opt().ok_or(ParseError::InvalidTime)?;
        return datetime::localize(tz, next.and_time(time)).ok_or(ParseError::InvalidTime);
    }
    let minutes = duration.map(i64::from).unwrap_or(DEFAULT_DURATION_MINUTES);
    Ok(start + Duration::minutes(minutes))
}

/// Parse `text` into an event window in timezone `tz_name`, anchored at
/// `now`. Deterministic: the same `(text, tz_name, now)` always yields the
/// same result.
pub fn parse_event(
    text: &str,
    tz_name: &str,
    now: DateTime<Utc>,
) -> Result<ParsedEvent, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyInput);
    }
    let tz: Tz = tz_name.parse().map_err(|_| ParseError::InvalidTimezone)?;
    let now = now.with_timezone(&tz);

    let normalized = normalize(text);
    let tokens = rules::tokenize(&normalized);

    let duration = rules::duration_minutes(&tokens);
    let until = rules::until_time(&tokens);

    let date_text = rules::strip_tokens(&normalized, &tokens, rules::strips_for_date_resolution);
    let start = match datetime::resolve(&date_text, tz, now) {
        Some(start) => start,
        None => datetime::resolve_fallback(&date_text, &normalized, tz, now)?,
    };

    let end = resolve_end(start, tz, until, duration)?;
    let title = derive_title(&normalized, &tokens);

    Ok(ParsedEvent { title, start, end, timezone: tz })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Moscow;
    use pretty_assertions::assert_eq;

    fn noon_jan_first() -> DateTime<Utc> {
        Moscow
            .with_ymd_and_hms(2024, 1, 1, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn msk(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        Moscow.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn meeting_tomorrow_with_duration() {
        let ev = parse_event("завтра в 14:30 встреча на 30 мин", "Europe/Moscow", noon_jan_first())
            .unwrap();
        assert_eq!(ev.title, "встреча");
        assert_eq!(ev.start, msk(2024, 1, 2, 14, 30));
        assert_eq!(ev.end, msk(2024, 1, 2, 15, 0));
    }

    #[test]
    fn until_wins_over_default_duration() {
        let ev =
            parse_event("сегодня в 9 до 10:30 планерка", "Europe/Moscow", noon_jan_first()).unwrap();
        assert_eq!(ev.title, "планерка");
        assert_eq!(ev.start, msk(2024, 1, 1, 9, 0));
        assert_eq!(ev.end, msk(2024, 1, 1, 10, 30));
    }

    #[test]
    fn until_wins_over_explicit_duration_but_both_are_stripped() {
        let ev = parse_event(
            "завтра в 22:00 дежурство на 30 мин до 23:45",
            "Europe/Moscow",
            noon_jan_first(),
        )
        .unwrap();
        assert_eq!(ev.title, "дежурство");
        assert_eq!(ev.end, msk(2024, 1, 2, 23, 45));
    }

    #[test]
    fn until_past_midnight_rolls_to_next_day() {
        let ev = parse_event("завтра в 23:00 смена до 01:30", "Europe/Moscow", noon_jan_first())
            .unwrap();
        assert_eq!(ev.start, msk(2024, 1, 2, 23, 0));
        assert_eq!(ev.end, msk(2024, 1, 3, 1, 30));
    }

    #[test]
    fn default_duration_is_one_hour() {
        let ev = parse_event("завтра в 11:00 обед", "Europe/Moscow", noon_jan_first()).unwrap();
        assert_eq!(ev.end - ev.start, Duration::minutes(60));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(
            parse_event("   ", "Europe/Moscow", noon_jan_first()),
            Err(ParseError::EmptyInput)
        );
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert_eq!(
            parse_event("завтра в 10:00 звонок", "Mars/Olympus", noon_jan_first()),
            Err(ParseError::InvalidTimezone)
        );
    }

    #[test]
    fn duration_without_any_date_fails() {
        assert_eq!(
            parse_event("встреча на 90 минут", "Europe/Moscow", noon_jan_first()),
            Err(ParseError::UnresolvedDateTime)
        );
    }

    #[test]
    fn glued_preposition_and_dotted_clock_are_normalized() {
        let ev = parse_event("завтра в14.30 встреча", "Europe/Moscow", noon_jan_first()).unwrap();
        assert_eq!(ev.start, msk(2024, 1, 2, 14, 30));
        assert_eq!(ev.title, "встреча");
    }

    #[test]
    fn title_falls_back_to_placeholder() {
        let ev = parse_event("завтра в 14:30", "Europe/Moscow", noon_jan_first()).unwrap();
        assert_eq!(ev.title, "Событие");
    }

    #[test]
    fn parsing_is_deterministic() {
        let a = parse_event("завтра в 14:30 встреча", "Europe/Moscow", noon_jan_first());
        let b = parse_event("завтра в 14:30 встреча", "Europe/Moscow", noon_jan_first());
        assert_eq!(a, b);
    }
}
