//! Date resolution for event text.
//!
//! `resolve` is the general-purpose pass: an ordered set of pattern rules over
//! the text (explicit dates, relative offsets, weekday names, relative-day
//! words with a clock time), biased toward future dates and anchored at the
//! caller's "now". `resolve_fallback` is the last-resort heuristic used when
//! none of those rules produce a timestamp.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Weekday,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use super::rules::{self, Token};
use super::ParseError;

static RE_ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{1,2}):(\d{2}))?\b").unwrap()
});
static RE_DOTTED_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})(?:\.(\d{4}))?\b").unwrap());
static RE_IN_OFFSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bчерез\s+(\d+)\s*(минут(?:ы)?|мин|час(?:а|ов)?|ч|дня|дней|день)\b").unwrap()
});
static RE_WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:во?\s+)?(понедельник|вторник|сред[ау]|четверг|пятниц[ау]|суббот[ау]|воскресень[ея])\b",
    )
    .unwrap()
});

/// Resolve a wall-clock datetime in `tz`, handling DST folds by taking the
/// earlier instant. Returns `None` for times skipped by a DST gap.
pub(crate) fn localize(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earlier, _later) => Some(earlier),
        LocalResult::None => None,
    }
}

fn valid_clock(hour: u32, minute: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Clock time from the token list, only if it names a real time of day.
fn tokens_clock(tokens: &[Token]) -> Option<NaiveTime> {
    rules::clock_time(tokens).and_then(|(h, m)| valid_clock(h, m))
}

fn resolve_iso(text: &str, tokens: &[Token], tz: Tz) -> Option<DateTime<Tz>> {
    let caps = RE_ISO_DATE.captures(text)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let day: u32 = caps.get(3)?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let time = match (caps.get(4), caps.get(5)) {
        (Some(h), Some(m)) => valid_clock(h.as_str().parse().ok()?, m.as_str().parse().ok()?)?,
        _ => tokens_clock(tokens).unwrap_or(NaiveTime::MIN),
    };
    localize(tz, date.and_time(time))
}

fn resolve_dotted(
    text: &str,
    tokens: &[Token],
    tz: Tz,
    now: DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let caps = RE_DOTTED_DATE.captures(text)?;
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: Option<i32> = match caps.get(3) {
        Some(y) => Some(y.as_str().parse().ok()?),
        None => None,
    };
    let time = tokens_clock(tokens).unwrap_or(NaiveTime::MIN);

    let date = NaiveDate::from_ymd_opt(year.unwrap_or_else(|| now.year()), month, day)?;
    let dt = localize(tz, date.and_time(time))?;
    if year.is_none() && dt <= now {
        // No year given and the date already passed: the next occurrence is meant.
        let next = NaiveDate::from_ymd_opt(now.year() + 1, month, day)?;
        return localize(tz, next.and_time(time));
    }
    Some(dt)
}

fn resolve_offset(
    text: &str,
    tokens: &[Token],
    tz: Tz,
    now: DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let caps = RE_IN_OFFSET.captures(text)?;
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();

    if unit.starts_with('д') {
        let date = now.date_naive() + Duration::days(amount);
        let time = tokens_clock(tokens)
            .unwrap_or_else(|| now.time().with_second(0).unwrap_or(now.time()));
        return localize(tz, date.and_time(time).with_nanosecond(0)?);
    }
    let delta = if unit.starts_with('ч') {
        Duration::hours(amount)
    } else {
        Duration::minutes(amount)
    };
    (now + delta).with_second(0)?.with_nanosecond(0)
}

fn weekday_of(name: &str) -> Option<Weekday> {
    let lower = name.to_lowercase();
    let day = if lower.starts_with("понедельник") {
        Weekday::Mon
    } else if lower.starts_with("вторник") {
        Weekday::Tue
    } else if lower.starts_with("сред") {
        Weekday::Wed
    } else if lower.starts_with("четверг") {
        Weekday::Thu
    } else if lower.starts_with("пятниц") {
        Weekday::Fri
    } else if lower.starts_with("суббот") {
        Weekday::Sat
    } else if lower.starts_with("воскресень") {
        Weekday::Sun
    } else {
        return None;
    };
    Some(day)
}

fn resolve_weekday(
    text: &str,
    tokens: &[Token],
    tz: Tz,
    now: DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let caps = RE_WEEKDAY.captures(text)?;
    let target = weekday_of(caps.get(1)?.as_str())?;
    let time = tokens_clock(tokens)?;

    let ahead = (target.num_days_from_monday() + 7 - now.weekday().num_days_from_monday()) % 7;
    let date = now.date_naive() + Duration::days(ahead as i64);
    let dt = localize(tz, date.and_time(time))?;
    if dt <= now {
        // Same weekday, time already passed: next week is meant.
        return localize(tz, (date + Duration::days(7)).and_time(time));
    }
    Some(dt)
}

fn resolve_relative_day(tokens: &[Token], tz: Tz, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let days = rules::relative_day(tokens)?;
    let time = tokens_clock(tokens)?;
    let date = now.date_naive() + Duration::days(days as i64);
    localize(tz, date.and_time(time))
}

/// General-purpose date resolution over the stripped event text.
///
/// Rules are tried in order; the first one that produces a valid timestamp
/// wins. `None` means the caller should fall back to `resolve_fallback`.
pub fn resolve(text: &str, tz: Tz, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let tokens = rules::tokenize(text);
    resolve_iso(text, &tokens, tz)
        .or_else(|| resolve_dotted(text, &tokens, tz, now))
        .or_else(|| resolve_offset(text, &tokens, tz, now))
        .or_else(|| resolve_weekday(text, &tokens, tz, now))
        .or_else(|| resolve_relative_day(&tokens, tz, now))
}

/// Heuristic used when no general rule matched: a relative-day keyword in the
/// stripped text picks the base date, and an explicit "в HH[:MM]" token from
/// the *original* text supplies the time of day.
pub fn resolve_fallback(
    date_text: &str,
    original_text: &str,
    tz: Tz,
    now: DateTime<Tz>,
) -> Result<DateTime<Tz>, ParseError> {
    let base_days = rules::relative_day(&rules::tokenize(date_text));
    let clock = rules::clock_time(&rules::tokenize(original_text));

    match (base_days, clock) {
        (Some(days), Some((hour, minute))) => {
            let time = valid_clock(hour, minute).ok_or(ParseError::InvalidTime)?;
            let date = now.date_naive() + Duration::days(days as i64);
            localize(tz, date.and_time(time)).ok_or(ParseError::InvalidTime)
        }
        _ => Err(ParseError::UnresolvedDateTime),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Moscow;
    use pretty_assertions::assert_eq;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        Moscow.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn iso_date_with_time() {
        let got = resolve("2024-03-15 18:00 собрание", Moscow, at(2024, 1, 1, 10, 0));
        assert_eq!(got, Some(at(2024, 3, 15, 18, 0)));
    }

    #[test]
    fn dotted_date_takes_time_from_clock_token() {
        let got = resolve("15.03 в 12:00 встреча", Moscow, at(2024, 1, 1, 10, 0));
        assert_eq!(got, Some(at(2024, 3, 15, 12, 0)));
    }

    #[test]
    fn dotted_date_in_the_past_rolls_to_next_year() {
        let got = resolve("15.03 в 12:00 встреча", Moscow, at(2024, 11, 1, 10, 0));
        assert_eq!(got, Some(at(2025, 3, 15, 12, 0)));
    }

    #[test]
    fn dotted_time_is_not_mistaken_for_a_date() {
        // 14.30 would be the 14th of month 30; the rule must reject it.
        assert_eq!(resolve("встреча 14.30", Moscow, at(2024, 1, 1, 10, 0)), None);
    }

    #[test]
    fn offset_in_minutes() {
        let got = resolve("через 45 минут созвон", Moscow, at(2024, 1, 1, 10, 0));
        assert_eq!(got, Some(at(2024, 1, 1, 10, 45)));
    }

    #[test]
    fn weekday_is_future_biased() {
        // 2024-01-01 is a Monday; "в понедельник в 9:00" at 10:00 means next week.
        let got = resolve("в понедельник в 9:00 планерка", Moscow, at(2024, 1, 1, 10, 0));
        assert_eq!(got, Some(at(2024, 1, 8, 9, 0)));
    }

    #[test]
    fn relative_day_with_clock() {
        let got = resolve("завтра в 14:30 встреча", Moscow, at(2024, 1, 1, 10, 0));
        assert_eq!(got, Some(at(2024, 1, 2, 14, 30)));
    }

    #[test]
    fn fallback_requires_both_keyword_and_time() {
        let err = resolve_fallback("встреча", "встреча", Moscow, at(2024, 1, 1, 10, 0));
        assert_eq!(err, Err(ParseError::UnresolvedDateTime));

        let err = resolve_fallback("завтра встреча", "завтра встреча", Moscow, at(2024, 1, 1, 10, 0));
        assert_eq!(err, Err(ParseError::UnresolvedDateTime));
    }

    #[test]
    fn fallback_rejects_impossible_time() {
        let err = resolve_fallback(
            "завтра в 25:70 встреча",
            "завтра в 25:70 встреча",
            Moscow,
            at(2024, 1, 1, 10, 0),
        );
        assert_eq!(err, Err(ParseError::InvalidTime));
    }
}
