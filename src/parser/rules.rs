//! Token extraction rules for event text.
//!
//! Every temporal phrase the parser cares about is matched by one entry in an
//! ordered rule table. A single pass over the text yields typed tokens together
//! with the byte span they occupied, so precedence decisions and stripping for
//! title derivation share the same data instead of re-running ad hoc regexes.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::ops::Range;

/// A temporal phrase recognized inside the message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// "сегодня" / "завтра" / "послезавтра", as an offset in days.
    RelativeDay(u8),
    /// "в 14:30", "в 9" — a clock time introduced by the preposition.
    ClockTime { hour: u32, minute: u32 },
    /// "полчаса" / "на полчаса".
    HalfHour,
    /// "на 30 минут", "на 45 мин".
    DurationMinutes(u32),
    /// "на 2 часа", "на 1 ч".
    DurationHours(u32),
    /// "до 18:30" — an explicit end-of-event time.
    Until { hour: u32, minute: u32 },
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

static RE_DURATION_MINUTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bна\s*(\d+)\s*(?:минут(?:ы)?|мин\.?|m)\b").unwrap());
static RE_DURATION_HOURS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bна\s*(\d+)\s*(?:час(?:а|ов)?|ч\.?|h)\b").unwrap());
static RE_HALF_HOUR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:на\s*)?полчаса\b").unwrap());
static RE_UNTIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bдо\s+(\d{1,2})[:.](\d{2})\b").unwrap());
static RE_RELATIVE_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(сегодня|послезавтра|завтра)\b").unwrap());
static RE_CLOCK_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bв\s*(\d{1,2})[:.]?(\d{2})?\b").unwrap());

type TokenBuilder = fn(&Captures<'_>) -> Option<TokenKind>;

struct Rule {
    re: &'static Lazy<Regex>,
    build: TokenBuilder,
}

fn group_num(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx).and_then(|g| g.as_str().parse().ok())
}

fn build_duration_minutes(caps: &Captures<'_>) -> Option<TokenKind> {
    group_num(caps, 1).map(TokenKind::DurationMinutes)
}

fn build_duration_hours(caps: &Captures<'_>) -> Option<TokenKind> {
    group_num(caps, 1).map(TokenKind::DurationHours)
}

fn build_half_hour(_caps: &Captures<'_>) -> Option<TokenKind> {
    Some(TokenKind::HalfHour)
}

fn build_until(caps: &Captures<'_>) -> Option<TokenKind> {
    let hour = group_num(caps, 1)?;
    let minute = group_num(caps, 2)?;
    Some(TokenKind::Until { hour, minute })
}

fn build_relative_day(caps: &Captures<'_>) -> Option<TokenKind> {
    let days = match caps.get(1)?.as_str().to_lowercase().as_str() {
        "сегодня" => 0,
        "завтра" => 1,
        "послезавтра" => 2,
        _ => return None,
    };
    Some(TokenKind::RelativeDay(days))
}

fn build_clock_time(caps: &Captures<'_>) -> Option<TokenKind> {
    let hour = group_num(caps, 1)?;
    let minute = group_num(caps, 2).unwrap_or(0);
    Some(TokenKind::ClockTime { hour, minute })
}

/// Duration rules come first so "на 30 мин" is claimed before the clock-time
/// rule gets a chance to misread anything; within the table order is otherwise
/// not significant because spans keep the matches apart.
static RULES: [Rule; 6] = [
    Rule { re: &RE_DURATION_MINUTES, build: build_duration_minutes },
    Rule { re: &RE_DURATION_HOURS, build: build_duration_hours },
    Rule { re: &RE_HALF_HOUR, build: build_half_hour },
    Rule { re: &RE_UNTIL, build: build_until },
    Rule { re: &RE_RELATIVE_DAY, build: build_relative_day },
    Rule { re: &RE_CLOCK_TIME, build: build_clock_time },
];

/// Run the full rule table over `text` and return tokens in text order.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for rule in &RULES {
        for caps in rule.re.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if let Some(kind) = (rule.build)(&caps) {
                tokens.push(Token { kind, span: whole.range() });
            }
        }
    }
    tokens.sort_by_key(|t| t.span.start);
    tokens
}

/// Resolve the event duration in minutes from the extracted tokens.
///
/// Explicit minutes beat everything else; explicit hours beat the bare
/// half-hour phrase; the half-hour phrase alone counts as 30 minutes.
pub fn duration_minutes(tokens: &[Token]) -> Option<u32> {
    let mut duration = None;
    if tokens.iter().any(|t| t.kind == TokenKind::HalfHour) {
        duration = Some(30);
    }
    let minutes = tokens.iter().find_map(|t| match t.kind {
        TokenKind::DurationMinutes(n) => Some(n),
        _ => None,
    });
    let hours = tokens.iter().find_map(|t| match t.kind {
        TokenKind::DurationHours(n) => Some(n),
        _ => None,
    });
    if let Some(n) = minutes {
        duration = Some(n);
    } else if let Some(n) = hours {
        duration = Some(n.saturating_mul(60));
    }
    duration
}

/// First "до HH:MM" time in text order, if any.
pub fn until_time(tokens: &[Token]) -> Option<(u32, u32)> {
    tokens.iter().find_map(|t| match t.kind {
        TokenKind::Until { hour, minute } => Some((hour, minute)),
        _ => None,
    })
}

/// First relative-day keyword in text order, as an offset in days.
pub fn relative_day(tokens: &[Token]) -> Option<u8> {
    tokens.iter().find_map(|t| match t.kind {
        TokenKind::RelativeDay(days) => Some(days),
        _ => None,
    })
}

/// First "в HH[:MM]" clock time in text order.
pub fn clock_time(tokens: &[Token]) -> Option<(u32, u32)> {
    tokens.iter().find_map(|t| match t.kind {
        TokenKind::ClockTime { hour, minute } => Some((hour, minute)),
        _ => None,
    })
}

/// Token classes removed from the text handed to the date resolver.
/// Dates and relative-day words stay in; the resolver needs them.
pub fn strips_for_date_resolution(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::HalfHour
            | TokenKind::DurationMinutes(_)
            | TokenKind::DurationHours(_)
            | TokenKind::Until { .. }
    )
}

/// Every token class is removed when deriving the event title.
pub fn strips_for_title(_kind: &TokenKind) -> bool {
    true
}

static RE_MULTISPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Remove the spans of the selected token classes and collapse the leftovers.
pub fn strip_tokens(text: &str, tokens: &[Token], keep_out: fn(&TokenKind) -> bool) -> String {
    let mut spans: Vec<Range<usize>> = tokens
        .iter()
        .filter(|t| keep_out(&t.kind))
        .map(|t| t.span.clone())
        .collect();
    spans.sort_by_key(|s| s.start);

    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for span in spans {
        if span.start > pos {
            out.push_str(&text[pos..span.start]);
        }
        pos = pos.max(span.end);
    }
    out.push_str(&text[pos..]);

    RE_MULTISPACE.replace_all(&out, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_duration_in_minutes() {
        let tokens = tokenize("завтра в 14:30 встреча на 30 мин");
        assert_eq!(duration_minutes(&tokens), Some(30));
    }

    #[test]
    fn hours_are_converted_to_minutes() {
        let tokens = tokenize("созвон на 2 часа");
        assert_eq!(duration_minutes(&tokens), Some(120));
    }

    #[test]
    fn explicit_minutes_beat_half_hour() {
        let tokens = tokenize("встреча на полчаса на 45 минут");
        assert_eq!(duration_minutes(&tokens), Some(45));
    }

    #[test]
    fn half_hour_alone_is_thirty() {
        let tokens = tokenize("прогулка на полчаса");
        assert_eq!(duration_minutes(&tokens), Some(30));
    }

    #[test]
    fn until_is_independent_of_duration() {
        let tokens = tokenize("сегодня в 9 до 10:30 планерка на 15 мин");
        assert_eq!(until_time(&tokens), Some((10, 30)));
        assert_eq!(duration_minutes(&tokens), Some(15));
    }

    #[test]
    fn clock_time_without_minutes_defaults_to_zero() {
        let tokens = tokenize("сегодня в 9 планерка");
        assert_eq!(clock_time(&tokens), Some((9, 0)));
        assert_eq!(relative_day(&tokens), Some(0));
    }

    #[test]
    fn day_after_tomorrow_is_not_read_as_tomorrow() {
        let tokens = tokenize("послезавтра в 11:00 обед");
        assert_eq!(relative_day(&tokens), Some(2));
    }

    #[test]
    fn stripping_for_dates_keeps_relative_words() {
        let tokens = tokenize("завтра в 14:30 встреча на 30 мин");
        let stripped = strip_tokens(
            "завтра в 14:30 встреча на 30 мин",
            &tokens,
            strips_for_date_resolution,
        );
        assert_eq!(stripped, "завтра в 14:30 встреча");
    }

    #[test]
    fn stripping_for_title_removes_everything_temporal() {
        let text = "завтра в 14:30 встреча на 30 мин до 16:00";
        let tokens = tokenize(text);
        assert_eq!(strip_tokens(text, &tokens, strips_for_title), "встреча");
    }
}
