//! Value parsers for iCalendar DATE and DATE-TIME (RFC 5545 §3.3).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::error::{ParseError, ParseErrorKind, ParseResult};

/// Parses a DATE value (RFC 5545 §3.3.4).
///
/// Format: `YYYYMMDD` (e.g., "19970714")
///
/// ## Errors
/// Returns an error if the string is not a valid 8-digit date.
pub fn parse_date(s: &str, line: usize, col: usize) -> ParseResult<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::new(ParseErrorKind::InvalidDate, line, col).with_context(s));
    }

    let year = s[0..4]
        .parse::<i32>()
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidDate, line, col))?;
    let month = s[4..6]
        .parse::<u32>()
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidDate, line, col))?;
    let day = s[6..8]
        .parse::<u32>()
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidDate, line, col))?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| ParseError::new(ParseErrorKind::InvalidDate, line, col).with_context(s))
}

/// Parses a TIME value without the UTC marker (RFC 5545 §3.3.12).
fn parse_time(s: &str, line: usize, col: usize) -> ParseResult<NaiveTime> {
    if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::new(ParseErrorKind::InvalidTime, line, col).with_context(s));
    }

    let hour = s[0..2]
        .parse::<u32>()
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidTime, line, col))?;
    let minute = s[2..4]
        .parse::<u32>()
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidTime, line, col))?;
    let second = s[4..6]
        .parse::<u32>()
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidTime, line, col))?;

    // Clamp leap seconds; chrono has no second 60.
    let second = second.min(59);

    NaiveTime::from_hms_opt(hour, minute, second)
        .ok_or_else(|| ParseError::new(ParseErrorKind::InvalidTime, line, col).with_context(s))
}

/// Parses a DATE-TIME value (RFC 5545 §3.3.5).
///
/// Format: `YYYYMMDD"T"HHMMSS[Z]`. Returns the naive local time and whether
/// the value carried the UTC marker. TZID is a property parameter and is
/// handled by the classifier, not here.
///
/// ## Errors
/// Returns an error if the string is not a valid date-time format.
pub fn parse_datetime(s: &str, line: usize, col: usize) -> ParseResult<(NaiveDateTime, bool)> {
    let (body, is_utc) = match s.strip_suffix('Z') {
        Some(stripped) => (stripped, true),
        None => (s, false),
    };

    let t_pos = body.find('T').ok_or_else(|| {
        ParseError::new(ParseErrorKind::InvalidDateTime, line, col).with_context(s)
    })?;

    let date = parse_date(&body[..t_pos], line, col)?;
    let time = parse_time(&body[t_pos + 1..], line, col + t_pos + 1)?;

    Ok((NaiveDateTime::new(date, time), is_utc))
}

/// Unescapes text values (RFC 5545 §3.3.11).
///
/// Escape sequences: `\\` `\,` `\;` `\n` `\N`
#[must_use]
pub fn unescape_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n' | 'N') => result.push('\n'),
                Some(',') => result.push(','),
                Some(';') => result.push(';'),
                Some('\\') | None => result.push('\\'),
                Some(other) => {
                    // Invalid escape, preserve as-is
                    result.push('\\');
                    result.push(other);
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Escapes text values for serialization (RFC 5545 §3.3.11).
#[must_use]
pub fn escape_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            ',' => result.push_str("\\,"),
            ';' => result.push_str("\\;"),
            '\n' => result.push_str("\\n"),
            '\r' => {}
            _ => result.push(c),
        }
    }
    result
}
