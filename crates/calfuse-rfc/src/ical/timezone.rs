//! Timezone resolution, UTC conversion, and VTIMEZONE synthesis.
//!
//! Uses ICU4X for Windows timezone ID to IANA mapping and timezone
//! canonicalization, and chrono-tz for the actual offset arithmetic.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use icu::time::zone::iana::IanaParserExtended;
use icu::time::zone::WindowsParser;

use super::core::{Component, Property};

/// Error during timezone resolution or conversion.
#[derive(Debug, thiserror::Error)]
pub enum TimezoneError {
    /// Unknown or invalid timezone identifier.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// Non-existent time during a DST gap.
    #[error("non-existent time (DST gap): {0}")]
    NonExistentTime(String),
}

/// Resolver for timezone identifiers.
///
/// Caches resolved timezones by their raw TZID so normalization and parsing
/// run once per distinct identifier per merge cycle.
pub struct TimeZoneResolver {
    cache: HashMap<String, Tz>,
}

impl TimeZoneResolver {
    /// Creates a new timezone resolver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Resolves a timezone identifier to a `chrono_tz::Tz`.
    ///
    /// Non-standard TZIDs emitted by common calendar clients (Windows
    /// display names, `/mozilla.org/` prefixes, IANA aliases) are
    /// normalized to canonical IANA names first.
    ///
    /// ## Errors
    /// Returns `TimezoneError::UnknownTimezone` if the TZID cannot be
    /// resolved.
    pub fn resolve(&mut self, tzid: &str) -> Result<Tz, TimezoneError> {
        if let Some(tz) = self.cache.get(tzid) {
            return Ok(*tz);
        }

        let normalized = normalize_tzid(tzid);

        let tz = Tz::from_str(&normalized)
            .map_err(|_e| TimezoneError::UnknownTimezone(tzid.to_string()))?;

        self.cache.insert(tzid.to_string(), tz);

        Ok(tz)
    }
}

impl Default for TimeZoneResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes common CalDAV/iCalendar timezone identifiers to IANA names.
///
/// Uses ICU4X for Windows timezone ID mapping and IANA canonicalization.
/// Many calendar clients use non-standard TZID values that need to be
/// mapped to standard IANA timezone names.
fn normalize_tzid(tzid: &str) -> String {
    // Strip common prefixes
    let stripped = tzid
        .strip_prefix("/mozilla.org/")
        .or_else(|| tzid.strip_prefix("/softwarestudio.org/"))
        .unwrap_or(tzid);

    // Try Windows timezone mapping first using ICU
    let windows_parser = WindowsParser::new();
    if let Some(tz) = windows_parser.parse(stripped, None) {
        // Get the canonical IANA name from the BCP-47 timezone ID
        let iana_parser = IanaParserExtended::new();
        for entry in iana_parser.iter() {
            if entry.time_zone == tz {
                return entry.canonical.to_string();
            }
        }
    }

    // Try IANA parser for canonicalization (handles aliases like Europe/Kiev -> Europe/Kyiv)
    let iana_parser = IanaParserExtended::new();
    let parsed = iana_parser.parse(stripped);
    if parsed.time_zone != icu::time::TimeZone::UNKNOWN {
        return parsed.canonical.to_string();
    }

    // Return as-is if not recognized
    stripped.to_string()
}

/// Converts a local wall-clock time in the given zone to UTC.
///
/// Handles DST ambiguity: a fold (time occurs twice) takes the first
/// occurrence per RFC 5545 §3.3.5, a gap (time does not exist) shifts
/// forward one hour and retries.
///
/// ## Errors
/// Returns an error if the timezone cannot be resolved.
pub fn convert_to_utc(
    local_time: NaiveDateTime,
    tz: Tz,
) -> Result<DateTime<Utc>, TimezoneError> {
    match tz.from_local_datetime(&local_time) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(dt1, _dt2) => Ok(dt1.with_timezone(&Utc)),
        LocalResult::None => {
            // DST gap: shift forward by one hour and retry.
            let shifted = local_time + Duration::hours(1);
            match tz.from_local_datetime(&shifted) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                    Ok(dt.with_timezone(&Utc))
                }
                LocalResult::None => Err(TimezoneError::NonExistentTime(format!(
                    "{local_time} in timezone {tz}"
                ))),
            }
        }
    }
}

/// UTC offset in seconds at the given UTC instant.
fn offset_at(tz: Tz, utc: NaiveDateTime) -> i32 {
    tz.offset_from_utc_datetime(&utc).fix().local_minus_utc()
}

/// Formats a UTC offset in seconds as `±HHMM`.
fn format_offset(secs: i32) -> String {
    let sign = if secs < 0 { '-' } else { '+' };
    let abs = secs.abs();
    format!("{}{:02}{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

/// One DST transition within the scanned year.
struct Transition {
    /// Transition instant in UTC.
    at: NaiveDateTime,
    /// Offset in effect before the transition, seconds.
    from: i32,
    /// Offset in effect after the transition, seconds.
    to: i32,
}

/// Finds the DST transitions of `tz` within calendar `year`.
///
/// Scans at day granularity, then bisects each change down to the minute.
fn find_transitions(tz: Tz, year: i32) -> Vec<Transition> {
    let mut transitions = Vec::new();

    let Some(start) = NaiveDate::from_ymd_opt(year, 1, 1) else {
        return transitions;
    };
    let Some(end) = NaiveDate::from_ymd_opt(year + 1, 1, 1) else {
        return transitions;
    };

    let mut day = start;
    let mut prev_offset = offset_at(tz, day.and_hms_opt(0, 0, 0).unwrap_or_default());

    while day < end {
        let next = day + Duration::days(1);
        let next_offset = offset_at(tz, next.and_hms_opt(0, 0, 0).unwrap_or_default());

        if next_offset != prev_offset {
            // Bisect within [day 00:00, next 00:00] to minute granularity.
            let mut lo = day.and_hms_opt(0, 0, 0).unwrap_or_default();
            let mut hi = next.and_hms_opt(0, 0, 0).unwrap_or_default();
            while hi - lo > Duration::minutes(1) {
                let mid = lo + (hi - lo) / 2;
                if offset_at(tz, mid) == prev_offset {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            transitions.push(Transition {
                at: hi,
                from: prev_offset,
                to: next_offset,
            });
        }

        prev_offset = next_offset;
        day = next;
    }

    transitions
}

/// Derives a yearly RRULE for a transition's local start time.
///
/// Uses the last-occurrence form (`BYDAY=-1SU`) when the weekday does not
/// repeat again within the month, the ordinal form (`BYDAY=2SU`) otherwise.
fn transition_rrule(local: NaiveDateTime) -> String {
    let weekday = match local.weekday() {
        chrono::Weekday::Mon => "MO",
        chrono::Weekday::Tue => "TU",
        chrono::Weekday::Wed => "WE",
        chrono::Weekday::Thu => "TH",
        chrono::Weekday::Fri => "FR",
        chrono::Weekday::Sat => "SA",
        chrono::Weekday::Sun => "SU",
    };

    let month = local.month();
    let day = local.day();
    let days_in_month = days_in_month(local.year(), month);

    if day + 7 > days_in_month {
        format!("FREQ=YEARLY;BYMONTH={month};BYDAY=-1{weekday}")
    } else {
        let ordinal = (day - 1) / 7 + 1;
        format!("FREQ=YEARLY;BYMONTH={month};BYDAY={ordinal}{weekday}")
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt())
        .map_or(31, |d| d.day())
}

/// Builds one STANDARD or DAYLIGHT observance block.
fn observance(kind: &str, local_start: NaiveDateTime, from: i32, to: i32, rrule: Option<String>) -> Component {
    let mut block = Component::new(kind);
    block.add_property(Property::new(
        "DTSTART",
        local_start.format("%Y%m%dT%H%M%S").to_string(),
    ));
    block.add_property(Property::new("TZOFFSETFROM", format_offset(from)));
    block.add_property(Property::new("TZOFFSETTO", format_offset(to)));
    if let Some(rule) = rrule {
        block.add_property(Property::new("RRULE", rule));
    }
    block
}

/// Synthesizes a VTIMEZONE component for the given zone.
///
/// Scans the zone's transitions over `year`. A zone with no transitions
/// yields a single STANDARD block with a fixed offset; a DST zone yields
/// one STANDARD and one DAYLIGHT block, each with a yearly RRULE derived
/// from the observed transition.
#[must_use]
pub fn synthesize_vtimezone(tzid: &str, tz: Tz, year: i32) -> Component {
    let mut vtimezone = Component::timezone();
    vtimezone.add_property(Property::new("TZID", tzid));

    let transitions = find_transitions(tz, year);

    if transitions.is_empty() {
        let offset = offset_at(
            tz,
            NaiveDate::from_ymd_opt(year, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
        );
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        vtimezone.add_child(observance("STANDARD", epoch, offset, offset, None));
        return vtimezone;
    }

    for transition in transitions {
        // DTSTART is the local wall time at the start of the observance,
        // expressed in the offset in effect before the transition.
        let local_start = transition.at + Duration::seconds(i64::from(transition.from));
        let kind = if transition.to > transition.from {
            "DAYLIGHT"
        } else {
            "STANDARD"
        };
        vtimezone.add_child(observance(
            kind,
            local_start,
            transition.from,
            transition.to,
            Some(transition_rrule(local_start)),
        ));
    }

    vtimezone
}
