//! Event extraction, merging, and deduplication.
//!
//! Each source calendar is reduced to a list of normalized events; the
//! merger concatenates them in source-declaration order and keeps the
//! first occurrence of every UID.

use std::collections::HashSet;

use chrono_tz::Tz;
use tracing::{debug, warn};

use super::core::{Component, ICalendar, Property};
use super::normalize::DateValue;
use super::parse::{escape_text, unescape_text, ParseOutcome};
use super::timezone::{synthesize_vtimezone, TimeZoneResolver};

/// Properties the event model lifts out of the raw component; everything
/// else passes through untouched.
const LIFTED: [&str; 4] = ["UID", "SUMMARY", "DTSTART", "DTEND"];

/// A normalized calendar event.
///
/// After extraction, `dtstart` and `dtend` hold only `DateOnly` or
/// `Zoned` values in the output timezone, and both have the same kind
/// when `dtend` is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub uid: String,
    /// Summary with RFC 5545 text escapes undone; re-escaped on emission.
    pub summary: Option<String>,
    pub dtstart: DateValue,
    /// Absent DTEND stays absent; no implicit duration.
    pub dtend: Option<DateValue>,
    /// Pass-through properties, raw and in order of appearance.
    pub extra: Vec<Property>,
}

/// One source's events after parsing and normalization.
#[derive(Debug, Clone)]
pub struct SourceCalendar {
    /// Configured source name, used for logging.
    pub name: String,
    pub events: Vec<Event>,
    /// Events dropped during parsing or extraction.
    pub dropped: usize,
    /// Properties whose malformed encoding was repaired.
    pub repaired: usize,
}

impl SourceCalendar {
    /// Extracts normalized events from a parsed calendar.
    ///
    /// Events missing a UID or DTSTART, events whose dates do not classify,
    /// events referencing an unknown source timezone, and events whose
    /// DTSTART/DTEND kinds disagree are dropped with a warning; the rest of
    /// the source survives. Source VTIMEZONE blocks and VALARM children are
    /// discarded.
    #[must_use]
    pub fn extract(
        name: impl Into<String>,
        outcome: &ParseOutcome,
        output_tzid: &str,
        output_tz: Tz,
        resolver: &mut TimeZoneResolver,
    ) -> Self {
        let name = name.into();
        let mut events = Vec::new();
        let mut dropped = outcome.dropped_events;

        for component in outcome.calendar.events() {
            match extract_event(component, output_tzid, output_tz, resolver) {
                Ok(event) => events.push(event),
                Err(reason) => {
                    dropped += 1;
                    warn!(
                        source = %name,
                        uid = component.uid().unwrap_or("<none>"),
                        %reason,
                        "dropping event"
                    );
                }
            }
        }

        Self {
            name,
            events,
            dropped,
            repaired: outcome.repaired_properties,
        }
    }
}

/// Why a single event was dropped during extraction.
#[derive(Debug, thiserror::Error)]
enum ExtractError {
    #[error("missing UID")]
    MissingUid,
    #[error("missing DTSTART")]
    MissingDtstart,
    #[error("{0}")]
    Malformed(#[from] super::parse::MalformedPropertyError),
    #[error("{0}")]
    Timezone(#[from] super::timezone::TimezoneError),
    #[error("DTSTART is {dtstart} but DTEND is {dtend}")]
    KindMismatch {
        dtstart: &'static str,
        dtend: &'static str,
    },
}

fn kind_name(value: &DateValue) -> &'static str {
    match value {
        DateValue::DateOnly(_) => "all-day",
        DateValue::Floating(_) | DateValue::Utc(_) | DateValue::Zoned { .. } => "timed",
    }
}

fn extract_event(
    component: &Component,
    output_tzid: &str,
    output_tz: Tz,
    resolver: &mut TimeZoneResolver,
) -> Result<Event, ExtractError> {
    let uid = component.uid().ok_or(ExtractError::MissingUid)?.to_string();

    let dtstart_prop = component
        .get_property("DTSTART")
        .ok_or(ExtractError::MissingDtstart)?;
    let dtstart =
        DateValue::classify(dtstart_prop)?.normalize(output_tzid, output_tz, resolver)?;

    let dtend = component
        .get_property("DTEND")
        .map(|prop| {
            DateValue::classify(prop)
                .map_err(ExtractError::from)
                .and_then(|v| {
                    v.normalize(output_tzid, output_tz, resolver)
                        .map_err(ExtractError::from)
                })
        })
        .transpose()?;

    if let Some(end) = &dtend {
        if kind_name(end) != kind_name(&dtstart) {
            return Err(ExtractError::KindMismatch {
                dtstart: kind_name(&dtstart),
                dtend: kind_name(end),
            });
        }
    }

    let extra = component
        .properties
        .iter()
        .filter(|p| !LIFTED.contains(&p.name.as_str()))
        .cloned()
        .collect();

    Ok(Event {
        uid,
        summary: component.summary().map(unescape_text),
        dtstart,
        dtend,
        extra,
    })
}

/// The merged event list for one cycle.
#[derive(Debug, Clone)]
pub struct MergedCalendar {
    /// Events in arrival order (source-declaration order, then document
    /// order within each source).
    pub events: Vec<Event>,
    /// Output timezone identifier.
    pub tzid: String,
    /// Later duplicates dropped by the first-wins rule.
    pub duplicates: usize,
}

/// Merges source calendars; the first occurrence of every UID wins.
#[must_use]
pub fn merge(sources: Vec<SourceCalendar>, output_tzid: &str) -> MergedCalendar {
    let mut seen: HashSet<String> = HashSet::new();
    let mut events = Vec::new();
    let mut duplicates = 0usize;

    for source in sources {
        for event in source.events {
            if seen.contains(&event.uid) {
                duplicates += 1;
                debug!(source = %source.name, uid = %event.uid, "dropping duplicate UID");
                continue;
            }
            seen.insert(event.uid.clone());
            events.push(event);
        }
    }

    MergedCalendar {
        events,
        tzid: output_tzid.to_string(),
        duplicates,
    }
}

impl MergedCalendar {
    /// Renders the merged calendar into a component tree.
    ///
    /// One VTIMEZONE for the output zone, synthesized for the given year,
    /// then the events in merge order.
    #[must_use]
    pub fn to_icalendar(&self, calendar_name: &str, tz: Tz, year: i32) -> ICalendar {
        let mut ical = ICalendar::default();
        ical.root.add_property(Property::new("CALSCALE", "GREGORIAN"));
        ical.root.add_property(Property::new("METHOD", "PUBLISH"));
        ical.root
            .add_property(Property::new("X-WR-CALNAME", calendar_name));
        ical.root
            .add_property(Property::new("X-WR-TIMEZONE", self.tzid.as_str()));

        ical.add_timezone(synthesize_vtimezone(&self.tzid, tz, year));

        for event in &self.events {
            let mut component = Component::event();
            component.add_property(Property::new("UID", event.uid.as_str()));
            component.add_property(event.dtstart.to_property("DTSTART"));
            if let Some(dtend) = &event.dtend {
                component.add_property(dtend.to_property("DTEND"));
            }
            if let Some(summary) = &event.summary {
                component.add_property(Property::new("SUMMARY", escape_text(summary)));
            }
            for prop in &event.extra {
                component.add_property(prop.clone());
            }
            ical.add_event(component);
        }

        ical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ical::parse::parse;
    use chrono::NaiveDate;

    fn source(name: &str, body: &str) -> SourceCalendar {
        let input = format!("BEGIN:VCALENDAR\r\n{body}END:VCALENDAR\r\n");
        let outcome = parse(&input).expect("parses");
        let mut resolver = TimeZoneResolver::new();
        SourceCalendar::extract(
            name,
            &outcome,
            "Europe/Berlin",
            Tz::Europe__Berlin,
            &mut resolver,
        )
    }

    #[test]
    fn extracts_normalized_events() {
        let cal = source(
            "a",
            "BEGIN:VEVENT\r\n\
             UID:e1\r\n\
             DTSTART:20250101T110000Z\r\n\
             SUMMARY:UTC event\r\n\
             END:VEVENT\r\n",
        );
        assert_eq!(cal.events.len(), 1);
        assert_eq!(cal.dropped, 0);
        let event = &cal.events[0];
        assert_eq!(event.uid, "e1");
        assert_eq!(
            event.dtstart,
            DateValue::Zoned {
                local: NaiveDate::from_ymd_opt(2025, 1, 1)
                    .unwrap()
                    .and_hms_opt(12, 0, 0)
                    .unwrap(),
                tzid: "Europe/Berlin".to_string(),
            }
        );
        assert!(event.dtend.is_none());
    }

    #[test]
    fn drops_event_missing_uid() {
        let cal = source(
            "a",
            "BEGIN:VEVENT\r\nDTSTART:20250101T110000Z\r\nEND:VEVENT\r\n",
        );
        assert!(cal.events.is_empty());
        assert_eq!(cal.dropped, 1);
    }

    #[test]
    fn drops_event_missing_dtstart() {
        let cal = source("a", "BEGIN:VEVENT\r\nUID:no-start\r\nEND:VEVENT\r\n");
        assert!(cal.events.is_empty());
        assert_eq!(cal.dropped, 1);
    }

    #[test]
    fn drops_event_with_unknown_source_timezone() {
        let cal = source(
            "a",
            "BEGIN:VEVENT\r\n\
             UID:bad-tz\r\n\
             DTSTART;TZID=Nowhere/Atlantis:20250101T110000\r\n\
             END:VEVENT\r\n\
             BEGIN:VEVENT\r\n\
             UID:good\r\n\
             DTSTART:20250101T110000Z\r\n\
             END:VEVENT\r\n",
        );
        assert_eq!(cal.events.len(), 1);
        assert_eq!(cal.events[0].uid, "good");
        assert_eq!(cal.dropped, 1);
    }

    #[test]
    fn drops_event_with_mismatched_kinds() {
        let cal = source(
            "a",
            "BEGIN:VEVENT\r\n\
             UID:mixed\r\n\
             DTSTART;VALUE=DATE:20250219\r\n\
             DTEND:20250219T100000Z\r\n\
             END:VEVENT\r\n",
        );
        assert!(cal.events.is_empty());
        assert_eq!(cal.dropped, 1);
    }

    #[test]
    fn all_day_events_pass_through() {
        let cal = source(
            "a",
            "BEGIN:VEVENT\r\n\
             UID:all-day\r\n\
             DTSTART;VALUE=DATE:20250219\r\n\
             DTEND;VALUE=DATE:20250220\r\n\
             END:VEVENT\r\n",
        );
        let event = &cal.events[0];
        assert!(matches!(event.dtstart, DateValue::DateOnly(_)));
        assert!(matches!(event.dtend, Some(DateValue::DateOnly(_))));
    }

    #[test]
    fn summary_unescaped_on_extract_and_reescaped_on_emit() {
        let cal = source(
            "a",
            "BEGIN:VEVENT\r\n\
             UID:escaped\r\n\
             DTSTART:20250101T110000Z\r\n\
             SUMMARY:Lunch\\, then sync\r\n\
             END:VEVENT\r\n",
        );
        assert_eq!(cal.events[0].summary.as_deref(), Some("Lunch, then sync"));

        let merged = merge(vec![cal], "Europe/Berlin");
        let ical = merged.to_icalendar("Merged Calendar", Tz::Europe__Berlin, 2025);
        let summary = ical.events()[0].get_property("SUMMARY").unwrap();
        assert_eq!(summary.value, "Lunch\\, then sync");
    }

    #[test]
    fn extra_properties_pass_through() {
        let cal = source(
            "a",
            "BEGIN:VEVENT\r\n\
             UID:rich\r\n\
             DTSTART:20250101T110000Z\r\n\
             LOCATION:Room 5\r\n\
             DESCRIPTION:Details here\r\n\
             END:VEVENT\r\n",
        );
        let event = &cal.events[0];
        assert_eq!(event.extra.len(), 2);
        assert_eq!(event.extra[0].name, "LOCATION");
    }

    #[test]
    fn merge_first_uid_wins() {
        let a = source(
            "a",
            "BEGIN:VEVENT\r\n\
             UID:shared\r\n\
             DTSTART:20250101T110000Z\r\n\
             SUMMARY:From A\r\n\
             END:VEVENT\r\n",
        );
        let b = source(
            "b",
            "BEGIN:VEVENT\r\n\
             UID:shared\r\n\
             DTSTART:20250201T110000Z\r\n\
             SUMMARY:From B\r\n\
             END:VEVENT\r\n\
             BEGIN:VEVENT\r\n\
             UID:only-b\r\n\
             DTSTART:20250301T110000Z\r\n\
             END:VEVENT\r\n",
        );

        let merged = merge(vec![a, b], "Europe/Berlin");
        assert_eq!(merged.events.len(), 2);
        assert_eq!(merged.duplicates, 1);
        assert_eq!(merged.events[0].uid, "shared");
        assert_eq!(merged.events[0].summary.as_deref(), Some("From A"));
        assert_eq!(merged.events[1].uid, "only-b");
    }

    #[test]
    fn merge_preserves_arrival_order() {
        let a = source(
            "a",
            "BEGIN:VEVENT\r\nUID:z\r\nDTSTART:20251231T110000Z\r\nEND:VEVENT\r\n",
        );
        let b = source(
            "b",
            "BEGIN:VEVENT\r\nUID:a\r\nDTSTART:20250101T110000Z\r\nEND:VEVENT\r\n",
        );
        let merged = merge(vec![a, b], "Europe/Berlin");
        // No date sorting: declaration order is kept.
        assert_eq!(merged.events[0].uid, "z");
        assert_eq!(merged.events[1].uid, "a");
    }

    #[test]
    fn to_icalendar_document_shape() {
        let a = source(
            "a",
            "BEGIN:VEVENT\r\nUID:e1\r\nDTSTART:20250101T110000Z\r\nEND:VEVENT\r\n",
        );
        let merged = merge(vec![a], "Europe/Berlin");
        let ical = merged.to_icalendar("Merged Calendar", Tz::Europe__Berlin, 2025);

        assert_eq!(ical.version(), Some("2.0"));
        assert_eq!(ical.calscale(), "GREGORIAN");
        assert_eq!(
            ical.root
                .get_property("X-WR-TIMEZONE")
                .map(|p| p.value.as_str()),
            Some("Europe/Berlin")
        );
        assert_eq!(ical.timezones().len(), 1);
        assert_eq!(ical.events().len(), 1);
        let dtstart = ical.events()[0].get_property("DTSTART").unwrap();
        assert_eq!(dtstart.tzid(), Some("Europe/Berlin"));
        assert_eq!(dtstart.value, "20250101T120000");
    }
}
