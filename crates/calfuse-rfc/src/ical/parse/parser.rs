//! Document parser: content lines into a component tree.

use tracing::{debug, warn};

use super::error::{ParseError, ParseErrorKind, ParseResult};
use super::lexer::{parse_content_line, split_lines};
use super::repair::repair_property;
use crate::ical::core::{Component, ComponentKind, ICalendar};

/// Result of parsing one iCalendar document.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// The parsed calendar.
    pub calendar: ICalendar,
    /// Properties whose malformed parameter encoding was repaired.
    pub repaired_properties: usize,
    /// Events dropped because a property could not be repaired.
    pub dropped_events: usize,
}

/// Parses a complete iCalendar document.
///
/// The document must be a single `BEGIN:VCALENDAR` .. `END:VCALENDAR`
/// block. Every property runs through the malformed-encoding repair pass;
/// an event containing an unrepairable property is dropped with a warning
/// while the rest of the calendar survives.
///
/// ## Errors
/// Returns an error on structural problems: unlexable lines, a missing or
/// mismatched BEGIN/END pair, or content outside the calendar block.
pub fn parse(input: &str) -> ParseResult<ParseOutcome> {
    let lines = split_lines(input);

    // Stack of open components. The bool marks an event poisoned by an
    // unrepairable property; it is discarded at its END instead of attached.
    let mut stack: Vec<(Component, bool)> = Vec::new();
    let mut root: Option<Component> = None;
    let mut repaired_properties = 0usize;
    let mut dropped_events = 0usize;

    for (line_num, line) in &lines {
        let property = parse_content_line(line, *line_num)?;

        match property.name.as_str() {
            "BEGIN" => {
                let kind = ComponentKind::parse(&property.value);
                if stack.is_empty() && kind != ComponentKind::Calendar {
                    return Err(ParseError::new(ParseErrorKind::MissingBegin, *line_num, 1)
                        .with_context(line.as_str()));
                }
                if !stack.is_empty() && kind == ComponentKind::Calendar {
                    return Err(
                        ParseError::new(ParseErrorKind::MismatchedComponent, *line_num, 1)
                            .with_context("nested VCALENDAR"),
                    );
                }
                stack.push((Component::new(property.value.as_str()), false));
            }
            "END" => {
                let Some((component, poisoned)) = stack.pop() else {
                    return Err(ParseError::new(
                        ParseErrorKind::MismatchedComponent,
                        *line_num,
                        1,
                    )
                    .with_context(line.as_str()));
                };
                if !component.name.eq_ignore_ascii_case(&property.value) {
                    return Err(
                        ParseError::new(ParseErrorKind::MismatchedComponent, *line_num, 1)
                            .with_context(format!(
                                "END:{} closes BEGIN:{}",
                                property.value, component.name
                            )),
                    );
                }

                if poisoned {
                    dropped_events += 1;
                    warn!(
                        uid = component.uid().unwrap_or("<none>"),
                        "dropping event with unrepairable property"
                    );
                } else if let Some((parent, _)) = stack.last_mut() {
                    parent.add_child(component);
                } else {
                    root = Some(component);
                }
            }
            _ => {
                let Some((current, poisoned)) = stack.last_mut() else {
                    return Err(ParseError::new(ParseErrorKind::MissingBegin, *line_num, 1)
                        .with_context(line.as_str()));
                };
                match repair_property(property) {
                    Ok(outcome) => {
                        if outcome.repaired {
                            repaired_properties += 1;
                            debug!(
                                property = %outcome.property.name,
                                line = line_num,
                                "repaired malformed parameter encoding"
                            );
                        }
                        current.add_property(outcome.property);
                    }
                    Err(err) => {
                        if current.kind == Some(ComponentKind::Event) {
                            warn!(%err, line = line_num, "poisoning event");
                            *poisoned = true;
                        } else {
                            // Outside an event there is nothing scoped to
                            // drop; skip just the property.
                            warn!(%err, line = line_num, "skipping unrepairable property");
                        }
                    }
                }
            }
        }
    }

    if let Some((component, _)) = stack.last() {
        return Err(ParseError::new(
            ParseErrorKind::MissingEnd,
            lines.last().map_or(1, |(n, _)| *n),
            1,
        )
        .with_context(format!("unclosed BEGIN:{}", component.name)));
    }

    let root = root.ok_or_else(|| ParseError::new(ParseErrorKind::MissingBegin, 1, 1))?;

    Ok(ParseOutcome {
        calendar: ICalendar { root },
        repaired_properties,
        dropped_events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ical::core::ComponentKind;

    const SIMPLE: &str = "BEGIN:VCALENDAR\r\n\
        VERSION:2.0\r\n\
        PRODID:-//test//test//EN\r\n\
        BEGIN:VEVENT\r\n\
        UID:event-1\r\n\
        DTSTART:20260123T120000Z\r\n\
        SUMMARY:Team Meeting\r\n\
        END:VEVENT\r\n\
        END:VCALENDAR\r\n";

    #[test]
    fn parses_simple_calendar() {
        let outcome = parse(SIMPLE).unwrap();
        assert_eq!(outcome.calendar.version(), Some("2.0"));
        let events = outcome.calendar.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uid(), Some("event-1"));
        assert_eq!(events[0].summary(), Some("Team Meeting"));
        assert_eq!(outcome.repaired_properties, 0);
        assert_eq!(outcome.dropped_events, 0);
    }

    #[test]
    fn parses_nested_components() {
        let input = "BEGIN:VCALENDAR\r\n\
            BEGIN:VTIMEZONE\r\n\
            TZID:Europe/Berlin\r\n\
            BEGIN:STANDARD\r\n\
            DTSTART:19701025T030000\r\n\
            TZOFFSETFROM:+0200\r\n\
            TZOFFSETTO:+0100\r\n\
            END:STANDARD\r\n\
            END:VTIMEZONE\r\n\
            END:VCALENDAR\r\n";
        let outcome = parse(input).unwrap();
        let tzs = outcome.calendar.timezones();
        assert_eq!(tzs.len(), 1);
        let standard = tzs[0].children_of_kind(ComponentKind::Standard);
        assert_eq!(standard.len(), 1);
        assert_eq!(
            standard[0].get_property("TZOFFSETTO").map(|p| p.value.as_str()),
            Some("+0100")
        );
    }

    #[test]
    fn repairs_malformed_property_in_event() {
        let input = "BEGIN:VCALENDAR\r\n\
            BEGIN:VEVENT\r\n\
            UID:event-2\r\n\
            DTSTART;TZID=Europe/Berlin:20250101T120000\r\n\
            DTEND;TZID=Europe/Berlin:;TZID=Europe/Berlin:20250101T130000\r\n\
            END:VEVENT\r\n\
            END:VCALENDAR\r\n";
        let outcome = parse(input).unwrap();
        assert_eq!(outcome.repaired_properties, 1);
        let event = outcome.calendar.events()[0];
        let dtend = event.get_property("DTEND").unwrap();
        assert_eq!(dtend.value, "20250101T130000");
        assert_eq!(dtend.tzid(), Some("Europe/Berlin"));
    }

    #[test]
    fn drops_event_with_unrepairable_property() {
        let input = "BEGIN:VCALENDAR\r\n\
            BEGIN:VEVENT\r\n\
            UID:bad\r\n\
            DTEND;TZID=Europe/Berlin:;TZID=America/New_York:20250101T130000\r\n\
            END:VEVENT\r\n\
            BEGIN:VEVENT\r\n\
            UID:good\r\n\
            DTSTART:20260101T000000Z\r\n\
            END:VEVENT\r\n\
            END:VCALENDAR\r\n";
        let outcome = parse(input).unwrap();
        assert_eq!(outcome.dropped_events, 1);
        let events = outcome.calendar.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uid(), Some("good"));
    }

    #[test]
    fn rejects_missing_begin() {
        let err = parse("VERSION:2.0\r\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingBegin);
    }

    #[test]
    fn rejects_unclosed_component() {
        let input = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:x\r\nEND:VEVENT\r\n";
        let err = parse(input).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingEnd);
    }

    #[test]
    fn rejects_mismatched_end() {
        let input = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";
        let err = parse(input).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MismatchedComponent);
    }

    #[test]
    fn folded_lines_parse_through() {
        let input = "BEGIN:VCALENDAR\r\n\
            BEGIN:VEVENT\r\n\
            UID:folded\r\n\
            SUMMARY:A rather long summary line that was folded by the\r\n\
             \u{20}producer onto a second line\r\n\
            END:VEVENT\r\n\
            END:VCALENDAR\r\n";
        let outcome = parse(input).unwrap();
        let event = outcome.calendar.events()[0];
        assert!(event.summary().unwrap().contains("producer onto a second line"));
    }
}
