//! Classification and timezone normalization of DTSTART/DTEND values.
//!
//! Every temporal property value is classified into one of four shapes,
//! then normalized so the merged output contains only all-day dates and
//! wall-clock times in the configured output timezone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use super::core::{Parameter, Property};
use super::parse::{parse_date, parse_datetime, MalformedPropertyError};
use super::timezone::{convert_to_utc, TimeZoneResolver, TimezoneError};

/// A classified temporal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateValue {
    /// All-day date (VALUE=DATE or bare YYYYMMDD).
    DateOnly(NaiveDate),
    /// Local time with no zone information.
    Floating(NaiveDateTime),
    /// Absolute instant (trailing `Z`).
    Utc(DateTime<Utc>),
    /// Wall-clock time in a named zone.
    Zoned {
        local: NaiveDateTime,
        tzid: String,
    },
}

impl DateValue {
    /// Classifies a DTSTART/DTEND property value.
    ///
    /// Priority: an explicit `VALUE=DATE` parameter or a bare 8-digit value
    /// is all-day; a trailing `Z` is UTC; a `TZID` parameter is zoned;
    /// anything else is floating.
    ///
    /// ## Errors
    /// Returns an error when the value does not parse as a date or
    /// date-time.
    pub fn classify(property: &Property) -> Result<Self, MalformedPropertyError> {
        let value = property.value.as_str();
        let is_date = property.value_type() == Some("DATE")
            || (value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()));

        if is_date {
            let date = parse_date(value, 0, 0).map_err(|e| {
                MalformedPropertyError::new(&property.name, format!("{}: {value:?}", e.kind))
            })?;
            return Ok(Self::DateOnly(date));
        }

        let (naive, is_utc) = parse_datetime(value, 0, 0).map_err(|e| {
            MalformedPropertyError::new(&property.name, format!("{}: {value:?}", e.kind))
        })?;

        if is_utc {
            return Ok(Self::Utc(Utc.from_utc_datetime(&naive)));
        }

        if let Some(tzid) = property.tzid() {
            return Ok(Self::Zoned {
                local: naive,
                tzid: tzid.to_string(),
            });
        }

        Ok(Self::Floating(naive))
    }

    /// Normalizes this value into the output timezone.
    ///
    /// All-day dates pass through unchanged. UTC instants and zoned times
    /// are converted to the output zone's wall clock; floating times are
    /// interpreted as output-zone civil time, so their wall clock is kept.
    /// A zoned time whose zone already equals the output zone keeps its
    /// wall clock without a UTC round trip.
    ///
    /// ## Errors
    /// Returns an error when a source TZID cannot be resolved.
    pub fn normalize(
        self,
        output_tzid: &str,
        output_tz: Tz,
        resolver: &mut TimeZoneResolver,
    ) -> Result<Self, TimezoneError> {
        match self {
            Self::DateOnly(date) => Ok(Self::DateOnly(date)),
            Self::Floating(local) => Ok(Self::Zoned {
                local,
                tzid: output_tzid.to_string(),
            }),
            Self::Utc(instant) => Ok(Self::Zoned {
                local: instant.with_timezone(&output_tz).naive_local(),
                tzid: output_tzid.to_string(),
            }),
            Self::Zoned { local, tzid } => {
                let tz = resolver.resolve(&tzid)?;
                if tz == output_tz {
                    return Ok(Self::Zoned {
                        local,
                        tzid: output_tzid.to_string(),
                    });
                }
                let utc = convert_to_utc(local, tz)?;
                Ok(Self::Zoned {
                    local: utc.with_timezone(&output_tz).naive_local(),
                    tzid: output_tzid.to_string(),
                })
            }
        }
    }

    /// Re-emits this value as a property.
    ///
    /// All-day values carry `VALUE=DATE`; zoned values carry `TZID`.
    /// Floating and UTC shapes do not survive normalization and serialize
    /// as bare local or UTC forms only for diagnostics.
    #[must_use]
    pub fn to_property(&self, name: &str) -> Property {
        match self {
            Self::DateOnly(date) => Property::with_params(
                name,
                vec![Parameter::value_type("DATE")],
                date.format("%Y%m%d").to_string(),
            ),
            Self::Floating(local) => {
                Property::new(name, local.format("%Y%m%dT%H%M%S").to_string())
            }
            Self::Utc(instant) => {
                Property::new(name, instant.format("%Y%m%dT%H%M%SZ").to_string())
            }
            Self::Zoned { local, tzid } => Property::with_params(
                name,
                vec![Parameter::tzid(tzid)],
                local.format("%Y%m%dT%H%M%S").to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ical::parse::parse_content_line;
    use chrono::NaiveTime;

    fn classify_line(line: &str) -> DateValue {
        DateValue::classify(&parse_content_line(line, 1).expect("lexes")).expect("classifies")
    }

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDateTime::new(
            NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            NaiveTime::from_hms_opt(h, min, 0).unwrap(),
        )
    }

    #[test]
    fn classify_value_date_param() {
        let value = classify_line("DTSTART;VALUE=DATE:20250219");
        assert_eq!(
            value,
            DateValue::DateOnly(NaiveDate::from_ymd_opt(2025, 2, 19).unwrap())
        );
    }

    #[test]
    fn classify_bare_date() {
        let value = classify_line("DTSTART:20250219");
        assert_eq!(
            value,
            DateValue::DateOnly(NaiveDate::from_ymd_opt(2025, 2, 19).unwrap())
        );
    }

    #[test]
    fn classify_utc() {
        let value = classify_line("DTSTART:20250101T110000Z");
        assert_eq!(
            value,
            DateValue::Utc(Utc.with_ymd_and_hms(2025, 1, 1, 11, 0, 0).unwrap())
        );
    }

    #[test]
    fn classify_zoned() {
        let value = classify_line("DTSTART;TZID=Europe/Berlin:20250101T120000");
        assert_eq!(
            value,
            DateValue::Zoned {
                local: naive(2025, 1, 1, 12, 0),
                tzid: "Europe/Berlin".to_string(),
            }
        );
    }

    #[test]
    fn classify_floating() {
        let value = classify_line("DTSTART:20250101T120000");
        assert_eq!(value, DateValue::Floating(naive(2025, 1, 1, 12, 0)));
    }

    #[test]
    fn classify_date_param_wins_over_tzid() {
        let value = classify_line("DTSTART;TZID=Europe/Berlin;VALUE=DATE:20250219");
        assert!(matches!(value, DateValue::DateOnly(_)));
    }

    #[test]
    fn classify_rejects_garbage() {
        let prop = parse_content_line("DTSTART:not-a-date", 1).unwrap();
        assert!(DateValue::classify(&prop).is_err());
    }

    #[test]
    fn normalize_date_only_unchanged() {
        let mut resolver = TimeZoneResolver::new();
        let value = DateValue::DateOnly(NaiveDate::from_ymd_opt(2025, 2, 19).unwrap());
        let out = value
            .clone()
            .normalize("Europe/Berlin", Tz::Europe__Berlin, &mut resolver)
            .unwrap();
        assert_eq!(out, value);
    }

    #[test]
    fn normalize_utc_to_berlin() {
        let mut resolver = TimeZoneResolver::new();
        let value = DateValue::Utc(Utc.with_ymd_and_hms(2025, 1, 1, 11, 0, 0).unwrap());
        let out = value
            .normalize("Europe/Berlin", Tz::Europe__Berlin, &mut resolver)
            .unwrap();
        // CET is UTC+1 in January.
        assert_eq!(
            out,
            DateValue::Zoned {
                local: naive(2025, 1, 1, 12, 0),
                tzid: "Europe/Berlin".to_string(),
            }
        );
    }

    #[test]
    fn normalize_floating_keeps_wall_clock() {
        let mut resolver = TimeZoneResolver::new();
        let value = DateValue::Floating(naive(2025, 1, 1, 12, 0));
        let out = value
            .normalize("Europe/Berlin", Tz::Europe__Berlin, &mut resolver)
            .unwrap();
        assert_eq!(
            out,
            DateValue::Zoned {
                local: naive(2025, 1, 1, 12, 0),
                tzid: "Europe/Berlin".to_string(),
            }
        );
    }

    #[test]
    fn normalize_same_zone_keeps_wall_clock() {
        let mut resolver = TimeZoneResolver::new();
        let value = DateValue::Zoned {
            local: naive(2025, 1, 1, 12, 0),
            tzid: "Europe/Berlin".to_string(),
        };
        let out = value
            .normalize("Europe/Berlin", Tz::Europe__Berlin, &mut resolver)
            .unwrap();
        assert_eq!(
            out,
            DateValue::Zoned {
                local: naive(2025, 1, 1, 12, 0),
                tzid: "Europe/Berlin".to_string(),
            }
        );
    }

    #[test]
    fn normalize_cross_zone_converts() {
        let mut resolver = TimeZoneResolver::new();
        let value = DateValue::Zoned {
            local: naive(2025, 1, 1, 12, 0),
            tzid: "Europe/Berlin".to_string(),
        };
        let out = value
            .normalize("America/New_York", Tz::America__New_York, &mut resolver)
            .unwrap();
        // 12:00 CET = 11:00 UTC = 06:00 EST.
        assert_eq!(
            out,
            DateValue::Zoned {
                local: naive(2025, 1, 1, 6, 0),
                tzid: "America/New_York".to_string(),
            }
        );
    }

    #[test]
    fn normalize_alias_of_output_zone_keeps_wall_clock() {
        let mut resolver = TimeZoneResolver::new();
        let value = DateValue::Zoned {
            local: naive(2025, 7, 1, 9, 30),
            tzid: "W. Europe Standard Time".to_string(),
        };
        let out = value
            .normalize("Europe/Berlin", Tz::Europe__Berlin, &mut resolver)
            .unwrap();
        assert_eq!(
            out,
            DateValue::Zoned {
                local: naive(2025, 7, 1, 9, 30),
                tzid: "Europe/Berlin".to_string(),
            }
        );
    }

    #[test]
    fn normalize_unknown_zone_fails() {
        let mut resolver = TimeZoneResolver::new();
        let value = DateValue::Zoned {
            local: naive(2025, 1, 1, 12, 0),
            tzid: "Nowhere/Atlantis".to_string(),
        };
        let err = value
            .normalize("Europe/Berlin", Tz::Europe__Berlin, &mut resolver)
            .unwrap_err();
        assert!(matches!(err, TimezoneError::UnknownTimezone(_)));
    }

    #[test]
    fn to_property_all_day() {
        let value = DateValue::DateOnly(NaiveDate::from_ymd_opt(2025, 2, 19).unwrap());
        let prop = value.to_property("DTSTART");
        assert_eq!(prop.value, "20250219");
        assert_eq!(prop.value_type(), Some("DATE"));
    }

    #[test]
    fn to_property_zoned() {
        let value = DateValue::Zoned {
            local: naive(2025, 1, 1, 13, 0),
            tzid: "Europe/Berlin".to_string(),
        };
        let prop = value.to_property("DTEND");
        assert_eq!(prop.value, "20250101T130000");
        assert_eq!(prop.tzid(), Some("Europe/Berlin"));
    }
}
