//! Recovery of malformed property parameter encodings.
//!
//! Some producers emit a property line whose parameter section carries an
//! empty value and then repeats the full `key=value:value` encoding, e.g.
//!
//! ```text
//! DTEND;TZID=Europe/Berlin:;TZID=Europe/Berlin:20250101T130000
//! ```
//!
//! After lexing, such a line surfaces as a property whose value starts with
//! `;`. The repair keeps the **last** occurrence of each parameter key and
//! takes the text after the **final** unescaped colon as the value. The
//! heuristic is narrow: every embedded key must duplicate a parameter already
//! present in the parameter section. Patterns that do not match this shape
//! fail closed with `MalformedPropertyError` rather than guessing.

use super::error::MalformedPropertyError;
use crate::ical::core::{Parameter, Property};

/// Outcome of the repair pass for one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    /// The (possibly rewritten) property.
    pub property: Property,
    /// Whether a malformed encoding was repaired.
    pub repaired: bool,
}

/// Repairs a property whose value re-encodes its parameter section.
///
/// Applied uniformly to every property, not only DTSTART/DTEND. Well-formed
/// properties pass through untouched.
///
/// ## Errors
/// Returns `MalformedPropertyError` when the embedded section is not
/// `key=value` shaped, when an embedded key does not duplicate a parameter
/// already seen, or when repair leaves multiple distinct non-empty values
/// for the same parameter key.
pub fn repair_property(mut property: Property) -> Result<Repaired, MalformedPropertyError> {
    if !needs_repair(&property.value) {
        return Ok(Repaired {
            property,
            repaired: false,
        });
    }

    let name = property.name.clone();
    let mut params = property.params;
    let mut value = property.value;

    // The pattern may nest (`:;TZID=X:;TZID=X:value`); peel one layer at a
    // time until the value no longer starts with a parameter section.
    while needs_repair(&value) {
        let rest = &value[1..];
        let colon = find_unescaped_colon(rest).ok_or_else(|| {
            MalformedPropertyError::new(&name, "parameter section in value has no terminating colon")
        })?;

        let embedded = &rest[..colon];
        for segment in embedded.split(';') {
            if segment.is_empty() {
                continue;
            }
            let Some((key, val)) = segment.split_once('=') else {
                return Err(MalformedPropertyError::new(
                    &name,
                    format!("value segment {segment:?} is not key=value shaped"),
                ));
            };
            merge_param(&mut params, &name, key, val)?;
        }

        value = rest[colon + 1..].to_string();
    }

    property.name = name;
    property.params = params;
    property.value = value;

    Ok(Repaired {
        property,
        repaired: true,
    })
}

/// A value that begins with `;` and still contains a colon is the residue of
/// a doubled parameter encoding.
fn needs_repair(value: &str) -> bool {
    value.starts_with(';') && find_unescaped_colon(value).is_some()
}

/// Keeps the last occurrence of a parameter key.
///
/// The embedded key must duplicate a parameter already present; an unseen
/// key means the value is not the known doubled-encoding shape and fails
/// closed. A duplicate with a distinct non-empty value is ambiguous and
/// also fails closed; an identical or empty duplicate is collapsed.
fn merge_param(
    params: &mut Vec<Parameter>,
    property: &str,
    key: &str,
    val: &str,
) -> Result<(), MalformedPropertyError> {
    let key_upper = key.to_ascii_uppercase();

    let Some(existing) = params.iter().position(|p| p.name == key_upper) else {
        return Err(MalformedPropertyError::new(
            property,
            format!("embedded parameter {key_upper} does not duplicate the parameter section"),
        ));
    };

    let previous = params[existing].value().unwrap_or_default().to_string();
    if !previous.is_empty() && !val.is_empty() && previous != val {
        return Err(MalformedPropertyError::new(
            property,
            format!("conflicting values for parameter {key_upper}: {previous:?} vs {val:?}"),
        ));
    }

    let kept = if val.is_empty() { previous } else { val.to_string() };
    params.remove(existing);
    params.push(Parameter::with_values(key_upper, vec![kept]));
    Ok(())
}

/// Returns the byte offset of the first colon not preceded by a backslash.
fn find_unescaped_colon(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b':' {
            return Some(i);
        }
    }
    None
}
