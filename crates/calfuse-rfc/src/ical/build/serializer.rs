//! iCalendar serializer (RFC 5545).
//!
//! Serializes the component tree to compliant text. Properties and child
//! components are emitted in insertion order; the builder is responsible
//! for putting them there in a sensible order. Property values are raw
//! (already escaped) strings, so they are emitted verbatim.

use super::escape::escape_param_value;
use super::fold::fold_line;
use crate::ical::core::{Component, ICalendar, Parameter, Property};

/// Serializes an iCalendar document to a string with CRLF line endings.
#[must_use]
pub fn serialize(ical: &ICalendar) -> String {
    serialize_component(&ical.root)
}

/// Serializes a component, including its BEGIN/END envelope.
#[must_use]
pub fn serialize_component(component: &Component) -> String {
    let mut result = String::new();

    result.push_str(&fold_line(&format!("BEGIN:{}", component.name)));
    result.push_str("\r\n");

    for prop in &component.properties {
        result.push_str(&serialize_property(prop));
        result.push_str("\r\n");
    }

    for child in &component.children {
        result.push_str(&serialize_component(child));
    }

    result.push_str(&fold_line(&format!("END:{}", component.name)));
    result.push_str("\r\n");

    result
}

/// Serializes a single property to a folded content line (no trailing CRLF).
#[must_use]
pub fn serialize_property(prop: &Property) -> String {
    let mut line = prop.name.clone();

    for param in &prop.params {
        line.push(';');
        line.push_str(&serialize_parameter(param));
    }

    line.push(':');
    line.push_str(&prop.value);

    fold_line(&line)
}

fn serialize_parameter(param: &Parameter) -> String {
    let mut result = param.name.clone();
    result.push('=');

    let values: Vec<String> = param.values.iter().map(|v| escape_param_value(v)).collect();
    result.push_str(&values.join(","));

    result
}
