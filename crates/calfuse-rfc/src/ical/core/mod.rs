//! iCalendar core models (RFC 5545).
//!
//! These types represent iCalendar content between parsing and
//! serialization. They are designed for round-trip fidelity: unknown
//! properties and parameters are preserved verbatim.

mod component;
mod parameter;
mod property;

pub use component::{Component, ComponentKind, ICalendar};
pub use parameter::Parameter;
pub use property::Property;
