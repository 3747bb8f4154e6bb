//! RFC 5545 engine for calfuse.
//!
//! Parses iCalendar feeds, repairs malformed producer output, rewrites every
//! date/time property into a canonical form relative to one output timezone,
//! merges events across feeds, and serializes the result back to RFC 5545
//! text.

pub mod ical;
