//! The calfuse binary: fetches configured iCalendar feeds, merges them
//! through the RFC 5545 engine, and writes one normalized output file.

pub mod fetch;
pub mod sync;
