//! iCalendar (RFC 5545) parsing, normalization, merging, and serialization.

pub mod build;
pub mod core;
pub mod merge;
pub mod normalize;
pub mod parse;
pub mod timezone;
