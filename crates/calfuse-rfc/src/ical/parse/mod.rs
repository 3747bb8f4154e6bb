//! iCalendar parsing (RFC 5545).
//!
//! - Lexer: line unfolding and content-line tokenization
//! - Repair: recovery of malformed parameter encodings
//! - Parser: full document parsing into a component tree

mod error;
mod lexer;
mod parser;
mod repair;
mod values;

pub use error::{MalformedPropertyError, ParseError, ParseErrorKind, ParseResult};
pub use lexer::{parse_content_line, split_lines};
pub use parser::{parse, ParseOutcome};
pub use repair::{repair_property, Repaired};
pub use values::{escape_text, parse_date, parse_datetime, unescape_text};
