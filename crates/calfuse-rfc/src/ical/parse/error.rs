//! Parse error types for iCalendar content.

use thiserror::Error;

/// What went wrong while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Property name contains an invalid character.
    InvalidPropertyName,
    /// Content line starts with a delimiter instead of a name.
    MissingPropertyName,
    /// No colon separates the parameter section from the value.
    MissingColon,
    /// A parameter segment is not `key=value` shaped.
    InvalidParameter,
    /// A quoted parameter value is never closed.
    UnclosedQuote,
    /// Document does not start with BEGIN:VCALENDAR.
    MissingBegin,
    /// A component is never closed with END.
    MissingEnd,
    /// END name does not match the open component.
    MismatchedComponent,
    /// Not a valid YYYYMMDD date.
    InvalidDate,
    /// Not a valid HHMMSS time.
    InvalidTime,
    /// Not a valid date-time value.
    InvalidDateTime,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidPropertyName => "invalid property name",
            Self::MissingPropertyName => "missing property name",
            Self::MissingColon => "missing colon",
            Self::InvalidParameter => "invalid parameter",
            Self::UnclosedQuote => "unclosed quoted parameter value",
            Self::MissingBegin => "missing BEGIN",
            Self::MissingEnd => "missing END",
            Self::MismatchedComponent => "mismatched component",
            Self::InvalidDate => "invalid date",
            Self::InvalidTime => "invalid time",
            Self::InvalidDateTime => "invalid date-time",
        };
        f.write_str(s)
    }
}

/// An error at a specific position in the input.
///
/// Line and column are 1-based and refer to the unfolded logical line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at line {line}, column {col}{}", .context.as_deref().map_or_else(String::new, |c| format!(": {c}")))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
    pub col: usize,
    pub context: Option<String>,
}

impl ParseError {
    /// Creates a new parse error.
    #[must_use]
    pub fn new(kind: ParseErrorKind, line: usize, col: usize) -> Self {
        Self {
            kind,
            line,
            col,
            context: None,
        }
    }

    /// Attaches human-readable context, usually the offending text.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// A property whose malformed parameter encoding could not be repaired.
///
/// This is event-scoped: the owning event is dropped, the rest of the
/// source calendar survives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrepairable property {name}: {detail}")]
pub struct MalformedPropertyError {
    /// Name of the offending property.
    pub name: String,
    /// What made the value ambiguous.
    pub detail: String,
}

impl MalformedPropertyError {
    #[must_use]
    pub fn new(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: detail.into(),
        }
    }
}
