//! Content line lexer for iCalendar (RFC 5545 §3.1).
//!
//! Handles line unfolding and tokenization of content lines.

use super::error::{ParseError, ParseErrorKind, ParseResult};
use crate::ical::core::{Parameter, Property};

/// Splits input into logical content lines, merging folded continuations.
///
/// Handles both CRLF and bare LF line endings. Lines starting with SP/HTAB
/// are continuations of the previous line; per RFC 5545 §3.1 unfolding
/// removes the line break and the single whitespace character (no space is
/// inserted). Returns each logical line with the 1-based row it started on.
#[must_use]
pub fn split_lines(input: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();

    for (i, raw_line) in input.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        if line.starts_with([' ', '\t']) {
            // Fold: drop the single leading whitespace character.
            let continuation = &line[1..];
            if let Some((_, prev)) = lines.last_mut() {
                prev.push_str(continuation);
            } else {
                lines.push((i + 1, continuation.to_string()));
            }
        } else {
            lines.push((i + 1, line.to_string()));
        }
    }

    lines
}

/// Parses a single content line.
///
/// Format: `name *(";" param) ":" value`
///
/// ## Errors
/// Returns an error if the line has no colon, an invalid name, or a
/// malformed parameter section.
pub fn parse_content_line(line: &str, line_num: usize) -> ParseResult<Property> {
    let mut chars = line.char_indices().peekable();
    let mut name_end = 0;
    let mut colon_pos = None;

    // Find the property name (ends at ';' or ':')
    while let Some(&(i, c)) = chars.peek() {
        if c == ';' || c == ':' {
            name_end = i;
            if c == ':' {
                colon_pos = Some(i);
            }
            break;
        }
        if !c.is_ascii_alphanumeric() && c != '-' {
            return Err(ParseError::new(
                ParseErrorKind::InvalidPropertyName,
                line_num,
                i + 1,
            )
            .with_context(line));
        }
        chars.next();
    }

    if name_end == 0 {
        return Err(
            ParseError::new(ParseErrorKind::MissingPropertyName, line_num, 1).with_context(line),
        );
    }

    let name = line[..name_end].to_ascii_uppercase();

    // Parse parameters if we stopped at ';'
    let mut params = Vec::new();
    if colon_pos.is_none() {
        chars.next(); // consume the ';'
        loop {
            let (param, next_is_colon) = parse_parameter(&mut chars, line, line_num)?;
            params.push(param);
            if next_is_colon {
                // The colon was just consumed; when it is the last character
                // on the line the value is simply empty.
                colon_pos = Some(chars.peek().map_or(line.len() - 1, |&(i, _)| i - 1));
                break;
            }
        }
    }

    let colon_pos = colon_pos.ok_or_else(|| {
        ParseError::new(ParseErrorKind::MissingColon, line_num, line.len()).with_context(line)
    })?;

    // Value is everything after the first unescaped colon.
    let value = &line[colon_pos + 1..];

    Ok(Property {
        name,
        params,
        value: value.to_string(),
    })
}

/// Parses a single parameter from the character stream.
///
/// Returns the parameter and whether the next character is ':'.
fn parse_parameter(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    line: &str,
    line_num: usize,
) -> ParseResult<(Parameter, bool)> {
    let start = chars.peek().map_or(line.len(), |&(i, _)| i);

    // Parameter name, up to '='
    let mut name_end = start;
    while let Some(&(i, c)) = chars.peek() {
        if c == '=' {
            name_end = i;
            chars.next(); // consume '='
            break;
        }
        if !c.is_ascii_alphanumeric() && c != '-' {
            return Err(ParseError::new(ParseErrorKind::InvalidParameter, line_num, i + 1)
                .with_context(format!("unexpected character '{c}' in parameter name")));
        }
        chars.next();
    }

    if name_end == start {
        return Err(ParseError::new(
            ParseErrorKind::InvalidParameter,
            line_num,
            start + 1,
        ));
    }

    let param_name = line[start..name_end].to_ascii_uppercase();

    // Parameter values: comma-separated, possibly quoted
    let mut values = Vec::new();
    loop {
        let value = parse_param_value(chars, line, line_num)?;
        values.push(value);

        match chars.peek() {
            Some(&(_, ',')) => {
                chars.next();
            }
            Some(&(_, ';')) => {
                chars.next();
                return Ok((Parameter::with_values(param_name, values), false));
            }
            Some(&(_, ':')) => {
                chars.next();
                return Ok((Parameter::with_values(param_name, values), true));
            }
            Some(&(i, c)) => {
                return Err(
                    ParseError::new(ParseErrorKind::InvalidParameter, line_num, i + 1)
                        .with_context(format!("unexpected character '{c}'")),
                );
            }
            None => {
                return Err(ParseError::new(
                    ParseErrorKind::MissingColon,
                    line_num,
                    line.len(),
                ));
            }
        }
    }
}

/// Parses a parameter value (possibly quoted).
fn parse_param_value(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    line: &str,
    line_num: usize,
) -> ParseResult<String> {
    let Some(&(start, first)) = chars.peek() else {
        return Err(ParseError::new(
            ParseErrorKind::InvalidParameter,
            line_num,
            line.len(),
        ));
    };

    if first == '"' {
        chars.next(); // consume opening quote
        let mut value = String::new();
        let mut closed = false;

        for (_i, c) in chars.by_ref() {
            if c == '"' {
                closed = true;
                break;
            }
            value.push(c);
        }

        if !closed {
            return Err(ParseError::new(
                ParseErrorKind::UnclosedQuote,
                line_num,
                start + 1,
            ));
        }

        Ok(value)
    } else {
        // Unquoted value ends at ',' ';' or ':'
        let mut end = start;
        while let Some(&(i, c)) = chars.peek() {
            if c == ',' || c == ';' || c == ':' {
                break;
            }
            end = i + c.len_utf8();
            chars.next();
        }
        Ok(line[start..end].to_string())
    }
}
