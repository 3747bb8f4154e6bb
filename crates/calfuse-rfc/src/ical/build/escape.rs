//! Parameter value escaping for serialization.

/// Escapes a parameter value if needed.
///
/// Returns the value quoted if it contains special characters.
#[must_use]
pub fn escape_param_value(s: &str) -> String {
    if needs_quoting(s) {
        // Use caret encoding for special chars inside quotes (RFC 6868)
        let mut result = String::with_capacity(s.len() + 10);
        result.push('"');
        for c in s.chars() {
            match c {
                '^' => result.push_str("^^"),
                '\n' => result.push_str("^n"),
                '"' => result.push_str("^'"),
                _ => result.push(c),
            }
        }
        result.push('"');
        result
    } else {
        s.to_string()
    }
}

/// Checks if a parameter value needs quoting.
fn needs_quoting(s: &str) -> bool {
    s.chars().any(|c| matches!(c, ':' | ';' | ',' | '"' | '\n'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_value_unquoted() {
        assert_eq!(escape_param_value("Europe/Berlin"), "Europe/Berlin");
    }

    #[test]
    fn special_chars_quoted() {
        assert_eq!(escape_param_value("Doe, Jane"), "\"Doe, Jane\"");
        assert_eq!(escape_param_value("Has;semi"), "\"Has;semi\"");
        assert_eq!(escape_param_value("Has:colon"), "\"Has:colon\"");
    }

    #[test]
    fn caret_encoding_inside_quotes() {
        assert_eq!(escape_param_value("Line1\nLine2"), "\"Line1^nLine2\"");
        assert_eq!(escape_param_value("Has\"quote"), "\"Has^'quote\"");
    }
}
