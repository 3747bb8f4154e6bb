//! iCalendar property type (RFC 5545 §3.1, §3.8).

use super::Parameter;

/// A property as parsed from one (unfolded) content line.
///
/// The value is kept as the raw text after the first unescaped colon;
/// DTSTART/DTEND values are interpreted later by the classifier. Keeping the
/// raw string preserves round-trip fidelity for pass-through properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Property name (normalized to uppercase).
    pub name: String,
    /// Parameters in order of appearance.
    pub params: Vec<Parameter>,
    /// Raw value string (after unfolding, before unescaping).
    pub value: String,
}

impl Property {
    /// Creates a property with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    /// Creates a property with parameters.
    #[must_use]
    pub fn with_params(
        name: impl Into<String>,
        params: Vec<Parameter>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            params,
            value: value.into(),
        }
    }

    /// Returns the parameter with the given name.
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&Parameter> {
        let name_upper = name.to_ascii_uppercase();
        self.params.iter().find(|p| p.name == name_upper)
    }

    /// Returns the first value of a parameter.
    #[must_use]
    pub fn get_param_value(&self, name: &str) -> Option<&str> {
        let p = self.get_param(name)?;
        p.value()
    }

    /// Returns whether this property has a parameter with the given name.
    #[must_use]
    pub fn has_param(&self, name: &str) -> bool {
        self.get_param(name).is_some()
    }

    /// Returns the VALUE parameter if present.
    #[must_use]
    pub fn value_type(&self) -> Option<&str> {
        self.get_param_value("VALUE")
    }

    /// Returns the TZID parameter if present.
    #[must_use]
    pub fn tzid(&self) -> Option<&str> {
        self.get_param_value("TZID")
    }

    /// Sets a parameter, replacing any existing parameter with the same name.
    pub fn set_param(&mut self, param: Parameter) {
        self.params.retain(|p| p.name != param.name);
        self.params.push(param);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_get_param() {
        let prop = Property::with_params(
            "DTSTART",
            vec![Parameter::tzid("America/New_York")],
            "20260123T120000",
        );
        assert_eq!(prop.tzid(), Some("America/New_York"));
        assert!(prop.has_param("TZID"));
        assert!(!prop.has_param("VALUE"));
    }

    #[test]
    fn set_param_replaces() {
        let mut prop = Property::with_params(
            "DTSTART",
            vec![Parameter::tzid("America/New_York")],
            "20260123T120000",
        );
        prop.set_param(Parameter::tzid("Europe/Berlin"));
        assert_eq!(prop.params.len(), 1);
        assert_eq!(prop.tzid(), Some("Europe/Berlin"));
    }
}
