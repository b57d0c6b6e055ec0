//! Typed key/value property bags attached to scene entities.

use crate::error::StructuralError;
use serde::{Deserialize, Serialize};

/// A property value. JSON integers stay integers, other numbers become floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            PropertyValue::Int(i) => Some(*i as f32),
            PropertyValue::Float(f) => Some(*f as f32),
            PropertyValue::String(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Zero, empty, `"0"` and `"false"` are false; anything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            PropertyValue::Int(i) => *i != 0,
            PropertyValue::Float(f) => *f != 0.0,
            PropertyValue::String(s) => {
                let s = s.trim();
                !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
            }
        }
    }
}

/// One named property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

/// An ordered property list. Lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(pub Vec<Property>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.0.push(Property {
            name: name.into(),
            value,
        });
        self
    }

    pub fn with_str(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(name, PropertyValue::String(value.into()))
    }

    pub fn with_f32(self, name: impl Into<String>, value: f32) -> Self {
        self.with(name, PropertyValue::Float(value as f64))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// A flag is set when present and truthy.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| v.is_truthy())
    }

    /// A numeric property; a value that is not a number is an error.
    pub fn number(&self, name: &str) -> Result<Option<f32>, StructuralError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value.as_f32().map(Some).ok_or_else(|| StructuralError::PropertyType {
                name: name.to_string(),
                expected: "a number",
            }),
        }
    }

    /// A string property; numbers are rejected.
    pub fn string(&self, name: &str) -> Result<Option<&str>, StructuralError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value.as_str().map(Some).ok_or_else(|| StructuralError::PropertyType {
                name: name.to_string(),
                expected: "a string",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_values() {
        let props: Properties = serde_json::from_str(
            r#"[{"name":"a","value":1},{"name":"b","value":0.5},{"name":"c","value":"x"}]"#,
        )
        .unwrap();
        assert_eq!(props.get("a"), Some(&PropertyValue::Int(1)));
        assert_eq!(props.get("b"), Some(&PropertyValue::Float(0.5)));
        assert_eq!(props.string("c").unwrap(), Some("x"));
    }

    #[test]
    fn test_type_mismatch() {
        let props = Properties::new().with("path", PropertyValue::Int(3));
        assert!(matches!(
            props.string("path"),
            Err(StructuralError::PropertyType { .. })
        ));
        let props = Properties::new().with_str("v", "abc");
        assert!(props.number("v").is_err());
    }

    #[test]
    fn test_flags() {
        let props = Properties::new()
            .with("on", PropertyValue::Int(1))
            .with_str("off", "false");
        assert!(props.flag("on"));
        assert!(!props.flag("off"));
        assert!(!props.flag("missing"));
    }
}
