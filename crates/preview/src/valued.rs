//! values with provenance
use crate::diagnostics::Diagnostics;
use crate::value::{Value, ValueType};
use serde::{ser::SerializeStruct, Serialize, Serializer};

/// A resolved value together with what happened while resolving it
///
/// `source` is the literal text of the expression the value came from. It stands in for the
/// value when the value itself cannot be displayed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Valued<T = Value> {
    pub value: T,
    pub diagnostics: Diagnostics,
    pub source: Option<String>,
}

impl<T> Valued<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            diagnostics: Diagnostics::default(),
            source: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Valued<Value> {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::new(Value::String(value.into()))
    }

    /// No errors and a non-null primitive, possibly not yet known
    pub fn is_valid(&self) -> bool {
        if self.diagnostics.has_errors() || self.value.is_null() {
            return false;
        }
        matches!(
            self.value.type_of(),
            ValueType::String | ValueType::Number | ValueType::Bool
        )
    }

    pub fn is_known(&self) -> bool {
        self.is_valid() && self.value.is_wholly_known()
    }

    /// Always returns text: the value if it is usable, otherwise the source text or `??`
    pub fn as_string(&self) -> String {
        if self.is_known() {
            if let Ok(text) = self.value.as_string() {
                return text;
            }
        }

        self.source.clone().unwrap_or_else(|| "??".to_string())
    }
}

impl Serialize for Valued<Value> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut ser = serializer.serialize_struct("Valued", 2)?;
        ser.serialize_field("value", &self.as_string())?;
        ser.serialize_field("valid", &self.is_known())?;
        ser.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::diagnostics::Diagnostic;
    use pretty_assertions::assert_eq;

    #[test]
    fn known_primitives_render() {
        assert_eq!(Valued::new(Value::from(3)).as_string(), "3");
        assert_eq!(Valued::literal("us").as_string(), "us");
        assert!(Valued::new(Value::from(false)).is_known());
    }

    #[test]
    fn unknown_falls_back_to_source() {
        let valued = Valued::new(Value::Unknown(ValueType::String)).with_source("data.a.b");
        assert!(valued.is_valid());
        assert!(!valued.is_known());
        assert_eq!(valued.as_string(), "data.a.b");

        assert_eq!(Valued::new(Value::Null).as_string(), "??");
    }

    #[test]
    fn errors_invalidate() {
        let valued =
            Valued::literal("us").with_diagnostics(Diagnostic::error("broken").into());
        assert!(!valued.is_valid());
    }

    #[test]
    fn collections_are_not_valid() {
        let valued = Valued::new(Value::from(vec!["a"]));
        assert!(!valued.is_valid());
    }

    #[test]
    fn serializes_as_value_and_validity() {
        let json = serde_json::to_value(Valued::literal("eu")).expect("serializes");
        assert_eq!(json, serde_json::json!({"value": "eu", "valid": true}));

        let json = serde_json::to_value(Valued::new(Value::unknown())).expect("serializes");
        assert_eq!(json, serde_json::json!({"value": "??", "valid": false}));
    }
}
