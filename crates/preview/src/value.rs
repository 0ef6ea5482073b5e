//! value representation
//!
//! Every resolvable attribute is represented as a [Value]:
//! - `null`
//! - `unknown` (carries a best-effort [ValueType] for later coercion)
//! - boolean
//! - number (decimal, backed by [hcl::Number])
//! - string (utf-8)
//! - list (homogeneous, element type is tracked)
//! - tuple (heterogeneous sequence)
//! - object (order-preserving map, string keys)
//!
//! Values are immutable. Every operation returns a new value, none of them panic.
use indexmap::IndexMap;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serialize, Serializer,
};
use std::fmt;

/// Type tags for [Value]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ValueType {
    /// Any type, decided later
    #[default]
    Dynamic,
    Bool,
    Number,
    String,
    List(Box<ValueType>),
    Tuple(Vec<ValueType>),
    Object(IndexMap<String, ValueType>),
}

impl ValueType {
    pub fn list_of(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, ValueType::Bool | ValueType::Number | ValueType::String)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Dynamic => f.write_str("dynamic"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::Number => f.write_str("number"),
            ValueType::String => f.write_str("string"),
            ValueType::List(element) => write!(f, "list of {element}"),
            ValueType::Tuple(_) => f.write_str("tuple"),
            ValueType::Object(_) => f.write_str("object"),
        }
    }
}

/// All possible values
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Unknown(ValueType),
    Bool(bool),
    Number(hcl::Number),
    String(String),
    List(ValueType, Vec<Value>),
    Tuple(Vec<Value>),
    Object(IndexMap<String, Value>),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("cannot convert {from} to {to}")]
    Coercion { from: String, to: String },
    #[error("index {index} is out of range, at most {limit} elements are allowed")]
    IndexOutOfRange { index: usize, limit: usize },
}

impl Value {
    pub fn unknown() -> Self {
        Value::Unknown(ValueType::Dynamic)
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Shallow check, collection elements may still be unknown
    pub fn is_known(&self) -> bool {
        !matches!(self, Value::Unknown(_))
    }

    pub fn is_wholly_known(&self) -> bool {
        match self {
            Value::Unknown(_) => false,
            Value::List(_, elements) | Value::Tuple(elements) => {
                elements.iter().all(Value::is_wholly_known)
            }
            Value::Object(entries) => entries.values().all(Value::is_wholly_known),
            _ => true,
        }
    }

    pub fn type_of(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Dynamic,
            Value::Unknown(ty) => ty.clone(),
            Value::Bool(_) => ValueType::Bool,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::List(ty, _) => ValueType::list_of(ty.clone()),
            Value::Tuple(elements) => ValueType::Tuple(elements.iter().map(Value::type_of).collect()),
            Value::Object(entries) => ValueType::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.type_of()))
                    .collect(),
            ),
        }
    }

    /// Human readable name of the value's type, used in diagnostics
    pub fn friendly_type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Unknown(ty) => format!("unknown {ty}"),
            other => other.type_of().to_string(),
        }
    }

    /// Strict string access: only string values succeed
    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", other)),
        }
    }

    /// Renders a known, non-null primitive as text
    ///
    /// Succeeds for strings, numbers and booleans. Deciding whether a number or boolean may
    /// stand in for a string is left to the caller.
    pub fn as_string(&self) -> Result<String, ValueError> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(mismatch("string, number or bool", other)),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }

    /// Integer view of a number. Fractions are truncated.
    pub fn as_i64(&self) -> Result<i64, ValueError> {
        match self {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| mismatch("integer", self)),
            other => Err(mismatch("number", other)),
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(_, elements) | Value::Tuple(elements) => Some(elements),
            _ => None,
        }
    }

    /// Converts the value to the target type
    pub fn coerce(&self, target: &ValueType) -> Result<Value, ValueError> {
        let fail = || ValueError::Coercion {
            from: self.friendly_type_name(),
            to: target.to_string(),
        };

        match (self, target) {
            (_, ValueType::Dynamic) => Ok(self.clone()),
            (Value::Null, _) => Ok(Value::Null),
            (Value::Unknown(_), _) => Ok(Value::Unknown(target.clone())),

            (Value::Bool(_), ValueType::Bool)
            | (Value::Number(_), ValueType::Number)
            | (Value::String(_), ValueType::String) => Ok(self.clone()),

            (Value::Bool(_) | Value::Number(_), ValueType::String) => {
                Ok(Value::String(self.as_string()?))
            }
            (Value::String(s), ValueType::Number) => parse_number(s).ok_or_else(fail),
            (Value::String(s), ValueType::Bool) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },

            (Value::List(_, elements) | Value::Tuple(elements), ValueType::List(element)) => {
                let coerced = elements
                    .iter()
                    .map(|e| e.coerce(element))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(element.as_ref().clone(), coerced))
            }
            (Value::List(_, elements) | Value::Tuple(elements), ValueType::Tuple(types)) => {
                if elements.len() != types.len() {
                    return Err(fail());
                }
                let coerced = elements
                    .iter()
                    .zip(types)
                    .map(|(e, ty)| e.coerce(ty))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Tuple(coerced))
            }
            (Value::Object(entries), ValueType::Object(attributes)) => {
                let mut coerced = IndexMap::with_capacity(attributes.len());
                for (key, ty) in attributes {
                    let value = entries.get(key).cloned().unwrap_or_default();
                    coerced.insert(key.clone(), value.coerce(ty)?);
                }
                Ok(Value::Object(coerced))
            }

            _ => Err(fail()),
        }
    }

    /// Converts into an evaluator value
    ///
    /// Returns `None` for unknown values. Unknown object attributes are left out so a reference
    /// to them fails to resolve. Unknown sequence elements become `null` to keep indices stable.
    pub fn to_hcl(&self) -> Option<hcl::Value> {
        match self {
            Value::Unknown(_) => None,
            Value::Null => Some(hcl::Value::Null),
            Value::Bool(b) => Some(hcl::Value::Bool(*b)),
            Value::Number(n) => Some(hcl::Value::Number(n.clone())),
            Value::String(s) => Some(hcl::Value::String(s.clone())),
            Value::List(_, elements) | Value::Tuple(elements) => Some(hcl::Value::Array(
                elements
                    .iter()
                    .map(|e| e.to_hcl().unwrap_or(hcl::Value::Null))
                    .collect(),
            )),
            Value::Object(entries) => Some(hcl::Value::Object(
                entries
                    .iter()
                    .filter_map(|(k, v)| v.to_hcl().map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }
}

fn mismatch(expected: &str, found: &Value) -> ValueError {
    ValueError::TypeMismatch {
        expected: expected.to_string(),
        found: found.friendly_type_name(),
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(int) = s.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    s.parse::<f64>()
        .ok()
        .and_then(hcl::Number::from_f64)
        .map(Value::Number)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Unknown(_) => f.write_str("(known after apply)"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(_, elements) | Value::Tuple(elements) => {
                f.write_str("[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str("]")
            }
            Value::Object(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key} = {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(i64::from(value).into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number((value as u64).into())
    }
}

impl From<hcl::Number> for Value {
    fn from(value: hcl::Number) -> Self {
        Value::Number(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Tuple(value.into_iter().map(Into::into).collect())
    }
}

impl From<hcl::Value> for Value {
    fn from(value: hcl::Value) -> Value {
        match value {
            hcl::Value::Null => Value::Null,
            hcl::Value::Bool(b) => b.into(),
            hcl::Value::Number(n) => n.into(),
            hcl::Value::String(s) => s.into(),
            hcl::Value::Array(a) => a.into(),
            hcl::Value::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => b.into(),
            serde_json::Value::Number(n) => {
                if let Some(int) = n.as_i64() {
                    return int.into();
                }
                if let Some(uint) = n.as_u64() {
                    return Value::Number(uint.into());
                }
                n.as_f64()
                    .and_then(hcl::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
            serde_json::Value::String(s) => s.into(),
            serde_json::Value::Array(a) => a.into(),
            serde_json::Value::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null | Value::Unknown(_) => serializer.serialize_none(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Number(value) => value.serialize(serializer),
            Value::String(value) => serializer.serialize_str(value),
            Value::List(_, value) | Value::Tuple(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
        }
    }
}
