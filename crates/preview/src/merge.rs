//! merging values of repeated block instances
//!
//! A block declared with `count` or `for_each` resolves to many instances that share one
//! context path. Each instance contributes one element (by index) or one entry (by key) and
//! sibling instances must survive. The same instance may also be written more than once, by
//! the evaluator and again by a hook, so element writes merge instead of replacing.
use crate::value::{Value, ValueError};
use indexmap::IndexMap;

/// Most instances a repeated block may have, tuples never grow past this length
pub const MAX_INSTANCES: usize = 10_000;

/// Recursively merges object `b` into object `a`
///
/// Where both sides hold a non-empty object at the same key, the objects are merged. Otherwise
/// the right-hand value wins. A null or unknown `a` is treated as an empty object.
pub fn merge_objects(a: &Value, b: &Value) -> Result<Value, ValueError> {
    let mut output = match a {
        Value::Object(entries) => entries.clone(),
        Value::Null | Value::Unknown(_) => IndexMap::new(),
        other => {
            return Err(ValueError::TypeMismatch {
                expected: "object".to_string(),
                found: other.friendly_type_name(),
            })
        }
    };

    let Value::Object(incoming) = b else {
        return Err(ValueError::TypeMismatch {
            expected: "object".to_string(),
            found: b.friendly_type_name(),
        });
    };

    for (key, value) in incoming {
        let merged = match output.get(key) {
            Some(old) if is_non_empty_object(old) && is_non_empty_object(value) => {
                merge_objects(old, value)?
            }
            _ => value.clone(),
        };
        output.insert(key.clone(), merged);
    }

    Ok(Value::Object(output))
}

fn is_non_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(entries) if !entries.is_empty())
}

/// Returns a tuple with `value` at `index`
///
/// The result is padded with `null` up to `max(index + 1, len)`. A non-sequence input is
/// treated as an empty tuple. Indices of [MAX_INSTANCES] and above are rejected.
pub fn insert_or_grow_tuple(tuple: &Value, index: usize, value: Value) -> Result<Value, ValueError> {
    if index >= MAX_INSTANCES {
        return Err(ValueError::IndexOutOfRange {
            index,
            limit: MAX_INSTANCES,
        });
    }

    let mut elements = tuple.elements().map(<[Value]>::to_vec).unwrap_or_default();
    if elements.len() <= index {
        elements.resize(index + 1, Value::Null);
    }
    elements[index] = value;
    Ok(Value::Tuple(elements))
}

/// Like [insert_or_grow_tuple], but merges into an existing object element
pub fn merge_tuple_element(tuple: &Value, index: usize, value: Value) -> Result<Value, ValueError> {
    let existing = tuple
        .elements()
        .and_then(|elements| elements.get(index))
        .cloned()
        .unwrap_or_default();

    insert_or_grow_tuple(tuple, index, merge_or_replace(&existing, value))
}

/// Keyed counterpart of [merge_tuple_element], used for `for_each` instances
pub fn merge_object_entry(object: &Value, key: &str, value: Value) -> Value {
    let mut entries = object.as_object().cloned().unwrap_or_default();
    let existing = entries.get(key).cloned().unwrap_or_default();
    entries.insert(key.to_string(), merge_or_replace(&existing, value));
    Value::Object(entries)
}

fn merge_or_replace(existing: &Value, value: Value) -> Value {
    match (existing, &value) {
        (Value::Object(_), Value::Object(_)) => merge_objects(existing, &value).unwrap_or(value),
        _ => value,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn obj(entries: &[(&str, Value)]) -> Value {
        Value::object(entries.iter().cloned())
    }

    #[test]
    fn merge_is_recursive() {
        let a = obj(&[
            ("name", "a".into()),
            ("nested", obj(&[("x", 1.into()), ("y", 2.into())])),
        ]);
        let b = obj(&[("nested", obj(&[("y", 3.into())])), ("value", "v".into())]);

        let expected = obj(&[
            ("name", "a".into()),
            ("nested", obj(&[("x", 1.into()), ("y", 3.into())])),
            ("value", "v".into()),
        ]);
        assert_eq!(merge_objects(&a, &b), Ok(expected));
    }

    #[test]
    fn merge_empty_object_replaces() {
        let a = obj(&[("nested", obj(&[("x", 1.into())]))]);
        let b = obj(&[("nested", obj(&[]))]);
        assert_eq!(merge_objects(&a, &b), Ok(obj(&[("nested", obj(&[]))])));
    }

    #[test]
    fn merge_rejects_non_objects() {
        assert!(merge_objects(&Value::from("a"), &obj(&[])).is_err());
        assert!(merge_objects(&obj(&[]), &Value::from(1)).is_err());
        assert!(merge_objects(&Value::Null, &obj(&[])).is_ok());
    }

    #[test]
    fn grow_pads_with_null() {
        let tuple = Value::from(vec![Value::from("a")]);
        let grown = insert_or_grow_tuple(&tuple, 3, "d".into());
        assert_eq!(
            grown,
            Ok(Value::Tuple(vec![
                "a".into(),
                Value::Null,
                Value::Null,
                "d".into()
            ]))
        );
    }

    #[test]
    fn grow_replaces_in_bounds() {
        let tuple = Value::from(vec![Value::from("a"), Value::from("b")]);
        let replaced = insert_or_grow_tuple(&tuple, 0, "z".into());
        assert_eq!(
            replaced,
            Ok(Value::from(vec![Value::from("z"), Value::from("b")]))
        );
    }

    #[test]
    fn grow_treats_non_tuple_as_empty() {
        let grown = insert_or_grow_tuple(&Value::from("oops"), 1, 1.into());
        assert_eq!(grown, Ok(Value::Tuple(vec![Value::Null, 1.into()])));
    }

    #[test]
    fn grow_rejects_huge_indices() {
        let tuple = Value::from(vec![Value::from("a")]);
        for index in [MAX_INSTANCES, usize::MAX] {
            assert_eq!(
                insert_or_grow_tuple(&tuple, index, "b".into()),
                Err(ValueError::IndexOutOfRange {
                    index,
                    limit: MAX_INSTANCES
                })
            );
        }
        assert!(merge_tuple_element(&tuple, usize::MAX, obj(&[])).is_err());
    }

    #[test]
    fn merge_into_empty_tuple_round_trips() {
        let element = obj(&[("value", "us".into()), ("name", "region".into())]);
        let merged = merge_tuple_element(&Value::Tuple(vec![]), 0, element.clone())
            .expect("index in range");
        assert_eq!(merged.elements().and_then(|e| e.first()), Some(&element));
    }

    #[test]
    fn merge_element_keeps_siblings_and_fields() {
        let tuple = Value::from(vec![
            obj(&[("name", "a".into())]),
            obj(&[("name", "b".into())]),
        ]);
        let merged = merge_tuple_element(&tuple, 1, obj(&[("value", "vb".into())]));
        assert_eq!(
            merged,
            Ok(Value::from(vec![
                obj(&[("name", "a".into())]),
                obj(&[("name", "b".into()), ("value", "vb".into())]),
            ]))
        );
    }

    #[test]
    fn merge_entry_by_key() {
        let object = obj(&[("eu", obj(&[("name", "eu".into())]))]);
        let merged = merge_object_entry(&object, "eu", obj(&[("value", "x".into())]));
        let merged = merge_object_entry(&merged, "us", obj(&[("value", "y".into())]));
        assert_eq!(
            merged,
            obj(&[
                ("eu", obj(&[("name", "eu".into()), ("value", "x".into())])),
                ("us", obj(&[("value", "y".into())])),
            ])
        );
    }
}
