//! structured output from evaluated blocks
//!
//! The readers in this module are strict about types: a `description = 1` is not an error, it
//! is simply not a description. Only attributes a block cannot do without produce diagnostics.
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::evaluator::Block;
use crate::util::reference_names;
use crate::value::Value;

mod parameter;
mod state;
mod tags;

pub use parameter::{parameter_from_block, parameter_usage_diagnostics, parameters};
pub use state::{parameters_from_state, StateError};
pub use tags::{tags_from_block, workspace_tags};

/// Error for every key that is absent or null
pub(crate) fn required(block: &Block, keys: &[&str]) -> Diagnostics {
    keys.iter()
        .filter(|key| block.value(key).map_or(true, Value::is_null))
        .map(|key| {
            Diagnostic::error(format!("Missing required attribute {key:?}"))
                .with_detail(format!("The {key} attribute is required"))
                .with_subject(block.range().clone())
        })
        .collect()
}

pub(crate) fn required_string(block: &Block, key: &str) -> Result<String, Diagnostic> {
    let value = block.value(key).cloned().unwrap_or_default();
    if let Value::String(value) = value {
        return Ok(value);
    }

    let type_name = match &value {
        Value::Null => "<nil>".to_string(),
        other => other.friendly_type_name(),
    };
    let mut diagnostic = Diagnostic::error(format!("Invalid {key:?} attribute"))
        .with_detail(format!("Expected a string, got {type_name:?}"))
        .with_eval_context(block.context);

    if let Some(attr) = block.attribute(key) {
        diagnostic = diagnostic.with_subject(attr.range.clone());
        if !value.is_wholly_known() {
            let references = reference_names(&attr.expr);
            if !references.is_empty() {
                diagnostic = diagnostic.with_detail(format!(
                    "Value is not known, check the references [{}] are resolvable",
                    references.join(", ")
                ));
            }
        }
    }

    Err(diagnostic)
}

pub(crate) fn optional_string(block: &Block, key: &str) -> String {
    nullable_string(block, key).unwrap_or_default()
}

pub(crate) fn nullable_string(block: &Block, key: &str) -> Option<String> {
    match block.value(key)? {
        Value::String(value) => Some(value.clone()),
        _ => None,
    }
}

pub(crate) fn optional_bool(block: &Block, key: &str) -> bool {
    nullable_bool(block, key).unwrap_or_default()
}

pub(crate) fn nullable_bool(block: &Block, key: &str) -> Option<bool> {
    match block.value(key)? {
        Value::Bool(value) => Some(*value),
        _ => None,
    }
}

pub(crate) fn optional_integer(block: &Block, key: &str) -> i64 {
    nullable_integer(block, key).unwrap_or_default()
}

pub(crate) fn nullable_integer(block: &Block, key: &str) -> Option<i64> {
    match block.value(key)? {
        value @ Value::Number(_) => value.as_i64().ok(),
        _ => None,
    }
}
