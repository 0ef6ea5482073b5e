use super::{
    nullable_bool, nullable_integer, nullable_string, optional_bool, optional_integer,
    optional_string, required, required_string,
};
use crate::context::{ContextTree, PathSegment};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::evaluator::Block;
use crate::parameter::{
    sort_parameters, FormType, Parameter, ParameterOption, ParameterType, ParameterValidation,
    BLOCK_TYPE_PARAMETER,
};
use crate::value::{Value, ValueType};
use crate::valued::Valued;
use indexmap::IndexMap;
use std::str::FromStr;

const VALUE_SOURCE_REQUIRED: &str =
    "The value of a parameter is required to be sourced (default or input) for the parameter to function.";

/// Parameters of all `coder_parameter` blocks, sorted by `(order, name)`
///
/// Blocks that cannot become a parameter contribute their diagnostics. Parameters sharing a
/// name are all kept and reported as duplicates.
#[tracing::instrument(level = "debug", skip_all)]
pub fn parameters(blocks: &[Block], ctx: &ContextTree) -> (Vec<Parameter>, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let mut parameters = vec![];
    let mut by_name: IndexMap<String, Vec<String>> = IndexMap::new();

    for block in blocks
        .iter()
        .filter(|block| block.is_data(BLOCK_TYPE_PARAMETER))
    {
        match parameter_from_block(block, ctx) {
            Ok(parameter) => {
                by_name.entry(parameter.name.clone()).or_default().push(format!(
                    "block {:?} at {}",
                    format!("data.{}.{}", block.type_label(), block.name_label()),
                    block.decl.type_range
                ));
                parameters.push(parameter);
            }
            Err(errors) => diagnostics.extend(errors),
        }
    }

    for (name, sources) in by_name {
        if sources.len() > 1 {
            diagnostics.push(
                Diagnostic::error(format!(
                    "Found {} duplicate parameters with name {name:?}, this is not allowed",
                    sources.len()
                ))
                .with_detail(sources.join("\n")),
            );
        }
    }

    sort_parameters(&mut parameters);
    (parameters, diagnostics)
}

/// Builds the parameter declared by `block`
///
/// Fails only if the block has no usable `name`. Every other problem is recorded in the
/// parameter's diagnostics and makes it unusable.
pub fn parameter_from_block(block: &Block, ctx: &ContextTree) -> Result<Parameter, Diagnostics> {
    let missing = required(block, &["name"]);
    if missing.has_errors() {
        return Err(missing);
    }
    let name = required_string(block, "name").map_err(Diagnostics::from)?;

    let mut diagnostics = Diagnostics::new();
    let mut parameter = Parameter::new(name);
    parameter.source = Some(block.range().clone());

    match enum_attribute::<ParameterType>(block, "type") {
        Ok(ty) => parameter.ty = ty.unwrap_or_default(),
        Err(diagnostic) => {
            diagnostics.push(diagnostic);
            parameter.form_type = FormType::Error;
        }
    }
    let requested_form_type = match enum_attribute::<FormType>(block, "form_type") {
        Ok(form_type) => form_type.unwrap_or_default(),
        Err(diagnostic) => {
            diagnostics.push(diagnostic);
            FormType::Error
        }
    };

    parameter.description = optional_string(block, "description");
    parameter.display_name = optional_string(block, "display_name");
    parameter.icon = optional_string(block, "icon");
    parameter.mutable = optional_bool(block, "mutable");
    parameter.required = optional_bool(block, "required");
    parameter.ephemeral = optional_bool(block, "ephemeral");
    parameter.order = optional_integer(block, "order");
    if block.attribute("default").is_some() {
        parameter.default_value = block.valued("default");
    }
    if let Some(metadata) = nullable_string(block, "form_type_metadata").filter(|m| !m.is_empty())
    {
        match serde_json::from_str(&metadata) {
            Ok(metadata) => parameter.form_type_metadata = metadata,
            Err(err) => diagnostics.push(
                Diagnostic::warning("Invalid \"form_type_metadata\" attribute")
                    .with_detail(format!("Expected a JSON document: {err}"))
                    .with_subject(block.attribute("form_type_metadata").map(|a| a.range.clone())),
            ),
        }
    }

    let option_blocks: Vec<&Block> = block.nested("option").collect();
    if parameter.form_type != FormType::Error && requested_form_type != FormType::Error {
        match requested_form_type.resolve(parameter.ty, option_blocks.len()) {
            Ok(form_type) => parameter.form_type = form_type,
            Err(err) => {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Invalid parameter `type={:?}` and `form_type={:?}`",
                        parameter.ty.as_str(),
                        requested_form_type.as_str()
                    ))
                    .with_detail(err)
                    .with_subject(block.decl.type_range.clone()),
                );
                parameter.form_type = FormType::Error;
            }
        }
    } else {
        parameter.form_type = FormType::Error;
    }

    for option in option_blocks {
        match option_from_block(option) {
            Ok(option) => parameter.options.push(option),
            Err(errors) => diagnostics.extend(errors),
        }
    }

    let validation_blocks: Vec<&Block> = block.nested("validation").collect();
    if validation_blocks.len() > 1 {
        diagnostics.push(
            Diagnostic::error("Multiple 'validation' blocks found")
                .with_detail("Only one validation block is allowed")
                .with_subject(validation_blocks[1].decl.type_range.clone()),
        );
    }
    for validation in validation_blocks.into_iter().take(1) {
        match validation_from_block(validation) {
            Ok(validation) => parameter.validations.push(validation),
            Err(errors) => diagnostics.extend(errors),
        }
    }

    parameter.value = parameter_value(block, ctx);

    if let Some(text) = validation_text(&parameter.value.value) {
        for validation in &parameter.validations {
            if let Err(err) = validation.validate(parameter.ty, &text) {
                diagnostics.push(
                    Diagnostic::error(format!("Parameter validation failed for value {text:?}"))
                        .with_detail(err)
                        .with_subject(block.range().clone()),
                );
            }
        }
    }

    let usage = parameter_usage_diagnostics(&parameter);
    if usage.has_errors() {
        parameter.form_type = FormType::Error;
    }
    diagnostics.extend(usage);

    parameter.diagnostics = diagnostics;
    Ok(parameter)
}

/// Problems that make the parameter's value or options unusable
pub fn parameter_usage_diagnostics(parameter: &Parameter) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    let value = &parameter.value;

    if !value.is_valid() {
        diagnostics.push(
            Diagnostic::error("Parameter value is not valid").with_detail(VALUE_SOURCE_REQUIRED),
        );
    } else if !value.is_known() {
        diagnostics.push(
            Diagnostic::error(
                "Parameter value is unknown, it likely includes a reference without a value",
            )
            .with_detail(VALUE_SOURCE_REQUIRED),
        );
    } else if !has_type(&value.value, parameter.ty) {
        diagnostics.push(
            Diagnostic::error("Parameter value has the wrong type").with_detail(format!(
                "Expected a value of type {}, got {} {:?}.",
                parameter.ty,
                value.value.friendly_type_name(),
                value.as_string()
            )),
        );
    }

    let invalid_options = parameter
        .options
        .iter()
        .filter(|option| !option.value.is_known())
        .count();
    if invalid_options > 0 {
        diagnostics.push(
            Diagnostic::error(format!(
                "Parameter contains {invalid_options} invalid options"
            ))
            .with_detail(
                "The set of options cannot be resolved, and use of the parameter is limited.",
            ),
        );
    }

    diagnostics
}

/// Reads an optional enum attribute, empty strings count as absent
fn enum_attribute<T>(block: &Block, key: &str) -> Result<Option<T>, Diagnostic>
where
    T: FromStr<Err = String>,
{
    let text = optional_string(block, key);
    if text.is_empty() {
        return Ok(None);
    }

    text.parse().map(Some).map_err(|err| {
        Diagnostic::error(format!("Invalid {key:?} attribute"))
            .with_detail(err)
            .with_subject(block.attribute(key).map(|attr| attr.range.clone()))
            .with_eval_context(block.context)
    })
}

fn option_from_block(block: &Block) -> Result<ParameterOption, Diagnostics> {
    let missing = required(block, &["name", "value"]);
    if missing.has_errors() {
        return Err(missing);
    }
    let name = required_string(block, "name").map_err(Diagnostics::from)?;

    Ok(ParameterOption {
        name,
        description: optional_string(block, "description"),
        value: block.valued("value"),
        icon: optional_string(block, "icon"),
    })
}

fn validation_from_block(block: &Block) -> Result<ParameterValidation, Diagnostics> {
    let missing = required(block, &["error"]);
    if missing.has_errors() {
        return Err(missing);
    }
    let error = required_string(block, "error").map_err(Diagnostics::from)?;

    Ok(ParameterValidation {
        regex: nullable_string(block, "regex"),
        error,
        min: nullable_integer(block, "min"),
        max: nullable_integer(block, "max"),
        monotonic: nullable_string(block, "monotonic"),
        invalid: nullable_bool(block, "invalid"),
    })
}

/// Looks up `data.coder_parameter.<name>[instance].value` in the block's module
fn parameter_value(block: &Block, ctx: &ContextTree) -> Valued {
    let mut path: Vec<PathSegment> = block.reference_path();
    let mut source = format!("data.{}.{}", block.type_label(), block.name_label());
    if let Some(instance) = &block.instance {
        path.push(instance.segment());
        source.push_str(&instance.to_string());
    }
    path.push("value".into());
    source.push_str(".value");

    let value = ctx
        .lookup(block.module_context, &path)
        .unwrap_or(Value::Unknown(ValueType::String));
    Valued::new(value).with_source(source)
}

/// Text validations run against, only for known primitive values
fn validation_text(value: &Value) -> Option<String> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => value.as_string().ok(),
        _ => None,
    }
}

fn has_type(value: &Value, ty: ParameterType) -> bool {
    match (ty, value) {
        (ParameterType::ListString, Value::String(text)) => {
            serde_json::from_str::<Vec<String>>(text).is_ok()
        }
        (ParameterType::ListString, _) => false,
        (ty, value) => value.coerce(&ty.value_type()).is_ok(),
    }
}
