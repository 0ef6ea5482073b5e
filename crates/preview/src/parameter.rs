//! workspace parameters
use crate::diagnostics::{Diagnostics, SourceRange};
use crate::value::ValueType;
use crate::valued::Valued;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Block type of parameter declarations (`data "coder_parameter" "name" {}`)
pub const BLOCK_TYPE_PARAMETER: &str = "coder_parameter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ParameterType {
    #[default]
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "list(string)")]
    ListString,
}

impl ParameterType {
    pub const ALL: [ParameterType; 4] = [
        ParameterType::String,
        ParameterType::Number,
        ParameterType::Bool,
        ParameterType::ListString,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Bool => "bool",
            ParameterType::ListString => "list(string)",
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            ParameterType::String => ValueType::String,
            ParameterType::Number => ValueType::Number,
            ParameterType::Bool => ValueType::Bool,
            ParameterType::ListString => ValueType::list_of(ValueType::String),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParameterType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "invalid parameter type {s:?}, expected one of [{}]",
                    join(ParameterType::ALL.iter().map(ParameterType::as_str))
                )
            })
    }
}

/// How a parameter is presented in a form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormType {
    /// not specified, resolved to the first allowed form type
    #[default]
    #[serde(rename = "")]
    Default,
    Radio,
    Slider,
    Input,
    Dropdown,
    Checkbox,
    Switch,
    MultiSelect,
    TagSelect,
    Textarea,
    /// the parameter cannot be rendered
    Error,
}

impl FormType {
    pub const ALL: [FormType; 11] = [
        FormType::Default,
        FormType::Radio,
        FormType::Slider,
        FormType::Input,
        FormType::Dropdown,
        FormType::Checkbox,
        FormType::Switch,
        FormType::MultiSelect,
        FormType::TagSelect,
        FormType::Textarea,
        FormType::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormType::Default => "",
            FormType::Radio => "radio",
            FormType::Slider => "slider",
            FormType::Input => "input",
            FormType::Dropdown => "dropdown",
            FormType::Checkbox => "checkbox",
            FormType::Switch => "switch",
            FormType::MultiSelect => "multi-select",
            FormType::TagSelect => "tag-select",
            FormType::Textarea => "textarea",
            FormType::Error => "error",
        }
    }

    /// Form types legal for `ty`, the first one is the default
    pub fn allowed(ty: ParameterType, has_options: bool) -> &'static [FormType] {
        use FormType::*;
        match (ty, has_options) {
            (ParameterType::String, true) => &[Radio, Dropdown],
            (ParameterType::String, false) => &[Input, Textarea],
            (ParameterType::Number, true) => &[Radio, Dropdown],
            (ParameterType::Number, false) => &[Input, Slider],
            (ParameterType::Bool, true) => &[Radio],
            (ParameterType::Bool, false) => &[Checkbox, Switch],
            (ParameterType::ListString, true) => &[MultiSelect],
            (ParameterType::ListString, false) => &[TagSelect],
        }
    }

    /// Checks the combination of type, option count and requested form type
    ///
    /// Returns the effective form type; [FormType::Default] becomes the first allowed one.
    pub fn resolve(self, ty: ParameterType, option_count: usize) -> Result<FormType, String> {
        let allowed = FormType::allowed(ty, option_count > 0);
        let Some(first) = allowed.first() else {
            return Err(format!("type {ty:?} does not support any form type"));
        };

        if self == FormType::Default {
            return Ok(*first);
        }

        if allowed.contains(&self) {
            return Ok(self);
        }

        let options = if option_count > 0 {
            "with options"
        } else {
            "without options"
        };
        Err(format!(
            "form_type {:?} is not supported for type {:?} {options}, expected one of [{}]",
            self.as_str(),
            ty.as_str(),
            join(allowed.iter().map(FormType::as_str))
        ))
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormType::ALL
            .into_iter()
            .find(|form_type| form_type.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "invalid form type {s:?}, expected one of [{}]",
                    join(FormType::ALL.iter().map(FormType::as_str))
                )
            })
    }
}

fn join<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterOption {
    pub name: String,
    pub description: String,
    pub value: Valued,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ParameterValidation {
    #[serde(rename = "validation_regex")]
    pub regex: Option<String>,
    #[serde(rename = "validation_error")]
    pub error: String,
    #[serde(rename = "validation_min")]
    pub min: Option<i64>,
    #[serde(rename = "validation_max")]
    pub max: Option<i64>,
    #[serde(rename = "validation_monotonic")]
    pub monotonic: Option<String>,
    #[serde(rename = "validation_invalid")]
    pub invalid: Option<bool>,
}

impl ParameterValidation {
    /// Checks `value` against the rule
    ///
    /// Monotonicity needs the previous value and is only checked for being a known keyword.
    pub fn validate(&self, ty: ParameterType, value: &str) -> Result<(), String> {
        if self.invalid == Some(true) {
            return Err(self
                .render_error(value)
                .unwrap_or_else(|| format!("value {value:?} is marked invalid")));
        }

        if ty != ParameterType::Number {
            if self.min.is_some() {
                return Err(format!("a min cannot be specified for a {ty} type"));
            }
            if self.max.is_some() {
                return Err(format!("a max cannot be specified for a {ty} type"));
            }
        }

        let regex = self.regex.as_deref().filter(|regex| !regex.is_empty());
        if ty != ParameterType::String && regex.is_some() {
            return Err(format!("a regex cannot be specified for a {ty} type"));
        }

        match ty {
            ParameterType::Bool => {
                if value != "true" && value != "false" {
                    return Err(r#"boolean value can be either "true" or "false""#.to_string());
                }
            }
            ParameterType::String => {
                let Some(pattern) = regex else {
                    return Ok(());
                };
                let regex = regex::Regex::new(pattern)
                    .map_err(|err| format!("compile regex {pattern:?}: {err}"))?;
                if self.error.is_empty() {
                    return Err("an error must be specified with a regex validation".to_string());
                }
                if !regex.is_match(value) {
                    return Err(format!(
                        "{} (value {value:?} does not match {pattern:?})",
                        self.render_error(value).unwrap_or_default()
                    ));
                }
            }
            ParameterType::Number => {
                let Ok(num) = value.trim().parse::<i64>() else {
                    return Err(self
                        .render_error(value)
                        .unwrap_or_else(|| format!("value {value:?} is not a number")));
                };
                if let Some(min) = self.min.filter(|min| num < *min) {
                    return Err(self.render_error(value).unwrap_or_else(|| {
                        format!("value {num} is less than the minimum {min}")
                    }));
                }
                if let Some(max) = self.max.filter(|max| num > *max) {
                    return Err(self.render_error(value).unwrap_or_else(|| {
                        format!("value {num} is more than the maximum {max}")
                    }));
                }
                if let Some(monotonic) = &self.monotonic {
                    if monotonic != "increasing" && monotonic != "decreasing" {
                        return Err(
                            r#"number monotonicity can be either "increasing" or "decreasing""#
                                .to_string(),
                        );
                    }
                }
            }
            ParameterType::ListString => {
                if serde_json::from_str::<Vec<String>>(value).is_err() {
                    return Err(format!("value {value:?} is not a valid list of strings"));
                }
            }
        }

        Ok(())
    }

    /// The error template with `{min}`, `{max}` and `{value}` substituted
    pub fn render_error(&self, value: &str) -> Option<String> {
        if self.error.is_empty() {
            return None;
        }

        let bound = |bound: Option<i64>| bound.map(|b| b.to_string()).unwrap_or_default();
        Some(
            self.error
                .replace("{min}", &bound(self.min))
                .replace("{max}", &bound(self.max))
                .replace("{value}", value),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub display_name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub ty: ParameterType,
    pub form_type: FormType,
    pub form_type_metadata: serde_json::Value,
    pub mutable: bool,
    pub default_value: Valued,
    pub icon: String,
    pub options: Vec<ParameterOption>,
    pub validations: Vec<ParameterValidation>,
    pub required: bool,
    pub order: i64,
    pub ephemeral: bool,
    pub value: Valued,
    pub diagnostics: Diagnostics,
    /// declaring block
    #[serde(skip)]
    pub source: Option<SourceRange>,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: String::new(),
            description: String::new(),
            ty: ParameterType::default(),
            form_type: FormType::default(),
            form_type_metadata: serde_json::Value::Object(Default::default()),
            mutable: false,
            default_value: Valued::literal(""),
            icon: String::new(),
            options: vec![],
            validations: vec![],
            required: false,
            order: 0,
            ephemeral: false,
            value: Valued::default(),
            diagnostics: Diagnostics::default(),
            source: None,
        }
    }

    /// False if the value cannot be used or the parameter cannot be rendered
    pub fn is_usable(&self) -> bool {
        self.form_type != FormType::Error && !self.diagnostics.has_errors()
    }
}

/// Orders parameters by `(order, name)`
pub fn sort_parameters(parameters: &mut [Parameter]) {
    parameters.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
}
