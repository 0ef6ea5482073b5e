use crate::parameter::{
    FormType, Parameter, ParameterOption, ParameterType, ParameterValidation, BLOCK_TYPE_PARAMETER,
};
use crate::plan::{StateModule, StateResource};
use crate::valued::Valued;
use serde_json::{Map, Value as Json};

#[derive(thiserror::Error, Debug)]
pub enum StateError {
    #[error("missing required key {0:?}")]
    MissingKey(String),
    #[error("key {key:?} is not of type {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("{key}: {message}")]
    Invalid { key: String, message: String },
    #[error("resource {address:?}")]
    Resource {
        address: String,
        #[source]
        source: Box<StateError>,
    },
    #[error("child module {address:?}")]
    ChildModule {
        address: String,
        #[source]
        source: Box<StateError>,
    },
}

/// Rebuilds the parameters recorded in a state document
///
/// Every `data "coder_parameter"` resource of the module and its child modules becomes a
/// parameter whose value is the recorded one.
pub fn parameters_from_state(module: &StateModule) -> Result<Vec<Parameter>, StateError> {
    let mut parameters = vec![];
    for resource in module
        .resources
        .iter()
        .filter(|resource| resource.is_data() && resource.ty == BLOCK_TYPE_PARAMETER)
    {
        let parameter = parameter_from_state(resource).map_err(|source| StateError::Resource {
            address: resource.address.clone(),
            source: Box::new(source),
        })?;
        parameters.push(parameter);
    }

    for child in &module.child_modules {
        let child_parameters =
            parameters_from_state(child).map_err(|source| StateError::ChildModule {
                address: child.address.clone().unwrap_or_default(),
                source: Box::new(source),
            })?;
        parameters.extend(child_parameters);
    }

    Ok(parameters)
}

fn parameter_from_state(resource: &StateResource) -> Result<Parameter, StateError> {
    let empty = Map::new();
    let values = Fields(resource.values.as_object().unwrap_or(&empty));

    let mut parameter = Parameter::new(values.string("name")?);
    parameter.value = Valued::literal(values.string("value")?);
    parameter.description = values.optional_string("description");
    parameter.ty = match values.optional_string("type").as_str() {
        "" => ParameterType::default(),
        ty => ty
            .parse()
            .map_err(|message| StateError::Invalid {
                key: "type".to_string(),
                message,
            })?,
    };
    parameter.form_type = match values.optional_string("form_type").as_str() {
        "" => FormType::default(),
        form_type => form_type
            .parse()
            .map_err(|message| StateError::Invalid {
                key: "form_type".to_string(),
                message,
            })?,
    };
    let metadata = values.optional_string("form_type_metadata");
    if !metadata.is_empty() {
        if let Ok(metadata) = serde_json::from_str(&metadata) {
            parameter.form_type_metadata = metadata;
        }
    }
    parameter.mutable = values.optional_bool("mutable");
    parameter.default_value = Valued::literal(values.optional_string("default"));
    parameter.icon = values.optional_string("icon");
    parameter.required = values.optional_bool("required");
    parameter.display_name = values.optional_string("display_name");
    parameter.order = values.optional_integer("order");
    parameter.ephemeral = values.optional_bool("ephemeral");

    for option in values.list("option")? {
        let option = Fields(option);
        parameter.options.push(ParameterOption {
            name: option.string("name")?,
            description: option.optional_string("description"),
            value: Valued::literal(option.string("value")?),
            icon: option.optional_string("icon"),
        });
    }

    for validation in values.list("validation")? {
        let validation = Fields(validation);
        // state records unset fields as zero values
        let mut rule = ParameterValidation {
            regex: validation.nullable_string("regex").filter(|r| !r.is_empty()),
            error: validation.optional_string("error"),
            min: validation.nullable_integer("min"),
            max: validation.nullable_integer("max"),
            monotonic: validation
                .nullable_string("monotonic")
                .filter(|m| !m.is_empty()),
            invalid: None,
        };
        if validation.optional_bool("min_disabled") {
            rule.min = None;
        }
        if validation.optional_bool("max_disabled") {
            rule.max = None;
        }
        parameter.validations.push(rule);
    }

    Ok(parameter)
}

struct Fields<'a>(&'a Map<String, Json>);

impl<'a> Fields<'a> {
    fn string(&self, key: &str) -> Result<String, StateError> {
        match self.0.get(key) {
            None => Err(StateError::MissingKey(key.to_string())),
            Some(Json::String(value)) => Ok(value.clone()),
            Some(_) => Err(StateError::WrongType {
                key: key.to_string(),
                expected: "string",
            }),
        }
    }

    fn nullable_string(&self, key: &str) -> Option<String> {
        self.0.get(key)?.as_str().map(str::to_string)
    }

    fn optional_string(&self, key: &str) -> String {
        self.nullable_string(key).unwrap_or_default()
    }

    fn optional_bool(&self, key: &str) -> bool {
        self.0.get(key).and_then(Json::as_bool).unwrap_or_default()
    }

    fn nullable_integer(&self, key: &str) -> Option<i64> {
        let value = self.0.get(key)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|value| value as i64))
    }

    fn optional_integer(&self, key: &str) -> i64 {
        self.nullable_integer(key).unwrap_or_default()
    }

    /// Elements of a nested block list, absent and null are empty
    fn list(&self, key: &str) -> Result<Vec<&'a Map<String, Json>>, StateError> {
        let elements = match self.0.get(key) {
            None | Some(Json::Null) => return Ok(vec![]),
            Some(Json::Array(elements)) => elements,
            Some(_) => {
                return Err(StateError::WrongType {
                    key: key.to_string(),
                    expected: "list",
                })
            }
        };

        elements
            .iter()
            .map(|element| {
                element.as_object().ok_or_else(|| StateError::WrongType {
                    key: key.to_string(),
                    expected: "list of objects",
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::plan::State;
    use pretty_assertions::assert_eq;

    const STATE: &str = r#"{
      "values": {
        "root_module": {
          "resources": [
            {
              "address": "data.coder_parameter.cpu",
              "mode": "data",
              "type": "coder_parameter",
              "name": "cpu",
              "values": {
                "name": "cpu",
                "value": "4",
                "type": "number",
                "form_type": "slider",
                "default": "2",
                "mutable": true,
                "order": 3,
                "option": null,
                "validation": [
                  {"min": 0, "max": 16, "min_disabled": true, "error": "", "regex": "", "monotonic": "increasing"}
                ]
              }
            },
            {
              "address": "data.upstream.ignored",
              "mode": "data",
              "type": "upstream",
              "name": "ignored",
              "values": {}
            }
          ],
          "child_modules": [
            {
              "address": "module.base",
              "resources": [
                {
                  "address": "module.base.data.coder_parameter.image",
                  "mode": "data",
                  "type": "coder_parameter",
                  "name": "image",
                  "values": {
                    "name": "image",
                    "value": "ubuntu",
                    "option": [
                      {"name": "Ubuntu", "value": "ubuntu", "description": "", "icon": ""}
                    ]
                  }
                }
              ]
            }
          ]
        }
      }
    }"#;

    fn root(json: &str) -> StateModule {
        let state: State = serde_json::from_str(json).expect("valid state");
        state.root_module().cloned().expect("root module")
    }

    #[test]
    fn rebuilds_parameters() {
        let parameters = parameters_from_state(&root(STATE)).expect("valid parameters");
        assert_eq!(parameters.len(), 2);

        let cpu = &parameters[0];
        assert_eq!(cpu.name, "cpu");
        assert_eq!(cpu.value.as_string(), "4");
        assert_eq!(cpu.ty, ParameterType::Number);
        assert_eq!(cpu.form_type, FormType::Slider);
        assert_eq!(cpu.default_value.as_string(), "2");
        assert_eq!(cpu.order, 3);
        assert!(cpu.mutable);
        assert!(cpu.options.is_empty());
        assert_eq!(
            cpu.validations,
            vec![ParameterValidation {
                regex: None,
                error: String::new(),
                min: None,
                max: Some(16),
                monotonic: Some("increasing".to_string()),
                invalid: None,
            }]
        );

        let image = &parameters[1];
        assert_eq!(image.options.len(), 1);
        assert_eq!(image.options[0].value.as_string(), "ubuntu");
    }

    #[test]
    fn missing_name_names_the_resource() {
        let state = r#"{"values": {"root_module": {"resources": [
          {"address": "data.coder_parameter.x", "mode": "data", "type": "coder_parameter", "name": "x", "values": {"value": "1"}}
        ]}}}"#;

        let err = parameters_from_state(&root(state)).expect_err("missing name");
        assert_eq!(err.to_string(), "resource \"data.coder_parameter.x\"");
        let StateError::Resource { source, .. } = err else {
            panic!("expected resource error");
        };
        assert_eq!(source.to_string(), "missing required key \"name\"");
    }
}
