//! captured plan and state documents
//!
//! Only the parts of `terraform show -json` output that feed values back into evaluation are
//! modelled: the module tree of prior state and the attribute values of each resource.
use crate::context::InstanceKey;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum PlanError {
    #[error("failed to read plan file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse plan")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub prior_state: Option<State>,
}

/// `terraform show -json` of a state file, also the `prior_state` of a plan
#[derive(Debug, Clone, Default, Deserialize)]
pub struct State {
    #[serde(default)]
    pub values: Option<StateValues>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateValues {
    #[serde(default)]
    pub root_module: StateModule,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StateModule {
    /// `module.a.module.b`, absent for the root module
    pub address: Option<String>,
    pub resources: Vec<StateResource>,
    pub child_modules: Vec<StateModule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StateResource {
    pub address: String,
    /// `data` or `managed`
    pub mode: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
    pub index: Option<serde_json::Value>,
    pub values: serde_json::Value,
}

impl StateResource {
    pub fn is_data(&self) -> bool {
        self.mode == "data"
    }

    pub fn instance_key(&self) -> Option<InstanceKey> {
        match self.index.as_ref()? {
            serde_json::Value::Number(number) => {
                let index = number.as_u64()?;
                Some(InstanceKey::Index(usize::try_from(index).unwrap_or(usize::MAX)))
            }
            serde_json::Value::String(key) => Some(InstanceKey::Key(key.clone())),
            _ => None,
        }
    }
}

impl Plan {
    pub fn root_module(&self) -> Option<&StateModule> {
        self.prior_state.as_ref()?.root_module()
    }
}

impl State {
    pub fn root_module(&self) -> Option<&StateModule> {
        self.values.as_ref().map(|values| &values.root_module)
    }
}

impl StateModule {
    /// Finds the module reached through the module calls `path`, starting at this module
    ///
    /// Instance suffixes (`module.a[0]`) are ignored when matching names.
    pub fn find(&self, path: &[String]) -> Option<&StateModule> {
        let mut current = self;
        let mut address = String::new();
        for name in path {
            if !address.is_empty() {
                address.push('.');
            }
            address.push_str("module.");
            address.push_str(name);

            current = current.child_modules.iter().find(|child| {
                child
                    .address
                    .as_deref()
                    .map(strip_instance_keys)
                    .is_some_and(|child| child == address)
            })?;
        }
        Some(current)
    }

    /// All resources of this module and its descendants
    pub fn all_resources(&self) -> Box<dyn Iterator<Item = &StateResource> + '_> {
        Box::new(
            self.resources
                .iter()
                .chain(self.child_modules.iter().flat_map(StateModule::all_resources)),
        )
    }
}

fn strip_instance_keys(address: &str) -> String {
    let mut stripped = String::with_capacity(address.len());
    let mut depth = 0usize;
    for c in address.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }
    stripped
}

pub fn parse_plan(bytes: &[u8]) -> Result<Plan, PlanError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn read_plan(path: &Path) -> Result<Plan, PlanError> {
    let bytes = std::fs::read(path).map_err(|source| PlanError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_plan(&bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const PLAN: &str = r#"{
      "format_version": "1.2",
      "prior_state": {
        "values": {
          "root_module": {
            "resources": [
              {
                "address": "data.upstream.net",
                "mode": "data",
                "type": "upstream",
                "name": "net",
                "values": {"zone": "eu-1"}
              }
            ],
            "child_modules": [
              {
                "address": "module.vpc[0]",
                "resources": [
                  {
                    "address": "module.vpc[0].data.upstream.net[\"a\"]",
                    "mode": "data",
                    "type": "upstream",
                    "name": "net",
                    "index": "a",
                    "values": {"zone": "us-2"}
                  }
                ],
                "child_modules": [
                  {"address": "module.vpc[0].module.subnet"}
                ]
              }
            ]
          }
        }
      }
    }"#;

    #[test]
    fn parses_prior_state() {
        let plan = parse_plan(PLAN.as_bytes()).expect("valid plan");
        let root = plan.root_module().expect("prior state");

        assert_eq!(root.resources.len(), 1);
        assert_eq!(root.resources[0].ty, "upstream");
        assert!(root.resources[0].is_data());
        assert_eq!(root.resources[0].instance_key(), None);
        assert_eq!(root.all_resources().count(), 2);
    }

    #[test]
    fn finds_child_modules_by_name() {
        let plan = parse_plan(PLAN.as_bytes()).expect("valid plan");
        let root = plan.root_module().expect("prior state");

        let vpc = root.find(&["vpc".to_string()]).expect("module.vpc");
        assert_eq!(
            vpc.resources[0].instance_key(),
            Some(InstanceKey::Key("a".to_string()))
        );

        let subnet = root
            .find(&["vpc".to_string(), "subnet".to_string()])
            .expect("nested module");
        assert!(subnet.resources.is_empty());

        assert!(root.find(&["missing".to_string()]).is_none());
    }

    #[test]
    fn empty_plan_has_no_state() {
        let plan = parse_plan(b"{}").expect("valid plan");
        assert!(plan.root_module().is_none());
        assert!(parse_plan(b"not json").is_err());
    }
}
