//! workspace owner facts
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Block type exposing the owner (`data "coder_workspace_owner" "me" {}`)
pub const BLOCK_TYPE_WORKSPACE_OWNER: &str = "coder_workspace_owner";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceOwner {
    pub id: String,
    pub name: String,
    pub full_name: String,
    pub email: String,
    pub ssh_public_key: String,
    pub ssh_private_key: String,
    pub groups: Vec<String>,
    pub session_token: String,
    pub oidc_access_token: String,
    pub login_type: String,
    pub rbac_roles: Vec<RbacRole>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacRole {
    pub name: String,
    pub org_id: String,
}

impl WorkspaceOwner {
    /// Object as the owner data block exposes it to expressions
    pub fn to_value(&self) -> Value {
        let strings = |items: &[String]| -> Value {
            Value::from(items.iter().map(String::as_str).map(Value::from).collect::<Vec<_>>())
        };

        Value::object([
            ("id", Value::from(self.id.as_str())),
            ("name", self.name.as_str().into()),
            ("full_name", self.full_name.as_str().into()),
            ("email", self.email.as_str().into()),
            ("ssh_public_key", self.ssh_public_key.as_str().into()),
            ("ssh_private_key", self.ssh_private_key.as_str().into()),
            ("groups", strings(&self.groups)),
            ("session_token", self.session_token.as_str().into()),
            ("oidc_access_token", self.oidc_access_token.as_str().into()),
            ("login_type", self.login_type.as_str().into()),
            (
                "rbac_roles",
                Value::from(
                    self.rbac_roles
                        .iter()
                        .map(|role| {
                            Value::object([
                                ("name", Value::from(role.name.as_str())),
                                ("org_id", role.org_id.as_str().into()),
                            ])
                        })
                        .collect::<Vec<_>>(),
                ),
            ),
        ])
    }
}
