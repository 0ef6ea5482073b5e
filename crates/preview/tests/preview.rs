//! End to end tests
//!
//! Each test previews an in-memory template and checks the parameters, tags and diagnostics
//! a caller would see.

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use ::preview::parameter::{FormType, Parameter};
use ::preview::source_tree;
use ::preview::source_tree::SourceTree;
use ::preview::value::Value;
use ::preview::{preview, Input, Output};

fn run(input: &Input, sources: &SourceTree) -> Output {
    preview(input, sources).expect("preview succeeds")
}

fn values(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn parameter<'a>(output: &'a Output, name: &str) -> &'a Parameter {
    output
        .parameters
        .iter()
        .find(|parameter| parameter.name == name)
        .unwrap_or_else(|| panic!("parameter {name} exists"))
}

fn summaries(output: &Output) -> Vec<&str> {
    output
        .diagnostics
        .iter()
        .map(|diagnostic| diagnostic.summary.as_str())
        .collect()
}

#[test]
fn default_with_options() {
    let sources = source_tree!(
        r#"
data "coder_parameter" "region" {
  name    = "region"
  default = "us"

  option {
    name  = "US"
    value = "us"
  }
  option {
    name  = "EU"
    value = "eu"
  }
}
"#
    );

    let output = run(&Input::default(), &sources);

    assert_eq!(output.parameters.len(), 1);
    let region = parameter(&output, "region");
    assert_eq!(region.value.as_string(), "us");
    assert_eq!(region.options.len(), 2);
    assert_eq!(region.form_type, FormType::Radio);
    assert!(region.diagnostics.is_empty());
    assert!(output.diagnostics.is_empty());
}

#[test]
fn missing_value_is_unusable() {
    let sources = source_tree!(
        r#"
data "coder_parameter" "name" {
  name = "name"
}
"#
    );

    let output = run(&Input::default(), &sources);

    let name = parameter(&output, "name");
    assert!(!name.value.is_known());
    assert!(!name.is_usable());
    assert_eq!(name.form_type, FormType::Error);
    assert!(name.diagnostics.has_errors());
}

#[test]
fn plan_values_feed_tags() {
    let sources = source_tree!(
        r#"
data "upstream" "net" {}

data "coder_workspace_tags" "tags" {
  tags = {
    "zone" = data.upstream.net.zone
  }
}
"#
    );
    let plan = r#"{
      "prior_state": {
        "values": {
          "root_module": {
            "resources": [
              {
                "address": "data.upstream.net",
                "mode": "data",
                "type": "upstream",
                "name": "net",
                "values": { "zone": "eu-west-1" }
              }
            ]
          }
        }
      }
    }"#;
    let input = Input {
        plan_json: Some(plan.as_bytes().to_vec()),
        ..Default::default()
    };

    let output = run(&input, &sources);

    assert_eq!(
        output.tags.valid_tags(),
        IndexMap::from([("zone".to_string(), "eu-west-1".to_string())])
    );
    assert!(output.diagnostics.is_empty());
}

#[test]
fn counted_parameters_keep_both_instances() {
    let sources = source_tree!(
        r#"
data "coder_parameter" "disk" {
  count   = 2
  name    = "disk-${count.index}"
  default = "10"
  type    = "number"
}

output "disks" {
  value = data.coder_parameter.disk
}
"#
    );

    let output = run(&Input::default(), &sources);

    let disks = output
        .module_output
        .as_object()
        .and_then(|outputs| outputs.get("disks"))
        .and_then(Value::elements)
        .expect("tuple of disks");
    assert_eq!(disks.len(), 2);
    for (index, disk) in disks.iter().enumerate() {
        let disk = disk.as_object().expect("disk object");
        assert_eq!(disk.get("name"), Some(&Value::from(format!("disk-{index}"))));
        assert_eq!(disk.get("value"), Some(&Value::from("10")));
    }

    let names: Vec<_> = output.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["disk-0", "disk-1"]);
    assert!(output.diagnostics.is_empty());
}

#[test]
fn duplicate_names_name_every_block() {
    let sources = source_tree!(
        r#"
data "coder_parameter" "first" {
  name    = "region"
  default = "us"
}

data "coder_parameter" "second" {
  name    = "region"
  default = "eu"
}
"#
    );

    let output = run(&Input::default(), &sources);

    assert_eq!(
        summaries(&output),
        vec!["Found 2 duplicate parameters with name \"region\", this is not allowed"]
    );
    let detail = &output.diagnostics.iter().next().expect("one error").detail;
    assert!(detail.contains("data.coder_parameter.first"));
    assert!(detail.contains("data.coder_parameter.second"));
}

#[test]
fn interdependent_defaults_resolve() {
    let sources = source_tree!(
        r#"
data "coder_parameter" "size" {
  name    = "size"
  default = "${data.coder_parameter.region.value}-large"
}

data "coder_parameter" "region" {
  name    = "region"
  default = "us"
}
"#
    );
    let input = Input {
        parameter_values: values(&[("region", "eu")]),
        ..Default::default()
    };

    let output = run(&input, &sources);

    assert_eq!(parameter(&output, "region").value.as_string(), "eu");
    assert_eq!(parameter(&output, "size").value.as_string(), "eu-large");
    assert!(output.diagnostics.is_empty());
}

#[test]
fn non_string_tag_is_invalid() {
    let sources = source_tree!(
        r#"
data "coder_workspace_tags" "tags" {
  tags = {
    "team" = "infra"
    "size" = 3
  }
}
"#
    );

    let output = run(&Input::default(), &sources);

    assert_eq!(
        output.tags.valid_tags(),
        IndexMap::from([("team".to_string(), "infra".to_string())])
    );
    assert_eq!(output.tags.invalid_names(), vec!["size".to_string()]);
    assert_eq!(summaries(&output), vec!["Invalid value type for tags"]);
}

#[test]
fn var_files_set_root_variables() {
    let sources = source_tree! {
        "main.tf" => r#"
variable "region" {
  default = "us"
}

data "coder_parameter" "region" {
  name    = "region"
  default = var.region
}
"#,
        "terraform.tfvars" => r#"region = "eu""#,
    };

    let output = run(&Input::default(), &sources);

    assert_eq!(parameter(&output, "region").value.as_string(), "eu");
}

#[test]
fn module_outputs_are_readable() {
    let sources = source_tree! {
        "main.tf" => r#"
module "net" {
  source = "./net"
}

data "coder_parameter" "zone" {
  name    = "zone"
  default = module.net.zone
}

output "zone" {
  value = module.net.zone
}
"#,
        "net/main.tf" => r#"
output "zone" {
  value = "eu-1"
}
"#,
    };

    let output = run(&Input::default(), &sources);

    assert_eq!(parameter(&output, "zone").value.as_string(), "eu-1");
    assert_eq!(
        output.module_output,
        Value::object([("zone", Value::from("eu-1"))])
    );
}

#[test]
fn dynamic_options() {
    let sources = source_tree!(
        r#"
locals {
  regions = ["us", "eu", "ap"]
}

data "coder_parameter" "region" {
  name    = "region"
  default = local.regions[0]

  dynamic "option" {
    for_each = local.regions
    content {
      name  = upper(option.value)
      value = option.value
    }
  }
}
"#
    );

    let output = run(&Input::default(), &sources);

    let region = parameter(&output, "region");
    let options: Vec<_> = region
        .options
        .iter()
        .map(|option| (option.name.as_str(), option.value.as_string()))
        .collect();
    assert_eq!(
        options,
        vec![
            ("US", "us".to_string()),
            ("EU", "eu".to_string()),
            ("AP", "ap".to_string()),
        ]
    );
    assert_eq!(region.value.as_string(), "us");
}

#[test]
fn owner_is_available() {
    let sources = source_tree!(
        r#"
data "coder_workspace_owner" "me" {}

data "coder_parameter" "home" {
  name    = "home"
  default = "/home/${data.coder_workspace_owner.me.name}"
}
"#
    );
    let mut input = Input::default();
    input.owner.name = "alice".to_string();

    let output = run(&input, &sources);

    assert_eq!(parameter(&output, "home").value.as_string(), "/home/alice");
}

#[test]
fn unresolved_count_warns() {
    let sources = source_tree!(
        r#"
data "coder_parameter" "extra" {
  count = data.upstream.flags.extra ? 1 : 0
  name  = "extra"
  default = "yes"
}
"#
    );

    let output = run(&Input::default(), &sources);

    assert_eq!(
        summaries(&output),
        vec!["Unexpanded count argument on block \"data.coder_parameter.extra\""]
    );
    // the instance address is unknown, so no value is injected
    assert!(!parameter(&output, "extra").is_usable());
}

#[test]
fn parse_error_is_fatal() {
    let sources = source_tree!(r#"data "coder_parameter" "broken" {"#);

    let diagnostics = preview(&Input::default(), &sources).expect_err("parse error");

    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics.has_errors());
}

#[test]
fn out_of_range_plan_index_is_a_warning() {
    let sources = source_tree!(
        r#"
data "upstream" "net" {
  count = 1
}

data "coder_parameter" "zone" {
  name    = "zone"
  default = data.upstream.net[0].zone
}
"#
    );
    let plan = r#"{
      "prior_state": {
        "values": {
          "root_module": {
            "resources": [
              {
                "address": "data.upstream.net[0]",
                "mode": "data",
                "type": "upstream",
                "name": "net",
                "index": 0,
                "values": { "zone": "eu-west-1" }
              },
              {
                "address": "data.upstream.net[18446744073709551615]",
                "mode": "data",
                "type": "upstream",
                "name": "net",
                "index": 18446744073709551615,
                "values": { "zone": "nowhere" }
              }
            ]
          }
        }
      }
    }"#;
    let input = Input {
        plan_json: Some(plan.as_bytes().to_vec()),
        ..Default::default()
    };

    let output = run(&input, &sources);

    assert_eq!(parameter(&output, "zone").value.as_string(), "eu-west-1");
    assert_eq!(summaries(&output), vec!["Planned resource index out of range"]);
}
