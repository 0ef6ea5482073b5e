//! top level entry point
//!
//! [preview] sequences everything: variable files become input variables, the plan is read,
//! the hooks are registered, the pass loop runs and parameters and tags are extracted from the
//! result. Only problems that leave nothing to show are returned as `Err`, everything else is
//! part of [Output::diagnostics].
use crate::context::ContextTree;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::document;
use crate::evaluator::{Evaluator, InputVars, DEFAULT_MAX_PASSES};
use crate::extract;
use crate::hooks::{OwnerHook, ParameterHook, PlanHook};
use crate::owner::WorkspaceOwner;
use crate::parameter::Parameter;
use crate::plan::{parse_plan, read_plan, Plan, PlanError};
use crate::source_tree::SourceTree;
use crate::tags::TagBlocks;
use crate::value::Value;
use crate::warnings::warnings;
use indexmap::IndexMap;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Input {
    /// Plan to read, looked up in the source tree first and on disk otherwise
    pub plan_json_path: Option<PathBuf>,
    /// Plan contents, takes precedence over `plan_json_path`
    pub plan_json: Option<Vec<u8>>,
    pub parameter_values: IndexMap<String, String>,
    pub owner: WorkspaceOwner,
    /// defaults to [DEFAULT_MAX_PASSES]
    pub max_passes: Option<usize>,
    /// Checked between passes
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Serialize)]
pub struct Output {
    pub module_output: Value,
    pub parameters: Vec<Parameter>,
    pub tags: TagBlocks,
    /// contents of all source files, for rendering diagnostics
    #[serde(skip)]
    pub files: IndexMap<String, String>,
    pub diagnostics: Diagnostics,
}

/// Previews the template in `sources`
///
/// A panic anywhere below is turned into a single error diagnostic.
pub fn preview(input: &Input, sources: &SourceTree) -> Result<Output, Diagnostics> {
    fault_boundary(|| run(input, sources))
}

/// Loads the template directory `dir` and previews it
pub fn preview_dir(input: &Input, dir: &Path) -> Result<Output, Diagnostics> {
    let sources = SourceTree::load_directory(dir).map_err(|err| {
        Diagnostics::from(Diagnostic::error("Files not found").with_detail(error_chain(&err)))
    })?;
    preview(input, &sources)
}

#[tracing::instrument(level = "info", skip_all, fields(files = sources.files().len()))]
fn run(input: &Input, sources: &SourceTree) -> Result<Output, Diagnostics> {
    let (input_vars, mut diagnostics) = input_vars(sources)?;

    let plan = load_plan(input, sources).map_err(|err| {
        Diagnostics::from(Diagnostic::error("Parsing plan JSON").with_detail(error_chain(&err)))
    })?;

    let evaluated = Evaluator::new(sources)
        .with_hook(PlanHook::new(plan))
        .with_hook(OwnerHook::new(input.owner.clone()))
        .with_hook(ParameterHook::new(input.parameter_values.clone()))
        .with_input_vars(input_vars)
        .with_max_passes(input.max_passes.unwrap_or(DEFAULT_MAX_PASSES))
        .with_cancel(input.cancel.clone())
        .evaluate()?;
    tracing::debug!(
        passes = evaluated.passes,
        blocks = evaluated.blocks.len(),
        "evaluated"
    );

    let (parameters, parameter_diagnostics) =
        extract::parameters(&evaluated.blocks, &evaluated.ctx);
    let (tags, tag_diagnostics) = extract::workspace_tags(&evaluated.blocks, &evaluated.ctx);

    diagnostics.extend(evaluated.diagnostics);
    diagnostics.extend(warnings(&evaluated.blocks));
    diagnostics.extend(parameter_diagnostics);
    diagnostics.extend(tag_diagnostics);

    tracing::info!(
        parameters = parameters.len(),
        errors = diagnostics.errors().count(),
        warnings = diagnostics.warnings().count(),
        "preview finished"
    );

    Ok(Output {
        module_output: evaluated.module_output,
        parameters,
        tags,
        files: sources.files().clone(),
        diagnostics,
    })
}

/// Values of all `.tfvars` files, later files override earlier ones
///
/// A file that cannot be parsed is fatal, a value that cannot be evaluated is skipped.
fn input_vars(sources: &SourceTree) -> Result<(InputVars, Diagnostics), Diagnostics> {
    let ctx = ContextTree::new();
    let mut input_vars = InputVars::new();
    let mut diagnostics = Diagnostics::new();

    for (path, contents) in sources.var_files() {
        tracing::debug!(path, "loading variable file");
        let document = document::parse(path, contents)?;
        for (name, attr) in &document.attributes {
            match ctx.evaluate(ctx.root(), &attr.expr) {
                Ok(value) => {
                    input_vars.insert(name.clone(), value);
                }
                Err(err) => diagnostics.push(
                    Diagnostic::error("Invalid variable value")
                        .with_detail(format!(
                            "Variable {name:?} in {path} cannot be evaluated: {}",
                            err.message()
                        ))
                        .with_subject(attr.range.clone()),
                ),
            }
        }
    }

    Ok((input_vars, diagnostics))
}

fn load_plan(input: &Input, sources: &SourceTree) -> Result<Option<Plan>, PlanError> {
    if let Some(bytes) = &input.plan_json {
        return parse_plan(bytes).map(Some);
    }
    let Some(path) = &input.plan_json_path else {
        return Ok(None);
    };

    tracing::debug!(path=%path.display(), "loading plan");
    match sources.get(&path.to_string_lossy()) {
        Some(contents) => parse_plan(contents.as_bytes()).map(Some),
        None => read_plan(path).map(Some),
    }
}

fn fault_boundary<T>(f: impl FnOnce() -> Result<T, Diagnostics>) -> Result<T, Diagnostics> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown cause".to_string());
        tracing::error!(message, "preview panicked");

        Err(Diagnostic::error("Internal error")
            .with_detail(format!("The preview stopped unexpectedly: {message}"))
            .into())
    })
}

/// `error: cause: cause` of an error and its sources
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(err) = source {
        parts.push(err.to_string());
        source = err.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source_tree;
    use pretty_assertions::assert_eq;

    #[test]
    fn panics_become_a_diagnostic() {
        let result: Result<(), Diagnostics> = fault_boundary(|| panic!("value invariant broken"));

        let diagnostics = result.expect_err("panic is caught");
        assert_eq!(diagnostics.len(), 1);
        let diagnostic = diagnostics.iter().next().expect("one diagnostic");
        assert_eq!(diagnostic.summary, "Internal error");
        assert_eq!(
            diagnostic.detail,
            "The preview stopped unexpectedly: value invariant broken"
        );
    }

    #[test]
    fn later_var_files_override() {
        let sources = source_tree! {
            "main.tf" => "",
            "a.tfvars" => "region = \"us\"\nsize = 2",
            "b.tfvars" => "region = \"eu\""
        };

        let (vars, diagnostics) = input_vars(&sources).expect("valid variable files");
        assert!(diagnostics.is_empty());
        assert_eq!(vars.get("region"), Some(&Value::from("eu")));
        assert_eq!(vars.get("size"), Some(&Value::from(2)));
    }

    #[test]
    fn plan_path_is_read_from_the_tree() {
        let sources = source_tree! {
            "main.tf" => "",
            "plan.json" => r#"{"prior_state": null}"#
        };
        let input = Input {
            plan_json_path: Some(PathBuf::from("./plan.json")),
            ..Default::default()
        };

        let plan = load_plan(&input, &sources).expect("plan parses");
        assert!(plan.is_some_and(|plan| plan.prior_state.is_none()));
    }

    #[test]
    fn unreadable_plan_is_fatal() {
        let sources = source_tree!("");
        let input = Input {
            plan_json: Some(b"{not json".to_vec()),
            ..Default::default()
        };

        let diagnostics = preview(&input, &sources).expect_err("invalid plan");
        let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Parsing plan JSON"]);
        assert!(diagnostics
            .iter()
            .all(|d| d.detail.starts_with("failed to parse plan: ")));
    }
}
