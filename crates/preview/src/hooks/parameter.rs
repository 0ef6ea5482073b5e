use super::EvalHook;
use crate::context::{path, ContextTree};
use crate::diagnostics::{Diagnostic, PassDiagnostics};
use crate::evaluator::{Block, InputVars};
use crate::parameter::BLOCK_TYPE_PARAMETER;
use crate::util::reference_names;
use crate::value::Value;
use indexmap::IndexMap;

/// Resolves the `value` of every parameter block
///
/// A value supplied by the caller wins, otherwise the block's `default` is used. The value is
/// written to `data.coder_parameter.<name>.value` of the block's module, where instances of a
/// repeated block are kept side by side.
#[derive(Debug, Clone, Default)]
pub struct ParameterHook {
    values: IndexMap<String, String>,
}

impl ParameterHook {
    pub fn new(values: IndexMap<String, String>) -> Self {
        Self { values }
    }
}

impl EvalHook for ParameterHook {
    #[tracing::instrument(level = "trace", skip_all)]
    fn on_pass(
        &mut self,
        ctx: &mut ContextTree,
        blocks: &[Block],
        _: &InputVars,
        diagnostics: &mut PassDiagnostics,
    ) {
        for block in blocks
            .iter()
            .filter(|block| block.is_data(BLOCK_TYPE_PARAMETER))
        {
            // an explicit value is evaluated like any other attribute
            if block.attribute("value").is_some() {
                continue;
            }
            if block.repeated && !block.expanded {
                continue;
            }
            let Some(name) = block.value("name").and_then(|name| name.as_str().ok()) else {
                continue;
            };

            let value = match self.values.get(name) {
                Some(value) => Value::String(value.clone()),
                None => match default_value(ctx, block, diagnostics) {
                    Some(value) => value,
                    None => continue,
                },
            };

            tracing::trace!(address = block.address, name, "resolved parameter value");
            ctx.merge_instance(
                block.module_context,
                &path(["data", BLOCK_TYPE_PARAMETER, block.name_label()]),
                block.instance.as_ref(),
                Value::object([("value", value)]),
            );
        }
    }
}

/// Evaluates `default` in the block's own context
///
/// A default that cannot be resolved yet is remembered as a warning, which is dropped again as
/// soon as a later pass resolves it.
fn default_value(
    ctx: &ContextTree,
    block: &Block,
    diagnostics: &mut PassDiagnostics,
) -> Option<Value> {
    let default = block.attribute("default")?;
    match ctx.evaluate(block.context, &default.expr) {
        Ok(value) => {
            diagnostics.resolve(&block.address, "value");
            Some(value)
        }
        Err(err) => {
            // other failures are already reported by the evaluator
            if err.is_unresolved() {
                let references = reference_names(&default.expr);
                diagnostics.record(
                    &block.address,
                    "value",
                    Diagnostic::warning("Unresolved parameter default")
                        .with_detail(format!(
                            "The default value of {} could not be resolved, check the references [{}] are resolvable.",
                            block.address,
                            references.join(", ")
                        ))
                        .with_subject(default.expr_range.clone())
                        .with_eval_context(block.context),
                );
            }
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::evaluator::Evaluator;
    use crate::source_tree;
    use pretty_assertions::assert_eq;

    fn values(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn input_wins_over_default() {
        let sources = source_tree!(
            r#"
data "coder_parameter" "region" {
  name    = "region"
  default = "us"
}
"#
        );

        let evaluated = Evaluator::new(&sources)
            .with_hook(ParameterHook::new(values(&[("region", "eu")])))
            .evaluate()
            .expect("evaluates");

        let root = evaluated.ctx.root();
        assert_eq!(
            evaluated
                .ctx
                .get(root, &path(["data", "coder_parameter", "region", "value"])),
            Value::from("eu")
        );
    }

    #[test]
    fn defaults_chain_across_passes() {
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

        let evaluated = Evaluator::new(&sources)
            .with_hook(ParameterHook::new(values(&[("region", "eu")])))
            .evaluate()
            .expect("evaluates");

        let root = evaluated.ctx.root();
        assert_eq!(
            evaluated
                .ctx
                .get(root, &path(["data", "coder_parameter", "size", "value"])),
            Value::from("eu-large")
        );
        assert!(evaluated.diagnostics.is_empty());
    }

    #[test]
    fn count_instances_do_not_overwrite_each_other() {
        let sources = source_tree!(
            r#"
data "coder_parameter" "disk" {
  count   = 2
  name    = "disk"
  default = "disk-${count.index}"
}
"#
        );

        let evaluated = Evaluator::new(&sources)
            .with_hook(ParameterHook::default())
            .evaluate()
            .expect("evaluates");

        let root = evaluated.ctx.root();
        let disks = evaluated
            .ctx
            .get(root, &path(["data", "coder_parameter", "disk"]));
        let elements = disks.elements().expect("tuple of instances");
        assert_eq!(elements.len(), 2);
        for (index, element) in elements.iter().enumerate() {
            let object = element.as_object().expect("instance object");
            assert_eq!(object.get("name"), Some(&Value::from("disk")));
            assert_eq!(
                object.get("value"),
                Some(&Value::from(format!("disk-{index}")))
            );
        }
    }

    #[test]
    fn unresolved_default_warns_once() {
        let sources = source_tree!(
            r#"
data "coder_parameter" "zone" {
  name    = "zone"
  default = data.upstream.net.zone
}
"#
        );

        let evaluated = Evaluator::new(&sources)
            .with_hook(ParameterHook::default())
            .evaluate()
            .expect("evaluates");

        let warnings: Vec<_> = evaluated.diagnostics.warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].summary, "Unresolved parameter default");
        assert!(warnings[0].detail.contains("data.upstream.net.zone"));
    }
}
