use super::EvalHook;
use crate::context::ContextTree;
use crate::context::InstanceKey;
use crate::diagnostics::{Diagnostic, PassDiagnostics};
use crate::evaluator::{Block, InputVars};
use crate::merge::MAX_INSTANCES;
use crate::plan::{Plan, StateResource};
use crate::value::Value;
use std::collections::HashSet;
use std::rc::Rc;

/// Prefix of the block types whose values are synthesized instead of read from a plan
const SYNTHETIC_TYPE_PREFIX: &str = "coder_";

/// Feeds resource values captured in a plan's prior state back into evaluation
#[derive(Debug, Clone, Default)]
pub struct PlanHook {
    plan: Option<Plan>,
}

impl PlanHook {
    pub fn new(plan: Option<Plan>) -> Self {
        Self { plan }
    }
}

impl EvalHook for PlanHook {
    #[tracing::instrument(level = "trace", skip_all)]
    fn on_pass(
        &mut self,
        ctx: &mut ContextTree,
        blocks: &[Block],
        _: &InputVars,
        diagnostics: &mut PassDiagnostics,
    ) {
        let Some(root) = self.plan.as_ref().and_then(Plan::root_module) else {
            return;
        };

        let mut seen = HashSet::new();
        for block in blocks {
            if block.type_label().starts_with(SYNTHETIC_TYPE_PREFIX) {
                continue;
            }
            // instances of one declaration share the collection they are loaded into
            if !seen.insert(Rc::as_ptr(&block.decl)) {
                continue;
            }
            let Some(module) = root.find(&block.module) else {
                continue;
            };

            let base = block.reference_path();
            for resource in module
                .resources
                .iter()
                .filter(|resource| matches_block(resource, block))
            {
                let instance = resource.instance_key();
                if let Some(InstanceKey::Index(index)) = instance {
                    if index >= MAX_INSTANCES {
                        diagnostics.record(
                            &resource.address,
                            "index",
                            Diagnostic::warning("Planned resource index out of range")
                                .with_detail(format!(
                                    "Resource {:?} has index {}, values of indices from {MAX_INSTANCES} on are not loaded.",
                                    resource.address,
                                    resource.index.as_ref().map(ToString::to_string).unwrap_or_default()
                                ))
                                .with_subject(block.range().clone()),
                        );
                        continue;
                    }
                }

                tracing::trace!(address = resource.address, "loading planned values");
                ctx.merge_instance(
                    block.module_context,
                    &base,
                    instance.as_ref(),
                    Value::from(resource.values.clone()),
                );
            }
        }
    }
}

fn matches_block(resource: &StateResource, block: &Block) -> bool {
    let mode_matches = match block.kind() {
        "data" => resource.is_data(),
        "resource" => resource.mode == "managed",
        _ => false,
    };
    mode_matches && resource.ty == block.type_label() && resource.name == block.name_label()
}
