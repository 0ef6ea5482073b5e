use super::EvalHook;
use crate::context::ContextTree;
use crate::diagnostics::PassDiagnostics;
use crate::evaluator::{Block, InputVars};
use crate::owner::{WorkspaceOwner, BLOCK_TYPE_WORKSPACE_OWNER};

/// Exposes the workspace owner through every `data "coder_workspace_owner"` block
#[derive(Debug, Clone)]
pub struct OwnerHook {
    owner: WorkspaceOwner,
}

impl OwnerHook {
    pub fn new(owner: WorkspaceOwner) -> Self {
        Self { owner }
    }
}

impl EvalHook for OwnerHook {
    fn on_pass(
        &mut self,
        ctx: &mut ContextTree,
        blocks: &[Block],
        _: &InputVars,
        _: &mut PassDiagnostics,
    ) {
        let value = self.owner.to_value();
        for block in blocks
            .iter()
            .filter(|block| block.is_data(BLOCK_TYPE_WORKSPACE_OWNER))
        {
            tracing::trace!(address = block.address, "injecting owner");
            ctx.merge_instance(
                block.module_context,
                &block.reference_path(),
                block.instance.as_ref(),
                value.clone(),
            );
        }
    }
}

#[cfg(test)]
mod test {
    use crate::context::path;
    use crate::owner::WorkspaceOwner;
    use crate::value::Value;
    use crate::{evaluator::Evaluator, source_tree};
    use pretty_assertions::assert_eq;

    #[test]
    fn owner_is_readable() {
        let sources = source_tree!(
            r#"
data "coder_workspace_owner" "me" {}

output "greeting" {
  value = "hi ${data.coder_workspace_owner.me.name}"
}

output "admin" {
  value = contains(data.coder_workspace_owner.me.groups, "admins")
}
"#
        );
        let owner = WorkspaceOwner {
            name: "alice".to_string(),
            groups: vec!["admins".to_string()],
            ..Default::default()
        };

        let evaluated = Evaluator::new(&sources)
            .with_hook(super::OwnerHook::new(owner))
            .evaluate()
            .expect("evaluates");

        assert_eq!(
            evaluated.module_output,
            Value::object([
                ("greeting", Value::from("hi alice")),
                ("admin", Value::from(true)),
            ])
        );
        let root = evaluated.ctx.root();
        assert_eq!(
            evaluated
                .ctx
                .get(root, &path(["data", "coder_workspace_owner", "me", "email"])),
            Value::from("")
        );
    }
}
