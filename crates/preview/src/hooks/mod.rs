//! synthetic data injected between evaluation passes
//!
//! A hook runs after every pass with the full block list. It writes values into the
//! [ContextTree] that cannot come from the template itself: the workspace owner, resource values
//! captured in a plan, and parameter values. Problems are recorded in the shared
//! [PassDiagnostics], keyed so a problem seen on every pass is only reported once.
use crate::context::ContextTree;
use crate::diagnostics::PassDiagnostics;
use crate::evaluator::{Block, InputVars};

mod owner;
mod parameter;
mod plan;

pub use owner::OwnerHook;
pub use parameter::ParameterHook;
pub use plan::PlanHook;

pub trait EvalHook {
    fn on_pass(
        &mut self,
        ctx: &mut ContextTree,
        blocks: &[Block],
        input_vars: &InputVars,
        diagnostics: &mut PassDiagnostics,
    );
}

impl<F> EvalHook for F
where
    F: FnMut(&mut ContextTree, &[Block], &InputVars, &mut PassDiagnostics),
{
    fn on_pass(
        &mut self,
        ctx: &mut ContextTree,
        blocks: &[Block],
        input_vars: &InputVars,
        diagnostics: &mut PassDiagnostics,
    ) {
        self(ctx, blocks, input_vars, diagnostics)
    }
}
