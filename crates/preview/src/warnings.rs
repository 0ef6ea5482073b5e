//! document level warnings
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::evaluator::Block;
use std::collections::HashSet;
use std::rc::Rc;

/// Warnings for structural problems of the evaluated blocks
pub fn warnings(blocks: &[Block]) -> Diagnostics {
    unexpanded_blocks(blocks)
}

/// A `count` or `for_each` that could not be resolved leaves a single instance behind
fn unexpanded_blocks(blocks: &[Block]) -> Diagnostics {
    let mut seen = HashSet::new();
    let mut diagnostics = Diagnostics::new();

    for block in blocks.iter().filter(|block| block.repeated && !block.expanded) {
        if !seen.insert(Rc::as_ptr(&block.decl)) {
            continue;
        }

        let (argument, attr) = match block.attribute("count") {
            Some(attr) => ("count", attr),
            None => match block.attribute("for_each") {
                Some(attr) => ("for_each", attr),
                None => continue,
            },
        };

        tracing::debug!(address = block.address, argument, "unexpanded block");
        diagnostics.push(
            Diagnostic::warning(format!(
                "Unexpanded {argument} argument on block {:?}",
                block.address
            ))
            .with_detail(format!(
                "The {argument} argument is not expanded. This may lead to unexpected behavior. \
                 The default behavior is to assume {argument} is 1."
            ))
            .with_subject(attr.range.clone())
            .with_eval_context(block.context),
        );
    }

    diagnostics
}
