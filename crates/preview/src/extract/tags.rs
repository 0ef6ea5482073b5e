use crate::context::{evaluate_in, ContextTree};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::document::ObjectItem;
use crate::evaluator::Block;
use crate::tags::{Tag, TagBlock, TagBlocks, BLOCK_TYPE_WORKSPACE_TAGS};
use crate::util::reference_names;
use crate::value::{Value, ValueType};
use crate::valued::Valued;

/// Tags of all `coder_workspace_tags` blocks
#[tracing::instrument(level = "debug", skip_all)]
pub fn workspace_tags(blocks: &[Block], ctx: &ContextTree) -> (TagBlocks, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let mut tag_blocks = TagBlocks::default();

    for block in blocks
        .iter()
        .filter(|block| block.is_data(BLOCK_TYPE_WORKSPACE_TAGS))
    {
        match tags_from_block(block, ctx) {
            Ok((tag_block, tag_diagnostics)) => {
                diagnostics.extend(tag_diagnostics);
                tag_blocks.0.push(tag_block);
            }
            Err(diagnostic) => diagnostics.push(diagnostic),
        }
    }

    (tag_blocks, diagnostics)
}

/// Evaluates each key and value of the block's `tags` object separately
///
/// The `tags` expression has to be an object constructor so the keys can be listed even if
/// some of them cannot be resolved.
pub fn tags_from_block(
    block: &Block,
    ctx: &ContextTree,
) -> Result<(TagBlock, Diagnostics), Diagnostic> {
    let Some(attr) = block.attribute("tags") else {
        return Err(Diagnostic::error("Missing required argument")
            .with_detail(r#""tags" attribute is required by coder_workspace_tags blocks"#)
            .with_subject(block.range().clone())
            .with_eval_context(block.context));
    };
    let Some(items) = &attr.items else {
        return Err(Diagnostic::error("Incorrect type for \"tags\" attribute")
            .with_detail(format!(
                r#""tags" attribute must be an object constructor, but got {:?}"#,
                attr.source
            ))
            .with_subject(attr.range.clone())
            .with_eval_context(block.context));
    };

    let hcl_ctx = ctx.eval_context(block.context);
    let mut diagnostics = Diagnostics::new();
    let mut tags = vec![];
    for item in items {
        let key = evaluate_side(&hcl_ctx, block, &item.key, &item.key_source);
        let value = evaluate_side(&hcl_ctx, block, &item.value, &item.value_source);

        if let Some(diagnostic) = non_string(&key.value, "key", item, block) {
            diagnostics.push(diagnostic);
        }
        if let Some(diagnostic) = non_string(&value.value, "value", item, block) {
            diagnostics.push(diagnostic);
        }

        let mut references = reference_names(&item.key);
        for name in reference_names(&item.value) {
            if !references.contains(&name) {
                references.push(name);
            }
        }

        tags.push(Tag {
            key,
            value,
            references,
        });
    }

    Ok((
        TagBlock {
            tags,
            source: Some(block.range().clone()),
        },
        diagnostics,
    ))
}

/// Unknown string if the expression cannot be evaluated
fn evaluate_side(
    hcl_ctx: &hcl::eval::Context<'_>,
    block: &Block,
    expr: &hcl::Expression,
    source: &str,
) -> Valued {
    let valued = match evaluate_in(hcl_ctx, expr) {
        Ok(value) => Valued::new(value),
        Err(err) if err.is_unresolved() => Valued::new(Value::Unknown(ValueType::String)),
        Err(err) => Valued::new(Value::Unknown(ValueType::String)).with_diagnostics(
            Diagnostic::error("Failed to evaluate tag")
                .with_detail(err.message())
                .with_eval_context(block.context)
                .into(),
        ),
    };
    valued.with_source(source)
}

fn non_string(value: &Value, side: &str, item: &ObjectItem, block: &Block) -> Option<Diagnostic> {
    if !value.is_known() || matches!(value, Value::String(_)) {
        return None;
    }

    let subject = match side {
        "key" => item.key_range.clone(),
        _ => item.value_range.clone(),
    };
    let title = match side {
        "key" => "Key",
        _ => "Value",
    };
    Some(
        Diagnostic::error(format!("Invalid {side} type for tags"))
            .with_detail(format!(
                "{title} must be a string, but got {}",
                value.friendly_type_name()
            ))
            .with_subject(subject)
            .with_eval_context(block.context),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::evaluator::Evaluator;
    use crate::source_tree;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn extract(source: &str) -> (TagBlocks, Diagnostics) {
        let sources = source_tree!(source);
        let evaluated = Evaluator::new(&sources).evaluate().expect("evaluates");
        workspace_tags(&evaluated.blocks, &evaluated.ctx)
    }

    #[test]
    fn valid_and_invalid_tags() {
        let (tags, diagnostics) = extract(
            r#"
locals {
  zone = "eu-1"
}

data "coder_workspace_tags" "tags" {
  tags = {
    "zone"    = local.zone
    "cluster" = data.k8s.cluster.name
    "size"    = 3
  }
}
"#,
        );

        assert_eq!(
            tags.valid_tags(),
            IndexMap::from([("zone".to_string(), "eu-1".to_string())])
        );
        assert_eq!(
            tags.invalid_names(),
            vec!["cluster".to_string(), "size".to_string()]
        );
        assert_eq!(
            tags.invalid_tags()[0].references,
            vec!["data.k8s.cluster.name".to_string()]
        );

        let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Invalid value type for tags"]);
    }

    #[test]
    fn unknown_key_keeps_source() {
        let (tags, _) = extract(
            r#"
data "coder_workspace_tags" "tags" {
  tags = {
    (data.k8s.cluster.label) = "x"
  }
}
"#,
        );

        let names = tags.invalid_names();
        assert_eq!(names.len(), 1);
        assert!(names[0].contains("data.k8s.cluster.label"));
    }

    #[test]
    fn tags_attribute_is_required() {
        let (tags, diagnostics) = extract(r#"data "coder_workspace_tags" "tags" {}"#);
        assert!(tags.0.is_empty());
        assert_eq!(
            diagnostics.iter().next().map(|d| d.summary.as_str()),
            Some("Missing required argument")
        );
    }

    #[test]
    fn tags_must_be_object_constructor() {
        let (tags, diagnostics) = extract(
            r#"
locals {
  tags = { a = "b" }
}

data "coder_workspace_tags" "tags" {
  tags = local.tags
}
"#,
        );
        assert!(tags.0.is_empty());
        assert_eq!(
            diagnostics.iter().next().map(|d| d.summary.as_str()),
            Some("Incorrect type for \"tags\" attribute")
        );
    }
}
