use crate::visit::VisitTraversals;
use hcl::{Expression, Traversal, TraversalOperator};

pub(crate) trait TraversalExt {
    fn reference_name(&self) -> Option<String>;
}

impl TraversalExt for Traversal {
    /// Dotted name of the statically known part of the traversal
    ///
    /// Turns `data.a.b[0].c` into `data.a.b.[0].c`. Stops at the first splat or dynamic index.
    fn reference_name(&self) -> Option<String> {
        let Expression::Variable(var) = &self.expr else {
            return None;
        };

        let mut parts = vec![var.as_str().to_string()];
        for operator in &self.operators {
            let part = match operator {
                TraversalOperator::GetAttr(ident) => ident.as_str().to_string(),
                TraversalOperator::LegacyIndex(index) => format!("[{index}]"),
                TraversalOperator::Index(Expression::Number(num)) => match num.as_i64() {
                    Some(index) => format!("[{index}]"),
                    None => break,
                },
                TraversalOperator::Index(Expression::String(key)) => format!("[{key}]"),
                _ => break,
            };
            parts.push(part);
        }

        Some(parts.join("."))
    }
}

/// Names of all values the expression references, in order of appearance
pub(crate) fn reference_names(expr: &Expression) -> Vec<String> {
    let mut names: Vec<String> = vec![];
    expr.visit_traversals(&mut |traversal: &Traversal| {
        if let Some(name) = traversal.reference_name() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    });
    names
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expr(source: &str) -> Expression {
        let expr: hcl_edit::expr::Expression = source.parse().expect("valid expression");
        expr.into()
    }

    #[test]
    fn reference_name_with_indices() {
        assert_eq!(
            reference_names(&expr(r#"data.a.b[0].c == data.x.y["k"]"#)),
            vec!["data.a.b.[0].c".to_string(), "data.x.y.[k]".to_string()]
        );
    }

    #[test]
    fn reference_name_stops_at_splat() {
        assert_eq!(
            reference_names(&expr("data.a.b[*].c")),
            vec!["data.a.b".to_string()]
        );
    }

    #[test]
    fn references_inside_templates_and_calls() {
        assert_eq!(
            reference_names(&expr(r#"lower("${var.region}-${data.zone.main.name}")"#)),
            vec!["var.region".to_string(), "data.zone.main.name".to_string()]
        );
    }

    #[test]
    fn references_are_unique() {
        assert_eq!(
            reference_names(&expr("var.a == \"\" ? var.b : var.a")),
            vec!["var.a".to_string(), "var.b".to_string()]
        );
    }
}
