//! parsed template files
//!
//! A file is parsed with [hcl_edit] (which keeps byte spans) and lowered into [BlockDecl]s and
//! [AttributeDecl]s. Expressions are converted to [hcl::Expression] for evaluation, the spans
//! become [SourceRange]s and the literal source text of each expression is kept around so it
//! can be shown when the expression cannot be resolved.
use crate::diagnostics::{Diagnostic, SourceRange};
use hcl_edit::expr::{Expression, ObjectKey};
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use hcl_edit::Span;
use indexmap::IndexMap;
use std::ops::Range;
use std::rc::Rc;

/// Root of a parsed file
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub attributes: IndexMap<String, AttributeDecl>,
    pub blocks: Vec<Rc<BlockDecl>>,
}

#[derive(Debug, Clone)]
pub struct BlockDecl {
    /// block identifier, e.g. `data` or `resource`
    pub kind: String,
    pub labels: Vec<String>,
    pub range: SourceRange,
    pub type_range: SourceRange,
    pub attributes: IndexMap<String, AttributeDecl>,
    pub blocks: Vec<Rc<BlockDecl>>,
}

impl BlockDecl {
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.get(name)
    }

    pub fn blocks_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Rc<BlockDecl>> {
        self.blocks.iter().filter(move |block| block.kind == kind)
    }
}

#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub name: String,
    pub expr: hcl::Expression,
    /// whole `name = expr` range
    pub range: SourceRange,
    pub expr_range: SourceRange,
    /// literal source text of the expression
    pub source: String,
    /// key/value pairs if the expression is an object constructor
    pub items: Option<Vec<ObjectItem>>,
}

/// One `key = value` pair of an object constructor expression
#[derive(Debug, Clone)]
pub struct ObjectItem {
    pub key: hcl::Expression,
    pub value: hcl::Expression,
    pub key_range: SourceRange,
    pub value_range: SourceRange,
    pub key_source: String,
    pub value_source: String,
}

/// Parses a file into a [Document]
pub fn parse(filename: &str, contents: &str) -> Result<Document, Diagnostic> {
    let body = hcl_edit::parser::parse_body(contents).map_err(|err| {
        let offset = err.location().offset();
        Diagnostic::error("Failed to parse file")
            .with_detail(format!("{filename}: {err}"))
            .with_subject(SourceRange::from_span(filename, contents, offset..offset))
    })?;

    let lower = Lowering { filename, contents };
    Ok(lower.document(&body))
}

struct Lowering<'a> {
    filename: &'a str,
    contents: &'a str,
}

impl Lowering<'_> {
    fn range(&self, span: Option<Range<usize>>) -> SourceRange {
        SourceRange::from_span(self.filename, self.contents, span.unwrap_or(0..0))
    }

    fn text(&self, span: Option<Range<usize>>) -> String {
        span.and_then(|span| self.contents.get(span))
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }

    fn document(&self, body: &Body) -> Document {
        let mut document = Document::default();
        for structure in body.iter() {
            match structure {
                Structure::Attribute(attribute) => {
                    let attribute = self.attribute(attribute);
                    document.attributes.insert(attribute.name.clone(), attribute);
                }
                Structure::Block(block) => document.blocks.push(Rc::new(self.block(block))),
            }
        }
        document
    }

    fn block(&self, block: &Block) -> BlockDecl {
        let mut decl = BlockDecl {
            kind: block.ident.value().as_str().to_string(),
            labels: block
                .labels
                .iter()
                .map(|label| label.as_str().to_string())
                .collect(),
            range: self.range(block.span()),
            type_range: self.range(block.ident.span()),
            attributes: IndexMap::new(),
            blocks: vec![],
        };

        for structure in block.body.iter() {
            match structure {
                Structure::Attribute(attribute) => {
                    let attribute = self.attribute(attribute);
                    decl.attributes.insert(attribute.name.clone(), attribute);
                }
                Structure::Block(nested) => decl.blocks.push(Rc::new(self.block(nested))),
            }
        }

        decl
    }

    fn attribute(&self, attribute: &Attribute) -> AttributeDecl {
        let items = match &attribute.value {
            Expression::Object(object) => Some(
                object
                    .iter()
                    .map(|(key, value)| self.object_item(key, value.expr()))
                    .collect(),
            ),
            _ => None,
        };

        AttributeDecl {
            name: attribute.key.value().as_str().to_string(),
            expr: attribute.value.clone().into(),
            range: self.range(attribute.span()),
            expr_range: self.range(attribute.value.span()),
            source: self.text(attribute.value.span()),
            items,
        }
    }

    fn object_item(&self, key: &ObjectKey, value: &Expression) -> ObjectItem {
        let (key_expr, key_span) = match key {
            ObjectKey::Ident(ident) => (
                hcl::Expression::String(ident.value().as_str().to_string()),
                ident.span(),
            ),
            ObjectKey::Expression(expr) => (expr.clone().into(), expr.span()),
        };

        ObjectItem {
            key: key_expr,
            value: value.clone().into(),
            key_range: self.range(key_span.clone()),
            value_range: self.range(value.span()),
            key_source: self.text(key_span),
            value_source: self.text(value.span()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"
data "coder_parameter" "region" {
  name    = "region"
  default = var.fallback

  option {
    name  = "US"
    value = "us"
  }
}

tags = {
  zone  = data.upstream.zone
  "env" = 1
}
"#;

    #[test]
    fn lowers_blocks_and_attributes() {
        let document = parse("main.tf", SOURCE).expect("valid document");

        let block = &document.blocks[0];
        assert_eq!(block.kind, "data");
        assert_eq!(block.labels, vec!["coder_parameter", "region"]);
        assert_eq!(block.range.start.line, 2);
        assert_eq!(block.blocks.len(), 1);
        assert_eq!(block.blocks[0].kind, "option");

        let default = block.attribute("default").expect("default is declared");
        assert_eq!(default.source, "var.fallback");
        assert_eq!(default.expr_range.start.line, 4);
        assert!(default.items.is_none());
    }

    #[test]
    fn keeps_object_items() {
        let document = parse("main.tf", SOURCE).expect("valid document");
        let tags = document.attributes.get("tags").expect("tags are declared");
        let items = tags.items.as_ref().expect("object constructor");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, hcl::Expression::String("zone".to_string()));
        assert_eq!(items[0].value_source, "data.upstream.zone");
        assert_eq!(items[1].key_source, "\"env\"");
        assert_eq!(items[1].value_range.start.line, 14);
    }

    #[test]
    fn parse_error_is_diagnostic() {
        let diagnostic = parse("broken.tf", "not = valid = hcl").expect_err("invalid");
        assert!(diagnostic.is_error());
        assert!(diagnostic.detail.starts_with("broken.tf:"));
    }

    #[test]
    fn parse_error_points_at_the_error() {
        let contents = "locals {\n  a = 1\n  b = = 2\n}\n";
        let diagnostic = parse("broken.tf", contents).expect_err("invalid");

        let subject = diagnostic.subject.expect("parse errors have a subject");
        assert_eq!(subject.filename, "broken.tf");
        assert_eq!(subject.start.line, 3);
        assert!(subject.start.byte >= contents.find("b =").expect("b is declared"));
    }
}
