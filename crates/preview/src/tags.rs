//! workspace tags
use crate::diagnostics::SourceRange;
use crate::value::Value;
use crate::valued::Valued;
use indexmap::IndexMap;
use serde::Serialize;

/// Block type of tag declarations (`data "coder_workspace_tags" "name" {}`)
pub const BLOCK_TYPE_WORKSPACE_TAGS: &str = "coder_workspace_tags";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub key: Valued,
    pub value: Valued,
    /// names the key and value expressions reference
    pub references: Vec<String>,
}

impl Tag {
    /// Both sides are known strings
    pub fn is_valid(&self) -> bool {
        let is_string = |side: &Valued| {
            !side.diagnostics.has_errors() && matches!(side.value, Value::String(_))
        };
        is_string(&self.key) && is_string(&self.value)
    }

    /// Key text that is safe to show, even if the key is not known
    pub fn safe_key(&self) -> String {
        match &self.key.value {
            Value::String(key) => key.clone(),
            _ => self.key.as_string(),
        }
    }
}

/// Tags of one `coder_workspace_tags` block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagBlock {
    pub tags: Vec<Tag>,
    #[serde(skip)]
    pub source: Option<SourceRange>,
}

impl TagBlock {
    pub fn valid_tags(&self) -> IndexMap<String, String> {
        self.tags
            .iter()
            .filter(|tag| tag.is_valid())
            .map(|tag| (tag.key.as_string(), tag.value.as_string()))
            .collect()
    }

    pub fn invalid_tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter().filter(|tag| !tag.is_valid())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct TagBlocks(pub Vec<TagBlock>);

impl TagBlocks {
    /// Usable tags of all blocks, later blocks override earlier ones
    pub fn valid_tags(&self) -> IndexMap<String, String> {
        let mut tags = IndexMap::new();
        for block in &self.0 {
            tags.extend(block.valid_tags());
        }
        tags
    }

    pub fn invalid_tags(&self) -> Vec<Tag> {
        self.0
            .iter()
            .flat_map(TagBlock::invalid_tags)
            .cloned()
            .collect()
    }

    /// Keys of the tags that cannot be used
    pub fn invalid_names(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(TagBlock::invalid_tags)
            .map(Tag::safe_key)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::ValueType;
    use pretty_assertions::assert_eq;

    fn tag(key: Valued, value: Valued) -> Tag {
        Tag {
            key,
            value,
            references: vec![],
        }
    }

    #[test]
    fn only_known_strings_are_valid() {
        assert!(tag(Valued::literal("zone"), Valued::literal("a")).is_valid());
        assert!(!tag(Valued::literal("zone"), Valued::new(Value::from(1))).is_valid());
        assert!(!tag(
            Valued::literal("zone"),
            Valued::new(Value::Unknown(ValueType::String))
        )
        .is_valid());
    }

    #[test]
    fn later_blocks_win() {
        let blocks = TagBlocks(vec![
            TagBlock {
                tags: vec![
                    tag(Valued::literal("zone"), Valued::literal("a")),
                    tag(Valued::literal("size"), Valued::new(Value::from(3))),
                ],
                source: None,
            },
            TagBlock {
                tags: vec![tag(Valued::literal("zone"), Valued::literal("b"))],
                source: None,
            },
        ]);

        assert_eq!(
            blocks.valid_tags(),
            IndexMap::from([("zone".to_string(), "b".to_string())])
        );
        assert_eq!(blocks.invalid_names(), vec!["size".to_string()]);
    }

    #[test]
    fn unknown_key_uses_source_text() {
        let unknown = tag(
            Valued::new(Value::unknown()).with_source("var.key"),
            Valued::literal("a"),
        );
        assert_eq!(unknown.safe_key(), "var.key");
    }
}
