//! Data model shared by the store, the normalizer and the query engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declaration category, closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Function,
    Class,
    Struct,
    Enum,
    Member,
    Macro,
    Prototype,
    Other,
}

impl DeclarationKind {
    /// Map a tag-tool kind name; anything unrecognized becomes `Other`
    pub fn from_tag_kind(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "function" | "func" | "method" | "f" => DeclarationKind::Function,
            "class" | "interface" | "c" => DeclarationKind::Class,
            "struct" | "union" | "s" | "u" => DeclarationKind::Struct,
            "enum" | "g" => DeclarationKind::Enum,
            "member" | "field" | "m" => DeclarationKind::Member,
            "macro" | "define" | "d" => DeclarationKind::Macro,
            "prototype" | "p" => DeclarationKind::Prototype,
            _ => DeclarationKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::Function => "function",
            DeclarationKind::Class => "class",
            DeclarationKind::Struct => "struct",
            DeclarationKind::Enum => "enum",
            DeclarationKind::Member => "member",
            DeclarationKind::Macro => "macro",
            DeclarationKind::Prototype => "prototype",
            DeclarationKind::Other => "other",
        }
    }

    /// Parse the stored column value
    pub fn parse(s: &str) -> Self {
        match s {
            "function" => DeclarationKind::Function,
            "class" => DeclarationKind::Class,
            "struct" => DeclarationKind::Struct,
            "enum" => DeclarationKind::Enum,
            "member" => DeclarationKind::Member,
            "macro" => DeclarationKind::Macro,
            "prototype" => DeclarationKind::Prototype,
            _ => DeclarationKind::Other,
        }
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One indexed symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub group: String,
    pub name: String,
    pub kind: DeclarationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// How a group's tag source came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Produced by running the tag tool over a directory
    Generated,
    /// A pre-built tag file dropped into the tag-source directory
    Imported,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Generated => "generated",
            SourceKind::Imported => "imported",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "generated" {
            SourceKind::Generated
        } else {
            SourceKind::Imported
        }
    }
}

/// Group row plus its derived declaration count
#[derive(Debug, Clone, Serialize)]
pub struct GroupInfo {
    pub name: String,
    pub source_kind: SourceKind,
    pub fingerprint: Option<String>,
    pub declaration_count: usize,
    pub indexed_at: String,
}

/// One page of an ordered result
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Size of the full result the page was cut from
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    pub fn empty(offset: usize, limit: usize) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            offset,
            limit,
        }
    }

    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(DeclarationKind::from_tag_kind("function"), DeclarationKind::Function);
        assert_eq!(DeclarationKind::from_tag_kind("Prototype"), DeclarationKind::Prototype);
        assert_eq!(DeclarationKind::from_tag_kind("macro"), DeclarationKind::Macro);
        assert_eq!(DeclarationKind::from_tag_kind("typedef"), DeclarationKind::Other);
        assert_eq!(DeclarationKind::from_tag_kind(""), DeclarationKind::Other);
    }

    #[test]
    fn test_kind_column_round_trip() {
        for kind in [
            DeclarationKind::Function,
            DeclarationKind::Class,
            DeclarationKind::Struct,
            DeclarationKind::Enum,
            DeclarationKind::Member,
            DeclarationKind::Macro,
            DeclarationKind::Prototype,
            DeclarationKind::Other,
        ] {
            assert_eq!(DeclarationKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_page_has_more() {
        let page = Page {
            items: vec![1, 2],
            total: 5,
            offset: 2,
            limit: 2,
        };
        assert!(page.has_more());
        assert!(!Page::<u8>::empty(10, 10).has_more());
    }
}
