//! Tag tool wire contract
//!
//! The tag tool emits one JSON object per line (Universal Ctags
//! `--output-format=json`). Only the fields the index uses are modeled;
//! unknown fields are ignored so newer tool versions keep parsing.

pub mod extractor;
pub mod normalize;

use serde::Deserialize;

/// One tag record as reported by the tool
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RawTag {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub line: Option<u64>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub typeref: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Classified output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagLine {
    Tag(RawTag),
    /// Pseudo-tags and other non-tag records
    Meta,
    Blank,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "_type")]
    record_type: Option<String>,
    #[serde(flatten)]
    tag: RawTag,
}

/// Parse one line of tool output
pub fn parse_line(line: &str) -> Result<TagLine, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(TagLine::Blank);
    }

    let envelope: Envelope = serde_json::from_str(trimmed)?;
    match envelope.record_type.as_deref() {
        Some("tag") => Ok(TagLine::Tag(envelope.tag)),
        _ => Ok(TagLine::Meta),
    }
}
