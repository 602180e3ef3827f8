//! Record normalizer: raw tag records -> canonical `Declaration`s
//!
//! Pure transforms. A record that can't be normalized is a rejection that
//! gets counted, never an error for the caller of ingestion.

use log::debug;
use std::collections::BTreeMap;
use std::path::{Component, Path};

use super::{parse_line, RawTag, TagLine};
use crate::store::types::{Declaration, DeclarationKind};

/// Extension -> language fallback when the tool omits the language field
const LANGUAGE_EXTENSIONS: &[(&str, &[&str])] = &[
    ("C", &["c", "h"]),
    ("C++", &["cpp", "cc", "cxx", "hpp", "hxx", "hh"]),
    ("Rust", &["rs"]),
    ("Go", &["go"]),
    ("Python", &["py", "pyi"]),
    ("JavaScript", &["js", "jsx", "mjs"]),
    ("TypeScript", &["ts", "tsx"]),
    ("Java", &["java"]),
    ("ObjectiveC", &["m", "mm"]),
    ("Swift", &["swift"]),
    ("Kotlin", &["kt", "kts"]),
];

/// Why a record was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingName,
    MissingPath,
}

/// Per-run normalization counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Tag records seen (pseudo-tags and blank lines excluded)
    pub records: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Accepted records collapsed into an existing location
    pub duplicates: usize,
}

/// Converts raw records for one group
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    group: &'a str,
    root: Option<&'a Path>,
}

impl<'a> Normalizer<'a> {
    /// `root` is the directory the tool ran in, when known
    pub fn new(group: &'a str, root: Option<&'a Path>) -> Self {
        Self { group, root }
    }

    pub fn normalize(&self, tag: RawTag) -> Result<Declaration, Rejection> {
        let name = tag.name.trim();
        if name.is_empty() {
            return Err(Rejection::MissingName);
        }

        let file_path = normalize_path(&tag.path, self.group, self.root);
        if file_path.is_empty() {
            return Err(Rejection::MissingPath);
        }

        let return_type = tag.typeref.as_deref().and_then(return_type);
        let signature = compose_signature(name, return_type.as_deref(), &tag);
        let language = tag
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .or_else(|| detect_language(&file_path).map(String::from));

        Ok(Declaration {
            group: self.group.to_string(),
            name: name.to_string(),
            kind: DeclarationKind::from_tag_kind(tag.kind.as_deref().unwrap_or("")),
            signature,
            return_type,
            scope: tag.scope.filter(|s| !s.trim().is_empty()),
            file_path,
            line: tag
                .line
                .filter(|l| *l >= 1)
                .and_then(|l| u32::try_from(l).ok()),
            language,
        })
    }
}

/// Declarations of one group, unique by (name, file_path, line)
#[derive(Debug, Default)]
pub struct DeclarationSet {
    entries: BTreeMap<(String, String, Option<u32>), Declaration>,
}

impl DeclarationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the location was already present
    pub fn insert(&mut self, decl: Declaration) -> bool {
        let key = (decl.name.clone(), decl.file_path.clone(), decl.line);
        match self.entries.get_mut(&key) {
            Some(existing) => {
                if richness(&decl) > richness(existing) {
                    *existing = decl;
                }
                false
            }
            None => {
                self.entries.insert(key, decl);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Declaration> {
        self.entries.into_values().collect()
    }
}

fn richness(decl: &Declaration) -> (bool, usize) {
    let sig = decl.signature.as_deref().unwrap_or("");
    (!sig.is_empty(), sig.len())
}

/// Line-oriented ingestion: parse, normalize, collapse
pub struct Ingest<'a> {
    normalizer: Normalizer<'a>,
    set: DeclarationSet,
    stats: NormalizeStats,
    lines: usize,
}

impl<'a> Ingest<'a> {
    pub fn new(normalizer: Normalizer<'a>) -> Self {
        Self {
            normalizer,
            set: DeclarationSet::new(),
            stats: NormalizeStats::default(),
            lines: 0,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        self.push_record(parse_line(line));
    }

    /// Feed one already-parsed line
    pub fn push_record(&mut self, record: std::result::Result<TagLine, serde_json::Error>) {
        self.lines += 1;
        match record {
            Ok(TagLine::Tag(tag)) => self.push_tag(tag),
            Ok(TagLine::Meta) | Ok(TagLine::Blank) => {}
            Err(e) => {
                debug!("Rejected malformed tag line {}: {}", self.lines, e);
                self.stats.records += 1;
                self.stats.rejected += 1;
            }
        }
    }

    pub fn push_tag(&mut self, tag: RawTag) {
        self.stats.records += 1;
        match self.normalizer.normalize(tag) {
            Ok(decl) => {
                self.stats.accepted += 1;
                if !self.set.insert(decl) {
                    self.stats.duplicates += 1;
                }
            }
            Err(reason) => {
                debug!("Rejected tag record at line {}: {:?}", self.lines, reason);
                self.stats.rejected += 1;
            }
        }
    }

    pub fn stats(&self) -> NormalizeStats {
        self.stats
    }

    pub fn finish(self) -> (Vec<Declaration>, NormalizeStats) {
        (self.set.into_vec(), self.stats)
    }
}

/// Forward-slash path relative to the group's root
pub fn normalize_path(raw: &str, group: &str, root: Option<&Path>) -> String {
    let unified = raw.trim().replace('\\', "/");
    if unified.is_empty() {
        return String::new();
    }

    let path = Path::new(&unified);
    if path.is_absolute() {
        if let Some(stripped) = root.and_then(|r| path.strip_prefix(r).ok()) {
            return components_to_string(stripped.components());
        }
        // No known root: anchor on the directory named like the group, else keep as-is
        return relative_to_group_dir(path, group).unwrap_or_else(|| {
            debug!("No '{}' directory in {}; storing absolute path", group, unified);
            unified
        });
    }

    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    if trimmed.starts_with("../") {
        debug!("Path {} escapes the root of '{}'", trimmed, group);
    }
    trimmed.to_string()
}

/// Components after the outermost ancestor directory named like the group
fn relative_to_group_dir(path: &Path, group: &str) -> Option<String> {
    let components: Vec<Component> = path.components().collect();
    let idx = components
        .iter()
        .position(|c| matches!(c, Component::Normal(n) if n.to_str() == Some(group)))?;
    let rest = &components[idx + 1..];
    if rest.is_empty() {
        return None;
    }
    Some(components_to_string(rest.iter().copied()))
}

fn components_to_string<'p>(components: impl Iterator<Item = Component<'p>>) -> String {
    components
        .filter_map(|c| match c {
            Component::Normal(n) => Some(n.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn return_type(typeref: &str) -> Option<String> {
    let typeref = typeref.trim();
    let value = match typeref.strip_prefix("typename:") {
        Some(rest) => rest.to_string(),
        None => typeref.replacen(':', " ", 1),
    };
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn compose_signature(name: &str, return_type: Option<&str>, tag: &RawTag) -> Option<String> {
    if let Some(params) = tag.signature.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return Some(match return_type {
            Some(ret) => format!("{} {}{}", ret, name, params),
            None => format!("{}{}", name, params),
        });
    }
    tag.pattern.as_deref().and_then(pattern_text)
}

/// Search pattern without its `/^ ... $/` delimiters
fn pattern_text(pattern: &str) -> Option<String> {
    let p = pattern.trim();
    let p = p.strip_prefix('/')?;
    let p = p.strip_prefix('^').unwrap_or(p);
    let p = p.strip_suffix('/').unwrap_or(p);
    let p = p.strip_suffix('$').unwrap_or(p);
    let text = p.replace("\\/", "/").replace("\\\\", "\\");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Detect language from file extension
pub fn detect_language(file: &str) -> Option<&'static str> {
    let extension = Path::new(file).extension()?.to_str()?;
    LANGUAGE_EXTENSIONS
        .iter()
        .find(|(_, exts)| exts.contains(&extension))
        .map(|(lang, _)| *lang)
}
