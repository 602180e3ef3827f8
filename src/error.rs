//! Error taxonomy for indexing and lookups
//!
//! Normalization problems never show up here: they are counted per run
//! (see `tags::normalize::NormalizeStats`). Everything in this enum is
//! surfaced verbatim to the immediate caller.

use std::path::PathBuf;

pub type Result<T, E = IndexError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Tag tool binary could not be located or started
    #[error("tag tool '{tool}' is unavailable: {reason}. Install Universal Ctags (e.g. 'brew install universal-ctags')")]
    ExternalToolUnavailable { tool: String, reason: String },

    /// Tag tool ran but reported failure
    #[error("tag tool exited with {}: {stderr}", exit_label(.code))]
    ExternalToolError { code: Option<i32>, stderr: String },

    /// Zero tags from a non-empty file set
    #[error("tag tool produced no declarations for {} candidate files under {}", .files, .root.display())]
    EmptyResult { root: PathBuf, files: usize },

    /// Extraction was cancelled or timed out; the prior index stays authoritative
    #[error("extraction abandoned: {0}")]
    ExtractionAbandoned(String),

    #[error("'{}' is not a directory", .0.display())]
    InvalidDirectory(PathBuf),

    /// Tag source could not be parsed at all
    #[error("failed to parse tag source {}: {reason}", .path.display())]
    SourceParse { path: PathBuf, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "a signal".to_string(),
    }
}

impl IndexError {
    /// Failures that leave the previous index in place and need an explicit re-trigger
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            IndexError::ExternalToolUnavailable { .. }
                | IndexError::ExternalToolError { .. }
                | IndexError::ExtractionAbandoned(_)
        )
    }
}
