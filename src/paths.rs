//! On-disk layout of an api-lookup data directory.
//!
//! This module only says WHERE things live. No I/O, no validation.
//!
//! ```text
//! <data_dir>/                  # $API_LOOKUP_HOME, default ./.api-lookup
//! ├── config.toml              # Optional settings
//! ├── index.db                 # SQLite store (+ -wal / -shm)
//! └── apis/                    # Tag sources, system of record
//!     ├── sdl.ctags            # One JSON-lines tag file per group
//!     └── zlib.ctags
//! ```

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "API_LOOKUP_HOME";

/// Data directory used when neither the environment nor config names one
pub const DEFAULT_DATA_DIR: &str = ".api-lookup";

/// Extension of tag-source files inside `apis/`
pub const TAG_FILE_EXTENSION: &str = "ctags";

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Data directory from the environment, else the default
pub fn default_data_dir() -> PathBuf {
    match std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        Some(dir) => expand_home(Path::new(&dir)),
        None => PathBuf::from(DEFAULT_DATA_DIR),
    }
}

/// `<data_dir>/config.toml`
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// `<data_dir>/index.db`
pub fn index_db(data_dir: &Path) -> PathBuf {
    data_dir.join("index.db")
}

/// `<data_dir>/apis/`
pub fn apis_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("apis")
}

/// `<data_dir>/apis/<group>.ctags`
pub fn tag_file(data_dir: &Path, group: &str) -> PathBuf {
    apis_dir(data_dir).join(format!("{}.{}", group, TAG_FILE_EXTENSION))
}

/// Group name of a tag-source file, if it is one
pub fn group_of_tag_file(path: &Path) -> Option<String> {
    if path.extension()?.to_str()? != TAG_FILE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    (!stem.is_empty()).then(|| stem.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let data = Path::new("/srv/lookup");
        assert_eq!(index_db(data), PathBuf::from("/srv/lookup/index.db"));
        assert_eq!(apis_dir(data), PathBuf::from("/srv/lookup/apis"));
        assert_eq!(tag_file(data, "sdl"), PathBuf::from("/srv/lookup/apis/sdl.ctags"));
        assert_eq!(config_path(data), PathBuf::from("/srv/lookup/config.toml"));
    }

    #[test]
    fn test_group_of_tag_file() {
        assert_eq!(group_of_tag_file(Path::new("apis/zlib.ctags")), Some("zlib".to_string()));
        assert_eq!(group_of_tag_file(Path::new("apis/zlib.json")), None);
        assert_eq!(group_of_tag_file(Path::new("apis/.ctags")), None);
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home(Path::new("/abs/dir")), PathBuf::from("/abs/dir"));
        assert_eq!(expand_home(Path::new("rel/dir")), PathBuf::from("rel/dir"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/x")), home.join("x"));
        }
    }
}
