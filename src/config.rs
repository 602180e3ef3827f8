//! Runtime configuration, read from `config.toml`
//!
//! Lookup order: an explicit path, else `<data_dir>/config.toml` when it
//! exists, else built-in defaults. Every key is optional.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discovery::DEFAULT_SKIP_DIRS;
use crate::paths;
use crate::query::DEFAULT_MAX_PAGE_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the index and tag sources live
    #[serde(default = "paths::default_data_dir")]
    pub data_dir: PathBuf,
    /// Tag tool binary, a name on PATH or a path
    #[serde(default = "default_ctags_bin")]
    pub ctags_bin: String,
    /// Kill extractions running longer than this; 0 disables
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
    /// Directory names never descended into by `generate`
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,
    /// Hard cap on any page size
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_ctags_bin() -> String {
    "ctags".to_string()
}
fn default_extract_timeout_secs() -> u64 {
    300
}
fn default_skip_dirs() -> Vec<String> {
    DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect()
}
fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: paths::default_data_dir(),
            ctags_bin: default_ctags_bin(),
            extract_timeout_secs: default_extract_timeout_secs(),
            skip_dirs: default_skip_dirs(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Config {
    /// Defaults rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Resolve configuration; `explicit` must exist when given
    ///
    /// `data_dir` overrides both the file and the environment, and is also
    /// where the implicit `config.toml` is looked up.
    pub fn load(explicit: Option<&Path>, data_dir: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let dir = data_dir
                    .map(Path::to_path_buf)
                    .unwrap_or_else(paths::default_data_dir);
                let candidate = paths::config_path(&paths::expand_home(&dir));
                candidate.exists().then_some(candidate)
            }
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        if let Some(dir) = data_dir {
            config.data_dir = dir.to_path_buf();
        }
        config.data_dir = paths::expand_home(&config.data_dir);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn index_db(&self) -> PathBuf {
        paths::index_db(&self.data_dir)
    }

    pub fn apis_dir(&self) -> PathBuf {
        paths::apis_dir(&self.data_dir)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "data_dir = \"/var/lib/lookup\"\nctags_bin = \"/opt/uctags/bin/ctags\"\nmax_page_size = 50\n",
        )?;

        let config = Config::load(Some(&path), None)?;
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/lookup"));
        assert_eq!(config.ctags_bin, "/opt/uctags/bin/ctags");
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.extract_timeout_secs, 300);
        assert!(config.skip_dirs.iter().any(|d| d == "node_modules"));
        assert_eq!(config.index_db(), PathBuf::from("/var/lib/lookup/index.db"));
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/api-lookup.toml")), None);
        assert!(err.is_err());
    }

    #[test]
    fn test_data_dir_override_finds_its_config() -> Result<()> {
        let temp = TempDir::new()?;
        fs::write(paths::config_path(temp.path()), "extract_timeout_secs = 0\n")?;

        let config = Config::load(None, Some(temp.path()))?;
        assert_eq!(config.data_dir, temp.path());
        assert!(config.extract_timeout().is_zero());
        Ok(())
    }

    #[test]
    fn test_bad_toml_is_an_error() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_page_size = \"lots\"")?;
        assert!(Config::from_file(&path).is_err());
        Ok(())
    }
}
