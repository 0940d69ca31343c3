//! Handling of the persistent `.mlgit/config.json` document.
//!
//! The config records the repository state of the last successful run, the worker counts for both
//! scheduler flavors, the storage layout and the housekeeping policy. Unsupported storage settings
//! are rejected up front so a run never starts against a store it cannot write.

use crate::{
    error::{IndexerError, Result},
    utils,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Version stamped into fresh config files.
pub const MLGIT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory holding config, objects and manifests, relative to the repo root.
pub const MLGIT_DIR: &str = ".mlgit";

/// File name of the config document inside [`MLGIT_DIR`].
pub const CONFIG_FILE: &str = "config.json";

/// The `.mlgit/config.json` document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub mlgit_version: String,
    #[serde(default)]
    pub repo: RepoConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
}

/// Repository state written back by every successful run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub commit: Option<String>,
    pub branch: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker count for the parallel flavor; `None` uses host concurrency.
    pub static_workers: Option<usize>,
    /// In-flight request cap for the cooperative-I/O flavor.
    pub dynamic_workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { static_workers: None, dynamic_workers: 8 }
    }
}

/// Model-enrichment settings; opaque to the scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { provider: "openai".to_string(), model: "gpt-4.1-mini-2025-04-14".to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Must be `"content-addressable"`.
    pub strategy: String,
    /// Must be `"sha256"`.
    pub hash_algo: String,
    /// Must be `"gzip"`.
    pub compression: String,
    /// Object tree location, relative to the repo root.
    pub objects_dir: PathBuf,
    /// Manifest location, relative to the repo root.
    pub manifests_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            strategy: "content-addressable".to_string(),
            hash_algo: "sha256".to_string(),
            compression: "gzip".to_string(),
            objects_dir: Path::new(MLGIT_DIR).join("objects"),
            manifests_dir: Path::new(MLGIT_DIR).join("manifests"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    /// Delete blobs no manifest references after a successful run.
    pub prune_unreferenced: bool,
    /// Keep only this many of the most recent manifests; `None` keeps all.
    pub keep_last_manifests: Option<usize>,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self { prune_unreferenced: false, keep_last_manifests: None }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mlgit_version: MLGIT_VERSION.to_string(),
            repo: Default::default(),
            scheduler: Default::default(),
            llm: Default::default(),
            storage: Default::default(),
            housekeeping: Default::default(),
        }
    }
}

impl Config {
    /// Path of the config file under `repo_root`.
    pub fn path(repo_root: &Path) -> PathBuf {
        repo_root.join(MLGIT_DIR).join(CONFIG_FILE)
    }

    /// Reads and validates the config file under `repo_root`.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let config: Self = utils::read_json_file(&Self::path(repo_root))?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Self::load`], but falls back to defaults when no config file exists yet.
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let path = Self::path(repo_root);
        if path.exists() {
            Self::load(repo_root)
        } else {
            trace!("no config at \"{}\", using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Writes the config file atomically, creating `.mlgit/` if needed.
    pub fn save(&self, repo_root: &Path) -> Result<()> {
        let path = Self::path(repo_root);
        utils::create_parent_dir_all(&path)?;
        utils::write_json_file(self, &path)
    }

    /// Rejects storage and scheduler settings this implementation cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.storage.strategy != "content-addressable" {
            return Err(IndexerError::Config(format!(
                "unsupported storage.strategy \"{}\"",
                self.storage.strategy
            )));
        }
        if self.storage.hash_algo != "sha256" {
            return Err(IndexerError::Config(format!(
                "unsupported storage.hash_algo \"{}\"",
                self.storage.hash_algo
            )));
        }
        if self.storage.compression != "gzip" {
            return Err(IndexerError::Config(format!(
                "unsupported storage.compression \"{}\"",
                self.storage.compression
            )));
        }
        if self.scheduler.dynamic_workers == 0 {
            return Err(IndexerError::Config("scheduler.dynamic_workers must be positive".into()));
        }
        if self.scheduler.static_workers == Some(0) {
            return Err(IndexerError::Config("scheduler.static_workers must be positive".into()));
        }
        if self.housekeeping.keep_last_manifests == Some(0) {
            return Err(IndexerError::Config(
                "housekeeping.keep_last_manifests must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Absolute object tree location.
    pub fn objects_dir(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.storage.objects_dir)
    }

    /// Absolute manifest location.
    pub fn manifests_dir(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.storage.manifests_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.repo.commit = Some("deadbeef".to_string());
        config.repo.branch = Some("main".to_string());
        config.scheduler.static_workers = Some(4);
        config.save(dir.path()).unwrap();
        assert_eq!(Config::load(dir.path()).unwrap(), config);
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_or_default(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn rejects_unsupported_storage() {
        let mut config = Config::default();
        config.storage.hash_algo = "md5".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hash_algo"), "{err}");
    }

    #[test]
    fn rejects_zero_keep_last_manifests() {
        let mut config = Config::default();
        config.housekeeping.keep_last_manifests = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::path(dir.path());
        utils::create_parent_dir_all(&path).unwrap();
        std::fs::write(&path, r#"{ "mlgit_version": "0.1.0" }"#).unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.scheduler.dynamic_workers, 8);
        assert_eq!(config.storage.strategy, "content-addressable");
    }
}
