#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod config;
pub use config::Config;

pub mod error;
pub use error::{IndexerError, Result};

pub mod resolver;
pub use resolver::{CompId, CondensedGraph, Graph, SourceLanguage};

pub mod scheduler;
pub use scheduler::{
    AsyncIndexTask, CancelToken, FailurePolicy, IndexTask, RunOptions, RunReport, Scheduler,
    TaskDispatch,
};

pub mod store;
pub use store::{ContentStore, Manifest, Retriever};

pub mod utils;

pub mod vcs;
pub use vcs::GitRepo;

use crate::{
    resolver::module_name,
    scheduler::ComponentResult,
    store::{Digest, ERROR_SENTINEL},
};
use std::path::{Path, PathBuf};

/// Drives the probe → resolve → schedule → persist pipeline for one repository.
///
/// An indexer is cheap to construct: all graph state lives in the run, is created when
/// [`Self::index`] starts and discarded when it returns. Only blobs, manifests and the config
/// survive a run.
#[derive(Clone, Debug)]
pub struct Indexer {
    repo: GitRepo,
    /// The `.mlgit` configuration; a successful run writes the indexed commit and branch back.
    pub config: Config,
    /// Source-language knobs for discovery and module naming.
    pub language: SourceLanguage,
    /// Scheduling options applied to every run.
    pub options: RunOptions,
}

impl Indexer {
    /// Convenience function to call [`IndexerBuilder::open`] with defaults.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        IndexerBuilder::default().open(dir)
    }

    pub fn builder() -> IndexerBuilder {
        IndexerBuilder::default()
    }

    pub fn root(&self) -> &Path {
        self.repo.root()
    }

    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }

    /// Resolves the condensed dependency graph over the tracked sources.
    pub fn resolve_graph(&self) -> Result<CondensedGraph> {
        let files = self.repo.tracked_files(&self.language)?;
        Ok(Graph::resolve(files, self.repo.root(), &self.language)?.condense())
    }

    /// Runs one full index pass: probes the repository, resolves the graph, schedules the task
    /// over every component and persists the results.
    ///
    /// The worker cap comes from [`RunOptions::max_workers`] when set, otherwise from the config
    /// key matching the dispatch flavor. Cancelled runs return their partial results but write no
    /// manifest.
    pub fn index(&mut self, dispatch: TaskDispatch) -> Result<IndexOutcome> {
        self.config.validate()?;
        let commit = self.repo.commit_id()?;
        let branch = self.repo.branch()?;
        debug!("indexing \"{}\" at {commit} ({branch})", self.root().display());

        let graph = self.resolve_graph()?;

        let mut options = self.options.clone();
        if options.max_workers.is_none() {
            options.max_workers = match &dispatch {
                TaskDispatch::Parallel(_) => self.config.scheduler.static_workers,
                TaskDispatch::Cooperative(_) => Some(self.config.scheduler.dynamic_workers),
            };
        }
        let report = Scheduler::new(&graph).run(dispatch, &options)?;

        let manifest = if report.cancelled {
            debug!("run cancelled, skipping persistence for {commit}");
            None
        } else {
            Some(self.persist(&commit, &branch, &report)?)
        };

        Ok(IndexOutcome {
            succeeded: report.completed(),
            failed: report.failed_count(),
            cancelled: report.cancelled,
            commit,
            branch,
            manifest,
            report,
        })
    }

    /// Writes blobs and the per-commit manifest, records the commit in the config, then runs the
    /// configured housekeeping. The manifest lands before pruning so its blobs are protected.
    fn persist(&mut self, commit: &str, branch: &str, report: &RunReport) -> Result<PathBuf> {
        let store = ContentStore::from_config(&self.config, self.repo.root())?;

        let mut manifest = Manifest::default();
        for result in &report.results {
            for blob in &result.blobs {
                let (name, digest) = self.store_blob(&store, result, blob)?;
                manifest.modules.insert(name, digest);
            }
        }
        for failure in &report.failed {
            let message = failure.kind.to_string();
            for file in &failure.files {
                let name = self.manifest_name(file)?;
                manifest.modules.insert(name.clone(), ERROR_SENTINEL.to_string());
                manifest.errors.insert(name, message.clone());
            }
        }

        store.commit_manifest(commit, &manifest)?;

        self.config.repo.commit = Some(commit.to_string());
        self.config.repo.branch = Some(branch.to_string());
        self.config.save(self.repo.root())?;

        if self.config.housekeeping.prune_unreferenced {
            store.prune()?;
        }
        if let Some(keep) = self.config.housekeeping.keep_last_manifests {
            store.trim(keep)?;
        }
        Ok(store.manifest_path(commit))
    }

    fn store_blob(
        &self,
        store: &ContentStore,
        result: &ComponentResult,
        blob: &serde_json::Value,
    ) -> Result<(String, Digest)> {
        let module_field =
            blob.get("module").and_then(|value| value.as_str()).ok_or_else(|| {
                IndexerError::msg(format!(
                    "task result for {} is missing the \"module\" field",
                    result.comp
                ))
            })?;
        let name = self.manifest_name(Path::new(module_field))?;
        let digest = store.put(blob)?;
        Ok((name, digest))
    }

    fn manifest_name(&self, file: &Path) -> Result<String> {
        module_name(file, self.repo.root(), &self.language).ok_or_else(|| {
            IndexerError::msg(format!(
                "\"{}\" is not a module under \"{}\"",
                file.display(),
                self.root().display()
            ))
        })
    }
}

/// Builder for [`Indexer`] with config, language and scheduling overrides.
#[derive(Clone, Debug, Default)]
pub struct IndexerBuilder {
    config: Option<Config>,
    language: Option<SourceLanguage>,
    options: Option<RunOptions>,
}

impl IndexerBuilder {
    /// Uses the given config instead of reading `.mlgit/config.json`.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn language(mut self, language: SourceLanguage) -> Self {
        self.language = Some(language);
        self
    }

    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Discovers the repository containing `dir` and assembles the indexer.
    pub fn open(self, dir: impl AsRef<Path>) -> Result<Indexer> {
        let repo = GitRepo::discover(dir)?;
        let config = match self.config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => Config::load_or_default(repo.root())?,
        };
        Ok(Indexer {
            repo,
            config,
            language: self.language.unwrap_or_default(),
            options: self.options.unwrap_or_default(),
        })
    }
}

/// Summary of one index pass.
#[derive(Clone, Debug)]
pub struct IndexOutcome {
    pub commit: String,
    pub branch: String,
    /// Components whose task completed.
    pub succeeded: usize,
    /// Components that failed, including those tainted by a failed provider.
    pub failed: usize,
    pub cancelled: bool,
    /// Path of the manifest written for the commit; `None` for cancelled runs.
    pub manifest: Option<PathBuf>,
    /// The full per-component report.
    pub report: RunReport,
}
