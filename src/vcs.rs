//! Probing of the git repository that is being indexed.
//!
//! File discovery is driven entirely by `git ls-tree` over `HEAD`; the indexer never walks the
//! filesystem, so untracked and ignored files can not leak into the graph.

use crate::{
    error::{IndexerError, Result},
    resolver::SourceLanguage,
    utils,
};
use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

/// Handle on the work tree of the repository being indexed.
#[derive(Clone, Debug)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Locates the top-level work tree containing `dir`.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let top = git(dir, &["rev-parse", "--show-toplevel"])
            .map_err(|_| IndexerError::NotARepo(dir.to_path_buf()))?;
        let root = utils::canonicalize(top)?;
        trace!("discovered git work tree at \"{}\"", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full hex id of `HEAD`.
    pub fn commit_id(&self) -> Result<String> {
        head_query(&self.root, &["rev-parse", "HEAD"])
    }

    /// Name of the currently checked out branch.
    pub fn branch(&self) -> Result<String> {
        head_query(&self.root, &["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// All files tracked at `HEAD` that match the language's suffix set, as absolute paths,
    /// deduplicated and sorted.
    pub fn tracked_files(&self, language: &SourceLanguage) -> Result<Vec<PathBuf>> {
        let listing = head_query(&self.root, &["ls-tree", "-r", "--name-only", "HEAD"])?;
        let mut files: Vec<PathBuf> = listing
            .lines()
            .filter(|line| language.matches(line))
            .map(|line| self.root.join(line))
            .collect();
        files.sort();
        files.dedup();
        trace!("{} tracked source files at HEAD", files.len());
        Ok(files)
    }
}

/// Runs a query that requires `HEAD` to exist, mapping failure to [`IndexerError::NoCommit`].
fn head_query(root: &Path, args: &[&str]) -> Result<String> {
    git(root, args).map_err(|err| match err {
        IndexerError::Git { .. } => IndexerError::NoCommit,
        other => other,
    })
}

fn git(cwd: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|err| IndexerError::io(err, cwd))?;
    if !output.status.success() {
        return Err(IndexerError::Git {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    String::from_utf8(output.stdout)
        .map(|out| out.trim().to_string())
        .map_err(|_| IndexerError::msg("invalid UTF-8 in git output"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &Path) {
        run_git(dir, &["init", "-q", "-b", "main"]);
        run_git(dir, &["config", "user.email", "test@test"]);
        run_git(dir, &["config", "user.name", "test"]);
    }

    #[test]
    fn discover_rejects_plain_dir() {
        let dir = tempfile::tempdir().unwrap();
        match GitRepo::discover(dir.path()) {
            Err(IndexerError::NotARepo(_)) => {}
            other => panic!("expected NotARepo, got {other:?}"),
        }
    }

    #[test]
    fn empty_repo_has_no_commit() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let repo = GitRepo::discover(dir.path()).unwrap();
        match repo.commit_id() {
            Err(IndexerError::NoCommit) => {}
            other => panic!("expected NoCommit, got {other:?}"),
        }
    }

    #[test]
    fn lists_only_tracked_source_files() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/mod.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "no\n").unwrap();
        std::fs::write(dir.path().join("untracked.py"), "y = 2\n").unwrap();
        run_git(dir.path(), &["add", "pkg/mod.py", "notes.txt"]);
        run_git(dir.path(), &["commit", "-q", "-m", "init"]);

        let repo = GitRepo::discover(dir.path()).unwrap();
        let files = repo.tracked_files(&SourceLanguage::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("pkg/mod.py"));

        assert_eq!(repo.branch().unwrap(), "main");
        assert_eq!(repo.commit_id().unwrap().len(), 40);
    }
}
