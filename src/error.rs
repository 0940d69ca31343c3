use std::{
    io,
    path::{Path, PathBuf},
};

pub type Result<T, E = IndexerError> = std::result::Result<T, E>;

/// Various error types
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// The given directory is not inside a git work tree.
    #[error("\"{0}\" is not inside a git repository")]
    NotARepo(PathBuf),
    /// The repository exists but `HEAD` points at no commit yet.
    #[error("repository has no commits")]
    NoCommit,
    #[error("git exited with {status}: {stderr}")]
    Git {
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("invalid config: {0}")]
    Config(String),
    /// Two tracked files derive the same dotted module name.
    #[error("module name \"{name}\" maps to both \"{first}\" and \"{second}\"")]
    DuplicateModule {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("no manifest for commit {0}")]
    ManifestNotFound(String),
    #[error("blob {0} not found in object store")]
    BlobNotFound(String),
    #[error("blob {digest} is corrupt: content hashes to {actual}")]
    CorruptBlob { digest: String, actual: String },
    /// Internal bookkeeping violation; always a bug, never task-induced.
    #[error("scheduler invariant violated: {0}")]
    Scheduler(String),
    #[error("{0}")]
    Message(String),
}

impl IndexerError {
    pub fn io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        IoError::new(err, path).into()
    }

    pub fn msg(msg: impl std::fmt::Display) -> Self {
        IndexerError::Message(msg.to_string())
    }
}

/// An `io::Error` together with the path on which it occurred.
#[derive(Debug, thiserror::Error)]
#[error("\"{}\": {}", .path.display(), .source)]
pub struct IoError {
    source: io::Error,
    path: PathBuf,
}

impl IoError {
    pub fn new(source: io::Error, path: impl Into<PathBuf>) -> Self {
        Self { source, path: path.into() }
    }

    /// The path that produced the error.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl From<IoError> for io::Error {
    fn from(err: IoError) -> Self {
        err.source
    }
}
