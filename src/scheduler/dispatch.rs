//! Uniform submit/await surface over the two worker-pool flavors.
//!
//! The scheduler core is agnostic to how a task actually runs: it submits the files of one
//! component and later collects a completion, in any order. CPU-bound tasks go to a rayon pool
//! sized by the worker cap; I/O-bound tasks go to a single-threaded tokio runtime that keeps many
//! requests in flight and suspends only at await points. Both flavors deliver completions over one
//! channel the scheduler blocks on, and both convert worker panics into ordinary task errors so a
//! misbehaving task can never take the run down.

use crate::{
    error::{IndexerError, Result},
    resolver::CompId,
};
use futures_util::FutureExt;
use serde_json::Value;
use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{mpsc, Arc},
    time::Duration,
};

/// Error raised by a task; scoped to the component the task ran for.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TaskError(String);

impl TaskError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// What a task hands back for its component: one result blob per file, each carrying a `module`
/// field naming the file it describes.
pub type TaskOutput = std::result::Result<Vec<Value>, TaskError>;

/// A CPU-bound index task, executed on the parallel worker pool.
///
/// Implementations receive the files of one component and must be side-effect-free with respect
/// to scheduler state.
pub trait IndexTask: Send + Sync + 'static {
    fn run(&self, files: &[PathBuf]) -> TaskOutput;
}

/// An I/O-bound index task, executed on the cooperative executor.
pub trait AsyncIndexTask: Send + Sync + 'static {
    fn run(&self, files: Vec<PathBuf>) -> futures_util::future::BoxFuture<'static, TaskOutput>;
}

/// Selects the task function and the worker-pool flavor for a run.
#[derive(Clone)]
pub enum TaskDispatch {
    /// True parallelism across cores, for parse/index style work.
    Parallel(Arc<dyn IndexTask>),
    /// Many in-flight requests on a cooperative executor, for work dominated by network I/O.
    Cooperative(Arc<dyn AsyncIndexTask>),
}

impl fmt::Debug for TaskDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskDispatch::Parallel(_) => f.write_str("TaskDispatch::Parallel"),
            TaskDispatch::Cooperative(_) => f.write_str("TaskDispatch::Cooperative"),
        }
    }
}

/// A completion delivered by [`WorkerPool::wait_any`].
pub(crate) struct Completion {
    pub comp: CompId,
    pub output: TaskOutput,
}

/// Executor for one run; owns the flavor-specific backend and the completion channel.
pub(crate) struct WorkerPool {
    backend: Backend,
    tx: mpsc::Sender<Completion>,
    rx: mpsc::Receiver<Completion>,
}

enum Backend {
    Parallel { pool: rayon::ThreadPool, task: Arc<dyn IndexTask> },
    Cooperative { rt: tokio::runtime::Runtime, task: Arc<dyn AsyncIndexTask> },
}

impl WorkerPool {
    pub(crate) fn new(dispatch: TaskDispatch, max_workers: usize) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let backend = match dispatch {
            TaskDispatch::Parallel(task) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(max_workers)
                    .build()
                    .map_err(|err| IndexerError::msg(format!("failed to build worker pool: {err}")))?;
                Backend::Parallel { pool, task }
            }
            TaskDispatch::Cooperative(task) => {
                // a single worker thread drives all in-flight futures; the in-flight cap is
                // enforced by the scheduler, not the executor
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .enable_all()
                    .build()
                    .map_err(|err| IndexerError::msg(format!("failed to build executor: {err}")))?;
                Backend::Cooperative { rt, task }
            }
        };
        Ok(Self { backend, tx, rx })
    }

    /// Submits the files of `comp`; the completion arrives via [`Self::wait_any`].
    pub(crate) fn submit(&self, comp: CompId, files: Vec<PathBuf>) {
        let tx = self.tx.clone();
        match &self.backend {
            Backend::Parallel { pool, task } => {
                let task = Arc::clone(task);
                pool.spawn(move || {
                    let output = panic::catch_unwind(AssertUnwindSafe(|| task.run(&files)))
                        .unwrap_or_else(|panic| Err(TaskError::new(panic_message(&*panic))));
                    // the receiver is gone only when the run already ended
                    let _ = tx.send(Completion { comp, output });
                });
            }
            Backend::Cooperative { rt, task } => {
                let fut = task.run(files);
                rt.spawn(async move {
                    let output = AssertUnwindSafe(fut)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(TaskError::new(panic_message(&*panic))));
                    let _ = tx.send(Completion { comp, output });
                });
            }
        }
    }

    /// Blocks until any in-flight task completes, or the timeout elapses (`Ok(None)`).
    ///
    /// Must only be called with at least one task in flight; the channel can never disconnect
    /// while `self` holds a sender.
    pub(crate) fn wait_any(&self, timeout: Duration) -> Result<Option<Completion>> {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => Ok(Some(completion)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(IndexerError::Scheduler("completion channel closed with tasks in flight".into()))
            }
        }
    }
}

fn panic_message(panic: &dyn Any) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("task panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("task panicked: {msg}")
    } else {
        "task panicked".to_string()
    }
}
