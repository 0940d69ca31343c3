//! Dependency-aware dispatch of component index tasks.
//!
//! The scheduler drains the condensed graph produced by [`crate::resolver`] under a strict
//! producer-before-consumer ordering: a component becomes ready only once every component it
//! imports has completed, and among ready components the one with the longest critical path is
//! dispatched first, with ties broken by the smallest member path so runs are reproducible.
//!
//! All mutable scheduling state (dependency counters, the ready heap, the in-flight set) is owned
//! by the single scheduling thread. Workers receive the files of one component, run the task
//! function, and report back over a channel; they never touch scheduler state.
//!
//! A task failure is confined to its component. Under the default strict policy every consumer of
//! a failed component is transitively marked failed without being dispatched; the best-effort
//! policy instead dispatches consumers and tags their results as tainted. Cancellation (an
//! explicit token or a run deadline) stops new submissions, lets in-flight tasks finish within a
//! grace period, and returns the partial results flagged as cancelled.

use crate::{
    error::{IndexerError, Result},
    resolver::{CompId, CondensedGraph},
};
use serde_json::Value;
use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

pub mod dispatch;
pub use dispatch::{AsyncIndexTask, IndexTask, TaskDispatch, TaskError, TaskOutput};

use dispatch::{Completion, WorkerPool};

/// How long the scheduler blocks on the completion channel before re-checking cancellation and
/// the deadline.
const WAIT_TICK: Duration = Duration::from_millis(100);

/// How failures propagate to dependent components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Consumers of a failed component are marked failed without being dispatched.
    #[default]
    Strict,
    /// Consumers still run; their results carry a taint marker.
    BestEffort,
}

/// Cooperative cancellation flag shared between the caller and a running scheduler.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown; the scheduler stops submitting new work.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options for one scheduler run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// In-flight task cap; `None` uses host concurrency.
    pub max_workers: Option<usize>,
    pub failure_policy: FailurePolicy,
    /// Wall-clock budget for the whole run.
    pub deadline: Option<Duration>,
    /// How long in-flight tasks may keep running after cancellation.
    pub grace: Duration,
    pub cancel: CancelToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_workers: None,
            failure_policy: FailurePolicy::default(),
            deadline: None,
            grace: Duration::from_secs(30),
            cancel: CancelToken::new(),
        }
    }
}

/// Successful output of one component's task.
#[derive(Clone, Debug)]
pub struct ComponentResult {
    pub comp: CompId,
    pub files: Vec<PathBuf>,
    /// One blob per file, in the order the task returned them.
    pub blobs: Vec<Value>,
    /// Set under [`FailurePolicy::BestEffort`] when a provider had failed.
    pub tainted: bool,
}

/// A component that ended up in the failed set.
#[derive(Clone, Debug)]
pub struct ComponentFailure {
    pub comp: CompId,
    pub files: Vec<PathBuf>,
    pub kind: FailureKind,
}

/// Why a component ended up in the failed set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The component's own task returned an error or panicked.
    Task(TaskError),
    /// A provider failed; the component was never dispatched.
    Tainted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Task(err) => err.fmt(f),
            FailureKind::Tainted => f.write_str("dependency failed; not dispatched"),
        }
    }
}

/// Outcome of [`Scheduler::run`]: completed results in completion order, failures, and whatever
/// the run never got to because it was cancelled.
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub results: Vec<ComponentResult>,
    pub failed: Vec<ComponentFailure>,
    /// Components that never reached a terminal state; non-empty only for cancelled runs.
    pub unscheduled: Vec<CompId>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.results.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

/// Lifecycle of a component within one run; every component is in exactly one state at any
/// instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Pending,
    Ready,
    InFlight,
    Done,
    Failed,
}

/// Max-heap entry: highest critical path wins, ties go to the smallest member path (smaller
/// anchor node id, since node ids follow sorted path order).
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct ReadyEntry {
    cp: u64,
    anchor: Reverse<usize>,
    comp: CompId,
}

impl ReadyEntry {
    fn new(graph: &CondensedGraph, comp: CompId) -> Self {
        Self { cp: graph.critical_path(comp), anchor: Reverse(graph.anchor_id(comp)), comp }
    }
}

/// Drives component tasks over a condensed graph.
#[derive(Debug)]
pub struct Scheduler<'a> {
    graph: &'a CondensedGraph,
}

impl<'a> Scheduler<'a> {
    pub fn new(graph: &'a CondensedGraph) -> Self {
        Self { graph }
    }

    /// Runs the task selected by `dispatch` over every component, honoring dependencies,
    /// priorities, the failure policy and cancellation.
    pub fn run(&self, dispatch: TaskDispatch, options: &RunOptions) -> Result<RunReport> {
        let graph = self.graph;
        let count = graph.len();
        let max_workers = options.max_workers.unwrap_or_else(num_cpus::get).max(1);
        debug!("scheduling {count} components over at most {max_workers} workers ({dispatch:?})");

        let pool = WorkerPool::new(dispatch, max_workers)?;

        let mut pending_deps = vec![0usize; count];
        let mut state = vec![State::Pending; count];
        let mut provider_failed = vec![false; count];
        let mut ready = BinaryHeap::new();
        for comp in graph.components() {
            pending_deps[comp.index()] = graph.import_count(comp);
            if pending_deps[comp.index()] == 0 {
                state[comp.index()] = State::Ready;
                ready.push(ReadyEntry::new(graph, comp));
            }
        }

        let mut report = RunReport::default();
        let mut inflight = 0usize;
        let started = Instant::now();
        let deadline = options.deadline.map(|budget| started + budget);

        loop {
            if options.cancel.is_cancelled() || deadline.is_some_and(|at| Instant::now() >= at) {
                report.cancelled = true;
                break;
            }

            // fill free workers from the ready heap; tainted components are resolved here
            // without consuming a worker
            while inflight < max_workers {
                let Some(entry) = ready.pop() else { break };
                let comp = entry.comp;
                debug_assert_eq!(state[comp.index()], State::Ready);
                if provider_failed[comp.index()]
                    && options.failure_policy == FailurePolicy::Strict
                {
                    trace!("{comp} tainted by a failed provider, not dispatching");
                    state[comp.index()] = State::Failed;
                    report.failed.push(ComponentFailure {
                        comp,
                        files: graph.files_of(comp),
                        kind: FailureKind::Tainted,
                    });
                    release_dependents(
                        graph,
                        comp,
                        true,
                        &mut pending_deps,
                        &mut provider_failed,
                        &mut state,
                        &mut ready,
                    );
                    continue;
                }
                trace!("dispatching {comp} (cp {}, {} files)", entry.cp, graph.files_of(comp).len());
                state[comp.index()] = State::InFlight;
                inflight += 1;
                pool.submit(comp, graph.files_of(comp));
            }

            if inflight == 0 {
                // the fill loop drained the heap without dispatching, so nothing is left
                break;
            }

            // bounded wait keeps cancellation and the deadline responsive
            let Some(completion) = pool.wait_any(WAIT_TICK)? else { continue };
            let (comp, comp_failed) = record_completion(
                graph,
                completion,
                &mut state,
                &mut inflight,
                &provider_failed,
                options.failure_policy,
                &mut report,
            )?;
            release_dependents(
                graph,
                comp,
                comp_failed,
                &mut pending_deps,
                &mut provider_failed,
                &mut state,
                &mut ready,
            );
        }

        if report.cancelled {
            // drain in-flight tasks within the grace period; their completions still count
            let grace_end = Instant::now() + options.grace;
            while inflight > 0 {
                let now = Instant::now();
                if now >= grace_end {
                    debug!("{inflight} tasks still in flight after the grace period");
                    break;
                }
                match pool.wait_any(grace_end - now)? {
                    Some(completion) => {
                        record_completion(
                            graph,
                            completion,
                            &mut state,
                            &mut inflight,
                            &provider_failed,
                            options.failure_policy,
                            &mut report,
                        )?;
                    }
                    None => continue,
                }
            }
        }

        report.unscheduled = graph
            .components()
            .filter(|comp| !matches!(state[comp.index()], State::Done | State::Failed))
            .collect();
        if !report.cancelled && !report.unscheduled.is_empty() {
            return Err(IndexerError::Scheduler(format!(
                "{} components were never scheduled",
                report.unscheduled.len()
            )));
        }

        debug!(
            "run finished in {:?}: {} completed, {} failed, {} unscheduled, cancelled: {}",
            started.elapsed(),
            report.completed(),
            report.failed_count(),
            report.unscheduled.len(),
            report.cancelled,
        );
        Ok(report)
    }
}

/// Books a completion into the report; returns the component and whether it failed.
fn record_completion(
    graph: &CondensedGraph,
    completion: Completion,
    state: &mut [State],
    inflight: &mut usize,
    provider_failed: &[bool],
    policy: FailurePolicy,
    report: &mut RunReport,
) -> Result<(CompId, bool)> {
    let comp = completion.comp;
    if state[comp.index()] != State::InFlight {
        return Err(IndexerError::Scheduler(format!(
            "completion event for {comp} which is not in flight"
        )));
    }
    *inflight -= 1;
    match completion.output {
        Ok(blobs) => {
            state[comp.index()] = State::Done;
            report.results.push(ComponentResult {
                comp,
                files: graph.files_of(comp),
                blobs,
                tainted: policy == FailurePolicy::BestEffort && provider_failed[comp.index()],
            });
            Ok((comp, false))
        }
        Err(err) => {
            debug!("{comp} failed: {err}");
            state[comp.index()] = State::Failed;
            report.failed.push(ComponentFailure {
                comp,
                files: graph.files_of(comp),
                kind: FailureKind::Task(err),
            });
            Ok((comp, true))
        }
    }
}

/// Decrements the dependency counter of every consumer of `comp`, propagating the failure flag
/// and pushing newly ready consumers onto the heap.
fn release_dependents(
    graph: &CondensedGraph,
    comp: CompId,
    comp_failed: bool,
    pending_deps: &mut [usize],
    provider_failed: &mut [bool],
    state: &mut [State],
    ready: &mut BinaryHeap<ReadyEntry>,
) {
    for dependent in graph.importers(comp) {
        let i = dependent.index();
        if comp_failed {
            provider_failed[i] = true;
        }
        pending_deps[i] -= 1;
        if pending_deps[i] == 0 {
            debug_assert_eq!(state[i], State::Pending);
            state[i] = State::Ready;
            ready.push(ReadyEntry::new(graph, dependent));
        }
    }
}
