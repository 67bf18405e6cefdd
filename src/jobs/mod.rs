//! Background job engine.
//!
//! A bounded pool of worker threads runs long dataset operations off the
//! interaction loop. Each job owns a result slot that moves from `Pending`
//! through `Progress` updates to exactly one terminal state, and a
//! cancellation flag the work function polls between chunks. Workers never
//! touch UI state; the interaction loop polls handles and applies outcomes.

pub mod stats;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::error::{Result, TaigaError};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    MinMax,
    Mean,
    Std,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Stats(StatKind),
    Histogram,
    ValueRange,
    Scatter,
    Rename,
}

/// Payload of a successfully finished job.
#[derive(Debug, Clone)]
pub enum JobValue {
    MinMax { min: f64, max: f64 },
    Mean(f64),
    Std(f64),
    Histogram(crate::plot::Histogram),
    Values { start: usize, values: Vec<f64> },
    Points(Vec<(f64, f64)>),
    Renamed { old_path: String, new_name: String },
}

#[derive(Debug, Clone)]
pub enum JobState {
    Pending,
    Progress(f64, String),
    Done(JobValue),
    Cancelled,
    Failed(String),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Cancelled | Self::Failed(_))
    }
}

struct Shared {
    cancel: AtomicBool,
    state: Mutex<JobState>,
}

impl Shared {
    fn new() -> Self {
        Self {
            cancel: AtomicBool::new(false),
            state: Mutex::new(JobState::Pending),
        }
    }

    /// Terminal states are written at most once; later writes are dropped.
    fn finish(&self, terminal: JobState) {
        let mut state = self.state.lock().expect("job state poisoned");
        if !state.is_terminal() {
            *state = terminal;
        }
    }

    fn progress(&self, fraction: f64, message: String) {
        let mut state = self.state.lock().expect("job state poisoned");
        if state.is_terminal() {
            return;
        }
        // Fractions are delivered in non-decreasing order.
        let fraction = match &*state {
            JobState::Progress(prev, _) => fraction.max(*prev),
            _ => fraction,
        };
        *state = JobState::Progress(fraction.clamp(0.0, 1.0), message);
    }
}

/// Handed to the work function: cancellation polling and progress reporting.
pub struct JobCtx {
    shared: Arc<Shared>,
}

impl JobCtx {
    pub fn cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::Relaxed)
    }

    pub fn progress(&self, fraction: f64, message: impl Into<String>) {
        self.shared.progress(fraction, message.into());
    }
}

/// Work functions return `Ok(None)` after observing cancellation.
pub type Work = Box<dyn FnOnce(&JobCtx) -> Result<Option<JobValue>> + Send + 'static>;

struct Task {
    id: JobId,
    shared: Arc<Shared>,
    work: Work,
}

/// Cheap, cloneable view of one job's lifecycle.
#[derive(Clone)]
pub struct JobHandle {
    id: JobId,
    kind: JobKind,
    shared: Arc<Shared>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn poll(&self) -> JobState {
        self.shared.state.lock().expect("job state poisoned").clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.poll().is_terminal()
    }

    /// Fire-and-forget: the worker observes the flag within one chunk.
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::Relaxed);
    }
}

/// The worker pool. Dropping the engine closes the queue; running jobs are
/// abandoned rather than awaited.
pub struct Engine {
    sender: Sender<Task>,
    #[allow(dead_code)]
    workers: Vec<thread::JoinHandle<()>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_workers(num_cpus::get().clamp(2, 4))
    }

    pub fn with_workers(count: usize) -> Self {
        let (sender, receiver) = unbounded::<Task>();
        let workers = (0..count.max(1))
            .map(|i| {
                let receiver: Receiver<Task> = receiver.clone();
                thread::Builder::new()
                    .name(format!("taiga-worker-{}", i))
                    .spawn(move || {
                        while let Ok(task) = receiver.recv() {
                            run_task(task);
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self { sender, workers }
    }

    pub fn submit(&self, kind: JobKind, work: Work) -> JobHandle {
        let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(Shared::new());
        let handle = JobHandle {
            id,
            kind,
            shared: Arc::clone(&shared),
        };
        debug!(id, ?kind, "submitting job");
        if self.sender.send(Task { id, shared, work }).is_err() {
            handle.shared.finish(JobState::Failed("engine shut down".to_string()));
        }
        handle
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn run_task(task: Task) {
    if task.shared.cancel.load(Ordering::Relaxed) {
        task.shared.finish(JobState::Cancelled);
        return;
    }
    let ctx = JobCtx {
        shared: Arc::clone(&task.shared),
    };
    let outcome = catch_unwind(AssertUnwindSafe(move || (task.work)(&ctx)));
    let terminal = match outcome {
        Ok(Ok(Some(value))) => JobState::Done(value),
        Ok(Ok(None)) => JobState::Cancelled,
        Ok(Err(err)) => JobState::Failed(err.to_string()),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            warn!(id = task.id, %msg, "worker panicked");
            JobState::Failed(TaigaError::WorkerPanic(msg).to_string())
        }
    };
    task.shared.finish(terminal);
}

/// Logical slots with at most one active job each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Stats,
    Histogram,
    Values,
    Plot,
    Rename,
}

/// Tracks the active occupant per slot; starting a new job supersedes the
/// previous one by cancelling it.
#[derive(Default)]
pub struct SlotTable {
    active: HashMap<Slot, JobHandle>,
}

impl SlotTable {
    /// Install `handle` in `slot`, cancelling and returning any prior
    /// occupant.
    pub fn start(&mut self, slot: Slot, handle: JobHandle) -> Option<JobHandle> {
        let prior = self.active.insert(slot, handle);
        if let Some(prior) = &prior {
            if !prior.is_terminal() {
                debug!(id = prior.id(), ?slot, "superseding active job");
                prior.cancel();
            }
        }
        prior
    }

    pub fn cancel(&mut self, slot: Slot) {
        if let Some(handle) = self.active.get(&slot) {
            handle.cancel();
        }
    }

    /// Request cancellation of every active job.
    pub fn cancel_all(&mut self) {
        for handle in self.active.values() {
            handle.cancel();
        }
    }

    pub fn get(&self, slot: Slot) -> Option<&JobHandle> {
        self.active.get(&slot)
    }

    /// Terminal jobs, removed from their slots, for the interaction loop to
    /// apply. Non-terminal occupants stay put.
    pub fn drain_finished(&mut self) -> Vec<(Slot, JobHandle)> {
        let finished: Vec<Slot> = self
            .active
            .iter()
            .filter(|(_, h)| h.is_terminal())
            .map(|(s, _)| *s)
            .collect();
        finished
            .into_iter()
            .filter_map(|slot| self.active.remove(&slot).map(|h| (slot, h)))
            .collect()
    }

    /// Latest progress across occupied slots, for the status bar.
    pub fn any_progress(&self) -> Option<(f64, String)> {
        self.active.values().find_map(|h| match h.poll() {
            JobState::Progress(frac, msg) => Some((frac, msg)),
            _ => None,
        })
    }
}

#[cfg(test)]
pub(crate) fn detached_ctx(cancelled: bool) -> JobCtx {
    let shared = Arc::new(Shared::new());
    shared.cancel.store(cancelled, Ordering::Relaxed);
    JobCtx { shared }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wait_terminal(handle: &JobHandle) -> JobState {
        for _ in 0..2000 {
            let state = handle.poll();
            if state.is_terminal() {
                return state;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("job {} never reached a terminal state", handle.id());
    }

    #[test]
    fn trivial_job_completes() {
        let engine = Engine::with_workers(1);
        let handle = engine.submit(
            JobKind::Stats(StatKind::MinMax),
            Box::new(|_ctx| Ok(Some(JobValue::MinMax { min: 1.0, max: 3.0 }))),
        );
        match wait_terminal(&handle) {
            JobState::Done(JobValue::MinMax { min, max }) => {
                assert_eq!(min, 1.0);
                assert_eq!(max, 3.0);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn job_ids_are_monotonic() {
        let engine = Engine::with_workers(1);
        let a = engine.submit(JobKind::ValueRange, Box::new(|_| Ok(None)));
        let b = engine.submit(JobKind::ValueRange, Box::new(|_| Ok(None)));
        assert!(b.id() > a.id());
    }

    #[test]
    fn cancellation_yields_cancelled_not_failed() {
        let engine = Engine::with_workers(1);
        let handle = engine.submit(
            JobKind::Stats(StatKind::Mean),
            Box::new(|ctx| {
                for _ in 0..1000 {
                    if ctx.cancelled() {
                        return Ok(None);
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(Some(JobValue::Mean(0.0)))
            }),
        );
        handle.cancel();
        assert!(matches!(wait_terminal(&handle), JobState::Cancelled));
    }

    #[test]
    fn panic_becomes_failed() {
        let engine = Engine::with_workers(1);
        let handle = engine.submit(
            JobKind::Histogram,
            Box::new(|_ctx| panic!("chunk index out of range")),
        );
        match wait_terminal(&handle) {
            JobState::Failed(msg) => assert!(msg.contains("chunk index out of range")),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn progress_is_monotonic_and_terminal_is_final() {
        let engine = Engine::with_workers(1);
        let handle = engine.submit(
            JobKind::Stats(StatKind::Std),
            Box::new(|ctx| {
                ctx.progress(0.5, "halfway".to_string());
                ctx.progress(0.2, "stale update".to_string());
                Ok(Some(JobValue::Std(1.0)))
            }),
        );
        // A stale lower fraction never rewinds the reported progress, and
        // nothing observed after the terminal state differs from it.
        let state = wait_terminal(&handle);
        assert!(matches!(state, JobState::Done(_)));
        handle.shared.progress(0.9, "late".to_string());
        assert!(matches!(handle.poll(), JobState::Done(_)));
    }

    #[test]
    fn cancel_all_reaches_every_slot() {
        let engine = Engine::with_workers(2);
        let mut slots = SlotTable::default();
        let slow = || {
            Box::new(|ctx: &JobCtx| {
                for _ in 0..1000 {
                    if ctx.cancelled() {
                        return Ok(None);
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(Some(JobValue::Mean(0.0)))
            }) as Work
        };
        let hist = engine.submit(JobKind::Histogram, slow());
        let plot = engine.submit(JobKind::Scatter, slow());
        slots.start(Slot::Histogram, hist.clone());
        slots.start(Slot::Plot, plot.clone());
        slots.cancel_all();
        assert!(matches!(wait_terminal(&hist), JobState::Cancelled));
        assert!(matches!(wait_terminal(&plot), JobState::Cancelled));
    }

    #[test]
    fn slot_supersede_cancels_prior() {
        let engine = Engine::with_workers(2);
        let mut slots = SlotTable::default();
        let slow = engine.submit(
            JobKind::Stats(StatKind::MinMax),
            Box::new(|ctx| {
                for _ in 0..1000 {
                    if ctx.cancelled() {
                        return Ok(None);
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(Some(JobValue::MinMax { min: 0.0, max: 0.0 }))
            }),
        );
        slots.start(Slot::Stats, slow.clone());
        let fresh = engine.submit(
            JobKind::Stats(StatKind::MinMax),
            Box::new(|_| Ok(Some(JobValue::MinMax { min: 1.0, max: 2.0 }))),
        );
        slots.start(Slot::Stats, fresh.clone());
        assert!(matches!(wait_terminal(&slow), JobState::Cancelled));
        assert!(matches!(wait_terminal(&fresh), JobState::Done(_)));
        let finished = slots.drain_finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].1.id(), fresh.id());
    }
}
