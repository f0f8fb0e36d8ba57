//! Single-worker command sequencer.
//!
//! Every operation submitted against a machine runs on one dedicated worker
//! thread, one at a time, in submission order. A failed operation retires
//! the worker's generation: everything still queued behind it resolves as
//! `Cancelled` and the next submission starts a fresh generation.
//!
//! ```text
//!   Idle --submit--> Active(n) --failure--> Poisoned(n) --submit--> Active(n+1)
//! ```

use std::{
    fmt, io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    thread,
};

use crossbeam_channel::{unbounded, Receiver, SendError, Sender};
use parking_lot::Mutex;
use shared::error::OperationError;
use tracing::{debug, error, warn};

use crate::{
    listeners::ListenerHub,
    operation::{BoxedWork, Operation, OperationCallback, OperationHandle, QueuedOperation},
};

pub const DEFAULT_WORKER_THREAD_NAME: &str = "machine-sequencer";

type OperationQueue = Sender<Box<dyn QueuedOperation>>;

/// Shared enabled/disabled predicate checked before each operation runs.
#[derive(Debug, Clone, Default)]
pub struct EnablementGate(Arc<AtomicBool>);

impl EnablementGate {
    pub fn new(open: bool) -> Self {
        Self(Arc::new(AtomicBool::new(open)))
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, open: bool) {
        self.0.store(open, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerPhase {
    Idle,
    Active { generation: u64 },
    Poisoned { retired: u64 },
}

enum GenerationState {
    Idle,
    Active { number: u64, queue: OperationQueue },
    Poisoned { retired: u64 },
}

struct SequencerState {
    current: GenerationState,
    generations_started: u64,
}

pub struct CommandSequencer {
    state: Arc<Mutex<SequencerState>>,
    hub: Arc<ListenerHub>,
    gate: EnablementGate,
    thread_name: String,
    next_operation: AtomicU64,
}

impl CommandSequencer {
    pub fn new(hub: Arc<ListenerHub>, gate: EnablementGate, thread_name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SequencerState {
                current: GenerationState::Idle,
                generations_started: 0,
            })),
            hub,
            gate,
            thread_name: thread_name.into(),
            next_operation: AtomicU64::new(0),
        }
    }

    pub fn submit<T, F>(&self, work: F) -> OperationHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.submit_with(work, None, false)
    }

    pub fn submit_with_callback<T, F, C>(&self, work: F, callback: C) -> OperationHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        C: OperationCallback<T> + 'static,
    {
        self.submit_with(work, Some(Box::new(callback)), false)
    }

    /// Queues `work` and returns immediately. Never fails on the calling
    /// thread; every failure is delivered through the handle and callback.
    pub fn submit_with<T, F>(
        &self,
        work: F,
        callback: Option<Box<dyn OperationCallback<T>>>,
        ignore_enabled: bool,
    ) -> OperationHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let id = self.next_operation.fetch_add(1, Ordering::Relaxed) + 1;
        let work: BoxedWork<T> = Box::new(work);
        let (operation, handle) = Operation::new(id, work, callback, ignore_enabled);
        self.enqueue(Box::new(operation));
        handle
    }

    fn enqueue(&self, mut operation: Box<dyn QueuedOperation>) {
        let id = operation.id();
        let mut state = self.state.lock();

        // A worker only drops its receiver after retiring its generation, so
        // a failed send can only race with an abnormal worker exit. Retry
        // once on a fresh generation.
        for _ in 0..2 {
            let (generation, queue) = match self.ensure_active(&mut state) {
                Ok(active) => active,
                Err(err) => {
                    drop(state);
                    error!(operation = id, error = %err, "failed to start sequencer worker");
                    operation.reject(OperationError::WorkerUnavailable(err.to_string()));
                    return;
                }
            };

            match queue.send(operation) {
                Ok(()) => {
                    debug!(operation = id, generation, "operation queued");
                    return;
                }
                Err(SendError(returned)) => {
                    warn!(generation, "sequencer worker vanished; retiring generation");
                    state.current = GenerationState::Poisoned {
                        retired: generation,
                    };
                    operation = returned;
                }
            }
        }

        drop(state);
        operation.reject(OperationError::WorkerUnavailable(
            "sequencer worker exited before accepting the operation".to_string(),
        ));
    }

    fn ensure_active(&self, state: &mut SequencerState) -> io::Result<(u64, OperationQueue)> {
        if let GenerationState::Active { number, queue } = &state.current {
            return Ok((*number, queue.clone()));
        }

        let number = state.generations_started + 1;
        let (queue, intake) = unbounded();
        let worker = Worker {
            generation: number,
            intake,
            state: Arc::downgrade(&self.state),
            hub: Arc::clone(&self.hub),
            gate: self.gate.clone(),
        };
        let name = format!("{}-{number}", self.thread_name);
        // `Builder::spawn` panics on interior NULs instead of returning an error.
        if name.contains('\0') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("worker thread name {name:?} contains a NUL character"),
            ));
        }
        thread::Builder::new()
            .name(name)
            .spawn(move || worker.run())?;

        state.generations_started = number;
        state.current = GenerationState::Active {
            number,
            queue: queue.clone(),
        };
        debug!(generation = number, "sequencer generation started");
        Ok((number, queue))
    }

    pub fn phase(&self) -> SequencerPhase {
        match &self.state.lock().current {
            GenerationState::Idle => SequencerPhase::Idle,
            GenerationState::Active { number, .. } => SequencerPhase::Active {
                generation: *number,
            },
            GenerationState::Poisoned { retired } => SequencerPhase::Poisoned { retired: *retired },
        }
    }

    pub fn generations_started(&self) -> u64 {
        self.state.lock().generations_started
    }

    /// Operations waiting behind the one currently executing.
    pub fn queued(&self) -> usize {
        match &self.state.lock().current {
            GenerationState::Active { queue, .. } => queue.len(),
            _ => 0,
        }
    }
}

impl fmt::Debug for CommandSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSequencer")
            .field("phase", &self.phase())
            .field("thread_name", &self.thread_name)
            .finish()
    }
}

struct Worker {
    generation: u64,
    intake: Receiver<Box<dyn QueuedOperation>>,
    state: Weak<Mutex<SequencerState>>,
    hub: Arc<ListenerHub>,
    gate: EnablementGate,
}

impl Worker {
    fn run(self) {
        while let Ok(operation) = self.intake.recv() {
            let id = operation.id();
            debug!(operation = id, generation = self.generation, "operation dequeued");
            self.hub.fire_busy(true);

            let executed = operation.execute(&self.gate);
            let failed = executed.failed;
            if failed {
                self.retire(id);
            }

            if self.intake.is_empty() {
                self.hub.fire_busy(false);
            }

            executed.resolve();
            if failed {
                break;
            }
        }
        debug!(generation = self.generation, "sequencer generation finished");
    }

    fn retire(&self, failed_operation: u64) {
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock();
            let owns_current = matches!(
                state.current,
                GenerationState::Active { number, .. } if number == self.generation
            );
            if owns_current {
                // Dropping the queue's sender here, under the admission lock,
                // means nothing can be enqueued behind the drain below.
                state.current = GenerationState::Poisoned {
                    retired: self.generation,
                };
            }
        }

        let mut cancelled = 0usize;
        while let Ok(operation) = self.intake.try_recv() {
            debug!(operation = operation.id(), "cancelling queued operation");
            operation.reject(OperationError::Cancelled);
            cancelled += 1;
        }
        warn!(
            generation = self.generation,
            operation = failed_operation,
            cancelled,
            "operation failed; sequencer generation retired"
        );
    }
}

#[cfg(test)]
#[path = "tests/sequencer_tests.rs"]
mod tests;
