//! Submitted operations, their completion callbacks, and the handles callers
//! wait on.

use std::{
    fmt,
    marker::PhantomData,
    panic::{catch_unwind, AssertUnwindSafe},
    time::Duration,
};

use anyhow::anyhow;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use shared::error::OperationError;
use tracing::error;

use crate::{listeners::panic_message, sequencer::EnablementGate};

pub type OperationResult<T> = Result<T, OperationError>;

/// Completion callback, invoked on the sequencer worker before the
/// operation's handle resolves.
pub trait OperationCallback<T>: Send {
    fn on_success(&mut self, result: &T);
    fn on_failure(&mut self, error: &OperationError);
}

pub struct FnCallback<T, S, F> {
    on_success: S,
    on_failure: F,
    _result: PhantomData<fn(&T)>,
}

pub fn callback_fn<T, S, F>(on_success: S, on_failure: F) -> FnCallback<T, S, F>
where
    S: FnMut(&T) + Send,
    F: FnMut(&OperationError) + Send,
{
    FnCallback {
        on_success,
        on_failure,
        _result: PhantomData,
    }
}

impl<T, S, F> OperationCallback<T> for FnCallback<T, S, F>
where
    S: FnMut(&T) + Send,
    F: FnMut(&OperationError) + Send,
{
    fn on_success(&mut self, result: &T) {
        (self.on_success)(result)
    }

    fn on_failure(&mut self, error: &OperationError) {
        (self.on_failure)(error)
    }
}

/// Caller's side of a submitted operation.
///
/// Resolves exactly once, with the same outcome the callback saw.
pub struct OperationHandle<T> {
    id: u64,
    outcome: Receiver<OperationResult<T>>,
}

impl<T> OperationHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Blocks until the operation resolves.
    pub fn wait(self) -> OperationResult<T> {
        // A dropped completer without an outcome means the work never ran.
        self.outcome.recv().unwrap_or(Err(OperationError::Cancelled))
    }

    /// Gives the handle back on timeout so the caller can keep waiting.
    pub fn wait_timeout(self, timeout: Duration) -> Result<OperationResult<T>, Self> {
        match self.outcome.recv_timeout(timeout) {
            Ok(outcome) => Ok(outcome),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(OperationError::Cancelled)),
        }
    }

    /// Non-blocking poll. Gives the handle back while still pending.
    pub fn try_result(self) -> Result<OperationResult<T>, Self> {
        match self.outcome.try_recv() {
            Ok(outcome) => Ok(outcome),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Disconnected) => Ok(Err(OperationError::Cancelled)),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.outcome.is_empty()
    }
}

impl<T> fmt::Debug for OperationHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Result of running one operation on the worker. `resolve` is deferred so
/// the worker can retire its generation and signal idle first.
pub(crate) struct Executed {
    pub(crate) failed: bool,
    resolve: Box<dyn FnOnce() + Send>,
}

impl Executed {
    pub(crate) fn resolve(self) {
        (self.resolve)()
    }
}

pub(crate) trait QueuedOperation: Send {
    fn id(&self) -> u64;
    fn execute(self: Box<Self>, gate: &EnablementGate) -> Executed;
    fn reject(self: Box<Self>, error: OperationError);
}

pub(crate) type BoxedWork<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send>;

pub(crate) struct Operation<T> {
    id: u64,
    work: BoxedWork<T>,
    callback: Option<Box<dyn OperationCallback<T>>>,
    ignore_enabled: bool,
    completer: Sender<OperationResult<T>>,
}

impl<T: Send + 'static> Operation<T> {
    pub(crate) fn new(
        id: u64,
        work: BoxedWork<T>,
        callback: Option<Box<dyn OperationCallback<T>>>,
        ignore_enabled: bool,
    ) -> (Self, OperationHandle<T>) {
        let (completer, outcome) = bounded(1);
        let operation = Self {
            id,
            work,
            callback,
            ignore_enabled,
            completer,
        };
        (operation, OperationHandle { id, outcome })
    }
}

impl<T: Send + 'static> QueuedOperation for Operation<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn execute(self: Box<Self>, gate: &EnablementGate) -> Executed {
        let Operation {
            id,
            work,
            callback,
            ignore_enabled,
            completer,
        } = *self;

        let outcome = if !ignore_enabled && !gate.is_open() {
            Err(OperationError::MachineNotEnabled)
        } else {
            match catch_unwind(AssertUnwindSafe(work)) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(OperationError::OperationFailed(err)),
                Err(payload) => Err(OperationError::OperationFailed(anyhow!(
                    "operation panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            }
        };

        if let Some(callback) = callback {
            notify(id, callback, &outcome);
        }

        Executed {
            failed: outcome.is_err(),
            resolve: Box::new(move || {
                let _ = completer.send(outcome);
            }),
        }
    }

    fn reject(self: Box<Self>, error: OperationError) {
        let Operation {
            id,
            callback,
            completer,
            ..
        } = *self;
        let outcome: OperationResult<T> = Err(error);
        if let Some(callback) = callback {
            notify(id, callback, &outcome);
        }
        let _ = completer.send(outcome);
    }
}

fn notify<T>(
    id: u64,
    mut callback: Box<dyn OperationCallback<T>>,
    outcome: &OperationResult<T>,
) {
    let delivered = catch_unwind(AssertUnwindSafe(|| match outcome {
        Ok(value) => callback.on_success(value),
        Err(err) => callback.on_failure(err),
    }));
    if let Err(payload) = delivered {
        error!(
            operation = id,
            panic = %panic_message(payload.as_ref()),
            "operation callback panicked"
        );
    }
}
