//! Background work with progress reporting and cooperative cancellation.
//!
//! Every long running operation (import, protein mapping, export, running the sequencing tools)
//! receives a [`Progress`] handle. Workers report through it and check it for cancellation at
//! their natural boundaries (a file, a spectrum, a tool exit). Heavy operations on a single
//! identification are serialised by an [`OperationLock`].

use std::{
    fmt::Display,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc::{Receiver, TryRecvError, channel},
    },
    thread::JoinHandle,
};

use context_error::*;
use tracing::{debug, info};

use dncore::error::{DeNovoError, DeNovoErrorKind, canceled};

#[derive(Debug, Default)]
struct ProgressState {
    canceled: AtomicBool,
    done: AtomicUsize,
    total: AtomicUsize,
    status: Mutex<String>,
}

/// A thread safe progress handle, clones share the same state
#[derive(Clone, Debug, Default)]
pub struct Progress {
    state: Arc<ProgressState>,
}

impl Progress {
    /// A fresh handle, not canceled and without any work registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation, workers stop at their next check
    pub fn cancel(&self) {
        debug!("Cancellation requested");
        self.state.canceled.store(true, Ordering::Relaxed);
    }

    /// Check if cancellation was requested
    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::Relaxed)
    }

    /// Return a `Canceled` error if cancellation was requested
    /// # Errors
    /// If the operation was canceled.
    pub fn check(&self, operation: &str) -> Result<(), DeNovoError> {
        if self.is_canceled() {
            Err(canceled(operation))
        } else {
            Ok(())
        }
    }

    /// Reset the counters for a new unit of work
    pub fn start(&self, total: usize, status: impl Into<String>) {
        self.state.done.store(0, Ordering::Relaxed);
        self.state.total.store(total, Ordering::Relaxed);
        self.set_status(status);
    }

    /// Register that one more item is done
    pub fn increment(&self) {
        self.state.done.fetch_add(1, Ordering::Relaxed);
    }

    /// The items done and the total number of items
    pub fn counts(&self) -> (usize, usize) {
        (
            self.state.done.load(Ordering::Relaxed),
            self.state.total.load(Ordering::Relaxed),
        )
    }

    /// Replace the status text
    pub fn set_status(&self, status: impl Into<String>) {
        *self
            .state
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = status.into();
    }

    /// The current status text
    pub fn status(&self) -> String {
        self.state
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// How a task ended
#[derive(Clone, Debug)]
pub enum TaskOutcome<T> {
    /// The task ran to completion
    Completed(T),
    /// The task stopped after a cancellation request
    Canceled,
    /// The task failed
    Failed(DeNovoError),
}

impl<T> TaskOutcome<T> {
    /// Check if the task completed
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

impl<T> From<Result<T, DeNovoError>> for TaskOutcome<T> {
    fn from(value: Result<T, DeNovoError>) -> Self {
        match value {
            Ok(value) => Self::Completed(value),
            Err(error) if error.get_kind() == DeNovoErrorKind::Canceled => Self::Canceled,
            Err(error) => Self::Failed(error),
        }
    }
}

/// A task running on a background thread
#[derive(Debug)]
pub struct TaskHandle<T> {
    name: String,
    progress: Progress,
    receiver: Receiver<TaskOutcome<T>>,
    thread: Option<JoinHandle<()>>,
}

/// Run a job on a background thread. The outcome is picked up on the calling thread with
/// [`TaskHandle::try_outcome`] or [`TaskHandle::on_complete`].
pub fn spawn_task<T, F>(name: impl Into<String>, progress: Progress, job: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&Progress) -> Result<T, DeNovoError> + Send + 'static,
{
    let name = name.into();
    let (sender, receiver) = channel();
    let worker_progress = progress.clone();
    let worker_name = name.clone();
    let thread = std::thread::spawn(move || {
        let outcome = TaskOutcome::from(job(&worker_progress));
        match &outcome {
            TaskOutcome::Completed(_) => info!("{worker_name} completed"),
            TaskOutcome::Canceled => info!("{worker_name} canceled"),
            TaskOutcome::Failed(error) => info!("{worker_name} failed: {error}"),
        }
        // The receiving side may already be gone, the outcome is then simply not observed
        let _unobserved = sender.send(outcome);
    });
    TaskHandle {
        name,
        progress,
        receiver,
        thread: Some(thread),
    }
}

impl<T> TaskHandle<T> {
    /// The name given to this task
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The progress handle of this task
    pub const fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.progress.cancel();
    }

    /// Get the outcome without blocking, `None` if the task is still running
    pub fn try_outcome(&mut self) -> Option<TaskOutcome<T>> {
        match self.receiver.try_recv() {
            Ok(outcome) => {
                self.join();
                Some(outcome)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join();
                Some(TaskOutcome::Failed(self.panicked()))
            }
        }
    }

    /// Block until the task is done
    pub fn wait(mut self) -> TaskOutcome<T> {
        let outcome = self
            .receiver
            .recv()
            .unwrap_or_else(|_| TaskOutcome::Failed(self.panicked()));
        self.join();
        outcome
    }

    /// Block until the task is done and hand the outcome to the callback on this thread
    pub fn on_complete<R>(self, callback: impl FnOnce(TaskOutcome<T>) -> R) -> R {
        callback(self.wait())
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _panic = thread.join();
        }
    }

    fn panicked(&self) -> DeNovoError {
        DeNovoError::small(
            DeNovoErrorKind::Configuration,
            format!("{} stopped unexpectedly", self.name),
            "The worker thread ended without reporting an outcome",
        )
    }
}

/// The state of the heavy operation on an identification
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OperationState {
    /// No operation ran yet
    #[default]
    Idle,
    /// The named operation is running
    Running(String),
    /// The last operation completed
    Completed,
    /// The last operation was canceled
    Canceled,
    /// The last operation failed
    Failed,
}

impl Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running(name) => write!(f, "running {name}"),
            Self::Completed => write!(f, "completed"),
            Self::Canceled => write!(f, "canceled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Allows at most one heavy operation (mapping, export) at the same time, clones share the state
#[derive(Clone, Debug, Default)]
pub struct OperationLock {
    state: Arc<Mutex<OperationState>>,
}

impl OperationLock {
    /// A lock in the idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state
    pub fn state(&self) -> OperationState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Enter the running state
    /// # Errors
    /// A `Busy` error if another operation is running.
    pub fn begin(&self, operation: impl Into<String>) -> Result<OperationGuard, DeNovoError> {
        let operation = operation.into();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let OperationState::Running(active) = &*state {
            return Err(DeNovoError::small(
                DeNovoErrorKind::Busy,
                format!("Cannot start {operation}"),
                format!("{active} is still running, wait for it to finish or cancel it first"),
            ));
        }
        debug!("Starting {operation}");
        *state = OperationState::Running(operation);
        Ok(OperationGuard {
            state: Arc::clone(&self.state),
            finished: false,
        })
    }
}

/// Proof of a running operation, the lock is released when this is finished or dropped. Dropping
/// it without finishing marks the operation as failed.
#[derive(Debug)]
pub struct OperationGuard {
    state: Arc<Mutex<OperationState>>,
    finished: bool,
}

impl OperationGuard {
    /// Record the terminal state for this outcome
    pub fn finish<T>(mut self, outcome: &TaskOutcome<T>) {
        self.set(match outcome {
            TaskOutcome::Completed(_) => OperationState::Completed,
            TaskOutcome::Canceled => OperationState::Canceled,
            TaskOutcome::Failed(_) => OperationState::Failed,
        });
    }

    /// Record the terminal state for this result
    pub fn finish_result<T>(mut self, result: Result<T, DeNovoError>) -> Result<T, DeNovoError> {
        self.set(match &result {
            Ok(_) => OperationState::Completed,
            Err(error) if error.get_kind() == DeNovoErrorKind::Canceled => OperationState::Canceled,
            Err(_) => OperationState::Failed,
        });
        result
    }

    fn set(&mut self, state: OperationState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self.finished = true;
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.set(OperationState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_jobs_report_canceled() {
        let progress = Progress::new();
        progress.cancel();
        let handle = spawn_task("Import", progress, |progress| {
            progress.check("Import")?;
            Ok(1)
        });
        assert!(matches!(handle.wait(), TaskOutcome::Canceled));
    }

    #[test]
    fn outcome_on_calling_thread() {
        let handle = spawn_task("Export", Progress::new(), |progress| {
            progress.start(2, "Exporting");
            progress.increment();
            progress.increment();
            Ok(progress.counts())
        });
        let caller = std::thread::current().id();
        let (counts, thread) = handle.on_complete(|outcome| (outcome, std::thread::current().id()));
        assert!(matches!(counts, TaskOutcome::Completed((2, 2))));
        assert_eq!(thread, caller);
    }

    #[test]
    fn one_operation_at_a_time() {
        let lock = OperationLock::new();
        assert_eq!(lock.state(), OperationState::Idle);
        let guard = lock.begin("protein mapping").unwrap();
        let error = lock.begin("export").unwrap_err();
        assert_eq!(error.get_kind(), DeNovoErrorKind::Busy);
        guard.finish(&TaskOutcome::Completed(()));
        assert_eq!(lock.state(), OperationState::Completed);
        let guard = lock.begin("export").unwrap();
        drop(guard);
        assert_eq!(lock.state(), OperationState::Failed);
    }
}
