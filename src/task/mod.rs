//! Background execution of a single command.
//!
//! A [`CommandTask`] runs its root stage on a dedicated worker thread and
//! walks `NotStarted → Started → Running → Completed | Canceled`. Any error
//! (or panic) raised by the stage ends the task in `Canceled` with a
//! [`CommandCanceled`] reason wrapping the original error.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::data::{DataType, TypedData};
use crate::error::{PipelineError, Result};
use crate::progress::{ProgressEvent, ProgressTracker, ProgressView};
use crate::stage::SharedStage;


/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotStarted,
    /// `run` was called; the worker has not invoked the command yet.
    Started,
    Running,
    Completed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::NotStarted => "not-started",
            TaskState::Started => "started",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Canceled => "canceled",
        }
    }
}

/// Identifier assigned by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a task ended in [`TaskState::Canceled`].
#[derive(Debug, Error)]
#[error("Command '{command}' ({task_id}) canceled: {source}")]
pub struct CommandCanceled {
    task_id: TaskId,
    command: String,
    #[source]
    source: PipelineError,
}

impl CommandCanceled {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// The error the command raised.
    pub fn stage_error(&self) -> &PipelineError {
        &self.source
    }

    /// Whether the command stopped because cancellation was requested.
    pub fn is_user_cancel(&self) -> bool {
        self.source.is_canceled()
    }

    /// The deepest error in the source chain.
    pub fn innermost(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = &self.source;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }
}

/// Notification published by a task.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// The worker is about to invoke the command.
    Started,
    Progress(f64),
    Status(String),
    Completed,
    Canceled(Arc<CommandCanceled>),
}

type Listener = Arc<dyn Fn(&TaskEvent) + Send + Sync>;

struct Lifecycle {
    state: TaskState,
    cancel_reason: Option<Arc<CommandCanceled>>,
    /// Set once the terminal event has been delivered.
    settled: bool,
    worker: Option<ThreadId>,
}

struct Inner {
    id: TaskId,
    command: SharedStage,
    progress: ProgressTracker,
    cancel: CancelToken,
    lifecycle: Mutex<Lifecycle>,
    settled: Condvar,
    listeners: Mutex<Vec<Listener>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to one execution of a command. Clones share the same task.
#[derive(Clone)]
pub struct CommandTask {
    inner: Arc<Inner>,
}

impl CommandTask {
    pub fn new(command: SharedStage) -> Self {
        Self::with_id(TaskId(0), command)
    }

    pub fn with_id(id: TaskId, command: SharedStage) -> Self {
        let inner = Arc::new(Inner {
            id,
            command,
            progress: ProgressTracker::new(),
            cancel: CancelToken::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: TaskState::NotStarted,
                cancel_reason: None,
                settled: false,
                worker: None,
            }),
            settled: Condvar::new(),
            listeners: Mutex::new(Vec::new()),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.progress.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                let event = match event {
                    ProgressEvent::Progress(p) => TaskEvent::Progress(*p),
                    ProgressEvent::Status(status) => TaskEvent::Status(status.clone()),
                };
                inner.emit(&event);
            }
        });

        Self { inner }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn command(&self) -> &SharedStage {
        &self.inner.command
    }

    pub fn command_name(&self) -> &str {
        self.inner.command.name()
    }

    pub fn state(&self) -> TaskState {
        lock(&self.inner.lifecycle).state
    }

    pub fn progress(&self) -> ProgressView {
        self.inner.progress.view()
    }

    /// Reason the task was canceled.
    ///
    /// Fails with [`PipelineError::InvalidOperation`] unless the task is in
    /// [`TaskState::Canceled`].
    pub fn cancel_reason(&self) -> Result<Arc<CommandCanceled>> {
        let lifecycle = lock(&self.inner.lifecycle);
        match (&lifecycle.state, &lifecycle.cancel_reason) {
            (TaskState::Canceled, Some(reason)) => Ok(Arc::clone(reason)),
            (state, _) => Err(PipelineError::InvalidOperation(format!(
                "task {} has no cancel reason while {}",
                self.inner.id,
                state.as_str()
            ))),
        }
    }

    /// Registers a listener for task events.
    ///
    /// Listeners run on the thread that produced the event, usually the
    /// worker, and must marshal to their own thread if needed. Waiting on
    /// the task from a listener returns the current state without blocking.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&TaskEvent) + Send + Sync + 'static,
    {
        lock(&self.inner.listeners).push(Arc::new(listener));
    }

    /// Starts the command on a new worker thread and returns immediately.
    ///
    /// The command must accept [`DataType::None`], or accept nothing at all
    /// like an empty chain, which completes at once.
    pub fn run(&self) -> Result<()> {
        let accepted = self.inner.command.input_types();
        if !accepted.is_empty() && !accepted.contains(DataType::None) {
            return Err(PipelineError::InvalidCommand(format!(
                "'{}' cannot start from empty input (accepts {})",
                self.command_name(),
                accepted
            )));
        }

        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            if lifecycle.state != TaskState::NotStarted {
                return Err(PipelineError::InvalidOperation(format!(
                    "task {} was already started",
                    self.inner.id
                )));
            }
            lifecycle.state = TaskState::Started;
        }

        let worker = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("snapflow-task-{}", self.inner.id.0))
            .spawn(move || worker.execute());

        match spawned {
            Ok(_) => {
                log::info!("Task {} started: '{}'", self.inner.id, self.command_name());
                Ok(())
            }
            Err(err) => {
                lock(&self.inner.lifecycle).state = TaskState::NotStarted;
                log::error!("Failed to spawn worker for task {}: {}", self.inner.id, err);
                Err(PipelineError::Io(err))
            }
        }
    }

    /// Requests cooperative cancellation.
    ///
    /// Only affects tasks that are `Started` or `Running`; returns whether
    /// the request was recorded. The command may still complete normally if
    /// it finishes before noticing.
    pub fn cancel(&self) -> bool {
        let lifecycle = lock(&self.inner.lifecycle);
        if matches!(lifecycle.state, TaskState::Started | TaskState::Running) {
            log::info!("Cancel requested for task {}", self.inner.id);
            self.inner.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Blocks until the task reached a terminal state and its final event
    /// was delivered. Returns immediately for a task that was never run and
    /// when called on the task's own worker thread.
    pub fn wait(&self) -> TaskState {
        let mut lifecycle = lock(&self.inner.lifecycle);
        while !lifecycle.settled
            && lifecycle.state != TaskState::NotStarted
            && !on_worker(&lifecycle)
        {
            lifecycle = self
                .inner
                .settled
                .wait(lifecycle)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        lifecycle.state
    }

    /// Like [`CommandTask::wait`], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskState> {
        let deadline = Instant::now() + timeout;
        let mut lifecycle = lock(&self.inner.lifecycle);
        while !lifecycle.settled
            && lifecycle.state != TaskState::NotStarted
            && !on_worker(&lifecycle)
        {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .inner
                .settled
                .wait_timeout(lifecycle, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            lifecycle = guard;
        }
        Some(lifecycle.state)
    }

    fn execute(&self) {
        let inner = &self.inner;
        {
            let mut lifecycle = lock(&inner.lifecycle);
            lifecycle.state = TaskState::Running;
            lifecycle.worker = Some(thread::current().id());
        }
        inner.emit(&TaskEvent::Started);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            inner
                .command
                .process(TypedData::none(), &inner.progress, &inner.cancel)
        }));
        let result = outcome.unwrap_or_else(|payload| {
            Err(PipelineError::Panicked(panic_message(payload.as_ref())))
        });

        match result {
            Ok(output) => {
                if let Some(data) = output {
                    // Only side effects matter for a standalone command
                    data.dispose();
                }
                log::info!("Task {} completed: '{}'", inner.id, self.command_name());
                lock(&inner.lifecycle).state = TaskState::Completed;
                inner.emit(&TaskEvent::Completed);
            }
            Err(err) => {
                let reason = Arc::new(CommandCanceled {
                    task_id: inner.id,
                    command: self.command_name().to_string(),
                    source: err,
                });
                if reason.is_user_cancel() {
                    log::info!("{}", reason);
                } else {
                    log::warn!("{}", reason);
                }
                {
                    let mut lifecycle = lock(&inner.lifecycle);
                    lifecycle.state = TaskState::Canceled;
                    lifecycle.cancel_reason = Some(Arc::clone(&reason));
                }
                inner.emit(&TaskEvent::Canceled(reason));
            }
        }

        lock(&inner.lifecycle).settled = true;
        inner.settled.notify_all();
    }
}

impl Inner {
    fn emit(&self, event: &TaskEvent) {
        let listeners: Vec<Listener> = lock(&self.listeners).iter().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for CommandTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTask")
            .field("id", &self.inner.id)
            .field("command", &self.command_name())
            .field("state", &self.state())
            .finish()
    }
}

fn on_worker(lifecycle: &Lifecycle) -> bool {
    lifecycle.worker == Some(thread::current().id())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
