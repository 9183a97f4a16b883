//! Central dispatcher that runs commands and re-publishes their events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;

use crate::error::Result;
use crate::stage::SharedStage;
use crate::task::{CommandTask, TaskEvent, TaskId};

/// A task event tagged with the task it came from.
#[derive(Debug, Clone)]
pub struct RunnerEvent {
    pub task_id: TaskId,
    pub command: String,
    pub event: TaskEvent,
}

#[derive(Default)]
struct RunnerInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<RunnerEvent>>>,
    tasks: Mutex<Vec<CommandTask>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RunnerInner {
    fn publish(&self, event: RunnerEvent) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Runs commands, one dedicated worker thread per task, without a limit on
/// concurrent tasks.
///
/// Every event of every task is forwarded to all receivers returned by
/// [`CommandRunner::subscribe`]. Clones share the same runner.
#[derive(Clone, Default)]
pub struct CommandRunner {
    inner: Arc<RunnerInner>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `command` and returns its task handle immediately.
    ///
    /// Fails with `InvalidCommand` before any worker starts if the command
    /// cannot run from empty input.
    pub fn run(&self, command: SharedStage) -> Result<CommandTask> {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let task = CommandTask::with_id(id, command);
        let command_name = task.command_name().to_string();

        let weak: Weak<RunnerInner> = Arc::downgrade(&self.inner);
        task.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.publish(RunnerEvent {
                    task_id: id,
                    command: command_name.clone(),
                    event: event.clone(),
                });
            }
        });

        task.run()?;

        let mut tasks = lock(&self.inner.tasks);
        tasks.retain(|tracked| !tracked.state().is_terminal());
        tasks.push(task.clone());
        Ok(task)
    }

    /// Receives events of every task started after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RunnerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.subscribers).push(tx);
        rx
    }

    /// Number of tasks that have not reached a terminal state.
    pub fn active_tasks(&self) -> usize {
        let mut tasks = lock(&self.inner.tasks);
        tasks.retain(|task| !task.state().is_terminal());
        tasks.len()
    }

    /// Requests cancellation of every running task.
    pub fn cancel_all(&self) -> usize {
        lock(&self.inner.tasks)
            .iter()
            .filter(|task| task.cancel())
            .count()
    }
}
