use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::task::{TaskCallback, TaskId, TaskOptions, TaskOutcome};
use super::SchedulerError;
use crate::config::SchedulerConfig;
use crate::constants::TaskStatus;

type TaskWork = Box<dyn FnOnce(ProgressReporter) -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

tokio::task_local! {
    /// Slot held by the scheduler task being polled
    static SLOT: SlotLease;
}

/// Ties a running task to the scheduler whose slot it occupies
#[derive(Clone)]
struct SlotLease {
    /// Address of the owning scheduler's shared state
    owner: usize,
    /// Nested `wait_tasks` calls currently lending the slot
    lent: Arc<AtomicUsize>,
}

/// Returns a lent slot to its task when the wait ends or is dropped
struct LentSlot<'a> {
    inner: &'a Inner,
    lent: Arc<AtomicUsize>,
}

impl Drop for LentSlot<'_> {
    fn drop(&mut self) {
        if self.lent.fetch_sub(1, AtomicOrdering::AcqRel) == 1 {
            self.inner.state.lock().running += 1;
        }
    }
}

/// Bounded-concurrency, priority-ordered task runner
///
/// Cloning yields another handle to the same scheduler. The dispatch loop is
/// spawned on the current tokio runtime by the first registration and exits
/// on [`AsyncOperator::stop`] or when the last handle is dropped.
///
/// # Example
///
/// ```rust
/// use fleet_core::scheduler::{AsyncOperator, TaskOptions};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let operator = AsyncOperator::new(4, None);
/// let id = operator
///     .register(TaskOptions::default(), |progress| async move {
///         progress.report(50);
///         Ok(serde_json::json!("done"))
///     })
///     .unwrap();
/// assert!(operator.wait_tasks(Some(&[id]), Duration::from_secs(5)).await);
/// # }
/// ```
#[derive(Clone)]
pub struct AsyncOperator {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    wake: Arc<Notify>,
    /// Bumped after every task turns terminal
    completions: watch::Sender<u64>,
    max_concurrency: usize,
    maxsize_pending: Option<usize>,
}

#[derive(Default)]
struct State {
    queue: BinaryHeap<Reverse<QueueEntry>>,
    tasks: HashMap<TaskId, TaskEntry>,
    running: usize,
    sequence: u64,
    stopped: bool,
    loop_started: bool,
}

struct TaskEntry {
    status: TaskStatus,
    priority: i32,
    progress: u8,
    job: Option<(TaskWork, Option<TaskCallback>)>,
    outcome: Option<TaskOutcome>,
}

#[derive(Debug, PartialEq, Eq)]
struct QueueEntry {
    priority: i32,
    sequence: u64,
    task_id: TaskId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.sequence).cmp(&(other.priority, other.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // lets a parked dispatch loop observe that the scheduler is gone
        self.wake.notify_one();
    }
}

/// Handle given to a running task for reporting its progress
#[derive(Clone)]
pub struct ProgressReporter {
    task_id: TaskId,
    inner: Weak<Inner>,
}

impl ProgressReporter {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Record progress in percent, clamped to 0..=100
    pub fn report(&self, percent: u8) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut state = inner.state.lock();
        if let Some(entry) = state.tasks.get_mut(&self.task_id) {
            if entry.status == TaskStatus::Running {
                entry.progress = percent.min(100);
            }
        }
    }
}

impl AsyncOperator {
    /// `maxsize_pending` of `None` leaves the backlog unbounded.
    pub fn new(max_concurrency: usize, maxsize_pending: Option<usize>) -> Self {
        let (completions, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                wake: Arc::new(Notify::new()),
                completions,
                max_concurrency: max_concurrency.max(1),
                maxsize_pending,
            }),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.max_concurrency, config.maxsize_pending)
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Enqueue `work`; it receives a [`ProgressReporter`] when it starts.
    ///
    /// Fails with [`SchedulerError::Full`] when the backlog bound would be
    /// exceeded. Already accepted tasks are unaffected by a rejection.
    pub fn register<F, Fut>(&self, options: TaskOptions, work: F) -> Result<TaskId, SchedulerError>
    where
        F: FnOnce(ProgressReporter) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let priority = options.resolved_priority();
        let work: TaskWork = Box::new(move |reporter| work(reporter).boxed());
        let task_id = Uuid::new_v4();

        let spawn_loop = {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return Err(SchedulerError::Stopped);
            }
            if let Some(limit) = self.inner.maxsize_pending {
                if state.queue.len() >= limit {
                    warn!(limit, "🏊 SCHEDULER: Backlog full, rejecting task");
                    return Err(SchedulerError::Full { limit });
                }
            }

            let spawn_loop = !state.loop_started;
            if spawn_loop {
                tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
                state.loop_started = true;
            }

            state.sequence += 1;
            let sequence = state.sequence;
            state.queue.push(Reverse(QueueEntry {
                priority,
                sequence,
                task_id,
            }));
            state.tasks.insert(
                task_id,
                TaskEntry {
                    status: TaskStatus::Pending,
                    priority,
                    progress: 0,
                    job: Some((work, options.callback)),
                    outcome: None,
                },
            );
            spawn_loop
        };

        if spawn_loop {
            let wake = Arc::clone(&self.inner.wake);
            let weak = Arc::downgrade(&self.inner);
            tokio::spawn(dispatch_loop(weak, wake));
            debug!("🏊 SCHEDULER: Dispatch loop started");
        }

        debug!(task_id = %task_id, priority, "🏊 SCHEDULER: Task registered");
        self.inner.wake.notify_one();
        Ok(task_id)
    }

    /// Wait until every task in `ids` (default: all currently active tasks)
    /// is terminal. Returns `false` when `timeout` elapses first.
    ///
    /// Ids the scheduler does not know (never registered or purged) count as
    /// terminal.
    ///
    /// Called from inside one of this scheduler's own tasks, the caller's
    /// slot is lent to the queue for the duration of the wait, so tasks
    /// waiting on their own sub-tasks never starve them.
    pub async fn wait_tasks(&self, ids: Option<&[TaskId]>, timeout: Duration) -> bool {
        let mut completions = self.inner.completions.subscribe();
        let targets: Vec<TaskId> = match ids {
            Some(ids) => ids.to_vec(),
            None => {
                let state = self.inner.state.lock();
                state
                    .tasks
                    .iter()
                    .filter(|(_, entry)| entry.status.is_active())
                    .map(|(id, _)| *id)
                    .collect()
            }
        };
        let deadline = tokio::time::Instant::now() + timeout;
        if self.all_terminal(&targets) {
            return true;
        }
        let _lent = self.lend_slot();

        loop {
            if self.all_terminal(&targets) {
                return true;
            }
            match tokio::time::timeout_at(deadline, completions.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return self.all_terminal(&targets),
            }
        }
    }

    /// Release the calling task's slot when it belongs to this scheduler
    fn lend_slot(&self) -> Option<LentSlot<'_>> {
        let owner = Arc::as_ptr(&self.inner) as usize;
        let lent = SLOT
            .try_with(|lease| (lease.owner == owner).then(|| Arc::clone(&lease.lent)))
            .ok()
            .flatten()?;

        if lent.fetch_add(1, AtomicOrdering::AcqRel) == 0 {
            {
                let mut state = self.inner.state.lock();
                state.running = state.running.saturating_sub(1);
            }
            debug!("🏊 SCHEDULER: Task lent its slot while waiting");
            self.inner.wake.notify_one();
        }
        Some(LentSlot {
            inner: &self.inner,
            lent,
        })
    }

    fn all_terminal(&self, ids: &[TaskId]) -> bool {
        let state = self.inner.state.lock();
        ids.iter().all(|id| {
            state
                .tasks
                .get(id)
                .map_or(true, |entry| entry.status.is_terminal())
        })
    }

    pub fn status(&self, ids: &[TaskId]) -> HashMap<TaskId, TaskStatus> {
        let state = self.inner.state.lock();
        ids.iter()
            .filter_map(|id| state.tasks.get(id).map(|entry| (*id, entry.status)))
            .collect()
    }

    pub fn status_of(&self, id: TaskId) -> Option<TaskStatus> {
        self.inner.state.lock().tasks.get(&id).map(|entry| entry.status)
    }

    pub fn progress(&self, ids: &[TaskId]) -> HashMap<TaskId, u8> {
        let state = self.inner.state.lock();
        ids.iter()
            .filter_map(|id| state.tasks.get(id).map(|entry| (*id, entry.progress)))
            .collect()
    }

    pub fn priority_of(&self, id: TaskId) -> Option<i32> {
        self.inner.state.lock().tasks.get(&id).map(|entry| entry.priority)
    }

    /// Error captured from a task that ended in [`TaskStatus::Error`]
    pub fn exception(&self, id: TaskId) -> Option<String> {
        self.inner
            .state
            .lock()
            .tasks
            .get(&id)
            .and_then(|entry| entry.outcome.as_ref())
            .and_then(|outcome| outcome.error.clone())
    }

    pub fn outcome(&self, id: TaskId) -> Option<TaskOutcome> {
        self.inner
            .state
            .lock()
            .tasks
            .get(&id)
            .and_then(|entry| entry.outcome.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn running_count(&self) -> usize {
        self.inner.state.lock().running
    }

    /// Drop terminal entries, limited to `ids` when given. Returns how many
    /// entries were removed.
    pub fn purge(&self, ids: Option<&[TaskId]>) -> usize {
        let mut state = self.inner.state.lock();
        let before = state.tasks.len();
        match ids {
            Some(ids) => {
                for id in ids {
                    if state
                        .tasks
                        .get(id)
                        .is_some_and(|entry| entry.status.is_terminal())
                    {
                        state.tasks.remove(id);
                    }
                }
            }
            None => state.tasks.retain(|_, entry| entry.status.is_active()),
        }
        before - state.tasks.len()
    }

    /// Stop dispatching and purge every entry that is not running.
    ///
    /// Running tasks finish normally; tasks still waiting for a slot are
    /// dropped without running.
    pub fn stop(&self) {
        let abandoned = {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            let abandoned = state.queue.len();
            state.queue.clear();
            state.tasks.retain(|_, entry| entry.status == TaskStatus::Running);
            abandoned
        };

        info!(abandoned, "🏊 SCHEDULER: Stopped");
        self.inner.completions.send_modify(|generation| *generation += 1);
        self.inner.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }
}

impl std::fmt::Debug for AsyncOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("AsyncOperator")
            .field("max_concurrency", &self.inner.max_concurrency)
            .field("maxsize_pending", &self.inner.maxsize_pending)
            .field("pending", &state.queue.len())
            .field("running", &state.running)
            .field("stopped", &state.stopped)
            .finish()
    }
}

async fn dispatch_loop(inner: Weak<Inner>, wake: Arc<Notify>) {
    loop {
        {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let mut state = inner.state.lock();
            if state.stopped {
                break;
            }
            while state.running < inner.max_concurrency {
                let Some(Reverse(next)) = state.queue.pop() else {
                    break;
                };
                let Some(entry) = state.tasks.get_mut(&next.task_id) else {
                    continue;
                };
                let Some((work, callback)) = entry.job.take() else {
                    continue;
                };
                entry.status = TaskStatus::Running;
                state.running += 1;
                tokio::spawn(run_task(
                    Arc::clone(&inner),
                    next.task_id,
                    work,
                    callback,
                ));
            }
        }
        wake.notified().await;
    }
    debug!("🏊 SCHEDULER: Dispatch loop exited");
}

async fn run_task(
    inner: Arc<Inner>,
    task_id: TaskId,
    work: TaskWork,
    callback: Option<TaskCallback>,
) {
    let started = Instant::now();
    let reporter = ProgressReporter {
        task_id,
        inner: Arc::downgrade(&inner),
    };

    let lease = SlotLease {
        owner: Arc::as_ptr(&inner) as usize,
        lent: Arc::new(AtomicUsize::new(0)),
    };
    let result = AssertUnwindSafe(SLOT.scope(lease, async move { work(reporter).await }))
        .catch_unwind()
        .await;
    let (value, error) = match result {
        Ok(Ok(value)) => (Some(value), None),
        Ok(Err(e)) => (None, Some(format!("{e:#}"))),
        Err(panic) => (None, Some(panic_message(panic.as_ref()))),
    };

    let outcome = TaskOutcome {
        task_id,
        value,
        error,
        elapsed: started.elapsed(),
        finished_at: chrono::Utc::now(),
    };

    if let Some(error) = &outcome.error {
        warn!(task_id = %task_id, error = %error, "🏊 SCHEDULER: Task failed");
    }

    if let Some(callback) = callback {
        if std::panic::catch_unwind(AssertUnwindSafe(|| callback(&outcome))).is_err() {
            warn!(task_id = %task_id, "🏊 SCHEDULER: Task callback panicked");
        }
    }

    {
        let mut state = inner.state.lock();
        state.running = state.running.saturating_sub(1);
        if let Some(entry) = state.tasks.get_mut(&task_id) {
            entry.status = if outcome.is_error() {
                TaskStatus::Error
            } else {
                entry.progress = 100;
                TaskStatus::Finished
            };
            entry.outcome = Some(outcome);
        }
    }

    inner.completions.send_modify(|generation| *generation += 1);
    inner.wake.notify_one();
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("Task panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("Task panicked: {message}")
    } else {
        "Task panicked".to_string()
    }
}
