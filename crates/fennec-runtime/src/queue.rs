use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use parking_lot::Mutex;
use tracing::{debug, info};

use fennec_core::{Task, TaskId, TaskStatus};

/// A task claimed by a worker, with the cancellation token observed at the
/// loop's step boundaries.
pub struct ClaimedTask {
    pub task: Task,
    pub cancel: CancellationToken,
}

struct QueueInner {
    /// Waiting tasks with a monotonic sequence for FIFO fairness.
    queued: Vec<(u64, Task)>,
    next_seq: u64,
    /// Latest snapshot of every task the queue has seen.
    catalog: HashMap<TaskId, Task>,
    /// Cancellation tokens for running tasks.
    tokens: HashMap<TaskId, CancellationToken>,
}

/// The single logical task queue feeding the worker pool.
///
/// Ordering: priority descending, then `created_at` ascending, then arrival
/// order. A task is claimed exactly once — the pop happens under the queue
/// lock and flips the status to Running in the same critical section, so two
/// workers can never hold the same task. The running count is the only
/// globally shared mutable counter and is adjusted atomically on
/// claim/terminal transitions.
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    running: AtomicUsize,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                queued: Vec::new(),
                next_seq: 0,
                catalog: HashMap::new(),
                tokens: HashMap::new(),
            }),
            notify: Notify::new(),
            running: AtomicUsize::new(0),
        }
    }

    /// Add a task to the queue. Returns its id.
    pub fn enqueue(&self, mut task: Task) -> TaskId {
        task.status = TaskStatus::Queued;
        let id = task.id;
        {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.catalog.insert(id, task.clone());
            inner.queued.push((seq, task));
        }
        debug!(task_id = %id, "task enqueued");
        self.notify.notify_one();
        id
    }

    /// Claim the next task, suspending while the queue is empty.
    pub async fn dequeue(&self) -> ClaimedTask {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                if let Some(idx) = best_index(&inner.queued) {
                    let (_, mut task) = inner.queued.remove(idx);
                    task.status = TaskStatus::Running;
                    inner.catalog.insert(task.id, task.clone());
                    let cancel = CancellationToken::new();
                    inner.tokens.insert(task.id, cancel.clone());
                    self.running.fetch_add(1, Ordering::SeqCst);
                    debug!(task_id = %task.id, "task claimed");
                    return ClaimedTask { task, cancel };
                }
            }
            notified.await;
        }
    }

    /// Record a claimed task's terminal status and release its slot.
    pub fn finish(&self, task_id: TaskId, status: TaskStatus) {
        debug_assert!(status.is_terminal());
        let mut inner = self.inner.lock();
        if let Some(task) = inner.catalog.get_mut(&task_id) {
            task.status = status;
        }
        inner.tokens.remove(&task_id);
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    /// Cancel a task. A still-queued task is removed immediately; a running
    /// task has its token tripped and the loop observes it at the next step
    /// boundary. Returns false for unknown or already-terminal tasks.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        let mut inner = self.inner.lock();

        if let Some(idx) = inner.queued.iter().position(|(_, t)| t.id == task_id) {
            inner.queued.remove(idx);
            if let Some(task) = inner.catalog.get_mut(&task_id) {
                task.status = TaskStatus::Cancelled;
            }
            info!(task_id = %task_id, "queued task cancelled");
            return true;
        }

        if let Some(token) = inner.tokens.get(&task_id) {
            token.cancel();
            info!(task_id = %task_id, "cancellation signalled to running task");
            return true;
        }

        false
    }

    /// Latest known status of a task.
    pub fn status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.inner.lock().catalog.get(&task_id).map(|t| t.status)
    }

    /// Latest snapshot of a task.
    pub fn task(&self, task_id: TaskId) -> Option<Task> {
        self.inner.lock().catalog.get(&task_id).cloned()
    }

    /// Whether a task has reached a terminal status. Unknown tasks count as
    /// terminal (nothing is in flight for them).
    pub fn is_terminal(&self, task_id: TaskId) -> bool {
        self.status(task_id).map(|s| s.is_terminal()).unwrap_or(true)
    }

    /// Number of tasks waiting to be claimed.
    pub fn depth(&self) -> usize {
        self.inner.lock().queued.len()
    }

    /// Number of tasks currently running.
    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// All known tasks, most recent first.
    pub fn list_tasks(&self, limit: usize) -> Vec<Task> {
        let inner = self.inner.lock();
        let mut tasks: Vec<Task> = inner.catalog.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        tasks
    }
}

/// Index of the best queued entry: highest priority, earliest created_at,
/// earliest arrival.
fn best_index(queued: &[(u64, Task)]) -> Option<usize> {
    queued
        .iter()
        .enumerate()
        .min_by(|(_, (seq_a, a)), (_, (seq_b, b))| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(seq_a.cmp(seq_b))
        })
        .map(|(idx, _)| idx)
}
