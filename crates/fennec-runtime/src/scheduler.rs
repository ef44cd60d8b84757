//! Trigger evaluator — turns time-based triggers into queued tasks.
//!
//! Two kinds of trigger:
//! - **Cron**: fires on a cron expression (e.g. `"0 */5 * * * *"` for every
//!   five minutes).
//! - **OneShot**: fires once at a fixed time, then deactivates.
//!
//! A firing enqueues a task (origin = Scheduler) through the same queue user
//! messages travel — there is no special-cased autonomous code path. If the
//! previous firing's task has not reached a terminal state yet, the firing
//! is skipped (skip-if-busy) so a stuck agent cannot grow an unbounded
//! backlog.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use fennec_core::{Task, TaskId, TaskOrigin};

use crate::queue::TaskQueue;

/// A registered trigger.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub id: Uuid,
    /// Human-readable label for this trigger.
    pub name: Option<String>,
    /// The prompt enqueued as the task payload when the trigger fires.
    pub prompt: String,
    pub kind: TriggerKind,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub fire_count: u64,
    pub last_fired: Option<DateTime<Utc>>,
    /// The task enqueued by the most recent firing — consulted for the
    /// skip-if-busy policy.
    pub last_task: Option<TaskId>,
}

#[derive(Debug, Clone)]
pub enum TriggerKind {
    /// Recurring schedule based on a cron expression.
    Cron { expression: String },
    /// Fires once at the specified time.
    OneShot { fire_at: DateTime<Utc> },
}

/// The trigger evaluator. Shares the one task queue with every other
/// producer.
pub struct TriggerScheduler {
    triggers: Mutex<HashMap<Uuid, Trigger>>,
    queue: Arc<TaskQueue>,
}

impl TriggerScheduler {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self {
            triggers: Mutex::new(HashMap::new()),
            queue,
        }
    }

    /// Register a recurring cron trigger. Deduplicates: an active trigger
    /// with the same name, or the same expression and prompt, is reused.
    pub fn add_cron(
        &self,
        prompt: impl Into<String>,
        cron_expr: &str,
        name: Option<String>,
        priority: u8,
    ) -> fennec_core::Result<Uuid> {
        let prompt = prompt.into();
        Schedule::from_str(cron_expr).map_err(|e| {
            fennec_core::FennecError::Trigger(format!("invalid cron expression: {e}"))
        })?;

        let mut triggers = self.triggers.lock();

        for existing in triggers.values() {
            if !existing.active {
                continue;
            }
            if let (Some(existing_name), Some(new_name)) = (&existing.name, &name)
                && existing_name == new_name
            {
                info!(trigger_id = %existing.id, name = %new_name, "cron trigger already exists — reusing");
                return Ok(existing.id);
            }
            if let TriggerKind::Cron { expression } = &existing.kind
                && expression == cron_expr
                && existing.prompt == prompt
            {
                info!(trigger_id = %existing.id, cron = cron_expr, "cron trigger already exists — reusing");
                return Ok(existing.id);
            }
        }

        let trigger = Trigger {
            id: Uuid::new_v4(),
            name,
            prompt,
            kind: TriggerKind::Cron {
                expression: cron_expr.to_string(),
            },
            priority,
            created_at: Utc::now(),
            active: true,
            fire_count: 0,
            last_fired: None,
            last_task: None,
        };

        let id = trigger.id;
        triggers.insert(id, trigger);
        info!(trigger_id = %id, cron = cron_expr, "registered recurring trigger");
        Ok(id)
    }

    /// Register a one-shot trigger firing after `delay_seconds`.
    pub fn add_one_shot(
        &self,
        prompt: impl Into<String>,
        delay_seconds: u64,
        name: Option<String>,
        priority: u8,
    ) -> Uuid {
        let fire_at = Utc::now() + chrono::Duration::seconds(delay_seconds as i64);
        let trigger = Trigger {
            id: Uuid::new_v4(),
            name,
            prompt: prompt.into(),
            kind: TriggerKind::OneShot { fire_at },
            priority,
            created_at: Utc::now(),
            active: true,
            fire_count: 0,
            last_fired: None,
            last_task: None,
        };

        let id = trigger.id;
        self.triggers.lock().insert(id, trigger);
        info!(trigger_id = %id, delay_secs = delay_seconds, fire_at = %fire_at, "registered one-shot trigger");
        id
    }

    /// Remove a trigger.
    pub fn remove(&self, trigger_id: Uuid) -> bool {
        self.triggers.lock().remove(&trigger_id).is_some()
    }

    /// List all triggers.
    pub fn list(&self) -> Vec<Trigger> {
        self.triggers.lock().values().cloned().collect()
    }

    /// Number of active triggers.
    pub fn active_count(&self) -> usize {
        self.triggers.lock().values().filter(|t| t.active).count()
    }

    /// Evaluate all triggers against `now`, enqueueing a task for each due
    /// firing. Returns the enqueued task ids. Exposed separately from the
    /// tick loop so the policy is directly testable.
    pub fn fire_due(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut triggers = self.triggers.lock();
        let mut fired = Vec::new();
        let mut to_deactivate: Vec<Uuid> = Vec::new();

        for trigger in triggers.values_mut() {
            if !trigger.active {
                continue;
            }

            let due = match &trigger.kind {
                TriggerKind::Cron { expression } => match Schedule::from_str(expression) {
                    Ok(schedule) => {
                        let since = trigger.last_fired.unwrap_or(trigger.created_at);
                        schedule
                            .after(&since)
                            .take(1)
                            .next()
                            .is_some_and(|next| next <= now)
                    }
                    Err(e) => {
                        error!(trigger_id = %trigger.id, error = %e, "invalid cron expression — deactivating");
                        to_deactivate.push(trigger.id);
                        false
                    }
                },
                TriggerKind::OneShot { fire_at } => now >= *fire_at,
            };

            if !due {
                continue;
            }

            // Skip-if-busy: the previous firing's task must reach a terminal
            // state before this trigger may enqueue another one.
            if let Some(last) = trigger.last_task
                && !self.queue.is_terminal(last)
            {
                debug!(
                    trigger_id = %trigger.id,
                    busy_task = %last,
                    "trigger due but previous task still in flight — skipping"
                );
                trigger.last_fired = Some(now);
                continue;
            }

            let mut task = Task::new(TaskOrigin::Scheduler, trigger.prompt.clone())
                .with_priority(trigger.priority);
            if let Some(ref name) = trigger.name {
                task = task.with_trigger(name.clone());
            }
            let task_id = self.queue.enqueue(task);

            debug!(
                trigger_id = %trigger.id,
                task_id = %task_id,
                fire_count = trigger.fire_count + 1,
                "trigger fired"
            );

            trigger.fire_count += 1;
            trigger.last_fired = Some(now);
            trigger.last_task = Some(task_id);
            fired.push(task_id);

            if matches!(trigger.kind, TriggerKind::OneShot { .. }) {
                to_deactivate.push(trigger.id);
            }
        }

        for id in to_deactivate {
            if let Some(trigger) = triggers.get_mut(&id) {
                trigger.active = false;
                debug!(trigger_id = %id, "trigger deactivated");
            }
        }

        fired
    }

    /// Run the evaluator loop until shutdown. Spawn as a background task.
    pub async fn run(self: Arc<Self>, tick: std::time::Duration, shutdown: CancellationToken) {
        info!(tick_secs = tick.as_secs(), "trigger scheduler started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("trigger scheduler shutting down");
                    return;
                }
                _ = tokio::time::sleep(tick) => {
                    self.fire_due(Utc::now());
                }
            }
        }
    }
}
