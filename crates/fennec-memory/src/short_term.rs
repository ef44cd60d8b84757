use std::collections::{HashMap, VecDeque};

use fennec_core::{ConversationTurn, TaskId};

/// Short-term memory — per-task conversation buffers held in RAM.
///
/// Each task owns its buffer exclusively; no cross-task mutation. Buffers are
/// bounded: appending beyond `max_turns` evicts the oldest turns (FIFO) and
/// returns them to the caller, which may promote them into long-term memory
/// as a best-effort side effect.
pub struct ShortTermMemory {
    buffers: HashMap<TaskId, VecDeque<ConversationTurn>>,
    max_turns: usize,
}

impl ShortTermMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            max_turns: max_turns.max(1),
        }
    }

    /// Append a turn to its task's buffer. Returns the turns evicted to make
    /// room, oldest first (usually empty).
    pub fn append(&mut self, turn: ConversationTurn) -> Vec<ConversationTurn> {
        let buffer = self.buffers.entry(turn.task_id).or_default();
        buffer.push_back(turn);

        let mut evicted = Vec::new();
        while buffer.len() > self.max_turns {
            if let Some(old) = buffer.pop_front() {
                evicted.push(old);
            }
        }
        evicted
    }

    /// The most recent turns for a task, oldest first (most-recent-last).
    pub fn recent(&self, task_id: TaskId, limit: usize) -> Vec<ConversationTurn> {
        self.buffers
            .get(&task_id)
            .map(|buffer| {
                let skip = buffer.len().saturating_sub(limit);
                buffer.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Number of buffered turns for a task.
    pub fn len(&self, task_id: TaskId) -> usize {
        self.buffers.get(&task_id).map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, task_id: TaskId) -> bool {
        self.len(task_id) == 0
    }

    /// Drop a finished task's buffer, returning its remaining turns.
    pub fn release(&mut self, task_id: TaskId) -> Vec<ConversationTurn> {
        self.buffers
            .remove(&task_id)
            .map(|b| b.into_iter().collect())
            .unwrap_or_default()
    }

    /// Tasks that currently hold a buffer.
    pub fn active_tasks(&self) -> Vec<TaskId> {
        self.buffers.keys().copied().collect()
    }
}
