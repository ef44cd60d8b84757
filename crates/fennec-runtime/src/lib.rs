//! # fennec-runtime
//!
//! The orchestration core: a single task queue consumed by a bounded pool of
//! workers, each running the sequential reasoning loop over one claimed task
//! at a time.
//!
//! ```text
//!   chat transport ──┐
//!   dashboard ───────┼──▶ TaskQueue ──▶ worker pool (≤ N)
//!   trigger cron ────┘         │              │
//!                              │              ▼
//!                              │        ┌───────────────┐
//!                              │        │  Agent Loop    │
//!                              │        │ Plan → Act →   │
//!                              │        │ Reflect        │
//!                              │        └──┬────┬────┬───┘
//!                              │           │    │    │
//!                              ▼           ▼    ▼    ▼
//!                        cancellation   Router Tools Memory
//!                                          │
//!                                          ▼
//!                                    SubAgentOrchestrator
//! ```

pub mod agent_loop;
pub mod queue;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod sub_agent;

pub use agent_loop::{AgentLoop, LoopBudget, LoopOutcome, LoopState, DELEGATE_TOOL};
pub use queue::{ClaimedTask, TaskQueue};
pub use registry::ToolRegistry;
pub use runtime::{AgentRuntime, HealthReport, ProviderHealth, RuntimeHandle};
pub use scheduler::{Trigger, TriggerKind, TriggerScheduler};
pub use sub_agent::{
    SubAgentBudget, SubAgentHandle, SubAgentOrchestrator, SubAgentPreset, SubAgentReport,
};
