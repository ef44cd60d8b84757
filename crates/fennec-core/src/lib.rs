//! # fennec-core
//!
//! Core types, traits, and primitives for the Fennec autonomous agent runtime.
//! This crate defines the shared vocabulary used by every other crate in the
//! workspace: tasks, conversation turns, step events, the tool contract, and
//! the unified error type.

pub mod error;
pub mod event;
pub mod tool;
pub mod turn;
pub mod types;

pub use error::{FennecError, Result};
pub use event::{EventBus, StepEvent};
pub use tool::{Tool, ToolCall, ToolExecutor, ToolResult};
pub use turn::{ConversationTurn, Role};
pub use types::{Capability, LatencyClass, Task, TaskId, TaskOrigin, TaskStatus};
