use thiserror::Error;

/// Unified error type for the entire Fennec runtime.
#[derive(Error, Debug)]
pub enum FennecError {
    // ── Routing errors ─────────────────────────────────────────
    /// No registered provider satisfies the request's capability filter.
    /// Fatal to the request; never retried internally.
    #[error("no eligible provider: {0}")]
    Routing(String),

    /// Every entry of the fallback chain was attempted and failed.
    #[error("all providers exhausted after {attempts} attempts")]
    AllProvidersExhausted { attempts: usize },

    // ── Provider errors ────────────────────────────────────────
    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("token budget exceeded: {resource}: used {used}, limit {limit}")]
    TokenBudgetExceeded {
        resource: String,
        used: u64,
        limit: u64,
    },

    // ── Agent loop errors ──────────────────────────────────────
    #[error("step budget exceeded: {limit} steps")]
    StepBudgetExceeded { limit: u32 },

    #[error("time budget exceeded: {limit_secs}s")]
    TimeBudgetExceeded { limit_secs: u64 },

    /// A delegated sub-agent ran out of its non-renewable budget.
    #[error("sub-agent budget exhausted: {resource}: used {used}, limit {limit}")]
    BudgetExhausted {
        resource: String,
        used: u64,
        limit: u64,
    },

    #[error("task cancelled")]
    Cancelled,

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool invocation failed: {tool}: {reason}")]
    ToolInvocation { tool: String, reason: String },

    // ── Memory errors ──────────────────────────────────────────
    /// A long-term memory write failed. Surfaced to the caller: losing
    /// memory is a correctness-relevant event for a persistent agent.
    #[error("memory write failed: {0}")]
    MemoryWrite(String),

    #[error("memory error: {0}")]
    Memory(String),

    // ── Queue / scheduler errors ───────────────────────────────
    #[error("queue error: {0}")]
    Queue(String),

    #[error("invalid trigger: {0}")]
    Trigger(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FennecError>;
