//! # fennec-config
//!
//! TOML configuration for the Fennec runtime: provider profiles, budgets,
//! memory settings, scheduler triggers, and logging. Configuration is loaded
//! once at startup and is immutable for the process lifetime — changing it
//! requires a restart.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    AgentConfig, BudgetConfig, DelegationConfig, EmbeddingConfig, FennecConfig, LoggingConfig,
    MemoryConfig, ProviderAdapterKind, ProviderConfig, RouterConfig, SchedulerConfig,
    TriggerConfig,
};
