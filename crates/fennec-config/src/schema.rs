use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use fennec_core::{Capability, LatencyClass};

/// Root configuration — maps to `fennec.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FennecConfig {
    pub agent: AgentConfig,
    pub router: RouterConfig,
    pub budget: BudgetConfig,
    pub providers: Vec<ProviderConfig>,
    pub memory: MemoryConfig,
    pub scheduler: SchedulerConfig,
    pub delegation: DelegationConfig,
    pub logging: LoggingConfig,
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// System prompt injected at the start of every reasoning step.
    pub system_prompt: Option<String>,
    /// Maximum reasoning steps per task before forcing a stop.
    pub max_steps: u32,
    /// Maximum wall-clock seconds per task before forcing a stop.
    pub time_budget_secs: u64,
    /// Maximum tokens per LLM response.
    pub max_tokens: u32,
    /// Temperature (0.0 - 2.0).
    pub temperature: f32,
    /// How many recent turns to feed into each reasoning step.
    pub recent_turns: usize,
    /// How many long-term memories to recall per step.
    pub recall_top_k: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_steps: 10,
            time_budget_secs: 300,
            max_tokens: 4096,
            temperature: 0.7,
            recent_turns: 50,
            recall_top_k: 5,
        }
    }
}

// ── Router ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-attempt timeout for a single provider call, in seconds.
    pub attempt_timeout_secs: u64,
    /// Provider-name preference order used to break ties between providers
    /// with equal cost weight and latency class. Names listed earlier win;
    /// unlisted providers fall back to lexicographic order.
    pub tie_break: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 120,
            tie_break: vec![],
        }
    }
}

// ── Token budget ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Enforce token budgets at the router.
    pub enabled: bool,
    /// Maximum tokens per calendar day (UTC).
    pub daily_tokens: u64,
    /// Maximum tokens per single task run.
    pub per_run_tokens: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_tokens: 500_000,
            per_run_tokens: 50_000,
        }
    }
}

// ── Providers ──────────────────────────────────────────────────

/// Which adapter implementation backs a provider profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderAdapterKind {
    /// Anthropic messages API.
    Anthropic,
    /// Google Gemini generateContent API (search grounding).
    Gemini,
    /// Any OpenAI-compatible chat completions endpoint (xAI, etc.)
    OpenaiCompat,
    /// Local Ollama-style server.
    Local,
    /// Scripted in-process provider for tests.
    Mock,
}

/// One LLM backend: its adapter, model, and routing attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name, e.g. "claude", "gemini", "ollama".
    pub name: String,
    pub adapter: ProviderAdapterKind,
    /// Model identifier passed to the adapter.
    pub model: String,
    /// Capability tags this backend serves.
    pub capabilities: Vec<Capability>,
    /// Relative cost; the router prefers lower weights. Local models use 0.
    #[serde(default = "default_cost_weight")]
    pub cost_weight: u32,
    #[serde(default = "default_latency_class")]
    pub latency_class: LatencyClass,
    /// API key. Falls back to the adapter's conventional env var when unset.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Endpoint override (required for openai_compat, optional elsewhere).
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_cost_weight() -> u32 {
    100
}

fn default_latency_class() -> LatencyClass {
    LatencyClass::Standard
}

// ── Memory ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
    /// Embedding dimensionality — fixed per deployment.
    pub embedding_dims: usize,
    /// Maximum short-term turns kept per task (FIFO eviction beyond this).
    pub short_term_max_turns: usize,
    /// Summarize evicted short-term turns into long-term memory.
    pub summarize_evicted: bool,
    /// Minimum evicted-batch size worth summarizing.
    pub min_turns_to_summarize: usize,
    /// Embedding backend for long-term recall (None disables recall).
    pub embedding: Option<EmbeddingConfig>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("fennec.db"),
            embedding_dims: 768,
            short_term_max_turns: 50,
            summarize_evicted: true,
            min_turns_to_summarize: 4,
            embedding: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "local" (Ollama-style) or "openai".
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

// ── Scheduler ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum tasks in the running state at once (worker pool size).
    pub concurrency: usize,
    /// How often the trigger evaluator checks for due triggers, in seconds.
    pub tick_secs: u64,
    /// Cron triggers loaded at startup.
    pub triggers: Vec<TriggerConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            tick_secs: 10,
            triggers: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub name: String,
    /// Cron expression (seconds-resolution, 6 or 7 fields).
    pub cron: String,
    /// The prompt enqueued as a task payload when the trigger fires.
    pub prompt: String,
    #[serde(default = "default_trigger_priority")]
    pub priority: u8,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_trigger_priority() -> u8 {
    3
}

// ── Delegation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    /// Default reasoning-step budget for a delegated sub-agent.
    pub max_steps: u32,
    /// Default tool-call budget for a delegated sub-agent.
    pub max_tool_calls: u32,
    /// Default wall-clock budget for a delegated sub-agent, in seconds.
    pub max_wall_clock_secs: u64,
    /// Maximum sub-agents running at once across all parents.
    pub max_concurrent: usize,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            max_steps: 5,
            max_tool_calls: 10,
            max_wall_clock_secs: 120,
            max_concurrent: 3,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
    /// Log file path (None = stdout only).
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            file: None,
        }
    }
}

// ── Default for root ───────────────────────────────────────────

impl Default for FennecConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            router: RouterConfig::default(),
            budget: BudgetConfig::default(),
            providers: vec![],
            memory: MemoryConfig::default(),
            scheduler: SchedulerConfig::default(),
            delegation: DelegationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
            WarningSeverity::Info => "💡",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl FennecConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Providers ───
        if self.providers.is_empty() {
            warnings.push(ConfigWarning {
                field: "providers".into(),
                message: "no providers configured — the agent cannot think".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Add at least one [[providers]] entry".into()),
            });
        }

        let mut seen_names = std::collections::HashSet::new();
        for p in &self.providers {
            if !seen_names.insert(p.name.as_str()) {
                warnings.push(ConfigWarning {
                    field: format!("providers.{}", p.name),
                    message: "duplicate provider name".into(),
                    severity: WarningSeverity::Error,
                    hint: Some("Provider names must be unique".into()),
                });
            }
            if p.capabilities.is_empty() {
                warnings.push(ConfigWarning {
                    field: format!("providers.{}.capabilities", p.name),
                    message: "no capability tags — this provider can never be routed to".into(),
                    severity: WarningSeverity::Warning,
                    hint: Some("Tag it with e.g. [\"reasoning\", \"tool_use\"]".into()),
                });
            }
            if p.adapter == ProviderAdapterKind::OpenaiCompat && p.base_url.is_none() {
                warnings.push(ConfigWarning {
                    field: format!("providers.{}.base_url", p.name),
                    message: "openai_compat adapter needs a base_url".into(),
                    severity: WarningSeverity::Error,
                    hint: Some("Set to e.g. 'https://api.x.ai/v1'".into()),
                });
            }
        }

        // ── Temperature ───
        if self.agent.temperature < 0.0 || self.agent.temperature > 2.0 {
            warnings.push(ConfigWarning {
                field: "agent.temperature".into(),
                message: format!("temperature {} is out of range", self.agent.temperature),
                severity: WarningSeverity::Error,
                hint: Some("Temperature must be between 0.0 and 2.0".into()),
            });
        }

        // ── Step budget ───
        if self.agent.max_steps == 0 {
            warnings.push(ConfigWarning {
                field: "agent.max_steps".into(),
                message: "max_steps is 0 — every task would fail immediately".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 10".into()),
            });
        }

        // ── Concurrency ───
        if self.scheduler.concurrency == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.concurrency".into(),
                message: "concurrency is 0 — no worker would ever claim a task".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 4".into()),
            });
        }

        // ── Embedding dims ───
        if self.memory.embedding_dims == 0 {
            warnings.push(ConfigWarning {
                field: "memory.embedding_dims".into(),
                message: "embedding_dims is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to the dimensionality of your embedding model, e.g. 768".into()),
            });
        }

        // ── Delegation budget ───
        if self.delegation.max_steps == 0 || self.delegation.max_wall_clock_secs == 0 {
            warnings.push(ConfigWarning {
                field: "delegation".into(),
                message: "zero delegation budget — sub-agents would fail instantly".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Token budget ───
        if self.budget.enabled && self.budget.per_run_tokens > self.budget.daily_tokens {
            warnings.push(ConfigWarning {
                field: "budget.per_run_tokens".into(),
                message: "per-run budget exceeds the daily budget".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Logging ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
