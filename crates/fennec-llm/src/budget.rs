use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use fennec_core::{FennecError, Result};

/// Tracks token spending across providers and enforces hard caps.
///
/// Two limits: a daily cap (resets at UTC midnight) checked and recorded by
/// the router, and a per-run cap checked by the agent loop against the
/// tokens its own steps have consumed.
#[derive(Debug, Clone)]
pub struct TokenBudget {
    state: Arc<RwLock<BudgetState>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetState {
    /// Current day (resets daily).
    pub current_day: String,
    /// Tokens used today.
    pub daily_used: u64,
    /// Daily token limit.
    pub daily_limit: u64,
    /// Per-task-run token limit.
    pub per_run_limit: u64,
    /// Total tokens since tracking started.
    pub total_used: u64,
}

impl TokenBudget {
    pub fn new(daily_limit: u64, per_run_limit: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(BudgetState {
                current_day: today(),
                daily_used: 0,
                daily_limit,
                per_run_limit,
                total_used: 0,
            })),
        }
    }

    /// Check the daily budget without recording.
    pub fn check(&self) -> Result<()> {
        let mut state = self.state.write();
        maybe_reset_day(&mut state);
        if state.daily_used >= state.daily_limit {
            return Err(FennecError::TokenBudgetExceeded {
                resource: "daily_tokens".into(),
                used: state.daily_used,
                limit: state.daily_limit,
            });
        }
        Ok(())
    }

    /// Record token usage from a completed provider call.
    pub fn record(&self, tokens: u64) {
        let mut state = self.state.write();
        maybe_reset_day(&mut state);
        state.daily_used += tokens;
        state.total_used += tokens;
        if state.daily_used > state.daily_limit {
            warn!(
                used = state.daily_used,
                limit = state.daily_limit,
                "daily token budget exceeded"
            );
        }
    }

    /// Check a run's accumulated tokens against the per-run cap.
    pub fn check_run(&self, run_tokens: u64) -> Result<()> {
        let limit = self.state.read().per_run_limit;
        if run_tokens >= limit {
            return Err(FennecError::TokenBudgetExceeded {
                resource: "per_run_tokens".into(),
                used: run_tokens,
                limit,
            });
        }
        Ok(())
    }

    /// Get the current budget state.
    pub fn snapshot(&self) -> BudgetState {
        self.state.read().clone()
    }
}

fn maybe_reset_day(state: &mut BudgetState) {
    let day = today();
    if state.current_day != day {
        state.current_day = day;
        state.daily_used = 0;
    }
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
