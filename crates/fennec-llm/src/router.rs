use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use fennec_core::{Capability, FennecError, Result};

use crate::budget::TokenBudget;
use crate::provider::{LlmRequest, LlmResponse, ProviderAdapter};

// ── Circuit Breaker ────────────────────────────────────────────

/// Number of consecutive failures before opening the circuit.
const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
/// How long the circuit stays open before allowing a probe request.
const CIRCUIT_OPEN_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    /// Normal operation — requests flow through.
    Closed,
    /// Provider is failing — reject requests immediately.
    Open { since: Instant },
    /// Allow a single probe request to test if the provider recovered.
    HalfOpen,
}

#[derive(Debug)]
struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
        }
    }

    /// Check whether a request should be allowed. This is the availability
    /// probe the routing policy consults.
    fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open { since } => {
                if since.elapsed() >= CIRCUIT_OPEN_DURATION {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            // Already probing — block additional concurrent requests.
            CircuitState::HalfOpen => false,
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= CIRCUIT_FAILURE_THRESHOLD {
            self.state = CircuitState::Open {
                since: Instant::now(),
            };
        }
    }

    fn is_open(&self) -> bool {
        matches!(self.state, CircuitState::Open { .. })
    }
}

// ── Route decision ─────────────────────────────────────────────

/// The chosen provider plus ordered fallback alternates for one request.
/// Ephemeral: recomputed per call, never persisted.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub provider: String,
    /// Remaining eligible providers in selection order.
    pub fallback_chain: Vec<String>,
    /// Why the head was chosen: "hint", "cost", or "only_candidate".
    pub reason: &'static str,
}

/// What happened on one provider attempt.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Success,
    Transient(String),
    Fatal(String),
}

/// Structured record of a single provider attempt. The router emits one per
/// attempt for the caller to persist — it keeps no usage history itself.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub provider: String,
    pub latency_ms: u64,
    pub outcome: AttemptOutcome,
}

/// A successful execution: the response, who served it, and the full
/// attempt trail that led there.
#[derive(Debug)]
pub struct RouterOutcome {
    pub provider: String,
    pub response: LlmResponse,
    pub attempts: Vec<AttemptRecord>,
}

// ── Router ─────────────────────────────────────────────────────

/// Routes requests to the cheapest available capability-matching provider,
/// walking the fallback chain on transient failures.
pub struct LlmRouter {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    /// Circuit breakers keyed by provider name.
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    budget: Option<TokenBudget>,
    /// Fresh timeout applied to every individual provider attempt.
    attempt_timeout: Duration,
    /// Name preference order breaking cost/latency ties.
    tie_break: Vec<String>,
}

/// Check if an error is transient: worth advancing to the next chain entry.
fn is_transient(err: &FennecError) -> bool {
    match err {
        FennecError::RateLimited { .. } => true,
        FennecError::Provider(msg) => {
            msg.starts_with("HTTP 429")
                || msg.starts_with("HTTP 500")
                || msg.starts_with("HTTP 502")
                || msg.starts_with("HTTP 503")
                || msg.starts_with("HTTP 529")
                || msg.contains("timed out")
                || msg.contains("connection reset")
                || msg.contains("connection closed")
                || msg.contains("overloaded")
        }
        _ => false,
    }
}

impl LlmRouter {
    pub fn new(attempt_timeout: Duration, tie_break: Vec<String>) -> Self {
        Self {
            providers: vec![],
            breakers: Mutex::new(HashMap::new()),
            budget: None,
            attempt_timeout,
            tie_break,
        }
    }

    /// Register a provider.
    pub fn add_provider(&mut self, provider: Arc<dyn ProviderAdapter>) {
        let name = provider.profile().name.clone();
        info!(provider = %name, capabilities = ?provider.profile().capabilities, "registered LLM provider");
        self.breakers
            .lock()
            .entry(name)
            .or_insert_with(CircuitBreaker::new);
        self.providers.push(provider);
    }

    /// Enforce a token budget on every execute call.
    pub fn set_budget(&mut self, budget: TokenBudget) {
        self.budget = Some(budget);
    }

    pub fn budget(&self) -> Option<&TokenBudget> {
        self.budget.as_ref()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.profile().name.clone())
            .collect()
    }

    fn find(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers
            .iter()
            .find(|p| p.profile().name == name)
            .cloned()
    }

    fn allow_request(&self, provider_name: &str) -> bool {
        let mut breakers = self.breakers.lock();
        breakers
            .get_mut(provider_name)
            .map(|cb| cb.allow_request())
            .unwrap_or(true)
    }

    fn record_success(&self, provider_name: &str) {
        let mut breakers = self.breakers.lock();
        if let Some(cb) = breakers.get_mut(provider_name) {
            cb.record_success();
        }
    }

    fn record_failure(&self, provider_name: &str) {
        let mut breakers = self.breakers.lock();
        if let Some(cb) = breakers.get_mut(provider_name) {
            let was_open = cb.is_open();
            cb.record_failure();
            if !was_open && cb.is_open() {
                warn!(
                    provider = provider_name,
                    failures = cb.consecutive_failures,
                    "circuit breaker OPEN — provider disabled for {}s",
                    CIRCUIT_OPEN_DURATION.as_secs()
                );
            }
        }
    }

    /// Rank a provider name in the tie-break preference list.
    fn tie_break_rank(&self, name: &str) -> usize {
        self.tie_break
            .iter()
            .position(|n| n == name)
            .unwrap_or(usize::MAX)
    }

    /// Select a provider for the given capability requirements.
    ///
    /// Filters profiles to capability supersets whose circuit currently
    /// admits requests, then orders by ascending cost weight, ascending
    /// latency class, tie-break preference, and name. An eligible hinted
    /// provider jumps to the front of the order.
    pub fn route(
        &self,
        required: &[Capability],
        hint: Option<&str>,
    ) -> Result<RouteDecision> {
        let capable: Vec<&Arc<dyn ProviderAdapter>> = self
            .providers
            .iter()
            .filter(|p| p.profile().supports(required))
            .collect();

        if capable.is_empty() {
            return Err(FennecError::Routing(format!(
                "no provider serves capabilities {:?}",
                required
            )));
        }

        let mut survivors: Vec<&Arc<dyn ProviderAdapter>> = capable
            .into_iter()
            .filter(|p| self.allow_request(&p.profile().name))
            .collect();

        if survivors.is_empty() {
            return Err(FennecError::Routing(format!(
                "no available provider for capabilities {:?} (all circuits open)",
                required
            )));
        }

        survivors.sort_by(|a, b| {
            let pa = a.profile();
            let pb = b.profile();
            pa.cost_weight
                .cmp(&pb.cost_weight)
                .then(pa.latency_class.cmp(&pb.latency_class))
                .then(self.tie_break_rank(&pa.name).cmp(&self.tie_break_rank(&pb.name)))
                .then(pa.name.cmp(&pb.name))
        });

        let mut names: Vec<String> = survivors.iter().map(|p| p.profile().name.clone()).collect();

        let mut reason = if names.len() == 1 { "only_candidate" } else { "cost" };
        if let Some(hinted) = hint
            && let Some(pos) = names.iter().position(|n| n == hinted)
        {
            let name = names.remove(pos);
            names.insert(0, name);
            reason = "hint";
        }

        let provider = names.remove(0);
        debug!(provider = %provider, chain = ?names, reason, "route decision");
        Ok(RouteDecision {
            provider,
            fallback_chain: names,
            reason,
        })
    }

    /// Execute a request against the routed provider, advancing through the
    /// fallback chain on transient failures. Each attempt gets a fresh
    /// timeout; non-transient failures abort immediately without consuming
    /// the rest of the chain.
    pub async fn execute(&self, request: &LlmRequest) -> Result<RouterOutcome> {
        if let Some(ref budget) = self.budget {
            budget.check()?;
        }

        let decision = self.route(
            &request.required_capabilities,
            request.provider_hint.as_deref(),
        )?;

        let mut order = Vec::with_capacity(1 + decision.fallback_chain.len());
        order.push(decision.provider.clone());
        order.extend(decision.fallback_chain.iter().cloned());

        let mut attempts: Vec<AttemptRecord> = Vec::new();

        for name in &order {
            let Some(adapter) = self.find(name) else {
                continue;
            };

            let started = Instant::now();
            let result = tokio::time::timeout(self.attempt_timeout, adapter.complete(request)).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(Ok(response)) => {
                    self.record_success(name);
                    if let Some(ref budget) = self.budget {
                        budget.record(response.usage.total_tokens() as u64);
                    }
                    info!(
                        provider = %name,
                        latency_ms,
                        tokens = response.usage.total_tokens(),
                        "provider attempt succeeded"
                    );
                    attempts.push(AttemptRecord {
                        provider: name.clone(),
                        latency_ms,
                        outcome: AttemptOutcome::Success,
                    });
                    return Ok(RouterOutcome {
                        provider: name.clone(),
                        response,
                        attempts,
                    });
                }
                Ok(Err(e)) if is_transient(&e) => {
                    self.record_failure(name);
                    warn!(provider = %name, latency_ms, error = %e, "transient provider failure, advancing chain");
                    attempts.push(AttemptRecord {
                        provider: name.clone(),
                        latency_ms,
                        outcome: AttemptOutcome::Transient(e.to_string()),
                    });
                }
                Ok(Err(e)) => {
                    // Auth errors, malformed requests: retrying elsewhere
                    // would fail the same way.
                    self.record_failure(name);
                    warn!(provider = %name, latency_ms, error = %e, "non-transient provider failure, aborting");
                    attempts.push(AttemptRecord {
                        provider: name.clone(),
                        latency_ms,
                        outcome: AttemptOutcome::Fatal(e.to_string()),
                    });
                    return Err(e);
                }
                Err(_elapsed) => {
                    self.record_failure(name);
                    warn!(
                        provider = %name,
                        timeout_secs = self.attempt_timeout.as_secs(),
                        "provider attempt timed out, advancing chain"
                    );
                    attempts.push(AttemptRecord {
                        provider: name.clone(),
                        latency_ms,
                        outcome: AttemptOutcome::Transient(format!(
                            "attempt timed out after {}s",
                            self.attempt_timeout.as_secs()
                        )),
                    });
                }
            }
        }

        Err(FennecError::AllProvidersExhausted {
            attempts: attempts.len(),
        })
    }

    /// Current availability of every registered provider: circuit closed AND
    /// the backend's own health check passes. Used by the health snapshot.
    pub async fn availability(&self) -> Vec<(String, bool)> {
        let mut result = Vec::with_capacity(self.providers.len());
        for p in &self.providers {
            let name = p.profile().name.clone();
            let circuit_ok = !self
                .breakers
                .lock()
                .get(&name)
                .map(|cb| cb.is_open())
                .unwrap_or(false);
            let healthy = circuit_ok && p.health_check().await.is_ok();
            result.push((name, healthy));
        }
        result
    }
}
