use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use fennec_core::{Capability, LatencyClass};

/// Static descriptor of one LLM backend: what it can do, how much it costs,
/// and how fast it answers. Loaded from configuration at startup and
/// immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Unique provider name, e.g. "claude", "gemini", "ollama".
    pub name: String,
    /// Capability tags this backend serves.
    pub capabilities: BTreeSet<Capability>,
    /// Relative cost; the router prefers lower weights. Local models use 0.
    pub cost_weight: u32,
    pub latency_class: LatencyClass,
}

impl ProviderProfile {
    pub fn new(name: impl Into<String>, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            name: name.into(),
            capabilities: capabilities.into_iter().collect(),
            cost_weight: 100,
            latency_class: LatencyClass::Standard,
        }
    }

    pub fn with_cost_weight(mut self, weight: u32) -> Self {
        self.cost_weight = weight;
        self
    }

    pub fn with_latency_class(mut self, class: LatencyClass) -> Self {
        self.latency_class = class;
        self
    }

    /// Whether this backend serves every required capability.
    pub fn supports(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }
}
