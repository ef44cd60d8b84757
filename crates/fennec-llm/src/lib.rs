//! # fennec-llm
//!
//! Abstraction layer over LLM backends. Every backend sits behind the same
//! [`ProviderAdapter`] contract and declares a [`ProviderProfile`] of
//! capability tags, cost weight, and latency class; the [`LlmRouter`] picks a
//! provider per request under those constraints and walks an ordered fallback
//! chain on transient failure.

pub mod anthropic;
pub mod budget;
pub mod embedding;
pub mod gemini;
pub mod local;
pub mod mock;
pub mod openai_compat;
pub mod profile;
pub mod provider;
pub mod router;

pub use budget::TokenBudget;
pub use embedding::EmbeddingProvider;
pub use mock::MockProvider;
pub use profile::ProviderProfile;
pub use provider::{LlmRequest, LlmResponse, ProviderAdapter, StopReason, Usage};
pub use router::{AttemptOutcome, AttemptRecord, LlmRouter, RouteDecision, RouterOutcome};
