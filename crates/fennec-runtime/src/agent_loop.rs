use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use fennec_core::{
    Capability, ConversationTurn, EventBus, FennecError, Role, StepEvent, Task, TaskStatus,
    ToolCall,
};
use fennec_llm::{EmbeddingProvider, LlmRequest, LlmRouter};
use fennec_memory::{MemoryRecord, MemoryStore, QueryFilter};

use crate::registry::ToolRegistry;
use crate::sub_agent::SubAgentOrchestrator;

/// The reserved tool name the model uses to request delegation. Intercepted
/// by the loop and handed to the orchestrator, never dispatched through the
/// registry.
pub const DELEGATE_TOOL: &str = "delegate";

/// Where the loop currently is in its cycle. Instrumentation only — the
/// control flow below is the authoritative machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Planning,
    Acting,
    Delegating,
    Reflecting,
    Terminated,
}

/// Hard caps bounding one loop run. `max_tool_calls` is set for delegated
/// sub-agents; the parent loop is bounded by steps and wall clock alone.
#[derive(Debug, Clone)]
pub struct LoopBudget {
    pub max_steps: u32,
    pub max_wall_clock: Duration,
    pub max_tool_calls: Option<u32>,
}

impl LoopBudget {
    pub fn new(max_steps: u32, max_wall_clock: Duration) -> Self {
        Self {
            max_steps,
            max_wall_clock,
            max_tool_calls: None,
        }
    }
}

/// How a loop run ended.
#[derive(Debug)]
pub struct LoopOutcome {
    pub status: TaskStatus,
    pub final_answer: Option<String>,
    pub steps: u32,
    pub failure: Option<FennecError>,
}

/// The bounded reasoning cycle driving one claimed task:
/// `Planning → Acting → Reflecting → {Planning | Delegating | Terminated}`.
///
/// Execution is strictly sequential per task — suspension happens at the
/// router, tool, and memory calls, never through concurrent steps. Turns are
/// committed only after their producing step fully returns, so re-running a
/// step after a crash cannot duplicate already-committed turns.
#[derive(Clone)]
pub struct AgentLoop {
    router: Arc<LlmRouter>,
    memory: Arc<MemoryStore>,
    tools: ToolRegistry,
    orchestrator: Option<Arc<SubAgentOrchestrator>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    events: EventBus,
    budget: LoopBudget,
    system_prompt: Option<String>,
    /// Capability tags every reasoning step of this loop requires.
    required_capabilities: Vec<Capability>,
    recent_limit: usize,
    recall_top_k: usize,
    max_tokens: u32,
    temperature: f32,
    /// Sub-agents read the shared long-term store but never write it.
    long_term_writes: bool,
    summarize_evicted: bool,
    min_turns_to_summarize: usize,
}

impl AgentLoop {
    pub fn new(
        router: Arc<LlmRouter>,
        memory: Arc<MemoryStore>,
        tools: ToolRegistry,
        events: EventBus,
        budget: LoopBudget,
    ) -> Self {
        Self {
            router,
            memory,
            tools,
            orchestrator: None,
            embedder: None,
            events,
            budget,
            system_prompt: None,
            required_capabilities: vec![Capability::Reasoning],
            recent_limit: 50,
            recall_top_k: 5,
            max_tokens: 4096,
            temperature: 0.7,
            long_term_writes: true,
            summarize_evicted: true,
            min_turns_to_summarize: 4,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<SubAgentOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_required_capabilities(
        mut self,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        self.required_capabilities = capabilities.into_iter().collect();
        self
    }

    pub fn with_context(mut self, recent_limit: usize, recall_top_k: usize) -> Self {
        self.recent_limit = recent_limit;
        self.recall_top_k = recall_top_k;
        self
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Sub-agent isolation: read the shared long-term store, never write it.
    pub fn read_only_long_term(mut self) -> Self {
        self.long_term_writes = false;
        self
    }

    pub fn with_promotion(mut self, summarize_evicted: bool, min_turns: usize) -> Self {
        self.summarize_evicted = summarize_evicted;
        self.min_turns_to_summarize = min_turns;
        self
    }

    /// Drive the task to a terminal status.
    pub async fn run(&self, task: &Task, cancel: &CancellationToken) -> LoopOutcome {
        let started = Instant::now();
        let mut steps: u32 = 0;
        let mut tool_calls_used: u32 = 0;
        let mut run_tokens: u64 = 0;
        let mut state = LoopState::Idle;
        debug!(task_id = %task.id, ?state, "claiming task");

        // The task payload opens the dialogue.
        self.commit(
            task,
            ConversationTurn::new(task.id, Role::User, task.payload.clone()),
        );

        loop {
            // Cancellation is cooperative: observed at every step boundary.
            if cancel.is_cancelled() {
                return self.finish_cancelled(task, steps);
            }
            if steps >= self.budget.max_steps {
                return self.finish_failed(
                    task,
                    steps,
                    FennecError::StepBudgetExceeded {
                        limit: self.budget.max_steps,
                    },
                );
            }
            if started.elapsed() >= self.budget.max_wall_clock {
                return self.finish_failed(
                    task,
                    steps,
                    FennecError::TimeBudgetExceeded {
                        limit_secs: self.budget.max_wall_clock.as_secs(),
                    },
                );
            }
            if let Some(budget) = self.router.budget()
                && let Err(e) = budget.check_run(run_tokens)
            {
                return self.finish_failed(task, steps, e);
            }

            // ── Planning ───────────────────────────────────────
            state = LoopState::Planning;
            debug!(task_id = %task.id, step = steps, ?state, "reasoning step");
            self.events.publish(StepEvent::Thinking { task_id: task.id });

            let request = self.build_request(task).await;
            let outcome = match self.router.execute(&request).await {
                Ok(outcome) => outcome,
                Err(e) => return self.finish_failed(task, steps, e),
            };
            run_tokens += outcome.response.usage.total_tokens() as u64;
            steps += 1;

            // A step that finished after cancellation is discarded whole:
            // nothing from it is committed.
            if cancel.is_cancelled() {
                return self.finish_cancelled(task, steps);
            }

            let response = outcome.response;
            self.commit(
                task,
                ConversationTurn::assistant_with_calls(
                    task.id,
                    response.content.clone(),
                    response.tool_calls.clone(),
                ),
            );

            // ── Reflecting: final answer ───────────────────────
            if response.tool_calls.is_empty() {
                state = LoopState::Reflecting;
                debug!(task_id = %task.id, ?state, "final answer reached");
                self.events.publish(StepEvent::Response {
                    task_id: task.id,
                    content: response.content.clone(),
                });
                self.reflect(task, &response.content);
                self.events.publish(StepEvent::Done {
                    task_id: task.id,
                    status: TaskStatus::Completed,
                });
                return LoopOutcome {
                    status: TaskStatus::Completed,
                    final_answer: Some(response.content),
                    steps,
                    failure: None,
                };
            }

            let (delegations, tool_calls): (Vec<ToolCall>, Vec<ToolCall>) = response
                .tool_calls
                .into_iter()
                .partition(|c| c.tool_name == DELEGATE_TOOL && self.orchestrator.is_some());

            // ── Delegating ─────────────────────────────────────
            if !delegations.is_empty()
                && let Some(ref orchestrator) = self.orchestrator
            {
                state = LoopState::Delegating;
                debug!(task_id = %task.id, count = delegations.len(), ?state, "delegating sub-tasks");
                let mut pending = Vec::new();
                for call in &delegations {
                    self.events.publish(StepEvent::ToolCall {
                        task_id: task.id,
                        tool: DELEGATE_TOOL.into(),
                        call_id: call.id.clone(),
                    });
                    match orchestrator.delegate_from_call(task, call) {
                        Ok(handle) => pending.push((call.id.clone(), handle)),
                        Err(e) => {
                            self.commit(
                                task,
                                ConversationTurn::tool_result(
                                    task.id,
                                    &call.id,
                                    format!("Error: {e}"),
                                    true,
                                ),
                            );
                            self.events.publish(StepEvent::ToolResult {
                                task_id: task.id,
                                call_id: call.id.clone(),
                                is_error: true,
                            });
                        }
                    }
                }

                // Join semantics: the parent resumes only once every handle
                // has reached a terminal state — no first-to-finish race.
                let (call_ids, handles): (Vec<String>, Vec<_>) = pending.into_iter().unzip();
                let reports = SubAgentOrchestrator::join(handles).await;

                if cancel.is_cancelled() {
                    // Children finished, but this task is cancelled: their
                    // results are discarded, not committed.
                    return self.finish_cancelled(task, steps);
                }

                for (call_id, report) in call_ids.into_iter().zip(reports) {
                    let is_error = report.status != TaskStatus::Completed;
                    let content = if is_error {
                        format!(
                            "Sub-agent failed: {}\nPartial result:\n{}",
                            report.error.as_deref().unwrap_or("unknown"),
                            report.output
                        )
                    } else {
                        report.output
                    };
                    self.commit(
                        task,
                        ConversationTurn::tool_result(task.id, &call_id, content, is_error),
                    );
                    self.events.publish(StepEvent::ToolResult {
                        task_id: task.id,
                        call_id,
                        is_error,
                    });
                }
            }

            // ── Acting ─────────────────────────────────────────
            // One external call in flight at a time; each result feeds the
            // next Planning iteration.
            if !tool_calls.is_empty() {
                state = LoopState::Acting;
                debug!(task_id = %task.id, count = tool_calls.len(), ?state, "invoking tools");
            }
            for call in &tool_calls {
                if let Some(max) = self.budget.max_tool_calls
                    && tool_calls_used >= max
                {
                    return self.finish_failed(
                        task,
                        steps,
                        FennecError::BudgetExhausted {
                            resource: "tool_calls".into(),
                            used: tool_calls_used as u64 + 1,
                            limit: max as u64,
                        },
                    );
                }

                self.events.publish(StepEvent::ToolCall {
                    task_id: task.id,
                    tool: call.tool_name.clone(),
                    call_id: call.id.clone(),
                });

                let result = self.tools.invoke(call).await;
                tool_calls_used += 1;

                // The tool ran to completion, but a cancelled task discards
                // the result rather than committing it.
                if cancel.is_cancelled() {
                    return self.finish_cancelled(task, steps);
                }

                self.commit(
                    task,
                    ConversationTurn::tool_result(
                        task.id,
                        &result.tool_call_id,
                        result.content,
                        result.is_error,
                    ),
                );
                self.events.publish(StepEvent::ToolResult {
                    task_id: task.id,
                    call_id: call.id.clone(),
                    is_error: result.is_error,
                });
            }
        }
    }

    /// Assemble the prompt context: long-term recall plus the recent buffer.
    async fn build_request(&self, task: &Task) -> LlmRequest {
        let mut required = self.required_capabilities.clone();
        if !self.tools.is_empty() && !required.contains(&Capability::ToolUse) {
            required.push(Capability::ToolUse);
        }

        let mut request = LlmRequest::new(required);
        request.system = self.system_prompt.clone();
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;
        request.tools = self.tools.definitions();
        if let Some(ref orchestrator) = self.orchestrator {
            request.tools.push(orchestrator.delegate_tool_definition());
        }

        // Long-term recall seeds the context; skipped gracefully when no
        // embedding backend exists.
        if let Some(recall) = self.recall(task).await {
            request
                .messages
                .push(ConversationTurn::new(task.id, Role::System, recall));
        }

        request
            .messages
            .extend(self.memory.recent(task.id, self.recent_limit));
        request
    }

    async fn recall(&self, task: &Task) -> Option<String> {
        let embedder = self.embedder.as_ref()?;
        if self.recall_top_k == 0 {
            return None;
        }

        let embedding = match embedder.embed(&[task.payload.as_str()]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            Ok(_) => return None,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "recall embedding failed — continuing without");
                return None;
            }
        };

        match self
            .memory
            .query(&embedding, self.recall_top_k, &QueryFilter::default())
        {
            Ok(results) if !results.is_empty() => {
                let lines: Vec<String> = results
                    .iter()
                    .map(|(record, _)| format!("- {}", record.text))
                    .collect();
                Some(format!("Relevant long-term memories:\n{}", lines.join("\n")))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "long-term recall failed — continuing without");
                None
            }
        }
    }

    /// Commit a turn and hand any evicted turns to best-effort promotion.
    fn commit(&self, task: &Task, turn: ConversationTurn) {
        match self.memory.append_turn(turn) {
            Ok(evicted) => self.maybe_promote(task, evicted),
            Err(e) => warn!(task_id = %task.id, error = %e, "failed to commit turn"),
        }
    }

    /// Summarize evicted short-term turns into a long-term record. Detached
    /// and best-effort: a summarization failure never blocks eviction.
    fn maybe_promote(&self, task: &Task, evicted: Vec<ConversationTurn>) {
        if !self.summarize_evicted
            || !self.long_term_writes
            || evicted.len() < self.min_turns_to_summarize
        {
            return;
        }
        let Some(embedder) = self.embedder.clone() else {
            return;
        };

        let router = Arc::clone(&self.router);
        let memory = Arc::clone(&self.memory);
        let task_id = task.id;
        let transcript: String = evicted
            .iter()
            .map(|t| {
                let role = match t.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                format!("[{}] {}\n", role, t.content)
            })
            .collect();

        tokio::spawn(async move {
            let mut request = LlmRequest::new([Capability::Summarization]);
            request.system = Some(
                "Summarize the following conversation fragment in a few sentences. \
                 Keep concrete facts, names, and decisions."
                    .into(),
            );
            request
                .messages
                .push(ConversationTurn::new(task_id, Role::User, transcript.clone()));

            // Fall back to the raw transcript when no summarizer is routable.
            let summary = match router.execute(&request).await {
                Ok(outcome) => outcome.response.content,
                Err(e) => {
                    warn!(%task_id, error = %e, "eviction summarization failed — storing raw transcript");
                    transcript
                }
            };

            let embedding = match embedder.embed(&[summary.as_str()]).await {
                Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
                Ok(_) => return,
                Err(e) => {
                    warn!(%task_id, error = %e, "eviction embedding failed — dropping summary");
                    return;
                }
            };

            let record = MemoryRecord::new(embedding, summary)
                .with_metadata("source", serde_json::json!("eviction"))
                .with_metadata("task_id", serde_json::json!(task_id.to_string()));
            if let Err(e) = memory.write_record(record) {
                warn!(%task_id, error = %e, "failed to promote evicted turns");
            }
        });
    }

    /// After a final answer: write the exchange into long-term memory so
    /// future tasks can recall it. Best-effort.
    fn reflect(&self, task: &Task, answer: &str) {
        if !self.long_term_writes || answer.is_empty() {
            return;
        }
        let Some(embedder) = self.embedder.clone() else {
            return;
        };
        let memory = Arc::clone(&self.memory);
        let text = format!("Task: {}\nOutcome: {}", task.payload, answer);
        let task_id = task.id;

        tokio::spawn(async move {
            let embedding = match embedder.embed(&[text.as_str()]).await {
                Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
                _ => return,
            };
            let record = MemoryRecord::new(embedding, text)
                .with_metadata("source", serde_json::json!("reflection"))
                .with_metadata("task_id", serde_json::json!(task_id.to_string()));
            if let Err(e) = memory.write_record(record) {
                warn!(%task_id, error = %e, "reflection write failed");
            }
        });
    }

    fn finish_cancelled(&self, task: &Task, steps: u32) -> LoopOutcome {
        debug!(task_id = %task.id, steps, "task cancelled");
        self.events.publish(StepEvent::Done {
            task_id: task.id,
            status: TaskStatus::Cancelled,
        });
        LoopOutcome {
            status: TaskStatus::Cancelled,
            final_answer: None,
            steps,
            failure: Some(FennecError::Cancelled),
        }
    }

    fn finish_failed(&self, task: &Task, steps: u32, error: FennecError) -> LoopOutcome {
        warn!(task_id = %task.id, steps, error = %error, "task failed");
        self.events.publish(StepEvent::Error {
            task_id: task.id,
            message: error.to_string(),
        });
        self.events.publish(StepEvent::Done {
            task_id: task.id,
            status: TaskStatus::Failed,
        });
        LoopOutcome {
            status: TaskStatus::Failed,
            final_answer: None,
            steps,
            failure: Some(error),
        }
    }
}
