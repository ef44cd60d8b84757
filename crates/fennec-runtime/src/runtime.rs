use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fennec_config::FennecConfig;
use fennec_core::{
    ConversationTurn, EventBus, Result, StepEvent, Task, TaskId, TaskOrigin, TaskStatus,
};
use fennec_llm::{
    embedding::{OllamaEmbedding, OpenAiEmbedding},
    EmbeddingProvider, LlmRouter, ProviderAdapter, TokenBudget,
};
use fennec_memory::{MemoryOptions, MemoryStore, QueryFilter};

use crate::agent_loop::{AgentLoop, LoopBudget};
use crate::queue::TaskQueue;
use crate::registry::ToolRegistry;
use crate::scheduler::TriggerScheduler;
use crate::sub_agent::{SubAgentBudget, SubAgentOrchestrator};

/// Health of one registered provider.
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub name: String,
    pub available: bool,
}

/// Snapshot served to the dashboard's health endpoint.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub queue_depth: usize,
    pub running: usize,
    pub concurrency_cap: usize,
    pub providers: Vec<ProviderHealth>,
    pub memory_reachable: bool,
    pub active_triggers: usize,
}

/// The composition root: wires the queue, scheduler, memory, router, and
/// worker pool together and owns their lifetimes.
pub struct AgentRuntime {
    config: FennecConfig,
    queue: Arc<TaskQueue>,
    memory: Arc<MemoryStore>,
    events: EventBus,
    scheduler: Arc<TriggerScheduler>,
    /// Router being assembled; moved behind an Arc at start.
    router_builder: Option<LlmRouter>,
    router: Option<Arc<LlmRouter>>,
    tools: ToolRegistry,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl AgentRuntime {
    pub fn new(config: FennecConfig) -> Result<Self> {
        let memory = Arc::new(MemoryStore::open(
            &config.memory.db_path,
            MemoryOptions {
                embedding_dims: config.memory.embedding_dims,
                short_term_max_turns: config.memory.short_term_max_turns,
            },
        )?);

        let queue = Arc::new(TaskQueue::new());
        let scheduler = Arc::new(TriggerScheduler::new(Arc::clone(&queue)));

        let mut router = LlmRouter::new(
            Duration::from_secs(config.router.attempt_timeout_secs),
            config.router.tie_break.clone(),
        );
        if config.budget.enabled {
            router.set_budget(TokenBudget::new(
                config.budget.daily_tokens,
                config.budget.per_run_tokens,
            ));
        }

        let embedder = build_embedder(&config);

        Ok(Self {
            config,
            queue,
            memory,
            events: EventBus::default(),
            scheduler,
            router_builder: Some(router),
            router: None,
            tools: ToolRegistry::new(),
            embedder,
            workers: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Register an LLM backend. Must happen before `start`.
    pub fn add_provider(&mut self, provider: Arc<dyn ProviderAdapter>) {
        if let Some(ref mut router) = self.router_builder {
            router.add_provider(provider);
        } else {
            warn!("add_provider called after start — ignored (config is immutable at runtime)");
        }
    }

    /// Register a tool collaborator. Must happen before `start`.
    pub fn register_tool(&mut self, tool: Arc<dyn fennec_core::ToolExecutor>) {
        self.tools.register(tool);
    }

    /// Override the embedding backend (tests use the deterministic mock).
    pub fn set_embedder(&mut self, embedder: Arc<dyn EmbeddingProvider>) {
        self.embedder = Some(embedder);
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Spawn the worker pool and trigger scheduler. Returns the handle the
    /// chat transport and dashboard talk to.
    pub fn start(&mut self) -> Result<RuntimeHandle> {
        let router = Arc::new(self.router_builder.take().ok_or_else(|| {
            fennec_core::FennecError::Config("runtime already started".into())
        })?);
        self.router = Some(Arc::clone(&router));

        // Startup triggers from config.
        for trigger in &self.config.scheduler.triggers {
            if !trigger.enabled {
                continue;
            }
            if let Err(e) = self.scheduler.add_cron(
                trigger.prompt.clone(),
                &trigger.cron,
                Some(trigger.name.clone()),
                trigger.priority,
            ) {
                warn!(trigger = %trigger.name, error = %e, "skipping invalid trigger from config");
            }
        }

        let orchestrator = {
            let mut orchestrator = SubAgentOrchestrator::new(
                Arc::clone(&router),
                Arc::clone(&self.memory),
                self.tools.clone(),
                self.events.clone(),
                SubAgentBudget::new(
                    self.config.delegation.max_steps,
                    self.config.delegation.max_tool_calls,
                    Duration::from_secs(self.config.delegation.max_wall_clock_secs),
                ),
                self.config.delegation.max_concurrent,
            );
            if let Some(ref embedder) = self.embedder {
                orchestrator = orchestrator.with_embedder(Arc::clone(embedder));
            }
            Arc::new(orchestrator)
        };

        let mut template = AgentLoop::new(
            Arc::clone(&router),
            Arc::clone(&self.memory),
            self.tools.clone(),
            self.events.clone(),
            LoopBudget::new(
                self.config.agent.max_steps,
                Duration::from_secs(self.config.agent.time_budget_secs),
            ),
        )
        .with_orchestrator(Arc::clone(&orchestrator))
        .with_context(
            self.config.agent.recent_turns,
            self.config.agent.recall_top_k,
        )
        .with_generation(self.config.agent.max_tokens, self.config.agent.temperature)
        .with_promotion(
            self.config.memory.summarize_evicted,
            self.config.memory.min_turns_to_summarize,
        );
        if let Some(ref prompt) = self.config.agent.system_prompt {
            template = template.with_system_prompt(prompt.clone());
        }
        if let Some(ref embedder) = self.embedder {
            template = template.with_embedder(Arc::clone(embedder));
        }

        let mut workers = self.workers.lock();

        // The trigger evaluator shares the queue with every other producer.
        workers.push(tokio::spawn(Arc::clone(&self.scheduler).run(
            Duration::from_secs(self.config.scheduler.tick_secs),
            self.shutdown.clone(),
        )));

        // Worker pool: the concurrency cap on running tasks.
        for worker_id in 0..self.config.scheduler.concurrency {
            let queue = Arc::clone(&self.queue);
            let memory = Arc::clone(&self.memory);
            let agent_loop = template.clone();
            let shutdown = self.shutdown.clone();

            workers.push(tokio::spawn(async move {
                info!(worker_id, "worker started");
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!(worker_id, "worker shutting down");
                            return;
                        }
                        claimed = queue.dequeue() => {
                            let task_id = claimed.task.id;
                            let outcome = agent_loop.run(&claimed.task, &claimed.cancel).await;
                            queue.finish(task_id, outcome.status);
                            memory.release_task(task_id);
                            info!(
                                worker_id,
                                task_id = %task_id,
                                status = ?outcome.status,
                                steps = outcome.steps,
                                "task finished"
                            );
                        }
                    }
                }
            }));
        }

        info!(
            workers = self.config.scheduler.concurrency,
            providers = ?router.provider_names(),
            "agent runtime started"
        );

        Ok(RuntimeHandle {
            queue: Arc::clone(&self.queue),
            events: self.events.clone(),
            memory: Arc::clone(&self.memory),
            scheduler: Arc::clone(&self.scheduler),
            router,
            concurrency_cap: self.config.scheduler.concurrency,
        })
    }

    /// Stop the scheduler and workers. In-flight tasks observe cancellation
    /// at their next step boundary.
    pub async fn shutdown(&self) {
        info!("agent runtime shutting down");
        self.shutdown.cancel();
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
    }
}

/// Clone-able handle for external collaborators: the chat transport submits
/// tasks and streams events; the dashboard reads state and health.
#[derive(Clone)]
pub struct RuntimeHandle {
    queue: Arc<TaskQueue>,
    events: EventBus,
    memory: Arc<MemoryStore>,
    scheduler: Arc<TriggerScheduler>,
    router: Arc<LlmRouter>,
    concurrency_cap: usize,
}

impl RuntimeHandle {
    /// Enqueue an inbound chat message as a task. The correlation id routes
    /// the reply back to the right conversation.
    pub fn submit_chat(
        &self,
        text: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> TaskId {
        self.queue.enqueue(
            Task::new(TaskOrigin::Chat, text).with_correlation_id(correlation_id),
        )
    }

    /// Enqueue an arbitrary task.
    pub fn submit(&self, task: Task) -> TaskId {
        self.queue.enqueue(task)
    }

    /// Request cancellation of a queued or running task.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        self.queue.cancel(task_id)
    }

    /// Subscribe to the step event stream (all tasks; filter by task id).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StepEvent> {
        self.events.subscribe()
    }

    pub fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    // ── Read-only queries (dashboard contract) ─────────────────

    pub fn status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.queue.status(task_id)
    }

    pub fn task(&self, task_id: TaskId) -> Option<Task> {
        self.queue.task(task_id)
    }

    pub fn list_tasks(&self, limit: usize) -> Vec<Task> {
        self.queue.list_tasks(limit)
    }

    pub fn recent_turns(&self, task_id: TaskId, limit: usize) -> Result<Vec<ConversationTurn>> {
        self.memory.persisted_turns(task_id, limit)
    }

    pub fn query_memory(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<(fennec_memory::MemoryRecord, f32)>> {
        self.memory.query(embedding, k, filter)
    }

    /// Queue depth, provider availability, memory reachability.
    pub async fn health(&self) -> HealthReport {
        let providers = self
            .router
            .availability()
            .await
            .into_iter()
            .map(|(name, available)| ProviderHealth { name, available })
            .collect();

        HealthReport {
            queue_depth: self.queue.depth(),
            running: self.queue.running_count(),
            concurrency_cap: self.concurrency_cap,
            providers,
            memory_reachable: self.memory.reachable(),
            active_triggers: self.scheduler.active_count(),
        }
    }
}

/// Build the embedding backend named in config, if any.
fn build_embedder(config: &FennecConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    let embedding = config.memory.embedding.as_ref()?;
    match embedding.provider.as_str() {
        "local" => {
            let mut provider =
                OllamaEmbedding::new(&embedding.model, config.memory.embedding_dims);
            if let Some(ref url) = embedding.base_url {
                provider = provider.with_base_url(url.clone());
            }
            Some(Arc::new(provider))
        }
        "openai" => {
            let key = embedding.api_key.clone().unwrap_or_default();
            let mut provider = OpenAiEmbedding::new(key)
                .with_model(embedding.model.clone(), config.memory.embedding_dims);
            if let Some(ref url) = embedding.base_url {
                provider = provider.with_base_url(url.clone());
            }
            Some(Arc::new(provider))
        }
        other => {
            warn!(provider = other, "unknown embedding provider — recall disabled");
            None
        }
    }
}
