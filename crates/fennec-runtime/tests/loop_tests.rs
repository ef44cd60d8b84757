#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use fennec_core::{
        Capability, EventBus, FennecError, Role, StepEvent, Task, TaskOrigin, TaskStatus, Tool,
        ToolCall, ToolExecutor,
    };
    use fennec_llm::mock::{MockProvider, MockResponse};
    use fennec_llm::profile::ProviderProfile;
    use fennec_llm::provider::{LlmRequest, LlmResponse, ProviderAdapter, StopReason, Usage};
    use fennec_llm::{LlmRouter, TokenBudget};
    use fennec_memory::{MemoryOptions, MemoryStore};
    use fennec_runtime::{
        AgentLoop, LoopBudget, SubAgentBudget, SubAgentOrchestrator, ToolRegistry,
    };

    // ── Helpers ────────────────────────────────────────────────

    fn memory() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStore::open_in_memory(MemoryOptions {
                embedding_dims: 8,
                short_term_max_turns: 50,
            })
            .unwrap(),
        )
    }

    fn router_with(providers: Vec<MockProvider>) -> Arc<LlmRouter> {
        let mut router = LlmRouter::new(Duration::from_secs(5), vec![]);
        for p in providers {
            router.add_provider(Arc::new(p));
        }
        Arc::new(router)
    }

    struct EchoTool;

    #[async_trait]
    impl ToolExecutor for EchoTool {
        fn definition(&self) -> Tool {
            Tool {
                name: "echo".into(),
                description: "Echo the input text".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                }),
                output_schema: serde_json::json!({ "type": "string" }),
            }
        }

        async fn execute(&self, arguments: &serde_json::Value) -> fennec_core::Result<String> {
            Ok(format!(
                "echoed: {}",
                arguments["text"].as_str().unwrap_or("")
            ))
        }
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry
    }

    fn chat_task(payload: &str) -> Task {
        Task::new(TaskOrigin::Chat, payload)
    }

    fn assistant_turns(memory: &MemoryStore, task: &Task) -> usize {
        memory
            .persisted_turns(task.id, 100)
            .unwrap()
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .count()
    }

    fn drain_events(
        rx: &mut tokio::sync::broadcast::Receiver<StepEvent>,
        task_id: Uuid,
    ) -> Vec<StepEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if event.task_id() == task_id {
                events.push(event);
            }
        }
        events
    }

    // ── Final answer path ──────────────────────────────────────

    #[tokio::test]
    async fn test_final_answer_completes_task() {
        let provider = MockProvider::new("mock", [Capability::Reasoning, Capability::ToolUse])
            .with_response("All done.");
        let router = router_with(vec![provider]);
        let memory = memory();
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let agent_loop = AgentLoop::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            ToolRegistry::new(),
            events,
            LoopBudget::new(5, Duration::from_secs(60)),
        );

        let task = chat_task("say hello");
        let outcome = agent_loop.run(&task, &CancellationToken::new()).await;

        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(outcome.final_answer.as_deref(), Some("All done."));
        assert_eq!(outcome.steps, 1);

        // user + assistant turns committed
        let turns = memory.persisted_turns(task.id, 10).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);

        let events = drain_events(&mut rx, task.id);
        assert!(matches!(events[0], StepEvent::Thinking { .. }));
        assert!(events
            .iter()
            .any(|e| matches!(e, StepEvent::Response { content, .. } if content == "All done.")));
        assert!(matches!(
            events.last().unwrap(),
            StepEvent::Done { status: TaskStatus::Completed, .. }
        ));
    }

    // ── Tool cycle ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_tool_result_feeds_next_step() {
        let provider = MockProvider::new("mock", [Capability::Reasoning, Capability::ToolUse])
            .with_tool_call("echo", serde_json::json!({"text": "ping"}))
            .with_response("Done after tool.");
        let router = router_with(vec![provider]);
        let memory = memory();

        let agent_loop = AgentLoop::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            echo_registry(),
            EventBus::default(),
            LoopBudget::new(5, Duration::from_secs(60)),
        );

        let task = chat_task("use the echo tool");
        let outcome = agent_loop.run(&task, &CancellationToken::new()).await;

        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(outcome.steps, 2);

        let turns = memory.persisted_turns(task.id, 10).unwrap();
        // user, assistant(tool call), tool result, assistant(final)
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[2].role, Role::Tool);
        assert!(!turns[2].is_error);
        assert_eq!(turns[2].content, "echoed: ping");
    }

    #[tokio::test]
    async fn test_tool_error_does_not_abort_task() {
        let provider = MockProvider::new("mock", [Capability::Reasoning, Capability::ToolUse])
            .with_tool_call("no_such_tool", serde_json::json!({}))
            .with_response("Recovered.");
        let router = router_with(vec![provider]);
        let memory = memory();

        let agent_loop = AgentLoop::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            echo_registry(),
            EventBus::default(),
            LoopBudget::new(5, Duration::from_secs(60)),
        );

        let task = chat_task("try a broken tool");
        let outcome = agent_loop.run(&task, &CancellationToken::new()).await;

        // The error became a tool-result turn and the loop continued.
        assert_eq!(outcome.status, TaskStatus::Completed);
        let turns = memory.persisted_turns(task.id, 10).unwrap();
        let error_turn = turns.iter().find(|t| t.role == Role::Tool).unwrap();
        assert!(error_turn.is_error);
        assert!(error_turn.content.contains("unknown tool"));
    }

    // ── Budgets ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_step_budget_exceeded_preserves_transcript() {
        // The model never emits a final answer.
        let mut provider = MockProvider::new("mock", [Capability::Reasoning, Capability::ToolUse]);
        for _ in 0..5 {
            provider.queue_response(MockResponse::tool_call(
                "echo",
                serde_json::json!({"text": "again"}),
            ));
        }
        let router = router_with(vec![provider]);
        let memory = memory();

        let agent_loop = AgentLoop::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            echo_registry(),
            EventBus::default(),
            LoopBudget::new(3, Duration::from_secs(60)),
        );

        let task = chat_task("never finish");
        let outcome = agent_loop.run(&task, &CancellationToken::new()).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert!(matches!(
            outcome.failure,
            Some(FennecError::StepBudgetExceeded { limit: 3 })
        ));
        assert_eq!(outcome.steps, 3);
        // Partial transcript retained: exactly 3 assistant turns committed.
        assert_eq!(assistant_turns(&memory, &task), 3);
    }

    #[tokio::test]
    async fn test_per_run_token_budget_fails_task() {
        let provider = MockProvider::new("mock", [Capability::Reasoning, Capability::ToolUse])
            .with_tool_call("echo", serde_json::json!({"text": "spend"}))
            .with_response("should never be reached");
        let mut router = LlmRouter::new(Duration::from_secs(5), vec![]);
        router.add_provider(Arc::new(provider));
        // Mock responses cost 150 tokens; the run cap is 100.
        router.set_budget(TokenBudget::new(1_000_000, 100));
        let router = Arc::new(router);
        let memory = memory();

        let agent_loop = AgentLoop::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            echo_registry(),
            EventBus::default(),
            LoopBudget::new(10, Duration::from_secs(60)),
        );

        let task = chat_task("expensive work");
        let outcome = agent_loop.run(&task, &CancellationToken::new()).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert!(matches!(
            outcome.failure,
            Some(FennecError::TokenBudgetExceeded { .. })
        ));
    }

    // ── Routing failures ───────────────────────────────────────

    #[tokio::test]
    async fn test_no_search_provider_fails_with_routing_error() {
        // Only a reasoning provider configured; the task needs search.
        let provider = MockProvider::new("mock", [Capability::Reasoning]);
        let router = router_with(vec![provider]);
        let memory = memory();
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let agent_loop = AgentLoop::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            ToolRegistry::new(),
            events,
            LoopBudget::new(5, Duration::from_secs(60)),
        )
        .with_required_capabilities([Capability::Reasoning, Capability::Search]);

        let task = chat_task("what's in the news today?");
        let outcome = agent_loop.run(&task, &CancellationToken::new()).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert!(matches!(outcome.failure, Some(FennecError::Routing(_))));

        let events = drain_events(&mut rx, task.id);
        assert!(events
            .iter()
            .any(|e| matches!(e, StepEvent::Error { .. })));
        assert!(matches!(
            events.last().unwrap(),
            StepEvent::Done { status: TaskStatus::Failed, .. }
        ));
    }

    // ── Cancellation ───────────────────────────────────────────

    /// A provider slow enough for a cancellation to land mid-step.
    struct SlowProvider {
        profile: ProviderProfile,
    }

    #[async_trait]
    impl ProviderAdapter for SlowProvider {
        fn profile(&self) -> &ProviderProfile {
            &self.profile
        }
        async fn complete(&self, _request: &LlmRequest) -> fennec_core::Result<LlmResponse> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(LlmResponse {
                content: "too late".into(),
                tool_calls: vec![],
                usage: Usage::default(),
                stop_reason: StopReason::EndTurn,
            })
        }
        async fn health_check(&self) -> fennec_core::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancellation_mid_planning_commits_nothing_further() {
        let mut router = LlmRouter::new(Duration::from_secs(5), vec![]);
        router.add_provider(Arc::new(SlowProvider {
            profile: ProviderProfile::new("slow", [Capability::Reasoning]),
        }));
        let router = Arc::new(router);
        let memory = memory();

        let agent_loop = AgentLoop::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            ToolRegistry::new(),
            EventBus::default(),
            LoopBudget::new(5, Duration::from_secs(60)),
        );

        let task = chat_task("long running request");
        let cancel = CancellationToken::new();

        let run = {
            let agent_loop = agent_loop.clone();
            let task = task.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { agent_loop.run(&task, &cancel).await })
        };

        // Let the loop enter Planning, then cancel.
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let outcome = run.await.unwrap();

        assert_eq!(outcome.status, TaskStatus::Cancelled);
        assert!(outcome.final_answer.is_none());

        // Only the opening user turn was committed; the in-flight step's
        // result was discarded.
        let turns = memory.persisted_turns(task.id, 10).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
    }

    // ── Delegation ─────────────────────────────────────────────

    fn delegate_call(id: &str, agent_type: &str, task: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            tool_name: "delegate".into(),
            arguments: serde_json::json!({"agent_type": agent_type, "task": task}),
        }
    }

    #[tokio::test]
    async fn test_parent_resumes_after_all_children_terminal() {
        // Parent step 1: two concurrent delegations. Children each consume
        // one text response. Parent step 2: final answer.
        let provider = MockProvider::new("mock", [Capability::Reasoning, Capability::ToolUse])
            .with_mock_response(MockResponse {
                tool_calls: vec![
                    delegate_call("call_a", "general", "sub-task A"),
                    delegate_call("call_b", "general", "sub-task B"),
                ],
                stop_reason: StopReason::ToolUse,
                ..Default::default()
            })
            .with_response("child result one")
            .with_response("child result two")
            .with_response("combined: both children reported");
        let router = router_with(vec![provider]);
        let memory = memory();
        let events = EventBus::default();

        let orchestrator = Arc::new(SubAgentOrchestrator::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            ToolRegistry::new(),
            events.clone(),
            SubAgentBudget::new(5, 10, Duration::from_secs(30)),
            3,
        ));

        let agent_loop = AgentLoop::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            ToolRegistry::new(),
            events,
            LoopBudget::new(5, Duration::from_secs(60)),
        )
        .with_orchestrator(orchestrator);

        let task = chat_task("delegate two things");
        let outcome = agent_loop.run(&task, &CancellationToken::new()).await;

        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(
            outcome.final_answer.as_deref(),
            Some("combined: both children reported")
        );

        // Turn order proves join-before-resume: both children's results are
        // committed before the parent's final assistant turn.
        let turns = memory.persisted_turns(task.id, 10).unwrap();
        let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Tool,
                Role::Assistant
            ]
        );
        assert!(turns[2..4].iter().all(|t| !t.is_error));
        let results: Vec<&str> = turns[2..4].iter().map(|t| t.content.as_str()).collect();
        assert!(results.contains(&"child result one"));
        assert!(results.contains(&"child result two"));
    }

    #[tokio::test]
    async fn test_child_budget_exhaustion_forces_termination() {
        // The child only ever asks for more tool calls; its budget allows
        // one tool call and two steps.
        let mut provider = MockProvider::new("mock", [Capability::Reasoning, Capability::ToolUse]);
        for _ in 0..5 {
            provider.queue_response(MockResponse::tool_call(
                "echo",
                serde_json::json!({"text": "more"}),
            ));
        }
        let router = router_with(vec![provider]);
        let memory = memory();

        let orchestrator = SubAgentOrchestrator::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            echo_registry(),
            EventBus::default(),
            SubAgentBudget::new(5, 10, Duration::from_secs(30)),
            3,
        );

        let parent = chat_task("parent");
        let handle = orchestrator
            .delegate(
                &parent,
                "general",
                "spin forever",
                Some(SubAgentBudget::new(2, 1, Duration::from_secs(30))),
            )
            .unwrap();
        let report = handle.wait().await;

        // Force-terminated before any final answer.
        assert_eq!(report.status, TaskStatus::Failed);
        assert!(report.error.unwrap().contains("budget exhausted"));
    }

    #[tokio::test]
    async fn test_child_wall_clock_budget_forces_termination() {
        let mut router = LlmRouter::new(Duration::from_secs(5), vec![]);
        router.add_provider(Arc::new(SlowProvider {
            profile: ProviderProfile::new("slow", [Capability::Reasoning]),
        }));
        let router = Arc::new(router);
        let memory = memory();

        let orchestrator = SubAgentOrchestrator::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            ToolRegistry::new(),
            EventBus::default(),
            SubAgentBudget::new(5, 10, Duration::from_secs(30)),
            3,
        );

        let parent = chat_task("parent");
        let handle = orchestrator
            .delegate(
                &parent,
                "general",
                "slow task",
                Some(SubAgentBudget::new(5, 10, Duration::from_millis(50))),
            )
            .unwrap();
        let report = handle.wait().await;

        assert_eq!(report.status, TaskStatus::Failed);
        assert!(report.error.unwrap().contains("wall clock"));
    }

    #[tokio::test]
    async fn test_unknown_agent_type_becomes_error_turn() {
        let provider = MockProvider::new("mock", [Capability::Reasoning, Capability::ToolUse])
            .with_mock_response(MockResponse {
                tool_calls: vec![delegate_call("call_x", "nonexistent", "anything")],
                stop_reason: StopReason::ToolUse,
                ..Default::default()
            })
            .with_response("moving on without the sub-agent");
        let router = router_with(vec![provider]);
        let memory = memory();

        let orchestrator = Arc::new(SubAgentOrchestrator::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            ToolRegistry::new(),
            EventBus::default(),
            SubAgentBudget::new(5, 10, Duration::from_secs(30)),
            3,
        ));

        let agent_loop = AgentLoop::new(
            Arc::clone(&router),
            Arc::clone(&memory),
            ToolRegistry::new(),
            EventBus::default(),
            LoopBudget::new(5, Duration::from_secs(60)),
        )
        .with_orchestrator(orchestrator);

        let task = chat_task("delegate to nobody");
        let outcome = agent_loop.run(&task, &CancellationToken::new()).await;

        assert_eq!(outcome.status, TaskStatus::Completed);
        let turns = memory.persisted_turns(task.id, 10).unwrap();
        let error_turn = turns.iter().find(|t| t.role == Role::Tool).unwrap();
        assert!(error_turn.is_error);
        assert!(error_turn.content.contains("unknown sub-agent type"));
    }
}
