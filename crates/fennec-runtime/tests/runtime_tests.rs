#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fennec_config::FennecConfig;
    use fennec_core::{Capability, StepEvent, TaskStatus};
    use fennec_llm::mock::MockProvider;
    use fennec_runtime::AgentRuntime;

    fn test_config(dir: &tempfile::TempDir) -> FennecConfig {
        let mut config = FennecConfig::default();
        config.memory.db_path = dir.path().join("fennec.db");
        config.scheduler.concurrency = 2;
        config
    }

    async fn wait_for_done(
        rx: &mut tokio::sync::broadcast::Receiver<StepEvent>,
        task_id: uuid::Uuid,
    ) -> TaskStatus {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for done event")
                .expect("event stream closed");
            if let StepEvent::Done { task_id: tid, status } = event
                && tid == task_id
            {
                return status;
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_chat_task_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = AgentRuntime::new(test_config(&dir)).unwrap();
        runtime.add_provider(Arc::new(
            MockProvider::new("mock", [Capability::Reasoning, Capability::ToolUse])
                .with_response("hello from the agent"),
        ));

        let handle = runtime.start().unwrap();
        let mut rx = handle.subscribe();

        let task_id = handle.submit_chat("hi there", "chat:1");
        let status = wait_for_done(&mut rx, task_id).await;

        assert_eq!(status, TaskStatus::Completed);
        assert_eq!(handle.status(task_id), Some(TaskStatus::Completed));

        let turns = handle.recent_turns(task_id, 10).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "hello from the agent");

        let task = handle.task(task_id).unwrap();
        assert_eq!(task.correlation_id.as_deref(), Some("chat:1"));

        runtime.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_health_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = AgentRuntime::new(test_config(&dir)).unwrap();
        runtime.add_provider(Arc::new(
            MockProvider::new("mock", [Capability::Reasoning]).with_response("ok"),
        ));

        let handle = runtime.start().unwrap();
        let health = handle.health().await;

        assert_eq!(health.concurrency_cap, 2);
        assert!(health.memory_reachable);
        assert_eq!(health.providers.len(), 1);
        assert_eq!(health.providers[0].name, "mock");
        assert!(health.providers[0].available);

        runtime.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_routing_failure_marks_task_failed() {
        let dir = tempfile::tempdir().unwrap();
        // No providers registered at all.
        let mut runtime = AgentRuntime::new(test_config(&dir)).unwrap();
        let handle = runtime.start().unwrap();
        let mut rx = handle.subscribe();

        let task_id = handle.submit_chat("anyone there?", "chat:2");
        let status = wait_for_done(&mut rx, task_id).await;

        assert_eq!(status, TaskStatus::Failed);
        assert_eq!(handle.status(task_id), Some(TaskStatus::Failed));

        runtime.shutdown().await;
    }
}
