#[cfg(test)]
mod tests {
    use fennec_core::*;
    use uuid::Uuid;

    // ── Task tests ─────────────────────────────────────────────

    #[test]
    fn test_task_constructor_defaults() {
        let task = Task::new(TaskOrigin::Chat, "hello");
        assert_eq!(task.origin, TaskOrigin::Chat);
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.priority, 5);
        assert!(task.correlation_id.is_none());
        assert!(task.trigger.is_none());
    }

    #[test]
    fn test_task_builders() {
        let task = Task::new(TaskOrigin::Scheduler, "check feeds")
            .with_priority(9)
            .with_trigger("morning-digest")
            .with_correlation_id("chat:42");
        assert_eq!(task.priority, 9);
        assert_eq!(task.trigger.as_deref(), Some("morning-digest"));
        assert_eq!(task.correlation_id.as_deref(), Some("chat:42"));
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_task_serde_roundtrip() {
        let task = Task::new(TaskOrigin::Dashboard, "show status");
        let json = serde_json::to_string(&task).unwrap();
        let restored: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id, task.id);
        assert_eq!(restored.origin, TaskOrigin::Dashboard);
        assert_eq!(restored.payload, "show status");
    }

    // ── Turn tests ─────────────────────────────────────────────

    #[test]
    fn test_turn_constructor() {
        let tid = Uuid::new_v4();
        let turn = ConversationTurn::new(tid, Role::User, "hi");
        assert_eq!(turn.task_id, tid);
        assert_eq!(turn.role, Role::User);
        assert!(turn.tool_calls.is_empty());
        assert!(!turn.is_error);
    }

    #[test]
    fn test_tool_result_turn() {
        let tid = Uuid::new_v4();
        let turn = ConversationTurn::tool_result(tid, "call_1", "boom", true);
        assert_eq!(turn.role, Role::Tool);
        assert_eq!(turn.tool_call_id.as_deref(), Some("call_1"));
        assert!(turn.is_error);
    }

    #[test]
    fn test_assistant_turn_with_calls() {
        let tid = Uuid::new_v4();
        let call = ToolCall {
            id: "call_1".into(),
            tool_name: "web_search".into(),
            arguments: serde_json::json!({"query": "rust"}),
        };
        let turn = ConversationTurn::assistant_with_calls(tid, "searching", vec![call]);
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].tool_name, "web_search");
    }

    #[test]
    fn test_role_serde_variants() {
        let roles = [Role::System, Role::User, Role::Assistant, Role::Tool];
        for role in &roles {
            let json = serde_json::to_string(role).unwrap();
            let restored: Role = serde_json::from_str(&json).unwrap();
            assert_eq!(*role, restored);
        }
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_error_routing_display() {
        let err = FennecError::Routing("no provider with capability 'search'".into());
        assert!(err.to_string().contains("search"));
    }

    #[test]
    fn test_error_budget_exhausted() {
        let err = FennecError::BudgetExhausted {
            resource: "steps".into(),
            used: 6,
            limit: 5,
        };
        let s = err.to_string();
        assert!(s.contains("steps"));
        assert!(s.contains('5'));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FennecError = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    // ── Event bus tests ────────────────────────────────────────

    #[test]
    fn test_event_bus_pub_sub() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let tid = Uuid::new_v4();
        bus.publish(StepEvent::Thinking { task_id: tid });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.task_id(), tid);
    }

    #[test]
    fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(StepEvent::Done {
            task_id: Uuid::new_v4(),
            status: TaskStatus::Completed,
        });

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let event = StepEvent::ToolCall {
            task_id: Uuid::new_v4(),
            tool: "web_search".to_string(),
            call_id: "call_123".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"tool_call\""));
        let restored: StepEvent = serde_json::from_str(&json).unwrap();
        if let StepEvent::ToolCall { tool, call_id, .. } = restored {
            assert_eq!(tool, "web_search");
            assert_eq!(call_id, "call_123");
        } else {
            panic!("wrong variant");
        }
    }
}
