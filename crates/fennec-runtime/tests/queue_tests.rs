#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use fennec_core::{Task, TaskOrigin, TaskStatus};
    use fennec_runtime::TaskQueue;

    fn task(payload: &str, priority: u8) -> Task {
        Task::new(TaskOrigin::Chat, payload).with_priority(priority)
    }

    #[tokio::test]
    async fn test_priority_order() {
        let queue = TaskQueue::new();
        queue.enqueue(task("low", 1));
        queue.enqueue(task("high", 9));
        queue.enqueue(task("mid", 5));

        assert_eq!(queue.dequeue().await.task.payload, "high");
        assert_eq!(queue.dequeue().await.task.payload, "mid");
        assert_eq!(queue.dequeue().await.task.payload, "low");
    }

    #[tokio::test]
    async fn test_fifo_within_equal_priority() {
        let queue = TaskQueue::new();
        queue.enqueue(task("first", 5));
        queue.enqueue(task("second", 5));
        queue.enqueue(task("third", 5));

        assert_eq!(queue.dequeue().await.task.payload, "first");
        assert_eq!(queue.dequeue().await.task.payload, "second");
        assert_eq!(queue.dequeue().await.task.payload, "third");
    }

    #[tokio::test]
    async fn test_dequeue_suspends_until_enqueue() {
        let queue = Arc::new(TaskQueue::new());

        let q = Arc::clone(&queue);
        let waiter = tokio::spawn(async move { q.dequeue().await.task.payload });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.enqueue(task("late arrival", 5));
        assert_eq!(waiter.await.unwrap(), "late arrival");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_double_claim_under_concurrent_dequeue() {
        let queue = Arc::new(TaskQueue::new());
        let mut expected = HashSet::new();
        for i in 0..40 {
            expected.insert(queue.enqueue(task(&format!("task {i}"), 5)));
        }

        let claimed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut workers = Vec::new();
        for _ in 0..4 {
            let q = Arc::clone(&queue);
            let c = Arc::clone(&claimed);
            workers.push(tokio::spawn(async move {
                while let Ok(claim) =
                    tokio::time::timeout(Duration::from_millis(100), q.dequeue()).await
                {
                    c.lock().push(claim.task.id);
                    q.finish(claim.task.id, TaskStatus::Completed);
                }
            }));
        }
        for w in workers {
            w.await.unwrap();
        }

        let claimed = claimed.lock();
        let unique: HashSet<_> = claimed.iter().copied().collect();
        assert_eq!(claimed.len(), 40, "every task claimed exactly once");
        assert_eq!(unique.len(), 40, "no task claimed twice");
        assert_eq!(unique, expected);
    }

    #[tokio::test]
    async fn test_claim_sets_running_and_finish_releases() {
        let queue = TaskQueue::new();
        let id = queue.enqueue(task("work", 5));
        assert_eq!(queue.status(id), Some(TaskStatus::Queued));
        assert_eq!(queue.running_count(), 0);

        let claim = queue.dequeue().await;
        assert_eq!(queue.status(id), Some(TaskStatus::Running));
        assert_eq!(queue.running_count(), 1);
        assert_eq!(queue.depth(), 0);

        queue.finish(claim.task.id, TaskStatus::Completed);
        assert_eq!(queue.status(id), Some(TaskStatus::Completed));
        assert_eq!(queue.running_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_queued_task_removes_it() {
        let queue = TaskQueue::new();
        let id = queue.enqueue(task("doomed", 5));
        assert!(queue.cancel(id));
        assert_eq!(queue.status(id), Some(TaskStatus::Cancelled));
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_cancel_running_task_trips_token() {
        let queue = TaskQueue::new();
        let id = queue.enqueue(task("long haul", 5));
        let claim = queue.dequeue().await;
        assert!(!claim.cancel.is_cancelled());

        assert!(queue.cancel(id));
        assert!(claim.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_unknown_task_is_noop() {
        let queue = TaskQueue::new();
        assert!(!queue.cancel(uuid::Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_unknown_task_counts_as_terminal() {
        let queue = TaskQueue::new();
        assert!(queue.is_terminal(uuid::Uuid::new_v4()));

        let id = queue.enqueue(task("pending", 5));
        assert!(!queue.is_terminal(id));
    }

    #[tokio::test]
    async fn test_list_tasks_most_recent_first() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a", 5));
        queue.enqueue(task("b", 5));
        let listed = queue.list_tasks(10);
        assert_eq!(listed.len(), 2);
    }
}
