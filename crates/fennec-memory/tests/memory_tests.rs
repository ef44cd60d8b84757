#[cfg(test)]
mod tests {
    use fennec_core::{ConversationTurn, Role};
    use fennec_memory::*;
    use uuid::Uuid;

    fn options(dims: usize, max_turns: usize) -> MemoryOptions {
        MemoryOptions {
            embedding_dims: dims,
            short_term_max_turns: max_turns,
        }
    }

    fn turn(task_id: Uuid, content: &str) -> ConversationTurn {
        ConversationTurn::new(task_id, Role::User, content)
    }

    // ── Short-term buffer ──────────────────────────────────────

    #[test]
    fn test_recent_is_most_recent_last() {
        let store = MemoryStore::open_in_memory(options(4, 10)).unwrap();
        let tid = Uuid::new_v4();
        for i in 0..3 {
            store.append_turn(turn(tid, &format!("turn {i}"))).unwrap();
        }
        let recent = store.recent(tid, 10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "turn 0");
        assert_eq!(recent[2].content, "turn 2");
    }

    #[test]
    fn test_fifo_eviction_beyond_bound() {
        // Bound K = 3: after K+1 appends the first turn is gone.
        let store = MemoryStore::open_in_memory(options(4, 3)).unwrap();
        let tid = Uuid::new_v4();
        let mut evicted_total = Vec::new();
        for i in 0..4 {
            let evicted = store.append_turn(turn(tid, &format!("turn {i}"))).unwrap();
            evicted_total.extend(evicted);
        }

        let recent = store.recent(tid, 3);
        assert_eq!(recent.len(), 3);
        assert!(recent.iter().all(|t| t.content != "turn 0"));
        assert_eq!(recent[0].content, "turn 1");

        // The evicted turn is handed back for best-effort promotion.
        assert_eq!(evicted_total.len(), 1);
        assert_eq!(evicted_total[0].content, "turn 0");
    }

    #[test]
    fn test_buffers_are_per_task() {
        let store = MemoryStore::open_in_memory(options(4, 10)).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append_turn(turn(a, "for a")).unwrap();
        store.append_turn(turn(b, "for b")).unwrap();

        assert_eq!(store.recent(a, 10).len(), 1);
        assert_eq!(store.recent(b, 10).len(), 1);
        assert_eq!(store.recent(a, 10)[0].content, "for a");
    }

    #[test]
    fn test_release_drops_buffer_but_not_persistence() {
        let store = MemoryStore::open_in_memory(options(4, 10)).unwrap();
        let tid = Uuid::new_v4();
        store.append_turn(turn(tid, "hello")).unwrap();
        store.release_task(tid);

        assert!(store.recent(tid, 10).is_empty());
        // The append-only persisted copy remains queryable.
        let persisted = store.persisted_turns(tid, 10).unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].content, "hello");
    }

    // ── Long-term store ────────────────────────────────────────

    #[test]
    fn test_query_orders_by_descending_similarity() {
        let store = MemoryStore::open_in_memory(options(2, 10)).unwrap();
        store
            .write_record(MemoryRecord::new(vec![1.0, 0.0], "exact match"))
            .unwrap();
        store
            .write_record(MemoryRecord::new(vec![0.7, 0.7], "diagonal"))
            .unwrap();
        store
            .write_record(MemoryRecord::new(vec![0.0, 1.0], "orthogonal"))
            .unwrap();

        let results = store
            .query(&[1.0, 0.0], 3, &QueryFilter::default())
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0.text, "exact match");
        assert_eq!(results[1].0.text, "diagonal");
        assert_eq!(results[2].0.text, "orthogonal");
        // Non-increasing similarity
        assert!(results[0].1 >= results[1].1);
        assert!(results[1].1 >= results[2].1);
    }

    #[test]
    fn test_query_is_deterministic() {
        let store = MemoryStore::open_in_memory(options(3, 10)).unwrap();
        for i in 0..20 {
            let v = vec![1.0, i as f32 * 0.1, 0.5];
            store
                .write_record(MemoryRecord::new(v, format!("record {i}")))
                .unwrap();
        }

        let first = store
            .query(&[1.0, 0.5, 0.5], 5, &QueryFilter::default())
            .unwrap();
        let second = store
            .query(&[1.0, 0.5, 0.5], 5, &QueryFilter::default())
            .unwrap();

        let ids_a: Vec<_> = first.iter().map(|(r, _)| r.id).collect();
        let ids_b: Vec<_> = second.iter().map(|(r, _)| r.id).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_query_ties_break_by_created_at_descending() {
        let store = MemoryStore::open_in_memory(options(2, 10)).unwrap();
        let older = MemoryRecord {
            created_at: chrono::Utc::now() - chrono::Duration::hours(1),
            ..MemoryRecord::new(vec![1.0, 0.0], "older")
        };
        let newer = MemoryRecord::new(vec![1.0, 0.0], "newer");
        store.write_record(older).unwrap();
        store.write_record(newer).unwrap();

        let results = store
            .query(&[1.0, 0.0], 2, &QueryFilter::default())
            .unwrap();
        assert_eq!(results[0].0.text, "newer");
        assert_eq!(results[1].0.text, "older");
    }

    #[test]
    fn test_query_metadata_filter() {
        let store = MemoryStore::open_in_memory(options(2, 10)).unwrap();
        store
            .write_record(
                MemoryRecord::new(vec![1.0, 0.0], "from chat")
                    .with_metadata("source", serde_json::json!("chat")),
            )
            .unwrap();
        store
            .write_record(
                MemoryRecord::new(vec![1.0, 0.0], "from research")
                    .with_metadata("source", serde_json::json!("research")),
            )
            .unwrap();

        let results = store
            .query(
                &[1.0, 0.0],
                5,
                &QueryFilter::metadata("source", serde_json::json!("chat")),
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.text, "from chat");
    }

    #[test]
    fn test_write_rejects_wrong_dimensionality() {
        let store = MemoryStore::open_in_memory(options(4, 10)).unwrap();
        let result = store.write_record(MemoryRecord::new(vec![1.0, 0.0], "too short"));
        assert!(matches!(
            result,
            Err(fennec_core::FennecError::MemoryWrite(_))
        ));
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");

        {
            let store = MemoryStore::open(&path, options(2, 10)).unwrap();
            store
                .write_record(
                    MemoryRecord::new(vec![0.5, 0.5], "persistent fact")
                        .with_metadata("importance", serde_json::json!(0.9)),
                )
                .unwrap();
        }

        let store = MemoryStore::open(&path, options(2, 10)).unwrap();
        assert_eq!(store.record_count(), 1);
        let results = store
            .query(&[0.5, 0.5], 1, &QueryFilter::default())
            .unwrap();
        assert_eq!(results[0].0.text, "persistent fact");
        assert_eq!(
            results[0].0.metadata.get("importance"),
            Some(&serde_json::json!(0.9))
        );
    }

    #[test]
    fn test_turns_persist_append_only() {
        let store = MemoryStore::open_in_memory(options(2, 2)).unwrap();
        let tid = Uuid::new_v4();
        // Evicts beyond the bound of 2, but persistence keeps everything.
        for i in 0..5 {
            store.append_turn(turn(tid, &format!("turn {i}"))).unwrap();
        }
        assert_eq!(store.recent(tid, 10).len(), 2);
        assert_eq!(store.persisted_turns(tid, 10).unwrap().len(), 5);
        assert_eq!(store.turn_count().unwrap(), 5);
    }

    #[test]
    fn test_store_reachable() {
        let store = MemoryStore::open_in_memory(options(2, 2)).unwrap();
        assert!(store.reachable());
    }
}
