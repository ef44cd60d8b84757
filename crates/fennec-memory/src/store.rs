use std::path::Path;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use fennec_core::{ConversationTurn, FennecError, Result, Role, TaskId};

use crate::long_term::{LongTermIndex, MemoryRecord, QueryFilter};
use crate::short_term::ShortTermMemory;

/// Options for opening a memory store.
#[derive(Debug, Clone)]
pub struct MemoryOptions {
    /// Embedding dimensionality — fixed per deployment.
    pub embedding_dims: usize,
    /// Maximum short-term turns per task.
    pub short_term_max_turns: usize,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            embedding_dims: 768,
            short_term_max_turns: 50,
        }
    }
}

/// Unified memory store combining the short-term buffers and the long-term
/// similarity index, backed by SQLite.
///
/// Consistency model: short-term buffers are in-process and exclusively
/// owned per task; the long-term tier is shared-read, append-only-write. No
/// record is ever updated in place, so reads take no exclusive locks and
/// writes reduce to a single atomic append.
pub struct MemoryStore {
    short: Mutex<ShortTermMemory>,
    index: RwLock<LongTermIndex>,
    db: Mutex<Connection>,
}

impl MemoryStore {
    /// Open or create the memory database at the given path.
    pub fn open(path: &Path, options: MemoryOptions) -> Result<Self> {
        info!(?path, dims = options.embedding_dims, "opening memory store");

        let conn = Connection::open(path).map_err(|e| FennecError::Memory(e.to_string()))?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| FennecError::Memory(e.to_string()))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS turns (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tool_calls TEXT DEFAULT '[]',
                tool_call_id TEXT,
                is_error INTEGER DEFAULT 0,
                timestamp TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata TEXT DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_turns_task ON turns(task_id);
            CREATE INDEX IF NOT EXISTS idx_records_created ON records(created_at);
            ",
        )
        .map_err(|e| FennecError::Memory(e.to_string()))?;

        let store = Self {
            short: Mutex::new(ShortTermMemory::new(options.short_term_max_turns)),
            index: RwLock::new(LongTermIndex::new(options.embedding_dims)),
            db: Mutex::new(conn),
        };

        let loaded = store.load_records()?;
        if loaded > 0 {
            info!(count = loaded, "loaded memory records from SQLite");
        }

        Ok(store)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory(options: MemoryOptions) -> Result<Self> {
        Self::open(Path::new(":memory:"), options)
    }

    // ── Short-term contract ────────────────────────────────────

    /// Append a turn: committed to the task's short-term buffer and persisted
    /// append-only for the read-only query interface. Returns any turns the
    /// bounded buffer evicted (oldest first) so the caller may summarize them
    /// into long-term memory.
    pub fn append_turn(&self, turn: ConversationTurn) -> Result<Vec<ConversationTurn>> {
        let evicted = self.short.lock().append(turn.clone());
        if let Err(e) = self.persist_turn(&turn) {
            warn!(error = %e, "turn persistence failed (buffer unaffected)");
        }
        Ok(evicted)
    }

    /// The most recent buffered turns for a task, most-recent-last.
    pub fn recent(&self, task_id: TaskId, limit: usize) -> Vec<ConversationTurn> {
        self.short.lock().recent(task_id, limit)
    }

    /// Number of buffered turns for a task.
    pub fn buffered_turns(&self, task_id: TaskId) -> usize {
        self.short.lock().len(task_id)
    }

    /// Drop a finished task's short-term segment.
    pub fn release_task(&self, task_id: TaskId) -> Vec<ConversationTurn> {
        self.short.lock().release(task_id)
    }

    // ── Long-term contract ─────────────────────────────────────

    /// Append a record to long-term memory. Failures surface to the caller —
    /// silent memory loss is a correctness bug for a persistent agent.
    pub fn write_record(&self, record: MemoryRecord) -> Result<()> {
        {
            let index = self.index.read();
            if record.embedding.len() != index.dims() {
                return Err(FennecError::MemoryWrite(format!(
                    "embedding dimensionality mismatch: got {}, store is {}",
                    record.embedding.len(),
                    index.dims()
                )));
            }
        }

        let embedding_blob: Vec<u8> = record
            .embedding
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        let metadata_json = serde_json::to_string(&record.metadata)
            .map_err(|e| FennecError::MemoryWrite(e.to_string()))?;

        self.db
            .lock()
            .execute(
                "INSERT INTO records (id, text, embedding, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    record.id.to_string(),
                    record.text,
                    embedding_blob,
                    metadata_json,
                    record.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| FennecError::MemoryWrite(e.to_string()))?;

        self.index.write().insert(record)
    }

    /// The `k` records most similar to `embedding`, descending similarity,
    /// ties broken by descending `created_at`. Never mutates.
    pub fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<(MemoryRecord, f32)>> {
        self.index.read().query(embedding, k, filter)
    }

    /// Number of long-term records.
    pub fn record_count(&self) -> usize {
        self.index.read().len()
    }

    // ── Read-only query interface (dashboard contract) ─────────

    /// Recent persisted turns for a task, oldest first. Reads SQLite, not
    /// the in-process buffer, so it also covers finished tasks.
    pub fn persisted_turns(&self, task_id: TaskId, limit: usize) -> Result<Vec<ConversationTurn>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT task_id, role, content, tool_calls, tool_call_id, is_error, timestamp
                 FROM turns WHERE task_id = ?1
                 ORDER BY seq DESC LIMIT ?2",
            )
            .map_err(|e| FennecError::Memory(e.to_string()))?;

        let mut turns: Vec<ConversationTurn> = stmt
            .query_map(
                rusqlite::params![task_id.to_string(), limit as i64],
                |row| {
                    Ok(RawTurn {
                        task_id: row.get(0)?,
                        role: row.get(1)?,
                        content: row.get(2)?,
                        tool_calls: row.get(3)?,
                        tool_call_id: row.get(4)?,
                        is_error: row.get::<_, i64>(5)? != 0,
                        timestamp: row.get(6)?,
                    })
                },
            )
            .map_err(|e| FennecError::Memory(e.to_string()))?
            .filter_map(|r| r.ok())
            .filter_map(RawTurn::into_turn)
            .collect();

        // Reverse to chronological order
        turns.reverse();
        Ok(turns)
    }

    /// Total persisted turn count.
    pub fn turn_count(&self) -> Result<usize> {
        let db = self.db.lock();
        let count: i64 = db
            .query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))
            .map_err(|e| FennecError::Memory(e.to_string()))?;
        Ok(count as usize)
    }

    /// Whether the backing database still answers queries.
    pub fn reachable(&self) -> bool {
        self.db
            .lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    // ── Internals ──────────────────────────────────────────────

    fn persist_turn(&self, turn: &ConversationTurn) -> Result<()> {
        let role = match turn.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let tool_calls_json = serde_json::to_string(&turn.tool_calls)
            .map_err(|e| FennecError::Memory(e.to_string()))?;

        self.db
            .lock()
            .execute(
                "INSERT INTO turns (task_id, role, content, tool_calls, tool_call_id, is_error, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    turn.task_id.to_string(),
                    role,
                    turn.content,
                    tool_calls_json,
                    turn.tool_call_id,
                    turn.is_error as i64,
                    turn.timestamp.to_rfc3339(),
                ],
            )
            .map_err(|e| FennecError::Memory(e.to_string()))?;
        Ok(())
    }

    /// Load all persisted records into the index at open. Returns the count.
    fn load_records(&self) -> Result<usize> {
        let rows: Vec<(String, String, Vec<u8>, String, String)> = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare("SELECT id, text, embedding, metadata, created_at FROM records ORDER BY created_at")
                .map_err(|e| FennecError::Memory(e.to_string()))?;
            stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })
            .map_err(|e| FennecError::Memory(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect()
        };

        let mut index = self.index.write();
        let mut loaded = 0;
        for (id, text, blob, metadata_json, created_at) in rows {
            if blob.len() % 4 != 0 {
                continue;
            }
            let embedding: Vec<f32> = blob
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();

            let record = MemoryRecord {
                id: id.parse().unwrap_or_else(|_| Uuid::new_v4()),
                embedding,
                text,
                metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
                created_at: created_at
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now()),
            };
            if index.insert(record).is_ok() {
                loaded += 1;
            }
        }
        Ok(loaded)
    }
}

/// A raw turn row loaded from SQLite.
struct RawTurn {
    task_id: String,
    role: String,
    content: String,
    tool_calls: String,
    tool_call_id: Option<String>,
    is_error: bool,
    timestamp: String,
}

impl RawTurn {
    fn into_turn(self) -> Option<ConversationTurn> {
        let role = match self.role.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => return None,
        };
        Some(ConversationTurn {
            task_id: self.task_id.parse().ok()?,
            role,
            content: self.content,
            timestamp: self
                .timestamp
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
            tool_calls: serde_json::from_str(&self.tool_calls).unwrap_or_default(),
            tool_call_id: self.tool_call_id,
            is_error: self.is_error,
        })
    }
}
