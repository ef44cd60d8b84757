use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fennec_core::{FennecError, Result};

/// One immutable long-term memory entry.
///
/// Write-once: records are never mutated in place, only superseded by new
/// records, which keeps every embedding/text pair consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    /// Fixed-length embedding vector (dimensionality fixed per deployment).
    pub embedding: Vec<f32>,
    pub text: String,
    /// Scalar metadata: source, topic, importance score.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(embedding: Vec<f32>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            embedding,
            text: text.into(),
            metadata: Default::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Metadata constraints applied during a query. All listed pairs must match
/// exactly for a record to qualify.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub metadata_equals: Vec<(String, serde_json::Value)>,
}

impl QueryFilter {
    pub fn metadata(key: &str, value: serde_json::Value) -> Self {
        Self {
            metadata_equals: vec![(key.to_string(), value)],
        }
    }

    fn matches(&self, record: &MemoryRecord) -> bool {
        self.metadata_equals
            .iter()
            .all(|(k, v)| record.metadata.get(k) == Some(v))
    }
}

/// In-memory cosine-similarity index over all long-term records.
///
/// Append-only: inserts never reorder or rewrite earlier entries, so
/// identical queries over identical index state return identical results.
pub struct LongTermIndex {
    records: Vec<MemoryRecord>,
    dims: usize,
}

impl LongTermIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            records: Vec::new(),
            dims,
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a record, validating its dimensionality.
    pub fn insert(&mut self, record: MemoryRecord) -> Result<()> {
        if record.embedding.len() != self.dims {
            return Err(FennecError::Memory(format!(
                "embedding dimensionality mismatch: got {}, index is {}",
                record.embedding.len(),
                self.dims
            )));
        }
        self.records.push(record);
        Ok(())
    }

    /// The `k` most similar records, ordered by descending cosine similarity.
    /// Ties break by descending `created_at`, then by id, so the ordering is
    /// fully deterministic for a given index state.
    pub fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<(MemoryRecord, f32)>> {
        if embedding.len() != self.dims {
            return Err(FennecError::Memory(format!(
                "query dimensionality mismatch: got {}, index is {}",
                embedding.len(),
                self.dims
            )));
        }

        let mut scored: Vec<(&MemoryRecord, f32)> = self
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| (r, cosine_similarity(embedding, &r.embedding)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.0.created_at.cmp(&a.0.created_at))
                .then(b.0.id.cmp(&a.0.id))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(r, s)| (r.clone(), s)).collect())
    }
}

/// Compute cosine similarity between two vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
