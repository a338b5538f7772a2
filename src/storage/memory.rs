//! In-memory snapshot repository.
//!
//! Same contract as the SQLite store, held behind a `Mutex`. Used by
//! tests and for throwaway runs.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use uuid::Uuid;

use super::SnapshotRepository;
use crate::types::{OddsSnapshot, PipelineError, RecommendationUpdate, StoredSnapshot};

#[derive(Default)]
pub struct InMemoryRepository {
    documents: Mutex<Vec<StoredSnapshot>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with already-stored documents (ids preserved).
    pub fn with_documents(documents: Vec<StoredSnapshot>) -> Self {
        Self {
            documents: Mutex::new(documents),
        }
    }

    /// Copy of every stored document, in insertion order.
    pub fn documents(&self) -> Vec<StoredSnapshot> {
        self.documents
            .lock()
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryRepository {
    async fn insert_batch(&self, snapshots: &[OddsSnapshot]) -> Result<Vec<String>> {
        let mut docs = self
            .documents
            .lock()
            .map_err(|_| anyhow!("snapshot store lock poisoned"))?;

        let ids: Vec<String> = snapshots.iter().map(|_| Uuid::new_v4().to_string()).collect();
        docs.extend(
            ids.iter()
                .zip(snapshots)
                .map(|(id, s)| StoredSnapshot::new(id.clone(), s.clone())),
        );
        Ok(ids)
    }

    async fn load_all(&self) -> Result<Vec<StoredSnapshot>> {
        let docs = self
            .documents
            .lock()
            .map_err(|_| anyhow!("snapshot store lock poisoned"))?;
        Ok(docs.clone())
    }

    async fn apply_recommendations(&self, updates: &[RecommendationUpdate]) -> Result<usize> {
        let mut docs = self
            .documents
            .lock()
            .map_err(|_| anyhow!("snapshot store lock poisoned"))?;

        // Validate every id before touching anything.
        let mut positions = Vec::with_capacity(updates.len());
        for update in updates {
            let pos = docs
                .iter()
                .position(|d| d.id == update.document_id)
                .ok_or_else(|| {
                    PipelineError::Storage(format!("document not found: {}", update.document_id))
                })?;
            positions.push(pos);
        }

        for (pos, update) in positions.into_iter().zip(updates) {
            docs[pos].recommendation = Some(update.recommendation.clone());
        }
        Ok(updates.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
