//! Persistence layer.
//!
//! Defines the `SnapshotRepository` trait: an append-only document
//! collection of odds snapshots plus one kind of in-place update
//! (attaching a recommendation). Every batch is all-or-nothing.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{OddsSnapshot, RecommendationUpdate, StoredSnapshot};

/// Durable store of every snapshot ever recorded.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Atomically insert a batch, returning the new document ids in
    /// input order.
    async fn insert_batch(&self, snapshots: &[OddsSnapshot]) -> Result<Vec<String>>;

    /// Read the whole collection.
    async fn load_all(&self) -> Result<Vec<StoredSnapshot>>;

    /// Atomically attach recommendations by document id. An unknown id
    /// fails the whole batch. Returns the number of documents updated.
    async fn apply_recommendations(&self, updates: &[RecommendationUpdate]) -> Result<usize>;
}
