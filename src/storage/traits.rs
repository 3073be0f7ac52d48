//! Storage abstraction
//!
//! One embedding per identity, nearest-neighbour lookup above a threshold.
//! Implementations must be thread-safe and hand out connections from a pool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use anyhow::Result;

use crate::engine::Embedding;

/// Closest stored identity for a query embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub student_id: String,
    pub name: Option<String>,
    pub similarity: f32,
}

impl MatchResult {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

#[async_trait]
pub trait MatchStore: Send + Sync + 'static {
    /// Insert or replace the embedding for an identity. Runs in a
    /// transaction; any failure rolls back and reports `false`.
    async fn store(&self, student_id: &str, embedding: &Embedding) -> bool;

    /// Closest identity whose similarity is at least `threshold`
    async fn find_match(&self, embedding: &Embedding, threshold: f32) -> Option<MatchResult>;

    /// Number of identities with an embedding
    async fn count(&self) -> Result<i64>;
}
