//! SQLite storage
//!
//! Embeddings are stored as little-endian f32 BLOBs and matched by a full
//! scan in Rust. Fine for a single gate with a few thousand students.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{sqlite::{SqlitePool, SqlitePoolOptions}, Row};
use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::engine::Embedding;
use crate::utils::math::cosine_similarity;

use super::traits::{MatchResult, MatchStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", db_path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.initialize().await?;

        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                student_id TEXT PRIMARY KEY,
                name TEXT,
                face_embedding BLOB
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("SQLite database initialized");
        Ok(())
    }

    /// Set the display name for an identity (administrative)
    pub async fn set_name(&self, student_id: &str, name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO students (student_id, name) VALUES (?, ?)
            ON CONFLICT (student_id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(student_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert(&self, student_id: &str, embedding: &Embedding) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO students (student_id, face_embedding) VALUES (?, ?)
            ON CONFLICT (student_id) DO UPDATE SET face_embedding = excluded.face_embedding
            "#,
        )
        .bind(student_id)
        .bind(embedding.to_bytes())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn nearest(&self, embedding: &Embedding) -> Result<Option<MatchResult>> {
        let rows = sqlx::query(
            r#"
            SELECT student_id, name, face_embedding
            FROM students
            WHERE face_embedding IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut best: Option<MatchResult> = None;
        for row in rows {
            let bytes: Vec<u8> = row.get("face_embedding");
            let stored = Embedding::from_bytes(&bytes)?;
            let similarity = cosine_similarity(embedding.as_slice(), stored.as_slice());
            // zero-norm or corrupt rows yield NaN and would never compare
            if !similarity.is_finite() {
                debug!("Skipping {}: non-finite similarity", row.get::<String, _>("student_id"));
                continue;
            }

            if best.as_ref().map_or(true, |b| similarity > b.similarity) {
                best = Some(MatchResult {
                    student_id: row.get("student_id"),
                    name: row.get("name"),
                    similarity,
                });
            }
        }

        Ok(best)
    }
}

#[async_trait]
impl MatchStore for SqliteStore {
    async fn store(&self, student_id: &str, embedding: &Embedding) -> bool {
        // Dropping an uncommitted transaction rolls it back
        match self.upsert(student_id, embedding).await {
            Ok(()) => {
                debug!("Stored embedding for {}", student_id);
                true
            }
            Err(e) => {
                error!("Error storing embedding for {}: {:#}", student_id, e);
                false
            }
        }
    }

    async fn find_match(&self, embedding: &Embedding, threshold: f32) -> Option<MatchResult> {
        match self.nearest(embedding).await {
            Ok(best) => best.filter(|m| m.similarity >= threshold),
            Err(e) => {
                error!("Error finding match: {:#}", e);
                None
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM students WHERE face_embedding IS NOT NULL")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open(dir: &tempfile::TempDir) -> SqliteStore {
        let db_path = dir.path().join("test.db");
        SqliteStore::new(db_path.to_str().unwrap()).await.unwrap()
    }

    fn emb(v: &[f32]) -> Embedding {
        Embedding::new(v.to_vec())
    }

    #[tokio::test]
    async fn test_store_and_match() {
        let dir = tempdir().unwrap();
        let store = open(&dir).await;

        assert!(store.store("S1", &emb(&[1.0, 0.0, 0.0])).await);
        assert!(store.store("S2", &emb(&[0.0, 1.0, 0.0])).await);
        store.set_name("S1", "Asha").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let m = store.find_match(&emb(&[0.9, 0.1, 0.0]), 0.6).await.unwrap();
        assert_eq!(m.student_id, "S1");
        assert_eq!(m.display_name(), "Asha");
        assert!(m.similarity > 0.99);
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let dir = tempdir().unwrap();
        let store = open(&dir).await;
        store.store("S1", &emb(&[1.0, 0.0])).await;

        // cos(60deg) = 0.5
        let query = emb(&[0.5, 0.75f32.sqrt()]);
        let sim = store.find_match(&query, 0.0).await.unwrap().similarity;

        assert!(store.find_match(&query, sim).await.is_some());
        assert!(store.find_match(&query, sim + 1e-4).await.is_none());
        assert_eq!(store.find_match(&query, 0.6).await, None);
    }

    #[tokio::test]
    async fn test_upsert_replaces_embedding() {
        let dir = tempdir().unwrap();
        let store = open(&dir).await;

        store.store("S1", &emb(&[1.0, 0.0])).await;
        store.store("S1", &emb(&[0.0, 1.0])).await;
        assert_eq!(store.count().await.unwrap(), 1);

        assert!(store.find_match(&emb(&[1.0, 0.0]), 0.6).await.is_none());
        let m = store.find_match(&emb(&[0.0, 1.0]), 0.6).await.unwrap();
        assert_eq!(m.student_id, "S1");
        assert_eq!(m.display_name(), "Unknown");
    }

    #[tokio::test]
    async fn test_zero_norm_row_does_not_hide_match() {
        let dir = tempdir().unwrap();
        let store = open(&dir).await;

        assert!(store.store("A", &emb(&[0.0, 0.0])).await);
        assert!(store.store("B", &emb(&[1.0, 0.0])).await);

        let m = store.find_match(&emb(&[1.0, 0.0]), 0.6).await.unwrap();
        assert_eq!(m.student_id, "B");
        assert!((m.similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_empty_store_has_no_match() {
        let dir = tempdir().unwrap();
        let store = open(&dir).await;
        assert!(store.find_match(&emb(&[1.0]), 0.0).await.is_none());
    }
}
