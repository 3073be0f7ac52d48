//! PostgreSQL + pgvector storage
//!
//! Nearest-neighbour search runs inside Postgres with the cosine distance
//! operator (`<=>`); similarity is reported as `1 - distance`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use anyhow::{Context, Result};
use pgvector::Vector;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::Row;
use tracing::{error, info, warn};

use crate::config::PostgresConfig;
use crate::engine::Embedding;

use super::traits::{MatchResult, MatchStore};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect with bounded retries, then make sure the schema exists.
    /// Fails permanently once every attempt is exhausted.
    pub async fn connect(config: &PostgresConfig, embedding_dim: usize) -> Result<Self> {
        info!("Attempting to connect to: {}:{}", config.host, config.port);

        let options = connect_options(config)?;
        let pool = retry(
            config.connect_attempts,
            Duration::from_secs(config.retry_delay_secs),
            || {
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
                    .connect_with(options.clone())
            },
        )
        .await
        .with_context(|| {
            format!(
                "Failed to connect to database at {}:{} after {} attempts",
                config.host, config.port, config.connect_attempts
            )
        })?;
        info!("Connected to database");

        let store = Self { pool };
        store.initialize(embedding_dim).await?;
        Ok(store)
    }

    async fn initialize(&self, embedding_dim: usize) -> Result<()> {
        if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
        {
            warn!("Could not ensure vector extension: {}", e);
        }

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                student_id TEXT PRIMARY KEY,
                name TEXT,
                face_embedding vector({})
            )
            "#,
            embedding_dim
        ))
        .execute(&self.pool)
        .await
        .context("Failed to create students table")?;

        if let Err(e) = sqlx::query(
            "CREATE INDEX IF NOT EXISTS students_face_embedding_idx \
             ON students USING hnsw (face_embedding vector_cosine_ops)",
        )
        .execute(&self.pool)
        .await
        {
            warn!("Could not create vector index, falling back to sequential scan: {}", e);
        }

        Ok(())
    }

    async fn upsert(&self, student_id: &str, embedding: &Embedding) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO students (student_id, face_embedding)
            VALUES ($1, $2)
            ON CONFLICT (student_id)
            DO UPDATE SET face_embedding = EXCLUDED.face_embedding
            "#,
        )
        .bind(student_id)
        .bind(Vector::from(embedding.as_slice().to_vec()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn nearest(&self, embedding: &Embedding) -> Result<Option<MatchResult>> {
        let row = sqlx::query(
            r#"
            SELECT student_id, name,
                   1 - (face_embedding <=> $1) AS similarity
            FROM students
            WHERE face_embedding IS NOT NULL
            ORDER BY face_embedding <=> $1
            LIMIT 1
            "#,
        )
        .bind(Vector::from(embedding.as_slice().to_vec()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| MatchResult {
            student_id: row.get("student_id"),
            name: row.get("name"),
            similarity: row.get::<f64, _>("similarity") as f32,
        }))
    }
}

#[async_trait]
impl MatchStore for PostgresStore {
    async fn store(&self, student_id: &str, embedding: &Embedding) -> bool {
        match self.upsert(student_id, embedding).await {
            Ok(()) => true,
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
        let row = sqlx::query("SELECT COUNT(*) AS count FROM students WHERE face_embedding IS NOT NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}

fn connect_options(config: &PostgresConfig) -> Result<PgConnectOptions> {
    let ssl_mode: PgSslMode = config
        .ssl_mode
        .parse()
        .with_context(|| format!("Invalid ssl_mode: {}", config.ssl_mode))?;

    Ok(PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .password(&config.password)
        .ssl_mode(ssl_mode))
}

/// Run `op` up to `attempts` times with a fixed delay between failures
async fn retry<T, E, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!("Connection attempt {}/{} failed: {}", attempt, attempts, e);
                info!("Retrying in {:?}...", delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!("Connection attempt {}/{} failed: {}", attempt, attempts, e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_connect_options() {
        let config = PostgresConfig {
            host: "db.campus".to_string(),
            port: 6543,
            database: "gate".to_string(),
            user: "svc".to_string(),
            ssl_mode: "require".to_string(),
            ..Default::default()
        };
        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "db.campus");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("gate"));
        assert_eq!(options.get_username(), "svc");
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Require));

        let defaults = connect_options(&PostgresConfig::default()).unwrap();
        assert!(matches!(defaults.get_ssl_mode(), PgSslMode::Prefer));
    }

    #[test]
    fn test_unknown_ssl_mode_is_rejected() {
        let config = PostgresConfig {
            ssl_mode: "sometimes".to_string(),
            ..Default::default()
        };
        assert!(connect_options(&config).is_err());
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry(3, Duration::ZERO, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if n < 3 { Err(format!("fail {}", n)) } else { Ok(n) } }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry(3, Duration::ZERO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("refused".to_string()) }
        })
        .await;

        assert_eq!(result, Err("refused".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
