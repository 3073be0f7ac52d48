//! Identity embedding persistence

pub mod traits;
pub mod sqlite;
pub mod postgres;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::{Config, StorageType};

pub use traits::{MatchResult, MatchStore};
pub use sqlite::SqliteStore;
pub use postgres::PostgresStore;

/// Build the configured store, or `None` when persistence is disabled
pub async fn open(config: &Config) -> Result<Option<Arc<dyn MatchStore>>> {
    let dim = config.recognition.embedding_dim;
    match config.storage.storage_type {
        StorageType::None => {
            info!("Persistence disabled; embeddings are returned to the caller only");
            Ok(None)
        }
        StorageType::Sqlite => {
            let path = config
                .storage
                .sqlite_path
                .as_deref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| "data/faces.db".to_string());
            let store = SqliteStore::new(&path).await?;
            info!("SQLite storage initialized at: {}", path);
            Ok(Some(Arc::new(store)))
        }
        StorageType::Postgres => {
            let store = PostgresStore::connect(&config.storage.postgres, dim).await?;
            Ok(Some(Arc::new(store)))
        }
    }
}
