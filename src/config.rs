//! Service configuration
//!
//! Loaded from `config.toml` (or `$CONFIG_PATH`), then overridden by the
//! deployment environment variables (`PORT`, `DB_*`).

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub models: ModelsConfig,
    pub recognition: RecognitionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Request body limit in bytes
    pub body_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub device: String,
    pub model_idle_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub detector: PathBuf,
    pub embedder: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub embedding_dim: usize,
    /// Minimum cosine similarity for a store match
    pub match_threshold: f32,
    /// Detector confidence; kept low so uncertain faces still get embedded
    pub detection_confidence: f32,
    /// Fractional margin added around the detected face box before cropping
    pub face_margin: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    None,
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    pub sqlite_path: Option<PathBuf>,
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// libpq-style `sslmode`: disable, allow, prefer, require, verify-ca, verify-full
    pub ssl_mode: String,
    pub max_connections: u32,
    pub connect_attempts: u32,
    pub retry_delay_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            ssl_mode: "prefer".to_string(),
            max_connections: 5,
            connect_attempts: 3,
            retry_delay_secs: 2,
            connect_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> String {
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string())
    }

    /// Apply `PORT` and `DB_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Setting `DB_HOST` switches
    /// the store to Postgres.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        let pg = &mut self.storage.postgres;
        if let Some(host) = lookup("DB_HOST").filter(|h| !h.is_empty()) {
            pg.host = host;
            self.storage.storage_type = StorageType::Postgres;
        }
        if let Some(name) = lookup("DB_NAME") {
            pg.database = name;
        }
        if let Some(user) = lookup("DB_USER") {
            pg.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            pg.password = password;
        }
        if let Some(port) = lookup("DB_PORT").and_then(|p| p.parse().ok()) {
            pg.port = port;
        }
        if let Some(mode) = lookup("DB_SSLMODE").filter(|m| !m.is_empty()) {
            pg.ssl_mode = mode;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8000,
                body_limit: 50 * 1024 * 1024,
            },
            inference: InferenceConfig {
                device: "CPU".to_string(),
                model_idle_timeout: 300,
            },
            models: ModelsConfig {
                detector: PathBuf::from("models/scrfd_10g_kps.onnx"),
                embedder: PathBuf::from("models/facenet128.onnx"),
            },
            recognition: RecognitionConfig {
                embedding_dim: 128,
                match_threshold: 0.6,
                detection_confidence: 0.3,
                face_margin: 0.2,
            },
            storage: StorageConfig {
                storage_type: StorageType::None,
                sqlite_path: Some(PathBuf::from("data/faces.db")),
                postgres: PostgresConfig::default(),
            },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Config::default().server
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Config::default().inference
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Config::default().models
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Config::default().recognition
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Config::default().storage
    }
}
