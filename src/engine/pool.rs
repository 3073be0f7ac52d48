//! Model pool
//!
//! Compiles models on first use and drops them again after an idle timeout,
//! so a mostly idle gate service does not keep the network weights resident.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use openvino::{CompiledModel, Core};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config::{InferenceConfig, ModelsConfig};

/// OpenVINO Core handle that can cross threads
pub struct SafeCore(Core);
unsafe impl Send for SafeCore {}
unsafe impl Sync for SafeCore {}

/// Compiled model handle that can cross threads
#[derive(Clone)]
pub struct SafeCompiledModel(Arc<CompiledModel>);
unsafe impl Send for SafeCompiledModel {}
unsafe impl Sync for SafeCompiledModel {}

impl SafeCompiledModel {
    /// Create an inference request.
    /// The C++ CompiledModel is thread-safe; the bindings only ask for
    /// `&mut self` out of caution.
    pub fn create_infer_request(&self) -> anyhow::Result<openvino::InferRequest> {
        unsafe {
            let ptr = Arc::as_ptr(&self.0) as *mut CompiledModel;
            (*ptr).create_infer_request().map_err(|e| e.into())
        }
    }
}

/// Models managed by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Detector,
    Embedder,
}

impl ModelType {
    pub const ALL: [ModelType; 2] = [ModelType::Detector, ModelType::Embedder];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Detector => "detector",
            ModelType::Embedder => "embedder",
        }
    }
}

struct CachedModel {
    compiled: SafeCompiledModel,
    last_access: Instant,
}

struct Slot {
    path: PathBuf,
    cached: RwLock<Option<CachedModel>>,
}

impl Slot {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            cached: RwLock::new(None),
        }
    }
}

/// Lazily loading, idle-unloading model pool
pub struct ModelPool {
    core: Mutex<SafeCore>,
    device: String,
    idle_timeout: Duration,
    detector: Slot,
    embedder: Slot,
    shutdown: Notify,
}

impl ModelPool {
    pub fn new(inference: &InferenceConfig, models: &ModelsConfig) -> anyhow::Result<Self> {
        let core = Core::new().context("Failed to initialize OpenVINO runtime")?;

        Ok(Self {
            core: Mutex::new(SafeCore(core)),
            device: inference.device.clone(),
            idle_timeout: Duration::from_secs(inference.model_idle_timeout),
            detector: Slot::new(&models.detector),
            embedder: Slot::new(&models.embedder),
            shutdown: Notify::new(),
        })
    }

    fn slot(&self, model_type: ModelType) -> &Slot {
        match model_type {
            ModelType::Detector => &self.detector,
            ModelType::Embedder => &self.embedder,
        }
    }

    /// Get a compiled model, loading it if needed
    pub fn get_model(&self, model_type: ModelType) -> anyhow::Result<SafeCompiledModel> {
        let slot = self.slot(model_type);

        // Held across the load so concurrent requests compile only once
        let mut guard = slot.cached.write();
        if let Some(cached) = guard.as_mut() {
            cached.last_access = Instant::now();
            return Ok(cached.compiled.clone());
        }

        let path = slot.path.to_string_lossy();
        info!("Loading model: {} from {}", model_type.as_str(), path);
        let start = Instant::now();

        let compiled = {
            let mut core = self.core.lock();
            let model = core
                .0
                .read_model_from_file(&path, "")
                .with_context(|| format!("Failed to read model {}", path))?;
            core.0
                .compile_model(&model, self.device.as_str().into())
                .with_context(|| format!("Failed to compile model {} for {}", path, self.device))?
        };
        let compiled = SafeCompiledModel(Arc::new(compiled));

        info!("Model {} loaded in {:?}", model_type.as_str(), start.elapsed());

        *guard = Some(CachedModel {
            compiled: compiled.clone(),
            last_access: Instant::now(),
        });

        Ok(compiled)
    }

    pub fn is_loaded(&self, model_type: ModelType) -> bool {
        self.slot(model_type).cached.read().is_some()
    }

    /// Loaded state of every model, keyed by name
    pub fn status(&self) -> HashMap<String, bool> {
        ModelType::ALL
            .iter()
            .map(|t| (t.as_str().to_string(), self.is_loaded(*t)))
            .collect()
    }

    fn cleanup_idle_models(&self) {
        let now = Instant::now();
        for model_type in ModelType::ALL {
            let mut guard = self.slot(model_type).cached.write();
            let idle = guard
                .as_ref()
                .map(|c| now.duration_since(c.last_access) > self.idle_timeout)
                .unwrap_or(false);
            if idle {
                info!("Unloading idle model: {}", model_type.as_str());
                *guard = None;
            }
        }
    }

    /// Periodically unload idle models until `shutdown` is called
    pub async fn start_cleanup_task(self: Arc<Self>) {
        let check_interval = Duration::from_secs(60);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(check_interval) => {
                    debug!("Running model cleanup check");
                    self.cleanup_idle_models();
                }
                _ = self.shutdown.notified() => {
                    info!("Model pool cleanup task shutting down");
                    break;
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl Drop for ModelPool {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_names() {
        let names: Vec<&str> = ModelType::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(names, vec!["detector", "embedder"]);
    }
}
