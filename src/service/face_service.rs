//! Face Service - Core business logic
//!
//! Orchestrates extraction, enrollment and the optional match store.
//! Inference is CPU-bound, so it runs on the blocking thread pool.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::engine::{Embedding, FaceEmbedder};
use crate::storage::MatchStore;

use super::enrollment::{aggregate, extract_from_bytes};
use super::error::{ServiceError, ServiceResult};
use super::types::*;

pub struct FaceService {
    embedder: Arc<FaceEmbedder>,
    store: Option<Arc<dyn MatchStore>>,
    match_threshold: f32,
}

impl FaceService {
    pub fn new(
        embedder: Arc<FaceEmbedder>,
        store: Option<Arc<dyn MatchStore>>,
        match_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            store,
            match_threshold,
        }
    }

    /// Extract one embedding from an encoded image
    pub async fn extract(&self, image_data: Vec<u8>) -> ServiceResult<Embedding> {
        let start = Instant::now();
        let embedder = self.embedder.clone();

        let embedding =
            tokio::task::spawn_blocking(move || extract_from_bytes(&embedder, &image_data)).await??;

        debug!("Extracted embedding in {}ms", start.elapsed().as_millis());
        Ok(embedding)
    }

    /// Enroll an identity from several photos.
    ///
    /// The mean embedding is always returned; in persistence mode it is also
    /// upserted and `stored` reports whether that write succeeded.
    pub async fn enroll(
        &self,
        student_id: &str,
        images: Vec<Result<Vec<u8>>>,
    ) -> ServiceResult<EnrollResult> {
        let start = Instant::now();
        info!("Enrolling {} from {} images", student_id, images.len());

        let embedder = self.embedder.clone();
        let outcome = tokio::task::spawn_blocking(move || aggregate(&embedder, images)).await??;

        let stored = match &self.store {
            Some(store) => {
                let ok = store.store(student_id, &outcome.embedding).await;
                if !ok {
                    warn!("Embedding for {} was not persisted", student_id);
                }
                Some(ok)
            }
            None => None,
        };

        info!(
            "Enrolled {} ({}/{} images) in {}ms",
            student_id,
            outcome.images_processed,
            outcome.total_images,
            start.elapsed().as_millis()
        );

        Ok(EnrollResult {
            student_id: student_id.to_string(),
            outcome,
            stored,
        })
    }

    /// Match a probe image against the store
    pub async fn verify_match(
        &self,
        image_data: Vec<u8>,
        threshold: Option<f32>,
    ) -> ServiceResult<VerifyResult> {
        let store = self.store.clone().ok_or(ServiceError::StoreDisabled)?;
        let threshold = threshold.unwrap_or(self.match_threshold);

        let embedding = match self.extract(image_data).await {
            Ok(embedding) => embedding,
            Err(ServiceError::NoFace) => return Ok(VerifyResult::NoFace),
            Err(e) => return Err(e),
        };

        Ok(match store.find_match(&embedding, threshold).await {
            Some(found) => {
                info!(
                    "Matched {} (similarity {:.3})",
                    found.student_id, found.similarity
                );
                VerifyResult::Verified {
                    name: found.display_name().to_string(),
                    student_id: found.student_id,
                    confidence: found.similarity,
                }
            }
            None => VerifyResult::NotRecognized,
        })
    }

    pub async fn stats(&self) -> ServiceStats {
        let identities = match &self.store {
            Some(store) => match store.count().await {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!("Failed to count identities: {:#}", e);
                    None
                }
            },
            None => None,
        };

        ServiceStats {
            models_loaded: self.embedder.model_status(),
            extraction: self.embedder.stats(),
            identities,
        }
    }
}
