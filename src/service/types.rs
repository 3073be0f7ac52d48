//! Service layer types

use serde::Serialize;

use crate::engine::embedder::ExtractionStatsSnapshot;
use crate::engine::Embedding;

/// Mean embedding over a batch of enrollment photos
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentOutcome {
    pub embedding: Embedding,
    pub images_processed: usize,
    pub images_failed: usize,
    pub total_images: usize,
}

/// Enrollment outcome plus the persistence result, when a store is enabled
#[derive(Debug, Clone)]
pub struct EnrollResult {
    pub student_id: String,
    pub outcome: EnrollmentOutcome,
    pub stored: Option<bool>,
}

/// Verification against the store
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyResult {
    Verified {
        student_id: String,
        name: String,
        confidence: f32,
    },
    NoFace,
    NotRecognized,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub models_loaded: std::collections::HashMap<String, bool>,
    pub extraction: ExtractionStatsSnapshot,
    pub identities: Option<i64>,
}
