//! REST API request/response data transfer objects

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::engine::embedder::ExtractionStatsSnapshot;
use crate::service::{EnrollResult, ServiceStats, VerifyResult};

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            service: "ai-model".to_string(),
        }
    }
}

/// Extract / verify response
#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub success: bool,
    pub embedding: Vec<f32>,
}

/// Enroll request; images are base64 strings, optionally data URLs
#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub student_id: String,
    pub images: Vec<String>,
}

/// Enroll response
#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub success: bool,
    pub student_id: String,
    pub embedding: Vec<f32>,
    pub images_processed: usize,
    pub images_failed: usize,
    pub total_images: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<bool>,
}

impl From<EnrollResult> for EnrollResponse {
    fn from(result: EnrollResult) -> Self {
        Self {
            success: true,
            student_id: result.student_id,
            embedding: result.outcome.embedding.into_vec(),
            images_processed: result.outcome.images_processed,
            images_failed: result.outcome.images_failed,
            total_images: result.outcome.total_images,
            stored: result.stored,
        }
    }
}

/// Match response
#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub confidence: f32,
}

impl From<VerifyResult> for MatchResponse {
    fn from(result: VerifyResult) -> Self {
        match result {
            VerifyResult::Verified {
                student_id,
                name,
                confidence,
            } => Self {
                verified: true,
                student_id: Some(student_id),
                name: Some(name),
                message: None,
                confidence,
            },
            VerifyResult::NoFace => Self::rejected("No face detected"),
            VerifyResult::NotRecognized => Self::rejected("Face not recognized"),
        }
    }
}

impl MatchResponse {
    fn rejected(message: &str) -> Self {
        Self {
            verified: false,
            student_id: None,
            name: None,
            message: Some(message.to_string()),
            confidence: 0.0,
        }
    }
}

/// Metrics response
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub models_loaded: HashMap<String, bool>,
    pub extraction: ExtractionStatsSnapshot,
    /// `null` when persistence is disabled
    pub identities: Option<i64>,
    pub uptime_seconds: u64,
}

impl MetricsResponse {
    pub fn new(stats: ServiceStats, uptime_seconds: u64) -> Self {
        Self {
            models_loaded: stats.models_loaded,
            extraction: stats.extraction,
            identities: stats.identities,
            uptime_seconds,
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    /// Number of images attempted, when an enrollment yielded nothing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_images: Option<usize>,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            success: false,
            error: error.to_string(),
            code: code.to_string(),
            total_images: None,
        }
    }

    pub fn with_total_images(mut self, total: usize) -> Self {
        self.total_images = Some(total);
        self
    }
}
