//! Face embedder
//!
//! `FaceEmbedder` wraps an [`EmbeddingModel`] and enforces the output
//! contract: either a vector of exactly `embedding_dim` values or
//! [`Extraction::NoFace`]. Model failures and malformed outputs are folded
//! into `NoFace` for callers, but are logged and counted separately so a
//! broken model does not hide behind "no face detected".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Face embedding vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self(vector)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Little-endian f32 bytes, for BLOB storage
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() % 4 != 0 {
            anyhow::bail!("Invalid embedding bytes length: {}", bytes.len());
        }
        let vector = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self(vector))
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// A pretrained face embedding model.
///
/// `Ok(None)` means the model saw no face; `Err` means the model itself
/// failed. Implementations receive canonical RGB8 images and convert to
/// whatever channel order they need.
pub trait EmbeddingModel: Send + Sync {
    fn represent(&self, image: &RgbImage) -> anyhow::Result<Option<Vec<f32>>>;

    /// Loaded state of the underlying networks, for monitoring
    fn status(&self) -> std::collections::HashMap<String, bool> {
        Default::default()
    }
}

/// Outcome of a single extraction
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Embedding(Embedding),
    NoFace,
}

/// Counters for each way an extraction can end
#[derive(Debug, Default)]
pub struct ExtractionStats {
    success: AtomicU64,
    no_face: AtomicU64,
    model_error: AtomicU64,
    dimension_mismatch: AtomicU64,
    non_finite: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStatsSnapshot {
    pub success: u64,
    pub no_face: u64,
    pub model_error: u64,
    pub dimension_mismatch: u64,
    pub non_finite: u64,
}

impl ExtractionStats {
    pub fn snapshot(&self) -> ExtractionStatsSnapshot {
        ExtractionStatsSnapshot {
            success: self.success.load(Ordering::Relaxed),
            no_face: self.no_face.load(Ordering::Relaxed),
            model_error: self.model_error.load(Ordering::Relaxed),
            dimension_mismatch: self.dimension_mismatch.load(Ordering::Relaxed),
            non_finite: self.non_finite.load(Ordering::Relaxed),
        }
    }
}

pub struct FaceEmbedder {
    model: Arc<dyn EmbeddingModel>,
    embedding_dim: usize,
    stats: ExtractionStats,
}

impl FaceEmbedder {
    pub fn new(model: Arc<dyn EmbeddingModel>, embedding_dim: usize) -> Self {
        Self {
            model,
            embedding_dim,
            stats: ExtractionStats::default(),
        }
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn stats(&self) -> ExtractionStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn model_status(&self) -> std::collections::HashMap<String, bool> {
        self.model.status()
    }

    /// Extract an embedding from a normalized image
    pub fn extract(&self, image: &RgbImage) -> Extraction {
        match self.model.represent(image) {
            Ok(Some(vector))
                if vector.len() == self.embedding_dim && vector.iter().all(|v| v.is_finite()) =>
            {
                self.stats.success.fetch_add(1, Ordering::Relaxed);
                Extraction::Embedding(Embedding::new(vector))
            }
            Ok(Some(vector)) if vector.len() == self.embedding_dim => {
                self.stats.non_finite.fetch_add(1, Ordering::Relaxed);
                warn!("Model returned NaN or infinite values; treating as no face");
                Extraction::NoFace
            }
            Ok(Some(vector)) => {
                self.stats.dimension_mismatch.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Model returned {} values, expected {}; treating as no face",
                    vector.len(),
                    self.embedding_dim
                );
                Extraction::NoFace
            }
            Ok(None) => {
                self.stats.no_face.fetch_add(1, Ordering::Relaxed);
                debug!("No face detected");
                Extraction::NoFace
            }
            Err(e) => {
                self.stats.model_error.fetch_add(1, Ordering::Relaxed);
                warn!("Embedding model failed, treating as no face: {:#}", e);
                Extraction::NoFace
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic models for tests

    use super::*;

    /// Returns a vector filled from the mean red value of the image, so
    /// different fixtures produce different but predictable embeddings.
    /// Pure black images count as "no face".
    pub struct FakeModel {
        pub dim: usize,
    }

    impl FakeModel {
        pub fn expected(dim: usize, red: u8) -> Vec<f32> {
            (0..dim).map(|i| red as f32 / 255.0 + i as f32 * 0.001).collect()
        }
    }

    impl EmbeddingModel for FakeModel {
        fn represent(&self, image: &RgbImage) -> anyhow::Result<Option<Vec<f32>>> {
            let n = (image.width() * image.height()).max(1) as u64;
            let red_sum: u64 = image.pixels().map(|p| p.0[0] as u64).sum();
            let any_lit = image.pixels().any(|p| p.0 != [0, 0, 0]);
            if !any_lit {
                return Ok(None);
            }
            Ok(Some(Self::expected(self.dim, (red_sum / n) as u8)))
        }
    }

    pub struct FailingModel;

    impl EmbeddingModel for FailingModel {
        fn represent(&self, _image: &RgbImage) -> anyhow::Result<Option<Vec<f32>>> {
            anyhow::bail!("inference exploded")
        }
    }

    pub struct FixedModel(pub Vec<f32>);

    impl EmbeddingModel for FixedModel {
        fn represent(&self, _image: &RgbImage) -> anyhow::Result<Option<Vec<f32>>> {
            Ok(Some(self.0.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use image::Rgb;

    fn lit_image() -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb([51, 10, 10]))
    }

    #[test]
    fn test_valid_face_has_fixed_dimension() {
        let embedder = FaceEmbedder::new(Arc::new(FakeModel { dim: 128 }), 128);
        match embedder.extract(&lit_image()) {
            Extraction::Embedding(embedding) => assert_eq!(embedding.len(), 128),
            Extraction::NoFace => panic!("expected an embedding"),
        }
        assert_eq!(embedder.stats().success, 1);
    }

    #[test]
    fn test_blank_image_is_no_face() {
        let embedder = FaceEmbedder::new(Arc::new(FakeModel { dim: 128 }), 128);
        assert_eq!(embedder.extract(&RgbImage::new(8, 8)), Extraction::NoFace);
        assert_eq!(embedder.stats().no_face, 1);
    }

    #[test]
    fn test_wrong_dimension_is_no_face() {
        let embedder = FaceEmbedder::new(Arc::new(FixedModel(vec![0.5; 512])), 128);
        assert_eq!(embedder.extract(&lit_image()), Extraction::NoFace);
        assert_eq!(embedder.stats().dimension_mismatch, 1);
    }

    #[test]
    fn test_non_finite_output_is_no_face() {
        let mut vector = vec![0.1; 128];
        vector[7] = f32::NAN;
        let embedder = FaceEmbedder::new(Arc::new(FixedModel(vector)), 128);
        assert_eq!(embedder.extract(&lit_image()), Extraction::NoFace);

        let mut vector = vec![0.1; 128];
        vector[0] = f32::INFINITY;
        let embedder_inf = FaceEmbedder::new(Arc::new(FixedModel(vector)), 128);
        assert_eq!(embedder_inf.extract(&lit_image()), Extraction::NoFace);

        let stats = embedder.stats();
        assert_eq!(stats.non_finite, 1);
        assert_eq!(stats.success, 0);
        assert_eq!(stats.dimension_mismatch, 0);
        assert_eq!(embedder_inf.stats().non_finite, 1);
    }

    #[test]
    fn test_model_error_is_no_face() {
        let embedder = FaceEmbedder::new(Arc::new(FailingModel), 128);
        assert_eq!(embedder.extract(&lit_image()), Extraction::NoFace);

        let stats = embedder.stats();
        assert_eq!(stats.model_error, 1);
        assert_eq!(stats.no_face, 0);
    }

    #[test]
    fn test_embedding_bytes() {
        let original = Embedding::new(vec![1.0, -2.5, 3.25]);
        let restored = Embedding::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(original, restored);
        assert!(Embedding::from_bytes(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_embedding_serializes_as_array() {
        let json = serde_json::to_string(&Embedding::new(vec![0.5, 1.0])).unwrap();
        assert_eq!(json, "[0.5,1.0]");
    }
}
