//! FaceNet embedding model on OpenVINO
//!
//! Detects with SCRFD at a relaxed confidence, crops the most confident face
//! with a margin and runs the 128-d FaceNet network on it.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;
use tracing::debug;

use crate::config::RecognitionConfig;

use super::detector::FaceDetector;
use super::embedder::EmbeddingModel;
use super::pool::{ModelPool, ModelType};
use super::preprocess::{crop_face, embedder_input};
use super::tensor::{read_f32, to_tensor};

pub struct FaceNetModel {
    pool: Arc<ModelPool>,
    detector: FaceDetector,
    face_margin: f32,
}

impl FaceNetModel {
    pub fn new(pool: Arc<ModelPool>, recognition: &RecognitionConfig) -> Self {
        let detector = FaceDetector::new(pool.clone(), recognition.detection_confidence);
        Self {
            pool,
            detector,
            face_margin: recognition.face_margin,
        }
    }

    fn embed_face(&self, face: &RgbImage) -> Result<Vec<f32>> {
        let input = embedder_input(face)?;

        let model = self.pool.get_model(ModelType::Embedder)?;
        let mut request = model.create_infer_request()?;
        request.set_input_tensor(&to_tensor(&input)?)?;
        request.infer()?;

        read_f32(&request.get_output_tensor()?)
    }
}

impl EmbeddingModel for FaceNetModel {
    fn represent(&self, image: &RgbImage) -> Result<Option<Vec<f32>>> {
        let faces = self.detector.detect(image)?;

        let Some(best) = faces.first() else {
            return Ok(None);
        };
        debug!(
            "Embedding face at ({:.0}, {:.0})-({:.0}, {:.0}), confidence {:.2}",
            best.x1, best.y1, best.x2, best.y2, best.confidence
        );

        let Some(face) = crop_face(image, best.x1, best.y1, best.x2, best.y2, self.face_margin) else {
            return Ok(None);
        };

        self.embed_face(&face).map(Some)
    }

    fn status(&self) -> HashMap<String, bool> {
        self.pool.status()
    }
}
