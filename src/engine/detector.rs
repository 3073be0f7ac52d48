//! SCRFD face detector
//!
//! Only used to locate the face region handed to the embedder, so landmarks
//! are not decoded.

use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;
use openvino::InferRequest;
use tracing::{debug, warn};

use super::pool::{ModelPool, ModelType};
use super::preprocess::{detector_input, ResizeInfo, DETECTOR_INPUT_SIZE};
use super::tensor::{read_f32, to_tensor};

/// Face bounding box in source image coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let inter = FaceBox {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
            confidence: 0.0,
        }
        .area();

        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Output layout of an SCRFD export, derived from its output count
#[derive(Debug, Clone, PartialEq)]
struct ScrfdLayout {
    strides: Vec<i32>,
    anchors_per_cell: usize,
}

impl ScrfdLayout {
    fn from_output_count(count: usize) -> Self {
        match count {
            6 | 9 => Self { strides: vec![8, 16, 32], anchors_per_cell: 2 },
            10 | 15 => Self { strides: vec![8, 16, 32, 64, 128], anchors_per_cell: 1 },
            _ => {
                warn!("Unknown SCRFD output count: {}, assuming 3 strides", count);
                Self { strides: vec![8, 16, 32], anchors_per_cell: 2 }
            }
        }
    }
}

pub struct FaceDetector {
    pool: Arc<ModelPool>,
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl FaceDetector {
    pub fn new(pool: Arc<ModelPool>, confidence_threshold: f32) -> Self {
        Self {
            pool,
            confidence_threshold,
            nms_threshold: 0.4,
        }
    }

    /// Detect faces, highest confidence first
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>> {
        let (input, resize_info) = detector_input(image);

        let model = self.pool.get_model(ModelType::Detector)?;
        let mut request = model.create_infer_request()?;
        request.set_input_tensor(&to_tensor(&input)?)?;
        request.infer()?;

        let boxes = self.decode_outputs(&request, &resize_info)?;
        let faces = nms(boxes, self.nms_threshold);
        debug!("Detected {} faces after NMS", faces.len());

        Ok(faces)
    }

    /// SCRFD emits one score tensor and one distance tensor per stride:
    /// outputs [0, n) are scores, [n, 2n) are boxes, the rest keypoints.
    fn decode_outputs(&self, request: &InferRequest, resize_info: &ResizeInfo) -> Result<Vec<FaceBox>> {
        let output_count = (0..20)
            .take_while(|i| request.get_output_tensor_by_index(*i).is_ok())
            .count();
        let layout = ScrfdLayout::from_output_count(output_count);
        let fmc = layout.strides.len();

        let mut boxes = Vec::new();
        for (idx, &stride) in layout.strides.iter().enumerate() {
            let scores = read_f32(&request.get_output_tensor_by_index(idx)?)?;
            let distances = read_f32(&request.get_output_tensor_by_index(idx + fmc)?)?;

            boxes.extend(decode_stride(
                &scores,
                &distances,
                stride,
                layout.anchors_per_cell,
                self.confidence_threshold,
                resize_info,
            ));
        }

        Ok(boxes)
    }
}

/// Decode one stride's anchors into boxes above the threshold
fn decode_stride(
    scores: &[f32],
    distances: &[f32],
    stride: i32,
    anchors_per_cell: usize,
    threshold: f32,
    resize_info: &ResizeInfo,
) -> Vec<FaceBox> {
    let feat_w = DETECTOR_INPUT_SIZE.0 as i32 / stride;
    let s = stride as f32;

    scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score >= threshold)
        .filter_map(|(i, &score)| {
            let d = distances.get(i * 4..i * 4 + 4)?;
            let cell = (i / anchors_per_cell) as i32;
            let cx = (cell % feat_w) as f32 * s;
            let cy = (cell / feat_w) as f32 * s;

            let (x1, y1) = resize_info.to_original(cx - d[0] * s, cy - d[1] * s);
            let (x2, y2) = resize_info.to_original(cx + d[2] * s, cy + d[3] * s);

            Some(FaceBox { x1, y1, x2, y2, confidence: score })
        })
        .collect()
}

/// Greedy non-maximum suppression; output sorted by confidence descending
pub fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}
