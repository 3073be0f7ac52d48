//! Inference engine
//!
//! - Image decoding and channel normalization
//! - The `EmbeddingModel` seam and its validating wrapper
//! - OpenVINO-backed SCRFD detection and FaceNet embedding with lazy model
//!   loading and idle unloading

pub mod pool;
pub mod detector;
pub mod embedder;
pub mod facenet;
pub mod preprocess;
mod tensor;

pub use pool::ModelPool;
pub use detector::FaceDetector;
pub use embedder::{Embedding, EmbeddingModel, Extraction, FaceEmbedder};
pub use facenet::FaceNetModel;
