//! Service layer module

pub mod enrollment;
pub mod error;
pub mod face_service;
pub mod types;

pub use error::{ServiceError, ServiceResult};
pub use face_service::FaceService;
pub use types::*;
