//! Service error taxonomy

use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Also covers model failures; see `FaceEmbedder`
    #[error("No face detected")]
    NoFace,

    #[error("No images provided")]
    NoImages,

    #[error(
        "No valid face embeddings extracted from {total} images. \
         Please ensure faces are clearly visible and well-lit."
    )]
    NoValidEmbeddings { total: usize },

    #[error("Persistence is not enabled on this service")]
    StoreDisabled,

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidImage(_) => "INVALID_IMAGE",
            ServiceError::NoFace => "NO_FACE",
            ServiceError::NoImages => "NO_IMAGES",
            ServiceError::NoValidEmbeddings { .. } => "NO_VALID_EMBEDDINGS",
            ServiceError::StoreDisabled => "STORE_DISABLED",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Caused by the request rather than the service
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServiceError::Internal(_) | ServiceError::StoreDisabled)
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(e: tokio::task::JoinError) -> Self {
        ServiceError::Internal(anyhow::anyhow!("Worker task failed: {}", e))
    }
}
