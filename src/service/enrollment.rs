//! Enrollment aggregation
//!
//! Every photo in a batch is processed on its own; a bad photo is tallied
//! and skipped, never fatal. The enrollment embedding is the element-wise
//! mean of all usable photos.

use anyhow::{anyhow, Result};
use tracing::{debug, info, warn};

use crate::engine::preprocess::{decode_image, describe, normalize};
use crate::engine::{Embedding, Extraction, FaceEmbedder};
use crate::utils::math::mean;

use super::error::{ServiceError, ServiceResult};
use super::types::EnrollmentOutcome;

/// Decode, normalize and embed one image
pub fn extract_from_bytes(embedder: &FaceEmbedder, data: &[u8]) -> ServiceResult<Embedding> {
    let image = decode_image(data).map_err(|e| ServiceError::InvalidImage(format!("{:#}", e)))?;
    debug!("Decoded image {}", describe(&image));

    match embedder.extract(&normalize(image)) {
        Extraction::Embedding(embedding) => Ok(embedding),
        Extraction::NoFace => Err(ServiceError::NoFace),
    }
}

/// Aggregate a batch of images into one mean embedding.
///
/// Items arrive already transport-decoded; an `Err` item (bad base64) counts
/// as a failed image like any other.
pub fn aggregate<I>(embedder: &FaceEmbedder, images: I) -> ServiceResult<EnrollmentOutcome>
where
    I: IntoIterator<Item = Result<Vec<u8>>>,
{
    let images: Vec<Result<Vec<u8>>> = images.into_iter().collect();
    let total = images.len();
    if total == 0 {
        return Err(ServiceError::NoImages);
    }

    let mut embeddings: Vec<Embedding> = Vec::with_capacity(total);
    let mut failed = 0;

    for (idx, item) in images.into_iter().enumerate() {
        let result = item
            .map_err(|e| ServiceError::InvalidImage(format!("{:#}", e)))
            .and_then(|data| extract_from_bytes(embedder, &data));

        match result {
            Ok(embedding) => {
                debug!("Image {}/{}: extracted embedding (dim: {})", idx + 1, total, embedding.len());
                embeddings.push(embedding);
            }
            Err(e) => {
                warn!("Image {}/{} skipped: {}", idx + 1, total, e);
                failed += 1;
            }
        }
    }

    info!("Processed {}/{} images ({} failed)", embeddings.len(), total, failed);

    let embedding = mean(&embeddings)
        .map(Embedding::new)
        .ok_or(ServiceError::NoValidEmbeddings { total })?;

    if embedding.len() != embedder.embedding_dim() {
        return Err(anyhow!(
            "Mean embedding has {} values, expected {}",
            embedding.len(),
            embedder.embedding_dim()
        )
        .into());
    }

    Ok(EnrollmentOutcome {
        embedding,
        images_processed: embeddings.len(),
        images_failed: failed,
        total_images: total,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    /// PNG bytes of a flat image with the given red value
    pub fn png(red: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(16, 16, Rgb([red, 40, 40]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    /// PNG bytes of a black image (no face for the fake model)
    pub fn blank_png() -> Vec<u8> {
        let img = RgbImage::new(16, 16);
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::engine::embedder::testing::{FailingModel, FakeModel};
    use std::sync::Arc;

    const DIM: usize = 128;

    fn embedder() -> FaceEmbedder {
        FaceEmbedder::new(Arc::new(FakeModel { dim: DIM }), DIM)
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-6, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_empty_batch_never_calls_model() {
        let embedder = embedder();
        let err = aggregate(&embedder, Vec::new()).unwrap_err();
        assert!(matches!(err, ServiceError::NoImages));
        assert_eq!(embedder.stats(), Default::default());
    }

    #[test]
    fn test_corrupt_image_is_counted() {
        let images = vec![Ok(png(100)), Ok(b"corrupted bytes".to_vec()), Ok(png(200))];
        let outcome = aggregate(&embedder(), images).unwrap();

        assert_eq!(outcome.images_processed, 2);
        assert_eq!(outcome.images_failed, 1);
        assert_eq!(outcome.total_images, 3);

        let expected = mean(&[FakeModel::expected(DIM, 100), FakeModel::expected(DIM, 200)]).unwrap();
        assert_close(outcome.embedding.as_slice(), &expected);
    }

    #[test]
    fn test_transport_errors_and_no_face_are_counted() {
        let images = vec![
            Err(anyhow!("bad base64")),
            Ok(blank_png()),
            Ok(png(10)),
        ];
        let outcome = aggregate(&embedder(), images).unwrap();
        assert_eq!(outcome.images_processed, 1);
        assert_eq!(outcome.images_failed, 2);
        assert_close(outcome.embedding.as_slice(), &FakeModel::expected(DIM, 10));
    }

    #[test]
    fn test_all_failures() {
        let images = vec![Ok(blank_png()), Ok(b"nope".to_vec()), Ok(blank_png())];
        match aggregate(&embedder(), images) {
            Err(ServiceError::NoValidEmbeddings { total }) => assert_eq!(total, 3),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_model_errors_are_failures() {
        let embedder = FaceEmbedder::new(Arc::new(FailingModel), DIM);
        let err = aggregate(&embedder, vec![Ok(png(1)), Ok(png(2))]).unwrap_err();
        assert!(matches!(err, ServiceError::NoValidEmbeddings { total: 2 }));
        assert_eq!(embedder.stats().model_error, 2);
    }

    #[test]
    fn test_permutation_gives_same_mean() {
        let reds = [17u8, 250, 99, 3, 128];
        let forward = aggregate(&embedder(), reds.iter().map(|r| Ok(png(*r)))).unwrap();
        let backward = aggregate(&embedder(), reds.iter().rev().map(|r| Ok(png(*r)))).unwrap();
        assert_close(forward.embedding.as_slice(), backward.embedding.as_slice());
    }

    #[test]
    fn test_single_image_extract() {
        let embedder = embedder();
        assert_eq!(extract_from_bytes(&embedder, &png(51)).unwrap().len(), DIM);
        assert!(matches!(
            extract_from_bytes(&embedder, b"xx"),
            Err(ServiceError::InvalidImage(_))
        ));
        assert!(matches!(
            extract_from_bytes(&embedder, &blank_png()),
            Err(ServiceError::NoFace)
        ));
    }
}
