//! Vector math over embeddings
//!
//! These functions do not guard their inputs: both slices must have the same
//! length and non-zero norm. Mismatched lengths silently truncate to the
//! shorter slice (zip), zero-norm vectors produce NaN.

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (l2_norm(a) * l2_norm(b))
}

/// Compute Euclidean distance between two vectors
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// L2 norm of a vector
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Element-wise arithmetic mean of equal-length vectors.
///
/// Sums in f64 so the result does not depend on input order beyond f32
/// rounding of the final value. Returns `None` for an empty input.
pub fn mean<V: AsRef<[f32]>>(vectors: &[V]) -> Option<Vec<f32>> {
    let first = vectors.first()?.as_ref();
    let mut sums = vec![0.0f64; first.len()];

    for v in vectors {
        for (acc, x) in sums.iter_mut().zip(v.as_ref()) {
            *acc += *x as f64;
        }
    }

    let n = vectors.len() as f64;
    Some(sums.into_iter().map(|s| (s / n) as f32).collect())
}

/// Per-image standardization (FaceNet prewhitening): (x - mean) / std
pub fn standardize(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    // clamp as facenet does so flat images do not divide by zero
    let std = var.sqrt().max(1.0 / n.sqrt());
    for v in values.iter_mut() {
        *v = (*v - mean) / std;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_norm_is_nan() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 0.0];
        assert!(cosine_similarity(&a, &b).is_nan());
    }

    #[test]
    fn test_euclidean_distance() {
        let a = vec![0.5, -1.5, 2.0];
        assert_eq!(euclidean_distance(&a, &a), 0.0);

        let b = vec![0.0, 0.0];
        let c = vec![3.0, 4.0];
        assert!((euclidean_distance(&b, &c) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_mean() {
        let vs = vec![vec![1.0, 2.0], vec![3.0, 6.0]];
        assert_eq!(mean(&vs), Some(vec![2.0, 4.0]));
        assert_eq!(mean::<Vec<f32>>(&[]), None);
    }

    #[test]
    fn test_mean_order_independent() {
        let a = vec![0.1f32, 0.7, -0.3];
        let b = vec![1e-3f32, 12.5, 0.25];
        let c = vec![-4.0f32, 0.33, 9.1];

        let m1 = mean(&[&a, &b, &c]).unwrap();
        let m2 = mean(&[&c, &a, &b]).unwrap();
        for (x, y) in m1.iter().zip(m2.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_standardize() {
        let mut v = vec![1.0, 2.0, 3.0, 4.0];
        standardize(&mut v);
        let mean: f32 = v.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);

        let mut flat = vec![7.0; 16];
        standardize(&mut flat);
        assert!(flat.iter().all(|x| *x == 0.0));
    }
}
