use crate::error::{ProviderError, Result};
use crate::source::ImageSource;
use async_trait::async_trait;

/// Embed image, return vector.
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    fn model_id(&self) -> &str;

    /// Every vector returned by this embedder has exactly this many components.
    fn dimension(&self) -> usize;

    async fn embed(&self, image: &ImageSource) -> Result<Vec<f32>>;
}

pub(crate) fn ensure_dimension(
    provider: &'static str,
    vector: &[f32],
    expected: usize,
) -> Result<()> {
    if vector.len() != expected {
        return Err(ProviderError::malformed(
            provider,
            format!(
                "embedding dimension mismatch: expected {expected}, got {}",
                vector.len()
            ),
        ));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(ProviderError::malformed(provider, "embedding contains non-finite values"));
    }
    Ok(())
}

/// Deterministic offline embedder: the vector is seeded from a hash of the image bytes (or URL),
/// so identical inputs map to identical unit vectors.
#[derive(Clone, Debug)]
pub struct StubEmbedder {
    dimension: usize,
    model_id: String,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("stub-{dimension}"),
        }
    }
}

#[async_trait]
impl ImageEmbedder for StubEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, image: &ImageSource) -> Result<Vec<f32>> {
        let seed = match image {
            ImageSource::Url(url) => fnv1a_64(url.as_bytes()),
            ImageSource::Bytes { data, .. } => fnv1a_64(data),
        };
        Ok(stub_embed(seed, self.dimension))
    }
}

fn stub_embed(seed: u64, dimension: usize) -> Vec<f32> {
    let mut state = seed ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_embeddings_are_deterministic_unit_vectors() {
        let embedder = StubEmbedder::new(16);
        let a = embedder.embed(&ImageSource::from_bytes(vec![1u8, 2, 3])).await.unwrap();
        let b = embedder.embed(&ImageSource::from_bytes(vec![1u8, 2, 3])).await.unwrap();
        let c = embedder.embed(&ImageSource::from_bytes(vec![3u8, 2, 1])).await.unwrap();

        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn dimension_guard_rejects_wrong_length_and_nan() {
        assert!(ensure_dimension("test", &[0.0, 1.0], 2).is_ok());
        assert!(ensure_dimension("test", &[0.0], 2).is_err());
        assert!(ensure_dimension("test", &[0.0, f32::NAN], 2).is_err());
    }
}
