use crate::error::{Result, VectorStoreError};

pub const DEFAULT_DIMENSION: usize = 64;

/// Deterministic, model-free text embedder.
///
/// Vectors are derived from an FNV-1a seed expanded with splitmix64, so identical text always
/// maps to the identical unit vector. Good enough to exercise the index; not semantic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VectorStoreError::EmbeddingError(
                "embedding dimension must be positive".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Identifier persisted next to vectors; bump when the derivation changes.
    pub fn model_id(&self) -> String {
        format!("hash-v1-{}", self.dimension)
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        stub_embed(text, self.dimension)
    }
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

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
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

    #[test]
    fn embeddings_are_deterministic_unit_vectors() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("fn main() {}");
        let b = embedder.embed("fn main() {}");
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSION);
        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn different_text_gives_different_vectors() {
        let embedder = HashEmbedder::new(16).unwrap();
        assert_ne!(embedder.embed("alpha"), embedder.embed("beta"));
        assert_eq!(embedder.model_id(), "hash-v1-16");
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(HashEmbedder::new(0).is_err());
    }
}
