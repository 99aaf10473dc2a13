//! Embedding model boundary for the dense backend.
//!
//! Any model producing fixed-dimension vectors can back the dense index by
//! implementing [`Embedder`]. [`HashEmbedder`] is the built-in model: a
//! deterministic FNV-1a bag-of-words projection that needs no model files.
//! It captures lexical overlap only.

use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Tokens shorter than this do not contribute to a hash embedding.
const MIN_TOKEN_LEN: usize = 2;

pub const DEFAULT_DIMENSION: usize = 384;

/// Text embedding model. Implementations may block for a long time.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;

    /// Stable identifier recorded in snapshots; documents and queries must be
    /// embedded by models with the same id.
    fn id(&self) -> &str;
}

/// Scale `vec` to unit length. A zero or non-finite vector maps to zeros.
pub fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm_sq: f32 = vec.iter().map(|x| x * x).sum();
    if !norm_sq.is_finite() || norm_sq < f32::EPSILON {
        return vec![0.0; vec.len()];
    }
    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter().map(|x| x * inv_norm).collect()
}

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    id: String,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashEmbedder {
    /// # Panics
    ///
    /// Panics if `dimension` is zero.
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "dimension must be > 0");
        Self { dimension, id: format!("fnv1a-{dimension}") }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| t.len() >= MIN_TOKEN_LEN) {
            let hash = fnv1a_hash(token.to_lowercase().as_bytes());
            let index = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 1 { 1.0 } else { -1.0 };
            embedding[index] += sign;
        }
        l2_normalize(&embedding)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn id(&self) -> &str {
        &self.id
    }
}

fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_normalized() {
        let e = HashEmbedder::default();
        let a = e.embed_sync("Hello world");
        let b = e.embed_sync("hello WORLD");
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSION);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm = {norm}");
    }

    #[test]
    fn empty_text_embeds_to_zeros() {
        let e = HashEmbedder::new(16);
        assert!(e.embed_sync("").iter().all(|x| *x == 0.0));
        assert_eq!(e.id(), "fnv1a-16");
    }

    #[test]
    fn l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
        let v = l2_normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
    }
}
