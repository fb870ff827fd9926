//! Cache and slice shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dtype::Dtype;
use crate::error::{KVError, KVResult};

/// Full cache shape: `[n_layers, batch, n_kv_heads, capacity, head_dim]`.
///
/// Fixed before the first decode step; the buffers are never resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheShape {
    pub n_layers: usize,
    pub batch: usize,
    pub n_kv_heads: usize,
    pub capacity: usize,
    pub head_dim: usize,
}

impl CacheShape {
    pub fn new(
        n_layers: usize,
        batch: usize,
        n_kv_heads: usize,
        capacity: usize,
        head_dim: usize,
    ) -> Self {
        Self {
            n_layers,
            batch,
            n_kv_heads,
            capacity,
            head_dim,
        }
    }

    /// Rejects shapes with a zero dimension, or whose K+V buffers at the
    /// widest precision would not be addressable.
    ///
    /// Element and byte counts below assume a validated shape.
    pub fn validate(&self) -> KVResult<()> {
        let dims = [
            ("n_layers", self.n_layers),
            ("batch", self.batch),
            ("n_kv_heads", self.n_kv_heads),
            ("capacity", self.capacity),
            ("head_dim", self.head_dim),
        ];
        match dims.iter().find(|(_, d)| *d == 0) {
            Some((name, _)) => Err(KVError::invalid(format!(
                "cache dimension {name} must be > 0 (shape {})",
                self
            ))),
            None => self.check_size(),
        }
    }

    fn check_size(&self) -> KVResult<()> {
        // f32 is the widest element.
        let dims = [
            self.n_layers,
            self.batch,
            self.n_kv_heads,
            self.capacity,
            self.head_dim,
            2,
        ];
        let bytes = dims
            .iter()
            .try_fold(Dtype::Float32.size_bytes(), |acc, &d| acc.checked_mul(d));
        match bytes {
            Some(b) if b <= isize::MAX as usize => Ok(()),
            _ => Err(KVError::invalid(format!(
                "cache shape overflows usize: {self}"
            ))),
        }
    }

    /// Elements in one layer's K (or V) region.
    pub fn layer_elements(&self) -> usize {
        self.batch * self.n_kv_heads * self.capacity * self.head_dim
    }

    /// Elements in the whole K (or V) buffer.
    pub fn total_elements(&self) -> usize {
        self.n_layers * self.layer_elements()
    }

    /// Bytes for K and V together.
    pub fn capacity_bytes(&self, bytes_per_element: usize) -> usize {
        2 * self.total_elements() * bytes_per_element
    }

    /// Flat index of `[layer, b, h, pos, d]`.
    pub(crate) fn offset(&self, layer: usize, b: usize, h: usize, pos: usize, d: usize) -> usize {
        let row = (layer * self.batch + b) * self.n_kv_heads + h;
        (row * self.capacity + pos) * self.head_dim + d
    }
}

impl fmt::Display for CacheShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[layers:{}, batch:{}, heads:{}, ctx:{}, dim:{}]",
            self.n_layers, self.batch, self.n_kv_heads, self.capacity, self.head_dim
        )
    }
}

/// Shape of an incoming K/V slice: `[batch, n_kv_heads, seq_len, head_dim]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliceShape {
    pub batch: usize,
    pub n_kv_heads: usize,
    pub seq_len: usize,
    pub head_dim: usize,
}

impl SliceShape {
    pub fn new(batch: usize, n_kv_heads: usize, seq_len: usize, head_dim: usize) -> Self {
        Self {
            batch,
            n_kv_heads,
            seq_len,
            head_dim,
        }
    }

    /// Element count, or `InvalidArgument` if it does not fit in `usize`.
    pub fn elements(&self) -> KVResult<usize> {
        [self.batch, self.n_kv_heads, self.seq_len, self.head_dim]
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| KVError::invalid(format!("slice shape overflows usize: {self}")))
    }

    /// Whether every axis except the position axis agrees with `cache`.
    pub fn fits(&self, cache: &CacheShape) -> bool {
        self.batch == cache.batch
            && self.n_kv_heads == cache.n_kv_heads
            && self.head_dim == cache.head_dim
    }
}

impl fmt::Display for SliceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[batch:{}, heads:{}, seq:{}, dim:{}]",
            self.batch, self.n_kv_heads, self.seq_len, self.head_dim
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_counts() {
        let shape = CacheShape::new(4, 1, 8, 256, 64);
        assert_eq!(shape.layer_elements(), 8 * 256 * 64);
        assert_eq!(shape.total_elements(), 4 * 8 * 256 * 64);
        assert_eq!(shape.capacity_bytes(2), 2 * 4 * 8 * 256 * 64 * 2);
    }

    #[test]
    fn offset_is_row_major() {
        let shape = CacheShape::new(2, 1, 3, 4, 5);
        assert_eq!(shape.offset(0, 0, 0, 0, 0), 0);
        assert_eq!(shape.offset(0, 0, 0, 0, 1), 1);
        assert_eq!(shape.offset(0, 0, 0, 1, 0), 5);
        assert_eq!(shape.offset(0, 0, 1, 0, 0), 4 * 5);
        assert_eq!(shape.offset(1, 0, 0, 0, 0), shape.layer_elements());
        assert_eq!(shape.offset(1, 0, 2, 3, 4), shape.total_elements() - 1);
    }

    #[test]
    fn zero_dimension_rejected() {
        let shape = CacheShape::new(2, 1, 0, 16, 8);
        let err = shape.validate().unwrap_err();
        assert!(err.to_string().contains("n_kv_heads"));
        assert!(CacheShape::new(1, 1, 1, 1, 1).validate().is_ok());
    }

    #[test]
    fn oversized_cache_rejected() {
        let shape = CacheShape::new(4, 1, 8, usize::MAX / 8, 128);
        match shape.validate() {
            Err(KVError::InvalidArgument(msg)) => assert!(msg.contains("overflows"), "{msg}"),
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
        // Fits in usize but not in an allocation.
        let shape = CacheShape::new(1, 1, 1, usize::MAX / 8, 1);
        assert!(shape.validate().is_err());
    }

    #[test]
    fn slice_elements() {
        assert_eq!(SliceShape::new(1, 2, 3, 4).elements(), Ok(24));
        assert!(matches!(
            SliceShape::new(1, 8, usize::MAX / 4, 128).elements(),
            Err(KVError::InvalidArgument(_))
        ));
    }

    #[test]
    fn display() {
        let shape = CacheShape::new(32, 1, 8, 256, 128);
        assert_eq!(
            shape.to_string(),
            "[layers:32, batch:1, heads:8, ctx:256, dim:128]"
        );
        assert_eq!(
            SliceShape::new(1, 8, 3, 128).to_string(),
            "[batch:1, heads:8, seq:3, dim:128]"
        );
    }

    #[test]
    fn slice_fits_ignores_seq_len() {
        let cache = CacheShape::new(2, 1, 4, 16, 8);
        assert!(SliceShape::new(1, 4, 7, 8).fits(&cache));
        assert!(!SliceShape::new(1, 2, 1, 8).fits(&cache));
        assert!(!SliceShape::new(2, 4, 1, 8).fits(&cache));
        assert!(!SliceShape::new(1, 4, 1, 16).fits(&cache));
    }
}
