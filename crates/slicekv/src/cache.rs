//! The slice-update KV cache.
//!
//! Keys and values live in two buffers of fixed shape
//! `[n_layers, batch, n_kv_heads, capacity, head_dim]`, allocated once.
//! Each layer tracks its own occupancy (high-water mark). An update writes a
//! contiguous block of positions into one layer and hands back that layer's
//! whole valid prefix, so the consumer never has to track occupancy itself.
//!
//! # Invariants
//! - `0 <= occupancy[layer] <= capacity`, and occupancy never decreases
//! - Every rejected update leaves buffers and occupancies untouched
//! - An update touches only the targeted layer's region
//!
//! Layers reaching the same occupancy at the end of a decode step is the
//! caller's contract; [`SliceUpdateCache::layers_aligned`] reports it but the
//! cache does not enforce it.

use std::ops::Range;

use tracing::{debug, trace, warn};

use crate::dtype::{Dtype, KvElement};
use crate::error::{KVError, KVResult};
use crate::shape::{CacheShape, SliceShape};
use crate::slice::KvSlice;
use crate::view::KvView;

/// Fixed-shape K/V cache updated in place by position slices.
#[derive(Debug, Clone)]
pub struct SliceUpdateCache<T: KvElement> {
    keys: Vec<T>,
    values: Vec<T>,
    occupancy: Vec<usize>,
    shape: CacheShape,
}

impl<T: KvElement> SliceUpdateCache<T> {
    /// Allocate zeroed K and V buffers for `shape`.
    ///
    /// # Errors
    /// - `InvalidArgument`: if any dimension of `shape` is zero, or the
    ///   buffers would not fit in addressable memory
    pub fn new(shape: CacheShape) -> KVResult<Self> {
        shape.validate()?;
        let elements = shape.total_elements();
        let dtype = T::DTYPE;

        debug!(
            shape = %shape,
            dtype = %dtype,
            bytes = shape.capacity_bytes(dtype.size_bytes()),
            "allocated slice-update KV cache"
        );

        Ok(Self {
            keys: vec![T::default(); elements],
            values: vec![T::default(); elements],
            occupancy: vec![0; shape.n_layers],
            shape,
        })
    }

    /// Write `keys`/`values` for `positions` into `layer` and return the
    /// layer's full valid history `[:, :, :occupancy, :]`.
    ///
    /// # Arguments
    /// - `layer`: layer index in `[0, n_layers)`
    /// - `keys`, `values`: slices shaped `[batch, n_kv_heads, positions.len(), head_dim]`
    /// - `positions`: strictly ascending, contiguous absolute positions
    ///
    /// Re-writing an already covered range is allowed and never lowers
    /// occupancy.
    ///
    /// # Errors
    /// - `InvalidArgument`: out-of-range layer, empty positions, positions
    ///   that are not one contiguous ascending run matching the slice length
    /// - `ShapeMismatch`: K and V shapes differ, or batch/heads/head_dim
    ///   disagree with the cache
    /// - `CapacityExceeded`: `max(positions) + 1 > capacity`
    pub fn update(
        &mut self,
        layer: usize,
        keys: KvSlice<'_, T>,
        values: KvSlice<'_, T>,
        positions: &[usize],
    ) -> KVResult<(KvView<'_, T>, KvView<'_, T>)> {
        let range = self.validate_update(layer, &keys, &values, positions)?;

        let dim = self.shape.head_dim;
        for b in 0..self.shape.batch {
            for h in 0..self.shape.n_kv_heads {
                let dst = self.shape.offset(layer, b, h, range.start, 0);
                let len = range.len() * dim;
                self.keys[dst..dst + len].copy_from_slice(keys.head(b, h));
                self.values[dst..dst + len].copy_from_slice(values.head(b, h));
            }
        }

        let occupancy = &mut self.occupancy[layer];
        *occupancy = (*occupancy).max(range.end);
        trace!(
            layer,
            start = range.start,
            end = range.end,
            occupancy = *occupancy,
            "kv slice update"
        );

        self.history(layer)
    }

    fn validate_update(
        &self,
        layer: usize,
        keys: &KvSlice<'_, T>,
        values: &KvSlice<'_, T>,
        positions: &[usize],
    ) -> KVResult<Range<usize>> {
        self.check_layer(layer)?;

        let (Some(&min), Some(&max)) = (positions.iter().min(), positions.iter().max()) else {
            return Err(KVError::invalid("position information required"));
        };

        if keys.shape() != values.shape() {
            return Err(KVError::ShapeMismatch {
                expected: format!("values shaped like keys {}", keys.shape()),
                got: values.shape().to_string(),
            });
        }
        if !keys.shape().fits(&self.shape) {
            let expected = SliceShape::new(
                self.shape.batch,
                self.shape.n_kv_heads,
                keys.seq_len(),
                self.shape.head_dim,
            );
            return Err(KVError::ShapeMismatch {
                expected: expected.to_string(),
                got: keys.shape().to_string(),
            });
        }

        let seq_len = keys.seq_len();
        if positions.len() != seq_len {
            return Err(KVError::invalid(format!(
                "{} positions supplied for a slice of {seq_len} rows",
                positions.len()
            )));
        }

        let end = max.saturating_add(1);
        let span = (max - min).saturating_add(1);
        if span != seq_len {
            return Err(KVError::invalid(format!(
                "positions must be contiguous: range {min}..{end} spans {span} slots but slice has {seq_len} rows"
            )));
        }
        if let Some(pair) = positions.windows(2).find(|w| w[1].checked_sub(w[0]) != Some(1)) {
            return Err(KVError::invalid(format!(
                "positions must be strictly ascending: {} followed by {}",
                pair[0], pair[1]
            )));
        }

        if end > self.shape.capacity {
            warn!(
                layer,
                end,
                capacity = self.shape.capacity,
                "kv update rejected: capacity exceeded"
            );
            return Err(KVError::CapacityExceeded {
                end,
                capacity: self.shape.capacity,
            });
        }

        Ok(min..end)
    }

    fn check_layer(&self, layer: usize) -> KVResult<()> {
        if layer >= self.shape.n_layers {
            return Err(KVError::invalid(format!(
                "layer index {layer} out of range for {} layers",
                self.shape.n_layers
            )));
        }
        Ok(())
    }

    /// Valid K and V history of `layer` without writing anything.
    pub fn history(&self, layer: usize) -> KVResult<(KvView<'_, T>, KvView<'_, T>)> {
        self.check_layer(layer)?;
        let len = self.occupancy[layer];
        let region = layer * self.shape.layer_elements()..(layer + 1) * self.shape.layer_elements();
        Ok((
            KvView::new(&self.keys[region.clone()], self.shape, len),
            KvView::new(&self.values[region], self.shape, len),
        ))
    }

    /// Highest occupancy across layers.
    ///
    /// Only meaningful between decode steps; mid-step, layers already
    /// updated are ahead of the rest.
    pub fn current_length(&self) -> usize {
        self.occupancy.iter().copied().max().unwrap_or(0)
    }

    /// Whether every layer has the same occupancy.
    pub fn layers_aligned(&self) -> bool {
        self.occupancy.windows(2).all(|w| w[0] == w[1])
    }

    pub fn occupancy(&self, layer: usize) -> Option<usize> {
        self.occupancy.get(layer).copied()
    }

    pub fn occupancies(&self) -> &[usize] {
        &self.occupancy
    }

    pub fn shape(&self) -> CacheShape {
        self.shape
    }

    pub fn dtype(&self) -> Dtype {
        T::DTYPE
    }

    pub fn n_layers(&self) -> usize {
        self.shape.n_layers
    }

    pub fn capacity(&self) -> usize {
        self.shape.capacity
    }

    /// Whole key buffer, `[n_layers, batch, n_kv_heads, capacity, head_dim]`.
    pub fn keys(&self) -> &[T] {
        &self.keys
    }

    /// Whole value buffer, same layout as [`keys`](Self::keys).
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Total memory allocated for K and V (in bytes).
    pub fn memory_bytes(&self) -> usize {
        self.shape.capacity_bytes(T::DTYPE.size_bytes())
    }

    /// Memory covered by the valid prefixes of all layers (K+V).
    pub fn active_memory_bytes(&self) -> usize {
        let per_position = self.shape.batch * self.shape.n_kv_heads * self.shape.head_dim;
        let positions: usize = self.occupancy.iter().sum();
        positions * per_position * 2 * T::DTYPE.size_bytes()
    }
}
