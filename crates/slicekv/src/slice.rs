//! Borrowed K/V input slices.

use crate::error::{KVError, KVResult};
use crate::shape::SliceShape;

/// A row-major `[batch, n_kv_heads, seq_len, head_dim]` slice of new keys
/// or values produced by one attention layer for the current input chunk.
#[derive(Debug, Clone, Copy)]
pub struct KvSlice<'a, T> {
    data: &'a [T],
    shape: SliceShape,
}

impl<'a, T> KvSlice<'a, T> {
    /// Wrap `data` with the given shape.
    ///
    /// # Errors
    /// - `InvalidArgument`: if the product of the dimensions overflows `usize`
    /// - `ShapeMismatch`: if `data.len()` is not the product of the dimensions
    pub fn new(data: &'a [T], shape: SliceShape) -> KVResult<Self> {
        let expected = shape.elements()?;
        if data.len() != expected {
            return Err(KVError::ShapeMismatch {
                expected: format!("{expected} elements for {shape}"),
                got: format!("{} elements", data.len()),
            });
        }
        Ok(Self { data, shape })
    }

    pub fn shape(&self) -> SliceShape {
        self.shape
    }

    pub fn seq_len(&self) -> usize {
        self.shape.seq_len
    }

    pub fn data(&self) -> &'a [T] {
        self.data
    }

    /// The `seq_len * head_dim` run belonging to one `(batch, head)` pair.
    pub(crate) fn head(&self, b: usize, h: usize) -> &'a [T] {
        let run = self.shape.seq_len * self.shape.head_dim;
        let start = (b * self.shape.n_kv_heads + h) * run;
        &self.data[start..start + run]
    }
}
