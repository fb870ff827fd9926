//! Read-through projections of one layer's valid history.

use crate::shape::{CacheShape, SliceShape};

/// Borrowed view of `buffer[layer][:, :, :len, :]`.
///
/// The view does not own or copy data; it projects the first `len`
/// positions of each `(batch, head)` row out of the layer's full-capacity
/// region. Each head's history is contiguous, heads are `capacity * head_dim`
/// apart.
#[derive(Debug, Clone, Copy)]
pub struct KvView<'a, T> {
    region: &'a [T],
    cache: CacheShape,
    len: usize,
}

impl<'a, T: Copy> KvView<'a, T> {
    pub(crate) fn new(region: &'a [T], cache: CacheShape, len: usize) -> Self {
        debug_assert_eq!(region.len(), cache.layer_elements());
        debug_assert!(len <= cache.capacity);
        Self { region, cache, len }
    }

    /// Logical shape `[batch, n_kv_heads, len, head_dim]`.
    pub fn shape(&self) -> SliceShape {
        SliceShape::new(
            self.cache.batch,
            self.cache.n_kv_heads,
            self.len,
            self.cache.head_dim,
        )
    }

    /// Number of valid positions.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Valid history of one `(batch, head)` pair: `len * head_dim` elements,
    /// or `None` if `b` or `h` is out of range.
    pub fn head(&self, b: usize, h: usize) -> Option<&'a [T]> {
        if b >= self.cache.batch || h >= self.cache.n_kv_heads {
            return None;
        }
        Some(&self.region[self.head_range(b, h)])
    }

    /// The `head_dim` vector at `pos`, or `None` past the valid prefix.
    pub fn row(&self, b: usize, h: usize, pos: usize) -> Option<&'a [T]> {
        if pos >= self.len {
            return None;
        }
        let dim = self.cache.head_dim;
        self.head(b, h).map(|head| &head[pos * dim..(pos + 1) * dim])
    }

    pub fn get(&self, b: usize, h: usize, pos: usize, d: usize) -> Option<T> {
        self.row(b, h, pos).and_then(|row| row.get(d).copied())
    }

    /// Copy the view into a contiguous `[batch, n_kv_heads, len, head_dim]` buffer.
    pub fn to_vec(&self) -> Vec<T> {
        let rows = self.cache.batch * self.cache.n_kv_heads;
        let mut out = Vec::with_capacity(rows * self.len * self.cache.head_dim);
        for b in 0..self.cache.batch {
            for h in 0..self.cache.n_kv_heads {
                out.extend_from_slice(&self.region[self.head_range(b, h)]);
            }
        }
        out
    }

    fn head_range(&self, b: usize, h: usize) -> std::ops::Range<usize> {
        let start = (b * self.cache.n_kv_heads + h) * self.cache.capacity * self.cache.head_dim;
        start..start + self.len * self.cache.head_dim
    }
}
