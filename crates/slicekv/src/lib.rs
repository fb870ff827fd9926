//! # slicekv
//!
//! Static-shape key/value attention cache for transformer decoders exported
//! to ahead-of-time compiled targets that cannot grow tensors at runtime.
//!
//! Supports:
//! - **Fixed allocation**: K and V buffers of shape `[layers, batch, kv_heads, context, head_dim]`,
//!   allocated once and never resized
//! - **Slice updates**: a prefill block or single decode token is written at
//!   explicit, contiguous positions of one layer
//! - **Full-history reads**: every update returns the layer's whole valid prefix
//!   as borrowed views
//! - **Per-layer occupancy**: each layer advances its own high-water mark
//! - **Planning**: derive the cache shape from a model `config.json`

pub mod cache;
pub mod config;
pub mod dtype;
pub mod error;
pub mod shape;
pub mod slice;
pub mod view;

pub use cache::SliceUpdateCache;
pub use config::{CachePlan, ModelConfig, DEFAULT_CONTEXT, EXPORT_BATCH};
pub use dtype::{Dtype, KvElement};
pub use error::{ConfigError, ConfigResult, KVError, KVResult};
pub use shape::{CacheShape, SliceShape};
pub use slice::KvSlice;
pub use view::KvView;
