//! Cache planning from a transformer's `config.json`.
//!
//! The export pipeline fixes the cache shape before tracing: it supplies the
//! context length and reads layer count, KV head count and head dimension
//! from the model configuration. Batch is always 1.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::SliceUpdateCache;
use crate::dtype::{Dtype, KvElement};
use crate::error::{ConfigError, ConfigResult, KVError, KVResult};
use crate::shape::CacheShape;

/// Context length used when the pipeline does not supply one.
pub const DEFAULT_CONTEXT: usize = 256;

/// Batch size of an exported decoder.
pub const EXPORT_BATCH: usize = 1;

/// The subset of a Hugging Face style model configuration that determines
/// the cache shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    /// Number of transformer layers (e.g., 32 for Llama 3 8B).
    pub num_hidden_layers: usize,

    /// Hidden dimension of the model (e.g., 4096 for Llama 3 8B).
    pub hidden_size: usize,

    /// Number of attention heads for queries.
    pub num_attention_heads: usize,

    /// Number of heads for keys and values (GQA). A missing field falls
    /// back to `num_attention_heads`; an explicit 0 is rejected.
    #[serde(default)]
    pub num_key_value_heads: Option<usize>,

    /// Dimension of each attention head.
    /// Computed as hidden_size / num_attention_heads when absent.
    #[serde(default)]
    pub head_dim: usize,

    /// Maximum sequence length the model was trained for, if declared.
    #[serde(default)]
    pub max_position_embeddings: Option<usize>,
}

impl ModelConfig {
    /// Load and resolve a `config.json`.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        debug!(path = %path.display(), layers = config.num_hidden_layers, "loaded model config");
        Ok(config)
    }

    /// Parse and resolve a `config.json` document.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let mut config: ModelConfig = serde_json::from_str(json)?;
        config.resolve()?;
        Ok(config)
    }

    /// Compute derived values after deserialization.
    pub fn resolve(&mut self) -> ConfigResult<()> {
        if self.num_hidden_layers == 0 {
            return Err(ConfigError::Invalid("num_hidden_layers must be > 0".into()));
        }
        if self.num_attention_heads == 0 {
            return Err(ConfigError::Invalid(
                "num_attention_heads must be > 0".into(),
            ));
        }
        match self.num_key_value_heads {
            None => self.num_key_value_heads = Some(self.num_attention_heads),
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "num_key_value_heads must be > 0".into(),
                ))
            }
            Some(_) => {}
        }
        if self.head_dim == 0 {
            if self.hidden_size % self.num_attention_heads != 0 {
                return Err(ConfigError::Invalid(format!(
                    "hidden_size {} is not divisible by num_attention_heads {}",
                    self.hidden_size, self.num_attention_heads
                )));
            }
            self.head_dim = self.hidden_size / self.num_attention_heads;
        }
        if self.head_dim == 0 {
            return Err(ConfigError::Invalid("head_dim resolved to 0".into()));
        }
        Ok(())
    }

    /// KV head count after [`resolve`](Self::resolve).
    pub fn kv_heads(&self) -> usize {
        self.num_key_value_heads.unwrap_or(self.num_attention_heads)
    }
}

/// A fixed cache shape and precision, decided before export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePlan {
    pub shape: CacheShape,
    pub dtype: Dtype,
}

impl CachePlan {
    pub fn new(shape: CacheShape, dtype: Dtype) -> KVResult<Self> {
        shape.validate()?;
        Ok(Self { shape, dtype })
    }

    /// Derive `[layers, 1, kv_heads, context, head_dim]` from a resolved config.
    ///
    /// # Errors
    /// - `Invalid`: zero context, or a context beyond the model's declared
    ///   `max_position_embeddings`
    pub fn from_model_config(
        config: &ModelConfig,
        context: usize,
        dtype: Dtype,
    ) -> ConfigResult<Self> {
        if context == 0 {
            return Err(ConfigError::Invalid("context must be > 0".into()));
        }
        if let Some(max) = config.max_position_embeddings {
            if context > max {
                return Err(ConfigError::Invalid(format!(
                    "context {context} exceeds max_position_embeddings {max}"
                )));
            }
        }

        let shape = CacheShape::new(
            config.num_hidden_layers,
            EXPORT_BATCH,
            config.kv_heads(),
            context,
            config.head_dim,
        );
        Self::new(shape, dtype).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Bytes for both K and V buffers.
    pub fn total_bytes(&self) -> usize {
        self.shape.capacity_bytes(self.dtype.size_bytes())
    }

    /// Allocate a cache for this plan.
    ///
    /// # Errors
    /// - `InvalidArgument`: if `T` does not have the planned precision
    pub fn build<T: KvElement>(&self) -> KVResult<SliceUpdateCache<T>> {
        if T::DTYPE != self.dtype {
            return Err(KVError::invalid(format!(
                "plan uses {} but cache element type is {}",
                self.dtype,
                T::DTYPE
            )));
        }
        SliceUpdateCache::new(self.shape)
    }
}
