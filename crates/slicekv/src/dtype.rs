//! Element precision of cache buffers.
//!
//! [`Dtype`] names the precision for reporting and planning. [`KvElement`]
//! ties a Rust scalar type to its `Dtype`; a [`SliceUpdateCache<T>`] only
//! accepts slices of the same `T`, so precision mismatches are compile errors.
//!
//! [`SliceUpdateCache<T>`]: crate::SliceUpdateCache

use std::fmt;
use std::str::FromStr;

use half::{bf16, f16};
use serde::{Deserialize, Serialize};

use crate::error::KVError;

/// Supported cache precisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Float16,
    BFloat16,
    Float32,
}

impl Dtype {
    /// Size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            Dtype::Float16 | Dtype::BFloat16 => 2,
            Dtype::Float32 => 4,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Dtype::Float16 => "float16",
            Dtype::BFloat16 => "bfloat16",
            Dtype::Float32 => "float32",
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Dtype {
    type Err = KVError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "float16" | "f16" | "fp16" => Ok(Dtype::Float16),
            "bfloat16" | "bf16" => Ok(Dtype::BFloat16),
            "float32" | "f32" | "fp32" => Ok(Dtype::Float32),
            other => Err(KVError::invalid(format!("unknown dtype: {other}"))),
        }
    }
}

/// Scalar types a cache can store.
pub trait KvElement: Copy + Default + PartialEq + fmt::Debug + 'static {
    const DTYPE: Dtype;

    fn from_f32(value: f32) -> Self;
    fn to_f32(self) -> f32;
}

impl KvElement for f32 {
    const DTYPE: Dtype = Dtype::Float32;

    fn from_f32(value: f32) -> Self {
        value
    }

    fn to_f32(self) -> f32 {
        self
    }
}

impl KvElement for f16 {
    const DTYPE: Dtype = Dtype::Float16;

    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }

    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
}

impl KvElement for bf16 {
    const DTYPE: Dtype = Dtype::BFloat16;

    fn from_f32(value: f32) -> Self {
        bf16::from_f32(value)
    }

    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_matches_rust_type() {
        assert_eq!(f32::DTYPE.size_bytes(), std::mem::size_of::<f32>());
        assert_eq!(f16::DTYPE.size_bytes(), std::mem::size_of::<f16>());
        assert_eq!(bf16::DTYPE.size_bytes(), std::mem::size_of::<bf16>());
    }

    #[test]
    fn parse_aliases() {
        assert_eq!("fp16".parse::<Dtype>().unwrap(), Dtype::Float16);
        assert_eq!("BF16".parse::<Dtype>().unwrap(), Dtype::BFloat16);
        assert_eq!("float32".parse::<Dtype>().unwrap(), Dtype::Float32);
        assert!(matches!(
            "int8".parse::<Dtype>(),
            Err(KVError::InvalidArgument(_))
        ));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for dtype in [Dtype::Float16, Dtype::BFloat16, Dtype::Float32] {
            assert_eq!(dtype.to_string().parse::<Dtype>().unwrap(), dtype);
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Dtype::BFloat16).unwrap();
        assert_eq!(json, "\"bfloat16\"");
        let back: Dtype = serde_json::from_str("\"float16\"").unwrap();
        assert_eq!(back, Dtype::Float16);
    }

    #[test]
    fn f16_conversion_is_exact_for_small_integers() {
        for i in 0..64 {
            let v = i as f32;
            assert_eq!(<f16 as KvElement>::from_f32(v).to_f32(), v);
        }
    }
}
