//! # slicekv-cli
//!
//! Planning and smoke-testing for slice-update KV caches.
//!
//! Wires: config.json → cache plan → (optional) synthetic decode session that
//! drives the cache the way an exported decoder does: one prefill update per
//! layer, then one single-position update per layer per step.

use std::path::PathBuf;

use half::{bf16, f16};
use serde::Serialize;
use slicekv::{
    CachePlan, ConfigError, Dtype, KVError, KVResult, KvElement, KvSlice, ModelConfig,
    SliceShape, SliceUpdateCache,
};
use tracing::{debug, info};

/// Errors from the CLI pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("kv cache error: {0}")]
    KVCache(#[from] KVError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("prompt length must be > 0")]
    EmptyPrompt,
}

/// Inputs for `slicekv plan`.
#[derive(Debug, Clone)]
pub struct PlanArgs {
    pub config: PathBuf,
    pub context: usize,
    pub dtype: Dtype,
}

/// What an export pipeline needs to know about the cache before tracing.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    #[serde(flatten)]
    pub plan: CachePlan,
    pub total_bytes: usize,
}

impl PlanReport {
    /// Human-readable multi-line summary.
    pub fn summary(&self) -> String {
        let shape = self.plan.shape;
        format!(
            "cache shape: {shape}\ndtype: {}\nK+V bytes: {} ({:.2} MiB)",
            self.plan.dtype,
            self.total_bytes,
            self.total_bytes as f64 / (1024.0 * 1024.0)
        )
    }

    /// Pretty-printed JSON for the export pipeline's artifact report.
    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Load the model config and derive the cache plan.
pub fn plan(args: &PlanArgs) -> Result<PlanReport, CliError> {
    let config = ModelConfig::from_file(&args.config)?;
    let plan = CachePlan::from_model_config(&config, args.context, args.dtype)?;
    info!(shape = %plan.shape, dtype = %plan.dtype, "planned kv cache");
    Ok(PlanReport {
        plan,
        total_bytes: plan.total_bytes(),
    })
}

/// Inputs for `slicekv simulate`.
#[derive(Debug, Clone)]
pub struct SimulateArgs {
    pub plan: PlanArgs,
    pub prompt_len: usize,
    pub steps: usize,
}

/// Outcome of a synthetic decode session.
#[derive(Debug, Clone, Serialize)]
pub struct SimulateReport {
    pub plan: CachePlan,
    pub prompt_len: usize,
    pub steps: usize,
    pub current_length: usize,
    pub active_bytes: usize,
}

/// Run a synthetic prefill + decode session against a freshly planned cache.
///
/// # Errors
/// - `EmptyPrompt`: `prompt_len == 0`
/// - `KVCache(CapacityExceeded)`: `prompt_len + steps` exceeds the planned
///   context; checked before any buffer is allocated
pub fn simulate(args: &SimulateArgs) -> Result<SimulateReport, CliError> {
    if args.prompt_len == 0 {
        return Err(CliError::EmptyPrompt);
    }
    let report = plan(&args.plan)?;
    let capacity = report.plan.shape.capacity;
    let end = args.prompt_len.checked_add(args.steps).unwrap_or(usize::MAX);
    if end > capacity {
        return Err(KVError::CapacityExceeded { end, capacity }.into());
    }
    match report.plan.dtype {
        Dtype::Float16 => run_session::<f16>(report.plan, args),
        Dtype::BFloat16 => run_session::<bf16>(report.plan, args),
        Dtype::Float32 => run_session::<f32>(report.plan, args),
    }
}

fn run_session<T: KvElement>(
    plan: CachePlan,
    args: &SimulateArgs,
) -> Result<SimulateReport, CliError> {
    let mut cache = plan.build::<T>()?;

    decode_step(&mut cache, 0, args.prompt_len, 0)?;
    for step in 1..=args.steps {
        let pos = args.prompt_len + step - 1;
        decode_step(&mut cache, pos, 1, step)?;
    }

    let report = SimulateReport {
        plan,
        prompt_len: args.prompt_len,
        steps: args.steps,
        current_length: cache.current_length(),
        active_bytes: cache.active_memory_bytes(),
    };
    info!(
        current_length = report.current_length,
        capacity = cache.capacity(),
        "simulated decode session"
    );
    Ok(report)
}

/// One forward pass: update every layer with `len` positions from `start`.
fn decode_step<T: KvElement>(
    cache: &mut SliceUpdateCache<T>,
    start: usize,
    len: usize,
    step: usize,
) -> Result<(), CliError> {
    let shape = cache.shape();
    let slice_shape = SliceShape::new(shape.batch, shape.n_kv_heads, len, shape.head_dim);
    let positions: Vec<usize> = (start..start + len).collect();

    for layer in 0..cache.n_layers() {
        let keys = synthetic::<T>(layer, start, slice_shape, 0.5)?;
        let values = synthetic::<T>(layer, start, slice_shape, -0.5)?;
        let (history, _) = cache.update(
            layer,
            KvSlice::new(&keys, slice_shape)?,
            KvSlice::new(&values, slice_shape)?,
            &positions,
        )?;
        debug!(step, layer, history = history.len(), "layer updated");
    }

    debug_assert!(
        cache.layers_aligned(),
        "layers diverged after step {step}: {:?}",
        cache.occupancies()
    );
    Ok(())
}

/// Deterministic stand-in for projected keys/values.
fn synthetic<T: KvElement>(
    layer: usize,
    start: usize,
    shape: SliceShape,
    bias: f32,
) -> KVResult<Vec<T>> {
    Ok((0..shape.elements()?)
        .map(|i| {
            let x = ((layer * 31 + start * 7 + i) % 97) as f32 / 97.0;
            T::from_f32(x + bias)
        })
        .collect())
}
