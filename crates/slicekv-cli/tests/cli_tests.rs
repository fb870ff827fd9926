use std::path::PathBuf;

use slicekv::{CacheShape, ConfigError, Dtype, KVError};
use slicekv_cli::{plan, simulate, CliError, PlanArgs, SimulateArgs};

fn write_config(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "architectures": ["LlamaForCausalLM"],
            "hidden_size": 128,
            "num_attention_heads": 4,
            "num_key_value_heads": 2,
            "num_hidden_layers": 3,
            "max_position_embeddings": 512
        }"#,
    )
    .unwrap();
    path
}

fn write_unbounded_config(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("unbounded.json");
    std::fs::write(
        &path,
        r#"{"hidden_size": 1024, "num_attention_heads": 8, "num_hidden_layers": 4}"#,
    )
    .unwrap();
    path
}

fn plan_args(config: PathBuf, context: usize, dtype: Dtype) -> PlanArgs {
    PlanArgs {
        config,
        context,
        dtype,
    }
}

#[test]
fn plan_reports_shape_and_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let report = plan(&plan_args(write_config(&dir), 256, Dtype::Float16)).unwrap();

    assert_eq!(report.plan.shape, CacheShape::new(3, 1, 2, 256, 32));
    assert_eq!(report.total_bytes, 2 * 3 * 2 * 256 * 32 * 2);
    assert!(report.summary().contains("ctx:256"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["dtype"], "float16");
    assert_eq!(json["total_bytes"], report.total_bytes);

    let rendered: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(rendered, json);
}

#[test]
fn plan_rejects_context_beyond_model() {
    let dir = tempfile::tempdir().unwrap();
    let result = plan(&plan_args(write_config(&dir), 1024, Dtype::Float16));
    assert!(matches!(
        result,
        Err(CliError::Config(ConfigError::Invalid(_)))
    ));
}

#[test]
fn plan_rejects_oversized_context_without_model_limit() {
    let dir = tempfile::tempdir().unwrap();
    let result = plan(&plan_args(
        write_unbounded_config(&dir),
        usize::MAX / 4,
        Dtype::Float16,
    ));
    assert!(matches!(
        result,
        Err(CliError::Config(ConfigError::Invalid(_)))
    ));
}

#[test]
fn simulate_fills_to_prompt_plus_steps() {
    let dir = tempfile::tempdir().unwrap();
    for dtype in [Dtype::Float16, Dtype::BFloat16, Dtype::Float32] {
        let report = simulate(&SimulateArgs {
            plan: plan_args(write_config(&dir), 64, dtype),
            prompt_len: 10,
            steps: 20,
        })
        .unwrap();

        assert_eq!(report.current_length, 30);
        // 3 layers * 30 positions * 2 heads * 32 dim * (K+V)
        assert_eq!(
            report.active_bytes,
            3 * 30 * 2 * 32 * 2 * dtype.size_bytes()
        );
    }
}

#[test]
fn simulate_exactly_to_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let report = simulate(&SimulateArgs {
        plan: plan_args(write_config(&dir), 16, Dtype::Float32),
        prompt_len: 6,
        steps: 10,
    })
    .unwrap();
    assert_eq!(report.current_length, 16);
}

#[test]
fn simulate_past_capacity_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = simulate(&SimulateArgs {
        plan: plan_args(write_config(&dir), 16, Dtype::Float32),
        prompt_len: 6,
        steps: 11,
    })
    .unwrap_err();
    assert!(matches!(
        err,
        CliError::KVCache(KVError::CapacityExceeded {
            end: 17,
            capacity: 16
        })
    ));
}

#[test]
fn simulate_requires_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let err = simulate(&SimulateArgs {
        plan: plan_args(write_config(&dir), 16, Dtype::Float32),
        prompt_len: 0,
        steps: 1,
    })
    .unwrap_err();
    assert!(matches!(err, CliError::EmptyPrompt));
}

#[test]
fn simulate_rejects_overflowing_session_length() {
    let dir = tempfile::tempdir().unwrap();
    let err = simulate(&SimulateArgs {
        plan: plan_args(write_config(&dir), 16, Dtype::Float32),
        prompt_len: usize::MAX,
        steps: 1,
    })
    .unwrap_err();
    assert!(matches!(
        err,
        CliError::KVCache(KVError::CapacityExceeded {
            end: usize::MAX,
            capacity: 16
        })
    ));
}
