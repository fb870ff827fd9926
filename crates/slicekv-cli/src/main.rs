use std::path::PathBuf;

use clap::Parser;
use slicekv::{Dtype, DEFAULT_CONTEXT};
use slicekv_cli::{plan, simulate, PlanArgs, SimulateArgs};
use tracing_subscriber::EnvFilter;

/// slicekv — plan and exercise static-shape KV caches
#[derive(Parser)]
#[command(name = "slicekv")]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct PlanOpts {
    /// Path to the model's config.json.
    #[arg(short, long)]
    config: PathBuf,

    /// Maximum context length (cache capacity).
    #[arg(long, default_value_t = DEFAULT_CONTEXT)]
    context: usize,

    /// Cache precision: float16, bfloat16 or float32.
    #[arg(long, default_value = "float16")]
    dtype: Dtype,
}

impl From<PlanOpts> for PlanArgs {
    fn from(opts: PlanOpts) -> Self {
        PlanArgs {
            config: opts.config,
            context: opts.context,
            dtype: opts.dtype,
        }
    }
}

#[derive(clap::Subcommand)]
enum Command {
    /// Derive the cache shape and memory footprint from a model config.
    Plan {
        #[command(flatten)]
        opts: PlanOpts,

        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Drive a synthetic prefill + decode session through the cache.
    Simulate {
        #[command(flatten)]
        opts: PlanOpts,

        /// Number of prompt positions written by the prefill update.
        #[arg(short, long, default_value_t = 8)]
        prompt_len: usize,

        /// Number of single-position decode steps after prefill.
        #[arg(short, long, default_value_t = 16)]
        steps: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Command::Plan { opts, json } => plan(&opts.into()).and_then(|report| {
            let rendered = if json {
                report.to_json()?
            } else {
                report.summary()
            };
            println!("{rendered}");
            Ok(())
        }),
        Command::Simulate {
            opts,
            prompt_len,
            steps,
        } => simulate(&SimulateArgs {
            plan: opts.into(),
            prompt_len,
            steps,
        })
        .map(|report| {
            println!(
                "decoded {} prompt + {} steps: current_length={} / capacity={}, active K+V bytes={}",
                report.prompt_len,
                report.steps,
                report.current_length,
                report.plan.shape.capacity,
                report.active_bytes
            );
        }),
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
