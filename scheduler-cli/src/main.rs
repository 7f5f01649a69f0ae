use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scheduler_core::SchedulerError;

/// Builds a shift schedule from a JSON configuration document.
#[derive(Parser, Debug)]
#[command(name = "scheduler-cli", version, about)]
struct Args {
    /// Path to the input JSON document (config + workers_data).
    input: PathBuf,

    /// Where to write the output JSON document. Prints to stdout if omitted.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Seed for the random worker-ordering policy and perturbation passes.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scheduler_cli=info,scheduler_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    run(args)
}

fn run(args: Args) -> ExitCode {
    let input_json = match fs::read_to_string(&args.input) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::error!(path = %args.input.display(), error = %err, "failed to read input file");
            return ExitCode::from(1);
        }
    };

    tracing::info!(path = %args.input.display(), "building schedule");
    let generated_at = chrono::Utc::now().to_rfc3339();
    match scheduler_core::run(&input_json, args.seed, generated_at) {
        Ok(output_json) => {
            match &args.output {
                Some(path) => {
                    if let Err(err) = fs::write(path, &output_json) {
                        tracing::error!(path = %path.display(), error = %err, "failed to write output file");
                        return ExitCode::from(3);
                    }
                    tracing::info!(path = %path.display(), "schedule written");
                }
                None => println!("{output_json}"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "scheduling failed");
            exit_code_for(&err)
        }
    }
}

fn exit_code_for(err: &SchedulerError) -> ExitCode {
    match err {
        SchedulerError::Configuration(_) => ExitCode::from(1),
        SchedulerError::InfeasibleMandatoryLayout(_) => ExitCode::from(2),
        SchedulerError::Runtime(_) => ExitCode::from(3),
    }
}
