pub mod backtracking;
pub mod balance_validator;
pub mod builder;
pub mod config;
pub mod constraint_evaluator;
pub mod date_utils;
pub mod error;
pub mod initial_distributor;
pub mod iterative_optimizer;
pub mod metrics;
pub mod model;
pub mod output;
pub mod prioritizer;
pub mod scheduler_core;
pub mod state;
pub mod tolerance_validator;
pub mod validate;

pub use error::{SchedulerError, SchedulerResult};
pub use model::{ScheduleConfig, VariableShift, Worker, WorkerId, WorkPeriod};
pub use output::{SchedulerInput, SchedulerOutput};
pub use scheduler_core::{ScheduleResult, SchedulerCore};

/// Runs the full scheduling pipeline against a JSON input document and
/// returns the JSON output document. The convenience entry point the CLI
/// calls.
pub fn run(input_json: &str, seed: u64, generated_at: String) -> SchedulerResult<String> {
    let input = output::parse_input(input_json)
        .map_err(|e| SchedulerError::Configuration(format!("malformed input document: {e}")))?;

    let workers = input.workers_data.clone();
    let core = SchedulerCore::new(input.config.clone(), workers.clone(), seed);
    let result = core.run()?;

    let out = output::SchedulerOutput::from_result(&result, &input.config, workers, generated_at);
    serde_json::to_string_pretty(&out)
        .map_err(|e| SchedulerError::Runtime(format!("failed to serialize output: {e}")))
}
