//! JSON wire format: the input document (`ScheduleConfig` + `workers_data`)
//! and the output document (metadata + the date-keyed schedule grid).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{ScheduleConfig, Worker, WorkerId};
use crate::scheduler_core::ScheduleResult;

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerInput {
    #[serde(flatten)]
    pub config: ScheduleConfig,
    pub workers_data: Vec<Worker>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleMetadata {
    pub generated_at: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub num_shifts_per_day: u32,
    pub iterations_run: u32,
    pub converged: bool,
    pub remaining_tolerance_violations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerOutput {
    pub metadata: ScheduleMetadata,
    pub schedule: BTreeMap<NaiveDate, Vec<Option<WorkerId>>>,
    pub workers_data: Vec<Worker>,
}

impl SchedulerOutput {
    /// `generated_at` is supplied by the caller (an RFC 3339 timestamp
    /// string) rather than read from the system clock here, so the engine
    /// itself stays free of wall-clock dependencies.
    pub fn from_result(
        result: &ScheduleResult,
        config: &ScheduleConfig,
        workers: Vec<Worker>,
        generated_at: String,
    ) -> Self {
        SchedulerOutput {
            metadata: ScheduleMetadata {
                generated_at,
                period_start: config.start_date,
                period_end: config.end_date,
                num_shifts_per_day: config.num_shifts,
                iterations_run: result.iterations_run,
                converged: result.converged,
                remaining_tolerance_violations: result.remaining_violations,
            },
            schedule: result.state.schedule.clone(),
            workers_data: workers,
        }
    }
}

pub fn parse_input(json: &str) -> serde_json::Result<SchedulerInput> {
    serde_json::from_str(json)
}

pub fn serialize_output(output: &SchedulerOutput) -> serde_json::Result<String> {
    serde_json::to_string_pretty(output)
}
