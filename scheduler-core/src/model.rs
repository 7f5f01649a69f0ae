use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stable opaque worker identifier.
pub type WorkerId = String;

/// A worker eligible for assignment to shifts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,

    /// Integer 1..=100; 100 is full-time.
    pub work_percentage: u8,

    /// Desired number of assignments across the horizon. Already pre-scaled
    /// for `work_percentage` by whoever built the config — the engine never
    /// re-scales it.
    pub target_shifts: u32,

    #[serde(default)]
    pub mandatory_dates: BTreeSet<NaiveDate>,

    #[serde(default)]
    pub days_off: BTreeSet<NaiveDate>,

    /// Windows during which the worker is available. Empty means always
    /// available.
    #[serde(default)]
    pub work_periods: Vec<WorkPeriod>,

    /// Commutative relation; the config loader symmetrizes this so every
    /// entry here also lists this worker's id on the other side.
    #[serde(default)]
    pub incompatible_with: BTreeSet<WorkerId>,
}

impl Worker {
    pub fn is_available_on(&self, date: NaiveDate) -> bool {
        if self.work_periods.is_empty() {
            return true;
        }
        self.work_periods.iter().any(|p| p.contains(date))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WorkPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Override of the default post count for a date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableShift {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub shifts: u32,
}

impl VariableShift {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

/// Horizon, post counts and rule knobs. Mirrors the JSON configuration
/// document described in the external interface section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    #[serde(default = "default_num_shifts")]
    pub num_shifts: u32,

    #[serde(default)]
    pub variable_shifts: Vec<VariableShift>,

    #[serde(default)]
    pub holidays: BTreeSet<NaiveDate>,

    #[serde(default = "default_gap_between_shifts")]
    pub gap_between_shifts: i64,

    #[serde(default = "default_max_consecutive_weekends")]
    pub max_consecutive_weekends: u32,

    #[serde(default = "default_weekend_tolerance")]
    pub weekend_tolerance: i32,

    #[serde(default = "default_true")]
    pub enforce_7_14_pattern: bool,

    #[serde(default = "default_max_improvement_loops")]
    pub max_improvement_loops: u32,

    #[serde(default = "default_last_post_adjustment_max_iterations")]
    pub last_post_adjustment_max_iterations: u32,

    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,
}

fn default_num_shifts() -> u32 {
    1
}
fn default_gap_between_shifts() -> i64 {
    2
}
fn default_max_consecutive_weekends() -> u32 {
    2
}
fn default_weekend_tolerance() -> i32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_max_improvement_loops() -> u32 {
    70
}
fn default_last_post_adjustment_max_iterations() -> u32 {
    20
}
fn default_max_checkpoints() -> usize {
    20
}

impl ScheduleConfig {
    /// Number of posts scheduled on `date`, honoring `variable_shifts` in
    /// first-match declaration order with fallthrough to `num_shifts`.
    pub fn posts_on(&self, date: NaiveDate) -> u32 {
        for vs in &self.variable_shifts {
            if vs.contains(date) {
                return vs.shifts;
            }
        }
        self.num_shifts
    }

    pub fn horizon_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}
