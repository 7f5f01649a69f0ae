//! Aggregate optimization metrics, used both to score candidate schedules
//! (`InitialDistributor`) and to drive the iterative optimizer's stopping
//! conditions.

use crate::config as weights;
use crate::model::Worker;
use crate::state::ScheduleState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationMetrics {
    pub coverage: f64,
    pub empty_cells: usize,
    pub workload_imbalance: f64,
    pub weekend_imbalance: f64,
    pub tolerance_violations: usize,
    pub score: f64,
}

impl OptimizationMetrics {
    pub fn compute(state: &ScheduleState, workers: &[Worker]) -> Self {
        let total = state.total_cell_count().max(1) as f64;
        let empty = state.empty_cell_count();
        let coverage = (total - empty as f64) / total;

        let workload_imbalance = stdev_of_ratio(workers.iter().map(|w| {
            let actual = state.worker_shift_counts.get(&w.id).copied().unwrap_or(0) as f64;
            let target = w.target_shifts.max(1) as f64;
            actual / target
        }));

        let weekend_imbalance = stdev_of_ratio(workers.iter().map(|w| {
            state
                .worker_weekend_counts
                .get(&w.id)
                .copied()
                .unwrap_or(0) as f64
        }));

        let tolerance_violations = workers
            .iter()
            .filter(|w| {
                let actual = state.worker_shift_counts.get(&w.id).copied().unwrap_or(0);
                crate::tolerance_validator::classify(w.target_shifts, actual)
                    != crate::tolerance_validator::ToleranceTier::Objective
            })
            .count();

        let score = weights::METRIC_COVERAGE_WEIGHT * coverage
            - weights::METRIC_EMPTY_CELL_WEIGHT * empty as f64
            - weights::METRIC_WORKLOAD_IMBALANCE_WEIGHT * workload_imbalance
            - weights::METRIC_WEEKEND_IMBALANCE_WEIGHT * weekend_imbalance
            - weights::METRIC_TOLERANCE_VIOLATION_WEIGHT * tolerance_violations as f64;

        Self {
            coverage,
            empty_cells: empty,
            workload_imbalance,
            weekend_imbalance,
            tolerance_violations,
            score,
        }
    }
}

fn stdev_of_ratio(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Rolling history used by the iterative optimizer to decide when to stop:
/// stagnation (no improvement for `STAGNATION_CYCLES` rounds), a plateau
/// across the last `PLATEAU_SCORE_HISTORY` scores, or the hard iteration cap.
#[derive(Debug, Default)]
pub struct ScoreHistory {
    scores: Vec<f64>,
    stagnation_counter: u32,
}

impl ScoreHistory {
    pub fn record(&mut self, score: f64) {
        if let Some(&last) = self.scores.last() {
            if score <= last + f64::EPSILON {
                self.stagnation_counter += 1;
            } else {
                self.stagnation_counter = 0;
            }
        }
        self.scores.push(score);
    }

    pub fn stagnation_counter(&self) -> u32 {
        self.stagnation_counter
    }

    pub fn is_stagnant(&self) -> bool {
        self.stagnation_counter >= weights::STAGNATION_CYCLES
    }

    pub fn is_plateau(&self) -> bool {
        if self.scores.len() < weights::PLATEAU_SCORE_HISTORY {
            return false;
        }
        let tail = &self.scores[self.scores.len() - weights::PLATEAU_SCORE_HISTORY..];
        let first = tail[0];
        tail.iter().all(|s| (s - first).abs() < f64::EPSILON)
    }

    pub fn should_continue(&self, iteration: u32) -> bool {
        if iteration >= weights::ITERATIVE_OPTIMIZER_HARD_CAP {
            return false;
        }
        !self.is_stagnant() && !self.is_plateau()
    }
}

pub fn workload_imbalance_of(state: &ScheduleState, workers: &[Worker]) -> f64 {
    OptimizationMetrics::compute(state, workers).workload_imbalance
}

/// Day-of-week spread for a single worker, used by
/// `ScheduleBuilder::balance_weekday_distribution`.
pub fn weekday_spread(state: &ScheduleState, worker_id: &str) -> f64 {
    let Some(weekdays) = state.worker_weekdays.get(worker_id) else {
        return 0.0;
    };
    let values: Vec<f64> = weekdays.iter().map(|c| *c as f64).collect();
    stdev_of_ratio(values.into_iter())
}

pub fn holiday_ratio(state: &ScheduleState, worker_id: &str) -> f64 {
    let holidays = state
        .worker_holiday_counts
        .get(worker_id)
        .copied()
        .unwrap_or(0) as f64;
    let total = state.worker_shift_counts.get(worker_id).copied().unwrap_or(0).max(1) as f64;
    holidays / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScheduleConfig;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn config() -> ScheduleConfig {
        ScheduleConfig {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 14).unwrap(),
            num_shifts: 1,
            variable_shifts: vec![],
            holidays: BTreeSet::new(),
            gap_between_shifts: 2,
            max_consecutive_weekends: 2,
            weekend_tolerance: 1,
            enforce_7_14_pattern: true,
            max_improvement_loops: 70,
            last_post_adjustment_max_iterations: 20,
            max_checkpoints: 20,
        }
    }

    fn worker(id: &str, target: u32) -> Worker {
        Worker {
            id: id.to_string(),
            work_percentage: 100,
            target_shifts: target,
            mandatory_dates: BTreeSet::new(),
            days_off: BTreeSet::new(),
            work_periods: vec![],
            incompatible_with: BTreeSet::new(),
        }
    }

    #[test]
    fn perfect_coverage_scores_higher_than_empty_schedule() {
        let cfg = config();
        let workers = vec![worker("a", 7)];
        let mut full = ScheduleState::new(&cfg, &["a".to_string()]);
        for date in crate::date_utils::iter_dates(cfg.start_date, cfg.end_date) {
            full.assign(&"a".to_string(), date, 0);
        }
        let empty = ScheduleState::new(&cfg, &["a".to_string()]);

        let full_metrics = OptimizationMetrics::compute(&full, &workers);
        let empty_metrics = OptimizationMetrics::compute(&empty, &workers);
        assert!(full_metrics.score > empty_metrics.score);
    }

    #[test]
    fn score_history_detects_stagnation() {
        let mut history = ScoreHistory::default();
        history.record(10.0);
        history.record(10.0);
        history.record(10.0);
        history.record(10.0);
        assert!(history.is_stagnant());
    }

    #[test]
    fn score_history_resets_on_improvement() {
        let mut history = ScoreHistory::default();
        history.record(10.0);
        history.record(10.0);
        history.record(12.0);
        assert_eq!(history.stagnation_counter(), 0);
    }
}
