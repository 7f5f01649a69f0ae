//! Checkpointing and dead-end detection. Checkpoints hold a full deep copy
//! of the schedule state; the specification's structural-sharing suggestion
//! is not implemented (see DESIGN.md).

use crate::config as weights;
use crate::metrics::OptimizationMetrics;
use crate::model::Worker;
use crate::state::ScheduleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    MandatoryPlacement,
    InitialFill,
    ImprovementLoop,
    ToleranceOptimization,
}

#[derive(Debug, Clone)]
pub struct ScheduleCheckpoint {
    pub phase: Phase,
    pub iteration: u32,
    pub score: f64,
    pub state: ScheduleState,
    pub timestamp: u64,
    pub sequence: u64,
    pub tolerance_violations: usize,
    pub workload_imbalance: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeadEndCounters {
    no_improvement_cycles: u32,
    constraint_violations: u32,
    severe_imbalance_cycles: u32,
    persistent_tolerance_iterations: u32,
}

pub struct BacktrackingManager {
    checkpoints: Vec<ScheduleCheckpoint>,
    max_checkpoints: usize,
    sequence_counter: u64,
    counters: DeadEndCounters,
}

impl Default for BacktrackingManager {
    fn default() -> Self {
        Self {
            checkpoints: Vec::new(),
            max_checkpoints: weights::DEFAULT_MAX_CHECKPOINTS,
            sequence_counter: 0,
            counters: DeadEndCounters::default(),
        }
    }
}

impl BacktrackingManager {
    pub fn new(max_checkpoints: usize) -> Self {
        Self {
            checkpoints: Vec::new(),
            max_checkpoints,
            sequence_counter: 0,
            counters: DeadEndCounters::default(),
        }
    }

    /// `timestamp` is supplied by the caller (a monotonically increasing
    /// tick), never read from the system clock, so checkpoint ordering stays
    /// deterministic.
    pub fn create_checkpoint(
        &mut self,
        phase: Phase,
        iteration: u32,
        state: &ScheduleState,
        workers: &[Worker],
        timestamp: u64,
    ) {
        let metrics = OptimizationMetrics::compute(state, workers);
        self.sequence_counter += 1;
        self.checkpoints.push(ScheduleCheckpoint {
            phase,
            iteration,
            score: metrics.score,
            state: state.clone(),
            timestamp,
            sequence: self.sequence_counter,
            tolerance_violations: metrics.tolerance_violations,
            workload_imbalance: metrics.workload_imbalance,
        });
        if self.checkpoints.len() > self.max_checkpoints {
            self.checkpoints.remove(0);
        }
    }

    /// Whether a checkpoint is due: every `CHECKPOINT_EVERY_K_ITERATIONS`
    /// iterations, or any iteration whose score improved on the previous
    /// checkpoint by more than `CHECKPOINT_SCORE_IMPROVEMENT_THRESHOLD`
    /// (relative).
    pub fn should_create_checkpoint(&self, iteration: u32, current_score: f64) -> bool {
        if iteration % weights::CHECKPOINT_EVERY_K_ITERATIONS == 0 {
            return true;
        }
        match self.checkpoints.last() {
            None => true,
            Some(last) => {
                let denom = last.score.abs().max(1.0);
                (current_score - last.score) / denom > weights::CHECKPOINT_SCORE_IMPROVEMENT_THRESHOLD
            }
        }
    }

    pub fn record_cycle_outcome(&mut self, improved: bool, had_violation: bool, severely_imbalanced: bool, tolerance_still_violated: bool) {
        self.counters.no_improvement_cycles = if improved { 0 } else { self.counters.no_improvement_cycles + 1 };
        self.counters.constraint_violations = if had_violation { self.counters.constraint_violations + 1 } else { 0 };
        self.counters.severe_imbalance_cycles = if severely_imbalanced { self.counters.severe_imbalance_cycles + 1 } else { 0 };
        self.counters.persistent_tolerance_iterations = if tolerance_still_violated {
            self.counters.persistent_tolerance_iterations + 1
        } else {
            0
        };
    }

    /// Any one of the four dead-end conditions tripping is enough to stop
    /// forward progress and roll back.
    pub fn detect_dead_end(&self) -> bool {
        self.counters.no_improvement_cycles >= weights::DEAD_END_NO_IMPROVEMENT_CYCLES
            || self.counters.constraint_violations >= weights::DEAD_END_CONSTRAINT_VIOLATIONS
            || self.counters.severe_imbalance_cycles >= weights::DEAD_END_SEVERE_IMBALANCE_CYCLES
            || self.counters.persistent_tolerance_iterations
                >= weights::DEAD_END_PERSISTENT_TOLERANCE_ITERATIONS
    }

    /// Ranks checkpoints by score, with a recency bonus and penalties for
    /// tolerance violations, empty cells, and workload imbalance recorded at
    /// snapshot time, then returns the best. Mirrors `find_best_rollback_point`.
    pub fn find_best_rollback_point(&self) -> Option<&ScheduleCheckpoint> {
        self.checkpoints.iter().max_by(|a, b| {
            let score_a = self.rollback_score(a);
            let score_b = self.rollback_score(b);
            score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    fn rollback_score(&self, checkpoint: &ScheduleCheckpoint) -> f64 {
        let recency = checkpoint.sequence as f64 * weights::ROLLBACK_RECENCY_BONUS;
        let violation_penalty =
            checkpoint.tolerance_violations as f64 * weights::ROLLBACK_VIOLATION_WEIGHT;
        let empty_penalty = checkpoint.state.empty_cell_count() as f64 * weights::ROLLBACK_EMPTY_WEIGHT;
        let imbalance_penalty = checkpoint.workload_imbalance * weights::ROLLBACK_IMBALANCE_WEIGHT;
        checkpoint.score + recency - violation_penalty - empty_penalty - imbalance_penalty
    }

    /// Returns a clone of the best rollback point's state, and resets the
    /// dead-end counters since rolling back escapes the stuck region.
    pub fn rollback(&mut self) -> Option<ScheduleState> {
        let best = self.find_best_rollback_point()?.state.clone();
        self.counters = DeadEndCounters::default();
        Some(best)
    }

    pub fn get_statistics(&self) -> BacktrackingStatistics {
        BacktrackingStatistics {
            checkpoint_count: self.checkpoints.len(),
            best_score: self.checkpoints.iter().map(|c| c.score).fold(f64::MIN, f64::max),
            counters: self.counters,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BacktrackingStatistics {
    pub checkpoint_count: usize,
    pub best_score: f64,
    pub counters: DeadEndCounters,
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

    #[test]
    fn checkpoints_are_bounded_by_max() {
        let cfg = config();
        let ids = vec!["a".to_string()];
        let state = ScheduleState::new(&cfg, &ids);
        let workers = vec![Worker {
            id: "a".into(),
            work_percentage: 100,
            target_shifts: 5,
            mandatory_dates: BTreeSet::new(),
            days_off: BTreeSet::new(),
            work_periods: vec![],
            incompatible_with: BTreeSet::new(),
        }];

        let mut manager = BacktrackingManager::new(2);
        for i in 0..5 {
            manager.create_checkpoint(Phase::ImprovementLoop, i, &state, &workers, i as u64);
        }
        assert_eq!(manager.get_statistics().checkpoint_count, 2);
    }

    #[test]
    fn detects_dead_end_after_repeated_no_improvement() {
        let mut manager = BacktrackingManager::default();
        for _ in 0..weights::DEAD_END_NO_IMPROVEMENT_CYCLES {
            manager.record_cycle_outcome(false, false, false, false);
        }
        assert!(manager.detect_dead_end());
    }

    #[test]
    fn rollback_clears_counters() {
        let cfg = config();
        let ids = vec!["a".to_string()];
        let state = ScheduleState::new(&cfg, &ids);
        let workers = vec![Worker {
            id: "a".into(),
            work_percentage: 100,
            target_shifts: 5,
            mandatory_dates: BTreeSet::new(),
            days_off: BTreeSet::new(),
            work_periods: vec![],
            incompatible_with: BTreeSet::new(),
        }];
        let mut manager = BacktrackingManager::default();
        manager.create_checkpoint(Phase::ImprovementLoop, 0, &state, &workers, 0);
        manager.record_cycle_outcome(false, false, false, false);
        assert!(manager.rollback().is_some());
        assert_eq!(manager.get_statistics().counters.no_improvement_cycles, 0);
    }
}
