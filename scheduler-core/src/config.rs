//! Named configuration constants for scoring weights and thresholds.
//!
//! Kept as constants rather than inline magic numbers so the test suite in
//! the specification's testable-properties section can pin them.

/// Tolerance tiers, expressed as fractions of `target_shifts`.
pub const TOLERANCE_OBJECTIVE: f64 = 0.08;
pub const TOLERANCE_PHASE1_CEILING: f64 = 0.10;
pub const TOLERANCE_PHASE2_CEILING: f64 = 0.12;

/// Scoring weights (`ScheduleBuilder::worker_score`).
pub const SCORE_CRITICAL_DEFICIT: f64 = 25_000.0;
pub const SCORE_MODERATE_DEFICIT: f64 = 15_000.0;
pub const SCORE_MINOR_DEFICIT: f64 = 5_000.0;
pub const SCORE_BASE: f64 = 1_000.0;
pub const SCORE_EXCESS_PENALTY: f64 = 100.0;
pub const SCORE_POST_BALANCE_BONUS: f64 = 200.0;
pub const SCORE_WEEKDAY_BALANCE_BONUS: f64 = 150.0;
pub const SCORE_RECENCY_PENALTY_PER_DAY: f64 = 5.0;

pub const CRITICAL_DEFICIT_THRESHOLD: i64 = 5;
pub const MODERATE_DEFICIT_THRESHOLD: i64 = 3;
pub const MINOR_DEFICIT_THRESHOLD: i64 = 1;

/// Gap relaxation: at relaxation level >= 2, the minimum gap may shrink by
/// one day, but never below 1, and only once a worker's current shift
/// count is within `GAP_RELAXATION_MIN_DEFICIT` of target (i.e. they're
/// close to done, not far behind).
pub const GAP_RELAXATION_MIN_DEFICIT: i64 = 3;
pub const GAP_RELAXATION_MIN_DAYS: i64 = 1;

/// `InitialDistributor` attempt counts, chosen by complexity score
/// (workers * horizon_days * posts_per_day).
pub const ATTEMPT_COUNTS: [usize; 4] = [3, 5, 7, 10];
pub const COMPLEXITY_SMALL: u64 = 2_000;
pub const COMPLEXITY_MEDIUM: u64 = 20_000;
pub const COMPLEXITY_LARGE: u64 = 100_000;

pub const INITIAL_FILL_ITERATION_BUDGET: u32 = 4;

/// Finalization strict-balance loop: runs the redistribution primitives
/// (`balance_workloads`, `balance_weekday_distribution`,
/// `adjust_last_post_distribution`) repeatedly until three consecutive
/// iterations make no change, or this many iterations have run.
pub const FINALIZATION_MAX_ITERATIONS: u32 = 15;
pub const FINALIZATION_STABLE_ITERATIONS: u32 = 3;

/// `IterativeOptimizer` stopping conditions.
pub const STAGNATION_CYCLES: u32 = 3;
pub const PLATEAU_SCORE_HISTORY: usize = 3;
pub const ITERATIVE_OPTIMIZER_HARD_CAP: u32 = 40;
pub const PERTURBATION_EVERY_N_ITERATIONS: u32 = 3;
pub const PERTURBATION_MAX_SWAPS: u32 = 5;

/// `OperationPrioritizer` weekend-imbalance threshold: above this, the
/// weekend-cap relaxation operation jumps to the front of the ranking.
pub const PRIORITIZER_WEEKEND_IMBALANCE_THRESHOLD: f64 = 0.2;

/// `BacktrackingManager` thresholds (`detect_dead_end`), restored from
/// `backtracking_manager.py`'s defaults.
pub const DEAD_END_NO_IMPROVEMENT_CYCLES: u32 = 5;
pub const DEAD_END_CONSTRAINT_VIOLATIONS: u32 = 10;
pub const DEAD_END_SEVERE_IMBALANCE_CYCLES: u32 = 8;
pub const DEAD_END_PERSISTENT_TOLERANCE_ITERATIONS: u32 = 3;
pub const DEFAULT_MAX_CHECKPOINTS: usize = 20;
pub const CHECKPOINT_SCORE_IMPROVEMENT_THRESHOLD: f64 = 0.05;
pub const CHECKPOINT_EVERY_K_ITERATIONS: u32 = 5;

/// Rollback scoring weights (`find_best_rollback_point`).
pub const ROLLBACK_RECENCY_BONUS: f64 = 10.0;
pub const ROLLBACK_VIOLATION_WEIGHT: f64 = 50.0;
pub const ROLLBACK_EMPTY_WEIGHT: f64 = 20.0;
pub const ROLLBACK_IMBALANCE_WEIGHT: f64 = 100.0;

/// `OptimizationMetrics::overall_score` weights.
pub const METRIC_COVERAGE_WEIGHT: f64 = 100.0;
pub const METRIC_EMPTY_CELL_WEIGHT: f64 = 50.0;
pub const METRIC_WORKLOAD_IMBALANCE_WEIGHT: f64 = 300.0;
pub const METRIC_WEEKEND_IMBALANCE_WEIGHT: f64 = 200.0;
pub const METRIC_TOLERANCE_VIOLATION_WEIGHT: f64 = 500.0;
