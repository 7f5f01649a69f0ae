//! Multi-attempt initial fill: try several worker orderings, each seeded
//! differently, and keep whichever attempt scores best.

use std::collections::HashMap;

use crate::builder::{ScheduleBuilder, WorkerOrderPolicy};
use crate::config as weights;
use crate::metrics::OptimizationMetrics;
use crate::model::{ScheduleConfig, Worker, WorkerId};
use crate::state::ScheduleState;

/// Chooses an attempt count from `ATTEMPT_COUNTS`, scaled by the size of the
/// problem (workers * horizon days * max posts per day), mirroring
/// `InitialDistributor._select_distribution_strategy`.
pub fn attempt_count(workers: &HashMap<WorkerId, Worker>, config: &ScheduleConfig) -> usize {
    let horizon = config.horizon_days().max(1) as u64;
    let max_posts = config
        .variable_shifts
        .iter()
        .map(|vs| vs.shifts as u64)
        .max()
        .unwrap_or(config.num_shifts as u64)
        .max(config.num_shifts as u64);
    let complexity = workers.len() as u64 * horizon * max_posts;

    if complexity <= weights::COMPLEXITY_SMALL {
        weights::ATTEMPT_COUNTS[0]
    } else if complexity <= weights::COMPLEXITY_MEDIUM {
        weights::ATTEMPT_COUNTS[1]
    } else if complexity <= weights::COMPLEXITY_LARGE {
        weights::ATTEMPT_COUNTS[2]
    } else {
        weights::ATTEMPT_COUNTS[3]
    }
}

pub struct AttemptResult {
    pub state: ScheduleState,
    pub metrics: OptimizationMetrics,
    pub policy_used: WorkerOrderPolicy,
}

/// Runs `attempt_count` independent fill attempts over `mandatory_state` (a
/// state that already has mandatory guards locked in) and returns the
/// best-scoring one. Ties break on fewer empty cells, then lower workload
/// imbalance.
pub fn distribute(
    workers: &HashMap<WorkerId, Worker>,
    config: &ScheduleConfig,
    mandatory_state: &ScheduleState,
    base_seed: u64,
) -> AttemptResult {
    let n = attempt_count(workers, config);
    let policies = rotation_for(n, base_seed);
    let worker_list: Vec<Worker> = workers.values().cloned().collect();

    let mut best: Option<AttemptResult> = None;
    for (attempt_num, policy) in policies.into_iter().enumerate() {
        let mut state = mandatory_state.clone();
        let builder = ScheduleBuilder::new(workers, config);
        builder.try_fill_empty_shifts(&mut state, &policy, 0);
        for budget in 0..weights::INITIAL_FILL_ITERATION_BUDGET {
            let relaxation = if budget >= weights::INITIAL_FILL_ITERATION_BUDGET - 1 { 2 } else { 0 };
            let filled = builder.try_fill_empty_shifts(&mut state, &policy, relaxation);
            if filled == 0 {
                break;
            }
        }
        let metrics = OptimizationMetrics::compute(&state, &worker_list);

        let is_better = match &best {
            None => true,
            Some(current) => is_strictly_better(&metrics, &current.metrics),
        };
        if is_better {
            best = Some(AttemptResult {
                state,
                metrics,
                policy_used: policy,
            });
        }
        let _ = attempt_num;
    }

    best.unwrap_or_else(|| {
        let state = mandatory_state.clone();
        let metrics = OptimizationMetrics::compute(&state, &worker_list);
        AttemptResult {
            state,
            metrics,
            policy_used: WorkerOrderPolicy::SequentialById,
        }
    })
}

fn is_strictly_better(candidate: &OptimizationMetrics, current: &OptimizationMetrics) -> bool {
    if candidate.score != current.score {
        return candidate.score > current.score;
    }
    if candidate.empty_cells != current.empty_cells {
        return candidate.empty_cells < current.empty_cells;
    }
    candidate.workload_imbalance < current.workload_imbalance
}

/// Each attempt cycles through the closed set of policies, seeded by
/// `base_seed + attempt_num` for the random policy so a given configuration
/// reproduces deterministically.
fn rotation_for(n: usize, base_seed: u64) -> Vec<WorkerOrderPolicy> {
    let pool = [
        WorkerOrderPolicy::BalancedSequential,
        WorkerOrderPolicy::WorkloadPriority,
        WorkerOrderPolicy::Alternating,
        WorkerOrderPolicy::SequentialById,
        WorkerOrderPolicy::ReverseSequential,
    ];
    (0..n)
        .map(|attempt_num| {
            if attempt_num % 3 == 2 {
                WorkerOrderPolicy::Random(base_seed + attempt_num as u64)
            } else {
                pool[attempt_num % pool.len()].clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

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

    fn config() -> ScheduleConfig {
        ScheduleConfig {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
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
    fn small_problem_uses_fewest_attempts() {
        let cfg = config();
        let workers: HashMap<WorkerId, Worker> = [("a".to_string(), worker("a", 5))].into_iter().collect();
        assert_eq!(attempt_count(&workers, &cfg), weights::ATTEMPT_COUNTS[0]);
    }

    #[test]
    fn distribute_fills_cells_and_picks_a_result() {
        let cfg = config();
        let workers: HashMap<WorkerId, Worker> = [
            ("a".to_string(), worker("a", 15)),
            ("b".to_string(), worker("b", 16)),
        ]
        .into_iter()
        .collect();
        let ids: Vec<WorkerId> = workers.keys().cloned().collect();
        let state = ScheduleState::new(&cfg, &ids);

        let result = distribute(&workers, &cfg, &state, 42);
        assert!(result.metrics.empty_cells < state.empty_cell_count());
    }
}
