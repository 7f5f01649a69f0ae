//! Top-level phase orchestration: validate, place mandatory guards, run the
//! multi-attempt initial fill, run the improvement loop, run tolerance
//! optimization, then a final validation pass.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::builder::ScheduleBuilder;
use crate::config as weights;
use crate::error::{SchedulerError, SchedulerResult};
use crate::initial_distributor;
use crate::iterative_optimizer::IterativeOptimizer;
use crate::metrics::OptimizationMetrics;
use crate::model::{ScheduleConfig, Worker, WorkerId};
use crate::state::ScheduleState;
use crate::tolerance_validator;
use crate::validate;

#[derive(Debug, Clone)]
pub struct ScheduleResult {
    pub state: ScheduleState,
    pub iterations_run: u32,
    pub converged: bool,
    pub remaining_violations: usize,
}

pub struct SchedulerCore {
    pub config: ScheduleConfig,
    pub workers: HashMap<WorkerId, Worker>,
    pub seed: u64,
}

impl SchedulerCore {
    pub fn new(config: ScheduleConfig, mut workers: Vec<Worker>, seed: u64) -> SchedulerCore {
        validate::symmetrize_incompatibilities(&mut workers);
        let workers = workers.into_iter().map(|w| (w.id.clone(), w)).collect();
        SchedulerCore { config, workers, seed }
    }

    pub fn run(&self) -> SchedulerResult<ScheduleResult> {
        let worker_list: Vec<Worker> = self.workers.values().cloned().collect();
        validate::validate(&self.config, &worker_list)?;

        let worker_ids: Vec<WorkerId> = self.workers.keys().cloned().collect();
        let mut state = ScheduleState::new(&self.config, &worker_ids);

        info!(workers = worker_ids.len(), "placing mandatory guards");
        let builder = ScheduleBuilder::new(&self.workers, &self.config);
        builder.assign_mandatory_guards(&mut state)?;

        info!("running multi-attempt initial fill");
        let attempt = initial_distributor::distribute(&self.workers, &self.config, &state, self.seed);
        let mut state = attempt.state;

        info!(iterations = self.config.max_improvement_loops, "running improvement loop");
        let optimizer = IterativeOptimizer::new(&self.workers, &self.config, self.seed);
        let outcome = optimizer.run(state);
        state = outcome.state;

        info!("running finalization strict-balance loop");
        let mut best_state = state.clone();
        let mut best_score = OptimizationMetrics::compute(&best_state, &worker_list).score;
        let mut stable_rounds = 0;

        for _ in 0..weights::FINALIZATION_MAX_ITERATIONS {
            let swaps = builder.balance_workloads(&mut state);
            let weekday_changes = builder.balance_weekday_distribution(&mut state);
            let last_post_changes = builder.adjust_last_post_distribution(&mut state);

            let score = OptimizationMetrics::compute(&state, &worker_list).score;
            if score > best_score {
                best_score = score;
                best_state = state.clone();
            }

            if swaps == 0 && weekday_changes == 0 && last_post_changes == 0 {
                stable_rounds += 1;
                if stable_rounds >= weights::FINALIZATION_STABLE_ITERATIONS {
                    break;
                }
            } else {
                stable_rounds = 0;
            }
        }
        state = best_state;

        let remaining = tolerance_validator::workers_outside_objective(&state, &worker_list);
        if !remaining.is_empty() {
            warn!(
                count = remaining.len(),
                "schedule finalized with workers still outside the objective tolerance band"
            );
        }

        if let Err(msg) = state.check_invariants() {
            return Err(SchedulerError::Runtime(format!(
                "final validation failed: {msg}"
            )));
        }

        Ok(ScheduleResult {
            state,
            iterations_run: outcome.iterations_run,
            converged: outcome.converged,
            remaining_violations: remaining.len(),
        })
    }
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
    fn runs_end_to_end_smoke() {
        let cfg = config();
        let workers = vec![worker("a", 15), worker("b", 16)];
        let core = SchedulerCore::new(cfg, workers, 1);
        let result = core.run().expect("scheduling should succeed");
        assert!(result.state.check_invariants().is_ok());
    }

    #[test]
    fn infeasible_mandatory_layout_is_fatal() {
        let cfg = config();
        let date = cfg.start_date;
        let mut a = worker("a", 5);
        let mut b = worker("b", 5);
        a.mandatory_dates.insert(date);
        b.mandatory_dates.insert(date);
        a.incompatible_with.insert("b".to_string());
        b.incompatible_with.insert("a".to_string());

        let core = SchedulerCore::new(cfg, vec![a, b], 1);
        assert!(matches!(core.run(), Err(SchedulerError::InfeasibleMandatoryLayout(_))));
    }
}
