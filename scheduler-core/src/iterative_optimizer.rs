//! Drives repeated balance/weekend-redistribution cycles after the initial
//! fill, stopping on convergence, stagnation, a score plateau, or the hard
//! iteration cap. A distinct weekend-specific pass runs after the general
//! redistribution pass each cycle.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::backtracking::{BacktrackingManager, Phase};
use crate::builder::{ScheduleBuilder, WorkerOrderPolicy};
use crate::config as weights;
use crate::metrics::{OptimizationMetrics, ScoreHistory};
use crate::model::{ScheduleConfig, Worker, WorkerId};
use crate::prioritizer::{Operation, OperationPrioritizer};
use crate::state::ScheduleState;
use crate::tolerance_validator::{self, ToleranceTier};

pub struct IterativeOptimizer<'a> {
    pub workers: &'a HashMap<WorkerId, Worker>,
    pub config: &'a ScheduleConfig,
    pub seed: u64,
}

pub struct OptimizationOutcome {
    pub state: ScheduleState,
    pub iterations_run: u32,
    pub converged: bool,
}

impl<'a> IterativeOptimizer<'a> {
    pub fn new(workers: &'a HashMap<WorkerId, Worker>, config: &'a ScheduleConfig, seed: u64) -> Self {
        Self { workers, config, seed }
    }

    pub fn run(&self, mut state: ScheduleState) -> OptimizationOutcome {
        let builder = ScheduleBuilder::new(self.workers, self.config);
        let worker_list: Vec<Worker> = self.workers.values().cloned().collect();
        let mut history = ScoreHistory::default();
        let mut backtracking = BacktrackingManager::new(self.config.max_checkpoints);
        let mut prioritizer = OperationPrioritizer::new();
        let mut iteration = 0u32;
        let mut tick = 0u64;

        loop {
            let deviations_before = tolerance_validator::workers_outside_objective(&state, &worker_list);
            if deviations_before.is_empty() {
                return OptimizationOutcome {
                    state,
                    iterations_run: iteration,
                    converged: true,
                };
            }
            if !history.should_continue(iteration) {
                break;
            }

            let empty_cells = state.empty_cell_count();
            let any_over_phase1 = deviations_before
                .iter()
                .any(|d| d.deviation > 0.0 && d.tier != ToleranceTier::Objective);
            let weekend_imbalance_before = OptimizationMetrics::compute(&state, &worker_list).weekend_imbalance;

            for op in prioritizer.ranked_operations_for(
                empty_cells,
                any_over_phase1,
                weekend_imbalance_before,
                weights::PRIORITIZER_WEEKEND_IMBALANCE_THRESHOLD,
            ) {
                let changed = match op {
                    Operation::FillEmptyShift => {
                        builder.try_fill_empty_shifts(&mut state, &WorkerOrderPolicy::BalancedSequential, 0) > 0
                    }
                    Operation::SwapWithSurplusWorker => builder.balance_workloads(&mut state) > 0,
                    Operation::RelaxGap => {
                        builder.try_fill_empty_shifts(&mut state, &WorkerOrderPolicy::WorkloadPriority, 2) > 0
                    }
                    Operation::RelaxWeekendCap => self.redistribute_weekends(&builder, &mut state),
                };
                if changed {
                    prioritizer.record_success(op);
                } else {
                    prioritizer.record_failure(op);
                }
            }

            // Periodic no-cost safety net: re-derive every counter from the
            // grid in case a primitive mutated cells without going through
            // `assign`/`unassign`.
            if iteration % weights::CHECKPOINT_EVERY_K_ITERATIONS == 0 {
                state.synchronize_tracking_data();
            }

            if history.stagnation_counter() > 0 && iteration % weights::PERTURBATION_EVERY_N_ITERATIONS == 0 {
                self.perturb(&mut state, history.stagnation_counter());
                prioritizer.reset_cycle();
            }

            let metrics = OptimizationMetrics::compute(&state, &worker_list);
            history.record(metrics.score);

            let deviations_after = tolerance_validator::workers_outside_objective(&state, &worker_list);
            let improved = deviations_after.len() < deviations_before.len();
            let severely_imbalanced = metrics.workload_imbalance > 0.5;
            backtracking.record_cycle_outcome(improved, false, severely_imbalanced, !deviations_after.is_empty());

            tick += 1;
            if backtracking.should_create_checkpoint(iteration, metrics.score) {
                backtracking.create_checkpoint(Phase::ImprovementLoop, iteration, &state, &worker_list, tick);
            }

            if backtracking.detect_dead_end() {
                if let Some(restored) = backtracking.rollback() {
                    state = restored;
                }
            }

            iteration += 1;
        }

        OptimizationOutcome {
            state,
            iterations_run: iteration,
            converged: false,
        }
    }

    /// Weekend-specific redistribution, run after the general balance pass
    /// each cycle: finds workers over their weekend cap and workers with
    /// slack, and swaps a weekend assignment between them.
    fn redistribute_weekends(&self, builder: &ScheduleBuilder, state: &mut ScheduleState) -> bool {
        let mut worker_ids: Vec<&WorkerId> = self.workers.keys().collect();
        worker_ids.sort();

        let mut any_transfer = false;
        for donor_id in &worker_ids {
            let donor = &self.workers[*donor_id];
            let cap = crate::constraint_evaluator::max_weekend_shifts(donor, self.config);
            let current = state.worker_weekend_counts.get(*donor_id).copied().unwrap_or(0) as i64;
            if current <= cap {
                continue;
            }
            for recipient_id in &worker_ids {
                if recipient_id == donor_id {
                    continue;
                }
                if self.try_weekend_transfer(builder, state, donor_id, recipient_id) {
                    any_transfer = true;
                    break;
                }
            }
        }
        any_transfer
    }

    fn try_weekend_transfer(
        &self,
        _builder: &ScheduleBuilder,
        state: &mut ScheduleState,
        donor: &WorkerId,
        recipient: &WorkerId,
    ) -> bool {
        let Some(weekend_dates) = state.worker_weekends.get(donor).cloned() else {
            return false;
        };
        let recipient_worker = match self.workers.get(recipient) {
            Some(w) => w.clone(),
            None => return false,
        };
        let worker_list: Vec<Worker> = self.workers.values().cloned().collect();
        let validator = crate::balance_validator::BalanceValidator::default();

        for date in weekend_dates {
            if state.is_locked(donor, date) {
                continue;
            }
            if state.is_assigned_that_day(recipient, date) {
                continue;
            }
            let posts = state.posts_on(date);
            for post in 0..posts {
                if state.occupant(date, post) != Some(donor) {
                    continue;
                }
                if crate::constraint_evaluator::can_assign(
                    state,
                    &recipient_worker,
                    self.workers,
                    self.config,
                    date,
                    post,
                    1,
                    Some(donor),
                )
                .is_ok()
                    && validator.check_transfer_validity(state, &worker_list, donor, recipient)
                {
                    let _ = state.unassign(date, post);
                    state.assign(recipient, date, post);
                    return true;
                }
            }
        }
        false
    }

    /// Random perturbation scaled by the stagnation counter (capped at 5
    /// swaps): unassigns a handful of non-mandatory cells so the next
    /// balance pass has room to try a different arrangement.
    fn perturb(&self, state: &mut ScheduleState, stagnation_counter: u32) {
        let swap_count = stagnation_counter.min(weights::PERTURBATION_MAX_SWAPS);
        let mut rng = StdRng::seed_from_u64(self.seed ^ stagnation_counter as u64);

        let mut candidates: Vec<(chrono::NaiveDate, usize)> = Vec::new();
        for (date, cells) in &state.schedule {
            for (post, cell) in cells.iter().enumerate() {
                if let Some(worker_id) = cell {
                    if !state.is_locked(worker_id, *date) {
                        candidates.push((*date, post));
                    }
                }
            }
        }
        candidates.shuffle(&mut rng);

        for (date, post) in candidates.into_iter().take(swap_count as usize) {
            let _ = state.unassign(date, post);
        }

        let builder = ScheduleBuilder::new(self.workers, self.config);
        builder.try_fill_empty_shifts(state, &crate::builder::WorkerOrderPolicy::WorkloadPriority, 0);
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
            end_date: NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
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
    fn converges_when_already_within_tolerance() {
        let cfg = config();
        let workers: HashMap<WorkerId, Worker> = [("a".to_string(), worker("a", 0))].into_iter().collect();
        let state = ScheduleState::new(&cfg, &["a".to_string()]);

        let optimizer = IterativeOptimizer::new(&workers, &cfg, 7);
        let outcome = optimizer.run(state);
        assert!(outcome.converged);
        assert_eq!(outcome.iterations_run, 0);
    }

    #[test]
    fn stops_at_hard_cap_when_unsatisfiable() {
        let cfg = config();
        // Target far beyond what a single worker could ever reach within the
        // horizon, so the loop never converges and must hit the hard cap.
        let workers: HashMap<WorkerId, Worker> = [("a".to_string(), worker("a", 1000))].into_iter().collect();
        let state = ScheduleState::new(&cfg, &["a".to_string()]);

        let optimizer = IterativeOptimizer::new(&workers, &cfg, 7);
        let outcome = optimizer.run(state);
        assert!(!outcome.converged);
        assert!(outcome.iterations_run <= weights::ITERATIVE_OPTIMIZER_HARD_CAP);
    }
}
