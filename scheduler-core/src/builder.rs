//! Fills and repairs a schedule: mandatory placement, empty-cell filling,
//! workload/weekday balancing and the two-cycle swap protocol. This is the
//! workhorse the initial distributor and the iterative optimizer both call
//! into.

use std::collections::HashMap;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config as weights;
use crate::constraint_evaluator::{self, RelaxationLevel};
use crate::date_utils;
use crate::error::SchedulerError;
use crate::model::{ScheduleConfig, Worker, WorkerId};
use crate::state::ScheduleState;

/// Closed set of worker iteration orders used when scanning candidates for
/// an empty cell. `Random` is seeded so a given seed always produces the
/// same ordering.
#[derive(Debug, Clone)]
pub enum WorkerOrderPolicy {
    BalancedSequential,
    SequentialById,
    ReverseSequential,
    Random(u64),
    WorkloadPriority,
    Alternating,
}

pub struct ScheduleBuilder<'a> {
    pub workers: &'a HashMap<WorkerId, Worker>,
    pub config: &'a ScheduleConfig,
}

impl<'a> ScheduleBuilder<'a> {
    pub fn new(workers: &'a HashMap<WorkerId, Worker>, config: &'a ScheduleConfig) -> Self {
        Self { workers, config }
    }

    /// Orders `worker_ids` according to `policy`. `state` supplies current
    /// counts for the workload-aware policies.
    pub fn order_workers(
        &self,
        policy: &WorkerOrderPolicy,
        worker_ids: &[WorkerId],
        state: &ScheduleState,
    ) -> Vec<WorkerId> {
        let mut ordered = worker_ids.to_vec();
        match policy {
            WorkerOrderPolicy::BalancedSequential => {
                ordered.sort_by_key(|id| {
                    state.worker_shift_counts.get(id).copied().unwrap_or(0)
                });
            }
            WorkerOrderPolicy::SequentialById => {
                ordered.sort();
            }
            WorkerOrderPolicy::ReverseSequential => {
                ordered.sort();
                ordered.reverse();
            }
            WorkerOrderPolicy::Random(seed) => {
                let mut rng = StdRng::seed_from_u64(*seed);
                ordered.shuffle(&mut rng);
            }
            WorkerOrderPolicy::WorkloadPriority => {
                ordered.sort_by(|a, b| {
                    let deficit_a = self.deficit(a, state);
                    let deficit_b = self.deficit(b, state);
                    deficit_b
                        .partial_cmp(&deficit_a)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            WorkerOrderPolicy::Alternating => {
                ordered.sort();
                let (evens, odds): (Vec<_>, Vec<_>) = ordered
                    .into_iter()
                    .enumerate()
                    .partition(|(i, _)| i % 2 == 0);
                ordered = evens
                    .into_iter()
                    .map(|(_, id)| id)
                    .chain(odds.into_iter().map(|(_, id)| id))
                    .collect();
            }
        }
        ordered
    }

    fn deficit(&self, worker_id: &WorkerId, state: &ScheduleState) -> f64 {
        let Some(worker) = self.workers.get(worker_id) else {
            return 0.0;
        };
        let actual = state.worker_shift_counts.get(worker_id).copied().unwrap_or(0) as f64;
        worker.target_shifts as f64 - actual
    }

    /// Scores how desirable it is to place `worker_id` on `date`. Higher is
    /// better. Tiered deficit bonus dominates, then base eligibility, then
    /// balance and recency adjustments.
    pub fn score_candidate(&self, worker_id: &WorkerId, state: &ScheduleState, date: NaiveDate) -> f64 {
        let Some(worker) = self.workers.get(worker_id) else {
            return f64::MIN;
        };
        let actual = state.worker_shift_counts.get(worker_id).copied().unwrap_or(0) as i64;
        let deficit = worker.target_shifts as i64 - actual;

        let mut score = weights::SCORE_BASE;
        if deficit >= weights::CRITICAL_DEFICIT_THRESHOLD {
            score += weights::SCORE_CRITICAL_DEFICIT;
        } else if deficit >= weights::MODERATE_DEFICIT_THRESHOLD {
            score += weights::SCORE_MODERATE_DEFICIT;
        } else if deficit >= weights::MINOR_DEFICIT_THRESHOLD {
            score += weights::SCORE_MINOR_DEFICIT;
        } else if deficit < 0 {
            score -= weights::SCORE_EXCESS_PENALTY * (-deficit) as f64;
        }

        // Favor the post this worker has used least, to spread post
        // assignments evenly.
        let post = self.config.posts_on(date).max(1) as usize;
        if let Some(post_counts) = state.worker_post_counts.get(worker_id) {
            let max_used = post_counts.values().copied().max().unwrap_or(0);
            let min_used = (0..post).map(|p| post_counts.get(&p).copied().unwrap_or(0)).min().unwrap_or(0);
            if max_used == min_used {
                score += weights::SCORE_POST_BALANCE_BONUS;
            }
        } else {
            score += weights::SCORE_POST_BALANCE_BONUS;
        }

        // Favor workers whose weekday distribution would stay flat.
        if let Some(weekdays) = state.worker_weekdays.get(worker_id) {
            let idx = date_utils::weekday_index(date) as usize;
            let max = weekdays.iter().copied().max().unwrap_or(0);
            if weekdays[idx] < max {
                score += weights::SCORE_WEEKDAY_BALANCE_BONUS;
            }
        }

        // Penalize workers assigned very recently, spreading gaps further.
        if let Some(last) = state.last_assignment_date.get(worker_id) {
            let gap = date_utils::days_between(date, *last);
            score -= weights::SCORE_RECENCY_PENALTY_PER_DAY / (gap.max(1) as f64);
        }

        score
    }

    /// Places every worker's mandatory dates, locking the cell so later
    /// phases cannot evict it. A mandatory date that cannot be placed at all
    /// (cell already mandatory-locked for someone else, or a hard
    /// availability conflict) is a fatal configuration failure.
    pub fn assign_mandatory_guards(&self, state: &mut ScheduleState) -> Result<(), SchedulerError> {
        let mut worker_ids: Vec<&WorkerId> = self.workers.keys().collect();
        worker_ids.sort();

        for worker_id in worker_ids {
            let worker = &self.workers[worker_id];
            for &date in &worker.mandatory_dates {
                let posts = state.posts_on(date);
                let mut placed = false;
                for post in 0..posts {
                    if constraint_evaluator::can_assign_mandatory(
                        state,
                        worker,
                        self.workers,
                        self.config,
                        date,
                        post,
                    )
                    .is_ok()
                    {
                        state.assign(worker_id, date, post);
                        state.lock_mandatory(worker_id.clone(), date);
                        placed = true;
                        break;
                    }
                }
                if !placed {
                    return Err(SchedulerError::InfeasibleMandatoryLayout(format!(
                        "worker {worker_id} cannot be placed on mandatory date {date}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Scans every empty cell in date order and fills it with the
    /// best-scoring eligible candidate under `relaxation_level`. Returns the
    /// number of cells filled.
    pub fn try_fill_empty_shifts(
        &self,
        state: &mut ScheduleState,
        policy: &WorkerOrderPolicy,
        relaxation_level: RelaxationLevel,
    ) -> usize {
        let mut filled = 0;
        let dates: Vec<NaiveDate> = state.schedule.keys().copied().collect();
        let mut worker_ids: Vec<WorkerId> = self.workers.keys().cloned().collect();
        worker_ids.sort();

        for date in dates {
            let posts = state.posts_on(date);
            for post in 0..posts {
                if state.occupant(date, post).is_some() {
                    continue;
                }
                let ordered = self.order_workers(policy, &worker_ids, state);
                let mut best: Option<(WorkerId, f64)> = None;
                for worker_id in &ordered {
                    let worker = &self.workers[worker_id];
                    if constraint_evaluator::can_assign(
                        state,
                        worker,
                        self.workers,
                        self.config,
                        date,
                        post,
                        relaxation_level,
                        None,
                    )
                    .is_err()
                    {
                        continue;
                    }
                    let score = self.score_candidate(worker_id, state, date);
                    if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                        best = Some((worker_id.clone(), score));
                    }
                }
                if let Some((worker_id, _)) = best {
                    state.assign(&worker_id, date, post);
                    filled += 1;
                }
            }
        }
        filled
    }

    /// Two-cycle swap: for a worker over target and a worker under target,
    /// find a pair of dates where swapping their assignments keeps every
    /// constraint satisfied and moves both closer to their targets.
    /// Returns the number of swaps performed.
    pub fn balance_workloads(&self, state: &mut ScheduleState) -> usize {
        let mut swaps = 0;
        loop {
            let deviations = crate::tolerance_validator::deviation_report(
                state,
                &self.workers.values().cloned().collect::<Vec<_>>(),
            );
            let mut over: Vec<_> = deviations.iter().filter(|d| d.deviation > 0.0).collect();
            let mut under: Vec<_> = deviations.iter().filter(|d| d.deviation < 0.0).collect();
            over.sort_by(|a, b| b.deviation.partial_cmp(&a.deviation).unwrap());
            under.sort_by(|a, b| a.deviation.partial_cmp(&b.deviation).unwrap());

            let mut performed_this_round = false;
            'pairs: for o in &over {
                for u in &under {
                    if self.try_swap(state, &o.worker_id, &u.worker_id) {
                        swaps += 1;
                        performed_this_round = true;
                        break 'pairs;
                    }
                }
            }
            if !performed_this_round {
                break;
            }
        }
        swaps
    }

    /// Attempts to move one shift from `donor` to `recipient` by finding a
    /// donor date where the recipient is free and eligible, and the donor is
    /// not locked there. A candidate is only accepted if the balance
    /// validator confirms the transfer doesn't push the donor's deviation
    /// from within-tolerance to outside while the recipient overshoots past
    /// the opposite direction (§4.2.3's swap acceptance rule).
    fn try_swap(&self, state: &mut ScheduleState, donor: &WorkerId, recipient: &WorkerId) -> bool {
        let Some(donor_dates) = state.worker_assignments.get(donor).cloned() else {
            return false;
        };
        let recipient_worker = match self.workers.get(recipient) {
            Some(w) => w.clone(),
            None => return false,
        };
        let worker_list: Vec<Worker> = self.workers.values().cloned().collect();
        let validator = crate::balance_validator::BalanceValidator::default();

        for date in donor_dates {
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
                if constraint_evaluator::can_assign(
                    state,
                    &recipient_worker,
                    self.workers,
                    self.config,
                    date,
                    post,
                    0,
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

    /// Redistributes weekday assignments within each worker's own load by
    /// swapping a pair of that worker's dates with another worker's dates,
    /// chosen to reduce both workers' weekday spread without changing either
    /// worker's total count.
    pub fn balance_weekday_distribution(&self, state: &mut ScheduleState) -> usize {
        let mut changes = 0;
        let mut worker_ids: Vec<WorkerId> = self.workers.keys().cloned().collect();
        worker_ids.sort();

        for i in 0..worker_ids.len() {
            for j in (i + 1)..worker_ids.len() {
                let a = &worker_ids[i];
                let b = &worker_ids[j];
                let spread_before = crate::metrics::weekday_spread(state, a)
                    + crate::metrics::weekday_spread(state, b);
                if self.try_weekday_swap(state, a, b) {
                    let spread_after = crate::metrics::weekday_spread(state, a)
                        + crate::metrics::weekday_spread(state, b);
                    if spread_after < spread_before {
                        changes += 1;
                    }
                }
            }
        }
        changes
    }

    fn try_weekday_swap(&self, state: &mut ScheduleState, a: &WorkerId, b: &WorkerId) -> bool {
        let Some(a_dates) = state.worker_assignments.get(a).cloned() else {
            return false;
        };
        let Some(b_dates) = state.worker_assignments.get(b).cloned() else {
            return false;
        };
        let worker_a = match self.workers.get(a) {
            Some(w) => w.clone(),
            None => return false,
        };
        let worker_b = match self.workers.get(b) {
            Some(w) => w.clone(),
            None => return false,
        };

        for &date_a in &a_dates {
            if state.is_locked(a, date_a) {
                continue;
            }
            for &date_b in &b_dates {
                if state.is_locked(b, date_b) {
                    continue;
                }
                if date_a == date_b {
                    continue;
                }
                if state.is_assigned_that_day(b, date_a) || state.is_assigned_that_day(a, date_b) {
                    continue;
                }
                let post_a = match (0..state.posts_on(date_a)).find(|p| state.occupant(date_a, *p) == Some(a)) {
                    Some(p) => p,
                    None => continue,
                };
                let post_b = match (0..state.posts_on(date_b)).find(|p| state.occupant(date_b, *p) == Some(b)) {
                    Some(p) => p,
                    None => continue,
                };

                let b_ok = constraint_evaluator::can_assign(
                    state, &worker_b, self.workers, self.config, date_a, post_a, 0, Some(a),
                )
                .is_ok();
                let a_ok = constraint_evaluator::can_assign(
                    state, &worker_a, self.workers, self.config, date_b, post_b, 0, Some(b),
                )
                .is_ok();
                if b_ok && a_ok {
                    let _ = state.unassign(date_a, post_a);
                    let _ = state.unassign(date_b, post_b);
                    state.assign(b, date_a, post_a);
                    state.assign(a, date_b, post_b);
                    return true;
                }
            }
        }
        false
    }

    /// Final polish pass: when the last post index of each day is
    /// systematically held by the same small set of workers, swap to spread
    /// it, bounded by `config.last_post_adjustment_max_iterations`.
    pub fn adjust_last_post_distribution(&self, state: &mut ScheduleState) -> usize {
        let mut adjustments = 0;
        let mut worker_ids: Vec<WorkerId> = self.workers.keys().cloned().collect();
        worker_ids.sort();

        for _ in 0..self.config.last_post_adjustment_max_iterations {
            let dates: Vec<NaiveDate> = state.schedule.keys().copied().collect();
            let mut made_change = false;
            for date in dates {
                let posts = state.posts_on(date);
                if posts == 0 {
                    continue;
                }
                let last_post = posts as usize - 1;
                let Some(current) = state.occupant(date, last_post).cloned() else {
                    continue;
                };
                let current_last_count = state
                    .worker_post_counts
                    .get(&current)
                    .and_then(|m| m.get(&last_post))
                    .copied()
                    .unwrap_or(0);

                for candidate in &worker_ids {
                    if *candidate == current {
                        continue;
                    }
                    let candidate_last_count = state
                        .worker_post_counts
                        .get(candidate)
                        .and_then(|m| m.get(&last_post))
                        .copied()
                        .unwrap_or(0);
                    if candidate_last_count >= current_last_count {
                        continue;
                    }
                    if state.is_locked(&current, date) {
                        continue;
                    }
                    if state.is_assigned_that_day(candidate, date) {
                        continue;
                    }
                    let candidate_worker = match self.workers.get(candidate) {
                        Some(w) => w.clone(),
                        None => continue,
                    };
                    if constraint_evaluator::can_assign(
                        state,
                        &candidate_worker,
                        self.workers,
                        self.config,
                        date,
                        last_post,
                        0,
                        Some(&current),
                    )
                    .is_ok()
                    {
                        let _ = state.unassign(date, last_post);
                        state.assign(candidate, date, last_post);
                        adjustments += 1;
                        made_change = true;
                        break;
                    }
                }
            }
            if !made_change {
                break;
            }
        }
        adjustments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn mandatory_guard_locks_cell() {
        let cfg = config();
        let mut w = worker("a", 5);
        let date = cfg.start_date;
        w.mandatory_dates.insert(date);
        let workers: HashMap<WorkerId, Worker> = [("a".to_string(), w)].into_iter().collect();
        let mut state = ScheduleState::new(&cfg, &["a".to_string()]);

        let builder = ScheduleBuilder::new(&workers, &cfg);
        builder.assign_mandatory_guards(&mut state).unwrap();

        assert!(state.is_locked("a", date));
        assert_eq!(state.occupant(date, 0), Some(&"a".to_string()));
    }

    #[test]
    fn mandatory_conflict_is_fatal() {
        let cfg = config();
        let date = cfg.start_date;
        let mut a = worker("a", 5);
        a.mandatory_dates.insert(date);
        let mut b = worker("b", 5);
        b.mandatory_dates.insert(date);
        a.incompatible_with.insert("b".to_string());
        b.incompatible_with.insert("a".to_string());

        let workers: HashMap<WorkerId, Worker> =
            [("a".to_string(), a), ("b".to_string(), b)].into_iter().collect();
        let mut state = ScheduleState::new(&cfg, &["a".to_string(), "b".to_string()]);

        let builder = ScheduleBuilder::new(&workers, &cfg);
        assert!(builder.assign_mandatory_guards(&mut state).is_err());
    }

    #[test]
    fn swap_rejected_when_it_would_push_donor_past_phase_one() {
        let cfg = config();
        let workers: HashMap<WorkerId, Worker> = [
            ("a".to_string(), worker("a", 10)),
            ("b".to_string(), worker("b", 10)),
        ]
        .into_iter()
        .collect();
        let ids = vec!["a".to_string(), "b".to_string()];
        let mut state = ScheduleState::new(&cfg, &ids);

        // "a" sits at the phase-1 ceiling already (9/10); donating one more
        // shift away would drop it to 8/10, outside the ceiling.
        for day in 0..9 {
            let date = cfg.start_date + chrono::Duration::days(day * 2);
            state.assign(&"a".to_string(), date, 0);
        }

        let builder = ScheduleBuilder::new(&workers, &cfg);
        assert!(!builder.try_swap(&mut state, &"a".to_string(), &"b".to_string()));
    }

    #[test]
    fn fills_empty_shifts_preferring_deficient_workers() {
        let cfg = config();
        let workers: HashMap<WorkerId, Worker> = [
            ("a".to_string(), worker("a", 20)),
            ("b".to_string(), worker("b", 1)),
        ]
        .into_iter()
        .collect();
        let ids = vec!["a".to_string(), "b".to_string()];
        let mut state = ScheduleState::new(&cfg, &ids);

        let builder = ScheduleBuilder::new(&workers, &cfg);
        let filled = builder.try_fill_empty_shifts(&mut state, &WorkerOrderPolicy::SequentialById, 0);
        assert!(filled > 0);
        assert!(state.worker_shift_counts["a"] >= state.worker_shift_counts["b"]);
    }
}
