//! Global balance check, rebalancing recommendations and transfer legality.

use crate::model::Worker;
use crate::state::ScheduleState;
use crate::tolerance_validator::{self, ToleranceTier, WorkerDeviation};

pub struct BalanceValidator {
    pub tolerance_percentage: f64,
}

impl Default for BalanceValidator {
    fn default() -> Self {
        Self {
            tolerance_percentage: crate::config::TOLERANCE_OBJECTIVE * 100.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BalanceReport {
    pub balanced: bool,
    pub violators: Vec<WorkerDeviation>,
}

#[derive(Debug, Clone)]
pub struct TransferRecommendation {
    pub from: String,
    pub to: String,
    pub suggested_count: u32,
    pub deviation_reduction: f64,
}

impl BalanceValidator {
    pub fn new(tolerance_percentage: f64) -> Self {
        Self { tolerance_percentage }
    }

    pub fn validate_schedule_balance(&self, state: &ScheduleState, workers: &[Worker]) -> BalanceReport {
        let deviations = tolerance_validator::deviation_report(state, workers);
        let violators: Vec<WorkerDeviation> = deviations
            .into_iter()
            .filter(|d| d.deviation.abs() * 100.0 > self.tolerance_percentage)
            .collect();
        BalanceReport {
            balanced: violators.is_empty(),
            violators,
        }
    }

    /// Ranked suggestions, largest deviation-reduction first, per
    /// `balance_validator.py`'s ordering.
    pub fn get_rebalancing_recommendations(
        &self,
        state: &ScheduleState,
        workers: &[Worker],
    ) -> Vec<TransferRecommendation> {
        let deviations = tolerance_validator::deviation_report(state, workers);
        let mut over: Vec<&WorkerDeviation> = deviations
            .iter()
            .filter(|d| d.deviation > 0.0 && d.tier != ToleranceTier::Objective)
            .collect();
        let mut under: Vec<&WorkerDeviation> = deviations
            .iter()
            .filter(|d| d.deviation < 0.0 && d.tier != ToleranceTier::Objective)
            .collect();
        over.sort_by(|a, b| b.deviation.partial_cmp(&a.deviation).unwrap());
        under.sort_by(|a, b| a.deviation.partial_cmp(&b.deviation).unwrap());

        let mut recommendations = Vec::new();
        for o in &over {
            for u in &under {
                let reduction = o.deviation.abs() + u.deviation.abs();
                recommendations.push(TransferRecommendation {
                    from: o.worker_id.clone(),
                    to: u.worker_id.clone(),
                    suggested_count: 1,
                    deviation_reduction: reduction,
                });
            }
        }
        recommendations.sort_by(|a, b| {
            b.deviation_reduction
                .partial_cmp(&a.deviation_reduction)
                .unwrap()
        });
        recommendations
    }

    /// Three-part legality check for moving one shift from `from_id` to
    /// `to_id`, restored from `balance_validator.check_transfer_validity`:
    /// the donor must not drop below zero, the donor's deviation must not
    /// cross from within-tolerance to outside, and the recipient must not
    /// overshoot past the target in the opposite direction.
    pub fn check_transfer_validity(
        &self,
        state: &ScheduleState,
        workers: &[Worker],
        from_id: &str,
        to_id: &str,
    ) -> bool {
        let from = match workers.iter().find(|w| w.id == from_id) {
            Some(w) => w,
            None => return false,
        };
        let to = match workers.iter().find(|w| w.id == to_id) {
            Some(w) => w,
            None => return false,
        };

        let from_count = state.worker_shift_counts.get(from_id).copied().unwrap_or(0);
        if from_count == 0 {
            return false;
        }

        let from_before = tolerance_validator::classify(from.target_shifts, from_count);
        let from_after = tolerance_validator::classify(from.target_shifts, from_count - 1);
        if from_before <= ToleranceTier::Phase1 && from_after > ToleranceTier::Phase1 {
            return false;
        }

        let to_count = state.worker_shift_counts.get(to_id).copied().unwrap_or(0);
        let to_after_tier = tolerance_validator::classify(to.target_shifts, to_count + 1);
        if to_count + 1 > to.target_shifts && to_after_tier > ToleranceTier::Phase1 {
            return false;
        }

        true
    }
}
