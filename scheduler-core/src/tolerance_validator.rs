//! Per-worker deviation from target and tier classification.

use crate::config as weights;
use crate::model::{Worker, WorkerId};
use crate::state::ScheduleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ToleranceTier {
    /// Within the objective ±8% band.
    Objective,
    /// Outside ±8% but within the ±10% phase-1 ceiling.
    Phase1,
    /// Outside ±10% but within the ±12% phase-2 absolute ceiling.
    Phase2,
    /// Beyond the absolute ceiling. Should never be reachable through the
    /// constraint evaluator; recorded defensively.
    Outside,
}

#[derive(Debug, Clone)]
pub struct WorkerDeviation {
    pub worker_id: WorkerId,
    pub target: u32,
    pub actual: u32,
    /// Signed fraction of target: positive means over target.
    pub deviation: f64,
    pub tier: ToleranceTier,
}

pub fn classify(target: u32, actual: u32) -> ToleranceTier {
    if target == 0 {
        return if actual == 0 {
            ToleranceTier::Objective
        } else {
            ToleranceTier::Outside
        };
    }
    let deviation = (actual as f64 - target as f64) / target as f64;
    let abs = deviation.abs();
    if abs <= weights::TOLERANCE_OBJECTIVE {
        ToleranceTier::Objective
    } else if abs <= weights::TOLERANCE_PHASE1_CEILING {
        ToleranceTier::Phase1
    } else if abs <= weights::TOLERANCE_PHASE2_CEILING {
        ToleranceTier::Phase2
    } else {
        ToleranceTier::Outside
    }
}

pub fn deviation_report(state: &ScheduleState, workers: &[Worker]) -> Vec<WorkerDeviation> {
    workers
        .iter()
        .map(|w| {
            let actual = state.worker_shift_counts.get(&w.id).copied().unwrap_or(0);
            let target = w.target_shifts;
            let deviation = if target == 0 {
                0.0
            } else {
                (actual as f64 - target as f64) / target as f64
            };
            WorkerDeviation {
                worker_id: w.id.clone(),
                target,
                actual,
                deviation,
                tier: classify(target, actual),
            }
        })
        .collect()
}

/// Workers strictly outside the objective ±8% band, used to seed the
/// iterative optimizer.
pub fn workers_outside_objective(state: &ScheduleState, workers: &[Worker]) -> Vec<WorkerDeviation> {
    deviation_report(state, workers)
        .into_iter()
        .filter(|d| d.tier != ToleranceTier::Objective)
        .collect()
}

pub fn workers_outside_phase2(state: &ScheduleState, workers: &[Worker]) -> Vec<WorkerDeviation> {
    deviation_report(state, workers)
        .into_iter()
        .filter(|d| matches!(d.tier, ToleranceTier::Outside))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_within_objective() {
        assert_eq!(classify(100, 104), ToleranceTier::Objective);
    }

    #[test]
    fn classifies_phase1() {
        assert_eq!(classify(100, 109), ToleranceTier::Phase1);
    }

    #[test]
    fn classifies_phase2() {
        assert_eq!(classify(100, 111), ToleranceTier::Phase2);
    }

    #[test]
    fn classifies_outside() {
        assert_eq!(classify(100, 120), ToleranceTier::Outside);
    }
}
