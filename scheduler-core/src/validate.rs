//! Configuration validation: malformed references, variable-shift overlap
//! precedence, and target/horizon consistency. Runs before phase 1; any
//! failure here is fatal.

use std::collections::HashMap;

use crate::date_utils;
use crate::error::SchedulerError;
use crate::model::{ScheduleConfig, Worker, WorkerId};

pub fn validate(config: &ScheduleConfig, workers: &[Worker]) -> Result<(), SchedulerError> {
    if config.end_date < config.start_date {
        return Err(SchedulerError::Configuration(
            "end_date precedes start_date".to_string(),
        ));
    }

    if config.num_shifts == 0 {
        return Err(SchedulerError::Configuration(
            "num_shifts must be at least 1".to_string(),
        ));
    }

    let known_ids: HashMap<&WorkerId, &Worker> = workers.iter().map(|w| (&w.id, w)).collect();

    for worker in workers {
        if !(1..=100).contains(&worker.work_percentage) {
            return Err(SchedulerError::Configuration(format!(
                "worker {} has invalid work_percentage {}",
                worker.id, worker.work_percentage
            )));
        }

        for other in &worker.incompatible_with {
            if !known_ids.contains_key(other) {
                return Err(SchedulerError::Configuration(format!(
                    "worker {} declares incompatibility with unknown worker {}",
                    worker.id, other
                )));
            }
        }

        let horizon_days = config.horizon_days().max(0) as u32;
        let max_posts_per_day = config.num_shifts.max(
            config
                .variable_shifts
                .iter()
                .map(|vs| vs.shifts)
                .max()
                .unwrap_or(0),
        );
        if worker.target_shifts > horizon_days.saturating_mul(max_posts_per_day) {
            return Err(SchedulerError::Configuration(format!(
                "worker {} target_shifts {} exceeds the horizon's total capacity",
                worker.id, worker.target_shifts
            )));
        }
    }

    validate_variable_shift_overlap(config)?;

    Ok(())
}

/// First-match-in-declaration-order wins; a later override naming a date
/// already covered by an earlier one is a configuration error.
fn validate_variable_shift_overlap(config: &ScheduleConfig) -> Result<(), SchedulerError> {
    let mut covered = std::collections::HashSet::new();
    for vs in &config.variable_shifts {
        for date in date_utils::iter_dates(vs.start_date, vs.end_date) {
            if !covered.insert(date) {
                return Err(SchedulerError::Configuration(format!(
                    "date {} is covered by more than one variable_shifts override",
                    date
                )));
            }
        }
    }
    Ok(())
}

/// Ensures `incompatible_with` is commutative: if A declares B, B must also
/// declare A, regardless of which direction the input data expressed it.
pub fn symmetrize_incompatibilities(workers: &mut [Worker]) {
    let pairs: Vec<(WorkerId, WorkerId)> = workers
        .iter()
        .flat_map(|w| {
            w.incompatible_with
                .iter()
                .map(move |other| (w.id.clone(), other.clone()))
        })
        .collect();

    for (a, b) in pairs {
        if let Some(worker) = workers.iter_mut().find(|w| w.id == b) {
            worker.incompatible_with.insert(a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn basic_config() -> ScheduleConfig {
        ScheduleConfig {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            num_shifts: 1,
            variable_shifts: vec![],
            holidays: Default::default(),
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
    fn rejects_unknown_incompatibility_reference() {
        let mut workers = vec![Worker {
            id: "a".into(),
            work_percentage: 100,
            target_shifts: 1,
            mandatory_dates: Default::default(),
            days_off: Default::default(),
            work_periods: vec![],
            incompatible_with: Default::default(),
        }];
        workers[0].incompatible_with.insert("ghost".into());
        assert!(validate(&basic_config(), &workers).is_err());
    }

    #[test]
    fn symmetrize_makes_relation_commutative() {
        let mut workers = vec![
            Worker {
                id: "a".into(),
                work_percentage: 100,
                target_shifts: 1,
                mandatory_dates: Default::default(),
                days_off: Default::default(),
                work_periods: vec![],
                incompatible_with: ["b".to_string()].into_iter().collect(),
            },
            Worker {
                id: "b".into(),
                work_percentage: 100,
                target_shifts: 1,
                mandatory_dates: Default::default(),
                days_off: Default::default(),
                work_periods: vec![],
                incompatible_with: Default::default(),
            },
        ];
        symmetrize_incompatibilities(&mut workers);
        assert!(workers[1].incompatible_with.contains("a"));
    }

    #[test]
    fn rejects_overlapping_variable_shifts() {
        let mut config = basic_config();
        config.variable_shifts = vec![
            crate::model::VariableShift {
                start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
                shifts: 2,
            },
            crate::model::VariableShift {
                start_date: NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 1, 4).unwrap(),
                shifts: 3,
            },
        ];
        assert!(validate(&config, &[]).is_err());
    }
}
