//! Pure predicate: can worker W take (date D, post P) given the current
//! state? Checks run in the order the specification lists them; the first
//! failure is returned.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};

use crate::config as weights;
use crate::date_utils;
use crate::error::EvalFailure;
use crate::model::{ScheduleConfig, Worker, WorkerId};
use crate::state::ScheduleState;

/// 0 = no relaxation, 1 = reserved for future tuning, 2 = emergency
/// relaxation (gap may shrink by one day for deficient workers; the
/// target ceiling moves from the phase-1 to the phase-2 bound). The 7/14
/// prohibition is never relaxed at any level.
pub type RelaxationLevel = u8;

/// `displacing` names the worker a swap primitive is tentatively evicting
/// from `(date, post)`. When set, a cell held by that worker is treated as
/// available (provided it isn't locked) instead of failing cell
/// availability, and that worker is excluded from the incompatibility check
/// on `date` since they are the one being removed. `None` is the ordinary,
/// non-swap evaluation.
pub fn can_assign(
    state: &ScheduleState,
    worker: &Worker,
    workers: &HashMap<WorkerId, Worker>,
    config: &ScheduleConfig,
    date: NaiveDate,
    post: usize,
    relaxation_level: RelaxationLevel,
    displacing: Option<&WorkerId>,
) -> Result<(), EvalFailure> {
    // 1. Cell availability.
    match state.occupant(date, post) {
        None => {}
        Some(occupant) => {
            let displaced_here = displacing.is_some_and(|d| d == occupant);
            if !displaced_here || state.is_locked(occupant, date) {
                return Err(EvalFailure::CellOccupied);
            }
        }
    }

    // 2. Worker-day uniqueness.
    if state.is_assigned_that_day(&worker.id, date) {
        return Err(EvalFailure::SameDayConflict);
    }

    // 3. Work period.
    if !worker.is_available_on(date) {
        return Err(EvalFailure::OutsideWorkPeriod);
    }

    // 4. Days off.
    if worker.days_off.contains(&date) {
        return Err(EvalFailure::DayOff);
    }

    // 5. Gap between shifts.
    let current_count = state.worker_shift_counts.get(&worker.id).copied().unwrap_or(0) as i64;
    let deficit = worker.target_shifts as i64 - current_count;
    let mut min_gap = config.gap_between_shifts;
    if relaxation_level >= 2 && deficit <= weights::GAP_RELAXATION_MIN_DEFICIT {
        min_gap = (min_gap - 1).max(weights::GAP_RELAXATION_MIN_DAYS);
    }
    if let Some(dates) = state.worker_assignments.get(&worker.id) {
        for other in dates {
            if date_utils::days_between(date, *other) < min_gap {
                return Err(EvalFailure::GapViolation);
            }
        }
    }

    // 6. 7/14 prohibition — inviolable at any relaxation level.
    if config.enforce_7_14_pattern {
        if let Some(dates) = state.worker_assignments.get(&worker.id) {
            for other in dates {
                let diff = date_utils::days_between(date, *other);
                if date.weekday() == other.weekday() && (diff == 7 || diff == 14) {
                    return Err(EvalFailure::Pattern7_14);
                }
            }
        }
    }

    // 7. Incompatibility. The worker being displaced (if any) is excluded:
    // they won't share the day with `worker` once the swap completes.
    for occupant_id in state.occupants_on(date) {
        if displacing.is_some_and(|d| d == occupant_id) {
            continue;
        }
        if worker.incompatible_with.contains(occupant_id) {
            return Err(EvalFailure::Incompatibility(occupant_id.clone()));
        }
        if let Some(occupant) = workers.get(occupant_id) {
            if occupant.incompatible_with.contains(&worker.id) {
                return Err(EvalFailure::Incompatibility(occupant_id.clone()));
            }
        }
    }

    // 8. Weekend cap.
    if date_utils::counts_as_weekend(date, &config.holidays) {
        let max_weekend = max_weekend_shifts(worker, config);
        let current_weekend = state
            .worker_weekend_counts
            .get(&worker.id)
            .copied()
            .unwrap_or(0) as i64;
        if current_weekend + 1 > max_weekend {
            return Err(EvalFailure::WeekendCap);
        }

        let run = state.consecutive_weekend_run_including(&worker.id, date);
        if run > config.max_consecutive_weekends {
            return Err(EvalFailure::ConsecutiveWeekendCap);
        }
    }

    // 9. Target ceiling.
    let ceiling_factor = if relaxation_level >= 2 {
        1.0 + weights::TOLERANCE_PHASE2_CEILING
    } else {
        1.0 + weights::TOLERANCE_PHASE1_CEILING
    };
    let ceiling = (worker.target_shifts as f64 * ceiling_factor).round() as i64;
    if current_count + 1 > ceiling {
        return Err(EvalFailure::OverTarget);
    }

    Ok(())
}

/// Derives a worker's weekend shift cap from their overall target and the
/// proportion of the horizon that falls on a weekend or holiday, widened by
/// `weekend_tolerance`. The specification names the inputs without fixing
/// the formula; this is the engine's chosen derivation (see DESIGN.md).
pub fn max_weekend_shifts(worker: &Worker, config: &ScheduleConfig) -> i64 {
    let total = date_utils::total_days(config.start_date, config.end_date).max(1) as f64;
    let weekend_days =
        date_utils::count_weekend_days(config.start_date, config.end_date, &config.holidays) as f64;
    let ratio = weekend_days / total;
    (worker.target_shifts as f64 * ratio).round() as i64 + config.weekend_tolerance as i64
}

/// Variant of `can_assign` that ignores the target-ceiling check, used when
/// placing mandatory assignments (which must never fail due to being over
/// target).
pub fn can_assign_mandatory(
    state: &ScheduleState,
    worker: &Worker,
    workers: &HashMap<WorkerId, Worker>,
    config: &ScheduleConfig,
    date: NaiveDate,
    post: usize,
) -> Result<(), EvalFailure> {
    match can_assign(state, worker, workers, config, date, post, 0, None) {
        Err(EvalFailure::OverTarget) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkPeriod;
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
    fn rejects_7_14_pattern_even_with_relaxation() {
        let cfg = config();
        let w = worker("a", 30);
        let ids = vec!["a".to_string()];
        let mut state = ScheduleState::new(&cfg, &ids);
        let day1 = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let day8 = day1 + chrono::Duration::days(7);
        state.assign(&"a".to_string(), day1, 0);

        let workers: HashMap<WorkerId, Worker> = [("a".to_string(), w.clone())].into_iter().collect();
        let result = can_assign(&state, &w, &workers, &cfg, day8, 0, 2, None);
        assert_eq!(result, Err(EvalFailure::Pattern7_14));
    }

    #[test]
    fn rejects_day_off() {
        let cfg = config();
        let mut w = worker("a", 10);
        let day = cfg.start_date;
        w.days_off.insert(day);
        let ids = vec!["a".to_string()];
        let state = ScheduleState::new(&cfg, &ids);
        let workers: HashMap<WorkerId, Worker> = [("a".to_string(), w.clone())].into_iter().collect();

        assert_eq!(
            can_assign(&state, &w, &workers, &cfg, day, 0, 0, None),
            Err(EvalFailure::DayOff)
        );
    }

    #[test]
    fn rejects_outside_work_period() {
        let cfg = config();
        let mut w = worker("a", 10);
        w.work_periods.push(WorkPeriod {
            start: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
        });
        let ids = vec!["a".to_string()];
        let state = ScheduleState::new(&cfg, &ids);
        let workers: HashMap<WorkerId, Worker> = [("a".to_string(), w.clone())].into_iter().collect();

        assert_eq!(
            can_assign(&state, &w, &workers, &cfg, cfg.start_date, 0, 0, None),
            Err(EvalFailure::OutsideWorkPeriod)
        );
    }

    #[test]
    fn incompatibility_blocks_co_assignment() {
        let cfg = config();
        let mut a = worker("a", 10);
        a.incompatible_with.insert("b".to_string());
        let b = worker("b", 10);
        let ids = vec!["a".to_string(), "b".to_string()];
        let mut state = ScheduleState::new(&cfg, &ids);
        let day = cfg.start_date;
        state.assign(&"b".to_string(), day, 0);

        let workers: HashMap<WorkerId, Worker> = [
            ("a".to_string(), a.clone()),
            ("b".to_string(), b.clone()),
        ]
        .into_iter()
        .collect();

        assert!(matches!(
            can_assign(&state, &a, &workers, &cfg, day, 1, 0, None),
            Err(EvalFailure::Incompatibility(_))
        ));
    }

    #[test]
    fn swap_mode_treats_displaced_workers_cell_as_available() {
        let cfg = config();
        let a = worker("a", 10);
        let b = worker("b", 10);
        let ids = vec!["a".to_string(), "b".to_string()];
        let mut state = ScheduleState::new(&cfg, &ids);
        let day = cfg.start_date;
        state.assign(&"a".to_string(), day, 0);

        let workers: HashMap<WorkerId, Worker> = [
            ("a".to_string(), a.clone()),
            ("b".to_string(), b.clone()),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            can_assign(&state, &a, &workers, &cfg, day, 0, 0, None),
            Err(EvalFailure::CellOccupied)
        );
        assert!(can_assign(&state, &b, &workers, &cfg, day, 0, 0, Some(&"a".to_string())).is_ok());
    }

    #[test]
    fn swap_mode_still_rejects_a_locked_mandatory_cell() {
        let cfg = config();
        let a = worker("a", 10);
        let b = worker("b", 10);
        let ids = vec!["a".to_string(), "b".to_string()];
        let mut state = ScheduleState::new(&cfg, &ids);
        let day = cfg.start_date;
        state.assign(&"a".to_string(), day, 0);
        state.lock_mandatory("a".to_string(), day);

        let workers: HashMap<WorkerId, Worker> = [
            ("a".to_string(), a.clone()),
            ("b".to_string(), b.clone()),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            can_assign(&state, &b, &workers, &cfg, day, 0, 0, Some(&"a".to_string())),
            Err(EvalFailure::CellOccupied)
        );
    }
}
