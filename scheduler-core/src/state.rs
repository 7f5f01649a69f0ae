//! Canonical mutable schedule state: the cell grid plus every derived
//! tracking structure, kept in sync on every mutation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate};

use crate::date_utils;
use crate::error::EvalFailure;
use crate::model::{ScheduleConfig, WorkerId};

/// One row per date, one slot per post index on that date.
pub type Grid = BTreeMap<NaiveDate, Vec<Option<WorkerId>>>;

#[derive(Debug, Clone)]
pub struct ScheduleState {
    pub schedule: Grid,
    pub worker_assignments: HashMap<WorkerId, BTreeSet<NaiveDate>>,
    pub worker_shift_counts: HashMap<WorkerId, u32>,
    pub worker_weekend_counts: HashMap<WorkerId, u32>,
    pub worker_holiday_counts: HashMap<WorkerId, u32>,
    pub worker_posts: HashMap<WorkerId, BTreeSet<usize>>,
    pub worker_post_counts: HashMap<WorkerId, HashMap<usize, u32>>,
    pub worker_weekdays: HashMap<WorkerId, [u32; 7]>,
    /// Sorted weekend-or-holiday assignment dates, per worker.
    pub worker_weekends: HashMap<WorkerId, Vec<NaiveDate>>,
    pub last_assignment_date: HashMap<WorkerId, NaiveDate>,
    pub locked_mandatory: BTreeSet<(WorkerId, NaiveDate)>,
    holidays: BTreeSet<NaiveDate>,
}

impl ScheduleState {
    pub fn new(config: &ScheduleConfig, worker_ids: &[WorkerId]) -> Self {
        let mut schedule = Grid::new();
        for date in date_utils::iter_dates(config.start_date, config.end_date) {
            let posts = config.posts_on(date) as usize;
            schedule.insert(date, vec![None; posts]);
        }

        let mut state = Self {
            schedule,
            worker_assignments: HashMap::new(),
            worker_shift_counts: HashMap::new(),
            worker_weekend_counts: HashMap::new(),
            worker_holiday_counts: HashMap::new(),
            worker_posts: HashMap::new(),
            worker_post_counts: HashMap::new(),
            worker_weekdays: HashMap::new(),
            worker_weekends: HashMap::new(),
            last_assignment_date: HashMap::new(),
            locked_mandatory: BTreeSet::new(),
            holidays: config.holidays.clone(),
        };

        for id in worker_ids {
            state.worker_assignments.entry(id.clone()).or_default();
            state.worker_shift_counts.entry(id.clone()).or_insert(0);
            state.worker_weekend_counts.entry(id.clone()).or_insert(0);
            state.worker_holiday_counts.entry(id.clone()).or_insert(0);
            state.worker_posts.entry(id.clone()).or_default();
            state.worker_post_counts.entry(id.clone()).or_default();
            state.worker_weekdays.entry(id.clone()).or_insert([0; 7]);
            state.worker_weekends.entry(id.clone()).or_default();
        }

        state
    }

    pub fn posts_on(&self, date: NaiveDate) -> usize {
        self.schedule.get(&date).map(|v| v.len()).unwrap_or(0)
    }

    pub fn occupant(&self, date: NaiveDate, post: usize) -> Option<&WorkerId> {
        self.schedule
            .get(&date)
            .and_then(|cells| cells.get(post))
            .and_then(|cell| cell.as_ref())
    }

    pub fn occupants_on(&self, date: NaiveDate) -> impl Iterator<Item = &WorkerId> {
        self.schedule
            .get(&date)
            .into_iter()
            .flat_map(|cells| cells.iter().filter_map(|c| c.as_ref()))
    }

    pub fn is_assigned_that_day(&self, worker_id: &str, date: NaiveDate) -> bool {
        self.worker_assignments
            .get(worker_id)
            .map(|dates| dates.contains(&date))
            .unwrap_or(false)
    }

    /// Places `worker_id` at `(date, post)` and updates every derived
    /// counter. Caller is responsible for having already checked the
    /// constraint evaluator.
    pub fn assign(&mut self, worker_id: &WorkerId, date: NaiveDate, post: usize) {
        if let Some(cells) = self.schedule.get_mut(&date) {
            if post < cells.len() {
                cells[post] = Some(worker_id.clone());
            }
        }

        self.worker_assignments
            .entry(worker_id.clone())
            .or_default()
            .insert(date);
        *self.worker_shift_counts.entry(worker_id.clone()).or_insert(0) += 1;
        self.worker_posts
            .entry(worker_id.clone())
            .or_default()
            .insert(post);
        *self
            .worker_post_counts
            .entry(worker_id.clone())
            .or_default()
            .entry(post)
            .or_insert(0) += 1;
        self.worker_weekdays.entry(worker_id.clone()).or_insert([0; 7])
            [date_utils::weekday_index(date) as usize] += 1;

        let entry = self.last_assignment_date.entry(worker_id.clone()).or_insert(date);
        if date > *entry {
            *entry = date;
        }

        if date_utils::is_holiday(date, &self.holidays) {
            *self.worker_holiday_counts.entry(worker_id.clone()).or_insert(0) += 1;
        }
        if date_utils::counts_as_weekend(date, &self.holidays) {
            *self.worker_weekend_counts.entry(worker_id.clone()).or_insert(0) += 1;
            let weekends = self.worker_weekends.entry(worker_id.clone()).or_default();
            weekends.push(date);
            weekends.sort();
        }
    }

    /// Removes the assignment at `(date, post)` unless it is a locked
    /// mandatory cell. Returns the worker that was removed, if any.
    pub fn unassign(
        &mut self,
        date: NaiveDate,
        post: usize,
    ) -> Result<Option<WorkerId>, EvalFailure> {
        let occupant = self.occupant(date, post).cloned();
        let Some(worker_id) = occupant else {
            return Ok(None);
        };

        if self.locked_mandatory.contains(&(worker_id.clone(), date)) {
            return Err(EvalFailure::LockedMandatory);
        }

        self.remove_cell(&worker_id, date, post);
        Ok(Some(worker_id))
    }

    /// Bypasses the lock check. Used only by mandatory-placement rollback
    /// paths that are reverting their own, not-yet-committed work.
    fn remove_cell(&mut self, worker_id: &WorkerId, date: NaiveDate, post: usize) {
        if let Some(cells) = self.schedule.get_mut(&date) {
            if post < cells.len() {
                cells[post] = None;
            }
        }

        if let Some(dates) = self.worker_assignments.get_mut(worker_id) {
            dates.remove(&date);
        }
        if let Some(count) = self.worker_shift_counts.get_mut(worker_id) {
            *count = count.saturating_sub(1);
        }
        if let Some(counts) = self.worker_post_counts.get_mut(worker_id) {
            if let Some(c) = counts.get_mut(&post) {
                *c = c.saturating_sub(1);
                if *c == 0 {
                    counts.remove(&post);
                }
            }
        }
        if let Some(posts) = self.worker_posts.get_mut(worker_id) {
            let still_used = self
                .worker_post_counts
                .get(worker_id)
                .map(|c| c.contains_key(&post))
                .unwrap_or(false);
            if !still_used {
                posts.remove(&post);
            }
        }
        if let Some(weekdays) = self.worker_weekdays.get_mut(worker_id) {
            let idx = date_utils::weekday_index(date) as usize;
            weekdays[idx] = weekdays[idx].saturating_sub(1);
        }
        if date_utils::is_holiday(date, &self.holidays) {
            if let Some(c) = self.worker_holiday_counts.get_mut(worker_id) {
                *c = c.saturating_sub(1);
            }
        }
        if date_utils::counts_as_weekend(date, &self.holidays) {
            if let Some(c) = self.worker_weekend_counts.get_mut(worker_id) {
                *c = c.saturating_sub(1);
            }
            if let Some(weekends) = self.worker_weekends.get_mut(worker_id) {
                weekends.retain(|d| *d != date);
            }
        }
        if let Some(dates) = self.worker_assignments.get(worker_id) {
            self.last_assignment_date
                .insert(worker_id.clone(), dates.iter().max().copied().unwrap_or(date));
        }
    }

    /// Forcibly removes a cell even if it is locked. Only ever used when
    /// rolling back a checkpoint, which restores a whole consistent state
    /// anyway.
    pub fn force_remove_cell(&mut self, worker_id: &WorkerId, date: NaiveDate, post: usize) {
        self.remove_cell(worker_id, date, post);
    }

    pub fn lock_mandatory(&mut self, worker_id: WorkerId, date: NaiveDate) {
        self.locked_mandatory.insert((worker_id, date));
    }

    pub fn is_locked(&self, worker_id: &str, date: NaiveDate) -> bool {
        self.locked_mandatory
            .iter()
            .any(|(w, d)| w == worker_id && *d == date)
    }

    pub fn empty_cell_count(&self) -> usize {
        self.schedule
            .values()
            .flat_map(|cells| cells.iter())
            .filter(|c| c.is_none())
            .count()
    }

    pub fn total_cell_count(&self) -> usize {
        self.schedule.values().map(|cells| cells.len()).sum()
    }

    pub fn get_all_assignments(&self) -> Vec<(WorkerId, NaiveDate, usize)> {
        let mut out = Vec::new();
        for (date, cells) in &self.schedule {
            for (post, cell) in cells.iter().enumerate() {
                if let Some(worker_id) = cell {
                    out.push((worker_id.clone(), *date, post));
                }
            }
        }
        out
    }

    /// Global week index used to detect consecutive weekends: any two
    /// weekend dates exactly 7 days apart land in adjacent indices.
    pub fn week_index(date: NaiveDate) -> i32 {
        date.num_days_from_ce() / 7
    }

    /// Longest run of consecutive week indices for `worker_id`'s existing
    /// weekend assignments plus a hypothetical `candidate_date`, measured as
    /// the run length that includes the candidate.
    pub fn consecutive_weekend_run_including(
        &self,
        worker_id: &str,
        candidate_date: NaiveDate,
    ) -> u32 {
        let mut indices: BTreeSet<i32> = self
            .worker_weekends
            .get(worker_id)
            .map(|dates| dates.iter().map(|d| Self::week_index(*d)).collect())
            .unwrap_or_default();
        let candidate_index = Self::week_index(candidate_date);
        indices.insert(candidate_index);

        let mut run = 1u32;
        let mut cursor = candidate_index;
        while indices.contains(&(cursor - 1)) {
            cursor -= 1;
            run += 1;
        }
        cursor = candidate_index;
        while indices.contains(&(cursor + 1)) {
            cursor += 1;
            run += 1;
        }
        run
    }

    /// Rebuilds every derived structure from the cell grid. The safety net
    /// any primitive that mutates cells directly must call before
    /// returning.
    pub fn synchronize_tracking_data(&mut self) {
        self.worker_assignments.values_mut().for_each(|s| s.clear());
        self.worker_shift_counts.values_mut().for_each(|c| *c = 0);
        self.worker_weekend_counts.values_mut().for_each(|c| *c = 0);
        self.worker_holiday_counts.values_mut().for_each(|c| *c = 0);
        self.worker_posts.values_mut().for_each(|s| s.clear());
        self.worker_post_counts.values_mut().for_each(|m| m.clear());
        self.worker_weekdays.values_mut().for_each(|w| *w = [0; 7]);
        self.worker_weekends.values_mut().for_each(|v| v.clear());
        self.last_assignment_date.clear();

        let assignments = self.get_all_assignments();
        for (worker_id, date, post) in assignments {
            self.worker_assignments
                .entry(worker_id.clone())
                .or_default()
                .insert(date);
            *self.worker_shift_counts.entry(worker_id.clone()).or_insert(0) += 1;
            self.worker_posts
                .entry(worker_id.clone())
                .or_default()
                .insert(post);
            *self
                .worker_post_counts
                .entry(worker_id.clone())
                .or_default()
                .entry(post)
                .or_insert(0) += 1;
            self.worker_weekdays.entry(worker_id.clone()).or_insert([0; 7])
                [date_utils::weekday_index(date) as usize] += 1;
            let entry = self.last_assignment_date.entry(worker_id.clone()).or_insert(date);
            if date > *entry {
                *entry = date;
            }
            if date_utils::is_holiday(date, &self.holidays) {
                *self.worker_holiday_counts.entry(worker_id.clone()).or_insert(0) += 1;
            }
            if date_utils::counts_as_weekend(date, &self.holidays) {
                *self.worker_weekend_counts.entry(worker_id.clone()).or_insert(0) += 1;
                self.worker_weekends.entry(worker_id.clone()).or_default().push(date);
            }
        }
        for weekends in self.worker_weekends.values_mut() {
            weekends.sort();
        }
    }

    /// Validates the invariants listed in the specification's data-model
    /// section. Intended for tests and the final-validation phase.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (date, cells) in &self.schedule {
            let mut seen = BTreeSet::new();
            for cell in cells {
                if let Some(worker_id) = cell {
                    if !seen.insert(worker_id) {
                        return Err(format!("worker {worker_id} double-booked on {date}"));
                    }
                }
            }
        }

        for (worker_id, count) in &self.worker_shift_counts {
            let actual = self
                .worker_assignments
                .get(worker_id)
                .map(|s| s.len())
                .unwrap_or(0);
            if actual as u32 != *count {
                return Err(format!(
                    "worker {worker_id} shift count {count} does not match {actual} assignments"
                ));
            }
        }

        for (worker_id, date) in &self.locked_mandatory {
            let holds = self
                .worker_assignments
                .get(worker_id)
                .map(|s| s.contains(date))
                .unwrap_or(false);
            if !holds {
                return Err(format!(
                    "locked mandatory assignment for {worker_id} on {date} is missing"
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn config() -> ScheduleConfig {
        ScheduleConfig {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 14).unwrap(),
            num_shifts: 2,
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
    fn assign_then_unassign_restores_counts() {
        let cfg = config();
        let ids = vec!["a".to_string()];
        let mut state = ScheduleState::new(&cfg, &ids);
        let date = cfg.start_date;

        state.assign(&"a".to_string(), date, 0);
        assert_eq!(state.worker_shift_counts["a"], 1);
        assert!(state.is_assigned_that_day("a", date));

        state.unassign(date, 0).unwrap();
        assert_eq!(state.worker_shift_counts["a"], 0);
        assert!(!state.is_assigned_that_day("a", date));
    }

    #[test]
    fn locked_mandatory_cell_cannot_be_unassigned() {
        let cfg = config();
        let ids = vec!["a".to_string()];
        let mut state = ScheduleState::new(&cfg, &ids);
        let date = cfg.start_date;

        state.assign(&"a".to_string(), date, 0);
        state.lock_mandatory("a".to_string(), date);

        assert!(state.unassign(date, 0).is_err());
    }

    #[test]
    fn consecutive_weekend_run_counts_adjacent_weeks() {
        let cfg = config();
        let ids = vec!["a".to_string()];
        let mut state = ScheduleState::new(&cfg, &ids);

        let saturday_week1 = NaiveDate::from_ymd_opt(2025, 1, 4).unwrap();
        let saturday_week2 = NaiveDate::from_ymd_opt(2025, 1, 11).unwrap();

        state.assign(&"a".to_string(), saturday_week1, 0);
        let run = state.consecutive_weekend_run_including("a", saturday_week2);
        assert_eq!(run, 2);
    }

    #[test]
    fn synchronize_tracking_data_rebuilds_from_grid() {
        let cfg = config();
        let ids = vec!["a".to_string()];
        let mut state = ScheduleState::new(&cfg, &ids);
        let date = cfg.start_date;

        // Mutate the grid directly, bypassing assign().
        state.schedule.get_mut(&date).unwrap()[0] = Some("a".to_string());
        state.synchronize_tracking_data();

        assert_eq!(state.worker_shift_counts["a"], 1);
        assert!(state.check_invariants().is_ok());
    }
}
