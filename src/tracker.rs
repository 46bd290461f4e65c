use crate::attainment::recompute_habits;
use crate::errors::{AppError, AppResult};
use crate::models::{
    parse_entry_date, ActivityEntry, ActivityLogRow, Habit, HabitFilter, LogActivityPayload, UNKNOWN_HABIT,
};
use crate::store::SnapshotStore;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

pub type Today = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Read-modify-write operations over the two snapshots.
///
/// Not isolated: two overlapping callers each load, mutate and overwrite.
/// The HTTP layer serialises access with a single lock.
#[derive(Clone)]
pub struct TrackerCore {
    store: Arc<dyn SnapshotStore>,
    today: Today,
}

impl TrackerCore {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_clock(store, Arc::new(|| chrono::Local::now().date_naive()))
    }

    pub fn with_clock(store: Arc<dyn SnapshotStore>, today: Today) -> Self {
        Self { store, today }
    }

    pub fn today(&self) -> NaiveDate {
        (self.today)()
    }

    pub fn habits(&self) -> AppResult<Vec<Habit>> {
        self.store.load_habits()
    }

    pub fn log_activity(&self, payload: LogActivityPayload) -> AppResult<ActivityEntry> {
        let habit_id = payload
            .habit_id
            .ok_or_else(|| AppError::Validation("habit_id is required".to_string()))?;
        let raw_date = payload
            .date
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::Validation("date is required".to_string()))?;
        let date = parse_entry_date(raw_date)?;
        let notes = payload.notes.unwrap_or_default().trim().to_string();

        let mut habits = self.store.load_habits()?;
        if !habits.iter().any(|habit| habit.habit_id == habit_id) {
            return Err(AppError::NotFound(format!("No habit with id {}", habit_id)));
        }

        let mut activity = self.store.load_activity()?;
        let entry = ActivityEntry {
            progress_id: next_progress_id(&activity),
            habit_id,
            date,
            notes,
        };
        let position = insert_entry(&mut activity, entry.clone());
        self.store.save_activity(&activity)?;
        tracing::info!(
            progress_id = entry.progress_id,
            habit_id,
            date = %entry.date,
            position,
            "activity logged"
        );

        recompute_habits(&mut habits, &activity, self.today())?;
        self.store.save_habits(&habits)?;
        Ok(entry)
    }

    pub fn recompute_all(&self) -> AppResult<Vec<Habit>> {
        let mut habits = self.store.load_habits()?;
        let activity = self.store.load_activity()?;
        let today = self.today();
        recompute_habits(&mut habits, &activity, today)?;
        self.store.save_habits(&habits)?;
        tracing::info!(habits = habits.len(), entries = activity.len(), %today, "attainment recomputed");
        Ok(habits)
    }

    pub fn activity_log(&self, filter: &HabitFilter) -> AppResult<Vec<ActivityLogRow>> {
        let habits = self.store.load_habits()?;
        let activity = self.store.load_activity()?;
        Ok(filter_log(&activity, &habits, filter))
    }
}

/// One past the highest id in use; `len + 1` for a log that never lost entries.
pub fn next_progress_id(activity: &[ActivityEntry]) -> u32 {
    activity
        .iter()
        .map(|entry| entry.progress_id)
        .max()
        .unwrap_or(0)
        .saturating_add(1)
}

/// Inserts ahead of the first entry dated on or before the new one, keeping
/// the log most recent first. Same-date entries end up newest-logged first.
/// Returns the insertion index.
pub fn insert_entry(activity: &mut Vec<ActivityEntry>, entry: ActivityEntry) -> usize {
    let position = activity.partition_point(|existing| existing.date > entry.date);
    activity.insert(position, entry);
    position
}

pub fn filter_log(activity: &[ActivityEntry], habits: &[Habit], filter: &HabitFilter) -> Vec<ActivityLogRow> {
    let names: HashMap<u32, &str> = habits
        .iter()
        .map(|habit| (habit.habit_id, habit.habit_name.as_str()))
        .collect();

    activity
        .iter()
        .map(|entry| ActivityLogRow {
            date: entry.date,
            habit_name: names
                .get(&entry.habit_id)
                .copied()
                .unwrap_or(UNKNOWN_HABIT)
                .to_string(),
            notes: entry.notes.clone(),
        })
        .filter(|row| match filter {
            HabitFilter::All => true,
            HabitFilter::Named(name) => row.habit_name.trim() == name.as_str(),
        })
        .collect()
}
