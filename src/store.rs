use crate::errors::{AppError, AppResult};
use crate::models::{ActivityEntry, Habit};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const HABITS_FILE: &str = "habits_data.json";
pub const ACTIVITY_FILE: &str = "activity_data.json";

/// Whole-collection persistence. Every save replaces the previous snapshot.
pub trait SnapshotStore: Send + Sync {
    fn load_habits(&self) -> AppResult<Vec<Habit>>;
    fn save_habits(&self, habits: &[Habit]) -> AppResult<()>;
    fn load_activity(&self) -> AppResult<Vec<ActivityEntry>>;
    fn save_activity(&self, activity: &[ActivityEntry]) -> AppResult<()>;
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    habits_path: PathBuf,
    activity_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            habits_path: data_dir.join(HABITS_FILE),
            activity_path: data_dir.join(ACTIVITY_FILE),
        }
    }

    pub fn habits_path(&self) -> &Path {
        &self.habits_path
    }

    pub fn activity_path(&self) -> &Path {
        &self.activity_path
    }
}

impl SnapshotStore for JsonFileStore {
    fn load_habits(&self) -> AppResult<Vec<Habit>> {
        let habits: Vec<Habit> = read_json_file_or_default(&self.habits_path)?;
        validate_habits(&habits)?;
        Ok(habits)
    }

    fn save_habits(&self, habits: &[Habit]) -> AppResult<()> {
        validate_habits(habits)?;
        write_json_file(&self.habits_path, &habits)?;
        tracing::debug!(path = %self.habits_path.display(), count = habits.len(), "habits snapshot written");
        Ok(())
    }

    fn load_activity(&self) -> AppResult<Vec<ActivityEntry>> {
        let mut activity: Vec<ActivityEntry> = read_json_file_or_default(&self.activity_path)?;
        if !is_most_recent_first(&activity) {
            tracing::warn!(
                path = %self.activity_path.display(),
                "activity log out of date order; re-sorting"
            );
            sort_most_recent_first(&mut activity);
        }
        Ok(activity)
    }

    fn save_activity(&self, activity: &[ActivityEntry]) -> AppResult<()> {
        write_json_file(&self.activity_path, &activity)?;
        tracing::debug!(path = %self.activity_path.display(), count = activity.len(), "activity snapshot written");
        Ok(())
    }
}

pub fn validate_habits(habits: &[Habit]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for habit in habits {
        habit.validate()?;
        if !seen.insert(habit.habit_id) {
            return Err(AppError::Config(format!(
                "duplicate habit_id {}",
                habit.habit_id
            )));
        }
    }
    Ok(())
}

pub fn is_most_recent_first(activity: &[ActivityEntry]) -> bool {
    activity.windows(2).all(|pair| pair[0].date >= pair[1].date)
}

/// Stable, so entries sharing a date keep their relative order.
pub fn sort_most_recent_first(activity: &mut [ActivityEntry]) {
    activity.sort_by(|a, b| b.date.cmp(&a.date));
}

fn read_json_file_or_default<T: DeserializeOwned + Default>(path: &Path) -> AppResult<T> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "snapshot missing; starting empty");
        return Ok(T::default());
    }
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let bytes = fs::read(path).map_err(|error| AppError::Io(error.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|error| {
        AppError::Io(format!("{} is not a valid snapshot: {}", path.display(), error))
    })
}

/// Writes to a sibling temp file and renames it over the target, so readers
/// see either the old snapshot or the new one.
fn write_json_file<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;

    let bytes = serde_json::to_vec_pretty(value)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| AppError::Io(format!("{} has no file name", path.display())))?;
    let temp_path = parent.join(format!(".{}.tmp", file_name));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(error) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(AppError::Io(format!(
            "failed to write {}: {}",
            path.display(),
            error
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_entry_date, WindowStat, WindowedStats};

    fn temp_root() -> tempfile::TempDir {
        tempfile::tempdir().expect("temp data dir")
    }

    fn habit(habit_id: u32, name: &str) -> Habit {
        Habit {
            habit_id,
            habit_name: name.to_string(),
            goal_period: 7,
            goal_target: 3,
            stats: WindowedStats::default(),
        }
    }

    fn entry(progress_id: u32, date: &str) -> ActivityEntry {
        ActivityEntry {
            progress_id,
            habit_id: 1,
            date: parse_entry_date(date).expect("date"),
            notes: format!("note {progress_id}"),
        }
    }

    #[test]
    fn missing_files_load_as_empty_collections() {
        let root = temp_root();
        let store = JsonFileStore::new(root.path());
        assert!(store.load_habits().expect("habits").is_empty());
        assert!(store.load_activity().expect("activity").is_empty());
    }

    #[test]
    fn snapshots_round_trip_content_and_order() {
        let root = temp_root();
        let store = JsonFileStore::new(root.path());

        let mut run = habit(2, "Run");
        run.stats.windows[1] = WindowStat {
            count: 1,
            attainment: 34,
        };
        let habits = vec![run, habit(1, "Read")];
        let activity = vec![
            entry(3, "2026-10-19"),
            entry(1, "2026-10-19"),
            entry(2, "2026-10-02"),
        ];

        store.save_habits(&habits).expect("save habits");
        store.save_activity(&activity).expect("save activity");

        assert_eq!(store.load_habits().expect("load habits"), habits);
        assert_eq!(store.load_activity().expect("load activity"), activity);
        assert!(!root.path().join(".activity_data.json.tmp").exists());
    }

    #[test]
    fn out_of_order_log_is_resorted_on_load() {
        let root = temp_root();
        let store = JsonFileStore::new(root.path());
        fs::write(
            store.activity_path(),
            r#"[
                {"progress_id": 1, "habit_id": 1, "date": "2026-10-01", "notes": ""},
                {"progress_id": 2, "habit_id": 1, "date": "2026-10-05", "notes": ""},
                {"progress_id": 3, "habit_id": 1, "date": "2026-10-01", "notes": ""}
            ]"#,
        )
        .expect("write activity");

        let ids: Vec<u32> = store
            .load_activity()
            .expect("load")
            .iter()
            .map(|entry| entry.progress_id)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn invalid_habit_data_is_rejected_at_load() {
        let root = temp_root();
        let store = JsonFileStore::new(root.path());
        fs::write(
            store.habits_path(),
            r#"[{"habit_id": 1, "habit_name": "Run", "goal_period": 7, "goal_target": 0}]"#,
        )
        .expect("write habits");
        let error = store.load_habits().expect_err("zero target");
        assert!(matches!(error, AppError::Config(_)));

        fs::write(
            store.habits_path(),
            r#"[
                {"habit_id": 1, "habit_name": "Run", "goal_period": 7, "goal_target": 3},
                {"habit_id": 1, "habit_name": "Read", "goal_period": 7, "goal_target": 3}
            ]"#,
        )
        .expect("write habits");
        let error = store.load_habits().expect_err("duplicate id");
        assert!(error.to_string().contains("duplicate habit_id 1"));

        fs::write(
            store.habits_path(),
            r#"[{"habit_id": 1, "habit_name": "all", "goal_period": 7, "goal_target": 3}]"#,
        )
        .expect("write habits");
        let error = store.load_habits().expect_err("reserved name");
        assert!(matches!(error, AppError::Config(_)));
    }

    #[test]
    fn structurally_invalid_snapshot_is_an_io_failure() {
        let root = temp_root();
        let store = JsonFileStore::new(root.path());
        fs::write(store.activity_path(), "{not json").expect("write garbage");
        let error = store.load_activity().expect_err("garbage");
        assert!(error.to_string().contains("IO_FAILURE"));
    }

    #[test]
    fn failed_activity_write_leaves_habits_untouched() {
        let root = temp_root();
        let store = JsonFileStore::new(root.path());
        let habits = vec![habit(1, "Run")];
        store.save_habits(&habits).expect("save habits");
        store
            .save_activity(&[entry(1, "2026-10-01")])
            .expect("save activity");

        // A directory squatting on the temp path makes the next write fail.
        fs::create_dir(root.path().join(".activity_data.json.tmp")).expect("block temp path");
        let result = store.save_activity(&[entry(2, "2026-10-02"), entry(1, "2026-10-01")]);
        assert!(result.is_err());

        assert_eq!(store.load_habits().expect("habits"), habits);
        assert_eq!(store.load_activity().expect("activity").len(), 1);
    }
}
