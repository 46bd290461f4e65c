use crate::errors::{AppError, AppResult};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Number of goal periods tracked per habit, current window first.
pub const WINDOW_COUNT: usize = 4;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Display name used when an entry references a habit that no longer exists.
pub const UNKNOWN_HABIT: &str = "(unknown)";

/// Wire value of the "no filter" choice in the activity view.
pub const ALL_HABITS: &str = "all";

static ENTRY_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid entry date regex"));

/// Parses a calendar date in the single accepted `YYYY-MM-DD` form.
///
/// chrono alone would accept shorter or signed years, so the shape is checked
/// first.
pub fn parse_entry_date(raw: &str) -> AppResult<NaiveDate> {
    let trimmed = raw.trim();
    if !ENTRY_DATE_RE.is_match(trimmed) {
        return Err(AppError::Validation(format!(
            "Invalid date '{}': expected YYYY-MM-DD",
            raw
        )));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|error| AppError::Validation(format!("Invalid date '{}': {}", raw, error)))
}

pub fn format_entry_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

mod entry_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_entry_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_entry_date(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStat {
    pub count: u32,
    pub attainment: u32,
}

/// Cached per-window results for one habit. Never authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowedStats {
    pub windows: [WindowStat; WINDOW_COUNT],
}

impl WindowedStats {
    pub fn current(&self) -> WindowStat {
        self.windows[0]
    }

    pub fn counts(&self) -> [u32; WINDOW_COUNT] {
        self.windows.map(|window| window.count)
    }

    pub fn attainments(&self) -> [u32; WINDOW_COUNT] {
        self.windows.map(|window| window.attainment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub habit_id: u32,
    pub habit_name: String,
    /// Window length in days.
    pub goal_period: u32,
    /// Events per window needed for 100%.
    pub goal_target: u32,
    #[serde(default)]
    pub stats: WindowedStats,
}

impl Habit {
    pub fn validate(&self) -> AppResult<()> {
        if self.habit_id == 0 {
            return Err(AppError::Config(format!(
                "habit '{}' has habit_id 0; ids start at 1",
                self.habit_name
            )));
        }
        if self.goal_period == 0 {
            return Err(AppError::Config(format!(
                "habit {} has goal_period 0",
                self.habit_id
            )));
        }
        if self.goal_target == 0 {
            return Err(AppError::Config(format!(
                "habit {} has goal_target 0",
                self.habit_id
            )));
        }
        if self.habit_name.trim() == ALL_HABITS {
            return Err(AppError::Config(format!(
                "habit {} is named '{}', which the activity filter reserves",
                self.habit_id, ALL_HABITS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub progress_id: u32,
    pub habit_id: u32,
    #[serde(with = "entry_date")]
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: String,
}

/// Raw submission from a form or CLI, validated by `TrackerCore::log_activity`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogActivityPayload {
    pub habit_id: Option<u32>,
    pub date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogRow {
    #[serde(with = "entry_date")]
    pub date: NaiveDate,
    pub habit_name: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HabitFilter {
    All,
    Named(String),
}

impl HabitFilter {
    /// Missing, blank and `all` all mean no filter.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some(ALL_HABITS) => Self::All,
            Some(name) => Self::Named(name.to_string()),
        }
    }
}
