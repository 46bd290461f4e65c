//! Rolling-window goal attainment.
//!
//! Windows are bucketed by entry age in whole days relative to `today`:
//! window 1 covers ages `0..=P`, window k covers `(k-1)P < age <= kP`.
//! Anything older than `4P`, or dated after `today`, counts nowhere.

use crate::errors::{AppError, AppResult};
use crate::models::{ActivityEntry, Habit, WindowStat, WindowedStats, WINDOW_COUNT};
use chrono::NaiveDate;

/// Counts matching entries per window and derives attainment percentages.
///
/// `activity` must be sorted most recent first; iteration stops at the first
/// entry past the lookback, which gives the same answer as a full scan.
pub fn compute(habit: &Habit, activity: &[ActivityEntry], today: NaiveDate) -> AppResult<WindowedStats> {
    if habit.goal_target == 0 || habit.goal_period == 0 {
        return Err(AppError::Validation(format!(
            "habit {} needs goal_period and goal_target of at least 1",
            habit.habit_id
        )));
    }

    let period = i64::from(habit.goal_period);
    let lookback = period * WINDOW_COUNT as i64;
    let mut counts = [0u32; WINDOW_COUNT];

    for entry in activity {
        let age = (today - entry.date).num_days();
        if age > lookback {
            break;
        }
        if entry.habit_id != habit.habit_id || age < 0 {
            continue;
        }
        counts[window_index(age, period)] += 1;
    }

    let mut stats = WindowedStats::default();
    for (slot, count) in stats.windows.iter_mut().zip(counts) {
        *slot = WindowStat {
            count,
            attainment: attainment_percent(count, habit.goal_target),
        };
    }
    Ok(stats)
}

/// `ceil(count / target * 100)`; one of three is 34, not 33.
pub fn attainment_percent(count: u32, target: u32) -> u32 {
    debug_assert!(target > 0, "goal_target must be positive");
    let scaled = u64::from(count) * 100;
    let target = u64::from(target);
    let percent = (scaled + target - 1) / target;
    u32::try_from(percent).unwrap_or(u32::MAX)
}

/// Overwrites every habit's cached stats against the same log and date.
pub fn recompute_habits(habits: &mut [Habit], activity: &[ActivityEntry], today: NaiveDate) -> AppResult<()> {
    for habit in habits.iter_mut() {
        habit.stats = compute(habit, activity, today)?;
    }
    Ok(())
}

fn window_index(age: i64, period: i64) -> usize {
    if age <= period {
        return 0;
    }
    // ceil(age / period) - 1 for age > period
    (((age - 1) / period) as usize).min(WINDOW_COUNT - 1)
}
