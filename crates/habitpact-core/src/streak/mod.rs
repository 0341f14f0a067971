//! Streak records and the pure helpers over them.
//!
//! All gap arithmetic is calendar-day math on `NaiveDate`; clock time never
//! enters the decision tables. The stateful transitions live in [`engine`].

mod engine;

pub use engine::{StreakChange, StreakEngine, StreakUpdate};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Milestone thresholds, in days. A streak reaching one of these exactly
/// records a `milestone_reached` history event.
pub const MILESTONES: [u32; 8] = [3, 7, 14, 30, 60, 90, 180, 365];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Streak {
    pub id: String,
    pub user_id: String,
    pub habit_goal_id: String,
    /// Absent for personal (non-pact) streaks.
    pub pact_id: Option<String>,
    pub current_streak: u32,
    pub current_streak_start_date: Option<NaiveDate>,
    pub last_completed_date: Option<NaiveDate>,
    pub longest_streak: u32,
    pub longest_streak_start_date: Option<NaiveDate>,
    pub longest_streak_end_date: Option<NaiveDate>,
    pub grace_period_days: u32,
    /// Grace days consumed within the current run. Cleared on reset.
    pub grace_days_used: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventType {
    Completed,
    Missed,
    GraceUsed,
    MilestoneReached,
}

/// Append-only audit row explaining every streak mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakHistoryEvent {
    pub id: String,
    pub streak_id: String,
    pub user_id: String,
    pub event_type: HistoryEventType,
    /// The calendar day the event is about (e.g. the covered day for
    /// `grace_used`), not the day it was recorded.
    pub event_date: NaiveDate,
    /// Streak length after the event applied.
    pub streak_value: u32,
    pub milestone: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// The next milestone strictly above the current length.
pub fn next_milestone(current_streak: u32) -> Option<u32> {
    MILESTONES.iter().copied().find(|&m| m > current_streak)
}

/// Percent progress from the previous milestone toward the next,
/// rounded to whole percent. 100 once past the final milestone.
pub fn milestone_progress(current_streak: u32) -> u32 {
    let next = match next_milestone(current_streak) {
        Some(next) => next,
        None => return 100,
    };
    let prev = MILESTONES
        .iter()
        .copied()
        .rev()
        .find(|&m| m <= current_streak)
        .unwrap_or(0);
    let span = next - prev;
    if span == 0 {
        return 100;
    }
    (f64::from(current_streak - prev) / f64::from(span) * 100.0).round() as u32
}

/// How close a daily streak is to breaking, judged by hours since the
/// last completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    AtRisk,
    Critical,
}

pub fn risk_level(streak: &Streak, now: DateTime<Utc>) -> RiskLevel {
    if streak.current_streak == 0 {
        return RiskLevel::Safe;
    }
    let last = match streak.last_completed_date {
        Some(date) => date,
        None => return RiskLevel::Safe,
    };
    let last_midnight = match last.and_hms_opt(0, 0, 0) {
        Some(dt) => dt.and_utc(),
        None => return RiskLevel::Safe,
    };
    let hours = (now - last_midnight).num_hours();
    if hours >= 36 {
        RiskLevel::Critical
    } else if hours >= 20 {
        RiskLevel::AtRisk
    } else {
        RiskLevel::Safe
    }
}

/// Short human-readable summary for list output.
pub fn display_text(streak: &Streak) -> String {
    match streak.current_streak {
        0 => "no active streak".to_string(),
        1 => "1 day streak".to_string(),
        n if n >= 3 => format!("🔥 {n} day streak"),
        n => format!("{n} day streak"),
    }
}
