//! Streak transitions.
//!
//! The engine consumes checkin outcomes and applies the gap rules:
//!
//! * completed with a 1-day gap extends the run;
//! * completed with a 2-day gap consumes one grace day, if any remain,
//!   and keeps the run's start date;
//! * any wider gap, or exhausted grace, restarts the run at 1;
//! * a bare miss never consumes grace. It only resets once the gap can no
//!   longer be covered, otherwise judgement is deferred to the next
//!   completion.

use chrono::NaiveDate;
use uuid::Uuid;

use super::{HistoryEventType, Streak, StreakHistoryEvent};
use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::events::Event;
use crate::storage::{Config, Database};

/// What a checkin outcome did to the streak row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakChange {
    /// Duplicate or out-of-order date; nothing changed.
    NoOp,
    /// First completion ever recorded on this row.
    Started,
    Incremented,
    /// A 2-day gap was covered by a grace day.
    GraceApplied,
    /// The gap was uncoverable; the run restarted at 1.
    Restarted,
    /// A miss broke the run; the counter is back to 0.
    Reset,
}

impl StreakChange {
    /// Whether the completion that produced this change counted toward
    /// the streak.
    pub fn counted(self) -> bool {
        matches!(
            self,
            StreakChange::Started
                | StreakChange::Incremented
                | StreakChange::GraceApplied
                | StreakChange::Restarted
        )
    }
}

#[derive(Debug, Clone)]
pub struct StreakUpdate {
    pub streak: Streak,
    pub change: StreakChange,
    pub events: Vec<Event>,
}

/// Applies checkin outcomes to streak rows. This is the only writer of
/// streak state; callers route every outcome through it.
pub struct StreakEngine<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    config: &'a Config,
}

impl<'a> StreakEngine<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock, config: &'a Config) -> Self {
        Self { db, clock, config }
    }

    /// Apply a completed outcome for calendar day `date`.
    pub fn on_completed(
        &self,
        user_id: &str,
        habit_goal_id: &str,
        pact_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<StreakUpdate> {
        let now = self.clock.now();
        let mut streak = self.db.get_or_create_streak(
            user_id,
            habit_goal_id,
            pact_id,
            self.config.streak.grace_period_days,
            now,
        )?;

        let mut history = Vec::new();
        let change = match streak.last_completed_date {
            // Same day twice, or a backfill behind the frontier: no-op.
            Some(last) if date <= last => StreakChange::NoOp,
            Some(last) => {
                let gap = (date - last).num_days();
                if gap == 1 {
                    streak.current_streak += 1;
                    StreakChange::Incremented
                } else if gap == 2 && streak.grace_days_used < streak.grace_period_days {
                    streak.grace_days_used += 1;
                    streak.current_streak += 1;
                    // The covered day is the one between the two completions.
                    history.push(self.history_row(
                        &streak,
                        HistoryEventType::GraceUsed,
                        last + chrono::Duration::days(1),
                        streak.current_streak,
                        None,
                    ));
                    StreakChange::GraceApplied
                } else {
                    streak.current_streak = 1;
                    streak.current_streak_start_date = Some(date);
                    streak.grace_days_used = 0;
                    StreakChange::Restarted
                }
            }
            None => {
                streak.current_streak = 1;
                streak.current_streak_start_date = Some(date);
                StreakChange::Started
            }
        };

        if change == StreakChange::NoOp {
            return Ok(StreakUpdate {
                streak,
                change,
                events: Vec::new(),
            });
        }

        // A run resuming from 0 (e.g. after a reset) starts today.
        if streak.current_streak_start_date.is_none() {
            streak.current_streak_start_date = Some(date);
        }
        streak.last_completed_date = Some(date);
        if streak.current_streak > streak.longest_streak {
            streak.longest_streak = streak.current_streak;
            streak.longest_streak_start_date = streak.current_streak_start_date;
            streak.longest_streak_end_date = Some(date);
        }
        streak.updated_at = now;

        history.push(self.history_row(
            &streak,
            HistoryEventType::Completed,
            date,
            streak.current_streak,
            None,
        ));

        let mut events = Vec::new();
        let milestone_hit = self
            .config
            .streak
            .milestones
            .iter()
            .copied()
            .find(|&m| m == streak.current_streak);
        if let Some(milestone) = milestone_hit {
            history.push(self.history_row(
                &streak,
                HistoryEventType::MilestoneReached,
                date,
                streak.current_streak,
                Some(milestone),
            ));
            events.push(Event::StreakMilestone {
                streak_id: streak.id.clone(),
                user_id: user_id.to_string(),
                habit_goal_id: habit_goal_id.to_string(),
                milestone,
                current_streak: streak.current_streak,
                at: now,
            });
        }

        self.db.update_streak(&streak)?;
        for row in &history {
            self.db.insert_history(row)?;
        }

        Ok(StreakUpdate {
            streak,
            change,
            events,
        })
    }

    /// Apply a missed outcome for calendar day `date`. Resets only when the
    /// gap is already uncoverable or no grace remains; otherwise the miss is
    /// left for the next completion to judge. Returns `None` when nothing
    /// changed (no streak row, nothing running, or judgement deferred).
    pub fn on_missed(
        &self,
        user_id: &str,
        habit_goal_id: &str,
        pact_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<Option<StreakUpdate>> {
        let now = self.clock.now();
        let mut streak = match self
            .db
            .streak_by_user_and_goal(user_id, habit_goal_id, pact_id)?
        {
            Some(streak) => streak,
            None => return Ok(None),
        };

        let last = match streak.last_completed_date {
            Some(last) if streak.current_streak > 0 => last,
            // Nothing running; nothing to break.
            _ => return Ok(None),
        };

        // A miss at or behind the completion frontier was already settled
        // by the completion that moved the frontier past it (grace or a
        // restart). Only misses ahead of the frontier can break the run.
        if date <= last {
            return Ok(None);
        }

        let gap = (date - last).num_days();
        let grace_exhausted =
            streak.grace_period_days == 0 || streak.grace_days_used >= streak.grace_period_days;
        if gap < 2 && !grace_exhausted {
            // A single missed day can still be covered by grace when the
            // user completes tomorrow. Defer.
            return Ok(None);
        }

        let streak_before = streak.current_streak;
        if streak_before == streak.longest_streak {
            // The broken run was the record; stamp where it ended.
            streak.longest_streak_end_date = Some(last);
        }
        streak.current_streak = 0;
        streak.current_streak_start_date = None;
        streak.grace_days_used = 0;
        streak.updated_at = now;
        self.db.update_streak(&streak)?;

        self.db.insert_history(&self.history_row(
            &streak,
            HistoryEventType::Missed,
            date,
            0,
            None,
        ))?;

        let events = vec![Event::StreakBroken {
            streak_id: streak.id.clone(),
            user_id: user_id.to_string(),
            habit_goal_id: habit_goal_id.to_string(),
            streak_before,
            at: now,
        }];
        Ok(Some(StreakUpdate {
            streak,
            change: StreakChange::Reset,
            events,
        }))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, streak_id: &str) -> Result<Streak> {
        self.db
            .get_streak(streak_id)?
            .ok_or_else(|| EngineError::not_found("streak", streak_id).into())
    }

    pub fn for_user(&self, user_id: &str, active_only: bool) -> Result<Vec<Streak>> {
        Ok(self.db.streaks_by_user(user_id, active_only)?)
    }

    pub fn for_user_and_goal(
        &self,
        user_id: &str,
        habit_goal_id: &str,
        pact_id: Option<&str>,
    ) -> Result<Option<Streak>> {
        Ok(self
            .db
            .streak_by_user_and_goal(user_id, habit_goal_id, pact_id)?)
    }

    pub fn for_pact(&self, pact_id: &str) -> Result<Vec<Streak>> {
        Ok(self.db.streaks_by_pact(pact_id)?)
    }

    pub fn history(&self, streak_id: &str, limit: u32) -> Result<Vec<StreakHistoryEvent>> {
        Ok(self.db.history_for_streak(streak_id, limit)?)
    }

    pub fn milestone_history(&self, user_id: &str) -> Result<Vec<StreakHistoryEvent>> {
        Ok(self.db.milestone_history(user_id)?)
    }

    pub fn top(&self, limit: u32) -> Result<Vec<Streak>> {
        Ok(self.db.top_streaks(limit)?)
    }

    /// Retire a streak row without touching its history.
    pub fn deactivate(&self, streak_id: &str) -> Result<()> {
        self.db.deactivate_streak(streak_id, self.clock.now())?;
        Ok(())
    }

    fn history_row(
        &self,
        streak: &Streak,
        event_type: HistoryEventType,
        event_date: NaiveDate,
        streak_value: u32,
        milestone: Option<u32>,
    ) -> StreakHistoryEvent {
        StreakHistoryEvent {
            id: Uuid::new_v4().to_string(),
            streak_id: streak.id.clone(),
            user_id: streak.user_id.clone(),
            event_type,
            event_date,
            streak_value,
            milestone,
            created_at: self.clock.now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn setup() -> (Database, FixedClock, Config) {
        let db = Database::open_memory().unwrap();
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        (db, clock, Config::default())
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn consecutive_days_increment() {
        let (db, clock, config) = setup();
        let engine = StreakEngine::new(&db, &clock, &config);

        let first = engine.on_completed("u1", "g1", None, day(1)).unwrap();
        assert_eq!(first.change, StreakChange::Started);
        assert_eq!(first.streak.current_streak, 1);
        assert_eq!(first.streak.current_streak_start_date, Some(day(1)));

        let second = engine.on_completed("u1", "g1", None, day(2)).unwrap();
        assert_eq!(second.change, StreakChange::Incremented);
        assert_eq!(second.streak.current_streak, 2);
        assert_eq!(second.streak.longest_streak, 2);
        assert_eq!(second.streak.last_completed_date, Some(day(2)));
    }

    #[test]
    fn duplicate_day_is_noop() {
        let (db, clock, config) = setup();
        let engine = StreakEngine::new(&db, &clock, &config);

        engine.on_completed("u1", "g1", None, day(1)).unwrap();
        let dup = engine.on_completed("u1", "g1", None, day(1)).unwrap();
        assert_eq!(dup.change, StreakChange::NoOp);
        assert_eq!(dup.streak.current_streak, 1);
    }

    #[test]
    fn two_day_gap_consumes_grace_and_keeps_start() {
        let (db, clock, config) = setup();
        let engine = StreakEngine::new(&db, &clock, &config);

        engine.on_completed("u1", "g1", None, day(1)).unwrap();
        engine.on_completed("u1", "g1", None, day(2)).unwrap();
        // Day 3 missed, day 4 completed: gap of 2, covered by grace.
        let resumed = engine.on_completed("u1", "g1", None, day(4)).unwrap();
        assert_eq!(resumed.change, StreakChange::GraceApplied);
        assert_eq!(resumed.streak.current_streak, 3);
        assert_eq!(resumed.streak.grace_days_used, 1);
        assert_eq!(resumed.streak.current_streak_start_date, Some(day(1)));

        let history = engine.history(&resumed.streak.id, 50).unwrap();
        assert!(history.iter().any(|h| {
            h.event_type == HistoryEventType::GraceUsed && h.event_date == day(3)
        }));
    }

    #[test]
    fn exhausted_grace_resets_on_next_gap() {
        let (db, clock, config) = setup();
        let engine = StreakEngine::new(&db, &clock, &config);

        engine.on_completed("u1", "g1", None, day(1)).unwrap();
        engine.on_completed("u1", "g1", None, day(3)).unwrap(); // grace 1/1
        let reset = engine.on_completed("u1", "g1", None, day(5)).unwrap();
        assert_eq!(reset.change, StreakChange::Restarted);
        assert_eq!(reset.streak.current_streak, 1);
        assert_eq!(reset.streak.grace_days_used, 0);
        assert_eq!(reset.streak.current_streak_start_date, Some(day(5)));
    }

    #[test]
    fn wide_gap_resets_even_with_grace() {
        let (db, clock, config) = setup();
        let engine = StreakEngine::new(&db, &clock, &config);

        engine.on_completed("u1", "g1", None, day(1)).unwrap();
        engine.on_completed("u1", "g1", None, day(2)).unwrap();
        let reset = engine.on_completed("u1", "g1", None, day(6)).unwrap();
        assert_eq!(reset.change, StreakChange::Restarted);
        assert_eq!(reset.streak.current_streak, 1);
        // The old run survives as the longest.
        assert_eq!(reset.streak.longest_streak, 2);
    }

    #[test]
    fn bare_miss_with_grace_available_defers() {
        let (db, clock, config) = setup();
        let engine = StreakEngine::new(&db, &clock, &config);

        engine.on_completed("u1", "g1", None, day(1)).unwrap();
        engine.on_completed("u1", "g1", None, day(2)).unwrap();

        // Missed day 3: grace could still cover it, so no reset and no
        // grace consumed.
        let deferred = engine.on_missed("u1", "g1", None, day(3)).unwrap();
        assert!(deferred.is_none());
        let streak = engine.for_user_and_goal("u1", "g1", None).unwrap().unwrap();
        assert_eq!(streak.current_streak, 2);
        assert_eq!(streak.grace_days_used, 0);

        // The user completes day 4: grace consumed only now.
        let resumed = engine.on_completed("u1", "g1", None, day(4)).unwrap();
        assert_eq!(resumed.change, StreakChange::GraceApplied);
        assert_eq!(resumed.streak.current_streak, 3);
    }

    #[test]
    fn miss_behind_frontier_after_grace_is_ignored() {
        let (db, clock, config) = setup();
        let engine = StreakEngine::new(&db, &clock, &config);

        engine.on_completed("u1", "g1", None, day(1)).unwrap();
        engine.on_completed("u1", "g1", None, day(2)).unwrap();
        // Day 3 goes unanswered; the day-4 completion covers it with grace.
        let resumed = engine.on_completed("u1", "g1", None, day(4)).unwrap();
        assert_eq!(resumed.change, StreakChange::GraceApplied);
        assert_eq!(resumed.streak.current_streak, 3);

        // A late sweep marking the stale day-3 row missed must not undo
        // the grace that already forgave it.
        let stale = engine.on_missed("u1", "g1", None, day(3)).unwrap();
        assert!(stale.is_none());
        let streak = engine.for_user_and_goal("u1", "g1", None).unwrap().unwrap();
        assert_eq!(streak.current_streak, 3);
        assert_eq!(streak.grace_days_used, 1);
    }

    #[test]
    fn miss_beyond_grace_resets_and_emits_broken() {
        let (db, clock, config) = setup();
        let engine = StreakEngine::new(&db, &clock, &config);

        engine.on_completed("u1", "g1", None, day(1)).unwrap();
        engine.on_completed("u1", "g1", None, day(2)).unwrap();

        // Two days have gone by since the last completion; grace can no
        // longer bridge back to day 2.
        let broken = engine.on_missed("u1", "g1", None, day(4)).unwrap().unwrap();
        assert_eq!(broken.change, StreakChange::Reset);
        assert_eq!(broken.streak.current_streak, 0);
        assert_eq!(broken.streak.current_streak_start_date, None);
        assert!(matches!(
            broken.events[0],
            Event::StreakBroken { streak_before: 2, .. }
        ));
        // The record run keeps its end date stamp.
        assert_eq!(broken.streak.longest_streak, 2);
        assert_eq!(broken.streak.longest_streak_end_date, Some(day(2)));
    }

    #[test]
    fn zero_grace_resets_on_first_covered_miss() {
        let (db, clock, mut config) = setup();
        config.streak.grace_period_days = 0;
        let engine = StreakEngine::new(&db, &clock, &config);

        engine.on_completed("u1", "g1", None, day(1)).unwrap();
        let broken = engine.on_missed("u1", "g1", None, day(2)).unwrap().unwrap();
        assert_eq!(broken.change, StreakChange::Reset);
        assert_eq!(broken.streak.current_streak, 0);
    }

    #[test]
    fn milestone_event_on_exact_crossing() {
        let (db, clock, config) = setup();
        let engine = StreakEngine::new(&db, &clock, &config);

        engine.on_completed("u1", "g1", None, day(1)).unwrap();
        engine.on_completed("u1", "g1", None, day(2)).unwrap();
        let third = engine.on_completed("u1", "g1", None, day(3)).unwrap();
        assert!(matches!(
            third.events[0],
            Event::StreakMilestone { milestone: 3, .. }
        ));

        let fourth = engine.on_completed("u1", "g1", None, day(4)).unwrap();
        assert!(fourth.events.is_empty());

        let milestones = engine.milestone_history("u1").unwrap();
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].milestone, Some(3));
    }
}
