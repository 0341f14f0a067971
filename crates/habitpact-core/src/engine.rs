//! Orchestration facade.
//!
//! [`AccountabilityEngine`] owns the database handle, clock, and config,
//! and wires the single write path for a checkin submission: ledger upsert,
//! outcome, streak transition, member stats, events out. It also hosts the
//! two daily sweeps that an external scheduler (cron, the CLI) drives.

use chrono::NaiveDate;

use crate::checkin::{AttemptParams, CheckinLedger, HabitCheckin, Outcome, RecordedAttempt};
use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, Result};
use crate::events::Event;
use crate::goal::GoalCatalog;
use crate::pact::{Pact, PactLifecycle};
use crate::scoreboard::{PactOutcome, PactScoreboard};
use crate::storage::{Config, Database};
use crate::streak::{Streak, StreakEngine};

/// Everything a checkin submission changed.
#[derive(Debug, Clone)]
pub struct CheckinReport {
    pub checkin: HabitCheckin,
    pub was_newly_created: bool,
    /// The streak row after the outcome applied, when there was an outcome.
    pub streak: Option<Streak>,
    pub events: Vec<Event>,
}

/// Result of the end-of-window sweep.
#[derive(Debug, Clone)]
pub struct ExpiryReport {
    pub outcomes: Vec<PactOutcome>,
    pub events: Vec<Event>,
}

pub struct AccountabilityEngine {
    db: Database,
    clock: Box<dyn Clock>,
    config: Config,
}

impl AccountabilityEngine {
    pub fn new(db: Database, config: Config) -> Self {
        Self::with_clock(db, config, Box::new(SystemClock))
    }

    pub fn with_clock(db: Database, config: Config, clock: Box<dyn Clock>) -> Self {
        Self { db, clock, config }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Give the database handle back, e.g. to rebuild the engine with a
    /// different clock.
    pub fn into_db(self) -> Database {
        self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn goals(&self) -> GoalCatalog<'_> {
        GoalCatalog::new(&self.db, self.clock.as_ref())
    }

    pub fn pacts(&self) -> PactLifecycle<'_> {
        PactLifecycle::new(&self.db, self.clock.as_ref(), &self.config)
    }

    pub fn checkins(&self) -> CheckinLedger<'_> {
        CheckinLedger::new(&self.db, self.clock.as_ref())
    }

    pub fn streaks(&self) -> StreakEngine<'_> {
        StreakEngine::new(&self.db, self.clock.as_ref(), &self.config)
    }

    pub fn scoreboard(&self) -> PactScoreboard<'_> {
        PactScoreboard::new(&self.db, self.clock.as_ref(), &self.config)
    }

    /// Submit a checkin attempt and route its outcome, if any, through the
    /// streak engine and the pact scoreboard.
    pub fn submit_checkin(&self, user_id: &str, params: AttemptParams) -> Result<CheckinReport> {
        let recorded = self.checkins().record_attempt(user_id, params)?;
        self.route_outcome(recorded)
    }

    /// Mark an existing checkin completed and route the outcome.
    pub fn complete_checkin(
        &self,
        checkin_id: &str,
        user_id: &str,
        notes: Option<String>,
        self_rating: Option<u8>,
    ) -> Result<CheckinReport> {
        let recorded = self
            .checkins()
            .complete(checkin_id, user_id, notes, self_rating)?;
        self.route_outcome(recorded)
    }

    /// Mark every still-pending checkin on or before `cutoff` missed and
    /// route each miss through the streak engine and scoreboard. The cron
    /// entry point for end-of-day processing.
    pub fn sweep_missed(&self, cutoff: NaiveDate) -> Result<Vec<CheckinReport>> {
        let mut reports = Vec::new();
        for recorded in self.checkins().sweep_missed(cutoff)? {
            reports.push(self.route_outcome(recorded)?);
        }
        Ok(reports)
    }

    /// Expire every active pact past its end date and finalize each one's
    /// scoreboard. The per-pact compare-and-set inside the lifecycle makes
    /// redundant runs harmless.
    pub fn expire_due(&self) -> Result<ExpiryReport> {
        let mut outcomes = Vec::new();
        let mut events = Vec::new();
        for (pact, event) in self.pacts().expire_due()? {
            events.push(event);
            let (outcome, completed_event) = self.scoreboard().finalize(&pact.id)?;
            outcomes.push(outcome);
            events.extend(completed_event);
        }
        Ok(ExpiryReport { outcomes, events })
    }

    /// Conclude an active pact successfully: freeze rates, pick the winner,
    /// emit `PactCompleted`. Loses gracefully to a concurrent terminal
    /// transition.
    pub fn complete_pact(&self, pact_id: &str, user_id: &str) -> Result<(PactOutcome, Vec<Event>)> {
        let pact = self.load_pact(pact_id)?;
        if !pact.is_participant(user_id) {
            return Err(EngineError::Unauthorized(
                "you are not a participant in this pact".into(),
            )
            .into());
        }

        if !self.pacts().complete_if_active(pact_id)? {
            let pact = self.load_pact(pact_id)?;
            return Err(if pact.status.is_terminal() {
                EngineError::AlreadyTerminal {
                    entity: "pact",
                    id: pact_id.to_string(),
                }
                .into()
            } else {
                EngineError::InvalidTransition("pact is not active".into()).into()
            });
        }

        for streak in self.db.streaks_by_pact(pact_id)? {
            self.db.deactivate_streak(&streak.id, self.clock.now())?;
        }
        let (outcome, event) = self.scoreboard().finalize(pact_id)?;
        Ok((outcome, event.into_iter().collect()))
    }

    /// Abandon an active pact and snapshot its scoreboard.
    pub fn abandon_pact(&self, pact_id: &str, user_id: &str) -> Result<(PactOutcome, Vec<Event>)> {
        let (_, events) = self.pacts().abandon(pact_id, user_id)?;
        let (outcome, _) = self.scoreboard().finalize(pact_id)?;
        Ok((outcome, events))
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn route_outcome(&self, recorded: RecordedAttempt) -> Result<CheckinReport> {
        let RecordedAttempt {
            mut checkin,
            was_newly_created,
            outcome,
            mut events,
        } = recorded;

        let streak = match outcome {
            Some(Outcome::Completed) => {
                let update = self.streaks().on_completed(
                    &checkin.user_id,
                    &checkin.habit_goal_id,
                    checkin.pact_id.as_deref(),
                    checkin.scheduled_date,
                )?;
                if update.change.counted() {
                    self.db.mark_checkin_contributed(&checkin.id)?;
                    checkin.contributed_to_streak = true;
                }
                events.extend(update.events.iter().cloned());
                if let Some(pact_id) = &checkin.pact_id {
                    self.scoreboard().increment_checkin_stats(
                        pact_id,
                        &checkin.user_id,
                        true,
                        Some(update.streak.current_streak),
                    )?;
                }
                Some(update.streak)
            }
            Some(Outcome::Missed) => {
                let update = self.streaks().on_missed(
                    &checkin.user_id,
                    &checkin.habit_goal_id,
                    checkin.pact_id.as_deref(),
                    checkin.scheduled_date,
                )?;
                if let Some(update) = &update {
                    events.extend(update.events.iter().cloned());
                }
                if let Some(pact_id) = &checkin.pact_id {
                    self.scoreboard().increment_checkin_stats(
                        pact_id,
                        &checkin.user_id,
                        false,
                        update.as_ref().map(|u| u.streak.current_streak),
                    )?;
                }
                update.map(|u| u.streak)
            }
            None => None,
        };

        Ok(CheckinReport {
            checkin,
            was_newly_created,
            streak,
            events,
        })
    }

    fn load_pact(&self, pact_id: &str) -> Result<Pact> {
        self.db
            .get_pact(pact_id)?
            .ok_or_else(|| EngineError::not_found("pact", pact_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkin::CheckinStatus;
    use crate::clock::FixedClock;
    use crate::goal::NewGoal;
    use crate::pact::{NewPact, PactStatus};

    fn engine() -> AccountabilityEngine {
        let db = Database::open_memory().unwrap();
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        AccountabilityEngine::with_clock(db, Config::default(), Box::new(clock))
    }

    fn completed_attempt(goal_id: &str, pact_id: Option<&str>) -> AttemptParams {
        AttemptParams {
            habit_goal_id: goal_id.into(),
            pact_id: pact_id.map(str::to_string),
            status: Some(CheckinStatus::Completed),
            ..Default::default()
        }
    }

    #[test]
    fn completed_checkin_feeds_streak_and_member_stats() {
        let engine = engine();
        let goal = engine
            .goals()
            .create(
                "creator",
                NewGoal {
                    name: "Stretch".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let (pact, _) = engine
            .pacts()
            .create(
                "creator",
                NewPact {
                    habit_goal_id: goal.id.clone(),
                    partner_user_id: Some("partner".into()),
                    pact_type: None,
                    duration_days: Some(30),
                    consequence_type: None,
                    consequence_details: None,
                },
            )
            .unwrap();
        engine.pacts().accept(&pact.id, "partner").unwrap();

        let report = engine
            .submit_checkin("creator", completed_attempt(&goal.id, Some(&pact.id)))
            .unwrap();
        assert!(report.checkin.contributed_to_streak);
        assert_eq!(report.streak.as_ref().map(|s| s.current_streak), Some(1));
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e, Event::PartnerCheckedIn { .. })));

        let member = engine
            .db()
            .member_by_pact_and_user(&pact.id, "creator")
            .unwrap()
            .unwrap();
        assert_eq!(member.total_checkins, 1);
        assert_eq!(member.completed_checkins, 1);
        assert_eq!(member.current_streak, 1);
    }

    #[test]
    fn duplicate_completion_does_not_double_count() {
        let engine = engine();
        let goal = engine
            .goals()
            .create(
                "u1",
                NewGoal {
                    name: "Read".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        engine
            .submit_checkin("u1", completed_attempt(&goal.id, None))
            .unwrap();
        let again = engine
            .submit_checkin("u1", completed_attempt(&goal.id, None))
            .unwrap();
        assert!(again.streak.is_none());
        assert!(again.events.is_empty());

        let streak = engine
            .streaks()
            .for_user_and_goal("u1", &goal.id, None)
            .unwrap()
            .unwrap();
        assert_eq!(streak.current_streak, 1);
    }

    #[test]
    fn downgrade_then_recomplete_counts_once_in_member_stats() {
        let engine = engine();
        let goal = engine
            .goals()
            .create(
                "creator",
                NewGoal {
                    name: "Journal".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let (pact, _) = engine
            .pacts()
            .create(
                "creator",
                NewPact {
                    habit_goal_id: goal.id.clone(),
                    partner_user_id: Some("partner".into()),
                    pact_type: None,
                    duration_days: Some(30),
                    consequence_type: None,
                    consequence_details: None,
                },
            )
            .unwrap();
        engine.pacts().accept(&pact.id, "partner").unwrap();

        engine
            .submit_checkin("creator", completed_attempt(&goal.id, Some(&pact.id)))
            .unwrap();

        // Re-submit as pending, then complete again. The settled row must
        // neither reopen nor feed the scoreboard a second time.
        engine
            .submit_checkin(
                "creator",
                AttemptParams {
                    habit_goal_id: goal.id.clone(),
                    pact_id: Some(pact.id.clone()),
                    status: Some(CheckinStatus::Pending),
                    ..Default::default()
                },
            )
            .unwrap();
        engine
            .submit_checkin("creator", completed_attempt(&goal.id, Some(&pact.id)))
            .unwrap();

        let member = engine
            .db()
            .member_by_pact_and_user(&pact.id, "creator")
            .unwrap()
            .unwrap();
        assert_eq!(member.total_checkins, 1);
        assert_eq!(member.completed_checkins, 1);
    }

    #[test]
    fn sweep_feeds_misses_to_streaks() {
        let engine = engine();
        let goal = engine
            .goals()
            .create(
                "u1",
                NewGoal {
                    name: "Run".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let d = |day: u32| NaiveDate::from_ymd_opt(2025, 6, day).unwrap();

        // Build a streak on days 1-2, then leave day 5 pending and sweep it.
        // The three-day gap is beyond what grace can cover.
        for day in [1, 2] {
            engine
                .submit_checkin(
                    "u1",
                    AttemptParams {
                        habit_goal_id: goal.id.clone(),
                        status: Some(CheckinStatus::Completed),
                        scheduled_date: Some(d(day)),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        engine
            .submit_checkin(
                "u1",
                AttemptParams {
                    habit_goal_id: goal.id.clone(),
                    scheduled_date: Some(d(5)),
                    ..Default::default()
                },
            )
            .unwrap();

        let reports = engine.sweep_missed(d(6)).unwrap();
        assert_eq!(reports.len(), 1);
        let streak = reports[0].streak.as_ref().unwrap();
        assert_eq!(streak.current_streak, 0);
        assert!(reports[0]
            .events
            .iter()
            .any(|e| matches!(e, Event::StreakBroken { streak_before: 2, .. })));
    }

    #[test]
    fn complete_pact_freezes_scoreboard_once() {
        let engine = engine();
        let goal = engine
            .goals()
            .create(
                "creator",
                NewGoal {
                    name: "Meditate".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let (pact, _) = engine
            .pacts()
            .create(
                "creator",
                NewPact {
                    habit_goal_id: goal.id.clone(),
                    partner_user_id: Some("partner".into()),
                    pact_type: None,
                    duration_days: Some(7),
                    consequence_type: None,
                    consequence_details: None,
                },
            )
            .unwrap();
        engine.pacts().accept(&pact.id, "partner").unwrap();

        engine
            .submit_checkin("creator", completed_attempt(&goal.id, Some(&pact.id)))
            .unwrap();
        engine
            .submit_checkin("partner", completed_attempt(&goal.id, Some(&pact.id)))
            .unwrap();

        let (outcome, events) = engine.complete_pact(&pact.id, "creator").unwrap();
        assert_eq!(outcome.pact.status, PactStatus::Completed);
        assert_eq!(outcome.creator_completion_rate, 100.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::PactCompleted { .. })));

        // Second completion attempt loses the compare-and-set.
        let err = engine.complete_pact(&pact.id, "creator").unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Engine(EngineError::AlreadyTerminal { .. })
        ));
    }
}
