//! Daily checkin ledger.
//!
//! One row per `(user, goal, scheduled date)`, enforced by a unique index
//! and an atomic upsert, so concurrent submissions for the same day
//! converge on a single row. A checkin yields at most one outcome over its
//! lifetime: the first transition into `completed` or `missed`. Later
//! edits never produce a second outcome.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::events::Event;
use crate::pact::PactStatus;
use crate::storage::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckinStatus {
    Pending,
    Completed,
    Partial,
    Skipped,
    Missed,
}

impl CheckinStatus {
    /// Outcome statuses feed the streak engine and member stats.
    pub fn is_outcome(self) -> bool {
        matches!(self, CheckinStatus::Completed | CheckinStatus::Missed)
    }
}

/// Which terminal outcome a checkin transition produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Missed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitCheckin {
    pub id: String,
    pub user_id: String,
    /// Absent for personal (non-pact) tracking.
    pub pact_id: Option<String>,
    pub habit_goal_id: String,
    pub scheduled_date: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: CheckinStatus,
    pub notes: Option<String>,
    /// 1..=5 self-assessment.
    pub self_rating: Option<u8>,
    pub difficulty_rating: Option<u8>,
    pub has_proof: bool,
    pub proof_verified: bool,
    pub contributed_to_streak: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for `record_attempt`. Absent fields are left untouched when
/// the attempt lands on an existing row.
#[derive(Debug, Clone, Default)]
pub struct AttemptParams {
    pub habit_goal_id: String,
    pub pact_id: Option<String>,
    /// Defaults to today.
    pub scheduled_date: Option<NaiveDate>,
    pub status: Option<CheckinStatus>,
    pub notes: Option<String>,
    pub self_rating: Option<u8>,
    pub difficulty_rating: Option<u8>,
    pub has_proof: Option<bool>,
}

/// Field merge applied when an attempt lands on an existing row.
#[derive(Debug, Clone)]
pub struct CheckinPatch {
    pub status: Option<CheckinStatus>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub self_rating: Option<u8>,
    pub difficulty_rating: Option<u8>,
    pub has_proof: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a write against the ledger.
#[derive(Debug, Clone)]
pub struct RecordedAttempt {
    pub checkin: HabitCheckin,
    pub was_newly_created: bool,
    /// Present only on the first transition into `completed` or `missed`.
    pub outcome: Option<Outcome>,
    pub events: Vec<Event>,
}

/// Write and query surface for checkins.
pub struct CheckinLedger<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
}

impl<'a> CheckinLedger<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self { db, clock }
    }

    /// Record a checkin attempt for a date. Creates the row if this is the
    /// first attempt for `(user, goal, date)`, otherwise merges the provided
    /// fields into the existing row. The insert-or-merge runs in one
    /// transaction against the unique index, so two concurrent attempts
    /// produce one row and at most one outcome between them.
    pub fn record_attempt(&self, user_id: &str, params: AttemptParams) -> Result<RecordedAttempt> {
        if let Some(pact_id) = &params.pact_id {
            self.require_active_participant(pact_id, user_id)?;
        }

        let now = self.clock.now();
        let scheduled_date = params.scheduled_date.unwrap_or_else(|| self.clock.today());
        let status = params.status.unwrap_or(CheckinStatus::Pending);
        let completed_at = (status == CheckinStatus::Completed).then_some(now);

        let candidate = HabitCheckin {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            pact_id: params.pact_id.clone(),
            habit_goal_id: params.habit_goal_id.clone(),
            scheduled_date,
            completed_at,
            status,
            notes: params.notes.clone(),
            self_rating: params.self_rating,
            difficulty_rating: params.difficulty_rating,
            has_proof: params.has_proof.unwrap_or(false),
            proof_verified: false,
            contributed_to_streak: false,
            created_at: now,
            updated_at: now,
        };
        let patch = CheckinPatch {
            status: params.status,
            completed_at,
            notes: params.notes,
            self_rating: params.self_rating,
            difficulty_rating: params.difficulty_rating,
            has_proof: params.has_proof,
            updated_at: now,
        };

        let (checkin, was_new, prior_status) = self.db.upsert_checkin(&candidate, &patch)?;
        let outcome = outcome_of(prior_status, checkin.status);
        let events = self.events_for(&checkin, outcome, now)?;
        Ok(RecordedAttempt {
            checkin,
            was_newly_created: was_new,
            outcome,
            events,
        })
    }

    /// Mark an existing checkin completed. Idempotent: completing an
    /// already-completed checkin changes nothing and yields no outcome.
    pub fn complete(
        &self,
        checkin_id: &str,
        user_id: &str,
        notes: Option<String>,
        self_rating: Option<u8>,
    ) -> Result<RecordedAttempt> {
        let mut checkin = self.owned(checkin_id, user_id)?;
        let prior = checkin.status;
        if prior == CheckinStatus::Completed {
            return Ok(RecordedAttempt {
                checkin,
                was_newly_created: false,
                outcome: None,
                events: Vec::new(),
            });
        }

        let now = self.clock.now();
        checkin.status = CheckinStatus::Completed;
        checkin.completed_at = Some(now);
        if notes.is_some() {
            checkin.notes = notes;
        }
        if self_rating.is_some() {
            checkin.self_rating = self_rating;
        }
        checkin.updated_at = now;
        self.db.update_checkin(&checkin)?;

        let outcome = outcome_of(Some(prior), checkin.status);
        let events = self.events_for(&checkin, outcome, now)?;
        Ok(RecordedAttempt {
            checkin,
            was_newly_created: false,
            outcome,
            events,
        })
    }

    /// Skip a checkin without breaking the streak. Only reachable from
    /// `pending` or `partial`: a row that already produced an outcome stays
    /// put, preserving the at-most-one-outcome rule.
    pub fn skip(&self, checkin_id: &str, user_id: &str, notes: Option<String>) -> Result<HabitCheckin> {
        let mut checkin = self.owned(checkin_id, user_id)?;
        if checkin.status.is_outcome() {
            return Err(EngineError::InvalidTransition(
                "checkin already has a recorded outcome".into(),
            )
            .into());
        }
        checkin.status = CheckinStatus::Skipped;
        if notes.is_some() {
            checkin.notes = notes;
        }
        checkin.updated_at = self.clock.now();
        self.db.update_checkin(&checkin)?;
        Ok(checkin)
    }

    /// Mark a single pending or partial checkin missed, producing its
    /// outcome.
    pub fn mark_missed(&self, checkin_id: &str) -> Result<RecordedAttempt> {
        let mut checkin = self
            .db
            .get_checkin(checkin_id)?
            .ok_or_else(|| EngineError::not_found("checkin", checkin_id))?;
        let prior = checkin.status;
        if prior.is_outcome() || prior == CheckinStatus::Skipped {
            return Ok(RecordedAttempt {
                checkin,
                was_newly_created: false,
                outcome: None,
                events: Vec::new(),
            });
        }

        let now = self.clock.now();
        checkin.status = CheckinStatus::Missed;
        checkin.updated_at = now;
        self.db.update_checkin(&checkin)?;

        let outcome = outcome_of(Some(prior), checkin.status);
        let events = self.events_for(&checkin, outcome, now)?;
        Ok(RecordedAttempt {
            checkin,
            was_newly_created: false,
            outcome,
            events,
        })
    }

    /// Mark every still-pending checkin scheduled on or before `cutoff`
    /// missed. Returns one recorded attempt per row transitioned, so the
    /// caller can feed the outcomes onward.
    pub fn sweep_missed(&self, cutoff: NaiveDate) -> Result<Vec<RecordedAttempt>> {
        let mut swept = Vec::new();
        for checkin in self.db.pending_checkins_through(cutoff)? {
            let recorded = self.mark_missed(&checkin.id)?;
            if recorded.outcome.is_some() {
                swept.push(recorded);
            }
        }
        Ok(swept)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, checkin_id: &str) -> Result<HabitCheckin> {
        self.db
            .get_checkin(checkin_id)?
            .ok_or_else(|| EngineError::not_found("checkin", checkin_id).into())
    }

    pub fn for_user_on_date(&self, user_id: &str, date: NaiveDate) -> Result<Vec<HabitCheckin>> {
        Ok(self.db.checkins_for_user_on_date(user_id, date)?)
    }

    pub fn for_date_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<HabitCheckin>> {
        Ok(self.db.checkins_in_range(user_id, from, to)?)
    }

    pub fn for_pact(&self, pact_id: &str) -> Result<Vec<HabitCheckin>> {
        Ok(self.db.checkins_for_pact(pact_id)?)
    }

    pub fn completed_count_in_period(
        &self,
        user_id: &str,
        habit_goal_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u32> {
        Ok(self.db.completed_count(user_id, habit_goal_id, from, to)?)
    }

    pub fn delete(&self, checkin_id: &str, user_id: &str) -> Result<()> {
        self.owned(checkin_id, user_id)?;
        self.db.delete_checkin(checkin_id)?;
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn owned(&self, checkin_id: &str, user_id: &str) -> Result<HabitCheckin> {
        let checkin = self.get(checkin_id)?;
        if checkin.user_id != user_id {
            return Err(
                EngineError::Unauthorized("checkin belongs to another user".into()).into(),
            );
        }
        Ok(checkin)
    }

    fn require_active_participant(&self, pact_id: &str, user_id: &str) -> Result<()> {
        let pact = self
            .db
            .get_pact(pact_id)?
            .ok_or_else(|| EngineError::not_found("pact", pact_id))?;
        if !pact.is_participant(user_id) {
            return Err(EngineError::Unauthorized(
                "you are not a participant in this pact".into(),
            )
            .into());
        }
        if pact.status != PactStatus::Active {
            return Err(EngineError::InvalidTransition(
                "checkins require an active pact".into(),
            )
            .into());
        }
        Ok(())
    }

    fn events_for(
        &self,
        checkin: &HabitCheckin,
        outcome: Option<Outcome>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        match outcome {
            Some(Outcome::Completed) => {
                events.push(Event::CheckinCompleted {
                    checkin_id: checkin.id.clone(),
                    user_id: checkin.user_id.clone(),
                    habit_goal_id: checkin.habit_goal_id.clone(),
                    pact_id: checkin.pact_id.clone(),
                    scheduled_date: checkin.scheduled_date,
                    at: now,
                });
                // Tell the other pact member their partner showed up.
                if let Some(pact_id) = &checkin.pact_id {
                    if let Some(pact) = self.db.get_pact(pact_id)? {
                        if let Some(partner) = pact.partner_of(&checkin.user_id) {
                            events.push(Event::PartnerCheckedIn {
                                pact_id: pact_id.clone(),
                                user_id: checkin.user_id.clone(),
                                partner_user_id: partner.to_string(),
                                scheduled_date: checkin.scheduled_date,
                                at: now,
                            });
                        }
                    }
                }
            }
            Some(Outcome::Missed) => {
                events.push(Event::CheckinMissed {
                    checkin_id: checkin.id.clone(),
                    user_id: checkin.user_id.clone(),
                    habit_goal_id: checkin.habit_goal_id.clone(),
                    pact_id: checkin.pact_id.clone(),
                    scheduled_date: checkin.scheduled_date,
                    at: now,
                });
            }
            None => {}
        }
        Ok(events)
    }
}

/// An outcome fires only on the first transition into a terminal checkin
/// status. `prior` is `None` for freshly inserted rows.
fn outcome_of(prior: Option<CheckinStatus>, current: CheckinStatus) -> Option<Outcome> {
    if prior.is_some_and(|p| p.is_outcome()) {
        return None;
    }
    match current {
        CheckinStatus::Completed => Some(Outcome::Completed),
        CheckinStatus::Missed => Some(Outcome::Missed),
        _ => None,
    }
}
