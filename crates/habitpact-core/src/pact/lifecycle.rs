//! Pact state machine.
//!
//! States: pending -> active -> {completed, abandoned, expired}, with a
//! pending -> declined exit. Every transition into a terminal state is
//! guarded by a compare-and-set in the store (`UPDATE ... WHERE status = ?`)
//! so a user action racing the expiry sweep cannot both win, and each
//! terminal transition is observable exactly once downstream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    end_date_for, validate_pact_params, ConsequenceType, EndReason, MemberRole, MemberStatus,
    Pact, PactMember, PactStatus, PactType,
};
use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::events::Event;
use crate::storage::{Config, Database};

/// Parameters for creating a pact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPact {
    pub habit_goal_id: String,
    /// Absent for solo pacts.
    pub partner_user_id: Option<String>,
    pub pact_type: Option<PactType>,
    pub duration_days: Option<u32>,
    pub consequence_type: Option<ConsequenceType>,
    pub consequence_details: Option<serde_json::Value>,
}

/// The pact lifecycle service.
pub struct PactLifecycle<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    config: &'a Config,
}

impl<'a> PactLifecycle<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock, config: &'a Config) -> Self {
        Self { db, clock, config }
    }

    /// Create a pact in `pending`. The creator's member row is active
    /// immediately; an invited partner starts `pending` until they accept.
    /// Solo pacts (no partner) may be activated directly by the creator.
    pub fn create(&self, creator_id: &str, params: NewPact) -> Result<(Pact, Vec<Event>)> {
        let duration_days = params.duration_days.unwrap_or(30);
        let consequence_type = params.consequence_type.unwrap_or(ConsequenceType::None);
        validate_pact_params(
            duration_days,
            consequence_type,
            params.consequence_details.as_ref(),
        )
        .map_err(EngineError::ConstraintViolation)?;

        // The referenced goal must exist.
        let goal = self
            .db
            .get_goal(&params.habit_goal_id)?
            .ok_or_else(|| EngineError::not_found("habit goal", &params.habit_goal_id))?;

        let now = self.clock.now();
        let pact = Pact {
            id: Uuid::new_v4().to_string(),
            creator_user_id: creator_id.to_string(),
            partner_user_id: params.partner_user_id.clone(),
            habit_goal_id: goal.id.clone(),
            pact_type: params.pact_type.unwrap_or(PactType::Accountability),
            status: PactStatus::Pending,
            duration_days,
            start_date: None,
            end_date: None,
            consequence_type,
            consequence_details: params.consequence_details,
            end_reason: None,
            winner_id: None,
            creator_completion_rate: None,
            partner_completion_rate: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_pact(&pact)?;

        self.db.insert_member(&self.new_member(
            &pact.id,
            creator_id,
            MemberRole::Creator,
            MemberStatus::Active,
        ))?;

        // Every pact counts toward the goal's usage, solo or paired.
        self.db.increment_goal_usage(&goal.id)?;

        let mut events = Vec::new();
        if let Some(partner_id) = &params.partner_user_id {
            self.db.insert_member(&self.new_member(
                &pact.id,
                partner_id,
                MemberRole::Partner,
                MemberStatus::Pending,
            ))?;
            events.push(Event::PactInvited {
                pact_id: pact.id.clone(),
                creator_user_id: creator_id.to_string(),
                partner_user_id: partner_id.clone(),
                at: now,
            });
        }

        Ok((pact, events))
    }

    /// Accept a pending invite. Partner-only. Sets the start date, derives
    /// the end date, activates both member rows, and creates streak rows
    /// for both participants.
    pub fn accept(&self, pact_id: &str, partner_id: &str) -> Result<(Pact, Vec<Event>)> {
        let pact = self.load(pact_id)?;
        if pact.partner_user_id.as_deref() != Some(partner_id) {
            return Err(EngineError::Unauthorized(
                "you are not the invited partner for this pact".into(),
            )
            .into());
        }
        self.require_pending(&pact)?;

        let now = self.clock.now();
        if pact.invitation_expired(now, self.config.pact.invitation_expiry_days) {
            return Err(EngineError::InvalidTransition(
                "the invitation for this pact has expired".into(),
            )
            .into());
        }

        let end = end_date_for(now, pact.duration_days);
        if !self.db.activate_pact_if_pending(pact_id, now, end)? {
            // Lost the race to a concurrent transition.
            return Err(self.transition_conflict(pact_id)?);
        }

        self.db.activate_member(pact_id, &pact.creator_user_id, now)?;
        self.db.activate_member(pact_id, partner_id, now)?;

        let grace = self.config.streak.grace_period_days;
        self.db.get_or_create_streak(
            &pact.creator_user_id,
            &pact.habit_goal_id,
            Some(pact_id),
            grace,
            now,
        )?;
        self.db
            .get_or_create_streak(partner_id, &pact.habit_goal_id, Some(pact_id), grace, now)?;

        let pact = self.load(pact_id)?;
        let events = vec![Event::PactActivated {
            pact_id: pact_id.to_string(),
            start_date: now,
            end_date: end,
            at: now,
        }];
        Ok((pact, events))
    }

    /// Activate a solo pact directly; there is no acceptance gate.
    pub fn activate_solo(&self, pact_id: &str, user_id: &str) -> Result<(Pact, Vec<Event>)> {
        let pact = self.load(pact_id)?;
        if !pact.is_creator(user_id) {
            return Err(EngineError::Unauthorized(
                "only the creator can activate this pact".into(),
            )
            .into());
        }
        if !pact.is_solo() {
            return Err(EngineError::InvalidTransition(
                "pact has an invited partner; activation requires their acceptance".into(),
            )
            .into());
        }
        self.require_pending(&pact)?;

        let now = self.clock.now();
        let end = end_date_for(now, pact.duration_days);
        if !self.db.activate_pact_if_pending(pact_id, now, end)? {
            return Err(self.transition_conflict(pact_id)?);
        }
        self.db.get_or_create_streak(
            user_id,
            &pact.habit_goal_id,
            Some(pact_id),
            self.config.streak.grace_period_days,
            now,
        )?;

        let pact = self.load(pact_id)?;
        let events = vec![Event::PactActivated {
            pact_id: pact_id.to_string(),
            start_date: now,
            end_date: end,
            at: now,
        }];
        Ok((pact, events))
    }

    /// Decline a pending invite. Terminal: a declined pact can never be
    /// accepted afterwards.
    pub fn decline(&self, pact_id: &str, partner_id: &str) -> Result<(Pact, Vec<Event>)> {
        let pact = self.load(pact_id)?;
        if pact.partner_user_id.as_deref() != Some(partner_id) {
            return Err(EngineError::Unauthorized(
                "you are not the invited partner for this pact".into(),
            )
            .into());
        }
        self.require_pending(&pact)?;

        let now = self.clock.now();
        if !self.db.decline_pact_if_pending(pact_id, now)? {
            return Err(self.transition_conflict(pact_id)?);
        }

        let pact = self.load(pact_id)?;
        let events = vec![Event::PactDeclined {
            pact_id: pact_id.to_string(),
            partner_user_id: partner_id.to_string(),
            at: now,
        }];
        Ok((pact, events))
    }

    /// Abandon an active pact. Idempotent-safe: a second call observes the
    /// terminal status and signals `AlreadyTerminal` without side effects.
    pub fn abandon(&self, pact_id: &str, user_id: &str) -> Result<(Pact, Vec<Event>)> {
        let pact = self.load(pact_id)?;
        if !pact.is_participant(user_id) {
            return Err(EngineError::Unauthorized(
                "you are not a participant in this pact".into(),
            )
            .into());
        }
        if pact.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                entity: "pact",
                id: pact_id.to_string(),
            }
            .into());
        }
        if pact.status != PactStatus::Active {
            return Err(
                EngineError::InvalidTransition("pact is not active".into()).into(),
            );
        }

        let reason = if pact.is_creator(user_id) {
            EndReason::AbandonedCreator
        } else {
            EndReason::AbandonedPartner
        };
        let now = self.clock.now();
        if !self.db.abandon_pact_if_active(pact_id, reason, now)? {
            return Err(self.transition_conflict(pact_id)?);
        }

        self.db.leave_member(pact_id, user_id, now)?;
        for streak in self.db.streaks_by_pact(pact_id)? {
            self.db.deactivate_streak(&streak.id, now)?;
        }

        let pact = self.load(pact_id)?;
        let events = vec![Event::PactAbandoned {
            pact_id: pact_id.to_string(),
            abandoned_by: user_id.to_string(),
            at: now,
        }];
        Ok((pact, events))
    }

    /// Transition every active pact past its end date to `expired`.
    ///
    /// Safe to run concurrently or redundantly: the per-pact compare-and-set
    /// means a pact already expired by another sweep is skipped, so
    /// finalization downstream happens exactly once. Returns the pacts this
    /// call transitioned.
    pub fn expire_due(&self) -> Result<Vec<(Pact, Event)>> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for pact in self.db.due_pacts(now)? {
            if !self.db.expire_pact_if_active(&pact.id, now)? {
                continue; // Another sweep won the transition.
            }
            for streak in self.db.streaks_by_pact(&pact.id)? {
                self.db.deactivate_streak(&streak.id, now)?;
            }
            let pact = self.load(&pact.id)?;
            let event = Event::PactExpired {
                pact_id: pact.id.clone(),
                at: now,
            };
            expired.push((pact, event));
        }
        Ok(expired)
    }

    /// Compare-and-set an active pact to `completed`. Returns false if the
    /// pact was not active (already terminal, or still pending).
    pub fn complete_if_active(&self, pact_id: &str) -> Result<bool> {
        Ok(self
            .db
            .complete_pact_if_active(pact_id, self.clock.now())?)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, pact_id: &str, user_id: &str) -> Result<Pact> {
        let pact = self.load(pact_id)?;
        if !pact.is_participant(user_id) {
            return Err(EngineError::Unauthorized(
                "you are not a participant in this pact".into(),
            )
            .into());
        }
        Ok(pact)
    }

    pub fn members(&self, pact_id: &str) -> Result<Vec<PactMember>> {
        Ok(self.db.members_of_pact(pact_id)?)
    }

    pub fn list_for_user(
        &self,
        user_id: &str,
        status: Option<PactStatus>,
    ) -> Result<Vec<Pact>> {
        Ok(self.db.pacts_for_user(user_id, status)?)
    }

    pub fn pending_invites(&self, user_id: &str) -> Result<Vec<Pact>> {
        Ok(self.db.pending_invites_for(user_id)?)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn load(&self, pact_id: &str) -> Result<Pact> {
        self.db
            .get_pact(pact_id)?
            .ok_or_else(|| EngineError::not_found("pact", pact_id).into())
    }

    fn require_pending(&self, pact: &Pact) -> Result<()> {
        match pact.status {
            PactStatus::Pending => Ok(()),
            status if status.is_terminal() => Err(EngineError::AlreadyTerminal {
                entity: "pact",
                id: pact.id.clone(),
            }
            .into()),
            _ => Err(EngineError::InvalidTransition("pact is not pending".into()).into()),
        }
    }

    /// Classify a lost compare-and-set race by reloading the row.
    fn transition_conflict(&self, pact_id: &str) -> Result<crate::error::CoreError> {
        let pact = self.load(pact_id)?;
        if pact.status.is_terminal() {
            Ok(EngineError::AlreadyTerminal {
                entity: "pact",
                id: pact_id.to_string(),
            }
            .into())
        } else {
            Ok(EngineError::InvalidTransition(format!(
                "pact status changed concurrently to {:?}",
                pact.status
            ))
            .into())
        }
    }

    fn new_member(
        &self,
        pact_id: &str,
        user_id: &str,
        role: MemberRole,
        status: MemberStatus,
    ) -> PactMember {
        let now = self.clock.now();
        PactMember {
            id: Uuid::new_v4().to_string(),
            pact_id: pact_id.to_string(),
            user_id: user_id.to_string(),
            role,
            status,
            joined_at: if status == MemberStatus::Active {
                Some(now)
            } else {
                None
            },
            left_at: None,
            total_checkins: 0,
            completed_checkins: 0,
            current_streak: 0,
            longest_streak: 0,
            completion_rate: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::CoreError;
    use crate::goal::{GoalCatalog, NewGoal};
    use chrono::NaiveDate;

    fn setup() -> (Database, FixedClock, Config) {
        let db = Database::open_memory().unwrap();
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        (db, clock, Config::default())
    }

    fn make_goal(db: &Database, clock: &FixedClock) -> String {
        let catalog = GoalCatalog::new(db, clock);
        catalog
            .create(
                "creator",
                NewGoal {
                    name: "Daily pushups".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id
    }

    fn invite(db: &Database, clock: &FixedClock, config: &Config) -> Pact {
        let goal_id = make_goal(db, clock);
        let lifecycle = PactLifecycle::new(db, clock, config);
        let (pact, events) = lifecycle
            .create(
                "creator",
                NewPact {
                    habit_goal_id: goal_id,
                    partner_user_id: Some("partner".into()),
                    pact_type: None,
                    duration_days: Some(30),
                    consequence_type: None,
                    consequence_details: None,
                },
            )
            .unwrap();
        assert!(matches!(events[0], Event::PactInvited { .. }));
        pact
    }

    #[test]
    fn create_starts_pending_with_members() {
        let (db, clock, config) = setup();
        let pact = invite(&db, &clock, &config);
        assert_eq!(pact.status, PactStatus::Pending);

        let members = db.members_of_pact(&pact.id).unwrap();
        assert_eq!(members.len(), 2);
        let creator = members.iter().find(|m| m.role == MemberRole::Creator).unwrap();
        let partner = members.iter().find(|m| m.role == MemberRole::Partner).unwrap();
        assert_eq!(creator.status, MemberStatus::Active);
        assert_eq!(partner.status, MemberStatus::Pending);
    }

    #[test]
    fn accept_activates_and_creates_streaks() {
        let (db, clock, config) = setup();
        let pact = invite(&db, &clock, &config);
        let lifecycle = PactLifecycle::new(&db, &clock, &config);

        let (accepted, events) = lifecycle.accept(&pact.id, "partner").unwrap();
        assert_eq!(accepted.status, PactStatus::Active);
        assert!(accepted.start_date.is_some());
        assert_eq!(
            (accepted.end_date.unwrap() - accepted.start_date.unwrap()).num_days(),
            30
        );
        assert!(matches!(events[0], Event::PactActivated { .. }));

        let streaks = db.streaks_by_pact(&pact.id).unwrap();
        assert_eq!(streaks.len(), 2);
    }

    #[test]
    fn accept_requires_invitee() {
        let (db, clock, config) = setup();
        let pact = invite(&db, &clock, &config);
        let lifecycle = PactLifecycle::new(&db, &clock, &config);

        let err = lifecycle.accept(&pact.id, "stranger").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Engine(EngineError::Unauthorized(_))
        ));
    }

    #[test]
    fn accept_of_stale_invite_is_rejected() {
        let (db, clock, config) = setup();
        let pact = invite(&db, &clock, &config);
        let lifecycle = PactLifecycle::new(&db, &clock, &config);

        clock.advance_days(8);
        let err = lifecycle.accept(&pact.id, "partner").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Engine(EngineError::InvalidTransition(_))
        ));
        assert_eq!(
            db.get_pact(&pact.id).unwrap().unwrap().status,
            PactStatus::Pending
        );
    }

    #[test]
    fn accept_after_decline_is_rejected() {
        let (db, clock, config) = setup();
        let pact = invite(&db, &clock, &config);
        let lifecycle = PactLifecycle::new(&db, &clock, &config);

        lifecycle.decline(&pact.id, "partner").unwrap();
        let err = lifecycle.accept(&pact.id, "partner").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Engine(EngineError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn abandon_twice_signals_already_terminal() {
        let (db, clock, config) = setup();
        let pact = invite(&db, &clock, &config);
        let lifecycle = PactLifecycle::new(&db, &clock, &config);
        lifecycle.accept(&pact.id, "partner").unwrap();

        let (abandoned, _) = lifecycle.abandon(&pact.id, "partner").unwrap();
        assert_eq!(abandoned.status, PactStatus::Abandoned);
        assert_eq!(abandoned.end_reason, Some(EndReason::AbandonedPartner));

        let err = lifecycle.abandon(&pact.id, "partner").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Engine(EngineError::AlreadyTerminal { .. })
        ));
        // Status unchanged by the second call.
        assert_eq!(
            db.get_pact(&pact.id).unwrap().unwrap().status,
            PactStatus::Abandoned
        );
    }

    #[test]
    fn solo_pact_activates_without_acceptance() {
        let (db, clock, config) = setup();
        let goal_id = make_goal(&db, &clock);
        let lifecycle = PactLifecycle::new(&db, &clock, &config);
        let (pact, _) = lifecycle
            .create(
                "creator",
                NewPact {
                    habit_goal_id: goal_id,
                    partner_user_id: None,
                    pact_type: None,
                    duration_days: Some(7),
                    consequence_type: None,
                    consequence_details: None,
                },
            )
            .unwrap();

        let (active, _) = lifecycle.activate_solo(&pact.id, "creator").unwrap();
        assert_eq!(active.status, PactStatus::Active);
    }

    #[test]
    fn create_bumps_goal_usage_for_solo_and_paired_pacts() {
        let (db, clock, config) = setup();
        let goal_id = make_goal(&db, &clock);
        let lifecycle = PactLifecycle::new(&db, &clock, &config);

        lifecycle
            .create(
                "creator",
                NewPact {
                    habit_goal_id: goal_id.clone(),
                    partner_user_id: None,
                    pact_type: None,
                    duration_days: Some(7),
                    consequence_type: None,
                    consequence_details: None,
                },
            )
            .unwrap();
        assert_eq!(db.get_goal(&goal_id).unwrap().unwrap().usage_count, 1);

        lifecycle
            .create(
                "creator",
                NewPact {
                    habit_goal_id: goal_id.clone(),
                    partner_user_id: Some("partner".into()),
                    pact_type: None,
                    duration_days: Some(7),
                    consequence_type: None,
                    consequence_details: None,
                },
            )
            .unwrap();
        assert_eq!(db.get_goal(&goal_id).unwrap().unwrap().usage_count, 2);
    }

    #[test]
    fn expire_sweep_is_idempotent() {
        let (db, clock, config) = setup();
        let pact = invite(&db, &clock, &config);
        let lifecycle = PactLifecycle::new(&db, &clock, &config);
        lifecycle.accept(&pact.id, "partner").unwrap();

        clock.advance_days(31);
        let first = lifecycle.expire_due().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0.status, PactStatus::Expired);

        let second = lifecycle.expire_due().unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn invalid_duration_rejected() {
        let (db, clock, config) = setup();
        let goal_id = make_goal(&db, &clock);
        let lifecycle = PactLifecycle::new(&db, &clock, &config);
        let err = lifecycle
            .create(
                "creator",
                NewPact {
                    habit_goal_id: goal_id,
                    partner_user_id: None,
                    pact_type: None,
                    duration_days: Some(45),
                    consequence_type: None,
                    consequence_details: None,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Engine(EngineError::ConstraintViolation(_))
        ));
    }
}
