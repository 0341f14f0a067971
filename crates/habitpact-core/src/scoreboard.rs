//! Per-pact scoring.
//!
//! Member counters are incremented exactly once per checkin outcome (the
//! ledger's outcome gating guarantees at most one outcome per row), and a
//! terminating pact gets its completion rates and winner frozen exactly
//! once, by whichever path won the terminal compare-and-set.

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::events::Event;
use crate::pact::{MemberRole, Pact, PactMember, PactStatus};
use crate::storage::{Config, Database};

/// Two rates closer than this count as a draw.
pub const DRAW_THRESHOLD: f64 = 0.01;

/// How a drawn two-player pact is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// A draw names no winner.
    #[default]
    NoWinner,
    /// A draw counts as a win for both participants.
    SplitWin,
}

/// Percentage of scheduled checkins completed, rounded to 2 decimals.
/// 0 when nothing was scheduled.
pub fn completion_rate(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (f64::from(completed) / f64::from(total) * 10000.0).round() / 100.0
}

/// Frozen result of a terminated pact.
#[derive(Debug, Clone)]
pub struct PactOutcome {
    pub pact: Pact,
    /// Zero entries on a no-winner draw (or a solo pact), one on a decisive
    /// result, two on a split-win draw.
    pub winners: Vec<String>,
    pub creator_completion_rate: f64,
    pub partner_completion_rate: Option<f64>,
}

pub struct PactScoreboard<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    config: &'a Config,
}

impl<'a> PactScoreboard<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock, config: &'a Config) -> Self {
        Self { db, clock, config }
    }

    /// Fold one checkin outcome into a member's counters: total attempts,
    /// completions, recomputed rate, and the member's streak snapshot.
    /// Runs as a single store transaction.
    pub fn increment_checkin_stats(
        &self,
        pact_id: &str,
        user_id: &str,
        completed: bool,
        current_streak: Option<u32>,
    ) -> Result<PactMember> {
        let member = self
            .db
            .member_by_pact_and_user(pact_id, user_id)?
            .ok_or_else(|| EngineError::not_found("pact member", user_id))?;
        Ok(self
            .db
            .increment_member_stats(&member.id, completed, current_streak, self.clock.now())?)
    }

    pub fn member_stats(&self, pact_id: &str) -> Result<Vec<PactMember>> {
        Ok(self.db.members_of_pact(pact_id)?)
    }

    /// Freeze the final rates and winner onto a pact that just entered a
    /// terminal state. Emits `PactCompleted` only for a natural completion;
    /// abandon/expire transitions already produced their own event.
    ///
    /// Callers invoke this only after winning the terminal compare-and-set,
    /// which is what makes the snapshot exactly-once.
    pub fn finalize(&self, pact_id: &str) -> Result<(PactOutcome, Option<Event>)> {
        let pact = self
            .db
            .get_pact(pact_id)?
            .ok_or_else(|| EngineError::not_found("pact", pact_id))?;
        if !pact.status.is_terminal() {
            return Err(EngineError::InvalidTransition(
                "cannot finalize a pact that is still running".into(),
            )
            .into());
        }

        let members = self.db.members_of_pact(pact_id)?;
        let rate_of = |role: MemberRole| {
            members
                .iter()
                .find(|m| m.role == role)
                .map(|m| completion_rate(m.completed_checkins, m.total_checkins))
        };
        let creator_rate = rate_of(MemberRole::Creator).unwrap_or(0.0);
        let partner_rate = if pact.is_solo() {
            None
        } else {
            Some(rate_of(MemberRole::Partner).unwrap_or(0.0))
        };

        let winners = self.pick_winners(&pact, creator_rate, partner_rate);
        let winner_id = match winners.as_slice() {
            [single] => Some(single.clone()),
            _ => None,
        };

        let now = self.clock.now();
        self.db.set_pact_outcome(
            pact_id,
            winner_id.as_deref(),
            creator_rate,
            partner_rate,
            now,
        )?;

        let pact = self
            .db
            .get_pact(pact_id)?
            .ok_or_else(|| EngineError::not_found("pact", pact_id))?;
        let event = (pact.status == PactStatus::Completed).then(|| Event::PactCompleted {
            pact_id: pact_id.to_string(),
            winner_id,
            creator_completion_rate: creator_rate,
            partner_completion_rate: partner_rate,
            at: now,
        });

        Ok((
            PactOutcome {
                pact,
                winners,
                creator_completion_rate: creator_rate,
                partner_completion_rate: partner_rate,
            },
            event,
        ))
    }

    fn pick_winners(
        &self,
        pact: &Pact,
        creator_rate: f64,
        partner_rate: Option<f64>,
    ) -> Vec<String> {
        let partner_rate = match partner_rate {
            Some(rate) => rate,
            // Solo pacts have no contest.
            None => return Vec::new(),
        };
        let partner_id = match &pact.partner_user_id {
            Some(id) => id.clone(),
            None => return Vec::new(),
        };

        if (creator_rate - partner_rate).abs() < DRAW_THRESHOLD {
            match self.config.pact.tie_policy {
                TiePolicy::NoWinner => Vec::new(),
                TiePolicy::SplitWin => vec![pact.creator_user_id.clone(), partner_id],
            }
        } else if creator_rate > partner_rate {
            vec![pact.creator_user_id.clone()]
        } else {
            vec![partner_id]
        }
    }
}
