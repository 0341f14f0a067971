use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Every externally observable state change produces an Event.
///
/// Events are returned to the caller rather than dispatched inline: a
/// notification dispatcher is fire-and-forget, and its failure must never
/// roll back the domain transaction that produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A checkin transitioned to `completed` for the first time.
    CheckinCompleted {
        checkin_id: String,
        user_id: String,
        habit_goal_id: String,
        pact_id: Option<String>,
        scheduled_date: NaiveDate,
        at: DateTime<Utc>,
    },
    /// A checkin transitioned to `missed` for the first time.
    CheckinMissed {
        checkin_id: String,
        user_id: String,
        habit_goal_id: String,
        pact_id: Option<String>,
        scheduled_date: NaiveDate,
        at: DateTime<Utc>,
    },
    /// A streak crossed a milestone threshold for the first time.
    StreakMilestone {
        streak_id: String,
        user_id: String,
        habit_goal_id: String,
        milestone: u32,
        current_streak: u32,
        at: DateTime<Utc>,
    },
    /// A streak was reset by a miss that grace could not cover.
    StreakBroken {
        streak_id: String,
        user_id: String,
        habit_goal_id: String,
        streak_before: u32,
        at: DateTime<Utc>,
    },
    /// A pact was created with a pending partner invite.
    PactInvited {
        pact_id: String,
        creator_user_id: String,
        partner_user_id: String,
        at: DateTime<Utc>,
    },
    /// A pact went active (invite accepted, or solo activation).
    PactActivated {
        pact_id: String,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    PactDeclined {
        pact_id: String,
        partner_user_id: String,
        at: DateTime<Utc>,
    },
    PactAbandoned {
        pact_id: String,
        abandoned_by: String,
        at: DateTime<Utc>,
    },
    PactExpired {
        pact_id: String,
        at: DateTime<Utc>,
    },
    PactCompleted {
        pact_id: String,
        winner_id: Option<String>,
        creator_completion_rate: f64,
        partner_completion_rate: Option<f64>,
        at: DateTime<Utc>,
    },
    /// A member of an active pact checked in; the other member is notified.
    PartnerCheckedIn {
        pact_id: String,
        user_id: String,
        partner_user_id: String,
        scheduled_date: NaiveDate,
        at: DateTime<Utc>,
    },
}
