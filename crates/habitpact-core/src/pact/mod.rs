//! Accountability pacts.
//!
//! A pact is a time-boxed contract between one or two users tied to a habit
//! goal. This module holds the pact and member records plus the pure
//! helpers; the state machine lives in [`lifecycle`].

mod lifecycle;

pub use lifecycle::{NewPact, PactLifecycle};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Pact durations accepted at creation time, in days.
pub const VALID_DURATIONS: [u32; 5] = [7, 14, 30, 60, 90];

/// How long a pending invite stays acceptable, in days.
pub const DEFAULT_INVITATION_EXPIRY_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PactStatus {
    Pending,
    Active,
    Completed,
    Abandoned,
    Expired,
    Declined,
}

impl PactStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, PactStatus::Pending | PactStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PactType {
    Accountability,
    Challenge,
    Support,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsequenceType {
    None,
    Donation,
    Dare,
    Custom,
}

/// Which party ended the pact, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    AbandonedCreator,
    AbandonedPartner,
    Declined,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pact {
    pub id: String,
    pub creator_user_id: String,
    /// Absent for solo pacts.
    pub partner_user_id: Option<String>,
    pub habit_goal_id: String,
    pub pact_type: PactType,
    pub status: PactStatus,
    pub duration_days: u32,
    pub start_date: Option<DateTime<Utc>>,
    /// Derived: `start_date + duration_days`. Recomputed whenever
    /// `start_date` is set.
    pub end_date: Option<DateTime<Utc>>,
    pub consequence_type: ConsequenceType,
    pub consequence_details: Option<serde_json::Value>,
    pub end_reason: Option<EndReason>,
    pub winner_id: Option<String>,
    pub creator_completion_rate: Option<f64>,
    pub partner_completion_rate: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pact {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.creator_user_id == user_id || self.partner_user_id.as_deref() == Some(user_id)
    }

    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator_user_id == user_id
    }

    /// The other participant, if the given user is a participant at all.
    pub fn partner_of(&self, user_id: &str) -> Option<&str> {
        if self.creator_user_id == user_id {
            self.partner_user_id.as_deref()
        } else if self.partner_user_id.as_deref() == Some(user_id) {
            Some(self.creator_user_id.as_str())
        } else {
            None
        }
    }

    pub fn is_solo(&self) -> bool {
        self.partner_user_id.is_none()
    }

    /// Whole days left until the end date; 0 once past it (or unstarted).
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        match self.end_date {
            Some(end) if end > now => {
                let secs = (end - now).num_seconds();
                // Ceiling division: a partial day still counts as remaining.
                (secs + 86_399) / 86_400
            }
            _ => 0,
        }
    }

    /// Elapsed share of the pact window, clamped to 0..=100.
    pub fn progress_pct(&self, now: DateTime<Utc>) -> u32 {
        let (start, end) = match (self.start_date, self.end_date) {
            (Some(s), Some(e)) => (s, e),
            _ => return 0,
        };
        let total = (end - start).num_seconds();
        if total <= 0 {
            return 100;
        }
        let elapsed = (now - start).num_seconds();
        let pct = (elapsed as f64 / total as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u32
    }

    /// A pending invite goes stale after `expiry_days`.
    pub fn invitation_expired(&self, now: DateTime<Utc>, expiry_days: i64) -> bool {
        self.status == PactStatus::Pending && (now - self.created_at).num_days() > expiry_days
    }
}

/// Compute the derived end date from a start date and duration.
pub fn end_date_for(start: DateTime<Utc>, duration_days: u32) -> DateTime<Utc> {
    start + Duration::days(i64::from(duration_days))
}

/// Validate creation parameters: duration must be one of the allowed
/// windows, and a donation consequence needs a positive amount.
pub fn validate_pact_params(
    duration_days: u32,
    consequence_type: ConsequenceType,
    consequence_details: Option<&serde_json::Value>,
) -> Result<(), String> {
    if !VALID_DURATIONS.contains(&duration_days) {
        return Err(format!(
            "duration must be one of: {} days",
            VALID_DURATIONS
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    if consequence_type == ConsequenceType::Donation {
        let amount = consequence_details
            .and_then(|d| d.get("amount"))
            .and_then(|a| a.as_f64())
            .unwrap_or(0.0);
        if amount <= 0.0 {
            return Err("donation amount must be greater than 0".to_string());
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Creator,
    Partner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Pending,
    Active,
    Left,
}

/// One row per pact participant, carrying that member's running counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PactMember {
    pub id: String,
    pub pact_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
    pub total_checkins: u32,
    pub completed_checkins: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Percentage, rounded to 2 decimal places.
    pub completion_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pact_at(status: PactStatus, start: Option<DateTime<Utc>>, duration: u32) -> Pact {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        Pact {
            id: "p1".into(),
            creator_user_id: "creator".into(),
            partner_user_id: Some("partner".into()),
            habit_goal_id: "g1".into(),
            pact_type: PactType::Accountability,
            status,
            duration_days: duration,
            start_date: start,
            end_date: start.map(|s| end_date_for(s, duration)),
            consequence_type: ConsequenceType::None,
            consequence_details: None,
            end_reason: None,
            winner_id: None,
            creator_completion_rate: None,
            partner_completion_rate: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn duration_validation() {
        assert!(validate_pact_params(30, ConsequenceType::None, None).is_ok());
        assert!(validate_pact_params(31, ConsequenceType::None, None).is_err());
    }

    #[test]
    fn donation_needs_positive_amount() {
        let details = serde_json::json!({ "amount": 25.0 });
        assert!(validate_pact_params(7, ConsequenceType::Donation, Some(&details)).is_ok());

        let zero = serde_json::json!({ "amount": 0 });
        assert!(validate_pact_params(7, ConsequenceType::Donation, Some(&zero)).is_err());
        assert!(validate_pact_params(7, ConsequenceType::Donation, None).is_err());
    }

    #[test]
    fn participant_helpers() {
        let pact = pact_at(PactStatus::Active, None, 30);
        assert!(pact.is_participant("creator"));
        assert!(pact.is_participant("partner"));
        assert!(!pact.is_participant("stranger"));
        assert_eq!(pact.partner_of("creator"), Some("partner"));
        assert_eq!(pact.partner_of("partner"), Some("creator"));
        assert_eq!(pact.partner_of("stranger"), None);
    }

    #[test]
    fn end_date_derivation() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let end = end_date_for(start, 30);
        assert_eq!((end - start).num_days(), 30);
    }

    #[test]
    fn days_remaining_and_progress() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let pact = pact_at(PactStatus::Active, Some(start), 30);

        let mid = Utc.with_ymd_and_hms(2025, 6, 16, 0, 0, 0).unwrap();
        assert_eq!(pact.days_remaining(mid), 15);
        assert_eq!(pact.progress_pct(mid), 50);

        let after = Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap();
        assert_eq!(pact.days_remaining(after), 0);
        assert_eq!(pact.progress_pct(after), 100);
    }

    #[test]
    fn invitation_expiry() {
        let pact = pact_at(PactStatus::Pending, None, 30);
        let fresh = Utc.with_ymd_and_hms(2025, 6, 5, 0, 0, 0).unwrap();
        let stale = Utc.with_ymd_and_hms(2025, 6, 10, 0, 0, 0).unwrap();
        assert!(!pact.invitation_expired(fresh, DEFAULT_INVITATION_EXPIRY_DAYS));
        assert!(pact.invitation_expired(stale, DEFAULT_INVITATION_EXPIRY_DAYS));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!PactStatus::Pending.is_terminal());
        assert!(!PactStatus::Active.is_terminal());
        assert!(PactStatus::Completed.is_terminal());
        assert!(PactStatus::Abandoned.is_terminal());
        assert!(PactStatus::Expired.is_terminal());
        assert!(PactStatus::Declined.is_terminal());
    }
}
