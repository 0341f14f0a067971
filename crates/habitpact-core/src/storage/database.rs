//! SQLite-based storage for goals, pacts, checkins, and streaks.
//!
//! All rows use Uuid string primary keys; timestamps are stored RFC3339 and
//! calendar dates as `YYYY-MM-DD` text, both of which compare correctly as
//! strings. The compare-and-set pact transitions and the checkin upsert are
//! implemented here so their atomicity lives next to the schema that
//! guarantees it.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{data_dir, migrations};
use crate::checkin::{CheckinPatch, CheckinStatus, HabitCheckin};
use crate::error::DatabaseError;
use crate::goal::{FrequencyType, HabitGoal};
use crate::pact::{
    ConsequenceType, EndReason, MemberRole, MemberStatus, Pact, PactMember, PactStatus, PactType,
};
use crate::streak::{HistoryEventType, Streak, StreakHistoryEvent};

// === Helper Functions ===

fn parse_frequency_type(s: &str) -> FrequencyType {
    match s {
        "weekly" => FrequencyType::Weekly,
        "custom" => FrequencyType::Custom,
        _ => FrequencyType::Daily,
    }
}

fn format_frequency_type(f: FrequencyType) -> &'static str {
    match f {
        FrequencyType::Daily => "daily",
        FrequencyType::Weekly => "weekly",
        FrequencyType::Custom => "custom",
    }
}

fn parse_pact_status(s: &str) -> PactStatus {
    match s {
        "active" => PactStatus::Active,
        "completed" => PactStatus::Completed,
        "abandoned" => PactStatus::Abandoned,
        "expired" => PactStatus::Expired,
        "declined" => PactStatus::Declined,
        _ => PactStatus::Pending,
    }
}

fn format_pact_status(s: PactStatus) -> &'static str {
    match s {
        PactStatus::Pending => "pending",
        PactStatus::Active => "active",
        PactStatus::Completed => "completed",
        PactStatus::Abandoned => "abandoned",
        PactStatus::Expired => "expired",
        PactStatus::Declined => "declined",
    }
}

fn parse_pact_type(s: &str) -> PactType {
    match s {
        "challenge" => PactType::Challenge,
        "support" => PactType::Support,
        _ => PactType::Accountability,
    }
}

fn format_pact_type(t: PactType) -> &'static str {
    match t {
        PactType::Accountability => "accountability",
        PactType::Challenge => "challenge",
        PactType::Support => "support",
    }
}

fn parse_consequence_type(s: &str) -> ConsequenceType {
    match s {
        "donation" => ConsequenceType::Donation,
        "dare" => ConsequenceType::Dare,
        "custom" => ConsequenceType::Custom,
        _ => ConsequenceType::None,
    }
}

fn format_consequence_type(c: ConsequenceType) -> &'static str {
    match c {
        ConsequenceType::None => "none",
        ConsequenceType::Donation => "donation",
        ConsequenceType::Dare => "dare",
        ConsequenceType::Custom => "custom",
    }
}

fn parse_end_reason(s: Option<&str>) -> Option<EndReason> {
    match s {
        Some("completed") => Some(EndReason::Completed),
        Some("abandoned_creator") => Some(EndReason::AbandonedCreator),
        Some("abandoned_partner") => Some(EndReason::AbandonedPartner),
        Some("declined") => Some(EndReason::Declined),
        Some("expired") => Some(EndReason::Expired),
        _ => None,
    }
}

fn format_end_reason(r: EndReason) -> &'static str {
    match r {
        EndReason::Completed => "completed",
        EndReason::AbandonedCreator => "abandoned_creator",
        EndReason::AbandonedPartner => "abandoned_partner",
        EndReason::Declined => "declined",
        EndReason::Expired => "expired",
    }
}

fn parse_member_role(s: &str) -> MemberRole {
    match s {
        "partner" => MemberRole::Partner,
        _ => MemberRole::Creator,
    }
}

fn format_member_role(r: MemberRole) -> &'static str {
    match r {
        MemberRole::Creator => "creator",
        MemberRole::Partner => "partner",
    }
}

fn parse_member_status(s: &str) -> MemberStatus {
    match s {
        "active" => MemberStatus::Active,
        "left" => MemberStatus::Left,
        _ => MemberStatus::Pending,
    }
}

fn format_member_status(s: MemberStatus) -> &'static str {
    match s {
        MemberStatus::Pending => "pending",
        MemberStatus::Active => "active",
        MemberStatus::Left => "left",
    }
}

fn parse_checkin_status(s: &str) -> CheckinStatus {
    match s {
        "completed" => CheckinStatus::Completed,
        "partial" => CheckinStatus::Partial,
        "skipped" => CheckinStatus::Skipped,
        "missed" => CheckinStatus::Missed,
        _ => CheckinStatus::Pending,
    }
}

fn format_checkin_status(s: CheckinStatus) -> &'static str {
    match s {
        CheckinStatus::Pending => "pending",
        CheckinStatus::Completed => "completed",
        CheckinStatus::Partial => "partial",
        CheckinStatus::Skipped => "skipped",
        CheckinStatus::Missed => "missed",
    }
}

fn parse_history_type(s: &str) -> HistoryEventType {
    match s {
        "missed" => HistoryEventType::Missed,
        "grace_used" => HistoryEventType::GraceUsed,
        "milestone_reached" => HistoryEventType::MilestoneReached,
        _ => HistoryEventType::Completed,
    }
}

fn format_history_type(t: HistoryEventType) -> &'static str {
    match t {
        HistoryEventType::Completed => "completed",
        HistoryEventType::Missed => "missed",
        HistoryEventType::GraceUsed => "grace_used",
        HistoryEventType::MilestoneReached => "milestone_reached",
    }
}

/// Parse datetime from RFC3339 string with fallback to current time.
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_datetime(dt_str: Option<String>) -> Option<DateTime<Utc>> {
    dt_str.as_deref().map(parse_datetime_fallback)
}

fn parse_date_fallback(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap_or_else(|_| Utc::now().date_naive())
}

fn parse_opt_date(date_str: Option<String>) -> Option<NaiveDate> {
    date_str.as_deref().map(parse_date_fallback)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Weekday lists are stored as a JSON array in a TEXT column.
fn parse_days_of_week(s: Option<String>) -> Option<Vec<u8>> {
    s.as_deref().and_then(|s| serde_json::from_str(s).ok())
}

fn row_to_goal(row: &rusqlite::Row) -> Result<HabitGoal, rusqlite::Error> {
    let frequency_str: String = row.get(5)?;
    Ok(HabitGoal {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        emoji: row.get(4)?,
        frequency_type: parse_frequency_type(&frequency_str),
        frequency_count: row.get(6)?,
        target_days_of_week: parse_days_of_week(row.get(7)?),
        created_by_user_id: row.get(8)?,
        is_template: row.get(9)?,
        is_public: row.get(10)?,
        usage_count: row.get(11)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(12)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(13)?),
    })
}

fn row_to_pact(row: &rusqlite::Row) -> Result<Pact, rusqlite::Error> {
    let pact_type_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let consequence_str: String = row.get(9)?;
    let end_reason_str: Option<String> = row.get(11)?;
    let details_str: Option<String> = row.get(10)?;
    Ok(Pact {
        id: row.get(0)?,
        creator_user_id: row.get(1)?,
        partner_user_id: row.get(2)?,
        habit_goal_id: row.get(3)?,
        pact_type: parse_pact_type(&pact_type_str),
        status: parse_pact_status(&status_str),
        duration_days: row.get(6)?,
        start_date: parse_opt_datetime(row.get(7)?),
        end_date: parse_opt_datetime(row.get(8)?),
        consequence_type: parse_consequence_type(&consequence_str),
        consequence_details: details_str.as_deref().and_then(|s| serde_json::from_str(s).ok()),
        end_reason: parse_end_reason(end_reason_str.as_deref()),
        winner_id: row.get(12)?,
        creator_completion_rate: row.get(13)?,
        partner_completion_rate: row.get(14)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(15)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(16)?),
    })
}

fn row_to_member(row: &rusqlite::Row) -> Result<PactMember, rusqlite::Error> {
    let role_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    Ok(PactMember {
        id: row.get(0)?,
        pact_id: row.get(1)?,
        user_id: row.get(2)?,
        role: parse_member_role(&role_str),
        status: parse_member_status(&status_str),
        joined_at: parse_opt_datetime(row.get(5)?),
        left_at: parse_opt_datetime(row.get(6)?),
        total_checkins: row.get(7)?,
        completed_checkins: row.get(8)?,
        current_streak: row.get(9)?,
        longest_streak: row.get(10)?,
        completion_rate: row.get(11)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(12)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(13)?),
    })
}

fn row_to_checkin(row: &rusqlite::Row) -> Result<HabitCheckin, rusqlite::Error> {
    let status_str: String = row.get(6)?;
    Ok(HabitCheckin {
        id: row.get(0)?,
        user_id: row.get(1)?,
        pact_id: row.get(2)?,
        habit_goal_id: row.get(3)?,
        scheduled_date: parse_date_fallback(&row.get::<_, String>(4)?),
        completed_at: parse_opt_datetime(row.get(5)?),
        status: parse_checkin_status(&status_str),
        notes: row.get(7)?,
        self_rating: row.get(8)?,
        difficulty_rating: row.get(9)?,
        has_proof: row.get(10)?,
        proof_verified: row.get(11)?,
        contributed_to_streak: row.get(12)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(13)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(14)?),
    })
}

fn row_to_streak(row: &rusqlite::Row) -> Result<Streak, rusqlite::Error> {
    Ok(Streak {
        id: row.get(0)?,
        user_id: row.get(1)?,
        habit_goal_id: row.get(2)?,
        pact_id: row.get(3)?,
        current_streak: row.get(4)?,
        current_streak_start_date: parse_opt_date(row.get(5)?),
        last_completed_date: parse_opt_date(row.get(6)?),
        longest_streak: row.get(7)?,
        longest_streak_start_date: parse_opt_date(row.get(8)?),
        longest_streak_end_date: parse_opt_date(row.get(9)?),
        grace_period_days: row.get(10)?,
        grace_days_used: row.get(11)?,
        is_active: row.get(12)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(13)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(14)?),
    })
}

fn row_to_history(row: &rusqlite::Row) -> Result<StreakHistoryEvent, rusqlite::Error> {
    let type_str: String = row.get(3)?;
    Ok(StreakHistoryEvent {
        id: row.get(0)?,
        streak_id: row.get(1)?,
        user_id: row.get(2)?,
        event_type: parse_history_type(&type_str),
        event_date: parse_date_fallback(&row.get::<_, String>(4)?),
        streak_value: row.get(5)?,
        milestone: row.get(6)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(7)?),
    })
}

const GOAL_COLS: &str = "id, name, description, category, emoji, frequency_type, \
     frequency_count, target_days_of_week, created_by_user_id, is_template, \
     is_public, usage_count, created_at, updated_at";

const PACT_COLS: &str = "id, creator_user_id, partner_user_id, habit_goal_id, pact_type, \
     status, duration_days, start_date, end_date, consequence_type, \
     consequence_details, end_reason, winner_id, creator_completion_rate, \
     partner_completion_rate, created_at, updated_at";

const MEMBER_COLS: &str = "id, pact_id, user_id, role, status, joined_at, left_at, \
     total_checkins, completed_checkins, current_streak, longest_streak, \
     completion_rate, created_at, updated_at";

const CHECKIN_COLS: &str = "id, user_id, pact_id, habit_goal_id, scheduled_date, completed_at, \
     status, notes, self_rating, difficulty_rating, has_proof, proof_verified, \
     contributed_to_streak, created_at, updated_at";

const STREAK_COLS: &str = "id, user_id, habit_goal_id, pact_id, current_streak, \
     current_streak_start_date, last_completed_date, longest_streak, \
     longest_streak_start_date, longest_streak_end_date, grace_period_days, \
     grace_days_used, is_active, created_at, updated_at";

const HISTORY_COLS: &str =
    "id, streak_id, user_id, event_type, event_date, streak_value, milestone, created_at";

/// SQLite database for the accountability engine.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/habitpact/habitpact.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let path = dir.join("habitpact.db");
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let db = Self { conn };
        migrations::migrate(&db.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        migrations::migrate(&db.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(db)
    }

    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // === Goals ===

    pub fn insert_goal(&self, goal: &HabitGoal) -> Result<(), DatabaseError> {
        let days = goal
            .target_days_of_week
            .as_ref()
            .map(|d| serde_json::to_string(d).unwrap_or_else(|_| "[]".into()));
        self.conn.execute(
            "INSERT INTO habit_goals (id, name, description, category, emoji,
                frequency_type, frequency_count, target_days_of_week,
                created_by_user_id, is_template, is_public, usage_count,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                goal.id,
                goal.name,
                goal.description,
                goal.category,
                goal.emoji,
                format_frequency_type(goal.frequency_type),
                goal.frequency_count,
                days,
                goal.created_by_user_id,
                goal.is_template,
                goal.is_public,
                goal.usage_count,
                goal.created_at.to_rfc3339(),
                goal.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_goal(&self, id: &str) -> Result<Option<HabitGoal>, DatabaseError> {
        let sql = format!("SELECT {GOAL_COLS} FROM habit_goals WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_goal)
            .optional()?)
    }

    pub fn goals_by_user(&self, user_id: &str) -> Result<Vec<HabitGoal>, DatabaseError> {
        let sql = format!(
            "SELECT {GOAL_COLS} FROM habit_goals
             WHERE created_by_user_id = ?1 ORDER BY created_at DESC"
        );
        self.collect(&sql, params![user_id], row_to_goal)
    }

    pub fn goal_templates(&self, category: Option<&str>) -> Result<Vec<HabitGoal>, DatabaseError> {
        let sql = format!(
            "SELECT {GOAL_COLS} FROM habit_goals
             WHERE is_template = 1 AND (?1 IS NULL OR category = ?1)
             ORDER BY usage_count DESC, name ASC"
        );
        self.collect(&sql, params![category], row_to_goal)
    }

    pub fn public_goals(&self, category: Option<&str>) -> Result<Vec<HabitGoal>, DatabaseError> {
        let sql = format!(
            "SELECT {GOAL_COLS} FROM habit_goals
             WHERE is_public = 1 AND is_template = 0
               AND (?1 IS NULL OR category = ?1)
             ORDER BY usage_count DESC, name ASC"
        );
        self.collect(&sql, params![category], row_to_goal)
    }

    /// Case-insensitive name search across templates and public goals.
    pub fn search_goals(&self, term: &str, limit: u32) -> Result<Vec<HabitGoal>, DatabaseError> {
        let sql = format!(
            "SELECT {GOAL_COLS} FROM habit_goals
             WHERE (is_template = 1 OR is_public = 1)
               AND name LIKE '%' || ?1 || '%' COLLATE NOCASE
             ORDER BY usage_count DESC LIMIT ?2"
        );
        self.collect(&sql, params![term, limit], row_to_goal)
    }

    pub fn update_goal(&self, goal: &HabitGoal) -> Result<(), DatabaseError> {
        let days = goal
            .target_days_of_week
            .as_ref()
            .map(|d| serde_json::to_string(d).unwrap_or_else(|_| "[]".into()));
        self.conn.execute(
            "UPDATE habit_goals SET name = ?2, description = ?3, category = ?4,
                emoji = ?5, frequency_type = ?6, frequency_count = ?7,
                target_days_of_week = ?8, is_public = ?9, updated_at = ?10
             WHERE id = ?1",
            params![
                goal.id,
                goal.name,
                goal.description,
                goal.category,
                goal.emoji,
                format_frequency_type(goal.frequency_type),
                goal.frequency_count,
                days,
                goal.is_public,
                goal.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn increment_goal_usage(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE habit_goals SET usage_count = usage_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn delete_goal(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM habit_goals WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn goal_has_active_pacts(&self, goal_id: &str) -> Result<bool, DatabaseError> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM pacts
                WHERE habit_goal_id = ?1 AND status IN ('pending', 'active'))",
            params![goal_id],
            |row| row.get(0),
        )?)
    }

    pub fn goal_has_active_streaks(&self, goal_id: &str) -> Result<bool, DatabaseError> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM streaks
                WHERE habit_goal_id = ?1 AND is_active = 1 AND current_streak > 0)",
            params![goal_id],
            |row| row.get(0),
        )?)
    }

    // === Pacts ===

    pub fn insert_pact(&self, pact: &Pact) -> Result<(), DatabaseError> {
        let details = pact
            .consequence_details
            .as_ref()
            .map(|d| d.to_string());
        self.conn.execute(
            "INSERT INTO pacts (id, creator_user_id, partner_user_id, habit_goal_id,
                pact_type, status, duration_days, start_date, end_date,
                consequence_type, consequence_details, end_reason, winner_id,
                creator_completion_rate, partner_completion_rate, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                pact.id,
                pact.creator_user_id,
                pact.partner_user_id,
                pact.habit_goal_id,
                format_pact_type(pact.pact_type),
                format_pact_status(pact.status),
                pact.duration_days,
                pact.start_date.map(|d| d.to_rfc3339()),
                pact.end_date.map(|d| d.to_rfc3339()),
                format_consequence_type(pact.consequence_type),
                details,
                pact.end_reason.map(format_end_reason),
                pact.winner_id,
                pact.creator_completion_rate,
                pact.partner_completion_rate,
                pact.created_at.to_rfc3339(),
                pact.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_pact(&self, id: &str) -> Result<Option<Pact>, DatabaseError> {
        let sql = format!("SELECT {PACT_COLS} FROM pacts WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_pact)
            .optional()?)
    }

    pub fn pacts_for_user(
        &self,
        user_id: &str,
        status: Option<PactStatus>,
    ) -> Result<Vec<Pact>, DatabaseError> {
        let sql = format!(
            "SELECT {PACT_COLS} FROM pacts
             WHERE (creator_user_id = ?1 OR partner_user_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC"
        );
        self.collect(&sql, params![user_id, status.map(format_pact_status)], row_to_pact)
    }

    pub fn pending_invites_for(&self, user_id: &str) -> Result<Vec<Pact>, DatabaseError> {
        let sql = format!(
            "SELECT {PACT_COLS} FROM pacts
             WHERE partner_user_id = ?1 AND status = 'pending'
             ORDER BY created_at DESC"
        );
        self.collect(&sql, params![user_id], row_to_pact)
    }

    /// Active pacts whose end date has passed.
    pub fn due_pacts(&self, now: DateTime<Utc>) -> Result<Vec<Pact>, DatabaseError> {
        let sql = format!(
            "SELECT {PACT_COLS} FROM pacts
             WHERE status = 'active' AND end_date IS NOT NULL AND end_date <= ?1
             ORDER BY end_date ASC"
        );
        self.collect(&sql, params![now.to_rfc3339()], row_to_pact)
    }

    /// Compare-and-set: pending -> active. Returns false if the pact was
    /// not pending.
    pub fn activate_pact_if_pending(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE pacts SET status = 'active', start_date = ?2, end_date = ?3,
                updated_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, start.to_rfc3339(), end.to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    /// Compare-and-set: pending -> declined.
    pub fn decline_pact_if_pending(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE pacts SET status = 'declined', end_reason = 'declined', updated_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, now.to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    /// Compare-and-set: active -> abandoned.
    pub fn abandon_pact_if_active(
        &self,
        id: &str,
        reason: EndReason,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE pacts SET status = 'abandoned', end_reason = ?3, updated_at = ?2
             WHERE id = ?1 AND status = 'active'",
            params![id, now.to_rfc3339(), format_end_reason(reason)],
        )?;
        Ok(changed == 1)
    }

    /// Compare-and-set: active -> expired.
    pub fn expire_pact_if_active(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE pacts SET status = 'expired', end_reason = 'expired', updated_at = ?2
             WHERE id = ?1 AND status = 'active'",
            params![id, now.to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    /// Compare-and-set: active -> completed.
    pub fn complete_pact_if_active(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE pacts SET status = 'completed', end_reason = 'completed', updated_at = ?2
             WHERE id = ?1 AND status = 'active'",
            params![id, now.to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    /// Freeze the final rates and winner onto a terminated pact.
    pub fn set_pact_outcome(
        &self,
        id: &str,
        winner_id: Option<&str>,
        creator_rate: f64,
        partner_rate: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE pacts SET winner_id = ?2, creator_completion_rate = ?3,
                partner_completion_rate = ?4, updated_at = ?5
             WHERE id = ?1",
            params![id, winner_id, creator_rate, partner_rate, now.to_rfc3339()],
        )?;
        Ok(())
    }

    // === Pact members ===

    pub fn insert_member(&self, member: &PactMember) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO pact_members (id, pact_id, user_id, role, status,
                joined_at, left_at, total_checkins, completed_checkins,
                current_streak, longest_streak, completion_rate, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                member.id,
                member.pact_id,
                member.user_id,
                format_member_role(member.role),
                format_member_status(member.status),
                member.joined_at.map(|d| d.to_rfc3339()),
                member.left_at.map(|d| d.to_rfc3339()),
                member.total_checkins,
                member.completed_checkins,
                member.current_streak,
                member.longest_streak,
                member.completion_rate,
                member.created_at.to_rfc3339(),
                member.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn member_by_pact_and_user(
        &self,
        pact_id: &str,
        user_id: &str,
    ) -> Result<Option<PactMember>, DatabaseError> {
        let sql = format!(
            "SELECT {MEMBER_COLS} FROM pact_members WHERE pact_id = ?1 AND user_id = ?2"
        );
        Ok(self
            .conn
            .query_row(&sql, params![pact_id, user_id], row_to_member)
            .optional()?)
    }

    pub fn members_of_pact(&self, pact_id: &str) -> Result<Vec<PactMember>, DatabaseError> {
        let sql = format!(
            "SELECT {MEMBER_COLS} FROM pact_members WHERE pact_id = ?1 ORDER BY role ASC"
        );
        self.collect(&sql, params![pact_id], row_to_member)
    }

    pub fn activate_member(
        &self,
        pact_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE pact_members SET status = 'active',
                joined_at = COALESCE(joined_at, ?3), updated_at = ?3
             WHERE pact_id = ?1 AND user_id = ?2",
            params![pact_id, user_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn leave_member(
        &self,
        pact_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE pact_members SET status = 'left', left_at = ?3, updated_at = ?3
             WHERE pact_id = ?1 AND user_id = ?2",
            params![pact_id, user_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Fold one checkin outcome into a member's counters in a single
    /// statement: totals, completion rate, and the streak snapshot with a
    /// monotonic longest.
    pub fn increment_member_stats(
        &self,
        member_id: &str,
        completed: bool,
        current_streak: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<PactMember, DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        let completed_inc: u32 = u32::from(completed);
        tx.execute(
            "UPDATE pact_members SET
                total_checkins = total_checkins + 1,
                completed_checkins = completed_checkins + ?2,
                current_streak = COALESCE(?3, current_streak),
                longest_streak = MAX(longest_streak, COALESCE(?3, current_streak)),
                completion_rate = ROUND((completed_checkins + ?2) * 10000.0
                    / (total_checkins + 1)) / 100.0,
                updated_at = ?4
             WHERE id = ?1",
            params![member_id, completed_inc, current_streak, now.to_rfc3339()],
        )?;
        let sql = format!("SELECT {MEMBER_COLS} FROM pact_members WHERE id = ?1");
        let member = tx.query_row(&sql, params![member_id], row_to_member)?;
        tx.commit()?;
        Ok(member)
    }

    // === Checkins ===

    /// Insert a new checkin or merge the patch into the existing row for
    /// `(user, goal, date)`. Runs in one transaction so concurrent attempts
    /// serialize against the unique index. Returns the row after the write,
    /// whether it was newly created, and the prior status for merges.
    pub fn upsert_checkin(
        &self,
        candidate: &HabitCheckin,
        patch: &CheckinPatch,
    ) -> Result<(HabitCheckin, bool, Option<CheckinStatus>), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;

        let sql = format!(
            "SELECT {CHECKIN_COLS} FROM habit_checkins
             WHERE user_id = ?1 AND habit_goal_id = ?2 AND scheduled_date = ?3"
        );
        let existing = tx
            .query_row(
                &sql,
                params![
                    candidate.user_id,
                    candidate.habit_goal_id,
                    format_date(candidate.scheduled_date)
                ],
                row_to_checkin,
            )
            .optional()?;

        let result = match existing {
            None => {
                Self::insert_checkin_tx(&tx, candidate)?;
                (candidate.clone(), true, None)
            }
            Some(mut row) => {
                let prior = row.status;
                // A row that already produced an outcome keeps its status:
                // allowing a downgrade back to pending would let a later
                // attempt mint a second outcome for the same day.
                if let Some(status) = patch.status {
                    if !prior.is_outcome() {
                        row.status = status;
                    }
                }
                // The first completion timestamp wins.
                if row.completed_at.is_none() {
                    row.completed_at = patch.completed_at;
                }
                if patch.notes.is_some() {
                    row.notes = patch.notes.clone();
                }
                if patch.self_rating.is_some() {
                    row.self_rating = patch.self_rating;
                }
                if patch.difficulty_rating.is_some() {
                    row.difficulty_rating = patch.difficulty_rating;
                }
                if let Some(has_proof) = patch.has_proof {
                    row.has_proof = has_proof;
                }
                row.updated_at = patch.updated_at;
                Self::update_checkin_tx(&tx, &row)?;
                (row, false, Some(prior))
            }
        };

        tx.commit()?;
        Ok(result)
    }

    fn insert_checkin_tx(
        conn: &Connection,
        checkin: &HabitCheckin,
    ) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO habit_checkins (id, user_id, pact_id, habit_goal_id,
                scheduled_date, completed_at, status, notes, self_rating,
                difficulty_rating, has_proof, proof_verified,
                contributed_to_streak, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                checkin.id,
                checkin.user_id,
                checkin.pact_id,
                checkin.habit_goal_id,
                format_date(checkin.scheduled_date),
                checkin.completed_at.map(|d| d.to_rfc3339()),
                format_checkin_status(checkin.status),
                checkin.notes,
                checkin.self_rating,
                checkin.difficulty_rating,
                checkin.has_proof,
                checkin.proof_verified,
                checkin.contributed_to_streak,
                checkin.created_at.to_rfc3339(),
                checkin.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update_checkin_tx(
        conn: &Connection,
        checkin: &HabitCheckin,
    ) -> Result<(), rusqlite::Error> {
        conn.execute(
            "UPDATE habit_checkins SET completed_at = ?2, status = ?3, notes = ?4,
                self_rating = ?5, difficulty_rating = ?6, has_proof = ?7,
                proof_verified = ?8, contributed_to_streak = ?9, updated_at = ?10
             WHERE id = ?1",
            params![
                checkin.id,
                checkin.completed_at.map(|d| d.to_rfc3339()),
                format_checkin_status(checkin.status),
                checkin.notes,
                checkin.self_rating,
                checkin.difficulty_rating,
                checkin.has_proof,
                checkin.proof_verified,
                checkin.contributed_to_streak,
                checkin.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_checkin(&self, id: &str) -> Result<Option<HabitCheckin>, DatabaseError> {
        let sql = format!("SELECT {CHECKIN_COLS} FROM habit_checkins WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_checkin)
            .optional()?)
    }

    pub fn update_checkin(&self, checkin: &HabitCheckin) -> Result<(), DatabaseError> {
        Self::update_checkin_tx(&self.conn, checkin)?;
        Ok(())
    }

    pub fn mark_checkin_contributed(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE habit_checkins SET contributed_to_streak = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn checkins_for_user_on_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<HabitCheckin>, DatabaseError> {
        let sql = format!(
            "SELECT {CHECKIN_COLS} FROM habit_checkins
             WHERE user_id = ?1 AND scheduled_date = ?2 ORDER BY created_at ASC"
        );
        self.collect(&sql, params![user_id, format_date(date)], row_to_checkin)
    }

    pub fn checkins_in_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<HabitCheckin>, DatabaseError> {
        let sql = format!(
            "SELECT {CHECKIN_COLS} FROM habit_checkins
             WHERE user_id = ?1 AND scheduled_date >= ?2 AND scheduled_date <= ?3
             ORDER BY scheduled_date ASC"
        );
        self.collect(
            &sql,
            params![user_id, format_date(from), format_date(to)],
            row_to_checkin,
        )
    }

    pub fn checkins_for_pact(&self, pact_id: &str) -> Result<Vec<HabitCheckin>, DatabaseError> {
        let sql = format!(
            "SELECT {CHECKIN_COLS} FROM habit_checkins
             WHERE pact_id = ?1 ORDER BY scheduled_date ASC"
        );
        self.collect(&sql, params![pact_id], row_to_checkin)
    }

    /// Pending checkins scheduled on or before the cutoff date.
    pub fn pending_checkins_through(
        &self,
        cutoff: NaiveDate,
    ) -> Result<Vec<HabitCheckin>, DatabaseError> {
        let sql = format!(
            "SELECT {CHECKIN_COLS} FROM habit_checkins
             WHERE status = 'pending' AND scheduled_date <= ?1
             ORDER BY scheduled_date ASC"
        );
        self.collect(&sql, params![format_date(cutoff)], row_to_checkin)
    }

    pub fn completed_count(
        &self,
        user_id: &str,
        habit_goal_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u32, DatabaseError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM habit_checkins
             WHERE user_id = ?1 AND habit_goal_id = ?2 AND status = 'completed'
               AND scheduled_date >= ?3 AND scheduled_date <= ?4",
            params![user_id, habit_goal_id, format_date(from), format_date(to)],
            |row| row.get(0),
        )?)
    }

    pub fn delete_checkin(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM habit_checkins WHERE id = ?1", params![id])?;
        Ok(())
    }

    // === Streaks ===

    /// Fetch the streak row for `(user, goal, pact)`, creating a fresh one
    /// with the given grace allowance if none exists yet.
    pub fn get_or_create_streak(
        &self,
        user_id: &str,
        habit_goal_id: &str,
        pact_id: Option<&str>,
        grace_period_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Streak, DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        let sql = format!(
            "SELECT {STREAK_COLS} FROM streaks
             WHERE user_id = ?1 AND habit_goal_id = ?2 AND pact_id IS ?3"
        );
        let existing = tx
            .query_row(&sql, params![user_id, habit_goal_id, pact_id], row_to_streak)
            .optional()?;

        let streak = match existing {
            Some(streak) => streak,
            None => {
                let streak = Streak {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    habit_goal_id: habit_goal_id.to_string(),
                    pact_id: pact_id.map(str::to_string),
                    current_streak: 0,
                    current_streak_start_date: None,
                    last_completed_date: None,
                    longest_streak: 0,
                    longest_streak_start_date: None,
                    longest_streak_end_date: None,
                    grace_period_days,
                    grace_days_used: 0,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                };
                tx.execute(
                    "INSERT INTO streaks (id, user_id, habit_goal_id, pact_id,
                        current_streak, current_streak_start_date, last_completed_date,
                        longest_streak, longest_streak_start_date, longest_streak_end_date,
                        grace_period_days, grace_days_used, is_active, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, 0, NULL, NULL, 0, NULL, NULL, ?5, 0, 1, ?6, ?6)",
                    params![
                        streak.id,
                        streak.user_id,
                        streak.habit_goal_id,
                        streak.pact_id,
                        streak.grace_period_days,
                        now.to_rfc3339(),
                    ],
                )?;
                streak
            }
        };
        tx.commit()?;
        Ok(streak)
    }

    pub fn get_streak(&self, id: &str) -> Result<Option<Streak>, DatabaseError> {
        let sql = format!("SELECT {STREAK_COLS} FROM streaks WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_streak)
            .optional()?)
    }

    pub fn streak_by_user_and_goal(
        &self,
        user_id: &str,
        habit_goal_id: &str,
        pact_id: Option<&str>,
    ) -> Result<Option<Streak>, DatabaseError> {
        let sql = format!(
            "SELECT {STREAK_COLS} FROM streaks
             WHERE user_id = ?1 AND habit_goal_id = ?2 AND pact_id IS ?3"
        );
        Ok(self
            .conn
            .query_row(&sql, params![user_id, habit_goal_id, pact_id], row_to_streak)
            .optional()?)
    }

    pub fn streaks_by_user(
        &self,
        user_id: &str,
        active_only: bool,
    ) -> Result<Vec<Streak>, DatabaseError> {
        let sql = format!(
            "SELECT {STREAK_COLS} FROM streaks
             WHERE user_id = ?1 AND (?2 = 0 OR is_active = 1)
             ORDER BY current_streak DESC"
        );
        self.collect(&sql, params![user_id, active_only], row_to_streak)
    }

    pub fn streaks_by_pact(&self, pact_id: &str) -> Result<Vec<Streak>, DatabaseError> {
        let sql = format!("SELECT {STREAK_COLS} FROM streaks WHERE pact_id = ?1");
        self.collect(&sql, params![pact_id], row_to_streak)
    }

    pub fn top_streaks(&self, limit: u32) -> Result<Vec<Streak>, DatabaseError> {
        let sql = format!(
            "SELECT {STREAK_COLS} FROM streaks
             WHERE is_active = 1 AND current_streak > 0
             ORDER BY current_streak DESC LIMIT ?1"
        );
        self.collect(&sql, params![limit], row_to_streak)
    }

    pub fn update_streak(&self, streak: &Streak) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE streaks SET current_streak = ?2, current_streak_start_date = ?3,
                last_completed_date = ?4, longest_streak = ?5,
                longest_streak_start_date = ?6, longest_streak_end_date = ?7,
                grace_period_days = ?8, grace_days_used = ?9, is_active = ?10,
                updated_at = ?11
             WHERE id = ?1",
            params![
                streak.id,
                streak.current_streak,
                streak.current_streak_start_date.map(format_date),
                streak.last_completed_date.map(format_date),
                streak.longest_streak,
                streak.longest_streak_start_date.map(format_date),
                streak.longest_streak_end_date.map(format_date),
                streak.grace_period_days,
                streak.grace_days_used,
                streak.is_active,
                streak.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn deactivate_streak(&self, id: &str, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE streaks SET is_active = 0, updated_at = ?2 WHERE id = ?1",
            params![id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    // === Streak history ===

    pub fn insert_history(&self, event: &StreakHistoryEvent) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO streak_history (id, streak_id, user_id, event_type,
                event_date, streak_value, milestone, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id,
                event.streak_id,
                event.user_id,
                format_history_type(event.event_type),
                format_date(event.event_date),
                event.streak_value,
                event.milestone,
                event.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn history_for_streak(
        &self,
        streak_id: &str,
        limit: u32,
    ) -> Result<Vec<StreakHistoryEvent>, DatabaseError> {
        let sql = format!(
            "SELECT {HISTORY_COLS} FROM streak_history
             WHERE streak_id = ?1 ORDER BY event_date DESC, rowid DESC LIMIT ?2"
        );
        self.collect(&sql, params![streak_id, limit], row_to_history)
    }

    pub fn milestone_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<StreakHistoryEvent>, DatabaseError> {
        let sql = format!(
            "SELECT {HISTORY_COLS} FROM streak_history
             WHERE user_id = ?1 AND event_type = 'milestone_reached'
             ORDER BY event_date DESC"
        );
        self.collect(&sql, params![user_id], row_to_history)
    }

    // === Internal ===

    fn collect<T, P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
        mapper: fn(&rusqlite::Row) -> Result<T, rusqlite::Error>,
    ) -> Result<Vec<T>, DatabaseError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, mapper)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
