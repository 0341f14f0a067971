//! Database schema migrations for habitpact.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration
//! version.

use indoc::indoc;
use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations to bring the database to the current
/// schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or(0)
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: initial schema.
///
/// The `UNIQUE(user_id, habit_goal_id, scheduled_date)` index on
/// `habit_checkins` is what makes the ledger's per-day upsert converge on
/// a single row under concurrent submissions.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(indoc! {"
        CREATE TABLE IF NOT EXISTS habit_goals (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            description         TEXT,
            category            TEXT,
            emoji               TEXT,
            frequency_type      TEXT NOT NULL DEFAULT 'daily',
            frequency_count     INTEGER NOT NULL DEFAULT 1,
            target_days_of_week TEXT,
            created_by_user_id  TEXT NOT NULL,
            is_template         INTEGER NOT NULL DEFAULT 0,
            is_public           INTEGER NOT NULL DEFAULT 0,
            usage_count         INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pacts (
            id                       TEXT PRIMARY KEY,
            creator_user_id          TEXT NOT NULL,
            partner_user_id          TEXT,
            habit_goal_id            TEXT NOT NULL,
            pact_type                TEXT NOT NULL DEFAULT 'accountability',
            status                   TEXT NOT NULL DEFAULT 'pending',
            duration_days            INTEGER NOT NULL,
            start_date               TEXT,
            end_date                 TEXT,
            consequence_type         TEXT NOT NULL DEFAULT 'none',
            consequence_details      TEXT,
            end_reason               TEXT,
            winner_id                TEXT,
            creator_completion_rate  REAL,
            partner_completion_rate  REAL,
            created_at               TEXT NOT NULL,
            updated_at               TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pact_members (
            id                  TEXT PRIMARY KEY,
            pact_id             TEXT NOT NULL,
            user_id             TEXT NOT NULL,
            role                TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'pending',
            joined_at           TEXT,
            left_at             TEXT,
            total_checkins      INTEGER NOT NULL DEFAULT 0,
            completed_checkins  INTEGER NOT NULL DEFAULT 0,
            current_streak      INTEGER NOT NULL DEFAULT 0,
            longest_streak      INTEGER NOT NULL DEFAULT 0,
            completion_rate     REAL NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            UNIQUE(pact_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS habit_checkins (
            id                     TEXT PRIMARY KEY,
            user_id                TEXT NOT NULL,
            pact_id                TEXT,
            habit_goal_id          TEXT NOT NULL,
            scheduled_date         TEXT NOT NULL,
            completed_at           TEXT,
            status                 TEXT NOT NULL DEFAULT 'pending',
            notes                  TEXT,
            self_rating            INTEGER,
            difficulty_rating      INTEGER,
            has_proof              INTEGER NOT NULL DEFAULT 0,
            proof_verified         INTEGER NOT NULL DEFAULT 0,
            contributed_to_streak  INTEGER NOT NULL DEFAULT 0,
            created_at             TEXT NOT NULL,
            updated_at             TEXT NOT NULL,
            UNIQUE(user_id, habit_goal_id, scheduled_date)
        );

        CREATE TABLE IF NOT EXISTS streaks (
            id                         TEXT PRIMARY KEY,
            user_id                    TEXT NOT NULL,
            habit_goal_id              TEXT NOT NULL,
            pact_id                    TEXT,
            current_streak             INTEGER NOT NULL DEFAULT 0,
            current_streak_start_date  TEXT,
            last_completed_date        TEXT,
            longest_streak             INTEGER NOT NULL DEFAULT 0,
            longest_streak_start_date  TEXT,
            longest_streak_end_date    TEXT,
            grace_period_days          INTEGER NOT NULL DEFAULT 1,
            grace_days_used            INTEGER NOT NULL DEFAULT 0,
            is_active                  INTEGER NOT NULL DEFAULT 1,
            created_at                 TEXT NOT NULL,
            updated_at                 TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS streak_history (
            id            TEXT PRIMARY KEY,
            streak_id     TEXT NOT NULL,
            user_id       TEXT NOT NULL,
            event_type    TEXT NOT NULL,
            event_date    TEXT NOT NULL,
            streak_value  INTEGER NOT NULL,
            milestone     INTEGER,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_goals_owner ON habit_goals(created_by_user_id);
        CREATE INDEX IF NOT EXISTS idx_goals_template ON habit_goals(is_template, category);
        CREATE INDEX IF NOT EXISTS idx_pacts_creator ON pacts(creator_user_id, status);
        CREATE INDEX IF NOT EXISTS idx_pacts_partner ON pacts(partner_user_id, status);
        CREATE INDEX IF NOT EXISTS idx_pacts_due ON pacts(status, end_date);
        CREATE INDEX IF NOT EXISTS idx_members_pact ON pact_members(pact_id);
        CREATE INDEX IF NOT EXISTS idx_checkins_user_date ON habit_checkins(user_id, scheduled_date);
        CREATE INDEX IF NOT EXISTS idx_checkins_pact ON habit_checkins(pact_id);
        CREATE INDEX IF NOT EXISTS idx_checkins_pending ON habit_checkins(status, scheduled_date);
        CREATE INDEX IF NOT EXISTS idx_streaks_user ON streaks(user_id, is_active);
        CREATE INDEX IF NOT EXISTS idx_streaks_pact ON streaks(pact_id);
        CREATE INDEX IF NOT EXISTS idx_history_streak ON streak_history(streak_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_history_milestones ON streak_history(user_id, event_type);
    "})?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 1);
    }

    #[test]
    fn schema_survives_reopen() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("habitpact.db");

        let conn = Connection::open(&path).unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO habit_goals (id, name, created_by_user_id, created_at, updated_at)
             VALUES ('g1', 'Run', 'u1', '', '')",
            [],
        )
        .unwrap();
        drop(conn);

        let conn = Connection::open(&path).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 1);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM habit_goals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn checkin_uniqueness_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let insert = "INSERT INTO habit_checkins
            (id, user_id, habit_goal_id, scheduled_date, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, '', '')";
        conn.execute(insert, ("c1", "u1", "g1", "2025-06-01")).unwrap();
        assert!(conn
            .execute(insert, ("c2", "u1", "g1", "2025-06-01"))
            .is_err());
        // Another day is fine.
        conn.execute(insert, ("c3", "u1", "g1", "2025-06-02")).unwrap();
    }
}
