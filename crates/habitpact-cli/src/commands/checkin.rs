//! Daily checkin commands.

use chrono::NaiveDate;
use clap::Subcommand;
use habitpact_core::checkin::AttemptParams;
use habitpact_core::CheckinStatus;

use super::open_engine;

#[derive(Subcommand)]
pub enum CheckinAction {
    /// Record a checkin attempt for a date (defaults to today)
    Record {
        /// Acting user ID
        #[arg(long)]
        user: String,
        /// Habit goal ID
        #[arg(long)]
        goal: String,
        /// Pact this checkin belongs to
        #[arg(long)]
        pact: Option<String>,
        /// Scheduled date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Status: pending, completed, partial, skipped or missed
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Self-assessment 1-5
        #[arg(long)]
        rating: Option<u8>,
    },
    /// Mark an existing checkin completed
    Complete {
        id: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        rating: Option<u8>,
    },
    /// Skip a checkin without breaking the streak
    Skip {
        id: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Today's checkins for a user
    Today {
        #[arg(long)]
        user: String,
    },
    /// Checkins in a date range
    Range {
        #[arg(long)]
        user: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Delete a checkin (owner only)
    Delete {
        id: String,
        #[arg(long)]
        user: String,
    },
}

fn parse_status(s: &str) -> Option<CheckinStatus> {
    match s {
        "pending" => Some(CheckinStatus::Pending),
        "completed" => Some(CheckinStatus::Completed),
        "partial" => Some(CheckinStatus::Partial),
        "skipped" => Some(CheckinStatus::Skipped),
        "missed" => Some(CheckinStatus::Missed),
        _ => None,
    }
}

pub fn run(action: CheckinAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;

    match action {
        CheckinAction::Record {
            user,
            goal,
            pact,
            date,
            status,
            notes,
            rating,
        } => {
            let report = engine.submit_checkin(
                &user,
                AttemptParams {
                    habit_goal_id: goal,
                    pact_id: pact,
                    scheduled_date: date,
                    status: status.as_deref().and_then(parse_status),
                    notes,
                    self_rating: rating,
                    ..Default::default()
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&report.checkin)?);
            if let Some(streak) = report.streak {
                println!("{}", serde_json::to_string_pretty(&streak)?);
            }
        }
        CheckinAction::Complete {
            id,
            user,
            notes,
            rating,
        } => {
            let report = engine.complete_checkin(&id, &user, notes, rating)?;
            println!("{}", serde_json::to_string_pretty(&report.checkin)?);
            if let Some(streak) = report.streak {
                println!("{}", serde_json::to_string_pretty(&streak)?);
            }
        }
        CheckinAction::Skip { id, user, notes } => {
            let checkin = engine.checkins().skip(&id, &user, notes)?;
            println!("{}", serde_json::to_string_pretty(&checkin)?);
        }
        CheckinAction::Today { user } => {
            let today = chrono::Utc::now().date_naive();
            let list = engine.checkins().for_user_on_date(&user, today)?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        CheckinAction::Range { user, from, to } => {
            let list = engine.checkins().for_date_range(&user, from, to)?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        CheckinAction::Delete { id, user } => {
            engine.checkins().delete(&id, &user)?;
            println!("Checkin deleted: {id}");
        }
    }
    Ok(())
}
