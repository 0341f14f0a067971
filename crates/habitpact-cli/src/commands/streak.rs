//! Streak inspection commands.

use clap::Subcommand;
use habitpact_core::streak::{display_text, milestone_progress, next_milestone, risk_level};

use super::open_engine;

#[derive(Subcommand)]
pub enum StreakAction {
    /// Show the streak for a user and goal
    Show {
        #[arg(long)]
        user: String,
        #[arg(long)]
        goal: String,
        /// Scope to a pact streak
        #[arg(long)]
        pact: Option<String>,
    },
    /// List a user's streaks
    List {
        #[arg(long)]
        user: String,
        /// Only active streaks
        #[arg(long)]
        active: bool,
    },
    /// Streak history (most recent first)
    History {
        /// Streak ID
        id: String,
        #[arg(long, default_value = "30")]
        limit: u32,
    },
    /// Milestones a user has reached
    Milestones {
        #[arg(long)]
        user: String,
    },
    /// Longest running streaks across all users
    Top {
        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

pub fn run(action: StreakAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let streaks = engine.streaks();

    match action {
        StreakAction::Show { user, goal, pact } => {
            match streaks.for_user_and_goal(&user, &goal, pact.as_deref())? {
                Some(streak) => {
                    println!("{}", display_text(&streak));
                    if let Some(next) = next_milestone(streak.current_streak) {
                        println!(
                            "Next milestone: {next} days ({}%)",
                            milestone_progress(streak.current_streak)
                        );
                    }
                    println!("Risk: {:?}", risk_level(&streak, chrono::Utc::now()));
                    println!("{}", serde_json::to_string_pretty(&streak)?);
                }
                None => println!("No streak recorded"),
            }
        }
        StreakAction::List { user, active } => {
            let list = streaks.for_user(&user, active)?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        StreakAction::History { id, limit } => {
            let history = streaks.history(&id, limit)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        StreakAction::Milestones { user } => {
            let history = streaks.milestone_history(&user)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        StreakAction::Top { limit } => {
            let list = streaks.top(limit)?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
    }
    Ok(())
}
