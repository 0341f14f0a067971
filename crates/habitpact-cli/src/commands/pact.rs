//! Pact lifecycle commands.

use clap::Subcommand;
use habitpact_core::{ConsequenceType, NewPact, PactStatus, PactType};

use super::open_engine;

#[derive(Subcommand)]
pub enum PactAction {
    /// Create a pact (pending until the partner accepts; solo pacts can be
    /// started right away)
    Create {
        /// Acting user ID (the creator)
        #[arg(long)]
        user: String,
        /// Habit goal ID the pact is about
        #[arg(long)]
        goal: String,
        /// Partner to invite; omit for a solo pact
        #[arg(long)]
        partner: Option<String>,
        /// Duration in days: 7, 14, 30, 60 or 90
        #[arg(long, default_value = "30")]
        duration: u32,
        /// Pact type: accountability, challenge or support
        #[arg(long, default_value = "accountability")]
        pact_type: String,
        /// Consequence type: none, donation, dare or custom
        #[arg(long, default_value = "none")]
        consequence: String,
        /// Consequence details as JSON (e.g. '{"amount": 25}')
        #[arg(long)]
        consequence_details: Option<String>,
    },
    /// Start a solo pact
    Start {
        id: String,
        #[arg(long)]
        user: String,
    },
    /// Accept a pending invite (partner only)
    Accept {
        id: String,
        #[arg(long)]
        user: String,
    },
    /// Decline a pending invite (partner only)
    Decline {
        id: String,
        #[arg(long)]
        user: String,
    },
    /// Abandon an active pact
    Abandon {
        id: String,
        #[arg(long)]
        user: String,
    },
    /// Conclude an active pact and settle the scoreboard
    Complete {
        id: String,
        #[arg(long)]
        user: String,
    },
    /// List pacts for a user
    List {
        #[arg(long)]
        user: String,
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
    },
    /// List pending invites addressed to a user
    Invites {
        #[arg(long)]
        user: String,
    },
    /// Show one pact with its members
    Show {
        id: String,
        #[arg(long)]
        user: String,
    },
}

fn parse_status(s: &str) -> Option<PactStatus> {
    match s {
        "pending" => Some(PactStatus::Pending),
        "active" => Some(PactStatus::Active),
        "completed" => Some(PactStatus::Completed),
        "abandoned" => Some(PactStatus::Abandoned),
        "expired" => Some(PactStatus::Expired),
        "declined" => Some(PactStatus::Declined),
        _ => None,
    }
}

pub fn run(action: PactAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let pacts = engine.pacts();

    match action {
        PactAction::Create {
            user,
            goal,
            partner,
            duration,
            pact_type,
            consequence,
            consequence_details,
        } => {
            let pact_type = match pact_type.as_str() {
                "challenge" => PactType::Challenge,
                "support" => PactType::Support,
                _ => PactType::Accountability,
            };
            let consequence_type = match consequence.as_str() {
                "donation" => ConsequenceType::Donation,
                "dare" => ConsequenceType::Dare,
                "custom" => ConsequenceType::Custom,
                _ => ConsequenceType::None,
            };
            let details = consequence_details
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?;
            let (pact, _) = pacts.create(
                &user,
                NewPact {
                    habit_goal_id: goal,
                    partner_user_id: partner,
                    pact_type: Some(pact_type),
                    duration_days: Some(duration),
                    consequence_type: Some(consequence_type),
                    consequence_details: details,
                },
            )?;
            println!("Pact created: {}", pact.id);
            println!("{}", serde_json::to_string_pretty(&pact)?);
        }
        PactAction::Start { id, user } => {
            let (pact, _) = pacts.activate_solo(&id, &user)?;
            println!("{}", serde_json::to_string_pretty(&pact)?);
        }
        PactAction::Accept { id, user } => {
            let (pact, _) = pacts.accept(&id, &user)?;
            println!("{}", serde_json::to_string_pretty(&pact)?);
        }
        PactAction::Decline { id, user } => {
            let (pact, _) = pacts.decline(&id, &user)?;
            println!("{}", serde_json::to_string_pretty(&pact)?);
        }
        PactAction::Abandon { id, user } => {
            let (outcome, _) = engine.abandon_pact(&id, &user)?;
            println!("{}", serde_json::to_string_pretty(&outcome.pact)?);
        }
        PactAction::Complete { id, user } => {
            let (outcome, _) = engine.complete_pact(&id, &user)?;
            match outcome.winners.as_slice() {
                [] => println!("Pact completed: draw, no winner"),
                [one] => println!("Pact completed: winner {one}"),
                many => println!("Pact completed: shared win ({})", many.join(", ")),
            }
            println!("{}", serde_json::to_string_pretty(&outcome.pact)?);
        }
        PactAction::List { user, status } => {
            let status = status.as_deref().and_then(parse_status);
            let list = pacts.list_for_user(&user, status)?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        PactAction::Invites { user } => {
            let list = pacts.pending_invites(&user)?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        PactAction::Show { id, user } => {
            let pact = pacts.get(&id, &user)?;
            let members = pacts.members(&id)?;
            println!("{}", serde_json::to_string_pretty(&pact)?);
            println!("{}", serde_json::to_string_pretty(&members)?);
        }
    }
    Ok(())
}
