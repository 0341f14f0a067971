//! Habit goal catalog commands.

use clap::Subcommand;
use habitpact_core::{GoalUpdate, NewGoal};

use super::open_engine;

#[derive(Subcommand)]
pub enum GoalAction {
    /// Create a new habit goal
    Add {
        /// Acting user ID
        #[arg(long)]
        user: String,
        /// Goal name
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        emoji: Option<String>,
        /// Make the goal visible to other users
        #[arg(long)]
        public: bool,
    },
    /// List goals created by a user
    List {
        #[arg(long)]
        user: String,
    },
    /// List system templates
    Templates {
        #[arg(long)]
        category: Option<String>,
    },
    /// Search templates and public goals by name
    Search {
        term: String,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Show one goal
    Get {
        id: String,
    },
    /// Update goal metadata (owner only)
    Update {
        id: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        emoji: Option<String>,
        #[arg(long)]
        public: Option<bool>,
    },
    /// Delete a goal (owner only, refused while referenced)
    Delete {
        id: String,
        #[arg(long)]
        user: String,
    },
}

pub fn run(action: GoalAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let goals = engine.goals();

    match action {
        GoalAction::Add {
            user,
            name,
            description,
            category,
            emoji,
            public,
        } => {
            let goal = goals.create(
                &user,
                NewGoal {
                    name,
                    description,
                    category,
                    emoji,
                    is_public: public,
                    ..Default::default()
                },
            )?;
            println!("Goal created: {}", goal.id);
            println!("{}", serde_json::to_string_pretty(&goal)?);
        }
        GoalAction::List { user } => {
            let list = goals.list_by_user(&user)?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        GoalAction::Templates { category } => {
            let list = goals.templates(category.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        GoalAction::Search { term, limit } => {
            let list = goals.search(&term, limit)?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        GoalAction::Get { id } => {
            let goal = goals.get(&id)?;
            println!("{}", serde_json::to_string_pretty(&goal)?);
        }
        GoalAction::Update {
            id,
            user,
            name,
            description,
            category,
            emoji,
            public,
        } => {
            let goal = goals.update(
                &id,
                &user,
                GoalUpdate {
                    name,
                    description,
                    category,
                    emoji,
                    is_public: public,
                    ..Default::default()
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&goal)?);
        }
        GoalAction::Delete { id, user } => {
            goals.delete(&id, &user)?;
            println!("Goal deleted: {id}");
        }
    }
    Ok(())
}
