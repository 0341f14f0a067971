use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "habitpact-cli", version, about = "Habitpact CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Habit goal catalog
    Goal {
        #[command(subcommand)]
        action: commands::goal::GoalAction,
    },
    /// Pact lifecycle
    Pact {
        #[command(subcommand)]
        action: commands::pact::PactAction,
    },
    /// Daily checkins
    Checkin {
        #[command(subcommand)]
        action: commands::checkin::CheckinAction,
    },
    /// Streaks and history
    Streak {
        #[command(subcommand)]
        action: commands::streak::StreakAction,
    },
    /// Scheduled sweeps (cron entry points)
    Sweep {
        #[command(subcommand)]
        action: commands::sweep::SweepAction,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Goal { action } => commands::goal::run(action),
        Commands::Pact { action } => commands::pact::run(action),
        Commands::Checkin { action } => commands::checkin::run(action),
        Commands::Streak { action } => commands::streak::run(action),
        Commands::Sweep { action } => commands::sweep::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
