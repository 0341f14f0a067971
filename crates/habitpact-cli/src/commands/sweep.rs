//! Scheduled sweep commands. These are the cron entry points: run
//! `sweep missed` after midnight and `sweep expire` on any cadence.

use chrono::NaiveDate;
use clap::Subcommand;

use super::open_engine;

#[derive(Subcommand)]
pub enum SweepAction {
    /// Mark elapsed pending checkins missed and apply streak breaks
    Missed {
        /// Mark pending checkins scheduled on or before this date
        /// (defaults to yesterday)
        #[arg(long)]
        through: Option<NaiveDate>,
    },
    /// Expire active pacts past their end date and settle their scoreboards
    Expire,
}

pub fn run(action: SweepAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;

    match action {
        SweepAction::Missed { through } => {
            let cutoff = match through {
                Some(date) => date,
                None => chrono::Utc::now()
                    .date_naive()
                    .pred_opt()
                    .ok_or("date out of range")?,
            };
            let reports = engine.sweep_missed(cutoff)?;
            println!("Marked {} checkin(s) missed", reports.len());
            for report in &reports {
                for event in &report.events {
                    println!("{}", serde_json::to_string(event)?);
                }
            }
        }
        SweepAction::Expire => {
            let report = engine.expire_due()?;
            println!("Expired {} pact(s)", report.outcomes.len());
            for event in &report.events {
                println!("{}", serde_json::to_string(event)?);
            }
        }
    }
    Ok(())
}
