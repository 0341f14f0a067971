pub mod checkin;
pub mod goal;
pub mod pact;
pub mod streak;
pub mod sweep;

use habitpact_core::{AccountabilityEngine, Config, Database};

/// Open the engine against the on-disk database and config.
pub fn open_engine() -> Result<AccountabilityEngine, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let config = Config::load_or_default();
    Ok(AccountabilityEngine::new(db, config))
}
