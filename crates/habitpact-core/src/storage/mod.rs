mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, PactPolicy, StreakPolicy};
pub use database::Database;

use std::path::PathBuf;

/// Returns `~/.config/habitpact[-dev]/` based on HABITPACT_ENV.
///
/// Set HABITPACT_ENV=dev to use a development data directory.
///
/// # Errors
/// Returns an error if creating the data directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("HABITPACT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("habitpact-dev")
    } else {
        base_dir.join("habitpact")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
