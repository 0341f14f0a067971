//! TOML-based engine configuration.
//!
//! Stores the tunable policy knobs:
//! - Streak grace period and milestone thresholds
//! - Pact tie-break policy and invitation expiry
//!
//! Configuration is stored at `~/.config/habitpact/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::pact::DEFAULT_INVITATION_EXPIRY_DAYS;
use crate::scoreboard::TiePolicy;
use crate::streak::MILESTONES;

/// Streak policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakPolicy {
    /// Missed days a streak can absorb per run before breaking.
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: u32,
    /// Streak lengths that record a milestone when hit exactly.
    #[serde(default = "default_milestones")]
    pub milestones: Vec<u32>,
}

/// Pact policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PactPolicy {
    /// How a drawn two-player pact is settled.
    #[serde(default)]
    pub tie_policy: TiePolicy,
    /// Days a pending invite stays acceptable.
    #[serde(default = "default_invitation_expiry_days")]
    pub invitation_expiry_days: i64,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/habitpact/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub streak: StreakPolicy,
    #[serde(default)]
    pub pact: PactPolicy,
}

fn default_grace_period_days() -> u32 {
    1
}
fn default_milestones() -> Vec<u32> {
    MILESTONES.to_vec()
}
fn default_invitation_expiry_days() -> i64 {
    DEFAULT_INVITATION_EXPIRY_DAYS
}

impl Default for StreakPolicy {
    fn default() -> Self {
        Self {
            grace_period_days: default_grace_period_days(),
            milestones: default_milestones(),
        }
    }
}

impl Default for PactPolicy {
    fn default() -> Self {
        Self {
            tie_policy: TiePolicy::default(),
            invitation_expiry_days: default_invitation_expiry_days(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/habitpact"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk, writing the defaults on first run.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Load from disk, returning defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.streak.grace_period_days, 1);
        assert_eq!(parsed.streak.milestones, MILESTONES.to_vec());
        assert_eq!(parsed.pact.tie_policy, TiePolicy::NoWinner);
        assert_eq!(parsed.pact.invitation_expiry_days, 7);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let parsed: Config = toml::from_str(
            "[streak]\ngrace_period_days = 2\n",
        )
        .unwrap();
        assert_eq!(parsed.streak.grace_period_days, 2);
        assert_eq!(parsed.streak.milestones, MILESTONES.to_vec());
        assert_eq!(parsed.pact.invitation_expiry_days, 7);
    }
}
