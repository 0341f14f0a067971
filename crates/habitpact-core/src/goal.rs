//! Habit goal catalog.
//!
//! Holds habit templates and user-authored goals. A goal is immutable once
//! referenced by an active pact or streak except for its metadata, and can
//! never be deleted while such a reference exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::storage::Database;

/// How often a habit is expected to be performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyType {
    Daily,
    Weekly,
    Custom,
}

/// A habit template or user-authored goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitGoal {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub emoji: Option<String>,
    pub frequency_type: FrequencyType,
    pub frequency_count: u32,
    /// Weekday ordinals (0 = Sunday) for weekly habits on specific days.
    pub target_days_of_week: Option<Vec<u8>>,
    pub created_by_user_id: String,
    pub is_template: bool,
    pub is_public: bool,
    pub usage_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a goal.
#[derive(Debug, Clone, Default)]
pub struct NewGoal {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub emoji: Option<String>,
    pub frequency_type: Option<FrequencyType>,
    pub frequency_count: Option<u32>,
    pub target_days_of_week: Option<Vec<u8>>,
    pub is_public: bool,
}

/// Metadata fields a goal owner may change. Omitted fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct GoalUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub emoji: Option<String>,
    pub frequency_type: Option<FrequencyType>,
    pub frequency_count: Option<u32>,
    pub target_days_of_week: Option<Vec<u8>>,
    pub is_public: Option<bool>,
}

/// Read/write surface for habit goals.
pub struct GoalCatalog<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
}

impl<'a> GoalCatalog<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self { db, clock }
    }

    pub fn create(&self, user_id: &str, params: NewGoal) -> Result<HabitGoal> {
        if params.name.trim().is_empty() {
            return Err(EngineError::ConstraintViolation("goal name is required".into()).into());
        }
        let now = self.clock.now();
        let goal = HabitGoal {
            id: Uuid::new_v4().to_string(),
            name: params.name,
            description: params.description,
            category: params.category,
            emoji: params.emoji,
            frequency_type: params.frequency_type.unwrap_or(FrequencyType::Daily),
            frequency_count: params.frequency_count.unwrap_or(1),
            target_days_of_week: params.target_days_of_week,
            created_by_user_id: user_id.to_string(),
            is_template: false,
            is_public: params.is_public,
            usage_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_goal(&goal)?;
        Ok(goal)
    }

    pub fn get(&self, id: &str) -> Result<HabitGoal> {
        self.db
            .get_goal(id)?
            .ok_or_else(|| EngineError::not_found("habit goal", id).into())
    }

    pub fn list_by_user(&self, user_id: &str) -> Result<Vec<HabitGoal>> {
        Ok(self.db.goals_by_user(user_id)?)
    }

    /// System templates, ordered by adoption.
    pub fn templates(&self, category: Option<&str>) -> Result<Vec<HabitGoal>> {
        Ok(self.db.goal_templates(category)?)
    }

    pub fn public_goals(&self, category: Option<&str>) -> Result<Vec<HabitGoal>> {
        Ok(self.db.public_goals(category)?)
    }

    /// Case-insensitive name search across templates and public goals.
    pub fn search(&self, term: &str, limit: u32) -> Result<Vec<HabitGoal>> {
        Ok(self.db.search_goals(term, limit)?)
    }

    /// Update goal metadata. Owner-only; system templates are immutable.
    pub fn update(&self, id: &str, user_id: &str, update: GoalUpdate) -> Result<HabitGoal> {
        let mut goal = self.get(id)?;
        if goal.created_by_user_id != user_id {
            return Err(
                EngineError::Unauthorized("only the goal owner can update it".into()).into(),
            );
        }
        if goal.is_template {
            return Err(
                EngineError::Unauthorized("system templates cannot be modified".into()).into(),
            );
        }

        if let Some(name) = update.name {
            goal.name = name;
        }
        if let Some(description) = update.description {
            goal.description = Some(description);
        }
        if let Some(category) = update.category {
            goal.category = Some(category);
        }
        if let Some(emoji) = update.emoji {
            goal.emoji = Some(emoji);
        }
        if let Some(frequency_type) = update.frequency_type {
            goal.frequency_type = frequency_type;
        }
        if let Some(frequency_count) = update.frequency_count {
            goal.frequency_count = frequency_count;
        }
        if let Some(days) = update.target_days_of_week {
            goal.target_days_of_week = Some(days);
        }
        if let Some(is_public) = update.is_public {
            goal.is_public = is_public;
        }
        goal.updated_at = self.clock.now();
        self.db.update_goal(&goal)?;
        Ok(goal)
    }

    /// Bump the adoption counter when a pact or personal tracking adopts
    /// this goal.
    pub fn increment_usage(&self, id: &str) -> Result<()> {
        self.db.increment_goal_usage(id)?;
        Ok(())
    }

    /// Delete a goal. Owner-only, never templates, and refused while any
    /// active pact or streak still references it.
    pub fn delete(&self, id: &str, user_id: &str) -> Result<()> {
        let goal = self.get(id)?;
        if goal.created_by_user_id != user_id {
            return Err(
                EngineError::Unauthorized("only the goal owner can delete it".into()).into(),
            );
        }
        if goal.is_template {
            return Err(
                EngineError::Unauthorized("system templates cannot be deleted".into()).into(),
            );
        }
        if self.db.goal_has_active_pacts(id)? {
            return Err(EngineError::ConstraintViolation(
                "goal is referenced by an active pact".into(),
            )
            .into());
        }
        if self.db.goal_has_active_streaks(id)? {
            return Err(EngineError::ConstraintViolation(
                "goal is referenced by an active streak".into(),
            )
            .into());
        }
        self.db.delete_goal(id)?;
        Ok(())
    }
}
