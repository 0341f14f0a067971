//! # Habitpact Core Library
//!
//! This library provides the core business logic for the habitpact habit
//! accountability engine. It implements a CLI-first philosophy where all
//! operations are available via a standalone CLI binary, which also plays
//! the role of the external scheduler driving the daily sweeps.
//!
//! ## Architecture
//!
//! - **Goal catalog**: habit templates and user-authored goals
//! - **Pact lifecycle**: a compare-and-set guarded state machine for
//!   one- and two-person accountability contracts
//! - **Checkin ledger**: one row per (user, goal, day), atomic upsert,
//!   at most one outcome per row over its lifetime
//! - **Streak engine**: calendar-day gap rules with grace days and
//!   milestone detection
//! - **Scoreboard**: per-member counters and exactly-once pact settlement
//! - **Storage**: SQLite persistence and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`AccountabilityEngine`]: orchestration facade and single write path
//! - [`Database`]: persistence for all domain records
//! - [`Config`]: streak and pact policy knobs
//! - [`Event`]: what an external notification dispatcher consumes

pub mod checkin;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod goal;
pub mod pact;
pub mod scoreboard;
pub mod storage;
pub mod streak;

pub use checkin::{AttemptParams, CheckinLedger, CheckinStatus, HabitCheckin, Outcome};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{AccountabilityEngine, CheckinReport, ExpiryReport};
pub use error::{ConfigError, CoreError, DatabaseError, EngineError, Result};
pub use events::Event;
pub use goal::{FrequencyType, GoalCatalog, GoalUpdate, HabitGoal, NewGoal};
pub use pact::{
    ConsequenceType, EndReason, MemberRole, MemberStatus, NewPact, Pact, PactLifecycle,
    PactMember, PactStatus, PactType,
};
pub use scoreboard::{completion_rate, PactOutcome, PactScoreboard, TiePolicy};
pub use storage::{Config, Database};
pub use streak::{
    HistoryEventType, RiskLevel, Streak, StreakChange, StreakEngine, StreakHistoryEvent,
    MILESTONES,
};
