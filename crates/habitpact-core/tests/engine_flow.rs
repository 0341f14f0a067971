//! End-to-end flows through the engine facade: goal creation, pact
//! lifecycle, checkin submission, streak progression, sweeps, and pact
//! settlement.

use chrono::NaiveDate;
use habitpact_core::checkin::AttemptParams;
use habitpact_core::{
    AccountabilityEngine, CheckinStatus, Config, CoreError, Database, EngineError, Event,
    FixedClock, NewGoal, NewPact, PactStatus,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

fn engine_with(config: Config) -> AccountabilityEngine {
    let db = Database::open_memory().unwrap();
    let clock = FixedClock::at_date(day(1));
    AccountabilityEngine::with_clock(db, config, Box::new(clock))
}

fn engine() -> AccountabilityEngine {
    engine_with(Config::default())
}

fn make_goal(engine: &AccountabilityEngine, owner: &str, name: &str) -> String {
    engine
        .goals()
        .create(
            owner,
            NewGoal {
                name: name.into(),
                ..Default::default()
            },
        )
        .unwrap()
        .id
}

fn completed_on(goal_id: &str, pact_id: Option<&str>, date: NaiveDate) -> AttemptParams {
    AttemptParams {
        habit_goal_id: goal_id.into(),
        pact_id: pact_id.map(str::to_string),
        scheduled_date: Some(date),
        status: Some(CheckinStatus::Completed),
        ..Default::default()
    }
}

#[test]
fn three_consecutive_completions_build_a_streak_of_three() {
    let engine = engine();
    let goal = make_goal(&engine, "u1", "Morning run");

    for d in 1..=3 {
        engine
            .submit_checkin("u1", completed_on(&goal, None, day(d)))
            .unwrap();
    }

    let streak = engine
        .streaks()
        .for_user_and_goal("u1", &goal, None)
        .unwrap()
        .unwrap();
    assert_eq!(streak.current_streak, 3);
    assert_eq!(streak.longest_streak, 3);
    assert_eq!(streak.current_streak_start_date, Some(day(1)));
}

#[test]
fn missed_middle_day_covered_by_grace() {
    let engine = engine();
    let goal = make_goal(&engine, "u1", "Read");

    engine
        .submit_checkin("u1", completed_on(&goal, None, day(1)))
        .unwrap();
    let report = engine
        .submit_checkin("u1", completed_on(&goal, None, day(3)))
        .unwrap();

    let streak = report.streak.unwrap();
    assert_eq!(streak.current_streak, 2);
    assert_eq!(streak.grace_days_used, 1);
    assert_eq!(streak.current_streak_start_date, Some(day(1)));
}

#[test]
fn missed_middle_day_without_grace_resets() {
    let mut config = Config::default();
    config.streak.grace_period_days = 0;
    let engine = engine_with(config);
    let goal = make_goal(&engine, "u1", "Read");

    engine
        .submit_checkin("u1", completed_on(&goal, None, day(1)))
        .unwrap();
    let report = engine
        .submit_checkin("u1", completed_on(&goal, None, day(3)))
        .unwrap();

    let streak = report.streak.unwrap();
    assert_eq!(streak.current_streak, 1);
    assert_eq!(streak.current_streak_start_date, Some(day(3)));
    assert_eq!(streak.grace_days_used, 0);
}

#[test]
fn repeated_attempts_for_one_day_yield_one_row_and_one_increment() {
    let engine = engine();
    let goal = make_goal(&engine, "u1", "Meditate");

    let first = engine
        .submit_checkin("u1", completed_on(&goal, None, day(1)))
        .unwrap();
    let second = engine
        .submit_checkin("u1", completed_on(&goal, None, day(1)))
        .unwrap();

    assert!(first.was_newly_created);
    assert!(!second.was_newly_created);
    assert_eq!(second.checkin.id, first.checkin.id);
    // Only the first attempt carried the outcome.
    assert!(first.streak.is_some());
    assert!(second.streak.is_none());
    assert!(second.events.is_empty());

    assert_eq!(
        engine.checkins().for_user_on_date("u1", day(1)).unwrap().len(),
        1
    );
    let streak = engine
        .streaks()
        .for_user_and_goal("u1", &goal, None)
        .unwrap()
        .unwrap();
    assert_eq!(streak.current_streak, 1);
}

#[test]
fn expire_sweep_settles_each_pact_exactly_once() {
    let db = Database::open_memory().unwrap();
    let clock = FixedClock::at_date(day(1));
    let engine = AccountabilityEngine::with_clock(db, Config::default(), Box::new(clock));

    let goal = make_goal(&engine, "creator", "Pushups");
    let (pact, _) = engine
        .pacts()
        .create(
            "creator",
            NewPact {
                habit_goal_id: goal.clone(),
                partner_user_id: Some("partner".into()),
                pact_type: None,
                duration_days: Some(30),
                consequence_type: None,
                consequence_details: None,
            },
        )
        .unwrap();
    engine.pacts().accept(&pact.id, "partner").unwrap();

    engine
        .submit_checkin("creator", completed_on(&goal, Some(&pact.id), day(1)))
        .unwrap();
    engine
        .submit_checkin("partner", completed_on(&goal, Some(&pact.id), day(1)))
        .unwrap();

    // Move past the end date via a fresh clock on the same database.
    let db = engine_into_db(engine);
    let late_clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2025, 7, 15).unwrap());
    let engine = AccountabilityEngine::with_clock(db, Config::default(), Box::new(late_clock));

    let first = engine.expire_due().unwrap();
    assert_eq!(first.outcomes.len(), 1);
    assert_eq!(first.outcomes[0].pact.status, PactStatus::Expired);
    assert!(first.outcomes[0].pact.creator_completion_rate.is_some());
    assert!(first
        .events
        .iter()
        .any(|e| matches!(e, Event::PactExpired { .. })));

    // The second run finds nothing to transition or finalize.
    let second = engine.expire_due().unwrap();
    assert!(second.outcomes.is_empty());
    assert!(second.events.is_empty());
}

#[test]
fn pact_checkins_update_both_scoreboards_and_settle_a_winner() {
    let engine = engine();
    let goal = make_goal(&engine, "creator", "No sugar");
    let (pact, _) = engine
        .pacts()
        .create(
            "creator",
            NewPact {
                habit_goal_id: goal.clone(),
                partner_user_id: Some("partner".into()),
                pact_type: None,
                duration_days: Some(7),
                consequence_type: None,
                consequence_details: None,
            },
        )
        .unwrap();
    engine.pacts().accept(&pact.id, "partner").unwrap();

    // Creator completes 3 days; partner completes 2 and misses 1.
    for d in 1..=3 {
        engine
            .submit_checkin("creator", completed_on(&goal, Some(&pact.id), day(d)))
            .unwrap();
    }
    for d in 1..=2 {
        engine
            .submit_checkin("partner", completed_on(&goal, Some(&pact.id), day(d)))
            .unwrap();
    }
    engine
        .submit_checkin(
            "partner",
            AttemptParams {
                habit_goal_id: goal.clone(),
                pact_id: Some(pact.id.clone()),
                scheduled_date: Some(day(3)),
                status: Some(CheckinStatus::Missed),
                ..Default::default()
            },
        )
        .unwrap();

    let (outcome, events) = engine.complete_pact(&pact.id, "creator").unwrap();
    assert_eq!(outcome.winners, vec!["creator".to_string()]);
    assert_eq!(outcome.creator_completion_rate, 100.0);
    assert_eq!(outcome.partner_completion_rate, Some(66.67));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::PactCompleted { .. })));
}

#[test]
fn declined_pact_is_terminal() {
    let engine = engine();
    let goal = make_goal(&engine, "creator", "Journal");
    let (pact, _) = engine
        .pacts()
        .create(
            "creator",
            NewPact {
                habit_goal_id: goal,
                partner_user_id: Some("partner".into()),
                pact_type: None,
                duration_days: Some(14),
                consequence_type: None,
                consequence_details: None,
            },
        )
        .unwrap();

    engine.pacts().decline(&pact.id, "partner").unwrap();
    let err = engine.pacts().accept(&pact.id, "partner").unwrap_err();
    assert!(matches!(
        err,
        CoreError::Engine(EngineError::AlreadyTerminal { .. })
    ));
}

#[test]
fn sweep_missed_breaks_streak_and_counts_against_member() {
    let engine = engine();
    let goal = make_goal(&engine, "creator", "Stretch");
    let (pact, _) = engine
        .pacts()
        .create(
            "creator",
            NewPact {
                habit_goal_id: goal.clone(),
                partner_user_id: Some("partner".into()),
                pact_type: None,
                duration_days: Some(30),
                consequence_type: None,
                consequence_details: None,
            },
        )
        .unwrap();
    engine.pacts().accept(&pact.id, "partner").unwrap();

    // Creator builds two days, spends the grace day on a day-4 completion,
    // and finally leaves day 7 pending.
    for d in [1, 2] {
        engine
            .submit_checkin("creator", completed_on(&goal, Some(&pact.id), day(d)))
            .unwrap();
    }
    engine
        .submit_checkin("creator", completed_on(&goal, Some(&pact.id), day(4)))
        .unwrap();
    engine
        .submit_checkin(
            "creator",
            AttemptParams {
                habit_goal_id: goal.clone(),
                pact_id: Some(pact.id.clone()),
                scheduled_date: Some(day(7)),
                ..Default::default()
            },
        )
        .unwrap();

    let reports = engine.sweep_missed(day(8)).unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0]
        .events
        .iter()
        .any(|e| matches!(e, Event::StreakBroken { .. })));

    let member = engine
        .db()
        .member_by_pact_and_user(&pact.id, "creator")
        .unwrap()
        .unwrap();
    assert_eq!(member.total_checkins, 4);
    assert_eq!(member.completed_checkins, 3);
    // Longest streak survives the break on the member row.
    assert_eq!(member.longest_streak, 3);
}

// Consumes an engine and hands back its database handle for rebuilding
// with a different clock.
fn engine_into_db(engine: AccountabilityEngine) -> Database {
    engine.into_db()
}
