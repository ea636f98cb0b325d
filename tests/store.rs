use chrono::{DateTime, Duration, TimeZone, Utc};

use matchday_orchestrator::fixture::{Fixture, FixtureStatus};
use matchday_orchestrator::phase::MatchPhase;
use matchday_orchestrator::refresh::{RefreshScope, RefreshSource, RefreshTask};
use matchday_orchestrator::store::{self, AiJobStatus, RunCounters};
use matchday_orchestrator::webhook::{AiJobKind, WebhookAck};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
}

fn fixture(id: u64, kickoff: DateTime<Utc>, status: &str) -> Fixture {
    Fixture {
        fixture_id: id,
        league_id: 39,
        season: 2025,
        kickoff,
        status: FixtureStatus::from_short(status),
        elapsed: None,
        home_team_id: 33,
        away_team_id: 51,
        home_team: "Manchester United".to_string(),
        away_team: "Brighton".to_string(),
        venue_city: Some("Manchester".to_string()),
        home_goals: None,
        away_goals: None,
    }
}

fn task(source: RefreshSource, id: u64) -> RefreshTask {
    RefreshTask {
        source,
        scope: RefreshScope::Fixture(id),
        phase: MatchPhase::Live,
        kickoff: now(),
    }
}

#[test]
fn fixtures_round_trip_and_upsert_in_place() {
    let mut conn = store::open_in_memory().unwrap();
    let fixtures = vec![
        fixture(1, now() - Duration::days(4), "FT"),
        fixture(2, now() + Duration::hours(3), "NS"),
        fixture(3, now() + Duration::days(9), "NS"),
    ];
    assert_eq!(store::upsert_fixtures(&mut conn, &fixtures).unwrap(), 3);

    let window =
        store::load_fixtures_between(&conn, now() - Duration::days(1), now() + Duration::days(7))
            .unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0], fixtures[1]);

    let mut live = fixtures[1].clone();
    live.status = FixtureStatus::FirstHalf;
    live.elapsed = Some(12);
    live.home_goals = Some(1);
    live.away_goals = Some(0);
    store::upsert_fixtures(&mut conn, &[live.clone()]).unwrap();

    let loaded = store::load_fixture(&conn, 2).unwrap().expect("fixture stored");
    assert_eq!(loaded, live);
    assert!(store::load_fixture(&conn, 99).unwrap().is_none());
}

#[test]
fn window_bounds_are_inclusive() {
    let mut conn = store::open_in_memory().unwrap();
    let kickoff = now() + Duration::hours(5);
    store::upsert_fixtures(&mut conn, &[fixture(5, kickoff, "NS")]).unwrap();
    assert_eq!(store::load_fixtures_between(&conn, kickoff, kickoff).unwrap().len(), 1);
    let after = kickoff + Duration::seconds(1);
    assert!(
        store::load_fixtures_between(&conn, after, kickoff + Duration::hours(1))
            .unwrap()
            .is_empty()
    );
}

#[test]
fn refresh_failures_keep_the_last_success() {
    let conn = store::open_in_memory().unwrap();
    let odds = task(RefreshSource::Odds, 4);
    let events = task(RefreshSource::Events, 4);

    store::record_refresh_success(&conn, &odds, now() - Duration::hours(1)).unwrap();
    store::record_refresh_failure(&conn, &odds, now(), "502 bad gateway").unwrap();
    store::record_refresh_failure(&conn, &events, now(), "timeout").unwrap();

    let ledger = store::load_refresh_ledger(&conn).unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(
        ledger.last_success(RefreshSource::Odds, "fixture:4"),
        Some(now() - Duration::hours(1))
    );
    assert_eq!(ledger.last_success(RefreshSource::Events, "fixture:4"), None);

    store::record_refresh_success(&conn, &events, now()).unwrap();
    let ledger = store::load_refresh_ledger(&conn).unwrap();
    assert_eq!(ledger.last_success(RefreshSource::Events, "fixture:4"), Some(now()));
}

#[test]
fn ai_jobs_track_attempts_and_status() {
    let conn = store::open_in_memory().unwrap();
    let hour_ago = now() - Duration::hours(1);
    store::record_ai_trigger(&conn, 8, AiJobKind::Prediction, Err("503"), hour_ago).unwrap();
    let ack = WebhookAck {
        external_id: Some("exec-1".to_string()),
        completed: false,
    };
    store::record_ai_trigger(&conn, 8, AiJobKind::Prediction, Ok(&ack), now()).unwrap();
    let done = WebhookAck {
        external_id: None,
        completed: true,
    };
    store::record_ai_trigger(&conn, 9, AiJobKind::Analysis, Ok(&done), now()).unwrap();

    let jobs = store::load_ai_jobs(&conn, &[8, 9, 10]).unwrap();
    assert_eq!(jobs.len(), 2);
    let prediction = jobs.iter().find(|j| j.fixture_id == 8).unwrap();
    assert_eq!(prediction.kind, AiJobKind::Prediction);
    assert_eq!(prediction.status, AiJobStatus::Triggered);
    assert_eq!(prediction.attempts, 2);
    assert_eq!(prediction.last_triggered_at, now());
    assert!(prediction.last_error.is_none());
    assert_eq!(prediction.external_id.as_deref(), Some("exec-1"));

    let analysis = jobs.iter().find(|j| j.fixture_id == 9).unwrap();
    assert_eq!(analysis.status, AiJobStatus::Completed);
    assert!(analysis.status.is_done());
}

#[test]
fn runs_are_opened_and_closed() {
    let conn = store::open_in_memory().unwrap();
    let first = store::begin_run(&conn, now()).unwrap();
    let second = store::begin_run(&conn, now()).unwrap();
    assert!(second > first);

    let counters = RunCounters {
        fixtures_considered: 4,
        refreshes_ok: 6,
        refreshes_failed: 1,
        ai_triggered: 2,
    };
    store::finish_run(&conn, first, &counters, &["odds fixture:4: 502".to_string()]).unwrap();

    let (ok, failed, errors, finished): (i64, i64, String, Option<String>) = conn
        .query_row(
            "SELECT refreshes_ok, refreshes_failed, errors_json, finished_at \
             FROM automation_runs WHERE run_id = ?1",
            [first],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(ok, 6);
    assert_eq!(failed, 1);
    assert_eq!(errors, r#"["odds fixture:4: 502"]"#);
    assert!(finished.is_some());
}
