use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::Connection;

use matchday_orchestrator::automation::{run_cycle, run_forever};
use matchday_orchestrator::config::AutomationConfig;
use matchday_orchestrator::executor::{RefreshExecutor, RefreshOutcome};
use matchday_orchestrator::fixture::{Fixture, FixtureStatus};
use matchday_orchestrator::phase::MatchPhase;
use matchday_orchestrator::refresh::{RefreshScope, RefreshSource, RefreshTask};
use matchday_orchestrator::store::{self, AiJobStatus};
use matchday_orchestrator::webhook::{AiJobKind, AiJobRequest, AiTrigger, WebhookAck};

const UPCOMING: u64 = 1;
const LIVE: u64 = 2;
const FINISHED: u64 = 3;

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
        home_team_id: 100 + id as u32,
        away_team_id: 200 + id as u32,
        home_team: format!("Home {id}"),
        away_team: format!("Away {id}"),
        venue_city: None,
        home_goals: None,
        away_goals: None,
    }
}

#[derive(Default)]
struct FakeExecutor {
    failing: Vec<RefreshSource>,
    feed: HashMap<u64, Fixture>,
    calls: Mutex<Vec<RefreshTask>>,
}

impl RefreshExecutor for FakeExecutor {
    fn refresh(&self, task: &RefreshTask) -> Result<RefreshOutcome> {
        self.calls.lock().unwrap().push(task.clone());
        if self.failing.contains(&task.source) {
            return Err(anyhow!("{} upstream returned 502", task.source));
        }
        let fixtures = match (&task.source, &task.scope) {
            (RefreshSource::Fixture, RefreshScope::Fixture(id)) => {
                self.feed.get(id).cloned().into_iter().collect()
            }
            _ => Vec::new(),
        };
        Ok(RefreshOutcome::Updated {
            records: 1,
            fixtures,
        })
    }
}

impl FakeExecutor {
    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[derive(Default)]
struct FakeAi {
    fail: bool,
    analysis_disabled: bool,
    sent: Mutex<Vec<AiJobRequest>>,
}

impl AiTrigger for FakeAi {
    fn is_enabled(&self, kind: AiJobKind) -> bool {
        !(self.analysis_disabled && kind == AiJobKind::Analysis)
    }

    fn trigger(&self, request: &AiJobRequest) -> Result<WebhookAck> {
        self.sent.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(anyhow!("webhook returned 503"));
        }
        Ok(WebhookAck {
            external_id: Some(format!("exec-{}", request.fixture_id)),
            completed: false,
        })
    }
}

impl FakeAi {
    fn sent_kinds(&self) -> Vec<(u64, AiJobKind)> {
        let mut out: Vec<_> = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.fixture_id, r.kind))
            .collect();
        out.sort_by_key(|(id, kind)| (*id, kind.as_str()));
        out
    }
}

fn config() -> AutomationConfig {
    AutomationConfig {
        parallelism: 2,
        ..AutomationConfig::default()
    }
}

fn seeded_db() -> Connection {
    let mut conn = store::open_in_memory().unwrap();
    let fixtures = vec![
        fixture(UPCOMING, now() + Duration::hours(2), "NS"),
        fixture(LIVE, now() - Duration::minutes(30), "1H"),
        fixture(FINISHED, now() - Duration::hours(3), "FT"),
        fixture(4, now() - Duration::days(5), "FT"),
    ];
    store::upsert_fixtures(&mut conn, &fixtures).unwrap();
    let ack = WebhookAck::default();
    let yesterday = now() - Duration::days(1);
    store::record_ai_trigger(&conn, FINISHED, AiJobKind::Prediction, Ok(&ack), yesterday).unwrap();
    conn
}

fn run_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM automation_runs", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn cycle_refreshes_due_sources_and_survives_failures() {
    let mut conn = seeded_db();
    let mut feed = HashMap::new();
    feed.insert(LIVE, fixture(LIVE, now() - Duration::minutes(30), "HT"));
    let executor = FakeExecutor {
        failing: vec![RefreshSource::Odds],
        feed,
        ..FakeExecutor::default()
    };
    let ai = FakeAi::default();

    let report = run_cycle(&mut conn, &executor, &ai, &config(), now()).unwrap();

    assert!(report.run_id.is_some());
    assert_eq!(report.fixtures_considered, 3);
    assert_eq!(report.phase_counts.get(&MatchPhase::PreMatch), Some(&1));
    assert_eq!(report.phase_counts.get(&MatchPhase::Live), Some(&1));
    assert_eq!(report.phase_counts.get(&MatchPhase::FullTime), Some(&1));
    assert_eq!(report.planned.len(), 12);
    assert_eq!(executor.call_count(), 12);
    assert_eq!(report.refreshes_ok, 11);
    assert_eq!(report.refreshes_failed, 1);
    assert_eq!(report.fixtures_updated, 1);
    assert!(report.errors.iter().any(|e| e.contains("odds fixture:1")));

    let live = store::load_fixture(&conn, LIVE).unwrap().unwrap();
    assert_eq!(live.status, FixtureStatus::HalfTime);

    assert_eq!(report.predictions_triggered, 1);
    assert_eq!(report.analyses_triggered, 1);
    assert_eq!(
        ai.sent_kinds(),
        vec![(UPCOMING, AiJobKind::Prediction), (FINISHED, AiJobKind::Analysis)]
    );
    let analysis = store::load_ai_jobs(&conn, &[FINISHED])
        .unwrap()
        .into_iter()
        .find(|j| j.kind == AiJobKind::Analysis)
        .expect("analysis job recorded");
    assert_eq!(analysis.external_id.as_deref(), Some("exec-3"));
    assert_eq!(run_count(&conn), 1);
}

#[test]
fn second_cycle_only_retries_what_is_due() {
    let mut conn = seeded_db();
    let executor = FakeExecutor {
        failing: vec![RefreshSource::Odds],
        ..FakeExecutor::default()
    };
    let ai = FakeAi::default();
    run_cycle(&mut conn, &executor, &ai, &config(), now()).unwrap();

    let soon = now() + Duration::seconds(30);
    let again = run_cycle(&mut conn, &executor, &ai, &config(), soon).unwrap();
    assert_eq!(again.planned.len(), 1);
    assert_eq!(again.planned[0].source, RefreshSource::Odds);
    assert_eq!(again.fresh, 11);
    assert_eq!(again.ai_triggered(), 0);
    assert_eq!(ai.sent.lock().unwrap().len(), 2);
    assert_eq!(run_count(&conn), 2);
}

#[test]
fn failed_webhooks_are_retried_after_the_cooldown() {
    let mut conn = seeded_db();
    let executor = FakeExecutor::default();
    let failing_ai = FakeAi {
        fail: true,
        analysis_disabled: true,
        ..FakeAi::default()
    };

    let report = run_cycle(&mut conn, &executor, &failing_ai, &config(), now()).unwrap();
    assert_eq!(report.ai_failed, 1);
    assert_eq!(report.ai_triggered(), 0);
    let job = &store::load_ai_jobs(&conn, &[UPCOMING]).unwrap()[0];
    assert_eq!(job.status, AiJobStatus::Failed);
    assert_eq!(job.attempts, 1);

    let ai = FakeAi {
        analysis_disabled: true,
        ..FakeAi::default()
    };
    let early_at = now() + Duration::minutes(10);
    let early = run_cycle(&mut conn, &executor, &ai, &config(), early_at).unwrap();
    assert_eq!(early.predictions_triggered, 0);

    let later_at = now() + Duration::minutes(31);
    let later = run_cycle(&mut conn, &executor, &ai, &config(), later_at).unwrap();
    assert_eq!(later.predictions_triggered, 1);
    assert_eq!(ai.sent_kinds(), vec![(UPCOMING, AiJobKind::Prediction)]);
    let job = &store::load_ai_jobs(&conn, &[UPCOMING]).unwrap()[0];
    assert_eq!(job.status, AiJobStatus::Triggered);
    assert_eq!(job.attempts, 2);
}

#[test]
fn dry_run_plans_without_side_effects() {
    let mut conn = seeded_db();
    let executor = FakeExecutor::default();
    let ai = FakeAi::default();
    let cfg = AutomationConfig {
        dry_run: true,
        ..config()
    };

    let report = run_cycle(&mut conn, &executor, &ai, &cfg, now()).unwrap();
    assert!(report.run_id.is_none());
    assert_eq!(report.planned.len(), 12);
    assert_eq!(executor.call_count(), 0);
    assert!(ai.sent.lock().unwrap().is_empty());
    assert_eq!(run_count(&conn), 0);
    assert!(store::load_refresh_ledger(&conn).unwrap().is_empty());
}

#[test]
fn single_fixture_mode() {
    let mut conn = seeded_db();
    let executor = FakeExecutor::default();
    let ai = FakeAi::default();
    let cfg = AutomationConfig {
        only_fixture: Some(LIVE),
        ai_enabled: false,
        ..config()
    };

    let report = run_cycle(&mut conn, &executor, &ai, &cfg, now()).unwrap();
    assert_eq!(report.fixtures_considered, 1);
    assert_eq!(report.planned.len(), 3);
    assert!(report.planned.iter().all(|t| t.phase == MatchPhase::Live));
    assert!(ai.sent.lock().unwrap().is_empty());

    let missing = AutomationConfig {
        only_fixture: Some(404),
        ..cfg
    };
    let report = run_cycle(&mut conn, &executor, &ai, &missing, now()).unwrap();
    assert_eq!(report.fixtures_considered, 0);
    assert!(report.errors.iter().any(|e| e.contains("fixture 404")));
}

struct StoppingExecutor<'a> {
    shutdown: &'a AtomicBool,
    calls: AtomicUsize,
}

impl RefreshExecutor for StoppingExecutor<'_> {
    fn refresh(&self, _task: &RefreshTask) -> Result<RefreshOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.shutdown.store(true, Ordering::Relaxed);
        Ok(RefreshOutcome::Updated {
            records: 0,
            fixtures: Vec::new(),
        })
    }
}

#[test]
fn loop_finishes_the_cycle_then_stops_when_flag_is_raised() {
    let mut conn = store::open_in_memory().unwrap();
    let kickoff = Utc::now() + Duration::hours(2);
    store::upsert_fixtures(&mut conn, &[fixture(UPCOMING, kickoff, "NS")]).unwrap();

    let shutdown = AtomicBool::new(false);
    let executor = StoppingExecutor {
        shutdown: &shutdown,
        calls: AtomicUsize::new(0),
    };
    let cfg = AutomationConfig {
        interval: StdDuration::from_secs(3600),
        ai_enabled: false,
        ..config()
    };

    run_forever(&mut conn, &executor, &FakeAi::default(), &cfg, &shutdown);

    assert!(shutdown.load(Ordering::Relaxed));
    assert!(executor.calls.load(Ordering::SeqCst) > 0);
    assert_eq!(run_count(&conn), 1);
}
