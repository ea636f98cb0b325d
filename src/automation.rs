use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::config::AutomationConfig;
use crate::date_window::TimeWindow;
use crate::executor::{RefreshExecutor, RefreshOutcome};
use crate::fixture::Fixture;
use crate::phase::MatchPhase;
use crate::refresh::{ClassifiedFixture, RefreshTask, classify_fixtures, plan_refreshes};
use crate::store::{self, AiJob, AiJobStatus, RunCounters};
use crate::webhook::{AiJobKind, AiJobRequest, AiTrigger, WebhookAck};

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// `None` for dry runs, which write nothing.
    pub run_id: Option<i64>,
    pub fixtures_considered: usize,
    pub phase_counts: BTreeMap<MatchPhase, usize>,
    pub planned: Vec<RefreshTask>,
    pub fresh: usize,
    pub deferred: usize,
    pub refreshes_ok: usize,
    pub refreshes_skipped: usize,
    pub refreshes_failed: usize,
    pub fixtures_updated: usize,
    pub predictions_triggered: usize,
    pub analyses_triggered: usize,
    pub ai_failed: usize,
    pub errors: Vec<String>,
}

impl CycleReport {
    pub fn ai_triggered(&self) -> usize {
        self.predictions_triggered + self.analyses_triggered
    }

    pub fn summary_line(&self) -> String {
        format!(
            "fixtures={} planned={} ok={} skipped={} failed={} fresh={} deferred={} \
             predictions={} analyses={} ai_failed={}",
            self.fixtures_considered,
            self.planned.len(),
            self.refreshes_ok,
            self.refreshes_skipped,
            self.refreshes_failed,
            self.fresh,
            self.deferred,
            self.predictions_triggered,
            self.analyses_triggered,
            self.ai_failed,
        )
    }

    fn counters(&self) -> RunCounters {
        RunCounters {
            fixtures_considered: self.fixtures_considered,
            refreshes_ok: self.refreshes_ok,
            refreshes_failed: self.refreshes_failed,
            ai_triggered: self.ai_triggered(),
        }
    }
}

/// One orchestration tick: classify, refresh what is due, then fire AI jobs.
/// Individual refreshes and webhooks never abort the cycle; only store errors do.
pub fn run_cycle(
    conn: &mut Connection,
    executor: &dyn RefreshExecutor,
    ai: &dyn AiTrigger,
    cfg: &AutomationConfig,
    now: DateTime<Utc>,
) -> Result<CycleReport> {
    if cfg.dry_run {
        let mut report = CycleReport::default();
        let classified = classify_fixtures(load_candidates(conn, cfg, now, &mut report)?, now);
        plan_into(&mut report, conn, &classified, cfg, now)?;
        return Ok(report);
    }

    let run_id = store::begin_run(conn, now)?;
    let mut report = CycleReport {
        run_id: Some(run_id),
        ..CycleReport::default()
    };
    let outcome = execute_cycle(conn, executor, ai, cfg, now, &mut report);
    if let Err(err) = &outcome {
        report.errors.push(format!("cycle aborted: {err:#}"));
    }
    store::finish_run(conn, run_id, &report.counters(), &report.errors)?;
    outcome.map(|_| report)
}

fn execute_cycle(
    conn: &mut Connection,
    executor: &dyn RefreshExecutor,
    ai: &dyn AiTrigger,
    cfg: &AutomationConfig,
    now: DateTime<Utc>,
    report: &mut CycleReport,
) -> Result<()> {
    let classified = classify_fixtures(load_candidates(conn, cfg, now, report)?, now);
    plan_into(report, conn, &classified, cfg, now)?;

    let pool = build_pool(cfg.parallelism);
    let tasks = report.planned.clone();
    let results: Vec<Result<RefreshOutcome>> =
        with_pool(&pool, || tasks.par_iter().map(|task| executor.refresh(task)).collect());

    let mut updated: Vec<Fixture> = Vec::new();
    for (task, result) in tasks.iter().zip(results) {
        match result {
            Ok(RefreshOutcome::Updated { records, fixtures }) => {
                store::record_refresh_success(conn, task, now)?;
                debug!(source = %task.source, scope = %task.scope.key(), records, "refresh ok");
                report.refreshes_ok += 1;
                updated.extend(fixtures);
            }
            Ok(RefreshOutcome::Skipped(reason)) => {
                debug!(
                    source = %task.source,
                    scope = %task.scope.key(),
                    %reason,
                    "refresh skipped"
                );
                report.refreshes_skipped += 1;
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(
                    source = %task.source,
                    scope = %task.scope.key(),
                    error = %message,
                    "refresh failed"
                );
                store::record_refresh_failure(conn, task, now, &message)?;
                report.refreshes_failed += 1;
                report
                    .errors
                    .push(format!("{} {}: {message}", task.source, task.scope.key()));
            }
        }
    }
    if !updated.is_empty() {
        report.fixtures_updated = store::upsert_fixtures(conn, &updated)?;
    }

    if !cfg.ai_enabled {
        return Ok(());
    }

    let mut scratch = CycleReport::default();
    let reclassified = classify_fixtures(load_candidates(conn, cfg, now, &mut scratch)?, now);
    let ids: Vec<u64> = reclassified.iter().map(|c| c.fixture.fixture_id).collect();
    let jobs = store::load_ai_jobs(conn, &ids)?;
    let requests: Vec<AiJobRequest> = select_ai_jobs(&reclassified, &jobs, cfg, now)
        .into_iter()
        .filter(|req| ai.is_enabled(req.kind))
        .collect();
    if requests.is_empty() {
        return Ok(());
    }

    let acks: Vec<Result<WebhookAck>> =
        with_pool(&pool, || requests.par_iter().map(|req| ai.trigger(req)).collect());

    for (req, ack) in requests.iter().zip(acks) {
        match ack {
            Ok(ack) => {
                store::record_ai_trigger(conn, req.fixture_id, req.kind, Ok(&ack), now)?;
                match req.kind {
                    AiJobKind::Prediction => report.predictions_triggered += 1,
                    AiJobKind::Analysis => report.analyses_triggered += 1,
                }
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(
                    fixture_id = req.fixture_id,
                    kind = %req.kind,
                    error = %message,
                    "ai trigger failed"
                );
                let outcome = Err(message.as_str());
                store::record_ai_trigger(conn, req.fixture_id, req.kind, outcome, now)?;
                report.ai_failed += 1;
                report
                    .errors
                    .push(format!("{} fixture {}: {message}", req.kind, req.fixture_id));
            }
        }
    }
    Ok(())
}

fn load_candidates(
    conn: &Connection,
    cfg: &AutomationConfig,
    now: DateTime<Utc>,
    report: &mut CycleReport,
) -> Result<Vec<Fixture>> {
    if let Some(id) = cfg.only_fixture {
        let fixture = store::load_fixture(conn, id)?;
        if fixture.is_none() {
            report.errors.push(format!("fixture {id} not in store"));
        }
        return Ok(fixture.into_iter().collect());
    }
    let window = TimeWindow::around(now, cfg.lookback, cfg.lookahead);
    store::load_fixtures_between(conn, window.start, window.end)
        .with_context(|| format!("load fixtures {} .. {}", window.start, window.end))
}

fn plan_into(
    report: &mut CycleReport,
    conn: &Connection,
    classified: &[ClassifiedFixture],
    cfg: &AutomationConfig,
    now: DateTime<Utc>,
) -> Result<()> {
    report.fixtures_considered = classified.len();
    for item in classified {
        *report.phase_counts.entry(item.phase).or_insert(0) += 1;
    }
    let ledger = store::load_refresh_ledger(conn)?;
    let schedule = plan_refreshes(classified, &ledger, now, cfg.plan_options());
    report.fresh = schedule.fresh;
    report.deferred = schedule.deferred;
    report.planned = schedule.tasks;
    Ok(())
}

/// Which AI webhooks are due. Predictions go out before kickoff, analyses
/// after the final whistle for fixtures that already have a prediction.
pub fn select_ai_jobs(
    classified: &[ClassifiedFixture],
    jobs: &[AiJob],
    cfg: &AutomationConfig,
    now: DateTime<Utc>,
) -> Vec<AiJobRequest> {
    let by_key: HashMap<(u64, AiJobKind), &AiJob> =
        jobs.iter().map(|job| ((job.fixture_id, job.kind), job)).collect();
    let job = |id: u64, kind: AiJobKind| by_key.get(&(id, kind)).copied();

    let mut out = Vec::new();
    for item in classified {
        let id = item.fixture.fixture_id;
        let kind = match item.phase {
            MatchPhase::MatchDay | MatchPhase::PreMatch | MatchPhase::Lineups => {
                AiJobKind::Prediction
            }
            MatchPhase::FullTime | MatchPhase::PostMatch => {
                // Stale not-started rows also land here; wait for a real result.
                if !item.fixture.status.is_finished() {
                    continue;
                }
                let predicted =
                    job(id, AiJobKind::Prediction).is_some_and(|j| j.status.is_done());
                if !predicted {
                    continue;
                }
                AiJobKind::Analysis
            }
            _ => continue,
        };
        if !may_trigger(job(id, kind), cfg, now) {
            continue;
        }
        out.push(AiJobRequest::new(kind, &item.fixture, item.phase, now));
    }
    out
}

fn may_trigger(existing: Option<&AiJob>, cfg: &AutomationConfig, now: DateTime<Utc>) -> bool {
    let Some(job) = existing else {
        return true;
    };
    match job.status {
        AiJobStatus::Triggered | AiJobStatus::Completed => false,
        AiJobStatus::Failed => {
            job.attempts < cfg.ai_max_attempts && now - job.last_triggered_at >= cfg.ai_retry_after
        }
    }
}

/// Runs cycles every `cfg.interval` until `shutdown` is set. Failed cycles are
/// logged and the loop carries on.
pub fn run_forever(
    conn: &mut Connection,
    executor: &dyn RefreshExecutor,
    ai: &dyn AiTrigger,
    cfg: &AutomationConfig,
    shutdown: &AtomicBool,
) {
    info!(interval_secs = cfg.interval.as_secs(), "automation loop started");
    while !shutdown.load(Ordering::Relaxed) {
        let started = Instant::now();
        match run_cycle(conn, executor, ai, cfg, Utc::now()) {
            Ok(report) => {
                info!(run_id = ?report.run_id, summary = %report.summary_line(), "cycle finished");
                for err in report.errors.iter().take(5) {
                    warn!(error = %err, "cycle error");
                }
            }
            Err(err) => error!(error = %format!("{err:#}"), "cycle failed"),
        }
        sleep_until_next(started, cfg.interval, shutdown);
    }
    info!("automation loop stopped");
}

fn sleep_until_next(started: Instant, interval: StdDuration, shutdown: &AtomicBool) {
    let step = StdDuration::from_millis(250);
    while !shutdown.load(Ordering::Relaxed) {
        let elapsed = started.elapsed();
        if elapsed >= interval {
            return;
        }
        thread::sleep(step.min(interval - elapsed));
    }
}

fn build_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .ok()
}

fn with_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match pool.as_ref() {
        Some(pool) => pool.install(action),
        None => action(),
    }
}
