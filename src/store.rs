use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::warn;

use crate::date_window::parse_utc;
use crate::fixture::{Fixture, FixtureStatus};
use crate::refresh::{RefreshLedger, RefreshSource, RefreshTask};
use crate::webhook::{AiJobKind, WebhookAck};

const DATA_DIR: &str = "matchday_orchestrator";
const DB_FILE: &str = "matchday.sqlite";

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_DATA_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(DATA_DIR).join(DB_FILE));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(DATA_DIR)
            .join(DB_FILE),
    )
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS fixtures (
            fixture_id INTEGER PRIMARY KEY,
            league_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            kickoff_utc TEXT NOT NULL,
            status_short TEXT NOT NULL,
            elapsed INTEGER NULL,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            venue_city TEXT NULL,
            home_goals INTEGER NULL,
            away_goals INTEGER NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_fixtures_kickoff ON fixtures(kickoff_utc);
        CREATE INDEX IF NOT EXISTS idx_fixtures_league ON fixtures(league_id, season);

        CREATE TABLE IF NOT EXISTS refresh_log (
            source TEXT NOT NULL,
            scope TEXT NOT NULL,
            last_success_at TEXT NULL,
            last_attempt_at TEXT NOT NULL,
            last_error TEXT NULL,
            PRIMARY KEY (source, scope)
        );

        CREATE TABLE IF NOT EXISTS ai_jobs (
            fixture_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL,
            last_triggered_at TEXT NOT NULL,
            last_error TEXT NULL,
            external_id TEXT NULL,
            PRIMARY KEY (fixture_id, kind)
        );

        CREATE TABLE IF NOT EXISTS automation_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            fixtures_considered INTEGER NOT NULL DEFAULT 0,
            refreshes_ok INTEGER NOT NULL DEFAULT 0,
            refreshes_failed INTEGER NOT NULL DEFAULT 0,
            ai_triggered INTEGER NOT NULL DEFAULT 0,
            errors_json TEXT NOT NULL DEFAULT '[]'
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_fixtures(conn: &mut Connection, fixtures: &[Fixture]) -> Result<usize> {
    let tx = conn.transaction().context("begin fixture upsert")?;
    let now = ts(Utc::now());
    for f in fixtures {
        tx.execute(
            r#"
            INSERT INTO fixtures (
                fixture_id, league_id, season, kickoff_utc, status_short, elapsed,
                home_team_id, away_team_id, home_team, away_team, venue_city,
                home_goals, away_goals, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(fixture_id) DO UPDATE SET
                league_id = excluded.league_id,
                season = excluded.season,
                kickoff_utc = excluded.kickoff_utc,
                status_short = excluded.status_short,
                elapsed = excluded.elapsed,
                home_team_id = excluded.home_team_id,
                away_team_id = excluded.away_team_id,
                home_team = excluded.home_team,
                away_team = excluded.away_team,
                venue_city = excluded.venue_city,
                home_goals = excluded.home_goals,
                away_goals = excluded.away_goals,
                updated_at = excluded.updated_at
            "#,
            params![
                f.fixture_id as i64,
                f.league_id as i64,
                f.season,
                ts(f.kickoff),
                f.status.short_code(),
                f.elapsed.map(i64::from),
                f.home_team_id as i64,
                f.away_team_id as i64,
                f.home_team,
                f.away_team,
                f.venue_city,
                f.home_goals,
                f.away_goals,
                now,
            ],
        )
        .with_context(|| format!("upsert fixture {}", f.fixture_id))?;
    }
    tx.commit().context("commit fixture upsert")?;
    Ok(fixtures.len())
}

const FIXTURE_COLUMNS: &str = "fixture_id, league_id, season, kickoff_utc, status_short, elapsed,
    home_team_id, away_team_id, home_team, away_team, venue_city, home_goals, away_goals";

/// Fixtures whose kickoff lies in `[start, end]`, earliest first.
pub fn load_fixtures_between(
    conn: &Connection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Fixture>> {
    // Stored timestamps share one RFC 3339 form, so they compare lexically.
    let sql = format!(
        "SELECT {FIXTURE_COLUMNS} FROM fixtures
         WHERE kickoff_utc >= ?1 AND kickoff_utc <= ?2
         ORDER BY kickoff_utc ASC, fixture_id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare fixture window query")?;
    let rows = stmt
        .query_map(params![ts(start), ts(end)], fixture_from_row)
        .context("query fixture window")?;

    let mut out = Vec::new();
    for row in rows {
        if let Some(fixture) = row.context("decode fixture row")? {
            out.push(fixture);
        }
    }
    Ok(out)
}

pub fn load_fixture(conn: &Connection, fixture_id: u64) -> Result<Option<Fixture>> {
    let sql = format!("SELECT {FIXTURE_COLUMNS} FROM fixtures WHERE fixture_id = ?1");
    let row = conn
        .query_row(&sql, params![fixture_id as i64], fixture_from_row)
        .optional()
        .context("query fixture")?;
    Ok(row.flatten())
}

fn fixture_from_row(row: &Row<'_>) -> rusqlite::Result<Option<Fixture>> {
    let fixture_id = row.get::<_, i64>(0)? as u64;
    let kickoff_raw: String = row.get(3)?;
    let Ok(kickoff) = parse_utc(&kickoff_raw) else {
        warn!(fixture_id, kickoff = %kickoff_raw, "skipping fixture with unreadable kickoff");
        return Ok(None);
    };
    let status: String = row.get(4)?;
    Ok(Some(Fixture {
        fixture_id,
        league_id: row.get::<_, i64>(1)? as u32,
        season: row.get(2)?,
        kickoff,
        status: FixtureStatus::from_short(&status),
        elapsed: row.get::<_, Option<i64>>(5)?.map(|v| v.clamp(0, u16::MAX as i64) as u16),
        home_team_id: row.get::<_, i64>(6)? as u32,
        away_team_id: row.get::<_, i64>(7)? as u32,
        home_team: row.get(8)?,
        away_team: row.get(9)?,
        venue_city: row.get(10)?,
        home_goals: row.get(11)?,
        away_goals: row.get(12)?,
    }))
}

pub fn load_refresh_ledger(conn: &Connection) -> Result<RefreshLedger> {
    let mut stmt = conn
        .prepare(
            "SELECT source, scope, last_success_at FROM refresh_log \
             WHERE last_success_at IS NOT NULL",
        )
        .context("prepare refresh ledger query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .context("query refresh ledger")?;

    let mut ledger = RefreshLedger::new();
    for row in rows {
        let (source, scope, at) = row.context("decode refresh ledger row")?;
        let (Ok(source), Ok(at)) = (source.parse::<RefreshSource>(), parse_utc(&at)) else {
            continue;
        };
        ledger.insert(source, scope, at);
    }
    Ok(ledger)
}

pub fn record_refresh_success(
    conn: &Connection,
    task: &RefreshTask,
    at: DateTime<Utc>,
) -> Result<()> {
    let at = ts(at);
    conn.execute(
        r#"
        INSERT INTO refresh_log (source, scope, last_success_at, last_attempt_at, last_error)
        VALUES (?1, ?2, ?3, ?3, NULL)
        ON CONFLICT(source, scope) DO UPDATE SET
            last_success_at = excluded.last_success_at,
            last_attempt_at = excluded.last_attempt_at,
            last_error = NULL
        "#,
        params![task.source.as_str(), task.scope.key(), at],
    )
    .context("record refresh success")?;
    Ok(())
}

/// Keeps the previous success timestamp so a failing source is retried next cycle
/// only once its interval has lapsed.
pub fn record_refresh_failure(
    conn: &Connection,
    task: &RefreshTask,
    at: DateTime<Utc>,
    error: &str,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO refresh_log (source, scope, last_success_at, last_attempt_at, last_error)
        VALUES (?1, ?2, NULL, ?3, ?4)
        ON CONFLICT(source, scope) DO UPDATE SET
            last_attempt_at = excluded.last_attempt_at,
            last_error = excluded.last_error
        "#,
        params![task.source.as_str(), task.scope.key(), ts(at), error],
    )
    .context("record refresh failure")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiJobStatus {
    Triggered,
    Failed,
    Completed,
}

impl AiJobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AiJobStatus::Triggered => "triggered",
            AiJobStatus::Failed => "failed",
            AiJobStatus::Completed => "completed",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "triggered" => Some(AiJobStatus::Triggered),
            "failed" => Some(AiJobStatus::Failed),
            "completed" => Some(AiJobStatus::Completed),
            _ => None,
        }
    }

    pub fn is_done(self) -> bool {
        matches!(self, AiJobStatus::Triggered | AiJobStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiJob {
    pub fixture_id: u64,
    pub kind: AiJobKind,
    pub status: AiJobStatus,
    pub attempts: u32,
    pub last_triggered_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub external_id: Option<String>,
}

pub fn load_ai_jobs(conn: &Connection, fixture_ids: &[u64]) -> Result<Vec<AiJob>> {
    let mut stmt = conn
        .prepare(
            "SELECT fixture_id, kind, status, attempts, last_triggered_at, last_error, external_id
             FROM ai_jobs WHERE fixture_id = ?1",
        )
        .context("prepare ai jobs query")?;

    let mut out = Vec::new();
    for id in fixture_ids {
        let rows = stmt
            .query_map(params![*id as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })
            .context("query ai jobs")?;
        for row in rows {
            let (fixture_id, kind, status, attempts, at, last_error, external_id) =
                row.context("decode ai job row")?;
            let (Ok(kind), Some(status), Ok(at)) =
                (kind.parse::<AiJobKind>(), AiJobStatus::parse(&status), parse_utc(&at))
            else {
                continue;
            };
            out.push(AiJob {
                fixture_id,
                kind,
                status,
                attempts: attempts.max(0) as u32,
                last_triggered_at: at,
                last_error,
                external_id,
            });
        }
    }
    Ok(out)
}

pub fn record_ai_trigger(
    conn: &Connection,
    fixture_id: u64,
    kind: AiJobKind,
    outcome: Result<&WebhookAck, &str>,
    at: DateTime<Utc>,
) -> Result<()> {
    let (status, error, external_id) = match outcome {
        Ok(ack) if ack.completed => (AiJobStatus::Completed, None, ack.external_id.clone()),
        Ok(ack) => (AiJobStatus::Triggered, None, ack.external_id.clone()),
        Err(err) => (AiJobStatus::Failed, Some(err.to_string()), None),
    };
    conn.execute(
        r#"
        INSERT INTO ai_jobs
            (fixture_id, kind, status, attempts, last_triggered_at, last_error, external_id)
        VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)
        ON CONFLICT(fixture_id, kind) DO UPDATE SET
            status = excluded.status,
            attempts = ai_jobs.attempts + 1,
            last_triggered_at = excluded.last_triggered_at,
            last_error = excluded.last_error,
            external_id = COALESCE(excluded.external_id, ai_jobs.external_id)
        "#,
        params![
            fixture_id as i64,
            kind.as_str(),
            status.as_str(),
            ts(at),
            error,
            external_id,
        ],
    )
    .context("record ai trigger")?;
    Ok(())
}

pub fn begin_run(conn: &Connection, started_at: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        "INSERT INTO automation_runs(started_at) VALUES (?1)",
        params![ts(started_at)],
    )
    .context("insert automation run")?;
    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Clone, Default)]
pub struct RunCounters {
    pub fixtures_considered: usize,
    pub refreshes_ok: usize,
    pub refreshes_failed: usize,
    pub ai_triggered: usize,
}

pub fn finish_run(
    conn: &Connection,
    run_id: i64,
    counters: &RunCounters,
    errors: &[String],
) -> Result<()> {
    let errors_json = serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE automation_runs
         SET finished_at = ?1, fixtures_considered = ?2, refreshes_ok = ?3,
             refreshes_failed = ?4, ai_triggered = ?5, errors_json = ?6
         WHERE run_id = ?7",
        params![
            ts(Utc::now()),
            counters.fixtures_considered as i64,
            counters.refreshes_ok as i64,
            counters.refreshes_failed as i64,
            counters.ai_triggered as i64,
            errors_json,
            run_id,
        ],
    )
    .context("update automation run")?;
    Ok(())
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
