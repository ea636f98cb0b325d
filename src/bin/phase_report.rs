use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use matchday_orchestrator::config::AppConfig;
use matchday_orchestrator::date_window::{TimeWindow, format_relative};
use matchday_orchestrator::phase::{MatchPhase, estimated_final_whistle};
use matchday_orchestrator::refresh::{classify_fixtures, recommended_refreshes};
use matchday_orchestrator::store;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let config = AppConfig::from_env();
    let phase_filter = match arg_value(&args, "--phase") {
        Some(raw) => Some(raw.parse::<MatchPhase>()?),
        None => None,
    };
    let db_path = arg_value(&args, "--db")
        .map(PathBuf::from)
        .or_else(|| config.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let conn = store::open_db(&db_path)?;

    let now = Utc::now();
    let window = TimeWindow::around(now, config.automation.lookback, config.automation.lookahead);
    let fixtures = store::load_fixtures_between(&conn, window.start, window.end)?;
    let classified = classify_fixtures(fixtures, now);

    let mut counts: BTreeMap<MatchPhase, usize> = BTreeMap::new();
    for item in &classified {
        *counts.entry(item.phase).or_insert(0) += 1;
    }

    println!("Phase report at {}", now.format("%Y-%m-%d %H:%M UTC"));
    println!("DB: {}", db_path.display());
    println!("Fixtures in window: {}", classified.len());
    for (phase, count) in &counts {
        println!("  {phase:<11} {count}");
    }
    println!();

    for item in &classified {
        if phase_filter.is_some_and(|p| p != item.phase) {
            continue;
        }
        let f = &item.fixture;
        let plan = recommended_refreshes(item.phase);
        let sources = plan
            .sources
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let cadence = match plan.min_interval() {
            Some(interval) => format!("every {}m", interval.num_minutes()),
            None => "idle".to_string(),
        };
        let mut when = format!("kickoff {}", format_relative(f.kickoff - now));
        if f.status.is_finished() {
            let whistle = estimated_final_whistle(f.timing());
            when = format!("whistle {}", format_relative(whistle - now));
        } else if let Some(minute) = f.elapsed.filter(|_| !f.status.is_not_started()) {
            when = format!("{minute}'");
        }
        println!(
            "{:>9} {:<11} {:<5} {:<16} {} [{sources}] {cadence}",
            f.fixture_id,
            item.phase.as_str(),
            f.status.short_code(),
            when,
            f.label(),
        );
    }
    Ok(())
}

fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}
