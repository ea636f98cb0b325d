//! Matchday automation daemon.
//!
//! `--once` or `--dry-run` runs a single cycle and exits. Without either flag
//! the refresh loop runs until the process is stopped externally, e.g. by a
//! SIGTERM from the supervisor. The shutdown flag handed to the loop is never
//! raised from inside this binary; embedders of `run_forever` can raise it to
//! stop between cycles.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use matchday_orchestrator::automation::{self, CycleReport};
use matchday_orchestrator::config::AppConfig;
use matchday_orchestrator::store;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut config = AppConfig::from_env();
    let once = has_flag(&args, "--once");
    config.automation.dry_run = has_flag(&args, "--dry-run");
    config.automation.force = has_flag(&args, "--force");
    if let Some(raw) = arg_value(&args, "--fixture") {
        let id = raw
            .parse::<u64>()
            .with_context(|| format!("invalid --fixture value: {raw}"))?;
        config.automation.only_fixture = Some(id);
    }

    let db_path = arg_value(&args, "--db")
        .map(PathBuf::from)
        .or_else(|| config.db_path.clone())
        .ok_or_else(|| anyhow!("unable to resolve sqlite path"))?;
    let mut conn = store::open_db(&db_path)?;

    let executor = config.refresh_executor();
    let ai = config.webhook_client();

    if once || config.automation.dry_run {
        let report =
            automation::run_cycle(&mut conn, &executor, &ai, &config.automation, Utc::now())?;
        print_report(&report, config.automation.dry_run);
        return Ok(());
    }

    // Never raised here; the loop ends when the process is killed.
    let shutdown = AtomicBool::new(false);
    automation::run_forever(&mut conn, &executor, &ai, &config.automation, &shutdown);
    Ok(())
}

fn print_report(report: &CycleReport, dry_run: bool) {
    if dry_run {
        println!("Dry run, nothing was called");
    } else {
        println!("Cycle complete (run {})", report.run_id.unwrap_or_default());
    }
    println!("{}", report.summary_line());
    for (phase, count) in &report.phase_counts {
        println!("  {phase:<11} {count}");
    }
    if dry_run {
        for task in &report.planned {
            println!(
                "  plan: {:<12} {:<18} {}",
                task.source.as_str(),
                task.scope.key(),
                task.phase
            );
        }
    }
    if !report.errors.is_empty() {
        println!("errors: {}", report.errors.len());
        for err in report.errors.iter().take(10) {
            println!(" - {err}");
        }
    }
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| arg == name)
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
