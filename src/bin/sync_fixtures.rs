use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{Duration, Utc};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use matchday_orchestrator::config::{AppConfig, parse_ids};
use matchday_orchestrator::date_window::{TimeWindow, day_bounds, parse_date};
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
    let config = AppConfig::from_env();
    let api = config
        .api_client()
        .ok_or_else(|| anyhow!("API_FOOTBALL_KEY is not set"))?;

    let db_path = arg_value(&args, "--db")
        .map(PathBuf::from)
        .or_else(|| config.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let mut conn = store::open_db(&db_path)?;

    if let Some(raw) = arg_value(&args, "--ids") {
        let ids = raw
            .split([',', '-'])
            .filter_map(|part| part.trim().parse::<u64>().ok())
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return Err(anyhow!("no fixture ids in --ids {raw}"));
        }
        let fixtures = api.fetch_fixtures_by_ids(&ids)?;
        let upserted = store::upsert_fixtures(&mut conn, &fixtures)?;
        println!("Fixture sync complete");
        println!("DB: {}", db_path.display());
        println!("Requested: {} upserted: {upserted}", ids.len());
        return Ok(());
    }

    let from = match arg_value(&args, "--from") {
        Some(raw) => parse_date(&raw)?,
        None => Utc::now().date_naive(),
    };
    let days = arg_value(&args, "--days")
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(7)
        .clamp(1, 60);
    let leagues: HashSet<u32> = arg_value(&args, "--league-ids")
        .map(|raw| parse_ids(&raw))
        .unwrap_or_else(|| config.league_ids.clone());

    let (start, _) = day_bounds(from);
    let window = TimeWindow {
        start,
        end: start + Duration::days(days) - Duration::seconds(1),
    };

    let mut upserted = 0usize;
    let mut errors = Vec::new();
    for date in window.dates() {
        match api.fetch_fixtures_by_date(date, &leagues) {
            Ok(fixtures) => {
                upserted += store::upsert_fixtures(&mut conn, &fixtures)?;
                println!("{date}: {} fixtures", fixtures.len());
            }
            Err(err) => {
                warn!(%date, error = %format!("{err:#}"), "fixture sync failed");
                errors.push(format!("{date}: {err:#}"));
            }
        }
    }

    let mut league_list = leagues.iter().copied().collect::<Vec<_>>();
    league_list.sort_unstable();
    println!("Fixture sync complete");
    println!("DB: {}", db_path.display());
    if league_list.is_empty() {
        println!("Leagues: all");
    } else {
        println!("Leagues: {league_list:?}");
    }
    println!("Days: {days} from {from}");
    println!("Fixtures upserted: {upserted}");
    if !errors.is_empty() {
        println!("errors: {}", errors.len());
        for err in errors.iter().take(6) {
            println!(" - {err}");
        }
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
