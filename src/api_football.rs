use std::collections::HashSet;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::date_window::parse_utc;
use crate::fixture::{Fixture, FixtureStatus};
use crate::http_client::{RetryPolicy, http_client, send_with_retry};

pub const DEFAULT_BASE_URL: &str = "https://v3.football.api-sports.io";
const API_KEY_HEADER: &str = "x-apisports-key";
const MAX_IDS_PER_REQUEST: usize = 20;

#[derive(Debug, Clone)]
pub struct ApiFootballClient {
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl ApiFootballClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Fixtures played on `date` (UTC). An empty filter keeps every league.
    pub fn fetch_fixtures_by_date(
        &self,
        date: NaiveDate,
        league_filter: &HashSet<u32>,
    ) -> Result<Vec<Fixture>> {
        let date = date.format("%Y-%m-%d").to_string();
        let body = self.get("fixtures", &[("date", date.as_str()), ("timezone", "UTC")])?;
        let mut fixtures = parse_fixtures_json(&body)?;
        if !league_filter.is_empty() {
            fixtures.retain(|f| league_filter.contains(&f.league_id));
        }
        debug!(%date, count = fixtures.len(), "fetched fixtures by date");
        Ok(fixtures)
    }

    pub fn fetch_fixtures_by_ids(&self, ids: &[u64]) -> Result<Vec<Fixture>> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let joined = chunk
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("-");
            let body = self.get("fixtures", &[("ids", joined.as_str()), ("timezone", "UTC")])?;
            out.extend(parse_fixtures_json(&body)?);
        }
        Ok(out)
    }

    pub fn fetch_fixture(&self, id: u64) -> Result<Option<Fixture>> {
        let id = id.to_string();
        let body = self.get("fixtures", &[("id", id.as_str()), ("timezone", "UTC")])?;
        Ok(parse_fixtures_json(&body)?.into_iter().next())
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let client = http_client()?;
        let url = format!("{}/{path}", self.base_url);
        let resp = send_with_retry("api-football", &self.retry, || {
            client
                .get(&url)
                .query(query)
                .header(API_KEY_HEADER, self.api_key.as_str())
        })?;
        resp.text().context("failed reading api-football body")
    }
}

#[derive(Debug, Deserialize)]
struct FixturesEnvelope {
    #[serde(default)]
    errors: Value,
    #[serde(default)]
    response: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawFixture {
    fixture: RawFixtureInfo,
    league: RawLeague,
    teams: RawTeams,
    #[serde(default)]
    goals: RawGoals,
}

#[derive(Debug, Deserialize)]
struct RawFixtureInfo {
    id: u64,
    date: Option<String>,
    timestamp: Option<i64>,
    #[serde(default)]
    venue: Option<RawVenue>,
    status: RawStatus,
}

#[derive(Debug, Deserialize)]
struct RawVenue {
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    #[serde(default)]
    short: String,
    elapsed: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawLeague {
    id: u32,
    season: i32,
}

#[derive(Debug, Deserialize)]
struct RawTeams {
    home: RawTeam,
    away: RawTeam,
}

#[derive(Debug, Deserialize)]
struct RawTeam {
    id: u32,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawGoals {
    home: Option<i32>,
    away: Option<i32>,
}

/// Parses a `/fixtures` payload. Entries that fail to decode are skipped;
/// an API-level `errors` object fails the whole payload.
pub fn parse_fixtures_json(raw: &str) -> Result<Vec<Fixture>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let envelope: FixturesEnvelope =
        serde_json::from_str(trimmed).context("invalid api-football json")?;
    if let Some(message) = api_error_message(&envelope.errors) {
        return Err(anyhow!("api-football error: {message}"));
    }

    let mut out = Vec::with_capacity(envelope.response.len());
    for item in envelope.response {
        match serde_json::from_value::<RawFixture>(item) {
            Ok(raw) => match fixture_from_raw(raw) {
                Some(fixture) => out.push(fixture),
                None => debug!("skipping fixture without a usable kickoff"),
            },
            Err(err) => warn!(error = %err, "skipping malformed fixture entry"),
        }
    }
    Ok(out)
}

fn fixture_from_raw(raw: RawFixture) -> Option<Fixture> {
    let kickoff = raw
        .fixture
        .date
        .as_deref()
        .and_then(|d| parse_utc(d).ok())
        .or_else(|| raw.fixture.timestamp.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)))?;

    Some(Fixture {
        fixture_id: raw.fixture.id,
        league_id: raw.league.id,
        season: raw.league.season,
        kickoff,
        status: FixtureStatus::from_short(&raw.fixture.status.short),
        elapsed: raw.fixture.status.elapsed,
        home_team_id: raw.teams.home.id,
        away_team_id: raw.teams.away.id,
        home_team: raw.teams.home.name,
        away_team: raw.teams.away.name,
        venue_city: raw
            .fixture
            .venue
            .and_then(|v| v.city)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        home_goals: raw.goals.home,
        away_goals: raw.goals.away,
    })
}

// The API returns `[]` when fine and an object keyed by error type otherwise.
fn api_error_message(errors: &Value) -> Option<String> {
    match errors {
        Value::Object(map) if !map.is_empty() => Some(
            map.iter()
                .map(|(k, v)| match v.as_str() {
                    Some(s) => format!("{k}: {s}"),
                    None => format!("{k}: {v}"),
                })
                .collect::<Vec<_>>()
                .join("; "),
        ),
        Value::Array(items) if !items.is_empty() => Some(
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::api_error_message;
    use serde_json::json;

    #[test]
    fn error_shapes() {
        assert_eq!(api_error_message(&json!([])), None);
        assert_eq!(api_error_message(&json!({})), None);
        assert_eq!(api_error_message(&json!(null)), None);
        assert_eq!(
            api_error_message(&json!({"requests": "limit reached"})).as_deref(),
            Some("requests: limit reached")
        );
    }
}
