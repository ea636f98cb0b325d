use anyhow::{Context, Result, anyhow};
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::api_football::ApiFootballClient;
use crate::fixture::Fixture;
use crate::http_client::{RetryPolicy, http_client, send_with_retry};
use crate::refresh::{RefreshScope, RefreshSource, RefreshTask};

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Updated {
        records: usize,
        /// Fresh fixture rows to upsert, so phases advance with the feed.
        fixtures: Vec<Fixture>,
    },
    Skipped(String),
}

pub trait RefreshExecutor: Sync {
    fn refresh(&self, task: &RefreshTask) -> Result<RefreshOutcome>;
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fixture_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    league_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    season: Option<i32>,
    phase: &'a str,
}

impl<'a> RefreshRequest<'a> {
    fn from_task(task: &'a RefreshTask) -> Self {
        let (fixture_id, league_id, season) = match &task.scope {
            RefreshScope::Fixture(id) => (Some(*id), None, None),
            RefreshScope::League { league_id, season } => (None, Some(*league_id), Some(*season)),
        };
        Self {
            source: task.source.as_str(),
            fixture_id,
            league_id,
            season,
            phase: task.phase.as_str(),
        }
    }
}

/// Fixture rows come straight from the football API; every other source is
/// delegated to an ingestion endpoint under `refresh_base_url`.
pub struct HttpRefreshExecutor {
    api: Option<ApiFootballClient>,
    refresh_base_url: Option<String>,
    refresh_secret: Option<String>,
    retry: RetryPolicy,
}

impl HttpRefreshExecutor {
    pub fn new(
        api: Option<ApiFootballClient>,
        refresh_base_url: Option<String>,
        refresh_secret: Option<String>,
    ) -> Self {
        Self {
            api,
            refresh_base_url: refresh_base_url.map(|u| u.trim_end_matches('/').to_string()),
            refresh_secret,
            retry: RetryPolicy::default(),
        }
    }

    fn refresh_fixture(&self, api: &ApiFootballClient, fixture_id: u64) -> Result<RefreshOutcome> {
        match api.fetch_fixture(fixture_id)? {
            Some(fixture) => Ok(RefreshOutcome::Updated {
                records: 1,
                fixtures: vec![fixture],
            }),
            None => Err(anyhow!("fixture {fixture_id} missing from api response")),
        }
    }

    fn call_endpoint(&self, base: &str, task: &RefreshTask) -> Result<RefreshOutcome> {
        let client = http_client()?;
        let url = format!("{base}/{}", task.source.endpoint_path());
        let body = RefreshRequest::from_task(task);
        let bearer = self.refresh_secret.as_ref().map(|s| format!("Bearer {s}"));
        let label = format!("{} refresh", task.source);

        let resp = send_with_retry(&label, &self.retry, || {
            let req = client.post(&url).json(&body);
            match bearer.as_deref() {
                Some(value) => req.header(AUTHORIZATION, value),
                None => req,
            }
        })?;
        let raw = resp.text().context("failed reading refresh body")?;
        let records = parse_record_count(&raw);
        debug!(source = %task.source, scope = %task.scope.key(), records, "refresh endpoint ok");
        Ok(RefreshOutcome::Updated {
            records,
            fixtures: Vec::new(),
        })
    }
}

impl RefreshExecutor for HttpRefreshExecutor {
    fn refresh(&self, task: &RefreshTask) -> Result<RefreshOutcome> {
        if let (RefreshSource::Fixture, RefreshScope::Fixture(id), Some(api)) =
            (task.source, &task.scope, self.api.as_ref())
        {
            return self.refresh_fixture(api, *id);
        }
        match self.refresh_base_url.as_deref() {
            Some(base) => self.call_endpoint(base, task),
            None => Ok(RefreshOutcome::Skipped(format!(
                "no endpoint configured for {}",
                task.source
            ))),
        }
    }
}

/// Ingestion endpoints answer with a count under one of a few keys; anything
/// else counts as a single record.
pub fn parse_record_count(raw: &str) -> usize {
    let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
        return 1;
    };
    for key in ["records", "upserted", "count", "updated"] {
        if let Some(n) = value.get(key).and_then(|v| v.as_u64()) {
            return n as usize;
        }
    }
    if let Some(items) = value.get("data").and_then(|v| v.as_array()) {
        return items.len();
    }
    1
}
