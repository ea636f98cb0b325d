use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::fixture::Fixture;
use crate::http_client::{RetryPolicy, http_client, send_with_retry};
use crate::phase::MatchPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiJobKind {
    Prediction,
    Analysis,
}

impl AiJobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AiJobKind::Prediction => "prediction",
            AiJobKind::Analysis => "analysis",
        }
    }
}

impl fmt::Display for AiJobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiJobKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prediction" => Ok(AiJobKind::Prediction),
            "analysis" => Ok(AiJobKind::Analysis),
            other => Err(anyhow!("unknown ai job kind: {other}")),
        }
    }
}

/// Body posted to the workflow webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiJobRequest {
    pub fixture_id: u64,
    pub kind: AiJobKind,
    pub league_id: u32,
    pub season: i32,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub status: String,
    pub phase: MatchPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_goals: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_goals: Option<i32>,
    pub requested_at: DateTime<Utc>,
}

impl AiJobRequest {
    pub fn new(
        kind: AiJobKind,
        fixture: &Fixture,
        phase: MatchPhase,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            fixture_id: fixture.fixture_id,
            kind,
            league_id: fixture.league_id,
            season: fixture.season,
            home_team: fixture.home_team.clone(),
            away_team: fixture.away_team.clone(),
            kickoff: fixture.kickoff,
            status: fixture.status.short_code().to_string(),
            phase,
            home_goals: fixture.home_goals,
            away_goals: fixture.away_goals,
            requested_at,
        }
    }

    /// Stable across retries and cycles for the same fixture, kind and kickoff,
    /// so the workflow can drop duplicates.
    pub fn idempotency_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.fixture_id.to_le_bytes());
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update(self.kickoff.timestamp().to_le_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookAck {
    pub external_id: Option<String>,
    /// The workflow answered synchronously with a finished result.
    pub completed: bool,
}

pub trait AiTrigger: Sync {
    fn is_enabled(&self, kind: AiJobKind) -> bool;
    fn trigger(&self, request: &AiJobRequest) -> Result<WebhookAck>;
}

#[derive(Debug, Clone)]
pub enum WebhookAuth {
    Basic { user: String, password: String },
    Token { header: String, value: String },
}

impl WebhookAuth {
    fn header(&self) -> (String, String) {
        match self {
            WebhookAuth::Basic { user, password } => {
                let encoded = BASE64.encode(format!("{user}:{password}"));
                (AUTHORIZATION.as_str().to_string(), format!("Basic {encoded}"))
            }
            WebhookAuth::Token { header, value } => (header.clone(), value.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WebhookEndpoints {
    pub prediction_url: Option<String>,
    pub analysis_url: Option<String>,
}

impl WebhookEndpoints {
    fn url(&self, kind: AiJobKind) -> Option<&str> {
        match kind {
            AiJobKind::Prediction => self.prediction_url.as_deref(),
            AiJobKind::Analysis => self.analysis_url.as_deref(),
        }
    }
}

pub struct N8nWebhookClient {
    endpoints: WebhookEndpoints,
    auth: Option<WebhookAuth>,
    retry: RetryPolicy,
}

impl N8nWebhookClient {
    pub fn new(endpoints: WebhookEndpoints, auth: Option<WebhookAuth>) -> Self {
        Self {
            endpoints,
            auth,
            retry: RetryPolicy::default(),
        }
    }
}

impl AiTrigger for N8nWebhookClient {
    fn is_enabled(&self, kind: AiJobKind) -> bool {
        self.endpoints.url(kind).is_some()
    }

    fn trigger(&self, request: &AiJobRequest) -> Result<WebhookAck> {
        let url = self
            .endpoints
            .url(request.kind)
            .ok_or_else(|| anyhow!("no webhook configured for {}", request.kind))?;
        let client = http_client()?;
        let key = request.idempotency_key();
        let auth = self.auth.as_ref().map(WebhookAuth::header);
        let label = format!("{} webhook", request.kind);

        let resp = send_with_retry(&label, &self.retry, || {
            let mut req = client
                .post(url)
                .header("Idempotency-Key", key.as_str())
                .json(request);
            if let Some((name, value)) = auth.as_ref() {
                req = req.header(name.as_str(), value.as_str());
            }
            req
        })?;

        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        let body = resp.text().context("failed reading webhook body")?;
        let ack = if is_json {
            parse_webhook_ack(&body)
        } else {
            WebhookAck::default()
        };
        info!(
            fixture_id = request.fixture_id,
            kind = %request.kind,
            completed = ack.completed,
            "ai webhook accepted"
        );
        Ok(ack)
    }
}

/// Reads the optional acknowledgement a workflow sends back. Unknown shapes
/// still count as accepted.
pub fn parse_webhook_ack(raw: &str) -> WebhookAck {
    let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
        return WebhookAck::default();
    };
    let root = match &value {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };
    let external_id = ["executionId", "execution_id", "id", "jobId"]
        .iter()
        .find_map(|key| match root.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });
    let completed = root
        .get("status")
        .and_then(|v| v.as_str())
        .is_some_and(|s| {
            matches!(
                s.to_ascii_lowercase().as_str(),
                "completed" | "done" | "success" | "finished"
            )
        });
    WebhookAck {
        external_id,
        completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_parsing_tolerates_shapes() {
        assert_eq!(parse_webhook_ack(""), WebhookAck::default());
        assert_eq!(parse_webhook_ack("Workflow was started"), WebhookAck::default());

        let ack = parse_webhook_ack(r#"{"executionId": "8812", "status": "running"}"#);
        assert_eq!(ack.external_id.as_deref(), Some("8812"));
        assert!(!ack.completed);

        let ack = parse_webhook_ack(r#"[{"id": 17, "status": "Success"}]"#);
        assert_eq!(ack.external_id.as_deref(), Some("17"));
        assert!(ack.completed);
    }

    #[test]
    fn basic_auth_header_is_base64() {
        let auth = WebhookAuth::Basic {
            user: "cron".to_string(),
            password: "s3cret".to_string(),
        };
        let (name, value) = auth.header();
        assert_eq!(name, "authorization");
        assert_eq!(value, "Basic Y3JvbjpzM2NyZXQ=");
    }
}
