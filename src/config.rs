use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::api_football::{ApiFootballClient, DEFAULT_BASE_URL};
use crate::executor::HttpRefreshExecutor;
use crate::refresh::PlanOptions;
use crate::store::default_db_path;
use crate::webhook::{N8nWebhookClient, WebhookAuth, WebhookEndpoints};

#[derive(Debug, Clone)]
pub struct AutomationConfig {
    pub interval: StdDuration,
    pub lookback: Duration,
    pub lookahead: Duration,
    pub max_tasks: usize,
    pub parallelism: usize,
    pub ai_enabled: bool,
    pub ai_max_attempts: u32,
    pub ai_retry_after: Duration,
    pub force: bool,
    pub dry_run: bool,
    pub only_fixture: Option<u64>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            interval: StdDuration::from_secs(300),
            lookback: Duration::hours(72),
            lookahead: Duration::days(7),
            max_tasks: 60,
            parallelism: 6,
            ai_enabled: true,
            ai_max_attempts: 3,
            ai_retry_after: Duration::minutes(30),
            force: false,
            dry_run: false,
            only_fixture: None,
        }
    }
}

impl AutomationConfig {
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            force: self.force,
            max_tasks: self.max_tasks,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: Option<PathBuf>,
    pub api_football_key: Option<String>,
    pub api_football_base_url: String,
    pub refresh_base_url: Option<String>,
    pub refresh_secret: Option<String>,
    pub webhooks: WebhookEndpoints,
    pub webhook_auth: Option<WebhookAuth>,
    pub league_ids: HashSet<u32>,
    pub automation: AutomationConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let num = |key: &str| get(key).and_then(|v| v.parse::<u64>().ok());
        let defaults = AutomationConfig::default();

        let automation = AutomationConfig {
            interval: StdDuration::from_secs(
                num("AUTOMATION_INTERVAL_SECS")
                    .unwrap_or(defaults.interval.as_secs())
                    .clamp(30, 86_400),
            ),
            lookback: Duration::hours(
                num("AUTOMATION_LOOKBACK_HOURS").unwrap_or(72).clamp(1, 24 * 14) as i64,
            ),
            lookahead: Duration::days(
                num("AUTOMATION_LOOKAHEAD_DAYS").unwrap_or(7).clamp(1, 30) as i64,
            ),
            max_tasks: num("AUTOMATION_MAX_TASKS")
                .map(|v| v as usize)
                .unwrap_or(defaults.max_tasks)
                .clamp(1, 1_000),
            parallelism: num("FETCH_PARALLELISM")
                .map(|v| v as usize)
                .unwrap_or(defaults.parallelism)
                .clamp(2, 32),
            ai_enabled: get("AUTOMATION_AI_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.ai_enabled),
            ai_max_attempts: num("AI_MAX_ATTEMPTS")
                .map(|v| v as u32)
                .unwrap_or(defaults.ai_max_attempts)
                .clamp(1, 10),
            ai_retry_after: Duration::minutes(
                num("AI_RETRY_AFTER_MINS").unwrap_or(30).clamp(1, 24 * 60) as i64,
            ),
            ..defaults
        };

        let webhook_auth = match (get("AI_WEBHOOK_USER"), get("AI_WEBHOOK_PASSWORD")) {
            (Some(user), Some(password)) => Some(WebhookAuth::Basic { user, password }),
            _ => get("AI_WEBHOOK_TOKEN").map(|value| WebhookAuth::Token {
                header: get("AI_WEBHOOK_TOKEN_HEADER")
                    .unwrap_or_else(|| "X-Webhook-Token".to_string()),
                value,
            }),
        };

        Self {
            db_path: get("MATCHDAY_DB").map(PathBuf::from).or_else(default_db_path),
            api_football_key: get("API_FOOTBALL_KEY"),
            api_football_base_url: get("API_FOOTBALL_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            refresh_base_url: get("REFRESH_BASE_URL"),
            refresh_secret: get("REFRESH_SECRET"),
            webhooks: WebhookEndpoints {
                prediction_url: get("AI_PREDICTION_WEBHOOK_URL"),
                analysis_url: get("AI_ANALYSIS_WEBHOOK_URL"),
            },
            webhook_auth,
            league_ids: get("APP_LEAGUE_IDS")
                .map(|raw| parse_ids(&raw))
                .unwrap_or_default(),
            automation,
        }
    }

    pub fn api_client(&self) -> Option<ApiFootballClient> {
        self.api_football_key
            .as_deref()
            .map(|key| ApiFootballClient::new(&self.api_football_base_url, key))
    }

    pub fn refresh_executor(&self) -> HttpRefreshExecutor {
        HttpRefreshExecutor::new(
            self.api_client(),
            self.refresh_base_url.clone(),
            self.refresh_secret.clone(),
        )
    }

    pub fn webhook_client(&self) -> N8nWebhookClient {
        N8nWebhookClient::new(self.webhooks.clone(), self.webhook_auth.clone())
    }
}

pub fn parse_bool(raw: &str) -> bool {
    let t = raw.trim().to_ascii_lowercase();
    !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
}

pub fn parse_ids(raw: &str) -> HashSet<u32> {
    raw.split([',', ';', ' '])
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .filter(|id| *id != 0)
        .collect()
}
