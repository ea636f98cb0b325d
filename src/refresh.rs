use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};

use crate::fixture::Fixture;
use crate::phase::{MatchPhase, detect_current_phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefreshSource {
    Fixture,
    Standings,
    TeamStats,
    HeadToHead,
    Injuries,
    Odds,
    Weather,
    Lineups,
    Events,
    Statistics,
    PlayerStats,
}

impl RefreshSource {
    pub const ALL: [RefreshSource; 11] = [
        RefreshSource::Fixture,
        RefreshSource::Standings,
        RefreshSource::TeamStats,
        RefreshSource::HeadToHead,
        RefreshSource::Injuries,
        RefreshSource::Odds,
        RefreshSource::Weather,
        RefreshSource::Lineups,
        RefreshSource::Events,
        RefreshSource::Statistics,
        RefreshSource::PlayerStats,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RefreshSource::Fixture => "fixture",
            RefreshSource::Standings => "standings",
            RefreshSource::TeamStats => "team_stats",
            RefreshSource::HeadToHead => "head_to_head",
            RefreshSource::Injuries => "injuries",
            RefreshSource::Odds => "odds",
            RefreshSource::Weather => "weather",
            RefreshSource::Lineups => "lineups",
            RefreshSource::Events => "events",
            RefreshSource::Statistics => "statistics",
            RefreshSource::PlayerStats => "player_stats",
        }
    }

    /// Path segment of the ingestion endpoint behind this source.
    pub fn endpoint_path(self) -> &'static str {
        match self {
            RefreshSource::Fixture => "fixtures",
            RefreshSource::Standings => "standings",
            RefreshSource::TeamStats => "team-stats",
            RefreshSource::HeadToHead => "head-to-head",
            RefreshSource::Injuries => "injuries",
            RefreshSource::Odds => "odds",
            RefreshSource::Weather => "weather",
            RefreshSource::Lineups => "lineups",
            RefreshSource::Events => "events",
            RefreshSource::Statistics => "statistics",
            RefreshSource::PlayerStats => "player-stats",
        }
    }

    pub fn is_league_scoped(self) -> bool {
        matches!(self, RefreshSource::Standings)
    }
}

impl fmt::Display for RefreshSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        RefreshSource::ALL
            .into_iter()
            .find(|source| source.as_str() == key)
            .ok_or_else(|| anyhow!("unknown refresh source: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPlan {
    pub phase: MatchPhase,
    pub sources: &'static [RefreshSource],
    /// `None` means the phase never needs a refresh.
    pub min_interval_mins: Option<i64>,
}

impl RefreshPlan {
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval_mins.map(Duration::minutes)
    }
}

use self::RefreshSource as S;

const SCHEDULED_SOURCES: &[RefreshSource] = &[S::Fixture, S::Standings];
const MATCH_DAY_SOURCES: &[RefreshSource] = &[
    S::Fixture,
    S::TeamStats,
    S::HeadToHead,
    S::Injuries,
    S::Odds,
    S::Weather,
];
const PRE_MATCH_SOURCES: &[RefreshSource] = &[S::Fixture, S::Injuries, S::Odds, S::Weather];
const LINEUPS_SOURCES: &[RefreshSource] = &[S::Fixture, S::Lineups, S::Odds];
const LIVE_SOURCES: &[RefreshSource] = &[S::Fixture, S::Events, S::Statistics];
const HALF_TIME_SOURCES: &[RefreshSource] = &[S::Fixture, S::Statistics];
const FULL_TIME_SOURCES: &[RefreshSource] = &[
    S::Fixture,
    S::Events,
    S::Statistics,
    S::PlayerStats,
    S::Standings,
];
const POST_MATCH_SOURCES: &[RefreshSource] = &[S::PlayerStats, S::Standings];
const ARCHIVED_SOURCES: &[RefreshSource] = &[];
const DISRUPTED_SOURCES: &[RefreshSource] = &[S::Fixture];

pub fn recommended_refreshes(phase: MatchPhase) -> RefreshPlan {
    let (sources, min_interval_mins) = match phase {
        MatchPhase::Scheduled => (SCHEDULED_SOURCES, Some(24 * 60)),
        MatchPhase::MatchDay => (MATCH_DAY_SOURCES, Some(6 * 60)),
        MatchPhase::PreMatch => (PRE_MATCH_SOURCES, Some(60)),
        MatchPhase::Lineups => (LINEUPS_SOURCES, Some(10)),
        MatchPhase::Live => (LIVE_SOURCES, Some(2)),
        MatchPhase::HalfTime => (HALF_TIME_SOURCES, Some(5)),
        MatchPhase::FullTime => (FULL_TIME_SOURCES, Some(30)),
        MatchPhase::PostMatch => (POST_MATCH_SOURCES, Some(12 * 60)),
        MatchPhase::Archived => (ARCHIVED_SOURCES, None),
        MatchPhase::Disrupted => (DISRUPTED_SOURCES, Some(12 * 60)),
    };

    RefreshPlan {
        phase,
        sources,
        min_interval_mins,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefreshScope {
    Fixture(u64),
    League { league_id: u32, season: i32 },
}

impl RefreshScope {
    pub fn key(&self) -> String {
        match self {
            RefreshScope::Fixture(id) => format!("fixture:{id}"),
            RefreshScope::League { league_id, season } => format!("league:{league_id}:{season}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTask {
    pub source: RefreshSource,
    pub scope: RefreshScope,
    pub phase: MatchPhase,
    pub kickoff: DateTime<Utc>,
}

impl RefreshTask {
    pub fn ledger_key(&self) -> (RefreshSource, String) {
        (self.source, self.scope.key())
    }
}

#[derive(Debug, Clone)]
pub struct ClassifiedFixture {
    pub fixture: Fixture,
    pub phase: MatchPhase,
}

pub fn classify_fixtures(fixtures: Vec<Fixture>, now: DateTime<Utc>) -> Vec<ClassifiedFixture> {
    fixtures
        .into_iter()
        .map(|fixture| {
            let phase = detect_current_phase(fixture.timing(), now);
            ClassifiedFixture { fixture, phase }
        })
        .collect()
}

/// Last successful refresh per `(source, scope key)`.
#[derive(Debug, Clone, Default)]
pub struct RefreshLedger {
    entries: HashMap<(RefreshSource, String), DateTime<Utc>>,
}

impl RefreshLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: RefreshSource, scope_key: String, at: DateTime<Utc>) {
        self.entries.insert((source, scope_key), at);
    }

    pub fn last_success(&self, source: RefreshSource, scope_key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(&(source, scope_key.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlanOptions {
    pub force: bool,
    pub max_tasks: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            force: false,
            max_tasks: 60,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RefreshSchedule {
    pub tasks: Vec<RefreshTask>,
    /// Tasks dropped because their last refresh is still within the interval.
    pub fresh: usize,
    /// Tasks beyond `max_tasks`, left for the next cycle.
    pub deferred: usize,
}

pub fn plan_refreshes(
    classified: &[ClassifiedFixture],
    ledger: &RefreshLedger,
    now: DateTime<Utc>,
    opts: PlanOptions,
) -> RefreshSchedule {
    let mut by_key: HashMap<(RefreshSource, String), RefreshTask> = HashMap::new();

    for item in classified {
        let plan = recommended_refreshes(item.phase);
        for source in plan.sources {
            let scope = if source.is_league_scoped() {
                RefreshScope::League {
                    league_id: item.fixture.league_id,
                    season: item.fixture.season,
                }
            } else {
                RefreshScope::Fixture(item.fixture.fixture_id)
            };
            let task = RefreshTask {
                source: *source,
                scope,
                phase: item.phase,
                kickoff: item.fixture.kickoff,
            };
            by_key
                .entry(task.ledger_key())
                .and_modify(|existing| {
                    if more_urgent(&task, existing) {
                        *existing = task.clone();
                    }
                })
                .or_insert(task);
        }
    }

    let mut fresh = 0usize;
    let mut tasks = Vec::with_capacity(by_key.len());
    for (key, task) in by_key {
        if !opts.force && is_fresh(ledger.last_success(key.0, &key.1), task.phase, now) {
            fresh += 1;
            continue;
        }
        tasks.push(task);
    }

    tasks.sort_by(|a, b| {
        a.phase
            .urgency()
            .cmp(&b.phase.urgency())
            .then(a.kickoff.cmp(&b.kickoff))
            .then(a.source.cmp(&b.source))
            .then(a.scope.key().cmp(&b.scope.key()))
    });

    let deferred = tasks.len().saturating_sub(opts.max_tasks);
    tasks.truncate(opts.max_tasks);

    RefreshSchedule {
        tasks,
        fresh,
        deferred,
    }
}

fn more_urgent(candidate: &RefreshTask, existing: &RefreshTask) -> bool {
    (candidate.phase.urgency(), candidate.kickoff) < (existing.phase.urgency(), existing.kickoff)
}

fn is_fresh(last: Option<DateTime<Utc>>, phase: MatchPhase, now: DateTime<Utc>) -> bool {
    let Some(last) = last else {
        return false;
    };
    match recommended_refreshes(phase).min_interval() {
        Some(interval) => now - last < interval,
        None => true,
    }
}
