use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::fixture::{FixtureStatus, FixtureTiming};

const SCHEDULED_AFTER_MINS: i64 = 24 * 60;
const MATCH_DAY_AFTER_MINS: i64 = 3 * 60;
const PRE_MATCH_AFTER_MINS: i64 = 60;

// A not-started status past kickoff is trusted as "probably live" this long.
const STALE_LIVE_MINS: i64 = 150;

// Kickoff to final whistle, including the interval and stoppage time.
const REGULAR_SPAN_MINS: i64 = 115;
const EXTRA_TIME_SPAN_MINS: i64 = 150;
const SHOOTOUT_SPAN_MINS: i64 = 165;

const FULL_TIME_WINDOW_MINS: i64 = 2 * 60;
const POST_MATCH_WINDOW_MINS: i64 = 48 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Scheduled,
    MatchDay,
    PreMatch,
    Lineups,
    Live,
    HalfTime,
    FullTime,
    PostMatch,
    Archived,
    Disrupted,
}

impl MatchPhase {
    pub const ALL: [MatchPhase; 10] = [
        MatchPhase::Scheduled,
        MatchPhase::MatchDay,
        MatchPhase::PreMatch,
        MatchPhase::Lineups,
        MatchPhase::Live,
        MatchPhase::HalfTime,
        MatchPhase::FullTime,
        MatchPhase::PostMatch,
        MatchPhase::Archived,
        MatchPhase::Disrupted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchPhase::Scheduled => "scheduled",
            MatchPhase::MatchDay => "match_day",
            MatchPhase::PreMatch => "pre_match",
            MatchPhase::Lineups => "lineups",
            MatchPhase::Live => "live",
            MatchPhase::HalfTime => "half_time",
            MatchPhase::FullTime => "full_time",
            MatchPhase::PostMatch => "post_match",
            MatchPhase::Archived => "archived",
            MatchPhase::Disrupted => "disrupted",
        }
    }

    /// Lower is more urgent. Used to order refresh work within a cycle.
    pub fn urgency(self) -> u8 {
        match self {
            MatchPhase::Live => 0,
            MatchPhase::HalfTime => 1,
            MatchPhase::Lineups => 2,
            MatchPhase::FullTime => 3,
            MatchPhase::PreMatch => 4,
            MatchPhase::MatchDay => 5,
            MatchPhase::Disrupted => 6,
            MatchPhase::PostMatch => 7,
            MatchPhase::Scheduled => 8,
            MatchPhase::Archived => 9,
        }
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MatchPhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        MatchPhase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == key)
            .ok_or_else(|| anyhow!("unknown match phase: {s}"))
    }
}

pub fn detect_current_phase(timing: FixtureTiming<'_>, now: DateTime<Utc>) -> MatchPhase {
    let status = timing.status;
    if status.is_disrupted() {
        return MatchPhase::Disrupted;
    }
    if status.is_break() {
        return MatchPhase::HalfTime;
    }
    if status.is_in_play() {
        return MatchPhase::Live;
    }
    if status.is_finished() {
        return phase_after_whistle(estimated_final_whistle(timing), now);
    }

    let until_kickoff = timing.kickoff - now;
    if until_kickoff > Duration::minutes(SCHEDULED_AFTER_MINS) {
        return MatchPhase::Scheduled;
    }
    if until_kickoff > Duration::minutes(MATCH_DAY_AFTER_MINS) {
        return MatchPhase::MatchDay;
    }
    if until_kickoff > Duration::minutes(PRE_MATCH_AFTER_MINS) {
        return MatchPhase::PreMatch;
    }
    if until_kickoff > Duration::zero() {
        return MatchPhase::Lineups;
    }

    // Kickoff reached but the feed still says not started.
    let since_kickoff = now - timing.kickoff;
    if since_kickoff <= Duration::minutes(STALE_LIVE_MINS) {
        return MatchPhase::Live;
    }
    let whistle = timing.kickoff + Duration::minutes(REGULAR_SPAN_MINS);
    phase_after_whistle(whistle, now)
}

/// Estimated instant of the final whistle for a finished fixture.
pub fn estimated_final_whistle(timing: FixtureTiming<'_>) -> DateTime<Utc> {
    timing.kickoff + Duration::minutes(final_whistle_span_mins(timing.status))
}

fn final_whistle_span_mins(status: &FixtureStatus) -> i64 {
    match status {
        FixtureStatus::FinishedAfterExtraTime => EXTRA_TIME_SPAN_MINS,
        FixtureStatus::FinishedAfterPenalties => SHOOTOUT_SPAN_MINS,
        _ => REGULAR_SPAN_MINS,
    }
}

fn phase_after_whistle(whistle: DateTime<Utc>, now: DateTime<Utc>) -> MatchPhase {
    let since = now - whistle;
    if since <= Duration::minutes(FULL_TIME_WINDOW_MINS) {
        MatchPhase::FullTime
    } else if since <= Duration::minutes(POST_MATCH_WINDOW_MINS) {
        MatchPhase::PostMatch
    } else {
        MatchPhase::Archived
    }
}
