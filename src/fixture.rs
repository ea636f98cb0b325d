use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FixtureStatus {
    NotStarted,
    ToBeDefined,
    FirstHalf,
    HalfTime,
    SecondHalf,
    ExtraTime,
    BreakTime,
    Penalties,
    InPlay,
    Interrupted,
    Finished,
    FinishedAfterExtraTime,
    FinishedAfterPenalties,
    TechnicalLoss,
    WalkOver,
    Postponed,
    Cancelled,
    Abandoned,
    Suspended,
    Unknown(String),
}

impl FixtureStatus {
    pub fn from_short(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "NS" => Self::NotStarted,
            "TBD" => Self::ToBeDefined,
            "1H" => Self::FirstHalf,
            "HT" => Self::HalfTime,
            "2H" => Self::SecondHalf,
            "ET" => Self::ExtraTime,
            "BT" => Self::BreakTime,
            "P" => Self::Penalties,
            "LIVE" => Self::InPlay,
            "INT" => Self::Interrupted,
            "FT" => Self::Finished,
            "AET" => Self::FinishedAfterExtraTime,
            "PEN" => Self::FinishedAfterPenalties,
            "AWD" => Self::TechnicalLoss,
            "WO" => Self::WalkOver,
            "PST" => Self::Postponed,
            "CANC" => Self::Cancelled,
            "ABD" => Self::Abandoned,
            "SUSP" => Self::Suspended,
            "" => Self::Unknown(String::new()),
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn short_code(&self) -> &str {
        match self {
            Self::NotStarted => "NS",
            Self::ToBeDefined => "TBD",
            Self::FirstHalf => "1H",
            Self::HalfTime => "HT",
            Self::SecondHalf => "2H",
            Self::ExtraTime => "ET",
            Self::BreakTime => "BT",
            Self::Penalties => "P",
            Self::InPlay => "LIVE",
            Self::Interrupted => "INT",
            Self::Finished => "FT",
            Self::FinishedAfterExtraTime => "AET",
            Self::FinishedAfterPenalties => "PEN",
            Self::TechnicalLoss => "AWD",
            Self::WalkOver => "WO",
            Self::Postponed => "PST",
            Self::Cancelled => "CANC",
            Self::Abandoned => "ABD",
            Self::Suspended => "SUSP",
            Self::Unknown(code) => code.as_str(),
        }
    }

    pub fn is_in_play(&self) -> bool {
        matches!(
            self,
            Self::FirstHalf
                | Self::SecondHalf
                | Self::ExtraTime
                | Self::Penalties
                | Self::InPlay
                | Self::Interrupted
        )
    }

    pub fn is_break(&self) -> bool {
        matches!(self, Self::HalfTime | Self::BreakTime)
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Finished
                | Self::FinishedAfterExtraTime
                | Self::FinishedAfterPenalties
                | Self::TechnicalLoss
                | Self::WalkOver
        )
    }

    pub fn is_disrupted(&self) -> bool {
        matches!(
            self,
            Self::Postponed | Self::Cancelled | Self::Abandoned | Self::Suspended
        )
    }

    /// Unknown codes count as not started so the fixture keeps getting polled.
    pub fn is_not_started(&self) -> bool {
        !(self.is_in_play() || self.is_break() || self.is_finished() || self.is_disrupted())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub fixture_id: u64,
    pub league_id: u32,
    pub season: i32,
    pub kickoff: DateTime<Utc>,
    pub status: FixtureStatus,
    pub elapsed: Option<u16>,
    pub home_team_id: u32,
    pub away_team_id: u32,
    pub home_team: String,
    pub away_team: String,
    pub venue_city: Option<String>,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
}

/// The subset of a fixture that phase detection looks at.
#[derive(Debug, Clone, Copy)]
pub struct FixtureTiming<'a> {
    pub kickoff: DateTime<Utc>,
    pub status: &'a FixtureStatus,
}

impl Fixture {
    pub fn timing(&self) -> FixtureTiming<'_> {
        FixtureTiming {
            kickoff: self.kickoff,
            status: &self.status,
        }
    }

    pub fn label(&self) -> String {
        match (self.home_goals, self.away_goals) {
            (Some(h), Some(a)) if !self.status.is_not_started() => {
                format!("{} {h}-{a} {}", self.home_team, self.away_team)
            }
            _ => format!("{} vs {}", self.home_team, self.away_team),
        }
    }
}
