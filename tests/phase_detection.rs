use chrono::{DateTime, Duration, TimeZone, Utc};

use matchday_orchestrator::fixture::{FixtureStatus, FixtureTiming};
use matchday_orchestrator::phase::{MatchPhase, detect_current_phase, estimated_final_whistle};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
}

fn phase_at(kickoff_offset: Duration, status: &str) -> MatchPhase {
    let status = FixtureStatus::from_short(status);
    let timing = FixtureTiming {
        kickoff: now() + kickoff_offset,
        status: &status,
    };
    detect_current_phase(timing, now())
}

#[test]
fn countdown_phases_before_kickoff() {
    assert_eq!(phase_at(Duration::hours(25), "NS"), MatchPhase::Scheduled);
    assert_eq!(phase_at(Duration::hours(24) + Duration::seconds(1), "NS"), MatchPhase::Scheduled);
    assert_eq!(phase_at(Duration::hours(24), "NS"), MatchPhase::MatchDay);
    assert_eq!(phase_at(Duration::hours(4), "TBD"), MatchPhase::MatchDay);
    assert_eq!(phase_at(Duration::hours(3), "NS"), MatchPhase::PreMatch);
    assert_eq!(phase_at(Duration::minutes(61), "NS"), MatchPhase::PreMatch);
    assert_eq!(phase_at(Duration::hours(1), "NS"), MatchPhase::Lineups);
    assert_eq!(phase_at(Duration::minutes(1), "NS"), MatchPhase::Lineups);
}

#[test]
fn lagging_not_started_status_counts_as_live_for_a_while() {
    assert_eq!(phase_at(Duration::zero(), "NS"), MatchPhase::Live);
    assert_eq!(phase_at(Duration::minutes(-150), "NS"), MatchPhase::Live);
    assert_eq!(phase_at(Duration::minutes(-151), "NS"), MatchPhase::FullTime);
    assert_eq!(phase_at(Duration::hours(-5), "NS"), MatchPhase::PostMatch);
    assert_eq!(phase_at(Duration::days(-3), "NS"), MatchPhase::Archived);
}

#[test]
fn feed_status_wins_over_the_clock() {
    assert_eq!(phase_at(Duration::hours(2), "1H"), MatchPhase::Live);
    assert_eq!(phase_at(Duration::minutes(-50), "HT"), MatchPhase::HalfTime);
    assert_eq!(phase_at(Duration::minutes(-110), "BT"), MatchPhase::HalfTime);
    assert_eq!(phase_at(Duration::minutes(-70), "INT"), MatchPhase::Live);
    assert_eq!(phase_at(Duration::minutes(-125), "P"), MatchPhase::Live);
    assert_eq!(phase_at(Duration::hours(30), "PST"), MatchPhase::Disrupted);
    assert_eq!(phase_at(Duration::hours(-1), "ABD"), MatchPhase::Disrupted);
    assert_eq!(phase_at(Duration::days(-10), "CANC"), MatchPhase::Disrupted);
}

#[test]
fn finished_phases_follow_the_estimated_whistle() {
    assert_eq!(phase_at(Duration::minutes(-60), "FT"), MatchPhase::FullTime);
    assert_eq!(phase_at(Duration::hours(-3), "FT"), MatchPhase::FullTime);
    assert_eq!(phase_at(Duration::hours(-4), "FT"), MatchPhase::PostMatch);
    assert_eq!(phase_at(Duration::hours(-4), "AET"), MatchPhase::FullTime);
    assert_eq!(phase_at(Duration::minutes(-270), "PEN"), MatchPhase::FullTime);
    assert_eq!(phase_at(Duration::minutes(-286), "PEN"), MatchPhase::PostMatch);

    let edge = Duration::hours(48) + Duration::minutes(115);
    assert_eq!(phase_at(-edge, "FT"), MatchPhase::PostMatch);
    assert_eq!(phase_at(-edge - Duration::minutes(1), "FT"), MatchPhase::Archived);
    assert_eq!(phase_at(Duration::days(-5), "AWD"), MatchPhase::Archived);
}

#[test]
fn unknown_status_uses_the_countdown() {
    assert_eq!(phase_at(Duration::hours(2), "XYZ"), MatchPhase::PreMatch);
    assert_eq!(phase_at(Duration::hours(2), ""), MatchPhase::PreMatch);
}

#[test]
fn final_whistle_estimate_depends_on_how_it_ended() {
    let kickoff = now();
    let cases = [("FT", 115), ("AET", 150), ("PEN", 165), ("WO", 115)];
    for (code, mins) in cases {
        let status = FixtureStatus::from_short(code);
        let timing = FixtureTiming {
            kickoff,
            status: &status,
        };
        assert_eq!(estimated_final_whistle(timing), kickoff + Duration::minutes(mins), "{code}");
    }
}

#[test]
fn not_started_fixture_moves_forward_through_the_lifecycle() {
    let status = FixtureStatus::NotStarted;
    let kickoff = now();
    let timing = FixtureTiming {
        kickoff,
        status: &status,
    };
    let mut previous = MatchPhase::Scheduled;
    let mut seen = Vec::new();
    let mut at = kickoff - Duration::days(3);
    while at <= kickoff + Duration::days(4) {
        let phase = detect_current_phase(timing, at);
        assert!(phase >= previous, "{previous} -> {phase} at {at}");
        if seen.last() != Some(&phase) {
            seen.push(phase);
        }
        previous = phase;
        at += Duration::minutes(10);
    }
    assert_eq!(
        seen,
        vec![
            MatchPhase::Scheduled,
            MatchPhase::MatchDay,
            MatchPhase::PreMatch,
            MatchPhase::Lineups,
            MatchPhase::Live,
            MatchPhase::FullTime,
            MatchPhase::PostMatch,
            MatchPhase::Archived,
        ]
    );
}
