use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn around(now: DateTime<Utc>, back: Duration, ahead: Duration) -> Self {
        Self {
            start: now - back,
            end: now + ahead,
        }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    /// Every UTC calendar date the window touches, in order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut out = Vec::new();
        if self.end < self.start {
            return out;
        }
        let last = self.end.date_naive();
        let mut day = self.start.date_naive();
        while day <= last {
            out.push(day);
            let Some(next) = day.succ_opt() else {
                break;
            };
            day = next;
        }
        out
    }
}

/// `[00:00, next day 00:00)` for a UTC date.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

pub fn parse_utc(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("empty timestamp"));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    let normalized = trimmed.trim_end_matches('Z').replace(' ', "T");
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(anyhow!("unrecognised timestamp: {trimmed}"))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .map_err(|_| anyhow!("expected YYYY-MM-DD, got {trimmed}"))
}

pub fn format_relative(delta: Duration) -> String {
    let total_mins = delta.num_minutes();
    if total_mins == 0 {
        return "now".to_string();
    }
    let abs = total_mins.abs();
    let days = abs / (24 * 60);
    let hours = (abs % (24 * 60)) / 60;
    let mins = abs % 60;
    let body = if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins:02}m")
    } else {
        format!("{mins}m")
    };
    if total_mins > 0 {
        format!("in {body}")
    } else {
        format!("{body} ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        parse_utc(raw).unwrap()
    }

    #[test]
    fn parses_rfc3339_with_offset_and_naive_forms() {
        assert_eq!(
            at("2026-03-14T15:00:00+01:00"),
            at("2026-03-14T14:00:00Z")
        );
        assert_eq!(at("2026-03-14 14:00"), at("2026-03-14T14:00:00Z"));
        assert!(parse_utc("").is_err());
        assert!(parse_utc("tomorrow").is_err());
    }

    #[test]
    fn window_dates_cover_partial_days() {
        let now = at("2026-03-14T23:30:00Z");
        let window = TimeWindow::around(now, Duration::hours(1), Duration::hours(2));
        let dates = window.dates();
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0], parse_date("2026-03-14").unwrap());
        assert_eq!(dates[1], parse_date("20260315").unwrap());
        assert!(window.contains(now));
        assert!(window.contains(window.end));
        assert!(!window.contains(window.end + Duration::seconds(1)));
    }

    #[test]
    fn day_bounds_span_one_utc_day() {
        let (start, end) = day_bounds(parse_date("2026-03-14").unwrap());
        assert_eq!(start, at("2026-03-14T00:00:00Z"));
        assert_eq!(end, at("2026-03-15T00:00:00Z"));
    }

    #[test]
    fn relative_labels() {
        assert_eq!(format_relative(Duration::seconds(20)), "now");
        assert_eq!(format_relative(Duration::minutes(125)), "in 2h 05m");
        assert_eq!(format_relative(Duration::minutes(-35)), "35m ago");
        assert_eq!(format_relative(Duration::hours(50)), "in 2d 2h");
    }
}
