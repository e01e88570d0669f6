//! Freshness policy: age since first discovery mapped to an apply tier and a 0-100 score.
//!
//! First-seen time stands in for the posting date, which most boards do not
//! expose reliably. The policy is only meaningful when runs are frequent
//! compared to posting churn (hourly in practice).

use chrono::{DateTime, Utc};

use crate::ApplyPriority;

pub const HIGH_WINDOW_HOURS: f64 = 24.0;
pub const MEDIUM_WINDOW_HOURS: f64 = 48.0;
pub const LOW_WINDOW_HOURS: f64 = 168.0;

/// Elapsed hours between discovery and `now`, clamped at zero.
pub fn hours_between(first_discovered: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - first_discovered).num_milliseconds() as f64;
    (millis / 3_600_000.0).max(0.0)
}

/// Number of started days; 175 hours is day 8.
pub fn days_old(hours_old: f64) -> i64 {
    (hours_old.max(0.0) / 24.0).ceil() as i64
}

pub fn apply_priority(hours_old: f64) -> ApplyPriority {
    if hours_old <= HIGH_WINDOW_HOURS {
        ApplyPriority::High
    } else if hours_old <= MEDIUM_WINDOW_HOURS {
        ApplyPriority::Medium
    } else if hours_old <= LOW_WINDOW_HOURS {
        ApplyPriority::Low
    } else {
        ApplyPriority::Expired
    }
}

/// Non-increasing score in `[0, 100]`.
///
/// Flat 100 for the first day and 75 for the second, then a linear decay from
/// 50 to 20 across days three to seven, then 2 points per started day down to 0.
pub fn freshness_score(hours_old: f64) -> f64 {
    let hours_old = hours_old.max(0.0);
    if hours_old <= HIGH_WINDOW_HOURS {
        100.0
    } else if hours_old <= MEDIUM_WINDOW_HOURS {
        75.0
    } else if hours_old <= LOW_WINDOW_HOURS {
        50.0 - (hours_old - MEDIUM_WINDOW_HOURS) / (LOW_WINDOW_HOURS - MEDIUM_WINDOW_HOURS) * 30.0
    } else {
        (20.0 - (days_old(hours_old) - 7) as f64 * 2.0).max(0.0)
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Derived fields stamped onto a record each time it is touched by a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Freshness {
    pub hours_old: f64,
    pub days_old: i64,
    pub apply_priority: ApplyPriority,
    pub freshness_score: f64,
}

impl Freshness {
    pub fn from_hours(hours_old: f64) -> Self {
        let hours_old = hours_old.max(0.0);
        Self {
            hours_old: round_tenth(hours_old),
            days_old: days_old(hours_old),
            apply_priority: apply_priority(hours_old),
            freshness_score: round_tenth(freshness_score(hours_old)),
        }
    }

    pub fn assess(first_discovered: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::from_hours(hours_between(first_discovered, now))
    }
}
