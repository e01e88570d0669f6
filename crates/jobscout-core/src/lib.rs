//! Core job model, identity keys and freshness policy for jobscout.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod freshness;

pub use freshness::{apply_priority, days_old, freshness_score, hours_between, Freshness};

pub const CRATE_NAME: &str = "jobscout-core";

/// Location sentinel used when a source does not report one.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// The ATS family (or fallback path) that produced a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Portal {
    Greenhouse,
    Lever,
    Workday,
    CareerPage,
}

impl Portal {
    pub const ALL: [Portal; 4] = [
        Portal::Greenhouse,
        Portal::Lever,
        Portal::Workday,
        Portal::CareerPage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Portal::Greenhouse => "greenhouse",
            Portal::Lever => "lever",
            Portal::Workday => "workday",
            Portal::CareerPage => "career_page",
        }
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplyPriority {
    High,
    Medium,
    Low,
    #[default]
    Expired,
}

impl ApplyPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyPriority::High => "HIGH",
            ApplyPriority::Medium => "MEDIUM",
            ApplyPriority::Low => "LOW",
            ApplyPriority::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for ApplyPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity key shared by candidates and persisted records.
///
/// `lower(company) + "_" + job_id` with spaces mapped to underscores. Returns
/// `None` when the source-native id is blank, since such a key would collapse
/// every id-less posting of a company into one.
pub fn identity_key(company: &str, job_id: &str) -> Option<String> {
    let job_id = job_id.trim();
    if job_id.is_empty() {
        return None;
    }
    Some(format!("{}_{}", company.trim().to_lowercase(), job_id).replace(' ', "_"))
}

/// Grouping key for per-company shards: lowercase, whitespace joined by `_`.
pub fn company_key(company: &str) -> String {
    let key = company
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace(['/', '\\'], "_");
    if key.is_empty() {
        "unknown".to_string()
    } else {
        key
    }
}

/// Adapter output for the current run, before reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDraft {
    pub company: String,
    pub title: String,
    pub location: String,
    pub url: String,
    pub job_id: String,
    pub portal: Portal,
    pub description: String,
    pub departments: Vec<String>,
    pub team: String,
    pub posted_on: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl JobDraft {
    pub fn identity_key(&self) -> Option<String> {
        identity_key(&self.company, &self.job_id)
    }

    /// Title plus department/team text, the haystack for relevance filtering.
    pub fn relevance_text(&self) -> String {
        let mut text = self.title.clone();
        for dept in &self.departments {
            text.push(' ');
            text.push_str(dept);
        }
        if !self.team.is_empty() {
            text.push(' ');
            text.push_str(&self.team);
        }
        text
    }
}

fn default_times_seen() -> u32 {
    1
}

/// Persisted posting with discovery bookkeeping and derived freshness fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub company: String,
    pub title: String,
    #[serde(default = "unknown_location")]
    pub location: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub job_id: String,
    pub portal: Portal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub departments: Vec<String>,
    #[serde(default)]
    pub team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_on: Option<String>,
    pub first_discovered: DateTime<Utc>,
    /// Fetch time of the latest run that returned this posting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetched: Option<DateTime<Utc>>,
    #[serde(default = "default_times_seen")]
    pub times_seen: u32,
    #[serde(default)]
    pub hours_old: f64,
    #[serde(default)]
    pub days_old: i64,
    #[serde(default)]
    pub apply_priority: ApplyPriority,
    #[serde(default)]
    pub freshness_score: f64,
}

fn unknown_location() -> String {
    UNKNOWN_LOCATION.to_string()
}

impl JobRecord {
    /// Promote a first-seen candidate. Derived fields are filled by [`JobRecord::rescore`].
    pub fn discovered(draft: JobDraft, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            company: draft.company,
            title: draft.title,
            location: draft.location,
            url: draft.url,
            job_id: draft.job_id,
            portal: draft.portal,
            description: draft.description,
            departments: draft.departments,
            team: draft.team,
            posted_on: draft.posted_on,
            first_discovered: now,
            last_fetched: Some(draft.fetched_at),
            times_seen: 1,
            hours_old: 0.0,
            days_old: 0,
            apply_priority: ApplyPriority::High,
            freshness_score: 100.0,
        };
        record.rescore(now);
        record
    }

    pub fn identity_key(&self) -> Option<String> {
        identity_key(&self.company, &self.job_id)
    }

    pub fn company_key(&self) -> String {
        company_key(&self.company)
    }

    /// Overwrite the content fields with the latest fetch; bookkeeping is untouched.
    pub fn refresh_content(&mut self, draft: JobDraft) {
        self.last_fetched = Some(draft.fetched_at);
        self.title = draft.title;
        self.location = draft.location;
        self.url = draft.url;
        self.description = draft.description;
        self.departments = draft.departments;
        self.team = draft.team;
        if draft.posted_on.is_some() {
            self.posted_on = draft.posted_on;
        }
    }

    pub fn rescore(&mut self, now: DateTime<Utc>) {
        let freshness = Freshness::assess(self.first_discovered, now);
        self.hours_old = freshness.hours_old;
        self.days_old = freshness.days_old;
        self.apply_priority = freshness.apply_priority;
        self.freshness_score = freshness.freshness_score;
    }
}

/// Count of records per apply-priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriorityBreakdown {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub expired: usize,
}

impl PriorityBreakdown {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a JobRecord>) -> Self {
        let mut out = Self::default();
        for record in records {
            match record.apply_priority {
                ApplyPriority::High => out.high += 1,
                ApplyPriority::Medium => out.medium += 1,
                ApplyPriority::Low => out.low += 1,
                ApplyPriority::Expired => out.expired += 1,
            }
        }
        out
    }
}
