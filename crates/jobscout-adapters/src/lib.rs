//! Source adapter contract, shared fetch/parse/filter driver and the ATS adapters.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobscout_core::{JobDraft, Portal, UNKNOWN_LOCATION};
use jobscout_storage::{ArtifactStore, FetchError, HttpFetcher};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod career_page;
pub mod filter;
pub mod greenhouse;
pub mod lever;
pub mod workday;

pub use career_page::{CareerPageAdapter, ExtractedPosting, LinkScanExtractor, PageExtractor};
pub use filter::{FilterPolicy, FilterVerdict, RulesError};
pub use greenhouse::GreenhouseAdapter;
pub use lever::LeverAdapter;
pub use workday::WorkdayAdapter;

pub const CRATE_NAME: &str = "jobscout-adapters";

/// One organization (board) polled by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Board slug / tenant used to build request URLs.
    pub key: String,
    /// Display name stamped onto every record as `company`.
    pub name: String,
    /// Workday career site under the tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// Career page address for the page-scan fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Organization {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            site: None,
            url: None,
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// One undecoded record as returned by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPosting {
    pub payload: JsonValue,
}

impl RawPosting {
    pub fn new(payload: JsonValue) -> Self {
        Self { payload }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub organization_delay: Duration,
    pub page_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            organization_delay: Duration::from_secs(2),
            page_delay: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            organization_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
        }
    }
}

/// Bounds worst-case cost against a source that never stops paginating.
#[derive(Debug, Clone, Copy)]
pub struct PagePolicy {
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for PagePolicy {
    fn default() -> Self {
        Self {
            page_size: 20,
            max_pages: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    pub pacing: Pacing,
    pub pages: PagePolicy,
    pub archive: Option<ArtifactStore>,
}

impl AdapterContext {
    pub fn new(run_id: Uuid, fetched_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            fetched_at,
            pacing: Pacing::default(),
            pages: PagePolicy::default(),
            archive: None,
        }
    }

    /// Keep a copy of a fetched body when archiving is enabled. Failures only warn.
    pub async fn archive_payload(&self, portal: Portal, org: &Organization, ext: &str, body: &[u8]) {
        let Some(archive) = &self.archive else {
            return;
        };
        if let Err(err) = archive
            .store_payload(self.fetched_at, portal.as_str(), &org.key, ext, body)
            .await
        {
            warn!(portal = %portal, org = %org.key, error = %err, "failed to archive raw payload");
        }
    }

    pub(crate) async fn pause_between_pages(&self) {
        if !self.pacing.page_delay.is_zero() {
            tokio::time::sleep(self.pacing.page_delay).await;
        }
    }
}

/// Failure of one organization's fetch. Never escapes the adapter driver.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected payload shape from {url}: {reason}")]
    Malformed { url: String, reason: String },
    #[error("organization {org} is missing {field}")]
    MissingConfig { org: String, field: &'static str },
    #[error("page extraction failed: {0}")]
    Extract(String),
}

/// Failure to turn one raw record into a [`JobDraft`]. The record is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("record does not match the {portal} schema: {reason}")]
    Shape { portal: Portal, reason: String },
    #[error("record is missing required field {0}")]
    MissingField(&'static str),
}

impl ParseError {
    pub(crate) fn shape(portal: Portal, err: serde_json::Error) -> Self {
        ParseError::Shape {
            portal,
            reason: err.to_string(),
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn portal(&self) -> Portal;

    fn organizations(&self) -> &[Organization];

    /// Fetch every page for one organization. Any error discards the whole organization.
    async fn fetch_organization(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
        org: &Organization,
    ) -> Result<Vec<RawPosting>, AdapterError>;

    /// Decode one raw record in this source's wire shape.
    fn parse(
        &self,
        org: &Organization,
        raw: &RawPosting,
        fetched_at: DateTime<Utc>,
    ) -> Result<JobDraft, ParseError>;
}

/// Per-adapter counters for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterReport {
    pub portal: Portal,
    pub organizations_attempted: usize,
    pub organizations_succeeded: usize,
    pub organizations_failed: usize,
    pub raw_records: usize,
    pub parse_failures: usize,
    pub filtered_irrelevant: usize,
    pub filtered_location: usize,
    pub kept: usize,
}

impl AdapterReport {
    pub fn empty(portal: Portal) -> Self {
        Self {
            portal,
            organizations_attempted: 0,
            organizations_succeeded: 0,
            organizations_failed: 0,
            raw_records: 0,
            parse_failures: 0,
            filtered_irrelevant: 0,
            filtered_location: 0,
            kept: 0,
        }
    }

    /// Report for an adapter that failed as a whole: every organization counts as failed.
    pub fn total_failure(portal: Portal, organizations: usize) -> Self {
        Self {
            organizations_attempted: organizations,
            organizations_failed: organizations,
            ..Self::empty(portal)
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterOutput {
    pub drafts: Vec<JobDraft>,
    pub report: AdapterReport,
}

/// Run one adapter over all its organizations: fetch, parse, filter.
///
/// Fetch errors cost the affected organization only, parse errors cost the
/// affected record only.
pub async fn collect_adapter(
    adapter: &dyn SourceAdapter,
    http: &HttpFetcher,
    ctx: &AdapterContext,
    policy: &FilterPolicy,
) -> AdapterOutput {
    let portal = adapter.portal();
    let mut report = AdapterReport::empty(portal);
    let mut drafts = Vec::new();

    for (index, org) in adapter.organizations().iter().enumerate() {
        if index > 0 && !ctx.pacing.organization_delay.is_zero() {
            tokio::time::sleep(ctx.pacing.organization_delay).await;
        }
        report.organizations_attempted += 1;

        let raws = match adapter.fetch_organization(http, ctx, org).await {
            Ok(raws) => raws,
            Err(err) => {
                report.organizations_failed += 1;
                warn!(portal = %portal, org = %org.key, error = %err, "organization fetch failed");
                continue;
            }
        };
        report.organizations_succeeded += 1;
        report.raw_records += raws.len();

        let mut kept_for_org = 0usize;
        for raw in &raws {
            let draft = match adapter.parse(org, raw, ctx.fetched_at) {
                Ok(draft) => draft,
                Err(err) => {
                    report.parse_failures += 1;
                    debug!(portal = %portal, org = %org.key, error = %err, "dropped unparsable record");
                    continue;
                }
            };
            match policy.evaluate(&draft) {
                FilterVerdict::Keep => {
                    kept_for_org += 1;
                    drafts.push(draft);
                }
                FilterVerdict::NotTechnical => report.filtered_irrelevant += 1,
                FilterVerdict::OutsideUs => report.filtered_location += 1,
            }
        }
        info!(
            run_id = %ctx.run_id,
            portal = %portal,
            org = %org.key,
            found = raws.len(),
            kept = kept_for_org,
            "organization collected"
        );
    }

    report.kept = drafts.len();
    AdapterOutput { drafts, report }
}

/// Source-native ids arrive as numbers on some boards and strings on others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum NativeId {
    Int(i64),
    Text(String),
}

impl NativeId {
    pub(crate) fn into_string(self) -> String {
        match self {
            NativeId::Int(v) => v.to_string(),
            NativeId::Text(s) => s.trim().to_string(),
        }
    }
}

pub(crate) fn required_text(value: Option<String>, field: &'static str) -> Result<String, ParseError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ParseError::MissingField(field)),
    }
}

pub(crate) fn location_or_unknown(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
}

pub(crate) fn trim_base_url(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}
