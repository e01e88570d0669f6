//! Fallback for companies without a supported ATS: fetch the careers page and
//! hand the markup to a [`PageExtractor`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobscout_core::{JobDraft, Portal};
use jobscout_storage::{ArtifactStore, HttpFetcher};
use reqwest::Url;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filter::FilterPolicy;
use crate::{
    location_or_unknown, required_text, AdapterContext, AdapterError, Organization, ParseError,
    RawPosting, SourceAdapter,
};

const MIN_LINK_TEXT_CHARS: usize = 10;
const MAX_LINKS_PER_PAGE: usize = 50;
const JOB_ID_HEX_CHARS: usize = 16;

/// Best-effort posting pulled out of free-form page markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPosting {
    pub title: String,
    #[serde(default)]
    pub location: String,
    pub url: String,
}

#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn extract(
        &self,
        markup: &str,
        page_url: &str,
        company: &str,
    ) -> Result<Vec<ExtractedPosting>, AdapterError>;
}

/// Collects anchors whose text looks like a technical job title.
#[derive(Debug, Clone, Default)]
pub struct LinkScanExtractor {
    policy: FilterPolicy,
}

impl LinkScanExtractor {
    pub fn new(policy: FilterPolicy) -> Self {
        Self { policy }
    }

    pub fn scan(&self, markup: &str, page_url: &str) -> Result<Vec<ExtractedPosting>, AdapterError> {
        let base = Url::parse(page_url).map_err(|e| AdapterError::Extract(e.to_string()))?;
        let anchors = Selector::parse("a[href]").map_err(|e| AdapterError::Extract(e.to_string()))?;
        let document = Html::parse_document(markup);

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for node in document.select(&anchors) {
            let text = node
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if text.chars().count() <= MIN_LINK_TEXT_CHARS || !self.policy.is_relevant(&text) {
                continue;
            }
            let Some(href) = node.value().attr("href") else {
                continue;
            };
            let Ok(resolved) = base.join(href.trim()) else {
                continue;
            };
            if !matches!(resolved.scheme(), "http" | "https") {
                continue;
            }
            let url = resolved.to_string();
            if !seen.insert(url.clone()) {
                continue;
            }
            out.push(ExtractedPosting {
                title: text,
                location: String::new(),
                url,
            });
            if out.len() >= MAX_LINKS_PER_PAGE {
                break;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl PageExtractor for LinkScanExtractor {
    async fn extract(
        &self,
        markup: &str,
        page_url: &str,
        _company: &str,
    ) -> Result<Vec<ExtractedPosting>, AdapterError> {
        self.scan(markup, page_url)
    }
}

/// Stable id for a posting that only has a URL.
pub fn url_job_id(url: &str) -> String {
    let mut hash = ArtifactStore::sha256_hex(url.trim().as_bytes());
    hash.truncate(JOB_ID_HEX_CHARS);
    hash
}

pub struct CareerPageAdapter {
    extractor: Arc<dyn PageExtractor>,
    organizations: Vec<Organization>,
}

impl CareerPageAdapter {
    pub fn new(extractor: Arc<dyn PageExtractor>, organizations: Vec<Organization>) -> Self {
        Self {
            extractor,
            organizations,
        }
    }
}

#[async_trait]
impl SourceAdapter for CareerPageAdapter {
    fn portal(&self) -> Portal {
        Portal::CareerPage
    }

    fn organizations(&self) -> &[Organization] {
        &self.organizations
    }

    async fn fetch_organization(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
        org: &Organization,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        let page_url = org
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AdapterError::MissingConfig {
                org: org.key.clone(),
                field: "url",
            })?;
        let resp = http.get(Portal::CareerPage.as_str(), page_url).await?;
        ctx.archive_payload(Portal::CareerPage, org, "html", &resp.body).await;

        let markup = resp.text();
        let items = self
            .extractor
            .extract(&markup, &resp.final_url, &org.name)
            .await?;
        debug!(org = %org.key, items = items.len(), "career page extracted");

        items
            .into_iter()
            .map(|item| {
                serde_json::to_value(item)
                    .map(RawPosting::new)
                    .map_err(|e| AdapterError::Extract(e.to_string()))
            })
            .collect()
    }

    fn parse(
        &self,
        org: &Organization,
        raw: &RawPosting,
        fetched_at: DateTime<Utc>,
    ) -> Result<JobDraft, ParseError> {
        let item: ExtractedPosting = serde_json::from_value(raw.payload.clone())
            .map_err(|err| ParseError::shape(Portal::CareerPage, err))?;
        let url = required_text(Some(item.url), "url")?;

        Ok(JobDraft {
            company: org.name.clone(),
            title: required_text(Some(item.title), "title")?,
            location: location_or_unknown(Some(item.location)),
            job_id: url_job_id(&url),
            url,
            portal: Portal::CareerPage,
            description: String::new(),
            departments: Vec::new(),
            team: String::new(),
            posted_on: None,
            fetched_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = r#"
        <html><body>
          <a href="/careers/123">Senior Software Engineer, Payments</a>
          <a href="https://jobs.example.com/456">Staff Data Scientist</a>
          <a href="/careers/123">Senior Software Engineer, Payments</a>
          <a href="/about">About us and our culture</a>
          <a href="/short">Engineer</a>
          <a href="mailto:jobs@example.com">Email the engineering team</a>
          <a>Backend Engineer without link</a>
        </body></html>
    "#;

    #[test]
    fn link_scan_keeps_job_like_anchors() {
        let extractor = LinkScanExtractor::default();
        let items = extractor
            .scan(PAGE, "https://www.example.com/careers/")
            .unwrap();
        assert_eq!(
            items,
            vec![
                ExtractedPosting {
                    title: "Senior Software Engineer, Payments".to_string(),
                    location: String::new(),
                    url: "https://www.example.com/careers/123".to_string(),
                },
                ExtractedPosting {
                    title: "Staff Data Scientist".to_string(),
                    location: String::new(),
                    url: "https://jobs.example.com/456".to_string(),
                },
            ]
        );
    }

    #[test]
    fn link_scan_caps_results() {
        let links: String = (0..80)
            .map(|i| format!(r#"<a href="/jobs/{i}">Platform Engineer number {i}</a>"#))
            .collect();
        let extractor = LinkScanExtractor::default();
        let items = extractor
            .scan(&format!("<html><body>{links}</body></html>"), "https://acme.io/")
            .unwrap();
        assert_eq!(items.len(), MAX_LINKS_PER_PAGE);
    }

    #[test]
    fn url_job_id_is_stable() {
        let a = url_job_id("https://acme.io/jobs/1");
        assert_eq!(a.len(), JOB_ID_HEX_CHARS);
        assert_eq!(a, url_job_id(" https://acme.io/jobs/1 "));
        assert_ne!(a, url_job_id("https://acme.io/jobs/2"));
    }

    #[test]
    fn parse_hashes_url_into_job_id() {
        let adapter = CareerPageAdapter::new(
            Arc::new(LinkScanExtractor::default()),
            vec![Organization::new("acme", "Acme").with_url("https://acme.io/careers")],
        );
        let raw = RawPosting::new(json!({
            "title": "Cloud Infrastructure Engineer",
            "url": "https://acme.io/jobs/9"
        }));
        let draft = adapter
            .parse(&adapter.organizations()[0], &raw, Utc::now())
            .unwrap();
        assert_eq!(draft.location, "Unknown");
        assert_eq!(draft.job_id, url_job_id("https://acme.io/jobs/9"));
        assert_eq!(draft.portal, Portal::CareerPage);
    }
}
