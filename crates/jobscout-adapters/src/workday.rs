//! Workday CXS search API, paginated with `offset` over a JSON POST body.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobscout_core::{JobDraft, Portal};
use jobscout_storage::HttpFetcher;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    location_or_unknown, required_text, trim_base_url, AdapterContext, AdapterError,
    Organization, ParseError, RawPosting, SourceAdapter,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    job_postings: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkdayPosting {
    title: Option<String>,
    locations_text: Option<String>,
    external_path: Option<String>,
    #[serde(default)]
    bullet_fields: Vec<String>,
    posted_on: Option<String>,
}

pub struct WorkdayAdapter {
    /// Replaces the per-tenant `myworkdayjobs.com` host when set.
    host_override: Option<String>,
    organizations: Vec<Organization>,
}

impl WorkdayAdapter {
    pub fn new(organizations: Vec<Organization>) -> Self {
        Self {
            host_override: None,
            organizations,
        }
    }

    pub fn with_base_url(base_url: &str, organizations: Vec<Organization>) -> Self {
        Self {
            host_override: Some(trim_base_url(base_url)),
            organizations,
        }
    }

    fn host(&self, org: &Organization) -> String {
        match &self.host_override {
            Some(host) => host.clone(),
            None => format!("https://{}.wd5.myworkdayjobs.com", org.key),
        }
    }

    fn site<'a>(&self, org: &'a Organization) -> Result<&'a str, AdapterError> {
        org.site
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AdapterError::MissingConfig {
                org: org.key.clone(),
                field: "site",
            })
    }

    fn search_url(&self, org: &Organization, site: &str) -> String {
        format!("{}/wday/cxs/{}/{site}/jobs", self.host(org), org.key)
    }
}

fn location_from_bullets(bullets: &[String]) -> Option<String> {
    bullets
        .iter()
        .rev()
        .find(|b| b.contains("Location"))
        .map(|b| b.replace("Location:", "").trim().to_string())
}

#[async_trait]
impl SourceAdapter for WorkdayAdapter {
    fn portal(&self) -> Portal {
        Portal::Workday
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
        let site = self.site(org)?;
        let url = self.search_url(org, site);
        let limit = ctx.pages.page_size;
        let mut postings = Vec::new();
        let mut known_total = 0u64;

        for page in 0..ctx.pages.max_pages {
            if page > 0 {
                ctx.pause_between_pages().await;
            }
            let offset = page * limit;
            let body = json!({
                "appliedFacets": {},
                "limit": limit,
                "offset": offset,
                "searchText": "",
            });
            let resp = http.post_json(Portal::Workday.as_str(), &url, &body).await?;
            ctx.archive_payload(Portal::Workday, org, "json", &resp.body).await;
            let search: SearchPage = resp.json()?;

            // Later pages commonly report total=0; keep the first page's figure.
            if search.total > 0 {
                known_total = search.total;
            }
            let count = search.job_postings.len();
            debug!(org = %org.key, page, count, total = known_total, "workday page fetched");
            if count == 0 {
                break;
            }
            postings.extend(search.job_postings.into_iter().map(RawPosting::new));

            if (offset + limit) as u64 >= known_total {
                break;
            }
        }
        Ok(postings)
    }

    fn parse(
        &self,
        org: &Organization,
        raw: &RawPosting,
        fetched_at: DateTime<Utc>,
    ) -> Result<JobDraft, ParseError> {
        let posting: WorkdayPosting = serde_json::from_value(raw.payload.clone())
            .map_err(|err| ParseError::shape(Portal::Workday, err))?;

        let external_path = posting.external_path.unwrap_or_default();
        let job_id = external_path
            .rsplit('/')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| posting.bullet_fields.first().map(|b| b.trim().to_string()))
            .filter(|s| !s.is_empty())
            .ok_or(ParseError::MissingField("externalPath"))?;

        let location = posting
            .locations_text
            .filter(|l| !l.trim().is_empty())
            .or_else(|| location_from_bullets(&posting.bullet_fields));

        let site = org.site.as_deref().unwrap_or_default().trim();
        Ok(JobDraft {
            company: org.name.clone(),
            title: required_text(posting.title, "title")?,
            location: location_or_unknown(location),
            url: format!("{}/{site}{external_path}", self.host(org)),
            job_id,
            portal: Portal::Workday,
            description: String::new(),
            departments: Vec::new(),
            team: String::new(),
            posted_on: posting
                .posted_on
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            fetched_at,
        })
    }
}
