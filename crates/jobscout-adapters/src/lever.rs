//! Lever postings API, paginated with `skip`/`limit`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobscout_core::{JobDraft, Portal};
use jobscout_storage::HttpFetcher;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{
    location_or_unknown, required_text, trim_base_url, AdapterContext, AdapterError, NativeId,
    Organization, ParseError, RawPosting, SourceAdapter,
};

pub const DEFAULT_BASE_URL: &str = "https://api.lever.co";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeverPosting {
    id: Option<NativeId>,
    text: Option<String>,
    #[serde(default)]
    categories: LeverCategories,
    workplace_type: Option<String>,
    hosted_url: Option<String>,
    description_plain: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LeverCategories {
    location: Option<String>,
    team: Option<String>,
    commitment: Option<String>,
}

pub struct LeverAdapter {
    base_url: String,
    organizations: Vec<Organization>,
}

impl LeverAdapter {
    pub fn new(organizations: Vec<Organization>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, organizations)
    }

    pub fn with_base_url(base_url: &str, organizations: Vec<Organization>) -> Self {
        Self {
            base_url: trim_base_url(base_url),
            organizations,
        }
    }

    fn page_url(&self, org: &Organization, skip: usize, limit: usize) -> String {
        format!(
            "{}/v0/postings/{}?mode=json&skip={skip}&limit={limit}",
            self.base_url, org.key
        )
    }
}

#[async_trait]
impl SourceAdapter for LeverAdapter {
    fn portal(&self) -> Portal {
        Portal::Lever
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
        let limit = ctx.pages.page_size;
        let mut postings = Vec::new();

        for page in 0..ctx.pages.max_pages {
            if page > 0 {
                ctx.pause_between_pages().await;
            }
            let url = self.page_url(org, page * limit, limit);
            let resp = http.get(Portal::Lever.as_str(), &url).await?;
            ctx.archive_payload(Portal::Lever, org, "json", &resp.body).await;

            let body: JsonValue = resp.json()?;
            let JsonValue::Array(items) = body else {
                return Err(AdapterError::Malformed {
                    url,
                    reason: "expected a JSON array of postings".to_string(),
                });
            };
            let count = items.len();
            debug!(org = %org.key, page, count, "lever page fetched");
            postings.extend(items.into_iter().map(RawPosting::new));

            if count < limit {
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
        let posting: LeverPosting = serde_json::from_value(raw.payload.clone())
            .map_err(|err| ParseError::shape(Portal::Lever, err))?;

        let job_id = posting
            .id
            .map(NativeId::into_string)
            .filter(|id| !id.is_empty())
            .ok_or(ParseError::MissingField("id"))?;

        let location = posting
            .categories
            .location
            .filter(|l| !l.trim().is_empty())
            .or(posting.workplace_type);

        let team = [posting.categories.team, posting.categories.commitment]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(JobDraft {
            company: org.name.clone(),
            title: required_text(posting.text, "text")?,
            location: location_or_unknown(location),
            url: posting.hosted_url.unwrap_or_default(),
            job_id,
            portal: Portal::Lever,
            description: posting
                .description_plain
                .or(posting.description)
                .unwrap_or_default(),
            departments: Vec::new(),
            team,
            posted_on: None,
            fetched_at,
        })
    }
}
