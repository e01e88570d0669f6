//! Greenhouse job board API: one unpaginated request per board.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobscout_core::{JobDraft, Portal};
use jobscout_storage::HttpFetcher;
use serde::Deserialize;
use tracing::debug;

use crate::{
    location_or_unknown, required_text, trim_base_url, AdapterContext, AdapterError, NativeId,
    Organization, ParseError, RawPosting, SourceAdapter,
};

pub const DEFAULT_BASE_URL: &str = "https://boards-api.greenhouse.io";

#[derive(Debug, Deserialize)]
struct BoardPage {
    jobs: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GreenhouseJob {
    id: Option<NativeId>,
    title: Option<String>,
    location: Option<NamedField>,
    absolute_url: Option<String>,
    #[serde(default)]
    departments: Vec<NamedField>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedField {
    name: Option<String>,
}

pub struct GreenhouseAdapter {
    base_url: String,
    organizations: Vec<Organization>,
}

impl GreenhouseAdapter {
    pub fn new(organizations: Vec<Organization>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, organizations)
    }

    pub fn with_base_url(base_url: &str, organizations: Vec<Organization>) -> Self {
        Self {
            base_url: trim_base_url(base_url),
            organizations,
        }
    }

    fn board_url(&self, org: &Organization) -> String {
        format!("{}/v1/boards/{}/jobs?content=true", self.base_url, org.key)
    }
}

#[async_trait]
impl SourceAdapter for GreenhouseAdapter {
    fn portal(&self) -> Portal {
        Portal::Greenhouse
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
        let url = self.board_url(org);
        let resp = http.get(Portal::Greenhouse.as_str(), &url).await?;
        ctx.archive_payload(Portal::Greenhouse, org, "json", &resp.body)
            .await;
        let page: BoardPage = resp.json()?;
        debug!(org = %org.key, jobs = page.jobs.len(), "greenhouse board fetched");
        Ok(page.jobs.into_iter().map(RawPosting::new).collect())
    }

    fn parse(
        &self,
        org: &Organization,
        raw: &RawPosting,
        fetched_at: DateTime<Utc>,
    ) -> Result<JobDraft, ParseError> {
        let job: GreenhouseJob = serde_json::from_value(raw.payload.clone())
            .map_err(|err| ParseError::shape(Portal::Greenhouse, err))?;

        let job_id = job
            .id
            .map(NativeId::into_string)
            .filter(|id| !id.is_empty())
            .ok_or(ParseError::MissingField("id"))?;

        Ok(JobDraft {
            company: org.name.clone(),
            title: required_text(job.title, "title")?,
            location: location_or_unknown(job.location.and_then(|l| l.name)),
            url: job.absolute_url.unwrap_or_default(),
            job_id,
            portal: Portal::Greenhouse,
            description: job.content.unwrap_or_default(),
            departments: job
                .departments
                .into_iter()
                .filter_map(|d| d.name)
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
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

    fn adapter() -> GreenhouseAdapter {
        GreenhouseAdapter::new(vec![Organization::new("anthropic", "Anthropic")])
    }

    #[test]
    fn builds_board_url_with_content() {
        let a = GreenhouseAdapter::with_base_url(
            "http://localhost:9000/",
            vec![Organization::new("stripe", "Stripe")],
        );
        assert_eq!(
            a.board_url(&a.organizations()[0]),
            "http://localhost:9000/v1/boards/stripe/jobs?content=true"
        );
    }

    #[test]
    fn parses_full_record() {
        let a = adapter();
        let raw = RawPosting::new(json!({
            "id": 4012345,
            "title": "Research Engineer",
            "location": {"name": "San Francisco, CA"},
            "absolute_url": "https://boards.greenhouse.io/anthropic/jobs/4012345",
            "departments": [{"name": "Research"}, {"name": null}],
            "content": "&lt;p&gt;Build things&lt;/p&gt;",
            "updated_at": "2026-02-20T10:00:00-05:00"
        }));
        let draft = a.parse(&a.organizations()[0], &raw, Utc::now()).unwrap();
        assert_eq!(draft.company, "Anthropic");
        assert_eq!(draft.job_id, "4012345");
        assert_eq!(draft.location, "San Francisco, CA");
        assert_eq!(draft.departments, vec!["Research".to_string()]);
        assert_eq!(draft.portal, Portal::Greenhouse);
        assert!(draft.description.contains("Build things"));
    }

    #[test]
    fn missing_location_becomes_unknown() {
        let a = adapter();
        let raw = RawPosting::new(json!({"id": 7, "title": "SRE", "location": null}));
        let draft = a.parse(&a.organizations()[0], &raw, Utc::now()).unwrap();
        assert_eq!(draft.location, "Unknown");
        assert!(draft.url.is_empty());
    }

    #[test]
    fn records_without_id_or_title_are_rejected() {
        let a = adapter();
        let org = &a.organizations()[0];
        assert_eq!(
            a.parse(org, &RawPosting::new(json!({"title": "SRE"})), Utc::now()),
            Err(ParseError::MissingField("id"))
        );
        assert_eq!(
            a.parse(org, &RawPosting::new(json!({"id": 3, "title": ""})), Utc::now()),
            Err(ParseError::MissingField("title"))
        );
    }

    #[test]
    fn wrong_shape_is_a_shape_error() {
        let a = adapter();
        let err = a
            .parse(
                &a.organizations()[0],
                &RawPosting::new(json!({"id": 1, "title": "SRE", "departments": "eng"})),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, ParseError::Shape { portal: Portal::Greenhouse, .. }));
    }
}
