//! Adapters driven against local `wiremock` servers: pagination, the page
//! ceiling and per-organization failure isolation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jobscout_adapters::{
    collect_adapter, AdapterContext, CareerPageAdapter, FilterPolicy, GreenhouseAdapter,
    LeverAdapter, LinkScanExtractor, Organization, Pacing, PagePolicy, SourceAdapter,
    WorkdayAdapter,
};
use jobscout_storage::{BackoffPolicy, HttpClientConfig, HttpFetcher};

fn test_fetcher() -> HttpFetcher {
    HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(5),
        user_agent: Some("jobscout-test/0.1".to_string()),
        backoff: BackoffPolicy::none(),
        ..Default::default()
    })
    .expect("failed to build test fetcher")
}

fn test_ctx() -> AdapterContext {
    let mut ctx = AdapterContext::new(Uuid::new_v4(), Utc::now());
    ctx.pacing = Pacing::none();
    ctx
}

fn lever_page(start: usize, count: usize) -> Value {
    Value::Array(
        (start..start + count)
            .map(|i| {
                json!({
                    "id": format!("posting-{i}"),
                    "text": "Backend Engineer",
                    "categories": {"location": "Remote - US", "team": "Platform"},
                    "hostedUrl": format!("https://jobs.lever.co/acme/posting-{i}")
                })
            })
            .collect(),
    )
}

fn workday_page(total: u64, start: usize, count: usize) -> Value {
    let postings: Vec<Value> = (start..start + count)
        .map(|i| {
            json!({
                "title": "Software Engineer",
                "externalPath": format!("/job/Austin-TX/Software-Engineer_R{i}"),
                "locationsText": "Austin, TX",
                "postedOn": "Posted 2 Days Ago"
            })
        })
        .collect();
    json!({"total": total, "jobPostings": postings})
}

#[tokio::test]
async fn greenhouse_failure_on_one_board_keeps_the_other() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/boards/good/jobs"))
        .and(query_param("content", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobs": [
                {
                    "id": 11,
                    "title": "Machine Learning Engineer",
                    "location": {"name": "New York, NY"},
                    "absolute_url": "https://boards.greenhouse.io/good/jobs/11",
                    "departments": [{"name": "Research"}]
                },
                {"id": 12, "title": "Account Executive", "location": {"name": "Remote"}},
                {"id": 13, "title": "Data Engineer", "location": {"name": "London, UK"}},
                {"title": "Security Engineer"},
                "not an object"
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/boards/broken/jobs"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let adapter = GreenhouseAdapter::with_base_url(
        &server.uri(),
        vec![
            Organization::new("broken", "Broken Inc"),
            Organization::new("good", "Good Co"),
        ],
    );
    let out = collect_adapter(&adapter, &test_fetcher(), &test_ctx(), &FilterPolicy::default()).await;

    assert_eq!(out.report.organizations_attempted, 2);
    assert_eq!(out.report.organizations_failed, 1);
    assert_eq!(out.report.organizations_succeeded, 1);
    assert_eq!(out.report.raw_records, 5);
    assert_eq!(out.report.parse_failures, 2);
    assert_eq!(out.report.filtered_irrelevant, 1);
    assert_eq!(out.report.filtered_location, 1);
    assert_eq!(out.drafts.len(), 1);
    assert_eq!(out.drafts[0].company, "Good Co");
    assert_eq!(out.drafts[0].job_id, "11");
}

#[tokio::test]
async fn lever_short_page_ends_pagination() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v0/postings/acme"))
        .and(query_param("skip", "0"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(lever_page(0, 20)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v0/postings/acme"))
        .and(query_param("skip", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(lever_page(20, 5)))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = LeverAdapter::with_base_url(&server.uri(), vec![Organization::new("acme", "Acme")]);
    let raws = adapter
        .fetch_organization(&test_fetcher(), &test_ctx(), &adapter.organizations()[0])
        .await
        .expect("lever fetch");

    assert_eq!(raws.len(), 25);
}

#[tokio::test]
async fn lever_stops_at_the_page_ceiling() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v0/postings/endless"))
        .respond_with(ResponseTemplate::new(200).set_body_json(lever_page(0, 20)))
        .expect(3)
        .mount(&server)
        .await;

    let adapter = LeverAdapter::with_base_url(&server.uri(), vec![Organization::new("endless", "Endless")]);
    let mut ctx = test_ctx();
    ctx.pages = PagePolicy {
        page_size: 20,
        max_pages: 3,
    };
    let raws = adapter
        .fetch_organization(&test_fetcher(), &ctx, &adapter.organizations()[0])
        .await
        .expect("lever fetch");

    assert_eq!(raws.len(), 60);
}

#[tokio::test]
async fn lever_non_array_body_fails_the_organization() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v0/postings/odd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": false})))
        .mount(&server)
        .await;

    let adapter = LeverAdapter::with_base_url(&server.uri(), vec![Organization::new("odd", "Odd")]);
    let out = collect_adapter(&adapter, &test_fetcher(), &test_ctx(), &FilterPolicy::default()).await;

    assert_eq!(out.report.organizations_failed, 1);
    assert!(out.drafts.is_empty());
}

#[tokio::test]
async fn workday_remembers_first_page_total() {
    let server = MockServer::start().await;
    let search_path = "/wday/cxs/acme/External/jobs";

    Mock::given(method("POST"))
        .and(path(search_path))
        .and(body_partial_json(json!({"offset": 0, "limit": 20})))
        .respond_with(ResponseTemplate::new(200).set_body_json(workday_page(45, 0, 20)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(search_path))
        .and(body_partial_json(json!({"offset": 20})))
        .respond_with(ResponseTemplate::new(200).set_body_json(workday_page(0, 20, 20)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(search_path))
        .and(body_partial_json(json!({"offset": 40})))
        .respond_with(ResponseTemplate::new(200).set_body_json(workday_page(0, 40, 5)))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = WorkdayAdapter::with_base_url(
        &server.uri(),
        vec![Organization::new("acme", "Acme").with_site("External")],
    );
    let out = collect_adapter(&adapter, &test_fetcher(), &test_ctx(), &FilterPolicy::default()).await;

    assert_eq!(out.report.raw_records, 45);
    assert_eq!(out.drafts.len(), 45);
    assert_eq!(
        out.drafts[0].url,
        format!("{}/External/job/Austin-TX/Software-Engineer_R0", server.uri())
    );
}

#[tokio::test]
async fn career_page_links_flow_through_the_pipeline() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/careers"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
                 <a href="/careers/rust-1">Senior Rust Systems Engineer</a>
                 <a href="/careers/sales-2">Regional Sales Director</a>
               </body></html>"#,
        ))
        .mount(&server)
        .await;

    let adapter = CareerPageAdapter::new(
        Arc::new(LinkScanExtractor::default()),
        vec![Organization::new("acme", "Acme").with_url(format!("{}/careers", server.uri()))],
    );
    let out = collect_adapter(&adapter, &test_fetcher(), &test_ctx(), &FilterPolicy::default()).await;

    assert_eq!(out.report.organizations_succeeded, 1);
    assert_eq!(out.drafts.len(), 1);
    assert_eq!(out.drafts[0].title, "Senior Rust Systems Engineer");
    assert_eq!(out.drafts[0].url, format!("{}/careers/rust-1", server.uri()));
    assert_eq!(out.drafts[0].location, "Unknown");
}
