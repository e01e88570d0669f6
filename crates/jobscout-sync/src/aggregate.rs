//! Runs every configured adapter concurrently and merges their candidates.

use std::sync::Arc;

use jobscout_adapters::{
    collect_adapter, AdapterContext, AdapterReport, CareerPageAdapter, FilterPolicy,
    GreenhouseAdapter, LeverAdapter, PageExtractor, SourceAdapter, WorkdayAdapter,
};
use jobscout_core::{JobDraft, Portal};
use jobscout_storage::HttpFetcher;
use tracing::{error, info_span, Instrument};

use crate::config::SourceRegistry;

/// Candidates of one run, concatenated in adapter registry order.
#[derive(Debug, Clone, Default)]
pub struct CandidateBatch {
    pub drafts: Vec<JobDraft>,
    pub reports: Vec<AdapterReport>,
}

impl CandidateBatch {
    pub fn organizations_attempted(&self) -> usize {
        self.reports.iter().map(|r| r.organizations_attempted).sum()
    }

    pub fn organizations_succeeded(&self) -> usize {
        self.reports.iter().map(|r| r.organizations_succeeded).sum()
    }

    pub fn organizations_failed(&self) -> usize {
        self.reports.iter().map(|r| r.organizations_failed).sum()
    }
}

pub fn adapters_from_registry(
    registry: &SourceRegistry,
    extractor: Arc<dyn PageExtractor>,
) -> Vec<Arc<dyn SourceAdapter>> {
    registry
        .enabled()
        .into_iter()
        .map(|(portal, orgs)| {
            let orgs = orgs.to_vec();
            let adapter: Arc<dyn SourceAdapter> = match portal {
                Portal::Greenhouse => Arc::new(GreenhouseAdapter::new(orgs)),
                Portal::Lever => Arc::new(LeverAdapter::new(orgs)),
                Portal::Workday => Arc::new(WorkdayAdapter::new(orgs)),
                Portal::CareerPage => Arc::new(CareerPageAdapter::new(extractor.clone(), orgs)),
            };
            adapter
        })
        .collect()
}

/// Never fails: a crashed adapter task contributes nothing and counts all
/// its organizations as failed.
pub async fn aggregate(
    adapters: &[Arc<dyn SourceAdapter>],
    http: Arc<HttpFetcher>,
    ctx: Arc<AdapterContext>,
    policy: Arc<FilterPolicy>,
) -> CandidateBatch {
    let handles: Vec<_> = adapters
        .iter()
        .map(|adapter| {
            let adapter = Arc::clone(adapter);
            let http = Arc::clone(&http);
            let ctx = Arc::clone(&ctx);
            let policy = Arc::clone(&policy);
            let span = info_span!("adapter", portal = %adapter.portal(), run_id = %ctx.run_id);
            tokio::spawn(
                async move { collect_adapter(adapter.as_ref(), &http, &ctx, &policy).await }
                    .instrument(span),
            )
        })
        .collect();

    let mut batch = CandidateBatch::default();
    for (adapter, handle) in adapters.iter().zip(handles) {
        match handle.await {
            Ok(output) => {
                batch.drafts.extend(output.drafts);
                batch.reports.push(output.report);
            }
            Err(err) => {
                error!(portal = %adapter.portal(), error = %err, "adapter task failed");
                batch.reports.push(AdapterReport::total_failure(
                    adapter.portal(),
                    adapter.organizations().len(),
                ));
            }
        }
    }
    batch
}
