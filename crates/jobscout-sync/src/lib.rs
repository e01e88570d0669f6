//! One aggregation run: fetch every source, reconcile against the persisted
//! corpus, rescore and write the views.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobscout_adapters::{
    AdapterContext, AdapterReport, FilterPolicy, LinkScanExtractor, SourceAdapter,
};
use jobscout_core::{JobRecord, PriorityBreakdown};
use jobscout_storage::{ArtifactStore, CorpusLoadStatus, CorpusStore, HttpFetcher};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod aggregate;
pub mod config;
pub mod reconcile;
pub mod views;

pub use aggregate::{adapters_from_registry, aggregate, CandidateBatch};
pub use config::{build_sync_config, load_filter_policy, load_registry, ConfigError, SourceRegistry, SyncConfig};
pub use reconcile::{reconcile, ReconcileCounts, ReconcileOutcome};
pub use views::{ViewPaths, ViewWriter};

pub const CRATE_NAME: &str = "jobscout-sync";

/// Counts reported at the end of every run, also written to `run_summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub filter_rules_version: u32,
    pub organizations_attempted: usize,
    pub organizations_succeeded: usize,
    pub organizations_failed: usize,
    pub total_candidates: usize,
    pub new_jobs: usize,
    pub duplicates: usize,
    pub reconcile: ReconcileCounts,
    pub corpus_size: usize,
    pub corpus_rows_skipped: usize,
    /// Tiers of the records touched this run.
    pub priorities: PriorityBreakdown,
    pub adapters: Vec<AdapterReport>,
}

pub struct SyncPipeline {
    config: SyncConfig,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    policy: Arc<FilterPolicy>,
    http: Arc<HttpFetcher>,
    archive: Option<ArtifactStore>,
}

impl SyncPipeline {
    pub fn new(
        config: SyncConfig,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        policy: FilterPolicy,
    ) -> Result<Self> {
        let http = HttpFetcher::new(config.http_config())?;
        let archive = config
            .archive_raw
            .then(|| ArtifactStore::new(config.artifacts_dir.clone()));
        Ok(Self {
            config,
            adapters,
            policy: Arc::new(policy),
            http: Arc::new(http),
            archive,
        })
    }

    /// Load the registry and filter rules; all configuration errors surface here.
    pub async fn from_config(config: SyncConfig) -> Result<Self> {
        let registry = load_registry(&config.registry_path()).await?;
        let policy = load_filter_policy(&config.rules_path()).await?;
        let extractor = Arc::new(LinkScanExtractor::new(policy.clone()));
        let adapters = adapters_from_registry(&registry, extractor);
        if adapters.is_empty() {
            return Err(ConfigError::NoSources.into());
        }
        Self::new(config, adapters, policy)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        self.run_inner(run_id)
            .instrument(info_span!("sync_run", %run_id))
            .await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunSummary> {
        let started_at = Utc::now();
        let ctx = AdapterContext {
            pacing: self.config.pacing(),
            archive: self.archive.clone(),
            ..AdapterContext::new(run_id, started_at)
        };
        info!(adapters = self.adapters.len(), rules = self.policy.version, "sync started");

        let batch = aggregate(
            &self.adapters,
            Arc::clone(&self.http),
            Arc::new(ctx),
            Arc::clone(&self.policy),
        )
        .await;
        let total_candidates = batch.drafts.len();
        let (attempted, succeeded, failed) = (
            batch.organizations_attempted(),
            batch.organizations_succeeded(),
            batch.organizations_failed(),
        );

        let store = CorpusStore::new(self.config.data_dir.clone());
        let loaded = store.load_corpus().await;
        if let CorpusLoadStatus::Unreadable(_) = loaded.status {
            warn!("continuing with an empty corpus");
        }

        let now = Utc::now();
        let mut outcome = reconcile(loaded.records, batch.drafts, now);
        outcome.rescore_touched(now);

        let writer = ViewWriter::new(store);
        writer
            .write_all(&outcome, now.date_naive())
            .await
            .context("writing persistence views")?;

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            filter_rules_version: self.policy.version,
            organizations_attempted: attempted,
            organizations_succeeded: succeeded,
            organizations_failed: failed,
            total_candidates,
            new_jobs: outcome.counts.new,
            duplicates: outcome.counts.refreshed + outcome.counts.batch_duplicates,
            reconcile: outcome.counts,
            corpus_size: outcome.corpus.len(),
            corpus_rows_skipped: loaded.skipped_rows,
            priorities: PriorityBreakdown::tally(outcome.touched()),
            adapters: batch.reports,
        };
        writer
            .store()
            .write_json(views::run_summary_relative(&run_id.to_string()), &summary)
            .await
            .context("writing run summary")?;

        info!(
            attempted = summary.organizations_attempted,
            succeeded = summary.organizations_succeeded,
            candidates = summary.total_candidates,
            new = summary.new_jobs,
            duplicates = summary.duplicates,
            corpus = summary.corpus_size,
            "sync finished"
        );
        Ok(summary)
    }
}

pub async fn run_sync_once_from_env() -> Result<RunSummary> {
    let config = SyncConfig::from_env()?;
    let pipeline = SyncPipeline::from_config(config).await?;
    pipeline.run_once().await
}

/// Read-only statistics over the persisted corpus, rescored as of `now`.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusReport {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub priorities: PriorityBreakdown,
    pub by_portal: BTreeMap<String, usize>,
    pub freshest: Vec<JobRecord>,
}

impl CorpusReport {
    pub fn build(mut records: Vec<JobRecord>, now: DateTime<Utc>, top: usize) -> Self {
        for record in &mut records {
            record.rescore(now);
        }
        let mut by_portal: BTreeMap<String, usize> = BTreeMap::new();
        for record in &records {
            *by_portal.entry(record.portal.to_string()).or_default() += 1;
        }
        let freshest = views::sorted_by_freshness(&records)
            .into_iter()
            .take(top)
            .cloned()
            .collect();
        Self {
            generated_at: now,
            total: records.len(),
            priorities: PriorityBreakdown::tally(&records),
            by_portal,
            freshest,
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            "# jobscout corpus report".to_string(),
            String::new(),
            format!("- generated: {}", self.generated_at.to_rfc3339()),
            format!("- total postings: {}", self.total),
            format!(
                "- HIGH: {} | MEDIUM: {} | LOW: {} | EXPIRED: {}",
                self.priorities.high,
                self.priorities.medium,
                self.priorities.low,
                self.priorities.expired
            ),
            String::new(),
            "## By portal".to_string(),
        ];
        lines.extend(self.by_portal.iter().map(|(portal, n)| format!("- {portal}: {n}")));
        lines.push(String::new());
        lines.push("## Freshest".to_string());
        for record in &self.freshest {
            lines.push(format!(
                "- [{}] {:.1} {} | {} | {} | {}h | {}",
                record.apply_priority,
                record.freshness_score,
                record.company,
                record.title,
                record.location,
                record.hours_old,
                record.url
            ));
        }
        lines.join("\n")
    }
}

pub async fn corpus_report(config: &SyncConfig, top: usize) -> CorpusReport {
    let loaded = CorpusStore::new(config.data_dir.clone()).load_corpus().await;
    CorpusReport::build(loaded.records, Utc::now(), top)
}
