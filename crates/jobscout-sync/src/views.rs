//! Persistence views: master corpus, dated snapshot, per-company shards and
//! the tabular summary export.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{Float64Array, Int64Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::NaiveDate;
use jobscout_core::JobRecord;
use jobscout_storage::corpus::MASTER_FILE;
use jobscout_storage::{write_atomic, CorpusLoadStatus, CorpusStore};
use parquet::arrow::ArrowWriter;
use serde::Serialize;
use tracing::{info, warn};

use crate::reconcile::ReconcileOutcome;

pub const SUMMARY_PARQUET: &str = "jobs_summary.parquet";

pub fn daily_relative(date: NaiveDate) -> PathBuf {
    PathBuf::from("daily").join(format!("{}.json", date.format("%Y-%m-%d")))
}

pub fn company_relative(company_key: &str) -> PathBuf {
    PathBuf::from("by_company").join(format!("{company_key}.json"))
}

pub fn run_summary_relative(run_id: &str) -> PathBuf {
    PathBuf::from("reports").join(run_id).join("run_summary.json")
}

/// Records sorted by descending freshness score; ties keep corpus order.
pub fn sorted_by_freshness(records: &[JobRecord]) -> Vec<&JobRecord> {
    let mut sorted: Vec<&JobRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.freshness_score.total_cmp(&a.freshness_score));
    sorted
}

/// Touched records grouped by company key.
pub fn group_by_company<'a>(
    records: impl IntoIterator<Item = &'a JobRecord>,
) -> BTreeMap<String, Vec<&'a JobRecord>> {
    let mut groups: BTreeMap<String, Vec<&JobRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.company_key()).or_default().push(record);
    }
    groups
}

/// Overlay `updates` onto `existing` by identity key, appending unseen keys.
pub fn merge_by_key(mut existing: Vec<JobRecord>, updates: &[&JobRecord]) -> Vec<JobRecord> {
    let mut index: HashMap<String, usize> = existing
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.identity_key().map(|k| (k, i)))
        .collect();
    for record in updates {
        let Some(key) = record.identity_key() else {
            continue;
        };
        match index.get(&key) {
            Some(&i) => existing[i] = (*record).clone(),
            None => {
                index.insert(key, existing.len());
                existing.push((*record).clone());
            }
        }
    }
    existing
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewPaths {
    pub master: PathBuf,
    pub daily: Option<PathBuf>,
    pub companies: Vec<PathBuf>,
    pub summary: PathBuf,
}

pub struct ViewWriter {
    store: CorpusStore,
}

impl ViewWriter {
    pub fn new(store: CorpusStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CorpusStore {
        &self.store
    }

    pub async fn write_all(&self, outcome: &ReconcileOutcome, run_date: NaiveDate) -> Result<ViewPaths> {
        let master = self
            .store
            .write_json(MASTER_FILE, &outcome.corpus)
            .await
            .context("writing master corpus")?;

        let touched: Vec<&JobRecord> = outcome.touched().collect();
        let daily = if touched.is_empty() {
            None
        } else {
            Some(self.merge_into(daily_relative(run_date), &touched).await?)
        };

        let mut companies = Vec::new();
        for (key, records) in group_by_company(touched.iter().copied()) {
            companies.push(self.merge_into(company_relative(&key), &records).await?);
        }

        let summary = self.store.path(SUMMARY_PARQUET);
        let bytes = summary_parquet_bytes(&sorted_by_freshness(&outcome.corpus))?;
        write_atomic(&summary, &bytes)
            .await
            .with_context(|| format!("writing {}", summary.display()))?;

        info!(
            corpus = outcome.corpus.len(),
            touched = touched.len(),
            companies = companies.len(),
            "views written"
        );
        Ok(ViewPaths {
            master,
            daily,
            companies,
            summary,
        })
    }

    async fn merge_into(&self, relative: PathBuf, updates: &[&JobRecord]) -> Result<PathBuf> {
        let existing = self.store.load_records(&relative).await;
        if let CorpusLoadStatus::Unreadable(reason) = &existing.status {
            warn!(path = %relative.display(), %reason, "replacing unreadable view file");
        }
        let merged = merge_by_key(existing.records, updates);
        self.store
            .write_json(&relative, &merged)
            .await
            .with_context(|| format!("writing view {}", relative.display()))
    }
}

/// Encode the summary table as an in-memory parquet file.
pub fn summary_parquet_bytes(records: &[&JobRecord]) -> Result<Vec<u8>> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("company", DataType::Utf8, false),
        ArrowField::new("title", DataType::Utf8, false),
        ArrowField::new("location", DataType::Utf8, false),
        ArrowField::new("portal", DataType::Utf8, false),
        ArrowField::new("url", DataType::Utf8, false),
        ArrowField::new("job_id", DataType::Utf8, false),
        ArrowField::new("first_discovered", DataType::Utf8, false),
        ArrowField::new("times_seen", DataType::UInt32, false),
        ArrowField::new("hours_old", DataType::Float64, false),
        ArrowField::new("days_old", DataType::Int64, false),
        ArrowField::new("apply_priority", DataType::Utf8, false),
        ArrowField::new("freshness_score", DataType::Float64, false),
    ]));

    let text = |f: fn(&JobRecord) -> &str| {
        StringArray::from(records.iter().map(|r| f(r)).collect::<Vec<_>>())
    };
    let first_discovered = StringArray::from(
        records
            .iter()
            .map(|r| r.first_discovered.to_rfc3339())
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(text(|r| &r.company)),
            Arc::new(text(|r| &r.title)),
            Arc::new(text(|r| &r.location)),
            Arc::new(text(|r| r.portal.as_str())),
            Arc::new(text(|r| &r.url)),
            Arc::new(text(|r| &r.job_id)),
            Arc::new(first_discovered),
            Arc::new(UInt32Array::from(records.iter().map(|r| r.times_seen).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(records.iter().map(|r| r.hours_old).collect::<Vec<_>>())),
            Arc::new(Int64Array::from(records.iter().map(|r| r.days_old).collect::<Vec<_>>())),
            Arc::new(text(|r| r.apply_priority.as_str())),
            Arc::new(Float64Array::from(
                records.iter().map(|r| r.freshness_score).collect::<Vec<_>>(),
            )),
        ],
    )
    .context("building summary record batch")?;

    let mut writer =
        ArrowWriter::try_new(Vec::new(), schema, None).context("opening parquet writer")?;
    writer.write(&batch).context("writing summary record batch")?;
    writer.into_inner().context("finishing parquet file")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile;
    use chrono::{Duration, TimeZone, Utc};
    use jobscout_core::{JobDraft, Portal};
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use tempfile::tempdir;

    fn draft(company: &str, job_id: &str) -> JobDraft {
        JobDraft {
            company: company.to_string(),
            title: "Platform Engineer".to_string(),
            location: "Remote".to_string(),
            url: String::new(),
            job_id: job_id.to_string(),
            portal: Portal::Greenhouse,
            description: String::new(),
            departments: Vec::new(),
            team: String::new(),
            posted_on: None,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn view_paths_follow_layout() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(daily_relative(date), PathBuf::from("daily/2026-03-01.json"));
        assert_eq!(company_relative("scale_ai"), PathBuf::from("by_company/scale_ai.json"));
        assert_eq!(
            run_summary_relative("abc"),
            PathBuf::from("reports/abc/run_summary.json")
        );
    }

    #[test]
    fn freshness_sort_is_descending() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        let mut old = JobRecord::discovered(draft("Stripe", "1"), now - Duration::days(9));
        let fresh = JobRecord::discovered(draft("Stripe", "2"), now);
        let mut mid = JobRecord::discovered(draft("Stripe", "3"), now - Duration::hours(30));
        old.rescore(now);
        mid.rescore(now);
        let records = vec![old, fresh, mid];
        let order: Vec<&str> = sorted_by_freshness(&records)
            .iter()
            .map(|r| r.job_id.as_str())
            .collect();
        assert_eq!(order, vec!["2", "3", "1"]);
    }

    #[test]
    fn merge_overlays_and_appends() {
        let now = Utc::now();
        let a = JobRecord::discovered(draft("Stripe", "1"), now);
        let b = JobRecord::discovered(draft("Stripe", "2"), now);
        let mut a2 = a.clone();
        a2.times_seen = 5;
        let merged = merge_by_key(vec![a, b.clone()], &[&a2, &JobRecord::discovered(draft("Stripe", "3"), now)]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].times_seen, 5);
        assert_eq!(merged[1], b);
        assert_eq!(merged[2].job_id, "3");
    }

    #[test]
    fn summary_parquet_has_one_row_per_record() {
        let now = Utc::now();
        let records = [
            JobRecord::discovered(draft("Stripe", "1"), now),
            JobRecord::discovered(draft("Figma", "2"), now),
        ];
        let refs: Vec<&JobRecord> = records.iter().collect();
        let bytes = summary_parquet_bytes(&refs).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join(SUMMARY_PARQUET);
        std::fs::write(&path, bytes).unwrap();
        let reader = SerializedFileReader::new(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(reader.metadata().file_metadata().num_rows(), 2);
    }

    #[tokio::test]
    async fn views_accumulate_across_runs() {
        let dir = tempdir().unwrap();
        let writer = ViewWriter::new(CorpusStore::new(dir.path()));
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let date = now.date_naive();

        let first = reconcile(Vec::new(), vec![draft("Scale AI", "1"), draft("Figma", "2")], now);
        writer.write_all(&first, date).await.unwrap();

        let second = reconcile(
            first.corpus.clone(),
            vec![draft("Scale AI", "3")],
            now + Duration::hours(1),
        );
        let paths = writer.write_all(&second, date).await.unwrap();

        let store = writer.store();
        assert_eq!(store.load_corpus().await.records.len(), 3);
        assert_eq!(store.load_records(daily_relative(date)).await.records.len(), 3);
        assert_eq!(
            store
                .load_records(company_relative("scale_ai"))
                .await
                .records
                .len(),
            2
        );
        assert_eq!(store.load_records(company_relative("figma")).await.records.len(), 1);
        assert_eq!(paths.companies.len(), 1);
        assert!(paths.summary.exists());
    }

    #[tokio::test]
    async fn untouched_run_skips_daily_snapshot() {
        let dir = tempdir().unwrap();
        let writer = ViewWriter::new(CorpusStore::new(dir.path()));
        let outcome = reconcile(Vec::new(), Vec::new(), Utc::now());
        let paths = writer
            .write_all(&outcome, Utc::now().date_naive())
            .await
            .unwrap();
        assert!(paths.daily.is_none());
        assert!(paths.companies.is_empty());
        assert!(paths.master.exists());
    }
}
