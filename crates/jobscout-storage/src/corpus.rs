//! File-backed corpus: the master record set plus the JSON views derived from it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use jobscout_core::JobRecord;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::fs;
use tracing::{info, warn};

use crate::write_atomic;

pub const MASTER_FILE: &str = "all_jobs.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusLoadStatus {
    Loaded,
    Missing,
    Unreadable(String),
}

/// Result of reading a record file. Loading never fails: a missing or broken
/// file reads as an empty corpus, which gives first-run semantics.
#[derive(Debug, Clone)]
pub struct LoadedCorpus {
    pub records: Vec<JobRecord>,
    pub skipped_rows: usize,
    pub status: CorpusLoadStatus,
}

impl LoadedCorpus {
    fn empty(status: CorpusLoadStatus) -> Self {
        Self {
            records: Vec::new(),
            skipped_rows: 0,
            status,
        }
    }
}

/// Decode a JSON array of records, dropping rows that do not fit the schema.
///
/// Returns the decoded records and the number of rows skipped.
pub fn decode_records(text: &str) -> Result<(Vec<JobRecord>, usize), serde_json::Error> {
    let rows: Vec<JsonValue> = serde_json::from_str(text)?;
    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    for row in rows {
        match serde_json::from_value::<JobRecord>(row) {
            Ok(record) => records.push(record),
            Err(_) => skipped += 1,
        }
    }
    Ok((records, skipped))
}

#[derive(Debug, Clone)]
pub struct CorpusStore {
    root: PathBuf,
}

impl CorpusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    pub async fn load_corpus(&self) -> LoadedCorpus {
        let loaded = self.load_records(MASTER_FILE).await;
        match &loaded.status {
            CorpusLoadStatus::Loaded => info!(
                records = loaded.records.len(),
                skipped = loaded.skipped_rows,
                "loaded persisted corpus"
            ),
            CorpusLoadStatus::Missing => info!("no persisted corpus, starting empty"),
            CorpusLoadStatus::Unreadable(reason) => {
                warn!(%reason, "persisted corpus unreadable, starting empty")
            }
        }
        loaded
    }

    pub async fn load_records(&self, relative: impl AsRef<Path>) -> LoadedCorpus {
        let path = self.path(relative);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return LoadedCorpus::empty(CorpusLoadStatus::Missing)
            }
            Err(err) => {
                return LoadedCorpus::empty(CorpusLoadStatus::Unreadable(format!(
                    "reading {}: {err}",
                    path.display()
                )))
            }
        };
        match decode_records(&text) {
            Ok((records, skipped_rows)) => {
                if skipped_rows > 0 {
                    warn!(path = %path.display(), skipped_rows, "dropped undecodable corpus rows");
                }
                LoadedCorpus {
                    records,
                    skipped_rows,
                    status: CorpusLoadStatus::Loaded,
                }
            }
            Err(err) => LoadedCorpus::empty(CorpusLoadStatus::Unreadable(format!(
                "parsing {}: {err}",
                path.display()
            ))),
        }
    }

    /// Pretty-print `value` as JSON and replace `relative` atomically.
    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        relative: impl AsRef<Path>,
        value: &T,
    ) -> anyhow::Result<PathBuf> {
        let path = self.path(relative);
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("serializing {}", path.display()))?;
        write_atomic(&path, &bytes).await?;
        Ok(path)
    }
}
