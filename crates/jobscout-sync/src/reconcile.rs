//! Incremental reconciliation of a run's candidates against the persisted corpus.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use jobscout_core::{JobDraft, JobRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileCounts {
    pub new: usize,
    pub refreshed: usize,
    pub batch_duplicates: usize,
    pub rejected: usize,
    pub untouched: usize,
    /// Persisted rows dropped because an earlier row already held their key.
    pub corpus_duplicates: usize,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub corpus: Vec<JobRecord>,
    /// Corpus positions of new and refreshed records, in batch order.
    touched: Vec<usize>,
    pub counts: ReconcileCounts,
}

impl ReconcileOutcome {
    pub fn touched(&self) -> impl Iterator<Item = &JobRecord> + '_ {
        self.touched.iter().map(|&i| &self.corpus[i])
    }

    pub fn touched_len(&self) -> usize {
        self.touched.len()
    }

    /// Recompute derived freshness fields of touched records; the rest keep theirs.
    pub fn rescore_touched(&mut self, now: DateTime<Utc>) {
        for &i in &self.touched {
            self.corpus[i].rescore(now);
        }
    }
}

/// Merge `batch` into `corpus`.
///
/// Keys already in the corpus are refreshed in place (`times_seen + 1`,
/// content replaced, `first_discovered` kept); unseen keys are appended.
/// Only the first occurrence of a key within the batch counts, so a record's
/// `times_seen` grows by at most one per run.
pub fn reconcile(corpus: Vec<JobRecord>, batch: Vec<JobDraft>, now: DateTime<Utc>) -> ReconcileOutcome {
    let mut counts = ReconcileCounts::default();
    let mut merged: Vec<JobRecord> = Vec::with_capacity(corpus.len() + batch.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(corpus.len());

    for record in corpus {
        match record.identity_key() {
            Some(key) if index.contains_key(&key) => {
                counts.corpus_duplicates += 1;
                debug!(%key, "dropping duplicate persisted row");
            }
            Some(key) => {
                index.insert(key, merged.len());
                merged.push(record);
            }
            None => merged.push(record),
        }
    }
    if counts.corpus_duplicates > 0 {
        warn!(dropped = counts.corpus_duplicates, "persisted corpus held duplicate keys");
    }

    let mut handled: HashSet<String> = HashSet::with_capacity(batch.len());
    let mut touched = Vec::new();

    for draft in batch {
        let Some(key) = draft.identity_key() else {
            counts.rejected += 1;
            debug!(company = %draft.company, title = %draft.title, "rejected candidate without job id");
            continue;
        };
        if !handled.insert(key.clone()) {
            counts.batch_duplicates += 1;
            continue;
        }
        match index.get(&key) {
            Some(&pos) => {
                let record = &mut merged[pos];
                record.times_seen = record.times_seen.saturating_add(1);
                record.refresh_content(draft);
                touched.push(pos);
                counts.refreshed += 1;
            }
            None => {
                index.insert(key, merged.len());
                touched.push(merged.len());
                merged.push(JobRecord::discovered(draft, now));
                counts.new += 1;
            }
        }
    }

    counts.untouched = merged.len() - touched.len();
    ReconcileOutcome {
        corpus: merged,
        touched,
        counts,
    }
}
