//! Merge of filesystem inventory and persisted records into one snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use common::dataset::DatasetRecord;
use tracing::warn;

/// Every dataset record valid as of one reconciliation cycle, keyed by id.
///
/// Built whole and never modified afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogSnapshot {
    generation: u64,
    built_at: DateTime<Utc>,
    records: BTreeMap<String, DatasetRecord>,
}

impl CatalogSnapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            built_at: DateTime::<Utc>::UNIX_EPOCH,
            records: BTreeMap::new(),
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn get(&self, id: &str) -> Option<&DatasetRecord> {
        self.records.get(id)
    }

    /// Records ordered by id.
    pub fn records(&self) -> impl Iterator<Item = &DatasetRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome counts of one reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Present in both inputs; persisted fields kept.
    pub matched: usize,
    /// Only on the filesystem; added with default policy.
    pub discovered: usize,
    /// Only persisted; tagged as integrity errors.
    pub orphaned: usize,
    /// Repeated ids dropped from either input.
    pub duplicates: usize,
}

/// Merge both inputs into a snapshot.
pub fn reconcile(discovered: &[DatasetRecord], persisted: &[DatasetRecord]) -> CatalogSnapshot {
    reconcile_with_report(discovered, persisted).0
}

pub fn reconcile_with_report(
    discovered: &[DatasetRecord],
    persisted: &[DatasetRecord],
) -> (CatalogSnapshot, ReconcileReport) {
    let mut report = ReconcileReport::default();

    let mut index: HashMap<&str, &DatasetRecord> = HashMap::with_capacity(persisted.len());
    for record in persisted {
        if index.contains_key(record.id.as_str()) {
            warn!(id = %record.id, "Duplicate persisted dataset id, keeping the first");
            report.duplicates += 1;
        } else {
            index.insert(&record.id, record);
        }
    }

    let mut records = BTreeMap::new();
    let mut matched: HashSet<&str> = HashSet::new();

    for record in discovered {
        if records.contains_key(&record.id) {
            warn!(id = %record.id, "Duplicate discovered dataset id, keeping the first");
            report.duplicates += 1;
            continue;
        }
        match index.get(record.id.as_str()) {
            Some(stored) => {
                matched.insert(record.id.as_str());
                records.insert(record.id.clone(), (*stored).clone());
                report.matched += 1;
            }
            None => {
                records.insert(record.id.clone(), record.clone());
                report.discovered += 1;
            }
        }
    }

    for (id, record) in &index {
        if !matched.contains(id) {
            records.insert(record.id.clone(), (*record).clone().into_integrity_error());
            report.orphaned += 1;
        }
    }

    let snapshot = CatalogSnapshot {
        generation: 0,
        built_at: Utc::now(),
        records,
    };
    (snapshot, report)
}
