use std::collections::HashSet;

use crate::listing::CanonicalRecord;

/// First-seen-wins filter over listing ids, scoped to a single run.
///
/// A later record with an already seen id is dropped even when its content
/// differs, so re-merging updated inputs keeps the old content. Overwrites
/// across runs happen in the store, not here.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct BatchMerge {
    pub kept: Vec<CanonicalRecord>,
    pub duplicates: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and marks the id seen if it was new.
    pub fn admit(&mut self, record: &CanonicalRecord) -> bool {
        if self.seen.contains(&record.id) {
            return false;
        }
        self.seen.insert(record.id.clone())
    }

    pub fn merge_batch(&mut self, records: Vec<CanonicalRecord>) -> BatchMerge {
        let mut merge = BatchMerge::default();
        for record in records {
            if self.admit(&record) {
                merge.kept.push(record);
            } else {
                merge.duplicates += 1;
            }
        }
        merge
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
