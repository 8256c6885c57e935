//! One node's journal and the merge/diff algebra between journals.

use std::collections::BTreeMap;

use crate::meta::{FileMeta, FileMetaList};

/// Ordered record of what one node believes the cluster holds.
///
/// Ids are unique within a journal. A tombstone suppresses a live record
/// for the same id only when it supersedes it under last-writer-wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    records: BTreeMap<String, FileMeta>,
}

impl Journal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a journal from a flat list, applying last-writer-wins per id.
    pub fn from_list(list: FileMetaList) -> Self {
        let mut journal = Self::new();
        for meta in list {
            journal.upsert(meta);
        }
        journal
    }

    /// Look up the record for `id`.
    pub fn get(&self, id: &str) -> Option<&FileMeta> {
        self.records.get(id)
    }

    /// Unconditionally store a record under its id.
    pub fn set(&mut self, meta: FileMeta) {
        self.records.insert(meta.id.clone(), meta);
    }

    /// Store a record only if it supersedes the existing one for its id.
    /// Returns true when the record was stored.
    pub fn upsert(&mut self, meta: FileMeta) -> bool {
        match self.records.get(&meta.id) {
            Some(current) if !meta.supersedes(current) => false,
            _ => {
                self.records.insert(meta.id.clone(), meta);
                true
            }
        }
    }

    /// Drop the record for `id` entirely, tombstone or not.
    /// Returns true when a record was present.
    pub fn delete(&mut self, id: &str) -> bool {
        self.records.remove(id).is_some()
    }

    /// Number of records, tombstones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the journal holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &FileMeta> {
        self.records.values()
    }

    /// Export all records as a flat list in id order.
    pub fn export(&self) -> FileMetaList {
        self.records.values().cloned().collect()
    }

    /// Fold every record of `other` into `self` under last-writer-wins.
    /// Returns the number of records that were applied.
    pub fn merge(&mut self, other: &Journal) -> usize {
        let mut applied = 0;
        for meta in other.iter() {
            if self.upsert(meta.clone()) {
                applied += 1;
            }
        }
        applied
    }

    /// Records in `self` that are missing from `base` or supersede their
    /// counterpart there, split into live records (`added`) and tombstones
    /// (`deleted`).
    pub fn diff(&self, base: &Journal) -> (FileMetaList, FileMetaList) {
        let mut added = FileMetaList::new();
        let mut deleted = FileMetaList::new();
        for meta in self.iter() {
            let newer = match base.get(&meta.id) {
                Some(counterpart) => meta.supersedes(counterpart),
                None => true,
            };
            if !newer {
                continue;
            }
            if meta.is_deleted {
                deleted.push(meta.clone());
            } else {
                added.push(meta.clone());
            }
        }
        (added, deleted)
    }
}
