//! The keyed set of journals one node tracks.
//!
//! The manager is the single-writer gate for every journal mutation: the
//! owning node's journal is only ever changed through `update` or
//! `for_each_update`, so concurrent writers serialize here.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{JournalError, JournalResult};
use crate::journal::Journal;
use crate::meta::FileMetaList;

/// Summary of one tracked journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalSummary {
    /// Owning node id.
    pub owner: String,
    /// Number of records, tombstones included.
    pub records: usize,
}

/// Manages every journal this node tracks, keyed by owning node id.
#[derive(Debug, Default)]
pub struct JournalManager {
    journals: RwLock<BTreeMap<String, Journal>>,
}

impl JournalManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a journal exists for `owner`. Creating a journal that is
    /// already tracked is a no-op.
    pub async fn create(&self, owner: &str) -> JournalResult<()> {
        if owner.is_empty() {
            return Err(JournalError::InvalidOwner {
                reason: "empty owner id".into(),
            });
        }
        let mut journals = self.journals.write().await;
        journals.entry(owner.to_string()).or_default();
        Ok(())
    }

    /// True when a journal is tracked for `owner`.
    pub async fn contains(&self, owner: &str) -> bool {
        self.journals.read().await.contains_key(owner)
    }

    /// Summaries of every tracked journal, in owner order.
    pub async fn list_all(&self) -> Vec<JournalSummary> {
        self.journals
            .read()
            .await
            .iter()
            .map(|(owner, journal)| JournalSummary {
                owner: owner.clone(),
                records: journal.len(),
            })
            .collect()
    }

    /// Union of every tracked journal as a flat list, last-writer-wins
    /// per id.
    pub async fn export_all(&self) -> FileMetaList {
        let journals = self.journals.read().await;
        let mut union = Journal::new();
        for journal in journals.values() {
            union.merge(journal);
        }
        union.export()
    }

    /// Visit journals in owner order until the visitor breaks.
    pub async fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &Journal) -> ControlFlow<()>,
    {
        let journals = self.journals.read().await;
        for (owner, journal) in journals.iter() {
            if visit(owner, journal).is_break() {
                break;
            }
        }
    }

    /// Mutate every tracked journal in owner order, under one write lock.
    pub async fn for_each_update<F>(&self, mut mutate: F) -> JournalResult<()>
    where
        F: FnMut(&str, &mut Journal) -> JournalResult<()>,
    {
        let mut journals = self.journals.write().await;
        for (owner, journal) in journals.iter_mut() {
            mutate(owner, journal)?;
        }
        Ok(())
    }

    /// Mutate the journal owned by `owner` under the write lock.
    pub async fn update<F>(&self, owner: &str, mutate: F) -> JournalResult<()>
    where
        F: FnOnce(&mut Journal) -> JournalResult<()>,
    {
        let mut journals = self.journals.write().await;
        let journal = journals
            .get_mut(owner)
            .ok_or_else(|| JournalError::UnknownJournal {
                owner: owner.to_string(),
            })?;
        mutate(journal)
    }

    /// Consolidate: merge every tracked journal into `target`'s under
    /// last-writer-wins and drop the merged sources. Returns the number
    /// of records that were applied to the target.
    pub async fn join_all(&self, target: &str) -> JournalResult<usize> {
        let mut journals = self.journals.write().await;
        if !journals.contains_key(target) {
            return Err(JournalError::UnknownJournal {
                owner: target.to_string(),
            });
        }
        let sources: Vec<String> = journals
            .keys()
            .filter(|owner| owner.as_str() != target)
            .cloned()
            .collect();
        let mut merged = Vec::with_capacity(sources.len());
        for owner in &sources {
            if let Some(source) = journals.remove(owner) {
                merged.push(source);
            }
        }
        let journal = journals
            .get_mut(target)
            .ok_or_else(|| JournalError::UnknownJournal {
                owner: target.to_string(),
            })?;
        let mut applied = 0;
        for source in &merged {
            applied += journal.merge(source);
        }
        debug!(target = %target, applied, "journals consolidated");
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{ConsistencyLevel, FileMeta};

    fn make_meta(id: &str, ts: u64) -> FileMeta {
        FileMeta {
            timestamp_us: ts,
            ..FileMeta::new(id, ConsistencyLevel::Local)
        }
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let manager = JournalManager::new();
        manager.create("n1").await.unwrap();
        manager
            .update("n1", |j| {
                j.set(make_meta("a", 1));
                Ok(())
            })
            .await
            .unwrap();
        manager.create("n1").await.unwrap();
        assert_eq!(manager.list_all().await[0].records, 1);
    }

    #[tokio::test]
    async fn create_rejects_empty_owner() {
        let manager = JournalManager::new();
        assert!(matches!(
            manager.create("").await,
            Err(JournalError::InvalidOwner { .. })
        ));
    }

    #[tokio::test]
    async fn update_unknown_owner_fails() {
        let manager = JournalManager::new();
        let err = manager.update("ghost", |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, JournalError::UnknownJournal { owner } if owner == "ghost"));
    }

    #[tokio::test]
    async fn export_all_applies_last_writer_wins_across_journals() {
        let manager = JournalManager::new();
        manager.create("n1").await.unwrap();
        manager.create("n2").await.unwrap();
        manager
            .update("n1", |j| {
                j.set(make_meta("a", 10));
                j.set(make_meta("b", 1));
                Ok(())
            })
            .await
            .unwrap();
        manager
            .update("n2", |j| {
                j.set(make_meta("a", 20));
                Ok(())
            })
            .await
            .unwrap();

        let union = manager.export_all().await;
        assert_eq!(union.len(), 2);
        let a = union.iter().find(|m| m.id == "a").unwrap();
        assert_eq!(a.timestamp_us, 20);
    }

    #[tokio::test]
    async fn for_each_stops_on_break() {
        let manager = JournalManager::new();
        manager.create("n1").await.unwrap();
        manager.create("n2").await.unwrap();
        let mut visited = Vec::new();
        manager
            .for_each(|owner, _| {
                visited.push(owner.to_string());
                ControlFlow::Break(())
            })
            .await;
        assert_eq!(visited, vec!["n1"]);
    }

    #[tokio::test]
    async fn for_each_update_propagates_mutator_errors() {
        let manager = JournalManager::new();
        manager.create("n1").await.unwrap();
        let err = manager
            .for_each_update(|_, _| Err(JournalError::Mutation("boom".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::Mutation(_)));
    }

    #[tokio::test]
    async fn join_all_consolidates_and_drops_sources() {
        let manager = JournalManager::new();
        manager.create("n1").await.unwrap();
        manager.create("n2").await.unwrap();
        manager
            .update("n1", |j| {
                j.set(make_meta("a", 10));
                Ok(())
            })
            .await
            .unwrap();
        manager
            .update("n2", |j| {
                j.set(make_meta("a", 20));
                j.set(make_meta("b", 5));
                Ok(())
            })
            .await
            .unwrap();

        let applied = manager.join_all("n1").await.unwrap();
        assert_eq!(applied, 2);

        let summaries = manager.list_all().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].owner, "n1");
        assert_eq!(summaries[0].records, 2);

        let union = manager.export_all().await;
        let a = union.iter().find(|m| m.id == "a").unwrap();
        assert_eq!(a.timestamp_us, 20);
    }

    #[tokio::test]
    async fn join_all_unknown_target_fails() {
        let manager = JournalManager::new();
        assert!(manager.join_all("ghost").await.is_err());
    }
}
