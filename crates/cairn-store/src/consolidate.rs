//! Periodic journal consolidation.
//!
//! Once a node is ready, everything it has cached about its peers is
//! folded into its own journal, daily by default. A failed pass is
//! logged and the next one runs on schedule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use cairn_journal::JournalManager;

use crate::state::StateCell;

pub(crate) struct Consolidator {
    pub(crate) node_id: String,
    pub(crate) journals: Arc<JournalManager>,
    pub(crate) state: Arc<StateCell>,
    pub(crate) debug: Arc<AtomicBool>,
    pub(crate) interval: Duration,
    pub(crate) ready_poll: Duration,
}

impl Consolidator {
    /// Run forever: wait for readiness, consolidate, sleep, repeat.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                while !self.state.is_ready() {
                    tokio::time::sleep(self.ready_poll).await;
                }
                self.run_once().await;
                tokio::time::sleep(self.interval).await;
            }
        })
    }

    async fn run_once(&self) {
        if self.debug.load(Ordering::Relaxed) {
            let journals = self.journals.list_all().await;
            info!(journals = ?journals, "consolidating journals");
        }
        let started = Instant::now();
        match self.journals.join_all(&self.node_id).await {
            Ok(applied) => {
                debug!(applied, elapsed = ?started.elapsed(), "consolidation done");
            }
            Err(err) => warn!(error = %err, "journal consolidation failed"),
        }
        if self.debug.load(Ordering::Relaxed) {
            let journals = self.journals.list_all().await;
            info!(journals = ?journals, "journals after consolidation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_journal::{ConsistencyLevel, FileMeta};

    fn consolidator(journals: Arc<JournalManager>) -> Consolidator {
        Consolidator {
            node_id: "n1".to_string(),
            journals,
            state: Arc::new(StateCell::new()),
            debug: Arc::new(AtomicBool::new(false)),
            interval: Duration::from_secs(86_400),
            ready_poll: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn one_pass_folds_peer_journals_into_ours() {
        let journals = Arc::new(JournalManager::new());
        journals.create("n1").await.unwrap();
        journals.create("n2").await.unwrap();
        journals
            .update("n2", |j| {
                j.set(FileMeta {
                    timestamp_us: 7,
                    ..FileMeta::new("obj", ConsistencyLevel::Local)
                });
                Ok(())
            })
            .await
            .unwrap();

        consolidator(journals.clone()).run_once().await;

        let summaries = journals.list_all().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].owner, "n1");
        assert_eq!(summaries[0].records, 1);
    }

    #[tokio::test]
    async fn missing_own_journal_is_logged_not_fatal() {
        let journals = Arc::new(JournalManager::new());
        consolidator(journals).run_once().await;
    }
}
