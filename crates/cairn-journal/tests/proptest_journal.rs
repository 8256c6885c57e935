//! Property tests for the last-writer-wins merge algebra.

use cairn_journal::{ConsistencyLevel, FileMeta, Journal};
use proptest::collection::vec;
use proptest::prelude::*;

fn arb_meta() -> impl Strategy<Value = FileMeta> {
    (
        prop::sample::select(vec!["a", "b", "c", "d"]),
        0u64..50,
        any::<bool>(),
    )
        .prop_map(|(id, ts, deleted)| FileMeta {
            timestamp_us: ts,
            is_deleted: deleted,
            ..FileMeta::new(id, ConsistencyLevel::Local)
        })
}

/// Metas with one distinct timestamp per record, so that the winner of
/// every conflict is unique and ordering cannot matter.
fn arb_distinct_ts_metas() -> impl Strategy<Value = Vec<FileMeta>> {
    vec(arb_meta(), 0..24).prop_map(|mut metas| {
        for (i, meta) in metas.iter_mut().enumerate() {
            meta.timestamp_us = meta.timestamp_us * 100 + i as u64;
        }
        metas
    })
}

proptest! {
    #[test]
    fn from_list_is_idempotent(metas in vec(arb_meta(), 0..24)) {
        let once = Journal::from_list(metas.clone());
        let mut doubled = metas.clone();
        doubled.extend(metas);
        let twice = Journal::from_list(doubled);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merge_is_idempotent(ours in vec(arb_meta(), 0..24), theirs in vec(arb_meta(), 0..24)) {
        let mut journal = Journal::from_list(ours);
        let other = Journal::from_list(theirs);
        journal.merge(&other);
        let once = journal.clone();
        journal.merge(&other);
        prop_assert_eq!(journal, once);
    }

    #[test]
    fn apply_order_does_not_matter_for_distinct_timestamps(
        metas in arb_distinct_ts_metas(),
    ) {
        let forward = Journal::from_list(metas.clone());
        let mut reversed = metas;
        reversed.reverse();
        let backward = Journal::from_list(reversed);
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn winner_always_carries_the_greatest_timestamp(metas in vec(arb_meta(), 1..24)) {
        let journal = Journal::from_list(metas.clone());
        for stored in journal.iter() {
            let newest = metas
                .iter()
                .filter(|m| m.id == stored.id)
                .map(|m| m.timestamp_us)
                .max()
                .unwrap();
            prop_assert_eq!(stored.timestamp_us, newest);
        }
    }

    #[test]
    fn diff_against_self_is_empty(metas in vec(arb_meta(), 0..24)) {
        let journal = Journal::from_list(metas);
        let (added, deleted) = journal.diff(&journal.clone());
        prop_assert!(added.is_empty());
        prop_assert!(deleted.is_empty());
    }
}
