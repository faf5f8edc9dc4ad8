//! Property-based tests for invariants 1-3 and 5-7: random vector
//! clocks, put/delete/resolve sequences, and two-replica interleavings.

use proptest::prelude::*;
use replikit_engine::backend::{MemoryBackend, StorageBackend};
use replikit_engine::sync_target::LocalSyncTarget;
use replikit_engine::{state_machine, ClockOrdering, Replica, VectorClock};
use serde_json::json;

fn replica_uid() -> impl Strategy<Value = String> {
    "[A-Z]{1,3}".prop_map(|s| s)
}

fn clock_entries() -> impl Strategy<Value = Vec<(String, u64)>> {
    prop::collection::hash_map(replica_uid(), 1u64..1000, 0..6).prop_map(|m| m.into_iter().collect())
}

fn arb_clock() -> impl Strategy<Value = VectorClock> {
    clock_entries().prop_map(|entries| {
        let serialized = entries
            .into_iter()
            .map(|(uid, gen)| format!("{uid}:{gen}"))
            .collect::<Vec<_>>()
            .join("|");
        VectorClock::parse(&serialized).unwrap()
    })
}

proptest! {
    /// Invariant 2: `is_newer` is irreflexive and antisymmetric; `maximize`
    /// is commutative and idempotent; incrementing always yields something
    /// newer than the original.
    #[test]
    fn clock_algebra_invariants(a in arb_clock(), b in arb_clock(), uid in replica_uid()) {
        prop_assert!(!a.is_newer(&a));
        prop_assert!(!(a.is_newer(&b) && b.is_newer(&a)));

        let ab = a.maximize(&b);
        let ba = b.maximize(&a);
        prop_assert_eq!(&ab, &ba);
        prop_assert_eq!(ab.maximize(&ab), ab.clone());

        let bumped = a.increment(&uid);
        prop_assert!(bumped.is_newer(&a));

        match a.compare(&b) {
            ClockOrdering::Equal => prop_assert_eq!(&a, &b),
            ClockOrdering::Newer => prop_assert!(a.is_newer(&b)),
            ClockOrdering::Older => prop_assert!(b.is_newer(&a)),
            ClockOrdering::Concurrent => {
                prop_assert!(!a.is_newer(&b));
                prop_assert!(!b.is_newer(&a));
                prop_assert_ne!(&a, &b);
            }
        }
    }

    /// Invariant 3: `serialize` then `parse` is the identity, for any
    /// clock built from valid entries.
    #[test]
    fn clock_serialize_parse_roundtrips(clock in arb_clock()) {
        let serialized = clock.serialize();
        let reparsed = VectorClock::parse(&serialized).unwrap();
        prop_assert_eq!(reparsed, clock);
    }

    /// Invariant 3 (failure modes): every one of these malformed inputs
    /// is rejected, never silently coerced.
    #[test]
    fn clock_parse_rejects_malformed_input(
        uid in "[A-Za-z]{0,4}",
        bogus_gen in "[^0-9]{1,4}",
    ) {
        prop_assert!(VectorClock::parse(&format!("{uid}:{uid}")).is_err() || uid.is_empty());
        prop_assert!(VectorClock::parse(&format!("{uid}:{bogus_gen}")).is_err());
    }

    /// Invariant 1: the transaction log never assigns the same
    /// generation twice, every generation 1..=N is present exactly
    /// once, and `changes_since(0)` reports one entry per distinct doc
    /// touched, each at its highest generation.
    #[test]
    fn log_contiguity_and_changes_since_correctness(
        doc_ids in prop::collection::vec("d[0-9]", 1..8),
    ) {
        let replica = Replica::open(MemoryBackend::new()).unwrap();
        let mut expected_last_write: std::collections::HashMap<String, u64> = std::collections::HashMap::new();

        for (i, doc_id) in doc_ids.iter().enumerate() {
            let existing = replica.get(doc_id, true).unwrap();
            let expected_rev = existing
                .as_ref()
                .map(|d| d.revision.serialize())
                .unwrap_or_default();
            let result = replica.put(doc_id, &expected_rev, Some(json!({"i": i}))).unwrap();
            expected_last_write.insert(doc_id.clone(), result.generation);
        }

        let (all_docs, top_gen) = replica.get_all(true).unwrap();
        prop_assert_eq!(top_gen as usize, doc_ids.len());
        prop_assert_eq!(all_docs.len(), expected_last_write.len());

        let backend = replica.backend();
        let (changes, _) = backend.transaction(|txn| txn.changes_since(0)).unwrap();
        prop_assert_eq!(changes.len(), expected_last_write.len());

        let mut seen_generations: Vec<u64> = changes.iter().map(|c| c.generation).collect();
        seen_generations.sort_unstable();
        seen_generations.dedup();
        prop_assert_eq!(seen_generations.len(), changes.len());

        for change in &changes {
            prop_assert_eq!(Some(&change.generation), expected_last_write.get(&change.doc_id));
        }
    }

    /// Invariant 6: after a bidirectional sync, both replicas agree on
    /// the winning revision and body for every document, and a further
    /// sync in each direction is a no-op (idempotence).
    ///
    /// Conflict *visibility* is not symmetric (§8 invariant 5 is
    /// reconciled against this in DESIGN.md's Open Questions):
    /// `a` always initiates the first exchange here, so for any doc
    /// where the two concurrent bodies actually differ, `a` is the side
    /// that absorbs the loser through the direct-apply path and records
    /// it as a conflict; `b`, absorbing through `insert_from_source`
    /// (`save_conflict=false`), never does. When the two bodies happen
    /// to coincide there is nothing to conflict over and both sides
    /// converge clean.
    #[test]
    fn bidirectional_sync_converges_and_is_idempotent(
        shared_ids in prop::collection::vec("d[0-9]", 1..5),
        vals in prop::collection::vec(1i64..100, 2..10),
    ) {
        let a = Replica::open(MemoryBackend::new()).unwrap();
        let b = Replica::open(MemoryBackend::new()).unwrap();

        let mut shared_ids = shared_ids;
        shared_ids.sort();
        shared_ids.dedup();

        let mut bodies_differed = std::collections::HashMap::new();
        for (i, doc_id) in shared_ids.iter().enumerate() {
            let va = vals[i % vals.len()];
            let vb = vals[(i + 1) % vals.len()];
            a.put(doc_id, "", Some(json!({"v": va}))).unwrap();
            b.put(doc_id, "", Some(json!({"v": vb}))).unwrap();
            bodies_differed.insert(doc_id.clone(), va != vb);
        }

        let target_b = LocalSyncTarget::new(b.backend(), b.replica_uid().to_string());
        let target_a = LocalSyncTarget::new(a.backend(), a.replica_uid().to_string());
        a.sync(&target_b).unwrap();
        b.sync(&target_a).unwrap();
        a.sync(&target_b).unwrap();
        b.sync(&target_a).unwrap();

        for doc_id in &shared_ids {
            let doc_a = a.get(doc_id, true).unwrap();
            let doc_b = b.get(doc_id, true).unwrap();
            prop_assert_eq!(doc_a.as_ref().map(|d| &d.revision), doc_b.as_ref().map(|d| &d.revision));
            prop_assert_eq!(doc_a.as_ref().map(|d| &d.body), doc_b.as_ref().map(|d| &d.body));

            if bodies_differed[doc_id] {
                prop_assert_eq!(doc_a.as_ref().map(|d| d.has_conflicts), Some(true));
                prop_assert_eq!(doc_b.as_ref().map(|d| d.has_conflicts), Some(false));
                prop_assert!(!a.conflicts_of(doc_id).unwrap().is_empty());
                prop_assert!(b.conflicts_of(doc_id).unwrap().is_empty());
            } else {
                prop_assert_eq!(doc_a.as_ref().map(|d| d.has_conflicts), Some(false));
                prop_assert_eq!(doc_b.as_ref().map(|d| d.has_conflicts), Some(false));
            }
        }

        let (all_a, _) = a.get_all(true).unwrap();
        let before_idempotent_resync = all_a.len();
        let outcome_a = a.sync(&target_b).unwrap();
        let outcome_b = b.sync(&target_a).unwrap();
        prop_assert_eq!(outcome_a.docs_received, 0);
        prop_assert_eq!(outcome_b.docs_received, 0);
        let (all_a_after, _) = a.get_all(true).unwrap();
        prop_assert_eq!(all_a_after.len(), before_idempotent_resync);
    }

    /// Invariant 7: a put that is causally descended from a tombstone
    /// (its revision is newer than the tombstone's) is rejected as
    /// superseded, not silently accepted as a live document. A put that
    /// is merely concurrent with the tombstone is allowed to win, but
    /// only with the tombstone preserved in the conflict set - never a
    /// silent overwrite with no trace of the deletion.
    #[test]
    fn tombstones_reject_causally_stale_writes_and_record_concurrent_ones(
        replica_a in replica_uid(),
        replica_b in replica_uid(),
    ) {
        prop_assume!(replica_a != replica_b);
        let backend = MemoryBackend::new();

        backend
            .transaction(|txn| {
                state_machine::put(
                    txn,
                    &replica_a,
                    "d1",
                    VectorClock::parse(&format!("{replica_a}:1")).unwrap(),
                    Some(json!({"x": 1})),
                    false,
                    None,
                )
            })
            .unwrap();

        let put1_rev = VectorClock::parse(&format!("{replica_a}:1")).unwrap();
        backend
            .transaction(|txn| state_machine::delete(txn, &replica_a, "d1", &put1_rev))
            .unwrap();
        let tombstone_rev = backend.transaction(|txn| txn.get_document("d1")).unwrap().unwrap().revision;

        // Causally-stale: a put carrying exactly the pre-delete revision
        // is older than the tombstone and must not resurrect the doc.
        let stale_result = backend.transaction(|txn| {
            state_machine::put(txn, &replica_a, "d1", put1_rev.clone(), Some(json!({"x": 2})), true, None)
        }).unwrap();
        prop_assert_eq!(stale_result.outcome, state_machine::PutOutcome::Superseded);
        let still_tombstoned = backend.transaction(|txn| txn.get_document("d1")).unwrap().unwrap();
        prop_assert!(still_tombstoned.body.is_none());
        prop_assert_eq!(still_tombstoned.revision, tombstone_rev.clone());

        // Concurrent: a write from another replica, causally unaware of
        // the delete, may become current, but only with the tombstone
        // demoted into the conflict set, never erased without a trace.
        backend.transaction(|txn| {
            state_machine::put(
                txn,
                &replica_b,
                "d1",
                VectorClock::parse(&format!("{replica_b}:1")).unwrap(),
                Some(json!({"x": 3})),
                true,
                None,
            )
        }).unwrap();

        let conflicts = backend.transaction(|txn| txn.get_conflicts("d1")).unwrap();
        prop_assert!(conflicts.iter().any(|c| c.revision == tombstone_rev && c.body.is_none()));
    }
}
