//! Mergeable document replica

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

/// One participant's mergeable copy of a shared document.
///
/// Updates merge commutatively, associatively and idempotently: any two
/// replicas that have received the same set of updates converge to the same
/// content, regardless of order or duplication. Protocol code never mutates
/// the underlying document directly; everything flows through
/// [`Replica::apply_update`].
pub struct Replica {
    doc: Doc,
    /// Count of applied updates, used to detect writes racing a save.
    revision: AtomicU64,
}

impl Replica {
    pub fn new() -> Self {
        Self {
            doc: Doc::new(),
            revision: AtomicU64::new(0),
        }
    }

    /// Apply an update received from a peer.
    ///
    /// Re-applying a known update is a no-op on content; only malformed
    /// input fails.
    pub fn apply_update(&self, update: &[u8]) -> Result<()> {
        let decoded = Update::decode_v1(update)
            .map_err(|e: yrs::encoding::read::Error| Error::MalformedUpdate(e.to_string()))?;
        {
            let mut txn = self.doc.transact_mut();
            txn.apply_update(decoded);
        }
        self.revision.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Minimal update bringing a peer whose state vector is
    /// `remote_state_vector` up to this replica's content. Contributions the
    /// peer has already seen are never re-sent.
    pub fn diff_since(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(remote_state_vector)
            .map_err(|e: yrs::encoding::read::Error| Error::MalformedStateVector(e.to_string()))?;
        let txn = self.doc.transact();
        Ok(txn.encode_diff_v1(&sv))
    }

    /// Compact summary of which contributions this replica has seen.
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// The full document state encoded as a single update.
    pub fn full_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// True for a replica with no applied contributions.
    pub fn is_empty(&self) -> bool {
        let txn = self.doc.transact();
        txn.state_vector() == StateVector::default()
    }

    /// Monotonic count of applied updates.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("revision", &self.revision())
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yrs::{GetString, Text};

    /// Build an update representing a text edit on top of `base` state.
    fn edit(base: &[u8], index: u32, chunk: &str) -> Vec<u8> {
        let doc = Doc::new();
        if !base.is_empty() {
            let mut txn = doc.transact_mut();
            txn.apply_update(Update::decode_v1(base).unwrap());
        }
        let before = {
            let txn = doc.transact();
            txn.state_vector()
        };
        let text = doc.get_or_insert_text("content");
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, index, chunk);
        }
        let txn = doc.transact();
        txn.encode_diff_v1(&before)
    }

    /// Read the text content a replica's full state represents.
    fn content(replica: &Replica) -> String {
        let doc = Doc::new();
        {
            let mut txn = doc.transact_mut();
            txn.apply_update(Update::decode_v1(&replica.full_state()).unwrap());
        }
        let text = doc.get_or_insert_text("content");
        let txn = doc.transact();
        text.get_string(&txn)
    }

    #[test]
    fn test_fresh_replica_is_empty() {
        let replica = Replica::new();
        assert!(replica.is_empty());
        assert_eq!(replica.revision(), 0);
    }

    #[test]
    fn test_apply_update() {
        let replica = Replica::new();
        replica.apply_update(&edit(&[], 0, "hello")).unwrap();

        assert!(!replica.is_empty());
        assert_eq!(replica.revision(), 1);
        assert_eq!(content(&replica), "hello");
    }

    #[test]
    fn test_apply_rejects_malformed_input() {
        let replica = Replica::new();
        assert!(replica.apply_update(&[0xff, 0xff, 0xff]).is_err());
        assert!(replica.is_empty());
    }

    #[test]
    fn test_idempotence() {
        let a = Replica::new();
        let b = Replica::new();
        let update = edit(&[], 0, "hello");

        a.apply_update(&update).unwrap();
        b.apply_update(&update).unwrap();
        b.apply_update(&update).unwrap();

        assert_eq!(content(&a), content(&b));
    }

    #[test]
    fn test_convergence_any_order_with_duplication() {
        let u1 = edit(&[], 0, "hello");
        let u2 = edit(&[], 0, "world");

        let a = Replica::new();
        a.apply_update(&u1).unwrap();
        a.apply_update(&u2).unwrap();

        let b = Replica::new();
        b.apply_update(&u2).unwrap();
        b.apply_update(&u2).unwrap();
        b.apply_update(&u1).unwrap();

        assert_eq!(content(&a), content(&b));
    }

    #[test]
    fn test_sequential_edits_compose() {
        let replica = Replica::new();
        replica.apply_update(&edit(&[], 0, "hello")).unwrap();
        replica
            .apply_update(&edit(&replica.full_state(), 5, " world"))
            .unwrap();

        assert_eq!(content(&replica), "hello world");
    }

    #[test]
    fn test_minimal_diff_brings_peer_up_to_date() {
        let source = Replica::new();
        source.apply_update(&edit(&[], 0, "hello")).unwrap();

        let peer = Replica::new();
        let diff = source.diff_since(&peer.state_vector()).unwrap();
        peer.apply_update(&diff).unwrap();

        assert_eq!(content(&peer), content(&source));
        assert_eq!(peer.state_vector(), source.state_vector());
    }

    #[test]
    fn test_diff_against_equal_state_vector_is_empty() {
        let source = Replica::new();
        source.apply_update(&edit(&[], 0, "hello")).unwrap();

        let peer = Replica::new();
        peer.apply_update(&source.full_state()).unwrap();

        // A fully synced peer receives nothing new.
        let diff = source.diff_since(&peer.state_vector()).unwrap();
        let before = content(&peer);
        peer.apply_update(&diff).unwrap();

        assert_eq!(content(&peer), before);
        assert_eq!(peer.state_vector(), source.state_vector());
    }

    #[test]
    fn test_diff_rejects_malformed_state_vector() {
        let replica = Replica::new();
        assert!(replica.diff_since(&[0xff, 0xff, 0xff, 0xff]).is_err());
    }
}
