//! Snapshot reconciliation
//!
//! [`reconcile`] compares the local snapshot against the remote one and
//! returns the minimal set of operations that makes the remote match the
//! local directory. It has no I/O and no knowledge of the remote store.

use attsync_core::domain::{Snapshot, SyncDiff};

/// Compute the diff that turns `remote` into `local`
///
/// - `to_add`: keys only in `local`
/// - `to_update`: keys in both with different fingerprints
/// - `to_delete`: keys only in `remote`
pub fn reconcile(local: &Snapshot, remote: &Snapshot) -> SyncDiff {
    let mut diff = SyncDiff::default();

    for (key, fingerprint) in local.iter() {
        match remote.get(key) {
            None => {
                diff.to_add.insert(key.clone());
            }
            Some(remote_fp) if remote_fp != fingerprint => {
                diff.to_update.insert(key.clone());
            }
            Some(_) => {}
        }
    }

    for key in remote.keys() {
        if !local.contains(key) {
            diff.to_delete.insert(key.clone());
        }
    }

    diff
}
