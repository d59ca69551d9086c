//! Snapshots of asset sets
//!
//! A [`Snapshot`] maps each [`AssetKey`] to the [`Fingerprint`] of its
//! content at one point in time. The local snapshot is produced fresh by a
//! directory scan; the remote snapshot is either the cached
//! [`StateSnapshot`] or the result of a full remote listing.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::newtypes::{AssetKey, Fingerprint, RemoteId};

// ============================================================================
// Snapshot
// ============================================================================

/// Ordered `key -> fingerprint` map; each key appears at most once
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<AssetKey, Fingerprint>);

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the fingerprint for `key`, returning the previous one
    pub fn insert(&mut self, key: AssetKey, fingerprint: Fingerprint) -> Option<Fingerprint> {
        self.0.insert(key, fingerprint)
    }

    pub fn remove(&mut self, key: &AssetKey) -> Option<Fingerprint> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &AssetKey) -> Option<&Fingerprint> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &AssetKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &AssetKey> {
        self.0.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, AssetKey, Fingerprint> {
        self.0.iter()
    }
}

impl From<BTreeMap<AssetKey, Fingerprint>> for Snapshot {
    fn from(map: BTreeMap<AssetKey, Fingerprint>) -> Self {
        Self(map)
    }
}

impl FromIterator<(AssetKey, Fingerprint)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (AssetKey, Fingerprint)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a AssetKey, &'a Fingerprint);
    type IntoIter = btree_map::Iter<'a, AssetKey, Fingerprint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// LocalAsset
// ============================================================================

/// One file found by the local scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub key: AssetKey,
    /// Absolute path on disk
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub size: u64,
    /// Only used to decide whether re-hashing can be skipped
    pub modified: Option<SystemTime>,
}

// ============================================================================
// RemoteAttachmentRecord
// ============================================================================

/// One attachment as reported by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAttachmentRecord {
    pub id: RemoteId,
    pub key: AssetKey,
    /// Content digest when the store can report one; `None` forces a
    /// download-and-hash during a full listing
    pub fingerprint: Option<Fingerprint>,
    /// Store-side revision counter, if any
    pub version: Option<u64>,
}

// ============================================================================
// StateSnapshot
// ============================================================================

/// The persisted view of what the remote store holds
///
/// `assets` is the remote snapshot used by incremental cycles. `ids` keeps
/// the remote identifier each delete needs. `version` increments on every
/// commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub assets: Snapshot,
    #[serde(default)]
    pub ids: BTreeMap<AssetKey, RemoteId>,
    #[serde(default)]
    pub version: u64,
}

impl StateSnapshot {
    /// Build a snapshot from a full remote listing
    ///
    /// Records without a fingerprint keep their id but are left out of
    /// `assets`.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a RemoteAttachmentRecord>) -> Self {
        let mut state = Self::default();
        for record in records {
            state.ids.insert(record.key.clone(), record.id.clone());
            if let Some(fp) = &record.fingerprint {
                state.assets.insert(record.key.clone(), fp.clone());
            }
        }
        state
    }

    /// Record a successful upload of `key`
    pub fn record_upload(&mut self, key: AssetKey, fingerprint: Fingerprint, id: RemoteId) {
        self.assets.insert(key.clone(), fingerprint);
        self.ids.insert(key, id);
    }

    /// Record a successful delete of `key`
    pub fn record_delete(&mut self, key: &AssetKey) {
        self.assets.remove(key);
        self.ids.remove(key);
    }

    pub fn id_for(&self, key: &AssetKey) -> Option<&RemoteId> {
        self.ids.get(key)
    }
}
