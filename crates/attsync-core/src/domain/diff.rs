//! The operation set produced by reconciliation

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::newtypes::AssetKey;

/// Three disjoint key sets describing how remote must change to match local
///
/// Keys in `to_add` exist only locally, keys in `to_update` exist on both
/// sides with different fingerprints, keys in `to_delete` exist only
/// remotely. Together with the unchanged keys they partition the union of
/// both snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDiff {
    pub to_add: BTreeSet<AssetKey>,
    pub to_update: BTreeSet<AssetKey>,
    pub to_delete: BTreeSet<AssetKey>,
}

impl SyncDiff {
    /// True if any set is non-empty
    pub fn has_changes(&self) -> bool {
        !self.to_add.is_empty() || !self.to_update.is_empty() || !self.to_delete.is_empty()
    }

    /// Total number of planned operations
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_update.len() + self.to_delete.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_changes()
    }

    /// Compact `+added ~updated -deleted` form used in log lines
    pub fn summary(&self) -> String {
        format!(
            "+{} ~{} -{}",
            self.to_add.len(),
            self.to_update.len(),
            self.to_delete.len()
        )
    }
}
