//! Change detection against the last-synced snapshot.

use parivaha_model::{Record, Side, SyncPair};

/// Classification of one record (pair) for a pass.
///
/// `Local` is the Notion store and `Remote` the vault store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Neither side changed.
    Unchanged,
    /// Only the Notion side changed.
    ChangedLocal,
    /// Only the vault side changed.
    ChangedRemote,
    /// Both sides changed.
    ChangedBoth,
    /// Unpaired Notion record.
    NewLocal,
    /// Unpaired vault record.
    NewRemote,
    /// Paired Notion record is gone.
    DeletedLocal {
        /// Whether the vault side changed meanwhile.
        remote_changed: bool,
    },
    /// Paired vault record is gone.
    DeletedRemote {
        /// Whether the Notion side changed meanwhile.
        local_changed: bool,
    },
    /// Both records of a pair are gone.
    Vanished,
}

impl Change {
    /// The side whose state must be propagated, for one-sided changes.
    pub fn source(self) -> Option<Side> {
        match self {
            Change::ChangedLocal | Change::NewLocal => Some(Side::Notion),
            Change::ChangedRemote | Change::NewRemote => Some(Side::Vault),
            _ => None,
        }
    }

    /// Returns true if both sides diverged and need conflict resolution.
    pub fn is_conflict(self) -> bool {
        matches!(
            self,
            Change::ChangedBoth
                | Change::DeletedLocal {
                    remote_changed: true
                }
                | Change::DeletedRemote {
                    local_changed: true
                }
        )
    }
}

/// Classifies a record pair.
///
/// `pair` is the snapshot entry, if any; `notion` and `vault` are the
/// current records. A side is changed when its current revision differs
/// from the snapshot's revision for that side.
pub fn detect(pair: Option<&SyncPair>, notion: Option<&Record>, vault: Option<&Record>) -> Change {
    let Some(pair) = pair else {
        return match (notion, vault) {
            (Some(_), _) => Change::NewLocal,
            (None, Some(_)) => Change::NewRemote,
            (None, None) => Change::Unchanged,
        };
    };

    let changed = |side: Side, record: &Record| &record.revision != pair.revision(side);

    match (notion, vault) {
        (Some(n), Some(v)) => match (changed(Side::Notion, n), changed(Side::Vault, v)) {
            (false, false) => Change::Unchanged,
            (true, false) => Change::ChangedLocal,
            (false, true) => Change::ChangedRemote,
            (true, true) => Change::ChangedBoth,
        },
        (None, Some(v)) => Change::DeletedLocal {
            remote_changed: changed(Side::Vault, v),
        },
        (Some(n), None) => Change::DeletedRemote {
            local_changed: changed(Side::Notion, n),
        },
        (None, None) => Change::Vanished,
    }
}
