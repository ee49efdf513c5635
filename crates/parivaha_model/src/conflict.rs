//! Conflict records for changes made on both sides.

use crate::pair::PairKey;
use crate::record::{Record, Side};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a conflict within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictState {
    /// Both sides changed; not yet resolved.
    Detected,
    /// Resolved automatically within the pass.
    AutoResolved,
    /// Held for manual resolution.
    Deferred,
}

/// A record pair whose two sides diverged since the last sync.
///
/// Created during a pass. Auto-resolved conflicts are dropped at the end
/// of the pass; deferred ones are kept in the snapshot's pending queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Pair the conflict belongs to.
    pub key: PairKey,
    /// Current Notion version, absent if deleted there.
    pub notion: Option<Record>,
    /// Current vault version, absent if deleted there.
    pub vault: Option<Record>,
    /// Current state.
    pub state: ConflictState,
    /// Winning side once auto-resolved.
    pub winner: Option<Side>,
    /// Fields changed on both sides to different values.
    pub conflicting_fields: Vec<String>,
    /// Why the conflict could not be resolved automatically.
    pub reason: Option<String>,
}

impl ConflictRecord {
    /// Creates a freshly detected conflict.
    pub fn new(key: PairKey, notion: Option<Record>, vault: Option<Record>) -> Self {
        Self {
            key,
            notion,
            vault,
            state: ConflictState::Detected,
            winner: None,
            conflicting_fields: Vec::new(),
            reason: None,
        }
    }

    /// Marks the conflict as auto-resolved in favour of `winner`.
    pub fn auto_resolve(&mut self, winner: Side) {
        self.state = ConflictState::AutoResolved;
        self.winner = Some(winner);
    }

    /// Marks the conflict as deferred.
    pub fn defer(&mut self, reason: impl Into<String>) {
        self.state = ConflictState::Deferred;
        self.reason = Some(reason.into());
    }

    /// Returns true if this is a delete-versus-update conflict.
    pub fn is_delete_conflict(&self) -> bool {
        self.notion.is_none() || self.vault.is_none()
    }

    /// Returns the version on the given side.
    pub fn version(&self, side: Side) -> Option<&Record> {
        match side {
            Side::Notion => self.notion.as_ref(),
            Side::Vault => self.vault.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Revision;

    #[test]
    fn lifecycle() {
        let notion = Record::new("n1", Side::Notion, Revision::Counter(2));
        let vault = Record::new("v1", Side::Vault, Revision::Counter(3));
        let mut conflict =
            ConflictRecord::new(PairKey::new("n1", "v1"), Some(notion), Some(vault));
        assert_eq!(conflict.state, ConflictState::Detected);
        assert!(!conflict.is_delete_conflict());

        conflict.auto_resolve(Side::Vault);
        assert_eq!(conflict.state, ConflictState::AutoResolved);
        assert_eq!(conflict.winner, Some(Side::Vault));
    }

    #[test]
    fn delete_conflict() {
        let vault = Record::new("v1", Side::Vault, Revision::Counter(3));
        let mut conflict = ConflictRecord::new(PairKey::new("n1", "v1"), None, Some(vault));
        assert!(conflict.is_delete_conflict());
        assert!(conflict.version(Side::Notion).is_none());

        conflict.defer("deleted in notion, modified in vault");
        assert_eq!(conflict.state, ConflictState::Deferred);
        assert!(conflict.reason.is_some());
    }
}
