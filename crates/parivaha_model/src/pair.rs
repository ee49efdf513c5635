//! Sync pairs: persisted links between a Notion page and a vault file.

use crate::record::{RecordId, Revision, Side};
use crate::value::Fields;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Key of a sync pair: one Notion id and one vault id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    /// Notion record id.
    pub notion_id: RecordId,
    /// Vault record id.
    pub vault_id: RecordId,
}

impl PairKey {
    /// Creates a pair key.
    pub fn new(notion_id: impl Into<RecordId>, vault_id: impl Into<RecordId>) -> Self {
        Self {
            notion_id: notion_id.into(),
            vault_id: vault_id.into(),
        }
    }

    /// Returns the id on the given side.
    pub fn id(&self, side: Side) -> &RecordId {
        match side {
            Side::Notion => &self.notion_id,
            Side::Vault => &self.vault_id,
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.notion_id, self.vault_id)
    }
}

/// The last-synced state of one linked record pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPair {
    /// Linked ids.
    pub key: PairKey,
    /// Notion revision at the last sync.
    pub notion_revision: Revision,
    /// Vault revision at the last sync.
    pub vault_revision: Revision,
    /// When the pair was last committed.
    pub last_synced_at: DateTime<Utc>,
    /// Synchronised fields (Notion representation) at the last sync.
    pub base_fields: Fields,
    /// SHA-256 of the body at the last sync.
    pub base_body_hash: String,
    /// Winner chosen by the user for a pending conflict.
    pub resolution: Option<Side>,
}

impl SyncPair {
    /// Creates a new pair.
    pub fn new(
        key: PairKey,
        notion_revision: Revision,
        vault_revision: Revision,
        last_synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            notion_revision,
            vault_revision,
            last_synced_at,
            base_fields: Fields::new(),
            base_body_hash: body_hash(""),
            resolution: None,
        }
    }

    /// Sets the merge base.
    pub fn with_base(mut self, fields: Fields, body: &str) -> Self {
        self.base_fields = fields;
        self.base_body_hash = body_hash(body);
        self
    }

    /// Returns the last-synced revision of the given side.
    pub fn revision(&self, side: Side) -> &Revision {
        match side {
            Side::Notion => &self.notion_revision,
            Side::Vault => &self.vault_revision,
        }
    }
}

/// Hashes a record body for merge-base comparison.
pub fn body_hash(body: &str) -> String {
    format!("{:x}", Sha256::digest(body.as_bytes()))
}
