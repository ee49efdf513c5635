//! Persisted sync state.
//!
//! On-disk layout:
//!
//! ```text
//! +-------+---------+-------------+-----------------+-----------------+
//! | magic | version | payload len | payload (CBOR)  | SHA-256(payload)|
//! | 4 B   | u16 LE  | u32 LE      | variable        | 32 B            |
//! +-------+---------+-------------+-----------------+-----------------+
//! ```
//!
//! Pairs are kept in a `BTreeMap` and serialized as a sorted sequence, so
//! encoding the same snapshot twice produces identical bytes.

use crate::conflict::ConflictRecord;
use crate::error::{ModelError, ModelResult};
use crate::pair::{PairKey, SyncPair};
use crate::record::{RecordId, Side};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Magic bytes for snapshot files.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"PVSN";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 4;
const DIGEST_LEN: usize = 32;

/// The complete persisted state of one sync domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pairs: BTreeMap<PairKey, SyncPair>,
    pending: Vec<ConflictRecord>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotBody {
    pairs: Vec<SyncPair>,
    pending: Vec<ConflictRecord>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates over all pairs in key order.
    pub fn pairs(&self) -> impl Iterator<Item = &SyncPair> {
        self.pairs.values()
    }

    /// Gets a pair by key.
    pub fn pair(&self, key: &PairKey) -> Option<&SyncPair> {
        self.pairs.get(key)
    }

    /// Finds the pair containing `id` on `side`.
    pub fn pair_for(&self, side: Side, id: &RecordId) -> Option<&SyncPair> {
        self.pairs.values().find(|p| p.key.id(side) == id)
    }

    /// Inserts or replaces a pair.
    ///
    /// A record belongs to at most one pair: any other pair sharing the
    /// Notion id or the vault id is removed and returned.
    pub fn upsert(&mut self, pair: SyncPair) -> Vec<SyncPair> {
        let stale: Vec<PairKey> = self
            .pairs
            .keys()
            .filter(|k| {
                *k != &pair.key
                    && (k.notion_id == pair.key.notion_id || k.vault_id == pair.key.vault_id)
            })
            .cloned()
            .collect();

        let removed = stale
            .iter()
            .filter_map(|k| self.pairs.remove(k))
            .collect();
        self.pairs.insert(pair.key.clone(), pair);
        removed
    }

    /// Removes a pair.
    pub fn remove(&mut self, key: &PairKey) -> Option<SyncPair> {
        self.pairs.remove(key)
    }

    /// Pending (deferred) conflicts.
    pub fn pending(&self) -> &[ConflictRecord] {
        &self.pending
    }

    /// Replaces the pending queue.
    pub fn set_pending(&mut self, pending: Vec<ConflictRecord>) {
        self.pending = pending;
    }

    /// Records the user's choice of winner for the pair containing `id`.
    ///
    /// Returns the affected pair key, or `None` if no pair contains `id`.
    pub fn set_resolution(&mut self, side: Side, id: &RecordId, winner: Side) -> Option<PairKey> {
        let pair = self.pairs.values_mut().find(|p| p.key.id(side) == id)?;
        pair.resolution = Some(winner);
        Some(pair.key.clone())
    }

    /// Encodes the snapshot.
    pub fn encode(&self) -> ModelResult<Vec<u8>> {
        let body = SnapshotBody {
            pairs: self.pairs.values().cloned().collect(),
            pending: self.pending.clone(),
        };

        let mut payload = Vec::new();
        ciborium::into_writer(&body, &mut payload).map_err(|e| ModelError::Encode(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| ModelError::Encode("snapshot payload exceeds 4 GiB".into()))?;

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + DIGEST_LEN);
        buf.extend_from_slice(&SNAPSHOT_MAGIC);
        buf.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&Sha256::digest(&payload));
        Ok(buf)
    }

    /// Decodes a snapshot, verifying magic, version and checksum.
    pub fn decode(data: &[u8]) -> ModelResult<Self> {
        if data.len() < HEADER_LEN + DIGEST_LEN {
            return Err(ModelError::corruption("snapshot too short"));
        }
        if data[0..4] != SNAPSHOT_MAGIC {
            return Err(ModelError::corruption("invalid snapshot magic"));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version == 0 || version > SNAPSHOT_VERSION {
            return Err(ModelError::corruption(format!(
                "unsupported snapshot version: {version}"
            )));
        }

        let len = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
        if data.len() != HEADER_LEN + len + DIGEST_LEN {
            return Err(ModelError::corruption(format!(
                "snapshot length mismatch: header says {len} payload bytes, file has {}",
                data.len().saturating_sub(HEADER_LEN + DIGEST_LEN)
            )));
        }

        let payload = &data[HEADER_LEN..HEADER_LEN + len];
        let digest = &data[HEADER_LEN + len..];
        if Sha256::digest(payload).as_slice() != digest {
            return Err(ModelError::corruption("snapshot checksum mismatch"));
        }

        let body: SnapshotBody = ciborium::from_reader(payload)
            .map_err(|e| ModelError::corruption(format!("invalid snapshot payload: {e}")))?;

        let mut pairs = BTreeMap::new();
        for pair in body.pairs {
            if pairs.insert(pair.key.clone(), pair).is_some() {
                return Err(ModelError::corruption("duplicate sync pair"));
            }
        }

        Ok(Self {
            pairs,
            pending: body.pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, Revision};
    use crate::value::FieldValue;
    use chrono::{TimeZone, Utc};

    fn pair(notion: &str, vault: &str, n: u64, v: u64) -> SyncPair {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut fields = crate::value::Fields::new();
        fields.insert("Name".into(), FieldValue::text(notion));
        SyncPair::new(
            PairKey::new(notion, vault),
            Revision::Counter(n),
            Revision::Counter(v),
            at,
        )
        .with_base(fields, "body")
    }

    #[test]
    fn encode_decode_preserves_state() {
        let mut snapshot = Snapshot::new();
        snapshot.upsert(pair("n1", "a.md", 1, 1));
        snapshot.upsert(pair("n2", "b.md", 4, 9));
        let vault = Record::new("b.md", Side::Vault, Revision::Counter(10));
        snapshot.set_pending(vec![ConflictRecord::new(
            PairKey::new("n2", "b.md"),
            None,
            Some(vault),
        )]);

        let decoded = Snapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.pending().len(), 1);
    }

    #[test]
    fn encoding_is_deterministic() {
        let mut a = Snapshot::new();
        a.upsert(pair("n2", "b.md", 4, 9));
        a.upsert(pair("n1", "a.md", 1, 1));

        let mut b = Snapshot::new();
        b.upsert(pair("n1", "a.md", 1, 1));
        b.upsert(pair("n2", "b.md", 4, 9));

        assert_eq!(a.encode().unwrap(), b.encode().unwrap());
        assert_eq!(a.encode().unwrap(), a.encode().unwrap());
    }

    #[test]
    fn upsert_replaces_pairs_sharing_an_id() {
        let mut snapshot = Snapshot::new();
        snapshot.upsert(pair("n1", "a.md", 1, 1));
        let removed = snapshot.upsert(pair("n1", "renamed.md", 2, 2));
        assert_eq!(removed.len(), 1);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot
            .pair_for(Side::Vault, &RecordId::new("renamed.md"))
            .is_some());
    }

    #[test]
    fn set_resolution_by_either_id() {
        let mut snapshot = Snapshot::new();
        snapshot.upsert(pair("n1", "a.md", 1, 1));
        let key = snapshot
            .set_resolution(Side::Vault, &RecordId::new("a.md"), Side::Vault)
            .unwrap();
        assert_eq!(snapshot.pair(&key).unwrap().resolution, Some(Side::Vault));
        assert!(snapshot
            .set_resolution(Side::Notion, &RecordId::new("missing"), Side::Notion)
            .is_none());
    }

    #[test]
    fn corruption_is_detected() {
        let mut snapshot = Snapshot::new();
        snapshot.upsert(pair("n1", "a.md", 1, 1));
        let bytes = snapshot.encode().unwrap();

        assert!(matches!(
            Snapshot::decode(b"nope"),
            Err(ModelError::SnapshotCorruption { .. })
        ));

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(Snapshot::decode(&bad_magic).is_err());

        let mut flipped = bytes.clone();
        flipped[HEADER_LEN + 2] ^= 0xff;
        assert!(matches!(
            Snapshot::decode(&flipped),
            Err(ModelError::SnapshotCorruption { .. })
        ));

        let truncated = &bytes[..bytes.len() - 1];
        assert!(Snapshot::decode(truncated).is_err());
    }
}
