//! # Parivaha Model
//!
//! Data model shared by the Parivaha sync engine and its adapters.
//!
//! This crate provides:
//! - `Record` and `FieldValue` for notes in either native representation
//! - `SyncPair` linking a Notion page to its vault file
//! - `ConflictRecord` for changes made on both sides
//! - `Snapshot`, the persisted sync state, with a checksummed CBOR codec
//!
//! This is a pure model crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod pair;
mod record;
mod snapshot;
mod value;

pub use conflict::{ConflictRecord, ConflictState};
pub use error::{ModelError, ModelResult};
pub use pair::{body_hash, PairKey, SyncPair};
pub use record::{Record, RecordId, Revision, Side};
pub use snapshot::{Snapshot, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use value::{FieldKind, FieldValue, Fields};
