//! # Parivaha Sync Engine
//!
//! Bidirectional synchronization between a Notion database and an
//! Obsidian vault.
//!
//! This crate provides:
//! - The record adapter capability trait and an in-memory adapter
//! - Change detection against the last-synced snapshot
//! - Declarative field mapping between the two representations
//! - Conflict resolution (last-write-wins, manual, field-merge)
//! - Snapshot stores (in-memory and file-backed with an advisory lock)
//! - The sync orchestrator with bounded parallel writes and retry
//!
//! ## Key Invariants
//!
//! - At most one pair per Notion id and per vault id
//! - A pass commits its snapshot once, or not at all on a fatal error
//! - Adapter writes are idempotent by record id
//! - Deferred conflicts are never partially applied
//! - Two passes on the same domain never interleave

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod detect;
mod engine;
mod error;
mod mapping;
mod resolve;
mod store;

pub use adapter::{
    AdapterError, AdapterResult, MemoryAdapter, RecordAdapter, RecordStream, WriteReceipt,
};
pub use config::{
    ConflictPolicy, RetryConfig, RetryPolicyFile, SyncConfig, SyncConfigFile, SyncDirection,
};
pub use detect::{detect, Change};
pub use engine::{CancelHandle, PassSummary, RecordFailure, RecordRef, SyncEngine, SyncStats};
pub use error::{SyncError, SyncResult};
pub use mapping::{
    parse_timestamp, Direction, Encoding, FieldMapping, FieldRule, MappingEngine, MappingError,
    MappingResult,
};
pub use resolve::{ConflictResolver, MergePlan, Resolution};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
