//! Record adapter abstraction.
//!
//! Adapters own their native records. The engine only sees them through
//! this trait and addresses them by [`Side`], so the Notion and vault
//! stores are interchangeable implementations of one capability set.

use chrono::Utc;
use parivaha_model::{Record, RecordId, Revision, Side};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Lazy, finite sequence of records. Calling `list_records` again restarts it.
pub type RecordStream<'a> = Box<dyn Iterator<Item = AdapterResult<Record>> + Send + 'a>;

/// Errors reported by adapters.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// I/O or network failure.
    #[error("adapter I/O error: {message}")]
    Io {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Record does not exist.
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// Capability not provided by this adapter.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// The record cannot be stored as given.
    #[error("invalid record: {0}")]
    Invalid(String),

    /// A listed record exists but its content cannot be read.
    ///
    /// Listing continues past it; the engine leaves its pair untouched.
    #[error("cannot read record {id}: {message}")]
    Unreadable {
        /// Record that failed to read.
        id: RecordId,
        /// Why it could not be read.
        message: String,
    },
}

impl AdapterError {
    /// Creates a retryable I/O error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable I/O error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an error for a record that exists but cannot be read.
    pub fn unreadable(id: impl Into<RecordId>, message: impl Into<String>) -> Self {
        Self::Unreadable {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::Io { retryable: true, .. })
    }
}

/// Outcome of creating a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Id assigned by the adapter.
    pub id: RecordId,
    /// Revision of the stored record.
    pub revision: Revision,
}

/// A store of records on one side of the sync.
pub trait RecordAdapter: Send + Sync {
    /// Side this adapter serves.
    fn side(&self) -> Side;

    /// Lists live (non-archived) records.
    ///
    /// `since` is a hint: adapters may return a superset. `None` lists all.
    fn list_records(&self, since: Option<&Revision>) -> AdapterResult<RecordStream<'_>>;

    /// Overwrites the record with `record.id`. Idempotent by id.
    fn write_record(&self, record: &Record) -> AdapterResult<Revision>;

    /// Stores a new record, assigning its id.
    fn create_record(&self, record: &Record) -> AdapterResult<WriteReceipt>;

    /// Whether [`delete_record`](Self::delete_record) is available.
    fn supports_delete(&self) -> bool {
        false
    }

    /// Permanently deletes a record.
    fn delete_record(&self, _id: &RecordId) -> AdapterResult<()> {
        Err(AdapterError::Unsupported("delete_record"))
    }
}

/// An in-memory adapter for testing.
///
/// Revisions are a counter shared by all records of the adapter. Writes
/// can be made to fail a given number of times per record id.
pub struct MemoryAdapter {
    side: Side,
    records: RwLock<BTreeMap<RecordId, Record>>,
    next_revision: AtomicU64,
    next_id: AtomicU64,
    deletable: bool,
    write_failures: Mutex<HashMap<RecordId, u32>>,
    list_failures: Mutex<u32>,
    unreadable: Mutex<BTreeSet<RecordId>>,
    writes: Mutex<Vec<RecordId>>,
}

impl MemoryAdapter {
    /// Creates an empty adapter for `side`.
    pub fn new(side: Side) -> Self {
        Self {
            side,
            records: RwLock::new(BTreeMap::new()),
            next_revision: AtomicU64::new(1),
            next_id: AtomicU64::new(1),
            deletable: false,
            write_failures: Mutex::new(HashMap::new()),
            list_failures: Mutex::new(0),
            unreadable: Mutex::new(BTreeSet::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Enables hard deletes.
    pub fn with_delete_support(mut self) -> Self {
        self.deletable = true;
        self
    }

    /// Inserts a record as-is, as if changed outside the sync.
    pub fn insert(&self, record: Record) {
        if let Revision::Counter(n) = record.revision {
            self.next_revision.fetch_max(n + 1, Ordering::SeqCst);
        }
        self.records.write().insert(record.id.clone(), record);
    }

    /// Edits a record outside the sync, bumping its revision.
    ///
    /// Returns false if the record does not exist.
    pub fn edit(&self, id: &str, f: impl FnOnce(&mut Record)) -> bool {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(&RecordId::new(id)) else {
            return false;
        };
        f(record);
        record.revision = Revision::Counter(self.bump());
        true
    }

    /// Removes a record outside the sync.
    pub fn remove(&self, id: &str) -> Option<Record> {
        self.records.write().remove(&RecordId::new(id))
    }

    /// Gets a record, including archived ones.
    pub fn get(&self, id: &str) -> Option<Record> {
        self.records.read().get(&RecordId::new(id)).cloned()
    }

    /// All live records.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .read()
            .values()
            .filter(|r| !r.archived)
            .cloned()
            .collect()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.read().values().filter(|r| !r.archived).count()
    }

    /// Returns true if there are no live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes the next `times` writes targeting `id` fail with a retryable error.
    ///
    /// For creations the id is the one carried by the incoming record.
    pub fn fail_writes(&self, id: &str, times: u32) {
        self.write_failures.lock().insert(RecordId::new(id), times);
    }

    /// Makes the next `times` listings fail with a retryable error.
    pub fn fail_listing(&self, times: u32) {
        *self.list_failures.lock() = times;
    }

    /// Makes listings report `id` as unreadable until cleared.
    pub fn set_unreadable(&self, id: &str, unreadable: bool) {
        let mut ids = self.unreadable.lock();
        if unreadable {
            ids.insert(RecordId::new(id));
        } else {
            ids.remove(&RecordId::new(id));
        }
    }

    /// Ids written or created so far, in order.
    pub fn write_log(&self) -> Vec<RecordId> {
        self.writes.lock().clone()
    }

    fn bump(&self) -> u64 {
        self.next_revision.fetch_add(1, Ordering::SeqCst)
    }

    fn check_failure(&self, id: &RecordId) -> AdapterResult<()> {
        let mut failures = self.write_failures.lock();
        if let Some(remaining) = failures.get_mut(id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AdapterError::transient(format!("injected failure for {id}")));
            }
        }
        Ok(())
    }

    fn store(&self, mut record: Record) -> Revision {
        let revision = Revision::Counter(self.bump());
        record.revision = revision.clone();
        record.source = self.side;
        record.modified_at = Some(Utc::now());
        self.writes.lock().push(record.id.clone());
        self.records.write().insert(record.id.clone(), record);
        revision
    }
}

impl RecordAdapter for MemoryAdapter {
    fn side(&self) -> Side {
        self.side
    }

    fn list_records(&self, since: Option<&Revision>) -> AdapterResult<RecordStream<'_>> {
        {
            let mut failures = self.list_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(AdapterError::transient("injected listing failure"));
            }
        }

        let unreadable = self.unreadable.lock().clone();
        let records: Vec<AdapterResult<Record>> = self
            .records
            .read()
            .values()
            .filter(|r| !r.archived)
            .filter(|r| since.map_or(true, |s| r.revision.is_after(s) != Some(false)))
            .map(|r| {
                if unreadable.contains(&r.id) {
                    Err(AdapterError::unreadable(r.id.clone(), "injected read failure"))
                } else {
                    Ok(r.clone())
                }
            })
            .collect();
        Ok(Box::new(records.into_iter()))
    }

    fn write_record(&self, record: &Record) -> AdapterResult<Revision> {
        self.check_failure(&record.id)?;
        if !self.records.read().contains_key(&record.id) {
            return Err(AdapterError::NotFound(record.id.clone()));
        }
        Ok(self.store(record.clone()))
    }

    fn create_record(&self, record: &Record) -> AdapterResult<WriteReceipt> {
        self.check_failure(&record.id)?;
        let id = RecordId::new(format!(
            "{}-{}",
            self.side,
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        let mut record = record.clone();
        record.id = id.clone();
        let revision = self.store(record);
        Ok(WriteReceipt { id, revision })
    }

    fn supports_delete(&self) -> bool {
        self.deletable
    }

    fn delete_record(&self, id: &RecordId) -> AdapterResult<()> {
        if !self.deletable {
            return Err(AdapterError::Unsupported("delete_record"));
        }
        self.check_failure(id)?;
        self.writes.lock().push(id.clone());
        self.records
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AdapterError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parivaha_model::FieldValue;

    fn collect(adapter: &MemoryAdapter, since: Option<&Revision>) -> Vec<Record> {
        adapter
            .list_records(since)
            .unwrap()
            .collect::<AdapterResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn create_assigns_ids_and_revisions() {
        let adapter = MemoryAdapter::new(Side::Notion);
        let draft = Record::new("v1", Side::Notion, Revision::Counter(0));
        let a = adapter.create_record(&draft).unwrap();
        let b = adapter.create_record(&draft).unwrap();
        assert_eq!(a.id.as_str(), "notion-1");
        assert_eq!(b.id.as_str(), "notion-2");
        assert_ne!(a.revision, b.revision);
        assert_eq!(adapter.len(), 2);
    }

    #[test]
    fn write_requires_existing_record() {
        let adapter = MemoryAdapter::new(Side::Vault);
        let record = Record::new("a.md", Side::Vault, Revision::Counter(1));
        assert!(matches!(
            adapter.write_record(&record),
            Err(AdapterError::NotFound(_))
        ));

        adapter.insert(record.clone());
        let rev = adapter.write_record(&record).unwrap();
        assert_eq!(rev, Revision::Counter(2));
    }

    #[test]
    fn edit_bumps_revision_and_since_filters() {
        let adapter = MemoryAdapter::new(Side::Vault);
        adapter.insert(Record::new("a.md", Side::Vault, Revision::Counter(5)));
        adapter.insert(Record::new("b.md", Side::Vault, Revision::Counter(6)));
        assert!(adapter.edit("a.md", |r| r.body = "changed".into()));
        assert!(!adapter.edit("missing.md", |_| {}));

        let changed = collect(&adapter, Some(&Revision::Counter(6)));
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id.as_str(), "a.md");
        assert_eq!(collect(&adapter, None).len(), 2);
    }

    #[test]
    fn archived_records_are_not_listed() {
        let adapter = MemoryAdapter::new(Side::Notion);
        let mut record = Record::new("p1", Side::Notion, Revision::Counter(1))
            .with_field("Name", FieldValue::text("x"));
        adapter.insert(record.clone());
        record.archived = true;
        adapter.write_record(&record).unwrap();
        assert!(collect(&adapter, None).is_empty());
        assert!(adapter.get("p1").unwrap().archived);
    }

    #[test]
    fn injected_failures_are_transient() {
        let adapter = MemoryAdapter::new(Side::Notion);
        adapter.insert(Record::new("p1", Side::Notion, Revision::Counter(1)));
        adapter.fail_writes("p1", 1);

        let record = adapter.get("p1").unwrap();
        let err = adapter.write_record(&record).unwrap_err();
        assert!(err.is_retryable());
        assert!(adapter.write_record(&record).is_ok());

        adapter.fail_listing(1);
        assert!(adapter.list_records(None).is_err());
        assert!(adapter.list_records(None).is_ok());
    }

    #[test]
    fn unreadable_records_surface_in_listing() {
        let adapter = MemoryAdapter::new(Side::Vault);
        adapter.insert(Record::new("a.md", Side::Vault, Revision::Counter(1)));
        adapter.insert(Record::new("b.md", Side::Vault, Revision::Counter(1)));
        adapter.set_unreadable("a.md", true);

        let items: Vec<AdapterResult<Record>> = adapter.list_records(None).unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(matches!(
            &items[0],
            Err(AdapterError::Unreadable { id, .. }) if id.as_str() == "a.md"
        ));
        assert!(!items[0].as_ref().unwrap_err().is_retryable());
        assert_eq!(items[1].as_ref().unwrap().id, RecordId::new("b.md"));
    }

    #[test]
    fn delete_is_optional() {
        let plain = MemoryAdapter::new(Side::Vault);
        assert!(!plain.supports_delete());
        assert!(matches!(
            plain.delete_record(&RecordId::new("a")),
            Err(AdapterError::Unsupported(_))
        ));

        let deletable = MemoryAdapter::new(Side::Vault).with_delete_support();
        deletable.insert(Record::new("a", Side::Vault, Revision::Counter(1)));
        deletable.delete_record(&RecordId::new("a")).unwrap();
        assert!(deletable.is_empty());
    }
}
