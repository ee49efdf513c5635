//! The sync orchestrator.
//!
//! One pass runs in three phases:
//! 1. Load the snapshot and list both stores. A listing failure aborts
//!    the pass; records reported unreadable are set aside.
//! 2. Plan: classify every pair and unpaired record, resolve conflicts.
//! 3. Execute the plan in chunks of `concurrency_limit` records, committing
//!    results to a working snapshot in plan order, then persist it once.
//!
//! Per-record failures never abort the pass; they are reported in the
//! [`PassSummary`].

use crate::adapter::{AdapterError, AdapterResult, RecordAdapter};
use crate::config::SyncConfig;
use crate::detect::{detect, Change};
use crate::error::{SyncError, SyncResult};
use crate::mapping::MappingEngine;
use crate::resolve::{ConflictResolver, MergePlan, Resolution};
use crate::store::SnapshotStore;
use chrono::Utc;
use parivaha_model::{
    ConflictRecord, PairKey, Record, RecordId, Revision, Side, Snapshot, SyncPair,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A record on one side, as reported in pass summaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    /// Store holding the record.
    pub side: Side,
    /// Record id within that store.
    pub id: RecordId,
}

impl RecordRef {
    /// Creates a reference.
    pub fn new(side: Side, id: impl Into<RecordId>) -> Self {
        Self {
            side,
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.side, self.id)
    }
}

/// A record that could not be synced this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// The record whose action failed.
    pub record: RecordRef,
    /// Error message.
    pub error: String,
}

/// Result of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    /// Pairs created, updated or removed.
    pub applied: Vec<PairKey>,
    /// Pairs whose conflict was deferred.
    pub deferred: Vec<PairKey>,
    /// Records whose action failed.
    pub errored: Vec<RecordFailure>,
    /// Records whose action was not allowed by the sync direction.
    pub skipped: Vec<RecordRef>,
    /// Number of pairs with no changes.
    pub unchanged: usize,
    /// Whether the pass was cancelled before finishing.
    pub cancelled: bool,
    /// Duration of the pass.
    pub duration: Duration,
}

impl PassSummary {
    /// Returns true if nothing was deferred or errored.
    pub fn is_clean(&self) -> bool {
        self.deferred.is_empty() && self.errored.is_empty()
    }
}

/// Statistics accumulated over the lifetime of an engine.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Passes that ran to completion.
    pub passes_completed: u64,
    /// Passes stopped by [`SyncEngine::cancel`].
    pub passes_cancelled: u64,
    /// Records applied.
    pub records_applied: u64,
    /// Conflicts resolved automatically or by the user.
    pub conflicts_resolved: u64,
    /// Conflicts deferred.
    pub conflicts_deferred: u64,
    /// Records that failed.
    pub records_errored: u64,
    /// Adapter calls retried.
    pub retries: u64,
    /// End of the last pass.
    pub last_pass_time: Option<Instant>,
    /// Last fatal error message.
    pub last_error: Option<String>,
}

/// Cancels passes of the engine it was taken from.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests cancellation of the running (or next) pass.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One unit of work, planned sequentially and executed possibly in parallel.
#[derive(Debug)]
enum Task {
    /// Unpaired record: create its counterpart, replacing a stale pair.
    Create {
        source: Side,
        record: Record,
        replaces: Option<PairKey>,
    },
    /// One side wins: overwrite the counterpart.
    Propagate {
        key: PairKey,
        source: Side,
        record: Record,
        counterpart: Record,
    },
    /// Exchange one-sided field changes.
    Merge {
        key: PairKey,
        plan: MergePlan,
        notion: Record,
        vault: Record,
    },
    /// Both sides agree; only the pair moves.
    Converge {
        key: PairKey,
        notion: Record,
        vault: Record,
    },
    /// Propagate a deletion to the surviving record.
    Delete {
        key: PairKey,
        deleted: Side,
        survivor: Record,
    },
    /// Both records are gone.
    Forget { key: PairKey },
}

impl Task {
    fn writes_to(&self, side: Side) -> bool {
        match self {
            Task::Create { source, .. } | Task::Propagate { source, .. } => {
                side == source.opposite()
            }
            Task::Merge { plan, .. } => plan.takes_from(side.opposite()),
            Task::Delete { deleted, .. } => side == deleted.opposite(),
            Task::Converge { .. } | Task::Forget { .. } => false,
        }
    }

    fn key(&self) -> Option<&PairKey> {
        match self {
            Task::Create { replaces, .. } => replaces.as_ref(),
            Task::Propagate { key, .. }
            | Task::Merge { key, .. }
            | Task::Converge { key, .. }
            | Task::Delete { key, .. }
            | Task::Forget { key } => Some(key),
        }
    }

    fn subject(&self) -> RecordRef {
        match self {
            Task::Create { source, record, .. } | Task::Propagate { source, record, .. } => {
                RecordRef::new(*source, record.id.clone())
            }
            Task::Delete { key, deleted, .. } => RecordRef::new(*deleted, key.id(*deleted).clone()),
            Task::Merge { key, .. } | Task::Converge { key, .. } | Task::Forget { key } => {
                RecordRef::new(Side::Notion, key.notion_id.clone())
            }
        }
    }
}

/// Live records of one side, plus those that exist but failed to read.
#[derive(Default)]
struct Listing {
    records: BTreeMap<RecordId, Record>,
    unreadable: BTreeMap<RecordId, String>,
}

/// Effect of a successfully executed task on the snapshot.
enum Applied {
    Pair(SyncPair),
    Removed(PairKey),
}

/// Output of the planning phase.
#[derive(Default)]
struct Plan {
    tasks: Vec<Task>,
    deferred: Vec<ConflictRecord>,
    errored: Vec<RecordFailure>,
    skipped: Vec<RecordRef>,
    touched: BTreeSet<PairKey>,
    unchanged: usize,
    resolved: u64,
}

/// Synchronizes a Notion store with a vault store.
///
/// Generic over the Notion adapter `N`, the vault adapter `V` and the
/// snapshot store `S`. Only one pass runs at a time per engine; a second
/// concurrent call fails with [`SyncError::PassInProgress`].
pub struct SyncEngine<N: RecordAdapter, V: RecordAdapter, S: SnapshotStore> {
    config: SyncConfig,
    mapping: MappingEngine,
    resolver: ConflictResolver,
    notion: N,
    vault: V,
    store: S,
    pass_lock: Mutex<()>,
    stats: RwLock<SyncStats>,
    cancelled: Arc<AtomicBool>,
}

impl<N: RecordAdapter, V: RecordAdapter, S: SnapshotStore> SyncEngine<N, V, S> {
    /// Creates an engine, validating the configuration and adapter sides.
    pub fn new(config: SyncConfig, notion: N, vault: V, store: S) -> SyncResult<Self> {
        config.validate()?;
        if notion.side() != Side::Notion || vault.side() != Side::Vault {
            return Err(SyncError::Config(format!(
                "adapters serve {} and {}, expected notion and vault",
                notion.side(),
                vault.side()
            )));
        }
        let mapping = MappingEngine::new(config.field_mapping.clone())?;
        let resolver = ConflictResolver::new(config.conflict_policy, config.tie_breaker);
        Ok(Self {
            config,
            mapping,
            resolver,
            notion,
            vault,
            store,
            pass_lock: Mutex::new(()),
            stats: RwLock::new(SyncStats::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The Notion adapter.
    pub fn notion(&self) -> &N {
        &self.notion
    }

    /// The vault adapter.
    pub fn vault(&self) -> &V {
        &self.vault
    }

    /// The snapshot store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Cancels the running pass between record chunks.
    ///
    /// If no pass is running, the next pass stops before applying anything.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns a handle that cancels passes from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    /// Loads the committed snapshot.
    pub fn snapshot(&self) -> SyncResult<Snapshot> {
        self.store.load()
    }

    /// Deferred conflicts from the last pass.
    pub fn pending(&self) -> SyncResult<Vec<ConflictRecord>> {
        Ok(self.store.load()?.pending().to_vec())
    }

    /// Records the user's choice of winner for the pair containing `id`.
    ///
    /// The choice is applied by the next pass.
    pub fn resolve(&self, side: Side, id: &RecordId, winner: Side) -> SyncResult<PairKey> {
        let _guard = self.pass_lock.try_lock().ok_or(SyncError::PassInProgress)?;
        let mut snapshot = self.store.load()?;
        let key = snapshot
            .set_resolution(side, id, winner)
            .ok_or_else(|| SyncError::NotPaired(RecordRef::new(side, id.clone()).to_string()))?;
        self.store.commit(&snapshot)?;
        info!(pair = %key, %winner, "conflict resolution recorded");
        Ok(key)
    }

    /// Runs one sync pass.
    pub fn sync(&self) -> SyncResult<PassSummary> {
        let _guard = self.pass_lock.try_lock().ok_or(SyncError::PassInProgress)?;
        let start = Instant::now();

        let result = self.run_pass(start);
        self.cancelled.store(false, Ordering::SeqCst);

        let mut stats = self.stats.write();
        stats.last_pass_time = Some(Instant::now());
        match &result {
            Ok(summary) => {
                if summary.cancelled {
                    stats.passes_cancelled += 1;
                } else {
                    stats.passes_completed += 1;
                }
                stats.records_applied += summary.applied.len() as u64;
                stats.conflicts_deferred += summary.deferred.len() as u64;
                stats.records_errored += summary.errored.len() as u64;
                stats.last_error = None;
            }
            Err(e) => {
                warn!(error = %e, "sync pass aborted");
                stats.last_error = Some(e.to_string());
            }
        }
        result
    }

    fn run_pass(&self, start: Instant) -> SyncResult<PassSummary> {
        let previous = self.store.load()?;
        let notion = self.list(Side::Notion)?;
        let vault = self.list(Side::Vault)?;

        let plan = self.plan(&previous, notion, vault);
        self.stats.write().conflicts_resolved += plan.resolved;

        let mut working = previous.clone();
        let mut summary = PassSummary {
            errored: plan.errored,
            skipped: plan.skipped,
            unchanged: plan.unchanged,
            ..PassSummary::default()
        };
        let mut touched = plan.touched;

        let limit = self.config.concurrency_limit.max(1);
        for chunk in plan.tasks.chunks(limit) {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("sync pass cancelled");
                summary.cancelled = true;
                break;
            }

            let results = self.execute_chunk(chunk);
            for (task, result) in chunk.iter().zip(results) {
                match result {
                    Ok(Applied::Pair(pair)) => {
                        debug!(pair = %pair.key, "applied");
                        if let Some(old) = task.key() {
                            touched.insert(old.clone());
                            if *old != pair.key {
                                working.remove(old);
                            }
                        }
                        touched.insert(pair.key.clone());
                        summary.applied.push(pair.key.clone());
                        working.upsert(pair);
                    }
                    Ok(Applied::Removed(key)) => {
                        debug!(pair = %key, "removed");
                        working.remove(&key);
                        touched.insert(key.clone());
                        summary.applied.push(key);
                    }
                    Err(e) => {
                        let record = task.subject();
                        warn!(%record, error = %e, "record failed");
                        summary.errored.push(RecordFailure {
                            record,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        let mut pending: Vec<ConflictRecord> = previous
            .pending()
            .iter()
            .filter(|c| !touched.contains(&c.key))
            .cloned()
            .collect();
        for conflict in plan.deferred {
            summary.deferred.push(conflict.key.clone());
            pending.push(conflict);
        }
        working.set_pending(pending);

        self.store.commit(&working)?;

        summary.duration = start.elapsed();
        info!(
            applied = summary.applied.len(),
            deferred = summary.deferred.len(),
            errored = summary.errored.len(),
            skipped = summary.skipped.len(),
            unchanged = summary.unchanged,
            cancelled = summary.cancelled,
            duration_ms = summary.duration.as_millis() as u64,
            "sync pass finished"
        );
        Ok(summary)
    }

    fn adapter(&self, side: Side) -> &dyn RecordAdapter {
        match side {
            Side::Notion => &self.notion,
            Side::Vault => &self.vault,
        }
    }

    /// Lists all live records of `side`, retrying the whole listing.
    ///
    /// Records reported as unreadable do not fail the listing.
    fn list(&self, side: Side) -> SyncResult<Listing> {
        let listing = self.with_retry(format!("listing {side}"), || {
            let mut listing = Listing::default();
            for item in self.adapter(side).list_records(None)? {
                match item {
                    Ok(record) => {
                        listing.records.insert(record.id.clone(), record);
                    }
                    Err(AdapterError::Unreadable { id, message }) => {
                        listing.unreadable.insert(id, message);
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(listing)
        })?;
        debug!(
            %side,
            count = listing.records.len(),
            unreadable = listing.unreadable.len(),
            "listed records"
        );
        Ok(listing)
    }

    /// Runs `op`, retrying retryable adapter errors with backoff.
    fn with_retry<T>(
        &self,
        what: impl fmt::Display,
        mut op: impl FnMut() -> AdapterResult<T>,
    ) -> AdapterResult<T> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(%what, attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying");
                    self.stats.write().retries += 1;
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn plan(
        &self,
        snapshot: &Snapshot,
        mut notion: Listing,
        mut vault: Listing,
    ) -> Plan {
        let mut plan = Plan::default();

        for pair in snapshot.pairs() {
            let n = notion.records.remove(&pair.key.notion_id);
            let v = vault.records.remove(&pair.key.vault_id);

            // A record that exists but cannot be read is not a deletion.
            let unreadable = [(Side::Notion, &notion), (Side::Vault, &vault)]
                .into_iter()
                .find_map(|(side, listing)| {
                    let id = pair.key.id(side);
                    listing.unreadable.get(id).map(|message| (RecordRef::new(side, id.clone()), message))
                });
            if let Some((record, message)) = unreadable {
                warn!(%record, error = %message, "paired record unreadable; pair left as is");
                plan.errored.push(RecordFailure {
                    record,
                    error: message.clone(),
                });
                continue;
            }

            let change = detect(Some(pair), n.as_ref(), v.as_ref());
            debug!(pair = %pair.key, ?change, "classified");

            let task = match change {
                Change::Unchanged => {
                    plan.unchanged += 1;
                    continue;
                }
                Change::Vanished => Task::Forget {
                    key: pair.key.clone(),
                },
                Change::ChangedLocal | Change::ChangedRemote => {
                    let (Some(n), Some(v), Some(source)) = (n, v, change.source()) else {
                        continue;
                    };
                    let (record, counterpart) = match source {
                        Side::Notion => (n, v),
                        Side::Vault => (v, n),
                    };
                    Task::Propagate {
                        key: pair.key.clone(),
                        source,
                        record,
                        counterpart,
                    }
                }
                Change::DeletedLocal {
                    remote_changed: false,
                } => match v {
                    Some(survivor) => Task::Delete {
                        key: pair.key.clone(),
                        deleted: Side::Notion,
                        survivor,
                    },
                    None => continue,
                },
                Change::DeletedRemote {
                    local_changed: false,
                } => match n {
                    Some(survivor) => Task::Delete {
                        key: pair.key.clone(),
                        deleted: Side::Vault,
                        survivor,
                    },
                    None => continue,
                },
                _ => match self.resolver.resolve(&self.mapping, pair, n.as_ref(), v.as_ref()) {
                    Ok(Resolution::Deferred(conflict)) => {
                        warn!(
                            pair = %pair.key,
                            reason = conflict.reason.as_deref().unwrap_or(""),
                            "conflict deferred"
                        );
                        plan.touched.insert(pair.key.clone());
                        plan.deferred.push(conflict);
                        continue;
                    }
                    Ok(resolution) => {
                        plan.resolved += 1;
                        match resolved_task(pair, resolution, n, v) {
                            Some(task) => task,
                            None => continue,
                        }
                    }
                    Err(e) => {
                        let record = RecordRef::new(Side::Notion, pair.key.notion_id.clone());
                        warn!(%record, error = %e, "conflict resolution failed");
                        plan.errored.push(RecordFailure {
                            record,
                            error: e.to_string(),
                        });
                        continue;
                    }
                },
            };
            self.schedule(&mut plan, task);
        }

        for (source, listing) in [(Side::Notion, notion), (Side::Vault, vault)] {
            for (id, message) in &listing.unreadable {
                if snapshot.pair_for(source, id).is_none() {
                    warn!(record = %RecordRef::new(source, id.clone()), error = %message, "skipping unreadable record");
                }
            }
            for record in listing.records.into_values() {
                self.schedule(
                    &mut plan,
                    Task::Create {
                        source,
                        record,
                        replaces: None,
                    },
                );
            }
        }
        plan
    }

    fn schedule(&self, plan: &mut Plan, task: Task) {
        let direction = self.config.direction;
        let allowed = Side::BOTH
            .iter()
            .all(|side| !task.writes_to(*side) || direction.writes_to(*side));
        if allowed {
            plan.tasks.push(task);
        } else {
            let record = task.subject();
            debug!(%record, ?direction, "skipped by sync direction");
            plan.skipped.push(record);
        }
    }

    fn execute_chunk(&self, chunk: &[Task]) -> Vec<SyncResult<Applied>> {
        if chunk.len() == 1 {
            return chunk.iter().map(|task| self.execute(task)).collect();
        }
        std::thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|task| scope.spawn(move || self.execute(task)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(AdapterError::fatal("sync worker panicked").into())
                    })
                })
                .collect()
        })
    }

    fn execute(&self, task: &Task) -> SyncResult<Applied> {
        match task {
            Task::Create { source, record, .. } => {
                let target = source.opposite();
                let mapped = self.mapping.map(record, target)?;
                let receipt = self.with_retry(RecordRef::new(target, record.id.clone()), || {
                    self.adapter(target).create_record(&mapped)
                })?;
                let (key, notion_rev, vault_rev) = match source {
                    Side::Notion => (
                        PairKey::new(record.id.clone(), receipt.id),
                        record.revision.clone(),
                        receipt.revision,
                    ),
                    Side::Vault => (
                        PairKey::new(receipt.id, record.id.clone()),
                        receipt.revision,
                        record.revision.clone(),
                    ),
                };
                Ok(Applied::Pair(self.settle(key, notion_rev, vault_rev, record)?))
            }

            Task::Propagate {
                key,
                source,
                record,
                counterpart,
            } => {
                let target = source.opposite();
                let mapped = self.mapping.map(record, target)?;
                let merged = self.mapping.overlay(&mapped, Some(counterpart));
                let written = self.with_retry(RecordRef::new(target, merged.id.clone()), || {
                    self.adapter(target).write_record(&merged)
                })?;
                let (notion_rev, vault_rev) = match source {
                    Side::Notion => (record.revision.clone(), written),
                    Side::Vault => (written, record.revision.clone()),
                };
                Ok(Applied::Pair(self.settle(key.clone(), notion_rev, vault_rev, record)?))
            }

            Task::Merge {
                key,
                plan,
                notion,
                vault,
            } => {
                let mut finals = [notion.clone(), vault.clone()];
                for (slot, target) in Side::BOTH.into_iter().enumerate() {
                    let from = target.opposite();
                    if !plan.takes_from(from) {
                        continue;
                    }
                    let (current, other) = match target {
                        Side::Notion => (notion, vault),
                        Side::Vault => (vault, notion),
                    };
                    let mapped = self.mapping.map(other, target)?;
                    let mut merged = self.mapping.overlay_selected(
                        &mapped,
                        Some(current),
                        |rule| plan.source_of(&rule.notion_field) == Some(from),
                        plan.body == Some(from),
                    );
                    merged.revision = self.with_retry(RecordRef::new(target, merged.id.clone()), || {
                        self.adapter(target).write_record(&merged)
                    })?;
                    finals[slot] = merged;
                }
                let [notion_final, vault_final] = finals;
                Ok(Applied::Pair(self.settle(
                    key.clone(),
                    notion_final.revision.clone(),
                    vault_final.revision,
                    &notion_final,
                )?))
            }

            Task::Converge { key, notion, vault } => Ok(Applied::Pair(self.settle(
                key.clone(),
                notion.revision.clone(),
                vault.revision.clone(),
                notion,
            )?)),

            Task::Delete {
                key,
                deleted,
                survivor,
            } => {
                let target = deleted.opposite();
                let adapter = self.adapter(target);
                let subject = RecordRef::new(target, survivor.id.clone());
                if adapter.supports_delete() {
                    self.with_retry(&subject, || adapter.delete_record(&survivor.id))?;
                } else {
                    let mut archived = survivor.clone();
                    archived.archived = true;
                    self.with_retry(&subject, || adapter.write_record(&archived))?;
                }
                debug!(record = %subject, "deletion propagated");
                Ok(Applied::Removed(key.clone()))
            }

            Task::Forget { key } => Ok(Applied::Removed(key.clone())),
        }
    }

    /// Builds the committed pair, capturing `base` as the merge base.
    fn settle(
        &self,
        key: PairKey,
        notion_revision: Revision,
        vault_revision: Revision,
        base: &Record,
    ) -> SyncResult<SyncPair> {
        let fields = self.mapping.canonical(base)?;
        Ok(SyncPair::new(key, notion_revision, vault_revision, Utc::now()).with_base(fields, &base.body))
    }
}

/// Turns a non-deferred resolution into a task.
fn resolved_task(
    pair: &SyncPair,
    resolution: Resolution,
    notion: Option<Record>,
    vault: Option<Record>,
) -> Option<Task> {
    let key = pair.key.clone();
    match (resolution, notion, vault) {
        (Resolution::Converged, Some(notion), Some(vault)) => Some(Task::Converge { key, notion, vault }),
        (Resolution::Merged(plan), Some(notion), Some(vault)) => Some(Task::Merge {
            key,
            plan,
            notion,
            vault,
        }),
        (Resolution::Winner(winner), Some(notion), Some(vault)) => {
            let (record, counterpart) = match winner {
                Side::Notion => (notion, vault),
                Side::Vault => (vault, notion),
            };
            Some(Task::Propagate {
                key,
                source: winner,
                record,
                counterpart,
            })
        }
        // One side is gone: the winner decides between deleting and restoring.
        (Resolution::Winner(winner), notion, vault) => {
            let (deleted, survivor) = match (notion, vault) {
                (None, Some(v)) => (Side::Notion, v),
                (Some(n), None) => (Side::Vault, n),
                _ => return None,
            };
            if winner == deleted {
                Some(Task::Delete {
                    key,
                    deleted,
                    survivor,
                })
            } else {
                Some(Task::Create {
                    source: survivor.source,
                    record: survivor,
                    replaces: Some(key),
                })
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::config::ConflictPolicy;
    use crate::mapping::{FieldMapping, FieldRule};
    use crate::store::MemorySnapshotStore;
    use parivaha_model::{FieldKind, FieldValue};

    type Engine = SyncEngine<MemoryAdapter, MemoryAdapter, MemorySnapshotStore>;

    fn engine(config: SyncConfig) -> Engine {
        SyncEngine::new(
            config,
            MemoryAdapter::new(Side::Notion),
            MemoryAdapter::new(Side::Vault),
            MemorySnapshotStore::new(),
        )
        .unwrap()
    }

    fn config() -> SyncConfig {
        SyncConfig::new(FieldMapping::new(vec![FieldRule::new(
            "Name",
            FieldKind::Text,
            "title",
        )]))
    }

    #[test]
    fn adapters_must_match_sides() {
        let result = SyncEngine::new(
            config(),
            MemoryAdapter::new(Side::Vault),
            MemoryAdapter::new(Side::Vault),
            MemorySnapshotStore::new(),
        );
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn new_notion_record_is_created_in_vault() {
        let engine = engine(config());
        engine.notion().insert(
            Record::new("page-1", Side::Notion, Revision::Counter(1))
                .with_field("Name", FieldValue::text("Inbox")),
        );

        let summary = engine.sync().unwrap();
        assert_eq!(summary.applied, vec![PairKey::new("page-1", "vault-1")]);
        assert_eq!(
            engine.vault().get("vault-1").unwrap().field("title"),
            Some(&FieldValue::text("Inbox"))
        );
        assert_eq!(engine.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn resolve_requires_existing_pair() {
        let engine = engine(config());
        assert!(matches!(
            engine.resolve(Side::Vault, &RecordId::new("nope.md"), Side::Vault),
            Err(SyncError::NotPaired(_))
        ));
    }

    #[test]
    fn cancel_before_pass_applies_nothing() {
        let engine = engine(config().with_conflict_policy(ConflictPolicy::Manual));
        engine
            .notion()
            .insert(Record::new("page-1", Side::Notion, Revision::Counter(1)));
        engine.cancel();

        let summary = engine.sync().unwrap();
        assert!(summary.cancelled);
        assert!(summary.applied.is_empty());
        assert!(engine.vault().is_empty());

        // The flag is consumed by the cancelled pass.
        let summary = engine.sync().unwrap();
        assert!(!summary.cancelled);
        assert_eq!(summary.applied.len(), 1);
        assert_eq!(engine.stats().passes_cancelled, 1);
        assert_eq!(engine.stats().passes_completed, 1);
    }

    #[test]
    fn record_ref_display() {
        assert_eq!(RecordRef::new(Side::Vault, "a.md").to_string(), "vault:a.md");
    }
}
