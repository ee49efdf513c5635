//! Conflict resolution.
//!
//! A conflict starts as [`ConflictState::Detected`](parivaha_model::ConflictState)
//! and ends either auto-resolved or deferred to the pending queue. A deferred
//! conflict is never partially applied.

use crate::config::ConflictPolicy;
use crate::error::{SyncError, SyncResult};
use crate::mapping::MappingEngine;
use parivaha_model::{body_hash, ConflictRecord, FieldValue, Fields, Record, Side, SyncPair};
use std::collections::BTreeMap;

/// Per-field outcome of a field-level merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    /// Notion field name to the side whose value is taken.
    pub fields: BTreeMap<String, Side>,
    /// Side whose body is taken, if the bodies differ.
    pub body: Option<Side>,
}

impl MergePlan {
    /// Returns true if anything is taken from `side`.
    pub fn takes_from(&self, side: Side) -> bool {
        self.body == Some(side) || self.fields.values().any(|s| *s == side)
    }

    /// Side whose value is taken for `notion_field`, if any.
    pub fn source_of(&self, notion_field: &str) -> Option<Side> {
        self.fields.get(notion_field).copied()
    }
}

/// Outcome of resolving one conflicting pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Both sides already hold the same synced content.
    Converged,
    /// One side overwrites the other.
    Winner(Side),
    /// One-sided field changes are exchanged in both directions.
    Merged(MergePlan),
    /// Held for the user.
    Deferred(ConflictRecord),
}

/// Decides the outcome of pairs changed on both sides.
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
    tie_breaker: Side,
}

impl ConflictResolver {
    /// Creates a resolver.
    pub fn new(policy: ConflictPolicy, tie_breaker: Side) -> Self {
        Self {
            policy,
            tie_breaker,
        }
    }

    /// The configured policy.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Resolves a conflict between the current records of `pair`.
    ///
    /// A missing record means that side was deleted. Deletions against a
    /// modification are only resolved by an explicit user resolution.
    pub fn resolve(
        &self,
        mapping: &MappingEngine,
        pair: &SyncPair,
        notion: Option<&Record>,
        vault: Option<&Record>,
    ) -> SyncResult<Resolution> {
        let mut conflict = ConflictRecord::new(pair.key.clone(), notion.cloned(), vault.cloned());

        let (Some(n), Some(v)) = (notion, vault) else {
            if let Some(winner) = pair.resolution {
                return Ok(Resolution::Winner(winner));
            }
            let deleted = if notion.is_none() { Side::Notion } else { Side::Vault };
            conflict.defer(format!(
                "deleted in {deleted}, modified in {}",
                deleted.opposite()
            ));
            return Ok(Resolution::Deferred(conflict));
        };

        let notion_fields = mapping.canonical(n)?;
        let vault_fields = mapping.canonical(v)?;
        let bodies_agree = !mapping.syncs_body() || n.body == v.body;
        if notion_fields == vault_fields && bodies_agree {
            return Ok(Resolution::Converged);
        }

        if let Some(winner) = pair.resolution {
            return Ok(Resolution::Winner(winner));
        }

        let outcome = match self.policy {
            ConflictPolicy::Manual => Err(SyncError::ConflictUnresolvable {
                key: pair.key.clone(),
                reason: "manual conflict policy".into(),
            }),
            ConflictPolicy::LastWriteWins => self.last_write_wins(pair, n, v).map(Resolution::Winner),
            ConflictPolicy::FieldMerge => {
                let (plan, clashes) =
                    field_merge(mapping, pair, (&notion_fields, n), (&vault_fields, v));
                if clashes.is_empty() {
                    Ok(Resolution::Merged(plan))
                } else {
                    conflict.conflicting_fields = clashes;
                    self.last_write_wins(pair, n, v).map(Resolution::Winner)
                }
            }
        };

        match outcome {
            Ok(resolution) => Ok(resolution),
            Err(SyncError::ConflictUnresolvable { reason, .. }) => {
                conflict.defer(reason);
                Ok(Resolution::Deferred(conflict))
            }
            Err(e) => Err(e),
        }
    }

    fn last_write_wins(&self, pair: &SyncPair, notion: &Record, vault: &Record) -> SyncResult<Side> {
        match (notion.modified_at, vault.modified_at) {
            (Some(n), Some(v)) if n > v => Ok(Side::Notion),
            (Some(n), Some(v)) if v > n => Ok(Side::Vault),
            (Some(_), Some(_)) => Ok(self.tie_breaker),
            _ => Err(SyncError::ConflictUnresolvable {
                key: pair.key.clone(),
                reason: "change timestamp missing on one side".into(),
            }),
        }
    }
}

/// Splits a two-sided change into per-field sources and true clashes.
fn field_merge(
    mapping: &MappingEngine,
    pair: &SyncPair,
    (notion_fields, notion): (&Fields, &Record),
    (vault_fields, vault): (&Fields, &Record),
) -> (MergePlan, Vec<String>) {
    let mut plan = MergePlan::default();
    let mut clashes = Vec::new();

    for rule in mapping.bidirectional_rules() {
        let name = &rule.notion_field;
        let base = pair.base_fields.get(name);
        let n = notion_fields.get(name);
        let v = vault_fields.get(name);
        match pick(base, n, v) {
            Pick::Same => {}
            Pick::From(side) => {
                plan.fields.insert(name.clone(), side);
            }
            Pick::Clash => clashes.push(name.clone()),
        }
    }

    if mapping.syncs_body() && notion.body != vault.body {
        let notion_changed = body_hash(&notion.body) != pair.base_body_hash;
        let vault_changed = body_hash(&vault.body) != pair.base_body_hash;
        match (notion_changed, vault_changed) {
            (true, false) => plan.body = Some(Side::Notion),
            (false, true) => plan.body = Some(Side::Vault),
            _ => clashes.push("body".into()),
        }
    }

    (plan, clashes)
}

enum Pick {
    Same,
    From(Side),
    Clash,
}

fn pick(base: Option<&FieldValue>, notion: Option<&FieldValue>, vault: Option<&FieldValue>) -> Pick {
    if notion == vault {
        return Pick::Same;
    }
    match (notion != base, vault != base) {
        (true, false) => Pick::From(Side::Notion),
        (false, true) => Pick::From(Side::Vault),
        _ => Pick::Clash,
    }
}
