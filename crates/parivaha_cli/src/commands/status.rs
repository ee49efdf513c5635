//! Status command implementation.

use super::{open_store, state_dir, CliResult};
use crate::config::{self, AppConfig, VaultConfig};
use parivaha_model::{ConflictRecord, Side, Snapshot};
use parivaha_sync_engine::SnapshotStore;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// Sync state of one vault.
#[derive(Debug, Serialize)]
pub struct VaultStatus {
    /// Vault name.
    pub vault: String,
    /// Vault directory.
    pub path: String,
    /// Whether a pass has ever completed.
    pub synced: bool,
    /// Linked record pairs.
    pub pairs: usize,
    /// Pairs with a winner recorded for the next pass.
    pub resolutions: Vec<Resolution>,
    /// Conflicts waiting for a decision.
    pub conflicts: Vec<Conflict>,
}

/// A recorded manual resolution.
#[derive(Debug, Serialize)]
pub struct Resolution {
    /// Notion page id.
    pub notion_id: String,
    /// Vault note path.
    pub vault_id: String,
    /// Side that will win.
    pub keep: Side,
}

/// A deferred conflict.
#[derive(Debug, Serialize)]
pub struct Conflict {
    /// Notion page id.
    pub notion_id: String,
    /// Vault note path.
    pub vault_id: String,
    /// Fields edited differently on both sides.
    pub fields: Vec<String>,
    /// Why it was not resolved automatically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&ConflictRecord> for Conflict {
    fn from(record: &ConflictRecord) -> Self {
        Self {
            notion_id: record.key.notion_id.to_string(),
            vault_id: record.key.vault_id.to_string(),
            fields: record.conflicting_fields.clone(),
            reason: record.reason.clone(),
        }
    }
}

impl VaultStatus {
    fn from_snapshot(vault: &VaultConfig, snapshot: Option<&Snapshot>) -> Self {
        let mut status = Self {
            vault: vault.name.clone(),
            path: vault.root().display().to_string(),
            synced: snapshot.is_some(),
            pairs: 0,
            resolutions: Vec::new(),
            conflicts: Vec::new(),
        };
        if let Some(snapshot) = snapshot {
            status.pairs = snapshot.len();
            status.resolutions = snapshot
                .pairs()
                .filter_map(|p| {
                    p.resolution.map(|keep| Resolution {
                        notion_id: p.key.notion_id.to_string(),
                        vault_id: p.key.vault_id.to_string(),
                        keep,
                    })
                })
                .collect();
            status.conflicts = snapshot.pending().iter().map(Conflict::from).collect();
        }
        status
    }

    fn render(&self) -> String {
        let mut out = format!("{} ({})\n", self.vault, self.path);
        if !self.synced {
            out.push_str("  never synced\n");
            return out;
        }
        let _ = writeln!(out, "  {} linked pairs", self.pairs);
        for r in &self.resolutions {
            let _ = writeln!(out, "  resolved: {} <-> {}, keeping {}", r.notion_id, r.vault_id, r.keep);
        }
        if self.conflicts.is_empty() {
            out.push_str("  no pending conflicts\n");
        }
        for c in &self.conflicts {
            let _ = write!(out, "  conflict: {} <-> {}", c.notion_id, c.vault_id);
            if !c.fields.is_empty() {
                let _ = write!(out, " [{}]", c.fields.join(", "));
            }
            if let Some(reason) = &c.reason {
                let _ = write!(out, ": {reason}");
            }
            out.push('\n');
        }
        out
    }
}

/// Reads the snapshot of a vault, if it has one.
pub fn vault_status(vault: &VaultConfig) -> CliResult<VaultStatus> {
    if !state_dir(vault).is_dir() {
        return Ok(VaultStatus::from_snapshot(vault, None));
    }
    let snapshot = open_store(vault)?.load()?;
    Ok(VaultStatus::from_snapshot(vault, Some(&snapshot)))
}

/// Runs the status command.
pub fn run(config_dir: &Path, vault: Option<&str>, format: &str) -> CliResult {
    let app = AppConfig::load(&config_dir.join(config::SYNC_FILE))?;
    let statuses = app
        .select(vault)?
        .into_iter()
        .map(vault_status)
        .collect::<CliResult<Vec<_>>>()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&statuses)?),
        "text" => {
            for status in &statuses {
                print!("{}", status.render());
            }
        }
        other => return Err(format!("unknown format {other:?}; use text or json").into()),
    }
    Ok(())
}
