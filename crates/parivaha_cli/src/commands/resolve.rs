//! Resolve command implementation.

use super::{open_store, CliResult};
use crate::config::{self, AppConfig, VaultConfig};
use parivaha_model::{PairKey, RecordId, Side};
use parivaha_sync_engine::SnapshotStore;
use std::path::Path;
use tracing::info;

/// Records which side wins for the pair containing `id`.
///
/// `side` names the store `id` belongs to; when absent the Notion side is
/// tried first. The choice is applied by the next sync.
pub fn record_resolution(
    vault: &VaultConfig,
    side: Option<Side>,
    id: &str,
    keep: Side,
) -> CliResult<PairKey> {
    let store = open_store(vault)?;
    let mut snapshot = store.load()?;
    let id = RecordId::new(id);
    let sides = match side {
        Some(side) => vec![side],
        None => vec![Side::Notion, Side::Vault],
    };
    let key = sides
        .into_iter()
        .find_map(|side| snapshot.set_resolution(side, &id, keep))
        .ok_or_else(|| format!("no linked pair contains {id}"))?;
    store.commit(&snapshot)?;
    info!(pair = %key, winner = %keep, "Resolution recorded");
    Ok(key)
}

/// Runs the resolve command.
pub fn run(
    config_dir: &Path,
    vault: Option<&str>,
    id: &str,
    side: Option<Side>,
    keep: Side,
) -> CliResult {
    let app = AppConfig::load(&config_dir.join(config::SYNC_FILE))?;
    let vault = app.single(vault)?;
    let key = record_resolution(vault, side, id, keep)?;
    println!("{key}: keeping the {keep} version on the next sync");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::vault_config;
    use chrono::Utc;
    use parivaha_model::{Revision, Snapshot, SyncPair};
    use parivaha_sync_engine::{FileSnapshotStore, SyncError};
    use parivaha_vault::STATE_DIR;

    fn seed(root: &Path) {
        let store = FileSnapshotStore::open(&root.join(STATE_DIR)).unwrap();
        let mut snapshot = Snapshot::new();
        snapshot.upsert(SyncPair::new(
            PairKey::new("n1", "notes/a.md"),
            Revision::Tag("r1".into()),
            Revision::Tag("r2".into()),
            Utc::now(),
        ));
        store.commit(&snapshot).unwrap();
    }

    fn resolution(root: &Path) -> Option<Side> {
        let store = FileSnapshotStore::open(&root.join(STATE_DIR)).unwrap();
        let snapshot = store.load().unwrap();
        let pair = snapshot.pairs().next().unwrap();
        pair.resolution
    }

    #[test]
    fn resolves_by_either_id() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let vault = vault_config(dir.path());

        let key = record_resolution(&vault, None, "notes/a.md", Side::Notion).unwrap();
        assert_eq!(key, PairKey::new("n1", "notes/a.md"));
        assert_eq!(resolution(dir.path()), Some(Side::Notion));

        record_resolution(&vault, Some(Side::Notion), "n1", Side::Vault).unwrap();
        assert_eq!(resolution(dir.path()), Some(Side::Vault));
    }

    #[test]
    fn unknown_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let vault = vault_config(dir.path());
        assert!(record_resolution(&vault, Some(Side::Vault), "n1", Side::Notion).is_err());
        assert_eq!(resolution(dir.path()), None);
    }

    #[test]
    fn refuses_while_the_vault_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let _held = FileSnapshotStore::open(&dir.path().join(STATE_DIR)).unwrap();
        let err = record_resolution(&vault_config(dir.path()), None, "n1", Side::Vault).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::PassInProgress)
        ));
    }

    #[test]
    fn unsynced_vault_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(record_resolution(&vault_config(dir.path()), None, "n1", Side::Vault).is_err());
    }
}
