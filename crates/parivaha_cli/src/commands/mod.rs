//! CLI command implementations.

pub mod init;
pub mod resolve;
pub mod status;
pub mod sync;

use crate::config::VaultConfig;
use parivaha_sync_engine::FileSnapshotStore;
use parivaha_vault::STATE_DIR;
use std::path::PathBuf;

/// Result type for commands.
pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// State directory of a configured vault.
pub fn state_dir(vault: &VaultConfig) -> PathBuf {
    vault.root().join(STATE_DIR)
}

/// Opens the snapshot store of a vault that has been synced before.
pub fn open_store(vault: &VaultConfig) -> CliResult<FileSnapshotStore> {
    let dir = state_dir(vault);
    if !dir.is_dir() {
        return Err(format!("vault {:?} has not been synced yet", vault.name).into());
    }
    Ok(FileSnapshotStore::open(&dir)?)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::{NotionConfig, VaultConfig};
    use std::path::Path;

    pub(crate) fn vault_config(root: &Path) -> VaultConfig {
        VaultConfig {
            name: "test".into(),
            path: root.display().to_string(),
            notion: NotionConfig {
                database_id: "db".into(),
                token_env: "NOTION_API_KEY".into(),
            },
            sync: Default::default(),
            hard_delete: false,
            title_key: "title".into(),
            notion_link: false,
            parent_key: None,
        }
    }
}
