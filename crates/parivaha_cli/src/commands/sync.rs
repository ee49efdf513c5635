//! Sync command implementation.

use super::CliResult;
use crate::config::{self, AppConfig, VaultConfig};
use parivaha_notion::{HttpNotionClient, NotionAdapter};
use parivaha_sync_engine::{FileSnapshotStore, PassSummary, SyncDirection, SyncEngine};
use parivaha_vault::VaultAdapter;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{error, info, warn};

/// Runs one pass for each selected vault.
///
/// A failing vault does not stop the others; the command fails at the
/// end if any vault failed.
pub fn run(config_dir: &Path, vault: Option<&str>, direction: Option<SyncDirection>) -> CliResult {
    config::load_env(config_dir)?;
    let app = AppConfig::load(&config_dir.join(config::SYNC_FILE))?;
    let vaults = app.select(vault)?;
    if vaults.is_empty() {
        warn!("No vaults configured");
        return Ok(());
    }

    let mut failed = 0;
    for vault in vaults {
        match sync_vault(vault, direction) {
            Ok(summary) => print!("{}", render_summary(&vault.name, &summary)),
            Err(e) => {
                error!(vault = %vault.name, error = %e, "Sync failed");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(format!("{failed} vault(s) failed to sync").into());
    }
    Ok(())
}

fn sync_vault(vault: &VaultConfig, direction: Option<SyncDirection>) -> CliResult<PassSummary> {
    let mut config = vault.sync_config()?;
    if let Some(direction) = direction {
        config = config.with_direction(direction);
    }

    let root = vault.root();
    let mut obsidian = VaultAdapter::open(&root)?
        .with_title_key(vault.title_key.as_str())
        .with_hard_delete(vault.hard_delete)
        .with_notion_link(vault.notion_link);
    if let Some(key) = &vault.parent_key {
        obsidian = obsidian.with_hierarchy(key.as_str());
    }
    let client = HttpNotionClient::new(vault.token()?)?;
    let notion = NotionAdapter::connect(client, vault.notion.database_id.as_str())?
        .with_page_bodies(config.field_mapping.sync_body);
    let store = FileSnapshotStore::open(&obsidian.state_dir())?;

    info!(vault = %vault.name, path = %root.display(), direction = ?config.direction, "Syncing");
    let engine = SyncEngine::new(config, notion, obsidian, store)?;
    Ok(engine.sync()?)
}

/// Human-readable pass report.
fn render_summary(name: &str, summary: &PassSummary) -> String {
    let mut out = format!(
        "{name}: {} applied, {} unchanged, {} deferred, {} errored, {} skipped ({:.1}s)\n",
        summary.applied.len(),
        summary.unchanged,
        summary.deferred.len(),
        summary.errored.len(),
        summary.skipped.len(),
        summary.duration.as_secs_f64(),
    );
    if summary.cancelled {
        out.push_str("  pass cancelled before completion\n");
    }
    for key in &summary.deferred {
        let _ = writeln!(out, "  conflict: {key} (see `parivaha status`)");
    }
    for failure in &summary.errored {
        let _ = writeln!(out, "  failed: {}: {}", failure.record, failure.error);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use parivaha_model::{PairKey, Side};
    use parivaha_sync_engine::{RecordFailure, RecordRef};
    use std::time::Duration;

    #[test]
    fn summary_lists_conflicts_and_failures() {
        let summary = PassSummary {
            applied: vec![PairKey::new("n1", "a.md")],
            deferred: vec![PairKey::new("n2", "b.md")],
            errored: vec![RecordFailure {
                record: RecordRef::new(Side::Vault, "c.md"),
                error: "permission denied".into(),
            }],
            unchanged: 4,
            duration: Duration::from_millis(1500),
            ..PassSummary::default()
        };
        let text = render_summary("work", &summary);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "work: 1 applied, 4 unchanged, 1 deferred, 1 errored, 0 skipped (1.5s)"
        );
        assert!(lines[1].starts_with("  conflict: "));
        assert!(lines[1].contains("b.md"));
        assert_eq!(lines[2], "  failed: vault:c.md: permission denied");
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(dir.path(), None, None).unwrap_err();
        assert!(err.to_string().contains("parivaha init"));
    }
}
