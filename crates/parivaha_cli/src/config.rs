//! User configuration: `~/.parivaha/sync_config.json` and `.env`.

use parivaha_sync_engine::{SyncConfig, SyncConfigFile, SyncError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the user configuration directory under the home directory.
pub const CONFIG_DIR_NAME: &str = ".parivaha";
/// Environment file inside the configuration directory.
pub const ENV_FILE: &str = ".env";
/// Vault list inside the configuration directory.
pub const SYNC_FILE: &str = "sync_config.json";
/// Overrides the configuration directory.
pub const HOME_ENV: &str = "PARIVAHA_HOME";

const ENV_TEMPLATE: &str = include_str!("../templates/env.example");
const SYNC_TEMPLATE: &str = include_str!("../templates/sync_config.json");

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration file is not valid.
    #[error("invalid {path}: {message}")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The configuration file does not exist.
    #[error("{0} not found; run `parivaha init` first")]
    Missing(PathBuf),

    /// No vault with this name is configured.
    #[error("no vault named {0:?} in {SYNC_FILE}")]
    UnknownVault(String),

    /// A command needs one vault but several are configured.
    #[error("several vaults are configured; pick one with --vault")]
    AmbiguousVault,

    /// The token variable is not set.
    #[error("environment variable {0} is not set")]
    MissingToken(String),

    /// The home directory could not be determined.
    #[error("cannot determine the home directory")]
    NoHome,
}

/// The whole `sync_config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configured vaults.
    #[serde(default)]
    pub vaults: Vec<VaultConfig>,
}

/// One vault and the database it syncs with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Name used with `--vault`.
    pub name: String,
    /// Vault directory. `~` and `$VAR` are expanded.
    pub path: String,
    /// Notion database settings.
    pub notion: NotionConfig,
    /// Engine settings.
    #[serde(default)]
    pub sync: SyncConfigFile,
    /// Remove notes instead of marking them `archived`.
    #[serde(default)]
    pub hard_delete: bool,
    /// Front matter key that names new notes.
    #[serde(default = "default_title_key")]
    pub title_key: String,
    /// Write `notion_id` and `notion_url` into notes created from pages.
    #[serde(default)]
    pub notion_link: bool,
    /// Front matter key holding the parent page id. When set, notes created
    /// from pages nest under their parent's folder as `<title>/<title>.md`.
    #[serde(default)]
    pub parent_key: Option<String>,
}

/// Notion side of a vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotionConfig {
    /// Database id.
    pub database_id: String,
    /// Environment variable holding the integration token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_title_key() -> String {
    "title".into()
}

fn default_token_env() -> String {
    "NOTION_API_KEY".into()
}

impl AppConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        for vault in &config.vaults {
            vault.sync_config().map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("vault {:?}: {e}", vault.name),
            })?;
        }
        Ok(config)
    }

    /// Vaults selected by `name`, or all of them.
    pub fn select(&self, name: Option<&str>) -> ConfigResult<Vec<&VaultConfig>> {
        match name {
            None => Ok(self.vaults.iter().collect()),
            Some(name) => self
                .vaults
                .iter()
                .find(|v| v.name == name)
                .map(|v| vec![v])
                .ok_or_else(|| ConfigError::UnknownVault(name.to_string())),
        }
    }

    /// The vault named `name`, or the only vault when `name` is absent.
    pub fn single(&self, name: Option<&str>) -> ConfigResult<&VaultConfig> {
        let mut selected = self.select(name)?;
        match selected.len() {
            1 => Ok(selected.remove(0)),
            0 => Err(ConfigError::UnknownVault(name.unwrap_or_default().to_string())),
            _ => Err(ConfigError::AmbiguousVault),
        }
    }
}

impl VaultConfig {
    /// Vault directory with `~` and environment variables expanded.
    pub fn root(&self) -> PathBuf {
        let home = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf());
        PathBuf::from(expand_path(&self.path, home.as_deref(), |var| {
            std::env::var(var).ok()
        }))
    }

    /// Validated engine configuration.
    pub fn sync_config(&self) -> Result<SyncConfig, SyncError> {
        SyncConfig::try_from(self.sync.clone())
    }

    /// Reads the integration token from the environment.
    pub fn token(&self) -> ConfigResult<String> {
        std::env::var(&self.notion.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingToken(self.notion.token_env.clone()))
    }
}

/// Expands a leading `~` and `$VAR` / `${VAR}` references.
///
/// Unknown variables are left as written.
pub fn expand_path(raw: &str, home: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let rest = match (raw.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            out.push_str(&home.to_string_lossy());
            rest
        }
        _ => raw,
    };

    let mut chars = rest.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let braced = chars.peek().is_some_and(|(_, c)| *c == '{');
        if braced {
            chars.next();
        }
        let mut name = String::new();
        while let Some((_, c)) = chars.peek() {
            if c.is_ascii_alphanumeric() || *c == '_' {
                name.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        let closed = !braced || chars.peek().is_some_and(|(_, c)| *c == '}');
        if braced && closed {
            chars.next();
        }

        let value = if name.is_empty() || !closed {
            None
        } else {
            lookup(&name)
        };
        match value {
            Some(value) => out.push_str(&value),
            None => {
                let end = chars.peek().map_or(rest.len(), |(i, _)| *i);
                out.push_str(&rest[start..end]);
            }
        }
    }
    out
}

/// The configuration directory: `$PARIVAHA_HOME` or `~/.parivaha`.
pub fn default_config_dir() -> ConfigResult<PathBuf> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(CONFIG_DIR_NAME))
        .ok_or(ConfigError::NoHome)
}

/// Loads `<dir>/.env` into the process environment if present.
///
/// Variables already set take precedence.
pub fn load_env(dir: &Path) -> ConfigResult<()> {
    let path = dir.join(ENV_FILE);
    if !path.exists() {
        return Ok(());
    }
    dotenvy::from_path(&path).map_err(|e| ConfigError::Parse {
        path,
        message: e.to_string(),
    })
}

/// Writes the template `.env` and `sync_config.json` into `dir`.
///
/// Existing files are kept unless `overwrite` is set. Returns the files
/// written.
pub fn bootstrap(dir: &Path, overwrite: bool) -> ConfigResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for (name, contents) in [(ENV_FILE, ENV_TEMPLATE), (SYNC_FILE, SYNC_TEMPLATE)] {
        let path = dir.join(name);
        if path.exists() && !overwrite {
            continue;
        }
        fs::write(&path, contents)?;
        written.push(path);
    }
    Ok(written)
}
