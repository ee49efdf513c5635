//! # Parivaha Vault
//!
//! Obsidian vault adapter for the Parivaha sync engine.
//!
//! A vault is a directory of markdown notes. Each note's YAML front matter
//! becomes the record fields and the rest of the file its body:
//!
//! ```rust,ignore
//! use parivaha_vault::VaultAdapter;
//!
//! let vault = VaultAdapter::open("~/notes")?.with_hard_delete(false);
//! let engine = SyncEngine::new(config, notion, vault, store)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod error;
mod frontmatter;

pub use adapter::{VaultAdapter, NOTION_ID_KEY, NOTION_URL_KEY, STATE_DIR};
pub use error::{VaultError, VaultResult};
pub use frontmatter::{field_from_yaml, field_to_yaml, Document, ARCHIVED_KEY};
