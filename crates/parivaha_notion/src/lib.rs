//! # Parivaha Notion
//!
//! Notion database adapter for the Parivaha sync engine.
//!
//! This crate provides:
//! - `NotionAdapter`, a `RecordAdapter` over one database
//! - `NotionClient`, the API operations the adapter needs
//! - `HttpNotionClient` for the REST API and `MemoryNotionClient` for tests
//! - The property codec between page JSON and record fields
//!
//! ```rust,ignore
//! use parivaha_notion::{HttpNotionClient, NotionAdapter};
//!
//! let client = HttpNotionClient::new(token)?;
//! let notion = NotionAdapter::connect(client, database_id)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod blocks;
mod client;
mod error;
mod http;
mod properties;

pub use adapter::{page_revision, NotionAdapter};
pub use blocks::{blocks_to_markdown, markdown_to_blocks};
pub use client::{
    DatabaseSchema, MemoryNotionClient, NotionClient, Page, Properties, PropertyKind, QueryPage,
};
pub use error::{NotionError, NotionResult};
pub use http::{HttpNotionClient, DEFAULT_BASE_URL, NOTION_VERSION};
pub use properties::{decode_properties, encode_properties};
