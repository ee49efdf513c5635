//! Records: one logical note in either native representation.

use crate::value::{FieldValue, Fields};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which store a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The hosted structured database.
    Notion,
    /// The local plain-text file vault.
    Vault,
}

impl Side {
    /// Returns the other side.
    pub fn opposite(self) -> Side {
        match self {
            Side::Notion => Side::Vault,
            Side::Vault => Side::Notion,
        }
    }

    /// Both sides, Notion first.
    pub const BOTH: [Side; 2] = [Side::Notion, Side::Vault];
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Notion => f.write_str("notion"),
            Side::Vault => f.write_str("vault"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "notion" | "local" => Ok(Side::Notion),
            "vault" | "obsidian" | "remote" => Ok(Side::Vault),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// Stable identity of a record within one store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque version marker of a record on one side.
///
/// Change detection only compares revisions for equality. Counters are
/// additionally ordered, which adapters may use to serve `since` queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Revision {
    /// Monotonically increasing counter.
    Counter(u64),
    /// Opaque token such as a content hash or an edit timestamp.
    Tag(String),
}

impl Revision {
    /// Returns `Some(true)` if `self` is strictly newer than `other`.
    ///
    /// Only counters are comparable; any other combination returns `None`.
    pub fn is_after(&self, other: &Revision) -> Option<bool> {
        match (self, other) {
            (Revision::Counter(a), Revision::Counter(b)) => Some(a > b),
            _ => None,
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Counter(n) => write!(f, "#{n}"),
            Revision::Tag(tag) => f.write_str(tag),
        }
    }
}

/// One logical note as seen by one adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Identity, unique within `source`.
    pub id: RecordId,
    /// Typed fields.
    pub fields: Fields,
    /// Free-form text content.
    pub body: String,
    /// Current version marker.
    pub revision: Revision,
    /// Store this record belongs to.
    pub source: Side,
    /// Time of the last change, when the store reports one.
    pub modified_at: Option<DateTime<Utc>>,
    /// Soft-deleted records are never listed by adapters.
    pub archived: bool,
}

impl Record {
    /// Creates an empty record.
    pub fn new(id: impl Into<RecordId>, source: Side, revision: Revision) -> Self {
        Self {
            id: id.into(),
            fields: Fields::new(),
            body: String::new(),
            revision,
            source,
            modified_at: None,
            archived: false,
        }
    }

    /// Sets a field.
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the modification time.
    pub fn with_modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.modified_at = Some(at);
        self
    }

    /// Gets a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_opposite_and_parse() {
        assert_eq!(Side::Notion.opposite(), Side::Vault);
        assert_eq!(Side::Vault.opposite(), Side::Notion);
        assert_eq!("Vault".parse::<Side>().unwrap(), Side::Vault);
        assert_eq!("obsidian".parse::<Side>().unwrap(), Side::Vault);
        assert!("dropbox".parse::<Side>().is_err());
    }

    #[test]
    fn revision_ordering() {
        assert_eq!(Revision::Counter(7).is_after(&Revision::Counter(5)), Some(true));
        assert_eq!(Revision::Counter(5).is_after(&Revision::Counter(5)), Some(false));
        assert_eq!(
            Revision::Tag("a".into()).is_after(&Revision::Counter(1)),
            None
        );
    }

    #[test]
    fn record_builder() {
        let record = Record::new("page-1", Side::Notion, Revision::Counter(1))
            .with_field("Name", FieldValue::text("Inbox"))
            .with_body("hello");
        assert_eq!(record.field("Name"), Some(&FieldValue::text("Inbox")));
        assert_eq!(record.body, "hello");
        assert!(!record.archived);
    }
}
