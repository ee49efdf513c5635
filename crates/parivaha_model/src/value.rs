//! Typed field values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Field name to value mapping of a record.
///
/// A `BTreeMap` keeps iteration (and therefore encoding) order stable.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single typed field value.
///
/// Notion properties and vault front-matter entries are both expressed
/// with this type. `List` is the vault's native form for YAML sequences;
/// the Notion side uses `Tags` and `Reference` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Free text.
    Text(String),
    /// Unordered set of tags.
    Tags(BTreeSet<String>),
    /// Ordered references to other records by id.
    Reference(Vec<String>),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Boolean flag.
    Checkbox(bool),
    /// Ordered list of plain strings.
    List(Vec<String>),
}

impl FieldValue {
    /// Creates a text value.
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    /// Creates a tag set from any iterator of strings.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::Tags(tags.into_iter().map(Into::into).collect())
    }

    /// Returns the kind of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Tags(_) => FieldKind::Tags,
            FieldValue::Reference(_) => FieldKind::Reference,
            FieldValue::Timestamp(_) => FieldKind::Timestamp,
            FieldValue::Checkbox(_) => FieldKind::Checkbox,
            FieldValue::List(_) => FieldKind::List,
        }
    }

    /// Returns the text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the timestamp if this is a timestamp value.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Tags(tags) => {
                let joined: Vec<&str> = tags.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", joined.join(", "))
            }
            FieldValue::Reference(ids) | FieldValue::List(ids) => {
                write!(f, "[{}]", ids.join(", "))
            }
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            FieldValue::Checkbox(b) => write!(f, "{b}"),
        }
    }
}

/// The type of a field, independent of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// See [`FieldValue::Text`].
    Text,
    /// See [`FieldValue::Tags`].
    Tags,
    /// See [`FieldValue::Reference`].
    Reference,
    /// See [`FieldValue::Timestamp`].
    Timestamp,
    /// See [`FieldValue::Checkbox`].
    Checkbox,
    /// See [`FieldValue::List`].
    List,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Text => "text",
            FieldKind::Tags => "tags",
            FieldKind::Reference => "reference",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Checkbox => "checkbox",
            FieldKind::List => "list",
        };
        f.write_str(name)
    }
}
