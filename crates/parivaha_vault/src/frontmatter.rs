//! Markdown documents with YAML front matter.
//!
//! ```text
//! ---
//! title: Inbox
//! tags: [work, "#root"]
//! ---
//! # Inbox
//! ```
//!
//! Front matter keys keep their order and, unless their value changes,
//! their exact YAML representation.

use crate::error::{VaultError, VaultResult};
use chrono::SecondsFormat;
use parivaha_model::{FieldValue, Fields};
use serde_yaml::{Mapping, Value};

const DELIMITER: &str = "---";

/// Key marking a soft-deleted note.
pub const ARCHIVED_KEY: &str = "archived";

/// A parsed markdown document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Front matter, in file order.
    pub front: Mapping,
    /// Everything after the closing delimiter.
    pub body: String,
}

impl Document {
    /// Splits `text` into front matter and body.
    ///
    /// Text without a leading `---` line has no front matter.
    pub fn parse(text: &str) -> VaultResult<Self> {
        let Some(rest) = strip_delimiter_line(text) else {
            return Ok(Self {
                front: Mapping::new(),
                body: text.to_string(),
            });
        };

        let mut offset = 0;
        for line in rest.split_inclusive('\n') {
            if line.trim_end_matches(['\r', '\n']) == DELIMITER {
                let yaml = &rest[..offset];
                let body = &rest[offset + line.len()..];
                return Ok(Self {
                    front: parse_yaml(yaml)?,
                    body: body.to_string(),
                });
            }
            offset += line.len();
        }

        Err(VaultError::FrontMatter("unterminated front matter".into()))
    }

    /// Renders the document.
    ///
    /// Empty front matter is omitted unless the body itself opens with a
    /// delimiter line, which would otherwise read back as front matter.
    pub fn render(&self) -> VaultResult<String> {
        if self.front.is_empty() {
            if strip_delimiter_line(&self.body).is_some() {
                return Ok(format!("{DELIMITER}\n{DELIMITER}\n{}", self.body));
            }
            return Ok(self.body.clone());
        }
        let yaml = serde_yaml::to_string(&self.front)
            .map_err(|e| VaultError::FrontMatter(e.to_string()))?;
        Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{}", self.body))
    }

    /// Returns true if the note is soft-deleted.
    pub fn is_archived(&self) -> bool {
        matches!(self.front.get(ARCHIVED_KEY), Some(Value::Bool(true)))
    }

    /// Marks or unmarks the note as soft-deleted.
    pub fn set_archived(&mut self, archived: bool) {
        if archived {
            self.front.insert(ARCHIVED_KEY.into(), Value::Bool(true));
        } else {
            self.front.remove(ARCHIVED_KEY);
        }
    }

    /// Front matter entries exposed as record fields.
    ///
    /// Nulls, nested mappings and the archive marker are not exposed.
    pub fn fields(&self) -> Fields {
        self.front
            .iter()
            .filter_map(|(key, value)| {
                let key = key.as_str()?;
                if key == ARCHIVED_KEY {
                    return None;
                }
                Some((key.to_string(), field_from_yaml(value)?))
            })
            .collect()
    }

    /// Replaces the exposed fields with `fields`.
    ///
    /// Values equal to what is already exposed are left untouched, exposed
    /// keys missing from `fields` are removed, and new keys are appended.
    pub fn apply_fields(&mut self, fields: &Fields) {
        let stale: Vec<Value> = self
            .front
            .iter()
            .filter(|(key, value)| {
                key.as_str().is_some_and(|k| k != ARCHIVED_KEY && !fields.contains_key(k))
                    && field_from_yaml(value).is_some()
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            self.front.remove(&key);
        }

        for (name, field) in fields {
            if name == ARCHIVED_KEY {
                continue;
            }
            let unchanged = self
                .front
                .get(name.as_str())
                .and_then(field_from_yaml)
                .is_some_and(|current| &current == field);
            if !unchanged {
                self.front.insert(Value::String(name.clone()), field_to_yaml(field));
            }
        }
    }
}

fn strip_delimiter_line(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(DELIMITER)?;
    rest.strip_prefix('\n')
        .or_else(|| rest.strip_prefix("\r\n"))
}

fn parse_yaml(yaml: &str) -> VaultResult<Mapping> {
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(mapping)) => Ok(mapping),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(VaultError::FrontMatter(
            "front matter is not a mapping".into(),
        )),
        Err(e) => Err(VaultError::FrontMatter(e.to_string())),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Converts a YAML value to a field, if it is exposed.
pub fn field_from_yaml(value: &Value) -> Option<FieldValue> {
    match value {
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Bool(b) => Some(FieldValue::Checkbox(*b)),
        Value::Number(n) => Some(FieldValue::Text(n.to_string())),
        Value::Sequence(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Option<Vec<_>>>()
            .map(FieldValue::List),
        _ => None,
    }
}

/// Converts a field to its YAML value.
pub fn field_to_yaml(field: &FieldValue) -> Value {
    let list = |items: Vec<String>| Value::Sequence(items.into_iter().map(Value::String).collect());
    match field {
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Checkbox(b) => Value::Bool(*b),
        FieldValue::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        FieldValue::Tags(tags) => list(tags.iter().cloned().collect()),
        FieldValue::Reference(ids) | FieldValue::List(ids) => list(ids.clone()),
    }
}
