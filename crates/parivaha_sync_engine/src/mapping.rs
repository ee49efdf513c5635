//! Field mapping between Notion properties and vault front matter.
//!
//! A [`FieldMapping`] is a list of declarative [`FieldRule`]s. Each rule
//! names a Notion property, its kind, the vault key it maps to and how
//! the value is encoded on the vault side.
//!
//! Bidirectional rules satisfy the round-trip law:
//! `to_notion(to_vault(r)).fields == r.fields` restricted to those fields.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parivaha_model::{FieldKind, FieldValue, Fields, Record, Side};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors raised while mapping a record or validating a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// A multi-valued reference has no flattening rule.
    #[error("field '{field}' holds {count} references but has no flattening rule")]
    NeedsFlattening {
        /// Field name.
        field: String,
        /// Number of references.
        count: usize,
    },

    /// A value cannot be coerced to the declared kind.
    #[error("field '{field}': cannot coerce {found} to {expected}")]
    Coerce {
        /// Field name.
        field: String,
        /// Kind found in the source record.
        found: FieldKind,
        /// Kind declared by the rule.
        expected: FieldKind,
    },

    /// A reference id cannot be represented.
    #[error("field '{field}': invalid reference: {reason}")]
    InvalidReference {
        /// Field name.
        field: String,
        /// Description.
        reason: String,
    },

    /// A text value is not a recognisable timestamp.
    #[error("field '{field}': invalid timestamp '{value}'")]
    InvalidTimestamp {
        /// Field name.
        field: String,
        /// Offending text.
        value: String,
    },

    /// A text value is not a recognisable boolean.
    #[error("field '{field}': invalid checkbox value '{value}'")]
    InvalidCheckbox {
        /// Field name.
        field: String,
        /// Offending text.
        value: String,
    },

    /// The record came from the wrong side.
    #[error("expected a {expected} record, got a {actual} record")]
    WrongSide {
        /// Side the operation maps from.
        expected: Side,
        /// Side of the record passed in.
        actual: Side,
    },

    /// The mapping configuration is invalid.
    #[error("invalid field mapping: {0}")]
    InvalidConfig(String),
}

/// How a value is written on the vault side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// Natural representation of the kind.
    #[default]
    Plain,
    /// References as a YAML list.
    List,
    /// References joined into one text value.
    Join {
        /// Separator between ids.
        separator: String,
    },
    /// Timestamps as `YYYY-MM-DD`. Lossy, so one-directional only.
    Date,
}

/// Which way a rule propagates values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Both ways.
    #[default]
    Bidirectional,
    /// Notion to vault only.
    ToVault,
    /// Vault to Notion only.
    ToNotion,
    /// Not synchronised; preserved on both sides.
    Excluded,
}

impl Direction {
    /// Returns true if values flow into `target`.
    pub fn flows_to(self, target: Side) -> bool {
        match self {
            Direction::Bidirectional => true,
            Direction::ToVault => target == Side::Vault,
            Direction::ToNotion => target == Side::Notion,
            Direction::Excluded => false,
        }
    }
}

/// One declarative mapping rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Notion property name.
    pub notion_field: String,
    /// Notion property kind.
    pub kind: FieldKind,
    /// Vault front-matter key.
    pub vault_key: String,
    /// Vault-side encoding.
    #[serde(default)]
    pub encoding: Encoding,
    /// Propagation direction.
    #[serde(default)]
    pub direction: Direction,
}

impl FieldRule {
    /// Creates a bidirectional rule with plain encoding.
    pub fn new(notion_field: impl Into<String>, kind: FieldKind, vault_key: impl Into<String>) -> Self {
        Self {
            notion_field: notion_field.into(),
            kind,
            vault_key: vault_key.into(),
            encoding: Encoding::Plain,
            direction: Direction::Bidirectional,
        }
    }

    /// Sets the encoding.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Field name on the given side.
    pub fn name(&self, side: Side) -> &str {
        match side {
            Side::Notion => &self.notion_field,
            Side::Vault => &self.vault_key,
        }
    }

    fn validate(&self) -> MappingResult<()> {
        if self.notion_field.is_empty() || self.vault_key.is_empty() {
            return Err(MappingError::InvalidConfig(
                "rule with an empty field name".into(),
            ));
        }
        let fits = match (&self.encoding, self.kind) {
            (_, FieldKind::List) => false,
            (Encoding::Plain, _) => true,
            (Encoding::List, kind) => matches!(kind, FieldKind::Tags | FieldKind::Reference),
            (Encoding::Join { separator }, FieldKind::Reference) => !separator.is_empty(),
            (Encoding::Join { .. }, _) => false,
            (Encoding::Date, FieldKind::Timestamp) => self.direction != Direction::Bidirectional,
            (Encoding::Date, _) => false,
        };
        if fits {
            Ok(())
        } else {
            Err(MappingError::InvalidConfig(format!(
                "encoding {:?} does not fit {} field '{}' ({:?})",
                self.encoding, self.kind, self.notion_field, self.direction
            )))
        }
    }
}

/// Declarative rule set translating fields between representations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Mapping rules.
    #[serde(default)]
    pub rules: Vec<FieldRule>,
    /// Whether record bodies are synchronised.
    #[serde(default = "default_true")]
    pub sync_body: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            sync_body: true,
        }
    }
}

impl FieldMapping {
    /// Creates a mapping from rules.
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self {
            rules,
            sync_body: true,
        }
    }

    /// Adds a rule.
    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Enables or disables body synchronisation.
    pub fn with_sync_body(mut self, sync_body: bool) -> Self {
        self.sync_body = sync_body;
        self
    }

    /// Checks the rules for consistency.
    pub fn validate(&self) -> MappingResult<()> {
        let mut notion_names = HashSet::new();
        let mut vault_keys = HashSet::new();
        for rule in self.rules.iter().filter(|r| r.direction != Direction::Excluded) {
            rule.validate()?;
            if !notion_names.insert(rule.notion_field.as_str()) {
                return Err(MappingError::InvalidConfig(format!(
                    "notion field '{}' is mapped twice",
                    rule.notion_field
                )));
            }
            if !vault_keys.insert(rule.vault_key.as_str()) {
                return Err(MappingError::InvalidConfig(format!(
                    "vault key '{}' is mapped twice",
                    rule.vault_key
                )));
            }
        }
        Ok(())
    }
}

/// Translates records between the Notion and vault representations.
#[derive(Debug, Clone)]
pub struct MappingEngine {
    mapping: FieldMapping,
}

impl MappingEngine {
    /// Creates an engine, validating the mapping.
    pub fn new(mapping: FieldMapping) -> MappingResult<Self> {
        mapping.validate()?;
        Ok(Self { mapping })
    }

    /// Returns the mapping.
    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Maps a Notion record to its vault representation.
    pub fn to_vault(&self, record: &Record) -> MappingResult<Record> {
        self.map(record, Side::Vault)
    }

    /// Maps a vault record to its Notion representation.
    pub fn to_notion(&self, record: &Record) -> MappingResult<Record> {
        self.map(record, Side::Notion)
    }

    /// Maps `record` into the representation of `target`.
    ///
    /// The result keeps the source id, revision and timestamp; only fields
    /// governed by a rule flowing into `target` are present.
    pub fn map(&self, record: &Record, target: Side) -> MappingResult<Record> {
        let source = target.opposite();
        if record.source != source {
            return Err(MappingError::WrongSide {
                expected: source,
                actual: record.source,
            });
        }

        let mut fields = Fields::new();
        for rule in self.rules_into(target) {
            let Some(value) = record.fields.get(rule.name(source)) else {
                continue;
            };
            let mapped = match target {
                Side::Vault => encode_for_vault(rule, value)?,
                Side::Notion => decode_from_vault(rule, value)?,
            };
            fields.insert(rule.name(target).to_string(), mapped);
        }

        Ok(Record {
            id: record.id.clone(),
            fields,
            body: if self.mapping.sync_body {
                record.body.clone()
            } else {
                String::new()
            },
            revision: record.revision.clone(),
            source: target,
            modified_at: record.modified_at,
            archived: false,
        })
    }

    /// Applies a mapped record onto the existing counterpart.
    ///
    /// Fields without a rule flowing into the target are kept verbatim;
    /// governed fields absent from `mapped` are cleared.
    pub fn overlay(&self, mapped: &Record, existing: Option<&Record>) -> Record {
        self.overlay_selected(mapped, existing, |_| true, self.mapping.sync_body)
    }

    /// Like [`overlay`](Self::overlay) but only for the rules accepted by
    /// `include`, taking the body only when `take_body` is set.
    pub fn overlay_selected(
        &self,
        mapped: &Record,
        existing: Option<&Record>,
        include: impl Fn(&FieldRule) -> bool,
        take_body: bool,
    ) -> Record {
        let target = mapped.source;
        let Some(existing) = existing else {
            return mapped.clone();
        };

        let mut out = existing.clone();
        for rule in self.rules_into(target).filter(|r| include(r)) {
            let name = rule.name(target);
            match mapped.fields.get(name) {
                Some(value) => {
                    out.fields.insert(name.to_string(), value.clone());
                }
                None => {
                    out.fields.remove(name);
                }
            }
        }
        if take_body && self.mapping.sync_body {
            out.body = mapped.body.clone();
        }
        out.archived = false;
        out
    }

    /// Bidirectional fields of `record` in Notion representation.
    ///
    /// Used to compare both sides of a pair and as the merge base.
    pub fn canonical(&self, record: &Record) -> MappingResult<Fields> {
        let mut fields = Fields::new();
        for rule in self
            .mapping
            .rules
            .iter()
            .filter(|r| r.direction == Direction::Bidirectional)
        {
            let Some(value) = record.fields.get(rule.name(record.source)) else {
                continue;
            };
            let value = match record.source {
                Side::Notion => value.clone(),
                Side::Vault => decode_from_vault(rule, value)?,
            };
            fields.insert(rule.notion_field.clone(), value);
        }
        Ok(fields)
    }

    /// Returns the bidirectional rules.
    pub fn bidirectional_rules(&self) -> impl Iterator<Item = &FieldRule> {
        self.mapping
            .rules
            .iter()
            .filter(|r| r.direction == Direction::Bidirectional)
    }

    /// Whether bodies are synchronised.
    pub fn syncs_body(&self) -> bool {
        self.mapping.sync_body
    }

    fn rules_into(&self, target: Side) -> impl Iterator<Item = &FieldRule> {
        self.mapping
            .rules
            .iter()
            .filter(move |r| r.direction.flows_to(target))
    }
}

fn coerce_err(rule: &FieldRule, found: &FieldValue) -> MappingError {
    MappingError::Coerce {
        field: rule.notion_field.clone(),
        found: found.kind(),
        expected: rule.kind,
    }
}

fn check_references(rule: &FieldRule, ids: &[String], separator: Option<&str>) -> MappingResult<()> {
    for id in ids {
        if id.is_empty() {
            return Err(MappingError::InvalidReference {
                field: rule.notion_field.clone(),
                reason: "empty id".into(),
            });
        }
        if let Some(sep) = separator {
            if id.contains(sep) {
                return Err(MappingError::InvalidReference {
                    field: rule.notion_field.clone(),
                    reason: format!("id '{id}' contains separator '{sep}'"),
                });
            }
        }
    }
    Ok(())
}

fn encode_for_vault(rule: &FieldRule, value: &FieldValue) -> MappingResult<FieldValue> {
    match (rule.kind, value) {
        (FieldKind::Text, FieldValue::Text(s)) => Ok(FieldValue::Text(s.clone())),
        (FieldKind::Tags, FieldValue::Tags(tags)) => {
            Ok(FieldValue::List(tags.iter().cloned().collect()))
        }
        (FieldKind::Reference, FieldValue::Reference(ids)) => match &rule.encoding {
            Encoding::List => {
                check_references(rule, ids, None)?;
                Ok(FieldValue::List(ids.clone()))
            }
            Encoding::Join { separator } => {
                check_references(rule, ids, Some(separator))?;
                Ok(FieldValue::Text(ids.join(separator)))
            }
            _ => {
                check_references(rule, ids, None)?;
                match ids.as_slice() {
                    [] => Ok(FieldValue::Text(String::new())),
                    [id] => Ok(FieldValue::Text(id.clone())),
                    _ => Err(MappingError::NeedsFlattening {
                        field: rule.notion_field.clone(),
                        count: ids.len(),
                    }),
                }
            }
        },
        (FieldKind::Timestamp, FieldValue::Timestamp(ts)) => match rule.encoding {
            Encoding::Date => Ok(FieldValue::Text(ts.format("%Y-%m-%d").to_string())),
            _ => Ok(FieldValue::Text(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
        },
        (FieldKind::Checkbox, FieldValue::Checkbox(b)) => Ok(FieldValue::Checkbox(*b)),
        (_, other) => Err(coerce_err(rule, other)),
    }
}

fn decode_from_vault(rule: &FieldRule, value: &FieldValue) -> MappingResult<FieldValue> {
    match (rule.kind, value) {
        (FieldKind::Text, FieldValue::Text(s)) => Ok(FieldValue::Text(s.clone())),
        (FieldKind::Text, FieldValue::Checkbox(b)) => Ok(FieldValue::Text(b.to_string())),

        (FieldKind::Tags, FieldValue::List(items)) => Ok(FieldValue::Tags(
            items.iter().filter(|s| !s.is_empty()).cloned().collect(),
        )),
        (FieldKind::Tags, FieldValue::Tags(tags)) => Ok(FieldValue::Tags(tags.clone())),
        (FieldKind::Tags, FieldValue::Text(s)) => Ok(FieldValue::Tags(
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>(),
        )),

        (FieldKind::Reference, FieldValue::Text(s)) => {
            let ids: Vec<String> = match &rule.encoding {
                Encoding::Join { separator } if !s.is_empty() => {
                    s.split(separator.as_str()).map(str::to_string).collect()
                }
                _ if s.is_empty() => Vec::new(),
                _ => vec![s.clone()],
            };
            check_references(rule, &ids, None)?;
            Ok(FieldValue::Reference(ids))
        }
        (FieldKind::Reference, FieldValue::List(ids) | FieldValue::Reference(ids)) => {
            check_references(rule, ids, None)?;
            if rule.encoding == Encoding::Plain && ids.len() > 1 {
                return Err(MappingError::NeedsFlattening {
                    field: rule.notion_field.clone(),
                    count: ids.len(),
                });
            }
            Ok(FieldValue::Reference(ids.clone()))
        }

        (FieldKind::Timestamp, FieldValue::Timestamp(ts)) => Ok(FieldValue::Timestamp(*ts)),
        (FieldKind::Timestamp, FieldValue::Text(s)) => parse_timestamp(s)
            .map(FieldValue::Timestamp)
            .ok_or_else(|| MappingError::InvalidTimestamp {
                field: rule.notion_field.clone(),
                value: s.clone(),
            }),

        (FieldKind::Checkbox, FieldValue::Checkbox(b)) => Ok(FieldValue::Checkbox(*b)),
        (FieldKind::Checkbox, FieldValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(FieldValue::Checkbox(true)),
            "false" | "no" | "off" | "" => Ok(FieldValue::Checkbox(false)),
            _ => Err(MappingError::InvalidCheckbox {
                field: rule.notion_field.clone(),
                value: s.clone(),
            }),
        },

        (_, other) => Err(coerce_err(rule, other)),
    }
}

/// Parses RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parivaha_model::Revision;

    fn mapping() -> FieldMapping {
        FieldMapping::new(vec![
            FieldRule::new("Name", FieldKind::Text, "title"),
            FieldRule::new("Tags", FieldKind::Tags, "tags"),
            FieldRule::new("Related", FieldKind::Reference, "related")
                .with_encoding(Encoding::List),
            FieldRule::new("Parent", FieldKind::Reference, "parent"),
            FieldRule::new("Due", FieldKind::Timestamp, "due"),
            FieldRule::new("Canvas", FieldKind::Checkbox, "canvas"),
            FieldRule::new("Last Synced", FieldKind::Timestamp, "last_synced")
                .with_encoding(Encoding::Date)
                .with_direction(Direction::ToVault),
        ])
    }

    fn notion_record() -> Record {
        Record::new("page-1", Side::Notion, Revision::Counter(1))
            .with_field("Name", FieldValue::text("Inbox"))
            .with_field("Tags", FieldValue::tags(["#root", "work"]))
            .with_field(
                "Related",
                FieldValue::Reference(vec!["p2".into(), "p3".into()]),
            )
            .with_field("Parent", FieldValue::Reference(vec!["p9".into()]))
            .with_field(
                "Due",
                FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()),
            )
            .with_field("Canvas", FieldValue::Checkbox(true))
            .with_field("Status", FieldValue::text("Draft"))
            .with_body("# Inbox\n")
    }

    #[test]
    fn to_vault_encodes_each_kind() {
        let engine = MappingEngine::new(mapping()).unwrap();
        let vault = engine.to_vault(&notion_record()).unwrap();

        assert_eq!(vault.source, Side::Vault);
        assert_eq!(vault.field("title"), Some(&FieldValue::text("Inbox")));
        assert_eq!(
            vault.field("tags"),
            Some(&FieldValue::List(vec!["#root".into(), "work".into()]))
        );
        assert_eq!(
            vault.field("related"),
            Some(&FieldValue::List(vec!["p2".into(), "p3".into()]))
        );
        assert_eq!(vault.field("parent"), Some(&FieldValue::text("p9")));
        assert_eq!(
            vault.field("due"),
            Some(&FieldValue::text("2024-06-01T09:30:00Z"))
        );
        assert_eq!(vault.field("canvas"), Some(&FieldValue::Checkbox(true)));
        // Unmapped notion field is not carried over.
        assert!(vault.field("Status").is_none());
        assert_eq!(vault.body, "# Inbox\n");
    }

    #[test]
    fn round_trip_for_bidirectional_fields() {
        let engine = MappingEngine::new(mapping()).unwrap();
        let original = notion_record();
        let back = engine.to_notion(&engine.to_vault(&original).unwrap()).unwrap();

        for rule in engine.bidirectional_rules() {
            assert_eq!(
                back.field(&rule.notion_field),
                original.field(&rule.notion_field),
                "field {}",
                rule.notion_field
            );
        }
    }

    #[test]
    fn multi_reference_without_flattening_fails() {
        let engine = MappingEngine::new(mapping()).unwrap();
        let record = notion_record().with_field(
            "Parent",
            FieldValue::Reference(vec!["a".into(), "b".into()]),
        );
        assert_eq!(
            engine.to_vault(&record).unwrap_err(),
            MappingError::NeedsFlattening {
                field: "Parent".into(),
                count: 2
            }
        );
    }

    #[test]
    fn join_encoding_rejects_ids_with_separator() {
        let mapping = FieldMapping::new(vec![FieldRule::new(
            "Related",
            FieldKind::Reference,
            "related",
        )
        .with_encoding(Encoding::Join {
            separator: ",".into(),
        })]);
        let engine = MappingEngine::new(mapping).unwrap();

        let ok = Record::new("p", Side::Notion, Revision::Counter(1))
            .with_field("Related", FieldValue::Reference(vec!["a".into(), "b".into()]));
        let vault = engine.to_vault(&ok).unwrap();
        assert_eq!(vault.field("related"), Some(&FieldValue::text("a,b")));
        assert_eq!(
            engine.to_notion(&vault).unwrap().field("Related"),
            ok.field("Related")
        );

        let bad = Record::new("p", Side::Notion, Revision::Counter(1))
            .with_field("Related", FieldValue::Reference(vec!["a,b".into()]));
        assert!(matches!(
            engine.to_vault(&bad),
            Err(MappingError::InvalidReference { .. })
        ));
    }

    #[test]
    fn to_notion_coerces_loose_vault_values() {
        let engine = MappingEngine::new(mapping()).unwrap();
        let vault = Record::new("notes/a.md", Side::Vault, Revision::Counter(3))
            .with_field("tags", FieldValue::text("a, b ,"))
            .with_field("due", FieldValue::text("2024-06-01"))
            .with_field("canvas", FieldValue::text("yes"))
            .with_field("last_synced", FieldValue::text("2024-01-01"));

        let notion = engine.to_notion(&vault).unwrap();
        assert_eq!(notion.field("Tags"), Some(&FieldValue::tags(["a", "b"])));
        assert_eq!(
            notion.field("Due"),
            Some(&FieldValue::Timestamp(
                Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
            ))
        );
        assert_eq!(notion.field("Canvas"), Some(&FieldValue::Checkbox(true)));
        // to-vault only rule never flows back.
        assert!(notion.field("Last Synced").is_none());
    }

    #[test]
    fn to_notion_rejects_uncoercible_values() {
        let engine = MappingEngine::new(mapping()).unwrap();
        let vault = Record::new("a.md", Side::Vault, Revision::Counter(1))
            .with_field("title", FieldValue::List(vec!["x".into()]));
        assert!(matches!(
            engine.to_notion(&vault),
            Err(MappingError::Coerce { .. })
        ));

        let vault = Record::new("a.md", Side::Vault, Revision::Counter(1))
            .with_field("due", FieldValue::text("next tuesday"));
        assert!(matches!(
            engine.to_notion(&vault),
            Err(MappingError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn wrong_side_is_rejected() {
        let engine = MappingEngine::new(mapping()).unwrap();
        let vault = Record::new("a.md", Side::Vault, Revision::Counter(1));
        assert!(matches!(
            engine.to_vault(&vault),
            Err(MappingError::WrongSide { .. })
        ));
    }

    #[test]
    fn overlay_preserves_unmapped_fields() {
        let engine = MappingEngine::new(mapping()).unwrap();
        let existing = Record::new("notes/inbox.md", Side::Vault, Revision::Counter(4))
            .with_field("title", FieldValue::text("Old"))
            .with_field("canvas", FieldValue::Checkbox(false))
            .with_field("aliases", FieldValue::List(vec!["in".into()]))
            .with_body("old body");

        let notion = Record::new("page-1", Side::Notion, Revision::Counter(2))
            .with_field("Name", FieldValue::text("New"))
            .with_body("new body");
        let mapped = engine.to_vault(&notion).unwrap();
        let merged = engine.overlay(&mapped, Some(&existing));

        assert_eq!(merged.id, existing.id);
        assert_eq!(merged.revision, existing.revision);
        assert_eq!(merged.field("title"), Some(&FieldValue::text("New")));
        assert_eq!(merged.field("aliases"), existing.field("aliases"));
        // Governed by a rule but absent on the source: cleared.
        assert!(merged.field("canvas").is_none());
        assert_eq!(merged.body, "new body");
    }

    #[test]
    fn overlay_keeps_body_when_body_sync_disabled() {
        let engine = MappingEngine::new(mapping().with_sync_body(false)).unwrap();
        let existing =
            Record::new("a.md", Side::Vault, Revision::Counter(1)).with_body("keep me");
        let notion = Record::new("p", Side::Notion, Revision::Counter(1)).with_body("ignored");
        let merged = engine.overlay(&engine.to_vault(&notion).unwrap(), Some(&existing));
        assert_eq!(merged.body, "keep me");
    }

    #[test]
    fn canonical_compares_across_sides() {
        let engine = MappingEngine::new(mapping()).unwrap();
        let notion = notion_record();
        let vault = engine.to_vault(&notion).unwrap();
        assert_eq!(
            engine.canonical(&notion).unwrap(),
            engine.canonical(&vault).unwrap()
        );
        assert!(!engine.canonical(&notion).unwrap().contains_key("Status"));
        assert!(!engine.canonical(&notion).unwrap().contains_key("Last Synced"));
    }

    #[test]
    fn validation_rejects_bad_rules() {
        let dup = FieldMapping::new(vec![
            FieldRule::new("Name", FieldKind::Text, "title"),
            FieldRule::new("Title", FieldKind::Text, "title"),
        ]);
        assert!(matches!(
            dup.validate(),
            Err(MappingError::InvalidConfig(_))
        ));

        let lossy = FieldMapping::new(vec![FieldRule::new("Due", FieldKind::Timestamp, "due")
            .with_encoding(Encoding::Date)]);
        assert!(lossy.validate().is_err());

        let wrong_kind = FieldMapping::new(vec![FieldRule::new("Name", FieldKind::Text, "t")
            .with_encoding(Encoding::List)]);
        assert!(wrong_kind.validate().is_err());

        let empty_sep = FieldMapping::new(vec![FieldRule::new(
            "R",
            FieldKind::Reference,
            "r",
        )
        .with_encoding(Encoding::Join {
            separator: String::new(),
        })]);
        assert!(empty_sep.validate().is_err());

        let excluded_dup = FieldMapping::new(vec![
            FieldRule::new("Name", FieldKind::Text, "title"),
            FieldRule::new("Name", FieldKind::Text, "other").with_direction(Direction::Excluded),
        ]);
        assert!(excluded_dup.validate().is_ok());
    }

    #[test]
    fn mapping_deserializes_from_json() {
        let json = r#"{
            "rules": [
                {"notion_field": "Name", "kind": "text", "vault_key": "title"},
                {"notion_field": "Related", "kind": "reference", "vault_key": "related",
                 "encoding": {"join": {"separator": ";"}}, "direction": "to-vault"}
            ],
            "sync_body": false
        }"#;
        let mapping: FieldMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.rules.len(), 2);
        assert!(!mapping.sync_body);
        assert_eq!(
            mapping.rules[1].encoding,
            Encoding::Join {
                separator: ";".into()
            }
        );
        assert_eq!(mapping.rules[1].direction, Direction::ToVault);
        assert_eq!(mapping.rules[0].direction, Direction::Bidirectional);
    }

    #[test]
    fn parse_timestamp_accepts_dates_and_rfc3339() {
        assert!(parse_timestamp("2024-06-01T09:30:00+02:00").is_some());
        assert!(parse_timestamp(" 2024-06-01 ").is_some());
        assert!(parse_timestamp("June 1").is_none());
    }
}
