//! Conversion between page properties and record fields.
//!
//! | property type | field |
//! |---|---|
//! | title, rich_text, select, status, url, email, phone_number, number | `Text` |
//! | multi_select | `Tags` |
//! | relation | `Reference` |
//! | date, created_time, last_edited_time | `Timestamp` |
//! | checkbox | `Checkbox` |
//!
//! Other property types are ignored. Empty text clears selects, URLs and
//! numbers.

use crate::client::{DatabaseSchema, Properties, PropertyKind};
use crate::error::{NotionError, NotionResult};
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use parivaha_model::{FieldValue, Fields};
use parivaha_sync_engine::parse_timestamp;
use serde_json::{json, Number, Value};
use std::collections::BTreeSet;
use tracing::warn;

/// Longest text content the API accepts in one rich text object.
pub const MAX_TEXT_CHUNK: usize = 2000;

/// Decodes page properties into fields.
///
/// The property type comes from the value itself, or from `schema` when
/// the value does not carry one.
pub fn decode_properties(properties: &Properties, schema: &DatabaseSchema) -> Fields {
    let mut fields = Fields::new();
    for (name, property) in properties {
        let kind = match property.get("type").and_then(Value::as_str) {
            Some(kind) => PropertyKind::parse(kind),
            None => match schema.kind(name) {
                Some(kind) => kind.clone(),
                None => continue,
            },
        };
        let value = property.get(kind.as_str()).unwrap_or(&Value::Null);
        if let Some(field) = decode_value(name, &kind, value) {
            fields.insert(name.clone(), field);
        }
    }
    fields
}

fn decode_value(name: &str, kind: &PropertyKind, value: &Value) -> Option<FieldValue> {
    let field = match kind {
        PropertyKind::Title | PropertyKind::RichText => FieldValue::Text(plain_text(value)),
        PropertyKind::Select | PropertyKind::Status => FieldValue::Text(
            value
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        PropertyKind::Url | PropertyKind::Email | PropertyKind::PhoneNumber => {
            FieldValue::Text(value.as_str().unwrap_or_default().to_string())
        }
        PropertyKind::Number => FieldValue::Text(
            value
                .as_number()
                .map(Number::to_string)
                .unwrap_or_default(),
        ),
        PropertyKind::MultiSelect => FieldValue::Tags(
            items(value)
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect::<BTreeSet<_>>(),
        ),
        PropertyKind::Relation => FieldValue::Reference(
            items(value)
                .filter_map(|item| item.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
        ),
        PropertyKind::Date => {
            let start = value.get("start").and_then(Value::as_str)?;
            FieldValue::Timestamp(timestamp(name, start)?)
        }
        PropertyKind::CreatedTime | PropertyKind::LastEditedTime => {
            FieldValue::Timestamp(timestamp(name, value.as_str()?)?)
        }
        PropertyKind::Checkbox => FieldValue::Checkbox(value.as_bool().unwrap_or(false)),
        PropertyKind::Other(_) => return None,
    };
    Some(field)
}

fn timestamp(name: &str, s: &str) -> Option<DateTime<Utc>> {
    let parsed = parse_timestamp(s);
    if parsed.is_none() {
        warn!(property = name, value = s, "Ignoring unparseable date");
    }
    parsed
}

fn items(value: &Value) -> impl Iterator<Item = &Value> {
    value.as_array().into_iter().flatten()
}

/// Concatenates the plain text of a rich text array.
pub fn plain_text(value: &Value) -> String {
    items(value)
        .filter_map(|item| {
            item.get("plain_text")
                .or_else(|| item.get("text").and_then(|t| t.get("content")))
                .and_then(Value::as_str)
        })
        .collect()
}

/// Builds a rich text array, split into chunks the API accepts.
pub fn rich_text(text: &str) -> Value {
    let chars: Vec<char> = text.chars().collect();
    let chunks: Vec<Value> = chars
        .chunks(MAX_TEXT_CHUNK)
        .map(|chunk| {
            let content: String = chunk.iter().collect();
            json!({ "type": "text", "text": { "content": content } })
        })
        .collect();
    Value::Array(chunks)
}

/// Encodes fields as page properties.
///
/// Read-only properties are skipped. A field without a matching property,
/// or whose value does not fit the property type, is an error.
pub fn encode_properties(fields: &Fields, schema: &DatabaseSchema) -> NotionResult<Properties> {
    let mut properties = Properties::new();
    for (name, field) in fields {
        let kind = schema
            .kind(name)
            .ok_or_else(|| NotionError::property(name, "not a property of the database"))?;
        if !kind.is_writable() {
            continue;
        }
        let value = encode_value(name, kind, field)?;
        properties.insert(name.clone(), json!({ kind.as_str(): value }));
    }
    Ok(properties)
}

fn encode_value(name: &str, kind: &PropertyKind, field: &FieldValue) -> NotionResult<Value> {
    let mismatch = || {
        NotionError::property(
            name,
            format!("{} value does not fit a {} property", field.kind(), kind.as_str()),
        )
    };

    let value = match (kind, field) {
        (PropertyKind::Title | PropertyKind::RichText, FieldValue::Text(s)) => rich_text(s),
        (PropertyKind::Select | PropertyKind::Status, FieldValue::Text(s)) => {
            if s.is_empty() {
                Value::Null
            } else {
                json!({ "name": s })
            }
        }
        (PropertyKind::Url | PropertyKind::Email | PropertyKind::PhoneNumber, FieldValue::Text(s)) => {
            if s.is_empty() {
                Value::Null
            } else {
                Value::String(s.clone())
            }
        }
        (PropertyKind::Number, FieldValue::Text(s)) => encode_number(name, s)?,
        (PropertyKind::MultiSelect, FieldValue::Tags(tags)) => {
            Value::Array(tags.iter().map(|t| json!({ "name": t })).collect())
        }
        (PropertyKind::MultiSelect, FieldValue::List(tags)) => {
            Value::Array(tags.iter().map(|t| json!({ "name": t })).collect())
        }
        (PropertyKind::Relation, FieldValue::Reference(ids)) => {
            Value::Array(ids.iter().map(|id| json!({ "id": id })).collect())
        }
        (PropertyKind::Date, FieldValue::Timestamp(ts)) => json!({ "start": date_string(ts) }),
        (PropertyKind::Date, FieldValue::Text(s)) if s.is_empty() => Value::Null,
        (PropertyKind::Date, FieldValue::Text(s)) => {
            let ts = parse_timestamp(s).ok_or_else(|| NotionError::property(name, format!("invalid date {s:?}")))?;
            json!({ "start": date_string(&ts) })
        }
        (PropertyKind::Checkbox, FieldValue::Checkbox(b)) => Value::Bool(*b),
        _ => return Err(mismatch()),
    };
    Ok(value)
}

fn encode_number(name: &str, s: &str) -> NotionResult<Value> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Value::Null);
    }
    if let Ok(n) = s.parse::<i64>() {
        return Ok(Value::Number(n.into()));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| NotionError::property(name, format!("invalid number {s:?}")))
}

/// Renders a timestamp as a date, or as a UTC datetime when it has a time.
fn date_string(ts: &DateTime<Utc>) -> String {
    if ts.num_seconds_from_midnight() == 0 && ts.nanosecond() == 0 {
        ts.format("%Y-%m-%d").to_string()
    } else {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schema() -> DatabaseSchema {
        DatabaseSchema::new()
            .with_property("Name", PropertyKind::Title)
            .with_property("Notes", PropertyKind::RichText)
            .with_property("Status", PropertyKind::Status)
            .with_property("Kind", PropertyKind::Select)
            .with_property("Tags", PropertyKind::MultiSelect)
            .with_property("Related", PropertyKind::Relation)
            .with_property("Due", PropertyKind::Date)
            .with_property("Done", PropertyKind::Checkbox)
            .with_property("Rating", PropertyKind::Number)
            .with_property("Link", PropertyKind::Url)
            .with_property("Edited", PropertyKind::LastEditedTime)
            .with_property("Total", PropertyKind::Other("formula".into()))
    }

    fn api_page() -> Properties {
        let value = json!({
            "Name": { "id": "title", "type": "title", "title": [
                { "type": "text", "text": { "content": "Weekly " }, "plain_text": "Weekly " },
                { "type": "text", "text": { "content": "review" }, "plain_text": "review" }
            ]},
            "Status": { "id": "s", "type": "status", "status": { "id": "1", "name": "Done", "color": "green" } },
            "Kind": { "id": "k", "type": "select", "select": null },
            "Tags": { "id": "t", "type": "multi_select", "multi_select": [
                { "id": "a", "name": "work" }, { "id": "b", "name": "#root" }
            ]},
            "Related": { "id": "r", "type": "relation", "relation": [{ "id": "p-2" }, { "id": "p-1" }], "has_more": false },
            "Due": { "id": "d", "type": "date", "date": { "start": "2024-05-01", "end": null, "time_zone": null } },
            "Done": { "id": "c", "type": "checkbox", "checkbox": true },
            "Rating": { "id": "n", "type": "number", "number": 4 },
            "Link": { "id": "u", "type": "url", "url": null },
            "Edited": { "id": "e", "type": "last_edited_time", "last_edited_time": "2024-05-02T10:30:00.000Z" },
            "Total": { "id": "f", "type": "formula", "formula": { "type": "number", "number": 3 } }
        });
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn decodes_api_page() {
        let fields = decode_properties(&api_page(), &schema());
        assert_eq!(fields["Name"], FieldValue::text("Weekly review"));
        assert_eq!(fields["Status"], FieldValue::text("Done"));
        assert_eq!(fields["Kind"], FieldValue::text(""));
        assert_eq!(fields["Tags"], FieldValue::tags(["#root", "work"]));
        assert_eq!(
            fields["Related"],
            FieldValue::Reference(vec!["p-2".into(), "p-1".into()])
        );
        assert_eq!(
            fields["Due"],
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(fields["Done"], FieldValue::Checkbox(true));
        assert_eq!(fields["Rating"], FieldValue::text("4"));
        assert_eq!(fields["Link"], FieldValue::text(""));
        assert_eq!(
            fields["Edited"],
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 2, 10, 30, 0).unwrap())
        );
        assert!(!fields.contains_key("Total"));
    }

    #[test]
    fn empty_date_is_absent() {
        let mut props = Properties::new();
        props.insert("Due".into(), json!({ "type": "date", "date": null }));
        assert!(decode_properties(&props, &schema()).is_empty());
    }

    #[test]
    fn encoded_properties_decode_to_the_same_fields() {
        let fields = decode_properties(&api_page(), &schema());
        let encoded = encode_properties(&fields, &schema()).unwrap();
        assert!(!encoded.contains_key("Edited"), "read-only skipped");
        assert_eq!(encoded["Kind"], json!({ "select": null }));
        assert_eq!(encoded["Due"], json!({ "date": { "start": "2024-05-01" } }));
        assert_eq!(encoded["Rating"], json!({ "number": 4 }));

        // Written values carry no `type`; the schema supplies it.
        let mut expected = fields.clone();
        expected.remove("Edited");
        assert_eq!(decode_properties(&encoded, &schema()), expected);
    }

    #[test]
    fn timestamps_with_time_keep_it() {
        let mut fields = Fields::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 15, 0).unwrap();
        fields.insert("Due".into(), FieldValue::Timestamp(at));
        let encoded = encode_properties(&fields, &schema()).unwrap();
        assert_eq!(
            encoded["Due"],
            json!({ "date": { "start": "2024-05-01T09:15:00.000Z" } })
        );
    }

    #[test]
    fn long_text_is_chunked() {
        let text = "é".repeat(MAX_TEXT_CHUNK + 5);
        let value = rich_text(&text);
        let chunks = value.as_array().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(plain_text(&value), text);
        assert_eq!(rich_text(""), json!([]));
    }

    #[test]
    fn encoding_errors() {
        let bad = |name: &str, field: FieldValue| {
            let mut fields = Fields::new();
            fields.insert(name.into(), field);
            encode_properties(&fields, &schema()).unwrap_err()
        };
        assert!(matches!(
            bad("Missing", FieldValue::text("x")),
            NotionError::Property { property, .. } if property == "Missing"
        ));
        assert!(matches!(bad("Done", FieldValue::text("yes")), NotionError::Property { .. }));
        assert!(matches!(bad("Rating", FieldValue::text("lots")), NotionError::Property { .. }));
        assert!(matches!(bad("Due", FieldValue::text("soon")), NotionError::Property { .. }));
    }

    #[test]
    fn numbers_keep_their_shape() {
        assert_eq!(encode_number("n", "3").unwrap(), json!(3));
        assert_eq!(encode_number("n", "2.5").unwrap(), json!(2.5));
        assert_eq!(encode_number("n", " ").unwrap(), Value::Null);
    }
}
