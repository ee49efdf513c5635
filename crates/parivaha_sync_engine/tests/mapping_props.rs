//! Property tests for the mapping round-trip law.

use chrono::{DateTime, Utc};
use parivaha_model::{FieldKind, FieldValue, Record, Revision, Side};
use parivaha_sync_engine::{Direction, Encoding, FieldMapping, FieldRule, MappingEngine};
use proptest::prelude::*;

fn mapping() -> FieldMapping {
    FieldMapping::new(vec![
        FieldRule::new("Name", FieldKind::Text, "title"),
        FieldRule::new("Tags", FieldKind::Tags, "tags"),
        FieldRule::new("Related", FieldKind::Reference, "related").with_encoding(Encoding::List),
        FieldRule::new("Parent", FieldKind::Reference, "parent"),
        FieldRule::new("Sources", FieldKind::Reference, "sources").with_encoding(Encoding::Join {
            separator: ";".into(),
        }),
        FieldRule::new("Due", FieldKind::Timestamp, "due"),
        FieldRule::new("Canvas", FieldKind::Checkbox, "canvas"),
        FieldRule::new("Day", FieldKind::Timestamp, "day")
            .with_encoding(Encoding::Date)
            .with_direction(Direction::ToVault),
    ])
}

fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9-]{1,12}").expect("Invalid regex")
}

fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800, 0u32..1000).prop_map(|(secs, millis)| {
        DateTime::from_timestamp(secs, millis * 1_000_000).unwrap_or_default()
    })
}

prop_compose! {
    fn notion_record_strategy()(
        name in ".{0,40}",
        tags in prop::collection::btree_set("[#a-zA-Z0-9/_-]{1,10}", 0..5),
        related in prop::collection::vec(id_strategy(), 0..5),
        parent in prop::collection::vec(id_strategy(), 0..=1),
        sources in prop::collection::vec(id_strategy(), 0..4),
        due in timestamp_strategy(),
        day in timestamp_strategy(),
        canvas in any::<bool>(),
        body in ".{0,80}",
    ) -> Record {
        Record::new("page", Side::Notion, Revision::Counter(1))
            .with_field("Name", FieldValue::Text(name))
            .with_field("Tags", FieldValue::Tags(tags))
            .with_field("Related", FieldValue::Reference(related))
            .with_field("Parent", FieldValue::Reference(parent))
            .with_field("Sources", FieldValue::Reference(sources))
            .with_field("Due", FieldValue::Timestamp(due))
            .with_field("Day", FieldValue::Timestamp(day))
            .with_field("Canvas", FieldValue::Checkbox(canvas))
            .with_body(body)
    }
}

proptest! {
    #[test]
    fn bidirectional_fields_survive_round_trip(record in notion_record_strategy()) {
        let engine = MappingEngine::new(mapping()).unwrap();
        let vault = engine.to_vault(&record).unwrap();
        let back = engine.to_notion(&vault).unwrap();

        for rule in engine.bidirectional_rules() {
            prop_assert_eq!(back.field(&rule.notion_field), record.field(&rule.notion_field));
        }
        prop_assert_eq!(&back.body, &record.body);
        // One-directional fields never flow back.
        prop_assert!(back.field("Day").is_none());
    }

    #[test]
    fn canonical_form_agrees_across_sides(record in notion_record_strategy()) {
        let engine = MappingEngine::new(mapping()).unwrap();
        let vault = engine.to_vault(&record).unwrap();
        prop_assert_eq!(engine.canonical(&record).unwrap(), engine.canonical(&vault).unwrap());
    }
}
