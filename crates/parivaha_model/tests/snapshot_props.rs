//! Property tests for snapshot encoding.

use chrono::{DateTime, Utc};
use parivaha_model::{FieldValue, Fields, PairKey, Revision, Side, Snapshot, SyncPair};
use proptest::prelude::*;

fn revision_strategy() -> impl Strategy<Value = Revision> {
    prop_oneof![
        any::<u64>().prop_map(Revision::Counter),
        "[0-9a-f]{8,16}".prop_map(Revision::Tag),
    ]
}

prop_compose! {
    fn pair_strategy()(
        notion_id in "[a-f0-9]{8}",
        vault_id in "[a-z]{1,8}\\.md",
        notion_revision in revision_strategy(),
        vault_revision in revision_strategy(),
        secs in 0i64..4_102_444_800,
        name in ".{0,20}",
        body in ".{0,40}",
        resolution in prop::option::of(prop_oneof![Just(Side::Notion), Just(Side::Vault)]),
    ) -> SyncPair {
        let mut fields = Fields::new();
        fields.insert("Name".into(), FieldValue::Text(name));
        let mut pair = SyncPair::new(
            PairKey::new(notion_id, vault_id),
            notion_revision,
            vault_revision,
            DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default(),
        )
        .with_base(fields, &body);
        pair.resolution = resolution;
        pair
    }
}

proptest! {
    #[test]
    fn encoding_ignores_insertion_order(pairs in prop::collection::vec(pair_strategy(), 0..8)) {
        let mut forward = Snapshot::new();
        for pair in &pairs {
            forward.upsert(pair.clone());
        }

        // Re-inserting the surviving pairs in reverse must give the same bytes.
        let mut reverse = Snapshot::new();
        let survivors: Vec<SyncPair> = forward.pairs().cloned().collect();
        for pair in survivors.iter().rev() {
            reverse.upsert(pair.clone());
        }

        let bytes = forward.encode().unwrap();
        prop_assert_eq!(&bytes, &reverse.encode().unwrap());
        prop_assert_eq!(Snapshot::decode(&bytes).unwrap(), forward);
    }

    #[test]
    fn any_single_byte_flip_is_detected(pair in pair_strategy(), index in any::<prop::sample::Index>()) {
        let mut snapshot = Snapshot::new();
        snapshot.upsert(pair);
        let mut bytes = snapshot.encode().unwrap();
        let at = index.index(bytes.len());
        bytes[at] ^= 0x01;
        prop_assert!(Snapshot::decode(&bytes).is_err());
    }
}
