//! Property tests for the store contract.

use logrelay::{
    CustomerFilter, Level, LevelFilter, LogRecord, RecordDraft, RecordInput, Store, StoreConfig,
    Timestamp,
};
use proptest::prelude::*;
use tempfile::TempDir;

fn test_store(dir: &TempDir) -> Store {
    Store::create(StoreConfig {
        path: dir.path().join("store"),
        sync_interval: 100,
        create_if_missing: true,
    })
    .unwrap()
}

/// A generated draft: (sent_at, level bits, customer).
type DraftFields = (i64, u32, Option<u8>);

fn any_draft() -> impl Strategy<Value = DraftFields> {
    (0i64..100, 0u32..16, proptest::option::of(0u8..3))
}

fn customer_name(tag: u8) -> String {
    format!("cust{}", tag)
}

fn build(fields: DraftFields) -> RecordInput {
    let (sent_at, level, customer) = fields;
    let mut draft = RecordDraft::new(Level(level)).with_sent_at(Timestamp(sent_at));
    if let Some(tag) = customer {
        draft = draft.with_customer(customer_name(tag));
    }
    RecordInput::from_draft(draft, Timestamp::now())
}

/// Reference predicate mirroring the query contract.
fn model_matches(
    record: &LogRecord,
    from: Timestamp,
    levels: LevelFilter,
    customer: &CustomerFilter,
) -> bool {
    record.sent_at >= from
        && levels.passes(record.level)
        && customer.matches(record.customer_id.as_deref())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_append_ids_strictly_increasing(drafts in prop::collection::vec(any_draft(), 1..50)) {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let mut last_id = None;
        for fields in drafts {
            let record = store.append(build(fields)).unwrap();
            if let Some(prev) = last_id {
                prop_assert!(record.id > prev);
            }
            last_id = Some(record.id);
        }
    }

    #[test]
    fn prop_query_range_matches_model(
        drafts in prop::collection::vec(any_draft(), 0..40),
        from in 0i64..100,
        filter_bits in 0u32..16,
        customer_tag in proptest::option::of(0u8..4),
    ) {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let mut all = Vec::new();
        for fields in drafts {
            all.push(store.append(build(fields)).unwrap());
        }

        let from = Timestamp(from);
        let levels = LevelFilter(filter_bits);
        let customer = match customer_tag {
            // Tag 3 is a customer nothing was ingested under
            Some(tag) => CustomerFilter::parse(&customer_name(tag)),
            None => CustomerFilter::All,
        };

        let mut expected: Vec<LogRecord> = all
            .iter()
            .filter(|r| model_matches(r, from, levels, &customer))
            .cloned()
            .collect();
        expected.sort_by_key(|r| (r.sent_at, r.id));

        let actual = store.query_range(from, levels, &customer).unwrap();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_delete_before_partitions(
        drafts in prop::collection::vec(any_draft(), 0..40),
        cutoff in 0i64..100,
    ) {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let mut all = Vec::new();
        for fields in drafts {
            all.push(store.append(build(fields)).unwrap());
        }

        let cutoff = Timestamp(cutoff);
        let removed = store.delete_before(cutoff).unwrap();
        let expected_removed = all.iter().filter(|r| r.sent_at < cutoff).count() as u64;
        prop_assert_eq!(removed, expected_removed);

        // Survivors are exactly the records at or past the cutoff, untouched
        let mut expected: Vec<LogRecord> = all
            .iter()
            .filter(|r| r.sent_at >= cutoff)
            .cloned()
            .collect();
        expected.sort_by_key(|r| (r.sent_at, r.id));

        let actual = store
            .query_range(Timestamp(0), LevelFilter::ALL, &CustomerFilter::All)
            .unwrap();
        prop_assert_eq!(actual, expected);

        // Idempotent
        prop_assert_eq!(store.delete_before(cutoff).unwrap(), 0);
    }

    #[test]
    fn prop_count_agrees_with_query(
        drafts in prop::collection::vec(any_draft(), 0..40),
        customer_tag in proptest::option::of(0u8..3),
    ) {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        for fields in drafts {
            store.append(build(fields)).unwrap();
        }

        let customer = match customer_tag {
            Some(tag) => CustomerFilter::parse(&customer_name(tag)),
            None => CustomerFilter::All,
        };

        let by_query = store
            .query_range(Timestamp(0), LevelFilter::ALL, &customer)
            .unwrap()
            .len() as u64;
        prop_assert_eq!(store.count(&customer), by_query);
    }
}
