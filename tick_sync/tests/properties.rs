use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::Decimal;
use tick_common::{Channel, DisplayRecord, InstrumentId, RawTick, TickBatch};
use tick_sync::classifier::classify;
use tick_sync::interest::{InterestRegistry, InterestSet};
use tick_sync::storage::MemoryStorage;
use tick_sync::store::ReconciliationStore;

proptest! {
    #[test]
    fn merging_a_batch_twice_changes_nothing_the_second_time(
        batch in any_batch(),
        interests in any_interests(),
    ) {
        let registry = InterestRegistry::empty().with_set(Channel::Watchlist, interests);
        let mut store = ReconciliationStore::open(Channel::Watchlist, Arc::new(MemoryStorage::new()));
        let subset = classify(&batch, &registry).remove(&Channel::Watchlist).unwrap_or_default();

        let first = store.merge(&subset);
        prop_assert!(first.storage_error.is_none());
        let after_first = store.snapshot();

        let second = store.merge(&subset);
        prop_assert!(!second.changed);
        prop_assert!(Arc::ptr_eq(&after_first, &store.snapshot()));
    }

    #[test]
    fn channels_hold_exactly_their_interesting_instruments(
        batches in prop::collection::vec(any_batch(), 1..6),
        watch in any_interests(),
        marquee in any_interests(),
    ) {
        let registry = InterestRegistry::empty()
            .with_set(Channel::Watchlist, watch.clone())
            .with_set(Channel::Marquee, marquee.clone());
        let storage = Arc::new(MemoryStorage::new());
        let mut stores: BTreeMap<Channel, ReconciliationStore> = Channel::ALL
            .iter()
            .map(|&c| (c, ReconciliationStore::open(c, storage.clone())))
            .collect();

        let mut latest: BTreeMap<InstrumentId, RawTick> = BTreeMap::new();
        for batch in &batches {
            for (channel, subset) in classify(batch, &registry) {
                let _ = stores.get_mut(&channel).unwrap().merge(&subset);
            }
            latest.extend(batch.iter().map(|(id, tick)| (id.clone(), tick.clone())));
        }

        for (channel, interests) in [(Channel::Watchlist, &watch), (Channel::Marquee, &marquee)] {
            let state = stores[&channel].snapshot();
            for id in state.keys() {
                prop_assert!(interests.contains_key(id));
            }
            for (id, name) in interests {
                match latest.get(id) {
                    Some(tick) => prop_assert_eq!(state.get(id), Some(&DisplayRecord::from_tick(name, tick))),
                    None => prop_assert!(!state.contains_key(id)),
                }
            }
        }
        prop_assert!(stores[&Channel::Global].snapshot().is_empty());
    }
}

fn any_decimal() -> impl Strategy<Value = Option<Decimal>> {
    prop::option::of((-1_000_000i64..1_000_000i64, 0u32..4).prop_map(|(m, scale)| Decimal::new(m, scale)))
}

fn any_tick() -> impl Strategy<Value = RawTick> {
    (any_decimal(), any_decimal(), any_decimal()).prop_map(|(last_price, net_change, change)| RawTick {
        last_price,
        net_change,
        change,
    })
}

fn any_batch() -> impl Strategy<Value = TickBatch> {
    prop::collection::btree_map((0u64..20).prop_map(InstrumentId::from), any_tick(), 0..12)
}

fn any_interests() -> impl Strategy<Value = InterestSet> {
    prop::collection::btree_map((0u64..20).prop_map(InstrumentId::from), "[A-Z]{1,6}", 0..8)
}
