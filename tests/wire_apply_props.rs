//! Property tests: replaying wire items reproduces the leader's store.

use proptest::prelude::*;
use replpool::{
    apply_local_batches, to_wire_items, Engine, MemoryEngine, Pool, StoreId, ENGINE_MEMORY,
};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

fn key() -> impl Strategy<Value = Vec<u8>> {
    // Small key space so deletes and overwrites actually collide
    prop::collection::vec(0u8..4, 1..3)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (key(), prop::collection::vec(any::<u8>(), 0..16)).prop_map(|(k, v)| Op::Put(k, v)),
        1 => key().prop_map(Op::Delete),
    ]
}

fn pool_with_store(id: i32) -> Pool {
    let pool = Pool::new();
    pool.register(
        StoreId(id),
        "mem://store",
        ENGINE_MEMORY,
        Arc::new(MemoryEngine::new("mem://store")),
        false,
    )
    .unwrap();
    pool
}

proptest! {
    #[test]
    fn wire_apply_matches_local_apply(batches in prop::collection::vec(prop::collection::vec(op(), 0..8), 1..6)) {
        let leader = pool_with_store(3);
        let follower = pool_with_store(3);
        let mut keys = BTreeSet::new();

        let mut addressed = Vec::new();
        for ops in &batches {
            let mut batch = leader.new_batch(StoreId(3)).unwrap();
            for op in ops {
                match op {
                    Op::Put(k, v) => {
                        batch.batch.put(k, v);
                        keys.insert(k.clone());
                    }
                    Op::Delete(k) => {
                        batch.batch.delete(k);
                        keys.insert(k.clone());
                    }
                }
            }
            addressed.push(batch);
        }

        let items = to_wire_items(&addressed).unwrap();
        apply_local_batches(&addressed).unwrap();
        follower.apply_wire_items(&items).unwrap();

        let leader_store = leader.engine(StoreId(3)).unwrap();
        let follower_store = follower.engine(StoreId(3)).unwrap();
        for k in &keys {
            prop_assert_eq!(follower_store.get(k).unwrap(), leader_store.get(k).unwrap());
        }
    }
}
