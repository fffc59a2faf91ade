use proptest::collection::{btree_map, vec, SizeRange};
use proptest::prelude::*;

/// Unique byte keys in ascending order.
pub fn keys(size: impl Into<SizeRange>) -> impl Strategy<Value = Vec<Vec<u8>>> {
    btree_map(vec(any::<u8>(), 1..16), Just(()), size)
        .prop_map(|keys| keys.into_keys().collect())
}

/// Unique `(key, value)` pairs in ascending key order.
pub fn entries(size: impl Into<SizeRange>) -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    btree_map(vec(any::<u8>(), 1..16), vec(any::<u8>(), 0..16), size)
        .prop_map(|map| map.into_iter().collect())
}

/// The same unique pairs, in a generated application order.
pub fn shuffled_entries(
    size: impl Into<SizeRange>,
) -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    entries(size).prop_shuffle()
}
