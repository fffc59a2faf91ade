//! A content-defined Merkle Search Tree.
//!
//! Entries live at level 0 of an ordered [`NodeStore`](store::NodeStore);
//! every higher level holds one hash per *chunk* of the level below, and
//! chunk edges are decided by the node hashes themselves. The shape of the
//! tree is therefore a pure function of its contents: stores that hold the
//! same entries hold the same nodes and the same root hash, no matter what
//! order the writes arrived in. That makes the root a cheap commitment for
//! verifying, comparing, or replicating a key-value index.
//!
//! [`Tree`](tree::Tree) mutates one entry at a time and repairs the levels
//! above it incrementally; [`Builder`](builder::Builder) derives all levels
//! in one pass over pre-written entries. Storage and hashing stay behind the
//! [`NodeStore`](store::NodeStore) trait and [`digest::Digest`], so backends
//! and hash functions are pluggable.

pub mod builder;
pub mod error;
pub mod hash;
pub mod node;
pub mod prelude;
pub mod store;
pub mod testing;
pub mod tree;

#[doc(hidden)]
/// This is a hidden module to make the macros defined on this crate available for the users.
pub mod __dependencies {
    pub use paste;
    pub use proptest;
    pub use test_strategy;
}

/// Generates the conformance suite for a [`NodeStore`](store::NodeStore)
/// implementation: upsert/get/delete round-trips, ascending anchor-first
/// forward scans, mirrored backward scans, restartability, and metadata
/// handling. Backends that pass are safe to put under a
/// [`Tree`](tree::Tree).
///
/// Takes a module name, the hash width to test at, and an expression
/// producing an empty store:
///
/// ```ignore
/// mst::test_node_store!(memory, 16, MemoryStore::<16>::new());
/// ```
#[macro_export]
macro_rules! test_node_store {
    ($name:ident, $width:literal, $new:expr) => {
        $crate::__dependencies::paste::paste! {
            mod [<test_store_ $name>] {
                use std::collections::BTreeMap;

                use $crate::__dependencies::proptest::prelude::*;
                use $crate::__dependencies::test_strategy;
                use $crate::prelude::*;

                use super::*;

                fn fresh() -> Result<impl NodeStore<$width>> {
                    let mut store = $new;
                    store.initialize(
                        Metadata {
                            width: $width,
                            fanout: 4,
                        },
                        true,
                    )?;
                    Ok(store)
                }

                #[test]
                fn test_metadata_round_trip() {
                    let store = fresh().unwrap();
                    assert_eq!(
                        store.get_metadata().unwrap(),
                        Metadata {
                            width: $width,
                            fanout: 4,
                        }
                    );
                }

                #[test]
                fn test_initialize_rejects_changed_metadata() {
                    let mut store = fresh().unwrap();
                    assert!(store
                        .initialize(
                            Metadata {
                                width: $width,
                                fanout: 8,
                            },
                            false,
                        )
                        .is_err());
                }

                #[test]
                fn test_initialize_clear_resets() {
                    let mut store = fresh().unwrap();
                    store
                        .set_node(Node::branch(1, Key::from(vec![7u8]), Hash::zero()))
                        .unwrap();

                    store
                        .initialize(
                            Metadata {
                                width: $width,
                                fanout: 8,
                            },
                            true,
                        )
                        .unwrap();

                    assert_eq!(store.get_metadata().unwrap().fanout, 8);
                    assert_eq!(store.nodes(1).unwrap().count(), 0);
                }

                #[test_strategy::proptest(fork = false)]
                fn test_set_then_get(nodes: Vec<Node<$width>>) {
                    let mut store = fresh()?;

                    let mut expected = BTreeMap::new();
                    for node in nodes {
                        expected.insert((node.level, node.key.clone()), node.clone());
                        store.set_node(node)?;
                    }

                    for ((level, key), node) in &expected {
                        let got = store.get_node(*level, key)?;
                        prop_assert_eq!(got.as_ref(), Some(node));
                    }
                }

                #[test_strategy::proptest(fork = false)]
                fn test_upsert_overwrites(node: Node<$width>, hash: Hash<$width>) {
                    let mut store = fresh()?;
                    store.set_node(node.clone())?;

                    let mut updated = node.clone();
                    updated.hash = hash;
                    store.set_node(updated.clone())?;

                    prop_assert_eq!(store.get_node(node.level, &node.key)?, Some(updated));
                }

                #[test_strategy::proptest(fork = false)]
                fn test_delete_removes(node: Node<$width>) {
                    let mut store = fresh()?;
                    store.set_node(node.clone())?;

                    store.delete_node(node.level, &node.key)?;
                    prop_assert_eq!(store.get_node(node.level, &node.key)?, None);

                    // deleting an absent node stays silent
                    store.delete_node(node.level, &node.key)?;
                }

                #[test_strategy::proptest(fork = false)]
                fn test_forward_is_sorted(
                    nodes: Vec<Node<$width>>,
                    #[strategy(0u32..4)] level: u32,
                ) {
                    let mut store = fresh()?;
                    for node in nodes {
                        store.set_node(node)?;
                    }

                    let scan = store.nodes(level)?.collect::<Result<Vec<_>>>()?;
                    for pair in scan.windows(2) {
                        prop_assert!(pair[0].key < pair[1].key);
                    }
                    for node in &scan {
                        prop_assert_eq!(node.level, level);
                    }
                }

                #[test_strategy::proptest(fork = false)]
                fn test_forward_starts_at_key(
                    nodes: Vec<Node<$width>>,
                    #[strategy(0u32..4)] level: u32,
                    start: Key,
                ) {
                    let mut store = fresh()?;
                    for node in nodes {
                        store.set_node(node)?;
                    }

                    for node in store.forward(level, &start)? {
                        prop_assert!(node?.key >= start);
                    }
                }

                #[test_strategy::proptest(fork = false)]
                fn test_forward_is_restartable(
                    nodes: Vec<Node<$width>>,
                    #[strategy(0u32..4)] level: u32,
                ) {
                    let mut store = fresh()?;
                    for node in nodes {
                        store.set_node(node)?;
                    }

                    let first = store.nodes(level)?.collect::<Result<Vec<_>>>()?;
                    let again = store.nodes(level)?.collect::<Result<Vec<_>>>()?;
                    prop_assert_eq!(first, again);
                }

                #[test_strategy::proptest(fork = false)]
                fn test_backward_mirrors_forward(
                    nodes: Vec<Node<$width>>,
                    #[strategy(0u32..4)] level: u32,
                    start: Key,
                ) {
                    let mut store = fresh()?;
                    for node in nodes {
                        store.set_node(node)?;
                    }

                    let mut mirrored = store
                        .nodes(level)?
                        .collect::<Result<Vec<_>>>()?
                        .into_iter()
                        .filter(|node| node.key <= start)
                        .collect::<Vec<_>>();
                    mirrored.reverse();

                    let backward = store.backward(level, &start)?.collect::<Result<Vec<_>>>()?;
                    prop_assert_eq!(backward, mirrored);
                }
            }
        }
    };
}
