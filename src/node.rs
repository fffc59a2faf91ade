use std::fmt::{self, Formatter};

use digest::Digest;
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;

use crate::hash::Hash;

/// Position of a node within its level: either the level's single anchor
/// slot, or a real byte-string key.
///
/// The derived ordering puts `Anchor` strictly before every byte key, so an
/// ascending level scan always yields the anchor first.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Anchor,
    Bytes(Vec<u8>),
}

impl Key {
    pub fn is_anchor(&self) -> bool {
        matches!(self, Key::Anchor)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Key::Anchor => None,
            Key::Bytes(bytes) => Some(bytes),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Key::Anchor => write!(f, "(anchor)"),
            Key::Bytes(bytes) => write!(f, "{}", hex::encode(bytes)),
        }
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key::Bytes(bytes)
    }
}

impl Arbitrary for Key {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            1 => Just(Key::Anchor),
            9 => vec(any::<u8>(), 0..24).prop_map(Key::Bytes),
        ]
        .boxed()
    }
}

/// One stored unit of the tree, unique per `(level, key)`.
///
/// Level 0 holds the actual entries; every higher level aggregates one chunk
/// of the level below it. Only keyed level-0 nodes carry a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node<const K: usize> {
    pub level: u32,
    pub key: Key,
    pub hash: Hash<K>,
    pub value: Option<Vec<u8>>,
}

impl<const K: usize> Node<K> {
    /// Builds a level-0 entry for `(key, value)`.
    ///
    /// The digest input frames both fields with a 4-byte big-endian length so
    /// no two distinct pairs can collide by concatenation.
    pub fn entry<D: Digest>(key: &[u8], value: &[u8]) -> Self {
        let mut hasher = D::new();
        hasher.update((key.len() as u32).to_be_bytes());
        hasher.update(key);
        hasher.update((value.len() as u32).to_be_bytes());
        hasher.update(value);

        Node {
            level: 0,
            key: Key::from(key),
            hash: Hash::finalize(hasher),
            value: Some(value.to_vec()),
        }
    }

    /// Builds a keyed aggregate node for a chunk starting at `key`.
    pub fn branch(level: u32, key: Key, hash: Hash<K>) -> Self {
        Node {
            level,
            key,
            hash,
            value: None,
        }
    }

    /// Builds the anchor node of `level`.
    pub fn anchor(level: u32, hash: Hash<K>) -> Self {
        Node {
            level,
            key: Key::Anchor,
            hash,
            value: None,
        }
    }

    pub fn is_anchor(&self) -> bool {
        self.key.is_anchor()
    }

    /// Whether this node starts a new chunk, given the limit derived from the
    /// tree's fanout. Anchors never do; they start the first chunk of their
    /// level by definition, not by content.
    pub fn is_boundary(&self, limit: u32) -> bool {
        !self.key.is_anchor() && self.hash.prefix() < limit
    }
}

/// The boundary threshold for a target fanout: a keyed node starts a chunk
/// iff the first four bytes of its hash, read big-endian, fall below
/// `floor(2^32 / fanout)`.
pub fn boundary_limit(fanout: u32) -> u32 {
    ((1u64 << 32) / fanout as u64) as u32
}

impl<const K: usize> Arbitrary for Node<K> {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        (0u32..4, any::<Key>(), any::<Hash<K>>(), vec(any::<u8>(), 0..16))
            .prop_map(|(level, key, hash, value)| {
                let value = (level == 0 && !key.is_anchor()).then_some(value);
                Node {
                    level,
                    key,
                    hash,
                    value,
                }
            })
            .boxed()
    }
}

#[cfg(all(test, feature = "blake3"))]
mod tests {
    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;

    #[test]
    fn test_anchor_orders_first() {
        assert!(Key::Anchor < Key::Bytes(vec![]));
        assert!(Key::Anchor < Key::Bytes(vec![0x00]));
        assert!(Key::Bytes(vec![0x00]) < Key::Bytes(vec![0x00, 0x00]));
    }

    #[proptest(fork = false)]
    fn test_entry_is_deterministic(key: Vec<u8>, value: Vec<u8>) {
        prop_assert_eq!(
            Node::<16>::entry::<blake3::Hasher>(&key, &value),
            Node::<16>::entry::<blake3::Hasher>(&key, &value),
        );
    }

    #[proptest(fork = false)]
    fn test_entry_framing_separates_fields(key: Vec<u8>, value: Vec<u8>) {
        prop_assume!(!key.is_empty());

        // move the last key byte into the value; the concatenation is
        // identical but the hash must not be
        let mut shifted_key = key.clone();
        let moved = shifted_key.pop().unwrap();
        let mut shifted_value = vec![moved];
        shifted_value.extend_from_slice(&value);

        prop_assert_ne!(
            Node::<16>::entry::<blake3::Hasher>(&key, &value).hash,
            Node::<16>::entry::<blake3::Hasher>(&shifted_key, &shifted_value).hash,
        );
    }

    #[proptest(fork = false)]
    fn test_anchor_is_never_a_boundary(hash: Hash<16>) {
        let anchor = Node::anchor(0, hash);
        prop_assert!(!anchor.is_boundary(u32::MAX));
    }

    #[test]
    fn test_boundary_limit_divides_the_prefix_space() {
        assert_eq!(boundary_limit(2), 1 << 31);
        assert_eq!(boundary_limit(4), 1 << 30);
        assert_eq!(boundary_limit(3), 0x5555_5555);
    }

    #[test]
    fn test_boundary_rate_tracks_fanout() {
        let fanout = 8;
        let limit = boundary_limit(fanout);

        let hits = (1u32..=65536)
            .filter(|i| {
                let hash = Hash::<16>::digest::<blake3::Hasher>(&i.to_be_bytes());
                Node::branch(1, Key::from(i.to_be_bytes().to_vec()), hash).is_boundary(limit)
            })
            .count();

        // 65536 samples at rate 1/8: mean 8192, six sigma is about 500
        assert!(
            (7692..=8692).contains(&hits),
            "boundary rate drifted: {hits} of 65536"
        );
    }
}
