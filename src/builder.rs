//! One-pass bulk construction.
//!
//! [`Builder`] writes level 0 directly, then derives each higher level in a
//! single ordered scan of the one below it: chunks close at every boundary
//! node and once more at the end of the level, and each closed chunk emits
//! one parent. Building N entries costs one linear pass per level instead of
//! N runs of the incremental repair protocol, so this is the path for
//! initial loads; [`Tree`](crate::tree::Tree) is the path for steady-state
//! writes. Both produce the same nodes, byte for byte.

use std::marker::PhantomData;

use digest::Digest;

use crate::error::{Error, Result};
use crate::hash::{check_width, Hash};
use crate::node::{boundary_limit, Key, Node};
use crate::store::NodeStore;

/// Bulk loader for an initialized store.
///
/// Insertion order does not matter; the store's ordering is what the level
/// passes consume. `finalize` leaves the store holding the same tree an
/// equivalent sequence of [`Tree::set`](crate::tree::Tree::set) calls would
/// have produced.
pub struct Builder<const K: usize, D: Digest, S: NodeStore<K>> {
    store: S,
    limit: u32,
    _digest: PhantomData<D>,
}

impl<const K: usize, D: Digest, S: NodeStore<K>> Builder<K, D, S> {
    /// Attaches to an initialized store, writing the level-0 anchor if it is
    /// not already present.
    pub fn new(mut store: S) -> Result<Self> {
        check_width::<K, D>()?;

        let metadata = store.get_metadata()?;
        if metadata.width as usize != K || metadata.fanout < 2 {
            return Err(Error::MetadataMismatch {
                width: metadata.width,
                fanout: metadata.fanout,
            });
        }

        if store.get_node(0, &Key::Anchor)?.is_none() {
            store.set_node(Node::anchor(0, Hash::digest::<D>(&[])))?;
        }

        Ok(Self {
            store,
            limit: boundary_limit(metadata.fanout),
            _digest: PhantomData,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Writes one entry at level 0. No higher levels are touched until
    /// [`Builder::finalize`].
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.store.set_node(Node::entry::<D>(key, value))
    }

    /// Derives level+1 from one ordered scan of `level`, returning how many
    /// nodes it emitted. Rerunning on an unchanged level rewrites the same
    /// nodes.
    pub fn build_level(&mut self, level: u32) -> Result<usize> {
        let mut parents = Vec::new();

        {
            let mut iter = self.store.nodes(level)?;
            let first = iter
                .next()
                .transpose()?
                .ok_or(Error::MissingAnchor(level))?;
            if !first.key.is_anchor() {
                return Err(Error::MissingAnchor(level));
            }

            let mut chunk_key = Key::Anchor;
            let mut hasher = D::new();
            hasher.update(first.hash);

            for node in iter {
                let node = node?;
                if node.is_boundary(self.limit) {
                    parents.push(Node::branch(level + 1, chunk_key, Hash::finalize(hasher)));
                    chunk_key = node.key.clone();
                    hasher = D::new();
                    hasher.update(node.hash);
                } else {
                    hasher.update(node.hash);
                }
            }

            // the last chunk closes at the end of the level no matter what
            parents.push(Node::branch(level + 1, chunk_key, Hash::finalize(hasher)));
        }

        let count = parents.len();
        for parent in parents {
            self.store.set_node(parent)?;
        }

        Ok(count)
    }

    /// Builds every level above 0 and returns the root node.
    pub fn finalize(&mut self) -> Result<Node<K>> {
        {
            // a leaf level holding only its anchor is already the whole tree
            let mut leaves = self.store.nodes(0)?;
            let first = leaves.next().transpose()?.ok_or(Error::MissingAnchor(0))?;
            if !first.key.is_anchor() {
                return Err(Error::MissingAnchor(0));
            }
            if leaves.next().transpose()?.is_none() {
                return Ok(first);
            }
        }

        let mut level = 0;
        loop {
            let count = self.build_level(level)?;
            level += 1;
            if count == 1 {
                break;
            }
        }

        self.store
            .get_node(level, &Key::Anchor)?
            .ok_or(Error::MissingRoot)
    }
}
