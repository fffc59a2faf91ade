//! Incremental maintenance of a content-defined search tree.
//!
//! The tree is a stack of levels. Level 0 holds the entries; every higher
//! level holds one aggregate node per *chunk* of the level below. A chunk
//! runs from an anchor or boundary node up to, but excluding, the next
//! boundary, and boundary-ness is decided by the node's own hash (see
//! [`Node::is_boundary`]), never by insertion history. Two stores holding
//! the same entries therefore converge to byte-identical levels and an
//! identical root hash, whatever order their writes arrived in.
//!
//! [`Tree::set`] and [`Tree::delete`] change one entry and then repair the
//! levels above it: the chunk covering the touched position is re-aggregated,
//! nodes that gained or lost boundary status split or merge their chunks, and
//! the anchor chain is recomputed, one level per step, until the top of the
//! tree is a single anchor again. Each step touches a handful of nodes, so a
//! mutation costs O(fanout · height) store operations instead of a rebuild.
//!
//! For loading many entries at once, [`Builder`](crate::builder::Builder)
//! writes the same node format level by level in a single pass and is the
//! cheaper path.

use std::marker::PhantomData;

use digest::Digest;

use crate::error::{Error, Result};
use crate::hash::{check_width, Hash};
use crate::node::{boundary_limit, Key, Node};
use crate::store::{Metadata, NodeStore};

/// Options for [`Tree::initialize`].
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Target average chunk size. Must be at least 2.
    pub fanout: u32,
    /// Truncate any existing contents first.
    pub clear: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            fanout: 32,
            clear: false,
        }
    }
}

/// What the next level up has to recompute after a node changed below it.
enum Step {
    /// Re-aggregate the chunk starting at this key.
    Chunk(Key),
    /// Re-aggregate the level's first chunk, the one the anchor starts.
    Anchor,
    Done,
}

/// The mutation engine: an ordered key-value map stored as content-defined
/// chunks in a [`NodeStore`], hashed with `D` truncated to `K` bytes.
///
/// A single logical writer is assumed; interleaving two mutations on one
/// store corrupts the chunk structure. Readers are free to share the store.
pub struct Tree<const K: usize, D: Digest, S: NodeStore<K>> {
    store: S,
    fanout: u32,
    limit: u32,
    _digest: PhantomData<D>,
}

impl<const K: usize, D: Digest, S: NodeStore<K>> Tree<K, D, S> {
    /// Initializes `store` and attaches to it, writing the level-0 anchor
    /// (the hash of the empty byte sequence) if it is not already present.
    pub fn initialize(mut store: S, options: Options) -> Result<Self> {
        check_width::<K, D>()?;

        if options.fanout < 2 {
            return Err(Error::InvalidFanout(options.fanout));
        }

        store.initialize(
            Metadata {
                width: K as u8,
                fanout: options.fanout,
            },
            options.clear,
        )?;

        if store.get_node(0, &Key::Anchor)?.is_none() {
            store.set_node(Node::anchor(0, Hash::digest::<D>(&[])))?;
        }

        Ok(Self::attach(store, options.fanout))
    }

    /// Attaches to an already-initialized store.
    pub fn open(store: S) -> Result<Self> {
        check_width::<K, D>()?;

        let metadata = store.get_metadata()?;
        if metadata.width as usize != K || metadata.fanout < 2 {
            return Err(Error::MetadataMismatch {
                width: metadata.width,
                fanout: metadata.fanout,
            });
        }

        store.get_node(0, &Key::Anchor)?.ok_or(Error::MissingAnchor(0))?;

        Ok(Self::attach(store, metadata.fanout))
    }

    fn attach(store: S, fanout: u32) -> Self {
        Self {
            store,
            fanout,
            limit: boundary_limit(fanout),
            _digest: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn fanout(&self) -> u32 {
        self.fanout
    }

    /// Looks up the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.store.get_node(0, &Key::from(key))? {
            None => Ok(None),
            Some(Node { value: Some(value), .. }) => Ok(Some(value)),
            Some(_) => Err(Error::MissingValue),
        }
    }

    /// The anchor of the topmost existing level. Its hash commits to every
    /// entry in the tree.
    pub fn root(&self) -> Result<Node<K>> {
        let mut root = self
            .store
            .get_node(0, &Key::Anchor)?
            .ok_or(Error::MissingAnchor(0))?;

        while let Some(above) = self.store.get_node(root.level + 1, &Key::Anchor)? {
            root = above;
        }

        Ok(root)
    }

    /// Inserts or overwrites one entry. Writing the value a key already
    /// holds leaves the store untouched.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let old = self.store.get_node(0, &Key::from(key))?;
        if let Some(node) = &old {
            if node.value.as_deref() == Some(value) {
                return Ok(());
            }
        }

        let step = self.replace_node(old, Node::entry::<D>(key, value))?;
        self.propagate(1, step)
    }

    /// Removes one entry. Absent keys are a silent no-op.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let key = Key::from(key);
        let Some(node) = self.store.get_node(0, &key)? else {
            return Ok(());
        };

        // a deleted boundary takes its whole chunk-marker chain with it
        if node.is_boundary(self.limit) {
            self.delete_parents(0, &key)?;
        }
        self.store.delete_node(0, &key)?;

        let step = self.chunk_step(0, &key)?;
        self.propagate(1, step)
    }

    /// Ordered scan of all entries.
    pub fn entries(&self) -> Result<impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_> {
        let iter = self.store.nodes(0)?.filter_map(|item| match item {
            Ok(node) => match (node.key, node.value) {
                (Key::Anchor, _) => None,
                (Key::Bytes(key), Some(value)) => Some(Ok((key, value))),
                (Key::Bytes(_), None) => Some(Err(Error::MissingValue)),
            },
            Err(error) => Some(Err(error)),
        });

        Ok(iter)
    }

    /// The chunk of lower-level nodes that the node at `(level, key)`
    /// aggregates. Level-0 nodes have no children.
    pub fn children(&self, level: u32, key: &Key) -> Result<Vec<Node<K>>> {
        if level == 0 {
            return Ok(Vec::new());
        }

        let mut iter = self.store.forward(level - 1, key)?;
        let first = iter
            .next()
            .transpose()?
            .ok_or(Error::MissingChunkStart(level - 1))?;
        if first.key != *key {
            return Err(Error::MissingChunkStart(level - 1));
        }

        let mut chunk = vec![first];
        for node in iter {
            let node = node?;
            if node.is_boundary(self.limit) {
                break;
            }
            chunk.push(node);
        }

        Ok(chunk)
    }

    /// Runs the per-level repair loop until the tree converges. `step` is
    /// what `level` has to do; each iteration yields the step for the level
    /// above. Height is O(log n), so this terminates quickly in practice.
    fn propagate(&mut self, mut level: u32, mut step: Step) -> Result<()> {
        loop {
            step = match step {
                Step::Done => return Ok(()),
                Step::Chunk(key) => self.update_chunk(level, key)?,
                Step::Anchor => self.update_anchor(level)?,
            };
            level += 1;
        }
    }

    /// Swaps `old` for `new` at one `(level, key)` slot and restores the
    /// chunk structure around it. Returns the step for the level above.
    fn replace_node(&mut self, old: Option<Node<K>>, new: Node<K>) -> Result<Step> {
        if old.as_ref().is_some_and(|node| node.is_boundary(self.limit)) {
            return self.replace_boundary(new);
        }

        // which chunk covered this position before the write
        let sibling = self.first_sibling(new.level, &new.key)?;

        let level = new.level;
        let key = new.key.clone();
        let boundary = new.is_boundary(self.limit);

        self.store.set_node(new)?;
        if boundary {
            // this key now starts its own chunk at every level it reaches
            self.create_parents(level, &key)?;
        }

        Ok(match sibling {
            Key::Anchor => Step::Anchor,
            sibling => Step::Chunk(sibling),
        })
    }

    /// `old` started a chunk. Either it still does and only its hash moved,
    /// or it stopped being a boundary and its chunk merges into the one
    /// before it.
    fn replace_boundary(&mut self, new: Node<K>) -> Result<Step> {
        let level = new.level;
        let key = new.key.clone();

        if new.is_boundary(self.limit) {
            self.store.set_node(new)?;
            return Ok(Step::Chunk(key));
        }

        self.store.set_node(new)?;
        self.delete_parents(level, &key)?;
        self.chunk_step(level, &key)
    }

    /// The step the level above takes for whichever chunk covers `key` now.
    fn chunk_step(&self, level: u32, key: &Key) -> Result<Step> {
        Ok(match self.first_sibling(level, key)? {
            Key::Anchor => Step::Anchor,
            sibling => Step::Chunk(sibling),
        })
    }

    /// Recomputes the aggregate for the chunk starting at `key` one level
    /// down and swaps it in at `(level, key)`.
    fn update_chunk(&mut self, level: u32, key: Key) -> Result<Step> {
        let old = self.store.get_node(level, &key)?;
        let hash = self.chunk_hash(level, &key)?;
        self.replace_node(old, Node::branch(level, key, hash))
    }

    /// Recomputes the anchor of `level`, shrinking the tree when the level
    /// below no longer holds anything besides its own anchor.
    fn update_anchor(&mut self, level: u32) -> Result<Step> {
        if !self.has_keyed_nodes(level - 1)? {
            // the level below is the new top; everything above it dissolves
            self.delete_parents(level - 1, &Key::Anchor)?;
            return Ok(Step::Done);
        }

        let hash = self.chunk_hash(level, &Key::Anchor)?;
        self.store.set_node(Node::anchor(level, hash))?;

        if self.has_keyed_nodes(level)? {
            Ok(Step::Anchor)
        } else {
            self.delete_parents(level, &Key::Anchor)?;
            Ok(Step::Done)
        }
    }

    /// Aggregate hash of the chunk starting at `start` one level down: the
    /// hashes of its members, digested in key order.
    fn chunk_hash(&self, level: u32, start: &Key) -> Result<Hash<K>> {
        let mut iter = self.store.forward(level - 1, start)?;
        let first = iter
            .next()
            .transpose()?
            .ok_or(Error::MissingChunkStart(level - 1))?;
        if first.key != *start {
            return Err(Error::MissingChunkStart(level - 1));
        }

        let mut hasher = D::new();
        hasher.update(first.hash);
        for node in iter {
            let node = node?;
            if node.is_boundary(self.limit) {
                break;
            }
            hasher.update(node.hash);
        }

        Ok(Hash::finalize(hasher))
    }

    /// The nearest chunk start at or before `key` on `level`, treating the
    /// anchor as the smallest key. The node at `key` itself is absent or a
    /// non-boundary at every call site, so it can never answer.
    fn first_sibling(&self, level: u32, key: &Key) -> Result<Key> {
        for node in self.store.backward(level, key)? {
            let node = node?;
            if node.key.is_anchor() || node.is_boundary(self.limit) {
                return Ok(node.key);
            }
        }

        Err(Error::MissingSibling(level))
    }

    /// `key` just became a boundary at `level`: emit its aggregate one level
    /// up, and keep going while the aggregates themselves land below the
    /// boundary limit. A single write can cascade several levels.
    fn create_parents(&mut self, level: u32, key: &Key) -> Result<()> {
        let mut level = level;
        loop {
            let hash = self.chunk_hash(level + 1, key)?;
            let node = Node::branch(level + 1, key.clone(), hash);
            let boundary = node.is_boundary(self.limit);

            self.store.set_node(node)?;
            if !boundary {
                return Ok(());
            }
            level += 1;
        }
    }

    /// Removes the chunk-marker chain above `(level, key)`, one level at a
    /// time, for as long as it reaches.
    fn delete_parents(&mut self, level: u32, key: &Key) -> Result<()> {
        let mut level = level + 1;
        while self.store.get_node(level, key)?.is_some() {
            self.store.delete_node(level, key)?;
            level += 1;
        }
        Ok(())
    }

    fn has_keyed_nodes(&self, level: u32) -> Result<bool> {
        for node in self.store.nodes(level)? {
            if !node?.key.is_anchor() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
