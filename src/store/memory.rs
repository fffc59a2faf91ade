use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::node::{Key, Node};

use super::{Metadata, NodeIter, NodeStore};

/// Ordered in-memory backend: the reference store for tests and for trees
/// small enough to live on the heap.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore<const K: usize> {
    metadata: Option<Metadata>,
    nodes: BTreeMap<(u32, Key), (Hash<K>, Option<Vec<u8>>)>,
}

impl<const K: usize> MemoryStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(level: u32, key: &Key, entry: &(Hash<K>, Option<Vec<u8>>)) -> Node<K> {
        Node {
            level,
            key: key.clone(),
            hash: entry.0,
            value: entry.1.clone(),
        }
    }
}

impl<const K: usize> NodeStore<K> for MemoryStore<K> {
    fn initialize(&mut self, metadata: Metadata, clear: bool) -> Result<()> {
        if clear {
            self.nodes.clear();
            self.metadata = None;
        }

        match self.metadata {
            Some(existing) if existing != metadata => Err(Error::MetadataMismatch {
                width: existing.width,
                fanout: existing.fanout,
            }),
            _ => {
                self.metadata = Some(metadata);
                Ok(())
            }
        }
    }

    fn get_metadata(&self) -> Result<Metadata> {
        self.metadata.ok_or(Error::Uninitialized)
    }

    fn get_node(&self, level: u32, key: &Key) -> Result<Option<Node<K>>> {
        Ok(self
            .nodes
            .get(&(level, key.clone()))
            .map(|entry| Self::record(level, key, entry)))
    }

    fn set_node(&mut self, node: Node<K>) -> Result<()> {
        self.nodes
            .insert((node.level, node.key), (node.hash, node.value));
        Ok(())
    }

    fn delete_node(&mut self, level: u32, key: &Key) -> Result<()> {
        self.nodes.remove(&(level, key.clone()));
        Ok(())
    }

    fn forward(&self, level: u32, start: &Key) -> Result<NodeIter<'_, K>> {
        let iter = self
            .nodes
            .range((level, start.clone())..)
            .take_while(move |((l, _), _)| *l == level)
            .map(move |((_, key), entry)| Ok(Self::record(level, key, entry)));

        Ok(Box::new(iter))
    }

    fn backward(&self, level: u32, start: &Key) -> Result<NodeIter<'_, K>> {
        let iter = self
            .nodes
            .range((level, Key::Anchor)..=(level, start.clone()))
            .rev()
            .map(move |((_, key), entry)| Ok(Self::record(level, key, entry)));

        Ok(Box::new(iter))
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;

    crate::test_node_store!(memory, 16, MemoryStore::<16>::new());
}
