pub use crate::{
    builder::Builder,
    error::{Error, Result},
    hash::Hash,
    node::{boundary_limit, Key, Node},
    store::{MemoryStore, Metadata, NodeIter, NodeStore},
    tree::{Options, Tree},
};
