use std::array::TryFromSliceError;

use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// A level exists without its anchor node. The backing store is corrupt
    /// or was never initialized.
    #[error("missing anchor node at level {0}")]
    MissingAnchor(u32),

    /// A chunk was asked to start at a key with no node stored there.
    #[error("missing chunk start at level {0}")]
    MissingChunkStart(u32),

    /// No anchor or boundary node exists at or before a key on its level.
    #[error("no chunk start found at or before key at level {0}")]
    MissingSibling(u32),

    #[error("root node not found")]
    MissingRoot,

    /// A level-0 entry was stored without its value.
    #[error("entry node has no value")]
    MissingValue,

    #[error("hash width must be at least 4 bytes, got {0}")]
    InvalidWidth(usize),

    /// The digest algorithm emits fewer bytes than the tree's hash width.
    #[error("digest output is {output} bytes, hash width needs {width}")]
    ShortDigest { output: usize, width: usize },

    #[error("fanout must be at least 2, got {0}")]
    InvalidFanout(u32),

    #[error("store metadata mismatch: found width {width}, fanout {fanout}")]
    MetadataMismatch { width: u8, fanout: u32 },

    #[error("store has not been initialized")]
    Uninitialized,

    #[error("failed to deserialize: {0}")]
    FailedDeserialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<hex::FromHexError> for Error {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn from(error: hex::FromHexError) -> Self {
        Error::FailedDeserialization(format!("{}", error))
    }
}

impl From<TryFromSliceError> for Error {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn from(error: TryFromSliceError) -> Self {
        Error::FailedDeserialization(format!("invalid slice format: {}", error))
    }
}
