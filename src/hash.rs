use std::fmt::{Display, Formatter};
use std::hash::{Hash as StdHash, Hasher};

use digest::Digest;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;

use crate::error::{Error, Result};

/// Fixed-width digest value. `K` is the tree's hash width in bytes; digests
/// wider than `K` are truncated to their first `K` bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Hash<const K: usize>([u8; K]);

impl<const K: usize> Display for Hash<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl<const K: usize> std::fmt::Debug for Hash<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl<const K: usize> Arbitrary for Hash<K> {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        any::<[u8; K]>().prop_map(Hash::new).boxed()
    }
}

impl<const K: usize> StdHash for Hash<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<const K: usize> Hash<K> {
    /// Creates a new Hash from any type that can be converted into [u8; K].
    pub fn new<T: Into<[u8; K]>>(data: T) -> Self {
        Hash(data.into())
    }

    /// Copies a slice of exactly `K` bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        Ok(Hash(slice.try_into()?))
    }

    /// Keeps the first `K` bytes of a wider digest.
    ///
    /// Panics when the input is shorter than `K`; every tree entry point
    /// runs the width check that rules that out.
    pub fn truncated(bytes: &[u8]) -> Self {
        let mut inner = [0u8; K];
        inner.copy_from_slice(&bytes[..K]);
        Hash(inner)
    }

    /// Returns a zero hash (all bytes set to 0).
    pub fn zero() -> Self {
        Self([0u8; K])
    }

    /// Creates a new Hash from a hexadecimal string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = hex::decode(hex)?;

        if bytes.len() != K {
            return Err(hex::FromHexError::InvalidStringLength)?;
        }

        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// One-shot digest of `data`, truncated to `K` bytes.
    pub fn digest<D: Digest>(data: &[u8]) -> Self {
        let mut hasher = D::new();
        hasher.update(data);
        Self::finalize(hasher)
    }

    /// Finishes an incremental digest state, truncated to `K` bytes.
    pub fn finalize<D: Digest>(hasher: D) -> Self {
        Self::truncated(&hasher.finalize())
    }

    /// The first four bytes read as a big-endian integer. This is the value
    /// the chunking rule compares against `floor(2^32 / fanout)`.
    pub fn prefix(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

/// Validates the `(K, D)` pairing once per tree or builder: the chunking rule
/// reads four bytes of every hash, and truncation needs `D` to emit at least
/// `K` bytes.
pub(crate) fn check_width<const K: usize, D: Digest>() -> Result<()> {
    if K < 4 {
        return Err(Error::InvalidWidth(K));
    }

    let output = <D as Digest>::output_size();
    if output < K {
        return Err(Error::ShortDigest { output, width: K });
    }

    Ok(())
}

impl<const K: usize> Default for Hash<K> {
    fn default() -> Self {
        Hash::zero()
    }
}

impl<const K: usize> From<[u8; K]> for Hash<K> {
    fn from(array: [u8; K]) -> Self {
        Hash(array)
    }
}

impl<const K: usize> AsRef<[u8]> for Hash<K> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const K: usize> From<Hash<K>> for [u8; K] {
    fn from(val: Hash<K>) -> Self {
        val.0
    }
}

#[cfg(all(test, feature = "blake3"))]
mod tests {
    use proptest::prelude::*;
    use test_strategy::proptest;

    use crate::error::Error;

    use super::*;

    #[proptest(fork = false)]
    fn test_hex_roundtrip(hash: Hash<16>) {
        prop_assert_eq!(hash, Hash::from_hex(&hash.to_hex())?);
    }

    #[proptest(fork = false)]
    fn test_display_matches_hex(hash: Hash<16>) {
        prop_assert_eq!(format!("{}", hash), hash.to_hex());
    }

    #[proptest(fork = false)]
    fn test_digest_is_deterministic(data: Vec<u8>) {
        prop_assert_eq!(
            Hash::<16>::digest::<blake3::Hasher>(&data),
            Hash::<16>::digest::<blake3::Hasher>(&data),
        );
    }

    #[proptest(fork = false)]
    fn test_truncation_is_a_prefix(data: Vec<u8>) {
        let wide = Hash::<32>::digest::<blake3::Hasher>(&data);
        let narrow = Hash::<16>::digest::<blake3::Hasher>(&data);
        prop_assert_eq!(&wide.as_ref()[..16], narrow.as_ref());
        prop_assert_eq!(wide.prefix(), narrow.prefix());
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(Hash::<16>::from_hex("00ff").is_err());
    }

    #[proptest(fork = false)]
    fn test_from_slice_roundtrip(hash: Hash<16>) {
        prop_assert_eq!(hash, Hash::from_slice(hash.as_ref())?);
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(Hash::<16>::from_slice(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_check_width_bounds() {
        assert_eq!(
            check_width::<2, blake3::Hasher>(),
            Err(Error::InvalidWidth(2))
        );
        assert_eq!(
            check_width::<64, blake3::Hasher>(),
            Err(Error::ShortDigest {
                output: 32,
                width: 64
            })
        );
        assert_eq!(check_width::<16, blake3::Hasher>(), Ok(()));
    }
}
