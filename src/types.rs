use thiserror::Error;

/// Whether an update operation extends or shrinks the ring.
pub(crate) enum Update {
    Add,
    Remove,
}

/// The number of virtual positions per physical node that [`Ring::new`] configures.
///
/// A replica count around 100 keeps the per-node share of the key space
/// reasonably even without making membership changes expensive.
///
///
///  [`Ring::new`]: ../struct.Ring.html
pub const DEFAULT_REPLICAS: usize = 100;

/// A custom `Result` type for this crate, combining a return value with a [`RingError`].
pub type Result<T> = std::result::Result<T, RingError>;

/// An error type returned by the lookup operations of this crate.
///
/// Registration and removal of nodes are total and idempotent, so only the
/// lookups can fail, and only in recoverable ways.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    /// The consistent hashing ring currently has no registered nodes, so no
    /// key can be assigned anywhere.
    #[error("ring is empty; no nodes are registered")]
    EmptyRing,

    /// More distinct nodes were requested than are currently registered in
    /// the consistent hashing ring.
    #[error("requested {requested} distinct nodes but only {available} are registered")]
    InsufficientNodes {
        /// The number of distinct nodes asked for.
        requested: usize,
        /// The number of physical nodes registered at the time of the call.
        available: usize,
    },
}

/// A trait to be implemented by any type that needs to act as the hash
/// strategy placing keys and virtual nodes on the ring.
///
/// The contract is a pure function from a byte sequence to a `u64` ring
/// position: deterministic, free of side effects and safe to call from
/// multiple threads through `&self` without synchronization.
///
/// A blanket implementation covers every `Fn(&[u8]) -> u64` closure, which is
/// handy for plugging deterministic strategies into tests:
///
/// ```rust
/// use consistent_ring::Ring;
///
/// let ring = Ring::with_hasher(|_: &[u8]| 0u64, 100);
/// assert!(ring.is_empty());
/// ```
pub trait RingHasher: Clone {
    /// Hash the given byte slice onto the 64-bit ring position space.
    fn digest(&self, bytes: &[u8]) -> u64;
}

impl<F> RingHasher for F
where
    F: Fn(&[u8]) -> u64 + Clone,
{
    #[inline]
    fn digest(&self, bytes: &[u8]) -> u64 {
        self(bytes)
    }
}

/// The reversed ECMA-182 polynomial used by the default [`Crc64Hasher`].
pub const CRC64_ECMA_POLY: u64 = 0xC96C5795D7870F42;

// Process-wide immutable lookup table, computed at compile time and shared by
// every ring instance.
static CRC64_TABLE: [u64; 256] = make_crc64_table(CRC64_ECMA_POLY);

const fn make_crc64_table(poly: u64) -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ poly } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// The built-in default [`RingHasher`]: a CRC-64 checksum over the reversed
/// ECMA-182 polynomial [`CRC64_ECMA_POLY`].
///
/// It is chosen purely for distribution quality and speed, not for any
/// cryptographic property; it spreads virtual positions around the ring more
/// uniformly than a 64-bit FNV-1a does. The output is bit-exact with the
/// table-driven CRC-64 variants found in other language runtimes (reflected,
/// initial value of all ones, final complement), so rings built with it on
/// different stacks agree on key placement.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc64Hasher;

impl RingHasher for Crc64Hasher {
    fn digest(&self, bytes: &[u8]) -> u64 {
        let mut crc = !0u64;
        for &byte in bytes {
            crc = CRC64_TABLE[((crc ^ byte as u64) & 0xFF) as usize] ^ (crc >> 8);
        }
        !crc
    }
}

/// A [`RingHasher`] implementation based on the 64-bit FNV-1a hash function,
/// as implemented in the [fnv][fnv] crate.
///
/// To use it, the `fnv-hash` crate feature must be enabled. Note that it is
/// observed to distribute virtual positions around the ring less uniformly
/// than the default [`Crc64Hasher`].
///
///
///  [fnv]: https://docs.rs/fnv/1.0/fnv/
#[cfg(any(feature = "fnv-hash", doc))]
#[derive(Debug, Default, Clone, Copy)]
pub struct Fnv64Hasher;

#[cfg(feature = "fnv-hash")]
impl RingHasher for Fnv64Hasher {
    #[inline]
    fn digest(&self, bytes: &[u8]) -> u64 {
        use std::hash::Hasher;

        let mut hasher = fnv::FnvHasher::default();
        hasher.write(bytes);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc64_check_vector() {
        // The standard CRC-64/XZ check value.
        assert_eq!(Crc64Hasher.digest(b"123456789"), 0x995DC9BBDF1939FA);
    }

    #[test]
    fn crc64_empty_input() {
        assert_eq!(Crc64Hasher.digest(b""), 0);
    }

    #[test]
    fn closure_hasher() {
        let constant = |_: &[u8]| 42u64;
        assert_eq!(constant.digest(b"anything"), 42);
    }

    #[cfg(feature = "fnv-hash")]
    #[test]
    fn fnv64_check_vector() {
        // FNV-1a 64-bit of "a".
        assert_eq!(Fnv64Hasher.digest(b"a"), 0xAF63DC4C8601EC8C);
    }
}
