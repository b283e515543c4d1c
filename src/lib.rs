//! A consistent hashing ring with virtual nodes.
//!
//! The [`Ring`] maps arbitrary string keys onto a dynamic set of named nodes.
//! For a fixed ring state the mapping is deterministic, and registering or
//! unregistering a single node only remaps the small fraction of the key
//! space owned by that node's virtual positions. This is the standard
//! building block for sharding, request routing and distributed cache
//! placement.
//!
//! Each physical node is mapped onto the ring `replicas` times to smooth the
//! distribution of the key space. Keys and virtual nodes are placed via a
//! pluggable [`RingHasher`] strategy; the built-in default is a table-driven
//! CRC-64 ([`Crc64Hasher`]) chosen for distribution quality and speed.
//!
//! Lookups are lock-free: readers observe an atomically published, immutable
//! snapshot of the ring state (the crate uses epoch-based memory reclamation
//! from [`crossbeam-epoch`][crossbeam-epoch] underneath). Mutations serialize
//! on an internal lock and never block readers. In multi-threaded contexts,
//! wrap the ring in an [`Arc`][Arc].
//!
//! # Examples
//!
//! ```rust
//! use consistent_ring::{Ring, RingError};
//!
//! let ring = Ring::new();
//! ring.add_nodes(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
//!
//! let owner = ring.node_for_key("user:1234")?;
//! assert!(ring.has_node(&owner));
//!
//! // Two distinct fallback candidates, in ring-walk order.
//! let owners = ring.nodes_for_key("user:1234", 2)?;
//! assert_eq!(owners.len(), 2);
//! assert_ne!(owners[0], owners[1]);
//!
//! ring.remove_node("10.0.0.2");
//! assert_eq!(ring.len_nodes(), 2);
//! # Ok::<(), RingError>(())
//! ```
//!
//!
//!  [crossbeam-epoch]: https://docs.rs/crossbeam-epoch/0.9/crossbeam_epoch/
//!  [Arc]: https://doc.rust-lang.org/std/sync/struct.Arc.html

#![deny(missing_docs)]

mod iter;
mod ring;
mod state;
mod types;

// Re-exported so that callers of `Ring::iter` need not depend on
// crossbeam-epoch themselves.
pub use crossbeam_epoch::{pin, Guard};

pub use crate::iter::Iter;
pub use crate::ring::Ring;
#[cfg(any(feature = "fnv-hash", doc))]
pub use crate::types::Fnv64Hasher;
pub use crate::types::{
    Crc64Hasher, Result, RingError, RingHasher, CRC64_ECMA_POLY, DEFAULT_REPLICAS,
};
