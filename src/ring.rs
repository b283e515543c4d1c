use std::fmt::{Display, Formatter};
use std::mem;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};
use log::trace;

use crate::{
    iter::Iter,
    state::RingState,
    types::{Crc64Hasher, Result, RingHasher, Update, DEFAULT_REPLICAS},
};

/// The consistent hashing ring data structure.
///
/// Users will probably interact with this crate mostly through this type, as
/// it is central to its API.
///
/// A `Ring` maps arbitrary string keys onto the set of currently registered
/// node identifiers. The mapping is deterministic for a fixed ring state, and
/// registering or unregistering a single node only remaps the keys owned by
/// that node's virtual positions.
///
/// All methods take `&self`: lookups run lock-free on an atomically published
/// snapshot of the ring state, while mutations serialize on an internal lock,
/// clone the current snapshot, modify the clone and publish it atomically.
/// In multi-threaded contexts, the ring needs to be wrapped in [`Arc`].
#[derive(Debug)]
pub struct Ring<H = Crc64Hasher>
where
    H: RingHasher,
{
    inner: Atomic<RingState<H>>,
    // Serializes mutations; readers never touch it.
    writer: Mutex<()>,
}

impl Ring<Crc64Hasher> {
    /// Create an empty `Ring` with [`DEFAULT_REPLICAS`] virtual positions per
    /// node and the built-in [`Crc64Hasher`].
    #[inline]
    pub fn new() -> Self {
        Self::with_replicas(DEFAULT_REPLICAS)
    }

    /// Create an empty `Ring` with the given number of virtual positions per
    /// node and the built-in [`Crc64Hasher`].
    ///
    /// A replica count of `0` is coerced to `1`; every registered node always
    /// owns at least one position.
    #[inline]
    pub fn with_replicas(replicas: usize) -> Self {
        Self::with_hasher(Crc64Hasher::default(), replicas)
    }
}

impl Default for Ring<Crc64Hasher> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Ring<H>
where
    H: RingHasher,
{
    /// Create an empty `Ring` with the given number of virtual positions per
    /// node, employing the provided [`RingHasher`] to place virtual nodes and
    /// keys on the ring.
    ///
    /// Both parameters are fixed for the lifetime of the ring. A replica
    /// count of `0` is coerced to `1`.
    pub fn with_hasher(hasher: H, replicas: usize) -> Self {
        Self {
            inner: Atomic::new(RingState::new(hasher, replicas.max(1))),
            writer: Mutex::new(()),
        }
    }

    /// Atomically load the current snapshot and hand it to `f`.
    ///
    /// This is the shared-access discipline every read path goes through;
    /// the epoch guard keeps the snapshot alive for the duration of the call
    /// even if a writer publishes a new one concurrently.
    fn read<T>(&self, f: impl FnOnce(&RingState<H>) -> T) -> T {
        let guard = epoch::pin();
        let inner = self.inner.load(Ordering::Acquire, &guard);
        // SAFETY: `self.inner` is initialized non-null on construction and
        // only ever swapped for another non-null snapshot by `update()`,
        // always with Acquire/Release orderings.
        let inner = unsafe { inner.as_ref() }.expect("inner RingState is null!");
        f(inner)
    }

    /// Apply a batch of additions or removals as one atomically published
    /// state transition.
    ///
    /// This is the read-copy-update write path: load the current snapshot,
    /// clone it, mutate the clone, swap the pointer, and defer destruction of
    /// the superseded snapshot until no reader can still observe it. The
    /// writer lock serializes mutations, so the swap cannot race another
    /// writer and needs no compare-and-exchange.
    fn update<S>(&self, op: Update, ids: &[S])
    where
        S: AsRef<str>,
    {
        let _writer = self.writer.lock().expect("ring writer lock poisoned");

        let guard = epoch::pin();
        let curr_ptr = self.inner.load(Ordering::Acquire, &guard);
        // SAFETY: see `read()`; additionally, the writer lock is held, so no
        // other thread swaps the pointer underneath us.
        let curr = unsafe { curr_ptr.as_ref() }.expect("inner RingState is null!");

        let mut next = curr.clone();
        let mut changed = false;
        for id in ids {
            changed |= match op {
                Update::Add => next.add(id.as_ref()),
                Update::Remove => next.remove(id.as_ref()),
            };
        }
        // Idempotent no-ops publish nothing; readers keep the old snapshot.
        if !changed {
            return;
        }

        let old = self.inner.swap(Owned::new(next), Ordering::AcqRel, &guard);
        trace!("published new ring state, retiring {:?}", old);
        // SAFETY: `old` was just unlinked and can no longer be loaded; it is
        // destroyed only after every thread pinned at this epoch unpins, so
        // in-flight readers stay valid.
        unsafe {
            guard.defer_destroy(old);
        }
        guard.flush();
    }

    /// Register a node, placing its virtual positions on the ring.
    ///
    /// Registration is idempotent: adding an already-registered node succeeds
    /// silently with no state change.
    #[inline]
    pub fn add_node(&self, id: &str) {
        self.update(Update::Add, &[id])
    }

    /// Register every node yielded by the iterator, as a single atomic state
    /// transition.
    #[inline]
    pub fn add_nodes<I>(&self, ids: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let ids: Vec<_> = ids.into_iter().collect();
        self.update(Update::Add, &ids)
    }

    /// Unregister a node, removing its virtual positions from the ring.
    ///
    /// Removal is idempotent: removing an absent node succeeds silently with
    /// no state change.
    #[inline]
    pub fn remove_node(&self, id: &str) {
        self.update(Update::Remove, &[id])
    }

    /// Unregister every node yielded by the iterator, as a single atomic
    /// state transition.
    #[inline]
    pub fn remove_nodes<I>(&self, ids: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let ids: Vec<_> = ids.into_iter().collect();
        self.update(Update::Remove, &ids)
    }

    /// Resolve a key to the node owning the first virtual position at or
    /// after the key's hash, wrapping around the end of the position table.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::EmptyRing`] if no nodes are registered.
    ///
    ///
    ///  [`RingError::EmptyRing`]: enum.RingError.html#variant.EmptyRing
    #[inline]
    pub fn node_for_key(&self, key: &str) -> Result<Arc<str>> {
        self.read(|state| state.node_for_key(key))
    }

    /// Resolve a key to `n` distinct nodes, in ring-walk order starting at
    /// the key's position.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::InsufficientNodes`] if `n` exceeds the number of
    /// currently registered physical nodes.
    ///
    ///
    ///  [`RingError::InsufficientNodes`]: enum.RingError.html#variant.InsufficientNodes
    #[inline]
    pub fn nodes_for_key(&self, key: &str, n: usize) -> Result<Vec<Arc<str>>> {
        self.read(|state| state.nodes_for_key(key, n))
    }

    /// Shorthand for [`Ring::nodes_for_key`] with `n = 3`, a practical
    /// default replication factor.
    #[inline]
    pub fn three_nodes_for_key(&self, key: &str) -> Result<Vec<Arc<str>>> {
        self.nodes_for_key(key, 3)
    }

    /// Returns `true` if a node with the given identifier is currently
    /// registered.
    #[inline]
    pub fn has_node(&self, id: &str) -> bool {
        self.read(|state| state.has_node(id))
    }

    /// Returns the number of currently registered physical nodes.
    #[inline]
    pub fn len_nodes(&self) -> usize {
        self.read(|state| state.len_nodes())
    }

    /// Returns the number of virtual positions currently on the ring.
    ///
    /// Barring hash collisions, this equals [`Ring::len_nodes`] multiplied by
    /// the configured replica count.
    #[inline]
    pub fn len_virtual_nodes(&self) -> usize {
        self.read(|state| state.len_virtual_nodes())
    }

    /// Returns `true` if no nodes are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len_nodes() == 0
    }

    /// Returns an [`Iter`] over the `(position, node)` pairs of the snapshot
    /// current at the time of the call, in ascending position order.
    ///
    /// The iterator keeps observing that snapshot even if the ring is mutated
    /// while it is alive; the `guard` pins the snapshot for the iterator's
    /// lifetime.
    #[inline]
    pub fn iter<'guard>(&self, guard: &'guard Guard) -> Iter<'guard, H> {
        let inner_ptr = self.inner.load(Ordering::Acquire, guard);
        // SAFETY: see `read()`.
        let inner = unsafe { inner_ptr.as_ref() }.expect("inner RingState is null!");
        Iter::new(inner_ptr, inner.len_virtual_nodes())
    }
}

impl<H> Clone for Ring<H>
where
    H: RingHasher,
{
    /// Clone the ring by snapshotting it: the clone starts from the state
    /// current at the time of the call and evolves independently afterwards.
    fn clone(&self) -> Self {
        Self {
            inner: Atomic::new(self.read(|state| state.clone())),
            writer: Mutex::new(()),
        }
    }
}

impl<H> Extend<String> for Ring<H>
where
    H: RingHasher,
{
    /// Extend the ring by the node identifiers yielded by the iterator,
    /// delegating to [`Ring::add_nodes`].
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.add_nodes(iter)
    }
}

impl<H> Display for Ring<H>
where
    H: RingHasher,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.read(|state| write!(f, "{}", state))
    }
}

impl<H> Drop for Ring<H>
where
    H: RingHasher,
{
    fn drop(&mut self) {
        // `&mut self` proves no reader or writer is left, so the final
        // snapshot can be reclaimed in place instead of going through the
        // epoch machinery.
        let inner = mem::replace(&mut self.inner, Atomic::null());
        // SAFETY: `inner` is non-null (see `read()`) and unreachable from any
        // other thread at this point.
        drop(unsafe { inner.into_owned() });
    }
}
