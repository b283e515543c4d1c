use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::mem;
use std::sync::Arc;

use log::trace;

use crate::types::{Result, RingError, RingHasher};

/// The snapshot of the ring that readers observe: the registry of physical
/// nodes, the sorted virtual-position table and the position-to-owner map.
///
/// `Ring` publishes a fresh `RingState` atomically on every effective
/// mutation, so all methods here run on an immutable, internally consistent
/// snapshot.
#[derive(Debug, Clone)]
pub(crate) struct RingState<H>
where
    H: RingHasher,
{
    hasher: H,
    replicas: usize,
    registry: HashSet<Arc<str>>,
    // Ascending-sorted, duplicate-free; every entry resolves through `owners`.
    // `crate::iter::Iter` requires access to these fields, hence the `pub(crate)`.
    pub(crate) positions: Vec<u64>,
    pub(crate) owners: HashMap<u64, Arc<str>>,
}

impl<H> RingState<H>
where
    H: RingHasher,
{
    pub(crate) fn new(hasher: H, replicas: usize) -> Self {
        Self {
            hasher,
            replicas,
            registry: HashSet::new(),
            positions: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Derive the ring position of the given replica of a node: the node id
    /// bytes followed by the base-256 little-endian digits of the replica
    /// index (no suffix at all for index 0), run through the hash strategy.
    ///
    /// The buffer is rebuilt from the bare id for every index; appending the
    /// digits onto a buffer shared across iterations would leak earlier
    /// suffixes into later ones.
    fn replica_position(&self, id: &[u8], index: usize) -> u64 {
        let mut input = Vec::with_capacity(id.len() + mem::size_of::<usize>());
        input.extend_from_slice(id);
        let mut i = index;
        while i > 0 {
            input.push((i % 256) as u8);
            i /= 256;
        }
        self.hasher.digest(&input)
    }

    /// Register a node and place its virtual positions, re-sorting the table
    /// once after the batch append. Returns `false` (and changes nothing) if
    /// the node is already registered.
    pub(crate) fn add(&mut self, id: &str) -> bool {
        if self.registry.contains(id) {
            return false;
        }
        let node: Arc<str> = Arc::from(id);
        for index in 0..self.replicas {
            let position = self.replica_position(id.as_bytes(), index);
            if self.owners.insert(position, Arc::clone(&node)).is_none() {
                self.positions.push(position);
            } else {
                // Hash collision: the position stays in the table once and
                // the previous owner is overwritten, last write wins.
                trace!(
                    "position {:#018x} collides; now owned by {:?} (replica {})",
                    position,
                    id,
                    index
                );
            }
        }
        self.positions.sort_unstable();
        self.registry.insert(node);
        trace!("node {:?} registered with {} replicas", id, self.replicas);
        true
    }

    /// Unregister a node, removing its virtual positions by recomputing the
    /// exact same derivation as [`RingState::add`]. Returns `false` (and
    /// changes nothing) if the node is not registered.
    ///
    /// # Panics
    ///
    /// Panics if a recomputed position is missing from the table, or if it is
    /// owned by a different node. Either means a collision overwrote part of
    /// the table and continuing would silently strand entries.
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        if !self.registry.contains(id) {
            return false;
        }
        for index in 0..self.replicas {
            let position = self.replica_position(id.as_bytes(), index);
            let at = self.positions.binary_search(&position).unwrap_or_else(|_| {
                panic!(
                    "position {:#018x} (node {:?}, replica {}) missing from the ring",
                    position, id, index
                )
            });
            self.positions.remove(at);
            let evicted = self
                .owners
                .remove(&position)
                .expect("every position in the table resolves to a registered node");
            if &*evicted != id {
                panic!(
                    "position {:#018x} (node {:?}, replica {}) is owned by {:?}; \
                     removing it would strand the surviving node",
                    position, id, index, evicted
                );
            }
        }
        self.registry.remove(id);
        trace!("node {:?} unregistered", id);
        true
    }

    /// Index of the first position `>=` the target, wrapping past the end of
    /// the table back to index 0. The wrap-around is what makes the position
    /// space circular.
    fn search(&self, target: u64) -> usize {
        match self.positions.binary_search(&target) {
            Ok(at) => at,
            Err(at) if at == self.positions.len() => 0,
            Err(at) => at,
        }
    }

    fn owner_at(&self, at: usize) -> &Arc<str> {
        self.owners
            .get(&self.positions[at])
            .expect("every position in the table resolves to a registered node")
    }

    pub(crate) fn node_for_key(&self, key: &str) -> Result<Arc<str>> {
        if self.positions.is_empty() {
            return Err(RingError::EmptyRing);
        }
        let at = self.search(self.hasher.digest(key.as_bytes()));
        Ok(Arc::clone(self.owner_at(at)))
    }

    /// Walk the table forward from the key's position, wrapping at the end,
    /// collecting owners in ring-walk order until `n` distinct nodes are
    /// found or the walk comes back around to where it started.
    pub(crate) fn nodes_for_key(&self, key: &str, n: usize) -> Result<Vec<Arc<str>>> {
        let available = self.len_nodes();
        if n > available {
            return Err(RingError::InsufficientNodes {
                requested: n,
                available,
            });
        }
        let mut found: Vec<Arc<str>> = Vec::with_capacity(n);
        if n == 0 {
            return Ok(found);
        }
        // Collisions can drain the position table while nodes stay registered,
        // so the registry count alone does not prove the walk has anywhere to
        // start from.
        if self.positions.is_empty() {
            return Err(RingError::EmptyRing);
        }
        let start = self.search(self.hasher.digest(key.as_bytes()));
        let mut at = start;
        loop {
            let owner = self.owner_at(at);
            if !found.iter().any(|node| node == owner) {
                found.push(Arc::clone(owner));
                if found.len() == n {
                    break;
                }
            }
            at = if at + 1 < self.positions.len() { at + 1 } else { 0 };
            // A node whose every position was overwritten by collisions owns
            // nothing; a full lap yields all reachable owners, so stop there.
            if at == start {
                break;
            }
        }
        Ok(found)
    }

    #[inline]
    pub(crate) fn has_node(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    #[inline]
    pub(crate) fn len_nodes(&self) -> usize {
        self.registry.len()
    }

    #[inline]
    pub(crate) fn len_virtual_nodes(&self) -> usize {
        self.positions.len()
    }
}

impl<H> Display for RingState<H>
where
    H: RingHasher,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "RingState ({} nodes X {} replicas) {{",
            self.len_nodes(),
            self.replicas
        )?;
        for (i, position) in self.positions.iter().enumerate() {
            writeln!(
                f,
                "\t- ({:0>6})  {:#018x} -> {}",
                i,
                position,
                self.owners
                    .get(position)
                    .map(|node| &**node)
                    .unwrap_or("<unowned>")
            )?
        }
        writeln!(f, "}}")
    }
}
