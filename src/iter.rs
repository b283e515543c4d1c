use std::iter::FusedIterator;

use crossbeam_epoch::Shared;

use crate::{state::RingState, types::RingHasher};

/// An iterator over the `(position, node)` pairs of a ring snapshot, in
/// ascending position order.
///
/// It is created by [`Ring::iter`] and borrows the epoch [`Guard`] passed to
/// it, which keeps the underlying snapshot alive: mutations of the ring that
/// happen while the iterator exists are not observed by it.
///
///
///  [`Ring::iter`]: struct.Ring.html#method.iter
///  [`Guard`]: https://docs.rs/crossbeam-epoch/0.9/crossbeam_epoch/struct.Guard.html
pub struct Iter<'guard, H>
where
    H: RingHasher,
{
    inner_ptr: Shared<'guard, RingState<H>>,
    front: usize,
    back: usize,
}

impl<'guard, H> Iter<'guard, H>
where
    H: RingHasher,
{
    #[inline]
    pub(crate) fn new(inner_ptr: Shared<'guard, RingState<H>>, len: usize) -> Self {
        Iter {
            inner_ptr,
            front: 0,
            back: len,
        }
    }

    fn entry(&self, at: usize) -> Option<(u64, &'guard str)> {
        // SAFETY: `self.inner_ptr` was loaded under the guard this iterator
        // borrows, so the snapshot it points to outlives `self`.
        let inner = unsafe { self.inner_ptr.as_ref() }.expect("Iter's inner RingState is null!");
        let position = *inner.positions.get(at)?;
        inner
            .owners
            .get(&position)
            .map(|node| (position, &**node))
    }
}

impl<'guard, H> Iterator for Iter<'guard, H>
where
    H: RingHasher,
{
    type Item = (u64, &'guard str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            self.front += 1;
            self.entry(self.front - 1)
        } else {
            None
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let rem = self.back - self.front;
        (rem, Some(rem))
    }
}

impl<'guard, H> DoubleEndedIterator for Iter<'guard, H>
where
    H: RingHasher,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            self.back -= 1;
            self.entry(self.back)
        } else {
            None
        }
    }
}

impl<'guard, H> ExactSizeIterator for Iter<'guard, H>
where
    H: RingHasher,
{
    #[inline]
    fn len(&self) -> usize {
        self.back - self.front
    }
}

impl<'guard, H: RingHasher> FusedIterator for Iter<'guard, H> {}
