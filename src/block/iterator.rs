//! SortedBlock Iterator
//!
//! Lazy iteration over a position range of a block, in either direction.

use std::borrow::Borrow;
use std::marker::PhantomData;

use crate::codec::Codec;
use crate::error::Result;

use super::SortedBlock;

/// Iterator over decoded entries of a borrowed or owned block
///
/// Entries are decoded one at a time. Each call to `SortedBlock::iter` or
/// `SortedBlock::range` starts an independent iterator.
pub struct BlockIter<B, E> {
    block: B,
    /// Next position to yield when walking forward
    front: usize,
    /// One past the next position to yield when walking backward
    back: usize,
    reverse: bool,
    _entry: PhantomData<fn() -> E>,
}

impl<B, E> BlockIter<B, E>
where
    B: Borrow<SortedBlock<E>>,
    E: Codec,
{
    pub(super) fn new(block: B, start: usize, end: usize, reverse: bool) -> Self {
        Self {
            block,
            front: start,
            back: end,
            reverse,
            _entry: PhantomData,
        }
    }

    /// Entries left to yield
    pub fn remaining(&self) -> usize {
        self.back - self.front
    }

    /// Borrow the underlying block
    pub fn block(&self) -> &SortedBlock<E> {
        self.block.borrow()
    }
}

impl<B, E> Iterator for BlockIter<B, E>
where
    B: Borrow<SortedBlock<E>>,
    E: Codec,
{
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }

        let pos = if self.reverse {
            self.back -= 1;
            self.back
        } else {
            self.front += 1;
            self.front - 1
        };

        self.block.borrow().get(pos).transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}
