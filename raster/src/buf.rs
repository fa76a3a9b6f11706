//! Shared sample buffers.
//!
//! A raster and any child view derived from it operate on the *same* allocation. The aliasing is
//! load-bearing: writing a pixel through the child must be observable through the parent at the
//! translated coordinate and vice versa. We model this with a reference counted slice of `Cell`s,
//! the unsynchronized sharing primitive also used for shared image buffers. Cloning a
//! [`SampleCells`] clones the handle, never the data.
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::Cell;

/// A shared, unsynchronized buffer of samples.
///
/// All clones alias one allocation. The buffer also carries the mutation epoch consumed by an
/// external caching layer: every bulk mutation bumps it through [`SampleCells::mark_mutated`],
/// which happens-after the corresponding writes on this (single) thread.
pub struct SampleCells<T> {
    data: Rc<[Cell<T>]>,
    epoch: Rc<Cell<u64>>,
}

impl<T: Copy> SampleCells<T> {
    /// Allocate a buffer of `len` zeroed samples.
    pub fn zeroed(len: usize) -> Self
    where
        T: bytemuck::Zeroable,
    {
        let data: Vec<Cell<T>> = (0..len).map(|_| Cell::new(T::zeroed())).collect();
        SampleCells {
            data: data.into(),
            epoch: Rc::new(Cell::new(0)),
        }
    }

    /// Take ownership of existing samples.
    pub fn from_vec(samples: Vec<T>) -> Self {
        let data: Vec<Cell<T>> = samples.into_iter().map(Cell::new).collect();
        SampleCells {
            data: data.into(),
            epoch: Rc::new(Cell::new(0)),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read the sample at `idx`.
    ///
    /// Callers have validated `idx` against the raster layout; an index past the end is a bug in
    /// this crate and fails loud.
    #[inline]
    pub fn get(&self, idx: usize) -> T {
        self.data[idx].get()
    }

    #[inline]
    pub fn set(&self, idx: usize, value: T) {
        self.data[idx].set(value);
    }

    /// Copy `out.len()` samples starting at `start` into `out`.
    pub fn load(&self, start: usize, out: &mut [T]) {
        for (cell, out) in self.data[start..start + out.len()].iter().zip(out) {
            *out = cell.get();
        }
    }

    /// Copy all of `src` into the buffer starting at `start`.
    pub fn store(&self, start: usize, src: &[T]) {
        for (cell, src) in self.data[start..start + src.len()].iter().zip(src) {
            cell.set(*src);
        }
    }

    /// Copy a range from another (or the same) buffer.
    pub fn copy_from(&self, dst_start: usize, src: &SampleCells<T>, src_start: usize, len: usize) {
        for i in 0..len {
            self.data[dst_start + i].set(src.data[src_start + i].get());
        }
    }

    /// Whether two handles alias the same allocation.
    pub fn aliases(&self, other: &SampleCells<T>) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// Bump the mutation epoch.
    pub fn mark_mutated(&self) {
        self.epoch.set(self.epoch.get().wrapping_add(1));
    }

    /// The current mutation epoch, shared by all aliases.
    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }
}

impl<T> Clone for SampleCells<T> {
    fn clone(&self) -> Self {
        SampleCells {
            data: Rc::clone(&self.data),
            epoch: Rc::clone(&self.epoch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SampleCells;

    #[test]
    fn clones_alias() {
        let cells = SampleCells::<u8>::zeroed(4);
        let alias = cells.clone();
        alias.set(2, 0xaa);
        assert_eq!(cells.get(2), 0xaa);
        assert!(cells.aliases(&alias));
    }

    #[test]
    fn epoch_is_shared() {
        let cells = SampleCells::<u16>::zeroed(1);
        let alias = cells.clone();
        assert_eq!(cells.epoch(), 0);
        alias.mark_mutated();
        assert_eq!(cells.epoch(), 1);
    }
}
