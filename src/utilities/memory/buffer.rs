use std::ops::{Index, IndexMut};
use std::{
    marker::PhantomData,
    ptr::{copy_nonoverlapping, NonNull},
};

/// Span of heap memory addressed through a raw pointer.
///
/// Unlike a `Vec`, a buffer can hand out mutable access to individual elements through a shared
/// reference with [`Buffer::get_shared_mut`]. The solver relies on this to let workers write
/// disjoint bundles of the same buffer at the same time.
pub struct Buffer<T: Copy + Default> {
    memory: NonNull<T>,
    length: usize,
    /// Marks the buffer as logically owning its elements.
    _marker: PhantomData<T>,
}

unsafe impl<T: Copy + Default + Send> Send for Buffer<T> {}
unsafe impl<T: Copy + Default + Sync> Sync for Buffer<T> {}

impl<T: Copy + Default> Buffer<T> {
    /// Allocates a buffer of `length` default-initialized elements.
    pub fn new(length: usize) -> Self {
        let boxed: Box<[T]> = vec![T::default(); length].into_boxed_slice();
        let memory = NonNull::new(Box::into_raw(boxed) as *mut T).unwrap_or(NonNull::dangling());
        Self {
            memory,
            length,
            _marker: PhantomData,
        }
    }

    /// Returns the length of the buffer in typed elements.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> &T {
        debug_assert!(index < self.length, "Index out of range.");
        unsafe { &*self.memory.as_ptr().add(index) }
    }

    #[inline(always)]
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        debug_assert!(index < self.length, "Index out of range.");
        unsafe { &mut *self.memory.as_ptr().add(index) }
    }

    /// Gets a mutable reference to an element through a shared reference.
    ///
    /// # Safety
    /// No other reference to the same element may be live for the returned lifetime.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_shared_mut(&self, index: usize) -> &mut T {
        debug_assert!(index < self.length, "Index out of range.");
        &mut *self.memory.as_ptr().add(index)
    }

    /// Gets a mutable view of a region through a shared reference.
    ///
    /// # Safety
    /// No other reference into the region may be live for the returned lifetime.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_shared_mut(&self, start: usize, count: usize) -> &mut [T] {
        debug_assert!(start + count <= self.length, "Slice region out of bounds.");
        std::slice::from_raw_parts_mut(self.memory.as_ptr().add(start), count)
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.memory.as_ptr(), self.length) }
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.memory.as_ptr(), self.length) }
    }

    /// Resets a region of the buffer to default values.
    pub fn clear(&mut self, start: usize, count: usize) {
        debug_assert!(start + count <= self.length, "Clear region out of bounds.");
        self.as_mut_slice()[start..start + count].fill(T::default());
    }

    /// Copies a region of this buffer into another buffer.
    pub fn copy_to(&self, source_start: usize, target: &mut Buffer<T>, target_start: usize, count: usize) {
        debug_assert!(source_start + count <= self.length, "Source region out of bounds.");
        debug_assert!(target_start + count <= target.length, "Target region out of bounds.");
        unsafe {
            copy_nonoverlapping(
                self.memory.as_ptr().add(source_start),
                target.memory.as_ptr().add(target_start),
                count,
            );
        }
    }

    /// Reallocates the buffer to the given length, keeping as many leading elements as fit.
    pub fn resize(&mut self, new_length: usize) {
        if new_length == self.length {
            return;
        }
        let mut replacement = Buffer::new(new_length);
        self.copy_to(0, &mut replacement, 0, self.length.min(new_length));
        *self = replacement;
    }
}

impl<T: Copy + Default> Default for Buffer<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T: Copy + Default> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        let mut copy = Buffer::new(self.length);
        self.copy_to(0, &mut copy, 0, self.length);
        copy
    }
}

impl<T: Copy + Default> Drop for Buffer<T> {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.memory.as_ptr(),
                self.length,
            )));
        }
    }
}

impl<T: Copy + Default> Index<usize> for Buffer<T> {
    type Output = T;

    #[inline(always)]
    fn index(&self, index: usize) -> &T {
        self.get(index)
    }
}

impl<T: Copy + Default> IndexMut<usize> for Buffer<T> {
    #[inline(always)]
    fn index_mut(&mut self, index: usize) -> &mut T {
        self.get_mut(index)
    }
}

impl<T: Copy + Default + std::fmt::Debug> std::fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_preserves_prefix() {
        let mut buffer = Buffer::<i32>::new(4);
        for i in 0..4 {
            buffer[i] = i as i32 + 1;
        }
        buffer.resize(8);
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4, 0, 0, 0, 0]);
        buffer.resize(2);
        assert_eq!(buffer.as_slice(), &[1, 2]);
    }

    #[test]
    fn clear_resets_region() {
        let mut buffer = Buffer::<f32>::new(5);
        buffer.as_mut_slice().fill(3.0);
        buffer.clear(1, 3);
        assert_eq!(buffer.as_slice(), &[3.0, 0.0, 0.0, 0.0, 3.0]);
    }

    #[test]
    fn empty_buffers_are_valid() {
        let mut buffer = Buffer::<u64>::default();
        assert!(buffer.is_empty());
        buffer.resize(0);
        let copy = buffer.clone();
        assert_eq!(copy.len(), 0);
    }
}
