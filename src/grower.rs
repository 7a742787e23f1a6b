use std::{
  alloc::{self, Layout},
  ptr::NonNull,
};

use libc::{c_void, intptr_t, sbrk};

use crate::{align::MIN_ALIGN, align_to, error::HeapError};

/// Source of fresh address space for a [`Heap`](crate::Heap).
///
/// # Safety
/// A successful `extend(bytes)` must return a [`MIN_ALIGN`]-aligned region
/// valid for reads and writes of `bytes` bytes that overlaps no region
/// returned earlier and stays valid for as long as the grower lives.
/// Consecutive regions should follow each other directly; the heap rejects
/// any that don't.
pub unsafe trait HeapGrower {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, HeapError>;
}

/// Grows the process data segment with `sbrk(2)`.
///
/// Memory obtained this way is never handed back to the operating system.
#[derive(Debug, Default)]
pub struct SbrkGrower {
  aligned: bool,
}

impl SbrkGrower {
  pub const fn new() -> Self {
    Self { aligned: false }
  }
}

fn sbrk_failed(address: *mut c_void) -> bool {
  address == usize::MAX as *mut c_void
}

unsafe impl HeapGrower for SbrkGrower {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, HeapError> {
    let increment = intptr_t::try_from(bytes).map_err(|_| HeapError::Exhausted)?;

    unsafe {
      if !self.aligned {
        let brk = sbrk(0);
        if sbrk_failed(brk) {
          return Err(HeapError::Exhausted);
        }

        let padding = align_to!(brk as usize, MIN_ALIGN) - brk as usize;
        if padding > 0 && sbrk_failed(sbrk(padding as intptr_t)) {
          return Err(HeapError::Exhausted);
        }
        self.aligned = true;
      }

      let address = sbrk(increment);
      if sbrk_failed(address) {
        return Err(HeapError::Exhausted);
      }

      NonNull::new(address as *mut u8).ok_or(HeapError::Exhausted)
    }
  }
}

/// Hands out a fixed-capacity buffer front to back.
///
/// Each arena is independent, so several heaps can coexist in one process.
/// The buffer is released when the grower is dropped.
#[derive(Debug)]
pub struct ArenaGrower {
  base: NonNull<u8>,
  layout: Layout,
  used: usize,
}

// SAFETY: the arena exclusively owns its buffer
unsafe impl Send for ArenaGrower {}

impl ArenaGrower {
  /// Reserves an arena of at least `capacity` bytes.
  ///
  /// # Panics
  /// Panics if `capacity` exceeds `isize::MAX` once rounded up to
  /// [`MIN_ALIGN`].
  pub fn new(capacity: usize) -> Self {
    let Ok(layout) = Layout::from_size_align(capacity.max(MIN_ALIGN), MIN_ALIGN) else {
      panic!("arena capacity of {capacity} bytes is too large");
    };

    // SAFETY: the layout has a non-zero size
    let base = unsafe { alloc::alloc(layout) };
    let Some(base) = NonNull::new(base) else {
      alloc::handle_alloc_error(layout);
    };

    Self {
      base,
      layout,
      used: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  pub fn remaining(&self) -> usize {
    self.capacity() - self.used
  }
}

unsafe impl HeapGrower for ArenaGrower {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, HeapError> {
    let end = self
      .used
      .checked_add(bytes)
      .filter(|&end| end <= self.capacity())
      .ok_or(HeapError::Exhausted)?;

    // SAFETY: `used <= capacity`, so the offset stays inside the buffer
    let start = unsafe { self.base.add(self.used) };
    self.used = end;

    Ok(start)
  }
}

impl Drop for ArenaGrower {
  fn drop(&mut self) {
    // SAFETY: `base` was allocated with exactly this layout
    unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_extends_contiguously() {
    let mut arena = ArenaGrower::new(256);

    let first = arena.extend(64).unwrap();
    let second = arena.extend(32).unwrap();

    assert_eq!(first.as_ptr() as usize % MIN_ALIGN, 0);
    assert_eq!(second.as_ptr() as usize, first.as_ptr() as usize + 64);
    assert_eq!(arena.remaining(), 256 - 96);
  }

  #[test]
  fn test_arena_exhaustion() {
    let mut arena = ArenaGrower::new(128);

    assert!(arena.extend(128).is_ok());
    assert_eq!(arena.extend(16), Err(HeapError::Exhausted));
    assert_eq!(arena.extend(usize::MAX), Err(HeapError::Exhausted));
    assert_eq!(arena.remaining(), 0);
  }

  #[test]
  fn test_arena_minimum_capacity() {
    let arena = ArenaGrower::new(0);
    assert_eq!(arena.capacity(), MIN_ALIGN);
  }

  // with `c-api` the process heap owns the program break
  #[cfg(not(feature = "c-api"))]
  #[test]
  fn test_sbrk_extension_is_aligned_and_writable() {
    let mut grower = SbrkGrower::new();

    let region = grower.extend(64).unwrap();
    assert_eq!(region.as_ptr() as usize % MIN_ALIGN, 0);

    unsafe {
      region.as_ptr().write_bytes(0x5A, 64);
      assert_eq!(*region.as_ptr().add(63), 0x5A);
    }
  }

  #[test]
  fn test_sbrk_rejects_oversized_request() {
    let mut grower = SbrkGrower::new();
    assert_eq!(grower.extend(usize::MAX), Err(HeapError::Exhausted));
  }
}
