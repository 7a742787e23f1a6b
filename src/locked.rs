use std::{
  alloc::{GlobalAlloc, Layout},
  ptr::{self, NonNull},
};

use spin::{Mutex, MutexGuard};

use crate::{align::MIN_ALIGN, error::HeapError, grower::HeapGrower, heap::Heap};

/// A [`Heap`] behind a spin lock, held for the whole of every operation.
///
/// The C-style methods report failure as a null pointer.
///
/// ```rust
/// use freelloc::{ArenaGrower, LockedHeap};
///
/// let heap = LockedHeap::new(ArenaGrower::new(4096));
///
/// let ptr = heap.malloc(64);
/// assert!(!ptr.is_null());
/// unsafe { heap.free(ptr) };
/// ```
pub struct LockedHeap<G>(Mutex<Heap<G>>);

impl<G> LockedHeap<G> {
  pub const fn new(grower: G) -> Self {
    Self(Mutex::new(Heap::new(grower)))
  }

  /// Locks the heap for direct access, e.g. to walk or check it.
  pub fn lock(&self) -> MutexGuard<'_, Heap<G>> {
    self.0.lock()
  }
}

fn into_raw(result: Result<NonNull<u8>, HeapError>) -> *mut u8 {
  result.map_or(ptr::null_mut(), NonNull::as_ptr)
}

impl<G: HeapGrower> LockedHeap<G> {
  pub fn malloc(
    &self,
    size: usize,
  ) -> *mut u8 {
    into_raw(self.0.lock().allocate(size))
  }

  pub fn calloc(
    &self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    into_raw(self.0.lock().zero_allocate(count, size))
  }

  /// # Safety
  /// `ptr` must be null or currently allocated from this heap.
  pub unsafe fn realloc(
    &self,
    ptr: *mut u8,
    size: usize,
  ) -> *mut u8 {
    match unsafe { self.0.lock().resize(ptr, size) } {
      Ok(Some(moved)) => moved.as_ptr(),
      Ok(None) | Err(_) => ptr::null_mut(),
    }
  }

  /// # Safety
  /// `ptr` must be null or currently allocated from this heap.
  pub unsafe fn free(
    &self,
    ptr: *mut u8,
  ) {
    unsafe { self.0.lock().release(ptr) }
  }
}

// Payloads are only ever aligned to `MIN_ALIGN`; stricter layouts are refused.
unsafe impl<G: HeapGrower> GlobalAlloc for LockedHeap<G> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > MIN_ALIGN {
      return ptr::null_mut();
    }
    into_raw(self.0.lock().allocate(layout.size()))
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > MIN_ALIGN {
      return ptr::null_mut();
    }
    into_raw(self.0.lock().zero_allocate(1, layout.size()))
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    unsafe { self.0.lock().release(ptr) }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() > MIN_ALIGN {
      return ptr::null_mut();
    }
    match unsafe { self.0.lock().resize(ptr, new_size) } {
      Ok(Some(moved)) => moved.as_ptr(),
      Ok(None) | Err(_) => ptr::null_mut(),
    }
  }
}
