//! C entry points backed by a process-wide heap grown with `sbrk(2)`.
//!
//! Only the four classic functions are provided. Code that reaches the
//! platform allocator through other symbols (`posix_memalign`,
//! `aligned_alloc`, ...) must not hand those pointers to [`free`].

use libc::{c_void, size_t};

use crate::{grower::SbrkGrower, locked::LockedHeap};

static HEAP: LockedHeap<SbrkGrower> = LockedHeap::new(SbrkGrower::new());

/// The heap behind the exported functions.
pub fn global_heap() -> &'static LockedHeap<SbrkGrower> {
  &HEAP
}

/// Allocates `size` uninitialized bytes, or returns null.
///
/// # Safety
/// Always sound to call; `unsafe` only because of the C ABI contract.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn malloc(size: size_t) -> *mut c_void {
  HEAP.malloc(size).cast()
}

/// Allocates `count * size` zeroed bytes, or returns null on overflow or
/// exhaustion.
///
/// # Safety
/// Always sound to call; `unsafe` only because of the C ABI contract.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn calloc(
  count: size_t,
  size: size_t,
) -> *mut c_void {
  HEAP.calloc(count, size).cast()
}

/// # Safety
/// `ptr` must be null or a pointer returned by this module and not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn realloc(
  ptr: *mut c_void,
  size: size_t,
) -> *mut c_void {
  unsafe { HEAP.realloc(ptr.cast(), size).cast() }
}

/// # Safety
/// `ptr` must be null or a pointer returned by this module and not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
  unsafe { HEAP.free(ptr.cast()) }
}
