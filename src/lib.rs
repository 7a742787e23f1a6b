//! # freelloc - An Address-Ordered Free-List Allocator
//!
//! This crate implements `malloc`, `calloc`, `realloc` and `free` on top of a
//! single heap region that grows on demand, by default through the `sbrk`
//! system call.
//!
//! ## Overview
//!
//! Every block, used or free, starts with a header. Free blocks are threaded
//! into a doubly-linked list sorted by address, which is the only index the
//! allocator keeps:
//!
//! ```text
//!   Heap Region:
//!
//!   start                                                               end
//!   ┌─────┬──────────┬─────┬──────┬─────┬────────────────┬─────┬─────────┐
//!   │ hdr │  used    │ hdr │ free │ hdr │     used       │ hdr │  free   │
//!   └─────┴──────────┴─────┴──────┴─────┴────────────────┴─────┴─────────┘
//!                       ▲                                   ▲
//!                       │                                   │
//!                 head_free ◄────────── prev / next ──────► tail_free
//! ```
//!
//! Blocks tile the region with no gaps and no two free blocks ever touch:
//! releasing a block merges it with a free neighbour on either side.
//!
//! ## Crate Structure
//!
//! ```text
//!   freelloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Block header layout (internal)
//!   ├── free_list  - Address-ordered free list, split and coalesce (internal)
//!   ├── grower     - HeapGrower trait, SbrkGrower, ArenaGrower
//!   ├── heap       - Heap: allocate, zero_allocate, release, resize
//!   ├── locked     - LockedHeap: spin-locked Heap, GlobalAlloc
//!   └── ffi        - C entry points (feature `c-api`)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use freelloc::{ArenaGrower, Heap};
//!
//! let mut heap = Heap::new(ArenaGrower::new(4096));
//!
//! let ptr = heap.allocate(100).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(7, 100);
//!
//!     // Shrinking keeps the block where it is
//!     let same = heap.resize(ptr.as_ptr(), 8).unwrap();
//!     assert_eq!(same, Some(ptr));
//!
//!     heap.release(ptr.as_ptr());
//! }
//! assert!(heap.check().is_ok());
//! ```
//!
//! ## Block Layout
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         Payload                │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ is_used         │  │  │                          │  │
//!   │  │ next_free       │  │  │     N bytes usable       │  │
//!   │  │ prev_free       │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │      32 bytes         │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! Sizes are rounded up to [`MIN_ALIGN`](align::MIN_ALIGN) bytes, so every
//! payload is 16-byte aligned.
//!
//! ## Features
//!
//! - `log`: trace heap growth and failures through the `log` facade. Leave it
//!   off when the heap is the global allocator and the logger allocates, or
//!   the logger will re-enter the lock.
//! - `c-api`: export `malloc`, `calloc`, `realloc` and `free` with C linkage
//!   over a process-wide `sbrk` heap.
//!
//! ## Limitations
//!
//! - **First fit**: no size classes, no per-thread caches
//! - **Never shrinks**: memory is never handed back to the operating system
//! - **No in-place growth**: growing always moves to a new block
//! - **Alignment**: nothing stricter than 16 bytes

#[cfg(feature = "log")]
macro_rules! debug {
  ($($arg:tt)+) => {
    log::debug!(target: "freelloc", $($arg)+)
  };
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
  ($($arg:tt)+) => {
    if false {
      let _ = format_args!($($arg)+);
    }
  };
}

#[cfg(feature = "log")]
macro_rules! warn {
  ($($arg:tt)+) => {
    log::warn!(target: "freelloc", $($arg)+)
  };
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
  ($($arg:tt)+) => {
    if false {
      let _ = format_args!($($arg)+);
    }
  };
}

pub mod align;
mod block;
mod error;
#[cfg(feature = "c-api")]
pub mod ffi;
mod free_list;
mod grower;
mod heap;
mod locked;

pub use block::HEADER_SIZE;
pub use error::{Corruption, HeapError};
pub use grower::{ArenaGrower, HeapGrower, SbrkGrower};
pub use heap::{BlockInfo, Blocks, Heap, HeapStats};
pub use locked::LockedHeap;
