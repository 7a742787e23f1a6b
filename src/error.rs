use std::{error, fmt};

/// A request the heap could not satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
  /// The heap grower refused to hand out more address space.
  Exhausted,
  /// The requested byte count does not fit in a `usize` once rounded up or
  /// multiplied out.
  Overflow,
  /// The grower returned memory that does not start at the current heap end.
  Discontiguous,
}

impl fmt::Display for HeapError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::Exhausted => f.write_str("heap exhausted"),
      Self::Overflow => f.write_str("requested size overflows usize"),
      Self::Discontiguous => f.write_str("heap extension is not contiguous with the heap end"),
    }
  }
}

impl error::Error for HeapError {}

/// A broken heap invariant found by [`Heap::check`](crate::Heap::check).
///
/// Every variant carries the header address of the offending block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
  /// Walking from this block steps past the heap end.
  Overrun(usize),
  /// This free block is physically followed by another free block.
  AdjacentFree(usize),
  /// The free list links to a block that is marked used.
  UsedInFreeList(usize),
  /// This free-list entry is not at a higher address than its predecessor.
  Unordered(usize),
  /// `prev_free` of this block does not point back to its list predecessor.
  BrokenLink(usize),
  /// A free-list entry lies outside the heap region.
  Stray(usize),
  /// A free-list entry inside the region is not the header of any block.
  NotABlock(usize),
  /// This free block is not on the free list.
  Unlisted(usize),
  /// The recorded tail is not the last entry reached by walking the list.
  TailMismatch(usize),
  /// The free list and the heap walk disagree on the number of free blocks.
  FreeCountMismatch { listed: usize, walked: usize },
}

impl fmt::Display for Corruption {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::Overrun(at) => write!(f, "block at {at:#x} runs past the heap end"),
      Self::AdjacentFree(at) => write!(f, "free block at {at:#x} touches another free block"),
      Self::UsedInFreeList(at) => write!(f, "used block at {at:#x} is on the free list"),
      Self::Unordered(at) => write!(f, "free list is out of address order at {at:#x}"),
      Self::BrokenLink(at) => write!(f, "free list back link of {at:#x} is broken"),
      Self::Stray(at) => write!(f, "free list entry {at:#x} lies outside the heap"),
      Self::NotABlock(at) => write!(f, "free list entry {at:#x} is not a block header"),
      Self::Unlisted(at) => write!(f, "free block at {at:#x} is missing from the free list"),
      Self::TailMismatch(at) => write!(f, "free list tail {at:#x} is not its last entry"),
      Self::FreeCountMismatch { listed, walked } => {
        write!(f, "free list holds {listed} blocks but the heap has {walked}")
      }
    }
  }
}

impl error::Error for Corruption {}
