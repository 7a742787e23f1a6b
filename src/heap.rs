use std::{
  cmp,
  marker::PhantomData,
  ptr::{self, NonNull},
};

use crate::{
  align::checked_align,
  block::{Block, HEADER_SIZE},
  error::{Corruption, HeapError},
  free_list::FreeList,
  grower::HeapGrower,
};

/// A single heap region together with its free list.
///
/// The region is split, left to right and without gaps, into blocks that each
/// carry a [`Block`] header in front of their payload. Free blocks are kept on
/// an address-ordered [`FreeList`] and two free blocks never touch.
///
/// `Heap` is not synchronized; wrap it in a [`LockedHeap`](crate::LockedHeap)
/// to share it between threads.
pub struct Heap<G> {
  grower: G,
  start: *mut u8,
  end: *mut u8,
  free: FreeList,
}

// SAFETY: the heap exclusively owns every block between `start` and `end`
unsafe impl<G: Send> Send for Heap<G> {}

/// Snapshot of a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: NonNull<u8>,
  pub size: usize,
  pub is_used: bool,
}

impl BlockInfo {
  unsafe fn read(block: *mut Block) -> Self {
    unsafe {
      Self {
        payload: payload_of(block),
        size: (*block).size,
        is_used: (*block).is_used,
      }
    }
  }

  /// Address of the block header.
  pub fn header(&self) -> usize {
    self.payload.as_ptr() as usize - HEADER_SIZE
  }
}

/// Usage summary gathered by walking the heap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  pub heap_bytes: usize,
  pub used_blocks: usize,
  pub used_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

unsafe fn payload_of(block: *mut Block) -> NonNull<u8> {
  // SAFETY: a header never sits at the null address
  unsafe { NonNull::new_unchecked(Block::payload(block)) }
}

impl<G> Heap<G> {
  pub const fn new(grower: G) -> Self {
    Self {
      grower,
      start: ptr::null_mut(),
      end: ptr::null_mut(),
      free: FreeList::new(),
    }
  }

  /// First address of the heap region, or null before the first allocation.
  pub fn start(&self) -> *const u8 {
    self.start
  }

  /// One past the last address of the heap region.
  pub fn end(&self) -> *const u8 {
    self.end
  }

  fn len(&self) -> usize {
    self.end as usize - self.start as usize
  }

  fn contains(
    &self,
    block: *mut Block,
  ) -> bool {
    let block = block as *mut u8;
    self.start <= block && block < self.end
  }

  /// Walks every block of the region in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      current: self.start,
      end: self.end,
      _heap: PhantomData,
    }
  }

  /// Walks the free list from head to tail.
  pub fn free_blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    // SAFETY: the free list only links headers inside the region
    self.free.iter().map(|block| unsafe { BlockInfo::read(block) })
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      heap_bytes: self.len(),
      ..HeapStats::default()
    };

    for block in self.blocks() {
      if block.is_used {
        stats.used_blocks += 1;
        stats.used_bytes += block.size;
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
        stats.largest_free = stats.largest_free.max(block.size);
      }
    }

    stats
  }

  /// Verifies the structural invariants of the heap.
  ///
  /// Checks that the blocks tile the region exactly, that no two free blocks
  /// touch, and that the free list holds every free block exactly once in
  /// ascending address order with consistent back links. Every list entry
  /// must be the header of a block reached by the walk.
  ///
  /// Does not allocate, so it can run while the heap serves as the process
  /// allocator.
  pub fn check(&self) -> Result<(), Corruption> {
    let len = self.len();
    let mut offset = 0;
    let mut walked = 0;
    let mut previous_free = None;

    while offset < len {
      let block = self.start.wrapping_add(offset) as *mut Block;
      let at = block as usize;
      let room = len - offset;

      if room < HEADER_SIZE {
        return Err(Corruption::Overrun(at));
      }

      // SAFETY: a whole header fits between `block` and the heap end
      let (size, is_used) = unsafe { ((*block).size, (*block).is_used) };
      if size > room - HEADER_SIZE {
        return Err(Corruption::Overrun(at));
      }

      if !is_used {
        if let Some(previous) = previous_free {
          return Err(Corruption::AdjacentFree(previous));
        }
        walked += 1;
        previous_free = Some(at);
      } else {
        previous_free = None;
      }

      offset += HEADER_SIZE + size;
    }

    // both the list and the walk run in address order, so a second walk
    // advances in step with the list
    let mut blocks = self.blocks();
    let mut listed = 0;
    let mut previous: *mut Block = ptr::null_mut();

    for block in self.free.iter() {
      let at = block as usize;

      // a list longer than the walk is either wrong or cyclic
      if listed == walked {
        return Err(Corruption::FreeCountMismatch {
          listed: listed + 1,
          walked,
        });
      }
      if !self.contains(block) {
        return Err(Corruption::Stray(at));
      }
      if !previous.is_null() && block <= previous {
        return Err(Corruption::Unordered(at));
      }

      // skip to the block that covers `at`
      let info = loop {
        let Some(info) = blocks.next() else {
          return Err(Corruption::NotABlock(at));
        };
        if info.payload.as_ptr() as usize + info.size > at {
          break info;
        }
        if !info.is_used {
          return Err(Corruption::Unlisted(info.header()));
        }
      };

      if info.header() != at {
        return Err(Corruption::NotABlock(at));
      }
      if info.is_used {
        return Err(Corruption::UsedInFreeList(at));
      }
      // SAFETY: `block` is a header found by the walk
      if unsafe { (*block).prev_free } != previous {
        return Err(Corruption::BrokenLink(at));
      }

      previous = block;
      listed += 1;
    }

    if self.free.tail() != previous {
      return Err(Corruption::TailMismatch(self.free.tail() as usize));
    }
    if listed != walked {
      return Err(Corruption::FreeCountMismatch { listed, walked });
    }

    Ok(())
  }
}

impl<G: HeapGrower> Heap<G> {
  fn request_size(size: usize) -> Result<usize, HeapError> {
    checked_align(size).ok_or_else(|| {
      warn!("request of {} bytes overflows", size);
      HeapError::Overflow
    })
  }

  /// Allocates a payload of at least `size` bytes.
  ///
  /// The free list is scanned front to back. The first block that fits is
  /// either taken whole, when what would be left over cannot hold a header,
  /// or split. When nothing fits the region grows by one header plus the
  /// payload. The payload is not initialized.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, HeapError> {
    let size = Self::request_size(size)?;

    // SAFETY: the free list only links headers inside the region
    if let Some(block) = unsafe { self.take_free(size) } {
      return Ok(unsafe { payload_of(block) });
    }

    self.grow(size)
  }

  unsafe fn take_free(
    &mut self,
    size: usize,
  ) -> Option<*mut Block> {
    unsafe {
      let mut current = self.free.head();

      while !current.is_null() {
        let available = (*current).size;

        if available >= size {
          if available - size < HEADER_SIZE {
            self.free.unlink(current);
            (*current).is_used = true;
          } else {
            self.free.split(current, size);
          }
          return Some(current);
        }

        current = (*current).next_free;
      }

      None
    }
  }

  fn grow(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, HeapError> {
    let bytes = size.checked_add(HEADER_SIZE).ok_or(HeapError::Overflow)?;

    let start = self.grower.extend(bytes).inspect_err(|err| {
      warn!("failed to grow heap by {} bytes: {}", bytes, err);
    })?;
    let start = start.as_ptr();

    if self.start.is_null() {
      self.start = start;
    } else if start != self.end {
      warn!("heap extension at {:p} does not follow heap end {:p}", start, self.end);
      return Err(HeapError::Discontiguous);
    }

    unsafe {
      self.end = start.add(bytes);
      debug!("heap grew by {} bytes, end = {:p}", bytes, self.end);

      let block = start as *mut Block;
      block.write(Block::used(size));
      Ok(payload_of(block))
    }
  }

  /// Allocates `count * size` bytes and zeroes them.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<NonNull<u8>, HeapError> {
    let total = count.checked_mul(size).ok_or_else(|| {
      warn!("zeroed request of {} x {} bytes overflows", count, size);
      HeapError::Overflow
    })?;

    let payload = self.allocate(total)?;
    // SAFETY: the payload holds at least `total` bytes
    unsafe { payload.as_ptr().write_bytes(0, total) };

    Ok(payload)
  }

  /// Returns a block to the free list and merges it with free neighbours.
  ///
  /// Releasing null does nothing.
  ///
  /// # Safety
  /// `ptr` must be null or a payload currently allocated from this heap.
  pub unsafe fn release(
    &mut self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }

    unsafe {
      let block = Block::from_payload(ptr);
      debug_assert!(self.contains(block), "{ptr:p} was not allocated from this heap");
      debug_assert!((*block).is_used, "{ptr:p} released twice");

      (*block).is_used = false;
      self.free.insert_sorted(block);

      self.free.coalesce_forward(block);
      self.free.coalesce_backward(block);
    }
  }

  /// Resizes the allocation at `ptr` to hold at least `new_size` bytes.
  ///
  /// - a null `ptr` allocates,
  /// - a zero `new_size` releases and returns `Ok(None)`,
  /// - a block that is already large enough stays where it is, and hands its
  ///   tail back to the free list when that tail can hold a header,
  /// - anything else moves to a new block, copying the old contents.
  ///
  /// On error the original block is untouched.
  ///
  /// # Safety
  /// `ptr` must be null or a payload currently allocated from this heap.
  pub unsafe fn resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> Result<Option<NonNull<u8>>, HeapError> {
    let Some(payload) = NonNull::new(ptr) else {
      return self.allocate(new_size).map(Some);
    };

    if new_size == 0 {
      unsafe { self.release(ptr) };
      return Ok(None);
    }

    let size = Self::request_size(new_size)?;

    unsafe {
      let block = Block::from_payload(ptr);
      debug_assert!((*block).is_used, "{ptr:p} is not allocated");
      let capacity = (*block).size;

      if capacity >= size {
        if capacity - size >= HEADER_SIZE {
          self.shrink_in_place(block, size);
        }
        return Ok(Some(payload));
      }

      let moved = self.allocate(new_size)?;
      ptr::copy_nonoverlapping(ptr, moved.as_ptr(), cmp::min(capacity, new_size));
      self.release(ptr);

      Ok(Some(moved))
    }
  }

  /// Cuts `block` down to `size` bytes and files the tail as a free block.
  ///
  /// `block` stays in use, so the tail is linked in front of the next free
  /// block found by walking the region forward, and merged with it when the
  /// two touch.
  unsafe fn shrink_in_place(
    &mut self,
    block: *mut Block,
    size: usize,
  ) {
    unsafe {
      let rest = Block::payload(block).add(size) as *mut Block;
      rest.write(Block::free((*block).size - size - HEADER_SIZE));
      (*block).size = size;

      let mut cursor = Block::end(rest);
      while cursor < self.end && (*(cursor as *mut Block)).is_used {
        cursor = Block::end(cursor as *mut Block);
      }

      if cursor < self.end {
        self.free.insert_before(rest, cursor as *mut Block);
      } else {
        self.free.push_back(rest);
      }

      self.free.coalesce_forward(rest);
    }
  }
}

/// Iterator over every block of a [`Heap`], in address order.
pub struct Blocks<'a> {
  current: *mut u8,
  end: *mut u8,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current >= self.end {
      return None;
    }

    let block = self.current as *mut Block;
    // SAFETY: blocks tile the region, so `current` is a header
    unsafe {
      self.current = Block::end(block);
      Some(BlockInfo::read(block))
    }
  }
}
