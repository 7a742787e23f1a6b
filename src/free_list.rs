use std::{marker::PhantomData, ptr};

use crate::block::{Block, HEADER_SIZE};

/// Doubly-linked list of free blocks, threaded through their headers and kept
/// in ascending address order.
///
/// `head` and `tail` only mark positions; the blocks themselves live in the
/// heap region.
pub struct FreeList {
  head: *mut Block,
  tail: *mut Block,
}

impl FreeList {
  pub const fn new() -> Self {
    Self {
      head: ptr::null_mut(),
      tail: ptr::null_mut(),
    }
  }

  pub fn head(&self) -> *mut Block {
    self.head
  }

  pub fn tail(&self) -> *mut Block {
    self.tail
  }

  pub fn iter(&self) -> Iter<'_> {
    Iter {
      current: self.head,
      _list: PhantomData,
    }
  }

  /// Removes `block` from the list and clears its links.
  ///
  /// # Safety
  /// `block` must currently be on this list.
  pub unsafe fn unlink(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let next = (*block).next_free;
      let prev = (*block).prev_free;

      if block == self.tail {
        self.tail = prev;
      } else {
        (*next).prev_free = prev;
      }

      if block == self.head {
        self.head = next;
      } else {
        (*prev).next_free = next;
      }

      (*block).next_free = ptr::null_mut();
      (*block).prev_free = ptr::null_mut();
    }
  }

  /// Links `block` in directly in front of `next`.
  ///
  /// # Safety
  /// `next` must be on this list and `block` must not be.
  pub unsafe fn insert_before(
    &mut self,
    block: *mut Block,
    next: *mut Block,
  ) {
    unsafe {
      (*block).prev_free = (*next).prev_free;
      (*block).next_free = next;

      if next == self.head {
        self.head = block;
      } else {
        (*(*next).prev_free).next_free = block;
      }
      (*next).prev_free = block;
    }
  }

  /// Appends `block` after the current tail.
  ///
  /// # Safety
  /// `block` must not be on this list.
  pub unsafe fn push_back(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      (*block).next_free = ptr::null_mut();
      (*block).prev_free = self.tail;

      if self.tail.is_null() {
        self.head = block;
      } else {
        (*self.tail).next_free = block;
      }
      self.tail = block;
    }
  }

  /// Inserts `block` in front of the first entry with a higher address, or at
  /// the tail if there is none.
  ///
  /// # Safety
  /// `block` must be a free header that is not yet on this list.
  pub unsafe fn insert_sorted(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let mut current = self.head;

      while !current.is_null() {
        if current > block {
          self.insert_before(block, current);
          return;
        }
        current = (*current).next_free;
      }

      self.push_back(block);
    }
  }

  /// Puts `new` into the list position held by `old`.
  unsafe fn replace(
    &mut self,
    old: *mut Block,
    new: *mut Block,
  ) {
    unsafe {
      (*new).next_free = (*old).next_free;
      (*new).prev_free = (*old).prev_free;

      if old == self.tail {
        self.tail = new;
      } else {
        (*(*old).next_free).prev_free = new;
      }

      if old == self.head {
        self.head = new;
      } else {
        (*(*old).prev_free).next_free = new;
      }
    }
  }

  /// Carves a used prefix of `size` bytes out of the free `block`.
  ///
  /// The remainder becomes a free block that takes over `block`'s list
  /// position. Its physical predecessor is the now-used prefix, so only the
  /// list successor can be a merge candidate.
  ///
  /// # Safety
  /// `block` must be on this list with `size + HEADER_SIZE <= (*block).size`.
  pub unsafe fn split(
    &mut self,
    block: *mut Block,
    size: usize,
  ) {
    unsafe {
      debug_assert!((*block).size >= size + HEADER_SIZE);

      let rest = Block::payload(block).add(size) as *mut Block;
      rest.write(Block::free((*block).size - size - HEADER_SIZE));

      self.replace(block, rest);
      self.coalesce_forward(rest);

      block.write(Block::used(size));
    }
  }

  /// Absorbs the list successor of `block`, which must start exactly where
  /// `block` ends.
  ///
  /// # Safety
  /// `block` must be on this list, must not be the tail, and must physically
  /// touch its successor.
  pub unsafe fn coalesce(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let next = (*block).next_free;
      debug_assert!(Block::touches(block, next));

      (*block).size += HEADER_SIZE + (*next).size;

      if next == self.tail {
        self.tail = block;
      } else {
        (*(*next).next_free).prev_free = block;
      }
      (*block).next_free = (*next).next_free;

      (*next).retire();
    }
  }

  /// Merges `block` with its list successor if the two touch.
  ///
  /// # Safety
  /// `block` must be on this list.
  pub unsafe fn coalesce_forward(
    &mut self,
    block: *mut Block,
  ) -> bool {
    unsafe {
      if block != self.tail && Block::touches(block, (*block).next_free) {
        self.coalesce(block);
        return true;
      }
      false
    }
  }

  /// Merges `block` into its list predecessor if the two touch. Returns the
  /// surviving block.
  ///
  /// # Safety
  /// `block` must be on this list.
  pub unsafe fn coalesce_backward(
    &mut self,
    block: *mut Block,
  ) -> *mut Block {
    unsafe {
      let prev = (*block).prev_free;
      if block != self.head && Block::touches(prev, block) {
        self.coalesce(prev);
        return prev;
      }
      block
    }
  }
}

impl Default for FreeList {
  fn default() -> Self {
    Self::new()
  }
}

/// Walks a [`FreeList`] from head to tail.
pub struct Iter<'a> {
  current: *mut Block,
  _list: PhantomData<&'a FreeList>,
}

impl Iterator for Iter<'_> {
  type Item = *mut Block;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current.is_null() {
      return None;
    }
    let block = self.current;
    // SAFETY: every entry of the list is an initialized header
    self.current = unsafe { (*block).next_free };
    Some(block)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[repr(C, align(16))]
  struct Region([u8; 1024]);

  impl Region {
    fn new() -> Box<Self> {
      Box::new(Self([0; 1024]))
    }

    /// Lays out consecutive blocks with the given payload sizes and states.
    fn carve(
      &mut self,
      layout: &[(usize, bool)],
    ) -> Vec<*mut Block> {
      let mut at = self.0.as_mut_ptr();
      let mut blocks = Vec::new();

      for &(size, is_used) in layout {
        let block = at as *mut Block;
        unsafe {
          block.write(Block::new(size, is_used));
          at = Block::end(block);
        }
        blocks.push(block);
      }

      blocks
    }
  }

  fn collect(list: &FreeList) -> Vec<*mut Block> {
    list.iter().collect()
  }

  #[test]
  fn test_insert_sorted() {
    let mut region = Region::new();
    let blocks = region.carve(&[(16, false), (16, true), (16, false), (16, true), (16, false)]);

    let mut list = FreeList::new();
    assert!(list.head().is_null());

    unsafe {
      list.insert_sorted(blocks[2]);
      list.insert_sorted(blocks[4]);
      list.insert_sorted(blocks[0]);
    }

    assert_eq!(collect(&list), vec![blocks[0], blocks[2], blocks[4]]);
    assert_eq!(list.head(), blocks[0]);
    assert_eq!(list.tail(), blocks[4]);

    unsafe {
      assert!((*blocks[0]).prev_free.is_null());
      assert_eq!((*blocks[2]).prev_free, blocks[0]);
      assert_eq!((*blocks[4]).prev_free, blocks[2]);
    }
  }

  #[test]
  fn test_unlink_endpoints() {
    let mut region = Region::new();
    let blocks = region.carve(&[(16, false), (16, true), (16, false), (16, true), (16, false)]);

    let mut list = FreeList::new();
    unsafe {
      list.push_back(blocks[0]);
      list.push_back(blocks[2]);
      list.push_back(blocks[4]);

      list.unlink(blocks[0]);
      assert_eq!(collect(&list), vec![blocks[2], blocks[4]]);
      assert!((*blocks[2]).prev_free.is_null());

      list.unlink(blocks[4]);
      assert_eq!(collect(&list), vec![blocks[2]]);
      assert_eq!(list.tail(), blocks[2]);

      list.unlink(blocks[2]);
    }

    assert!(list.head().is_null());
    assert!(list.tail().is_null());
  }

  #[test]
  fn test_split_takes_over_position() {
    let mut region = Region::new();
    let blocks = region.carve(&[(16, false), (16, true), (256, false), (16, true), (16, false)]);

    let mut list = FreeList::new();
    unsafe {
      list.push_back(blocks[0]);
      list.push_back(blocks[2]);
      list.push_back(blocks[4]);

      list.split(blocks[2], 64);

      let rest = Block::end(blocks[2]) as *mut Block;
      assert_eq!(collect(&list), vec![blocks[0], rest, blocks[4]]);
      assert_eq!((*rest).size, 256 - 64 - HEADER_SIZE);
      assert!(!(*rest).is_used);

      assert_eq!((*blocks[2]).size, 64);
      assert!((*blocks[2]).is_used);
      assert!((*blocks[2]).next_free.is_null());
      assert!((*blocks[2]).prev_free.is_null());
    }
  }

  #[test]
  fn test_split_sole_entry() {
    let mut region = Region::new();
    let blocks = region.carve(&[(128, false)]);

    let mut list = FreeList::new();
    unsafe {
      list.push_back(blocks[0]);
      list.split(blocks[0], 32);

      let rest = Block::end(blocks[0]) as *mut Block;
      assert_eq!(list.head(), rest);
      assert_eq!(list.tail(), rest);
      assert_eq!((*rest).size, 128 - 32 - HEADER_SIZE);
    }
  }

  #[test]
  fn test_coalesce_forward_and_backward() {
    let mut region = Region::new();
    let blocks = region.carve(&[(32, false), (48, false), (64, false), (16, true), (16, false)]);

    let mut list = FreeList::new();
    unsafe {
      list.push_back(blocks[0]);
      list.push_back(blocks[2]);
      list.push_back(blocks[4]);
      list.insert_before(blocks[1], blocks[2]);

      assert!(list.coalesce_forward(blocks[1]));
      assert_eq!((*blocks[1]).size, 48 + HEADER_SIZE + 64);
      assert_eq!((*blocks[2]).size, 0);

      let survivor = list.coalesce_backward(blocks[1]);
      assert_eq!(survivor, blocks[0]);
      assert_eq!((*blocks[0]).size, 32 + 48 + 64 + 2 * HEADER_SIZE);

      assert_eq!(collect(&list), vec![blocks[0], blocks[4]]);
      assert_eq!((*blocks[4]).prev_free, blocks[0]);

      // separated by a used block
      assert!(!list.coalesce_forward(blocks[0]));
      assert_eq!(list.coalesce_backward(blocks[4]), blocks[4]);
    }
  }

  #[test]
  fn test_coalesce_into_tail() {
    let mut region = Region::new();
    let blocks = region.carve(&[(32, false), (32, false)]);

    let mut list = FreeList::new();
    unsafe {
      list.push_back(blocks[0]);
      list.push_back(blocks[1]);
      list.coalesce(blocks[0]);

      assert_eq!(list.tail(), blocks[0]);
      assert!((*blocks[0]).next_free.is_null());
      assert_eq!((*blocks[0]).size, 64 + HEADER_SIZE);
    }
  }
}
