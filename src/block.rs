use std::{mem, ptr};

use crate::align::MIN_ALIGN;

/// Header placed directly in front of every payload, used or free.
///
/// `next_free` and `prev_free` thread the block through the free list and are
/// null while the block is in use.
#[repr(C)]
#[derive(Debug)]
pub struct Block {
  pub size: usize,
  pub is_used: bool,
  pub next_free: *mut Block,
  pub prev_free: *mut Block,
}

/// Size of a [`Block`] header in bytes.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

const _: () = assert!(HEADER_SIZE % MIN_ALIGN == 0, "header must keep payloads aligned");
const _: () = assert!(mem::align_of::<Block>() <= MIN_ALIGN);

impl Block {
  pub fn new(
    size: usize,
    is_used: bool,
  ) -> Self {
    Self {
      size,
      is_used,
      next_free: ptr::null_mut(),
      prev_free: ptr::null_mut(),
    }
  }

  pub fn used(size: usize) -> Self {
    Self::new(size, true)
  }

  pub fn free(size: usize) -> Self {
    Self::new(size, false)
  }

  /// Address of the payload following `block`.
  ///
  /// # Safety
  /// `block` must point to a header inside the heap region.
  pub unsafe fn payload(block: *mut Block) -> *mut u8 {
    unsafe { (block as *mut u8).add(HEADER_SIZE) }
  }

  /// Recovers the header from a payload address.
  ///
  /// # Safety
  /// `payload` must have been produced by [`Block::payload`].
  pub unsafe fn from_payload(payload: *mut u8) -> *mut Block {
    unsafe { payload.sub(HEADER_SIZE) as *mut Block }
  }

  /// First byte past the payload, i.e. where the physically next header lives.
  ///
  /// # Safety
  /// `block` must point to an initialized header inside the heap region.
  pub unsafe fn end(block: *mut Block) -> *mut u8 {
    unsafe { Self::payload(block).add((*block).size) }
  }

  /// Whether `next` starts exactly where `block` ends.
  ///
  /// # Safety
  /// `block` must point to an initialized header inside the heap region.
  pub unsafe fn touches(
    block: *mut Block,
    next: *mut Block,
  ) -> bool {
    unsafe { Self::end(block) == next as *mut u8 }
  }

  /// Zeroes a header that has been absorbed by its left neighbour.
  pub fn retire(&mut self) {
    self.size = 0;
    self.next_free = ptr::null_mut();
    self.prev_free = ptr::null_mut();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[repr(C, align(16))]
  struct Region([u8; 256]);

  #[test]
  fn test_header_layout() {
    assert_eq!(HEADER_SIZE, 4 * mem::size_of::<usize>());
    assert_eq!(HEADER_SIZE % MIN_ALIGN, 0);
  }

  #[test]
  fn test_payload_round_trip() {
    let mut region = Region([0; 256]);
    let block = region.0.as_mut_ptr() as *mut Block;

    unsafe {
      block.write(Block::used(48));

      let payload = Block::payload(block);
      assert_eq!(payload as usize - block as usize, HEADER_SIZE);
      assert_eq!(Block::from_payload(payload), block);
      assert_eq!(Block::end(block), payload.add(48));
    }
  }

  #[test]
  fn test_touches() {
    let mut region = Region([0; 256]);
    let first = region.0.as_mut_ptr() as *mut Block;

    unsafe {
      first.write(Block::free(32));
      let second = Block::end(first) as *mut Block;
      second.write(Block::free(16));
      let third = Block::end(second) as *mut Block;

      assert!(Block::touches(first, second));
      assert!(Block::touches(second, third));
      assert!(!Block::touches(first, third));
    }
  }

  #[test]
  fn test_retire() {
    let mut block = Block::free(64);
    let raw: *mut Block = &mut block;
    block.next_free = raw;
    block.retire();

    assert_eq!(block.size, 0);
    assert!(block.next_free.is_null());
    assert!(block.prev_free.is_null());
  }
}
