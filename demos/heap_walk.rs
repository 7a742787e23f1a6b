use std::env;

use freelloc::{Heap, SbrkGrower, align};
use libc::sbrk;

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the region grown via brk/sbrk.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

/// Prints every block of the heap followed by the free list.
fn print_heap<G>(heap: &Heap<G>) {
  println!("-- heap {:?} .. {:?} --", heap.start(), heap.end());
  for block in heap.blocks() {
    println!(
      "  {:#x}: payload {:?}, size = {:5}, {}",
      block.header(),
      block.payload,
      block.size,
      if block.is_used { "used" } else { "free" },
    );
  }

  let free: Vec<_> = heap.free_blocks().map(|block| format!("{:#x}", block.header())).collect();
  println!("-- free list: [{}] --", free.join(" -> "));

  if let Err(corruption) = heap.check() {
    println!("!! {corruption}");
  }
  println!();
}

/// Pass `--step` to pause after each stage, e.g. to inspect the process with
/// `pmap` or `gdb`.
fn pause(step: bool) {
  if step {
    println!(">>> Press ENTER to continue...");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
  }
}

fn main() {
  let step = env::args().any(|arg| arg == "--step");
  let mut heap = Heap::new(SbrkGrower::new());

  print_program_break("start");
  pause(step);

  // --------------------------------------------------------------------
  // 1) Three fresh blocks grow the heap one after another.
  // --------------------------------------------------------------------
  let a = heap.allocate(100).expect("allocate a");
  let b = heap.allocate(24).expect("allocate b");
  let c = heap.allocate(200).expect("allocate c");
  println!("[1] Allocated 100 (-> {}), 24 and 200 bytes", align!(100));
  print_program_break("after growth");
  print_heap(&heap);
  pause(step);

  // --------------------------------------------------------------------
  // 2) Releasing `a` and `c` leaves two separate free blocks.
  // --------------------------------------------------------------------
  unsafe {
    heap.release(a.as_ptr());
    heap.release(c.as_ptr());
  }
  println!("[2] Released the first and last block");
  print_heap(&heap);
  pause(step);

  // --------------------------------------------------------------------
  // 3) A small request splits the first free block.
  // --------------------------------------------------------------------
  let d = heap.allocate(16).expect("allocate d");
  println!("[3] Allocated 16 bytes, reused first block? {}", d == a);
  print_heap(&heap);
  pause(step);

  // --------------------------------------------------------------------
  // 4) Growing `b` has to move it; its old block merges with the free
  //    remainder of step 3.
  // --------------------------------------------------------------------
  let e = unsafe { heap.resize(b.as_ptr(), 512) }.expect("resize b").expect("non-zero size");
  println!("[4] Resized 24 -> 512 bytes, moved? {}", e != b);
  print_heap(&heap);
  pause(step);

  // --------------------------------------------------------------------
  // 5) Releasing everything coalesces the heap back into one free block.
  // --------------------------------------------------------------------
  unsafe {
    heap.release(d.as_ptr());
    heap.release(e.as_ptr());
  }
  println!("[5] Released everything");
  print_heap(&heap);
  println!("{:#?}", heap.stats());
}
