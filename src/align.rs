/// Alignment of every payload handed out by the heap.
pub const MIN_ALIGN: usize = 16;

/// Rounds `$value` up to the next multiple of `$align`, which must be a power
/// of two.
///
/// # Examples
///
/// ```rust
/// use freelloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(32, 16), 32);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Rounds `$value` up to the payload alignment of the heap.
///
/// # Examples
///
/// ```rust
/// use freelloc::align;
///
/// assert_eq!(align!(1), 16);
/// assert_eq!(align!(100), 112);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::MIN_ALIGN)
  };
}

/// Rounds a requested payload size up to [`MIN_ALIGN`], or `None` if the
/// rounded value does not fit in a `usize`.
pub const fn checked_align(size: usize) -> Option<usize> {
  match size.checked_add(MIN_ALIGN - 1) {
    Some(padded) => Some(padded & !(MIN_ALIGN - 1)),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (MIN_ALIGN * i + 1)..=(MIN_ALIGN * (i + 1));

      let expected_alignment = MIN_ALIGN * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), checked_align(size));
      }
    }
  }

  #[test]
  fn test_align_to_word() {
    assert_eq!(align_to!(0usize, 8), 0);
    assert_eq!(align_to!(9usize, 8), 16);
    assert_eq!(align_to!(24usize, 8), 24);
  }

  #[test]
  fn test_checked_align_overflow() {
    assert_eq!(checked_align(0), Some(0));
    assert_eq!(checked_align(usize::MAX), None);
    assert_eq!(checked_align(usize::MAX - MIN_ALIGN + 2), None);
    assert_eq!(checked_align(usize::MAX - MIN_ALIGN + 1), Some(usize::MAX - MIN_ALIGN + 1));
  }
}
