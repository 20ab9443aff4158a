//! Boundary-tag header encoding.
//!
//! ```text
//!   63                                      4   3   2   1   0
//!   ┌───────────────────────────────────────┬───┬───┬───┬───┐
//!   │                 size                  │ 0 │ m │ p │ a │
//!   └───────────────────────────────────────┴───┴───┴───┴───┘
//!     a = allocated, p = previous block allocated,
//!     m = previous block is a minimal (16 byte) block
//! ```

use std::fmt;

/// Word and header size in bytes.
pub const WSIZE: usize = 8;

/// Alignment unit: every block size and payload address is a multiple of it.
pub const ALIGNMENT: usize = 2 * WSIZE;

/// Smallest block: a header plus one forward link.
pub const MIN_BLOCK_SIZE: usize = ALIGNMENT;

/// Smallest block with room for a backward link and a footer.
pub const LINKED_BLOCK_SIZE: usize = 2 * ALIGNMENT;

const ALLOC_MASK: u64 = 0x1;
const PREV_ALLOC_MASK: u64 = 0x2;
const PREV_MINIMAL_MASK: u64 = 0x4;
const SIZE_MASK: u64 = !0xF;

/// A packed block header (or footer) word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header(u64);

impl Header {
  /// Packs a size and the three status flags into one word.
  ///
  /// `size` must be a multiple of [`ALIGNMENT`].
  #[inline]
  pub const fn pack(
    size: usize,
    allocated: bool,
    prev_allocated: bool,
    prev_minimal: bool,
  ) -> Self {
    debug_assert!(size % ALIGNMENT == 0);
    let mut word = size as u64 & SIZE_MASK;
    if allocated {
      word |= ALLOC_MASK;
    }
    if prev_allocated {
      word |= PREV_ALLOC_MASK;
    }
    if prev_minimal {
      word |= PREV_MINIMAL_MASK;
    }
    Self(word)
  }

  #[inline]
  pub const fn from_word(word: u64) -> Self {
    Self(word)
  }

  #[inline]
  pub const fn word(self) -> u64 {
    self.0
  }

  #[inline]
  pub const fn size(self) -> usize {
    (self.0 & SIZE_MASK) as usize
  }

  #[inline]
  pub const fn allocated(self) -> bool {
    self.0 & ALLOC_MASK != 0
  }

  #[inline]
  pub const fn prev_allocated(self) -> bool {
    self.0 & PREV_ALLOC_MASK != 0
  }

  #[inline]
  pub const fn prev_minimal(self) -> bool {
    self.0 & PREV_MINIMAL_MASK != 0
  }

  /// Returns a copy with the previous-block-allocated flag replaced.
  #[inline]
  pub const fn with_prev_allocated(
    self,
    prev_allocated: bool,
  ) -> Self {
    if prev_allocated {
      Self(self.0 | PREV_ALLOC_MASK)
    } else {
      Self(self.0 & !PREV_ALLOC_MASK)
    }
  }

  /// Returns a copy with the previous-block-minimal flag replaced.
  #[inline]
  pub const fn with_prev_minimal(
    self,
    prev_minimal: bool,
  ) -> Self {
    if prev_minimal {
      Self(self.0 | PREV_MINIMAL_MASK)
    } else {
      Self(self.0 & !PREV_MINIMAL_MASK)
    }
  }

  /// Bits that no field owns. Always zero in a well-formed header.
  #[inline]
  pub const fn reserved_bits(self) -> u64 {
    self.0 & 0x8
  }
}

impl fmt::Debug for Header {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Header")
      .field("size", &self.size())
      .field("allocated", &self.allocated())
      .field("prev_allocated", &self.prev_allocated())
      .field("prev_minimal", &self.prev_minimal())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pack_unpack() {
    let header = Header::pack(48, true, false, true);

    assert_eq!(header.size(), 48);
    assert!(header.allocated());
    assert!(!header.prev_allocated());
    assert!(header.prev_minimal());
    assert_eq!(header.word(), 48 | 0x1 | 0x4);
  }

  #[test]
  fn test_sentinel_word() {
    let prologue = Header::pack(0, true, true, false);

    assert_eq!(prologue.size(), 0);
    assert!(prologue.allocated());
    assert_eq!(prologue.word(), 0x3);
  }

  #[test]
  fn test_flag_updates_keep_size() {
    let header = Header::pack(4096, false, true, false)
      .with_prev_allocated(false)
      .with_prev_minimal(true);

    assert_eq!(header.size(), 4096);
    assert!(!header.allocated());
    assert!(!header.prev_allocated());
    assert!(header.prev_minimal());

    let header = header.with_prev_minimal(false).with_prev_allocated(true);
    assert_eq!(header, Header::pack(4096, false, true, false));
  }

  #[test]
  fn test_every_flag_combination() {
    for size in (0..64).map(|units| units * ALIGNMENT) {
      for bits in 0..8u8 {
        let (a, p, m) = (bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
        let header = Header::from_word(Header::pack(size, a, p, m).word());

        assert_eq!(header.size(), size);
        assert_eq!(header.allocated(), a);
        assert_eq!(header.prev_allocated(), p);
        assert_eq!(header.prev_minimal(), m);
        assert_eq!(header.reserved_bits(), 0);
      }
    }
  }
}
