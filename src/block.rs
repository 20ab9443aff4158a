//! Blocks and boundary-tag navigation.
//!
//! ```text
//!   allocated block            free block (>= 32 bytes)      free block (16 bytes)
//!   ┌──────────────┐           ┌──────────────┐              ┌──────────────┐
//!   │ header       │           │ header       │              │ header       │
//!   ├──────────────┤ ◄─ payload├──────────────┤              ├──────────────┤
//!   │              │           │ next link    │              │ next link    │
//!   │ caller bytes │           ├──────────────┤              └──────────────┘
//!   │              │           │ prev link    │
//!   │              │           ├──────────────┤
//!   │              │           │ ...          │
//!   │              │           ├──────────────┤
//!   │              │           │ footer       │
//!   └──────────────┘           └──────────────┘
//! ```
//!
//! Allocated blocks carry no footer: only a free block's neighbours ever need
//! to walk backwards over it, and the following block's `prev_allocated` bit
//! tells them not to. A 16 byte free block has no footer either, and the
//! following block's `prev_minimal` bit stands in for it.

use crate::{
  arena::Arena,
  encoding::{Header, LINKED_BLOCK_SIZE, MIN_BLOCK_SIZE, WSIZE},
};

/// A block, identified by the arena offset of its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(usize);

impl Block {
  #[inline]
  pub const fn new(offset: usize) -> Self {
    Self(offset)
  }

  #[inline]
  pub const fn offset(self) -> usize {
    self.0
  }

  /// The block whose payload starts at `payload`.
  #[inline]
  pub const fn from_payload(payload: usize) -> Self {
    Self(payload - WSIZE)
  }

  #[inline]
  pub const fn payload(self) -> usize {
    self.0 + WSIZE
  }

  #[inline]
  pub fn header<A: Arena>(
    self,
    arena: &A,
  ) -> Header {
    Header::from_word(arena.read_word(self.0))
  }

  #[inline]
  pub fn size<A: Arena>(
    self,
    arena: &A,
  ) -> usize {
    self.header(arena).size()
  }

  #[inline]
  pub fn set_header<A: Arena>(
    self,
    arena: &mut A,
    header: Header,
  ) {
    arena.write_word(self.0, header.word());
  }

  /// Offset of the footer word of a block of `size` bytes.
  #[inline]
  pub const fn footer(
    self,
    size: usize,
  ) -> usize {
    self.0 + size - WSIZE
  }

  /// Writes a free header, plus a footer when the block is large enough
  /// to carry one.
  pub fn write_free<A: Arena>(
    self,
    arena: &mut A,
    size: usize,
    prev_allocated: bool,
    prev_minimal: bool,
  ) {
    let header = Header::pack(size, false, prev_allocated, prev_minimal);
    self.set_header(arena, header);
    if size >= LINKED_BLOCK_SIZE {
      arena.write_word(self.footer(size), header.word());
    }
  }

  pub fn write_allocated<A: Arena>(
    self,
    arena: &mut A,
    size: usize,
    prev_allocated: bool,
    prev_minimal: bool,
  ) {
    let header = Header::pack(size, true, prev_allocated, prev_minimal);
    self.set_header(arena, header);
  }

  /// Records the status of the block preceding this one.
  ///
  /// Rewrites the footer as well when this block is free and has one, so
  /// header and footer never drift apart.
  pub fn set_prev_status<A: Arena>(
    self,
    arena: &mut A,
    prev_allocated: bool,
    prev_minimal: bool,
  ) {
    let header = self
      .header(arena)
      .with_prev_allocated(prev_allocated)
      .with_prev_minimal(prev_minimal);
    self.set_header(arena, header);
    if !header.allocated() && header.size() >= LINKED_BLOCK_SIZE {
      arena.write_word(self.footer(header.size()), header.word());
    }
  }

  /// The block that follows this one in address order.
  ///
  /// Must not be called on the epilogue, whose size is zero.
  #[inline]
  pub fn next<A: Arena>(
    self,
    arena: &A,
  ) -> Block {
    let size = self.size(arena);
    debug_assert!(size != 0, "next() called on the epilogue");
    Block(self.0 + size)
  }

  /// The block that precedes this one in address order, or `None` when this
  /// is the first block after the prologue.
  ///
  /// Only meaningful while the preceding block is free: allocated blocks
  /// have no footer to read.
  pub fn prev<A: Arena>(
    self,
    arena: &A,
  ) -> Option<Block> {
    if self.header(arena).prev_minimal() {
      return Some(Block(self.0 - MIN_BLOCK_SIZE));
    }

    match Header::from_word(arena.read_word(self.0 - WSIZE)).size() {
      0 => None,
      size => Some(Block(self.0 - size)),
    }
  }
}

/// What a block's payload bytes currently hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
  /// Caller-owned payload of `payload_size` bytes.
  Allocated { payload_size: usize },
  /// Free-list links and, for blocks of 32 bytes or more, a footer.
  Free {
    next: Option<Block>,
    prev: Option<Block>,
    footer: Option<Header>,
  },
}

/// A decoded snapshot of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockView {
  pub block: Block,
  pub size: usize,
  pub prev_allocated: bool,
  pub prev_minimal: bool,
  pub kind: BlockKind,
}

impl BlockView {
  /// Decodes the block at `block`, keyed on its allocation flag.
  pub fn read<A: Arena>(
    arena: &A,
    block: Block,
  ) -> Self {
    let header = block.header(arena);
    let size = header.size();

    let kind = if header.allocated() {
      BlockKind::Allocated {
        payload_size: size.saturating_sub(WSIZE),
      }
    } else {
      let link = |at: usize| match arena.read_word(at) {
        0 => None,
        offset => Some(Block(offset as usize)),
      };
      let linked = size >= LINKED_BLOCK_SIZE;
      let prev_at = block.payload() + WSIZE;
      BlockKind::Free {
        next: link(block.payload()),
        prev: if linked { link(prev_at) } else { None },
        footer: linked.then(|| Header::from_word(arena.read_word(block.footer(size)))),
      }
    };

    Self {
      block,
      size,
      prev_allocated: header.prev_allocated(),
      prev_minimal: header.prev_minimal(),
      kind,
    }
  }

  pub fn is_free(&self) -> bool {
    matches!(self.kind, BlockKind::Free { .. })
  }
}
