//! The allocation engine.
//!
//! ```text
//!   offset 0    8                                              hi-8   hi
//!   ┌──────────┬────────────┬─────────┬──────────────┬───────┬──────────┐
//!   │ prologue │  block     │  block  │  free block  │  ...  │ epilogue │
//!   │ 0 / a    │  (header)  │         │ (hdr ... ftr)│       │  0 / a   │
//!   └──────────┴────────────┴─────────┴──────────────┴───────┴──────────┘
//! ```
//!
//! The prologue word acts as the footer of a zero-size allocated block in
//! front of the first real block, and the epilogue is the header of a
//! zero-size allocated block after the last one. Growing the arena turns the
//! old epilogue into the header of the new free block.

use std::fmt;

use crate::{
  align,
  arena::{Arena, VecArena},
  block::{Block, BlockView},
  config::HeapConfig,
  encoding::{ALIGNMENT, Header, MIN_BLOCK_SIZE, WSIZE},
  error::AllocError,
  freelist::FreeLists,
  validator,
};

/// Offset of the first real block's header.
pub(crate) const HEAP_START: usize = WSIZE;

/// Handle to an allocated payload: its byte offset in the arena.
///
/// [`Address::NULL`] never refers to a payload, since offset zero holds the
/// prologue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(usize);

impl Address {
  pub const NULL: Address = Address(0);

  #[inline]
  pub const fn offset(self) -> usize {
    self.0
  }

  #[inline]
  pub const fn is_null(self) -> bool {
    self.0 == 0
  }
}

impl fmt::Display for Address {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "{:#x}", self.0)
  }
}

/// A segregated-fit heap over a single growable arena.
#[derive(Debug)]
pub struct Heap<A: Arena = VecArena> {
  arena: A,
  lists: FreeLists,
  config: HeapConfig,
}

impl Heap<VecArena> {
  /// A heap over a fresh [`VecArena`] of `config.max_heap` bytes.
  pub fn with_config(config: HeapConfig) -> Result<Self, AllocError> {
    let arena = VecArena::new(config.max_heap);
    Self::new(arena, config)
  }
}

impl<A: Arena> Heap<A> {
  /// Builds a heap in `arena`, discarding whatever the arena held, and
  /// extends it by one chunk.
  pub fn new(
    arena: A,
    config: HeapConfig,
  ) -> Result<Self, AllocError> {
    config.validate()?;

    let mut heap = Self {
      arena,
      lists: FreeLists::new(),
      config,
    };
    heap.init()?;
    Ok(heap)
  }

  /// Forgets every allocation and starts over with an empty arena.
  pub fn reset(&mut self) -> Result<(), AllocError> {
    self.init()
  }

  fn init(&mut self) -> Result<(), AllocError> {
    self.arena.reset();
    self.lists.clear();

    let start = self
      .arena
      .grow(2 * WSIZE)
      .map_err(|source| AllocError::OutOfMemory {
        requested: 2 * WSIZE,
        source,
      })?;
    debug_assert_eq!(start + WSIZE, HEAP_START);

    self
      .arena
      .write_word(start, Header::pack(0, true, true, false).word());
    Block::new(HEAP_START).write_allocated(&mut self.arena, 0, true, false);

    self.extend(self.config.chunk_size)?;

    log::debug!(
      "heap initialised: chunk = {}, capacity = {}",
      self.config.chunk_size,
      self.arena.capacity()
    );
    Ok(())
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }

  #[cfg(test)]
  pub(crate) fn arena_mut(&mut self) -> &mut A {
    &mut self.arena
  }

  pub fn free_lists(&self) -> &FreeLists {
    &self.lists
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  /// Allocates at least `size` payload bytes, aligned to 16 bytes.
  ///
  /// A zero-size request returns [`Address::NULL`] without touching the heap.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Address, AllocError> {
    self.verify("before allocate");

    if size == 0 {
      return Ok(Address::NULL);
    }

    let asize = adjusted_size(size)?;

    let candidates = self.config.fit_candidates;
    let block = match self.lists.find_fit(&self.arena, asize, candidates) {
      Some(block) => block,
      None => {
        let extended = self.extend(asize.max(self.config.chunk_size))?;
        let refit = self.lists.find_fit(&self.arena, asize, candidates);
        refit.unwrap_or(extended)
      }
    };

    self.place(block, asize);

    let address = Address(block.payload());
    let block_size = block.size(&self.arena);
    log::trace!("allocate({size}) -> {address} [block size {block_size}]");

    self.verify("after allocate");
    Ok(address)
  }

  /// Returns the block holding `address` to the free lists.
  ///
  /// Releasing [`Address::NULL`] does nothing. Releasing anything that was
  /// not returned by this heap, or releasing twice, is not detected.
  pub fn release(
    &mut self,
    address: Address,
  ) {
    if address.is_null() {
      return;
    }

    self.verify("before release");

    let block = Block::from_payload(address.0);
    let header = block.header(&self.arena);
    debug_assert!(header.allocated(), "release of free block at {address}");

    block.write_free(
      &mut self.arena,
      header.size(),
      header.prev_allocated(),
      header.prev_minimal(),
    );
    let merged = self.coalesce(block);

    log::trace!(
      "release({address}) [block size {}, merged into {:#x}]",
      header.size(),
      merged.offset()
    );

    self.verify("after release");
  }

  /// Moves the payload at `address` into a fresh block of `size` bytes.
  ///
  /// Copies `min(size, old payload size)` bytes. A zero `size` releases the
  /// block and returns [`Address::NULL`]; a null `address` allocates. When the
  /// new allocation fails the old block is left untouched.
  pub fn resize(
    &mut self,
    address: Address,
    size: usize,
  ) -> Result<Address, AllocError> {
    if size == 0 {
      self.release(address);
      return Ok(Address::NULL);
    }

    if address.is_null() {
      return self.allocate(size);
    }

    let old_size = self.usable_size(address);
    let moved = self.allocate(size)?;

    let len = old_size.min(size);
    self
      .arena
      .bytes_mut()
      .copy_within(address.0..address.0 + len, moved.0);

    self.release(address);

    log::trace!("resize({address}, {size}) -> {moved} [{len} bytes copied]");
    Ok(moved)
  }

  /// Allocates `count * size` zeroed bytes.
  ///
  /// An overflowing product fails before anything is allocated.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<Address, AllocError> {
    let total = count
      .checked_mul(size)
      .ok_or(AllocError::Overflow { count, size })?;

    let address = self.allocate(total)?;
    if !address.is_null() {
      self.arena.bytes_mut()[address.0..address.0 + total].fill(0);
    }
    Ok(address)
  }

  /// Payload capacity of the block at `address`, zero for null.
  pub fn usable_size(
    &self,
    address: Address,
  ) -> usize {
    if address.is_null() {
      return 0;
    }
    Block::from_payload(address.0).size(&self.arena) - WSIZE
  }

  /// The caller-owned bytes at `address`.
  pub fn payload(
    &self,
    address: Address,
  ) -> &[u8] {
    let len = self.usable_size(address);
    &self.arena.bytes()[address.0..address.0 + len]
  }

  pub fn payload_mut(
    &mut self,
    address: Address,
  ) -> &mut [u8] {
    let len = self.usable_size(address);
    &mut self.arena.bytes_mut()[address.0..address.0 + len]
  }

  /// The block holding the payload at `address`, or `None` for null.
  pub fn block_at(
    &self,
    address: Address,
  ) -> Option<BlockView> {
    if address.is_null() {
      return None;
    }
    Some(BlockView::read(&self.arena, Block::from_payload(address.0)))
  }

  /// Every block between the sentinels, in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockView> + '_ {
    let arena = &self.arena;
    let first = Block::new(HEAP_START);
    let first = (first.size(arena) != 0).then_some(first);

    std::iter::successors(first, move |&block| {
      let next = block.next(arena);
      (next.size(arena) != 0).then_some(next)
    })
    .map(move |block| BlockView::read(arena, block))
  }

  /// Runs the validator, logging and returning whether the heap is sound.
  pub fn check_heap(&self) -> bool {
    match self.validate() {
      Ok(()) => true,
      Err(violation) => {
        log::error!("heap check failed: {violation}");
        false
      }
    }
  }

  pub fn validate(&self) -> Result<(), crate::error::HeapViolation> {
    validator::validate(&self.arena, &self.lists)
  }

  fn verify(
    &self,
    site: &str,
  ) {
    if self.config.check_heap {
      if let Err(violation) = self.validate() {
        panic!("heap invariant broken {site}: {violation}");
      }
    }
  }

  /// Grows the arena by `size` bytes and folds the new space into the heap
  /// as one free block, merged with a trailing free block if there is one.
  fn extend(
    &mut self,
    size: usize,
  ) -> Result<Block, AllocError> {
    let size = align!(size);
    let start = self.arena.grow(size).map_err(|source| {
      log::warn!("arena exhausted extending by {size} bytes: {source}");
      AllocError::OutOfMemory {
        requested: size,
        source,
      }
    })?;

    // the old epilogue becomes the new block's header
    let block = Block::new(start - WSIZE);
    let epilogue = block.header(&self.arena);
    block.write_free(
      &mut self.arena,
      size,
      epilogue.prev_allocated(),
      epilogue.prev_minimal(),
    );
    Block::new(block.offset() + size).write_allocated(
      &mut self.arena,
      0,
      false,
      size == MIN_BLOCK_SIZE,
    );

    log::debug!("extended heap by {size} bytes to {}", self.arena.hi());

    Ok(self.coalesce(block))
  }

  /// Merges the free, unlisted `block` with its free neighbours and lists
  /// the result.
  fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    let header = block.header(&self.arena);
    debug_assert!(!header.allocated());

    let next = block.next(&self.arena);
    let next_header = next.header(&self.arena);

    let (start, size) = match (header.prev_allocated(), next_header.allocated()) {
      (true, true) => (block, header.size()),
      (true, false) => {
        self.lists.remove(&mut self.arena, next);
        (block, header.size() + next_header.size())
      }
      (false, true) => {
        let prev = self.free_predecessor(block);
        self.lists.remove(&mut self.arena, prev);
        (prev, prev.size(&self.arena) + header.size())
      }
      (false, false) => {
        let prev = self.free_predecessor(block);
        self.lists.remove(&mut self.arena, prev);
        self.lists.remove(&mut self.arena, next);
        (
          prev,
          prev.size(&self.arena) + header.size() + next_header.size(),
        )
      }
    };

    let start_header = start.header(&self.arena);
    start.write_free(
      &mut self.arena,
      size,
      start_header.prev_allocated(),
      start_header.prev_minimal(),
    );
    let next = Block::new(start.offset() + size);
    next.set_prev_status(&mut self.arena, false, size == MIN_BLOCK_SIZE);

    self.lists.insert(&mut self.arena, start);
    start
  }

  fn free_predecessor(
    &self,
    block: Block,
  ) -> Block {
    match block.prev(&self.arena) {
      Some(prev) => prev,
      None => {
        let at = block.offset();
        unreachable!("block {at:#x} has a free predecessor but no boundary tag")
      }
    }
  }

  /// Marks the listed free `block` allocated with `asize` bytes, splitting
  /// off the remainder when it can stand as a block of its own.
  fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    let header = block.header(&self.arena);
    let size = header.size();
    debug_assert!(!header.allocated() && size >= asize);

    self.lists.remove(&mut self.arena, block);

    let remainder = size - asize;
    if remainder >= MIN_BLOCK_SIZE {
      block.write_allocated(
        &mut self.arena,
        asize,
        header.prev_allocated(),
        header.prev_minimal(),
      );

      let rest = Block::new(block.offset() + asize);
      rest.write_free(&mut self.arena, remainder, true, asize == MIN_BLOCK_SIZE);
      rest
        .next(&self.arena)
        .set_prev_status(&mut self.arena, false, remainder == MIN_BLOCK_SIZE);

      self.lists.insert(&mut self.arena, rest);
    } else {
      block.write_allocated(
        &mut self.arena,
        size,
        header.prev_allocated(),
        header.prev_minimal(),
      );
      block
        .next(&self.arena)
        .set_prev_status(&mut self.arena, true, size == MIN_BLOCK_SIZE);
    }
  }
}

/// Block size needed for a `size` byte payload: header overhead added,
/// rounded up to the alignment unit.
fn adjusted_size(size: usize) -> Result<usize, AllocError> {
  if size > usize::MAX - (WSIZE + ALIGNMENT) {
    return Err(AllocError::TooLarge { requested: size });
  }
  Ok(align!(size + WSIZE).max(MIN_BLOCK_SIZE))
}
