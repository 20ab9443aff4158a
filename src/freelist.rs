//! Segregated free lists.
//!
//! Free blocks are bucketed by size class, measured in 16 byte units:
//!
//! ```text
//!   bucket   0   1   2    3    4    5     6     7     8     9     10    11    12    13     14
//!   units    1   2  3-4  5-6  7-9 10-12 13-15 16-20 21-26 27-36 37-50 51-70 71-99 100-140  141+
//! ```
//!
//! Links are stored inside the free blocks' payload bytes as arena offsets,
//! with zero meaning "none". Bucket 0 holds 16 byte blocks, which only have
//! room for a forward link, so it is a singly linked list. All other buckets
//! are doubly linked and the head's backward link is always zero.

use crate::{
  arena::Arena,
  block::Block,
  encoding::{MIN_BLOCK_SIZE, WSIZE},
};

/// Number of size classes.
pub const BUCKETS: usize = 15;

/// Inclusive upper bound of each bucket, in minimal block units. The last
/// bucket is open-ended.
const UPPER_UNITS: [usize; BUCKETS - 1] = [1, 2, 4, 6, 9, 12, 15, 20, 26, 36, 50, 70, 99, 140];

/// Size class of a block of `size` bytes.
pub fn classify(size: usize) -> usize {
  let units = size / MIN_BLOCK_SIZE;
  UPPER_UNITS
    .iter()
    .position(|&upper| units <= upper)
    .unwrap_or(BUCKETS - 1)
}

/// Smallest and (inclusive) largest block size a bucket accepts.
pub fn bucket_range(bucket: usize) -> (usize, Option<usize>) {
  let lower = match bucket {
    0 => 1,
    _ => UPPER_UNITS[bucket - 1] + 1,
  };
  let upper = UPPER_UNITS.get(bucket).copied();
  (
    lower * MIN_BLOCK_SIZE,
    upper.map(|units| units * MIN_BLOCK_SIZE),
  )
}

#[inline]
fn is_two_way(bucket: usize) -> bool {
  bucket != 0
}

#[inline]
fn next_slot(block: Block) -> usize {
  block.payload()
}

#[inline]
fn prev_slot(block: Block) -> usize {
  block.payload() + WSIZE
}

#[inline]
fn read_link<A: Arena>(
  arena: &A,
  at: usize,
) -> Option<Block> {
  match arena.read_word(at) {
    0 => None,
    offset => Some(Block::new(offset as usize)),
  }
}

#[inline]
fn write_link<A: Arena>(
  arena: &mut A,
  at: usize,
  link: Option<Block>,
) {
  arena.write_word(at, link.map_or(0, |block| block.offset() as u64));
}

/// Forward link of a listed block.
#[inline]
pub fn next_free<A: Arena>(
  arena: &A,
  block: Block,
) -> Option<Block> {
  read_link(arena, next_slot(block))
}

/// Backward link of a listed block. Always `None` for minimal blocks.
#[inline]
pub fn prev_free<A: Arena>(
  arena: &A,
  block: Block,
) -> Option<Block> {
  if block.size(arena) > MIN_BLOCK_SIZE {
    read_link(arena, prev_slot(block))
  } else {
    None
  }
}

/// The bucket heads. The list bodies live in the arena.
#[derive(Debug, Clone, Default)]
pub struct FreeLists {
  heads: [Option<Block>; BUCKETS],
}

impl FreeLists {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn head(
    &self,
    bucket: usize,
  ) -> Option<Block> {
    self.heads[bucket]
  }

  pub fn clear(&mut self) {
    self.heads = [None; BUCKETS];
  }

  /// Pushes `block` at the head of its bucket.
  ///
  /// The block's header must already hold its final size.
  pub fn insert<A: Arena>(
    &mut self,
    arena: &mut A,
    block: Block,
  ) {
    let bucket = classify(block.size(arena));
    let old_head = self.heads[bucket];
    debug_assert_ne!(old_head, Some(block), "block inserted twice");

    write_link(arena, next_slot(block), old_head);
    if is_two_way(bucket) {
      write_link(arena, prev_slot(block), None);
      if let Some(old_head) = old_head {
        write_link(arena, prev_slot(old_head), Some(block));
      }
    }

    self.heads[bucket] = Some(block);
  }

  /// Splices `block` out of its bucket.
  ///
  /// The block's header must still hold the size it was inserted with.
  pub fn remove<A: Arena>(
    &mut self,
    arena: &mut A,
    block: Block,
  ) {
    let bucket = classify(block.size(arena));
    let next = next_free(arena, block);

    if !is_two_way(bucket) {
      if self.heads[bucket] == Some(block) {
        self.heads[bucket] = next;
        return;
      }

      let mut current = self.heads[bucket];
      while let Some(node) = current {
        let following = next_free(arena, node);
        if following == Some(block) {
          write_link(arena, next_slot(node), next);
          return;
        }
        current = following;
      }

      debug_assert!(false, "block {:#x} not in bucket 0", block.offset());
      return;
    }

    let prev = read_link(arena, prev_slot(block));
    match prev {
      Some(prev) => write_link(arena, next_slot(prev), next),
      None => {
        debug_assert_eq!(self.heads[bucket], Some(block));
        self.heads[bucket] = next;
      }
    }
    if let Some(next) = next {
      write_link(arena, prev_slot(next), prev);
    }
  }

  /// Finds a free block of at least `asize` bytes.
  ///
  /// Scans buckets upward from `asize`'s own class and stops once
  /// `candidates` admissible blocks have been seen, returning the closest
  /// fit among them. Returns `None` only when no free block is large enough.
  pub fn find_fit<A: Arena>(
    &self,
    arena: &A,
    asize: usize,
    candidates: usize,
  ) -> Option<Block> {
    let mut best: Option<(Block, usize)> = None;
    let mut seen = 0;

    'buckets: for bucket in classify(asize)..BUCKETS {
      let mut current = self.heads[bucket];
      while let Some(block) = current {
        let size = block.size(arena);
        if size >= asize {
          if best.is_none_or(|(_, best_size)| size < best_size) {
            best = Some((block, size));
          }
          seen += 1;
          if seen >= candidates || size == asize {
            break 'buckets;
          }
        }
        current = next_free(arena, block);
      }
    }

    best.map(|(block, _)| block)
  }

  /// Iterates the blocks of one bucket, head first.
  pub fn iter<'a, A: Arena>(
    &self,
    arena: &'a A,
    bucket: usize,
  ) -> impl Iterator<Item = Block> + 'a {
    std::iter::successors(self.heads[bucket], move |&block| next_free(arena, block))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arena::VecArena;

  fn arena() -> VecArena {
    let mut arena = VecArena::new(1 << 16);
    arena.grow(1 << 14).unwrap();
    arena
  }

  fn free_block(
    arena: &mut VecArena,
    offset: usize,
    size: usize,
  ) -> Block {
    let block = Block::new(offset);
    block.write_free(arena, size, true, false);
    block
  }

  #[test]
  fn test_classify_ladder() {
    let expect = [
      (16, 0),
      (32, 1),
      (48, 2),
      (64, 2),
      (80, 3),
      (96, 3),
      (112, 4),
      (144, 4),
      (160, 5),
      (240, 6),
      (256, 7),
      (320, 7),
      (336, 8),
      (576, 9),
      (800, 10),
      (1120, 11),
      (1584, 12),
      (1600, 13),
      (2240, 13),
      (2256, 14),
      (1 << 20, 14),
    ];

    for (size, bucket) in expect {
      assert_eq!(classify(size), bucket, "size {size}");
    }
  }

  #[test]
  fn test_classify_is_monotonic() {
    let mut last = 0;
    for units in 1..400 {
      let bucket = classify(units * MIN_BLOCK_SIZE);
      assert!(bucket >= last);
      last = bucket;
    }
  }

  #[test]
  fn test_bucket_range_matches_classify() {
    for bucket in 0..BUCKETS {
      let (lower, upper) = bucket_range(bucket);
      assert_eq!(classify(lower), bucket);
      if bucket > 0 {
        assert_eq!(classify(lower - MIN_BLOCK_SIZE), bucket - 1);
      }
      if let Some(upper) = upper {
        assert_eq!(classify(upper), bucket);
        assert_eq!(classify(upper + MIN_BLOCK_SIZE), bucket + 1);
      }
    }
    assert_eq!(bucket_range(0), (16, Some(16)));
    assert_eq!(bucket_range(14), (2256, None));
  }

  #[test]
  fn test_insert_is_lifo() {
    let mut arena = arena();
    let mut lists = FreeLists::new();
    let a = free_block(&mut arena, 8, 64);
    let b = free_block(&mut arena, 200, 48);
    let c = free_block(&mut arena, 400, 64);

    lists.insert(&mut arena, a);
    lists.insert(&mut arena, b);
    lists.insert(&mut arena, c);

    assert_eq!(lists.iter(&arena, 2).collect::<Vec<_>>(), vec![c, b, a]);
    assert_eq!(prev_free(&arena, c), None);
    assert_eq!(prev_free(&arena, b), Some(c));
    assert_eq!(prev_free(&arena, a), Some(b));
  }

  #[test]
  fn test_remove_two_way() {
    let mut arena = arena();
    let mut lists = FreeLists::new();
    let a = free_block(&mut arena, 8, 64);
    let b = free_block(&mut arena, 200, 64);
    let c = free_block(&mut arena, 400, 64);
    for block in [a, b, c] {
      lists.insert(&mut arena, block);
    }

    lists.remove(&mut arena, b);
    assert_eq!(lists.iter(&arena, 2).collect::<Vec<_>>(), vec![c, a]);
    assert_eq!(prev_free(&arena, a), Some(c));

    lists.remove(&mut arena, c);
    assert_eq!(lists.head(2), Some(a));
    assert_eq!(prev_free(&arena, a), None);

    lists.remove(&mut arena, a);
    assert_eq!(lists.head(2), None);
  }

  #[test]
  fn test_remove_one_way() {
    let mut arena = arena();
    let mut lists = FreeLists::new();
    let blocks: Vec<_> = (0..4)
      .map(|i| free_block(&mut arena, 8 + i * 64, MIN_BLOCK_SIZE))
      .collect();
    for &block in &blocks {
      lists.insert(&mut arena, block);
    }

    lists.remove(&mut arena, blocks[1]);
    lists.remove(&mut arena, blocks[3]);
    assert_eq!(
      lists.iter(&arena, 0).collect::<Vec<_>>(),
      vec![blocks[2], blocks[0]]
    );

    lists.remove(&mut arena, blocks[0]);
    assert_eq!(lists.iter(&arena, 0).collect::<Vec<_>>(), vec![blocks[2]]);
  }

  #[test]
  fn test_find_fit_prefers_closest() {
    let mut arena = arena();
    let mut lists = FreeLists::new();
    let big = free_block(&mut arena, 8, 144);
    let close = free_block(&mut arena, 400, 112);
    let small = free_block(&mut arena, 800, 96);
    for block in [big, close, small] {
      lists.insert(&mut arena, block);
    }

    assert_eq!(lists.find_fit(&arena, 112, 9), Some(close));
    assert_eq!(lists.find_fit(&arena, 100, 9), Some(close));
    assert_eq!(lists.find_fit(&arena, 128, 9), Some(big));
    assert_eq!(lists.find_fit(&arena, 160, 9), None);
  }

  #[test]
  fn test_find_fit_respects_candidate_budget() {
    let mut arena = arena();
    let mut lists = FreeLists::new();
    let large = free_block(&mut arena, 8, 1024);
    let larger = free_block(&mut arena, 2048, 2048);
    lists.insert(&mut arena, large);
    lists.insert(&mut arena, larger);

    // one candidate: the first admissible block wins
    assert_eq!(lists.find_fit(&arena, 64, 1), Some(large));
    assert_eq!(lists.find_fit(&arena, 1040, 1), Some(larger));
  }

  #[test]
  fn test_find_fit_searches_larger_buckets() {
    let mut arena = arena();
    let mut lists = FreeLists::new();
    let minimal = free_block(&mut arena, 8, MIN_BLOCK_SIZE);
    let huge = free_block(&mut arena, 64, 4096);
    lists.insert(&mut arena, minimal);
    lists.insert(&mut arena, huge);

    assert_eq!(lists.find_fit(&arena, 16, 9), Some(minimal));
    assert_eq!(lists.find_fit(&arena, 32, 9), Some(huge));
  }
}
