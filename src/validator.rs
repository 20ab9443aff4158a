//! Heap consistency checker.
//!
//! Reads the arena and the bucket heads directly, decoding headers itself
//! rather than going through the engine's navigation helpers, so a bug in
//! those helpers cannot hide from it.

use std::collections::{HashMap, HashSet};

use crate::{
  arena::Arena,
  encoding::{ALIGNMENT, Header, LINKED_BLOCK_SIZE, MIN_BLOCK_SIZE, WSIZE},
  error::HeapViolation,
  freelist::{BUCKETS, FreeLists, classify},
};

/// Checks every heap invariant, returning the first violation found.
pub fn validate<A: Arena>(
  arena: &A,
  lists: &FreeLists,
) -> Result<(), HeapViolation> {
  let blocks = check_blocks(arena)?;
  check_lists(arena, lists, &blocks)
}

fn word<A: Arena>(
  arena: &A,
  at: usize,
) -> Header {
  Header::from_word(arena.try_read_word(at).unwrap_or(0))
}

fn is_sentinel(header: Header) -> bool {
  header.size() == 0 && header.allocated()
}

/// Address-order pass. Returns the header of every real block by offset.
fn check_blocks<A: Arena>(arena: &A) -> Result<HashMap<usize, Header>, HeapViolation> {
  let lo = arena.lo();
  let hi = arena.hi();
  if hi - lo < 2 * WSIZE {
    return Err(HeapViolation::ArenaTooSmall { size: hi - lo });
  }

  if !is_sentinel(word(arena, lo)) {
    return Err(HeapViolation::BadPrologue { at: lo });
  }
  let epilogue = hi - WSIZE;
  if !is_sentinel(word(arena, epilogue)) {
    return Err(HeapViolation::BadEpilogue { at: epilogue });
  }

  let mut blocks = HashMap::new();
  let mut prev: Option<(usize, Header)> = None;
  let mut at = lo + WSIZE;

  loop {
    let header = word(arena, at);

    let (prev_allocated, prev_minimal) = match prev {
      None => (true, false),
      Some((_, prev)) => (prev.allocated(), prev.size() == MIN_BLOCK_SIZE),
    };
    if header.prev_allocated() != prev_allocated {
      return Err(HeapViolation::PrevAllocatedFlag { at });
    }
    if header.prev_minimal() != prev_minimal {
      return Err(HeapViolation::PrevMinimalFlag { at });
    }

    if at == epilogue {
      break;
    }

    let size = header.size();
    if header.reserved_bits() != 0 {
      return Err(HeapViolation::ReservedBits { at });
    }
    if size < MIN_BLOCK_SIZE {
      return Err(HeapViolation::Undersized { at, size });
    }
    if (at + WSIZE) % ALIGNMENT != 0 {
      return Err(HeapViolation::Misaligned { at });
    }
    if at.checked_add(size).is_none_or(|end| end > epilogue) {
      return Err(HeapViolation::Overrun { at, size });
    }

    if !header.allocated() {
      if let Some((prev_at, prev)) = prev {
        if !prev.allocated() {
          return Err(HeapViolation::AdjacentFree { prev: prev_at, at });
        }
      }
      if size >= LINKED_BLOCK_SIZE && word(arena, at + size - WSIZE) != header {
        return Err(HeapViolation::FooterMismatch { at });
      }
    }

    blocks.insert(at, header);
    prev = Some((at, header));
    at += size;
  }

  Ok(blocks)
}

/// Free-list pass over every bucket.
fn check_lists<A: Arena>(
  arena: &A,
  lists: &FreeLists,
  blocks: &HashMap<usize, Header>,
) -> Result<(), HeapViolation> {
  let mut listed = HashSet::new();

  for bucket in 0..BUCKETS {
    let mut expected_prev: Option<usize> = None;
    let mut current = lists.head(bucket).map(|block| block.offset());

    while let Some(at) = current {
      let header = blocks
        .get(&at)
        .copied()
        .ok_or(HeapViolation::DanglingLink { bucket, at })?;

      if header.allocated() {
        return Err(HeapViolation::AllocatedInList { bucket, at });
      }
      if classify(header.size()) != bucket {
        return Err(HeapViolation::WrongBucket {
          bucket,
          at,
          size: header.size(),
        });
      }
      if !listed.insert(at) {
        return Err(HeapViolation::Duplicated { at });
      }

      if bucket != 0 {
        let back = arena.read_word(at + 2 * WSIZE) as usize;
        match expected_prev {
          None if back != 0 => return Err(HeapViolation::HeadHasPrev { bucket, at }),
          Some(prev) if back != prev => return Err(HeapViolation::BrokenBackLink { at }),
          _ => {}
        }
      }

      expected_prev = Some(at);
      current = match arena.read_word(at + WSIZE) {
        0 => None,
        next => Some(next as usize),
      };
    }
  }

  let in_heap = blocks.values().filter(|header| !header.allocated()).count();
  if in_heap != listed.len() {
    return Err(HeapViolation::FreeCountMismatch {
      in_heap,
      in_lists: listed.len(),
    });
  }

  Ok(())
}
