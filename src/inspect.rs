//! Read-only views of a heap: aggregate statistics and a printable dump.

use std::fmt;

use crate::{
  arena::Arena,
  block::BlockKind,
  freelist::{BUCKETS, bucket_range, classify},
  heap::Heap,
};

/// Occupancy figures gathered by one address-order pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Total arena bytes, sentinels included.
  pub arena_bytes: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  /// Bytes callers can use: allocated block sizes minus their headers.
  pub payload_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
  /// Free blocks per size class.
  pub bucket_counts: [usize; BUCKETS],
}

impl HeapStats {
  /// Share of the arena handed out as payload, in `[0, 1]`.
  pub fn utilization(&self) -> f64 {
    if self.arena_bytes == 0 {
      return 0.0;
    }
    self.payload_bytes as f64 / self.arena_bytes as f64
  }
}

impl<A: Arena> Heap<A> {
  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      arena_bytes: self.arena().size(),
      ..Default::default()
    };

    for view in self.blocks() {
      match view.kind {
        BlockKind::Allocated { payload_size } => {
          stats.allocated_blocks += 1;
          stats.allocated_bytes += view.size;
          stats.payload_bytes += payload_size;
        }
        BlockKind::Free { .. } => {
          stats.free_blocks += 1;
          stats.free_bytes += view.size;
          stats.largest_free = stats.largest_free.max(view.size);
          stats.bucket_counts[classify(view.size)] += 1;
        }
      }
    }

    stats
  }

  /// A [`Display`](fmt::Display) rendering of every block and bucket.
  pub fn dump(&self) -> HeapDump<'_, A> {
    HeapDump { heap: self }
  }
}

/// Printable heap layout, returned by [`Heap::dump`].
pub struct HeapDump<'a, A: Arena> {
  heap: &'a Heap<A>,
}

fn link(block: Option<crate::block::Block>) -> String {
  match block {
    Some(block) => format!("{:#x}", block.offset()),
    None => "-".to_string(),
  }
}

impl<A: Arena> fmt::Display for HeapDump<'_, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let heap = self.heap;
    let arena = heap.arena();

    writeln!(f, "heap [{:#x}, {:#x}) {} bytes", arena.lo(), arena.hi(), arena.size())?;

    for view in heap.blocks() {
      let flags = format!(
        "{}{}",
        if view.prev_allocated { 'p' } else { '-' },
        if view.prev_minimal { 'm' } else { '-' },
      );
      match view.kind {
        BlockKind::Allocated { payload_size } => writeln!(
          f,
          "  {:#08x} {:>8} alloc {flags} payload {payload_size}",
          view.block.offset(),
          view.size,
        )?,
        BlockKind::Free { next, prev, .. } => writeln!(
          f,
          "  {:#08x} {:>8} free  {flags} next {} prev {}",
          view.block.offset(),
          view.size,
          link(next),
          link(prev),
        )?,
      }
    }

    for bucket in 0..BUCKETS {
      let members: Vec<_> = heap
        .free_lists()
        .iter(arena, bucket)
        .map(|block| format!("{:#x}", block.offset()))
        .collect();
      if members.is_empty() {
        continue;
      }
      let (lower, upper) = bucket_range(bucket);
      let upper = upper.map_or_else(|| "..".to_string(), |upper| upper.to_string());
      let members = members.join(" -> ");
      writeln!(f, "  bucket {bucket:>2} [{lower}, {upper}]: {members}")?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use crate::{Heap, HeapConfig, encoding::WSIZE};

  #[test]
  fn test_stats() {
    let mut heap = Heap::with_config(HeapConfig::default()).unwrap();
    let a = heap.allocate(24).unwrap();
    let _b = heap.allocate(8).unwrap();
    heap.release(a);

    let stats = heap.stats();
    assert_eq!(stats.arena_bytes, 4096 + 2 * WSIZE);
    assert_eq!(stats.allocated_blocks, 1);
    assert_eq!(stats.allocated_bytes, 16);
    assert_eq!(stats.payload_bytes, 8);
    assert_eq!(stats.free_blocks, 2);
    assert_eq!(stats.free_bytes, 4096 - 16);
    assert_eq!(stats.largest_free, 4096 - 48);
    assert_eq!(stats.bucket_counts[1], 1);
    assert_eq!(stats.bucket_counts[14], 1);
    let accounted = stats.allocated_bytes + stats.free_bytes + 2 * WSIZE;
    assert_eq!(accounted, stats.arena_bytes);
    assert!(stats.utilization() > 0.0 && stats.utilization() < 0.01);
  }

  #[test]
  fn test_dump() {
    let mut heap = Heap::with_config(HeapConfig::default()).unwrap();
    let a = heap.allocate(24).unwrap();
    let _b = heap.allocate(8).unwrap();
    heap.release(a);

    let dump = heap.dump().to_string();
    let lines: Vec<_> = dump.lines().collect();

    assert!(lines[0].starts_with("heap [0x0, 0x1010) 4112 bytes"));
    assert!(lines[1].contains("free"));
    assert!(lines[2].contains("alloc"));
    assert!(lines[3].contains("free"));
    assert!(dump.contains("bucket  1 [32, 32]: 0x8"));
    assert!(dump.contains("bucket 14 [2256, ..]: 0x38"));
  }
}
