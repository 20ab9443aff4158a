//! Property-based tests for the heap.
//!
//! Random sequences of allocate/release/resize calls are applied to a heap
//! while a simple model remembers what every live payload should contain.

use proptest::prelude::*;
use segalloc::{
  Address, Arena, Heap, HeapConfig, Header,
  encoding::{ALIGNMENT, WSIZE},
  freelist::{BUCKETS, classify},
};

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Action {
  Allocate(usize),
  Release(usize),
  Resize(usize, usize),
  ZeroAllocate(usize, usize),
}

fn request_size() -> impl Strategy<Value = usize> {
  prop_oneof![
    8 => 1usize..=64,
    4 => 65usize..=600,
    1 => 601usize..=12_000,
  ]
}

fn resize_size() -> impl Strategy<Value = usize> {
  prop_oneof![3 => request_size(), 1 => Just(0usize)]
}

fn action() -> impl Strategy<Value = Action> {
  prop_oneof![
    4 => request_size().prop_map(Action::Allocate),
    3 => any::<usize>().prop_map(Action::Release),
    2 => (any::<usize>(), resize_size()).prop_map(|(index, size)| Action::Resize(index, size)),
    1 => (1usize..=16, 1usize..=64).prop_map(|(count, size)| Action::ZeroAllocate(count, size)),
  ]
}

fn sizes_and_order() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
  prop::collection::vec(request_size(), 1..60).prop_flat_map(|sizes| {
    let order: Vec<usize> = (0..sizes.len()).collect();
    (Just(sizes), Just(order).prop_shuffle())
  })
}

fn aligned_size() -> impl Strategy<Value = usize> {
  (0usize..(1 << 40)).prop_map(|units| units * ALIGNMENT)
}

fn non_zero_aligned_size() -> impl Strategy<Value = usize> {
  (1usize..(1 << 40)).prop_map(|units| units * ALIGNMENT)
}

// ============================================================================
// Model
// ============================================================================

struct Live {
  address: Address,
  size: usize,
  tag: u8,
}

fn heap() -> Heap {
  Heap::with_config(HeapConfig::default()).unwrap()
}

fn apply(
  heap: &mut Heap,
  live: &mut Vec<Live>,
  action: &Action,
  tag: u8,
) {
  match *action {
    Action::Allocate(size) => {
      let address = heap.allocate(size).unwrap();
      heap.payload_mut(address)[..size].fill(tag);
      live.push(Live { address, size, tag });
    }
    Action::Release(index) => {
      if !live.is_empty() {
        let entry = live.swap_remove(index % live.len());
        heap.release(entry.address);
      }
    }
    Action::Resize(index, size) => {
      if live.is_empty() {
        return;
      }
      let entry = live.swap_remove(index % live.len());
      let moved = heap.resize(entry.address, size).unwrap();
      if size == 0 {
        assert!(moved.is_null());
        return;
      }
      let kept = entry.size.min(size);
      let old = &heap.payload(moved)[..kept];
      assert!(old.iter().all(|&byte| byte == entry.tag));
      heap.payload_mut(moved)[..size].fill(tag);
      live.push(Live {
        address: moved,
        size,
        tag,
      });
    }
    Action::ZeroAllocate(count, size) => {
      let total = count * size;
      let address = heap.zero_allocate(count, size).unwrap();
      assert!(heap.payload(address)[..total].iter().all(|&byte| byte == 0));
      heap.payload_mut(address)[..total].fill(tag);
      live.push(Live {
        address,
        size: total,
        tag,
      });
    }
  }
}

fn listed_free_blocks(heap: &Heap) -> usize {
  let lists = heap.free_lists();
  (0..BUCKETS)
    .map(|bucket| lists.iter(heap.arena(), bucket).count())
    .sum()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
  /// Header fields survive packing.
  #[test]
  fn header_pack_roundtrip(
    size in aligned_size(),
    allocated in any::<bool>(),
    prev_allocated in any::<bool>(),
    prev_minimal in any::<bool>(),
  ) {
    let header = Header::pack(size, allocated, prev_allocated, prev_minimal);
    prop_assert_eq!(header.size(), size);
    prop_assert_eq!(header.allocated(), allocated);
    prop_assert_eq!(header.prev_allocated(), prev_allocated);
    prop_assert_eq!(header.prev_minimal(), prev_minimal);
    prop_assert_eq!(header.reserved_bits(), 0);
    prop_assert_eq!(Header::from_word(header.word()), header);
  }

  /// Every size class covers exactly the sizes it claims.
  #[test]
  fn classify_agrees_with_ranges(size in non_zero_aligned_size()) {
    let bucket = classify(size);
    let (lower, upper) = segalloc::freelist::bucket_range(bucket);
    prop_assert!(size >= lower);
    prop_assert!(upper.is_none_or(|upper| size <= upper));
  }

  /// The validator accepts the heap after every operation.
  #[test]
  fn heap_stays_valid(actions in prop::collection::vec(action(), 1..150)) {
    let mut heap = heap();
    let mut live = Vec::new();

    for (step, action) in actions.iter().enumerate() {
      apply(&mut heap, &mut live, action, step as u8);
      prop_assert_eq!(heap.validate(), Ok(()), "after {:?}", action);
    }
  }

  /// No two free blocks are ever adjacent in address order.
  #[test]
  fn free_blocks_are_coalesced(actions in prop::collection::vec(action(), 1..150)) {
    let mut heap = heap();
    let mut live = Vec::new();

    for (step, action) in actions.iter().enumerate() {
      apply(&mut heap, &mut live, action, step as u8);
      let views: Vec<_> = heap.blocks().collect();
      for pair in views.windows(2) {
        prop_assert!(!(pair[0].is_free() && pair[1].is_free()));
      }
    }
  }

  /// Block sizes plus both sentinels account for the whole arena, and the
  /// lists hold exactly the free blocks.
  #[test]
  fn space_is_conserved(actions in prop::collection::vec(action(), 1..150)) {
    let mut heap = heap();
    let mut live = Vec::new();

    for (step, action) in actions.iter().enumerate() {
      apply(&mut heap, &mut live, action, step as u8);

      let total: usize = heap.blocks().map(|view| view.size).sum();
      prop_assert_eq!(total + 2 * WSIZE, heap.arena().size());

      let stats = heap.stats();
      prop_assert_eq!(stats.allocated_blocks, live.len());
      prop_assert_eq!(stats.free_blocks, listed_free_blocks(&heap));
    }
  }

  /// Live payloads are aligned and keep their contents across unrelated
  /// operations.
  #[test]
  fn payloads_are_preserved(actions in prop::collection::vec(action(), 1..150)) {
    let mut heap = heap();
    let mut live = Vec::new();

    for (step, action) in actions.iter().enumerate() {
      apply(&mut heap, &mut live, action, step as u8);

      for entry in &live {
        prop_assert_eq!(entry.address.offset() % ALIGNMENT, 0);
        prop_assert!(heap.usable_size(entry.address) >= entry.size);
        let bytes = &heap.payload(entry.address)[..entry.size];
        prop_assert!(bytes.iter().all(|&byte| byte == entry.tag));
      }
    }
  }

  /// Releasing everything, in any order, leaves a single free block.
  #[test]
  fn releasing_everything_merges((sizes, order) in sizes_and_order()) {
    let mut heap = heap();
    let mut addresses = Vec::new();
    for &size in &sizes {
      addresses.push(heap.allocate(size).unwrap());
    }

    for index in order {
      heap.release(addresses[index]);
    }

    prop_assert_eq!(heap.blocks().count(), 1);
    prop_assert_eq!(heap.stats().allocated_blocks, 0);
    prop_assert_eq!(heap.validate(), Ok(()));
  }
}
