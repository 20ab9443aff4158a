//! Error types for the allocator, its arena and the trace driver.

use thiserror::Error;

/// Errors reported by an [`Arena`](crate::Arena) when it cannot grow.
#[derive(Debug, Error)]
pub enum ArenaError {
  /// The arena has reached its capacity limit.
  #[error("arena exhausted: requested {requested} bytes, {available} available")]
  Exhausted { requested: usize, available: usize },

  /// The backing region could not be mapped.
  #[error("failed to map arena backing memory: {0}")]
  Map(#[from] std::io::Error),
}

/// Errors reported by the allocation operations.
#[derive(Debug, Error)]
pub enum AllocError {
  /// The arena could not be extended to satisfy the request.
  #[error("out of memory while allocating {requested} bytes")]
  OutOfMemory {
    requested: usize,
    #[source]
    source: ArenaError,
  },

  /// The adjusted block size does not fit in the address space.
  #[error("request of {requested} bytes is too large")]
  TooLarge { requested: usize },

  /// `count * size` overflowed in a zeroed allocation.
  #[error("zeroed allocation of {count} x {size} bytes overflows")]
  Overflow { count: usize, size: usize },

  /// The heap could not be constructed with the given configuration.
  #[error("invalid heap configuration: {0}")]
  Config(#[from] ConfigError),
}

/// Invalid [`HeapConfig`](crate::HeapConfig) values.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("chunk size {0} must be a non-zero multiple of 16")]
  ChunkSize(usize),

  #[error("max heap {max_heap} cannot hold an initial chunk of {chunk_size} bytes")]
  MaxHeap { max_heap: usize, chunk_size: usize },

  #[error("at least one fit candidate is required")]
  FitCandidates,
}

/// A broken heap invariant, as found by the validator.
///
/// Every variant carries the arena offset of the offending block or word.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapViolation {
  #[error("arena of {size} bytes is too small to hold the sentinels")]
  ArenaTooSmall { size: usize },

  #[error("prologue at {at:#x} is not a zero-size allocated sentinel")]
  BadPrologue { at: usize },

  #[error("epilogue at {at:#x} is not a zero-size allocated sentinel")]
  BadEpilogue { at: usize },

  #[error("block at {at:#x} has size {size}, below the minimal block size")]
  Undersized { at: usize, size: usize },

  #[error("block at {at:#x} has a payload off the alignment unit")]
  Misaligned { at: usize },

  #[error("block at {at:#x} has non-zero reserved header bits")]
  ReservedBits { at: usize },

  #[error("block at {at:#x} with size {size} runs past the epilogue")]
  Overrun { at: usize, size: usize },

  #[error("free blocks at {prev:#x} and {at:#x} are adjacent")]
  AdjacentFree { prev: usize, at: usize },

  #[error("block at {at:#x} has a stale previous-allocated flag")]
  PrevAllocatedFlag { at: usize },

  #[error("block at {at:#x} has a stale previous-minimal flag")]
  PrevMinimalFlag { at: usize },

  #[error("free block at {at:#x} has a footer that does not match its header")]
  FooterMismatch { at: usize },

  #[error("bucket {bucket} head at {at:#x} has a backward link")]
  HeadHasPrev { bucket: usize, at: usize },

  #[error("bucket {bucket} links to {at:#x}, which is not a block in the heap")]
  DanglingLink { bucket: usize, at: usize },

  #[error("bucket {bucket} holds allocated block at {at:#x}")]
  AllocatedInList { bucket: usize, at: usize },

  #[error("bucket {bucket} holds block at {at:#x} of size {size}, outside its range")]
  WrongBucket {
    bucket: usize,
    at: usize,
    size: usize,
  },

  #[error("block at {at:#x} backward link does not point to its list predecessor")]
  BrokenBackLink { at: usize },

  #[error("block at {at:#x} appears more than once in the free lists")]
  Duplicated { at: usize },

  #[error("{in_heap} free blocks in the heap but {in_lists} in the free lists")]
  FreeCountMismatch { in_heap: usize, in_lists: usize },
}

/// Errors from parsing or replaying an allocation trace.
#[derive(Debug, Error)]
pub enum TraceError {
  #[error("failed to read trace: {0}")]
  Io(#[from] std::io::Error),

  #[error("line {line}: {message}")]
  Parse { line: usize, message: String },

  #[error("operation {op}: id {id} is not live")]
  UnknownId { op: usize, id: usize },

  #[error("operation {op}: id {id} is already live")]
  LiveId { op: usize, id: usize },

  #[error("operation {op}: payload of id {id} was overwritten")]
  Corrupted { op: usize, id: usize },

  #[error("operation {op}: {source}")]
  Alloc {
    op: usize,
    #[source]
    source: AllocError,
  },

  #[error("operation {op}: payload of id {id} is misaligned")]
  Misaligned { op: usize, id: usize },

}
