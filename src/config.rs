use crate::{
  arena::DEFAULT_MAX_HEAP,
  encoding::{ALIGNMENT, WSIZE},
  error::ConfigError,
};

/// Tuning knobs for a [`Heap`](crate::Heap).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
  /// Minimum number of bytes requested from the arena when it has to grow.
  /// Must be a multiple of 16. Also the size of the initial free block.
  pub chunk_size: usize,
  /// Capacity of arenas created by [`Heap::with_config`](crate::Heap::with_config).
  pub max_heap: usize,
  /// How many admissible free blocks the fit search looks at before
  /// settling on the closest one.
  pub fit_candidates: usize,
  /// Run the heap validator before and after every mutating call, panicking
  /// on the first violation.
  pub check_heap: bool,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      chunk_size: 1 << 12, // 4 KB
      max_heap: DEFAULT_MAX_HEAP,
      fit_candidates: 9,
      check_heap: false,
    }
  }
}

impl HeapConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.chunk_size == 0 || !self.chunk_size.is_multiple_of(ALIGNMENT) {
      return Err(ConfigError::ChunkSize(self.chunk_size));
    }
    if self.max_heap < self.chunk_size.saturating_add(2 * WSIZE) {
      return Err(ConfigError::MaxHeap {
        max_heap: self.max_heap,
        chunk_size: self.chunk_size,
      });
    }
    if self.fit_candidates == 0 {
      return Err(ConfigError::FitCandidates);
    }
    Ok(())
  }
}
