//! The byte region the heap lives in.
//!
//! ```text
//!   lo                                      hi            lo + capacity
//!   ┌────────────────────────────────────────┬───────────────────┐
//!   │            grown (in use)              │     reserved      │
//!   └────────────────────────────────────────┴───────────────────┘
//!                                            ▲
//!                                            └── break, moved by grow()
//! ```
//!
//! Addresses handed around by the heap are byte offsets from `lo`, so an
//! arena may move its backing store without invalidating any of them.

use std::ptr::NonNull;

use crate::{encoding::WSIZE, error::ArenaError};

/// Default capacity limit: 20 MiB.
pub const DEFAULT_MAX_HEAP: usize = 20 * (1 << 20);

/// A contiguous, append-only byte region.
pub trait Arena {
  /// Grows the arena by `bytes` at the high end, returning the offset where
  /// the new region starts (the old `hi`).
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<usize, ArenaError>;

  /// Empties the arena without releasing the backing store.
  fn reset(&mut self);

  /// One past the last usable byte.
  fn hi(&self) -> usize;

  /// Hard limit on `hi`.
  fn capacity(&self) -> usize;

  fn bytes(&self) -> &[u8];

  fn bytes_mut(&mut self) -> &mut [u8];

  /// First usable byte. Always zero, since addresses are offsets.
  fn lo(&self) -> usize {
    0
  }

  fn size(&self) -> usize {
    self.hi() - self.lo()
  }

  /// Reads the word at `at`. Panics when out of bounds.
  #[inline]
  fn read_word(
    &self,
    at: usize,
  ) -> u64 {
    let mut word = [0u8; WSIZE];
    word.copy_from_slice(&self.bytes()[at..at + WSIZE]);
    u64::from_ne_bytes(word)
  }

  /// Reads the word at `at`, or `None` when it is not fully inside the arena.
  #[inline]
  fn try_read_word(
    &self,
    at: usize,
  ) -> Option<u64> {
    let end = at.checked_add(WSIZE)?;
    let bytes = self.bytes().get(at..end)?;
    let mut word = [0u8; WSIZE];
    word.copy_from_slice(bytes);
    Some(u64::from_ne_bytes(word))
  }

  #[inline]
  fn write_word(
    &mut self,
    at: usize,
    word: u64,
  ) {
    let bytes = &mut self.bytes_mut()[at..at + WSIZE];
    bytes.copy_from_slice(&word.to_ne_bytes());
  }
}

fn exhausted(
  requested: usize,
  used: usize,
  capacity: usize,
) -> ArenaError {
  ArenaError::Exhausted {
    requested,
    available: capacity - used,
  }
}

/// An arena backed by a `Vec<u8>`, bounded by a capacity.
#[derive(Debug, Clone)]
pub struct VecArena {
  buf: Vec<u8>,
  capacity: usize,
}

impl VecArena {
  pub fn new(capacity: usize) -> Self {
    Self {
      buf: Vec::new(),
      capacity,
    }
  }
}

impl Default for VecArena {
  fn default() -> Self {
    Self::new(DEFAULT_MAX_HEAP)
  }
}

impl Arena for VecArena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<usize, ArenaError> {
    let start = self.buf.len();
    match start.checked_add(bytes) {
      Some(end) if end <= self.capacity => {
        self.buf.resize(end, 0);
        Ok(start)
      }
      _ => Err(exhausted(bytes, start, self.capacity)),
    }
  }

  fn reset(&mut self) {
    self.buf.clear();
  }

  fn hi(&self) -> usize {
    self.buf.len()
  }

  fn capacity(&self) -> usize {
    self.capacity
  }

  fn bytes(&self) -> &[u8] {
    &self.buf
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    &mut self.buf
  }
}

/// Returns the operating system page size.
#[cfg(unix)]
pub fn page_size() -> usize {
  // SAFETY: sysconf has no preconditions
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  if size <= 0 { 4096 } else { size as usize }
}

/// An arena that reserves its whole capacity with `mmap` and moves a break
/// inside the reservation, the way `sbrk` moves the program break.
///
/// The reservation is never moved, so payload bytes keep a stable machine
/// address for the arena's lifetime.
#[cfg(unix)]
#[derive(Debug)]
pub struct MappedArena {
  base: NonNull<u8>,
  brk: usize,
  capacity: usize,
}

#[cfg(unix)]
impl MappedArena {
  /// Reserves `capacity` bytes, rounded up to whole pages.
  pub fn new(capacity: usize) -> Result<Self, ArenaError> {
    let capacity = crate::align_to!(capacity.max(1), page_size());

    // SAFETY: anonymous private mapping, no file descriptor involved
    let address = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        capacity,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
        -1,
        0,
      )
    };

    if address == libc::MAP_FAILED {
      return Err(ArenaError::Map(std::io::Error::last_os_error()));
    }

    let null = || ArenaError::Map(std::io::Error::other("mmap returned a null mapping"));
    let base = NonNull::new(address.cast::<u8>()).ok_or_else(null)?;

    log::debug!("mapped arena of {capacity} bytes at {:p}", base);

    Ok(Self {
      base,
      brk: 0,
      capacity,
    })
  }

  /// Machine address of the first arena byte.
  pub fn base_ptr(&self) -> *const u8 {
    self.base.as_ptr()
  }
}

#[cfg(unix)]
impl Arena for MappedArena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<usize, ArenaError> {
    let start = self.brk;
    match start.checked_add(bytes) {
      Some(end) if end <= self.capacity => {
        self.brk = end;
        Ok(start)
      }
      _ => Err(exhausted(bytes, start, self.capacity)),
    }
  }

  fn reset(&mut self) {
    self.brk = 0;
  }

  fn hi(&self) -> usize {
    self.brk
  }

  fn capacity(&self) -> usize {
    self.capacity
  }

  fn bytes(&self) -> &[u8] {
    // SAFETY: [base, base + brk) lies inside the live mapping
    unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.brk) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    // SAFETY: [base, base + brk) lies inside the live mapping, borrowed uniquely
    unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.brk) }
  }
}

#[cfg(unix)]
impl Drop for MappedArena {
  fn drop(&mut self) {
    // SAFETY: base and capacity describe the mapping created in new()
    unsafe {
      libc::munmap(self.base.as_ptr().cast(), self.capacity);
    }
  }
}
