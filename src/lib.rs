//! # segalloc - A Segregated-Fit Heap Allocator
//!
//! This crate implements a boundary-tag heap allocator that manages a single
//! growable byte arena. Free blocks are kept in fifteen size-class lists and
//! found with a bounded best-fit search.
//!
//! ## Overview
//!
//! Every block starts with an 8 byte header word. Free blocks of 32 bytes or
//! more also end with a footer, a copy of the header, so the block after
//! them can find where they start:
//!
//! ```text
//!   Allocated block:
//!   ┌──────────┬──────────────────────────────────────────┐
//!   │  header  │              payload                     │
//!   └──────────┴──────────────────────────────────────────┘
//!              ▲
//!              └── Address returned to the caller (16-aligned)
//!
//!   Free block (>= 32 bytes):
//!   ┌──────────┬──────────┬──────────┬───────────┬──────────┐
//!   │  header  │   next   │   prev   │   ...     │  footer  │
//!   └──────────┴──────────┴──────────┴───────────┴──────────┘
//!
//!   Free block (16 bytes, "minimal"):
//!   ┌──────────┬──────────┐
//!   │  header  │   next   │   no footer, no backward link
//!   └──────────┴──────────┘
//!
//!   Header word:
//!   ┌───────────────────────────────────────┬───┬───┬───┬───┐
//!   │             block size                │ 0 │ m │ p │ a │
//!   └───────────────────────────────────────┴───┴───┴───┴───┘
//!      a = allocated, p = previous allocated, m = previous minimal
//! ```
//!
//! Minimal blocks have no room for a footer. The block after one records that
//! in its `m` bit and steps back exactly 16 bytes instead of reading a footer.
//!
//! ## Size Classes
//!
//! ```text
//!   bucket   0    1    2       3       4        ...    13           14
//!   sizes   16   32  48-64   80-96  112-144     ... 1600-2240     2256..
//! ```
//!
//! Bucket 0 is singly linked, every other bucket is doubly linked. New free
//! blocks are pushed at the head of their bucket.
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── arena      - Arena trait, VecArena and the mmap-backed MappedArena
//!   ├── block      - Block handles and read-only block views
//!   ├── config     - HeapConfig
//!   ├── encoding   - Header word packing and layout constants
//!   ├── error      - Error types
//!   ├── freelist   - Size classes and the segregated free lists
//!   ├── heap       - The allocation engine
//!   ├── inspect    - Statistics and heap dumps
//!   ├── trace      - Allocation trace parsing and replay
//!   └── validator  - Heap consistency checker
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::{Heap, HeapConfig};
//!
//! let mut heap = Heap::with_config(HeapConfig::default()).unwrap();
//!
//! let address = heap.allocate(24).unwrap();
//! heap.payload_mut(address)[..5].copy_from_slice(b"hello");
//!
//! let address = heap.resize(address, 200).unwrap();
//! assert_eq!(&heap.payload(address)[..5], b"hello");
//!
//! heap.release(address);
//! assert!(heap.check_heap());
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: a heap is owned by one caller at a time
//! - **No shrinking**: the arena only grows until [`Heap::reset`]
//! - **Trusting release**: double or foreign releases are not detected,
//!   except by the validator after the fact

pub mod align;
pub mod arena;
pub mod block;
pub mod config;
pub mod encoding;
pub mod error;
pub mod freelist;
pub mod heap;
pub mod inspect;
pub mod trace;
pub mod validator;

pub use arena::{Arena, DEFAULT_MAX_HEAP, VecArena};
#[cfg(unix)]
pub use arena::{MappedArena, page_size};
pub use block::{BlockKind, BlockView};
pub use config::HeapConfig;
pub use encoding::Header;
pub use error::{AllocError, ArenaError, ConfigError, HeapViolation, TraceError};
pub use heap::{Address, Heap};
pub use inspect::{HeapDump, HeapStats};
pub use trace::{Op, ReplayReport, Trace, replay};
