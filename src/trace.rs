//! Allocation traces and their replay.
//!
//! A trace is a text file with one request per line:
//!
//! ```text
//!   a <id> <bytes>    allocate
//!   r <id> <bytes>    resize (allocates when <id> is not live)
//!   f <id>            release
//! ```
//!
//! Lines holding a single number are header lines (suggested heap size,
//! id count, op count, weight) and are skipped, as are blank lines and
//! `#` comments.

use std::{collections::HashMap, fs, path::Path, str::FromStr};

use crate::{
  arena::Arena,
  encoding::ALIGNMENT,
  error::TraceError,
  heap::{Address, Heap},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
  Alloc { id: usize, size: usize },
  Realloc { id: usize, size: usize },
  Free { id: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
  pub ops: Vec<Op>,
}

impl Trace {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TraceError> {
    fs::read_to_string(path)?.parse()
  }
}

fn number(
  token: Option<&str>,
  line: usize,
  what: &str,
) -> Result<usize, TraceError> {
  let token = token.ok_or_else(|| TraceError::Parse {
    line,
    message: format!("missing {what}"),
  })?;
  token.parse().map_err(|_| TraceError::Parse {
    line,
    message: format!("invalid {what} {token:?}"),
  })
}

impl FromStr for Trace {
  type Err = TraceError;

  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let mut ops = Vec::new();

    for (index, raw) in text.lines().enumerate() {
      let line = index + 1;
      let content = raw.split('#').next().unwrap_or_default().trim();
      if content.is_empty() {
        continue;
      }

      let mut tokens = content.split_whitespace();
      let Some(kind) = tokens.next() else {
        continue;
      };

      let op = match kind {
        "a" => Op::Alloc {
          id: number(tokens.next(), line, "id")?,
          size: number(tokens.next(), line, "size")?,
        },
        "r" => Op::Realloc {
          id: number(tokens.next(), line, "id")?,
          size: number(tokens.next(), line, "size")?,
        },
        "f" => Op::Free {
          id: number(tokens.next(), line, "id")?,
        },
        header if ops.is_empty() && header.parse::<f64>().is_ok() => continue,
        other => {
          return Err(TraceError::Parse {
            line,
            message: format!("unknown operation {other:?}"),
          });
        }
      };

      if let Some(extra) = tokens.next() {
        return Err(TraceError::Parse {
          line,
          message: format!("unexpected token {extra:?}"),
        });
      }

      ops.push(op);
    }

    Ok(Self { ops })
  }
}

/// Outcome of a successful replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
  pub ops: usize,
  /// Largest total of requested bytes live at once.
  pub peak_payload: usize,
  /// Arena size when the trace finished.
  pub arena_bytes: usize,
}

impl ReplayReport {
  /// Peak live payload over final arena size.
  pub fn utilization(&self) -> f64 {
    if self.arena_bytes == 0 {
      return 0.0;
    }
    self.peak_payload as f64 / self.arena_bytes as f64
  }
}

/// Byte `index` of the fill pattern for `id`.
#[inline]
fn pattern(
  id: usize,
  index: usize,
) -> u8 {
  (id.wrapping_mul(0x9E37_79B9) ^ index.wrapping_mul(31)) as u8
}

struct Live {
  address: Address,
  size: usize,
}

fn fill<A: Arena>(
  heap: &mut Heap<A>,
  id: usize,
  live: &Live,
) {
  let payload = &mut heap.payload_mut(live.address)[..live.size];
  for (index, byte) in payload.iter_mut().enumerate() {
    *byte = pattern(id, index);
  }
}

fn intact<A: Arena>(
  heap: &Heap<A>,
  id: usize,
  address: Address,
  len: usize,
) -> bool {
  heap.payload(address)[..len]
    .iter()
    .enumerate()
    .all(|(index, &byte)| byte == pattern(id, index))
}

/// Runs every operation of `trace` against `heap`.
///
/// Every payload is filled with a pattern derived from its id and checked
/// before it is released or moved, so an allocator that hands out
/// overlapping blocks, or a resize that loses data, is caught.
pub fn replay<A: Arena>(
  heap: &mut Heap<A>,
  trace: &Trace,
) -> Result<ReplayReport, TraceError> {
  let mut live: HashMap<usize, Live> = HashMap::new();
  let mut current = 0usize;
  let mut peak = 0usize;

  for (op, &request) in trace.ops.iter().enumerate() {
    match request {
      Op::Alloc { id, size } => {
        if live.contains_key(&id) {
          return Err(TraceError::LiveId { op, id });
        }
        let address = heap
          .allocate(size)
          .map_err(|source| TraceError::Alloc { op, source })?;
        if address.offset() % ALIGNMENT != 0 {
          return Err(TraceError::Misaligned { op, id });
        }

        let entry = Live { address, size };
        fill(heap, id, &entry);
        live.insert(id, entry);
        current += size;
      }
      Op::Realloc { id, size } => {
        let old = live.remove(&id);
        let (old_address, old_size) = old.map_or((Address::NULL, 0), |old| (old.address, old.size));
        if !old_address.is_null() && !intact(heap, id, old_address, old_size) {
          return Err(TraceError::Corrupted { op, id });
        }

        let address = heap
          .resize(old_address, size)
          .map_err(|source| TraceError::Alloc { op, source })?;
        current -= old_size;

        if !address.is_null() {
          if address.offset() % ALIGNMENT != 0 {
            return Err(TraceError::Misaligned { op, id });
          }
          if !intact(heap, id, address, old_size.min(size)) {
            return Err(TraceError::Corrupted { op, id });
          }
          let entry = Live { address, size };
          fill(heap, id, &entry);
          live.insert(id, entry);
          current += size;
        }
      }
      Op::Free { id } => {
        let old = live.remove(&id).ok_or(TraceError::UnknownId { op, id })?;
        if !intact(heap, id, old.address, old.size) {
          return Err(TraceError::Corrupted { op, id });
        }
        heap.release(old.address);
        current -= old.size;
      }
    }

    peak = peak.max(current);
  }

  let report = ReplayReport {
    ops: trace.ops.len(),
    peak_payload: peak,
    arena_bytes: heap.arena().size(),
  };
  log::debug!(
    "replayed {} ops: peak payload {} bytes in a {} byte arena",
    report.ops,
    report.peak_payload,
    report.arena_bytes
  );
  Ok(report)
}
