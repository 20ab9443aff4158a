use std::{
  path::{Path, PathBuf},
  process::ExitCode,
};

use clap::Parser;
use env_logger::Env;
use segalloc::{Arena, DEFAULT_MAX_HEAP, Heap, HeapConfig, ReplayReport, Trace, VecArena, replay};

/// Replay allocation traces against the heap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Trace files to replay, each on a fresh heap
  #[arg(required = true)]
  traces: Vec<PathBuf>,

  /// Validate the heap around every operation
  #[arg(short, long)]
  check: bool,

  /// Minimum number of bytes the heap grows by
  #[arg(long, default_value_t = 4096)]
  chunk_size: usize,

  /// Arena capacity in bytes
  #[arg(long, default_value_t = DEFAULT_MAX_HEAP)]
  max_heap: usize,

  /// Free blocks examined per fit search
  #[arg(long, default_value_t = 9)]
  candidates: usize,

  /// Back the heap with an mmap reservation instead of a vector
  #[cfg(unix)]
  #[arg(long)]
  mapped: bool,

  /// Print the heap layout after each trace
  #[arg(long)]
  dump: bool,

  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let level = match cli.verbose {
    0 => "warn",
    1 => "debug",
    _ => "trace",
  };
  env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

  let config = HeapConfig {
    chunk_size: cli.chunk_size,
    max_heap: cli.max_heap,
    fit_candidates: cli.candidates,
    check_heap: cli.check,
  };
  if let Err(err) = config.validate() {
    eprintln!("Error: {err}");
    return ExitCode::FAILURE;
  }

  println!(
    "{:<32} {:>8} {:>10} {:>10} {:>7}",
    "trace",
    "ops",
    "peak",
    "arena",
    "util"
  );

  let mut reports = Vec::new();
  let mut failed = false;

  for path in &cli.traces {
    match run_one(&cli, &config, path) {
      Ok(report) => {
        println!(
          "{:<32} {:>8} {:>10} {:>10} {:>6.1}%",
          path.display(),
          report.ops,
          report.peak_payload,
          report.arena_bytes,
          report.utilization() * 100.0
        );
        reports.push(report);
      }
      Err(message) => {
        eprintln!("{}: {message}", path.display());
        failed = true;
      }
    }
  }

  if !reports.is_empty() {
    let total: f64 = reports.iter().map(ReplayReport::utilization).sum();
    let average = total / reports.len() as f64;
    println!(
      "{:<32} {:>8} {:>10} {:>10} {:>6.1}%",
      "average",
      "",
      "",
      "",
      average * 100.0
    );
  }

  if failed {
    ExitCode::FAILURE
  } else {
    ExitCode::SUCCESS
  }
}

fn run_one(
  cli: &Cli,
  config: &HeapConfig,
  path: &Path,
) -> Result<ReplayReport, String> {
  let trace = Trace::from_path(path).map_err(|err| err.to_string())?;

  #[cfg(unix)]
  {
    if cli.mapped {
      let arena = segalloc::MappedArena::new(config.max_heap).map_err(|err| err.to_string())?;
      return run(cli, arena, config, &trace);
    }
  }

  run(cli, VecArena::new(config.max_heap), config, &trace)
}

fn run<A: Arena>(
  cli: &Cli,
  arena: A,
  config: &HeapConfig,
  trace: &Trace,
) -> Result<ReplayReport, String> {
  let mut heap = Heap::new(arena, config.clone()).map_err(|err| err.to_string())?;
  let report = replay(&mut heap, trace).map_err(|err| err.to_string())?;

  if cli.dump {
    print!("{}", heap.dump());
  }
  if !heap.check_heap() {
    return Err("heap left inconsistent after replay".to_string());
  }

  Ok(report)
}
