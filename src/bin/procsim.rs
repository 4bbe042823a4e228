//! procsim: run the process scheduling simulation.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use procsim::{
    parse_seed, RestoreMode, RunStats, Scenario, SimFormat, Simulator, Ticks,
    DEFAULT_SNAPSHOT_PATH, QUANTUM, REFERENCE_TARGETS,
};

/// Simulate a batch of processes under a round-robin scheduler with
/// random I/O blocking, persisting the process table after every transition.
#[derive(Parser)]
#[command(name = "procsim")]
struct Cli {
    /// PRNG seed (u64 integer or "entropy" for OS randomness).
    ///
    /// Every block and unblock draw derives from this seed.
    /// Falls back to PROCSIM_SEED env var, then default (42).
    #[arg(long, env = "PROCSIM_SEED")]
    seed: Option<String>,

    /// Snapshot file rewritten after every transition.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SNAPSHOT_PATH)]
    snapshot: PathBuf,

    /// Keep the process table in memory only.
    #[arg(long, conflicts_with = "snapshot")]
    no_snapshot: bool,

    /// Maximum ticks per burst.
    #[arg(long, default_value_t = QUANTUM)]
    quantum: Ticks,

    /// Comma-separated target times; process N gets the Nth value.
    #[arg(long, value_delimiter = ',', value_name = "TICKS")]
    targets: Vec<Ticks>,

    /// Stop after this many consecutive iterations with nothing ready.
    #[arg(long, value_name = "N")]
    max_stall_sweeps: Option<u64>,

    /// Copy the snapshot record onto the live process before each dispatch
    /// instead of only probing for it.
    #[arg(long)]
    apply_restore: bool,

    /// Do not print transition lines.
    #[arg(short, long)]
    quiet: bool,

    /// Print per-process statistics after the run.
    #[arg(long)]
    summary: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    if cli.quantum == 0 {
        bail!("--quantum must be at least 1");
    }
    if cli.targets.contains(&0) {
        bail!("--targets must all be positive");
    }

    let targets: Vec<Ticks> = if cli.targets.is_empty() {
        REFERENCE_TARGETS.to_vec()
    } else {
        cli.targets.clone()
    };

    let mut builder = Scenario::builder()
        .targets(targets)
        .quantum(cli.quantum)
        .seed(parse_seed(cli.seed.as_deref())?)
        .restore_mode(if cli.apply_restore {
            RestoreMode::Apply
        } else {
            RestoreMode::Probe
        });
    builder = if cli.no_snapshot {
        builder.no_snapshot()
    } else {
        builder.snapshot(&cli.snapshot)
    };
    if let Some(n) = cli.max_stall_sweeps {
        builder = builder.max_stall_sweeps(n);
    }

    println!("=== starting simulation ===");
    let result = Simulator::new(builder.build()).run();

    if !cli.quiet {
        for line in result.trace.lines() {
            println!("{line}");
        }
    }

    if cli.summary {
        println!();
        println!("{}", RunStats::from_result(&result));
        println!();
    }

    if result.snapshot_failures > 0 {
        eprintln!(
            "warning: {} snapshot save(s) failed",
            result.snapshot_failures
        );
    }

    if !result.all_terminated() {
        bail!("simulation stopped with processes still blocked: {:?}", result.exit_kind);
    }

    println!("=== simulation finished ===");
    println!("{}", result.snapshot_status());
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .event_format(SimFormat)
        .try_init();
}
