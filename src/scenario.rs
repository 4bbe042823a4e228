//! Scenario definition and builder API.

use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::warn;

use crate::snapshot::DEFAULT_SNAPSHOT_PATH;
use crate::types::{Pid, Ticks};

/// Maximum ticks in one burst.
pub const QUANTUM: Ticks = 1000;

/// Per-tick chance that a running process blocks on I/O.
pub const BLOCK_PROBABILITY: f64 = 0.01;

/// Per-sweep chance that a blocked process becomes ready again.
pub const UNBLOCK_PROBABILITY: f64 = 0.30;

/// Target times of the reference ten-process batch, in pid order.
pub const REFERENCE_TARGETS: [Ticks; 10] =
    [10000, 5000, 7000, 3000, 3000, 8000, 2000, 5000, 4000, 10000];

/// Default PRNG seed used when no seed is specified.
pub const DEFAULT_SEED: u64 = 42;

/// One process of the initial batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDef {
    pub pid: Pid,
    pub target_time: Ticks,
}

/// What the engine does with the snapshot record it reads before dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestoreMode {
    /// Report whether a record was found; the live PCB is left untouched.
    #[default]
    Probe,
    /// Copy the restored fields onto the live PCB before it runs.
    Apply,
}

/// A complete simulation scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub processes: Vec<ProcessDef>,
    pub quantum: Ticks,
    pub block_probability: f64,
    pub unblock_probability: f64,
    /// Snapshot file, or `None` to run without persistence.
    pub snapshot_path: Option<PathBuf>,
    pub seed: u64,
    /// Give up after this many consecutive stalled iterations.
    /// `None` polls until some process becomes ready.
    pub max_stall_sweeps: Option<u64>,
    pub restore_mode: RestoreMode,
}

/// Builder for constructing scenarios.
pub struct ScenarioBuilder {
    processes: Vec<ProcessDef>,
    quantum: Ticks,
    block_probability: f64,
    unblock_probability: f64,
    snapshot_path: Option<PathBuf>,
    seed: u64,
    max_stall_sweeps: Option<u64>,
    restore_mode: RestoreMode,
    next_pid: Pid,
}

impl Scenario {
    pub fn builder() -> ScenarioBuilder {
        ScenarioBuilder {
            processes: Vec::new(),
            quantum: QUANTUM,
            block_probability: BLOCK_PROBABILITY,
            unblock_probability: UNBLOCK_PROBABILITY,
            snapshot_path: Some(PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
            seed: DEFAULT_SEED,
            max_stall_sweeps: None,
            restore_mode: RestoreMode::Probe,
            next_pid: Pid(0),
        }
    }

    /// Builder preloaded with the reference ten-process batch.
    pub fn reference() -> ScenarioBuilder {
        Self::builder().targets(REFERENCE_TARGETS)
    }

    /// Sum of all target times: the tick count of a completed run.
    pub fn total_target_time(&self) -> Ticks {
        self.processes.iter().map(|p| p.target_time).sum()
    }
}

impl ScenarioBuilder {
    /// Add a process needing `target_time` ticks. PIDs follow creation order.
    pub fn process(mut self, target_time: Ticks) -> Self {
        let pid = self.next_pid;
        self.next_pid = Pid(pid.0 + 1);
        self.processes.push(ProcessDef { pid, target_time });
        self
    }

    /// Add one process per target time, in order.
    pub fn targets(self, targets: impl IntoIterator<Item = Ticks>) -> Self {
        targets.into_iter().fold(self, |b, t| b.process(t))
    }

    pub fn quantum(mut self, ticks: Ticks) -> Self {
        self.quantum = ticks;
        self
    }

    pub fn block_probability(mut self, p: f64) -> Self {
        self.block_probability = p;
        self
    }

    pub fn unblock_probability(mut self, p: f64) -> Self {
        self.unblock_probability = p;
        self
    }

    /// Persist the table to `path`.
    pub fn snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Run with the table in memory only.
    pub fn no_snapshot(mut self) -> Self {
        self.snapshot_path = None;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn max_stall_sweeps(mut self, n: u64) -> Self {
        self.max_stall_sweeps = Some(n);
        self
    }

    pub fn restore_mode(mut self, mode: RestoreMode) -> Self {
        self.restore_mode = mode;
        self
    }

    /// Build the scenario.
    pub fn build(self) -> Scenario {
        assert!(
            !self.processes.is_empty(),
            "scenario must have at least one process"
        );
        assert!(self.quantum > 0, "quantum must be at least one tick");
        for p in &self.processes {
            assert!(
                p.target_time > 0,
                "pid {} has a zero target time",
                p.pid.0
            );
        }
        for (name, p) in [
            ("block", self.block_probability),
            ("unblock", self.unblock_probability),
        ] {
            assert!(
                (0.0..=1.0).contains(&p),
                "{name} probability {p} is outside [0, 1]"
            );
        }
        Scenario {
            processes: self.processes,
            quantum: self.quantum,
            block_probability: self.block_probability,
            unblock_probability: self.unblock_probability,
            snapshot_path: self.snapshot_path,
            seed: self.seed,
            max_stall_sweeps: self.max_stall_sweeps,
            restore_mode: self.restore_mode,
        }
    }
}

/// Parse a seed string: a `u64` integer or `"entropy"` for OS randomness.
///
/// Returns `DEFAULT_SEED` for `None` or empty strings. An entropy seed is
/// logged so the run can be reproduced.
pub fn parse_seed(s: Option<&str>) -> Result<u64> {
    match s.map(str::trim) {
        None | Some("") => Ok(DEFAULT_SEED),
        Some(s) if s.eq_ignore_ascii_case("entropy") => {
            let seed: u64 = rand::random();
            warn!(
                seed,
                "seed=entropy: seeding PRNG with OS randomness \
                 (pass --seed {seed} to reproduce this run)"
            );
            Ok(seed)
        }
        Some(s) => match s.parse::<u64>() {
            Ok(seed) => Ok(seed),
            Err(_) => bail!("seed={s:?}: expected a u64 integer or \"entropy\""),
        },
    }
}
