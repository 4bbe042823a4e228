//! Tick-driven simulation engine.
//!
//! This is the core of the simulator. It owns the process table, the ready
//! queue and the blocked set, advances the simulated clock one tick at a
//! time, applies the randomized block/unblock policy, and persists the
//! table through the snapshot store after every terminal, blocking and
//! re-readying transition.
//!
//! All randomness comes from the generator handed to
//! [`Simulator::run_with_rng`]; [`Simulator::run`] seeds a `SmallRng` from
//! the scenario, so a seed fully determines the run.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::pcb::{Pcb, ProcState};
use crate::scenario::{RestoreMode, Scenario};
use crate::snapshot::SnapshotStore;
use crate::trace::{Trace, TraceKind};
use crate::types::{Pid, Ticks};

thread_local! {
    static SIM_CLOCK: Cell<Ticks> = const { Cell::new(0) };
}

/// Simulated ticks elapsed in the run executing on this thread.
pub fn sim_clock() -> Ticks {
    SIM_CLOCK.with(|c| c.get())
}

/// Update the clock thread-local. Called by the engine before logging so
/// the event formatter can stamp simulated time.
pub fn set_sim_clock(ticks: Ticks) {
    SIM_CLOCK.with(|c| c.set(ticks));
}

/// How a simulation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Every process terminated.
    Normal,
    /// The ready queue stayed empty for `sweeps` consecutive iterations,
    /// reaching `Scenario::max_stall_sweeps`.
    Stalled { sweeps: u64 },
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub trace: Trace,
    /// Final process table, in pid creation order.
    pub table: Vec<Pcb>,
    pub exit_kind: ExitKind,
    /// Total ticks executed across all processes.
    pub ticks: Ticks,
    pub snapshot_path: Option<PathBuf>,
    /// Number of snapshot saves that failed.
    pub snapshot_failures: usize,
}

impl SimulationResult {
    /// Look up the final PCB of `pid`.
    pub fn pcb(&self, pid: Pid) -> Option<&Pcb> {
        self.table.iter().find(|p| p.pid == pid)
    }

    pub fn all_terminated(&self) -> bool {
        self.table.iter().all(|p| p.state == ProcState::Terminated)
    }

    /// What the snapshot file holds after the run.
    pub fn snapshot_status(&self) -> SnapshotStatus<'_> {
        match (&self.snapshot_path, self.snapshot_failures) {
            (None, _) => SnapshotStatus::InMemory,
            (Some(path), 0) => SnapshotStatus::Written(path),
            (Some(path), _) if !path.is_file() => SnapshotStatus::Missing(path),
            (Some(path), failures) => SnapshotStatus::Stale { path, failures },
        }
    }
}

/// State of the snapshot file at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus<'a> {
    /// Persistence was off.
    InMemory,
    /// Every save succeeded; the file mirrors the final table.
    Written(&'a Path),
    /// Some saves failed; the file holds an older table.
    Stale { path: &'a Path, failures: usize },
    /// No save ever reached the file.
    Missing(&'a Path),
}

impl fmt::Display for SnapshotStatus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotStatus::InMemory => write!(f, "final process table kept in memory only"),
            SnapshotStatus::Written(path) => {
                write!(f, "final process table written to: {}", path.display())
            }
            SnapshotStatus::Stale { path, failures } => write!(
                f,
                "process table at {} may be stale: {failures} save(s) failed",
                path.display()
            ),
            SnapshotStatus::Missing(path) => {
                write!(f, "final process table was never written to: {}", path.display())
            }
        }
    }
}

/// Why a burst ended.
#[derive(Debug, Clone, Copy, PartialEq)]
enum BurstEnd {
    Terminated,
    Blocked { draw: f64 },
    QuantumExpired,
}

/// The main simulator.
pub struct Simulator {
    scenario: Scenario,
}

impl Simulator {
    pub fn new(scenario: Scenario) -> Self {
        Simulator { scenario }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Run with a `SmallRng` seeded from the scenario.
    pub fn run(&self) -> SimulationResult {
        let mut rng = SmallRng::seed_from_u64(self.scenario.seed);
        self.run_with_rng(&mut rng)
    }

    /// Run drawing every random value from `rng`.
    pub fn run_with_rng<R: Rng>(&self, rng: &mut R) -> SimulationResult {
        let scenario = &self.scenario;
        set_sim_clock(0);

        let table: Vec<Pcb> = scenario
            .processes
            .iter()
            .map(|def| Pcb::new(def.pid, def.target_time))
            .collect();

        let mut state = SimState {
            scenario,
            ready: (0..table.len()).collect(),
            blocked: Vec::new(),
            table,
            clock: 0,
            trace: Trace::new(),
            store: scenario.snapshot_path.clone().map(SnapshotStore::new),
            snapshot_failures: 0,
            rng,
        };

        info!(
            processes = state.table.len(),
            quantum = scenario.quantum,
            seed = scenario.seed,
            "starting simulation"
        );
        state.save();

        let exit_kind = state.run_loop();
        match exit_kind {
            ExitKind::Normal => info!(ticks = state.clock, "simulation finished"),
            ExitKind::Stalled { sweeps } => warn!(
                sweeps,
                blocked = state.blocked.len(),
                "giving up: no process became ready"
            ),
        }

        SimulationResult {
            trace: state.trace,
            table: state.table,
            exit_kind,
            ticks: state.clock,
            snapshot_path: scenario.snapshot_path.clone(),
            snapshot_failures: state.snapshot_failures,
        }
    }
}

/// Mutable state of one run. Queues hold indices into `table`.
struct SimState<'a, R: Rng> {
    scenario: &'a Scenario,
    table: Vec<Pcb>,
    ready: VecDeque<usize>,
    blocked: Vec<usize>,
    clock: Ticks,
    trace: Trace,
    store: Option<SnapshotStore>,
    snapshot_failures: usize,
    rng: &'a mut R,
}

impl<R: Rng> SimState<'_, R> {
    fn run_loop(&mut self) -> ExitKind {
        let mut stalls: u64 = 0;

        loop {
            if self.ready.is_empty() {
                self.unblock_sweep("idle");
            }

            if self.ready.is_empty() {
                if self.all_terminated() {
                    return ExitKind::Normal;
                }

                // Second chance before counting the iteration as stalled.
                self.unblock_sweep("retry");
                if self.ready.is_empty() {
                    stalls += 1;
                    warn!(
                        attempt = stalls,
                        blocked = self.blocked.len(),
                        "no process READY and none finished, forcing another unblock sweep"
                    );
                    self.trace
                        .record(self.clock, TraceKind::Stall { attempt: stalls });
                    if let Some(max) = self.scenario.max_stall_sweeps {
                        if stalls >= max {
                            return ExitKind::Stalled { sweeps: stalls };
                        }
                    }
                    continue;
                }
            }

            let Some(idx) = self.ready.pop_front() else {
                continue;
            };
            stalls = 0;
            self.run_process(idx);
        }
    }

    fn all_terminated(&self) -> bool {
        self.table.iter().all(|p| p.state == ProcState::Terminated)
    }

    /// Dispatch the process at `idx`, run one burst and settle its outcome.
    fn run_process(&mut self, idx: usize) {
        let restored = self.probe_snapshot(idx);

        let pcb = &mut self.table[idx];
        let pid = pcb.pid;
        pcb.state = ProcState::Running;
        pcb.cpu_acquisitions += 1;
        self.trace
            .record(self.clock, TraceKind::Dispatched { pid, restored });
        info!(pid = pid.0, restored, "READY >>> RUNNING");

        match self.burst(idx) {
            BurstEnd::Terminated => {
                self.trace.record(self.clock, TraceKind::Terminated { pid });
                info!(pid = pid.0, "RUNNING >>> TERMINATED");
                info!("{}", self.table[idx]);
                self.save();
            }
            BurstEnd::Blocked { draw } => {
                self.blocked.push(idx);
                self.trace
                    .record(self.clock, TraceKind::Blocked { pid, draw });
                info!(pid = pid.0, chance = draw, "RUNNING >>> BLOCKED");
                self.save();
            }
            BurstEnd::QuantumExpired => {
                let pcb = &mut self.table[idx];
                pcb.state = ProcState::Ready;
                pcb.advance_program_counter();
                self.ready.push_back(idx);
                self.trace.record(self.clock, TraceKind::Preempted { pid });
                info!(pid = pid.0, "RUNNING >>> READY");
                self.save();
                self.unblock_sweep("preempt");
            }
        }
    }

    /// Run the process at `idx` for up to one quantum.
    ///
    /// Each tick consumes CPU time, then checks for completion, then draws
    /// for an I/O block. A finished process never draws.
    fn burst(&mut self, idx: usize) -> BurstEnd {
        for _ in 0..self.scenario.quantum {
            let pcb = &mut self.table[idx];
            pcb.tick();
            self.clock += 1;
            set_sim_clock(self.clock);
            debug_assert!(pcb.time_used <= pcb.target_time);

            if pcb.is_finished() {
                pcb.state = ProcState::Terminated;
                return BurstEnd::Terminated;
            }

            let draw: f64 = self.rng.gen();
            if draw < self.scenario.block_probability {
                pcb.state = ProcState::Blocked;
                pcb.block_events += 1;
                return BurstEnd::Blocked { draw };
            }
        }
        BurstEnd::QuantumExpired
    }

    /// Give every blocked process one chance to become ready.
    ///
    /// Each member draws independently; survivors keep their order.
    fn unblock_sweep(&mut self, reason: &'static str) -> usize {
        if self.blocked.is_empty() {
            return 0;
        }

        let mut woken = 0;
        for idx in std::mem::take(&mut self.blocked) {
            let draw: f64 = self.rng.gen();
            if draw >= self.scenario.unblock_probability {
                self.blocked.push(idx);
                continue;
            }

            let pcb = &mut self.table[idx];
            pcb.state = ProcState::Ready;
            pcb.advance_program_counter();
            let pid = pcb.pid;
            self.ready.push_back(idx);
            self.trace
                .record(self.clock, TraceKind::Unblocked { pid, draw });
            info!(pid = pid.0, chance = draw, reason, "BLOCKED >>> READY");
            woken += 1;
        }

        debug!(
            reason,
            woken,
            still_blocked = self.blocked.len(),
            "unblock sweep"
        );
        woken
    }

    /// Read the snapshot record of the process at `idx` before dispatch.
    ///
    /// Returns whether a record was found. Only `RestoreMode::Apply` lets
    /// the record change the live PCB.
    fn probe_snapshot(&mut self, idx: usize) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let pid = self.table[idx].pid;

        let saved = match store.restore(pid) {
            Ok(Some(saved)) => saved,
            Ok(None) => {
                debug!(pid = pid.0, "no snapshot record");
                return false;
            }
            Err(e) => {
                let error = format!("{e:#}");
                warn!(pid = pid.0, error = %error, "failed to restore process from snapshot");
                return false;
            }
        };

        if self.scenario.restore_mode == RestoreMode::Apply {
            let pcb = &mut self.table[idx];
            match pcb.restore_conflict(&saved) {
                None => {
                    pcb.apply_restored(&saved);
                    debug!(pid = pid.0, time_used = saved.time_used, "applied snapshot record");
                }
                Some(reason) => warn!(
                    pid = pid.0,
                    record = %saved.to_record(),
                    reason,
                    "snapshot record cannot be resumed, keeping live process"
                ),
            }
        }
        true
    }

    /// Persist the full table. Failures are logged and counted, never fatal.
    fn save(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&self.table) {
            self.snapshot_failures += 1;
            let error = format!("{e:#}");
            warn!(error = %error, "failed to save process table");
        }
    }
}
