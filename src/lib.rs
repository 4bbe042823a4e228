//! procsim - Deterministic tick-driven process scheduling simulator.
//!
//! Models the life cycle of a batch of CPU-bound processes under a
//! round-robin scheduler with randomized I/O blocking and randomized
//! unblocking. The process table is persisted to a snapshot file after
//! every significant transition.
//!
//! # Architecture
//!
//! - **PCB**: per-process state and its fixed-field snapshot record
//! - **Snapshot**: whole-table save, per-pid restore
//! - **Engine**: single-threaded loop driving quantum-bounded bursts
//! - **Trace**: recorded transitions, rendered one line per event
//! - **Stats**: per-process counters, turnaround and waiting time
//!
//! # Usage
//!
//! ```rust,no_run
//! use procsim::*;
//!
//! let scenario = Scenario::reference()
//!     .snapshot("process_table.txt")
//!     .seed(7)
//!     .build();
//!
//! let result = Simulator::new(scenario).run();
//! result.trace.dump();
//! assert!(result.all_terminated());
//! ```

pub mod engine;
pub mod fmt;
pub mod pcb;
pub mod scenario;
pub mod snapshot;
pub mod stats;
pub mod trace;
pub mod types;

// Re-export the main public types for convenience.
pub use engine::{
    set_sim_clock, sim_clock, ExitKind, SimulationResult, Simulator, SnapshotStatus,
};
pub use fmt::{FmtTick, SimFormat};
pub use pcb::{ParseRecordError, Pcb, ProcState};
pub use scenario::{
    parse_seed, ProcessDef, RestoreMode, Scenario, ScenarioBuilder, BLOCK_PROBABILITY,
    DEFAULT_SEED, QUANTUM, REFERENCE_TARGETS, UNBLOCK_PROBABILITY,
};
pub use snapshot::{SnapshotStore, DEFAULT_SNAPSHOT_PATH};
pub use stats::{ProcessStats, RunStats};
pub use trace::{Trace, TraceEvent, TraceKind};
pub use types::{Pid, Ticks};
