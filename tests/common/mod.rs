#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use procsim::{Pcb, ProcState, SimFormat, SimulationResult, SnapshotStore};

/// Initialize tracing from `RUST_LOG`.
///
/// `try_init()` is idempotent: first call in the process succeeds,
/// subsequent calls are silently ignored.
pub fn setup_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .event_format(SimFormat)
        .try_init();
}

/// A fresh directory and a snapshot path inside it. Keep the `TempDir`
/// alive for as long as the path is used.
pub fn temp_snapshot() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("process_table.txt");
    (dir, path)
}

/// Assert the per-PCB invariants that must hold at any point of a run.
pub fn assert_pcb_invariants(pcb: &Pcb) {
    assert!(
        pcb.time_used <= pcb.target_time,
        "pid {} used {} of {} ticks",
        pcb.pid.0,
        pcb.time_used,
        pcb.target_time
    );
    assert_eq!(
        pcb.program_counter,
        pcb.time_used + 1,
        "pid {} program counter out of step",
        pcb.pid.0
    );
    assert_eq!(
        pcb.state == ProcState::Terminated,
        pcb.time_used == pcb.target_time,
        "pid {} state {} does not match progress {}/{}",
        pcb.pid.0,
        pcb.state,
        pcb.time_used,
        pcb.target_time
    );
}

/// Assert that a completed run left a consistent table and trace.
pub fn assert_completed_run(result: &SimulationResult) {
    assert!(result.all_terminated(), "exit: {:?}", result.exit_kind);
    let total: u64 = result.table.iter().map(|p| p.target_time).sum();
    assert_eq!(result.ticks, total, "every tick belongs to exactly one process");

    for pcb in &result.table {
        assert_pcb_invariants(pcb);
        assert_eq!(
            pcb.cpu_acquisitions as usize,
            result.trace.dispatch_count(pcb.pid),
            "pid {} dispatch count",
            pcb.pid.0
        );
        assert_eq!(
            pcb.block_events as usize,
            result.trace.block_count(pcb.pid),
            "pid {} block count",
            pcb.pid.0
        );
    }
}

/// Read back the snapshot a run left behind.
pub fn load_snapshot(path: &Path) -> Vec<Pcb> {
    SnapshotStore::new(path).load().unwrap()
}
