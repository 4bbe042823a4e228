//! Snapshot behavior during full runs.

use std::fs;

use procsim::*;

mod common;

#[test]
fn test_snapshot_round_trips_final_table() {
    common::setup_test();
    let (_dir, path) = common::temp_snapshot();
    let scenario = Scenario::reference().snapshot(&path).seed(3).build();

    let result = Simulator::new(scenario).run();

    let store = SnapshotStore::new(&path);
    for pcb in &result.table {
        assert_eq!(store.restore(pcb.pid).unwrap().as_ref(), Some(pcb));
    }
    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 10, "overwritten, never appended");
    assert_eq!(result.snapshot_status(), SnapshotStatus::Written(&path));
    assert_eq!(
        result.snapshot_status().to_string(),
        format!("final process table written to: {}", path.display())
    );
}

#[test]
fn test_every_dispatch_finds_a_record() {
    common::setup_test();
    let (_dir, path) = common::temp_snapshot();
    let scenario = Scenario::builder()
        .targets([1500, 700])
        .snapshot(&path)
        .build();

    let result = Simulator::new(scenario).run();

    let dispatches: Vec<bool> = result
        .trace
        .events()
        .iter()
        .filter_map(|e| match e.kind {
            TraceKind::Dispatched { restored, .. } => Some(restored),
            _ => None,
        })
        .collect();
    assert!(!dispatches.is_empty());
    assert!(dispatches.iter().all(|&r| r), "the table is saved before the first dispatch");
}

#[test]
fn test_without_snapshot_nothing_is_restored() {
    common::setup_test();
    let scenario = Scenario::builder().targets([1500, 700]).no_snapshot().build();

    let result = Simulator::new(scenario).run();

    assert!(result.snapshot_path.is_none());
    assert_eq!(result.snapshot_status(), SnapshotStatus::InMemory);
    assert!(result
        .trace
        .events()
        .iter()
        .all(|e| !matches!(e.kind, TraceKind::Dispatched { restored: true, .. })));
}

/// Persistence is best-effort: an unwritable snapshot never stops the run.
#[test]
fn test_unwritable_snapshot_is_not_fatal() {
    common::setup_test();
    let (dir, _) = common::temp_snapshot();
    let path = dir.path().join("missing").join("process_table.txt");
    let scenario = Scenario::reference()
        .snapshot(&path)
        .max_stall_sweeps(10_000)
        .build();

    let result = Simulator::new(scenario).run();

    assert_eq!(result.exit_kind, ExitKind::Normal);
    common::assert_completed_run(&result);
    assert!(result.snapshot_failures > 0);
    assert!(!path.exists());
    assert_eq!(result.snapshot_status(), SnapshotStatus::Missing(&path));
    assert!(result
        .snapshot_status()
        .to_string()
        .starts_with("final process table was never written to:"));
}

/// Saves happen after every transition, so applying the restored record
/// before dispatch reproduces the probe-only run exactly.
#[test]
fn test_apply_restore_matches_probe() {
    common::setup_test();
    let run = |mode| {
        let (_dir, path) = common::temp_snapshot();
        let scenario = Scenario::reference()
            .snapshot(&path)
            .seed(17)
            .restore_mode(mode)
            .build();
        Simulator::new(scenario).run()
    };

    let probe = run(RestoreMode::Probe);
    let apply = run(RestoreMode::Apply);

    common::assert_completed_run(&apply);
    assert_eq!(probe.trace.events(), apply.trace.events());
    assert_eq!(probe.table, apply.table);
}

/// A snapshot left behind by another table is replaced before the first
/// dispatch, so apply mode never sees its records.
#[test]
fn test_stale_snapshot_is_replaced_at_start() {
    common::setup_test();
    let (_dir, path) = common::temp_snapshot();
    let scenario = Scenario::builder()
        .process(5)
        .snapshot(&path)
        .restore_mode(RestoreMode::Apply)
        .build();

    // Another table with a different target for pid 0.
    SnapshotStore::new(&path)
        .save(&[Pcb::new(Pid(0), 99)])
        .unwrap();

    let result = Simulator::new(scenario).run();

    common::assert_completed_run(&result);
    assert_eq!(result.pcb(Pid(0)).unwrap().target_time, 5);
    assert_eq!(common::load_snapshot(&path)[0].target_time, 5);
}

/// When saves keep failing, the file still holds an old table. Apply mode
/// must not resume a record that has already finished.
#[test]
fn test_apply_restore_rejects_finished_record() {
    common::setup_test();
    let (dir, path) = common::temp_snapshot();
    fs::write(&path, "0,5,6,TERMINATED,0,1,5\n").unwrap();
    // A directory where the temporary file goes makes every save fail.
    fs::create_dir(dir.path().join(".process_table.txt.tmp")).unwrap();

    let scenario = Scenario::builder()
        .process(5)
        .snapshot(&path)
        .restore_mode(RestoreMode::Apply)
        .build();
    let result = Simulator::new(scenario).run();

    assert_eq!(result.exit_kind, ExitKind::Normal);
    common::assert_completed_run(&result);
    assert!(result.snapshot_failures > 0);
    let pcb = result.pcb(Pid(0)).unwrap();
    assert_eq!(pcb.time_used, 5);
    assert_eq!(pcb.cpu_acquisitions as usize, result.trace.dispatch_count(Pid(0)));
    assert!(result
        .trace
        .events()
        .iter()
        .any(|e| matches!(e.kind, TraceKind::Dispatched { restored: true, .. })));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "0,5,6,TERMINATED,0,1,5\n",
        "the old table is left untouched"
    );
    assert_eq!(
        result.snapshot_status(),
        SnapshotStatus::Stale {
            path: &path,
            failures: result.snapshot_failures
        }
    );
    assert!(result.snapshot_status().to_string().contains("may be stale"));
}

/// A snapshot that cannot be read is reported as no record and the run
/// carries on from memory.
#[test]
fn test_unreadable_snapshot_is_not_fatal() {
    common::setup_test();
    let (dir, _) = common::temp_snapshot();
    let path = dir.path().join("process_table.txt");
    // Opening a directory succeeds, reading from it does not.
    fs::create_dir(&path).unwrap();

    let scenario = Scenario::builder()
        .targets([1500, 700])
        .snapshot(&path)
        .restore_mode(RestoreMode::Apply)
        .build();
    let result = Simulator::new(scenario).run();

    assert_eq!(result.exit_kind, ExitKind::Normal);
    common::assert_completed_run(&result);
    assert!(result.snapshot_failures > 0);
    assert!(result
        .trace
        .events()
        .iter()
        .all(|e| !matches!(e.kind, TraceKind::Dispatched { restored: true, .. })));
    assert!(path.is_dir());
}
