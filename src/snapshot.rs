//! Persisted snapshot of the process table.
//!
//! Every save rewrites the whole file, one record per PCB. The new content
//! is written to a sibling temporary file and renamed over the target, so a
//! reader sees either the previous table or the new one, never a mix.
//! Nothing is appended and nothing is versioned: the last save wins.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::pcb::Pcb;
use crate::types::Pid;

/// Default snapshot file name, relative to the working directory.
pub const DEFAULT_SNAPSHOT_PATH: &str = "process_table.txt";

/// File-backed mirror of the in-memory process table.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotStore { path: path.into() }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    /// Overwrite the snapshot with every PCB in `table`, in table order.
    pub fn save(&self, table: &[Pcb]) -> Result<()> {
        let tmp = self.temp_path();
        {
            let file = File::create(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            let mut writer = BufWriter::new(file);
            for pcb in table {
                writeln!(writer, "{}", pcb.to_record())
                    .with_context(|| format!("failed to write {}", tmp.display()))?;
            }
            writer
                .flush()
                .with_context(|| format!("failed to flush {}", tmp.display()))?;
        }

        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| {
                format!("failed to replace {} with {}", self.path.display(), tmp.display())
            });
        }

        debug!(path = %self.path.display(), records = table.len(), "snapshot saved");
        Ok(())
    }

    /// Look up the record for `pid`.
    ///
    /// Returns `Ok(None)` when the snapshot does not exist or holds no
    /// parseable record for `pid`. Malformed lines are skipped.
    pub fn restore(&self, pid: Pid) -> Result<Option<Pcb>> {
        let Some(reader) = self.open()? else {
            return Ok(None);
        };

        for (lineno, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", self.path.display()))?;
            match Pcb::from_record(&line) {
                Ok(pcb) if pcb.pid == pid => return Ok(Some(pcb)),
                Ok(_) => {}
                Err(e) => debug!(line = lineno + 1, error = %e, "skipping malformed record"),
            }
        }
        Ok(None)
    }

    /// Read every parseable record, in file order.
    ///
    /// A missing snapshot reads as an empty table.
    pub fn load(&self) -> Result<Vec<Pcb>> {
        let Some(reader) = self.open()? else {
            return Ok(Vec::new());
        };

        let mut table = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", self.path.display()))?;
            match Pcb::from_record(&line) {
                Ok(pcb) => table.push(pcb),
                Err(e) => debug!(line = lineno + 1, error = %e, "skipping malformed record"),
            }
        }
        Ok(table)
    }

    fn open(&self) -> Result<Option<BufReader<File>>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(BufReader::new(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to open {}", self.path.display())),
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcb::ProcState;
    use tempfile::TempDir;

    fn sample_table() -> Vec<Pcb> {
        let mut table: Vec<Pcb> = [300, 200, 100]
            .iter()
            .enumerate()
            .map(|(i, &t)| Pcb::new(Pid(i as u32), t))
            .collect();
        table[1].time_used = 120;
        table[1].advance_program_counter();
        table[1].state = ProcState::Blocked;
        table[1].block_events = 2;
        table[1].cpu_acquisitions = 3;
        table[2].time_used = 100;
        table[2].advance_program_counter();
        table[2].state = ProcState::Terminated;
        table[2].cpu_acquisitions = 1;
        table
    }

    #[test]
    fn test_restore_without_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path().join("table.txt"));
        assert_eq!(store.restore(Pid(0)).unwrap(), None);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_every_pid() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path().join("table.txt"));
        let table = sample_table();
        store.save(&table).unwrap();

        for pcb in &table {
            assert_eq!(store.restore(pcb.pid).unwrap().as_ref(), Some(pcb));
        }
        assert_eq!(store.restore(Pid(42)).unwrap(), None);
        assert_eq!(store.load().unwrap(), table);
    }

    #[test]
    fn test_save_overwrites() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("table.txt");
        let store = SnapshotStore::new(&path);

        store.save(&sample_table()).unwrap();
        store.save(&sample_table()[..1]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0,0,1,READY,0,0,300\n");
        assert_eq!(store.restore(Pid(1)).unwrap(), None);
    }

    #[test]
    fn test_save_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("table.txt");
        let store = SnapshotStore::new(&path);
        let table = sample_table();

        store.save(&table).unwrap();
        let first = fs::read(&path).unwrap();
        store.save(&table).unwrap();
        let second = fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path().join("table.txt"));
        store.save(&sample_table()).unwrap();

        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("table.txt")]);
    }

    #[test]
    fn test_restore_skips_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("table.txt");
        fs::write(
            &path,
            "garbage\n\
             1,5,6,SLEEPING,0,1,10\n\
             1,5,6,READY,0\n\
             1,x,6,READY,0,1,10\n\
             1,7,8,READY,1,2,10\n",
        )
        .unwrap();

        let store = SnapshotStore::new(&path);
        let pcb = store.restore(Pid(1)).unwrap().unwrap();
        assert_eq!(pcb.time_used, 7);
        assert_eq!(pcb.block_events, 1);
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path().join("missing").join("table.txt"));
        let err = store.save(&sample_table()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to create"));
    }
}
