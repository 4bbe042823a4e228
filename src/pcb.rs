//! Process control block model.
//!
//! A PCB is created once at startup and mutated by the engine for the rest
//! of the run. Terminated PCBs stay in the table. Each PCB serializes to a
//! single comma-separated record:
//!
//! ```text
//! pid,time_used,program_counter,STATE,block_events,cpu_acquisitions,target_time
//! ```

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use crate::types::{Pid, Ticks};

/// Number of fields in a snapshot record.
pub const RECORD_FIELDS: usize = 7;

/// The state a simulated process can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcState {
    /// Waiting in the ready queue.
    Ready,
    /// Currently executing a burst.
    Running,
    /// Waiting for simulated I/O.
    Blocked,
    /// Consumed its full target time. Final.
    Terminated,
}

impl ProcState {
    /// The persisted name of the state.
    pub fn name(self) -> &'static str {
        match self {
            ProcState::Ready => "READY",
            ProcState::Running => "RUNNING",
            ProcState::Blocked => "BLOCKED",
            ProcState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for ProcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProcState {
    type Err = ParseRecordError;

    /// Only the exact upper-case names are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READY" => Ok(ProcState::Ready),
            "RUNNING" => Ok(ProcState::Running),
            "BLOCKED" => Ok(ProcState::Blocked),
            "TERMINATED" => Ok(ProcState::Terminated),
            other => Err(ParseRecordError::UnknownState(other.to_string())),
        }
    }
}

/// Errors from parsing a snapshot record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseRecordError {
    /// The line has fewer than [`RECORD_FIELDS`] comma-separated fields.
    TooFewFields(usize),
    /// A numeric field is not a non-negative integer.
    InvalidNumber {
        field: &'static str,
        value: String,
        source: ParseIntError,
    },
    /// The state field is not one of the four state names.
    UnknownState(String),
}

impl fmt::Display for ParseRecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseRecordError::TooFewFields(n) => {
                write!(f, "expected {RECORD_FIELDS} fields, found {n}")
            }
            ParseRecordError::InvalidNumber { field, value, source } => {
                write!(f, "invalid {field} {value:?}: {source}")
            }
            ParseRecordError::UnknownState(s) => write!(f, "unknown process state {s:?}"),
        }
    }
}

impl std::error::Error for ParseRecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseRecordError::InvalidNumber { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A simulated process control block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcb {
    /// Process identifier, assigned at creation.
    pub pid: Pid,
    /// Cumulative ticks of CPU time consumed (TP).
    pub time_used: Ticks,
    /// Derived display value, `time_used + 1` (CP).
    pub program_counter: Ticks,
    /// Current scheduling state.
    pub state: ProcState,
    /// Number of times the process entered BLOCKED (NES).
    pub block_events: u32,
    /// Number of times the process was dispatched onto the CPU (N_CPU).
    pub cpu_acquisitions: u32,
    /// Total CPU time required before the process finishes.
    pub target_time: Ticks,
}

impl Pcb {
    /// Create a fresh READY process that has not run yet.
    pub fn new(pid: Pid, target_time: Ticks) -> Self {
        Pcb {
            pid,
            time_used: 0,
            program_counter: 1,
            state: ProcState::Ready,
            block_events: 0,
            cpu_acquisitions: 0,
            target_time,
        }
    }

    /// Recompute the program counter from the consumed CPU time.
    pub fn advance_program_counter(&mut self) {
        self.program_counter = self.time_used + 1;
    }

    /// Whether the process has consumed its whole target time.
    pub fn is_finished(&self) -> bool {
        self.time_used >= self.target_time
    }

    /// Consume one tick of CPU time.
    pub fn tick(&mut self) {
        self.time_used += 1;
        self.advance_program_counter();
    }

    /// Why `restored` cannot be resumed in place of this live PCB, if it
    /// cannot.
    ///
    /// A resumable record describes the same process, still has work left
    /// and keeps its program counter in step with its consumed time.
    pub fn restore_conflict(&self, restored: &Pcb) -> Option<&'static str> {
        if restored.pid != self.pid {
            Some("pid does not match")
        } else if restored.target_time != self.target_time {
            Some("target time does not match")
        } else if restored.state == ProcState::Terminated {
            Some("record is terminated")
        } else if restored.time_used >= restored.target_time {
            Some("record has no work left")
        } else if restored.program_counter != restored.time_used + 1 {
            Some("program counter out of step")
        } else {
            None
        }
    }

    /// Copy the mutable fields of a restored record onto this PCB.
    ///
    /// `pid` and `target_time` are identity and are never overwritten.
    /// Callers check [`Pcb::restore_conflict`] first.
    pub fn apply_restored(&mut self, restored: &Pcb) {
        self.time_used = restored.time_used;
        self.program_counter = restored.program_counter;
        self.state = restored.state;
        self.block_events = restored.block_events;
        self.cpu_acquisitions = restored.cpu_acquisitions;
    }

    /// Serialize to a snapshot record (no trailing newline).
    pub fn to_record(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.pid.0,
            self.time_used,
            self.program_counter,
            self.state.name(),
            self.block_events,
            self.cpu_acquisitions,
            self.target_time
        )
    }

    /// Parse a snapshot record. Fields past the seventh are ignored.
    pub fn from_record(line: &str) -> Result<Self, ParseRecordError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < RECORD_FIELDS {
            return Err(ParseRecordError::TooFewFields(parts.len()));
        }

        Ok(Pcb {
            pid: Pid(parse_field("pid", parts[0])?),
            time_used: parse_field("time_used", parts[1])?,
            program_counter: parse_field("program_counter", parts[2])?,
            state: parts[3].parse()?,
            block_events: parse_field("block_events", parts[4])?,
            cpu_acquisitions: parse_field("cpu_acquisitions", parts[5])?,
            target_time: parse_field("target_time", parts[6])?,
        })
    }
}

fn parse_field<T>(field: &'static str, value: &str) -> Result<T, ParseRecordError>
where
    T: FromStr<Err = ParseIntError>,
{
    value
        .parse()
        .map_err(|source| ParseRecordError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

impl FromStr for Pcb {
    type Err = ParseRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pcb::from_record(s)
    }
}

impl fmt::Display for Pcb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PID={} TP={} CP={} STATE={} NES={} N_CPU={} TARGET={}",
            self.pid.0,
            self.time_used,
            self.program_counter,
            self.state,
            self.block_events,
            self.cpu_acquisitions,
            self.target_time
        )
    }
}
