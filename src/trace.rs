//! Trace event recording for the simulator.
//!
//! Every observable transition (dispatch, preemption back to READY, block,
//! unblock, termination) and every stalled iteration is recorded as a
//! `TraceEvent` stamped with the simulated tick. Random transitions keep the
//! value that was drawn so a run can be audited line by line.

use std::fmt;

use crate::fmt::fmt_grouped;
use crate::pcb::ProcState;
use crate::types::{Pid, Ticks};

/// A single trace event produced by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    /// Simulated ticks elapsed when this event occurred.
    pub tick: Ticks,
    /// The kind of event.
    pub kind: TraceKind,
}

/// The type of scheduling event recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceKind {
    /// READY to RUNNING. `restored` tells whether the snapshot held a
    /// record for the process when it was probed.
    Dispatched { pid: Pid, restored: bool },
    /// RUNNING to READY after a full quantum.
    Preempted { pid: Pid },
    /// RUNNING to BLOCKED; `draw` fell under the block probability.
    Blocked { pid: Pid, draw: f64 },
    /// BLOCKED to READY; `draw` fell under the unblock probability.
    Unblocked { pid: Pid, draw: f64 },
    /// RUNNING to TERMINATED.
    Terminated { pid: Pid },
    /// The ready queue stayed empty after both unblock sweeps.
    Stall { attempt: u64 },
}

impl TraceKind {
    /// The process this event is about, if any.
    pub fn pid(&self) -> Option<Pid> {
        match *self {
            TraceKind::Dispatched { pid, .. }
            | TraceKind::Preempted { pid }
            | TraceKind::Blocked { pid, .. }
            | TraceKind::Unblocked { pid, .. }
            | TraceKind::Terminated { pid } => Some(pid),
            TraceKind::Stall { .. } => None,
        }
    }

    /// The `(from, to)` state pair, for process transitions.
    pub fn transition(&self) -> Option<(ProcState, ProcState)> {
        use ProcState::*;
        match self {
            TraceKind::Dispatched { .. } => Some((Ready, Running)),
            TraceKind::Preempted { .. } => Some((Running, Ready)),
            TraceKind::Blocked { .. } => Some((Running, Blocked)),
            TraceKind::Unblocked { .. } => Some((Blocked, Ready)),
            TraceKind::Terminated { .. } => Some((Running, Terminated)),
            TraceKind::Stall { .. } => None,
        }
    }
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let TraceKind::Stall { attempt } = self {
            return write!(
                f,
                "no process READY and none finished, forcing another unblock sweep (attempt {attempt})"
            );
        }
        let (Some(pid), Some((from, to))) = (self.pid(), self.transition()) else {
            return Ok(());
        };
        write!(f, "({}) {from} >>> {to}", pid.0)?;
        match self {
            TraceKind::Dispatched { restored, .. } => write!(f, " (restored={restored})"),
            TraceKind::Blocked { draw, .. } | TraceKind::Unblocked { draw, .. } => {
                write!(f, " (chance={draw:.2})")
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>9}] {}", fmt_grouped(self.tick), self.kind)
    }
}

/// A complete simulation trace, containing all events in chronological order.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    events: Vec<TraceEvent>,
}

impl Trace {
    pub(crate) fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub(crate) fn record(&mut self, tick: Ticks, kind: TraceKind) {
        self.events.push(TraceEvent { tick, kind });
    }

    /// Get all events in chronological order.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Events concerning `pid`, in order.
    pub fn events_for(&self, pid: Pid) -> impl Iterator<Item = &TraceEvent> + '_ {
        self.events
            .iter()
            .filter(move |e| e.kind.pid() == Some(pid))
    }

    fn count(&self, pred: impl Fn(&TraceKind) -> bool) -> usize {
        self.events.iter().filter(|e| pred(&e.kind)).count()
    }

    /// Number of times `pid` was put on the CPU.
    pub fn dispatch_count(&self, pid: Pid) -> usize {
        self.count(|k| matches!(k, TraceKind::Dispatched { pid: p, .. } if *p == pid))
    }

    /// Number of times `pid` exhausted its quantum.
    pub fn preempt_count(&self, pid: Pid) -> usize {
        self.count(|k| matches!(k, TraceKind::Preempted { pid: p } if *p == pid))
    }

    /// Number of times `pid` blocked.
    pub fn block_count(&self, pid: Pid) -> usize {
        self.count(|k| matches!(k, TraceKind::Blocked { pid: p, .. } if *p == pid))
    }

    /// Number of times `pid` was unblocked.
    pub fn unblock_count(&self, pid: Pid) -> usize {
        self.count(|k| matches!(k, TraceKind::Unblocked { pid: p, .. } if *p == pid))
    }

    /// Number of stalled iterations.
    pub fn stall_count(&self) -> usize {
        self.count(|k| matches!(k, TraceKind::Stall { .. }))
    }

    /// Tick at which `pid` terminated, if it did.
    pub fn completion_tick(&self, pid: Pid) -> Option<Ticks> {
        self.events
            .iter()
            .find(|e| matches!(e.kind, TraceKind::Terminated { pid: p } if p == pid))
            .map(|e| e.tick)
    }

    /// PIDs in dispatch order.
    pub fn execution_order(&self) -> Vec<Pid> {
        self.events
            .iter()
            .filter_map(|e| match e.kind {
                TraceKind::Dispatched { pid, .. } => Some(pid),
                _ => None,
            })
            .collect()
    }

    /// Rendered lines, one per event, without the tick prefix.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.events.iter().map(|e| e.kind.to_string())
    }

    /// Pretty-print the trace for debugging.
    pub fn dump(&self) {
        for event in &self.events {
            eprintln!("{event}");
        }
    }
}
