//! Run statistics.
//!
//! Per-process counters and timing derived from a finished run. Every
//! process arrives at tick 0 and there is a single CPU, so:
//!
//! - **turnaround** is the tick at which the process terminated;
//! - **waiting** is the turnaround minus the CPU time it consumed, i.e.
//!   every tick it spent ready or blocked.

use std::fmt;

use crate::engine::SimulationResult;
use crate::types::{Pid, Ticks};

/// Per-process statistics computed from a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub pid: Pid,
    pub target_time: Ticks,
    /// Number of times the process was dispatched.
    pub dispatches: usize,
    /// Number of I/O blocks.
    pub blocks: usize,
    /// Number of quanta that expired without finishing or blocking.
    pub preemptions: usize,
    pub unblocks: usize,
    /// Tick at which the process terminated, `None` if it never did.
    pub completion_tick: Option<Ticks>,
}

impl ProcessStats {
    pub fn turnaround(&self) -> Option<Ticks> {
        self.completion_tick
    }

    pub fn waiting(&self) -> Option<Ticks> {
        self.completion_tick.map(|t| t - self.target_time)
    }
}

/// Statistics for a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// One entry per process, in pid creation order.
    pub processes: Vec<ProcessStats>,
    /// PIDs in dispatch order.
    pub execution_order: Vec<Pid>,
    pub ticks: Ticks,
    pub stalls: usize,
}

impl RunStats {
    pub fn from_result(result: &SimulationResult) -> Self {
        let trace = &result.trace;
        let processes = result
            .table
            .iter()
            .map(|pcb| ProcessStats {
                pid: pcb.pid,
                target_time: pcb.target_time,
                dispatches: trace.dispatch_count(pcb.pid),
                blocks: trace.block_count(pcb.pid),
                preemptions: trace.preempt_count(pcb.pid),
                unblocks: trace.unblock_count(pcb.pid),
                completion_tick: trace.completion_tick(pcb.pid),
            })
            .collect();

        RunStats {
            processes,
            execution_order: trace.execution_order(),
            ticks: result.ticks,
            stalls: trace.stall_count(),
        }
    }

    fn mean(&self, f: impl Fn(&ProcessStats) -> Option<Ticks>) -> f64 {
        let values: Vec<Ticks> = self.processes.iter().filter_map(f).collect();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<Ticks>() as f64 / values.len() as f64
        }
    }

    /// Mean waiting time over terminated processes (0 if none terminated).
    pub fn mean_waiting(&self) -> f64 {
        self.mean(ProcessStats::waiting)
    }

    /// Mean turnaround over terminated processes (0 if none terminated).
    pub fn mean_turnaround(&self) -> f64 {
        self.mean(ProcessStats::turnaround)
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order: Vec<String> = self
            .execution_order
            .iter()
            .map(|p| p.0.to_string())
            .collect();
        writeln!(f, "Execution order: {}", order.join(" -> "))?;
        writeln!(f)?;
        writeln!(
            f,
            "{:<5} {:>8} {:>6} {:>6} {:>8} {:>10} {:>10}",
            "PID", "TARGET", "N_CPU", "NES", "PREEMPT", "TURNAROUND", "WAITING"
        )?;
        for p in &self.processes {
            let opt = |v: Option<Ticks>| v.map_or_else(|| "-".to_string(), |t| t.to_string());
            writeln!(
                f,
                "{:<5} {:>8} {:>6} {:>6} {:>8} {:>10} {:>10}",
                p.pid.0,
                p.target_time,
                p.dispatches,
                p.blocks,
                p.preemptions,
                opt(p.turnaround()),
                opt(p.waiting())
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Mean turnaround: {:.2}", self.mean_turnaround())?;
        writeln!(f, "Mean waiting:    {:.2}", self.mean_waiting())?;
        write!(f, "Total ticks: {}  stalls: {}", self.ticks, self.stalls)
    }
}
