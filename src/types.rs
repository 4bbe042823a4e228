//! Newtype wrappers and type aliases for domain concepts.
//!
//! Process identifiers get a newtype so they never mix with table indices
//! or tick counts. Simulated time is a plain alias.

use std::fmt;

/// Process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Simulated CPU time, in ticks.
pub type Ticks = u64;
