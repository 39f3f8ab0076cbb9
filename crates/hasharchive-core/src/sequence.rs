use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Sequence number of an archived event: wall-clock seconds plus a tie-breaking id.
///
/// Ordering is by `time`, then `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Seq {
    pub time: u64,
    pub id: u64,
}

impl Seq {
    pub fn new(time: u64, id: u64) -> Self {
        Self { time, id }
    }

    /// The greatest sequence number ordered before this one, if any.
    pub fn predecessor(self) -> Option<Seq> {
        match (self.time, self.id) {
            (0, 0) => None,
            (time, 0) => Some(Seq::new(time - 1, u64::MAX)),
            (time, id) => Some(Seq::new(time, id - 1)),
        }
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.time, self.id)
    }
}

/// Hands out `(time, id)` pairs to everything that is about to record an event.
///
/// One allocator is shared (by `Arc`) between enqueue callers and the worker.
/// The lock is held only for the increment.
#[derive(Debug)]
pub struct SequenceAllocator {
    last_id: Mutex<u64>,
}

impl SequenceAllocator {
    /// Create an allocator whose first id is `high_water + 1`.
    ///
    /// `high_water` is the largest id already persisted, so ids are never
    /// reused across restarts.
    pub fn new(high_water: u64) -> Self {
        Self {
            last_id: Mutex::new(high_water),
        }
    }

    /// Allocate the next sequence number for an event at `time`.
    pub fn next(&self, time: u64) -> Seq {
        let mut last = self.last_id.lock().unwrap_or_else(PoisonError::into_inner);
        *last += 1;
        Seq { time, id: *last }
    }

    /// The most recently allocated id.
    pub fn last_id(&self) -> u64 {
        *self.last_id.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}
