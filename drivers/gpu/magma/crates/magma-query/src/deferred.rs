//! # Deferred Result Copies
//!
//! Copy requests recorded while some covered queries were still in flight.
//! They are replayed from `end_query`, as soon as every covered query is
//! device-available, so the recording thread never has to re-poll.
//!
//! Lock order: the availability lock is always taken before the queue lock.

use magma_core::Result;

use crate::buffer::BufferBinding;
use crate::config::QueryResultFlags;
use crate::status::{AvailabilityGuard, QueryRange};

// =============================================================================
// DEFERRED COPY
// =============================================================================

/// Pending "copy query results to buffer" request
#[derive(Clone, Debug)]
pub struct DeferredCopy {
    /// Covered queries
    pub range: QueryRange,
    /// Destination of the first covered query (not owned by the pool)
    pub destination: BufferBinding,
    /// Destination bytes between queries
    pub stride: u64,
    /// Result flags
    pub flags: QueryResultFlags,
}

// =============================================================================
// DEFERRED COPY QUEUE
// =============================================================================

/// Pending copies awaiting device availability
#[derive(Debug, Default)]
pub struct DeferredCopyQueue {
    pending: spin::Mutex<Vec<DeferredCopy>>,
}

impl DeferredCopyQueue {
    /// Create an empty queue
    pub const fn new() -> Self {
        Self {
            pending: spin::Mutex::new(Vec::new()),
        }
    }

    /// Append a copy without attempting it
    pub fn push(&self, copy: DeferredCopy) {
        self.pending.lock().push(copy);
    }

    /// Number of pending copies
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Execute and drop every copy whose range is fully device-available
    ///
    /// Must be called with the availability lock held, which `availability`
    /// proves. Ready copies run in queue order while the queue lock is held;
    /// the rest stay queued in their original order. A copy that fails to
    /// encode is logged and dropped. Returns the number of copies executed.
    pub fn flush_ready<F>(&self, availability: &AvailabilityGuard<'_>, mut execute: F) -> usize
    where
        F: FnMut(&DeferredCopy) -> Result<()>,
    {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return 0;
        }

        let (waiting, ready): (Vec<_>, Vec<_>) = pending
            .drain(..)
            .partition(|copy| !availability.are_device_available(copy.range));
        *pending = waiting;

        for copy in &ready {
            log::trace!(
                "replaying deferred copy of queries [{}, {})",
                copy.range.first,
                copy.range.end()
            );
            if let Err(err) = execute(copy) {
                log::error!(
                    "deferred copy of queries [{}, {}) failed: {}",
                    copy.range.first,
                    copy.range.end(),
                    err
                );
            }
        }

        ready.len()
    }
}
