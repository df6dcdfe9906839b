//! # Query Availability
//!
//! Per-query status tracking shared by every pool variant.
//!
//! ```text
//!            end_query              finish_queries
//!  Initial ────────────▶ DeviceAvailable ────────────▶ Available
//!     ▲                                                    │
//!     └──────────────────── reset_results ─────────────────┘
//! ```
//!
//! Statuses live behind one mutex paired with a condition variable. Host
//! readers block on the condition variable until their whole range is
//! `Available`; promotions notify once per batch.

use std::ops::Range;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

// =============================================================================
// QUERY STATUS
// =============================================================================

/// Availability of a single query
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u32)]
pub enum QueryStatus {
    /// No data produced yet
    #[default]
    Initial = 0,
    /// The device wrote the value; finalization is still pending
    DeviceAvailable = 1,
    /// Value is final and safe to read
    Available = 2,
}

impl QueryStatus {
    /// Raw word uploaded to copy passes
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}

// =============================================================================
// QUERY RANGE
// =============================================================================

/// Contiguous run of queries `[first, first + count)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct QueryRange {
    /// First query
    pub first: u32,
    /// Number of queries
    pub count: u32,
}

impl QueryRange {
    /// Create a range
    #[inline]
    pub const fn new(first: u32, count: u32) -> Self {
        Self { first, count }
    }

    /// Range holding a single query
    #[inline]
    pub const fn single(query: u32) -> Self {
        Self::new(query, 1)
    }

    /// One past the last query
    #[inline]
    pub const fn end(&self) -> u32 {
        self.first + self.count
    }

    /// Index range into per-query arrays
    #[inline]
    pub fn indices(&self) -> Range<usize> {
        self.first as usize..self.end() as usize
    }

    /// Check if the range covers `query`
    #[inline]
    pub const fn contains(&self, query: u32) -> bool {
        query >= self.first && query < self.end()
    }
}

// =============================================================================
// AVAILABILITY TRACKER
// =============================================================================

/// Status array, its lock and the host-wait condition variable
///
/// Query indices are not bounds checked beyond slice indexing: addressing a
/// query outside the pool is a caller contract violation and panics.
#[derive(Debug)]
pub struct AvailabilityTracker {
    statuses: Mutex<Vec<QueryStatus>>,
    blocker: Condvar,
    query_count: u32,
}

impl AvailabilityTracker {
    /// Create a tracker with every query `Initial`
    pub fn new(query_count: u32) -> Self {
        Self {
            statuses: Mutex::new(vec![QueryStatus::Initial; query_count as usize]),
            blocker: Condvar::new(),
            query_count,
        }
    }

    /// Number of tracked queries
    pub fn query_count(&self) -> u32 {
        self.query_count
    }

    /// Acquire the availability lock
    pub fn lock(&self) -> AvailabilityGuard<'_> {
        AvailabilityGuard {
            statuses: self.statuses.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Current status of one query
    pub fn status(&self, query: u32) -> QueryStatus {
        self.lock().status(query)
    }

    /// Promote `queries` to `Available` and wake every waiter once
    pub fn finish(&self, queries: &[u32]) {
        {
            let mut guard = self.lock();
            for &query in queries {
                guard.statuses[query as usize] = QueryStatus::Available;
            }
        }
        self.blocker.notify_all();
    }

    /// Force `range` back to `Initial`
    pub fn reset(&self, range: QueryRange) {
        let mut guard = self.lock();
        for status in &mut guard.statuses[range.indices()] {
            *status = QueryStatus::Initial;
        }
    }

    /// Block until `range` is host-available or `abort` reports true
    ///
    /// `abort` is re-evaluated on every wake-up together with the range, so
    /// spurious and partial wake-ups are harmless. Returns the held lock so
    /// the caller can read results without a second acquisition.
    pub fn wait_host_available<F>(&self, range: QueryRange, abort: F) -> AvailabilityGuard<'_>
    where
        F: Fn() -> bool,
    {
        let guard = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        let statuses = self
            .blocker
            .wait_while(guard, |statuses| {
                !(abort() || statuses[range.indices()].iter().all(|s| *s == QueryStatus::Available))
            })
            .unwrap_or_else(PoisonError::into_inner);
        AvailabilityGuard { statuses }
    }

    /// Wake every waiter so it re-checks its abort condition
    pub fn wake_all(&self) {
        // Taking the lock orders this wake after any in-flight predicate check.
        let _guard = self.lock();
        self.blocker.notify_all();
    }
}

// =============================================================================
// AVAILABILITY GUARD
// =============================================================================

/// Held availability lock
#[derive(Debug)]
pub struct AvailabilityGuard<'a> {
    statuses: MutexGuard<'a, Vec<QueryStatus>>,
}

impl AvailabilityGuard<'_> {
    /// Status of one query
    #[inline]
    pub fn status(&self, query: u32) -> QueryStatus {
        self.statuses[query as usize]
    }

    /// Mark `range` as written by the device
    ///
    /// Never demotes a query that was already finalized.
    pub fn mark_device_available(&mut self, range: QueryRange) {
        for status in &mut self.statuses[range.indices()] {
            *status = (*status).max(QueryStatus::DeviceAvailable);
        }
    }

    /// Check if every query in `range` was written by the device
    pub fn are_device_available(&self, range: QueryRange) -> bool {
        self.statuses[range.indices()]
            .iter()
            .all(|s| *s >= QueryStatus::DeviceAvailable)
    }

    /// Check if every query in `range` is final
    pub fn are_host_available(&self, range: QueryRange) -> bool {
        self.statuses[range.indices()]
            .iter()
            .all(|s| *s == QueryStatus::Available)
    }

    /// Copy the statuses of `range` into an immutable array of raw words
    ///
    /// Handed to copy passes that run on another engine and must not take
    /// this lock.
    pub fn snapshot(&self, range: QueryRange) -> Arc<[u32]> {
        self.statuses[range.indices()]
            .iter()
            .map(|s| s.as_raw())
            .collect()
    }
}
