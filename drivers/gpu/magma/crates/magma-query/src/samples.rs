//! # Timestamp Sample Buffers
//!
//! Device timestamps are captured into fixed-capacity counter sample buffers.
//! The pool hands out sequential logical sample indices, appending a new
//! buffer whenever the current one fills, and resolves every allocated sample
//! into one monotonic sequence on demand.
//!
//! ```text
//!  logical index:  0 1 2 3 │ 4 5 6 7 │ 8 9
//!                 ┌────────┼─────────┼──────┐
//!  buffers:       │ buf 0  │  buf 1  │ buf 2│   (capacity 4)
//!                 └────────┴─────────┴──────┘
//!                                       ▲ cursor = 10
//! ```
//!
//! Hardware may complete nearby samples out of order; resolution applies a
//! running maximum so a logically earlier sample never reads later than a
//! logically later one.

use std::ops::Range;
use std::sync::Arc;

use magma_core::{Error, Result};

use crate::config::SamplePoolConfig;
use crate::device::QueryDevice;

// =============================================================================
// COUNTER SAMPLE BUFFER
// =============================================================================

/// Fixed-capacity buffer of raw device counter samples
///
/// Cloning yields another handle to the same storage. The device writes raw
/// samples into slots; unwritten slots hold [`Self::ERROR_VALUE`].
#[derive(Debug, Clone)]
pub struct CounterSampleBuffer {
    samples: Arc<spin::Mutex<Vec<u64>>>,
}

impl CounterSampleBuffer {
    /// Value of a slot the device never wrote
    pub const ERROR_VALUE: u64 = u64::MAX;

    /// Create a buffer of `capacity` unwritten samples
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(spin::Mutex::new(vec![Self::ERROR_VALUE; capacity])),
        }
    }

    /// Number of sample slots
    pub fn capacity(&self) -> usize {
        self.samples.lock().len()
    }

    /// Store a raw device sample
    pub fn write_sample(&self, slot: usize, value: u64) -> Result<()> {
        let mut samples = self.samples.lock();
        let entry = samples.get_mut(slot).ok_or(Error::InvalidParameter)?;
        *entry = value;
        Ok(())
    }

    /// Mark `slot` as unwritten again
    pub fn clear_sample(&self, slot: usize) {
        if let Some(entry) = self.samples.lock().get_mut(slot) {
            *entry = Self::ERROR_VALUE;
        }
    }

    /// Read back raw samples for `range`
    pub fn resolve(&self, range: Range<usize>) -> Vec<u64> {
        let samples = self.samples.lock();
        let end = range.end.min(samples.len());
        let start = range.start.min(end);
        let mut resolved = samples[start..end].to_vec();
        resolved.resize(range.len(), Self::ERROR_VALUE);
        resolved
    }

    /// Check if two handles refer to the same storage
    pub fn same_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

// =============================================================================
// SAMPLE SLOT
// =============================================================================

/// Slot assigned to one timestamp capture
#[derive(Debug, Clone)]
pub struct SampleSlot {
    /// Buffer receiving the sample; `None` if its allocation failed
    pub buffer: Option<CounterSampleBuffer>,
    /// Slot within `buffer`
    pub slot: usize,
    /// Logical index in the pool's timestamp sequence
    pub index: usize,
}

// =============================================================================
// TIMESTAMP SAMPLE POOL
// =============================================================================

/// Append-only set of counter sample buffers with a lazily resolved view
pub struct TimestampSamplePool {
    device: Arc<dyn QueryDevice>,
    config: SamplePoolConfig,
    /// Allocated buffers, in allocation order. Failed allocations keep their
    /// position so logical indices stay aligned.
    buffers: Vec<Option<CounterSampleBuffer>>,
    /// Samples allocated since the last reset
    cursor: usize,
    resolved: bool,
    timestamps: Vec<u64>,
    sampled: Vec<bool>,
    allocation_error: Option<Error>,
}

impl TimestampSamplePool {
    /// Create an empty pool
    pub fn new(device: Arc<dyn QueryDevice>, config: SamplePoolConfig) -> Self {
        Self {
            device,
            config: SamplePoolConfig::with_capacity(config.samples_per_buffer.max(1)),
            buffers: Vec::new(),
            cursor: 0,
            resolved: false,
            timestamps: Vec::new(),
            sampled: Vec::new(),
            allocation_error: None,
        }
    }

    /// Assign the next sequential sample slot
    ///
    /// A failed buffer allocation is logged and remembered but does not fail
    /// the call: the slot is still handed out and its sample stays
    /// unwritten. The allocation is retried the next time the cursor enters
    /// that buffer, including after a reset. Reused slots are cleared so a
    /// sample from before a reset never resurfaces.
    pub fn allocate_slot(&mut self) -> SampleSlot {
        let capacity = self.config.samples_per_buffer;
        let index = self.cursor;
        let buffer_index = index / capacity;
        let slot = index % capacity;

        if buffer_index == self.buffers.len() {
            self.buffers.push(None);
        }
        if slot == 0 && self.buffers[buffer_index].is_none() {
            self.buffers[buffer_index] = self.new_buffer(buffer_index, capacity);
        }

        let buffer = self.buffers[buffer_index].clone();
        if let Some(buffer) = &buffer {
            buffer.clear_sample(slot);
        }

        self.cursor += 1;
        self.resolved = false;

        SampleSlot { buffer, slot, index }
    }

    fn new_buffer(&mut self, buffer_index: usize, capacity: usize) -> Option<CounterSampleBuffer> {
        match self.device.new_counter_sample_buffer(capacity) {
            Ok(buffer) => Some(buffer),
            Err(err) => {
                log::error!(
                    "could not allocate timestamp sample buffer {} ({} samples): {}",
                    buffer_index,
                    capacity,
                    err
                );
                self.allocation_error.get_or_insert(err);
                None
            }
        }
    }

    /// Logical index of the most recently allocated sample
    pub fn last_index(&self) -> Option<usize> {
        self.cursor.checked_sub(1)
    }

    /// Resolve every allocated sample into the monotonic sequence
    ///
    /// No-op while the pool is already resolved.
    pub fn resolve(&mut self) {
        if self.resolved {
            return;
        }

        let capacity = self.config.samples_per_buffer;
        let mut remaining = self.cursor;
        let mut latest = 0u64;

        self.timestamps.clear();
        self.sampled.clear();

        for buffer in &self.buffers {
            if remaining == 0 {
                break;
            }
            let count = remaining.min(capacity);
            let raw = match buffer {
                Some(buffer) => buffer.resolve(0..count),
                None => vec![CounterSampleBuffer::ERROR_VALUE; count],
            };
            for sample in raw {
                let written = sample != CounterSampleBuffer::ERROR_VALUE;
                if written {
                    latest = latest.max(sample);
                }
                self.timestamps.push(latest);
                self.sampled.push(written);
            }
            remaining -= count;
        }

        self.resolved = true;
    }

    /// Resolved timestamp at `index`
    ///
    /// Indices past the resolved sequence read as 0; a reset may legitimately
    /// race ahead of a query whose value is about to be overwritten.
    pub fn timestamp(&self, index: usize) -> u64 {
        self.timestamps.get(index).copied().unwrap_or(0)
    }

    /// Check if the device wrote the sample at `index`
    pub fn was_sampled(&self, index: usize) -> bool {
        self.sampled.get(index).copied().unwrap_or(false)
    }

    /// Resolved sequence
    pub fn timestamps(&self) -> &[u64] {
        &self.timestamps
    }

    /// Check if the resolved view is current
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Samples allocated since the last reset
    pub fn len(&self) -> usize {
        self.cursor
    }

    /// Check if no sample was allocated since the last reset
    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Number of buffers ever allocated
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// First buffer allocation failure, if any
    pub fn allocation_error(&self) -> Option<Error> {
        self.allocation_error
    }

    /// Rewind the cursor and drop the resolved view
    ///
    /// Allocated buffers are kept and reused by later allocations, which
    /// clear each slot as they hand it out.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.resolved = false;
        self.timestamps.clear();
        self.sampled.clear();
    }
}

impl core::fmt::Debug for TimestampSamplePool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimestampSamplePool")
            .field("config", &self.config)
            .field("buffers", &self.buffers.len())
            .field("cursor", &self.cursor)
            .field("resolved", &self.resolved)
            .finish()
    }
}
