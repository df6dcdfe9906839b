//! # Device Capabilities
//!
//! What query pools need from the device that owns them, and the device-wide
//! visibility arena shared by occlusion pools without a dedicated buffer.
//!
//! ```text
//!  ┌──────────────────── visibility arena (device-owned) ───────────────────┐
//!  │ pool A [0, 16) │ pool B [16, 24) │ pool C [24, 88) │   unreserved ... │
//!  └────────────────────────────────────────────────────────────────────────┘
//!    slot = (index_offset + query) × VISIBILITY_SLOT_SIZE
//! ```
//!
//! Ranges are handed out monotonically and never overlap. Only the device
//! grows the arena; pools keep nothing but their index range.

use magma_core::{ByteSize, Error, GpuAddr, Result};

use crate::buffer::DeviceBuffer;
use crate::config::{DeviceFeatures, DeviceLimits};
use crate::correlation::ClockRatio;
use crate::samples::CounterSampleBuffer;

/// Bytes per visibility result slot
pub const VISIBILITY_SLOT_SIZE: u64 = 8;

// =============================================================================
// QUERY DEVICE TRAIT
// =============================================================================

/// Device services consumed by query pools
pub trait QueryDevice: Send + Sync {
    /// Enabled features
    fn features(&self) -> DeviceFeatures;

    /// Device limits
    fn limits(&self) -> DeviceLimits;

    /// `Err` once the device entered an unrecoverable state
    fn configuration_result(&self) -> Result<()>;

    /// Current host clock, in ticks
    fn host_clock_ticks(&self) -> u64;

    /// Host tick to nanosecond ratio
    fn host_clock_ratio(&self) -> ClockRatio;

    /// Device-wide visibility arena
    fn visibility_arena(&self) -> &VisibilityArena;

    /// Allocate a zeroed shared-storage buffer
    fn new_buffer(&self, len: usize) -> Result<DeviceBuffer>;

    /// Allocate a counter sample buffer with `capacity` slots
    fn new_counter_sample_buffer(&self, capacity: usize) -> Result<CounterSampleBuffer>;

    /// Current host clock, in nanoseconds
    fn host_clock_nanos(&self) -> u64 {
        self.host_clock_ratio().to_nanos(self.host_clock_ticks())
    }
}

// =============================================================================
// VISIBILITY ARENA
// =============================================================================

/// Index range granted to one pool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaReservation {
    /// First arena slot owned by the pool
    pub index_offset: u32,
    /// Slots actually granted
    pub granted: u32,
    /// Set when fewer slots than requested were available
    pub shortfall: Option<Error>,
}

#[derive(Debug)]
struct ArenaState {
    query_count: u32,
    buffer: Option<DeviceBuffer>,
}

/// Device-owned visibility buffer carved into per-pool index ranges
#[derive(Debug)]
pub struct VisibilityArena {
    base: GpuAddr,
    max_size: ByteSize,
    state: spin::Mutex<ArenaState>,
}

impl VisibilityArena {
    /// Create an empty arena mapped at `base`, capped at `max_size`
    pub fn new(base: GpuAddr, max_size: ByteSize) -> Self {
        Self {
            base,
            max_size,
            state: spin::Mutex::new(ArenaState {
                query_count: 0,
                buffer: None,
            }),
        }
    }

    /// Maximum number of slots the device can address
    pub fn capacity(&self) -> u32 {
        self.max_size.slots_of(VISIBILITY_SLOT_SIZE).min(u32::MAX as u64) as u32
    }

    /// Slots reserved so far
    pub fn query_count(&self) -> u32 {
        self.state.lock().query_count
    }

    /// Backing buffer, `None` until the first reservation
    ///
    /// Expansion resizes this buffer in place, so bindings taken before a
    /// later reservation keep addressing live slots.
    pub fn buffer(&self) -> Option<DeviceBuffer> {
        self.state.lock().buffer.clone()
    }

    /// Reserve `query_count` slots past every existing reservation
    ///
    /// The total is clamped to the device limit. Expansion happens in place:
    /// existing slot contents and outstanding bindings survive it.
    pub fn reserve(&self, query_count: u32) -> ArenaReservation {
        let capacity = self.capacity();
        let mut state = self.state.lock();

        let index_offset = state.query_count;
        let available = capacity.saturating_sub(index_offset);
        let granted = query_count.min(available);
        let shortfall = (granted < query_count).then(|| {
            let err = Error::QueryBudgetExceeded { available };
            log::error!("visibility arena exhausted: {}", err);
            err
        });

        if granted > 0 {
            state.query_count = index_offset + granted;
            let len = (state.query_count as u64 * VISIBILITY_SLOT_SIZE) as usize;
            state
                .buffer
                .get_or_insert_with(|| DeviceBuffer::new(self.base, 0))
                .grow(len);
            log::debug!(
                "visibility arena grown to {} queries ({} reserved at {})",
                state.query_count,
                granted,
                index_offset
            );
        }

        ArenaReservation {
            index_offset,
            granted,
            shortfall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservations_do_not_overlap() {
        let arena = VisibilityArena::new(GpuAddr::new(0x10_0000), ByteSize::from_kib(1));
        let a = arena.reserve(16);
        let b = arena.reserve(8);
        assert_eq!(a.index_offset, 0);
        assert_eq!(b.index_offset, 16);
        assert_eq!(arena.query_count(), 24);
        assert!(a.shortfall.is_none() && b.shortfall.is_none());
    }

    #[test]
    fn test_expansion_preserves_contents() {
        let arena = VisibilityArena::new(GpuAddr::new(0x10_0000), ByteSize::from_kib(1));
        arena.reserve(2);
        let first = arena.buffer().expect("allocated");
        first.write_u64(8, 55).expect("in range");

        arena.reserve(4);
        let grown = arena.buffer().expect("allocated");
        assert_eq!(grown.len(), 48);
        assert_eq!(grown.read_u64(8), 55);
        assert!(grown.same_buffer(&first));
    }

    #[test]
    fn test_writes_through_old_handle_after_growth() {
        let arena = VisibilityArena::new(GpuAddr::new(0x10_0000), ByteSize::from_kib(1));
        arena.reserve(2);
        let held = arena.buffer().expect("allocated");

        arena.reserve(4);
        held.write_u64(8, 42).expect("in range");
        held.write_u64(40, 43).expect("grown range");

        let current = arena.buffer().expect("allocated");
        assert_eq!(current.read_u64(8), 42);
        assert_eq!(current.read_u64(40), 43);
    }

    #[test]
    fn test_reservation_clamped_to_limit() {
        // 64 bytes: eight slots.
        let arena = VisibilityArena::new(GpuAddr::new(0x10_0000), ByteSize::from_bytes(64));
        arena.reserve(6);
        let clamped = arena.reserve(5);
        assert_eq!(clamped.index_offset, 6);
        assert_eq!(clamped.granted, 2);
        assert_eq!(clamped.shortfall, Some(Error::QueryBudgetExceeded { available: 2 }));
        assert_eq!(arena.query_count(), 8);

        let empty = arena.reserve(1);
        assert_eq!(empty.granted, 0);
    }
}
