//! # MAGMA Query
//!
//! Lifecycle of GPU query results: timestamps, occlusion counts and pipeline
//! statistics, from device completion through host availability and
//! deferred copy-back into arbitrary destination buffers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           QueryPool                              │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌────────────────┐  │
//! │  │  Availability    │  │  Deferred Copy   │  │  PoolVariant   │  │
//! │  │  Tracker         │─►│  Queue           │─►│  (storage,     │  │
//! │  │  (Mutex+Condvar) │  │  (spin::Mutex)   │  │   addressing)  │  │
//! │  └──────────────────┘  └──────────────────┘  └───────┬────────┘  │
//! └──────────────────────────────────────────────────────┼───────────┘
//!                                                        │
//!        ┌───────────────────────┬───────────────────────┤
//!        ▼                       ▼                       ▼
//! ┌──────────────┐      ┌─────────────────┐      ┌───────────────┐
//! │ Timestamp    │      │ Correlation     │      │ Visibility    │
//! │ SamplePool   │─────►│ Marker          │      │ Arena         │
//! │ (counters)   │      │ (GPU → host ns) │      │ (device-wide) │
//! └──────────────┘      └─────────────────┘      └───────────────┘
//! ```
//!
//! Devices and command encoders are collaborators, reached through the
//! [`QueryDevice`] and [`CommandEncoder`] traits.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod buffer;
pub mod config;
pub mod copy;
pub mod correlation;
pub mod deferred;
pub mod device;
pub mod encoder;
pub mod layout;
pub mod occlusion;
pub mod pool;
pub mod samples;
pub mod statistics;
pub mod status;
pub mod timestamp;
pub mod unsupported;
pub mod variant;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use buffer::{BufferBinding, DeviceBuffer};
pub use config::{
    DeviceFeatures, DeviceLimits, PipelineStatisticsFlags, QueryControlFlags, QueryPoolCreateInfo, QueryResultFlags,
    QueryType, SamplePoolConfig,
};
pub use copy::{CopyResultsArgs, CopyResultsPass, ResultSource};
pub use correlation::{ClockRatio, CorrelationMarker};
pub use device::{QueryDevice, VisibilityArena};
pub use encoder::CommandEncoder;
pub use pool::{CopyStats, QueryPool, ResultsStatus};
pub use samples::{CounterSampleBuffer, TimestampSamplePool};
pub use status::{QueryRange, QueryStatus};
pub use variant::{PoolVariant, QueryStorage};

pub use magma_core::{Error, Result};
