//! # Pool Variants
//!
//! Type-specific storage and addressing behind a query pool. The pool owns
//! the shared availability and deferred-copy machinery and calls into its
//! variant only for what differs per query type.
//!
//! ```text
//!                    ┌──────────────┐
//!                    │  QueryPool   │  availability, deferred copies,
//!                    └──────┬───────┘  result-copy policy
//!                           │ QueryStorage
//!      ┌──────────────┬─────┴────────┬──────────────────┐
//!  Timestamp      Occlusion    PipelineStatistics   Unsupported
//! ```

use magma_core::Result;

use crate::buffer::BufferBinding;
use crate::config::QueryControlFlags;
use crate::copy::ResultSource;
use crate::correlation::CorrelationMarker;
use crate::encoder::CommandEncoder;
use crate::occlusion::OcclusionStorage;
use crate::samples::TimestampSamplePool;
use crate::statistics::StatisticsStorage;
use crate::status::QueryRange;
use crate::timestamp::TimestampStorage;
use crate::unsupported::UnsupportedStorage;

// =============================================================================
// STORAGE TRAIT
// =============================================================================

/// Per-query-type storage contract
pub trait QueryStorage: Send + Sync {
    /// Values stored per query
    fn element_count(&self) -> u32;

    /// Start producing a value for `query`
    fn begin_query(&self, query: u32, flags: QueryControlFlags, encoder: &mut dyn CommandEncoder) -> Result<()>;

    /// Stop producing a value for `query`
    fn end_query(&self, query: u32, encoder: &mut dyn CommandEncoder) -> Result<()>;

    /// Finalize device-produced values before they become host-available
    fn finish_queries(
        &self,
        _queries: &[u32],
        _marker: &CorrelationMarker,
        _samples: Option<&mut TimestampSamplePool>,
    ) {
    }

    /// Read the values of one query into `values` (`element_count` long)
    fn read_result(&self, query: u32, values: &mut [u64]);

    /// Packed 64-bit results of `range` for a direct copy, if the type has
    /// them in device memory
    fn result_buffer(&self, range: QueryRange, encoder: &mut dyn CommandEncoder) -> Result<Option<BufferBinding>>;

    /// Source results of `range` for the compute copy pass
    fn result_source(&self, range: QueryRange, encoder: &mut dyn CommandEncoder) -> Result<ResultSource>;

    /// Clear stored values of `range`, on the device when an encoder is
    /// given, in mapped memory otherwise
    fn reset_results(&self, range: QueryRange, encoder: Option<&mut dyn CommandEncoder>) -> Result<()>;
}

// =============================================================================
// VARIANT
// =============================================================================

/// Concrete storage of a pool, tagged by query type
#[derive(Debug)]
pub enum PoolVariant {
    /// Timestamp queries
    Timestamp(TimestampStorage),
    /// Occlusion queries
    Occlusion(OcclusionStorage),
    /// Pipeline-statistics queries
    PipelineStatistics(StatisticsStorage),
    /// Query types this device cannot answer
    Unsupported(UnsupportedStorage),
}

impl PoolVariant {
    /// Storage behind the tag
    #[inline]
    pub fn storage(&self) -> &dyn QueryStorage {
        match self {
            Self::Timestamp(storage) => storage,
            Self::Occlusion(storage) => storage,
            Self::PipelineStatistics(storage) => storage,
            Self::Unsupported(storage) => storage,
        }
    }
}

/// Packed native-endian bytes of `values`, as uploaded to copy passes
pub(crate) fn packed_bytes(values: &[u64]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}
