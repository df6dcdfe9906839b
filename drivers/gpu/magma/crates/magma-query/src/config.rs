//! # Query Configuration
//!
//! Creation parameters, flag sets and device limits consumed by query pools.

use magma_core::ByteSize;

// =============================================================================
// QUERY TYPE
// =============================================================================

/// Kind of query a pool tracks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum QueryType {
    /// Visibility sample counts
    #[default]
    Occlusion = 0,
    /// Pipeline statistic counters
    PipelineStatistics = 1,
    /// Device timestamps, reported in host nanoseconds
    Timestamp = 2,
    /// Transform feedback stream counters
    TransformFeedbackStream = 3,
    /// Primitives generated counters
    PrimitivesGenerated = 4,
    /// Acceleration structure compacted size
    AccelerationStructureCompactedSize = 5,
}

impl QueryType {
    /// Name used in log messages
    pub const fn name(self) -> &'static str {
        match self {
            Self::Occlusion => "occlusion",
            Self::PipelineStatistics => "pipeline-statistics",
            Self::Timestamp => "timestamp",
            Self::TransformFeedbackStream => "transform-feedback-stream",
            Self::PrimitivesGenerated => "primitives-generated",
            Self::AccelerationStructureCompactedSize => "acceleration-structure-compacted-size",
        }
    }
}

// =============================================================================
// FLAGS
// =============================================================================

bitflags::bitflags! {
    /// Pipeline statistics gathered by a pipeline-statistics pool
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PipelineStatisticsFlags: u32 {
        /// Input assembly vertices
        const INPUT_ASSEMBLY_VERTICES = 1 << 0;
        /// Input assembly primitives
        const INPUT_ASSEMBLY_PRIMITIVES = 1 << 1;
        /// Vertex shader invocations
        const VERTEX_SHADER_INVOCATIONS = 1 << 2;
        /// Geometry shader invocations
        const GEOMETRY_SHADER_INVOCATIONS = 1 << 3;
        /// Geometry shader primitives
        const GEOMETRY_SHADER_PRIMITIVES = 1 << 4;
        /// Clipping invocations
        const CLIPPING_INVOCATIONS = 1 << 5;
        /// Clipping primitives
        const CLIPPING_PRIMITIVES = 1 << 6;
        /// Fragment shader invocations
        const FRAGMENT_SHADER_INVOCATIONS = 1 << 7;
        /// Tessellation control patches
        const TESSELLATION_CONTROL_PATCHES = 1 << 8;
        /// Tessellation evaluation invocations
        const TESSELLATION_EVALUATION_INVOCATIONS = 1 << 9;
        /// Compute shader invocations
        const COMPUTE_SHADER_INVOCATIONS = 1 << 10;
    }
}

bitflags::bitflags! {
    /// How results are returned by host reads and copies
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct QueryResultFlags: u32 {
        /// Results are 64-bit, otherwise 32-bit
        const RESULT_64 = 1 << 0;
        /// Block until every requested query is available
        const WAIT = 1 << 1;
        /// Append an availability word after each query's values
        const WITH_AVAILABILITY = 1 << 2;
        /// Write values for queries that are not yet available
        const PARTIAL = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Flags passed to `begin_query`
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct QueryControlFlags: u32 {
        /// Exact sample counts instead of boolean visibility
        const PRECISE = 1 << 0;
    }
}

bitflags::bitflags! {
    /// Device capabilities relevant to queries
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DeviceFeatures: u32 {
        /// Pipeline statistics queries can be created
        const PIPELINE_STATISTICS_QUERY = 1 << 0;
        /// Occlusion pools may own a dedicated visibility buffer
        const LARGE_QUERY_POOLS = 1 << 1;
        /// Exact occlusion sample counts
        const OCCLUSION_QUERY_PRECISE = 1 << 2;
    }
}

// =============================================================================
// POOL CREATE INFO
// =============================================================================

/// Query pool creation parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryPoolCreateInfo {
    /// Query type
    pub query_type: QueryType,
    /// Number of queries in the pool
    pub query_count: u32,
    /// Statistics gathered (pipeline-statistics pools only)
    pub pipeline_statistics: PipelineStatisticsFlags,
}

impl QueryPoolCreateInfo {
    /// Create info for an arbitrary query type
    pub const fn new(query_type: QueryType, query_count: u32) -> Self {
        Self {
            query_type,
            query_count,
            pipeline_statistics: PipelineStatisticsFlags::empty(),
        }
    }

    /// Timestamp pool
    pub const fn timestamps(query_count: u32) -> Self {
        Self::new(QueryType::Timestamp, query_count)
    }

    /// Occlusion pool
    pub const fn occlusion(query_count: u32) -> Self {
        Self::new(QueryType::Occlusion, query_count)
    }

    /// Pipeline-statistics pool
    pub const fn pipeline_statistics(query_count: u32, statistics: PipelineStatisticsFlags) -> Self {
        Self {
            query_type: QueryType::PipelineStatistics,
            query_count,
            pipeline_statistics: statistics,
        }
    }
}

// =============================================================================
// SAMPLE POOL CONFIGURATION
// =============================================================================

/// Timestamp sample buffer pool configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplePoolConfig {
    /// Samples held by each counter sample buffer
    pub samples_per_buffer: usize,
}

impl SamplePoolConfig {
    /// Counter buffers sized to a 32 KiB sample heap
    pub const DEFAULT_SAMPLES_PER_BUFFER: usize = 4096;

    /// Config with a custom buffer capacity
    pub const fn with_capacity(samples_per_buffer: usize) -> Self {
        Self { samples_per_buffer }
    }
}

impl Default for SamplePoolConfig {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_SAMPLES_PER_BUFFER)
    }
}

// =============================================================================
// DEVICE LIMITS
// =============================================================================

/// Device limits relevant to queries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Largest visibility buffer the device can address
    pub max_query_buffer_size: ByteSize,
    /// Largest buffer the device can allocate
    pub max_buffer_length: ByteSize,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_query_buffer_size: ByteSize::from_kib(256),
            max_buffer_length: ByteSize::from_mib(256),
        }
    }
}
