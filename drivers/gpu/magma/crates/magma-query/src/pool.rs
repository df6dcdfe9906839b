//! # Query Pool
//!
//! The shared lifecycle of every query type: availability tracking, host
//! reads, result copies and the deferred copy queue. Type-specific storage
//! lives behind [`PoolVariant`].
//!
//! ```text
//!   encoder thread                 completion thread          host thread
//!   ──────────────                 ─────────────────          ───────────
//!   begin_query ──► variant
//!   end_query   ──► variant
//!               ──► mark DeviceAvailable ┐
//!               ──► flush deferred ◄─────┘
//!                                  finish_queries
//!                                    ├► variant finalize
//!                                    └► Available + notify ──► get_results
//! ```
//!
//! Lock order: availability, then deferred queue, then variant storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use magma_core::{ConfigurationResult, Error, Result};

use crate::buffer::BufferBinding;
use crate::config::{QueryControlFlags, QueryPoolCreateInfo, QueryResultFlags, QueryType};
use crate::copy::{CopyResultsArgs, CopyResultsPass};
use crate::correlation::CorrelationMarker;
use crate::deferred::{DeferredCopy, DeferredCopyQueue};
use crate::device::QueryDevice;
use crate::encoder::CommandEncoder;
use crate::layout::{ResultLayout, ResultWriter};
use crate::occlusion::OcclusionStorage;
use crate::samples::TimestampSamplePool;
use crate::statistics::StatisticsStorage;
use crate::status::{AvailabilityGuard, AvailabilityTracker, QueryRange, QueryStatus};
use crate::timestamp::TimestampStorage;
use crate::unsupported::UnsupportedStorage;
use crate::variant::{PoolVariant, QueryStorage};

// =============================================================================
// RESULT STATUS
// =============================================================================

/// Outcome of a successful host read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsStatus {
    /// Every requested query wrote its values
    Complete,
    /// At least one query was not available and wrote nothing
    NotReady,
}

impl ResultsStatus {
    /// Check if every value was written
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Result copy statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Copies encoded as plain buffer transfers
    pub direct_copies: u64,
    /// Copies encoded as compute passes
    pub compute_copies: u64,
    /// Copies queued for later replay
    pub deferred_copies: u64,
    /// Queued copies replayed by `end_query`
    pub flushed_copies: u64,
}

#[derive(Debug, Default)]
struct CopyCounters {
    direct: AtomicU64,
    compute: AtomicU64,
    deferred: AtomicU64,
    flushed: AtomicU64,
}

impl CopyCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CopyStats {
        CopyStats {
            direct_copies: self.direct.load(Ordering::Relaxed),
            compute_copies: self.compute.load(Ordering::Relaxed),
            deferred_copies: self.deferred.load(Ordering::Relaxed),
            flushed_copies: self.flushed.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// QUERY POOL
// =============================================================================

/// Fixed-size pool of queries of one type
pub struct QueryPool {
    device: Arc<dyn QueryDevice>,
    query_type: QueryType,
    query_count: u32,
    availability: AvailabilityTracker,
    deferred: DeferredCopyQueue,
    configuration: ConfigurationResult,
    variant: PoolVariant,
    counters: CopyCounters,
}

impl QueryPool {
    /// Create a pool with every query `Initial`
    ///
    /// Creation never fails. Unsupported types, missing features and
    /// exhausted device budgets are recorded and returned by
    /// [`configuration_result`](Self::configuration_result) and every host
    /// read.
    pub fn new(device: Arc<dyn QueryDevice>, info: &QueryPoolCreateInfo) -> Self {
        let configuration = ConfigurationResult::new();
        let query_count = info.query_count;

        let variant = match info.query_type {
            QueryType::Timestamp => PoolVariant::Timestamp(TimestampStorage::new(Arc::clone(&device), query_count)),
            QueryType::Occlusion => {
                PoolVariant::Occlusion(OcclusionStorage::new(Arc::clone(&device), query_count, &configuration))
            }
            QueryType::PipelineStatistics => PoolVariant::PipelineStatistics(StatisticsStorage::new(
                &device,
                query_count,
                info.pipeline_statistics,
                &configuration,
            )),
            other => PoolVariant::Unsupported(UnsupportedStorage::new(other, &configuration)),
        };

        log::debug!(
            "Created {} query pool: {} queries, {} values each",
            info.query_type.name(),
            query_count,
            variant.storage().element_count()
        );

        Self {
            device,
            query_type: info.query_type,
            query_count,
            availability: AvailabilityTracker::new(query_count),
            deferred: DeferredCopyQueue::new(),
            configuration,
            variant,
            counters: CopyCounters::default(),
        }
    }

    /// Query type
    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// Number of queries
    pub fn query_count(&self) -> u32 {
        self.query_count
    }

    /// Values produced per query
    pub fn element_count(&self) -> u32 {
        self.storage().element_count()
    }

    /// Type-specific storage
    pub fn variant(&self) -> &PoolVariant {
        &self.variant
    }

    /// First configuration error recorded on this pool
    pub fn configuration_result(&self) -> Result<()> {
        self.configuration.get()
    }

    /// Current status of one query
    pub fn status(&self, query: u32) -> QueryStatus {
        self.availability.status(query)
    }

    /// Copies waiting in the deferred queue
    pub fn pending_copies(&self) -> usize {
        self.deferred.len()
    }

    /// Result copy statistics
    pub fn stats(&self) -> CopyStats {
        self.counters.snapshot()
    }

    #[inline]
    fn storage(&self) -> &dyn QueryStorage {
        self.variant.storage()
    }

    // =========================================================================
    // Recording
    // =========================================================================

    /// Start `query`
    pub fn begin_query(&self, query: u32, flags: QueryControlFlags, encoder: &mut dyn CommandEncoder) -> Result<()> {
        self.storage().begin_query(query, flags, encoder)
    }

    /// End `query` and replay deferred copies it completes
    ///
    /// In a multiview pass one query per view becomes device-available,
    /// starting at `query`; a view count of 0 counts as 1.
    pub fn end_query(&self, query: u32, encoder: &mut dyn CommandEncoder) -> Result<()> {
        self.storage().end_query(query, encoder)?;

        let views = encoder.view_count().max(1);
        let range = QueryRange::new(query, views.min(self.query_count.saturating_sub(query)));

        let mut availability = self.availability.lock();
        availability.mark_device_available(range);

        let flushed = self.deferred.flush_ready(&availability, |copy| {
            self.encode_copy_locked(
                &availability,
                encoder,
                copy.range,
                &copy.destination,
                copy.stride,
                copy.flags,
            )
        });
        CopyCounters::bump(&self.counters.flushed, flushed as u64);
        Ok(())
    }

    /// Reset `[first, first + count)` to `Initial` and clear stored values
    ///
    /// With an encoder the values are cleared on the device timeline,
    /// otherwise directly in mapped memory.
    pub fn reset_results(&self, first: u32, count: u32, encoder: Option<&mut dyn CommandEncoder>) -> Result<()> {
        let range = QueryRange::new(first, count);
        self.availability.reset(range);
        self.storage().reset_results(range, encoder)
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Finalize `queries` after the device retired the work producing them
    ///
    /// `samples` is the encoder's timestamp sample pool, if it captured any
    /// device timestamps. Waiters are woken once, after every status is
    /// updated.
    pub fn finish_queries(
        &self,
        queries: &[u32],
        marker: &CorrelationMarker,
        samples: Option<&mut TimestampSamplePool>,
    ) {
        self.storage().finish_queries(queries, marker, samples);
        self.availability.finish(queries);
    }

    /// Wake every blocked host reader so it observes a device failure
    pub fn abort_waits(&self) {
        log::warn!("Aborting host waits on {} query pool", self.query_type.name());
        self.availability.wake_all();
    }

    // =========================================================================
    // Host reads
    // =========================================================================

    /// Unrecoverable device error, if the device has hit one
    fn device_failure(&self) -> Option<Error> {
        self.device
            .configuration_result()
            .err()
            .filter(Error::is_device_failure)
    }

    /// Read results of `[first, first + count)` into `output`
    ///
    /// Query `i` of the range starts at `i * stride`. Values are written for
    /// available queries, or for every query under `PARTIAL`; availability
    /// words follow the values when `WITH_AVAILABILITY` is set. Under `WAIT`
    /// the call blocks until the range is available or the device fails.
    pub fn get_results(
        &self,
        first: u32,
        count: u32,
        output: &mut [u8],
        stride: usize,
        flags: QueryResultFlags,
    ) -> Result<ResultsStatus> {
        self.configuration.get()?;
        self.device.configuration_result()?;

        let range = QueryRange::new(first, count);
        let availability = if flags.contains(QueryResultFlags::WAIT) {
            self.availability
                .wait_host_available(range, || self.device_failure().is_some())
        } else {
            self.availability.lock()
        };
        if let Some(err) = self.device_failure() {
            log::warn!(
                "Abandoned wait on queries [{}, {}): {}",
                range.first,
                range.end(),
                err
            );
            return Err(err);
        }

        let element_count = self.element_count();
        let mut writer = ResultWriter::new(output, ResultLayout::new(element_count, stride, flags));
        let mut values = vec![0u64; element_count as usize];
        let mut status = ResultsStatus::Complete;

        for (index, query) in (range.first..range.end()).enumerate() {
            let index = index as u32;
            let available = availability.status(query) == QueryStatus::Available;

            if available || flags.contains(QueryResultFlags::PARTIAL) {
                values.fill(0);
                self.storage().read_result(query, &mut values);
                writer.write_values(index, &values)?;
            } else {
                status = ResultsStatus::NotReady;
            }
            if writer.layout().with_availability {
                writer.write_availability(index, available)?;
            }
        }

        Ok(status)
    }

    // =========================================================================
    // Device copies
    // =========================================================================

    /// Copy results to `destination` now, or queue the copy until every
    /// covered query is device-available
    pub fn copy_results(
        &self,
        encoder: &mut dyn CommandEncoder,
        first: u32,
        count: u32,
        destination: &BufferBinding,
        stride: u64,
        flags: QueryResultFlags,
    ) -> Result<()> {
        let range = QueryRange::new(first, count);
        let availability = self.availability.lock();
        if availability.are_device_available(range) {
            return self.encode_copy_locked(&availability, encoder, range, destination, stride, flags);
        }
        self.push_deferred(range, destination, stride, flags);
        Ok(())
    }

    /// Queue a copy without attempting it
    pub fn defer_copy_results(
        &self,
        first: u32,
        count: u32,
        destination: &BufferBinding,
        stride: u64,
        flags: QueryResultFlags,
    ) {
        // Keeps the availability-then-queue order of end_query.
        let _availability = self.availability.lock();
        self.push_deferred(QueryRange::new(first, count), destination, stride, flags);
    }

    /// Encode a copy of the current results, available or not
    pub fn encode_copy_results(
        &self,
        encoder: &mut dyn CommandEncoder,
        first: u32,
        count: u32,
        destination: &BufferBinding,
        stride: u64,
        flags: QueryResultFlags,
    ) -> Result<()> {
        let availability = self.availability.lock();
        self.encode_copy_locked(
            &availability,
            encoder,
            QueryRange::new(first, count),
            destination,
            stride,
            flags,
        )
    }

    fn push_deferred(&self, range: QueryRange, destination: &BufferBinding, stride: u64, flags: QueryResultFlags) {
        log::trace!("Deferring copy of queries [{}, {})", range.first, range.end());
        self.deferred.push(DeferredCopy {
            range,
            destination: destination.clone(),
            stride,
            flags,
        });
        CopyCounters::bump(&self.counters.deferred, 1);
    }

    fn encode_copy_locked(
        &self,
        availability: &AvailabilityGuard<'_>,
        encoder: &mut dyn CommandEncoder,
        range: QueryRange,
        destination: &BufferBinding,
        stride: u64,
        flags: QueryResultFlags,
    ) -> Result<()> {
        if range.count == 0 {
            return Ok(());
        }
        let element_count = self.element_count();
        let layout = ResultLayout::new(element_count, stride as usize, flags);

        if layout.is_packed_u64() && availability.are_device_available(range) {
            if let Some(source) = self.storage().result_buffer(range, encoder)? {
                let len = range.count as u64 * layout.query_size() as u64;
                encoder.copy_buffer(&source, destination, len)?;
                CopyCounters::bump(&self.counters.direct, 1);
                return Ok(());
            }
        }

        let pass = CopyResultsPass {
            source: self.storage().result_source(range, encoder)?,
            destination: destination.clone(),
            args: CopyResultsArgs::new(range.count, element_count, stride, flags),
            availability: availability.snapshot(range),
        };
        encoder.dispatch_copy_results(pass)?;
        CopyCounters::bump(&self.counters.compute, 1);
        Ok(())
    }
}

impl core::fmt::Debug for QueryPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueryPool")
            .field("query_type", &self.query_type)
            .field("query_count", &self.query_count)
            .field("variant", &self.variant)
            .field("pending_copies", &self.deferred.len())
            .field("configuration", &self.configuration.get())
            .finish()
    }
}

impl Drop for QueryPool {
    fn drop(&mut self) {
        let pending = self.deferred.len();
        if pending > 0 {
            log::trace!("Dropping {} deferred copies with their pool", pending);
        }
        log::debug!("Destroyed {} query pool", self.query_type.name());
    }
}

static_assertions::assert_impl_all!(QueryPool: Send, Sync);
