//! # Occlusion Queries
//!
//! Visibility results are 8-byte slots written by the device. A pool either
//! owns a dedicated buffer (large query pools) or holds an index range of
//! the device-wide visibility arena; in both cases query `q` lives at
//! `(index_offset + q) × 8`.

use std::sync::Arc;

use magma_core::{ConfigurationResult, Error, Result};

use crate::buffer::{BufferBinding, DeviceBuffer};
use crate::config::{DeviceFeatures, QueryControlFlags};
use crate::copy::ResultSource;
use crate::device::{QueryDevice, VISIBILITY_SLOT_SIZE};
use crate::encoder::CommandEncoder;
use crate::status::QueryRange;
use crate::variant::{QueryStorage, packed_bytes};

/// Backing memory of an occlusion pool
#[derive(Debug)]
pub enum VisibilityStore {
    /// Buffer owned by this pool alone
    Dedicated(DeviceBuffer),
    /// Range of the device visibility arena
    Shared,
}

/// Device-resident visibility slots
pub struct OcclusionStorage {
    device: Arc<dyn QueryDevice>,
    store: VisibilityStore,
    index_offset: u32,
    slot_count: u32,
}

impl OcclusionStorage {
    /// Create storage for `query_count` queries
    ///
    /// Requests beyond the device limits are clamped; the shortfall is
    /// recorded in `configuration` and the pool keeps working for the
    /// queries it has room for.
    pub fn new(device: Arc<dyn QueryDevice>, query_count: u32, configuration: &ConfigurationResult) -> Self {
        if device.features().contains(DeviceFeatures::LARGE_QUERY_POOLS) {
            if let Some(storage) = Self::dedicated(&device, query_count, configuration) {
                return storage;
            }
        }

        let reservation = device.visibility_arena().reserve(query_count);
        if let Some(err) = reservation.shortfall {
            configuration.record(err);
        }
        Self {
            device,
            store: VisibilityStore::Shared,
            index_offset: reservation.index_offset,
            slot_count: reservation.granted,
        }
    }

    fn dedicated(
        device: &Arc<dyn QueryDevice>,
        query_count: u32,
        configuration: &ConfigurationResult,
    ) -> Option<Self> {
        let max_slots = device
            .limits()
            .max_query_buffer_size
            .slots_of(VISIBILITY_SLOT_SIZE)
            .min(u32::MAX as u64) as u32;
        let slot_count = query_count.min(max_slots);

        let buffer = match device.new_buffer(slot_count as usize * VISIBILITY_SLOT_SIZE as usize) {
            Ok(buffer) => buffer,
            Err(err) => {
                log::warn!(
                    "no dedicated visibility buffer for {} queries ({}), using the shared arena",
                    query_count,
                    err
                );
                return None;
            }
        };
        if slot_count < query_count {
            configuration.record(Error::QueryBudgetExceeded { available: max_slots });
        }

        Some(Self {
            device: Arc::clone(device),
            store: VisibilityStore::Dedicated(buffer),
            index_offset: 0,
            slot_count,
        })
    }

    /// Backing memory kind
    pub fn store(&self) -> &VisibilityStore {
        &self.store
    }

    /// First slot owned by this pool within its buffer
    pub fn index_offset(&self) -> u32 {
        self.index_offset
    }

    /// Queries that actually have a slot
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    /// Byte offset of `query`'s slot
    pub fn slot_offset(&self, query: u32) -> u64 {
        (self.index_offset as u64 + query as u64) * VISIBILITY_SLOT_SIZE
    }

    /// Binding of `query`'s slot, `None` if the query has no slot
    ///
    /// Shared slots live in the arena's buffer, which grows in place, so a
    /// binding stays valid while other pools reserve ranges.
    pub fn slot(&self, query: u32) -> Option<BufferBinding> {
        if query >= self.slot_count {
            return None;
        }
        let buffer = match &self.store {
            VisibilityStore::Dedicated(buffer) => buffer.clone(),
            VisibilityStore::Shared => self.device.visibility_arena().buffer()?,
        };
        Some(BufferBinding::new(buffer, self.slot_offset(query)))
    }

    fn covers(&self, range: QueryRange) -> bool {
        range.end() <= self.slot_count
    }
}

impl QueryStorage for OcclusionStorage {
    fn element_count(&self) -> u32 {
        1
    }

    fn begin_query(&self, query: u32, flags: QueryControlFlags, encoder: &mut dyn CommandEncoder) -> Result<()> {
        let offset = self.slot_offset(query);
        let max_offset = self
            .device
            .limits()
            .max_query_buffer_size
            .as_bytes()
            .saturating_sub(VISIBILITY_SLOT_SIZE);

        let slot = match self.slot(query) {
            Some(slot) if offset <= max_offset => slot,
            _ => {
                let err = Error::QueryOffsetOutOfRange { offset, max_offset };
                log::error!("occlusion query {} not started: {}", query, err);
                encoder.report_configuration_error(err);
                return Ok(());
            }
        };

        let mut flags = flags;
        if flags.contains(QueryControlFlags::PRECISE)
            && !self.device.features().contains(DeviceFeatures::OCCLUSION_QUERY_PRECISE)
        {
            log::warn!("occlusion query {} started without PRECISE", query);
            encoder.report_configuration_error(Error::FeatureNotPresent);
            flags.remove(QueryControlFlags::PRECISE);
        }
        encoder.begin_occlusion_query(&slot, flags)
    }

    fn end_query(&self, query: u32, encoder: &mut dyn CommandEncoder) -> Result<()> {
        match self.slot(query) {
            Some(slot) => encoder.end_occlusion_query(&slot),
            None => Ok(()),
        }
    }

    fn read_result(&self, query: u32, values: &mut [u64]) {
        if let (Some(value), Some(slot)) = (values.first_mut(), self.slot(query)) {
            *value = slot.buffer.read_u64(slot.offset);
        }
    }

    fn result_buffer(&self, range: QueryRange, _encoder: &mut dyn CommandEncoder) -> Result<Option<BufferBinding>> {
        if !self.covers(range) {
            return Ok(None);
        }
        Ok(self.slot(range.first))
    }

    fn result_source(&self, range: QueryRange, _encoder: &mut dyn CommandEncoder) -> Result<ResultSource> {
        if self.covers(range) {
            if let Some(slot) = self.slot(range.first) {
                return Ok(ResultSource::Buffer(slot));
            }
        }

        // Queries without a slot read as zero.
        let values: Vec<u64> = (range.first..range.end())
            .map(|query| {
                let mut value = [0];
                self.read_result(query, &mut value);
                value[0]
            })
            .collect();
        Ok(ResultSource::Bytes(packed_bytes(&values).into()))
    }

    fn reset_results(&self, range: QueryRange, encoder: Option<&mut dyn CommandEncoder>) -> Result<()> {
        let end = range.end().min(self.slot_count);
        if range.first >= end {
            return Ok(());
        }
        let Some(slot) = self.slot(range.first) else {
            return Ok(());
        };
        let len = (end - range.first) as u64 * VISIBILITY_SLOT_SIZE;

        match encoder {
            Some(encoder) => encoder.fill_buffer(&slot, len, 0),
            None => slot.buffer.fill(slot.offset, len as usize, 0),
        }
    }
}

impl core::fmt::Debug for OcclusionStorage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OcclusionStorage")
            .field("store", &self.store)
            .field("index_offset", &self.index_offset)
            .field("slot_count", &self.slot_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceLimits;
    use crate::testing::{EncodedCommand, RecordingEncoder, TestDevice};
    use magma_core::ByteSize;

    fn large_pool_device(max_query_buffer_size: ByteSize) -> Arc<TestDevice> {
        Arc::new(
            TestDevice::default()
                .with_features(DeviceFeatures::LARGE_QUERY_POOLS)
                .with_limits(DeviceLimits {
                    max_query_buffer_size,
                    ..DeviceLimits::default()
                }),
        )
    }

    #[test]
    fn test_shared_pools_get_disjoint_slots() {
        let device = Arc::new(TestDevice::default());
        let config = ConfigurationResult::new();
        let a = OcclusionStorage::new(device.clone(), 4, &config);
        let b = OcclusionStorage::new(device.clone(), 2, &config);

        assert!(matches!(a.store(), VisibilityStore::Shared));
        assert_eq!(b.index_offset(), 4);
        assert_eq!(b.slot_offset(1), 40);
        assert!(config.get().is_ok());
    }

    #[test]
    fn test_dedicated_pool_clamped_to_limit() {
        let device = large_pool_device(ByteSize::from_bytes(32));
        let config = ConfigurationResult::new();
        let storage = OcclusionStorage::new(device, 10, &config);

        assert!(matches!(storage.store(), VisibilityStore::Dedicated(_)));
        assert_eq!(storage.slot_count(), 4);
        assert_eq!(config.get(), Err(Error::QueryBudgetExceeded { available: 4 }));
    }

    #[test]
    fn test_begin_out_of_range_reports_to_encoder() {
        let device = large_pool_device(ByteSize::from_bytes(32));
        let config = ConfigurationResult::new();
        let storage = OcclusionStorage::new(device, 10, &config);
        let mut encoder = RecordingEncoder::default();

        storage.begin_query(3, QueryControlFlags::empty(), &mut encoder).expect("begin");
        storage.begin_query(4, QueryControlFlags::empty(), &mut encoder).expect("begin");

        assert_eq!(encoder.reported_errors(), &[Error::QueryOffsetOutOfRange {
            offset: 32,
            max_offset: 24
        }]);
        assert!(matches!(
            encoder.commands(),
            [EncodedCommand::BeginOcclusion { offset: 24, .. }]
        ));
    }

    #[test]
    fn test_precise_needs_device_feature() {
        let device = Arc::new(TestDevice::default());
        let storage = OcclusionStorage::new(device, 2, &ConfigurationResult::new());
        let mut encoder = RecordingEncoder::default();

        storage.begin_query(0, QueryControlFlags::PRECISE, &mut encoder).expect("begin");

        assert_eq!(encoder.reported_errors(), &[Error::FeatureNotPresent]);
        assert_eq!(encoder.commands(), &[EncodedCommand::BeginOcclusion {
            offset: 0,
            flags: QueryControlFlags::empty()
        }]);
    }

    #[test]
    fn test_precise_kept_when_supported() {
        let device = Arc::new(TestDevice::default().with_features(DeviceFeatures::OCCLUSION_QUERY_PRECISE));
        let storage = OcclusionStorage::new(device, 2, &ConfigurationResult::new());
        let mut encoder = RecordingEncoder::default();

        storage.begin_query(1, QueryControlFlags::PRECISE, &mut encoder).expect("begin");

        assert!(encoder.reported_errors().is_empty());
        assert_eq!(encoder.commands(), &[EncodedCommand::BeginOcclusion {
            offset: 8,
            flags: QueryControlFlags::PRECISE
        }]);
    }

    #[test]
    fn test_host_reset_zeroes_only_range() {
        let device = Arc::new(TestDevice::default());
        let storage = OcclusionStorage::new(device, 4, &ConfigurationResult::new());
        for query in 0..4 {
            let slot = storage.slot(query).expect("slot");
            slot.buffer.write_u64(slot.offset, 100 + query as u64).expect("in range");
        }

        storage.reset_results(QueryRange::new(0, 2), None).expect("reset");

        let mut values = [0];
        storage.read_result(1, &mut values);
        assert_eq!(values[0], 0);
        storage.read_result(2, &mut values);
        assert_eq!(values[0], 102);
        storage.read_result(3, &mut values);
        assert_eq!(values[0], 103);
    }

    #[test]
    fn test_device_reset_encodes_fill() {
        let device = Arc::new(TestDevice::default());
        let storage = OcclusionStorage::new(device, 4, &ConfigurationResult::new());
        let mut encoder = RecordingEncoder::default();

        storage
            .reset_results(QueryRange::new(1, 8), Some(&mut encoder))
            .expect("reset");
        assert!(matches!(
            encoder.commands(),
            [EncodedCommand::Fill { offset: 8, len: 24, value: 0 }]
        ));
    }

    #[test]
    fn test_slots_survive_arena_growth() {
        let device = Arc::new(TestDevice::default());
        let storage = OcclusionStorage::new(device.clone(), 2, &ConfigurationResult::new());
        let slot = storage.slot(1).expect("slot");
        slot.buffer.write_u64(slot.offset, 77).expect("in range");

        let _other = OcclusionStorage::new(device, 16, &ConfigurationResult::new());
        let mut values = [0];
        storage.read_result(1, &mut values);
        assert_eq!(values[0], 77);
    }

    #[test]
    fn test_begun_binding_written_after_another_pool_reserves() {
        let device = Arc::new(TestDevice::default());
        let a = OcclusionStorage::new(device.clone(), 2, &ConfigurationResult::new());
        let mut encoder = RecordingEncoder::default();
        a.begin_query(0, QueryControlFlags::empty(), &mut encoder).expect("begin");
        let binding = a.slot(0).expect("slot");

        let b = OcclusionStorage::new(device, 4, &ConfigurationResult::new());
        assert_eq!(b.index_offset(), 2);
        binding.buffer.write_u64(binding.offset, 42).expect("in range");

        let mut values = [0];
        a.read_result(0, &mut values);
        assert_eq!(values[0], 42);
    }
}
