//! # Timestamp Queries
//!
//! Each query holds one host-domain nanosecond value. `end_query` only
//! remembers which device sample the encoder captured; conversion happens
//! when the command buffer completes, using the correlation marker taken
//! around its execution.
//!
//! | captured sample          | finished value                     |
//! |--------------------------|------------------------------------|
//! | written by the device    | correlated host nanoseconds        |
//! | allocated, never written | 0                                  |
//! | none (no device capture) | host clock at completion           |

use std::sync::Arc;

use magma_core::Result;

use crate::buffer::BufferBinding;
use crate::config::QueryControlFlags;
use crate::copy::ResultSource;
use crate::correlation::CorrelationMarker;
use crate::device::QueryDevice;
use crate::encoder::CommandEncoder;
use crate::samples::TimestampSamplePool;
use crate::status::QueryRange;
use crate::variant::{QueryStorage, packed_bytes};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct TimestampEntry {
    nanos: u64,
    sample: Option<usize>,
}

/// Host-resident timestamp storage
pub struct TimestampStorage {
    device: Arc<dyn QueryDevice>,
    entries: spin::Mutex<Vec<TimestampEntry>>,
}

impl TimestampStorage {
    /// Create zeroed storage for `query_count` queries
    pub fn new(device: Arc<dyn QueryDevice>, query_count: u32) -> Self {
        Self {
            device,
            entries: spin::Mutex::new(vec![TimestampEntry::default(); query_count as usize]),
        }
    }

    /// Sample index captured for `query` by its last `end_query`
    pub fn sample_index(&self, query: u32) -> Option<usize> {
        self.entries.lock().get(query as usize).and_then(|entry| entry.sample)
    }

    fn values(&self, range: QueryRange) -> Vec<u64> {
        let entries = self.entries.lock();
        range
            .indices()
            .map(|index| entries.get(index).map_or(0, |entry| entry.nanos))
            .collect()
    }
}

impl QueryStorage for TimestampStorage {
    fn element_count(&self) -> u32 {
        1
    }

    fn begin_query(&self, _query: u32, _flags: QueryControlFlags, _encoder: &mut dyn CommandEncoder) -> Result<()> {
        Ok(())
    }

    fn end_query(&self, query: u32, encoder: &mut dyn CommandEncoder) -> Result<()> {
        let sample = encoder.mark_timestamp();
        if let Some(entry) = self.entries.lock().get_mut(query as usize) {
            entry.sample = sample;
        }
        Ok(())
    }

    fn finish_queries(&self, queries: &[u32], marker: &CorrelationMarker, samples: Option<&mut TimestampSamplePool>) {
        let samples = samples.map(|pool| {
            pool.resolve();
            &*pool
        });
        let ratio = self.device.host_clock_ratio();

        let mut entries = self.entries.lock();
        for &query in queries {
            let Some(entry) = entries.get_mut(query as usize) else {
                continue;
            };
            entry.nanos = match (entry.sample, samples) {
                (None, _) => self.device.host_clock_nanos(),
                (Some(index), Some(pool)) if pool.was_sampled(index) => {
                    marker.host_nanos(pool.timestamp(index), ratio)
                }
                (Some(_), _) => 0,
            };
        }
    }

    fn read_result(&self, query: u32, values: &mut [u64]) {
        if let (Some(slot), Some(entry)) = (values.first_mut(), self.entries.lock().get(query as usize)) {
            *slot = entry.nanos;
        }
    }

    fn result_buffer(&self, range: QueryRange, encoder: &mut dyn CommandEncoder) -> Result<Option<BufferBinding>> {
        let bytes = packed_bytes(&self.values(range));
        let scratch = encoder.temp_buffer(bytes.len())?;
        scratch.write(0, &bytes)?;
        Ok(Some(BufferBinding::new(scratch, 0)))
    }

    fn result_source(&self, range: QueryRange, _encoder: &mut dyn CommandEncoder) -> Result<ResultSource> {
        Ok(ResultSource::Bytes(packed_bytes(&self.values(range)).into()))
    }

    fn reset_results(&self, range: QueryRange, _encoder: Option<&mut dyn CommandEncoder>) -> Result<()> {
        let mut entries = self.entries.lock();
        let end = (range.end() as usize).min(entries.len());
        let start = (range.first as usize).min(end);
        entries[start..end].fill(TimestampEntry::default());
        Ok(())
    }
}

impl core::fmt::Debug for TimestampStorage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimestampStorage")
            .field("queries", &self.entries.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplePoolConfig;
    use crate::testing::{RecordingEncoder, TestDevice};

    fn setup(query_count: u32) -> (Arc<TestDevice>, TimestampStorage, RecordingEncoder) {
        let device = Arc::new(TestDevice::default());
        let storage = TimestampStorage::new(device.clone(), query_count);
        let encoder = RecordingEncoder::with_samples(TimestampSamplePool::new(
            device.clone(),
            SamplePoolConfig::with_capacity(8),
        ));
        (device, storage, encoder)
    }

    fn read(storage: &TimestampStorage, query: u32) -> u64 {
        let mut values = [u64::MAX];
        storage.read_result(query, &mut values);
        values[0]
    }

    #[test]
    fn test_finish_converts_samples() {
        let (device, storage, mut encoder) = setup(4);
        device.set_host_clock(7_000);

        for query in 0..3 {
            storage.end_query(query, &mut encoder).expect("end");
        }
        encoder.write_sample(0, 1_000);
        encoder.write_sample(1, 1_050);
        // Sample 2 never written; query 3 is ended without a device capture.
        encoder.disable_sampling();
        storage.end_query(3, &mut encoder).expect("end");

        let marker = CorrelationMarker::new(100, 200, 1_000, 1_100);
        storage.finish_queries(&[0, 1, 2, 3], &marker, encoder.samples_mut());

        assert_eq!(read(&storage, 0), 100);
        assert_eq!(read(&storage, 1), 150);
        assert_eq!(read(&storage, 2), 0);
        assert_eq!(read(&storage, 3), 7_000);
    }

    #[test]
    fn test_unfinished_queries_keep_values() {
        let (_device, storage, mut encoder) = setup(2);
        storage.end_query(0, &mut encoder).expect("end");
        storage.end_query(1, &mut encoder).expect("end");
        encoder.write_sample(0, 500);
        encoder.write_sample(1, 600);

        let marker = CorrelationMarker::new(0, 100, 500, 600);
        storage.finish_queries(&[1], &marker, encoder.samples_mut());
        assert_eq!(read(&storage, 0), 0);
        assert_eq!(read(&storage, 1), 100);
    }

    #[test]
    fn test_reset_clears_range() {
        let (device, storage, mut encoder) = setup(3);
        device.set_host_clock(42);
        encoder.disable_sampling();
        for query in 0..3 {
            storage.end_query(query, &mut encoder).expect("end");
        }
        storage.finish_queries(&[0, 1, 2], &CorrelationMarker::default(), None);

        storage.reset_results(QueryRange::new(1, 5), None).expect("reset");
        assert_eq!(read(&storage, 0), 42);
        assert_eq!(read(&storage, 1), 0);
        assert_eq!(read(&storage, 2), 0);
        assert_eq!(storage.sample_index(1), None);
    }

    #[test]
    fn test_result_buffer_is_packed() {
        let (device, storage, mut encoder) = setup(2);
        device.set_host_clock(9);
        encoder.disable_sampling();
        storage.end_query(1, &mut encoder).expect("end");
        storage.finish_queries(&[1], &CorrelationMarker::default(), None);

        let binding = storage
            .result_buffer(QueryRange::new(0, 2), &mut encoder)
            .expect("scratch")
            .expect("host results");
        assert_eq!(binding.buffer.len(), 16);
        assert_eq!(binding.buffer.read_u64(0), 0);
        assert_eq!(binding.buffer.read_u64(8), 9);
    }
}
