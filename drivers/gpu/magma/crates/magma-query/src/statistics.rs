//! # Pipeline-Statistics Queries
//!
//! One value per requested statistic. The device never produces them, so
//! pools on devices with the feature hold zeroed host storage and pools on
//! devices without it are inert.

use std::sync::Arc;

use magma_core::{ConfigurationResult, Error, Result};

use crate::buffer::BufferBinding;
use crate::config::{DeviceFeatures, PipelineStatisticsFlags, QueryControlFlags};
use crate::copy::ResultSource;
use crate::device::QueryDevice;
use crate::encoder::CommandEncoder;
use crate::status::QueryRange;
use crate::variant::{QueryStorage, packed_bytes};

/// Host-resident pipeline-statistics storage
#[derive(Debug)]
pub struct StatisticsStorage {
    statistics: PipelineStatisticsFlags,
    element_count: u32,
    supported: bool,
    values: spin::Mutex<Vec<u64>>,
}

impl StatisticsStorage {
    /// Create storage for `query_count` queries gathering `statistics`
    pub fn new(
        device: &Arc<dyn QueryDevice>,
        query_count: u32,
        statistics: PipelineStatisticsFlags,
        configuration: &ConfigurationResult,
    ) -> Self {
        let element_count = statistics.bits().count_ones().max(1);
        let supported = device.features().contains(DeviceFeatures::PIPELINE_STATISTICS_QUERY);

        let values = if supported {
            vec![0; query_count as usize * element_count as usize]
        } else {
            configuration.record(Error::FeatureNotPresent);
            Vec::new()
        };

        Self {
            statistics,
            element_count,
            supported,
            values: spin::Mutex::new(values),
        }
    }

    /// Statistics gathered per query
    pub fn statistics(&self) -> PipelineStatisticsFlags {
        self.statistics
    }

    /// Check if the device supports these queries
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    fn values(&self, range: QueryRange) -> Vec<u64> {
        let per_query = self.element_count as usize;
        let stored = self.values.lock();
        let start = range.first as usize * per_query;
        let len = range.count as usize * per_query;
        (start..start + len)
            .map(|index| stored.get(index).copied().unwrap_or(0))
            .collect()
    }
}

impl QueryStorage for StatisticsStorage {
    fn element_count(&self) -> u32 {
        self.element_count
    }

    fn begin_query(&self, _query: u32, _flags: QueryControlFlags, _encoder: &mut dyn CommandEncoder) -> Result<()> {
        Ok(())
    }

    fn end_query(&self, _query: u32, _encoder: &mut dyn CommandEncoder) -> Result<()> {
        Ok(())
    }

    fn read_result(&self, query: u32, values: &mut [u64]) {
        let stored = self.values(QueryRange::single(query));
        for (value, stored) in values.iter_mut().zip(stored) {
            *value = stored;
        }
    }

    fn result_buffer(&self, range: QueryRange, encoder: &mut dyn CommandEncoder) -> Result<Option<BufferBinding>> {
        if !self.supported {
            return Ok(None);
        }
        let bytes = packed_bytes(&self.values(range));
        let scratch = encoder.temp_buffer(bytes.len())?;
        scratch.write(0, &bytes)?;
        Ok(Some(BufferBinding::new(scratch, 0)))
    }

    fn result_source(&self, range: QueryRange, _encoder: &mut dyn CommandEncoder) -> Result<ResultSource> {
        Ok(ResultSource::Bytes(packed_bytes(&self.values(range)).into()))
    }

    fn reset_results(&self, range: QueryRange, _encoder: Option<&mut dyn CommandEncoder>) -> Result<()> {
        let per_query = self.element_count as usize;
        let mut stored = self.values.lock();
        let end = (range.end() as usize * per_query).min(stored.len());
        let start = (range.first as usize * per_query).min(end);
        stored[start..end].fill(0);
        Ok(())
    }
}
