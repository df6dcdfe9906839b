//! Pools for query types the device cannot answer. Creation records
//! `NotSupported`; every operation afterwards is a no-op.

use magma_core::{ConfigurationResult, Error, Result};

use crate::buffer::BufferBinding;
use crate::config::{QueryControlFlags, QueryType};
use crate::copy::ResultSource;
use crate::encoder::CommandEncoder;
use crate::status::QueryRange;
use crate::variant::{QueryStorage, packed_bytes};

/// Storage of a pool whose query type is not supported
#[derive(Debug)]
pub struct UnsupportedStorage {
    query_type: QueryType,
}

impl UnsupportedStorage {
    /// Create an inert pool, recording why it is unusable
    pub fn new(query_type: QueryType, configuration: &ConfigurationResult) -> Self {
        log::error!("{} queries are not supported", query_type.name());
        configuration.record(Error::NotSupported);
        Self { query_type }
    }

    /// Requested query type
    pub fn query_type(&self) -> QueryType {
        self.query_type
    }
}

impl QueryStorage for UnsupportedStorage {
    fn element_count(&self) -> u32 {
        1
    }

    fn begin_query(&self, _query: u32, _flags: QueryControlFlags, _encoder: &mut dyn CommandEncoder) -> Result<()> {
        Ok(())
    }

    fn end_query(&self, _query: u32, _encoder: &mut dyn CommandEncoder) -> Result<()> {
        Ok(())
    }

    fn read_result(&self, _query: u32, values: &mut [u64]) {
        values.fill(0);
    }

    fn result_buffer(&self, _range: QueryRange, _encoder: &mut dyn CommandEncoder) -> Result<Option<BufferBinding>> {
        Ok(None)
    }

    fn result_source(&self, range: QueryRange, _encoder: &mut dyn CommandEncoder) -> Result<ResultSource> {
        Ok(ResultSource::Bytes(packed_bytes(&vec![0; range.count as usize]).into()))
    }

    fn reset_results(&self, _range: QueryRange, _encoder: Option<&mut dyn CommandEncoder>) -> Result<()> {
        Ok(())
    }
}
