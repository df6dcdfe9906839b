//! # Result Copy Passes
//!
//! Device-side copies of query results into arbitrary destination buffers.
//!
//! Two paths exist:
//!
//! - **Direct**: tightly packed 64-bit results without availability words,
//!   every query already device-available. A plain copy-engine transfer.
//! - **Compute**: one invocation per query applying the partial,
//!   availability, width and stride rules. It reads a snapshot of the
//!   availability array taken under the availability lock, since the pass
//!   runs on another engine and must not take that lock.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use magma_core::Result;

use crate::buffer::BufferBinding;
use crate::config::QueryResultFlags;
use crate::layout::{self, ResultLayout, ResultWriter};
use crate::status::QueryStatus;

// =============================================================================
// ARGUMENTS
// =============================================================================

/// Constant arguments of the copy pass, bound as raw compute bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct CopyResultsArgs {
    /// Destination bytes between queries
    pub stride: u64,
    /// Queries to copy (one invocation each)
    pub query_count: u32,
    /// Raw [`QueryResultFlags`] bits
    pub flags: u32,
    /// Values per query
    pub element_count: u32,
    /// Keeps the block 8-byte aligned
    pub reserved: u32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<CopyResultsArgs>(), 24);

impl CopyResultsArgs {
    /// Argument block for a copy
    pub fn new(query_count: u32, element_count: u32, stride: u64, flags: QueryResultFlags) -> Self {
        Self {
            stride,
            query_count,
            flags: flags.bits(),
            element_count,
            reserved: 0,
        }
    }

    /// Flags as a typed set
    pub fn result_flags(&self) -> QueryResultFlags {
        QueryResultFlags::from_bits_truncate(self.flags)
    }
}

// =============================================================================
// RESULT SOURCE
// =============================================================================

/// Where a copy pass reads packed 64-bit source results from
#[derive(Clone, Debug)]
pub enum ResultSource {
    /// Device buffer, first covered query at the binding offset
    Buffer(BufferBinding),
    /// Inline bytes uploaded with the pass
    Bytes(Arc<[u8]>),
}

impl ResultSource {
    /// Source value `element` of the `index`-th covered query
    pub fn value(&self, index: u32, element: u32, element_count: u32) -> u64 {
        let offset = (index as u64 * element_count as u64 + element as u64) * 8;
        match self {
            Self::Buffer(binding) => binding.buffer.read_u64(binding.offset + offset),
            Self::Bytes(bytes) => layout::read_u64(bytes, offset as usize),
        }
    }
}

// =============================================================================
// COPY PASS
// =============================================================================

/// Fully described per-query result copy
#[derive(Clone, Debug)]
pub struct CopyResultsPass {
    /// Packed source results
    pub source: ResultSource,
    /// Destination of the first covered query
    pub destination: BufferBinding,
    /// Constant arguments
    pub args: CopyResultsArgs,
    /// Raw [`QueryStatus`] words of the covered queries
    pub availability: Arc<[u32]>,
}

impl CopyResultsPass {
    /// Invocations to dispatch
    pub fn thread_count(&self) -> u32 {
        self.args.query_count
    }

    /// Argument block as bytes
    pub fn args_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.args)
    }

    /// Availability snapshot as bytes
    pub fn availability_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.availability[..])
    }

    /// Run the pass on the host
    ///
    /// A query counts as available once the device wrote it. Values of
    /// unavailable queries are only written under `PARTIAL`; bytes the pass
    /// does not write keep their previous contents.
    pub fn execute(&self) -> Result<()> {
        let args = self.args;
        if args.query_count == 0 {
            return Ok(());
        }

        let flags = args.result_flags();
        let result_layout = ResultLayout::new(args.element_count, args.stride as usize, flags);
        let window = (args.query_count as usize - 1) * result_layout.stride + result_layout.query_size();
        let dst = &self.destination;

        let mut bytes = dst.buffer.read(dst.offset, window)?;
        let mut writer = ResultWriter::new(&mut bytes, result_layout);
        let mut values = vec![0u64; args.element_count as usize];

        for index in 0..args.query_count {
            let status = self
                .availability
                .get(index as usize)
                .copied()
                .unwrap_or(QueryStatus::Initial.as_raw());
            let available = status != QueryStatus::Initial.as_raw();

            if available || flags.contains(QueryResultFlags::PARTIAL) {
                for (element, value) in values.iter_mut().enumerate() {
                    *value = self.source.value(index, element as u32, args.element_count);
                }
                writer.write_values(index, &values)?;
            }
            if result_layout.with_availability {
                writer.write_availability(index, available)?;
            }
        }

        dst.buffer.write(dst.offset, &bytes)
    }
}
