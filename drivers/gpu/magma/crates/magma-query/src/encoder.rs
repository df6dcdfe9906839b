//! # Command Encoder Capabilities
//!
//! The command-recording layer that drives query pools. Pools never build
//! commands themselves; they ask the encoder to start and stop counters, mark
//! timestamps and encode copy, fill and compute work.

use magma_core::{Error, Result};

use crate::buffer::{BufferBinding, DeviceBuffer};
use crate::config::QueryControlFlags;
use crate::copy::CopyResultsPass;

/// Encoder services consumed by query pools
pub trait CommandEncoder {
    /// Views rendered by the active subpass in the current pass
    ///
    /// Outside a multiview render pass this is 1 (or 0, which pools treat
    /// as 1).
    fn view_count(&self) -> u32;

    /// Capture a device timestamp
    ///
    /// Returns the logical sample index of the capture, or `None` when no
    /// device sample was taken (empty or aborted command range, no counter
    /// sampling support).
    fn mark_timestamp(&mut self) -> Option<usize>;

    /// Start visibility counting into `slot`
    fn begin_occlusion_query(&mut self, slot: &BufferBinding, flags: QueryControlFlags) -> Result<()>;

    /// Stop visibility counting into `slot`
    fn end_occlusion_query(&mut self, slot: &BufferBinding) -> Result<()>;

    /// Scratch buffer living until the command buffer completes
    fn temp_buffer(&mut self, len: usize) -> Result<DeviceBuffer>;

    /// Encode a plain memory-to-memory copy on the copy engine
    fn copy_buffer(&mut self, src: &BufferBinding, dst: &BufferBinding, len: u64) -> Result<()>;

    /// Encode a byte fill on the copy engine
    fn fill_buffer(&mut self, dst: &BufferBinding, len: u64, value: u8) -> Result<()>;

    /// Encode the per-query result copy compute pass
    fn dispatch_copy_results(&mut self, pass: CopyResultsPass) -> Result<()>;

    /// Attach a non-fatal configuration error to the command buffer
    fn report_configuration_error(&mut self, error: Error);
}
