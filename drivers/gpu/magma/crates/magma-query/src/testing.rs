//! Host-memory device and encoder doubles for exercising pools end to end.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use magma_core::{Error, GpuAddr, Result};

use crate::buffer::{BufferBinding, DeviceBuffer};
use crate::config::{DeviceFeatures, DeviceLimits, QueryControlFlags};
use crate::copy::CopyResultsPass;
use crate::correlation::ClockRatio;
use crate::device::{QueryDevice, VisibilityArena};
use crate::encoder::CommandEncoder;
use crate::samples::{CounterSampleBuffer, SampleSlot, TimestampSamplePool};

const ARENA_BASE: u64 = 0x1000_0000;
const BUFFER_BASE: u64 = 0x4000_0000;
const TEMP_BASE: u64 = 0x8000_0000;

// =============================================================================
// TEST DEVICE
// =============================================================================

/// Scripted device backed by host memory
#[derive(Debug)]
pub(crate) struct TestDevice {
    features: DeviceFeatures,
    limits: DeviceLimits,
    arena: VisibilityArena,
    host_clock: AtomicU64,
    lost: AtomicBool,
    fail_buffers: AtomicBool,
    fail_counter_buffers: AtomicBool,
    counter_buffers: AtomicUsize,
    next_addr: AtomicU64,
}

impl Default for TestDevice {
    fn default() -> Self {
        let limits = DeviceLimits::default();
        Self {
            features: DeviceFeatures::empty(),
            limits,
            arena: VisibilityArena::new(GpuAddr::new(ARENA_BASE), limits.max_query_buffer_size),
            host_clock: AtomicU64::new(1_000_000),
            lost: AtomicBool::new(false),
            fail_buffers: AtomicBool::new(false),
            fail_counter_buffers: AtomicBool::new(false),
            counter_buffers: AtomicUsize::new(0),
            next_addr: AtomicU64::new(BUFFER_BASE),
        }
    }
}

impl TestDevice {
    pub(crate) fn with_features(mut self, features: DeviceFeatures) -> Self {
        self.features = features;
        self
    }

    pub(crate) fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self.arena = VisibilityArena::new(GpuAddr::new(ARENA_BASE), limits.max_query_buffer_size);
        self
    }

    pub(crate) fn set_host_clock(&self, ticks: u64) {
        self.host_clock.store(ticks, Ordering::SeqCst);
    }

    pub(crate) fn lose_device(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_buffers(&self, fail: bool) {
        self.fail_buffers.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_counter_buffers(&self, fail: bool) {
        self.fail_counter_buffers.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn counter_buffers_created(&self) -> usize {
        self.counter_buffers.load(Ordering::SeqCst)
    }
}

impl QueryDevice for TestDevice {
    fn features(&self) -> DeviceFeatures {
        self.features
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn configuration_result(&self) -> Result<()> {
        if self.lost.load(Ordering::SeqCst) {
            Err(Error::DeviceLost)
        } else {
            Ok(())
        }
    }

    fn host_clock_ticks(&self) -> u64 {
        self.host_clock.load(Ordering::SeqCst)
    }

    fn host_clock_ratio(&self) -> ClockRatio {
        ClockRatio::NANOSECONDS
    }

    fn visibility_arena(&self) -> &VisibilityArena {
        &self.arena
    }

    fn new_buffer(&self, len: usize) -> Result<DeviceBuffer> {
        if self.fail_buffers.load(Ordering::SeqCst) {
            return Err(Error::OutOfDeviceMemory);
        }
        let addr = self.next_addr.fetch_add((len as u64).next_multiple_of(0x1000), Ordering::SeqCst);
        Ok(DeviceBuffer::new(GpuAddr::new(addr), len))
    }

    fn new_counter_sample_buffer(&self, capacity: usize) -> Result<CounterSampleBuffer> {
        if self.fail_counter_buffers.load(Ordering::SeqCst) {
            return Err(Error::InitializationFailed);
        }
        self.counter_buffers.fetch_add(1, Ordering::SeqCst);
        Ok(CounterSampleBuffer::new(capacity))
    }
}

// =============================================================================
// RECORDING ENCODER
// =============================================================================

/// Command observed by a [`RecordingEncoder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EncodedCommand {
    BeginOcclusion { offset: u64, flags: QueryControlFlags },
    EndOcclusion { offset: u64 },
    Timestamp { index: Option<usize> },
    Copy { src_offset: u64, dst_offset: u64, len: u64 },
    Fill { offset: u64, len: u64, value: u8 },
    CopyResults { query_count: u32, availability: Vec<u32> },
}

/// Encoder that records commands and executes transfers immediately
#[derive(Debug, Default)]
pub(crate) struct RecordingEncoder {
    view_count: u32,
    samples: Option<TimestampSamplePool>,
    sampling_disabled: bool,
    slots: Vec<SampleSlot>,
    commands: Vec<EncodedCommand>,
    errors: Vec<Error>,
    temp_bytes: u64,
}

impl RecordingEncoder {
    /// Encoder capturing device timestamps into `samples`
    pub(crate) fn with_samples(samples: TimestampSamplePool) -> Self {
        Self {
            samples: Some(samples),
            ..Self::default()
        }
    }

    pub(crate) fn with_view_count(mut self, view_count: u32) -> Self {
        self.view_count = view_count;
        self
    }

    /// Stop capturing device timestamps
    pub(crate) fn disable_sampling(&mut self) {
        self.sampling_disabled = true;
    }

    /// Simulate the device writing the sample with logical index `index`
    pub(crate) fn write_sample(&self, index: usize, value: u64) {
        let slot = self
            .slots
            .iter()
            .rev()
            .find(|slot| slot.index == index)
            .expect("sample was captured");
        slot.buffer
            .as_ref()
            .expect("sample buffer allocated")
            .write_sample(slot.slot, value)
            .expect("slot in range");
    }

    pub(crate) fn samples_mut(&mut self) -> Option<&mut TimestampSamplePool> {
        self.samples.as_mut()
    }

    pub(crate) fn commands(&self) -> &[EncodedCommand] {
        &self.commands
    }

    pub(crate) fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub(crate) fn reported_errors(&self) -> &[Error] {
        &self.errors
    }
}

impl CommandEncoder for RecordingEncoder {
    fn view_count(&self) -> u32 {
        self.view_count
    }

    fn mark_timestamp(&mut self) -> Option<usize> {
        let index = match (&mut self.samples, self.sampling_disabled) {
            (Some(samples), false) => {
                let slot = samples.allocate_slot();
                let index = slot.index;
                self.slots.push(slot);
                Some(index)
            }
            _ => None,
        };
        self.commands.push(EncodedCommand::Timestamp { index });
        index
    }

    fn begin_occlusion_query(&mut self, slot: &BufferBinding, flags: QueryControlFlags) -> Result<()> {
        self.commands.push(EncodedCommand::BeginOcclusion {
            offset: slot.offset,
            flags,
        });
        Ok(())
    }

    fn end_occlusion_query(&mut self, slot: &BufferBinding) -> Result<()> {
        self.commands.push(EncodedCommand::EndOcclusion { offset: slot.offset });
        Ok(())
    }

    fn temp_buffer(&mut self, len: usize) -> Result<DeviceBuffer> {
        let addr = TEMP_BASE + self.temp_bytes;
        self.temp_bytes += (len as u64).next_multiple_of(256);
        Ok(DeviceBuffer::new(GpuAddr::new(addr), len))
    }

    fn copy_buffer(&mut self, src: &BufferBinding, dst: &BufferBinding, len: u64) -> Result<()> {
        dst.buffer
            .copy_from(&src.buffer, src.offset, dst.offset, len as usize)?;
        self.commands.push(EncodedCommand::Copy {
            src_offset: src.offset,
            dst_offset: dst.offset,
            len,
        });
        Ok(())
    }

    fn fill_buffer(&mut self, dst: &BufferBinding, len: u64, value: u8) -> Result<()> {
        dst.buffer.fill(dst.offset, len as usize, value)?;
        self.commands.push(EncodedCommand::Fill {
            offset: dst.offset,
            len,
            value,
        });
        Ok(())
    }

    fn dispatch_copy_results(&mut self, pass: CopyResultsPass) -> Result<()> {
        pass.execute()?;
        self.commands.push(EncodedCommand::CopyResults {
            query_count: pass.thread_count(),
            availability: pass.availability.to_vec(),
        });
        Ok(())
    }

    fn report_configuration_error(&mut self, error: Error) {
        self.errors.push(error);
    }
}
