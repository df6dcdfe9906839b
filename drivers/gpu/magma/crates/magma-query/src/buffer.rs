//! # Device Buffers
//!
//! Host-visible (shared storage) device buffers used as query result storage
//! and as copy destinations.

use std::sync::Arc;

use magma_core::{Error, GpuAddr, Result};

// =============================================================================
// DEVICE BUFFER
// =============================================================================

/// Shared-storage device buffer
///
/// Cloning yields another handle to the same memory. Contents are visible to
/// both the host and the device.
#[derive(Clone)]
pub struct DeviceBuffer {
    inner: Arc<BufferStorage>,
}

struct BufferStorage {
    addr: GpuAddr,
    bytes: spin::Mutex<Vec<u8>>,
}

impl DeviceBuffer {
    /// Create a zero-filled buffer mapped at `addr`
    pub fn new(addr: GpuAddr, len: usize) -> Self {
        Self {
            inner: Arc::new(BufferStorage {
                addr,
                bytes: spin::Mutex::new(vec![0; len]),
            }),
        }
    }

    /// Native handle (device address of byte 0)
    pub fn gpu_addr(&self) -> GpuAddr {
        self.inner.addr
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.inner.bytes.lock().len()
    }

    /// Check if the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if two handles refer to the same memory
    pub fn same_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copy `len` bytes starting at `offset`
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let bytes = self.inner.bytes.lock();
        let range = Self::range(offset, len, bytes.len())?;
        Ok(bytes[range].to_vec())
    }

    /// Read a native-endian `u64`, or 0 past the end
    pub fn read_u64(&self, offset: u64) -> u64 {
        let bytes = self.inner.bytes.lock();
        crate::layout::read_u64(&bytes, offset as usize)
    }

    /// Overwrite bytes starting at `offset`
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut bytes = self.inner.bytes.lock();
        let range = Self::range(offset, data.len(), bytes.len())?;
        bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Write a native-endian `u64` at `offset`
    pub fn write_u64(&self, offset: u64, value: u64) -> Result<()> {
        self.write(offset, bytemuck::bytes_of(&value))
    }

    /// Set `len` bytes starting at `offset` to `value`
    pub fn fill(&self, offset: u64, len: usize, value: u8) -> Result<()> {
        let mut bytes = self.inner.bytes.lock();
        let range = Self::range(offset, len, bytes.len())?;
        bytes[range].fill(value);
        Ok(())
    }

    /// Copy `len` bytes from `src` into this buffer
    pub fn copy_from(&self, src: &DeviceBuffer, src_offset: u64, dst_offset: u64, len: usize) -> Result<()> {
        // Read first so a copy within one buffer never holds its lock twice.
        let data = src.read(src_offset, len)?;
        self.write(dst_offset, &data)
    }

    /// Extend to `len` zeroed bytes in place
    ///
    /// Every handle sees the new length; existing contents are kept.
    pub(crate) fn grow(&self, len: usize) {
        let mut bytes = self.inner.bytes.lock();
        if len > bytes.len() {
            bytes.resize(len, 0);
        }
    }

    fn range(offset: u64, len: usize, total: usize) -> Result<core::ops::Range<usize>> {
        let start = usize::try_from(offset).map_err(|_| Error::BufferOverflow)?;
        let end = start.checked_add(len).ok_or(Error::BufferOverflow)?;
        if end > total {
            return Err(Error::BufferOverflow);
        }
        Ok(start..end)
    }
}

impl core::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("addr", &self.inner.addr)
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// BUFFER BINDING
// =============================================================================

/// Buffer plus base offset, as bound to copy and compute commands
#[derive(Clone, Debug)]
pub struct BufferBinding {
    /// Bound buffer
    pub buffer: DeviceBuffer,
    /// Base offset in bytes
    pub offset: u64,
}

impl BufferBinding {
    /// Bind `buffer` at `offset`
    pub fn new(buffer: DeviceBuffer, offset: u64) -> Self {
        Self { buffer, offset }
    }

    /// Same buffer, `bytes` further in
    pub fn advanced(&self, bytes: u64) -> Self {
        Self::new(self.buffer.clone(), self.offset + bytes)
    }

    /// Device address of the binding
    pub fn gpu_addr(&self) -> GpuAddr {
        self.buffer.gpu_addr() + self.offset
    }
}

static_assertions::assert_impl_all!(DeviceBuffer: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_and_bounds() {
        let buffer = DeviceBuffer::new(GpuAddr::new(0x4000), 16);
        buffer.write_u64(8, 0xDEAD_BEEF).expect("in range");
        assert_eq!(buffer.read_u64(8), 0xDEAD_BEEF);
        assert_eq!(buffer.write_u64(12, 1), Err(Error::BufferOverflow));
        assert_eq!(buffer.read(4, 16), Err(Error::BufferOverflow));
    }

    #[test]
    fn test_fill_touches_only_range() {
        let buffer = DeviceBuffer::new(GpuAddr::new(0x4000), 8);
        buffer.fill(0, 8, 0xFF).expect("in range");
        buffer.fill(2, 3, 0).expect("in range");
        assert_eq!(buffer.read(0, 8).expect("in range"), vec![0xFF, 0xFF, 0, 0, 0, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_copy_within_same_buffer() {
        let buffer = DeviceBuffer::new(GpuAddr::new(0x4000), 16);
        buffer.write_u64(0, 77).expect("in range");
        buffer.copy_from(&buffer.clone(), 0, 8, 8).expect("in range");
        assert_eq!(buffer.read_u64(8), 77);
    }

    #[test]
    fn test_grow_is_seen_by_every_handle() {
        let buffer = DeviceBuffer::new(GpuAddr::new(0x4000), 8);
        let other = buffer.clone();
        buffer.write_u64(0, 3).expect("in range");

        buffer.grow(24);
        assert_eq!(other.len(), 24);
        assert_eq!(other.read_u64(0), 3);
        assert_eq!(other.read_u64(16), 0);
        other.write_u64(16, 9).expect("grown range");
        assert_eq!(buffer.read_u64(16), 9);

        buffer.grow(8);
        assert_eq!(buffer.len(), 24);
    }

    #[test]
    fn test_binding_address() {
        let binding = BufferBinding::new(DeviceBuffer::new(GpuAddr::new(0x1000), 64), 16);
        assert_eq!(binding.advanced(8).gpu_addr(), GpuAddr::new(0x1018));
    }
}
