//! # Result Layout
//!
//! Typed addressing of query results inside caller-provided memory.
//!
//! Each query occupies one stride. Its `element_count` values come first,
//! followed by an optional availability word of the same width:
//!
//! ```text
//!  query i ── offset i × stride
//!  ┌─────────┬─────────┬─────┬──────────────┬ ─ ─ ─ ─ ┐
//!  │ value 0 │ value 1 │ ... │ availability │ padding │
//!  └─────────┴─────────┴─────┴──────────────┴ ─ ─ ─ ─ ┘
//!   width     width           width (optional)
//! ```

use magma_core::{Error, Result};

use crate::config::QueryResultFlags;

// =============================================================================
// RESULT WIDTH
// =============================================================================

/// Width of each written value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResultWidth {
    /// 32-bit values, truncated from the 64-bit result
    U32,
    /// 64-bit values
    U64,
}

impl ResultWidth {
    /// Width selected by `flags`
    #[inline]
    pub fn from_flags(flags: QueryResultFlags) -> Self {
        if flags.contains(QueryResultFlags::RESULT_64) {
            Self::U64
        } else {
            Self::U32
        }
    }

    /// Size in bytes
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }
}

// =============================================================================
// RESULT LAYOUT
// =============================================================================

/// Placement of per-query results within a byte range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResultLayout {
    /// Value width
    pub width: ResultWidth,
    /// Values per query
    pub element_count: u32,
    /// Bytes between consecutive queries
    pub stride: usize,
    /// Whether an availability word follows each query's values
    pub with_availability: bool,
}

impl ResultLayout {
    /// Layout described by result flags
    pub fn new(element_count: u32, stride: usize, flags: QueryResultFlags) -> Self {
        Self {
            width: ResultWidth::from_flags(flags),
            element_count,
            stride,
            with_availability: flags.contains(QueryResultFlags::WITH_AVAILABILITY),
        }
    }

    /// Bytes one query writes, availability word included
    #[inline]
    pub fn query_size(&self) -> usize {
        let words = self.element_count as usize + usize::from(self.with_availability);
        words * self.width.bytes()
    }

    /// Check if results are tightly packed 64-bit values without
    /// availability, i.e. a plain memory copy of the source produces them
    pub fn is_packed_u64(&self) -> bool {
        self.width == ResultWidth::U64
            && !self.with_availability
            && self.stride == self.element_count as usize * ResultWidth::U64.bytes()
    }

    /// Byte offset of `element` of the `index`-th query
    pub fn value_offset(&self, index: u32, element: u32, len: usize) -> Result<usize> {
        if element >= self.element_count {
            return Err(Error::InvalidParameter);
        }
        self.checked(index, element as usize * self.width.bytes(), len)
    }

    /// Byte offset of the availability word of the `index`-th query
    pub fn availability_offset(&self, index: u32, len: usize) -> Result<usize> {
        if !self.with_availability {
            return Err(Error::InvalidParameter);
        }
        self.checked(index, self.element_count as usize * self.width.bytes(), len)
    }

    fn checked(&self, index: u32, within: usize, len: usize) -> Result<usize> {
        let offset = (index as usize)
            .checked_mul(self.stride)
            .and_then(|base| base.checked_add(within))
            .ok_or(Error::BufferOverflow)?;
        match offset.checked_add(self.width.bytes()) {
            Some(end) if end <= len => Ok(offset),
            _ => Err(Error::BufferOverflow),
        }
    }
}

// =============================================================================
// RESULT WRITER
// =============================================================================

/// Writes values into a byte slice through a validated [`ResultLayout`]
#[derive(Debug)]
pub struct ResultWriter<'a> {
    data: &'a mut [u8],
    layout: ResultLayout,
}

impl<'a> ResultWriter<'a> {
    /// Wrap `data`
    pub fn new(data: &'a mut [u8], layout: ResultLayout) -> Self {
        Self { data, layout }
    }

    /// Layout in use
    pub fn layout(&self) -> &ResultLayout {
        &self.layout
    }

    /// Write the values of the `index`-th query
    ///
    /// `values` holds one entry per element; 32-bit layouts truncate.
    pub fn write_values(&mut self, index: u32, values: &[u64]) -> Result<()> {
        for (element, value) in values.iter().take(self.layout.element_count as usize).enumerate() {
            let offset = self.layout.value_offset(index, element as u32, self.data.len())?;
            self.put(offset, *value);
        }
        Ok(())
    }

    /// Write the availability word of the `index`-th query
    pub fn write_availability(&mut self, index: u32, available: bool) -> Result<()> {
        let offset = self.layout.availability_offset(index, self.data.len())?;
        self.put(offset, u64::from(available));
        Ok(())
    }

    fn put(&mut self, offset: usize, value: u64) {
        match self.layout.width {
            ResultWidth::U32 => {
                let word = value as u32;
                self.data[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(&word));
            }
            ResultWidth::U64 => {
                self.data[offset..offset + 8].copy_from_slice(bytemuck::bytes_of(&value));
            }
        }
    }
}

/// Read a native-endian `u64` at `offset`, or 0 if it does not fit
pub fn read_u64(data: &[u8], offset: usize) -> u64 {
    data.get(offset..offset + 8)
        .map(|bytes| {
            let mut word = 0u64;
            bytemuck::bytes_of_mut(&mut word).copy_from_slice(bytes);
            word
        })
        .unwrap_or(0)
}
