//! # GPU–CPU Time Correlation
//!
//! Maps device-clock timestamps onto the host clock using a pair of
//! bracketing samples taken from both clocks.
//!
//! ```text
//!  gpu:  gpu_start ────────── t ──────────────── gpu_end
//!                 fraction = (t - gpu_start) / (gpu_end - gpu_start)
//!  cpu:  cpu_start ────────── ▼ ──────────────── cpu_end
//!                 host = cpu_start + fraction × (cpu_end - cpu_start)
//! ```

// =============================================================================
// CLOCK RATIO
// =============================================================================

/// Host clock tick to nanosecond ratio (`ns = ticks × numer / denom`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClockRatio {
    /// Numerator
    pub numer: u32,
    /// Denominator
    pub denom: u32,
}

impl ClockRatio {
    /// Host clock already counts nanoseconds
    pub const NANOSECONDS: Self = Self::new(1, 1);

    /// Create a ratio
    pub const fn new(numer: u32, denom: u32) -> Self {
        Self { numer, denom }
    }

    /// Convert host ticks to nanoseconds
    #[inline]
    pub const fn to_nanos(self, ticks: u64) -> u64 {
        if self.denom == 0 {
            return 0;
        }
        let ns = ticks as u128 * self.numer as u128 / self.denom as u128;
        if ns > u64::MAX as u128 { u64::MAX } else { ns as u64 }
    }
}

impl Default for ClockRatio {
    fn default() -> Self {
        Self::NANOSECONDS
    }
}

// =============================================================================
// CORRELATION MARKER
// =============================================================================

/// Paired device and host clock samples bracketing a batch of work
///
/// Captured once per batch of finishing queries and never mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct CorrelationMarker {
    /// Host clock at the start of the bracket (ticks)
    pub cpu_start: u64,
    /// Host clock at the end of the bracket (ticks)
    pub cpu_end: u64,
    /// Device clock at the start of the bracket
    pub gpu_start: u64,
    /// Device clock at the end of the bracket
    pub gpu_end: u64,
}

impl CorrelationMarker {
    /// Create a marker
    pub const fn new(cpu_start: u64, cpu_end: u64, gpu_start: u64, gpu_end: u64) -> Self {
        Self {
            cpu_start,
            cpu_end,
            gpu_start,
            gpu_end,
        }
    }

    /// Position of `gpu_timestamp` within the device bracket
    ///
    /// A bracket with no device progress yields 0. Timestamps outside the
    /// bracket extrapolate linearly.
    pub fn fraction(&self, gpu_timestamp: u64) -> f64 {
        let span = self.gpu_end as i128 - self.gpu_start as i128;
        if span == 0 {
            return 0.0;
        }
        (gpu_timestamp as i128 - self.gpu_start as i128) as f64 / span as f64
    }

    /// Map `gpu_timestamp` onto the host clock, in ticks
    ///
    /// Only spans and offsets go through floating point, so large absolute
    /// clock values keep full precision. Results before the host epoch
    /// saturate to 0.
    pub fn host_ticks(&self, gpu_timestamp: u64) -> u64 {
        let cpu_span = (self.cpu_end as i128 - self.cpu_start as i128) as f64;
        let offset = (self.fraction(gpu_timestamp) * cpu_span).round() as i128;
        let ticks = self.cpu_start as i128 + offset;
        ticks.clamp(0, u64::MAX as i128) as u64
    }

    /// Map `gpu_timestamp` onto host nanoseconds
    pub fn host_nanos(&self, gpu_timestamp: u64, ratio: ClockRatio) -> u64 {
        ratio.to_nanos(self.host_ticks(gpu_timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_mapping() {
        let marker = CorrelationMarker::new(1_000, 2_000, 50_000, 60_000);
        assert_eq!(marker.host_ticks(50_000), 1_000);
        assert_eq!(marker.host_ticks(55_000), 1_500);
        assert_eq!(marker.host_ticks(60_000), 2_000);
    }

    #[test]
    fn test_tick_ratio_applied() {
        // 125/3 ns per tick, a common 24 MHz timebase.
        let ratio = ClockRatio::new(125, 3);
        let marker = CorrelationMarker::new(24_000_000, 48_000_000, 0, 1_000);
        assert_eq!(marker.host_nanos(500, ratio), 1_500_000_000);
    }

    #[test]
    fn test_degenerate_bracket_uses_cpu_start() {
        let marker = CorrelationMarker::new(7_000, 9_000, 400, 400);
        assert_eq!(marker.fraction(400), 0.0);
        assert_eq!(marker.host_ticks(123_456), 7_000);
    }

    #[test]
    fn test_extrapolation_saturates() {
        let marker = CorrelationMarker::new(100, 200, 1_000, 1_100);
        assert_eq!(marker.host_ticks(1_150), 250);
        assert_eq!(marker.host_ticks(0), 0);
    }

    #[test]
    fn test_large_clock_values_keep_precision() {
        let base = 1u64 << 60;
        let marker = CorrelationMarker::new(base, base + 1_000, 10, 20);
        assert_eq!(marker.host_ticks(15), base + 500);
    }
}
