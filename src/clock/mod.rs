//! Media clock for audio/video synchronization.
//!
//! This module provides:
//! - [`TimeSource`]: Trait for real-time sources (microseconds, monotonic)
//! - [`SystemTimeSource`]: Monotonic system time
//! - [`ManualTimeSource`]: Externally driven time for deterministic tests
//! - [`MediaClock`]: Anchor-based media time extrapolation
//! - [`ClockOwner`] / [`ClockBorrower`]: Owner-gated access to a shared clock
//! - [`ClockWrapper`]: Per-sink clock slot with audio/video role rules
//!
//! # Ownership
//!
//! A pipeline with both an audio and a video sink shares one [`MediaClock`].
//! The audio sink owns it: only the owner can move the anchor, pause, resume
//! or flush. The video sink holds a [`ClockBorrower`] and only reads the
//! position, except when the owner is gone.

mod media_clock;
mod wrapper;

pub use media_clock::{ClockBorrower, ClockOwner, MediaClock};
pub use wrapper::{ClockAccess, ClockWrapper, SinkRole};

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

// ============================================================================
// TimeSource Trait
// ============================================================================

/// A source of real (wall) time in microseconds.
///
/// Must be monotonic. The epoch is arbitrary but fixed for the lifetime of
/// the source.
pub trait TimeSource: Send + Sync {
    /// Current real time in microseconds.
    fn now_us(&self) -> i64;

    /// Get a human-readable name for the source.
    fn name(&self) -> &str {
        "unknown"
    }
}

// ============================================================================
// SystemTimeSource
// ============================================================================

/// System monotonic time.
///
/// Time is relative to when the source was created.
pub struct SystemTimeSource {
    epoch: Instant,
    name: String,
}

impl SystemTimeSource {
    /// Create a new source with the current instant as epoch.
    pub fn new() -> Self {
        Self::with_name("system-monotonic")
    }

    /// Create a source with a custom name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            epoch: Instant::now(),
            name: name.into(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    #[inline]
    fn now_us(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// ManualTimeSource
// ============================================================================

/// A time source that only moves when told to.
///
/// # Example
///
/// ```rust
/// use cadence::clock::{ManualTimeSource, TimeSource};
/// use std::time::Duration;
///
/// let source = ManualTimeSource::new(1_000);
/// source.advance(Duration::from_millis(2));
/// assert_eq!(source.now_us(), 3_000);
/// ```
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicI64,
}

impl ManualTimeSource {
    /// Create a source reading `start_us`.
    pub fn new(start_us: i64) -> Self {
        Self {
            now: AtomicI64::new(start_us),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_us: i64) {
        self.now.store(now_us, Ordering::Release);
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.now
            .fetch_add(delta.as_micros() as i64, Ordering::AcqRel);
    }

    /// Move forward by `delta_us` microseconds.
    pub fn advance_us(&self, delta_us: i64) {
        self.now.fetch_add(delta_us, Ordering::AcqRel);
    }
}

impl TimeSource for ManualTimeSource {
    #[inline]
    fn now_us(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }

    fn name(&self) -> &str {
        "manual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_source_monotonic() {
        let source = SystemTimeSource::new();
        let t1 = source.now_us();
        std::thread::sleep(Duration::from_millis(2));
        let t2 = source.now_us();
        assert!(t2 >= t1 + 1_000);
        assert_eq!(source.name(), "system-monotonic");
    }

    #[test]
    fn test_manual_source() {
        let source = ManualTimeSource::new(0);
        assert_eq!(source.now_us(), 0);
        source.advance_us(500);
        source.advance(Duration::from_micros(250));
        assert_eq!(source.now_us(), 750);
        source.set(10);
        assert_eq!(source.now_us(), 10);
    }
}
