//! Flow control between producers and consumers.
//!
//! - [`Monitor`] / [`Tracker`]: occupancy accounting tied to buffer lifetime
//! - [`TrafficControl`]: a monitor that blocks producers between watermarks
//! - [`BufferQueue`]: bounded FIFO used behind Reader/Writer pairs
//!
//! # Backpressure
//!
//! ```text
//! producer ── wait_on_full ──► Tracker::new ──► buffer ──► consumer drops it
//!     ▲                                                          │
//!     └──────────── consume_one wakes at the low mark ◄──────────┘
//! ```

mod monitor;
mod queue;
mod traffic;

pub use monitor::{CountingMonitor, Monitor, MonitorCounts, Tracker};
pub use queue::{BufferQueue, PushError, QueueStats};
pub use traffic::TrafficControl;

use crate::error::{Error, Result};

/// Water mark thresholds for flow control.
///
/// Backpressure engages at `high` and releases at `low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaterMarks {
    /// Engage backpressure when pending reaches this level.
    pub high: usize,
    /// Release backpressure when pending falls to this level.
    pub low: usize,
}

impl WaterMarks {
    /// Create water marks with explicit high and low values.
    ///
    /// Fails with [`Error::InvalidParam`] if `low > high` or `high == 0`.
    pub fn new(high: usize, low: usize) -> Result<Self> {
        if high == 0 {
            return Err(Error::InvalidParam("high water mark must be > 0".into()));
        }
        if low > high {
            return Err(Error::InvalidParam(format!(
                "low water mark {} above high water mark {}",
                low, high
            )));
        }
        Ok(Self { high, low })
    }

    /// Marks at 80% and 20% of a queue holding `capacity` buffers.
    pub fn from_capacity(capacity: usize) -> Self {
        let high = (capacity * 4 / 5).max(1);
        Self {
            high,
            low: (capacity / 5).min(high),
        }
    }

    /// Producers must wait at `pending`.
    #[inline]
    pub fn is_high(&self, pending: usize) -> bool {
        pending >= self.high
    }

    /// A waiting producer may resume at `pending`.
    #[inline]
    pub fn is_low(&self, pending: usize) -> bool {
        pending <= self.low
    }
}

impl Default for WaterMarks {
    fn default() -> Self {
        Self::from_capacity(32)
    }
}
