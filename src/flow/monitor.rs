//! Occupancy accounting between a producer and its consumers.
//!
//! A [`Monitor`] counts units handed out (`produce_one`) and units returned
//! (`consume_one`). [`Tracker`] ties one unit to the lifetime of a value: it
//! produces on construction and consumes on drop, so a buffer carrying a
//! tracker is accounted for no matter which thread finally releases it.

use std::sync::{Arc, Mutex};

/// Produced/consumed counter pair.
///
/// Both counters are monotonic and `consumed <= produced` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorCounts {
    /// Units handed out.
    pub produced: u64,
    /// Units returned.
    pub consumed: u64,
}

impl MonitorCounts {
    /// Units currently outstanding.
    #[inline]
    pub fn pending(&self) -> u64 {
        self.produced - self.consumed
    }

    /// Record one produced unit.
    #[inline]
    pub(crate) fn produce(&mut self) {
        self.produced += 1;
    }

    /// Record one consumed unit.
    ///
    /// Returns `false` and leaves the counts untouched if nothing is pending.
    #[inline]
    pub(crate) fn consume(&mut self) -> bool {
        if self.consumed >= self.produced {
            return false;
        }
        self.consumed += 1;
        true
    }
}

/// Thread-safe in-flight counter shared by a producer and its consumers.
pub trait Monitor: Send + Sync {
    /// Record one unit handed out.
    ///
    /// Returns `false` only on an implementation-defined failure.
    fn produce_one(&self) -> bool;

    /// Record one unit returned.
    ///
    /// Returns `false` if it would make `consumed` exceed `produced`.
    fn consume_one(&self) -> bool;

    /// Snapshot of both counters.
    fn counts(&self) -> MonitorCounts;

    /// Units handed out so far.
    fn produced(&self) -> u64 {
        self.counts().produced
    }

    /// Units returned so far.
    fn consumed(&self) -> u64 {
        self.counts().consumed
    }

    /// Units currently outstanding.
    fn pending(&self) -> u64 {
        self.counts().pending()
    }

    /// Name for logging.
    fn name(&self) -> &str {
        "monitor"
    }

    /// Counter generation. Monitors that can be reset bump it so that units
    /// handed out before the reset are no longer counted.
    fn generation(&self) -> u64 {
        0
    }

    /// Record one unit handed out and return the generation it belongs to.
    fn produce_tagged(&self) -> (bool, u64) {
        (self.produce_one(), self.generation())
    }

    /// Record the return of a unit handed out in `generation`.
    ///
    /// Units from an older generation are ignored and return `false`.
    fn consume_tagged(&self, generation: u64) -> bool {
        if generation != self.generation() {
            return false;
        }
        self.consume_one()
    }
}

/// Plain counting [`Monitor`] with no blocking behavior.
#[derive(Debug, Default)]
pub struct CountingMonitor {
    name: String,
    counts: Mutex<MonitorCounts>,
}

impl CountingMonitor {
    /// Create a new monitor.
    pub fn new() -> Self {
        Self::with_name("monitor")
    }

    /// Create a monitor with a name used in logs.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counts: Mutex::new(MonitorCounts::default()),
        }
    }
}

impl Monitor for CountingMonitor {
    fn produce_one(&self) -> bool {
        self.counts.lock().unwrap().produce();
        true
    }

    fn consume_one(&self) -> bool {
        let ok = self.counts.lock().unwrap().consume();
        if !ok {
            tracing::warn!("monitor '{}': consume without matching produce", self.name);
        }
        ok
    }

    fn counts(&self) -> MonitorCounts {
        *self.counts.lock().unwrap()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Scoped occupancy token.
///
/// Construction calls [`Monitor::produce_one`]; drop calls
/// [`Monitor::consume_one`] exactly once. Trackers cannot be cloned.
///
/// A tracker remembers the monitor generation it was counted in; if the
/// monitor was reset in between, its drop is not counted against the new
/// generation.
///
/// # Example
///
/// ```rust
/// use cadence::flow::{CountingMonitor, Monitor, Tracker};
/// use std::sync::Arc;
///
/// let monitor = Arc::new(CountingMonitor::new());
/// let tracker = Tracker::new(monitor.clone());
/// assert_eq!(monitor.pending(), 1);
///
/// std::thread::spawn(move || drop(tracker)).join().unwrap();
/// assert_eq!(monitor.pending(), 0);
/// ```
pub struct Tracker {
    monitor: Arc<dyn Monitor>,
    generation: u64,
}

impl Tracker {
    /// Account for one unit on `monitor` until this tracker is dropped.
    pub fn new(monitor: Arc<dyn Monitor>) -> Self {
        let (produced, generation) = monitor.produce_tagged();
        if !produced {
            tracing::warn!("monitor '{}' rejected produce_one", monitor.name());
        }
        Self { monitor, generation }
    }

    /// The monitor this tracker reports to.
    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.monitor.consume_tagged(self.generation);
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("monitor", &self.monitor.name())
            .field("generation", &self.generation)
            .finish()
    }
}
