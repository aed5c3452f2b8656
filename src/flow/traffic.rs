//! High/low watermark gate built on [`Monitor`].

use super::WaterMarks;
use super::monitor::{Monitor, MonitorCounts};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A [`Monitor`] that blocks producers while too many units are outstanding.
///
/// The gate is *full* while `pending >= high`. A producer calls
/// [`wait_on_full`](Self::wait_on_full) before handing out the next unit and
/// sleeps until consumers bring `pending` down to `low`. Waking only at the
/// low mark keeps a producer from bouncing on a single threshold.
///
/// [`unblock_wait(true)`](Self::unblock_wait) releases every current and
/// future waiter; it is the shutdown escape for producers whose consumer will
/// never drain again.
///
/// # Example
///
/// ```rust
/// use cadence::flow::{Monitor, TrafficControl, Tracker, WaterMarks};
/// use std::sync::Arc;
///
/// let traffic = Arc::new(TrafficControl::new(WaterMarks::new(2, 1).unwrap()));
/// let a = Tracker::new(traffic.clone());
/// let b = Tracker::new(traffic.clone());
/// assert!(traffic.is_full());
///
/// drop(a);
/// assert!(!traffic.is_full());
/// traffic.wait_on_full(); // returns immediately
/// # drop(b);
/// ```
#[derive(Debug)]
pub struct TrafficControl {
    name: String,
    marks: WaterMarks,
    state: Mutex<TrafficState>,
    drained: Condvar,
}

#[derive(Debug, Default)]
struct TrafficState {
    counts: MonitorCounts,
    unblocked: bool,
    generation: u64,
}

impl TrafficControl {
    /// Create a gate with the given watermarks.
    pub fn new(marks: WaterMarks) -> Self {
        Self {
            name: "traffic-control".to_string(),
            marks,
            state: Mutex::new(TrafficState::default()),
            drained: Condvar::new(),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Watermarks of this gate.
    pub fn water_marks(&self) -> WaterMarks {
        self.marks
    }

    /// Check if `pending >= high`.
    pub fn is_full(&self) -> bool {
        let state = self.state.lock().unwrap();
        self.is_full_locked(&state)
    }

    /// Check if waiting has been force-released.
    pub fn is_unblocked(&self) -> bool {
        self.state.lock().unwrap().unblocked
    }

    /// Block while the gate is full.
    ///
    /// Once blocked, the caller sleeps until `pending <= low`. Returns
    /// immediately when not full or after
    /// [`unblock_wait(true)`](Self::unblock_wait).
    ///
    /// Returns `true` if the caller had to wait.
    pub fn wait_on_full(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if !self.is_full_locked(&state) || state.unblocked {
            return false;
        }
        tracing::trace!(
            "'{}' full ({} pending), producer waiting",
            self.name,
            state.counts.pending()
        );
        while !self.is_drained_locked(&state) && !state.unblocked {
            state = self.drained.wait(state).unwrap();
        }
        true
    }

    /// Like [`wait_on_full`](Self::wait_on_full) with an upper bound.
    ///
    /// Returns `true` if the gate let the caller through, `false` if the
    /// timeout expired before `pending` dropped to the low mark.
    pub fn wait_on_full_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        if !self.is_full_locked(&state) {
            return true;
        }
        while !self.is_drained_locked(&state) && !state.unblocked {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (s, _) = self.drained.wait_timeout(state, deadline - now).unwrap();
            state = s;
        }
        true
    }

    /// Set or clear the sticky escape flag and wake all waiters.
    ///
    /// Idempotent.
    pub fn unblock_wait(&self, unblock: bool) {
        let mut state = self.state.lock().unwrap();
        if state.unblocked != unblock {
            tracing::debug!("'{}' unblock_wait({})", self.name, unblock);
        }
        state.unblocked = unblock;
        if unblock {
            self.drained.notify_all();
        }
    }

    /// Zero both counters, clear the escape flag and start a new generation.
    ///
    /// [`Tracker`](super::Tracker)s created before the reset no longer count:
    /// dropping them leaves the new counters untouched.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        let generation = state.generation + 1;
        tracing::debug!(
            "'{}' reset with {} pending, generation {}",
            self.name,
            state.counts.pending(),
            generation
        );
        *state = TrafficState {
            generation,
            ..TrafficState::default()
        };
        self.drained.notify_all();
    }

    fn is_full_locked(&self, state: &TrafficState) -> bool {
        self.marks.is_high(state.counts.pending() as usize)
    }

    fn is_drained_locked(&self, state: &TrafficState) -> bool {
        self.marks.is_low(state.counts.pending() as usize)
    }

    fn consume_locked(&self, state: &mut TrafficState) -> bool {
        if !state.counts.consume() {
            tracing::warn!("'{}': consume without matching produce", self.name);
            return false;
        }
        if self.is_drained_locked(state) {
            self.drained.notify_all();
        }
        true
    }
}

impl Monitor for TrafficControl {
    fn produce_one(&self) -> bool {
        self.produce_tagged().0
    }

    fn consume_one(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        self.consume_locked(&mut state)
    }

    fn counts(&self) -> MonitorCounts {
        self.state.lock().unwrap().counts
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn generation(&self) -> u64 {
        self.state.lock().unwrap().generation
    }

    fn produce_tagged(&self) -> (bool, u64) {
        let mut state = self.state.lock().unwrap();
        state.counts.produce();
        if state.counts.pending() as usize == self.marks.high {
            tracing::trace!("'{}' reached high watermark {}", self.name, self.marks.high);
        }
        (true, state.generation)
    }

    fn consume_tagged(&self, generation: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        if generation != state.generation {
            tracing::trace!("'{}': ignoring unit from generation {}", self.name, generation);
            return false;
        }
        self.consume_locked(&mut state)
    }
}
