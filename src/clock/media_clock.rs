//! Anchor-based media clock and its owner/borrower handles.

use super::TimeSource;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    media_us: i64,
    real_us: i64,
    max_us: Option<i64>,
}

#[derive(Debug)]
struct ClockState {
    anchor: Option<Anchor>,
    paused: bool,
    pause_position: Option<i64>,
    rate: f32,
    owned: bool,
}

impl ClockState {
    fn position_at(&self, now_real_us: i64) -> Result<i64> {
        let anchor = self
            .anchor
            .ok_or_else(|| Error::Unsupported("clock has no anchor".into()))?;
        if self.paused {
            if let Some(pos) = self.pause_position {
                return Ok(pos);
            }
        }
        let elapsed = (now_real_us - anchor.real_us) as f64 * f64::from(self.rate);
        let position = anchor.media_us + elapsed as i64;
        Ok(match anchor.max_us {
            Some(max) => position.min(max),
            None => position,
        })
    }
}

/// A shared media-time clock.
///
/// While running, the current position is extrapolated from the last anchor:
/// `anchor_media + (now_real - anchor_real) * rate`, clamped to the anchor's
/// maximum when one is set. While paused it stays at the position it had
/// when [`pause`](ClockOwner::pause) was called.
///
/// Read access is open to everyone. Mutation goes through a [`ClockOwner`],
/// or through a [`ClockBorrower`] while no owner exists.
///
/// # Example
///
/// ```rust
/// use cadence::clock::{ManualTimeSource, MediaClock, TimeSource};
/// use std::sync::Arc;
///
/// let source = Arc::new(ManualTimeSource::new(0));
/// let owner = MediaClock::new_owned(source.clone());
///
/// owner.set_anchor_time(5_000_000, source.now_us(), None);
/// source.advance_us(2_000_000);
/// assert_eq!(owner.current_position().unwrap(), 7_000_000);
/// ```
pub struct MediaClock {
    source: Arc<dyn TimeSource>,
    state: Mutex<ClockState>,
}

impl MediaClock {
    /// Create an unowned clock reading real time from `source`.
    pub fn new(source: Arc<dyn TimeSource>) -> Arc<Self> {
        Arc::new(Self {
            source,
            state: Mutex::new(ClockState {
                anchor: None,
                paused: false,
                pause_position: None,
                rate: 1.0,
                owned: false,
            }),
        })
    }

    /// Create a clock and claim it in one step.
    pub fn new_owned(source: Arc<dyn TimeSource>) -> ClockOwner {
        ClockOwner {
            clock: Self::new_claimed(source),
        }
    }

    fn new_claimed(source: Arc<dyn TimeSource>) -> Arc<Self> {
        let clock = Self::new(source);
        clock.state.lock().unwrap().owned = true;
        clock
    }

    /// Claim ownership of this clock.
    ///
    /// Fails with [`Error::InvalidOperation`] if an owner already exists.
    pub fn claim(self: &Arc<Self>) -> Result<ClockOwner> {
        let mut state = self.state.lock().unwrap();
        if state.owned {
            return Err(Error::InvalidOperation("clock already has an owner".into()));
        }
        state.owned = true;
        Ok(ClockOwner {
            clock: Arc::clone(self),
        })
    }

    /// Get a read-mostly handle to this clock.
    pub fn borrower(self: &Arc<Self>) -> ClockBorrower {
        ClockBorrower {
            clock: Arc::clone(self),
        }
    }

    /// Check if an owner currently exists.
    pub fn has_owner(&self) -> bool {
        self.state.lock().unwrap().owned
    }

    /// Current real time from the underlying source.
    #[inline]
    pub fn real_time_us(&self) -> i64 {
        self.source.now_us()
    }

    /// Current media position in microseconds.
    ///
    /// Fails with [`Error::Unsupported`] if no anchor has been set.
    pub fn current_position(&self) -> Result<i64> {
        let now = self.source.now_us();
        self.state.lock().unwrap().position_at(now)
    }

    /// `target - current_position`. Negative means `target` is late.
    pub fn media_late_us(&self, target_media_us: i64) -> Result<i64> {
        Ok(target_media_us - self.current_position()?)
    }

    /// Check if an anchor has been set since creation or the last flush.
    pub fn is_anchored(&self) -> bool {
        self.state.lock().unwrap().anchor.is_some()
    }

    /// Check if extrapolation is frozen.
    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    /// Current play rate.
    pub fn play_rate(&self) -> f32 {
        self.state.lock().unwrap().rate
    }

    /// Scale extrapolation by `rate`.
    ///
    /// The position is re-anchored at the current time first, so it is
    /// continuous across the change. Fails with [`Error::InvalidParam`] if
    /// `rate` is not a positive finite number.
    pub fn set_play_rate(&self, rate: f32) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::InvalidParam(format!("play rate {}", rate)));
        }
        let now = self.source.now_us();
        let mut state = self.state.lock().unwrap();
        if !state.paused {
            if let Some(anchor) = state.anchor {
                let position = state.position_at(now)?;
                state.anchor = Some(Anchor {
                    media_us: position,
                    real_us: now,
                    max_us: anchor.max_us,
                });
            }
        }
        state.rate = rate;
        tracing::debug!("clock play rate set to {}", rate);
        Ok(())
    }

    fn set_anchor_time(&self, media_us: i64, real_us: i64, max_media_us: Option<i64>) {
        let mut state = self.state.lock().unwrap();
        state.anchor = Some(Anchor {
            media_us,
            real_us,
            max_us: max_media_us,
        });
        if state.paused {
            state.pause_position = Some(media_us);
        }
        tracing::trace!(media_us, real_us, ?max_media_us, "clock anchored");
    }

    fn pause(&self) {
        let now = self.source.now_us();
        let mut state = self.state.lock().unwrap();
        if state.paused {
            return;
        }
        state.pause_position = state.position_at(now).ok();
        state.paused = true;
        tracing::debug!(position = ?state.pause_position, "clock paused");
    }

    fn resume(&self) {
        let now = self.source.now_us();
        let mut state = self.state.lock().unwrap();
        if !state.paused {
            return;
        }
        state.paused = false;
        if let (Some(position), Some(anchor)) = (state.pause_position.take(), state.anchor) {
            state.anchor = Some(Anchor {
                media_us: position,
                real_us: now,
                max_us: anchor.max_us,
            });
        }
        tracing::debug!("clock resumed");
    }

    fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        state.anchor = None;
        state.pause_position = None;
        tracing::debug!("clock flushed");
    }

    fn release_owner(&self) {
        self.state.lock().unwrap().owned = false;
    }
}

impl std::fmt::Debug for MediaClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaClock")
            .field("source", &self.source.name())
            .field("state", &*self.state.lock().unwrap())
            .finish()
    }
}

// ============================================================================
// Owner / Borrower
// ============================================================================

/// Exclusive mutating handle to a [`MediaClock`].
///
/// At most one exists per clock. Dropping it marks the owner absent, which
/// lets borrowers take over pause/resume/flush.
#[derive(Debug)]
pub struct ClockOwner {
    clock: Arc<MediaClock>,
}

impl ClockOwner {
    /// The shared clock.
    pub fn clock(&self) -> &Arc<MediaClock> {
        &self.clock
    }

    /// Hand out a borrower for another sink.
    pub fn borrower(&self) -> ClockBorrower {
        self.clock.borrower()
    }

    /// Record a fresh reference point.
    pub fn set_anchor_time(&self, media_us: i64, real_us: i64, max_media_us: Option<i64>) {
        self.clock.set_anchor_time(media_us, real_us, max_media_us);
    }

    /// Freeze extrapolation at the current position.
    pub fn pause(&self) {
        self.clock.pause();
    }

    /// Continue extrapolation from the frozen position.
    pub fn resume(&self) {
        self.clock.resume();
    }

    /// Clear the anchor. Position is unavailable until re-anchored.
    pub fn flush(&self) {
        self.clock.flush();
    }

    /// See [`MediaClock::set_play_rate`].
    pub fn set_play_rate(&self, rate: f32) -> Result<()> {
        self.clock.set_play_rate(rate)
    }

    /// See [`MediaClock::current_position`].
    pub fn current_position(&self) -> Result<i64> {
        self.clock.current_position()
    }

    /// See [`MediaClock::media_late_us`].
    pub fn media_late_us(&self, target_media_us: i64) -> Result<i64> {
        self.clock.media_late_us(target_media_us)
    }
}

impl Drop for ClockOwner {
    fn drop(&mut self) {
        self.clock.release_owner();
        tracing::debug!("clock owner released");
    }
}

/// Shared read handle to a [`MediaClock`].
///
/// The `try_*` mutators only apply while the clock has no owner and return
/// whether they did.
#[derive(Debug, Clone)]
pub struct ClockBorrower {
    clock: Arc<MediaClock>,
}

impl ClockBorrower {
    /// The shared clock.
    pub fn clock(&self) -> &Arc<MediaClock> {
        &self.clock
    }

    /// See [`MediaClock::current_position`].
    pub fn current_position(&self) -> Result<i64> {
        self.clock.current_position()
    }

    /// See [`MediaClock::media_late_us`].
    pub fn media_late_us(&self, target_media_us: i64) -> Result<i64> {
        self.clock.media_late_us(target_media_us)
    }

    /// Anchor the clock if the owner is absent.
    pub fn try_set_anchor_time(&self, media_us: i64, real_us: i64, max_media_us: Option<i64>) -> bool {
        self.when_unowned(|c| c.set_anchor_time(media_us, real_us, max_media_us))
    }

    /// Pause the clock if the owner is absent.
    pub fn try_pause(&self) -> bool {
        self.when_unowned(MediaClock::pause)
    }

    /// Resume the clock if the owner is absent.
    pub fn try_resume(&self) -> bool {
        self.when_unowned(MediaClock::resume)
    }

    /// Flush the clock if the owner is absent.
    pub fn try_flush(&self) -> bool {
        self.when_unowned(MediaClock::flush)
    }

    fn when_unowned(&self, f: impl FnOnce(&MediaClock)) -> bool {
        if self.clock.has_owner() {
            tracing::trace!("borrower mutation ignored, clock is owned");
            return false;
        }
        f(&self.clock);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;

    fn manual() -> (Arc<ManualTimeSource>, ClockOwner) {
        let source = Arc::new(ManualTimeSource::new(1_000_000));
        let owner = MediaClock::new_owned(source.clone());
        (source, owner)
    }

    #[test]
    fn test_no_anchor_is_unsupported() {
        let (_source, owner) = manual();
        assert!(matches!(owner.current_position(), Err(Error::Unsupported(_))));
        assert!(owner.media_late_us(0).is_err());
    }

    #[test]
    fn test_extrapolation_and_rate() {
        let (source, owner) = manual();
        let t = source.now_us();
        owner.set_anchor_time(5_000_000, t, None);
        source.set(t + 2_000_000);
        assert_eq!(owner.current_position().unwrap(), 7_000_000);

        owner.set_anchor_time(5_000_000, t, None);
        source.set(t);
        owner.set_play_rate(2.0).unwrap();
        source.set(t + 2_000_000);
        assert_eq!(owner.current_position().unwrap(), 9_000_000);
    }

    #[test]
    fn test_rate_change_is_continuous() {
        let (source, owner) = manual();
        owner.set_anchor_time(0, source.now_us(), None);
        source.advance_us(1_000_000);
        owner.set_play_rate(0.5).unwrap();
        assert_eq!(owner.current_position().unwrap(), 1_000_000);
        source.advance_us(1_000_000);
        assert_eq!(owner.current_position().unwrap(), 1_500_000);

        assert!(matches!(owner.set_play_rate(0.0), Err(Error::InvalidParam(_))));
        assert!(matches!(owner.set_play_rate(f32::NAN), Err(Error::InvalidParam(_))));
    }

    #[test]
    fn test_max_clamp() {
        let (source, owner) = manual();
        owner.set_anchor_time(0, source.now_us(), Some(500_000));
        source.advance_us(2_000_000);
        assert_eq!(owner.current_position().unwrap(), 500_000);
    }

    #[test]
    fn test_pause_resume() {
        let (source, owner) = manual();
        owner.set_anchor_time(0, source.now_us(), None);
        source.advance_us(100_000);
        owner.pause();
        source.advance_us(900_000);
        assert_eq!(owner.current_position().unwrap(), 100_000);
        assert!(owner.clock().is_paused());

        owner.resume();
        source.advance_us(50_000);
        assert_eq!(owner.current_position().unwrap(), 150_000);
    }

    #[test]
    fn test_flush_clears_anchor() {
        let (source, owner) = manual();
        owner.set_anchor_time(0, source.now_us(), None);
        owner.flush();
        assert!(!owner.clock().is_anchored());
        assert!(owner.current_position().is_err());
    }

    #[test]
    fn test_single_owner() {
        let source = Arc::new(ManualTimeSource::new(0));
        let clock = MediaClock::new(source);
        let owner = clock.claim().unwrap();
        assert!(matches!(clock.claim(), Err(Error::InvalidOperation(_))));
        drop(owner);
        assert!(!clock.has_owner());
        assert!(clock.claim().is_ok());
    }

    #[test]
    fn test_borrower_gated_by_owner() {
        let (source, owner) = manual();
        let borrower = owner.borrower();
        let t = source.now_us();

        owner.set_anchor_time(1_000, t, None);
        assert!(!borrower.try_set_anchor_time(9_999, t, None));
        assert!(!borrower.try_pause());
        assert_eq!(borrower.current_position().unwrap(), 1_000);

        drop(owner);
        assert!(borrower.try_set_anchor_time(9_999, t, None));
        assert!(borrower.try_pause());
        assert_eq!(borrower.current_position().unwrap(), 9_999);
        assert!(borrower.try_flush());
        assert!(borrower.current_position().is_err());
    }
}
