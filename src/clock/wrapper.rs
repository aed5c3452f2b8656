//! Per-sink clock slot.

use super::{ClockBorrower, ClockOwner, MediaClock, TimeSource};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Which kind of sink holds a [`ClockWrapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkRole {
    /// Audio renderer. Preferred clock owner.
    AudioSink,
    /// Video renderer. Controls the play rate.
    VideoSink,
}

impl SinkRole {
    /// Whether this role may change the play rate.
    pub fn controls_rate(self) -> bool {
        matches!(self, SinkRole::VideoSink)
    }
}

/// How a wrapper currently reaches its clock.
#[derive(Debug, Default)]
pub enum ClockAccess {
    /// No clock wired yet.
    #[default]
    None,
    /// This sink owns the clock.
    Owner(ClockOwner),
    /// This sink reads a clock owned elsewhere.
    Borrower(ClockBorrower),
}

/// A sink's view of the pipeline clock.
///
/// The audio sink normally creates and owns the clock with
/// [`provide_clock`](Self::provide_clock); the pipeline passes the returned
/// borrower to the video sink's [`set_clock`](Self::set_clock).
///
/// Mutators return `Ok(true)` when applied and `Ok(false)` when ignored
/// because this sink borrows a clock whose owner is still present.
///
/// # Example
///
/// ```rust
/// use cadence::clock::{ClockWrapper, ManualTimeSource, SinkRole, TimeSource};
/// use std::sync::Arc;
///
/// let source = Arc::new(ManualTimeSource::new(0));
/// let mut audio = ClockWrapper::new(SinkRole::AudioSink);
/// let mut video = ClockWrapper::new(SinkRole::VideoSink);
///
/// let shared = audio.provide_clock(source.clone());
/// video.set_clock(shared);
///
/// assert!(audio.set_anchor_time(1_000, source.now_us(), None).unwrap());
/// assert!(!video.set_anchor_time(2_000, source.now_us(), None).unwrap());
/// assert_eq!(video.current_position().unwrap(), 1_000);
/// ```
#[derive(Debug)]
pub struct ClockWrapper {
    role: SinkRole,
    access: ClockAccess,
}

impl ClockWrapper {
    /// Create an empty slot for a sink of the given role.
    pub fn new(role: SinkRole) -> Self {
        Self {
            role,
            access: ClockAccess::None,
        }
    }

    /// Role of the sink holding this wrapper.
    pub fn role(&self) -> SinkRole {
        self.role
    }

    /// Current access mode.
    pub fn access(&self) -> &ClockAccess {
        &self.access
    }

    /// Check if this sink owns its clock.
    pub fn is_owner(&self) -> bool {
        matches!(self.access, ClockAccess::Owner(_))
    }

    /// The shared clock, if any.
    pub fn clock(&self) -> Option<&Arc<MediaClock>> {
        match &self.access {
            ClockAccess::None => None,
            ClockAccess::Owner(o) => Some(o.clock()),
            ClockAccess::Borrower(b) => Some(b.clock()),
        }
    }

    /// Return a borrower for the clock this sink uses, creating and owning a
    /// new clock on `source` if none is wired yet.
    pub fn provide_clock(&mut self, source: Arc<dyn TimeSource>) -> ClockBorrower {
        match &self.access {
            ClockAccess::Owner(o) => o.borrower(),
            ClockAccess::Borrower(b) => b.clone(),
            ClockAccess::None => {
                tracing::debug!("{:?} creates and owns the clock", self.role);
                let owner = MediaClock::new_owned(source);
                let borrower = owner.borrower();
                self.access = ClockAccess::Owner(owner);
                borrower
            }
        }
    }

    /// Use a clock provided by another sink.
    ///
    /// Replaces any clock this sink held; an owned clock is released.
    pub fn set_clock(&mut self, clock: ClockBorrower) {
        if self.is_owner() {
            tracing::debug!("{:?} gives up its own clock for a shared one", self.role);
        }
        self.access = ClockAccess::Borrower(clock);
    }

    /// Drop whatever clock is wired.
    pub fn clear(&mut self) {
        self.access = ClockAccess::None;
    }

    /// See [`ClockOwner::set_anchor_time`].
    pub fn set_anchor_time(&self, media_us: i64, real_us: i64, max_media_us: Option<i64>) -> Result<bool> {
        match &self.access {
            ClockAccess::Owner(o) => {
                o.set_anchor_time(media_us, real_us, max_media_us);
                Ok(true)
            }
            ClockAccess::Borrower(b) => Ok(b.try_set_anchor_time(media_us, real_us, max_media_us)),
            ClockAccess::None => Err(no_clock()),
        }
    }

    /// See [`ClockOwner::pause`].
    pub fn pause(&self) -> Result<bool> {
        self.mutate(ClockOwner::pause, ClockBorrower::try_pause)
    }

    /// See [`ClockOwner::resume`].
    pub fn resume(&self) -> Result<bool> {
        self.mutate(ClockOwner::resume, ClockBorrower::try_resume)
    }

    /// See [`ClockOwner::flush`].
    pub fn flush(&self) -> Result<bool> {
        self.mutate(ClockOwner::flush, ClockBorrower::try_flush)
    }

    /// Change the play rate.
    ///
    /// Only the video sink may do this; other roles get
    /// [`Error::Unsupported`].
    pub fn set_play_rate(&self, rate: f32) -> Result<()> {
        if !self.role.controls_rate() {
            return Err(Error::Unsupported(format!(
                "{:?} cannot change the play rate",
                self.role
            )));
        }
        self.clock().ok_or_else(no_clock)?.set_play_rate(rate)
    }

    /// See [`MediaClock::current_position`].
    pub fn current_position(&self) -> Result<i64> {
        self.clock().ok_or_else(no_clock)?.current_position()
    }

    /// See [`MediaClock::media_late_us`].
    pub fn media_late_us(&self, target_media_us: i64) -> Result<i64> {
        self.clock().ok_or_else(no_clock)?.media_late_us(target_media_us)
    }

    fn mutate(
        &self,
        as_owner: impl FnOnce(&ClockOwner),
        as_borrower: impl FnOnce(&ClockBorrower) -> bool,
    ) -> Result<bool> {
        match &self.access {
            ClockAccess::Owner(o) => {
                as_owner(o);
                Ok(true)
            }
            ClockAccess::Borrower(b) => Ok(as_borrower(b)),
            ClockAccess::None => Err(no_clock()),
        }
    }
}

fn no_clock() -> Error {
    Error::NotInited("no clock wired".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;

    fn pair() -> (Arc<ManualTimeSource>, ClockWrapper, ClockWrapper) {
        let source = Arc::new(ManualTimeSource::new(0));
        let mut audio = ClockWrapper::new(SinkRole::AudioSink);
        let mut video = ClockWrapper::new(SinkRole::VideoSink);
        let shared = audio.provide_clock(source.clone());
        video.set_clock(shared);
        (source, audio, video)
    }

    #[test]
    fn test_audio_owns_video_borrows() {
        let (_source, audio, video) = pair();
        assert!(audio.is_owner());
        assert!(!video.is_owner());
        assert!(Arc::ptr_eq(audio.clock().unwrap(), video.clock().unwrap()));
    }

    #[test]
    fn test_only_owner_anchor_applies() {
        let (source, audio, video) = pair();
        let t = source.now_us();
        assert!(audio.set_anchor_time(3_000_000, t, None).unwrap());
        assert!(!video.set_anchor_time(8_000_000, t, None).unwrap());

        source.advance_us(10_000);
        assert_eq!(audio.current_position().unwrap(), 3_010_000);
        assert_eq!(video.current_position().unwrap(), 3_010_000);
    }

    #[test]
    fn test_borrower_takes_over_after_owner_gone() {
        let (source, mut audio, video) = pair();
        audio.set_anchor_time(0, source.now_us(), None).unwrap();
        assert!(!video.pause().unwrap());

        audio.clear();
        assert!(video.pause().unwrap());
        source.advance_us(1_000);
        assert_eq!(video.current_position().unwrap(), 0);
        assert!(video.resume().unwrap());
        assert!(video.flush().unwrap());
    }

    #[test]
    fn test_play_rate_role() {
        let (source, audio, video) = pair();
        audio.set_anchor_time(0, source.now_us(), None).unwrap();

        assert!(matches!(audio.set_play_rate(2.0), Err(Error::Unsupported(_))));
        video.set_play_rate(2.0).unwrap();
        source.advance_us(1_000);
        assert_eq!(audio.current_position().unwrap(), 2_000);
    }

    #[test]
    fn test_empty_wrapper() {
        let wrapper = ClockWrapper::new(SinkRole::VideoSink);
        assert!(matches!(wrapper.current_position(), Err(Error::NotInited(_))));
        assert!(matches!(wrapper.pause(), Err(Error::NotInited(_))));
        assert!(matches!(wrapper.set_play_rate(1.5), Err(Error::NotInited(_))));
    }

    #[test]
    fn test_video_alone_owns() {
        let source = Arc::new(ManualTimeSource::new(0));
        let mut video = ClockWrapper::new(SinkRole::VideoSink);
        let _ = video.provide_clock(source);
        assert!(video.is_owner());
        assert!(video.set_anchor_time(0, 0, None).unwrap());
    }
}
