//! Media buffers moved between components.

use crate::flow::{Monitor, Tracker};
use crate::format::MediaType;
use crate::metadata::MediaMeta;
use bytes::Bytes;
use smallvec::SmallVec;
use std::sync::Arc;

/// Callback run when a buffer is released.
pub type ReleaseCallback = Box<dyn FnOnce() + Send>;

/// Flags indicating buffer properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// Buffer marks end of stream. It may carry no payload.
    pub eos: bool,
    /// Buffer is a sync point (keyframe).
    pub key_frame: bool,
    /// Buffer carries codec configuration rather than media.
    pub codec_config: bool,
    /// Buffer follows a discontinuity (after seek or flush).
    pub discontinuity: bool,
}

/// A unit of media moving between components.
///
/// Timestamps are in microseconds of media time. A buffer may carry a
/// [`Tracker`]; the tracker is dropped together with the buffer so the
/// upstream [`Monitor`] sees the release no matter which thread drops it.
/// Release callbacks registered with
/// [`add_release_callback`](Self::add_release_callback) run exactly once, in
/// registration order, before the tracker is released.
///
/// Buffers are not `Clone`: each one accounts for exactly one tracked unit.
///
/// # Example
///
/// ```rust
/// use cadence::buffer::MediaBuffer;
/// use cadence::flow::{CountingMonitor, Monitor};
/// use cadence::format::MediaType;
/// use std::sync::Arc;
///
/// let monitor = Arc::new(CountingMonitor::new());
/// let buffer = MediaBuffer::new(MediaType::Video, vec![0u8; 16])
///     .with_pts(33_366)
///     .tracked(monitor.clone());
///
/// assert_eq!(monitor.pending(), 1);
/// drop(buffer);
/// assert_eq!(monitor.pending(), 0);
/// ```
pub struct MediaBuffer {
    data: Bytes,
    media_type: MediaType,
    pts: Option<i64>,
    dts: Option<i64>,
    duration: Option<i64>,
    flags: BufferFlags,
    meta: MediaMeta,
    release: SmallVec<[ReleaseCallback; 1]>,
    tracker: Option<Tracker>,
}

impl MediaBuffer {
    /// Create a buffer with the given payload.
    pub fn new(media_type: MediaType, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            media_type,
            pts: None,
            dts: None,
            duration: None,
            flags: BufferFlags::default(),
            meta: MediaMeta::new(),
            release: SmallVec::new(),
            tracker: None,
        }
    }

    /// Create an empty end-of-stream buffer.
    pub fn eos(media_type: MediaType) -> Self {
        let mut buffer = Self::new(media_type, Bytes::new());
        buffer.flags.eos = true;
        buffer
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts_us: i64) -> Self {
        self.pts = Some(pts_us);
        self
    }

    /// Set the decode timestamp.
    pub fn with_dts(mut self, dts_us: i64) -> Self {
        self.dts = Some(dts_us);
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration_us: i64) -> Self {
        self.duration = Some(duration_us);
        self
    }

    /// Set the flags.
    pub fn with_flags(mut self, flags: BufferFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Attach a tracker on `monitor`.
    pub fn tracked(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.attach_tracker(Tracker::new(monitor));
        self
    }

    /// Payload bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Stream this buffer belongs to.
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Presentation timestamp in microseconds.
    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    /// Decode timestamp in microseconds.
    pub fn dts(&self) -> Option<i64> {
        self.dts
    }

    /// Duration in microseconds.
    pub fn duration(&self) -> Option<i64> {
        self.duration
    }

    /// Set the presentation timestamp.
    pub fn set_pts(&mut self, pts_us: Option<i64>) {
        self.pts = pts_us;
    }

    /// Buffer flags.
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Mutable buffer flags.
    pub fn flags_mut(&mut self) -> &mut BufferFlags {
        &mut self.flags
    }

    /// Check if this buffer marks end of stream.
    pub fn is_eos(&self) -> bool {
        self.flags.eos
    }

    /// Per-buffer metadata.
    pub fn meta(&self) -> &MediaMeta {
        &self.meta
    }

    /// Mutable per-buffer metadata.
    pub fn meta_mut(&mut self) -> &mut MediaMeta {
        &mut self.meta
    }

    /// Attach a tracker, releasing any tracker already attached.
    pub fn attach_tracker(&mut self, tracker: Tracker) {
        self.tracker = Some(tracker);
    }

    /// Detach the tracker without releasing it.
    pub fn take_tracker(&mut self) -> Option<Tracker> {
        self.tracker.take()
    }

    /// Check if a tracker is attached.
    pub fn is_tracked(&self) -> bool {
        self.tracker.is_some()
    }

    /// Register a callback to run when this buffer is dropped.
    pub fn add_release_callback(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.release.push(Box::new(callback));
    }
}

impl Drop for MediaBuffer {
    fn drop(&mut self) {
        for callback in self.release.drain(..) {
            callback();
        }
        // The tracker field drops after this body and reports consumption.
    }
}

impl std::fmt::Debug for MediaBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaBuffer")
            .field("media_type", &self.media_type)
            .field("len", &self.data.len())
            .field("pts", &self.pts)
            .field("dts", &self.dts)
            .field("duration", &self.duration)
            .field("flags", &self.flags)
            .field("tracked", &self.tracker.is_some())
            .finish()
    }
}
