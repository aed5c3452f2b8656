//! The component contract.
//!
//! A [`Component`] is a demuxer, codec, renderer or any other stage of a
//! media pipeline. Components interoperate only through this contract:
//!
//! - [`Reader`] / [`Writer`]: pull and push one [`MediaBuffer`] at a time
//! - lifecycle methods returning [`Completion`]: `Done` when already complete,
//!   `Async` when an [`Event::Completed`] follows through the [`Listener`]
//! - [`SourceLink`] / [`SinkLink`]: non-owning connections to peers, keyed by
//!   the peer's [`ComponentId`] in the pipeline arena
//!
//! # Data Path
//!
//! ```text
//! upstream ──Writer::write──► component ──Reader::read──► downstream
//!            (push, Again = retry)        (pull, Again = nothing yet)
//! ```
//!
//! Neither call blocks for longer than about one frame duration.

mod event;
mod lifecycle;
mod state;

pub use event::{ComponentCategory, Event, InfoCode};
pub use lifecycle::Lifecycle;
pub use state::{ComponentState, Transition};

pub use crate::format::MediaType;

use crate::buffer::MediaBuffer;
use crate::clock::ClockBorrower;
use crate::error::{Completion, Error, Result};
use crate::metadata::MediaMeta;
use crate::pipeline::ComponentId;
use std::sync::Arc;

// ============================================================================
// Data Interfaces
// ============================================================================

/// Result of a successful [`Reader::read`].
#[derive(Debug)]
pub enum ReadOutcome {
    /// One unit of media.
    Buffer(MediaBuffer),
    /// Nothing available yet; try again later.
    Again,
    /// The stream has ended. Every later read also returns `Eos`.
    Eos,
}

impl ReadOutcome {
    /// Check if this is end of stream.
    #[inline]
    pub fn is_eos(&self) -> bool {
        matches!(self, ReadOutcome::Eos)
    }

    /// Take the buffer, if any.
    pub fn into_buffer(self) -> Option<MediaBuffer> {
        match self {
            ReadOutcome::Buffer(b) => Some(b),
            _ => None,
        }
    }
}

/// Result of a successful [`Writer::write`].
#[derive(Debug)]
pub enum WriteOutcome {
    /// The buffer was taken.
    Accepted,
    /// The receiver is full. The buffer is handed back for a retry.
    Again(MediaBuffer),
}

impl WriteOutcome {
    /// Check if the buffer was taken.
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, WriteOutcome::Accepted)
    }
}

/// Pull side of a connection.
pub trait Reader: Send + Sync {
    /// Pull one unit.
    ///
    /// Must return within a bounded time; `Again` is not an error.
    fn read(&self) -> Result<ReadOutcome>;

    /// Format of the buffers this reader yields.
    fn media_meta(&self) -> MediaMeta {
        MediaMeta::new()
    }
}

/// Push side of a connection.
pub trait Writer: Send + Sync {
    /// Push one unit.
    ///
    /// A full receiver returns [`WriteOutcome::Again`] with the buffer; it
    /// never drops it.
    fn write(&self, buffer: MediaBuffer) -> Result<WriteOutcome>;

    /// Format this writer expects.
    fn media_meta(&self) -> MediaMeta {
        MediaMeta::new()
    }
}

/// Receiver of component events.
///
/// Called from component-owned threads; implementations must not block.
pub trait Listener: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: Event);
}

impl<F> Listener for F
where
    F: Fn(Event) + Send + Sync,
{
    fn on_event(&self, event: Event) {
        self(event)
    }
}

// ============================================================================
// Links
// ============================================================================

/// Upstream connection handed to [`Component::add_source`].
///
/// The component pulls from `reader`. `peer` identifies the upstream
/// component; it is a handle, never ownership.
#[derive(Clone)]
pub struct SourceLink {
    /// Upstream component.
    pub peer: ComponentId,
    /// Stream carried by this link.
    pub media_type: MediaType,
    /// Where to pull from.
    pub reader: Arc<dyn Reader>,
    /// Upstream format.
    pub meta: MediaMeta,
}

/// Downstream connection handed to [`Component::add_sink`].
///
/// The component pushes into `writer`.
#[derive(Clone)]
pub struct SinkLink {
    /// Downstream component.
    pub peer: ComponentId,
    /// Stream carried by this link.
    pub media_type: MediaType,
    /// Where to push to.
    pub writer: Arc<dyn Writer>,
    /// Downstream format.
    pub meta: MediaMeta,
}

impl std::fmt::Debug for SourceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLink")
            .field("peer", &self.peer)
            .field("media_type", &self.media_type)
            .finish()
    }
}

impl std::fmt::Debug for SinkLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkLink")
            .field("peer", &self.peer)
            .field("media_type", &self.media_type)
            .finish()
    }
}

// ============================================================================
// Component Flags
// ============================================================================

/// Capability set of a component.
///
/// A role bit (`SOURCE`, `FILTER`, `SINK`) combined with a direction bit
/// (`PLAY`, `RECORD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentFlags(u32);

impl ComponentFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Produces media.
    pub const SOURCE: Self = Self(1 << 0);
    /// Transforms media.
    pub const FILTER: Self = Self(1 << 1);
    /// Consumes media.
    pub const SINK: Self = Self(1 << 2);
    /// Playback direction.
    pub const PLAY: Self = Self(1 << 8);
    /// Recording direction.
    pub const RECORD: Self = Self(1 << 9);

    /// Check if a flag is set.
    #[inline]
    pub const fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) == flag.0 && flag.0 != 0
    }

    /// Set a flag.
    #[inline]
    pub const fn insert(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    /// Clear a flag.
    #[inline]
    pub const fn remove(self, flag: Self) -> Self {
        Self(self.0 & !flag.0)
    }

    /// Combine flags using bitwise OR.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Role category, preferring filter over source and sink.
    pub fn category(self) -> Option<ComponentCategory> {
        if self.contains(Self::FILTER) {
            Some(ComponentCategory::Filter)
        } else if self.contains(Self::SOURCE) {
            Some(ComponentCategory::Source)
        } else if self.contains(Self::SINK) {
            Some(ComponentCategory::Sink)
        } else {
            None
        }
    }
}

impl std::ops::BitOr for ComponentFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

// ============================================================================
// Component Trait
// ============================================================================

/// A pipeline stage.
///
/// All methods take `&self`; implementations serialize state changes on
/// their own actor. Mutating lifecycle methods either finish synchronously
/// ([`Completion::Done`]), accept the request ([`Completion::Async`], an
/// [`Event::Completed`] follows), or reject it with an error. A rejected
/// request never produces a later event.
///
/// Optional capabilities default to [`Error::Unsupported`]; connecting in a
/// direction the component does not support defaults to
/// [`Error::InvalidOperation`].
pub trait Component: Send + Sync {
    /// Instance name.
    fn name(&self) -> &str;

    /// Implementation version.
    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    /// Capability set.
    fn flags(&self) -> ComponentFlags;

    /// State after the last completed transition.
    fn state(&self) -> ComponentState;

    /// Allocate resources. Synchronous.
    fn init(&self) -> Result<()>;

    /// Release resources. Synchronous.
    fn uninit(&self) -> Result<()>;

    /// Configure for playback.
    fn prepare(&self) -> Result<Completion>;

    /// Begin moving data.
    fn start(&self) -> Result<Completion>;

    /// Stop moving data. Must be honored even after an error.
    fn stop(&self) -> Result<Completion>;

    /// Hold position.
    fn pause(&self) -> Result<Completion>;

    /// Continue after pause.
    fn resume(&self) -> Result<Completion>;

    /// Jump to `position_us` of media time.
    fn seek(&self, position_us: i64) -> Result<Completion> {
        let _ = position_us;
        Err(Error::Unsupported(format!("{}: seek", self.name())))
    }

    /// Return to the uninitialized state, releasing peers, workers and
    /// buffers.
    fn reset(&self) -> Result<Completion>;

    /// Discard buffered data.
    fn flush(&self) -> Result<Completion> {
        Err(Error::Unsupported(format!("{}: flush", self.name())))
    }

    /// Finish buffered data without accepting more.
    fn drain(&self) -> Result<Completion> {
        Err(Error::Unsupported(format!("{}: drain", self.name())))
    }

    /// Pull interface for `media`, if this component offers one.
    fn reader(&self, media: MediaType) -> Option<Arc<dyn Reader>> {
        let _ = media;
        None
    }

    /// Push interface for `media`, if this component accepts pushes.
    fn writer(&self, media: MediaType) -> Option<Arc<dyn Writer>> {
        let _ = media;
        None
    }

    /// Pull from an upstream peer.
    fn add_source(&self, link: SourceLink) -> Result<()> {
        let _ = link;
        Err(Error::InvalidOperation(format!(
            "{}: does not accept sources",
            self.name()
        )))
    }

    /// Push into a downstream peer.
    fn add_sink(&self, link: SinkLink) -> Result<()> {
        let _ = link;
        Err(Error::InvalidOperation(format!(
            "{}: does not accept sinks",
            self.name()
        )))
    }

    /// Apply configuration.
    fn set_parameter(&self, meta: &MediaMeta) -> Result<()> {
        let _ = meta;
        Err(Error::Unsupported(format!("{}: set_parameter", self.name())))
    }

    /// Read current configuration.
    fn parameter(&self) -> Result<MediaMeta> {
        Err(Error::Unsupported(format!("{}: parameter", self.name())))
    }

    /// Register the event listener.
    fn set_listener(&self, listener: Arc<dyn Listener>) -> Result<()>;

    /// Use a clock provided by another sink.
    fn set_clock(&self, clock: ClockBorrower) -> Result<()> {
        let _ = clock;
        Err(Error::Unsupported(format!("{}: set_clock", self.name())))
    }

    /// Provide the clock this component drives.
    fn provide_clock(&self) -> Result<ClockBorrower> {
        Err(Error::Unsupported(format!("{}: provide_clock", self.name())))
    }
}
