//! Events a component reports to its listener.

use super::state::Transition;
use crate::error::ErrorCode;
use crate::metadata::MediaMeta;
use std::fmt;

/// Which kind of component an info code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentCategory {
    /// Produces media (demuxer, capture, app source).
    Source,
    /// Transforms media (codec, converter).
    Filter,
    /// Consumes media (renderer, muxer, app sink).
    Sink,
}

/// Extensible informational code.
///
/// Each [`ComponentCategory`] owns a sub-range of 256 codes so independently
/// written components never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoCode(u32);

impl InfoCode {
    const RANGE: u32 = 0x100;
    const SOURCE_BASE: u32 = 0x100;
    const FILTER_BASE: u32 = 0x200;
    const SINK_BASE: u32 = 0x300;

    /// A source ran out of input data but has not reached end of stream.
    pub const SOURCE_UNDERRUN: Self = Self::source(1);
    /// A filter detected a change of output format.
    pub const FILTER_FORMAT_CHANGED: Self = Self::filter(1);
    /// A sink rendered its first buffer.
    pub const SINK_RENDERING_START: Self = Self::sink(1);
    /// A sink dropped a late buffer.
    pub const SINK_FRAME_DROPPED: Self = Self::sink(2);

    /// Source-range code `n` (`n < 256`).
    pub const fn source(n: u8) -> Self {
        Self(Self::SOURCE_BASE + n as u32)
    }

    /// Filter-range code `n` (`n < 256`).
    pub const fn filter(n: u8) -> Self {
        Self(Self::FILTER_BASE + n as u32)
    }

    /// Sink-range code `n` (`n < 256`).
    pub const fn sink(n: u8) -> Self {
        Self(Self::SINK_BASE + n as u32)
    }

    /// Raw value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Category whose range contains this code.
    pub fn category(self) -> Option<ComponentCategory> {
        match self.0 / Self::RANGE {
            1 => Some(ComponentCategory::Source),
            2 => Some(ComponentCategory::Filter),
            3 => Some(ComponentCategory::Sink),
            _ => None,
        }
    }

    /// Offset of this code within its category range.
    #[inline]
    pub const fn offset(self) -> u8 {
        (self.0 % Self::RANGE) as u8
    }
}

/// Something a component reports through [`Listener`](super::Listener).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An accepted asynchronous transition finished.
    Completed {
        /// The transition.
        transition: Transition,
        /// `Ok` on success, the failure code otherwise.
        status: Result<(), ErrorCode>,
    },
    /// End of stream reached.
    Eos,
    /// A failure found during asynchronous processing.
    Error(ErrorCode),
    /// Stream format discovered or changed.
    MediaInfo(MediaMeta),
    /// Video dimensions became known.
    GotVideoFormat {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// Buffering progress, 0 to 100.
    Buffering {
        /// Percent filled.
        percent: u8,
    },
    /// Informational signal.
    Info(InfoCode, i64),
    /// Informational signal with a metadata payload.
    InfoExt(InfoCode, i64, MediaMeta),
}

impl Event {
    /// Successful completion of `transition`.
    pub fn completed(transition: Transition) -> Self {
        Event::Completed {
            transition,
            status: Ok(()),
        }
    }

    /// Failed completion of `transition`.
    pub fn failed(transition: Transition, code: ErrorCode) -> Self {
        Event::Completed {
            transition,
            status: Err(code),
        }
    }

    /// The transition this event completes, if any.
    pub fn completes(&self) -> Option<Transition> {
        match self {
            Event::Completed { transition, .. } => Some(*transition),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Completed {
                transition,
                status: Ok(()),
            } => write!(f, "{} complete", transition),
            Event::Completed {
                transition,
                status: Err(code),
            } => write!(f, "{} failed ({:?})", transition, code),
            Event::Eos => write!(f, "EOS"),
            Event::Error(code) => write!(f, "error {:?}", code),
            Event::MediaInfo(meta) => write!(f, "media info ({} fields)", meta.len()),
            Event::GotVideoFormat { width, height } => write!(f, "video format {}x{}", width, height),
            Event::Buffering { percent } => write!(f, "buffering {}%", percent),
            Event::Info(code, value) => write!(f, "info {:#x} = {}", code.value(), value),
            Event::InfoExt(code, value, _) => write!(f, "info-ext {:#x} = {}", code.value(), value),
        }
    }
}
