//! Media type tags.
//!
//! Components expose one [`Reader`](crate::component::Reader) or
//! [`Writer`](crate::component::Writer) per media type, and every
//! [`MediaBuffer`](crate::buffer::MediaBuffer) records which stream it
//! belongs to. Format details (resolution, sample rate, codec) travel
//! separately in [`MediaMeta`](crate::metadata::MediaMeta).

use std::fmt;

/// Kind of elementary stream carried by a connection or buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaType {
    /// Video frames or packets.
    Video,
    /// Audio samples or packets.
    Audio,
    /// Subtitle cues.
    Subtitle,
    /// Still images.
    Image,
}

impl MediaType {
    /// All media types, in a stable order.
    pub const ALL: [MediaType; 4] = [
        MediaType::Video,
        MediaType::Audio,
        MediaType::Subtitle,
        MediaType::Image,
    ];

    /// Short lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Subtitle => "subtitle",
            MediaType::Image => "image",
        }
    }

    /// Index into per-media-type tables (`0..4`).
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether streams of this type are presented against the media clock.
    #[inline]
    pub const fn is_timed(self) -> bool {
        matches!(
            self,
            MediaType::Video | MediaType::Audio | MediaType::Subtitle
        )
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
