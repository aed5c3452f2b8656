//! # Cadence
//!
//! The core of a pluggable media pipeline: independent components (demuxers,
//! codecs, renderers) wired into producer/consumer graphs, driven through an
//! asynchronous lifecycle, and kept audio/video synchronized in real time.
//!
//! ## Building Blocks
//!
//! - **Message actors** ([`actor`]): one thread per component, a FIFO of
//!   typed messages with optional due times, and bounded synchronous calls
//! - **Component contract** ([`component`]): `Reader`/`Writer` data
//!   interfaces, the lifecycle state machine, and the event listener
//! - **Flow control** ([`flow`]): buffer accounting (`Monitor`) and a
//!   high/low watermark producer gate (`TrafficControl`)
//! - **Media clock** ([`clock`]): anchor-based position with pause, flush and
//!   play rate; one owner, many readers
//! - **Pipeline** ([`pipeline`]): an arena that owns components and drives
//!   them together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cadence::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> cadence::Result<()> {
//! let source = Arc::new(AppSource::new(AppSourceConfig::default())?);
//! let sink = Arc::new(AppSink::new(AppSinkConfig::video())?);
//! sink.set_render(|buffer| println!("frame at {:?}us", buffer.pts()));
//!
//! let mut pipeline = Pipeline::new();
//! let src = pipeline.add(source.clone())?;
//! let dst = pipeline.add(sink)?;
//! pipeline.connect(src, dst, MediaType::Video)?;
//!
//! let mut events = pipeline.subscribe();
//! pipeline.play().await?;
//! for pts in 0..30 {
//!     source.push(MediaBuffer::new(MediaType::Video, vec![0u8; 16]).with_pts(pts * 33_333))?;
//! }
//! source.end_stream()?;
//! let _ = events.wait_eos().await;
//! pipeline.stop().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod actor;
pub mod buffer;
pub mod clock;
pub mod component;
pub mod components;
pub mod error;
pub mod flow;
pub mod format;
pub mod metadata;
pub mod pipeline;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::actor::{ActorConfig, DispatchTable, Message, MessageActor, MessageParams};
    pub use crate::buffer::MediaBuffer;
    pub use crate::clock::{ClockWrapper, MediaClock, SinkRole, SystemTimeSource, TimeSource};
    pub use crate::component::{
        Component, ComponentState, Event, Listener, ReadOutcome, Reader, WriteOutcome, Writer,
    };
    pub use crate::components::{AppSink, AppSinkConfig, AppSource, AppSourceConfig};
    pub use crate::error::{Completion, Error, Result};
    pub use crate::flow::{Monitor, TrafficControl, WaterMarks};
    pub use crate::format::MediaType;
    pub use crate::metadata::MediaMeta;
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineEvent};
}

pub use error::{Error, Result};
