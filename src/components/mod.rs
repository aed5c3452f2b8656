//! Reference components.
//!
//! - [`AppSource`]: application code pushes buffers into the pipeline
//! - [`AppSink`]: buffers are handed to application code when due on the
//!   media clock

mod app_sink;
mod app_source;

pub use app_sink::{AppSink, AppSinkConfig, AppSinkStats, RenderFn};
pub use app_source::{AppSource, AppSourceConfig, AppSourceReader, AppSourceWriter};
