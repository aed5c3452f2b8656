//! Single-threaded message actor.
//!
//! Each component serializes its state changes onto one [`MessageActor`].
//! Other threads talk to it through an [`ActorHandle`]:
//!
//! - [`post`](ActorHandle::post) / [`post_delayed`](ActorHandle::post_delayed):
//!   fire-and-forget, never blocks
//! - [`send`](ActorHandle::send): blocks until the handler calls
//!   [`ActorContext::reply`]
//!
//! Handlers are plain closures registered per message kind in a
//! [`DispatchTable`] before the actor starts. A handler that panics stops
//! the actor; every blocked sender then gets [`Error::ActorExited`].
//!
//! [`Error::ActorExited`]: crate::error::Error::ActorExited

mod dispatch;
mod looper;
mod message;

pub use dispatch::{DispatchTable, Handler};
pub use looper::{ActorContext, ActorHandle, MessageActor};
pub use message::{Message, MessageParams, Object};

use std::time::Duration;

/// Configuration for a [`MessageActor`].
#[derive(Debug, Clone)]
pub struct ActorConfig {
    /// Name of the actor thread, also used in logs.
    pub thread_name: String,
    /// Upper bound for [`ActorHandle::send`]. `None` waits indefinitely.
    pub send_timeout: Option<Duration>,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            thread_name: "cadence-actor".to_string(),
            send_timeout: None,
        }
    }
}

impl ActorConfig {
    /// Default configuration with a custom thread name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            thread_name: name.into(),
            ..Self::default()
        }
    }

    /// Bound every `send` by `timeout`.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }
}
