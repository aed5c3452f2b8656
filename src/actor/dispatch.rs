//! Message kind to handler table.

use super::{ActorContext, Message};
use std::collections::HashMap;

/// Handler invoked on the actor thread for one message kind.
pub type Handler<S> = Box<dyn FnMut(&mut S, Message, &ActorContext) + Send>;

/// Table of handlers registered before the actor starts.
///
/// # Example
///
/// ```rust
/// use cadence::actor::DispatchTable;
///
/// struct Counter(u64);
///
/// let table = DispatchTable::<Counter>::new()
///     .on(1, |state, msg, _ctx| state.0 += msg.param1())
///     .on(2, |state, msg, ctx| {
///         ctx.reply(&msg, cadence::actor::MessageParams::new().with_param1(state.0));
///     });
/// assert_eq!(table.len(), 2);
/// ```
pub struct DispatchTable<S> {
    handlers: HashMap<u32, Handler<S>>,
}

impl<S> DispatchTable<S> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `kind`, replacing any previous one.
    pub fn on<F>(mut self, kind: u32, handler: F) -> Self
    where
        F: FnMut(&mut S, Message, &ActorContext) + Send + 'static,
    {
        if self.handlers.insert(kind, Box::new(handler)).is_some() {
            tracing::warn!("handler for message kind {} replaced", kind);
        }
        self
    }

    /// Check if `kind` has a handler.
    pub fn handles(&self, kind: u32) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler for `msg`. Unknown kinds are logged and dropped.
    ///
    /// Returns `false` if no handler was found.
    pub(super) fn dispatch(&mut self, state: &mut S, msg: Message, ctx: &ActorContext) -> bool {
        match self.handlers.get_mut(&msg.kind()) {
            Some(handler) => {
                handler(state, msg, ctx);
                true
            }
            None => {
                tracing::warn!("{}: dropping message of unknown kind {}", ctx.name(), msg.kind());
                false
            }
        }
    }
}

impl<S> Default for DispatchTable<S> {
    fn default() -> Self {
        Self::new()
    }
}
