//! Shared lifecycle bookkeeping for component implementations.

use super::event::Event;
use super::state::{ComponentState, Transition};
use super::Listener;
use crate::actor::{ActorHandle, Message};
use crate::error::{Completion, Error, Result};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct LifecycleState {
    /// State after the last completed transition.
    current: ComponentState,
    /// State after every accepted transition completes.
    target: ComponentState,
}

/// State and listener bookkeeping shared between a component's public
/// methods and its actor thread.
///
/// Public methods call [`request`](Self::request): the transition is
/// validated against the state all accepted requests lead to, then posted to
/// the actor, and the caller gets [`Completion::Async`]. The actor handler
/// does the work and calls [`complete`](Self::complete), which commits the
/// state and reports the completion event.
pub struct Lifecycle {
    name: String,
    state: Mutex<LifecycleState>,
    listener: Mutex<Option<Arc<dyn Listener>>>,
}

impl Lifecycle {
    /// Create bookkeeping for a component named `name`.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(LifecycleState::default()),
            listener: Mutex::new(None),
        })
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// State after the last completed transition.
    pub fn state(&self) -> ComponentState {
        self.state.lock().unwrap().current
    }

    /// State after all accepted transitions complete.
    pub fn target(&self) -> ComponentState {
        self.state.lock().unwrap().target
    }

    /// Check if the component is moving data.
    pub fn is_started(&self) -> bool {
        self.state().is_active()
    }

    /// Register the listener, replacing any previous one.
    pub fn set_listener(&self, listener: Arc<dyn Listener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    /// Check if a listener is registered.
    pub fn has_listener(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }

    /// Deliver `event` to the listener.
    ///
    /// Fails with [`Error::NotInited`] when no listener is registered; the
    /// event is dropped.
    pub fn notify(&self, event: Event) -> Result<()> {
        let listener = self.listener.lock().unwrap().clone();
        match listener {
            Some(listener) => {
                listener.on_event(event);
                Ok(())
            }
            None => {
                tracing::debug!("{}: no listener, dropping event: {}", self.name, event);
                Err(Error::NotInited(format!("{} has no listener", self.name)))
            }
        }
    }

    /// Apply `transition` immediately and synchronously.
    ///
    /// Used for transitions that complete without the actor, like `init`.
    pub fn apply(&self, transition: Transition) -> Result<ComponentState> {
        let mut state = self.state.lock().unwrap();
        if state.current != state.target {
            return Err(Error::InvalidOperation(format!(
                "{}: {} while a transition is in flight",
                self.name, transition
            )));
        }
        let next = state.current.apply(transition)?;
        state.current = next;
        state.target = next;
        tracing::debug!("{}: {} -> {}", self.name, transition, next);
        Ok(next)
    }

    /// Accept `transition` and post it to `actor` as a message.
    ///
    /// `param` travels in `param2` (the seek position for `seek`).
    pub fn request(&self, actor: &ActorHandle, transition: Transition, param: i64) -> Result<Completion> {
        let mut state = self.state.lock().unwrap();
        let next = state.target.apply(transition)?;
        if !actor.is_running() {
            return Err(Error::ActorExited);
        }
        state.target = next;
        drop(state);

        tracing::debug!("{}: {} requested", self.name, transition);
        actor.post(Message::new(transition.message_kind()).with_param2(param));
        Ok(Completion::Async)
    }

    /// Commit the outcome of an asynchronous transition and report it.
    ///
    /// On failure the error is reported as [`Event::Error`] followed by a
    /// failed completion. Stop and reset still reach their target state;
    /// other transitions fall back to the last committed state. A transition
    /// that became invalid because an earlier one failed is reported as
    /// failed with `InvalidOperation`.
    pub fn complete(&self, transition: Transition, outcome: Result<()>) {
        let (outcome, committed) = {
            let mut state = self.state.lock().unwrap();
            let outcome = match (outcome, state.current.after(transition)) {
                (Ok(()), None) => Err(Error::InvalidOperation(format!(
                    "cannot {} from {}",
                    transition, state.current
                ))),
                (outcome, _) => outcome,
            };
            let next = match &outcome {
                Ok(()) => state.current.after(transition),
                Err(_) if transition.must_complete() => Some(
                    state
                        .current
                        .after(transition)
                        .unwrap_or(ComponentState::Stopped),
                ),
                Err(_) => None,
            };
            match next {
                Some(next) => state.current = next,
                None => state.target = state.current,
            }
            (outcome, state.current)
        };

        let event = match outcome {
            Ok(()) => {
                tracing::debug!("{}: {} complete, now {}", self.name, transition, committed);
                Event::completed(transition)
            }
            Err(err) => {
                tracing::warn!("{}: {} failed: {}", self.name, transition, err);
                let _ = self.notify(Event::Error(err.code()));
                Event::failed(transition, err.code())
            }
        };
        let _ = self.notify(event);
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Lifecycle")
            .field("name", &self.name)
            .field("current", &state.current)
            .field("target", &state.target)
            .finish()
    }
}
