//! The actor thread, its handle, and the run loop.

use super::{ActorConfig, DispatchTable, Message, MessageParams};
use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

enum Reply {
    Pending,
    Ready(MessageParams),
    Rejected(u32),
}

struct ActorState {
    queue: VecDeque<Message>,
    responses: HashMap<u64, Reply>,
    next_response_id: u64,
    stopping: bool,
    exited: bool,
}

struct Shared {
    name: Arc<str>,
    state: Mutex<ActorState>,
    /// Signals the actor thread: new message or stop request.
    wakeup: Condvar,
    /// Signals blocked senders: a reply arrived or the actor exited.
    replied: Condvar,
    actor_thread: OnceLock<ThreadId>,
    send_timeout: Option<Duration>,
}

/// Cloneable handle for talking to a [`MessageActor`].
///
/// All methods are safe to call from any thread. `send` must not be called
/// from the actor's own thread.
#[derive(Clone)]
pub struct ActorHandle {
    shared: Arc<Shared>,
}

impl ActorHandle {
    /// Actor name, used in logs.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Enqueue `msg` for immediate dispatch. Never blocks.
    ///
    /// Messages posted after [`exit`](Self::exit) are dropped.
    pub fn post(&self, msg: Message) {
        self.post_delayed(msg, Duration::ZERO);
    }

    /// Enqueue `msg` to be dispatched no earlier than `delay` from now.
    ///
    /// Only the head of the queue is checked for its due time, so a message
    /// queued behind a later-due one waits for it.
    pub fn post_delayed(&self, mut msg: Message, delay: Duration) {
        msg.response_id = 0;
        msg.due = Instant::now() + delay;
        let mut state = self.shared.state.lock().unwrap();
        if state.stopping || state.exited {
            tracing::debug!("{}: actor stopped, dropping message kind {}", self.shared.name, msg.kind());
            return;
        }
        state.queue.push_back(msg);
        self.shared.wakeup.notify_one();
    }

    /// Post `msg` and block until the handler replies.
    ///
    /// Uses the actor's configured send timeout, if any.
    pub fn send(&self, msg: Message) -> Result<MessageParams> {
        self.send_until(msg, self.shared.send_timeout.map(|t| Instant::now() + t))
    }

    /// Post `msg` and block at most `timeout` for the reply.
    pub fn send_timeout(&self, msg: Message, timeout: Duration) -> Result<MessageParams> {
        self.send_until(msg, Some(Instant::now() + timeout))
    }

    fn send_until(&self, mut msg: Message, deadline: Option<Instant>) -> Result<MessageParams> {
        if self.is_actor_thread() {
            return Err(Error::InvalidOperation(format!(
                "{}: send from the actor thread would deadlock",
                self.shared.name
            )));
        }

        let mut state = self.shared.state.lock().unwrap();
        if state.stopping || state.exited {
            return Err(Error::ActorExited);
        }
        let id = state.next_response_id;
        state.next_response_id = state.next_response_id.wrapping_add(1).max(1);
        state.responses.insert(id, Reply::Pending);

        let kind = msg.kind();
        msg.response_id = id;
        msg.due = Instant::now();
        state.queue.push_back(msg);
        self.shared.wakeup.notify_one();

        loop {
            if !matches!(state.responses.get(&id), Some(Reply::Pending)) {
                return match state.responses.remove(&id) {
                    Some(Reply::Ready(params)) => Ok(params),
                    Some(Reply::Rejected(kind)) => Err(Error::Unsupported(format!(
                        "no handler for message kind {}",
                        kind
                    ))),
                    _ => Err(Error::ActorExited),
                };
            }
            if state.exited {
                state.responses.remove(&id);
                return Err(Error::ActorExited);
            }
            match deadline {
                None => state = self.shared.replied.wait(state).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.responses.remove(&id);
                        return Err(Error::Timeout(format!(
                            "{}: no reply to message kind {}",
                            self.shared.name, kind
                        )));
                    }
                    state = self
                        .shared
                        .replied
                        .wait_timeout(state, deadline - now)
                        .unwrap()
                        .0;
                }
            }
        }
    }

    /// Deliver the reply for `response_id` and wake its sender.
    ///
    /// No-op for id 0 or for ids nobody is waiting on (the sender may have
    /// timed out).
    pub fn post_response(&self, response_id: u64, params: MessageParams) {
        if response_id == 0 {
            return;
        }
        if !self.fill_reply(response_id, Reply::Ready(params)) {
            tracing::debug!("{}: no sender waiting on response {}", self.shared.name, response_id);
        }
    }

    /// Ask the actor to stop once its queue is empty. Idempotent.
    pub fn exit(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if !state.stopping {
            state.stopping = true;
            tracing::debug!("{}: exit requested", self.shared.name);
        }
        self.shared.wakeup.notify_all();
    }

    /// Check if the actor still accepts messages.
    pub fn is_running(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        !state.stopping && !state.exited
    }

    /// Check if the actor thread has left its run loop.
    pub fn has_exited(&self) -> bool {
        self.shared.state.lock().unwrap().exited
    }

    /// Number of queued messages.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().unwrap().queue.len()
    }

    /// Check if the caller is running on the actor thread.
    pub fn is_actor_thread(&self) -> bool {
        self.shared.actor_thread.get() == Some(&std::thread::current().id())
    }

    fn reject(&self, response_id: u64, kind: u32) {
        if response_id != 0 {
            self.fill_reply(response_id, Reply::Rejected(kind));
        }
    }

    fn fill_reply(&self, response_id: u64, reply: Reply) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        match state.responses.get_mut(&response_id) {
            Some(slot) if matches!(slot, Reply::Pending) => {
                *slot = reply;
                self.shared.replied.notify_all();
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle")
            .field("name", &self.shared.name)
            .finish()
    }
}

/// What a handler sees of its own actor.
pub struct ActorContext {
    handle: ActorHandle,
}

impl ActorContext {
    /// Actor name.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Handle to this actor, e.g. for handing to worker threads.
    pub fn handle(&self) -> &ActorHandle {
        &self.handle
    }

    /// Reply to the sender of `msg`. No-op for posted messages.
    pub fn reply(&self, msg: &Message, params: MessageParams) {
        self.handle.post_response(msg.response_id(), params);
    }

    /// Post a message to this actor.
    pub fn post(&self, msg: Message) {
        self.handle.post(msg);
    }

    /// Post a delayed message to this actor.
    pub fn post_delayed(&self, msg: Message, delay: Duration) {
        self.handle.post_delayed(msg, delay);
    }

    /// Stop after the queue drains.
    pub fn stop(&self) {
        self.handle.exit();
    }
}

/// A dedicated thread that serially dispatches [`Message`]s to handlers
/// operating on owned state `S`.
///
/// Dropping the actor requests exit and joins the thread, so any messages
/// already queued are still handled.
///
/// # Example
///
/// ```rust
/// use cadence::actor::{ActorConfig, DispatchTable, Message, MessageActor, MessageParams};
///
/// const ADD: u32 = 1;
/// const GET: u32 = 2;
///
/// let table = DispatchTable::<u64>::new()
///     .on(ADD, |sum, msg, _| *sum += msg.param1())
///     .on(GET, |sum, msg, ctx| ctx.reply(&msg, MessageParams::new().with_param1(*sum)));
///
/// let actor = MessageActor::spawn(0u64, table, ActorConfig::named("adder")).unwrap();
/// actor.post(Message::new(ADD).with_param1(40));
/// actor.post(Message::new(ADD).with_param1(2));
/// let reply = actor.send(Message::new(GET)).unwrap();
/// assert_eq!(reply.param1, 42);
/// ```
pub struct MessageActor {
    handle: ActorHandle,
    thread: Option<JoinHandle<()>>,
}

impl MessageActor {
    /// Start the actor thread.
    pub fn spawn<S: Send + 'static>(
        state: S,
        table: DispatchTable<S>,
        config: ActorConfig,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            name: Arc::from(config.thread_name.as_str()),
            state: Mutex::new(ActorState {
                queue: VecDeque::new(),
                responses: HashMap::new(),
                next_response_id: 1,
                stopping: false,
                exited: false,
            }),
            wakeup: Condvar::new(),
            replied: Condvar::new(),
            actor_thread: OnceLock::new(),
            send_timeout: config.send_timeout,
        });

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let _ = thread_shared.actor_thread.set(std::thread::current().id());
                run_loop(thread_shared, state, table)
            })
            .map_err(|e| Error::OpFailed(format!("failed to spawn actor thread: {}", e)))?;

        Ok(Self {
            handle: ActorHandle { shared },
            thread: Some(thread),
        })
    }

    /// A cloneable handle to this actor.
    pub fn handle(&self) -> ActorHandle {
        self.handle.clone()
    }

    /// Request exit and wait for the thread to finish.
    pub fn join(mut self) -> Result<()> {
        self.handle.exit();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| Error::OpFailed(format!("{}: actor thread panicked", self.handle.name()))),
            None => Ok(()),
        }
    }
}

impl std::ops::Deref for MessageActor {
    type Target = ActorHandle;

    fn deref(&self) -> &ActorHandle {
        &self.handle
    }
}

impl Drop for MessageActor {
    fn drop(&mut self) {
        self.handle.exit();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != std::thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

fn next_message(shared: &Shared) -> Option<Message> {
    let mut state = shared.state.lock().unwrap();
    loop {
        let due = match state.queue.front() {
            Some(head) => head.due,
            None if state.stopping => return None,
            None => {
                state = shared.wakeup.wait(state).unwrap();
                continue;
            }
        };
        let now = Instant::now();
        if due > now {
            // Re-check on every wake: the head may have changed.
            state = shared.wakeup.wait_timeout(state, due - now).unwrap().0;
            continue;
        }
        return state.queue.pop_front();
    }
}

fn run_loop<S>(shared: Arc<Shared>, mut state: S, mut table: DispatchTable<S>) {
    let ctx = ActorContext {
        handle: ActorHandle {
            shared: Arc::clone(&shared),
        },
    };
    tracing::debug!("{}: actor thread started", shared.name);

    while let Some(msg) = next_message(&shared) {
        let kind = msg.kind();
        let response_id = msg.response_id();
        let outcome = catch_unwind(AssertUnwindSafe(|| table.dispatch(&mut state, msg, &ctx)));
        match outcome {
            Ok(true) => {}
            Ok(false) => ctx.handle.reject(response_id, kind),
            Err(_) => {
                tracing::error!("{}: handler for message kind {} panicked, stopping", shared.name, kind);
                break;
            }
        }
    }

    let dropped: Vec<Message> = {
        let mut st = shared.state.lock().unwrap();
        st.stopping = true;
        st.exited = true;
        st.queue.drain(..).collect()
    };
    shared.replied.notify_all();
    if !dropped.is_empty() {
        tracing::debug!("{}: discarded {} queued messages", shared.name, dropped.len());
    }
    drop(dropped);
    tracing::debug!("{}: actor thread exited", shared.name);
}
