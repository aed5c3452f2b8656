//! Bounded FIFO of media buffers.
//!
//! [`BufferQueue`] is the storage behind most Reader/Writer pairs. It never
//! blocks a writer: a full queue hands the buffer back. Readers may wait for
//! a bounded time.

use crate::buffer::MediaBuffer;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// A push that the queue refused. The buffer is handed back untouched.
#[derive(Debug)]
pub enum PushError {
    /// Queue is at capacity; retry later.
    Full(MediaBuffer),
    /// Queue is flushing; the buffer should be discarded.
    Flushing(MediaBuffer),
}

impl PushError {
    /// Recover the refused buffer.
    pub fn into_inner(self) -> MediaBuffer {
        match self {
            PushError::Full(b) | PushError::Flushing(b) => b,
        }
    }
}

/// Statistics about queue operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Current number of buffers in the queue.
    pub current_buffers: usize,
    /// Total buffers pushed to the queue.
    pub total_pushed: u64,
    /// Total buffers popped from the queue.
    pub total_popped: u64,
    /// Total buffers discarded by flush.
    pub total_flushed: u64,
}

/// A bounded, thread-safe FIFO of [`MediaBuffer`]s.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct BufferQueue {
    name: Arc<str>,
    inner: Arc<QueueInner>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    not_empty: Condvar,
}

struct QueueState {
    buffers: VecDeque<MediaBuffer>,
    capacity: usize,
    flushing: bool,
    total_pushed: u64,
    total_popped: u64,
    total_flushed: u64,
}

impl BufferQueue {
    /// Create a queue holding at most `capacity` buffers.
    pub fn new(capacity: usize) -> Self {
        Self {
            name: Arc::from(format!("queue-{}", capacity)),
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    buffers: VecDeque::with_capacity(capacity.min(256)),
                    capacity: capacity.max(1),
                    flushing: false,
                    total_pushed: 0,
                    total_popped: 0,
                    total_flushed: 0,
                }),
                not_empty: Condvar::new(),
            }),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Arc::from(name.as_ref());
        self
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of buffers.
    pub fn capacity(&self) -> usize {
        self.inner.state.lock().unwrap().capacity
    }

    /// Current number of buffers.
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().buffers.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the queue is at capacity.
    pub fn is_full(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        state.buffers.len() >= state.capacity
    }

    /// Append a buffer without blocking.
    pub fn try_push(&self, buffer: MediaBuffer) -> Result<(), PushError> {
        let mut state = self.inner.state.lock().unwrap();
        if state.flushing {
            return Err(PushError::Flushing(buffer));
        }
        if state.buffers.len() >= state.capacity {
            return Err(PushError::Full(buffer));
        }
        state.buffers.push_back(buffer);
        state.total_pushed += 1;
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Take the oldest buffer without blocking.
    pub fn try_pop(&self) -> Option<MediaBuffer> {
        let mut state = self.inner.state.lock().unwrap();
        let buffer = state.buffers.pop_front()?;
        state.total_popped += 1;
        Some(buffer)
    }

    /// Take the oldest buffer, waiting at most `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or when the queue is flushing.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<MediaBuffer> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock().unwrap();
        while state.buffers.is_empty() && !state.flushing {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (s, _) = self
                .inner
                .not_empty
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = s;
        }
        let buffer = state.buffers.pop_front()?;
        state.total_popped += 1;
        Some(buffer)
    }

    /// Look at the oldest buffer's end-of-stream flag without removing it.
    pub fn front_is_eos(&self) -> Option<bool> {
        let state = self.inner.state.lock().unwrap();
        state.buffers.front().map(|b| b.is_eos())
    }

    /// Discard all queued buffers, returning how many were dropped.
    ///
    /// The buffers are dropped outside the lock so their release callbacks
    /// may touch this queue.
    pub fn flush(&self) -> usize {
        let drained: Vec<MediaBuffer> = {
            let mut state = self.inner.state.lock().unwrap();
            let drained: Vec<_> = state.buffers.drain(..).collect();
            state.total_flushed += drained.len() as u64;
            drained
        };
        let count = drained.len();
        if count > 0 {
            tracing::debug!("{}: flushed {} buffers", self.name, count);
        }
        count
    }

    /// Enter or leave flushing mode. Entering wakes all waiting readers.
    pub fn set_flushing(&self, flushing: bool) {
        let mut state = self.inner.state.lock().unwrap();
        state.flushing = flushing;
        if flushing {
            self.inner.not_empty.notify_all();
        }
    }

    /// Get statistics about the queue.
    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock().unwrap();
        QueueStats {
            current_buffers: state.buffers.len(),
            total_pushed: state.total_pushed,
            total_popped: state.total_popped,
            total_flushed: state.total_flushed,
        }
    }
}

impl std::fmt::Debug for BufferQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferQueue")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish()
    }
}
