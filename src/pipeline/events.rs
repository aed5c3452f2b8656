//! Pipeline event bus.
//!
//! Every component's listener publishes into one broadcast channel; any
//! number of receivers observe it. Receivers only see events sent after they
//! subscribed, and a receiver that falls behind skips the oldest events.

use super::{ComponentId, PipelineState};
use crate::component::Event;
use crate::error::{Error, ErrorCode, Result};
use futures::Stream;
use futures::stream::BoxStream;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;

/// Events observed on a [`Pipeline`](super::Pipeline).
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The pipeline finished a transition.
    StateChanged {
        /// Previous state.
        from: PipelineState,
        /// New state.
        to: PipelineState,
    },

    /// An event reported by one component, forwarded unchanged.
    Component {
        /// The reporting component.
        id: ComponentId,
        /// Its name.
        name: String,
        /// What it reported.
        event: Event,
    },

    /// Every sink reached end of stream.
    Eos,

    /// A component reported an error. Also visible as a
    /// [`Component`](PipelineEvent::Component) event.
    Error {
        /// The failing component.
        id: ComponentId,
        /// Its name.
        name: String,
        /// What went wrong.
        code: ErrorCode,
    },
}

impl PipelineEvent {
    /// The component this event came from, if any.
    pub fn component(&self) -> Option<ComponentId> {
        match self {
            PipelineEvent::Component { id, .. } | PipelineEvent::Error { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::StateChanged { from, to } => write!(f, "pipeline {:?} -> {:?}", from, to),
            PipelineEvent::Component { name, event, .. } => write!(f, "{}: {}", name, event),
            PipelineEvent::Eos => f.write_str("end of stream"),
            PipelineEvent::Error { name, code, .. } => write!(f, "{} failed: {:?}", name, code),
        }
    }
}

/// Publishing side of the bus. Cheap to clone.
#[derive(Clone)]
pub struct EventSender {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventSender {
    /// Create a bus that buffers up to `capacity` events per receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish `event`. Returns how many receivers will see it; zero
    /// receivers is not an error.
    pub fn send(&self, event: PipelineEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub(crate) fn send_state_changed(&self, from: PipelineState, to: PipelineState) {
        self.send(PipelineEvent::StateChanged { from, to });
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Start receiving events sent from now on.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Events sent from now on, as a stream.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiving side of the bus.
pub struct EventReceiver {
    rx: broadcast::Receiver<PipelineEvent>,
}

impl EventReceiver {
    /// Next event, or `None` once the pipeline is gone.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("event receiver fell behind, skipped {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }

    /// Skip events until one matches `want`.
    pub async fn wait_for(&mut self, mut want: impl FnMut(&PipelineEvent) -> bool) -> Option<PipelineEvent> {
        while let Some(event) = self.recv().await {
            if want(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Wait until every sink has reached end of stream.
    ///
    /// Fails with [`Error::OpFailed`] naming the component if one reports an
    /// error first.
    pub async fn wait_eos(&mut self) -> Result<()> {
        let event = self
            .wait_for(|e| matches!(e, PipelineEvent::Eos | PipelineEvent::Error { .. }))
            .await;
        match event {
            Some(PipelineEvent::Eos) => Ok(()),
            Some(PipelineEvent::Error { name, code, .. }) => {
                Err(Error::OpFailed(format!("{} reported {:?} before end of stream", name, code)))
            }
            _ => Err(Error::OpFailed("pipeline dropped before end of stream".into())),
        }
    }
}

/// [`Stream`] of pipeline events, ending when the pipeline is dropped.
pub struct EventStream {
    inner: BoxStream<'static, PipelineEvent>,
}

impl EventStream {
    /// Wrap a receiver.
    pub fn new(receiver: EventReceiver) -> Self {
        let inner = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        });
        Self { inner: Box::pin(inner) }
    }
}

impl Stream for EventStream {
    type Item = PipelineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<PipelineEvent>> {
        self.inner.as_mut().poll_next(cx)
    }
}
