//! AppSource component for injecting media from application code.
//!
//! The application pushes buffers through the source's [`Writer`]; the
//! pipeline either pulls them through its [`Reader`] or, when a downstream
//! writer is attached with [`add_sink`](Component::add_sink), the source
//! pushes them itself from its actor.
//!
//! With [`water_marks`](AppSourceConfig::water_marks) set, every accepted
//! buffer carries a [`Tracker`] on the source's [`TrafficControl`], so the
//! application can block in [`wait_on_full`](TrafficControl::wait_on_full)
//! until downstream has released enough of them. Stop and reset release any
//! producer blocked there.

use crate::actor::{ActorConfig, ActorContext, DispatchTable, Message, MessageActor, MessageParams};
use crate::buffer::MediaBuffer;
use crate::component::{
    Component, ComponentFlags, ComponentState, Event, Lifecycle, Listener, MediaType, ReadOutcome,
    Reader, SinkLink, Transition, WriteOutcome, Writer,
};
use crate::error::{Completion, Error, Result};
use crate::flow::{BufferQueue, PushError, QueueStats, Tracker, TrafficControl, WaterMarks};
use crate::metadata::MediaMeta;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ADD_SINK: u32 = 100;
const PUMP: u32 = 101;

/// Buffers moved per pump message before yielding to other messages.
const PUMP_BATCH: usize = 16;

/// Configuration for an [`AppSource`].
#[derive(Debug, Clone)]
pub struct AppSourceConfig {
    /// Component name.
    pub name: String,
    /// Stream this source produces.
    pub media_type: MediaType,
    /// Maximum queued buffers before writes return `Again`.
    pub capacity: usize,
    /// Longest a read waits for a buffer before returning `Again`.
    pub read_wait: Duration,
    /// Retry interval when pushing downstream hits `Again` or an empty queue.
    pub pump_interval: Duration,
    /// Gate buffers in flight downstream of this source. `None` disables
    /// tracking.
    pub water_marks: Option<WaterMarks>,
}

impl Default for AppSourceConfig {
    fn default() -> Self {
        Self {
            name: "appsrc".to_string(),
            media_type: MediaType::Video,
            capacity: 64,
            read_wait: Duration::from_millis(10),
            pump_interval: Duration::from_millis(5),
            water_marks: None,
        }
    }
}

struct SourceShared {
    lifecycle: Arc<Lifecycle>,
    queue: BufferQueue,
    traffic: Option<Arc<TrafficControl>>,
    media_type: MediaType,
    eos_queued: AtomicBool,
    eos_delivered: AtomicBool,
    meta: Mutex<MediaMeta>,
}

impl SourceShared {
    fn clear_eos(&self) {
        self.eos_queued.store(false, Ordering::Release);
        self.eos_delivered.store(false, Ordering::Release);
    }

    fn unblock_producers(&self, unblock: bool) {
        if let Some(traffic) = &self.traffic {
            traffic.unblock_wait(unblock);
        }
    }
}

/// Application-facing push interface of an [`AppSource`].
pub struct AppSourceWriter {
    shared: Arc<SourceShared>,
}

impl Writer for AppSourceWriter {
    fn write(&self, mut buffer: MediaBuffer) -> Result<WriteOutcome> {
        if self.shared.eos_queued.load(Ordering::Acquire) {
            return Err(Error::InvalidOperation(format!(
                "{}: end of stream already queued",
                self.shared.lifecycle.name()
            )));
        }
        let is_eos = buffer.is_eos();
        if let Some(traffic) = self.shared.traffic.as_ref().filter(|_| !is_eos) {
            buffer.attach_tracker(Tracker::new(Arc::clone(traffic) as _));
        }
        match self.shared.queue.try_push(buffer) {
            Ok(()) => {
                if is_eos {
                    self.shared.eos_queued.store(true, Ordering::Release);
                }
                Ok(WriteOutcome::Accepted)
            }
            Err(PushError::Full(mut buffer)) => {
                buffer.take_tracker();
                Ok(WriteOutcome::Again(buffer))
            }
            Err(PushError::Flushing(_)) => Err(Error::InvalidOperation(format!(
                "{}: flushing",
                self.shared.lifecycle.name()
            ))),
        }
    }

    fn media_meta(&self) -> MediaMeta {
        self.shared.meta.lock().unwrap().clone()
    }
}

/// Downstream-facing pull interface of an [`AppSource`].
pub struct AppSourceReader {
    shared: Arc<SourceShared>,
    read_wait: Duration,
}

impl Reader for AppSourceReader {
    fn read(&self) -> Result<ReadOutcome> {
        if self.shared.eos_delivered.load(Ordering::Acquire) {
            return Ok(ReadOutcome::Eos);
        }
        if !self.shared.lifecycle.is_started() {
            return Ok(ReadOutcome::Again);
        }
        match self.shared.queue.pop_timeout(self.read_wait) {
            Some(buffer) if buffer.is_eos() => {
                self.shared.eos_delivered.store(true, Ordering::Release);
                Ok(ReadOutcome::Eos)
            }
            Some(buffer) => Ok(ReadOutcome::Buffer(buffer)),
            None => Ok(ReadOutcome::Again),
        }
    }

    fn media_meta(&self) -> MediaMeta {
        self.shared.meta.lock().unwrap().clone()
    }
}

/// Actor-owned state.
struct SourceWorker {
    shared: Arc<SourceShared>,
    sinks: Vec<SinkLink>,
    held: Option<MediaBuffer>,
    pumping: bool,
    pump_interval: Duration,
}

impl SourceWorker {
    fn transition(&mut self, msg: Message, ctx: &ActorContext) {
        let Some(transition) = Transition::from_message_kind(msg.kind()) else {
            return;
        };
        let lifecycle = Arc::clone(&self.shared.lifecycle);

        match transition {
            Transition::Prepare => {
                self.shared.unblock_producers(false);
                lifecycle.complete(transition, Ok(()));
            }
            Transition::Start | Transition::Resume => {
                self.shared.queue.set_flushing(false);
                lifecycle.complete(transition, Ok(()));
                self.start_pump(ctx);
            }
            Transition::Seek | Transition::Flush => {
                tracing::debug!("{}: {} to {}us", lifecycle.name(), transition, msg.param2());
                self.held = None;
                self.shared.queue.flush();
                self.shared.clear_eos();
                lifecycle.complete(transition, Ok(()));
            }
            Transition::Stop => {
                self.shared.unblock_producers(true);
                self.held = None;
                self.shared.queue.flush();
                self.shared.clear_eos();
                lifecycle.complete(transition, Ok(()));
            }
            Transition::Reset => {
                self.pumping = false;
                self.shared.unblock_producers(true);
                self.shared.queue.set_flushing(true);
                self.held = None;
                self.shared.queue.flush();
                self.sinks.clear();
                self.shared.clear_eos();
                lifecycle.complete(transition, Ok(()));
            }
            _ => lifecycle.complete(transition, Ok(())),
        }
    }

    fn add_sink(&mut self, msg: Message, ctx: &ActorContext) {
        if let Some(link) = msg.object::<SinkLink>() {
            tracing::debug!("{}: pushing {} to {:?}", ctx.name(), link.media_type, link.peer);
            self.sinks.push(link.clone());
        }
        ctx.reply(&msg, MessageParams::new().with_param1(self.sinks.len() as u64));
        if self.shared.lifecycle.is_started() {
            self.start_pump(ctx);
        }
    }

    fn start_pump(&mut self, ctx: &ActorContext) {
        if !self.pumping && !self.sinks.is_empty() {
            self.pumping = true;
            ctx.post(Message::new(PUMP));
        }
    }

    fn pump(&mut self, ctx: &ActorContext) {
        if !self.pumping {
            return;
        }
        if !self.shared.lifecycle.is_started() {
            self.pumping = false;
            return;
        }

        let mut stalled = false;
        for _ in 0..PUMP_BATCH {
            let Some(buffer) = self.held.take().or_else(|| self.shared.queue.try_pop()) else {
                stalled = true;
                break;
            };
            let Some(link) = self
                .sinks
                .iter()
                .find(|l| l.media_type == buffer.media_type())
                .or(self.sinks.first())
            else {
                self.held = Some(buffer);
                self.pumping = false;
                return;
            };

            let is_eos = buffer.is_eos();
            match link.writer.write(buffer) {
                Ok(WriteOutcome::Accepted) if is_eos => {
                    tracing::debug!("{}: end of stream pushed downstream", ctx.name());
                    self.shared.eos_delivered.store(true, Ordering::Release);
                    self.pumping = false;
                    return;
                }
                Ok(WriteOutcome::Accepted) => {}
                Ok(WriteOutcome::Again(buffer)) => {
                    self.held = Some(buffer);
                    stalled = true;
                    break;
                }
                Err(err) => {
                    tracing::warn!("{}: downstream write failed: {}", ctx.name(), err);
                    let _ = self.shared.lifecycle.notify(Event::Error(err.code()));
                }
            }
        }

        if stalled {
            ctx.post_delayed(Message::new(PUMP), self.pump_interval);
        } else {
            ctx.post(Message::new(PUMP));
        }
    }
}

/// A source component fed by the application.
///
/// # Example
///
/// ```rust
/// use cadence::buffer::MediaBuffer;
/// use cadence::component::{Component, MediaType, WriteOutcome};
/// use cadence::components::{AppSource, AppSourceConfig};
///
/// let source = AppSource::new(AppSourceConfig::default()).unwrap();
/// let outcome = source.push(MediaBuffer::new(MediaType::Video, vec![0u8; 4])).unwrap();
/// assert!(outcome.is_accepted());
/// assert_eq!(source.queue_len(), 1);
/// ```
pub struct AppSource {
    config: AppSourceConfig,
    shared: Arc<SourceShared>,
    reader: Arc<AppSourceReader>,
    writer: Arc<AppSourceWriter>,
    actor: MessageActor,
}

impl AppSource {
    /// Create a source and start its actor.
    pub fn new(config: AppSourceConfig) -> Result<Self> {
        let shared = Arc::new(SourceShared {
            lifecycle: Lifecycle::new(config.name.clone()),
            queue: BufferQueue::new(config.capacity).with_name(&config.name),
            traffic: config
                .water_marks
                .map(|marks| Arc::new(TrafficControl::new(marks).with_name(&config.name))),
            media_type: config.media_type,
            eos_queued: AtomicBool::new(false),
            eos_delivered: AtomicBool::new(false),
            meta: Mutex::new(MediaMeta::new()),
        });

        let mut table = DispatchTable::<SourceWorker>::new()
            .on(ADD_SINK, |w, msg, ctx| w.add_sink(msg, ctx))
            .on(PUMP, |w, _msg, ctx| w.pump(ctx));
        for transition in Transition::ALL {
            table = table.on(transition.message_kind(), |w, msg, ctx| w.transition(msg, ctx));
        }

        let worker = SourceWorker {
            shared: Arc::clone(&shared),
            sinks: Vec::new(),
            held: None,
            pumping: false,
            pump_interval: config.pump_interval,
        };
        let actor = MessageActor::spawn(worker, table, ActorConfig::named(config.name.clone()))?;

        Ok(Self {
            reader: Arc::new(AppSourceReader {
                shared: Arc::clone(&shared),
                read_wait: config.read_wait,
            }),
            writer: Arc::new(AppSourceWriter {
                shared: Arc::clone(&shared),
            }),
            shared,
            config,
            actor,
        })
    }

    /// Push a buffer. `Again` hands the buffer back when the queue is full.
    pub fn push(&self, buffer: MediaBuffer) -> Result<WriteOutcome> {
        self.writer.write(buffer)
    }

    /// Queue an end-of-stream marker.
    pub fn end_stream(&self) -> Result<WriteOutcome> {
        self.writer.write(MediaBuffer::eos(self.shared.media_type))
    }

    /// The application's push interface.
    pub fn app_writer(&self) -> Arc<AppSourceWriter> {
        Arc::clone(&self.writer)
    }

    /// Number of queued buffers.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Queue statistics.
    pub fn stats(&self) -> QueueStats {
        self.shared.queue.stats()
    }

    /// Gate over buffers in flight, when configured with water marks.
    pub fn traffic(&self) -> Option<Arc<TrafficControl>> {
        self.shared.traffic.clone()
    }
}

impl Component for AppSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn flags(&self) -> ComponentFlags {
        ComponentFlags::SOURCE | ComponentFlags::PLAY
    }

    fn state(&self) -> ComponentState {
        self.shared.lifecycle.state()
    }

    fn init(&self) -> Result<()> {
        self.shared.lifecycle.apply(Transition::Init)?;
        self.shared.queue.set_flushing(false);
        if let Some(traffic) = &self.shared.traffic {
            traffic.reset();
        }
        Ok(())
    }

    fn uninit(&self) -> Result<()> {
        self.shared.lifecycle.apply(Transition::Uninit).map(|_| ())
    }

    fn prepare(&self) -> Result<Completion> {
        self.shared.lifecycle.request(&self.actor, Transition::Prepare, 0)
    }

    fn start(&self) -> Result<Completion> {
        self.shared.lifecycle.request(&self.actor, Transition::Start, 0)
    }

    fn stop(&self) -> Result<Completion> {
        self.shared.lifecycle.request(&self.actor, Transition::Stop, 0)
    }

    fn pause(&self) -> Result<Completion> {
        self.shared.lifecycle.request(&self.actor, Transition::Pause, 0)
    }

    fn resume(&self) -> Result<Completion> {
        self.shared.lifecycle.request(&self.actor, Transition::Resume, 0)
    }

    fn seek(&self, position_us: i64) -> Result<Completion> {
        if position_us < 0 {
            return Err(Error::InvalidParam(format!("seek to {}us", position_us)));
        }
        self.shared.lifecycle.request(&self.actor, Transition::Seek, position_us)
    }

    fn reset(&self) -> Result<Completion> {
        self.shared.lifecycle.request(&self.actor, Transition::Reset, 0)
    }

    fn flush(&self) -> Result<Completion> {
        self.shared.lifecycle.request(&self.actor, Transition::Flush, 0)
    }

    fn drain(&self) -> Result<Completion> {
        self.shared.lifecycle.request(&self.actor, Transition::Drain, 0)
    }

    fn reader(&self, media: MediaType) -> Option<Arc<dyn Reader>> {
        (media == self.shared.media_type).then(|| Arc::clone(&self.reader) as Arc<dyn Reader>)
    }

    fn writer(&self, media: MediaType) -> Option<Arc<dyn Writer>> {
        (media == self.shared.media_type).then(|| Arc::clone(&self.writer) as Arc<dyn Writer>)
    }

    fn add_sink(&self, link: SinkLink) -> Result<()> {
        if link.media_type != self.shared.media_type {
            return Err(Error::InvalidParam(format!(
                "{}: produces {}, not {}",
                self.config.name, self.shared.media_type, link.media_type
            )));
        }
        self.actor.send(Message::new(ADD_SINK).with_object(link))?;
        Ok(())
    }

    fn set_parameter(&self, meta: &MediaMeta) -> Result<()> {
        self.shared.meta.lock().unwrap().merge(meta);
        Ok(())
    }

    fn parameter(&self) -> Result<MediaMeta> {
        Ok(self.shared.meta.lock().unwrap().clone())
    }

    fn set_listener(&self, listener: Arc<dyn Listener>) -> Result<()> {
        self.shared.lifecycle.set_listener(listener);
        Ok(())
    }
}
