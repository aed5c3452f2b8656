//! AppSink component for handing media to application code in
//! presentation order.
//!
//! The sink pulls from an upstream reader (or takes pushes through its own
//! writer) on a render worker, waits until each buffer is due on the shared
//! media clock, and passes it to the application's render callback. Video
//! buffers that are too late are dropped.

use crate::actor::{ActorConfig, ActorContext, DispatchTable, Message, MessageActor, MessageParams};
use crate::buffer::MediaBuffer;
use crate::clock::{ClockBorrower, ClockWrapper, SinkRole, SystemTimeSource, TimeSource};
use crate::component::{
    Component, ComponentFlags, ComponentState, Event, InfoCode, Lifecycle, Listener, MediaType,
    ReadOutcome, Reader, SourceLink, Transition, WriteOutcome, Writer,
};
use crate::error::{Completion, Error, Result};
use crate::flow::{BufferQueue, PushError};
use crate::metadata::{keys, MediaMeta};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ADD_SOURCE: u32 = 100;

/// Application callback receiving each buffer when it is due.
pub type RenderFn = Box<dyn FnMut(MediaBuffer) + Send>;

/// Configuration for an [`AppSink`].
#[derive(Debug, Clone)]
pub struct AppSinkConfig {
    /// Component name.
    pub name: String,
    /// Audio or video renderer. Decides clock ownership and frame dropping.
    pub role: SinkRole,
    /// Stream this sink consumes.
    pub media_type: MediaType,
    /// Capacity of the push-mode input queue.
    pub capacity: usize,
    /// Wait for each buffer's presentation time. When off, buffers render
    /// as soon as they arrive.
    pub sync: bool,
    /// Video buffers later than this are dropped.
    pub late_drop_threshold: Duration,
    /// Longest a single early buffer is held before it renders anyway.
    pub max_render_wait: Duration,
    /// Sleep granularity of the render worker.
    pub poll_interval: Duration,
}

impl AppSinkConfig {
    /// Defaults for a video renderer.
    pub fn video() -> Self {
        Self::default()
    }

    /// Defaults for an audio renderer.
    pub fn audio() -> Self {
        Self {
            name: "audiosink".to_string(),
            role: SinkRole::AudioSink,
            media_type: MediaType::Audio,
            ..Self::default()
        }
    }

    /// Set the component name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for AppSinkConfig {
    fn default() -> Self {
        Self {
            name: "videosink".to_string(),
            role: SinkRole::VideoSink,
            media_type: MediaType::Video,
            capacity: 16,
            sync: true,
            late_drop_threshold: Duration::from_millis(40),
            max_render_wait: Duration::from_secs(1),
            poll_interval: Duration::from_millis(5),
        }
    }
}

/// Render counters of an [`AppSink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppSinkStats {
    /// Buffers passed to the render callback.
    pub rendered: u64,
    /// Late buffers dropped.
    pub dropped: u64,
}

struct SinkShared {
    config: AppSinkConfig,
    lifecycle: Arc<Lifecycle>,
    clock: Mutex<ClockWrapper>,
    time_source: Arc<dyn TimeSource>,
    queue: BufferQueue,
    running: AtomicBool,
    paused: AtomicBool,
    eos: AtomicBool,
    rendering: AtomicBool,
    /// Bumped by seek and flush; buffers taken before the bump are stale.
    flush_generation: AtomicU64,
    rendered: AtomicU64,
    dropped: AtomicU64,
    meta: Mutex<MediaMeta>,
}

impl SinkShared {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.flush_generation.load(Ordering::SeqCst) != generation
    }

    fn clear_stream_state(&self) {
        self.queue.flush();
        self.eos.store(false, Ordering::Release);
        self.rendering.store(false, Ordering::Release);
    }

    /// Block until `buffer` is due. `None` means it was dropped, flushed
    /// while waiting, or the worker is stopping.
    fn sync(&self, buffer: MediaBuffer, generation: u64) -> Option<MediaBuffer> {
        let Some(pts) = buffer.pts().filter(|_| self.config.sync) else {
            return Some(buffer);
        };

        {
            let clock = self.clock.lock().unwrap();
            if self.is_stale(generation) {
                return None;
            }
            if let Some(shared) = clock.clock().filter(|c| clock.is_owner() && !c.is_anchored()) {
                let now = shared.real_time_us();
                tracing::debug!("{}: anchoring clock at {}us", self.name(), pts);
                let _ = clock.set_anchor_time(pts, now, None);
            }
        }

        let threshold = self.config.late_drop_threshold.as_micros() as i64;
        let mut waited = Duration::ZERO;
        loop {
            if !self.is_running() || self.is_stale(generation) {
                return None;
            }
            if self.is_paused() {
                thread::sleep(self.config.poll_interval);
                continue;
            }

            let ahead = match self.clock.lock().unwrap().media_late_us(pts) {
                Ok(ahead) => ahead,
                Err(_) if self.is_stale(generation) => return None,
                // Unanchored clock: nothing to sync against yet.
                Err(_) => return Some(buffer),
            };
            if ahead < -threshold && self.config.role == SinkRole::VideoSink {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("{}: dropping frame {}us, {}us late", self.name(), pts, -ahead);
                let _ = self.lifecycle.notify(Event::Info(InfoCode::SINK_FRAME_DROPPED, pts));
                return None;
            }
            if ahead <= 0 {
                return Some(buffer);
            }
            if waited >= self.config.max_render_wait {
                tracing::debug!("{}: rendering {}us early after {:?}", self.name(), ahead, waited);
                return Some(buffer);
            }
            let nap = Duration::from_micros(ahead as u64).min(self.config.poll_interval);
            thread::sleep(nap);
            waited += nap;
        }
    }

    fn render(&self, buffer: MediaBuffer, render: &Mutex<RenderFn>) {
        let pts = buffer.pts().unwrap_or(0);
        {
            let mut guard = render.lock().unwrap();
            let callback = &mut *guard;
            callback(buffer);
        }
        self.rendered.fetch_add(1, Ordering::Relaxed);
        if !self.rendering.swap(true, Ordering::AcqRel) {
            let _ = self.lifecycle.notify(Event::Info(InfoCode::SINK_RENDERING_START, pts));
        }
    }

    fn next_buffer(&self, upstream: Option<&Arc<dyn Reader>>) -> Result<ReadOutcome> {
        match upstream {
            Some(reader) => reader.read(),
            None => Ok(match self.queue.pop_timeout(self.config.poll_interval) {
                Some(buffer) if buffer.is_eos() => ReadOutcome::Eos,
                Some(buffer) => ReadOutcome::Buffer(buffer),
                None => ReadOutcome::Again,
            }),
        }
    }
}

fn render_loop(shared: Arc<SinkShared>, upstream: Option<Arc<dyn Reader>>, render: Arc<Mutex<RenderFn>>) {
    tracing::debug!("{}: render worker started", shared.name());

    while shared.is_running() {
        if shared.is_paused() {
            thread::sleep(shared.config.poll_interval);
            continue;
        }

        let generation = shared.flush_generation.load(Ordering::SeqCst);
        match shared.next_buffer(upstream.as_ref()) {
            Ok(ReadOutcome::Buffer(buffer)) => {
                if let Some(buffer) = shared.sync(buffer, generation) {
                    shared.render(buffer, &render);
                }
            }
            Ok(ReadOutcome::Again) => {
                if upstream.is_some() {
                    thread::sleep(shared.config.poll_interval);
                }
            }
            Ok(ReadOutcome::Eos) => {
                tracing::debug!("{}: end of stream", shared.name());
                shared.eos.store(true, Ordering::Release);
                let _ = shared.lifecycle.notify(Event::Eos);
                break;
            }
            Err(err) => {
                tracing::error!("{}: upstream read failed: {}", shared.name(), err);
                let _ = shared.lifecycle.notify(Event::Error(err.code()));
                break;
            }
        }
    }

    tracing::debug!("{}: render worker finished", shared.name());
}

/// Push-mode input of an [`AppSink`].
struct AppSinkWriter {
    shared: Arc<SinkShared>,
}

impl Writer for AppSinkWriter {
    fn write(&self, buffer: MediaBuffer) -> Result<WriteOutcome> {
        match self.shared.queue.try_push(buffer) {
            Ok(()) => Ok(WriteOutcome::Accepted),
            Err(PushError::Full(buffer)) => Ok(WriteOutcome::Again(buffer)),
            Err(PushError::Flushing(_)) => Err(Error::InvalidOperation(format!(
                "{}: flushing",
                self.shared.name()
            ))),
        }
    }

    fn media_meta(&self) -> MediaMeta {
        self.shared.meta.lock().unwrap().clone()
    }
}

/// Actor-owned state.
struct SinkWorker {
    shared: Arc<SinkShared>,
    upstream: Option<SourceLink>,
    thread: Option<JoinHandle<()>>,
    render: Arc<Mutex<RenderFn>>,
}

impl SinkWorker {
    fn transition(&mut self, msg: Message, _ctx: &ActorContext) {
        let Some(transition) = Transition::from_message_kind(msg.kind()) else {
            return;
        };
        let shared = Arc::clone(&self.shared);

        let outcome = match transition {
            Transition::Start => self.start(),
            Transition::Pause => {
                shared.paused.store(true, Ordering::Release);
                self.clock_op(|c| c.pause())
            }
            Transition::Resume => {
                shared.paused.store(false, Ordering::Release);
                self.clock_op(|c| c.resume())
            }
            Transition::Stop => {
                self.stop_worker();
                shared.paused.store(false, Ordering::Release);
                shared.clear_stream_state();
                shared.queue.set_flushing(false);
                self.clock_op(|c| c.flush())
            }
            Transition::Seek | Transition::Flush => {
                tracing::debug!("{}: {} to {}us", shared.name(), transition, msg.param2());
                shared.flush_generation.fetch_add(1, Ordering::SeqCst);
                shared.clear_stream_state();
                self.clock_op(|c| c.flush())
            }
            Transition::Reset => {
                self.stop_worker();
                shared.paused.store(false, Ordering::Release);
                shared.clear_stream_state();
                self.upstream = None;
                shared.clock.lock().unwrap().clear();
                Ok(())
            }
            _ => Ok(()),
        };
        shared.lifecycle.complete(transition, outcome);
    }

    fn start(&mut self) -> Result<()> {
        let shared = &self.shared;
        shared.queue.set_flushing(false);
        {
            let mut clock = shared.clock.lock().unwrap();
            if clock.clock().is_none() {
                clock.provide_clock(Arc::clone(&shared.time_source));
            }
        }
        if shared.paused.swap(false, Ordering::AcqRel) {
            self.clock_op(|c| c.resume())?;
        }

        if self.thread.as_ref().is_some_and(|t| !t.is_finished()) || self.shared.eos.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(finished) = self.thread.take() {
            let _ = finished.join();
        }

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let upstream = self.upstream.as_ref().map(|l| Arc::clone(&l.reader));
        let render = Arc::clone(&self.render);
        let handle = thread::Builder::new()
            .name(format!("{}-render", self.shared.name()))
            .spawn(move || render_loop(shared, upstream, render))
            .map_err(|e| Error::OpFailed(format!("spawn render worker: {}", e)))?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Stop producing, unblock the worker, then join it.
    fn stop_worker(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.queue.set_flushing(true);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("{}: render worker panicked", self.shared.name());
            }
        }
    }

    /// Apply a clock mutation. A missing clock is not an error here.
    fn clock_op(&self, op: impl FnOnce(&ClockWrapper) -> Result<bool>) -> Result<()> {
        let clock = self.shared.clock.lock().unwrap();
        match op(&clock) {
            Ok(_) | Err(Error::NotInited(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn add_source(&mut self, msg: Message, ctx: &ActorContext) {
        if let Some(link) = msg.object::<SourceLink>() {
            tracing::debug!("{}: pulling {} from {:?}", ctx.name(), link.media_type, link.peer);
            if link.media_type == MediaType::Video {
                let width = link.meta.get_i32(keys::WIDTH);
                let height = link.meta.get_i32(keys::HEIGHT);
                if let (Some(width), Some(height)) = (width, height) {
                    let _ = self.shared.lifecycle.notify(Event::GotVideoFormat {
                        width: width.max(0) as u32,
                        height: height.max(0) as u32,
                    });
                }
            }
            if !link.meta.is_empty() {
                self.shared.meta.lock().unwrap().merge(&link.meta);
            }
            self.upstream = Some(link.clone());
        }
        ctx.reply(&msg, MessageParams::new());
    }
}

impl Drop for SinkWorker {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// A sink component that hands buffers to application code when they are
/// due on the media clock.
///
/// The upstream reader is captured when the render worker starts; links
/// added while started take effect after the next stop and start.
pub struct AppSink {
    config: AppSinkConfig,
    shared: Arc<SinkShared>,
    writer: Arc<AppSinkWriter>,
    render: Arc<Mutex<RenderFn>>,
    actor: MessageActor,
}

impl AppSink {
    /// Create a sink on the system monotonic clock.
    pub fn new(config: AppSinkConfig) -> Result<Self> {
        Self::with_time_source(config, Arc::new(SystemTimeSource::new()))
    }

    /// Create a sink whose media clock, when it owns one, reads `source`.
    pub fn with_time_source(config: AppSinkConfig, source: Arc<dyn TimeSource>) -> Result<Self> {
        let shared = Arc::new(SinkShared {
            lifecycle: Lifecycle::new(config.name.clone()),
            clock: Mutex::new(ClockWrapper::new(config.role)),
            time_source: source,
            queue: BufferQueue::new(config.capacity).with_name(&config.name),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            eos: AtomicBool::new(false),
            rendering: AtomicBool::new(false),
            flush_generation: AtomicU64::new(0),
            rendered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            meta: Mutex::new(MediaMeta::new()),
            config: config.clone(),
        });
        let render: Arc<Mutex<RenderFn>> = Arc::new(Mutex::new(Box::new(|_buffer| {})));

        let mut table = DispatchTable::<SinkWorker>::new().on(ADD_SOURCE, |w, msg, ctx| w.add_source(msg, ctx));
        for transition in Transition::ALL {
            table = table.on(transition.message_kind(), |w, msg, ctx| w.transition(msg, ctx));
        }
        let worker = SinkWorker {
            shared: Arc::clone(&shared),
            upstream: None,
            thread: None,
            render: Arc::clone(&render),
        };
        let actor = MessageActor::spawn(worker, table, ActorConfig::named(config.name.clone()))?;

        Ok(Self {
            writer: Arc::new(AppSinkWriter {
                shared: Arc::clone(&shared),
            }),
            config,
            shared,
            render,
            actor,
        })
    }

    /// Install the render callback, replacing the previous one.
    pub fn set_render(&self, render: impl FnMut(MediaBuffer) + Send + 'static) {
        *self.render.lock().unwrap() = Box::new(render);
    }

    /// Change the play rate of the shared clock. Video sinks only.
    pub fn set_play_rate(&self, rate: f32) -> Result<()> {
        self.shared.clock.lock().unwrap().set_play_rate(rate)
    }

    /// Current media position of the clock this sink uses.
    pub fn position(&self) -> Result<i64> {
        self.shared.clock.lock().unwrap().current_position()
    }

    /// Check if this sink owns its clock.
    pub fn owns_clock(&self) -> bool {
        self.shared.clock.lock().unwrap().is_owner()
    }

    /// Check if the sink has seen end of stream.
    pub fn is_eos(&self) -> bool {
        self.shared.eos.load(Ordering::Acquire)
    }

    /// Render counters.
    pub fn stats(&self) -> AppSinkStats {
        AppSinkStats {
            rendered: self.shared.rendered.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Component for AppSink {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn flags(&self) -> ComponentFlags {
        ComponentFlags::SINK | ComponentFlags::PLAY
    }

    fn state(&self) -> ComponentState {
        self.shared.lifecycle.state()
    }

    fn init(&self) -> Result<()> {
        self.shared.lifecycle.apply(Transition::Init)?;
        self.shared.queue.set_flushing(false);
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

    fn writer(&self, media: MediaType) -> Option<Arc<dyn Writer>> {
        (media == self.config.media_type).then(|| Arc::clone(&self.writer) as Arc<dyn Writer>)
    }

    fn add_source(&self, link: SourceLink) -> Result<()> {
        if link.media_type != self.config.media_type {
            return Err(Error::InvalidParam(format!(
                "{}: consumes {}, not {}",
                self.config.name, self.config.media_type, link.media_type
            )));
        }
        self.actor.send(Message::new(ADD_SOURCE).with_object(link))?;
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

    fn set_clock(&self, clock: ClockBorrower) -> Result<()> {
        self.shared.clock.lock().unwrap().set_clock(clock);
        Ok(())
    }

    fn provide_clock(&self) -> Result<ClockBorrower> {
        let mut clock = self.shared.clock.lock().unwrap();
        Ok(clock.provide_clock(Arc::clone(&self.shared.time_source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use std::sync::mpsc;

    fn listen(sink: &AppSink) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        sink.set_listener(Arc::new(move |e: Event| {
            let _ = tx.lock().unwrap().send(e);
        }))
        .unwrap();
        rx
    }

    fn wait_for(rx: &mpsc::Receiver<Event>, want: impl Fn(&Event) -> bool) -> Event {
        loop {
            let event = rx.recv_timeout(Duration::from_secs(5)).expect("event");
            if want(&event) {
                return event;
            }
        }
    }

    fn start(sink: &AppSink, rx: &mpsc::Receiver<Event>) {
        sink.init().unwrap();
        sink.prepare().unwrap();
        sink.start().unwrap();
        wait_for(rx, |e| e.completes() == Some(Transition::Start));
    }

    fn frame(pts: i64) -> MediaBuffer {
        MediaBuffer::new(MediaType::Video, vec![1u8; 4]).with_pts(pts)
    }

    #[test]
    fn test_push_mode_renders_in_order() {
        let sink = AppSink::new(AppSinkConfig {
            sync: false,
            ..AppSinkConfig::video()
        })
        .unwrap();
        let (tx, rendered) = mpsc::channel();
        sink.set_render(move |b| {
            let _ = tx.send(b.pts().unwrap());
        });
        let rx = listen(&sink);
        start(&sink, &rx);

        let writer = sink.writer(MediaType::Video).unwrap();
        for pts in 0..5 {
            assert!(writer.write(frame(pts)).unwrap().is_accepted());
        }
        writer.write(MediaBuffer::eos(MediaType::Video)).unwrap();

        wait_for(&rx, |e| *e == Event::Eos);
        let got: Vec<i64> = rendered.try_iter().collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
        assert!(sink.is_eos());
        assert_eq!(sink.stats().rendered, 5);
    }

    #[test]
    fn test_late_frames_dropped_early_frames_wait() {
        let time = Arc::new(ManualTimeSource::new(0));
        let sink = AppSink::with_time_source(AppSinkConfig::video(), time.clone()).unwrap();
        let (tx, rendered) = mpsc::channel();
        sink.set_render(move |b| {
            let _ = tx.send(b.pts().unwrap());
        });
        let rx = listen(&sink);
        start(&sink, &rx);
        assert!(sink.owns_clock());

        let writer = sink.writer(MediaType::Video).unwrap();
        writer.write(frame(0)).unwrap();
        assert_eq!(rendered.recv_timeout(Duration::from_secs(2)).unwrap(), 0);
        wait_for(&rx, |e| matches!(e, Event::Info(code, 0) if *code == InfoCode::SINK_RENDERING_START));

        time.advance_us(100_000);
        writer.write(frame(10_000)).unwrap();
        wait_for(&rx, |e| matches!(e, Event::Info(code, 10_000) if *code == InfoCode::SINK_FRAME_DROPPED));
        assert_eq!(sink.stats().dropped, 1);

        writer.write(frame(200_000)).unwrap();
        assert!(rendered.recv_timeout(Duration::from_millis(50)).is_err());
        time.advance_us(100_000);
        assert_eq!(rendered.recv_timeout(Duration::from_secs(2)).unwrap(), 200_000);
    }

    #[test]
    fn test_audio_does_not_drop_and_rate_is_video_only() {
        let time = Arc::new(ManualTimeSource::new(0));
        let sink = AppSink::with_time_source(AppSinkConfig::audio(), time.clone()).unwrap();
        let (tx, rendered) = mpsc::channel();
        sink.set_render(move |b| {
            let _ = tx.send(b.pts().unwrap());
        });
        let rx = listen(&sink);
        start(&sink, &rx);

        let writer = sink.writer(MediaType::Audio).unwrap();
        writer
            .write(MediaBuffer::new(MediaType::Audio, vec![0u8; 4]).with_pts(0))
            .unwrap();
        assert_eq!(rendered.recv_timeout(Duration::from_secs(2)).unwrap(), 0);

        time.advance_us(500_000);
        writer
            .write(MediaBuffer::new(MediaType::Audio, vec![0u8; 4]).with_pts(20_000))
            .unwrap();
        assert_eq!(rendered.recv_timeout(Duration::from_secs(2)).unwrap(), 20_000);
        assert_eq!(sink.stats().dropped, 0);
        assert!(matches!(sink.set_play_rate(2.0), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_shared_clock_wiring() {
        let time = Arc::new(ManualTimeSource::new(0));
        let audio = AppSink::with_time_source(AppSinkConfig::audio(), time.clone()).unwrap();
        let video = AppSink::with_time_source(AppSinkConfig::video(), time.clone()).unwrap();

        video.set_clock(audio.provide_clock().unwrap()).unwrap();
        assert!(audio.owns_clock());
        assert!(!video.owns_clock());
        assert!(matches!(video.position(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_reset_joins_worker() {
        let sink = AppSink::new(AppSinkConfig::video()).unwrap();
        let rx = listen(&sink);
        start(&sink, &rx);
        sink.writer(MediaType::Video).unwrap().write(frame(0)).unwrap();

        sink.reset().unwrap();
        let done = wait_for(&rx, |e| e.completes() == Some(Transition::Reset));
        assert_eq!(done, Event::completed(Transition::Reset));
        assert_eq!(sink.state(), ComponentState::Uninitialized);
        assert!(!sink.owns_clock());
        assert!(sink.writer(MediaType::Video).unwrap().write(frame(1)).is_err());
    }

    #[test]
    fn test_wrong_media_type() {
        let sink = AppSink::new(AppSinkConfig::audio()).unwrap();
        assert!(sink.writer(MediaType::Video).is_none());
        assert!(matches!(sink.seek(-1), Err(Error::InvalidParam(_))));
        assert!(matches!(sink.drain(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_restart_after_eos() {
        let sink = AppSink::new(AppSinkConfig {
            sync: false,
            ..AppSinkConfig::video()
        })
        .unwrap();
        let (tx, rendered) = mpsc::channel();
        sink.set_render(move |b| {
            let _ = tx.send(b.pts().unwrap());
        });
        let rx = listen(&sink);
        start(&sink, &rx);

        let writer = sink.writer(MediaType::Video).unwrap();
        writer.write(frame(1)).unwrap();
        writer.write(MediaBuffer::eos(MediaType::Video)).unwrap();
        wait_for(&rx, |e| *e == Event::Eos);
        assert_eq!(rendered.recv_timeout(Duration::from_secs(2)).unwrap(), 1);

        sink.stop().unwrap();
        wait_for(&rx, |e| e.completes() == Some(Transition::Stop));
        assert!(!sink.is_eos());
        sink.prepare().unwrap();
        sink.start().unwrap();
        wait_for(&rx, |e| e.completes() == Some(Transition::Start));

        writer.write(frame(2)).unwrap();
        assert_eq!(rendered.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
        writer.write(MediaBuffer::eos(MediaType::Video)).unwrap();
        wait_for(&rx, |e| *e == Event::Eos);
    }

    #[test]
    fn test_flush_drops_buffer_waiting_for_its_time() {
        let time = Arc::new(ManualTimeSource::new(0));
        let config = AppSinkConfig {
            max_render_wait: Duration::from_secs(30),
            poll_interval: Duration::from_millis(1),
            ..AppSinkConfig::video()
        };
        let sink = AppSink::with_time_source(config, time.clone()).unwrap();
        let (tx, rendered) = mpsc::channel();
        sink.set_render(move |b| {
            let _ = tx.send(b.pts().unwrap());
        });
        let rx = listen(&sink);
        start(&sink, &rx);

        let writer = sink.writer(MediaType::Video).unwrap();
        writer.write(frame(0)).unwrap();
        assert_eq!(rendered.recv_timeout(Duration::from_secs(2)).unwrap(), 0);

        // Five seconds ahead of a clock that never moves.
        writer.write(frame(5_000_000)).unwrap();
        thread::sleep(Duration::from_millis(30));
        sink.flush().unwrap();
        wait_for(&rx, |e| e.completes() == Some(Transition::Flush));
        assert!(rendered.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(sink.stats(), AppSinkStats { rendered: 1, dropped: 0 });

        writer.write(frame(100)).unwrap();
        assert_eq!(rendered.recv_timeout(Duration::from_secs(2)).unwrap(), 100);
    }
}
