//! Pipeline construction and lifecycle driving.
//!
//! This module provides:
//!
//! - [`Pipeline`]: owns every component in one arena (a DAG)
//! - [`ComponentId`]: a handle into that arena, used by links instead of
//!   references to peers
//! - [`PipelineEvent`]: async events forwarded from components
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence::component::MediaType;
//! use cadence::components::{AppSink, AppSinkConfig, AppSource, AppSourceConfig};
//! use cadence::pipeline::Pipeline;
//! use std::sync::Arc;
//!
//! # async fn run() -> cadence::Result<()> {
//! let mut pipeline = Pipeline::new();
//! let src = pipeline.add(Arc::new(AppSource::new(AppSourceConfig::default())?))?;
//! let sink = pipeline.add(Arc::new(AppSink::new(AppSinkConfig::video())?))?;
//! pipeline.connect(src, sink, MediaType::Video)?;
//!
//! let mut events = pipeline.subscribe();
//! pipeline.play().await?;
//! let _ = events.wait_eos().await;
//! pipeline.stop().await?;
//! # Ok(())
//! # }
//! ```

mod events;

pub use events::{EventReceiver, EventSender, EventStream, PipelineEvent};

use crate::component::{
    Component, ComponentFlags, Event, Listener, MediaType, SinkLink, SourceLink, Transition,
};
use crate::error::{Completion, Error, ErrorCode, Result};
use daggy::petgraph::algo::toposort;
use daggy::{Dag, EdgeIndex, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Handle to a component owned by a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub(crate) NodeIndex);

impl ComponentId {
    /// Build a handle from a raw arena index.
    pub fn from_index(index: usize) -> Self {
        Self(NodeIndex::new(index))
    }

    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// State of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    /// Nothing initialized yet, or reset.
    #[default]
    Idle,
    /// Components initialized.
    Initialized,
    /// Components prepared and clocks wired.
    Prepared,
    /// Data is flowing.
    Playing,
    /// Holding position.
    Paused,
    /// Stopped; may be prepared again.
    Stopped,
    /// A transition failed.
    Error,
}

/// Configuration for a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Longest the pipeline waits for components to complete a transition.
    pub transition_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            transition_timeout: Duration::from_secs(5),
        }
    }
}

struct Node {
    name: String,
    component: Arc<dyn Component>,
}

/// Sinks that have not reached end of stream yet.
#[derive(Default)]
struct EosTracker {
    remaining: Mutex<HashSet<ComponentId>>,
}

impl EosTracker {
    fn arm(&self, sinks: impl IntoIterator<Item = ComponentId>) {
        let mut remaining = self.remaining.lock().unwrap();
        remaining.clear();
        remaining.extend(sinks);
    }

    /// Returns true when `id` was the last sink outstanding.
    fn finish(&self, id: ComponentId) -> bool {
        let mut remaining = self.remaining.lock().unwrap();
        remaining.remove(&id) && remaining.is_empty()
    }
}

/// A transition completion reported by one component.
#[derive(Debug, Clone, Copy)]
struct Completed {
    id: ComponentId,
    transition: Transition,
    status: std::result::Result<(), ErrorCode>,
}

/// Listener installed on every component; forwards its events to the
/// pipeline's broadcast channel.
///
/// Completions also go to a lossless channel read by the pipeline itself,
/// since a broadcast receiver that falls behind skips events.
struct PipelineListener {
    id: ComponentId,
    name: String,
    is_sink: bool,
    sender: EventSender,
    completions: mpsc::UnboundedSender<Completed>,
    eos: Arc<EosTracker>,
}

impl Listener for PipelineListener {
    fn on_event(&self, event: Event) {
        let aggregate = match &event {
            Event::Error(code) => Some(PipelineEvent::Error {
                id: self.id,
                name: self.name.clone(),
                code: *code,
            }),
            Event::Eos if self.is_sink && self.eos.finish(self.id) => Some(PipelineEvent::Eos),
            Event::Completed { transition, status } => {
                let _ = self.completions.send(Completed {
                    id: self.id,
                    transition: *transition,
                    status: *status,
                });
                None
            }
            _ => None,
        };
        self.sender.send(PipelineEvent::Component {
            id: self.id,
            name: self.name.clone(),
            event,
        });
        if let Some(aggregate) = aggregate {
            self.sender.send(aggregate);
        }
    }
}

/// Which end of the graph is driven first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    SinksFirst,
    SourcesFirst,
}

/// A media pipeline: an arena of components connected as a DAG.
///
/// The pipeline owns its components. Links between them carry
/// [`ComponentId`] handles and reader/writer interfaces, never the peer
/// itself.
pub struct Pipeline {
    graph: Dag<Node, MediaType>,
    nodes_by_name: HashMap<String, ComponentId>,
    state: PipelineState,
    config: PipelineConfig,
    events: EventSender,
    completions_tx: mpsc::UnboundedSender<Completed>,
    completions: mpsc::UnboundedReceiver<Completed>,
    eos: Arc<EosTracker>,
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// Create a pipeline with custom configuration.
    pub fn with_config(config: PipelineConfig) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        Self {
            graph: Dag::new(),
            nodes_by_name: HashMap::new(),
            state: PipelineState::Idle,
            events: EventSender::new(config.event_capacity),
            completions_tx,
            completions,
            config,
            eos: Arc::new(EosTracker::default()),
        }
    }

    /// Get the current pipeline state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if the pipeline has no components.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Pipeline events as a stream.
    pub fn events(&self) -> EventStream {
        self.events.stream()
    }

    /// Add a component, installing the pipeline's listener on it.
    ///
    /// Component names must be unique within a pipeline.
    pub fn add<C: Component + 'static>(&mut self, component: Arc<C>) -> Result<ComponentId> {
        let component: Arc<dyn Component> = component;
        let name = component.name().to_string();
        if self.nodes_by_name.contains_key(&name) {
            return Err(Error::InvalidParam(format!("duplicate component name '{}'", name)));
        }

        let id = ComponentId(self.graph.add_node(Node {
            name: name.clone(),
            component: Arc::clone(&component),
        }));
        let listener = PipelineListener {
            id,
            name: name.clone(),
            is_sink: component.flags().contains(ComponentFlags::SINK),
            sender: self.events.clone(),
            completions: self.completions_tx.clone(),
            eos: Arc::clone(&self.eos),
        };
        if let Err(err) = component.set_listener(Arc::new(listener)) {
            self.graph.remove_node(id.0);
            return Err(err);
        }

        tracing::debug!("added component '{}' as {:?}", name, id);
        self.nodes_by_name.insert(name, id);
        Ok(id)
    }

    /// Get a component by handle.
    pub fn get(&self, id: ComponentId) -> Option<&Arc<dyn Component>> {
        self.graph.node_weight(id.0).map(|n| &n.component)
    }

    /// Get a component handle by name.
    pub fn id_of(&self, name: &str) -> Option<ComponentId> {
        self.nodes_by_name.get(name).copied()
    }

    /// Get a component's name by handle.
    pub fn name_of(&self, id: ComponentId) -> Option<&str> {
        self.graph.node_weight(id.0).map(|n| n.name.as_str())
    }

    fn component(&self, id: ComponentId) -> Result<Arc<dyn Component>> {
        self.get(id)
            .cloned()
            .ok_or_else(|| Error::InvalidParam(format!("no component {:?}", id)))
    }

    /// Connect `src` to `sink` for one stream.
    ///
    /// The sink pulls when the source offers a reader for `media`; otherwise
    /// the source pushes into the sink's writer. Each side learns the peer's
    /// format through the link.
    pub fn connect(&mut self, src: ComponentId, sink: ComponentId, media: MediaType) -> Result<()> {
        if src == sink {
            return Err(Error::InvalidParam("cannot connect a component to itself".into()));
        }
        let source = self.component(src)?;
        let target = self.component(sink)?;

        let edge = self
            .graph
            .add_edge(src.0, sink.0, media)
            .map_err(|_| Error::InvalidOperation("connection would create a cycle".into()))?;

        if let Err(err) = Self::link(src, &source, sink, &target, media) {
            self.graph.remove_edge(edge);
            return Err(err);
        }
        Ok(())
    }

    fn link(
        src: ComponentId,
        source: &Arc<dyn Component>,
        sink: ComponentId,
        target: &Arc<dyn Component>,
        media: MediaType,
    ) -> Result<()> {
        if let Some(reader) = source.reader(media) {
            tracing::debug!("{} pulls {} from {}", target.name(), media, source.name());
            let meta = reader.media_meta();
            return target.add_source(SourceLink {
                peer: src,
                media_type: media,
                reader,
                meta,
            });
        }
        if let Some(writer) = target.writer(media) {
            tracing::debug!("{} pushes {} into {}", source.name(), media, target.name());
            let meta = writer.media_meta();
            return source.add_sink(SinkLink {
                peer: sink,
                media_type: media,
                writer,
                meta,
            });
        }
        Err(Error::Unsupported(format!(
            "neither {} nor {} can carry {}",
            source.name(),
            target.name(),
            media
        )))
    }

    /// Disconnect every link between `src` and `sink`.
    ///
    /// Returns the number of links removed. Components keep their copies of
    /// the link until they are reset.
    pub fn disconnect(&mut self, src: ComponentId, sink: ComponentId) -> usize {
        let edges: Vec<EdgeIndex> = self
            .graph
            .graph()
            .edges_connecting(src.0, sink.0)
            .map(|e| daggy::petgraph::visit::EdgeRef::id(&e))
            .collect();
        for edge in &edges {
            self.graph.remove_edge(*edge);
        }
        edges.len()
    }

    /// The sink consuming `media`, if any.
    fn sink_for(&self, media: MediaType) -> Option<ComponentId> {
        self.graph
            .graph()
            .raw_edges()
            .iter()
            .filter(|e| e.weight == media)
            .map(|e| ComponentId(e.target()))
            .find(|id| {
                self.get(*id)
                    .is_some_and(|c| c.flags().contains(ComponentFlags::SINK))
            })
    }

    fn sinks(&self) -> Vec<ComponentId> {
        self.graph
            .graph()
            .node_indices()
            .map(ComponentId)
            .filter(|id| {
                self.get(*id)
                    .is_some_and(|c| c.flags().contains(ComponentFlags::SINK))
            })
            .collect()
    }

    /// Share one media clock between the sinks.
    ///
    /// When both an audio and a video sink exist, the audio sink owns the
    /// clock and the video sink borrows it. A lone sink owns its own clock.
    pub fn wire_clocks(&self) -> Result<()> {
        let audio = self.sink_for(MediaType::Audio);
        let video = self.sink_for(MediaType::Video);

        match (audio, video) {
            (Some(audio), Some(video)) => {
                let clock = self.component(audio)?.provide_clock()?;
                self.component(video)?.set_clock(clock)?;
                tracing::debug!("clock owned by {:?}, borrowed by {:?}", audio, video);
            }
            (Some(only), None) | (None, Some(only)) => {
                self.component(only)?.provide_clock()?;
                tracing::debug!("clock owned by {:?}", only);
            }
            (None, None) => tracing::debug!("no audio or video sink, no clock to wire"),
        }
        Ok(())
    }

    /// Components in driving order.
    fn ordered(&self, order: Order) -> Result<Vec<ComponentId>> {
        let mut ids: Vec<ComponentId> = toposort(self.graph.graph(), None)
            .map_err(|_| Error::OpFailed("pipeline graph has a cycle".into()))?
            .into_iter()
            .map(ComponentId)
            .collect();
        if order == Order::SinksFirst {
            ids.reverse();
        }
        Ok(ids)
    }

    fn set_state(&mut self, to: PipelineState) {
        let from = self.state;
        if from != to {
            self.state = to;
            tracing::debug!("pipeline {:?} -> {:?}", from, to);
            self.events.send_state_changed(from, to);
        }
    }

    /// Initialize every component. Synchronous.
    pub fn init(&mut self) -> Result<()> {
        for id in self.ordered(Order::SinksFirst)? {
            if let Err(err) = self.component(id)?.init() {
                self.set_state(PipelineState::Error);
                return Err(err);
            }
        }
        self.set_state(PipelineState::Initialized);
        Ok(())
    }

    /// Wire clocks and prepare every component.
    pub async fn prepare(&mut self) -> Result<()> {
        self.wire_clocks()?;
        self.drive(Transition::Prepare, 0, Order::SinksFirst, PipelineState::Prepared)
            .await
    }

    /// Start every component.
    pub async fn start(&mut self) -> Result<()> {
        self.eos.arm(self.sinks());
        self.drive(Transition::Start, 0, Order::SinksFirst, PipelineState::Playing)
            .await
    }

    /// Initialize and prepare as needed, then start.
    pub async fn play(&mut self) -> Result<()> {
        if self.state == PipelineState::Idle {
            self.init()?;
        }
        if matches!(self.state, PipelineState::Initialized | PipelineState::Stopped) {
            self.prepare().await?;
        }
        self.start().await
    }

    /// Pause every component.
    pub async fn pause(&mut self) -> Result<()> {
        self.drive(Transition::Pause, 0, Order::SourcesFirst, PipelineState::Paused)
            .await
    }

    /// Resume every component.
    pub async fn resume(&mut self) -> Result<()> {
        self.drive(Transition::Resume, 0, Order::SinksFirst, PipelineState::Playing)
            .await
    }

    /// Stop every component.
    pub async fn stop(&mut self) -> Result<()> {
        self.drive(Transition::Stop, 0, Order::SourcesFirst, PipelineState::Stopped)
            .await
    }

    /// Seek every component that supports it.
    pub async fn seek(&mut self, position_us: i64) -> Result<()> {
        let state = self.state;
        self.drive(Transition::Seek, position_us, Order::SourcesFirst, state)
            .await
    }

    /// Discard buffered data in every component that supports it.
    pub async fn flush(&mut self) -> Result<()> {
        let state = self.state;
        self.drive(Transition::Flush, 0, Order::SourcesFirst, state).await
    }

    /// Return every component to the uninitialized state.
    pub async fn reset(&mut self) -> Result<()> {
        self.drive(Transition::Reset, 0, Order::SourcesFirst, PipelineState::Idle)
            .await
    }

    /// Call `transition` on every component, then wait for the completion
    /// of each one that answered asynchronously.
    async fn drive(
        &mut self,
        transition: Transition,
        param: i64,
        order: Order,
        target: PipelineState,
    ) -> Result<()> {
        // Completions left over from a transition that timed out.
        while let Ok(stale) = self.completions.try_recv() {
            tracing::debug!("discarding late {} completion from {:?}", stale.transition, stale.id);
        }
        let mut waiting = HashSet::new();
        let mut failure: Option<Error> = None;

        for id in self.ordered(order)? {
            let component = self.component(id)?;
            match call(component.as_ref(), transition, param) {
                Ok(Completion::Done) => {}
                Ok(Completion::Async) => {
                    waiting.insert(id);
                }
                Err(Error::Unsupported(_)) if is_optional(transition) => {
                    tracing::debug!("{} does not support {}", component.name(), transition);
                }
                Err(err) if transition.must_complete() => {
                    tracing::warn!("{} rejected {}: {}", component.name(), transition, err);
                    failure.get_or_insert(err);
                }
                Err(err) => {
                    tracing::warn!("{} rejected {}: {}", component.name(), transition, err);
                    failure = Some(err);
                    break;
                }
            }
        }

        let pending = waiting.len();
        let completed = tokio::time::timeout(
            self.config.transition_timeout,
            wait_completions(&mut self.completions, transition, &mut waiting),
        )
        .await;

        match completed {
            Ok(Ok(())) => {}
            Ok(Err(code)) => {
                failure.get_or_insert(Error::OpFailed(format!("{} failed ({:?})", transition, code)));
            }
            Err(_) => {
                let names: Vec<&str> = waiting.iter().filter_map(|id| self.name_of(*id)).collect();
                tracing::warn!("{} timed out waiting for {:?}", transition, names);
                failure.get_or_insert(Error::Timeout(format!(
                    "{}: {} of {} components did not complete",
                    transition,
                    waiting.len(),
                    pending
                )));
            }
        }

        match failure {
            Some(err) if !transition.must_complete() => {
                self.set_state(PipelineState::Error);
                Err(err)
            }
            Some(err) => {
                self.set_state(target);
                Err(err)
            }
            None => {
                self.set_state(target);
                Ok(())
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("components", &self.graph.node_count())
            .field("links", &self.graph.edge_count())
            .field("state", &self.state)
            .finish()
    }
}

fn call(component: &dyn Component, transition: Transition, param: i64) -> Result<Completion> {
    match transition {
        Transition::Init => component.init().map(|_| Completion::Done),
        Transition::Uninit => component.uninit().map(|_| Completion::Done),
        Transition::Prepare => component.prepare(),
        Transition::Start => component.start(),
        Transition::Pause => component.pause(),
        Transition::Resume => component.resume(),
        Transition::Stop => component.stop(),
        Transition::Seek => component.seek(param),
        Transition::Flush => component.flush(),
        Transition::Drain => component.drain(),
        Transition::Reset => component.reset(),
    }
}

fn is_optional(transition: Transition) -> bool {
    matches!(transition, Transition::Seek | Transition::Flush | Transition::Drain)
}

/// Consume completions until every id in `waiting` completed `transition`.
/// Returns the first failure code.
async fn wait_completions(
    completions: &mut mpsc::UnboundedReceiver<Completed>,
    transition: Transition,
    waiting: &mut HashSet<ComponentId>,
) -> std::result::Result<(), ErrorCode> {
    let mut first_failure = None;
    while !waiting.is_empty() {
        let Some(done) = completions.recv().await else {
            return Err(ErrorCode::OpFailed);
        };
        if done.transition == transition && waiting.remove(&done.id) {
            if let Err(code) = done.status {
                first_failure.get_or_insert(code);
            }
        }
    }
    match first_failure {
        Some(code) => Err(code),
        None => Ok(()),
    }
}
