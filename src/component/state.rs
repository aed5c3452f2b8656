//! Component states and the transitions between them.

use crate::error::{Error, Result};
use std::fmt;

/// Logical state of a component.
///
/// ```text
/// Uninitialized ─init─► Initialized ─prepare─► Prepared ─start─► Started ⇄ Paused
///       ▲                                          ▲                  │
///       └──────────────── reset (from any) ────────┴── prepare ◄─ Stopped ◄─ stop
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComponentState {
    /// Freshly created or reset.
    #[default]
    Uninitialized,
    /// Resources allocated, not yet configured for playback.
    Initialized,
    /// Ready to start.
    Prepared,
    /// Moving data.
    Started,
    /// Holding position; no data moves.
    Paused,
    /// Stopped; may be prepared again.
    Stopped,
}

impl ComponentState {
    /// Check if data is flowing.
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, ComponentState::Started)
    }

    /// State reached by applying `transition`, or `None` if not allowed.
    pub fn after(self, transition: Transition) -> Option<ComponentState> {
        use ComponentState::*;
        use Transition as T;

        match (transition, self) {
            (T::Init, Uninitialized) => Some(Initialized),
            (T::Uninit, Initialized | Stopped | Uninitialized) => Some(Uninitialized),
            (T::Prepare, Initialized | Stopped) => Some(Prepared),
            (T::Start, Prepared | Paused) => Some(Started),
            (T::Pause, Started) => Some(Paused),
            (T::Resume, Paused) => Some(Started),
            (T::Stop, Prepared | Started | Paused | Stopped) => Some(Stopped),
            (T::Seek, Prepared | Started | Paused) => Some(self),
            (T::Flush, Prepared | Started | Paused | Stopped) => Some(self),
            (T::Drain, Started | Paused) => Some(self),
            (T::Reset, _) => Some(Uninitialized),
            _ => None,
        }
    }

    /// Like [`after`](Self::after), failing with [`Error::InvalidOperation`].
    pub fn apply(self, transition: Transition) -> Result<ComponentState> {
        self.after(transition).ok_or_else(|| {
            Error::InvalidOperation(format!("cannot {} from {}", transition, self))
        })
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentState::Uninitialized => "uninitialized",
            ComponentState::Initialized => "initialized",
            ComponentState::Prepared => "prepared",
            ComponentState::Started => "started",
            ComponentState::Paused => "paused",
            ComponentState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A lifecycle operation.
///
/// Each transition also names the message kind a component posts to its own
/// actor to carry it out, and the completion event reported afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Transition {
    /// Allocate resources.
    Init = 1,
    /// Release resources.
    Uninit = 2,
    /// Configure for playback.
    Prepare = 3,
    /// Begin moving data.
    Start = 4,
    /// Hold position.
    Pause = 5,
    /// Continue after pause.
    Resume = 6,
    /// Stop moving data.
    Stop = 7,
    /// Jump to a media position.
    Seek = 8,
    /// Discard buffered data.
    Flush = 9,
    /// Finish buffered data without accepting more.
    Drain = 10,
    /// Return to the uninitialized state from anywhere.
    Reset = 11,
}

impl Transition {
    /// All transitions.
    pub const ALL: [Transition; 11] = [
        Transition::Init,
        Transition::Uninit,
        Transition::Prepare,
        Transition::Start,
        Transition::Pause,
        Transition::Resume,
        Transition::Stop,
        Transition::Seek,
        Transition::Flush,
        Transition::Drain,
        Transition::Reset,
    ];

    /// Actor message kind carrying this transition.
    #[inline]
    pub fn message_kind(self) -> u32 {
        self as u32
    }

    /// Transition carried by an actor message kind.
    pub fn from_message_kind(kind: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.message_kind() == kind)
    }

    /// Whether a failed attempt still has to leave the component in the
    /// target state.
    #[inline]
    pub fn must_complete(self) -> bool {
        matches!(self, Transition::Stop | Transition::Reset)
    }

    /// Lower-case name.
    pub fn name(self) -> &'static str {
        match self {
            Transition::Init => "init",
            Transition::Uninit => "uninit",
            Transition::Prepare => "prepare",
            Transition::Start => "start",
            Transition::Pause => "pause",
            Transition::Resume => "resume",
            Transition::Stop => "stop",
            Transition::Seek => "seek",
            Transition::Flush => "flush",
            Transition::Drain => "drain",
            Transition::Reset => "reset",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
