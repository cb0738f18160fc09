use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::error;

use crate::channel::Channel;

/// Lifecycle notifications published by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AudioEvent {
    Load { id: String, url: String },
    Error { id: String, cause: String },
    Play { id: String },
    Pause { id: String },
    Resume { id: String },
    End { id: String },
    VolumeChange { channel: Channel, volume: f32 },
    MuteChange { channel: Channel, muted: bool },
}

/// Event kinds, used to subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Load,
    Error,
    Play,
    Pause,
    Resume,
    End,
    VolumeChange,
    MuteChange,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Load,
        EventKind::Error,
        EventKind::Play,
        EventKind::Pause,
        EventKind::Resume,
        EventKind::End,
        EventKind::VolumeChange,
        EventKind::MuteChange,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Load => "load",
            EventKind::Error => "error",
            EventKind::Play => "play",
            EventKind::Pause => "pause",
            EventKind::Resume => "resume",
            EventKind::End => "end",
            EventKind::VolumeChange => "volumeChange",
            EventKind::MuteChange => "muteChange",
        }
    }
}

impl AudioEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AudioEvent::Load { .. } => EventKind::Load,
            AudioEvent::Error { .. } => EventKind::Error,
            AudioEvent::Play { .. } => EventKind::Play,
            AudioEvent::Pause { .. } => EventKind::Pause,
            AudioEvent::Resume { .. } => EventKind::Resume,
            AudioEvent::End { .. } => EventKind::End,
            AudioEvent::VolumeChange { .. } => EventKind::VolumeChange,
            AudioEvent::MuteChange { .. } => EventKind::MuteChange,
        }
    }

    /// The sound this event is about, if any.
    pub fn sound_id(&self) -> Option<&str> {
        match self {
            AudioEvent::Load { id, .. }
            | AudioEvent::Error { id, .. }
            | AudioEvent::Play { id }
            | AudioEvent::Pause { id }
            | AudioEvent::Resume { id }
            | AudioEvent::End { id } => Some(id),
            AudioEvent::VolumeChange { .. } | AudioEvent::MuteChange { .. } => None,
        }
    }

    /// `{ "event": "<name>", ...fields }`
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

pub type Handler = Arc<dyn Fn(&AudioEvent) -> anyhow::Result<()> + Send + Sync>;

/// Subscription handle returned by [`EventBus::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    kind: EventKind,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    listeners: Vec<Listener>,
    next_id: u64,
}

/// Synchronous publish/subscribe over [`AudioEvent`].
///
/// Handlers run on the publishing thread in registration order. A handler
/// that returns an error or panics is logged and skipped.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<RwLock<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&AudioEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push(Listener {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.write();
        let before = inner.listeners.len();
        inner.listeners.retain(|l| l.id != id);
        inner.listeners.len() != before
    }

    pub fn trigger(&self, event: &AudioEvent) {
        let kind = event.kind();
        // Snapshot so handlers may subscribe or unsubscribe while running.
        let handlers: Vec<Handler> = self
            .inner
            .read()
            .listeners
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| Arc::clone(&l.handler))
            .collect();

        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("'{}' handler failed: {:#}", kind.name(), e),
                Err(_) => error!("'{}' handler panicked", kind.name()),
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .read()
            .listeners
            .iter()
            .filter(|l| l.kind == kind)
            .count()
    }

    pub fn clear(&self) {
        self.inner.write().listeners.clear();
    }
}
