//! Source adapters.
//!
//! One adapter per source kind turns the source's own lifecycle into
//! [`AdapterEvent`]s. Adapters never touch the media sink: they publish a
//! [`AdapterEvent::SourceReady`] and the session loads it.
//!
//! Each adapter carries a source epoch, bumped whenever it replaces its
//! playable source without a session change (channel switch, file bind). The
//! session ignores `SourceReady` events of an older epoch.

mod live;
mod local;
mod swarm;

use std::sync::Arc;

use tokio::task::AbortHandle;

use crate::collaborators::{Collaborators, SwarmFile};
use crate::config_ext::SessionConfig;
use crate::error::{Error, Result};
use crate::events::{AdapterEvent, EventSender, MediaError};
use crate::model::{Generation, SessionDescriptor, SourceKind};

pub use live::LiveAdapter;
pub use local::LocalAdapter;
pub use swarm::{SwarmAdapter, is_playable};

/// Everything an adapter of one generation may use.
#[derive(Clone)]
pub struct AdapterContext {
    pub events: EventSender,
    pub collaborators: Collaborators,
    pub config: SessionConfig,
}

impl AdapterContext {
    pub fn generation(&self) -> Generation {
        self.events.generation()
    }
}

/// Source-specific commands routed to the active adapter.
#[derive(Clone, Debug, PartialEq)]
pub enum AdapterCommand {
    SelectChannel(String),
    SelectFile(String),
}

/// Adapter answer to a media element error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
    /// A fallback load is scheduled.
    Retrying { attempt: usize },
    /// Every fallback was tried.
    Exhausted,
    /// The adapter has no specific recovery; the session applies its own.
    NotHandled,
}

pub trait SourceAdapter: Send {
    fn kind(&self) -> SourceKind;

    fn display_name(&self) -> String;

    /// Starts acquiring the source. Background work is spawned; only errors
    /// known synchronously (invalid identifier, unreadable file) are returned.
    fn start(&mut self, ctx: &AdapterContext) -> Result<()>;

    fn epoch(&self) -> u32;

    /// `loaded` tells whether the current source already produced metadata.
    fn on_media_error(
        &mut self,
        _error: &MediaError,
        _loaded: bool,
        _ctx: &AdapterContext,
    ) -> Recovery {
        Recovery::NotHandled
    }

    fn handle(&mut self, command: &AdapterCommand, _ctx: &AdapterContext) -> Result<()> {
        Err(Error::invalid_command(format!(
            "{command:?} is not supported by {:?} sources",
            self.kind()
        )))
    }

    /// Adapter-relevant events of the current generation, before the session
    /// applies them.
    fn on_event(&mut self, _event: &AdapterEvent, _ctx: &AdapterContext) {}

    fn swarm_file(&self, _name: &str) -> Option<Arc<dyn SwarmFile>> {
        None
    }

    /// Releases every resource synchronously: timers, tasks, blob URLs,
    /// swarm engine.
    fn teardown(&mut self, collaborators: &Collaborators);
}

/// Instantiates the adapter matching a descriptor.
pub fn adapter_for(descriptor: &SessionDescriptor) -> Box<dyn SourceAdapter> {
    match descriptor {
        SessionDescriptor::Live(live) => Box::new(LiveAdapter::new(live.clone())),
        SessionDescriptor::Swarm(swarm) => Box::new(SwarmAdapter::new(swarm.clone())),
        SessionDescriptor::LocalFile(file) => Box::new(LocalAdapter::new(file.clone())),
    }
}

/// Abort handles of the background tasks of one adapter.
#[derive(Debug, Default)]
pub(crate) struct TaskSet {
    tasks: Vec<AbortHandle>,
}

impl TaskSet {
    pub(crate) fn spawn<F>(&mut self, future: F) -> AbortHandle
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.retain(|t| !t.is_finished());
        let handle = tokio::spawn(future).abort_handle();
        self.tasks.push(handle.clone());
        handle
    }

    pub(crate) fn abort_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.abort_all();
    }
}
