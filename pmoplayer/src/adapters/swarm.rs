use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::{AdapterCommand, AdapterContext, SourceAdapter, TaskSet};
use crate::collaborators::{Collaborators, SwarmEvent, SwarmFile, SwarmHandle};
use crate::error::{Error, Result};
use crate::events::{AdapterEvent, EventSender};
use crate::model::{
    MediaIdentity, MediaSource, SourceKind, SwarmDescriptor, SwarmFileInfo, SwarmMode,
};

const PLAYABLE_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mkv", "webm", "mov", "avi", "ogv", "mp3", "flac", "ogg", "m4a",
];

/// Whether the sink is expected to render a file, judging by its extension.
pub fn is_playable(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| PLAYABLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Torrent source.
///
/// The engine is started once per adapter. Readiness is awaited for
/// `swarm_ready_timeout`; past it a stall warning is published but the
/// source stays alive.
pub struct SwarmAdapter {
    descriptor: SwarmDescriptor,
    handle: Option<Arc<dyn SwarmHandle>>,
    bound: Option<String>,
    epoch: u32,
    stall_timer: Option<AbortHandle>,
    tasks: TaskSet,
}

impl SwarmAdapter {
    pub fn new(descriptor: SwarmDescriptor) -> Self {
        Self {
            descriptor,
            handle: None,
            bound: None,
            epoch: 0,
            stall_timer: None,
            tasks: TaskSet::default(),
        }
    }

    pub fn bound_file(&self) -> Option<&str> {
        self.bound.as_deref()
    }

    fn files(&self) -> Vec<Arc<dyn SwarmFile>> {
        self.handle.as_ref().map(|h| h.files()).unwrap_or_default()
    }

    /// File to bind once the list is known: the preselected name, the only
    /// file, or the largest playable one.
    fn pick(&self, files: &[SwarmFileInfo]) -> Option<String> {
        if let Some(wanted) = &self.descriptor.preselect {
            if files.iter().any(|f| &f.name == wanted) {
                return Some(wanted.clone());
            }
            warn!(file = %wanted, "Preselected file not found in swarm");
        }
        if let [only] = files {
            return Some(only.name.clone());
        }
        files
            .iter()
            .filter(|f| is_playable(&f.name))
            .max_by_key(|f| f.length)
            .map(|f| f.name.clone())
    }

    fn bind(&mut self, name: &str, events: &EventSender) -> Result<()> {
        let handle = self
            .handle
            .clone()
            .ok_or_else(|| Error::unavailable("Torrent metadata"))?;
        let files = handle.files();
        let file = files
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| Error::UnknownFile(name.to_string()))?;

        if let Some(previous) = self.bound.as_deref() {
            if let Some(old) = files.iter().find(|f| f.name() == previous) {
                old.deselect();
            }
        }
        file.select();
        self.bound = Some(name.to_string());
        self.epoch += 1;
        info!(file = %name, epoch = self.epoch, "Binding swarm file");

        events.publish(AdapterEvent::SourceReady {
            epoch: self.epoch,
            source: MediaSource::Swarm {
                file: name.to_string(),
                url: file.stream_url(),
            },
            identity: MediaIdentity::swarm(&handle.info_hash(), name),
            title: name.to_string(),
        });
        Ok(())
    }
}

impl SourceAdapter for SwarmAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Swarm
    }

    fn display_name(&self) -> String {
        self.bound
            .clone()
            .unwrap_or_else(|| self.descriptor.identifier.clone())
    }

    fn start(&mut self, ctx: &AdapterContext) -> Result<()> {
        let source = ctx
            .collaborators
            .swarm
            .add_source(&self.descriptor.identifier)?;
        info!(
            info_hash = %source.handle.info_hash(),
            mode = ?self.descriptor.mode,
            "Swarm source added"
        );
        self.handle = Some(source.handle.clone());

        self.tasks
            .spawn(bridge(source.handle, source.events, ctx.events.clone()));

        let events = ctx.events.clone();
        let timeout = ctx.config.swarm_ready_timeout;
        self.stall_timer = Some(self.tasks.spawn(async move {
            tokio::time::sleep(timeout).await;
            events.publish(AdapterEvent::SwarmStalled);
        }));
        Ok(())
    }

    fn epoch(&self) -> u32 {
        self.epoch
    }

    fn handle(&mut self, command: &AdapterCommand, ctx: &AdapterContext) -> Result<()> {
        match command {
            AdapterCommand::SelectFile(name) => {
                if self.descriptor.mode == SwarmMode::Download {
                    return Err(Error::invalid_command(
                        "files of a download session cannot be played",
                    ));
                }
                if self.files().is_empty() {
                    debug!(file = %name, "File list unknown, remembering selection");
                    self.descriptor.preselect = Some(name.clone());
                    return Ok(());
                }
                self.bind(name, &ctx.events)
            }
            other => Err(Error::invalid_command(format!(
                "{other:?} is not supported by swarm sources"
            ))),
        }
    }

    fn on_event(&mut self, event: &AdapterEvent, ctx: &AdapterContext) {
        if let AdapterEvent::SwarmReady { files, .. } = event {
            if let Some(timer) = self.stall_timer.take() {
                timer.abort();
            }
            if self.descriptor.mode != SwarmMode::Stream || self.bound.is_some() {
                return;
            }
            match self.pick(files) {
                Some(name) => {
                    if let Err(e) = self.bind(&name, &ctx.events) {
                        warn!(file = %name, error = %e, "Automatic file binding failed");
                    }
                }
                None if files.is_empty() => {
                    ctx.events.publish(AdapterEvent::AcquisitionFailed(Error::unavailable(
                        "Torrent content",
                    )));
                }
                None => debug!("No playable file, waiting for a selection"),
            }
        }
    }

    fn swarm_file(&self, name: &str) -> Option<Arc<dyn SwarmFile>> {
        self.files().into_iter().find(|f| f.name() == name)
    }

    fn teardown(&mut self, _collaborators: &Collaborators) {
        self.tasks.abort_all();
        self.stall_timer = None;
        if let Some(handle) = self.handle.take() {
            info!(info_hash = %handle.info_hash(), "Destroying swarm source");
            handle.destroy();
        }
    }
}

/// Forwards engine events as adapter events until the engine or the session
/// goes away.
async fn bridge(
    handle: Arc<dyn SwarmHandle>,
    mut engine: mpsc::UnboundedReceiver<SwarmEvent>,
    events: EventSender,
) {
    while let Some(event) = engine.recv().await {
        let event = match event {
            SwarmEvent::Ready => AdapterEvent::SwarmReady {
                info_hash: handle.info_hash(),
                files: handle
                    .files()
                    .iter()
                    .map(|f| SwarmFileInfo {
                        name: f.name(),
                        length: f.length(),
                    })
                    .collect(),
            },
            SwarmEvent::Progress(stats) => AdapterEvent::SwarmProgress(stats),
            SwarmEvent::Done => AdapterEvent::SwarmDone,
            SwarmEvent::Error(message) => AdapterEvent::SwarmError(message),
        };
        if !events.publish(event) {
            break;
        }
    }
    debug!(generation = %events.generation(), "Swarm bridge stopped");
}
