//! Event vocabulary of the session core.
//!
//! Three flows meet in the orchestrator:
//! - [`MediaEvent`]s reported by the platform media element,
//! - [`AdapterEvent`]s published by source adapters and background tasks,
//!   always wrapped in a generation-tagged [`Envelope`],
//! - [`SessionNotice`]s broadcast to observers through [`SessionEventBus`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tokio::sync::mpsc;
use tracing::trace;

use crate::chapters::{Chapter, IntroWindow};
use crate::error::Error;
use crate::model::{
    AudioTrack, Generation, MaterializedFile, MediaIdentity, MediaInfo, MediaSource,
    ProgramGuide, SessionFailure, SourceKind, SwarmFileInfo, SwarmStats,
};
use crate::subtitles::Cue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaErrorKind {
    /// Manifest or segment could not be fetched.
    Network,
    /// Stream data is corrupt or undecodable.
    Decode,
    /// The element cannot play this format at all.
    Unsupported,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MediaError {
    pub kind: MediaErrorKind,
    pub message: String,
}

impl MediaError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: MediaErrorKind::Network,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: MediaErrorKind::Decode,
            message: message.into(),
        }
    }

    pub fn to_error(&self) -> Error {
        match self.kind {
            MediaErrorKind::Network => Error::network(self.message.clone()),
            MediaErrorKind::Decode | MediaErrorKind::Unsupported => {
                Error::format(self.message.clone())
            }
        }
    }
}

/// Text track discovered inside the media container.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddedTrack {
    pub index: usize,
    pub label: String,
    pub language: String,
}

/// Callbacks of the platform media element.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    LoadedMetadata { duration: f64 },
    DurationChange(f64),
    TimeUpdate(f64),
    Progress { buffered: f64 },
    Play,
    Pause,
    Ended,
    VolumeChange { volume: f64, muted: bool },
    RateChange(f64),
    Error(MediaError),
    TextTracks(Vec<EmbeddedTrack>),
    CuesLoaded { label: String, cues: Vec<Cue> },
    AudioTracks(Vec<AudioTrack>),
}

/// Normalized vocabulary spoken by adapters and session background tasks.
#[derive(Debug)]
pub enum AdapterEvent {
    /// A playable source is known. `epoch` identifies the adapter's source
    /// selection (channel switch, file bind) that produced it.
    SourceReady {
        epoch: u32,
        source: MediaSource,
        identity: MediaIdentity,
        title: String,
    },
    /// Source acquisition failed; the session enters `Error`.
    AcquisitionFailed(Error),
    SwarmReady {
        info_hash: String,
        files: Vec<SwarmFileInfo>,
    },
    SwarmProgress(SwarmStats),
    SwarmDone,
    SwarmError(String),
    /// Ready timeout elapsed.
    SwarmStalled,
    GuideLoaded(ProgramGuide),
    InfoLoaded {
        identity: MediaIdentity,
        info: MediaInfo,
    },
    ChaptersLoaded {
        identity: MediaIdentity,
        chapters: Vec<Chapter>,
    },
    PositionRecalled {
        identity: MediaIdentity,
        position: Option<f64>,
    },
    Materialized {
        file: String,
        result: Result<MaterializedFile, Error>,
    },
    Saved {
        file: String,
        result: Result<PathBuf, Error>,
    },
    CastFailed(Error),
}

#[derive(Debug)]
pub struct Envelope {
    pub generation: Generation,
    pub event: AdapterEvent,
}

/// Publishing side handed to adapters and tasks of one generation.
#[derive(Clone, Debug)]
pub struct EventSender {
    generation: Generation,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSender {
    pub(crate) fn new(generation: Generation, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Publishes an event. Returns `false` once the session is gone.
    pub fn publish(&self, event: AdapterEvent) -> bool {
        trace!(generation = %self.generation, ?event, "Publishing adapter event");
        self.tx
            .send(Envelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Discrete happenings broadcast to observers.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionNotice {
    Activated {
        generation: Generation,
        kind: SourceKind,
    },
    Ready {
        generation: Generation,
    },
    Failed(SessionFailure),
    /// Non-fatal error during playback.
    PlaybackError(SessionFailure),
    Recovering {
        attempt: usize,
    },
    /// Swarm not ready after the timeout; few or no seeds.
    Stalled,
    ResumeAvailable {
        position: f64,
    },
    IntroEntered(IntroWindow),
    IntroExited,
    DownloadFinished {
        file: String,
        path: PathBuf,
    },
    DownloadFailed {
        file: String,
        message: String,
    },
    CastStarted {
        url: String,
    },
    CastFailed(String),
    Ended,
}

/// Fan-out of [`SessionNotice`]s; disconnected subscribers are pruned.
#[derive(Clone, Default)]
pub struct SessionEventBus {
    subscribers: Arc<Mutex<Vec<Sender<SessionNotice>>>>,
}

impl SessionEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<SessionNotice> {
        let (tx, rx) = unbounded::<SessionNotice>();
        self.subscribers
            .lock()
            .expect("Event bus mutex poisoned")
            .push(tx);
        rx
    }

    pub fn broadcast(&self, notice: SessionNotice) {
        let mut subscribers = self.subscribers.lock().expect("Event bus mutex poisoned");
        subscribers.retain(|tx| tx.send(notice.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("Event bus mutex poisoned")
            .len()
    }
}
