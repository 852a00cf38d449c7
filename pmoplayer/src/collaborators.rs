//! Interfaces of everything the session core consumes but does not implement:
//! the platform media element, blob URLs, the swarm engine, the persistent
//! cache, network fetches, the programme guide parser, metadata enrichment,
//! cast devices and the final save of downloaded files.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::chapters::Chapter;
use crate::error::Result;
use crate::model::{
    BlobUrl, CastState, Channel, LocalFile, MaterializedFile, MediaInfo, MediaSource, ProgramGuide,
    SwarmStats, TextTrackMode,
};

/// The platform media element.
///
/// Only the session orchestrator writes to it. Calls are fire-and-forget; the
/// element reports back through [`crate::events::MediaEvent`].
pub trait MediaSink: Send {
    fn load(&mut self, source: &MediaSource);
    fn unload(&mut self);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, seconds: f64);
    fn set_volume(&mut self, volume: f64);
    fn set_muted(&mut self, muted: bool);
    fn set_rate(&mut self, rate: f64);
    fn add_text_track(&mut self, label: &str, language: &str, url: &BlobUrl);
    fn set_text_track_mode(&mut self, label: &str, mode: TextTrackMode);
    /// Rewrites the timing of cue `cue` (index in the track) of track `label`.
    fn set_cue_timing(&mut self, label: &str, cue: usize, start: f64, end: f64);
    fn select_audio_track(&mut self, index: usize);
    fn set_picture_in_picture(&mut self, enabled: bool);
    fn set_fullscreen(&mut self, enabled: bool);
}

/// Creates and revokes blob URLs.
pub trait BlobStore: Send + Sync {
    fn create(&self, data: Vec<u8>, mime: &str) -> Result<BlobUrl>;
    fn create_for_file(&self, file: &LocalFile) -> Result<BlobUrl>;
    fn revoke(&self, url: &BlobUrl);
}

/// Raw events of a swarm source.
#[derive(Clone, Debug, PartialEq)]
pub enum SwarmEvent {
    /// Metadata is known; the file list is available.
    Ready,
    Progress(SwarmStats),
    Done,
    Error(String),
}

/// One file inside a swarm.
#[async_trait]
pub trait SwarmFile: Send + Sync {
    fn name(&self) -> String;
    fn length(&self) -> u64;
    /// Prioritise the pieces of this file.
    fn select(&self);
    fn deselect(&self);
    /// URL the media sink can render the file from.
    fn stream_url(&self) -> String;
    /// Collects the whole file in memory.
    async fn materialize(&self) -> Result<MaterializedFile>;
}

/// A torrent added to the engine.
pub trait SwarmHandle: Send + Sync {
    fn info_hash(&self) -> String;
    /// Empty until [`SwarmEvent::Ready`].
    fn files(&self) -> Vec<Arc<dyn SwarmFile>>;
    /// Stops the transfer and releases every resource of this source.
    fn destroy(&self);
}

pub struct SwarmSource {
    pub handle: Arc<dyn SwarmHandle>,
    pub events: mpsc::UnboundedReceiver<SwarmEvent>,
}

pub trait SwarmEngine: Send + Sync {
    /// Adds a source; an unparseable identifier fails immediately.
    fn add_source(&self, identifier: &str) -> Result<SwarmSource>;
}

/// Generic keyed store with expiry.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Playlist parsing (M3U and friends). Relative entries resolve against
/// `base_url` when given.
pub trait ChannelListParser: Send + Sync {
    fn parse(&self, text: &str, base_url: Option<&str>) -> Result<Vec<Channel>>;
}

/// XMLTV parsing, provided by the guide collaborator.
pub trait ProgramGuideParser: Send + Sync {
    fn parse(&self, xml: &str) -> Result<ProgramGuide>;
}

/// Metadata enrichment. Absence is an ordinary answer.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn lookup_info(&self, name: &str) -> Option<MediaInfo>;
    async fn lookup_chapters(&self, title: &str, duration_seconds: f64) -> Option<Vec<Chapter>>;
}

#[async_trait]
pub trait CastDevice: Send + Sync {
    fn state(&self) -> CastState;
    async fn load_media(&self, url: &str, title: &str, subtitle_url: Option<&str>) -> Result<()>;
}

/// Final step of a download: hands the materialized data to the user.
#[async_trait]
pub trait BlobSaver: Send + Sync {
    async fn save(&self, file: MaterializedFile) -> Result<PathBuf>;
}

/// Every collaborator a session needs.
#[derive(Clone)]
pub struct Collaborators {
    pub blobs: Arc<dyn BlobStore>,
    pub swarm: Arc<dyn SwarmEngine>,
    pub store: Arc<dyn KeyValueStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub guide_parser: Arc<dyn ProgramGuideParser>,
    pub saver: Arc<dyn BlobSaver>,
    pub metadata: Option<Arc<dyn MetadataProvider>>,
    pub cast: Option<Arc<dyn CastDevice>>,
}

impl Collaborators {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        swarm: Arc<dyn SwarmEngine>,
        store: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn Fetcher>,
        guide_parser: Arc<dyn ProgramGuideParser>,
        saver: Arc<dyn BlobSaver>,
    ) -> Self {
        Self {
            blobs,
            swarm,
            store,
            fetcher,
            guide_parser,
            saver,
            metadata: None,
            cast: None,
        }
    }

    pub fn with_metadata(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(provider);
        self
    }

    pub fn with_cast(mut self, device: Arc<dyn CastDevice>) -> Self {
        self.cast = Some(device);
        self
    }
}
