//! Reference collaborators for tests and headless use.
//!
//! Every implementation here records what it was asked to do and lets the
//! caller script the answers, so sessions can be driven end to end without a
//! media element, a torrent engine or a network.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::adapters::AdapterContext;
use crate::chapters::Chapter;
use crate::collaborators::{
    BlobSaver, BlobStore, CastDevice, ChannelListParser, Collaborators, Fetcher, MediaSink,
    MetadataProvider, ProgramGuideParser, SwarmEngine, SwarmEvent, SwarmFile, SwarmHandle, SwarmSource,
};
use crate::config_ext::SessionConfig;
use crate::error::{Error, Result};
use crate::events::{Envelope, EventSender};
use crate::model::{
    BlobUrl, CastState, Channel, Generation, LiveDescriptor, LocalFile, MaterializedFile,
    MediaInfo, MediaSource, Program, ProgramGuide, TextTrackMode,
};
use crate::session::Session;
use crate::store::MemoryStore;

// ============================================================================
// Media sink
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum SinkCall {
    Load(String),
    Unload,
    Play,
    Pause,
    Seek(f64),
    Volume(f64),
    Muted(bool),
    Rate(f64),
    AddTrack(String, String),
    TextMode(String, TextTrackMode),
    CueTiming(String, usize, f64, f64),
    AudioTrack(usize),
    PictureInPicture(bool),
    Fullscreen(bool),
}

/// Media sink that only records calls. Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().expect("Sink mutex poisoned").clone()
    }

    pub fn clear(&self) {
        self.calls.lock().expect("Sink mutex poisoned").clear();
    }

    pub fn loads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Load(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Seek(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Last mode set for `label`.
    pub fn text_mode(&self, label: &str) -> Option<TextTrackMode> {
        self.calls().into_iter().rev().find_map(|c| match c {
            SinkCall::TextMode(l, mode) if l == label => Some(mode),
            _ => None,
        })
    }

    pub fn count(&self, call: &SinkCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn push(&self, call: SinkCall) {
        self.calls.lock().expect("Sink mutex poisoned").push(call);
    }
}

impl MediaSink for RecordingSink {
    fn load(&mut self, source: &MediaSource) {
        self.push(SinkCall::Load(source.url().to_string()));
    }

    fn unload(&mut self) {
        self.push(SinkCall::Unload);
    }

    fn play(&mut self) {
        self.push(SinkCall::Play);
    }

    fn pause(&mut self) {
        self.push(SinkCall::Pause);
    }

    fn seek(&mut self, seconds: f64) {
        self.push(SinkCall::Seek(seconds));
    }

    fn set_volume(&mut self, volume: f64) {
        self.push(SinkCall::Volume(volume));
    }

    fn set_muted(&mut self, muted: bool) {
        self.push(SinkCall::Muted(muted));
    }

    fn set_rate(&mut self, rate: f64) {
        self.push(SinkCall::Rate(rate));
    }

    fn add_text_track(&mut self, label: &str, _language: &str, url: &BlobUrl) {
        self.push(SinkCall::AddTrack(label.to_string(), url.to_string()));
    }

    fn set_text_track_mode(&mut self, label: &str, mode: TextTrackMode) {
        self.push(SinkCall::TextMode(label.to_string(), mode));
    }

    fn set_cue_timing(&mut self, label: &str, cue: usize, start: f64, end: f64) {
        self.push(SinkCall::CueTiming(label.to_string(), cue, start, end));
    }

    fn select_audio_track(&mut self, index: usize) {
        self.push(SinkCall::AudioTrack(index));
    }

    fn set_picture_in_picture(&mut self, enabled: bool) {
        self.push(SinkCall::PictureInPicture(enabled));
    }

    fn set_fullscreen(&mut self, enabled: bool) {
        self.push(SinkCall::Fullscreen(enabled));
    }
}

// ============================================================================
// Blob URLs
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    next: AtomicUsize,
    live: Mutex<HashMap<BlobUrl, usize>>,
    revoked: Mutex<Vec<BlobUrl>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self, url: &BlobUrl) -> bool {
        self.live.lock().expect("Blob mutex poisoned").contains_key(url)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().expect("Blob mutex poisoned").len()
    }

    pub fn revoked(&self) -> Vec<BlobUrl> {
        self.revoked.lock().expect("Blob mutex poisoned").clone()
    }

    fn allocate(&self, size: usize) -> BlobUrl {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let url = BlobUrl(format!("blob:pmoplayer/{n}"));
        self.live
            .lock()
            .expect("Blob mutex poisoned")
            .insert(url.clone(), size);
        url
    }
}

impl BlobStore for MemoryBlobStore {
    fn create(&self, data: Vec<u8>, _mime: &str) -> Result<BlobUrl> {
        Ok(self.allocate(data.len()))
    }

    fn create_for_file(&self, file: &LocalFile) -> Result<BlobUrl> {
        Ok(self.allocate(file.size as usize))
    }

    fn revoke(&self, url: &BlobUrl) {
        if self
            .live
            .lock()
            .expect("Blob mutex poisoned")
            .remove(url)
            .is_some()
        {
            self.revoked
                .lock()
                .expect("Blob mutex poisoned")
                .push(url.clone());
        }
    }
}

// ============================================================================
// Swarm engine
// ============================================================================

pub struct ScriptedFile {
    info_hash: String,
    name: String,
    length: u64,
    selected: AtomicBool,
    fail: AtomicBool,
    delay: Mutex<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

#[async_trait]
impl SwarmFile for ScriptedFile {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn select(&self) {
        self.selected.store(true, Ordering::SeqCst);
    }

    fn deselect(&self) {
        self.selected.store(false, Ordering::SeqCst);
    }

    fn stream_url(&self) -> String {
        format!("http://127.0.0.1:9000/{}/{}", self.info_hash, self.name)
    }

    async fn materialize(&self) -> Result<MaterializedFile> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().expect("Delay mutex poisoned");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Materialize(format!("{} has no peers", self.name)));
        }
        Ok(MaterializedFile {
            name: self.name.clone(),
            mime: "application/octet-stream".to_string(),
            data: Bytes::from(vec![0u8; self.length.min(1024) as usize]),
        })
    }
}

struct TorrentInner {
    info_hash: String,
    files: Vec<Arc<ScriptedFile>>,
    ready: AtomicBool,
    destroyed: AtomicBool,
    events: Mutex<Option<mpsc::UnboundedSender<SwarmEvent>>>,
    max_in_flight: Arc<AtomicUsize>,
}

/// A torrent known to the [`ScriptedSwarmEngine`]. Clones share state.
#[derive(Clone)]
pub struct ScriptedTorrent {
    inner: Arc<TorrentInner>,
}

impl ScriptedTorrent {
    pub fn magnet(&self) -> String {
        format!("magnet:?xt=urn:btih:{}&dn=test", self.inner.info_hash)
    }

    /// Sends an engine event to the source currently attached.
    pub fn emit(&self, event: SwarmEvent) {
        if event == SwarmEvent::Ready {
            self.inner.ready.store(true, Ordering::SeqCst);
        }
        if let Some(tx) = self.inner.events.lock().expect("Torrent mutex poisoned").as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.file(name)
            .map(|f| f.selected.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn fail_materialize(&self, name: &str) {
        if let Some(file) = self.file(name) {
            file.fail.store(true, Ordering::SeqCst);
        }
    }

    pub fn set_materialize_delay(&self, delay: Duration) {
        for file in &self.inner.files {
            *file.delay.lock().expect("Delay mutex poisoned") = delay;
        }
    }

    /// Highest number of simultaneous materializations seen.
    pub fn max_concurrent_materializations(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn file(&self, name: &str) -> Option<&Arc<ScriptedFile>> {
        self.inner.files.iter().find(|f| f.name == name)
    }
}

impl SwarmHandle for ScriptedTorrent {
    fn info_hash(&self) -> String {
        self.inner.info_hash.clone()
    }

    fn files(&self) -> Vec<Arc<dyn SwarmFile>> {
        if !self.inner.ready.load(Ordering::SeqCst) {
            return Vec::new();
        }
        self.inner
            .files
            .iter()
            .map(|f| f.clone() as Arc<dyn SwarmFile>)
            .collect()
    }

    fn destroy(&self) {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        self.inner.events.lock().expect("Torrent mutex poisoned").take();
    }
}

#[derive(Default)]
pub struct ScriptedSwarmEngine {
    torrents: Mutex<HashMap<String, ScriptedTorrent>>,
}

impl ScriptedSwarmEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a torrent with the given files.
    pub fn script(&self, info_hash: &str, files: &[(&str, u64)]) -> ScriptedTorrent {
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let info_hash = info_hash.to_lowercase();
        let files = files
            .iter()
            .map(|(name, length)| {
                Arc::new(ScriptedFile {
                    info_hash: info_hash.clone(),
                    name: name.to_string(),
                    length: *length,
                    selected: AtomicBool::new(false),
                    fail: AtomicBool::new(false),
                    delay: Mutex::new(Duration::ZERO),
                    in_flight: in_flight.clone(),
                    max_in_flight: max_in_flight.clone(),
                })
            })
            .collect();
        let torrent = ScriptedTorrent {
            inner: Arc::new(TorrentInner {
                info_hash: info_hash.clone(),
                files,
                ready: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                events: Mutex::new(None),
                max_in_flight,
            }),
        };
        self.torrents
            .lock()
            .expect("Engine mutex poisoned")
            .insert(info_hash, torrent.clone());
        torrent
    }
}

/// Extracts the info hash of a magnet link or a bare 40-character hash.
pub fn parse_info_hash(identifier: &str) -> Result<String> {
    let identifier = identifier.trim();
    if let Some(query) = identifier.strip_prefix("magnet:?") {
        return query
            .split('&')
            .find_map(|param| param.strip_prefix("xt=urn:btih:"))
            .filter(|hash| !hash.is_empty())
            .map(str::to_lowercase)
            .ok_or_else(|| Error::InvalidIdentifier(identifier.to_string()));
    }
    if identifier.len() == 40 && identifier.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(identifier.to_lowercase());
    }
    Err(Error::InvalidIdentifier(identifier.to_string()))
}

impl SwarmEngine for ScriptedSwarmEngine {
    fn add_source(&self, identifier: &str) -> Result<SwarmSource> {
        let hash = parse_info_hash(identifier)?;
        let torrent = self
            .torrents
            .lock()
            .expect("Engine mutex poisoned")
            .get(&hash)
            .cloned()
            .ok_or_else(|| Error::unavailable("Torrent"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        *torrent.inner.events.lock().expect("Torrent mutex poisoned") = Some(tx);
        torrent.inner.destroyed.store(false, Ordering::SeqCst);
        Ok(SwarmSource {
            handle: Arc::new(torrent),
            events: rx,
        })
    }
}

// ============================================================================
// Network, guide, metadata
// ============================================================================

#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, std::result::Result<String, String>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, body: &str) {
        self.responses
            .lock()
            .expect("Fetcher mutex poisoned")
            .insert(url.to_string(), Ok(body.to_string()));
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.responses
            .lock()
            .expect("Fetcher mutex poisoned")
            .insert(url.to_string(), Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("Fetcher mutex poisoned").clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.requests
            .lock()
            .expect("Fetcher mutex poisoned")
            .push(url.to_string());
        match self
            .responses
            .lock()
            .expect("Fetcher mutex poisoned")
            .get(url)
            .cloned()
        {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(Error::network(message)),
            None => Err(Error::network(format!("GET {url} returned 404"))),
        }
    }
}

/// Guide parser for a line format: `channel|title|start|stop`, RFC 3339
/// timestamps, `#` comments.
#[derive(Debug, Default)]
pub struct LineGuideParser;

impl ProgramGuideParser for LineGuideParser {
    fn parse(&self, text: &str) -> Result<ProgramGuide> {
        let mut guide = ProgramGuide::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('|').collect();
            let [channel, title, start, stop] = fields.as_slice() else {
                return Err(Error::format(format!("bad guide line: {line}")));
            };
            let parse = |s: &str| {
                DateTime::parse_from_rfc3339(s)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| Error::format(format!("bad guide time {s}: {e}")))
            };
            guide.entry(channel.to_string()).or_default().push(Program {
                title: title.to_string(),
                start: parse(start)?,
                stop: parse(stop)?,
                description: None,
            });
        }
        Ok(guide)
    }
}

/// Playlist in `id|name|url[|guide id]` lines.
pub struct LinePlaylistParser;

impl ChannelListParser for LinePlaylistParser {
    fn parse(&self, text: &str, base_url: Option<&str>) -> Result<Vec<Channel>> {
        let mut channels = Vec::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('|').collect();
            let (id, name, url, guide_id) = match fields.as_slice() {
                [id, name, url] => (id, name, url, None),
                [id, name, url, guide] => (id, name, url, Some(guide.to_string())),
                _ => return Err(Error::format(format!("bad playlist line: {line}"))),
            };
            let url = match base_url {
                Some(base) if !url.contains("://") => {
                    format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
                }
                _ => url.to_string(),
            };
            let mut channel = Channel::new(*id, *name, url);
            channel.guide_id = guide_id;
            channels.push(channel);
        }
        Ok(channels)
    }
}

#[derive(Default)]
pub struct StaticMetadata {
    info: Mutex<HashMap<String, MediaInfo>>,
    chapters: Mutex<HashMap<String, Vec<Chapter>>>,
    lookups: AtomicUsize,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_info(&self, name: &str, info: MediaInfo) {
        self.info
            .lock()
            .expect("Metadata mutex poisoned")
            .insert(name.to_string(), info);
    }

    pub fn add_chapters(&self, title: &str, chapters: Vec<Chapter>) {
        self.chapters
            .lock()
            .expect("Metadata mutex poisoned")
            .insert(title.to_string(), chapters);
    }

    /// Number of lookups answered so far, info and chapters together.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadata {
    async fn lookup_info(&self, name: &str) -> Option<MediaInfo> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.info
            .lock()
            .expect("Metadata mutex poisoned")
            .get(name)
            .cloned()
    }

    async fn lookup_chapters(&self, title: &str, _duration_seconds: f64) -> Option<Vec<Chapter>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.chapters
            .lock()
            .expect("Metadata mutex poisoned")
            .get(title)
            .cloned()
    }
}

// ============================================================================
// Saving and casting
// ============================================================================

#[derive(Default)]
pub struct MemorySaver {
    saved: Mutex<Vec<MaterializedFile>>,
    failing: AtomicBool,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn saved_names(&self) -> Vec<String> {
        self.saved
            .lock()
            .expect("Saver mutex poisoned")
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }
}

#[async_trait]
impl BlobSaver for MemorySaver {
    async fn save(&self, file: MaterializedFile) -> Result<PathBuf> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::storage("disk full"));
        }
        let path = PathBuf::from("/downloads").join(&file.name);
        self.saved.lock().expect("Saver mutex poisoned").push(file);
        Ok(path)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CastLoad {
    pub url: String,
    pub title: String,
    pub subtitle_url: Option<String>,
}

#[derive(Default)]
pub struct ScriptedCast {
    state: Mutex<CastState>,
    loads: Mutex<Vec<CastLoad>>,
    failing: AtomicBool,
}

impl ScriptedCast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, state: CastState) {
        *self.state.lock().expect("Cast mutex poisoned") = state;
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn loads(&self) -> Vec<CastLoad> {
        self.loads.lock().expect("Cast mutex poisoned").clone()
    }
}

#[async_trait]
impl CastDevice for ScriptedCast {
    fn state(&self) -> CastState {
        *self.state.lock().expect("Cast mutex poisoned")
    }

    async fn load_media(&self, url: &str, title: &str, subtitle_url: Option<&str>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Cast("receiver refused the media".to_string()));
        }
        self.loads.lock().expect("Cast mutex poisoned").push(CastLoad {
            url: url.to_string(),
            title: title.to_string(),
            subtitle_url: subtitle_url.map(str::to_string),
        });
        Ok(())
    }
}

// ============================================================================
// Rig
// ============================================================================

/// All reference collaborators wired together.
pub struct TestRig {
    pub sink: RecordingSink,
    pub blobs: Arc<MemoryBlobStore>,
    pub swarm: Arc<ScriptedSwarmEngine>,
    pub store: Arc<MemoryStore>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub metadata: Arc<StaticMetadata>,
    pub saver: Arc<MemorySaver>,
    pub cast: Arc<ScriptedCast>,
    pub collaborators: Collaborators,
    pub config: SessionConfig,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
}

impl Default for TestRig {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRig {
    pub const GUIDE_TEXT: &'static str = "\
# channel|title|start|stop
one|Morning News|2000-01-01T00:00:00Z|2999-01-01T00:00:00Z
one|Late Movie|2999-01-01T00:00:00Z|2999-01-01T02:00:00Z
two|Cartoons|2000-01-01T00:00:00Z|2999-01-01T00:00:00Z
";

    pub fn new() -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        let swarm = Arc::new(ScriptedSwarmEngine::new());
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(ScriptedFetcher::new());
        let metadata = Arc::new(StaticMetadata::new());
        let saver = Arc::new(MemorySaver::new());
        let cast = Arc::new(ScriptedCast::new());

        let collaborators = Collaborators::new(
            blobs.clone(),
            swarm.clone(),
            store.clone(),
            fetcher.clone(),
            Arc::new(LineGuideParser),
            saver.clone(),
        )
        .with_metadata(metadata.clone())
        .with_cast(cast.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sink: RecordingSink::default(),
            blobs,
            swarm,
            store,
            fetcher,
            metadata,
            saver,
            cast,
            collaborators,
            config: SessionConfig::default(),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Session wired to the rig's collaborators and recording sink.
    pub fn session(&self) -> Session {
        Session::new(
            self.config.clone(),
            self.collaborators.clone(),
            Box::new(self.sink.clone()),
        )
    }

    /// Adapter context publishing to the rig's own channel.
    pub fn context(&self, generation: Generation) -> AdapterContext {
        AdapterContext {
            events: EventSender::new(generation, self.tx.clone()),
            collaborators: self.collaborators.clone(),
            config: self.config.clone(),
        }
    }

    /// Receiving side of [`TestRig::context`]. Can be taken once.
    pub fn receiver(&self) -> mpsc::UnboundedReceiver<Envelope> {
        self.rx
            .lock()
            .expect("Rig mutex poisoned")
            .take()
            .expect("Rig receiver already taken")
    }

    /// Two channels, `one` and `two`, starting on `one`.
    pub fn live_descriptor(epg_url: Option<&str>) -> LiveDescriptor {
        let mut one = Channel::new("one", "Channel One", "http://tv.example/one.m3u8");
        one.guide_id = Some("one".to_string());
        let two = Channel::new("two", "Channel Two", "http://tv.example/two.m3u8");
        LiveDescriptor {
            channels: vec![one, two],
            active_channel: "one".to_string(),
            epg_url: epg_url.map(str::to_string),
        }
    }

    pub fn local_file(name: &str) -> LocalFile {
        LocalFile {
            path: PathBuf::from("/media").join(name),
            name: name.to_string(),
            size: 1_000_000,
            modified: 1_700_000_000,
        }
    }
}
