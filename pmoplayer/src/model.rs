//! Data model shared by the session core, the adapters and observers.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::collaborators::ChannelListParser;
use crate::error::{Error, ErrorCause, Result};

/// Monotonic marker of an adapter instantiation.
///
/// Every `activate()` moves the session to a new generation; events carrying
/// an older one are discarded on arrival.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SourceKind {
    Live,
    Swarm,
    Local,
}

/// One entry of an IPTV channel list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub url: String,
    pub logo: Option<String>,
    pub group: Option<String>,
    /// Identifier used by the programme guide (`tvg-id`).
    pub guide_id: Option<String>,
}

impl Channel {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            logo: None,
            group: None,
            guide_id: None,
        }
    }

    /// Key used to look the channel up in a [`ProgramGuide`].
    pub fn guide_key(&self) -> &str {
        self.guide_id.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveDescriptor {
    pub channels: Vec<Channel>,
    /// `id` of the channel to start on.
    pub active_channel: String,
    /// XMLTV location, if any.
    pub epg_url: Option<String>,
}

impl LiveDescriptor {
    /// Builds a descriptor from a playlist, starting on its first channel.
    pub fn from_playlist(
        parser: &dyn ChannelListParser,
        text: &str,
        base_url: Option<&str>,
        epg_url: Option<String>,
    ) -> Result<Self> {
        let channels = parser.parse(text, base_url)?;
        let first = channels
            .first()
            .ok_or_else(|| Error::format("playlist has no channel"))?;
        Ok(Self {
            active_channel: first.id.clone(),
            channels,
            epg_url,
        })
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwarmMode {
    /// Bind one file of the swarm to the media sink.
    Stream,
    /// Never touch the media sink; the session only feeds the download queue.
    Download,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwarmDescriptor {
    /// Magnet link, info hash or `.torrent` URL.
    pub identifier: String,
    pub mode: SwarmMode,
    /// File name to bind as soon as the file list is known.
    pub preselect: Option<String>,
}

impl SwarmDescriptor {
    pub fn stream(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            mode: SwarmMode::Stream,
            preselect: None,
        }
    }

    pub fn with_preselect(mut self, name: impl Into<String>) -> Self {
        self.preselect = Some(name.into());
        self
    }
}

/// A file picked by the user on the local machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub modified: i64,
}

impl LocalFile {
    /// Reads name, size and modification time from the filesystem.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(Error::unavailable(format!("{} is not a file", path.display())));
        }
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: meta.len(),
            modified,
        })
    }
}

/// What the caller wants to play. Exactly one is active per session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionDescriptor {
    Live(LiveDescriptor),
    Swarm(SwarmDescriptor),
    LocalFile(LocalFile),
}

impl SessionDescriptor {
    pub fn kind(&self) -> SourceKind {
        match self {
            SessionDescriptor::Live(_) => SourceKind::Live,
            SessionDescriptor::Swarm(_) => SourceKind::Swarm,
            SessionDescriptor::LocalFile(_) => SourceKind::Local,
        }
    }
}

/// Stable identity of a logical piece of content.
///
/// Used as the key for position persistence; the same content produces the
/// same identity across reloads.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaIdentity(String);

impl MediaIdentity {
    pub fn live(channel_url: &str) -> Self {
        MediaIdentity(format!("live:{channel_url}"))
    }

    pub fn swarm(info_hash: &str, file_name: &str) -> Self {
        MediaIdentity(format!("swarm:{}:{file_name}", info_hash.to_lowercase()))
    }

    pub fn local(file: &LocalFile) -> Self {
        MediaIdentity(format!("local:{}:{}:{}", file.name, file.size, file.modified))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key: `prefix:` followed by the SHA-256 of the identity.
    pub fn storage_key(&self, prefix: &str) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        format!("{prefix}:{}", hex::encode(digest))
    }
}

impl fmt::Display for MediaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Revocable URL pointing at in-memory data.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobUrl(pub String);

impl BlobUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the media sink is asked to load.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MediaSource {
    /// Network stream (HLS manifest, progressive URL).
    Remote(String),
    /// Local file wrapped in a blob URL.
    Blob(BlobUrl),
    /// File rendered by the swarm engine.
    Swarm { file: String, url: String },
}

impl MediaSource {
    pub fn url(&self) -> &str {
        match self {
            MediaSource::Remote(url) => url,
            MediaSource::Blob(blob) => blob.as_str(),
            MediaSource::Swarm { url, .. } => url,
        }
    }

    /// URL a cast device can fetch by itself, if any.
    pub fn castable_url(&self) -> Option<&str> {
        match self {
            MediaSource::Remote(url) => Some(url),
            MediaSource::Swarm { url, .. } if url.starts_with("http") => Some(url),
            _ => None,
        }
    }
}

/// Transport state as last reported by the media element.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlaybackState {
    pub playing: bool,
    pub volume: f64,
    pub muted: bool,
    pub rate: f64,
    pub current_time: f64,
    /// `None` until metadata is known, `Some(INFINITY)` for live streams.
    pub duration: Option<f64>,
    pub buffered_time: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            playing: false,
            volume: 1.0,
            muted: false,
            rate: 1.0,
            current_time: 0.0,
            duration: None,
            buffered_time: 0.0,
        }
    }
}

impl PlaybackState {
    /// Duration when it is known and finite.
    pub fn finite_duration(&self) -> Option<f64> {
        self.duration.filter(|d| d.is_finite() && *d > 0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionFailure {
    pub cause: ErrorCause,
    pub message: String,
}

impl From<&Error> for SessionFailure {
    fn from(err: &Error) -> Self {
        SessionFailure {
            cause: err.cause(),
            message: err.user_message(),
        }
    }
}

/// `Idle → Activating → Ready ⇄ Error`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SessionStatus {
    Idle,
    Activating,
    Ready,
    Error(SessionFailure),
}

impl SessionStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, SessionStatus::Error(_))
    }
}

/// Enrichment data for the current content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub year: Option<u32>,
    pub rating: Option<f32>,
    pub summary: Option<String>,
    pub poster_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub title: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub description: Option<String>,
}

impl Program {
    pub fn is_on_air(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.stop
    }
}

/// Programme guide: guide channel id to programmes.
pub type ProgramGuide = HashMap<String, Vec<Program>>;

/// Current and next programme of a channel at a given instant.
pub fn now_and_next(
    programs: &[Program],
    at: DateTime<Utc>,
) -> (Option<Program>, Option<Program>) {
    let mut sorted: Vec<&Program> = programs.iter().collect();
    sorted.sort_by_key(|p| p.start);
    let now = sorted.iter().find(|p| p.is_on_air(at)).map(|p| (*p).clone());
    let next = sorted.iter().find(|p| p.start > at).map(|p| (*p).clone());
    (now, next)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum CastState {
    #[default]
    NoDevices,
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SwarmFileInfo {
    pub name: String,
    pub length: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SwarmStats {
    /// Downloaded ratio in `[0, 1]`.
    pub progress: f64,
    pub download_speed: u64,
    pub upload_speed: u64,
    pub peers: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AudioTrack {
    pub index: usize,
    pub label: String,
    pub language: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TextTrackMode {
    Showing,
    Hidden,
}

/// A swarm file turned into in-memory data ready to be saved.
#[derive(Clone, Debug)]
pub struct MaterializedFile {
    pub name: String,
    pub mime: String,
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(name: &str, size: u64, modified: i64) -> LocalFile {
        LocalFile {
            path: PathBuf::from(format!("/tmp/{name}")),
            name: name.to_string(),
            size,
            modified,
        }
    }

    #[test]
    fn test_identity_is_deterministic() {
        let a = MediaIdentity::local(&local("movie.mkv", 1000, 42));
        let b = MediaIdentity::local(&local("movie.mkv", 1000, 42));
        assert_eq!(a, b);
        assert_eq!(a.storage_key("position"), b.storage_key("position"));
    }

    #[test]
    fn test_identity_distinguishes_content() {
        let a = MediaIdentity::local(&local("movie.mkv", 1000, 42));
        let b = MediaIdentity::local(&local("movie.mkv", 1001, 42));
        assert_ne!(a.storage_key("position"), b.storage_key("position"));

        let s1 = MediaIdentity::swarm("ABCDEF", "e01.mkv");
        let s2 = MediaIdentity::swarm("abcdef", "e01.mkv");
        assert_eq!(s1, s2);
        assert_ne!(s1, MediaIdentity::swarm("abcdef", "e02.mkv"));
    }

    #[test]
    fn test_storage_key_shape() {
        let key = MediaIdentity::live("http://x/a.m3u8").storage_key("position");
        assert!(key.starts_with("position:"));
        assert_eq!(key.len(), "position:".len() + 64);
    }

    #[test]
    fn test_castable_url() {
        assert_eq!(
            MediaSource::Remote("http://a".into()).castable_url(),
            Some("http://a")
        );
        assert_eq!(MediaSource::Blob(BlobUrl("blob:1".into())).castable_url(), None);
        let swarm = MediaSource::Swarm {
            file: "a.mkv".into(),
            url: "http://127.0.0.1:8000/0".into(),
        };
        assert!(swarm.castable_url().is_some());
    }

    #[test]
    fn test_now_and_next() {
        let at = |h| Utc.with_ymd_and_hms(2026, 1, 1, h, 0, 0).unwrap();
        let programs = vec![
            Program {
                title: "Late".into(),
                start: at(12),
                stop: at(13),
                description: None,
            },
            Program {
                title: "News".into(),
                start: at(10),
                stop: at(11),
                description: None,
            },
            Program {
                title: "Sport".into(),
                start: at(11),
                stop: at(12),
                description: None,
            },
        ];
        let (now, next) = now_and_next(&programs, at(10));
        assert_eq!(now.unwrap().title, "News");
        assert_eq!(next.unwrap().title, "Sport");

        let (now, next) = now_and_next(&programs, at(14));
        assert!(now.is_none());
        assert!(next.is_none());
    }

    #[test]
    fn test_generation_next() {
        assert_eq!(Generation(1).next(), Generation(2));
        assert!(Generation(1) < Generation(2));
    }
}
