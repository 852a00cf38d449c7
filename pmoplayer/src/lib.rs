//! # pmoplayer - Playback session orchestration
//!
//! Coordinates one playback session over three kinds of sources: IPTV live
//! channels, peer-to-peer swarms and local files. The crate owns the
//! lifecycle and the per-session state (subtitles, download queue, chapters,
//! resume positions) and drives an abstract media element; everything else
//! (blob URLs, the torrent engine, caches, networking) is a collaborator.
//!
//! ## Usage
//!
//! With the `testing` feature, the scripted collaborators of
//! the `testing` module stand in for the platform:
//!
//! ```rust
//! # #[cfg(feature = "testing")]
//! use pmoplayer::testing::TestRig;
//! use pmoplayer::{SessionDescriptor, spawn_session};
//!
//! # #[cfg(feature = "testing")]
//! # tokio_test::block_on(async {
//! let rig = TestRig::new();
//! let handle = spawn_session(rig.session());
//!
//! handle
//!     .activate(SessionDescriptor::LocalFile(TestRig::local_file("film.mp4")))
//!     .unwrap();
//! let snapshot = handle.wait_for(|s| s.identity.is_some()).await.unwrap();
//! assert_eq!(snapshot.title.as_deref(), Some("film.mp4"));
//! # });
//! ```

pub mod adapters;
pub mod chapters;
pub mod collaborators;
pub mod config_ext;
pub mod downloads;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod position;
pub mod runtime;
pub mod saver;
pub mod session;
pub mod store;
pub mod subtitles;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapters::{AdapterContext, SourceAdapter};
pub use chapters::{Chapter, IntroWindow, is_in_intro_window};
pub use collaborators::{
    BlobSaver, BlobStore, CastDevice, ChannelListParser, Collaborators, Fetcher, KeyValueStore,
    MediaSink, MetadataProvider, ProgramGuideParser, SwarmEngine, SwarmEvent, SwarmFile,
    SwarmHandle, SwarmSource,
};
pub use config_ext::{PlayerConfigExt, SessionConfig};
pub use downloads::{DownloadQueueItem, DownloadStatus};
pub use enrichment::CachedMetadataProvider;
pub use error::{Error, ErrorCause, Result};
pub use events::{EmbeddedTrack, MediaError, MediaErrorKind, MediaEvent, SessionNotice};
pub use fetch::HttpFetcher;
pub use logging::{LogHandle, init_logging, init_logging_with};
pub use model::{
    BlobUrl, CastState, Channel, Generation, LiveDescriptor, LocalFile, MediaIdentity,
    MediaSource, PlaybackState, SessionDescriptor, SessionStatus, SourceKind, SwarmDescriptor,
    SwarmMode,
};
pub use position::{ResumeChoice, ResumeOffer, ResumePolicy};
pub use runtime::{SessionHandle, spawn_session};
pub use saver::FileSaver;
pub use session::{Command, Session, SessionSnapshot};
pub use store::{JsonFileStore, MemoryStore};
pub use subtitles::{Cue, SubtitleTrack};
