//! Session orchestrator.
//!
//! The [`Session`] owns the media sink and every piece of per-session state.
//! It is driven from one place: commands, media element callbacks and
//! generation-tagged adapter events all go through `&mut self`, so there is
//! no shared mutable state and no locking.
//!
//! `activate()` tears the previous source down synchronously (position flush,
//! adapter teardown, blob revocation, sink unload) and moves to a new
//! [`Generation`] before the new adapter starts. Events still in flight from
//! the old adapter carry the old generation and are dropped on arrival.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::adapters::{AdapterCommand, AdapterContext, Recovery, SourceAdapter, TaskSet, adapter_for};
use crate::chapters::{Chapter, IntroTracker, IntroTransition, IntroWindow};
use crate::collaborators::{Collaborators, MediaSink};
use crate::config_ext::SessionConfig;
use crate::downloads::{DownloadQueue, DownloadQueueItem};
use crate::enrichment::enrich;
use crate::error::{Error, Result};
use crate::events::{
    AdapterEvent, Envelope, EventSender, MediaError, MediaEvent, SessionEventBus, SessionNotice,
};
use crate::model::{
    AudioTrack, CastState, Channel, Generation, MediaIdentity, MediaInfo, MediaSource,
    PlaybackState, Program, ProgramGuide, SessionDescriptor, SessionFailure, SessionStatus,
    SourceKind, SwarmFileInfo, SwarmMode, SwarmStats, now_and_next,
};
use crate::position::{PositionCache, ResumeChoice, ResumeOffer};
use crate::subtitles::{Registration, SubtitleRegistry, SubtitleTrack, parse_subtitle_text, to_webvtt};

/// Transport and selection commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Play,
    Pause,
    /// Ignored until metadata is loaded.
    Seek(f64),
    SetVolume(f64),
    SetMuted(bool),
    ToggleMute,
    SetRate(f64),
    SetPictureInPicture(bool),
    SetFullscreen(bool),
    SelectSubtitle(Option<String>),
    SetSubtitleOffset(f64),
    SelectAudio(usize),
    SelectChannel(String),
    SelectFile(String),
    Download(String),
    RetryDownload(String),
    SkipIntro,
    Resume(ResumeChoice),
    Cast,
}

/// Swarm state exposed to observers.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SwarmView {
    pub info_hash: Option<String>,
    pub files: Vec<SwarmFileInfo>,
    pub stats: SwarmStats,
    pub ready: bool,
    pub done: bool,
    pub stalled: bool,
    pub error: Option<String>,
}

/// Read-only copy of the session state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub generation: Generation,
    pub status: SessionStatus,
    pub kind: Option<SourceKind>,
    pub title: Option<String>,
    pub identity: Option<MediaIdentity>,
    pub playback: PlaybackState,
    pub subtitles: Vec<SubtitleTrack>,
    pub active_subtitle: Option<String>,
    pub audio_tracks: Vec<AudioTrack>,
    pub chapters: Vec<Chapter>,
    pub intro: Option<IntroWindow>,
    pub in_intro: bool,
    pub downloads: Vec<DownloadQueueItem>,
    pub resume_offer: Option<ResumeOffer>,
    pub swarm: Option<SwarmView>,
    pub channels: Vec<Channel>,
    pub active_channel: Option<String>,
    pub now_playing: Option<Program>,
    pub up_next: Option<Program>,
    pub info: Option<MediaInfo>,
    pub cast: CastState,
}

impl SessionSnapshot {
    fn idle(playback: PlaybackState) -> Self {
        Self {
            generation: Generation::default(),
            status: SessionStatus::Idle,
            kind: None,
            title: None,
            identity: None,
            playback,
            subtitles: Vec::new(),
            active_subtitle: None,
            audio_tracks: Vec::new(),
            chapters: Vec::new(),
            intro: None,
            in_intro: false,
            downloads: Vec::new(),
            resume_offer: None,
            swarm: None,
            channels: Vec::new(),
            active_channel: None,
            now_playing: None,
            up_next: None,
            info: None,
            cast: CastState::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Recall {
    Pending,
    Done(Option<f64>),
}

/// The playable source currently loaded in the sink.
struct BoundSource {
    source: MediaSource,
    identity: MediaIdentity,
    title: String,
    /// Metadata seen since the last load.
    loaded: bool,
    /// Generic reload already spent on this source.
    reloaded: bool,
    /// Time to restore once the reloaded source has metadata.
    pending_seek: Option<f64>,
    recall: Recall,
    resume_offer: Option<ResumeOffer>,
    offered: bool,
    enrichment_requested: bool,
    info: Option<MediaInfo>,
    chapters: Vec<Chapter>,
    audio_tracks: Vec<AudioTrack>,
}

impl BoundSource {
    fn new(source: MediaSource, identity: MediaIdentity, title: String) -> Self {
        Self {
            source,
            identity,
            title,
            loaded: false,
            reloaded: false,
            pending_seek: None,
            recall: Recall::Pending,
            resume_offer: None,
            offered: false,
            enrichment_requested: false,
            info: None,
            chapters: Vec::new(),
            audio_tracks: Vec::new(),
        }
    }

    /// The stored position stays untouched until the resume question is
    /// settled: recall still pending, or an offer awaiting a decision.
    fn records_position(&self) -> bool {
        self.offered && self.resume_offer.is_none()
    }
}

/// Everything owned by one generation.
struct ActiveSession {
    descriptor: SessionDescriptor,
    adapter: Box<dyn SourceAdapter>,
    ctx: AdapterContext,
    bound: Option<BoundSource>,
    swarm: Option<SwarmView>,
    guide: ProgramGuide,
    active_channel: Option<String>,
    tasks: TaskSet,
}

impl ActiveSession {
    fn swarm_mode(&self) -> Option<SwarmMode> {
        match &self.descriptor {
            SessionDescriptor::Swarm(swarm) => Some(swarm.mode),
            _ => None,
        }
    }
}

pub struct Session {
    config: SessionConfig,
    collaborators: Collaborators,
    sink: Box<dyn MediaSink>,
    bus: SessionEventBus,
    generation: Generation,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: Option<mpsc::UnboundedReceiver<Envelope>>,
    positions: PositionCache,
    active: Option<ActiveSession>,
    status: SessionStatus,
    playback: PlaybackState,
    /// Play/pause intent applied to every source the sink loads.
    desired_playing: bool,
    subtitles: SubtitleRegistry,
    downloads: DownloadQueue,
    intro: IntroTracker,
    cast_state: CastState,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl Session {
    /// Creates an idle session. Must be called inside a tokio runtime.
    pub fn new(
        config: SessionConfig,
        collaborators: Collaborators,
        mut sink: Box<dyn MediaSink>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let positions = PositionCache::new(collaborators.store.clone(), config.resume.clone());
        let playback = PlaybackState {
            volume: config.initial_volume,
            ..Default::default()
        };
        sink.set_volume(config.initial_volume);
        let (snapshots, _) = watch::channel(SessionSnapshot::idle(playback.clone()));

        Self {
            desired_playing: config.autoplay,
            config,
            collaborators,
            sink,
            bus: SessionEventBus::new(),
            generation: Generation::default(),
            tx,
            rx: Some(rx),
            positions,
            active: None,
            status: SessionStatus::Idle,
            playback,
            subtitles: SubtitleRegistry::new(),
            downloads: DownloadQueue::new(),
            intro: IntroTracker::default(),
            cast_state: CastState::default(),
            snapshots,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<SessionNotice> {
        self.bus.subscribe()
    }

    pub fn event_bus(&self) -> SessionEventBus {
        self.bus.clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Replaces the current session with one for `descriptor`.
    ///
    /// Setup failures are reported through the status, never returned.
    pub fn activate(&mut self, descriptor: SessionDescriptor) {
        self.teardown();

        self.generation = self.generation.next();
        let kind = descriptor.kind();
        info!(generation = %self.generation, kind = ?kind, "Activating session");

        let ctx = AdapterContext {
            events: EventSender::new(self.generation, self.tx.clone()),
            collaborators: self.collaborators.clone(),
            config: self.config.clone(),
        };
        let active_channel = match &descriptor {
            SessionDescriptor::Live(live) => Some(live.active_channel.clone()),
            _ => None,
        };
        let swarm = matches!(descriptor, SessionDescriptor::Swarm(_)).then(SwarmView::default);

        let mut adapter = adapter_for(&descriptor);
        self.status = SessionStatus::Activating;
        self.bus.broadcast(SessionNotice::Activated {
            generation: self.generation,
            kind,
        });

        let started = adapter.start(&ctx);
        self.active = Some(ActiveSession {
            descriptor,
            adapter,
            ctx,
            bound: None,
            swarm,
            guide: ProgramGuide::new(),
            active_channel,
            tasks: TaskSet::default(),
        });
        if let Err(e) = started {
            self.fail(&e);
        }
        self.publish();
    }

    /// Ends the session and returns to `Idle`.
    pub fn end(&mut self) {
        if self.active.is_none() {
            return;
        }
        self.teardown();
        self.generation = self.generation.next();
        info!(generation = %self.generation, "Session ended");
        self.publish();
    }

    fn teardown(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        debug!(generation = %self.generation, "Tearing down session");

        if let Some(bound) = &active.bound {
            self.flush_position(bound);
        }
        active.tasks.abort_all();
        active.adapter.teardown(&self.collaborators);
        for url in self.subtitles.clear() {
            self.collaborators.blobs.revoke(&url);
        }
        self.sink.unload();

        self.downloads.clear();
        self.intro.reset();
        self.playback = PlaybackState {
            volume: self.playback.volume,
            muted: self.playback.muted,
            rate: self.playback.rate,
            ..Default::default()
        };
        self.status = SessionStatus::Idle;
    }

    fn fail(&mut self, error: &Error) {
        let failure = SessionFailure::from(error);
        warn!(generation = %self.generation, error = %error, "Session failed");
        self.status = SessionStatus::Error(failure.clone());
        self.bus.broadcast(SessionNotice::Failed(failure));
    }

    fn flush_position(&mut self, bound: &BoundSource) {
        if bound.loaded && bound.records_position() {
            self.positions.flush(
                &bound.identity,
                self.playback.current_time,
                self.playback.duration,
            );
        }
        self.positions.forget(&bound.identity);
    }

    // ========================================================================
    // Adapter events
    // ========================================================================

    /// Applies one adapter event. Events of another generation are dropped.
    pub fn handle_envelope(&mut self, envelope: Envelope) {
        if envelope.generation != self.generation {
            debug!(
                event_generation = %envelope.generation,
                generation = %self.generation,
                "Discarding stale adapter event"
            );
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.adapter.on_event(&envelope.event, &active.ctx);
        self.apply(envelope.event);
        self.publish();
    }

    /// Applies every adapter event already queued.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Some(envelope) = self.rx.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.handle_envelope(envelope);
            applied += 1;
        }
        applied
    }

    /// Waits for the next adapter event and applies it.
    pub async fn step(&mut self) -> bool {
        let Some(rx) = self.rx.as_mut() else {
            return false;
        };
        match rx.recv().await {
            Some(envelope) => {
                self.handle_envelope(envelope);
                true
            }
            None => false,
        }
    }

    /// Hands the adapter event stream to an external driver.
    pub(crate) fn detach_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<Envelope>> {
        self.rx.take()
    }

    fn apply(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::SourceReady {
                epoch,
                source,
                identity,
                title,
            } => self.bind_source(epoch, source, identity, title),
            AdapterEvent::AcquisitionFailed(e) => self.fail(&e),
            AdapterEvent::SwarmReady { info_hash, files } => {
                let download_mode = self.active_swarm_mode() == Some(SwarmMode::Download);
                if let Some(view) = self.swarm_view() {
                    view.info_hash = Some(info_hash);
                    view.files = files;
                    view.ready = true;
                    view.stalled = false;
                }
                if download_mode && !matches!(self.status, SessionStatus::Ready) {
                    self.status = SessionStatus::Ready;
                    self.bus.broadcast(SessionNotice::Ready {
                        generation: self.generation,
                    });
                }
            }
            AdapterEvent::SwarmProgress(stats) => {
                if let Some(view) = self.swarm_view() {
                    view.stats = stats;
                }
            }
            AdapterEvent::SwarmDone => {
                if let Some(view) = self.swarm_view() {
                    view.done = true;
                    view.stats.progress = 1.0;
                }
            }
            AdapterEvent::SwarmError(message) => {
                let ready = self.swarm_view().map(|v| v.ready).unwrap_or(false);
                if let Some(view) = self.swarm_view() {
                    view.error = Some(message.clone());
                }
                if ready {
                    warn!(error = %message, "Swarm error during playback");
                    let error = Error::Playback(message);
                    self.bus
                        .broadcast(SessionNotice::PlaybackError(SessionFailure::from(&error)));
                } else {
                    self.fail(&Error::unavailable(format!("Torrent ({message})")));
                }
            }
            AdapterEvent::SwarmStalled => {
                let Some(view) = self.swarm_view() else {
                    return;
                };
                if view.ready {
                    return;
                }
                view.stalled = true;
                warn!(generation = %self.generation, "Swarm not ready, few or no peers");
                self.bus.broadcast(SessionNotice::Stalled);
            }
            AdapterEvent::GuideLoaded(guide) => {
                if let Some(active) = self.active.as_mut() {
                    active.guide = guide;
                }
            }
            AdapterEvent::InfoLoaded { identity, info } => {
                if let Some(bound) = self.bound_for(&identity) {
                    bound.info = Some(info);
                }
            }
            AdapterEvent::ChaptersLoaded { identity, chapters } => {
                if let Some(bound) = self.bound_for(&identity) {
                    debug!(identity = %identity, count = chapters.len(), "Chapters loaded");
                    bound.chapters = chapters;
                    self.update_intro();
                }
            }
            AdapterEvent::PositionRecalled { identity, position } => {
                if let Some(bound) = self.bound_for(&identity) {
                    bound.recall = Recall::Done(position);
                    self.maybe_offer_resume();
                }
            }
            AdapterEvent::Materialized { file, result } => match result {
                Ok(materialized) => {
                    if !self.downloads.mark_downloading(&file) {
                        return;
                    }
                    let saver = self.collaborators.saver.clone();
                    let Some(active) = self.active.as_mut() else {
                        return;
                    };
                    let events = active.ctx.events.clone();
                    active.tasks.spawn(async move {
                        let result = saver.save(materialized).await;
                        events.publish(AdapterEvent::Saved { file, result });
                    });
                }
                Err(e) => self.download_failed(&file, &e),
            },
            AdapterEvent::Saved { file, result } => {
                match result {
                    Ok(path) => {
                        if self.downloads.mark_done(&file, path.clone()) {
                            self.bus
                                .broadcast(SessionNotice::DownloadFinished { file, path });
                        }
                    }
                    Err(e) => self.download_failed(&file, &e),
                }
                self.pump_downloads();
            }
            AdapterEvent::CastFailed(e) => {
                warn!(error = %e, "Cast hand-off failed");
                self.bus.broadcast(SessionNotice::CastFailed(e.user_message()));
            }
        }
    }

    fn bind_source(&mut self, epoch: u32, source: MediaSource, identity: MediaIdentity, title: String) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if epoch != active.adapter.epoch() {
            debug!(epoch, current = active.adapter.epoch(), "Discarding superseded source");
            return;
        }
        let kind = active.adapter.kind();
        let same_content = active
            .bound
            .as_ref()
            .map(|b| b.identity == identity)
            .unwrap_or(false);

        if same_content {
            // Fallback load of the same content (proxy tier).
            if let Some(bound) = self.active.as_mut().and_then(|a| a.bound.as_mut()) {
                bound.source = source.clone();
                bound.loaded = false;
            }
        } else {
            if let Some(previous) = self.active.as_mut().and_then(|a| a.bound.take()) {
                self.flush_position(&previous);
            }
            self.subtitles.drop_embedded();
            self.intro.reset();
            self.playback.current_time = 0.0;
            self.playback.duration = None;
            self.playback.buffered_time = 0.0;
            self.playback.playing = false;

            let reader = self.positions.reader();
            let Some(active) = self.active.as_mut() else {
                return;
            };
            let mut bound = BoundSource::new(source.clone(), identity.clone(), title.clone());
            if kind == SourceKind::Live {
                bound.recall = Recall::Done(None);
            } else {
                let events = active.ctx.events.clone();
                let recalled = identity.clone();
                active.tasks.spawn(async move {
                    let position = reader.recall(&recalled).await;
                    events.publish(AdapterEvent::PositionRecalled {
                        identity: recalled,
                        position,
                    });
                });
            }
            active.bound = Some(bound);
        }

        info!(
            generation = %self.generation,
            identity = %identity,
            title = %title,
            url = %source.url(),
            "Loading source"
        );
        self.load_sink(&source);
    }

    fn load_sink(&mut self, source: &MediaSource) {
        self.sink.load(source);
        self.subtitles.reattach(self.sink.as_mut());
        if self.desired_playing && self.cast_state != CastState::Connected {
            self.sink.play();
        }
    }

    fn download_failed(&mut self, file: &str, error: &Error) {
        if self.downloads.mark_error(file, error.user_message()) {
            self.bus.broadcast(SessionNotice::DownloadFailed {
                file: file.to_string(),
                message: error.user_message(),
            });
        }
        self.pump_downloads();
    }

    /// Starts the next queued download if nothing is in flight.
    fn pump_downloads(&mut self) {
        while let Some(name) = self.downloads.begin_next() {
            let Some(active) = self.active.as_mut() else {
                return;
            };
            match active.adapter.swarm_file(&name) {
                Some(file) => {
                    let events = active.ctx.events.clone();
                    debug!(file = %name, "Materializing swarm file");
                    active.tasks.spawn(async move {
                        let result = file.materialize().await;
                        events.publish(AdapterEvent::Materialized { file: name, result });
                    });
                    return;
                }
                None => {
                    let error = Error::UnknownFile(name.clone());
                    if self.downloads.mark_error(&name, error.user_message()) {
                        self.bus.broadcast(SessionNotice::DownloadFailed {
                            file: name,
                            message: error.user_message(),
                        });
                    }
                }
            }
        }
    }

    fn maybe_offer_resume(&mut self) {
        let min_seconds = self.positions.policy().min_seconds;
        let Some(bound) = self.active.as_mut().and_then(|a| a.bound.as_mut()) else {
            return;
        };
        if bound.offered || !bound.loaded {
            return;
        }
        let Recall::Done(position) = bound.recall else {
            return;
        };
        bound.offered = true;
        if let Some(position) = position.filter(|p| *p > min_seconds) {
            info!(identity = %bound.identity, position, "Resume available");
            bound.resume_offer = Some(ResumeOffer {
                identity: bound.identity.clone(),
                position,
            });
            self.bus.broadcast(SessionNotice::ResumeAvailable { position });
        }
    }

    fn update_intro(&mut self) {
        let Some(bound) = self.active.as_ref().and_then(|a| a.bound.as_ref()) else {
            return;
        };
        match self.intro.update(&bound.chapters, self.playback.current_time) {
            Some(IntroTransition::Entered(window)) => {
                debug!(start = window.start, end = window.end, "Entered intro");
                self.bus.broadcast(SessionNotice::IntroEntered(window));
            }
            Some(IntroTransition::Exited) => self.bus.broadcast(SessionNotice::IntroExited),
            None => {}
        }
    }

    fn request_enrichment(&mut self) {
        let Some(provider) = self.collaborators.metadata.clone() else {
            return;
        };
        let duration = self.playback.finite_duration();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.adapter.kind() == SourceKind::Live {
            return;
        }
        let Some(bound) = active.bound.as_mut() else {
            return;
        };
        if bound.enrichment_requested {
            return;
        }
        bound.enrichment_requested = true;
        active.tasks.spawn(enrich(
            provider,
            bound.identity.clone(),
            bound.title.clone(),
            duration,
            active.ctx.events.clone(),
        ));
    }

    fn swarm_view(&mut self) -> Option<&mut SwarmView> {
        self.active.as_mut().and_then(|a| a.swarm.as_mut())
    }

    fn active_swarm_mode(&self) -> Option<SwarmMode> {
        self.active.as_ref().and_then(|a| a.swarm_mode())
    }

    fn bound(&self) -> Option<&BoundSource> {
        self.active.as_ref().and_then(|a| a.bound.as_ref())
    }

    fn bound_for(&mut self, identity: &MediaIdentity) -> Option<&mut BoundSource> {
        self.active
            .as_mut()
            .and_then(|a| a.bound.as_mut())
            .filter(|b| &b.identity == identity)
    }

    // ========================================================================
    // Media element events
    // ========================================================================

    pub fn media_event(&mut self, event: MediaEvent) {
        if self.bound().is_none() {
            trace!(?event, "Media event without a bound source");
            return;
        }
        match event {
            MediaEvent::LoadedMetadata { duration } => self.on_loaded_metadata(duration),
            MediaEvent::DurationChange(duration) => self.playback.duration = Some(duration),
            MediaEvent::TimeUpdate(time) => {
                self.playback.current_time = time;
                if let Some(bound) = self.bound().filter(|b| b.records_position()) {
                    let identity = bound.identity.clone();
                    self.positions.record(&identity, time, self.playback.duration);
                }
                self.update_intro();
            }
            MediaEvent::Progress { buffered } => self.playback.buffered_time = buffered,
            MediaEvent::Play => self.playback.playing = true,
            MediaEvent::Pause => self.playback.playing = false,
            MediaEvent::Ended => {
                self.playback.playing = false;
                if let Some(bound) = self.bound().filter(|b| b.records_position()) {
                    let identity = bound.identity.clone();
                    self.positions.flush(
                        &identity,
                        self.playback.current_time,
                        self.playback.duration,
                    );
                }
                self.bus.broadcast(SessionNotice::Ended);
            }
            MediaEvent::VolumeChange { volume, muted } => {
                self.playback.volume = volume;
                self.playback.muted = muted;
            }
            MediaEvent::RateChange(rate) => self.playback.rate = rate,
            MediaEvent::Error(error) => self.on_media_error(error),
            MediaEvent::TextTracks(tracks) => {
                for track in tracks {
                    self.subtitles.add_embedded(
                        track.index,
                        &track.label,
                        &track.language,
                        self.sink.as_mut(),
                    );
                }
            }
            MediaEvent::CuesLoaded { label, cues } => {
                self.subtitles.cues_loaded(&label, cues, self.sink.as_mut());
            }
            MediaEvent::AudioTracks(tracks) => {
                if let Some(bound) = self.active.as_mut().and_then(|a| a.bound.as_mut()) {
                    bound.audio_tracks = tracks;
                }
            }
        }
        self.publish();
    }

    fn on_loaded_metadata(&mut self, duration: f64) {
        self.playback.duration = Some(duration);
        let pending_seek = match self.active.as_mut().and_then(|a| a.bound.as_mut()) {
            Some(bound) => {
                bound.loaded = true;
                bound.pending_seek.take()
            }
            None => return,
        };
        if !matches!(self.status, SessionStatus::Ready) {
            info!(generation = %self.generation, duration, "Session ready");
            self.status = SessionStatus::Ready;
            self.bus.broadcast(SessionNotice::Ready {
                generation: self.generation,
            });
        }
        if let Some(time) = pending_seek {
            debug!(time, "Restoring position after reload");
            self.sink.seek(time);
        }
        self.maybe_offer_resume();
        self.request_enrichment();
    }

    fn on_media_error(&mut self, error: MediaError) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(loaded) = active.bound.as_ref().map(|b| b.loaded) else {
            return;
        };
        warn!(generation = %self.generation, kind = ?error.kind, message = %error.message, "Media error");

        match active.adapter.on_media_error(&error, loaded, &active.ctx) {
            Recovery::Retrying { attempt } => {
                self.bus.broadcast(SessionNotice::Recovering { attempt });
            }
            Recovery::Exhausted => {
                let failure = SessionFailure::from(&error.to_error());
                self.status = SessionStatus::Error(failure.clone());
                self.bus.broadcast(SessionNotice::PlaybackError(failure));
            }
            Recovery::NotHandled => {
                let current_time = self.playback.current_time;
                let Some(bound) = active.bound.as_mut() else {
                    return;
                };
                if !bound.reloaded {
                    bound.reloaded = true;
                    if loaded && current_time > 0.0 {
                        bound.pending_seek = Some(current_time);
                    }
                    bound.loaded = false;
                    let source = bound.source.clone();
                    info!(url = %source.url(), resume_at = current_time, "Reloading source after media error");
                    self.bus.broadcast(SessionNotice::Recovering { attempt: 1 });
                    self.load_sink(&source);
                } else {
                    let failure = SessionFailure::from(&error.to_error());
                    if !loaded {
                        self.status = SessionStatus::Error(failure.clone());
                    }
                    self.bus.broadcast(SessionNotice::PlaybackError(failure));
                }
            }
        }
    }

    pub fn cast_state_changed(&mut self, state: CastState) {
        if state == self.cast_state {
            return;
        }
        info!(from = ?self.cast_state, to = ?state, "Cast state changed");
        self.cast_state = state;
        if state == CastState::Connected && self.bound().is_some() {
            self.desired_playing = false;
            self.sink.pause();
        }
        self.publish();
    }

    // ========================================================================
    // Subtitles
    // ========================================================================

    /// Loads an SRT or WebVTT file as an external track.
    pub fn load_subtitle(&mut self, label: &str, language: &str, text: &str) -> Result<()> {
        if self.active.is_none() {
            return Err(Error::invalid_command("no active session"));
        }
        let cues = parse_subtitle_text(text)?;
        let url = self
            .collaborators
            .blobs
            .create(to_webvtt(&cues).into_bytes(), "text/vtt")?;
        info!(label, language, cues = cues.len(), "Subtitle file loaded");

        if let Registration::Replaced(Some(old)) =
            self.subtitles
                .add_external(label, language, url, cues, self.sink.as_mut())
        {
            self.collaborators.blobs.revoke(&old);
        }
        self.publish();
        Ok(())
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub fn dispatch(&mut self, command: Command) -> Result<()> {
        trace!(?command, "Dispatching command");
        let result = self.execute(command);
        self.publish();
        result
    }

    fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Play => {
                self.desired_playing = true;
                if self.cast_state == CastState::Connected {
                    debug!("Casting, local play ignored");
                } else if self.bound().is_some() {
                    self.sink.play();
                }
                Ok(())
            }
            Command::Pause => {
                self.desired_playing = false;
                if self.bound().is_some() {
                    self.sink.pause();
                }
                Ok(())
            }
            Command::Seek(time) => {
                if !time.is_finite() {
                    return Err(Error::invalid_command("seek target must be finite"));
                }
                if !self.bound().map(|b| b.loaded).unwrap_or(false) {
                    debug!(time, "Seek before metadata ignored");
                    return Ok(());
                }
                let upper = self.playback.finite_duration().unwrap_or(f64::MAX);
                self.sink.seek(time.clamp(0.0, upper));
                Ok(())
            }
            Command::SetVolume(volume) => {
                if !volume.is_finite() {
                    return Err(Error::invalid_command("volume must be finite"));
                }
                self.sink.set_volume(volume.clamp(0.0, 1.0));
                Ok(())
            }
            Command::SetMuted(muted) => {
                self.sink.set_muted(muted);
                Ok(())
            }
            Command::ToggleMute => {
                self.sink.set_muted(!self.playback.muted);
                Ok(())
            }
            Command::SetRate(rate) => {
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(Error::invalid_command("rate must be positive"));
                }
                self.sink.set_rate(rate);
                Ok(())
            }
            Command::SetPictureInPicture(enabled) => {
                if self.bound().is_some() {
                    self.sink.set_picture_in_picture(enabled);
                }
                Ok(())
            }
            Command::SetFullscreen(enabled) => {
                if self.bound().is_some() {
                    self.sink.set_fullscreen(enabled);
                }
                Ok(())
            }
            Command::SelectSubtitle(label) => {
                self.subtitles.set_active(label.as_deref(), self.sink.as_mut())
            }
            Command::SetSubtitleOffset(seconds) => {
                self.subtitles.set_offset(seconds, self.sink.as_mut())
            }
            Command::SelectAudio(index) => {
                let known = self
                    .bound()
                    .map(|b| b.audio_tracks.iter().any(|t| t.index == index))
                    .unwrap_or(false);
                if !known {
                    return Err(Error::invalid_command(format!("no audio track {index}")));
                }
                self.sink.select_audio_track(index);
                Ok(())
            }
            Command::SelectChannel(id) => {
                let active = self.active_mut()?;
                active
                    .adapter
                    .handle(&AdapterCommand::SelectChannel(id.clone()), &active.ctx)?;
                active.active_channel = Some(id);
                Ok(())
            }
            Command::SelectFile(name) => {
                let active = self.active_mut()?;
                active
                    .adapter
                    .handle(&AdapterCommand::SelectFile(name), &active.ctx)
            }
            Command::Download(name) => {
                let active = self.active_mut()?;
                let file = active
                    .adapter
                    .swarm_file(&name)
                    .ok_or_else(|| Error::UnknownFile(name.clone()))?;
                self.downloads.enqueue(&name, file.length());
                self.pump_downloads();
                Ok(())
            }
            Command::RetryDownload(name) => {
                self.downloads.retry(&name)?;
                self.pump_downloads();
                Ok(())
            }
            Command::SkipIntro => {
                let window = self
                    .bound()
                    .and_then(|b| IntroWindow::detect(&b.chapters))
                    .filter(|w| w.contains(self.playback.current_time))
                    .ok_or_else(|| Error::invalid_command("no intro to skip"))?;
                info!(to = window.end, "Skipping intro");
                self.sink.seek(window.end);
                Ok(())
            }
            Command::Resume(choice) => {
                let offer = self
                    .active
                    .as_mut()
                    .and_then(|a| a.bound.as_mut())
                    .and_then(|b| b.resume_offer.take())
                    .ok_or_else(|| Error::invalid_command("no resume offer"))?;
                let target = match choice {
                    ResumeChoice::Resume => offer.position,
                    ResumeChoice::Restart => 0.0,
                };
                info!(identity = %offer.identity, ?choice, target, "Resume decision");
                self.sink.seek(target);
                Ok(())
            }
            Command::Cast => self.cast(),
        }
    }

    fn cast(&mut self) -> Result<()> {
        let device = self
            .collaborators
            .cast
            .clone()
            .ok_or_else(|| Error::Cast("no cast device".to_string()))?;
        if device.state() != CastState::Connected {
            return Err(Error::Cast("no cast session".to_string()));
        }
        let bound = self
            .bound()
            .ok_or_else(|| Error::invalid_command("nothing to cast"))?;
        let url = bound
            .source
            .castable_url()
            .ok_or_else(|| Error::Cast("local files cannot be cast".to_string()))?
            .to_string();
        let title = bound.title.clone();
        let subtitle = self
            .subtitles
            .active()
            .and_then(|t| t.blob_url())
            .map(|u| u.as_str().to_string());

        self.desired_playing = false;
        self.sink.pause();
        info!(url = %url, "Handing playback to cast device");
        self.bus.broadcast(SessionNotice::CastStarted { url: url.clone() });

        let active = self.active_mut()?;
        let events = active.ctx.events.clone();
        active.tasks.spawn(async move {
            if let Err(e) = device.load_media(&url, &title, subtitle.as_deref()).await {
                events.publish(AdapterEvent::CastFailed(e));
            }
        });
        Ok(())
    }

    fn active_mut(&mut self) -> Result<&mut ActiveSession> {
        self.active
            .as_mut()
            .ok_or_else(|| Error::invalid_command("no active session"))
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn snapshot(&self) -> SessionSnapshot {
        let active = self.active.as_ref();
        let bound = self.bound();
        let chapters = bound.map(|b| b.chapters.clone()).unwrap_or_default();

        let (channels, active_channel, now_playing, up_next) = match active {
            Some(ActiveSession {
                descriptor: SessionDescriptor::Live(live),
                active_channel,
                guide,
                ..
            }) => {
                let channel = active_channel.as_deref().and_then(|id| live.channel(id));
                let (now, next) = channel
                    .and_then(|c| guide.get(c.guide_key()))
                    .map(|programs| now_and_next(programs, Utc::now()))
                    .unwrap_or((None, None));
                (live.channels.clone(), active_channel.clone(), now, next)
            }
            _ => (Vec::new(), None, None, None),
        };

        SessionSnapshot {
            generation: self.generation,
            status: self.status.clone(),
            kind: active.map(|a| a.adapter.kind()),
            title: active.map(|a| a.adapter.display_name()),
            identity: bound.map(|b| b.identity.clone()),
            playback: self.playback.clone(),
            subtitles: self.subtitles.tracks().to_vec(),
            active_subtitle: self.subtitles.active_label().map(str::to_string),
            audio_tracks: bound.map(|b| b.audio_tracks.clone()).unwrap_or_default(),
            intro: IntroWindow::detect(&chapters),
            in_intro: self.intro.inside(),
            chapters,
            downloads: self.downloads.items().to_vec(),
            resume_offer: bound.and_then(|b| b.resume_offer.clone()),
            swarm: active.and_then(|a| a.swarm.clone()),
            channels,
            active_channel,
            now_playing,
            up_next,
            info: bound.and_then(|b| b.info.clone()),
            cast: self.cast_state,
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
