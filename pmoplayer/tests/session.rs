use std::time::Duration;

use pmoplayer::events::{AdapterEvent, Envelope};
use pmoplayer::testing::{SinkCall, TestRig};
use pmoplayer::{
    CastState, Chapter, Command, DownloadStatus, MediaError, MediaEvent, MediaIdentity,
    ResumeChoice, Session, SessionDescriptor, SessionNotice, SessionStatus, SwarmDescriptor,
    SwarmEvent, SwarmMode,
};

const SRT: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello\n\n2\n00:00:03,000 --> 00:00:04,000\nWorld\n";

/// Lets background tasks run, then applies every queued adapter event.
async fn settle(session: &mut Session) {
    for _ in 0..20 {
        tokio::task::yield_now().await;
        session.drain();
    }
}

fn local(name: &str) -> SessionDescriptor {
    SessionDescriptor::LocalFile(TestRig::local_file(name))
}

fn notices(rx: &crossbeam_channel::Receiver<SessionNotice>) -> Vec<SessionNotice> {
    rx.try_iter().collect()
}

fn last_cue_timing(calls: &[SinkCall], label: &str, cue: usize) -> Option<(f64, f64)> {
    calls.iter().rev().find_map(|c| match c {
        SinkCall::CueTiming(l, i, start, end) if l == label && *i == cue => Some((*start, *end)),
        _ => None,
    })
}

#[tokio::test]
async fn test_stale_generation_events_are_dropped() {
    let rig = TestRig::new();
    let mut session = rig.session();
    let bus = session.subscribe();
    let torrent = rig.swarm.script("aaaa", &[("movie.mkv", 100)]);

    session.activate(SessionDescriptor::Swarm(SwarmDescriptor::stream(torrent.magnet())));
    let first = session.generation();
    session.activate(local("film.mp4"));
    assert!(session.generation() > first);
    assert!(torrent.is_destroyed());
    settle(&mut session).await;
    let loads = rig.sink.loads();
    let _ = notices(&bus);

    session.handle_envelope(Envelope {
        generation: first,
        event: AdapterEvent::SwarmStalled,
    });
    session.handle_envelope(Envelope {
        generation: first,
        event: AdapterEvent::AcquisitionFailed(pmoplayer::Error::unavailable("Torrent")),
    });

    assert!(notices(&bus).is_empty());
    assert_eq!(rig.sink.loads(), loads);
    assert!(!session.status().is_error());
    assert!(session.snapshot().swarm.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_switching_live_to_local_releases_everything() {
    let rig = TestRig::new();
    let mut session = rig.session();
    let bus = session.subscribe();

    session.activate(SessionDescriptor::Live(TestRig::live_descriptor(None)));
    settle(&mut session).await;
    assert_eq!(rig.sink.loads(), vec!["http://tv.example/one.m3u8".to_string()]);

    session.load_subtitle("English", "en", SRT).unwrap();
    assert_eq!(rig.blobs.live_count(), 1);

    // Manifest failure schedules a proxied retry.
    session.media_event(MediaEvent::Error(MediaError::network("manifest 403")));
    assert!(notices(&bus).contains(&SessionNotice::Recovering { attempt: 1 }));

    session.activate(local("film.mp4"));
    // Only the local file blob is left.
    assert_eq!(rig.blobs.live_count(), 1);
    assert!(rig.sink.calls().contains(&SinkCall::Unload));

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle(&mut session).await;

    let loads = rig.sink.loads();
    assert!(loads.iter().all(|url| !url.contains("proxy")), "{loads:?}");
    assert_eq!(loads.len(), 2);
    assert_eq!(
        session.snapshot().identity,
        Some(MediaIdentity::local(&TestRig::local_file("film.mp4")))
    );

    session.end();
    assert_eq!(rig.blobs.live_count(), 0);
    assert_eq!(session.status(), &SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_live_proxy_tiers_then_error() {
    let mut rig = TestRig::new();
    rig.config.live_proxies = vec!["http://proxy.test/?u={url}".to_string()];
    let mut session = rig.session();
    let bus = session.subscribe();

    session.activate(SessionDescriptor::Live(TestRig::live_descriptor(None)));
    settle(&mut session).await;

    session.media_event(MediaEvent::Error(MediaError::network("manifest 403")));
    tokio::time::sleep(Duration::from_secs(1)).await;
    settle(&mut session).await;
    assert_eq!(
        rig.sink.loads().last().map(String::as_str),
        Some("http://proxy.test/?u=http%3A%2F%2Ftv.example%2Fone.m3u8")
    );
    // Same content, so still the same identity.
    assert_eq!(
        session.snapshot().identity,
        Some(MediaIdentity::live("http://tv.example/one.m3u8"))
    );

    session.media_event(MediaEvent::Error(MediaError::network("proxy 502")));
    assert!(session.status().is_error());
    assert!(
        notices(&bus)
            .iter()
            .any(|n| matches!(n, SessionNotice::PlaybackError(_)))
    );
}

#[tokio::test]
async fn test_resume_offer_and_decisions() {
    let rig = TestRig::new();
    let mut session = rig.session();
    let bus = session.subscribe();

    // First viewing stops at 42s.
    session.activate(local("film.mp4"));
    settle(&mut session).await;
    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    settle(&mut session).await;
    assert!(session.snapshot().resume_offer.is_none());
    session.media_event(MediaEvent::TimeUpdate(42.0));
    session.end();

    // Second viewing offers 42s and resumes there.
    session.activate(local("film.mp4"));
    settle(&mut session).await;
    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    settle(&mut session).await;
    assert!(notices(&bus).contains(&SessionNotice::ResumeAvailable { position: 42.0 }));
    assert_eq!(session.snapshot().resume_offer.map(|o| o.position), Some(42.0));

    session.dispatch(Command::Resume(ResumeChoice::Resume)).unwrap();
    assert_eq!(rig.sink.seeks().last(), Some(&42.0));
    assert!(session.snapshot().resume_offer.is_none());
    assert!(session.dispatch(Command::Resume(ResumeChoice::Resume)).is_err());
    session.media_event(MediaEvent::TimeUpdate(42.0));
    session.end();

    // Third viewing restarts from zero.
    session.activate(local("film.mp4"));
    settle(&mut session).await;
    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    settle(&mut session).await;
    session.dispatch(Command::Resume(ResumeChoice::Restart)).unwrap();
    assert_eq!(rig.sink.seeks().last(), Some(&0.0));
}

#[tokio::test]
async fn test_undecided_offer_keeps_stored_position() {
    let rig = TestRig::new();
    let mut session = rig.session();

    session.activate(local("film.mp4"));
    settle(&mut session).await;
    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    settle(&mut session).await;
    session.media_event(MediaEvent::TimeUpdate(42.0));
    session.end();

    // Autoplay runs while the offer is pending, then the viewer leaves.
    session.activate(local("film.mp4"));
    settle(&mut session).await;
    session.media_event(MediaEvent::TimeUpdate(0.5));
    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    settle(&mut session).await;
    assert_eq!(session.snapshot().resume_offer.map(|o| o.position), Some(42.0));
    session.media_event(MediaEvent::TimeUpdate(3.0));
    session.media_event(MediaEvent::TimeUpdate(30.0));
    session.end();

    session.activate(local("film.mp4"));
    settle(&mut session).await;
    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    settle(&mut session).await;
    assert_eq!(session.snapshot().resume_offer.map(|o| o.position), Some(42.0));

    // Once decided, playback is recorded again.
    session.dispatch(Command::Resume(ResumeChoice::Restart)).unwrap();
    session.media_event(MediaEvent::TimeUpdate(12.0));
    session.end();

    session.activate(local("film.mp4"));
    settle(&mut session).await;
    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    settle(&mut session).await;
    assert_eq!(session.snapshot().resume_offer.map(|o| o.position), Some(12.0));
}

#[tokio::test]
async fn test_finished_content_is_not_offered() {
    let rig = TestRig::new();
    let mut session = rig.session();

    session.activate(local("film.mp4"));
    settle(&mut session).await;
    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    settle(&mut session).await;
    session.media_event(MediaEvent::TimeUpdate(40.0));
    session.media_event(MediaEvent::TimeUpdate(97.0));
    session.end();

    session.activate(local("film.mp4"));
    settle(&mut session).await;
    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    settle(&mut session).await;
    assert!(session.snapshot().resume_offer.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_swarm_stall_warning_after_timeout() {
    let rig = TestRig::new();
    let mut session = rig.session();
    let bus = session.subscribe();
    let torrent = rig.swarm.script("dddd", &[("movie.mkv", 100)]);

    session.activate(SessionDescriptor::Swarm(SwarmDescriptor::stream(torrent.magnet())));

    tokio::time::sleep(Duration::from_secs(29)).await;
    settle(&mut session).await;
    assert!(!notices(&bus).contains(&SessionNotice::Stalled));

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle(&mut session).await;
    assert!(notices(&bus).contains(&SessionNotice::Stalled));
    let snapshot = session.snapshot();
    assert!(snapshot.swarm.as_ref().unwrap().stalled);
    assert_eq!(snapshot.status, SessionStatus::Activating);
    assert!(!torrent.is_destroyed());

    // Peers show up late: the single file is bound.
    torrent.emit(SwarmEvent::Ready);
    settle(&mut session).await;
    let snapshot = session.snapshot();
    let swarm = snapshot.swarm.unwrap();
    assert!(swarm.ready);
    assert!(!swarm.stalled);
    assert_eq!(
        snapshot.identity,
        Some(MediaIdentity::swarm("dddd", "movie.mkv"))
    );
    assert_eq!(
        rig.sink.loads(),
        vec!["http://127.0.0.1:9000/dddd/movie.mkv".to_string()]
    );
}

#[tokio::test]
async fn test_invalid_swarm_identifier_fails_activation() {
    let rig = TestRig::new();
    let mut session = rig.session();
    session.activate(SessionDescriptor::Swarm(SwarmDescriptor::stream("not a magnet")));
    assert!(session.status().is_error());
    assert!(rig.sink.loads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_downloads_run_one_at_a_time() {
    let rig = TestRig::new();
    let mut session = rig.session();
    let bus = session.subscribe();
    let torrent = rig
        .swarm
        .script("eeee", &[("a.mkv", 300), ("b.mkv", 200), ("c.nfo", 1)]);
    torrent.set_materialize_delay(Duration::from_secs(1));

    session.activate(SessionDescriptor::Swarm(SwarmDescriptor {
        identifier: torrent.magnet(),
        mode: SwarmMode::Download,
        preselect: None,
    }));
    torrent.emit(SwarmEvent::Ready);
    settle(&mut session).await;
    assert_eq!(session.status(), &SessionStatus::Ready);
    assert!(rig.sink.loads().is_empty());
    assert!(session.dispatch(Command::SelectFile("a.mkv".into())).is_err());

    session.dispatch(Command::Download("a.mkv".into())).unwrap();
    session.dispatch(Command::Download("b.mkv".into())).unwrap();
    session.dispatch(Command::Download("a.mkv".into())).unwrap();
    assert!(session.dispatch(Command::Download("z.mkv".into())).is_err());

    let downloads = session.snapshot().downloads;
    assert_eq!(downloads.len(), 2);
    assert_eq!(downloads[0].status, DownloadStatus::Preparing);
    assert_eq!(downloads[1].status, DownloadStatus::Queued);

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(1100)).await;
        settle(&mut session).await;
    }

    let downloads = session.snapshot().downloads;
    assert!(downloads.iter().all(|d| d.status == DownloadStatus::Done));
    assert_eq!(torrent.max_concurrent_materializations(), 1);
    assert_eq!(rig.saver.saved_names(), vec!["a.mkv", "b.mkv"]);
    let finished: Vec<String> = notices(&bus)
        .into_iter()
        .filter_map(|n| match n {
            SessionNotice::DownloadFinished { file, .. } => Some(file),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec!["a.mkv", "b.mkv"]);
}

#[tokio::test]
async fn test_failed_download_does_not_block_the_queue() {
    let rig = TestRig::new();
    let mut session = rig.session();
    let torrent = rig.swarm.script("ffff", &[("a.mkv", 300), ("b.mkv", 200)]);
    torrent.fail_materialize("a.mkv");

    session.activate(SessionDescriptor::Swarm(SwarmDescriptor::stream(torrent.magnet())));
    torrent.emit(SwarmEvent::Ready);
    settle(&mut session).await;

    session.dispatch(Command::Download("a.mkv".into())).unwrap();
    session.dispatch(Command::Download("b.mkv".into())).unwrap();
    settle(&mut session).await;

    let downloads = session.snapshot().downloads;
    assert_eq!(downloads[0].status, DownloadStatus::Error);
    assert!(downloads[0].error.is_some());
    assert_eq!(downloads[1].status, DownloadStatus::Done);
    assert!(session.dispatch(Command::RetryDownload("b.mkv".into())).is_err());

    session.dispatch(Command::RetryDownload("a.mkv".into())).unwrap();
    let downloads = session.snapshot().downloads;
    assert_eq!(downloads.last().map(|d| d.file.as_str()), Some("a.mkv"));
    assert_eq!(downloads.last().map(|d| d.status), Some(DownloadStatus::Preparing));
}

#[tokio::test]
async fn test_subtitle_offset_is_absolute() {
    let rig = TestRig::new();
    let mut session = rig.session();
    session.activate(local("film.mp4"));
    settle(&mut session).await;

    assert!(session.dispatch(Command::SetSubtitleOffset(1.0)).is_err());
    session.load_subtitle("English", "en", SRT).unwrap();
    session
        .dispatch(Command::SelectSubtitle(Some("English".into())))
        .unwrap();

    session.dispatch(Command::SetSubtitleOffset(2.0)).unwrap();
    session.dispatch(Command::SetSubtitleOffset(2.0)).unwrap();
    assert_eq!(last_cue_timing(&rig.sink.calls(), "English", 0), Some((3.0, 4.5)));
    assert_eq!(session.snapshot().subtitles[0].offset_seconds, 2.0);

    session.dispatch(Command::SetSubtitleOffset(0.0)).unwrap();
    assert_eq!(last_cue_timing(&rig.sink.calls(), "English", 0), Some((1.0, 2.5)));

    // A broken file changes nothing and leaks no blob.
    let live = rig.blobs.live_count();
    assert!(session.load_subtitle("Broken", "en", "garbage").is_err());
    assert_eq!(rig.blobs.live_count(), live);
    assert_eq!(session.snapshot().subtitles.len(), 1);
}

#[tokio::test]
async fn test_reloaded_subtitle_revokes_previous_blob() {
    let rig = TestRig::new();
    let mut session = rig.session();
    session.activate(local("film.mp4"));
    settle(&mut session).await;

    session.load_subtitle("English", "en", SRT).unwrap();
    let first = session.snapshot().subtitles[0].blob_url().cloned().unwrap();
    session.load_subtitle("English", "en", SRT).unwrap();

    assert!(!rig.blobs.is_live(&first));
    assert_eq!(session.snapshot().subtitles.len(), 1);
}

#[tokio::test]
async fn test_skip_intro_follows_chapters() {
    let rig = TestRig::new();
    rig.metadata.add_chapters(
        "film.mp4",
        vec![
            Chapter::new(0.0, "Recap"),
            Chapter::new(10.0, "Intro"),
            Chapter::new(40.0, "Part 1"),
        ],
    );
    let mut session = rig.session();
    let bus = session.subscribe();

    session.activate(local("film.mp4"));
    settle(&mut session).await;
    assert!(session.dispatch(Command::SkipIntro).is_err());

    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    settle(&mut session).await;
    let intro = session.snapshot().intro.unwrap();
    assert_eq!((intro.start, intro.end), (10.0, 40.0));

    session.media_event(MediaEvent::TimeUpdate(12.0));
    assert!(session.snapshot().in_intro);
    session.dispatch(Command::SkipIntro).unwrap();
    assert_eq!(rig.sink.seeks().last(), Some(&40.0));

    session.media_event(MediaEvent::TimeUpdate(40.0));
    let notices = notices(&bus);
    assert!(notices.contains(&SessionNotice::IntroEntered(intro)));
    assert!(notices.contains(&SessionNotice::IntroExited));
    assert!(session.dispatch(Command::SkipIntro).is_err());
}

#[tokio::test]
async fn test_media_error_reloads_once() {
    let rig = TestRig::new();
    let mut session = rig.session();
    let bus = session.subscribe();
    session.activate(local("film.mp4"));
    settle(&mut session).await;

    session.media_event(MediaEvent::Error(MediaError::decode("bad header")));
    assert_eq!(rig.sink.loads().len(), 2);
    assert!(!session.status().is_error());

    session.media_event(MediaEvent::Error(MediaError::decode("bad header")));
    assert_eq!(rig.sink.loads().len(), 2);
    assert!(session.status().is_error());
    assert!(
        notices(&bus)
            .iter()
            .any(|n| matches!(n, SessionNotice::PlaybackError(_)))
    );
}

#[tokio::test]
async fn test_reload_restores_position() {
    let rig = TestRig::new();
    let mut session = rig.session();
    session.activate(local("film.mp4"));
    settle(&mut session).await;
    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    session.media_event(MediaEvent::TimeUpdate(30.0));

    session.media_event(MediaEvent::Error(MediaError::network("stream reset")));
    assert!(!rig.sink.seeks().contains(&30.0));
    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    assert_eq!(rig.sink.seeks().last(), Some(&30.0));
    assert_eq!(session.status(), &SessionStatus::Ready);
}

#[tokio::test]
async fn test_transport_commands() {
    let rig = TestRig::new();
    let mut session = rig.session();

    // Nothing bound: seek and picture-in-picture are no-ops.
    session.dispatch(Command::Seek(10.0)).unwrap();
    session.dispatch(Command::SetPictureInPicture(true)).unwrap();
    assert!(rig.sink.seeks().is_empty());
    assert!(rig.sink.calls().iter().all(|c| !matches!(c, SinkCall::PictureInPicture(_))));

    session.activate(local("film.mp4"));
    settle(&mut session).await;
    session.dispatch(Command::Seek(10.0)).unwrap();
    assert!(rig.sink.seeks().is_empty());

    session.media_event(MediaEvent::LoadedMetadata { duration: 100.0 });
    session.dispatch(Command::Seek(500.0)).unwrap();
    assert_eq!(rig.sink.seeks(), vec![100.0]);
    assert!(session.dispatch(Command::Seek(f64::NAN)).is_err());

    session.dispatch(Command::SetVolume(3.0)).unwrap();
    assert!(rig.sink.calls().contains(&SinkCall::Volume(1.0)));
    assert!(session.dispatch(Command::SetRate(0.0)).is_err());
    assert!(session.dispatch(Command::SelectAudio(1)).is_err());

    session.media_event(MediaEvent::VolumeChange {
        volume: 0.5,
        muted: false,
    });
    session.dispatch(Command::ToggleMute).unwrap();
    assert!(rig.sink.calls().contains(&SinkCall::Muted(true)));
    assert_eq!(session.playback().volume, 0.5);
}

#[tokio::test]
async fn test_cast_hand_off() {
    let rig = TestRig::new();
    let mut session = rig.session();
    let bus = session.subscribe();

    session.activate(SessionDescriptor::Live(TestRig::live_descriptor(None)));
    settle(&mut session).await;
    assert!(session.dispatch(Command::Cast).is_err());

    rig.cast.set_state(CastState::Connected);
    session.cast_state_changed(CastState::Connected);
    assert_eq!(rig.sink.calls().last(), Some(&SinkCall::Pause));
    rig.sink.clear();

    session.dispatch(Command::Cast).unwrap();
    settle(&mut session).await;
    let loads = rig.cast.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].url, "http://tv.example/one.m3u8");
    assert_eq!(loads[0].title, "Channel One");
    assert!(notices(&bus).contains(&SessionNotice::CastStarted {
        url: "http://tv.example/one.m3u8".into()
    }));

    // Local play stays off while casting.
    session.dispatch(Command::Play).unwrap();
    assert!(!rig.sink.calls().contains(&SinkCall::Play));

    rig.cast.fail(true);
    session.dispatch(Command::Cast).unwrap();
    settle(&mut session).await;
    assert!(
        notices(&bus)
            .iter()
            .any(|n| matches!(n, SessionNotice::CastFailed(_)))
    );
}

#[tokio::test]
async fn test_local_files_cannot_be_cast() {
    let rig = TestRig::new();
    rig.cast.set_state(CastState::Connected);
    let mut session = rig.session();
    session.activate(local("film.mp4"));
    settle(&mut session).await;
    assert!(session.dispatch(Command::Cast).is_err());
    assert!(rig.cast.loads().is_empty());
}
