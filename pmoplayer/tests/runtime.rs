use std::time::Duration;

use pmoplayer::testing::TestRig;
use pmoplayer::{
    Command, MediaEvent, MediaIdentity, SessionDescriptor, SessionNotice, SessionStatus,
    spawn_session,
};

#[tokio::test]
async fn test_handle_drives_a_live_session() {
    let rig = TestRig::new();
    rig.fetcher
        .respond("http://tv.example/epg.xml", TestRig::GUIDE_TEXT);
    let handle = spawn_session(rig.session());
    let notices = handle.subscribe();

    handle
        .activate(SessionDescriptor::Live(TestRig::live_descriptor(Some(
            "http://tv.example/epg.xml",
        ))))
        .unwrap();
    let snapshot = handle
        .wait_for(|s| s.now_playing.is_some())
        .await
        .unwrap();
    assert_eq!(snapshot.active_channel.as_deref(), Some("one"));
    assert_eq!(snapshot.channels.len(), 2);
    assert_eq!(snapshot.now_playing.unwrap().title, "Morning News");
    assert_eq!(snapshot.up_next.unwrap().title, "Late Movie");

    handle
        .media_event(MediaEvent::LoadedMetadata {
            duration: f64::INFINITY,
        })
        .unwrap();
    handle
        .wait_for(|s| s.status == SessionStatus::Ready)
        .await
        .unwrap();

    handle
        .dispatch(Command::SelectChannel("two".into()))
        .await
        .unwrap();
    let snapshot = handle
        .wait_for(|s| s.identity == Some(MediaIdentity::live("http://tv.example/two.m3u8")))
        .await
        .unwrap();
    assert_eq!(snapshot.active_channel.as_deref(), Some("two"));
    assert_eq!(snapshot.now_playing.unwrap().title, "Cartoons");
    assert!(
        handle
            .dispatch(Command::SelectChannel("nine".into()))
            .await
            .is_err()
    );
    assert_eq!(
        rig.sink.loads(),
        vec![
            "http://tv.example/one.m3u8".to_string(),
            "http://tv.example/two.m3u8".to_string()
        ]
    );

    let received: Vec<SessionNotice> = notices.try_iter().collect();
    assert!(matches!(received[0], SessionNotice::Activated { .. }));
    assert!(received.contains(&SessionNotice::Ready {
        generation: snapshot.generation
    }));

    handle.shutdown().unwrap();
    tokio::time::timeout(Duration::from_secs(1), async {
        while handle.dispatch(Command::Play).await.is_ok() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_subtitles_through_the_handle() {
    let rig = TestRig::new();
    let handle = spawn_session(rig.session());

    assert!(handle.load_subtitle("English", "en", "1\n00:00:01,000 --> 00:00:02,000\nHi\n").await.is_err());

    handle
        .activate(SessionDescriptor::LocalFile(TestRig::local_file("film.mp4")))
        .unwrap();
    handle
        .load_subtitle("English", "en", "1\n00:00:01,000 --> 00:00:02,000\nHi\n")
        .await
        .unwrap();
    handle
        .dispatch(Command::SelectSubtitle(Some("English".into())))
        .await
        .unwrap();

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.active_subtitle.as_deref(), Some("English"));
    assert_eq!(rig.blobs.live_count(), 2);

    handle.end().unwrap();
    handle.wait_for(|s| s.kind.is_none()).await.unwrap();
    assert_eq!(rig.blobs.live_count(), 0);
}
