use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::{AdapterCommand, AdapterContext, Recovery, SourceAdapter, TaskSet};
use crate::collaborators::{Collaborators, Fetcher, KeyValueStore, ProgramGuideParser};
use crate::error::{Error, Result};
use crate::events::{AdapterEvent, EventSender, MediaError, MediaErrorKind};
use crate::model::{Channel, LiveDescriptor, MediaIdentity, MediaSource, SourceKind};

const EPG_PREFIX: &str = "epg";

/// IPTV channel set with one active channel.
///
/// A manifest that fails to load before producing metadata is retried through
/// each configured proxy template in turn, after `live_retry_delay`.
pub struct LiveAdapter {
    descriptor: LiveDescriptor,
    active: String,
    epoch: u32,
    /// Proxy tiers already used for the active channel.
    tier: usize,
    retry: Option<AbortHandle>,
    tasks: TaskSet,
}

impl LiveAdapter {
    pub fn new(descriptor: LiveDescriptor) -> Self {
        let active = descriptor.active_channel.clone();
        Self {
            descriptor,
            active,
            epoch: 0,
            tier: 0,
            retry: None,
            tasks: TaskSet::default(),
        }
    }

    pub fn active_channel(&self) -> Option<&Channel> {
        self.descriptor.channel(&self.active)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.descriptor.channels
    }

    /// Background tasks still running (retry timer, guide fetch).
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    fn current(&self) -> Result<&Channel> {
        self.active_channel()
            .ok_or_else(|| Error::unavailable(format!("Channel {}", self.active)))
    }

    fn publish_channel(&self, url: String, events: &EventSender) -> Result<()> {
        let channel = self.current()?;
        events.publish(AdapterEvent::SourceReady {
            epoch: self.epoch,
            source: MediaSource::Remote(url),
            identity: MediaIdentity::live(&channel.url),
            title: channel.name.clone(),
        });
        Ok(())
    }

    fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }
}

impl SourceAdapter for LiveAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn display_name(&self) -> String {
        self.active_channel()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| self.active.clone())
    }

    fn start(&mut self, ctx: &AdapterContext) -> Result<()> {
        let url = self.current()?.url.clone();
        info!(channel = %self.active, url = %url, "Starting live channel");
        self.publish_channel(url, &ctx.events)?;

        if let Some(epg_url) = self.descriptor.epg_url.clone() {
            let collaborators = ctx.collaborators.clone();
            let events = ctx.events.clone();
            let ttl = ctx.config.epg_ttl;
            self.tasks.spawn(async move {
                if let Some(guide) = load_guide(&collaborators, &epg_url, ttl).await {
                    events.publish(AdapterEvent::GuideLoaded(guide));
                }
            });
        }
        Ok(())
    }

    fn epoch(&self) -> u32 {
        self.epoch
    }

    fn on_media_error(&mut self, error: &MediaError, loaded: bool, ctx: &AdapterContext) -> Recovery {
        if loaded || error.kind != MediaErrorKind::Network {
            return Recovery::NotHandled;
        }
        let Some(template) = ctx.config.live_proxies.get(self.tier).cloned() else {
            warn!(channel = %self.active, tiers = self.tier, "Every proxy tier failed");
            return Recovery::Exhausted;
        };
        let Ok(channel) = self.current().cloned() else {
            return Recovery::Exhausted;
        };

        self.tier += 1;
        let proxied = proxy_url(&template, &channel.url);
        let source = AdapterEvent::SourceReady {
            epoch: self.epoch,
            source: MediaSource::Remote(proxied.clone()),
            identity: MediaIdentity::live(&channel.url),
            title: channel.name.clone(),
        };
        info!(channel = %self.active, attempt = self.tier, url = %proxied, "Retrying live manifest through proxy");

        self.cancel_retry();
        let events = ctx.events.clone();
        let delay = ctx.config.live_retry_delay;
        self.retry = Some(self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            events.publish(source);
        }));
        Recovery::Retrying { attempt: self.tier }
    }

    fn handle(&mut self, command: &AdapterCommand, ctx: &AdapterContext) -> Result<()> {
        match command {
            AdapterCommand::SelectChannel(id) => {
                let channel = self
                    .descriptor
                    .channel(id)
                    .ok_or_else(|| Error::unavailable(format!("Channel {id}")))?;
                let url = channel.url.clone();
                self.cancel_retry();
                self.active = id.clone();
                self.epoch += 1;
                self.tier = 0;
                debug!(channel = %id, epoch = self.epoch, "Switching live channel");
                self.publish_channel(url, &ctx.events)
            }
            other => Err(Error::invalid_command(format!(
                "{other:?} is not supported by live sources"
            ))),
        }
    }

    fn teardown(&mut self, _collaborators: &Collaborators) {
        self.cancel_retry();
        self.tasks.abort_all();
        debug!(channel = %self.active, "Live adapter torn down");
    }
}

/// Replaces `{url}` in a proxy template with the percent-encoded target.
pub fn proxy_url(template: &str, target: &str) -> String {
    if template.contains("{url}") {
        template.replace("{url}", &urlencoding::encode(target))
    } else {
        format!("{template}{}", urlencoding::encode(target))
    }
}

fn guide_key(url: &str) -> String {
    format!("{EPG_PREFIX}:{}", hex::encode(Sha256::digest(url.as_bytes())))
}

/// Cached guide text, or a fresh fetch stored for `ttl`. Failures give `None`.
async fn load_guide(
    collaborators: &Collaborators,
    url: &str,
    ttl: std::time::Duration,
) -> Option<crate::model::ProgramGuide> {
    let store: &Arc<dyn KeyValueStore> = &collaborators.store;
    let fetcher: &Arc<dyn Fetcher> = &collaborators.fetcher;
    let parser: &Arc<dyn ProgramGuideParser> = &collaborators.guide_parser;
    let key = guide_key(url);

    let cached = match store.get(&key).await {
        Ok(cached) => cached,
        Err(e) => {
            warn!(url = %url, error = %e, "Guide cache unreadable");
            None
        }
    };

    let text = match cached {
        Some(text) => {
            debug!(url = %url, "Programme guide served from cache");
            text
        }
        None => match fetcher.fetch_text(url).await {
            Ok(text) => {
                if let Err(e) = store.set(&key, text.clone(), Some(ttl)).await {
                    warn!(url = %url, error = %e, "Failed to cache programme guide");
                }
                text
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to fetch programme guide");
                return None;
            }
        },
    };

    match parser.parse(&text) {
        Ok(guide) => {
            info!(url = %url, channels = guide.len(), "Programme guide loaded");
            Some(guide)
        }
        Err(e) => {
            warn!(url = %url, error = %e, "Failed to parse programme guide");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRig;

    #[test]
    fn test_proxy_url_encodes_target() {
        assert_eq!(
            proxy_url("https://proxy/?{url}", "http://tv/a b.m3u8"),
            "https://proxy/?http%3A%2F%2Ftv%2Fa%20b.m3u8"
        );
        assert_eq!(proxy_url("https://p/", "x"), "https://p/x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_tiers_then_exhausted() {
        let rig = TestRig::new();
        let mut rx = rig.receiver();
        let ctx = rig.context(crate::model::Generation(1));
        let mut adapter = LiveAdapter::new(TestRig::live_descriptor(None));
        adapter.start(&ctx).unwrap();
        assert!(matches!(
            rx.recv().await.unwrap().event,
            AdapterEvent::SourceReady { .. }
        ));

        let err = MediaError::network("manifest 403");
        assert_eq!(
            adapter.on_media_error(&err, false, &ctx),
            Recovery::Retrying { attempt: 1 }
        );
        match rx.recv().await.unwrap().event {
            AdapterEvent::SourceReady { source, identity, .. } => {
                assert!(source.url().starts_with("https://corsproxy.io/?"));
                assert_eq!(identity, MediaIdentity::live("http://tv.example/one.m3u8"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(adapter.on_media_error(&err, false, &ctx), Recovery::Exhausted);
        assert_eq!(adapter.on_media_error(&err, true, &ctx), Recovery::NotHandled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_retry_timer() {
        let rig = TestRig::new();
        let mut rx = rig.receiver();
        let ctx = rig.context(crate::model::Generation(1));
        let mut adapter = LiveAdapter::new(TestRig::live_descriptor(None));
        adapter.start(&ctx).unwrap();
        rx.recv().await.unwrap();

        adapter.on_media_error(&MediaError::network("cors"), false, &ctx);
        assert_eq!(adapter.pending_tasks(), 1);
        adapter.teardown(&rig.collaborators);
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_switch_bumps_epoch() {
        let rig = TestRig::new();
        let mut rx = rig.receiver();
        let ctx = rig.context(crate::model::Generation(1));
        let mut adapter = LiveAdapter::new(TestRig::live_descriptor(None));
        adapter.start(&ctx).unwrap();
        rx.recv().await.unwrap();

        adapter
            .handle(&AdapterCommand::SelectChannel("two".into()), &ctx)
            .unwrap();
        assert_eq!(adapter.epoch(), 1);
        assert_eq!(adapter.display_name(), "Channel Two");
        match rx.recv().await.unwrap().event {
            AdapterEvent::SourceReady { epoch, source, .. } => {
                assert_eq!(epoch, 1);
                assert_eq!(source.url(), "http://tv.example/two.m3u8");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(
            adapter
                .handle(&AdapterCommand::SelectChannel("nope".into()), &ctx)
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_guide_is_fetched_once_then_cached() {
        let rig = TestRig::new();
        rig.fetcher.respond("http://tv.example/epg.xml", TestRig::GUIDE_TEXT);
        let mut rx = rig.receiver();
        let ctx = rig.context(crate::model::Generation(1));

        for _ in 0..2 {
            let mut adapter =
                LiveAdapter::new(TestRig::live_descriptor(Some("http://tv.example/epg.xml")));
            adapter.start(&ctx).unwrap();
            rx.recv().await.unwrap();
            match rx.recv().await.unwrap().event {
                AdapterEvent::GuideLoaded(guide) => assert!(guide.contains_key("one")),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(rig.fetcher.requests(), vec!["http://tv.example/epg.xml".to_string()]);
    }
}
