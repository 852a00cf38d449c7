//! Metadata enrichment: info and chapters for the bound content.
//!
//! Lookups are best effort. A missing provider, a missing answer or a cache
//! failure all end up as "no data", which simply disables skip-intro.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::chapters::Chapter;
use crate::collaborators::{KeyValueStore, MetadataProvider};
use crate::events::{AdapterEvent, EventSender};
use crate::model::{MediaIdentity, MediaInfo};

const INFO_PREFIX: &str = "info";
const CHAPTERS_PREFIX: &str = "chapters";

/// Memoizes a provider's answers in the key/value store, including absence.
pub struct CachedMetadataProvider {
    inner: Arc<dyn MetadataProvider>,
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl CachedMetadataProvider {
    pub fn new(inner: Arc<dyn MetadataProvider>, store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { inner, store, ttl }
    }

    async fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<Option<T>> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Option<T>>(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Corrupt metadata cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Metadata cache unreadable");
                None
            }
        }
    }

    async fn remember<T: serde::Serialize>(&self, key: &str, value: &Option<T>) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode metadata");
                return;
            }
        };
        if let Err(e) = self.store.set(key, json, Some(self.ttl)).await {
            warn!(key = %key, error = %e, "Failed to cache metadata");
        }
    }
}

fn cache_key(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{prefix}:{}", hex::encode(hasher.finalize()))
}

#[async_trait]
impl MetadataProvider for CachedMetadataProvider {
    async fn lookup_info(&self, name: &str) -> Option<MediaInfo> {
        let key = cache_key(INFO_PREFIX, &[name]);
        if let Some(hit) = self.cached::<MediaInfo>(&key).await {
            debug!(name, "Media info served from cache");
            return hit;
        }
        let info = self.inner.lookup_info(name).await;
        self.remember(&key, &info).await;
        info
    }

    async fn lookup_chapters(&self, title: &str, duration_seconds: f64) -> Option<Vec<Chapter>> {
        let duration = format!("{}", duration_seconds.round() as u64);
        let key = cache_key(CHAPTERS_PREFIX, &[title, &duration]);
        if let Some(hit) = self.cached::<Vec<Chapter>>(&key).await {
            debug!(title, "Chapters served from cache");
            return hit;
        }
        let chapters = self.inner.lookup_chapters(title, duration_seconds).await;
        self.remember(&key, &chapters).await;
        chapters
    }
}

/// Looks up info then chapters for `title`, publishing whatever is found.
pub(crate) async fn enrich(
    provider: Arc<dyn MetadataProvider>,
    identity: MediaIdentity,
    title: String,
    duration: Option<f64>,
    events: EventSender,
) {
    let info = provider.lookup_info(&title).await;
    let lookup_title = info
        .as_ref()
        .map(|i| i.title.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or(title);

    if let Some(info) = info {
        events.publish(AdapterEvent::InfoLoaded {
            identity: identity.clone(),
            info,
        });
    }

    let Some(duration) = duration else {
        return;
    };
    match provider.lookup_chapters(&lookup_title, duration).await {
        Some(chapters) => {
            events.publish(AdapterEvent::ChaptersLoaded { identity, chapters });
        }
        None => debug!(title = %lookup_title, "No chapters, skip-intro unavailable"),
    }
}
