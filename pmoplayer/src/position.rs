//! Position cache: remembers where playback stopped, per media identity.
//!
//! Store operations go through a single task so a write followed by a clear
//! (or by a recall from the next session) reaches the store in that order.
//! Every storage failure is logged and replaced by "no position".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::collaborators::KeyValueStore;
use crate::model::MediaIdentity;

pub const POSITION_PREFIX: &str = "position";

/// Thresholds of the resume feature.
#[derive(Clone, Debug, PartialEq)]
pub struct ResumePolicy {
    /// Positions at or below this are not offered for resume.
    pub min_seconds: f64,
    /// `time / duration` above this counts as finished.
    pub finished_ratio: f64,
    /// Minimum playback distance between two writes of one identity.
    pub write_interval: Duration,
    pub ttl: Duration,
}

impl Default for ResumePolicy {
    fn default() -> Self {
        Self {
            min_seconds: 5.0,
            finished_ratio: 0.95,
            write_interval: Duration::from_secs(15),
            ttl: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredPosition {
    pub time: f64,
    pub duration: f64,
    pub updated_at: DateTime<Utc>,
}

/// Pending choice shown to the user; consumed by one decision.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResumeOffer {
    pub identity: MediaIdentity,
    pub position: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeChoice {
    Resume,
    Restart,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Written,
    Cleared,
    Skipped,
}

enum StoreOp {
    Write(String, StoredPosition),
    Clear(String),
    Get(String, oneshot::Sender<Option<StoredPosition>>),
    Sync(oneshot::Sender<()>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Mark {
    Written(f64),
    Finished,
}

/// Write side, owned by the session.
pub struct PositionCache {
    ops: mpsc::UnboundedSender<StoreOp>,
    policy: ResumePolicy,
    marks: HashMap<MediaIdentity, Mark>,
}

/// Read side, cloned into recall tasks.
#[derive(Clone)]
pub struct PositionReader {
    ops: mpsc::UnboundedSender<StoreOp>,
}

impl PositionCache {
    /// Spawns the store task; must be called inside a tokio runtime.
    pub fn new(store: Arc<dyn KeyValueStore>, policy: ResumePolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_store(store, policy.ttl, rx));
        Self {
            ops: tx,
            policy,
            marks: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &ResumePolicy {
        &self.policy
    }

    pub fn reader(&self) -> PositionReader {
        PositionReader {
            ops: self.ops.clone(),
        }
    }

    /// Coalesced record of the current playback time.
    pub fn record(&mut self, identity: &MediaIdentity, time: f64, duration: Option<f64>) -> RecordOutcome {
        self.update(identity, time, duration, false)
    }

    /// Unconditional record, used when the content is left.
    pub fn flush(&mut self, identity: &MediaIdentity, time: f64, duration: Option<f64>) -> RecordOutcome {
        self.update(identity, time, duration, true)
    }

    /// Drops the coalescing state of content that is no longer played.
    pub fn forget(&mut self, identity: &MediaIdentity) {
        self.marks.remove(identity);
    }

    pub fn clear(&mut self, identity: &MediaIdentity) {
        self.marks.remove(identity);
        self.send(StoreOp::Clear(identity.storage_key(POSITION_PREFIX)));
    }

    pub async fn recall(&self, identity: &MediaIdentity) -> Option<f64> {
        self.reader().recall(identity).await
    }

    /// Resolves once every operation issued so far reached the store.
    pub async fn synced(&self) {
        self.reader().synced().await
    }

    fn update(
        &mut self,
        identity: &MediaIdentity,
        time: f64,
        duration: Option<f64>,
        force: bool,
    ) -> RecordOutcome {
        let Some(duration) = duration.filter(|d| d.is_finite() && *d > 0.0) else {
            return RecordOutcome::Skipped;
        };
        if !time.is_finite() || time < 0.0 {
            return RecordOutcome::Skipped;
        }

        let key = identity.storage_key(POSITION_PREFIX);
        let mark = self.marks.get(identity).copied();

        if time / duration > self.policy.finished_ratio {
            if mark == Some(Mark::Finished) {
                return RecordOutcome::Skipped;
            }
            debug!(identity = %identity, time, duration, "Content finished, clearing position");
            self.marks.insert(identity.clone(), Mark::Finished);
            self.send(StoreOp::Clear(key));
            return RecordOutcome::Cleared;
        }

        if !force {
            if let Some(Mark::Written(last)) = mark {
                if (time - last).abs() < self.policy.write_interval.as_secs_f64() {
                    trace!(identity = %identity, time, last, "Position write coalesced");
                    return RecordOutcome::Skipped;
                }
            }
        }

        self.marks.insert(identity.clone(), Mark::Written(time));
        self.send(StoreOp::Write(
            key,
            StoredPosition {
                time,
                duration,
                updated_at: Utc::now(),
            },
        ));
        RecordOutcome::Written
    }

    fn send(&self, op: StoreOp) {
        if self.ops.send(op).is_err() {
            warn!("Position store task is gone");
        }
    }
}

impl PositionReader {
    pub async fn recall(&self, identity: &MediaIdentity) -> Option<f64> {
        let (tx, rx) = oneshot::channel();
        self.ops
            .send(StoreOp::Get(identity.storage_key(POSITION_PREFIX), tx))
            .ok()?;
        rx.await.ok().flatten().map(|p| p.time)
    }

    pub async fn synced(&self) {
        let (tx, rx) = oneshot::channel();
        if self.ops.send(StoreOp::Sync(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_store(
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    mut ops: mpsc::UnboundedReceiver<StoreOp>,
) {
    while let Some(op) = ops.recv().await {
        match op {
            StoreOp::Write(key, position) => match serde_json::to_string(&position) {
                Ok(json) => {
                    if let Err(e) = store.set(&key, json, Some(ttl)).await {
                        warn!(key = %key, error = %e, "Failed to store position");
                    }
                }
                Err(e) => warn!(key = %key, error = %e, "Failed to encode position"),
            },
            StoreOp::Clear(key) => {
                if let Err(e) = store.remove(&key).await {
                    warn!(key = %key, error = %e, "Failed to clear position");
                }
            }
            StoreOp::Get(key, reply) => {
                let _ = reply.send(read_position(store.as_ref(), &key).await);
            }
            StoreOp::Sync(reply) => {
                let _ = reply.send(());
            }
        }
    }
    trace!("Position store task stopped");
}

async fn read_position(store: &dyn KeyValueStore, key: &str) -> Option<StoredPosition> {
    let raw = match store.get(key).await {
        Ok(raw) => raw?,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read position");
            return None;
        }
    };
    match serde_json::from_str::<StoredPosition>(&raw) {
        Ok(position) if position.time.is_finite() && position.time >= 0.0 => Some(position),
        Ok(_) => {
            warn!(key = %key, "Stored position out of range, ignoring");
            None
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Corrupt stored position, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache() -> (PositionCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (PositionCache::new(store.clone(), ResumePolicy::default()), store)
    }

    fn movie() -> MediaIdentity {
        MediaIdentity::swarm("abc", "movie.mkv")
    }

    #[tokio::test]
    async fn test_recall_without_record_is_absent() {
        let (cache, _) = cache();
        assert_eq!(cache.recall(&movie()).await, None);
    }

    #[tokio::test]
    async fn test_writes_are_coalesced() {
        let (mut cache, _) = cache();
        let id = movie();
        assert_eq!(cache.record(&id, 20.0, Some(1000.0)), RecordOutcome::Written);
        assert_eq!(cache.record(&id, 30.0, Some(1000.0)), RecordOutcome::Skipped);
        assert_eq!(cache.record(&id, 34.9, Some(1000.0)), RecordOutcome::Skipped);
        assert_eq!(cache.recall(&id).await, Some(20.0));

        assert_eq!(cache.record(&id, 35.0, Some(1000.0)), RecordOutcome::Written);
        assert_eq!(cache.recall(&id).await, Some(35.0));

        assert_eq!(cache.flush(&id, 36.0, Some(1000.0)), RecordOutcome::Written);
        assert_eq!(cache.recall(&id).await, Some(36.0));
    }

    #[tokio::test]
    async fn test_forget_drops_coalescing_state() {
        let (mut cache, _) = cache();
        let id = movie();
        cache.record(&id, 20.0, Some(1000.0));
        cache.forget(&id);
        assert!(cache.marks.is_empty());
        assert_eq!(cache.recall(&id).await, Some(20.0));
        assert_eq!(cache.record(&id, 21.0, Some(1000.0)), RecordOutcome::Written);
    }

    #[tokio::test]
    async fn test_finished_content_clears_position() {
        let (mut cache, _) = cache();
        let id = movie();
        cache.record(&id, 500.0, Some(1000.0));
        assert_eq!(cache.record(&id, 951.0, Some(1000.0)), RecordOutcome::Cleared);
        assert_eq!(cache.record(&id, 990.0, Some(1000.0)), RecordOutcome::Skipped);
        assert_eq!(cache.recall(&id).await, None);

        assert_eq!(cache.flush(&id, 960.0, Some(1000.0)), RecordOutcome::Skipped);
        assert_eq!(cache.recall(&id).await, None);
    }

    #[tokio::test]
    async fn test_unknown_or_infinite_duration_is_not_recorded() {
        let (mut cache, _) = cache();
        let id = MediaIdentity::live("http://tv/1.m3u8");
        assert_eq!(cache.record(&id, 100.0, None), RecordOutcome::Skipped);
        assert_eq!(
            cache.record(&id, 100.0, Some(f64::INFINITY)),
            RecordOutcome::Skipped
        );
        assert_eq!(cache.recall(&id).await, None);
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_absent() {
        let (cache, store) = cache();
        let id = movie();
        store
            .set(&id.storage_key(POSITION_PREFIX), "{not json".into(), None)
            .await
            .unwrap();
        assert_eq!(cache.recall(&id).await, None);
    }

    #[tokio::test]
    async fn test_storage_failure_reads_as_absent() {
        let (mut cache, store) = cache();
        let id = movie();
        cache.record(&id, 42.0, Some(100.0));
        cache.synced().await;
        store.fail(true);
        assert_eq!(cache.recall(&id).await, None);
        store.fail(false);
        assert_eq!(cache.recall(&id).await, Some(42.0));
    }

    #[tokio::test]
    async fn test_clear_then_recall() {
        let (mut cache, _) = cache();
        let id = movie();
        cache.record(&id, 42.0, Some(100.0));
        cache.clear(&id);
        assert_eq!(cache.recall(&id).await, None);
        assert_eq!(cache.record(&id, 43.0, Some(100.0)), RecordOutcome::Written);
    }
}
