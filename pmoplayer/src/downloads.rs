//! Download queue: FIFO, one item in flight.
//!
//! The queue only tracks state. The session pops the next item with
//! [`DownloadQueue::begin_next`], runs materialization and save as background
//! tasks and reports the outcome back through the `mark_*` methods.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DownloadStatus {
    Queued,
    Preparing,
    Downloading,
    Done,
    Error,
}

impl DownloadStatus {
    pub fn is_in_flight(self) -> bool {
        matches!(self, DownloadStatus::Preparing | DownloadStatus::Downloading)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DownloadQueueItem {
    /// Swarm file name, unique within the queue.
    pub file: String,
    pub size: u64,
    pub status: DownloadStatus,
    pub error: Option<String>,
    pub saved_to: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct DownloadQueue {
    items: Vec<DownloadQueueItem>,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[DownloadQueueItem] {
        &self.items
    }

    pub fn in_flight(&self) -> Option<&DownloadQueueItem> {
        self.items.iter().find(|i| i.status.is_in_flight())
    }

    /// Adds a file at the back of the queue. Returns `false` when the file is
    /// already present, whatever its status.
    pub fn enqueue(&mut self, file: &str, size: u64) -> bool {
        if self.items.iter().any(|i| i.file == file) {
            debug!(file, "Already in download queue");
            return false;
        }
        self.items.push(DownloadQueueItem {
            file: file.to_string(),
            size,
            status: DownloadStatus::Queued,
            error: None,
            saved_to: None,
        });
        info!(file, size, "Queued for download");
        true
    }

    /// Puts a failed item back at the end of the queue.
    pub fn retry(&mut self, file: &str) -> Result<()> {
        let pos = self
            .items
            .iter()
            .position(|i| i.file == file)
            .ok_or_else(|| Error::UnknownFile(file.to_string()))?;
        if self.items[pos].status != DownloadStatus::Error {
            return Err(Error::invalid_command(format!("{file} has not failed")));
        }
        let mut item = self.items.remove(pos);
        item.status = DownloadStatus::Queued;
        item.error = None;
        self.items.push(item);
        Ok(())
    }

    /// Marks the first queued item `Preparing` and returns its name, unless an
    /// item is already in flight.
    pub fn begin_next(&mut self) -> Option<String> {
        if self.in_flight().is_some() {
            return None;
        }
        let item = self
            .items
            .iter_mut()
            .find(|i| i.status == DownloadStatus::Queued)?;
        item.status = DownloadStatus::Preparing;
        debug!(file = %item.file, "Preparing download");
        Some(item.file.clone())
    }

    pub fn mark_downloading(&mut self, file: &str) -> bool {
        self.transition(file, DownloadStatus::Preparing, |item| {
            item.status = DownloadStatus::Downloading;
        })
    }

    pub fn mark_done(&mut self, file: &str, path: PathBuf) -> bool {
        self.transition(file, DownloadStatus::Downloading, |item| {
            info!(file = %item.file, path = %path.display(), "Download finished");
            item.status = DownloadStatus::Done;
            item.saved_to = Some(path);
        })
    }

    /// Fails the in-flight item `file`. The queue moves on with the next one.
    pub fn mark_error(&mut self, file: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        match self
            .items
            .iter_mut()
            .find(|i| i.file == file && i.status.is_in_flight())
        {
            Some(item) => {
                warn!(file, error = %message, "Download failed");
                item.status = DownloadStatus::Error;
                item.error = Some(message);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn transition(
        &mut self,
        file: &str,
        from: DownloadStatus,
        apply: impl FnOnce(&mut DownloadQueueItem),
    ) -> bool {
        match self
            .items
            .iter_mut()
            .find(|i| i.file == file && i.status == from)
        {
            Some(item) => {
                apply(item);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_flight_count(queue: &DownloadQueue) -> usize {
        queue
            .items()
            .iter()
            .filter(|i| i.status.is_in_flight())
            .count()
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let mut queue = DownloadQueue::new();
        assert!(queue.enqueue("a.mkv", 10));
        assert!(!queue.enqueue("a.mkv", 10));
        queue.begin_next();
        assert!(!queue.enqueue("a.mkv", 10));
        assert_eq!(queue.items().len(), 1);
    }

    #[test]
    fn test_single_flight_fifo() {
        let mut queue = DownloadQueue::new();
        queue.enqueue("a", 1);
        queue.enqueue("b", 1);
        queue.enqueue("c", 1);

        assert_eq!(queue.begin_next().as_deref(), Some("a"));
        assert_eq!(queue.begin_next(), None);
        assert_eq!(in_flight_count(&queue), 1);

        assert!(queue.mark_downloading("a"));
        assert_eq!(queue.begin_next(), None);
        assert!(queue.mark_done("a", PathBuf::from("/tmp/a")));

        assert_eq!(queue.begin_next().as_deref(), Some("b"));
        assert!(queue.mark_error("b", "boom"));
        assert_eq!(queue.begin_next().as_deref(), Some("c"));
        assert_eq!(in_flight_count(&queue), 1);
    }

    #[test]
    fn test_failed_item_is_skipped_until_retried() {
        let mut queue = DownloadQueue::new();
        queue.enqueue("a", 1);
        queue.enqueue("b", 1);
        queue.begin_next();
        queue.mark_error("a", "no peers");
        assert_eq!(queue.items()[0].error.as_deref(), Some("no peers"));

        assert_eq!(queue.begin_next().as_deref(), Some("b"));
        queue.mark_downloading("b");
        queue.mark_done("b", PathBuf::from("b"));
        assert_eq!(queue.begin_next(), None);

        queue.retry("a").unwrap();
        assert_eq!(queue.items().last().unwrap().file, "a");
        assert_eq!(queue.begin_next().as_deref(), Some("a"));
        assert!(queue.retry("b").is_err());
        assert!(queue.retry("zzz").is_err());
    }

    #[test]
    fn test_out_of_order_reports_are_ignored() {
        let mut queue = DownloadQueue::new();
        queue.enqueue("a", 1);
        assert!(!queue.mark_downloading("a"));
        assert!(!queue.mark_done("a", PathBuf::from("a")));
        assert!(!queue.mark_error("a", "x"));
        assert_eq!(queue.items()[0].status, DownloadStatus::Queued);
    }
}
