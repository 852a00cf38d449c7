use tracing::{debug, info};

use super::{AdapterContext, SourceAdapter};
use crate::collaborators::Collaborators;
use crate::error::Result;
use crate::events::AdapterEvent;
use crate::model::{BlobUrl, LocalFile, MediaIdentity, MediaSource, SourceKind};

/// File picked on the local machine, served through a blob URL revoked at
/// teardown.
pub struct LocalAdapter {
    file: LocalFile,
    blob: Option<BlobUrl>,
}

impl LocalAdapter {
    pub fn new(file: LocalFile) -> Self {
        Self { file, blob: None }
    }
}

impl SourceAdapter for LocalAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn display_name(&self) -> String {
        self.file.name.clone()
    }

    fn start(&mut self, ctx: &AdapterContext) -> Result<()> {
        let blob = ctx.collaborators.blobs.create_for_file(&self.file)?;
        info!(file = %self.file.name, blob = %blob, "Local file wrapped");
        self.blob = Some(blob.clone());
        ctx.events.publish(AdapterEvent::SourceReady {
            epoch: 0,
            source: MediaSource::Blob(blob),
            identity: MediaIdentity::local(&self.file),
            title: self.file.name.clone(),
        });
        Ok(())
    }

    fn epoch(&self) -> u32 {
        0
    }

    fn teardown(&mut self, collaborators: &Collaborators) {
        if let Some(blob) = self.blob.take() {
            debug!(blob = %blob, "Revoking local file blob");
            collaborators.blobs.revoke(&blob);
        }
    }
}
