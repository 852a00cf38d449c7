//! Sauvegarde des fichiers matérialisés dans le répertoire de téléchargement
//!
//! Le nom d'origine est conservé. En cas de collision, un suffixe ` (n)` est
//! ajouté avant l'extension, comme le ferait un navigateur.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::collaborators::BlobSaver;
use crate::config_ext::PlayerConfigExt;
use crate::error::{Error, Result};
use crate::model::MaterializedFile;

/// Nombre maximal de suffixes essayés avant d'abandonner
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct FileSaver {
    directory: PathBuf,
}

impl FileSaver {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Utilise `player.downloads.directory` de la configuration
    pub fn from_config(config: &pmoconfig::Config) -> Result<Self> {
        Ok(Self::new(config.get_player_downloads_dir()?))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Garde uniquement le dernier composant du nom (pas de `..` ni de `/`)
fn safe_file_name(name: &str) -> Result<String> {
    let candidate = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if candidate.is_empty() || candidate == "." || candidate == ".." {
        return Err(Error::invalid_command(format!("invalid file name: {name}")));
    }
    Ok(candidate.to_string())
}

fn numbered(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{name} ({n})"),
    }
}

/// Écrit `data` dans le fichier fraîchement créé et le supprime en cas
/// d'échec, pour ne pas laisser de fichier tronqué sous le vrai nom
async fn write_or_discard<W>(out: &mut W, path: &Path, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        out.write_all(data).await?;
        out.flush().await
    }
    .await;
    if let Err(e) = written {
        warn!(path = %path.display(), error = %e, "Write failed, removing partial file");
        if let Err(rm) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %rm, "Failed to remove partial file");
        }
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl BlobSaver for FileSaver {
    async fn save(&self, file: MaterializedFile) -> Result<PathBuf> {
        let name = safe_file_name(&file.name)?;
        tokio::fs::create_dir_all(&self.directory).await?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = if attempt == 0 {
                name.clone()
            } else {
                numbered(&name, attempt)
            };
            let path = self.directory.join(&candidate);

            let mut out = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(out) => out,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            write_or_discard(&mut out, &path, &file.data).await?;

            info!(path = %path.display(), bytes = file.data.len(), "File saved");
            return Ok(path);
        }

        Err(Error::storage(format!(
            "no free name for {name} in {}",
            self.directory.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn materialized(name: &str, data: &'static [u8]) -> MaterializedFile {
        MaterializedFile {
            name: name.to_string(),
            mime: "video/mp4".to_string(),
            data: Bytes::from_static(data),
        }
    }

    #[tokio::test]
    async fn test_names_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileSaver::new(dir.path().join("downloads"));

        let first = saver.save(materialized("movie.mp4", b"one")).await.unwrap();
        let second = saver.save(materialized("movie.mp4", b"two")).await.unwrap();

        assert_eq!(first.file_name().unwrap(), "movie.mp4");
        assert_eq!(second.file_name().unwrap(), "movie (1).mp4");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_path_components_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileSaver::new(dir.path());

        let path = saver
            .save(materialized("Season 1/../e01.mkv", b"x"))
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("e01.mkv"));
        assert!(saver.save(materialized("a/..", b"x")).await.is_err());
    }

    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::other("no space left on device")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie.mp4");
        std::fs::write(&path, b"").unwrap();

        let result = write_or_discard(&mut FullDisk, &path, b"data").await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_numbered_names() {
        assert_eq!(numbered("a.tar.gz", 2), "a.tar (2).gz");
        assert_eq!(numbered("README", 1), "README (1)");
        assert_eq!(numbered(".hidden", 1), ".hidden (1)");
    }
}
