use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::client::FluxApi;
use crate::error::JobError;
use crate::model::OutputFormat;
use crate::types::PersistedImage;

/// Subdirectory of the host cache root that holds generated images.
pub const GENERATIONS_DIR: &str = "image/generations";

/// Write-only view of `<cache_root>/image/generations/`.
///
/// File names are random UUIDs, so concurrent writers never collide and no
/// coordination is needed. Nothing here ever deletes a file.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub fn new(cache_root: impl AsRef<Path>) -> Self {
        Self {
            dir: cache_root.as_ref().join(GENERATIONS_DIR),
        }
    }

    /// Directory images are written into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn generate_path(&self, format: OutputFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", Uuid::new_v4(), format.extension()))
    }

    /// Write `bytes` under a fresh name and return the persisted image.
    ///
    /// Bytes go to a hidden `.part` file first and are renamed into place, so
    /// the final path never holds a partial image.
    pub async fn persist(
        &self,
        source_url: &str,
        bytes: Vec<u8>,
        format: OutputFormat,
    ) -> Result<PersistedImage, JobError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| JobError::PersistFailed {
                path: self.dir.clone(),
                source: e,
            })?;

        let path = self.generate_path(format);
        let part = part_path(&path);

        if let Err(e) = tokio::fs::write(&part, &bytes).await {
            return Err(JobError::PersistFailed { path, source: e });
        }
        if let Err(e) = tokio::fs::rename(&part, &path).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(JobError::PersistFailed { path, source: e });
        }

        tracing::info!(path = %path.display(), size = bytes.len(), "image persisted");
        Ok(PersistedImage {
            source_url: source_url.to_string(),
            local_path: path,
            bytes,
        })
    }
}

fn part_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.part", name))
}

/// Fetch the image at `url` and persist it into `cache`.
pub async fn materialize<A: FluxApi>(
    api: &A,
    cache: &ImageCache,
    url: &str,
    format: OutputFormat,
) -> Result<PersistedImage, JobError> {
    let bytes = api.download(url).await.map_err(JobError::DownloadFailed)?;
    cache.persist(url, bytes, format).await
}
