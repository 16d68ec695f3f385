//! Payload persistence: chunked download to disk, file naming, retention.

use crate::chat::{ChatClient, ChatError};
use crate::models::{FileDescriptor, MediaKind, MediaRef};
use futures_util::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{interval, Duration};

/// Chunk size for parallel retrieval.
const CHUNK_SIZE: u64 = 512 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("failed to persist payload: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("payload is empty")]
    EmptyPayload,
}

/// Persists confirmed terminal payloads and keeps the download directory
/// within the retention window.
pub struct TransferRelay {
    client: Arc<dyn ChatClient>,
    download_dir: PathBuf,
    workers: usize,
}

impl TransferRelay {
    pub fn new(client: Arc<dyn ChatClient>, download_dir: PathBuf, workers: usize) -> Self {
        Self {
            client,
            download_dir,
            workers: workers.max(1),
        }
    }

    /// Fetch the whole payload into memory via bounded-parallelism chunked
    /// retrieval, then write it to disk in one pass. A reference to the file
    /// is only returned once the write succeeded, so the HTTP layer never
    /// observes a partial payload.
    pub async fn fetch_to_disk(
        &self,
        media: &MediaRef,
        kind: MediaKind,
    ) -> Result<FileDescriptor, TransferError> {
        if media.size_bytes == 0 {
            return Err(TransferError::EmptyPayload);
        }

        let ranges: Vec<(u64, u64)> = (0..media.size_bytes)
            .step_by(CHUNK_SIZE as usize)
            .map(|offset| (offset, CHUNK_SIZE.min(media.size_bytes - offset)))
            .collect();

        let client = Arc::clone(&self.client);
        let chunks: Vec<bytes::Bytes> = futures_util::stream::iter(ranges)
            .map(|(offset, len)| {
                let client = Arc::clone(&client);
                let media = media.clone();
                async move { client.download_chunk(&media, offset, len).await }
            })
            .buffered(self.workers)
            .try_collect()
            .await?;

        let mut payload = Vec::with_capacity(media.size_bytes as usize);
        for chunk in chunks {
            payload.extend_from_slice(&chunk);
        }
        if payload.len() as u64 != media.size_bytes {
            return Err(TransferError::SizeMismatch {
                expected: media.size_bytes,
                actual: payload.len() as u64,
            });
        }

        let mime = media
            .mime_type
            .clone()
            .unwrap_or_else(|| default_mime(kind).to_string());
        let file_name = build_file_name(kind, media.mime_type.as_deref());
        let path = self.download_dir.join(&file_name);

        tokio::fs::create_dir_all(&self.download_dir).await?;
        if let Err(e) = tokio::fs::write(&path, &payload).await {
            // Never leave a partial write visible to the HTTP layer.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }

        tracing::info!(
            file = %file_name,
            size_bytes = media.size_bytes,
            kind = kind.slug(),
            "payload persisted"
        );

        Ok(FileDescriptor {
            file_name,
            path,
            size_bytes: media.size_bytes,
            mime,
            kind,
        })
    }

    /// Spawn the background sweep that deletes persisted files older than
    /// the retention window. Disk hygiene only; independent of correlation.
    pub fn spawn_retention_sweep(
        download_dir: PathBuf,
        max_age: Duration,
        every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval(every);
            loop {
                tick.tick().await;
                match sweep_once(&download_dir, max_age) {
                    Ok(0) => {}
                    Ok(removed) => {
                        tracing::info!(removed = removed, "retention sweep removed stale files")
                    }
                    Err(e) => tracing::warn!(error = %e, "retention sweep failed"),
                }
            }
        })
    }
}

/// Delete files in `dir` whose modification time is older than `max_age`.
/// Returns the number of files removed.
pub fn sweep_once(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let now = std::time::SystemTime::now();
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        let age = now.duration_since(modified).unwrap_or_default();
        if age > max_age {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Deterministic name: payload kind plus issue time, extension from the
/// MIME table with a per-kind fallback.
fn build_file_name(kind: MediaKind, mime: Option<&str>) -> String {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S%3f");
    format!("{}-{}.{}", kind.slug(), stamp, extension_for(mime, kind))
}

/// MIME-type-to-extension lookup, falling back to the kind default.
fn extension_for(mime: Option<&str>, kind: MediaKind) -> &'static str {
    match mime {
        Some("video/mp4") => "mp4",
        Some("video/webm") => "webm",
        Some("video/quicktime") => "mov",
        Some("video/x-matroska") => "mkv",
        Some("audio/mpeg") => "mp3",
        Some("audio/mp4") => "m4a",
        Some("audio/ogg") => "ogg",
        Some("audio/opus") => "opus",
        Some("audio/wav") | Some("audio/x-wav") => "wav",
        Some("image/jpeg") => "jpg",
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        _ => kind.default_extension(),
    }
}

/// MIME type used when a payload declared none.
fn default_mime(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "video/mp4",
        MediaKind::Audio => "audio/mpeg",
        MediaKind::Image => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup_with_fallback() {
        assert_eq!(extension_for(Some("video/webm"), MediaKind::Video), "webm");
        assert_eq!(extension_for(Some("audio/ogg"), MediaKind::Audio), "ogg");
        // No exact entry: kind default
        assert_eq!(
            extension_for(Some("video/x-unknown"), MediaKind::Video),
            "mp4"
        );
        assert_eq!(extension_for(None, MediaKind::Audio), "mp3");
    }

    #[test]
    fn test_file_name_shape() {
        let name = build_file_name(MediaKind::Video, Some("video/mp4"));
        assert!(name.starts_with("video-"));
        assert!(name.ends_with(".mp4"));
    }

    #[test]
    fn test_sweep_missing_dir_is_noop() {
        let removed = sweep_once(Path::new("/nonexistent/botfetch"), Duration::from_secs(60));
        assert_eq!(removed.unwrap(), 0);
    }
}
