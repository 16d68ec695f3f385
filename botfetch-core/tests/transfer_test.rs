//! Integration tests for chunked payload transfer and retention

use async_trait::async_trait;
use botfetch_core::chat::{ChatClient, ChatError};
use botfetch_core::models::{ChatEvent, MediaKind, MediaRef};
use botfetch_core::relay::{sweep_once, TransferError, TransferRelay};
use bytes::Bytes;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::time::Duration;

/// Serves a deterministic byte pattern chunk by chunk.
struct PatternClient {
    payload: Vec<u8>,
    /// When set, chunks are truncated to provoke a size mismatch.
    truncate: bool,
}

impl PatternClient {
    fn new(len: usize) -> Self {
        Self {
            payload: (0..len).map(|i| (i % 251) as u8).collect(),
            truncate: false,
        }
    }
}

#[async_trait]
impl ChatClient for PatternClient {
    async fn connect(&self) -> Result<(), ChatError> {
        Ok(())
    }
    async fn disconnect(&self) -> Result<(), ChatError> {
        Ok(())
    }
    async fn ping(&self) -> Result<(), ChatError> {
        Ok(())
    }
    async fn send_text(&self, _text: &str) -> Result<String, ChatError> {
        Ok("m1".into())
    }
    async fn send_reply(&self, _reply_to: &str, _text: &str) -> Result<String, ChatError> {
        Ok("m2".into())
    }
    async fn next_event(&self) -> Result<Option<ChatEvent>, ChatError> {
        Ok(None)
    }
    async fn fetch_message(&self, message_id: &str) -> Result<ChatEvent, ChatError> {
        Err(ChatError::MessageNotFound(message_id.to_string()))
    }
    async fn download_chunk(
        &self,
        _media: &MediaRef,
        offset: u64,
        len: u64,
    ) -> Result<Bytes, ChatError> {
        let start = offset as usize;
        let mut end = (offset + len) as usize;
        if end > self.payload.len() {
            return Err(ChatError::Api {
                status: 416,
                body: "range out of bounds".into(),
            });
        }
        if self.truncate && end - start > 1 {
            end -= 1;
        }
        Ok(Bytes::copy_from_slice(&self.payload[start..end]))
    }
}

fn media(size: u64) -> MediaRef {
    MediaRef {
        media_id: "f1".into(),
        mime_type: Some("video/mp4".into()),
        file_name: None,
        size_bytes: size,
    }
}

#[tokio::test]
async fn test_chunked_download_persists_full_payload() {
    // Three chunks: two full 512 KiB plus a remainder.
    let size = 512 * 1024 * 2 + 12_345;
    let client = Arc::new(PatternClient::new(size));
    let dir = tempdir().unwrap();
    let relay = TransferRelay::new(
        Arc::clone(&client) as Arc<dyn ChatClient>,
        dir.path().to_path_buf(),
        4,
    );

    let file = relay
        .fetch_to_disk(&media(size as u64), MediaKind::Video)
        .await
        .unwrap();

    assert_eq!(file.size_bytes, size as u64);
    assert!(file.file_name.starts_with("video-"));
    assert!(file.file_name.ends_with(".mp4"));
    assert_eq!(file.mime, "video/mp4");

    let on_disk = std::fs::read(&file.path).unwrap();
    assert_eq!(on_disk, client.payload);
}

#[tokio::test]
async fn test_size_mismatch_leaves_no_file_behind() {
    let size = 4096;
    let mut client = PatternClient::new(size);
    client.truncate = true;
    let dir = tempdir().unwrap();
    let relay = TransferRelay::new(Arc::new(client), dir.path().to_path_buf(), 2);

    let err = relay
        .fetch_to_disk(&media(size as u64), MediaKind::Video)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::SizeMismatch { .. }));

    let leftover = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn test_chat_error_propagates() {
    // Payload larger than the pattern: the out-of-bounds chunk fails.
    let client = PatternClient::new(1024);
    let dir = tempdir().unwrap();
    let relay = TransferRelay::new(Arc::new(client), dir.path().to_path_buf(), 2);

    let err = relay
        .fetch_to_disk(&media(2048), MediaKind::Video)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Chat(_)));
}

#[tokio::test]
async fn test_empty_payload_rejected() {
    let client = PatternClient::new(0);
    let dir = tempdir().unwrap();
    let relay = TransferRelay::new(Arc::new(client), dir.path().to_path_buf(), 2);

    let err = relay
        .fetch_to_disk(&media(0), MediaKind::Video)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::EmptyPayload));
}

#[tokio::test]
async fn test_sweep_removes_old_and_keeps_young() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("video-old.mp4");
    std::fs::write(&old, b"old").unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    let young = dir.path().join("video-young.mp4");
    std::fs::write(&young, b"young").unwrap();

    // Everything older than 50ms goes; the young file survives.
    let removed = sweep_once(dir.path(), Duration::from_millis(50)).unwrap();
    assert_eq!(removed, 1);
    assert!(!old.exists());
    assert!(young.exists());

    // The young file is retained across further sweep cycles.
    let removed = sweep_once(dir.path(), Duration::from_millis(50)).unwrap();
    assert_eq!(removed, 0);
    assert!(young.exists());
}
