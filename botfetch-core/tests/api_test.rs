//! Integration tests for the HTTP surface
//!
//! The chat side is a scripted in-memory client; the bot's replies are
//! injected by resolving the correlator directly, the same way the event
//! pump does.

use async_trait::async_trait;
use botfetch_core::chat::{ChatClient, ChatError, ConnectionManager};
use botfetch_core::models::{
    ChatEvent, FileDescriptor, FormatMenu, FormatOption, MediaKind, MediaRef,
};
use botfetch_core::relay::{ProgressTracker, RequestClass, RequestCorrelator};
use botfetch_core::server::{create_api_routes, RelayContext};
use bytes::Bytes;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::time::Duration;
use uuid::Uuid;

struct StubClient {
    /// fetch_message succeeds for this id (menu staleness check)
    known_message: Option<String>,
}

#[async_trait]
impl ChatClient for StubClient {
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
        match &self.known_message {
            Some(known) if known == message_id => Ok(ChatEvent::text(
                message_id.to_string(),
                "fetchbot".to_string(),
                "menu".to_string(),
            )),
            _ => Err(ChatError::MessageNotFound(message_id.to_string())),
        }
    }
    async fn download_chunk(
        &self,
        _media: &MediaRef,
        _offset: u64,
        _len: u64,
    ) -> Result<Bytes, ChatError> {
        Ok(Bytes::new())
    }
}

/// Context with a connected session and fast timeouts.
async fn context(download_dir: &TempDir, known_message: Option<&str>) -> RelayContext {
    let client: Arc<dyn ChatClient> = Arc::new(StubClient {
        known_message: known_message.map(String::from),
    });
    let connection = ConnectionManager::new(
        Arc::clone(&client),
        Duration::from_millis(10),
        Duration::from_secs(30),
    );
    connection.connect().await.unwrap();
    RelayContext {
        connection,
        correlator: RequestCorrelator::new(Duration::from_millis(300), Duration::from_millis(300)),
        progress: ProgressTracker::new(Duration::from_secs(60)),
        client,
        download_dir: download_dir.path().to_path_buf(),
    }
}

fn descriptor(dir: &TempDir, name: &str) -> FileDescriptor {
    FileDescriptor {
        file_name: name.to_string(),
        path: dir.path().join(name),
        size_bytes: 0,
        mime: "video/mp4".to_string(),
        kind: MediaKind::Video,
    }
}

#[tokio::test]
async fn test_health_reports_connection() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, None).await;
    let routes = create_api_routes(ctx);

    let res = warp::test::request()
        .method("GET")
        .path("/api/health")
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["chatSessionConnected"], true);
}

#[tokio::test]
async fn test_download_resolved_by_payload_event() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, None).await;
    let correlator = ctx.correlator.clone();
    let file = descriptor(&dir, "video-x.mp4");
    let routes = create_api_routes(ctx);

    // Simulated bot: resolve the waiting request once it shows up.
    tokio::spawn(async move {
        for _ in 0..50 {
            if correlator.has_pending(RequestClass::Payload).await {
                correlator.resolve_payload(MediaKind::Video, file).await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let res = warp::test::request()
        .method("POST")
        .path("/api/download")
        .json(&serde_json::json!({"url": "https://example.com/clip"}))
        .reply(&routes)
        .await;

    assert_eq!(res.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["videoUrl"], "/downloads/video-x.mp4");
    assert_eq!(body["fileName"], "video-x.mp4");
}

#[tokio::test]
async fn test_download_times_out_with_408() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, None).await;
    let routes = create_api_routes(ctx);

    let res = warp::test::request()
        .method("POST")
        .path("/api/download")
        .json(&serde_json::json!({"url": "https://example.com/clip"}))
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 408);
}

#[tokio::test]
async fn test_download_fails_fast_while_disconnected() {
    let dir = TempDir::new().unwrap();
    let client: Arc<dyn ChatClient> = Arc::new(StubClient {
        known_message: None,
    });
    // Session never established: handlers must not queue work.
    let connection = ConnectionManager::new(
        Arc::clone(&client),
        Duration::from_millis(10),
        Duration::from_secs(30),
    );
    let ctx = RelayContext {
        connection,
        correlator: RequestCorrelator::new(Duration::from_millis(300), Duration::from_millis(300)),
        progress: ProgressTracker::new(Duration::from_secs(60)),
        client,
        download_dir: dir.path().to_path_buf(),
    };
    let routes = create_api_routes(ctx);

    let res = warp::test::request()
        .method("POST")
        .path("/api/download")
        .json(&serde_json::json!({"url": "https://example.com/clip"}))
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 503);

    let res = warp::test::request()
        .method("GET")
        .path("/api/health")
        .reply(&routes)
        .await;
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["chatSessionConnected"], false);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_download_rejects_invalid_url() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, None).await;
    let routes = create_api_routes(ctx);

    let res = warp::test::request()
        .method("POST")
        .path("/api/download")
        .json(&serde_json::json!({"url": "not a url"}))
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn test_formats_resolved_by_menu_event() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, None).await;
    let correlator = ctx.correlator.clone();
    let routes = create_api_routes(ctx);

    tokio::spawn(async move {
        for _ in 0..50 {
            if correlator.has_pending(RequestClass::Menu).await {
                correlator
                    .resolve_menu(FormatMenu {
                        message_id: "m10".into(),
                        formats: vec![FormatOption {
                            quality: "720p".into(),
                            size: "50MB".into(),
                        }],
                    })
                    .await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let res = warp::test::request()
        .method("POST")
        .path("/api/formats")
        .json(&serde_json::json!({"url": "https://example.com/clip"}))
        .reply(&routes)
        .await;

    assert_eq!(res.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["formats"][0]["quality"], "720p");
    assert_eq!(body["formats"][0]["size"], "50MB");
}

#[tokio::test]
async fn test_download_format_returns_request_id_and_tracks_progress() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, Some("m10")).await;
    ctx.correlator
        .resolve_menu(FormatMenu {
            message_id: "m10".into(),
            formats: vec![FormatOption {
                quality: "720p".into(),
                size: "50MB".into(),
            }],
        })
        .await;
    let progress = ctx.progress.clone();
    let routes = create_api_routes(ctx);

    let res = warp::test::request()
        .method("POST")
        .path("/api/download-format")
        .json(&serde_json::json!({"url": "https://example.com/clip", "format": "720p"}))
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 202);
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    let request_id: Uuid = body["requestId"].as_str().unwrap().parse().unwrap();

    // A progress record exists and is pollable.
    assert!(progress.get(&request_id).is_some());

    let res = warp::test::request()
        .method("GET")
        .path(&format!("/api/progress/{}", request_id))
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["complete"], false);
    assert_eq!(body["progress"], 0);
}

#[tokio::test]
async fn test_download_format_without_menu_conflicts() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, None).await;
    let routes = create_api_routes(ctx);

    let res = warp::test::request()
        .method("POST")
        .path("/api/download-format")
        .json(&serde_json::json!({"url": "https://example.com/clip", "format": "720p"}))
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 409);
}

#[tokio::test]
async fn test_download_format_stale_menu_conflicts() {
    let dir = TempDir::new().unwrap();
    // fetch_message knows no ids: the stored menu is stale.
    let ctx = context(&dir, None).await;
    ctx.correlator
        .resolve_menu(FormatMenu {
            message_id: "m10".into(),
            formats: vec![FormatOption {
                quality: "720p".into(),
                size: "50MB".into(),
            }],
        })
        .await;
    let routes = create_api_routes(ctx);

    let res = warp::test::request()
        .method("POST")
        .path("/api/download-format")
        .json(&serde_json::json!({"url": "https://example.com/clip", "format": "720p"}))
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 409);
}

#[tokio::test]
async fn test_progress_unknown_id_is_404() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, None).await;
    let routes = create_api_routes(ctx);

    let res = warp::test::request()
        .method("GET")
        .path(&format!("/api/progress/{}", Uuid::new_v4()))
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_file_serving_full_and_ranged() {
    let dir = TempDir::new().unwrap();
    let payload: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
    std::fs::write(dir.path().join("video-a.mp4"), &payload).unwrap();
    let ctx = context(&dir, None).await;
    let routes = create_api_routes(ctx);

    // Full file
    let res = warp::test::request()
        .method("GET")
        .path("/downloads/video-a.mp4")
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "video/mp4");
    assert_eq!(res.headers()["content-length"], "1000");
    assert!(res.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .starts_with("inline"));
    assert_eq!(res.body().len(), 1000);

    // Byte range
    let res = warp::test::request()
        .method("GET")
        .path("/downloads/video-a.mp4")
        .header("range", "bytes=100-199")
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 206);
    assert_eq!(res.headers()["content-range"], "bytes 100-199/1000");
    assert_eq!(res.headers()["content-length"], "100");
    assert_eq!(res.body().len(), 100);
    assert_eq!(res.body().as_ref(), &payload[100..200]);
}

#[tokio::test]
async fn test_file_serving_unsatisfiable_range() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("video-b.mp4"), vec![0u8; 100]).unwrap();
    let ctx = context(&dir, None).await;
    let routes = create_api_routes(ctx);

    let res = warp::test::request()
        .method("GET")
        .path("/downloads/video-b.mp4")
        .header("range", "bytes=500-600")
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 416);
    assert_eq!(res.headers()["content-range"], "bytes */100");
}

#[tokio::test]
async fn test_file_serving_attachment_toggle() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("video-c.mp4"), b"data").unwrap();
    let ctx = context(&dir, None).await;
    let routes = create_api_routes(ctx);

    let res = warp::test::request()
        .method("GET")
        .path("/downloads/video-c.mp4?dl=1")
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 200);
    assert!(res.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .starts_with("attachment"));
}

#[tokio::test]
async fn test_file_serving_unknown_file_404() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, None).await;
    let routes = create_api_routes(ctx);

    let res = warp::test::request()
        .method("GET")
        .path("/downloads/absent.mp4")
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 404);
}
