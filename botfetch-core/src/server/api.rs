//! HTTP API server for web clients

use crate::chat::{ChatClient, ChatError, ConnectionManager};
use crate::relay::{
    ProgressTracker, RelayOutcome, RequestClass, RequestCorrelator, WaitError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::Filter;

/// Shared handles the HTTP layer needs
#[derive(Clone)]
pub struct RelayContext {
    pub connection: Arc<ConnectionManager>,
    pub correlator: RequestCorrelator,
    pub progress: ProgressTracker,
    pub client: Arc<dyn ChatClient>,
    pub download_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub video_url: String,
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    pub formats: Vec<crate::models::FormatOption>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadFormatRequest {
    pub url: String,
    pub format: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFormatResponse {
    pub request_id: Uuid,
}

#[derive(Debug, Serialize)]
struct ProgressResponse {
    progress: u8,
    status: String,
    complete: bool,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub chat_session_connected: bool,
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    /// "1" or "true" forces attachment disposition
    dl: Option<String>,
}

type JsonReply = warp::reply::WithStatus<warp::reply::Json>;

fn json_error(status: StatusCode, message: &str) -> JsonReply {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": message })),
        status,
    )
}

/// Create HTTP API routes
pub fn create_api_routes(
    ctx: RelayContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let ctx_filter = warp::any().map(move || ctx.clone());

    // POST /api/download - Relay a URL to the bot and wait for the payload
    let post_download = warp::path!("api" / "download")
        .and(warp::post())
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(handle_download);

    // POST /api/formats - Relay a URL and wait for the quality menu
    let post_formats = warp::path!("api" / "formats")
        .and(warp::post())
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(handle_formats);

    // POST /api/download-format - Select a quality from the last menu
    let post_download_format = warp::path!("api" / "download-format")
        .and(warp::post())
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(handle_download_format);

    // GET /api/progress/:id - Poll a background download
    let get_progress = warp::path!("api" / "progress" / Uuid)
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(handle_progress);

    // GET /api/health - Health check endpoint
    let get_health = warp::path!("api" / "health")
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(handle_health);

    // GET /downloads/:filename - Byte-range-capable file server
    let get_file = warp::path!("downloads" / String)
        .and(warp::get())
        .and(warp::query::<FileQuery>())
        .and(warp::header::optional::<String>("range"))
        .and(ctx_filter)
        .and_then(handle_file);

    post_download
        .or(post_formats)
        .or(post_download_format)
        .or(get_progress)
        .or(get_health)
        .or(get_file)
}

/// Handle POST /api/download
async fn handle_download(
    request: DownloadRequest,
    ctx: RelayContext,
) -> Result<JsonReply, warp::Rejection> {
    if !ctx.connection.is_connected().await {
        return Ok(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "chat session not connected",
        ));
    }
    if url::Url::parse(&request.url).is_err() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "invalid url"));
    }

    let (request_id, rx, deadline) = ctx.correlator.register(RequestClass::Payload).await;

    if let Err(e) = ctx.client.send_text(&request.url).await {
        ctx.correlator.remove(request_id).await;
        ctx.connection.handle_error(&e).await;
        return Ok(json_error(StatusCode::BAD_GATEWAY, "failed to reach the bot"));
    }

    match ctx.correlator.wait(request_id, rx, deadline).await {
        Ok(RelayOutcome::File(file)) => Ok(warp::reply::with_status(
            warp::reply::json(&DownloadResponse {
                video_url: format!("/downloads/{}", file.file_name),
                file_name: file.file_name,
            }),
            StatusCode::OK,
        )),
        Ok(RelayOutcome::Failed(message)) => Ok(json_error(StatusCode::BAD_GATEWAY, &message)),
        Ok(RelayOutcome::Formats(_)) => Ok(json_error(
            StatusCode::BAD_GATEWAY,
            "bot replied with a format menu; use /api/formats",
        )),
        Err(WaitError::Timeout) => Ok(json_error(
            StatusCode::REQUEST_TIMEOUT,
            "timed out waiting for the bot",
        )),
        Err(WaitError::Closed) => Ok(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "relay shut down",
        )),
    }
}

/// Handle POST /api/formats
async fn handle_formats(
    request: DownloadRequest,
    ctx: RelayContext,
) -> Result<JsonReply, warp::Rejection> {
    if !ctx.connection.is_connected().await {
        return Ok(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "chat session not connected",
        ));
    }
    if url::Url::parse(&request.url).is_err() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "invalid url"));
    }

    let (request_id, rx, deadline) = ctx.correlator.register(RequestClass::Menu).await;

    if let Err(e) = ctx.client.send_text(&request.url).await {
        ctx.correlator.remove(request_id).await;
        ctx.connection.handle_error(&e).await;
        return Ok(json_error(StatusCode::BAD_GATEWAY, "failed to reach the bot"));
    }

    match ctx.correlator.wait(request_id, rx, deadline).await {
        Ok(RelayOutcome::Formats(formats)) => Ok(warp::reply::with_status(
            warp::reply::json(&FormatsResponse { formats }),
            StatusCode::OK,
        )),
        Ok(RelayOutcome::Failed(message)) => Ok(json_error(StatusCode::BAD_GATEWAY, &message)),
        Ok(RelayOutcome::File(_)) => Ok(json_error(
            StatusCode::BAD_GATEWAY,
            "bot sent a payload instead of a menu",
        )),
        Err(WaitError::Timeout) => Ok(json_error(
            StatusCode::REQUEST_TIMEOUT,
            "timed out waiting for the bot",
        )),
        Err(WaitError::Closed) => Ok(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "relay shut down",
        )),
    }
}

/// Handle POST /api/download-format
async fn handle_download_format(
    request: DownloadFormatRequest,
    ctx: RelayContext,
) -> Result<JsonReply, warp::Rejection> {
    if !ctx.connection.is_connected().await {
        return Ok(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "chat session not connected",
        ));
    }
    if url::Url::parse(&request.url).is_err() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "invalid url"));
    }

    let menu = match ctx.correlator.last_menu().await {
        Some(menu) => menu,
        None => {
            return Ok(json_error(
                StatusCode::CONFLICT,
                "no format menu available; request formats first",
            ));
        }
    };
    if !menu.formats.iter().any(|f| f.quality == request.format) {
        return Ok(json_error(
            StatusCode::BAD_REQUEST,
            "requested format is not in the menu",
        ));
    }

    // The menu slot is only a back-reference; the underlying message may be
    // gone by now, in which case the menu is stale and must be re-fetched.
    if let Err(e) = ctx.client.fetch_message(&menu.message_id).await {
        return match e {
            ChatError::MessageNotFound(_) => Ok(json_error(
                StatusCode::CONFLICT,
                "format menu is stale; request formats again",
            )),
            other => {
                ctx.connection.handle_error(&other).await;
                Ok(json_error(StatusCode::BAD_GATEWAY, "failed to reach the bot"))
            }
        };
    }

    let (request_id, rx, deadline) = ctx.correlator.register(RequestClass::Payload).await;
    ctx.progress.create(request_id);

    if let Err(e) = ctx.client.send_reply(&menu.message_id, &request.format).await {
        ctx.correlator.remove(request_id).await;
        ctx.progress
            .complete_failure(request_id, "failed to reach the bot".to_string());
        ctx.connection.handle_error(&e).await;
        return Ok(json_error(StatusCode::BAD_GATEWAY, "failed to reach the bot"));
    }

    // Transfer proceeds in the background; the caller polls /api/progress.
    let correlator = ctx.correlator.clone();
    let progress = ctx.progress.clone();
    tokio::spawn(async move {
        match correlator.wait(request_id, rx, deadline).await {
            Ok(RelayOutcome::File(file)) => progress.complete_success(request_id, file),
            Ok(RelayOutcome::Failed(message)) => progress.complete_failure(request_id, message),
            Ok(RelayOutcome::Formats(_)) => {
                progress.complete_failure(request_id, "unexpected menu reply".to_string())
            }
            Err(WaitError::Timeout) => {
                progress.complete_failure(request_id, "timed out waiting for the bot".to_string())
            }
            Err(WaitError::Closed) => {
                progress.complete_failure(request_id, "relay shut down".to_string())
            }
        }
    });

    Ok(warp::reply::with_status(
        warp::reply::json(&DownloadFormatResponse { request_id }),
        StatusCode::ACCEPTED,
    ))
}

/// Handle GET /api/progress/:id
async fn handle_progress(
    request_id: Uuid,
    ctx: RelayContext,
) -> Result<JsonReply, warp::Rejection> {
    match ctx.progress.get(&request_id) {
        Some(record) => Ok(warp::reply::with_status(
            warp::reply::json(&ProgressResponse {
                progress: record.percent,
                status: record.status,
                complete: record.complete,
                success: record.success,
                error: record.error,
            }),
            StatusCode::OK,
        )),
        None => Ok(json_error(StatusCode::NOT_FOUND, "unknown request id")),
    }
}

/// Handle GET /api/health
async fn handle_health(ctx: RelayContext) -> Result<JsonReply, warp::Rejection> {
    let connected = ctx.connection.is_connected().await;
    let response = HealthResponse {
        status: if connected { "ok" } else { "degraded" }.to_string(),
        chat_session_connected: connected,
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&response),
        StatusCode::OK,
    ))
}

/// Handle GET /downloads/:filename with partial-content support
async fn handle_file(
    file_name: String,
    query: FileQuery,
    range_header: Option<String>,
    ctx: RelayContext,
) -> Result<warp::http::Response<Body>, warp::Rejection> {
    // Bare file names only; anything path-like is rejected outright.
    if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
        return Ok(status_response(StatusCode::NOT_FOUND));
    }

    let path = ctx.download_dir.join(&file_name);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) if m.is_file() => m,
        _ => return Ok(status_response(StatusCode::NOT_FOUND)),
    };
    let size = metadata.len();

    let mut file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(_) => return Ok(status_response(StatusCode::NOT_FOUND)),
    };

    let mime = mime_for_file_name(&file_name);
    let attachment = matches!(query.dl.as_deref(), Some("1") | Some("true"));
    let disposition = if attachment {
        format!("attachment; filename=\"{}\"", file_name)
    } else {
        format!("inline; filename=\"{}\"", file_name)
    };

    let range = range_header.as_deref().and_then(|v| parse_range(v, size));

    let response = match range {
        Some((start, _)) if start >= size => warp::http::Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header("Content-Range", format!("bytes */{}", size))
            .body(Body::empty())
            .expect("static response"),
        Some((start, end)) => {
            let end = end.min(size.saturating_sub(1));
            let length = end - start + 1;
            if file.seek(std::io::SeekFrom::Start(start)).await.is_err() {
                return Ok(status_response(StatusCode::NOT_FOUND));
            }
            let stream = ReaderStream::new(file.take(length));
            warp::http::Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header("Content-Type", mime)
                .header("Content-Length", length)
                .header("Content-Range", format!("bytes {}-{}/{}", start, end, size))
                .header("Accept-Ranges", "bytes")
                .header("Content-Disposition", disposition)
                .body(Body::wrap_stream(stream))
                .expect("static response")
        }
        None => {
            let stream = ReaderStream::new(file);
            warp::http::Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", mime)
                .header("Content-Length", size)
                .header("Accept-Ranges", "bytes")
                .header("Content-Disposition", disposition)
                .body(Body::wrap_stream(stream))
                .expect("static response")
        }
    };

    Ok(response)
}

fn status_response(status: StatusCode) -> warp::http::Response<Body> {
    warp::http::Response::builder()
        .status(status)
        .body(Body::empty())
        .expect("static response")
}

/// Parse a `bytes=start-end` range header against a known size.
/// Supports open-ended (`start-`) and suffix (`-N`) forms.
fn parse_range(value: &str, size: u64) -> Option<(u64, u64)> {
    let value = value.trim();
    let range = value.strip_prefix("bytes=")?.trim();
    if range.is_empty() || range.contains(',') {
        return None;
    }
    let (start_str, end_str) = range.split_once('-')?;

    if start_str.is_empty() {
        // Suffix range: "-N" means last N bytes.
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        if suffix_len >= size {
            return Some((0, size.saturating_sub(1)));
        }
        return Some((size - suffix_len, size.saturating_sub(1)));
    }

    let start: u64 = start_str.parse().ok()?;
    let end: u64 = if end_str.is_empty() {
        size.saturating_sub(1)
    } else {
        end_str.parse().ok()?
    };
    if end < start {
        return None;
    }
    Some((start, end))
}

/// Extension-to-MIME lookup for serving, mirroring the transfer table.
fn mime_for_file_name(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("opus") => "audio/opus",
        Some("wav") => "audio/wav",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_basic() {
        assert_eq!(parse_range("bytes=100-199", 1000), Some((100, 199)));
        assert_eq!(parse_range("bytes=0-0", 1000), Some((0, 0)));
    }

    #[test]
    fn test_parse_range_open_and_suffix() {
        assert_eq!(parse_range("bytes=900-", 1000), Some((900, 999)));
        assert_eq!(parse_range("bytes=-100", 1000), Some((900, 999)));
        assert_eq!(parse_range("bytes=-2000", 1000), Some((0, 999)));
    }

    #[test]
    fn test_parse_range_rejects_malformed() {
        assert_eq!(parse_range("items=0-1", 1000), None);
        assert_eq!(parse_range("bytes=", 1000), None);
        assert_eq!(parse_range("bytes=5-2", 1000), None);
        assert_eq!(parse_range("bytes=0-10,20-30", 1000), None);
        assert_eq!(parse_range("bytes=-0", 1000), None);
    }

    #[test]
    fn test_mime_lookup() {
        assert_eq!(mime_for_file_name("video-x.mp4"), "video/mp4");
        assert_eq!(mime_for_file_name("audio-x.mp3"), "audio/mpeg");
        assert_eq!(mime_for_file_name("unknown.bin"), "application/octet-stream");
    }
}
