use super::HttpState;
use crate::application::ingest::{IngestError, LiveSession};
use crate::application::stream_service::{QUALITY_VAR, RESOURCE_VAR};
use crate::domain::pattern::{CompiledPattern, Variables};
use crate::domain::stream::MASTER_PLAYLIST;
use crate::domain::template;
use crate::ports::encoder::LiveTranscoderPort;
use crate::ports::storage::StoragePort;
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    BoxError, Json,
};
use futures::{Stream, TryStreamExt};
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, warn};

type HandlerError = (StatusCode, String);

const INGEST_CHUNK_SIZE: usize = 64 * 1024;

pub async fn all_streams_playlist<S, T>(
    State(state): State<Arc<HttpState<S, T>>>,
) -> Result<Response, HandlerError>
where
    S: StoragePort + 'static,
    T: LiveTranscoderPort + 'static,
{
    let content = state.playlist.all_streams_playlist().await.ok_or((
        StatusCode::NOT_FOUND,
        "all streams playlist is not enabled".to_string(),
    ))?;
    Ok(([(header::CONTENT_TYPE, "application/x-mpegURL")], content).into_response())
}

pub async fn list_live<S, T>(State(state): State<Arc<HttpState<S, T>>>) -> Json<Vec<String>>
where
    S: StoragePort + 'static,
    T: LiveTranscoderPort + 'static,
{
    Json(state.ingest.supervisor().list_active())
}

#[derive(Debug, Deserialize)]
pub struct IngestParams {
    /// Publishing token
    #[serde(default)]
    name: String,
}

// Feeds the request body to the live transcoder of `path` until the
// publisher hangs up.
pub async fn ingest<S, T>(
    State(state): State<Arc<HttpState<S, T>>>,
    Path(path): Path<String>,
    Query(params): Query<IngestParams>,
    body: Body,
) -> Result<StatusCode, HandlerError>
where
    S: StoragePort + 'static,
    T: LiveTranscoderPort + 'static,
{
    let session = state
        .ingest
        .publish(&path, &params.name)
        .await
        .map_err(ingest_error)?;

    let fed = stream_to_session(&session, body.into_data_stream()).await;
    session.finish().await;
    fed.map_err(ingest_error)?;
    Ok(StatusCode::NO_CONTENT)
}

fn ingest_error(err: IngestError) -> HandlerError {
    let status = match &err {
        IngestError::NoMatchingStream(_) => StatusCode::NOT_FOUND,
        IngestError::Unauthorized(_) => StatusCode::FORBIDDEN,
        IngestError::AlreadyPublishing(_) => StatusCode::CONFLICT,
        IngestError::Template(_) => StatusCode::BAD_REQUEST,
        IngestError::Supervisor(_) | IngestError::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %err, "Live ingest failed");
    (status, err.to_string())
}

// Copy a `Stream` of body chunks into the live transcoder input
async fn stream_to_session<St, E>(session: &LiveSession, stream: St) -> Result<(), IngestError>
where
    St: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);

    let cancelled = session.cancellation();
    let mut buf = vec![0u8; INGEST_CHUNK_SIZE];
    loop {
        let read = tokio::select! {
            _ = cancelled.cancelled() => return Ok(()),
            read = body_reader.read(&mut buf) => read.map_err(IngestError::Write)?,
        };
        if read == 0 {
            return Ok(());
        }
        session.write(&buf[..read]).await?;
    }
}

/// Serves stream files, falling back to the frontend directory.
pub async fn stream_or_frontend<S, T>(
    State(state): State<Arc<HttpState<S, T>>>,
    request: Request,
) -> Result<Response, HandlerError>
where
    S: StoragePort + 'static,
    T: LiveTranscoderPort + 'static,
{
    let method = request.method().clone();
    if method != Method::GET && method != Method::HEAD && method != Method::OPTIONS {
        return Err((StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string()));
    }
    let path = request.uri().path().to_string();

    let mut keys: Vec<&String> = state.channels.keys().collect();
    keys.sort();
    for key in keys {
        let pattern = match CompiledPattern::compile(&format!("/{}", key.trim_matches('/'))) {
            Ok(pattern) => pattern,
            Err(e) => {
                debug!(channel = %key, error = %e, "Skipping channel with invalid pattern");
                continue;
            }
        };
        let Some((vars, rest)) = pattern.split(&path) else {
            continue;
        };
        debug!(channel = %key, rest = %rest, "Channel route matched");
        return serve_stream_file(&state, key, vars, &rest, &method).await;
    }

    if method == Method::OPTIONS {
        return Ok(StatusCode::OK.into_response());
    }
    serve_frontend(&state.frontend_dir, &path).await
}

async fn serve_stream_file<S, T>(
    state: &HttpState<S, T>,
    key: &str,
    mut vars: Variables,
    rest: &str,
    method: &Method,
) -> Result<Response, HandlerError>
where
    S: StoragePort + 'static,
    T: LiveTranscoderPort + 'static,
{
    let mut headers = HeaderMap::new();
    if let Ok(origin) = HeaderValue::from_str(&state.playlist.application().public_path) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Origin, Content-Type"),
    );
    if *method == Method::OPTIONS {
        return Ok((StatusCode::OK, headers).into_response());
    }

    let not_found = || (StatusCode::NOT_FOUND, "File not found".to_string());
    let stream = state.channels.get(key).ok_or_else(not_found)?;

    // <quality>/<resource>, or the bare master playlist
    let resource = match rest.split_once('/') {
        Some((quality, resource)) => {
            vars.insert(QUALITY_VAR.to_string(), quality.to_string());
            resource
        }
        None if rest == MASTER_PLAYLIST => rest,
        None => return Err(not_found()),
    };
    if resource.is_empty() {
        return Err(not_found());
    }
    for segment in resource.split('/') {
        template::sanitize(RESOURCE_VAR, segment)
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid path".to_string()))?;
    }
    vars.insert(RESOURCE_VAR.to_string(), resource.to_string());

    let dir = state
        .streams
        .storage_path(stream, &vars)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid path".to_string()))?;
    let file_path = dir.join(resource);

    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cache_control = match extension.as_str() {
        "m3u8" => "public, max-age=600",
        "ts" => "public, max-age=86400",
        _ => "no-cache, no-store, must-revalidate",
    };
    let content_type = match extension.as_str() {
        "m3u8" => "application/vnd.apple.mpegurl".to_string(),
        "ts" => "video/mp2t".to_string(),
        "mp4" => "video/mp4".to_string(),
        _ => mime_guess::from_path(&file_path)
            .first_or_octet_stream()
            .to_string(),
    };

    serve_file(&file_path, &content_type, cache_control, headers).await
}

async fn serve_frontend(frontend_dir: &std::path::Path, path: &str) -> Result<Response, HandlerError> {
    let relative = path.trim_matches('/');
    let relative = if relative.is_empty() { "index.html" } else { relative };
    if relative.split('/').any(|s| s.is_empty() || s == "." || s == ".." || s.contains('\\')) {
        return Err((StatusCode::BAD_REQUEST, "Invalid path".to_string()));
    }
    let file_path: PathBuf = frontend_dir.join(relative);

    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cache_control = match extension.as_str() {
        "html" => "public, max-age=600",
        "js" | "css" => "public, max-age=86400",
        "png" | "jpg" | "jpeg" | "gif" | "svg" | "ico" => "public, max-age=31536000",
        _ => "no-cache, no-store, must-revalidate",
    };
    let content_type = mime_guess::from_path(&file_path)
        .first_or_octet_stream()
        .to_string();

    serve_file(&file_path, &content_type, cache_control, HeaderMap::new()).await
}

async fn serve_file(
    path: &std::path::Path,
    content_type: &str,
    cache_control: &'static str,
    mut headers: HeaderMap,
) -> Result<Response, HandlerError> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = ?path, "File not found");
            return Err((StatusCode::NOT_FOUND, "File not found".to_string()));
        }
        Err(e) => return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };
    let metadata = file
        .metadata()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if !metadata.is_file() {
        return Err((StatusCode::NOT_FOUND, "File not found".to_string()));
    }

    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    if !cache_control.starts_with("public") {
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((StatusCode::OK, headers, body).into_response())
}
