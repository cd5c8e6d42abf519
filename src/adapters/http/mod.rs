//! HTTP inbound adapter.
//!
//! - `GET <channel>/[<quality>/]<resource>` serves stream files
//! - `GET <all_streams_playlist.path>` lists every master playlist
//! - `GET /api/live` lists the live streams being published
//! - `POST /ingest/<path>?name=<token>` publishes an FLV body as a live stream
//! - anything else is served from the frontend directory

mod handlers;

use crate::application::ingest::LiveIngest;
use crate::application::playlist::PlaylistService;
use crate::application::stream_service::StreamService;
use crate::domain::stream::Channels;
use crate::ports::encoder::LiveTranscoderPort;
use crate::ports::storage::StoragePort;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct HttpState<S, T> {
    pub channels: Arc<Channels>,
    pub streams: StreamService,
    pub playlist: PlaylistService<S>,
    pub ingest: LiveIngest<T>,
    pub frontend_dir: PathBuf,
}

pub fn router<S, T>(state: Arc<HttpState<S, T>>) -> Router
where
    S: StoragePort + 'static,
    T: LiveTranscoderPort + 'static,
{
    let mut router = Router::new()
        .route("/api/live", get(handlers::list_live::<S, T>))
        .route(
            "/ingest/*path",
            post(handlers::ingest::<S, T>).layer(DefaultBodyLimit::disable()),
        );

    let application = state.playlist.application();
    if application.all_streams_playlist.enabled {
        let path = format!(
            "/{}",
            application.all_streams_playlist.path.trim_start_matches('/')
        );
        info!(path = %path, "Registering all streams playlist");
        router = router.route(&path, get(handlers::all_streams_playlist::<S, T>));
    }

    router
        .fallback(handlers::stream_or_frontend::<S, T>)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
