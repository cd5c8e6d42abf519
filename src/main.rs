//! Theatrum binary - single server deployment
//!
//! Wires up:
//! - Local adapters (filesystem, ffmpeg, YAML configuration)
//! - Transcode queue fed by the unencoded video detector
//! - Live ingest supervised per stream key
//! - HTTP inbound adapter

use std::path::{Path, PathBuf};
use std::sync::Arc;
use theatrum::adapters::ffmpeg::FfmpegEncoder;
use theatrum::adapters::http::{router, HttpState};
use theatrum::adapters::local::FsAdapter;
use theatrum::adapters::yaml::YamlConfigFile;
use theatrum::application::detector::VideoDetector;
use theatrum::application::ingest::LiveIngest;
use theatrum::application::playlist::PlaylistService;
use theatrum::application::stream_service::StreamService;
use theatrum::application::supervisor::LiveSupervisor;
use theatrum::application::transcode_queue::TranscodeQueue;
use theatrum::config::ServerConfig;
use theatrum::domain::auth::Authorizer;
use theatrum::ports::config::ConfigurationPort;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();

    let loaded = match YamlConfigFile::new().load(Path::new(&config.config_path)) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(path = %config.config_path, error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };
    info!(
        path = %config.config_path,
        channels = loaded.channels.len(),
        "Configuration loaded"
    );

    // 1. Adapters
    let fs_adapter = FsAdapter::new();
    let encoder = FfmpegEncoder::new(&config.ffmpeg_path, config.encoder_dry_run);
    let channels = Arc::new(loaded.channels);
    let streams = StreamService::new(&config.data_dir);

    // 2. Transcode queue and detection of unencoded videos
    let queue = Arc::new(TranscodeQueue::new(encoder.clone(), fs_adapter));
    queue.start();

    let detector = VideoDetector::new(channels.clone(), streams.clone(), fs_adapter, queue.clone());
    tokio::spawn(async move {
        detector.detect_and_enqueue().await;
    });

    // 3. Live ingest
    let supervisor = Arc::new(LiveSupervisor::new(encoder));
    let ingest = LiveIngest::new(
        Authorizer::new(channels.clone()),
        streams.clone(),
        supervisor.clone(),
        config.reconnect_policy,
        config.live_cleanup_delay,
    );

    // 4. HTTP layer
    let state = Arc::new(HttpState {
        channels: channels.clone(),
        streams: streams.clone(),
        playlist: PlaylistService::new(loaded.application, channels, streams, fs_adapter),
        ingest,
        frontend_dir: PathBuf::from(&config.frontend_dir),
    });
    let app = router(state);

    // Live records are stopped as soon as shutdown starts, which ends the
    // ingest requests the server waits for. Their output directories are
    // removed before the process exits.
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });
    let live_shutdown = tokio::spawn({
        let shutdown = shutdown.clone();
        let supervisor = supervisor.clone();
        let delay = config.live_cleanup_delay;
        async move {
            shutdown.cancelled().await;
            supervisor.stop_all(delay).await;
        }
    });

    // 5. Start Server
    let bind = format!("{}:{}", config.addr, loaded.server.http_port);
    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %bind, error = %e, "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };
    info!(addr = %bind, "Listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
    {
        error!(error = %e, "Server error");
    }

    shutdown.cancel();
    if let Err(e) = live_shutdown.await {
        error!(error = %e, "Live shutdown task failed");
    }
    queue.stop().await;
    info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
