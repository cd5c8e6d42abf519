//! Publishing of live streams.

use super::stream_service::StreamService;
use super::supervisor::{LiveProcess, LiveSupervisor, SupervisorError};
use crate::config::ReconnectPolicy;
use crate::domain::auth::{self, AuthError, Authorizer, USERNAME_VAR};
use crate::domain::template::TemplateError;
use crate::ports::encoder::LiveTranscoderPort;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no live stream matches {0}")]
    NoMatchingStream(String),
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),
    #[error("stream {0} is already being published")]
    AlreadyPublishing(String),
    #[error("invalid stream path: {0}")]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("failed to write live input: {0}")]
    Write(#[source] io::Error),
}

pub struct LiveIngest<T> {
    authorizer: Authorizer,
    streams: StreamService,
    supervisor: Arc<LiveSupervisor<T>>,
    policy: ReconnectPolicy,
    cleanup_delay: Duration,
}

impl<T: LiveTranscoderPort> LiveIngest<T> {
    pub fn new(
        authorizer: Authorizer,
        streams: StreamService,
        supervisor: Arc<LiveSupervisor<T>>,
        policy: ReconnectPolicy,
        cleanup_delay: Duration,
    ) -> Self {
        Self {
            authorizer,
            streams,
            supervisor,
            policy,
            cleanup_delay,
        }
    }

    pub fn supervisor(&self) -> &LiveSupervisor<T> {
        &self.supervisor
    }

    /// Authorizes a publisher and attaches it to the transcoder of its stream.
    ///
    /// `url` is the announced URL or path (`/live/john`), `publishing_name`
    /// the token derived from the stream key.
    pub async fn publish(&self, url: &str, publishing_name: &str) -> Result<LiveSession, IngestError> {
        let key = auth::url_path(url);
        let matched = self
            .authorizer
            .authorize(&key)
            .ok_or_else(|| IngestError::NoMatchingStream(key.clone()))?;

        let username = matched.vars.get(USERNAME_VAR).map(String::as_str);
        auth::validate_token(&matched.stream, username, publishing_name)?;

        let output_dir = self.streams.storage_path(&matched.stream, &matched.vars)?;

        let process = match self.policy {
            ReconnectPolicy::Join => self.supervisor.get_or_create(&key, &output_dir)?,
            ReconnectPolicy::Reject => match self.supervisor.create_exclusive(&key, &output_dir) {
                Err(SupervisorError::AlreadyActive(key)) => return Err(IngestError::AlreadyPublishing(key)),
                other => other?,
            },
        };
        info!(key = %key, channel = %matched.channel, "Publisher connected");

        Ok(LiveSession {
            process,
            cleanup_delay: self.cleanup_delay,
        })
    }
}

/// One publisher feeding a live transcoder.
pub struct LiveSession {
    process: Arc<LiveProcess>,
    cleanup_delay: Duration,
}

impl LiveSession {
    pub fn key(&self) -> &str {
        self.process.key()
    }

    /// Cancelled when the transcoder is being stopped.
    pub fn cancellation(&self) -> CancellationToken {
        self.process.cancellation()
    }

    pub async fn write(&self, data: &[u8]) -> Result<(), IngestError> {
        self.process.write(data).await.map_err(IngestError::Write)
    }

    /// Ends the publication, stopping the transcoder.
    pub async fn finish(self) {
        info!(key = %self.process.key(), "Publisher disconnected");
        self.process.stop(self.cleanup_delay).await;
    }
}
