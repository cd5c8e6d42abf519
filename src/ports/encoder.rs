use crate::domain::stream::{Distribution, Quality};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Child;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("no qualities defined for encoding")]
    NoQualities,
    #[error("failed to create output directory {path:?}: {source}")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to run transcoder: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("transcoder exited with {0}")]
    Failed(ExitStatus),
}

/// Transcodes a file into a multi-bitrate HLS output.
///
/// A master playlist is written next to `output_path`, with one
/// sub-directory per quality name holding its playlist and segments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncoderPort: Send + Sync {
    async fn encode_video(
        &self,
        input_path: &Path,
        output_path: &Path,
        qualities: &HashMap<String, Quality>,
        distribution: &Distribution,
    ) -> Result<(), EncodeError>;
}

/// Starts live transcoders fed through their standard input.
pub trait LiveTranscoderPort: Send + Sync {
    /// Spawns a subprocess with a piped stdin that keeps a live HLS playlist
    /// and its rolling segments up to date inside `output_dir`.
    fn spawn_live(&self, output_dir: &Path) -> std::io::Result<Child>;
}
