use super::stream::Stream;
use std::path::PathBuf;

/// One file to transcode into a multi-bitrate HLS output.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Snapshot of the owning stream at enqueue time
    pub stream: Stream,
}

impl TranscodeJob {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>, stream: Stream) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            stream,
        }
    }
}
