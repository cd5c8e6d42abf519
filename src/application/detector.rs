use super::stream_service::StreamService;
use crate::domain::jobs::TranscodeJob;
use crate::domain::pattern::FILENAME_VAR;
use crate::domain::stream::{Channels, StreamType, VALID_VIDEO_EXTENSIONS};
use crate::domain::template;
use crate::ports::queue::JobQueuePort;
use crate::ports::storage::StoragePort;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Finds the sources of `video_unencoded` streams and queues their encoding.
pub struct VideoDetector<S, Q> {
    channels: Arc<Channels>,
    streams: StreamService,
    storage: S,
    queue: Arc<Q>,
}

impl<S, Q> VideoDetector<S, Q>
where
    S: StoragePort,
    Q: JobQueuePort,
{
    pub fn new(channels: Arc<Channels>, streams: StreamService, storage: S, queue: Arc<Q>) -> Self {
        Self {
            channels,
            streams,
            storage,
            queue,
        }
    }

    /// Enqueues one transcode job per source file found, returning how many
    /// were queued. Failures only skip the stream or file concerned.
    pub async fn detect_and_enqueue(&self) -> usize {
        info!("Starting video detection");
        let extensions: Vec<String> = VALID_VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect();

        let mut keys: Vec<&String> = self.channels.keys().collect();
        keys.sort();

        let mut queued = 0;
        for key in keys {
            let stream = &self.channels[key];
            let Some(input_path) = stream.video_input_path.as_deref() else {
                continue;
            };
            if stream.kind != StreamType::VideoUnencoded {
                continue;
            }

            let pattern = self.streams.data_pattern(input_path);
            info!(channel = %key, pattern = %pattern, "Searching videos");
            let found = match self.storage.search_files(&pattern, &extensions).await {
                Ok(found) => found,
                Err(e) => {
                    error!(channel = %key, error = %e, "Error searching for videos");
                    continue;
                }
            };

            let output_template = self
                .streams
                .data_pattern(&format!("{}/{{{}}}", stream.path, FILENAME_VAR));
            let mut stream_queued = 0;
            for (file, vars) in found.iter() {
                let output = match template::render(&output_template, vars) {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(file = %file, error = %e, "Error replacing placeholders");
                        continue;
                    }
                };

                let job = TranscodeJob::new(file.as_str(), output, stream.clone());
                if let Err(e) = self.queue.enqueue(job).await {
                    warn!(file = %file, error = %e, "Error queueing video");
                    continue;
                }
                info!(file = %file, "Queued video for encoding");
                stream_queued += 1;
            }

            info!(channel = %key, count = stream_queued, "Videos queued for encoding");
            queued += stream_queued;
        }

        info!(queued, "Video detection completed");
        queued
    }
}
