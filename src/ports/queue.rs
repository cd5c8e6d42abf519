use crate::domain::jobs::TranscodeJob;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("transcode queue is closed")]
    Closed,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueuePort: Send + Sync {
    /// Enqueue a job, waiting for room when the queue is full.
    async fn enqueue(&self, job: TranscodeJob) -> Result<(), QueueError>;
}
