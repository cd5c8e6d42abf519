use crate::domain::jobs::TranscodeJob;
use crate::ports::encoder::EncoderPort;
use crate::ports::queue::{JobQueuePort, QueueError};
use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Jobs accepted before `enqueue` starts waiting for room.
pub const QUEUE_CAPACITY: usize = 100;

/// Bounded FIFO of transcode jobs drained by a single worker task.
///
/// The encoder parallelizes a single job across its renditions, so jobs
/// run one at a time.
pub struct TranscodeQueue<E, S> {
    encoder: Arc<E>,
    storage: Arc<S>,
    sender: Mutex<Option<mpsc::Sender<TranscodeJob>>>,
    receiver: Mutex<Option<mpsc::Receiver<TranscodeJob>>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<E, S> TranscodeQueue<E, S>
where
    E: EncoderPort + 'static,
    S: StoragePort + 'static,
{
    pub fn new(encoder: E, storage: S) -> Self {
        Self::with_capacity(encoder, storage, QUEUE_CAPACITY)
    }

    pub fn with_capacity(encoder: E, storage: S, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            encoder: Arc::new(encoder),
            storage: Arc::new(storage),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Spawns the worker. Calling it again, or after `stop`, does nothing.
    pub fn start(&self) {
        let Some(receiver) = self.receiver.lock().take() else {
            return;
        };
        let handle = tokio::spawn(run_worker(
            self.encoder.clone(),
            self.storage.clone(),
            receiver,
            self.cancel.clone(),
        ));
        *self.worker.lock() = Some(handle);
        info!("Transcode queue started");
    }

    /// Stops accepting jobs and waits for the worker to return.
    ///
    /// The job in flight, if any, runs to completion; jobs still waiting
    /// in the queue are discarded.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.sender.lock().take();
        self.receiver.lock().take();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Transcode worker panicked");
            }
            info!("Transcode queue stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[async_trait]
impl<E, S> JobQueuePort for TranscodeQueue<E, S>
where
    E: EncoderPort + 'static,
    S: StoragePort + 'static,
{
    async fn enqueue(&self, job: TranscodeJob) -> Result<(), QueueError> {
        let sender = self.sender.lock().clone().ok_or(QueueError::Closed)?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(QueueError::Closed),
            sent = sender.send(job) => sent.map_err(|_| QueueError::Closed),
        }
    }
}

async fn run_worker<E, S>(
    encoder: Arc<E>,
    storage: Arc<S>,
    mut receiver: mpsc::Receiver<TranscodeJob>,
    cancel: CancellationToken,
) where
    E: EncoderPort,
    S: StoragePort,
{
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        process_job(encoder.as_ref(), storage.as_ref(), job).await;
    }

    receiver.close();
    let mut discarded = 0usize;
    while receiver.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        warn!(discarded, "Discarding queued transcode jobs");
    }
    info!("Transcode worker stopped");
}

async fn process_job<E, S>(encoder: &E, storage: &S, job: TranscodeJob)
where
    E: EncoderPort,
    S: StoragePort,
{
    info!(input = ?job.input_path, output = ?job.output_path, "Starting transcode");
    let started = Instant::now();

    let result = encoder
        .encode_video(
            &job.input_path,
            &job.output_path,
            &job.stream.qualities,
            &job.stream.distribution,
        )
        .await;

    if let Err(e) = result {
        error!(
            input = ?job.input_path,
            elapsed_ms = started.elapsed().as_millis() as u64,
            error = %e,
            "Transcode failed"
        );
        return;
    }
    info!(
        input = ?job.input_path,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Transcode finished"
    );

    if job.stream.deletes_source_after_encoding() {
        match storage.delete_file(&job.input_path).await {
            Ok(()) => info!(input = ?job.input_path, "Deleted source after encoding"),
            Err(e) => warn!(input = ?job.input_path, error = %e, "Failed to delete source after encoding"),
        }
    }
}
