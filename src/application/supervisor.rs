//! Supervision of live transcoding subprocesses.
//!
//! Every stream key owns at most one active [`LiveProcess`]. A watcher task
//! per process waits for it to exit and drops it from the registry; an
//! explicit [`LiveProcess::stop`] closes its input, waits a grace period,
//! kills it if needed, and removes its output directory later on.

use crate::ports::encoder::LiveTranscoderPort;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to create output directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to start live transcoder: {0}")]
    Spawn(#[source] io::Error),
    #[error("live transcoder was started without an input pipe")]
    MissingStdin,
    #[error("live stream {0} is already active")]
    AlreadyActive(String),
}

type Records = Mutex<HashMap<String, Arc<LiveProcess>>>;
type Registry = Arc<Records>;

/// A supervised live transcoder.
pub struct LiveProcess {
    key: String,
    output_dir: PathBuf,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    /// Cancelled when the process is asked to stop
    cancel: CancellationToken,
    /// Cancelled to have the watcher kill the process
    kill: CancellationToken,
    active: AtomicBool,
    exited: watch::Receiver<bool>,
    /// Registry the process belongs to, checked before removing its output
    records: Weak<Records>,
    cleanups: TaskTracker,
}

impl LiveProcess {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Token cancelled once the process is being stopped.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Feeds bytes to the transcoder input.
    pub async fn write(&self, data: &[u8]) -> io::Result<()> {
        let mut stdin = self.stdin.lock().await;
        let Some(pipe) = stdin.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "live input is closed"));
        };
        tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "live process is stopping"))
            }
            written = pipe.write_all(data) => written,
        }
    }

    /// Resolves once the subprocess has exited, for any reason.
    pub async fn wait_exit(&self) {
        let mut exited = self.exited.clone();
        let _ = exited.wait_for(|exited| *exited).await;
    }

    /// Stops the process: closes its input, waits up to `cleanup_delay` for
    /// it to exit, kills it otherwise. The output directory is removed
    /// `cleanup_delay` later so readers can fetch the last segments.
    ///
    /// Returns the cleanup task, or `None` if the process was already stopped.
    pub async fn stop(&self, cleanup_delay: Duration) -> Option<JoinHandle<()>> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return None;
        }

        // A writer blocked on a full pipe holds the lock until it sees the
        // cancellation.
        if let Ok(mut stdin) = self.stdin.try_lock() {
            stdin.take();
        }
        self.cancel.cancel();
        self.stdin.lock().await.take();

        if tokio::time::timeout(cleanup_delay, self.wait_exit())
            .await
            .is_ok()
        {
            info!(key = %self.key, "Live transcoder exited cleanly");
        } else {
            warn!(key = %self.key, "Live transcoder did not exit cleanly, forcing termination");
            self.kill.cancel();
            self.wait_exit().await;
        }

        let key = self.key.clone();
        let output_dir = self.output_dir.clone();
        let records = self.records.clone();
        Some(self.cleanups.spawn(async move {
            tokio::time::sleep(cleanup_delay).await;
            let removal = tokio::task::spawn_blocking({
                let key = key.clone();
                let output_dir = output_dir.clone();
                move || remove_output_dir(&records, &key, &output_dir)
            })
            .await;
            match removal {
                Ok(Cleanup::Removed) => info!(key = %key, dir = ?output_dir, "Cleaned up stream directory"),
                Ok(Cleanup::InUse) => {
                    info!(key = %key, dir = ?output_dir, "Stream directory reused by a new publisher, keeping it")
                }
                Ok(Cleanup::Failed(e)) => {
                    error!(key = %key, dir = ?output_dir, error = %e, "Error cleaning up stream directory")
                }
                Err(e) => error!(key = %key, dir = ?output_dir, error = %e, "Cleanup task failed"),
            }
        }))
    }
}

enum Cleanup {
    Removed,
    InUse,
    Failed(io::Error),
}

// Holds the registry lock while removing, so a process registered for the
// same directory either sees it gone and recreates it, or keeps it.
fn remove_output_dir(records: &Weak<Records>, key: &str, output_dir: &Path) -> Cleanup {
    let registry = records.upgrade();
    let guard = registry.as_ref().map(|records| records.lock());
    let in_use = guard.as_ref().is_some_and(|records| {
        records
            .get(key)
            .is_some_and(|current| current.is_active() && current.output_dir.as_path() == output_dir)
    });
    if in_use {
        return Cleanup::InUse;
    }
    match std::fs::remove_dir_all(output_dir) {
        Ok(()) => Cleanup::Removed,
        Err(e) => Cleanup::Failed(e),
    }
}

enum Registration {
    Existing(Arc<LiveProcess>),
    Started(Arc<LiveProcess>, Child, watch::Sender<bool>),
}

/// Registry of live transcoders keyed by stream key.
pub struct LiveSupervisor<T> {
    transcoder: T,
    records: Registry,
    cleanups: TaskTracker,
}

impl<T: LiveTranscoderPort> LiveSupervisor<T> {
    pub fn new(transcoder: T) -> Self {
        Self {
            transcoder,
            records: Arc::new(Mutex::new(HashMap::new())),
            cleanups: TaskTracker::new(),
        }
    }

    /// Returns the active process of `key`, starting one writing into
    /// `output_dir` if there is none.
    pub fn get_or_create(&self, key: &str, output_dir: &Path) -> Result<Arc<LiveProcess>, SupervisorError> {
        if let Some(existing) = self.get(key) {
            return Ok(existing);
        }
        match self.register(key, output_dir)? {
            Registration::Existing(existing) => Ok(existing),
            Registration::Started(record, child, exited) => Ok(self.watch(record, child, exited)),
        }
    }

    /// Starts a process for `key`, failing with
    /// [`SupervisorError::AlreadyActive`] when one is already running.
    pub fn create_exclusive(&self, key: &str, output_dir: &Path) -> Result<Arc<LiveProcess>, SupervisorError> {
        match self.register(key, output_dir)? {
            Registration::Existing(_) => Err(SupervisorError::AlreadyActive(key.to_string())),
            Registration::Started(record, child, exited) => Ok(self.watch(record, child, exited)),
        }
    }

    fn watch(&self, record: Arc<LiveProcess>, child: Child, exited: watch::Sender<bool>) -> Arc<LiveProcess> {
        tokio::spawn(watch_process(
            self.records.clone(),
            record.clone(),
            child,
            exited,
        ));
        info!(key = %record.key, dir = ?record.output_dir, "Started new live stream");
        record
    }

    // Check-and-insert under the registry lock. The output directory is
    // created under it too, so a pending cleanup of the same directory
    // cannot run in between.
    fn register(&self, key: &str, output_dir: &Path) -> Result<Registration, SupervisorError> {
        let mut records = self.records.lock();
        if let Some(existing) = records.get(key) {
            if existing.is_active() {
                return Ok(Registration::Existing(existing.clone()));
            }
        }

        std::fs::create_dir_all(output_dir).map_err(|source| SupervisorError::CreateDir {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let mut child = self
            .transcoder
            .spawn_live(output_dir)
            .map_err(SupervisorError::Spawn)?;
        let stdin = child.stdin.take().ok_or(SupervisorError::MissingStdin)?;

        let (exited_tx, exited_rx) = watch::channel(false);
        let record = Arc::new(LiveProcess {
            key: key.to_string(),
            output_dir: output_dir.to_path_buf(),
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            cancel: CancellationToken::new(),
            kill: CancellationToken::new(),
            active: AtomicBool::new(true),
            exited: exited_rx,
            records: Arc::downgrade(&self.records),
            cleanups: self.cleanups.clone(),
        });
        records.insert(key.to_string(), record.clone());
        Ok(Registration::Started(record, child, exited_tx))
    }

    /// The active process of `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<LiveProcess>> {
        self.records
            .lock()
            .get(key)
            .filter(|record| record.is_active())
            .cloned()
    }

    /// Keys of the active processes, sorted.
    pub fn list_active(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .records
            .lock()
            .values()
            .filter(|record| record.is_active())
            .map(|record| record.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Stops every active process, then waits for every pending output
    /// directory cleanup, including those of processes stopped earlier.
    pub async fn stop_all(&self, cleanup_delay: Duration) {
        let records: Vec<Arc<LiveProcess>> = self.records.lock().values().cloned().collect();
        for record in &records {
            info!(key = %record.key, "Stopping live stream");
        }
        futures::future::join_all(records.iter().map(|record| record.stop(cleanup_delay))).await;

        info!(pending = self.cleanups.len(), "Waiting for live stream cleanup");
        self.cleanups.close();
        self.cleanups.wait().await;
    }
}

async fn watch_process(
    records: Registry,
    record: Arc<LiveProcess>,
    mut child: Child,
    exited: watch::Sender<bool>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = record.kill.cancelled() => {
            if let Err(e) = child.start_kill() {
                warn!(key = %record.key, error = %e, "Failed to kill live transcoder");
            }
            child.wait().await
        }
    };

    match status {
        Ok(status) if status.success() => info!(key = %record.key, "Live transcoder exited normally"),
        Ok(status) => warn!(key = %record.key, %status, "Live transcoder exited"),
        Err(e) => error!(key = %record.key, error = %e, "Failed to wait for live transcoder"),
    }

    record.active.store(false, Ordering::SeqCst);
    {
        let mut records = records.lock();
        if records
            .get(&record.key)
            .is_some_and(|current| Arc::ptr_eq(current, &record))
        {
            records.remove(&record.key);
        }
    }
    let _ = exited.send(true);
    info!(key = %record.key, "Live stream ended and cleaned up");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;
    use tokio::process::Command;

    /// Runs a shell script in the output directory instead of ffmpeg.
    struct ShellTranscoder {
        script: &'static str,
        spawned: Arc<AtomicUsize>,
    }

    impl ShellTranscoder {
        fn new(script: &'static str) -> Self {
            Self {
                script,
                spawned: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl LiveTranscoderPort for ShellTranscoder {
        fn spawn_live(&self, output_dir: &Path) -> io::Result<Child> {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            Command::new("sh")
                .arg("-c")
                .arg(self.script)
                .current_dir(output_dir)
                .stdin(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
        }
    }

    async fn within<F: std::future::Future>(future: F) -> F::Output {
        tokio::time::timeout(Duration::from_secs(10), future)
            .await
            .expect("timed out")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_spawns_once() {
        let dir = tempdir().unwrap();
        let transcoder = ShellTranscoder::new("cat > input.flv");
        let spawned = transcoder.spawned.clone();
        let supervisor = Arc::new(LiveSupervisor::new(transcoder));
        let output = dir.path().join("live/john");

        let calls = (0..8).map(|_| {
            let supervisor = supervisor.clone();
            let output = output.clone();
            tokio::spawn(async move { supervisor.get_or_create("john", &output).unwrap() })
        });
        let records: Vec<Arc<LiveProcess>> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        assert!(records.iter().all(|r| Arc::ptr_eq(r, &records[0])));
        assert_eq!(supervisor.list_active(), vec!["john".to_string()]);

        within(records[0].stop(Duration::from_millis(500))).await;
    }

    #[tokio::test]
    async fn test_exited_process_leaves_registry() {
        let dir = tempdir().unwrap();
        let transcoder = ShellTranscoder::new("exit 0");
        let spawned = transcoder.spawned.clone();
        let supervisor = LiveSupervisor::new(transcoder);

        let record = supervisor.get_or_create("alice", dir.path()).unwrap();
        within(record.wait_exit()).await;

        assert!(!record.is_active());
        assert!(supervisor.list_active().is_empty());
        assert!(supervisor.get("alice").is_none());

        // A new publisher gets a fresh process.
        let again = supervisor.get_or_create("alice", dir.path()).unwrap();
        assert!(!Arc::ptr_eq(&record, &again));
        assert_eq!(spawned.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_graceful_stop_flushes_input_then_cleans_up() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("live/bob");
        let supervisor = LiveSupervisor::new(ShellTranscoder::new("cat > input.flv"));

        let record = supervisor.get_or_create("bob", &output).unwrap();
        record.write(b"FLV\x01payload").await.unwrap();

        let cleanup = within(record.stop(Duration::from_millis(300)))
            .await
            .unwrap();
        assert!(!record.is_active());
        assert_eq!(
            std::fs::read(output.join("input.flv")).unwrap(),
            b"FLV\x01payload"
        );

        within(cleanup).await.unwrap();
        assert!(!output.exists());
        assert!(supervisor.list_active().is_empty());
    }

    #[tokio::test]
    async fn test_stop_kills_unresponsive_process() {
        let dir = tempdir().unwrap();
        let supervisor = LiveSupervisor::new(ShellTranscoder::new("trap '' TERM; sleep 30"));

        let record = supervisor.get_or_create("carol", dir.path()).unwrap();
        let started = std::time::Instant::now();
        within(record.stop(Duration::from_millis(100))).await;

        assert!(started.elapsed() < Duration::from_secs(10));
        within(record.wait_exit()).await;
        assert!(supervisor.list_active().is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_closes_input() {
        let dir = tempdir().unwrap();
        let supervisor = LiveSupervisor::new(ShellTranscoder::new("cat > /dev/null"));

        let record = supervisor.get_or_create("dave", dir.path()).unwrap();
        assert!(within(record.stop(Duration::from_millis(200))).await.is_some());
        assert!(within(record.stop(Duration::from_millis(200))).await.is_none());
        assert!(record.cancellation().is_cancelled());

        let err = record.write(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_stop_all() {
        let dir = tempdir().unwrap();
        let supervisor = LiveSupervisor::new(ShellTranscoder::new("cat > /dev/null"));

        supervisor.get_or_create("a", &dir.path().join("a")).unwrap();
        supervisor.get_or_create("b", &dir.path().join("b")).unwrap();
        assert_eq!(supervisor.list_active(), vec!["a".to_string(), "b".to_string()]);

        within(supervisor.stop_all(Duration::from_millis(200))).await;
        assert!(supervisor.list_active().is_empty());
        assert!(!dir.path().join("a").exists());
        assert!(!dir.path().join("b").exists());
    }

    #[tokio::test]
    async fn test_stop_all_waits_for_earlier_cleanups() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("live/erin");
        let supervisor = LiveSupervisor::new(ShellTranscoder::new("cat > /dev/null"));

        let record = supervisor.get_or_create("erin", &output).unwrap();
        // The cleanup handle is dropped, as a finished publication does.
        drop(within(record.stop(Duration::from_millis(200))).await);
        assert!(output.exists());

        within(supervisor.stop_all(Duration::from_millis(200))).await;
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_reconnect_before_cleanup_keeps_directory() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("live/john");
        let supervisor = LiveSupervisor::new(ShellTranscoder::new("cat > input.flv"));

        let first = supervisor.get_or_create("john", &output).unwrap();
        let cleanup = within(first.stop(Duration::from_millis(200)))
            .await
            .unwrap();

        let second = supervisor.get_or_create("john", &output).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        second.write(b"x").await.unwrap();

        within(cleanup).await.unwrap();
        assert!(second.is_active());
        assert!(output.exists());

        within(second.stop(Duration::from_millis(200)))
            .await
            .unwrap()
            .await
            .unwrap();
        assert!(!output.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_create_exclusive_admits_one_process() {
        let dir = tempdir().unwrap();
        let transcoder = ShellTranscoder::new("cat > /dev/null");
        let spawned = transcoder.spawned.clone();
        let supervisor = Arc::new(LiveSupervisor::new(transcoder));
        let output = dir.path().join("live/john");

        let calls = (0..8).map(|_| {
            let supervisor = supervisor.clone();
            let output = output.clone();
            tokio::spawn(async move { supervisor.create_exclusive("john", &output) })
        });
        let results: Vec<_> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let accepted: Vec<&Arc<LiveProcess>> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(accepted.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, SupervisorError::AlreadyActive(key) if key == "john")));
        assert_eq!(spawned.load(Ordering::SeqCst), 1);

        within(accepted[0].stop(Duration::from_millis(200))).await;
    }
}
