// ─── Download Executor ───
// Bounded concurrent downloader with per-file integrity verification.
// Files stream into a temp file next to their destination and are renamed
// into place only after the hash checks out.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{DownloadProgressPayload, EventSink};
use crate::core::integrity::{self, HashKind, StreamingHasher};

/// Default number of concurrent downloads.
const DEFAULT_PERMITS: usize = 16;

/// Backoff schedule for transient failures.
const RETRY_DELAYS: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

/// Progress events are capped at 10 Hz.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRole {
    Library,
    Native,
    ClientJar,
    AssetIndex,
    AssetObject,
    LoggingConfig,
    Mod,
}

/// One file the planner decided must exist at `destination`.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub url: String,
    pub destination: PathBuf,
    pub expected_sha1: Option<String>,
    pub expected_size: Option<u64>,
    pub role: FetchRole,
}

struct Progress {
    total: u64,
    completed: AtomicU64,
    bytes_done: AtomicU64,
    bytes_total: u64,
    last_emit: Mutex<Instant>,
}

pub struct DownloadExecutor {
    client: reqwest::Client,
    events: EventSink,
    permits: usize,
}

impl DownloadExecutor {
    pub fn new(client: reqwest::Client, events: EventSink) -> Self {
        Self {
            client,
            events,
            permits: DEFAULT_PERMITS,
        }
    }

    pub fn with_permits(mut self, permits: usize) -> Self {
        self.permits = permits.max(1);
        self
    }

    /// Run every task to completion. Tasks whose destination already holds
    /// verified content are skipped, which makes a second run over the same
    /// profile a no-op.
    pub async fn execute(&self, tasks: Vec<FetchTask>) -> LauncherResult<()> {
        let tasks = dedupe_by_destination(tasks);

        let mut pending = Vec::new();
        for task in tasks {
            if already_satisfied(&task).await {
                continue;
            }
            pending.push(task);
        }

        if pending.is_empty() {
            debug!("Nothing to download, all destinations verified");
            return Ok(());
        }

        let progress = Arc::new(Progress {
            total: pending.len() as u64,
            completed: AtomicU64::new(0),
            bytes_done: AtomicU64::new(0),
            bytes_total: pending
                .iter()
                .filter_map(|task| task.expected_size)
                .sum(),
            last_emit: Mutex::new(Instant::now() - PROGRESS_INTERVAL),
        });

        info!(
            "Downloading {} files ({} permits)",
            pending.len(),
            self.permits
        );

        let results: Vec<LauncherResult<()>> = futures::stream::iter(pending)
            .map(|task| {
                let progress = Arc::clone(&progress);
                async move {
                    self.fetch_with_retry(&task).await?;
                    self.record_completion(&task, &progress).await;
                    Ok(())
                }
            })
            // Descarga en paralelo, acotada por el número de permisos.
            .buffer_unordered(self.permits)
            .collect()
            .await;

        // Final progress frame regardless of the rate cap.
        self.emit_progress(&progress, true).await;

        for result in results {
            result?;
        }
        Ok(())
    }

    async fn record_completion(&self, task: &FetchTask, progress: &Progress) {
        progress.completed.fetch_add(1, Ordering::Relaxed);
        if let Some(size) = task.expected_size {
            progress.bytes_done.fetch_add(size, Ordering::Relaxed);
        }
        self.emit_progress(progress, false).await;
    }

    async fn emit_progress(&self, progress: &Progress, force: bool) {
        {
            let mut last = progress.last_emit.lock().await;
            if !force && last.elapsed() < PROGRESS_INTERVAL {
                return;
            }
            *last = Instant::now();
        }
        self.events.download_progress(DownloadProgressPayload {
            total: progress.total,
            completed: progress.completed.load(Ordering::Relaxed),
            bytes_done: progress.bytes_done.load(Ordering::Relaxed),
            bytes_total: progress.bytes_total,
        });
    }

    async fn fetch_with_retry(&self, task: &FetchTask) -> LauncherResult<()> {
        let mut last_error: Option<LauncherError> = None;

        for delay in std::iter::once(None).chain(RETRY_DELAYS.iter().map(Some)) {
            if let Some(delay) = delay {
                warn!(
                    "Retrying {} after {:?}: {}",
                    task.url,
                    delay,
                    last_error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default()
                );
                tokio::time::sleep(*delay).await;
            }

            match self.fetch_once(task).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_retriable() => last_error = Some(error),
                Err(error) => return Err(error),
            }
        }

        Err(last_error.expect("at least one attempt was made"))
    }

    async fn fetch_once(&self, task: &FetchTask) -> LauncherResult<()> {
        let response = self.client.get(&task.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::Network {
                url: task.url.clone(),
                status: status.as_u16(),
            });
        }

        if let Some(parent) = task.destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(LauncherError::io(parent.to_path_buf()))?;
        }

        // Temp file in the same directory so the final rename is atomic.
        let temp_path = temp_path_for(&task.destination);
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(LauncherError::io(temp_path.clone()))?;

        let mut hasher = StreamingHasher::new(HashKind::Sha1);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(LauncherError::io(temp_path.clone()))?;
        }
        file.flush()
            .await
            .map_err(LauncherError::io(temp_path.clone()))?;
        drop(file);

        let bytes_seen = hasher.bytes_seen();
        let actual_sha1 = hasher.finalize();

        if let Some(expected) = task.expected_size {
            if bytes_seen != expected {
                // The temp file is kept for inspection.
                return Err(LauncherError::SizeMismatch {
                    path: temp_path,
                    expected,
                    actual: bytes_seen,
                });
            }
        }

        if let Some(expected) = &task.expected_sha1 {
            if !actual_sha1.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::Integrity {
                    path: temp_path,
                    expected: expected.clone(),
                    actual: actual_sha1,
                });
            }
        }

        tokio::fs::rename(&temp_path, &task.destination)
            .await
            .map_err(LauncherError::io(task.destination.clone()))?;
        debug!("Downloaded {} -> {:?}", task.url, task.destination);
        Ok(())
    }
}

fn temp_path_for(destination: &PathBuf) -> PathBuf {
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    destination.with_file_name(format!(".{}.part", file_name))
}

fn dedupe_by_destination(tasks: Vec<FetchTask>) -> Vec<FetchTask> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| seen.insert(task.destination.clone()))
        .collect()
}

/// A destination with matching content needs no network round trip.
async fn already_satisfied(task: &FetchTask) -> bool {
    match &task.expected_sha1 {
        Some(expected) => integrity::file_matches_sha1(&task.destination, expected).await,
        None => task.destination.exists(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(destination: &str) -> FetchTask {
        FetchTask {
            url: format!("https://example.invalid/{}", destination),
            destination: PathBuf::from(destination),
            expected_sha1: None,
            expected_size: None,
            role: FetchRole::Library,
        }
    }

    #[test]
    fn dedupes_by_destination_keeping_first() {
        let tasks = vec![task("a/b.jar"), task("c.jar"), task("a/b.jar")];
        let deduped = dedupe_by_destination(tasks);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].destination, PathBuf::from("a/b.jar"));
    }

    #[test]
    fn temp_path_is_hidden_sibling() {
        let temp = temp_path_for(&PathBuf::from("/data/libraries/asm-9.3.jar"));
        assert_eq!(temp, PathBuf::from("/data/libraries/.asm-9.3.jar.part"));
    }

    #[tokio::test]
    async fn verified_destination_is_satisfied() {
        let tmp = tempdir::TempDir::new("executor").unwrap();
        let destination = tmp.path().join("file.bin");
        tokio::fs::write(&destination, b"content").await.unwrap();

        let mut fetch = task("x");
        fetch.destination = destination.clone();
        fetch.expected_sha1 = Some(crate::core::integrity::sha1_hex(b"content"));
        assert!(already_satisfied(&fetch).await);

        // Corrupt the file; it must be re-fetched.
        tokio::fs::write(&destination, b"Content").await.unwrap();
        assert!(!already_satisfied(&fetch).await);
    }
}
