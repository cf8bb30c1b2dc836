// ─── Process Supervisor ───
// Spawns the game, tails both stdio streams, classifies and persists every
// line, flips the UI state on initialization sentinels, and reports exit.
//
// State machine: Idle → Spawning → Running → (Exited | Killed | Crashed).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventSink, InstanceLoggingPayload, InstanceUiState};
use crate::core::instance::logs::{classify_line, LogBuffer, LogStore, TaggedLine};
use crate::core::instance::model::InstanceDirs;

/// Lines containing either of these mark the game as initialized.
const INIT_SENTINELS: [&str; 2] = ["Setting user:", "Initializing LWJGL OpenAL"];

/// `instance-logging` events are flushed at most this often per instance.
const EMIT_INTERVAL: Duration = Duration::from_millis(20);

/// Grace period between SIGTERM and SIGKILL on shutdown.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// Rotated logs kept per instance.
const MAX_ROTATED_LOGS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorState {
    Running,
    Exited,
    Killed,
    Crashed,
}

/// Handle to a supervised child. Dropping it does not stop the game; the
/// supervisor task owns the process.
pub struct RunningInstance {
    pub instance_name: String,
    pub pid: Option<u32>,
    pub shutdown: watch::Sender<bool>,
    /// Resolves to the exit code once the supervisor is completely done
    /// (after `instance-exited` was emitted).
    pub done: JoinHandle<Option<i32>>,
}

impl RunningInstance {
    /// Request termination: SIGTERM, a grace period, then SIGKILL.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Spawn the child and its supervisor task.
pub async fn spawn_supervised(
    events: EventSink,
    log_store: Arc<LogStore>,
    dirs: InstanceDirs,
    instance_name: String,
    java_bin: PathBuf,
    arguments: Vec<String>,
) -> LauncherResult<RunningInstance> {
    let game_dir = dirs.minecraft_dir();
    tokio::fs::create_dir_all(&game_dir)
        .await
        .map_err(LauncherError::io(game_dir.clone()))?;

    info!("Spawning {:?} for instance '{}'", java_bin, instance_name);
    debug!("Arguments: {:?}", arguments);

    let mut child = Command::new(&java_bin)
        .args(&arguments)
        .current_dir(&game_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| LauncherError::Child(format!("spawn failed: {}", source)))?;

    let pid = child.id();
    let live_buffer = log_store.open_live(&instance_name).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (line_tx, line_rx) = mpsc::channel::<String>(256);
    if let Some(stdout) = child.stdout.take() {
        spawn_line_reader(stdout, line_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_reader(stderr, line_tx.clone());
    }
    drop(line_tx);

    let done = tokio::spawn(supervise(
        events,
        log_store,
        dirs,
        instance_name.clone(),
        child,
        pid,
        live_buffer,
        line_rx,
        shutdown_rx,
    ));

    Ok(RunningInstance {
        instance_name,
        pid,
        shutdown: shutdown_tx,
        done,
    })
}

fn spawn_line_reader(
    stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    sender: mpsc::Sender<String>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            // `\r` survives `lines()` on CRLF output.
            let line = line.trim_end_matches('\r').to_string();
            if sender.send(line).await.is_err() {
                break;
            }
        }
    });
}

#[allow(clippy::too_many_arguments)]
async fn supervise(
    events: EventSink,
    log_store: Arc<LogStore>,
    dirs: InstanceDirs,
    instance_name: String,
    mut child: Child,
    pid: Option<u32>,
    live_buffer: Arc<Mutex<LogBuffer>>,
    mut line_rx: mpsc::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Option<i32> {
    let mut state = SupervisorState::Running;
    let mut initialized = false;
    let mut shutdown_closed = false;
    let mut pending_emits: Vec<InstanceLoggingPayload> = Vec::new();
    let mut emit_tick = tokio::time::interval(EMIT_INTERVAL);

    events.instance_state(&instance_name, InstanceUiState::Initializing);

    let mut appender = open_latest_log(&dirs).await;

    loop {
        tokio::select! {
            received = line_rx.recv() => {
                match received {
                    Some(line) => {
                        let kind = classify_line(&line);
                        let tagged = TaggedLine {
                            timestamp: Utc::now(),
                            kind,
                            text: line.clone(),
                        };

                        live_buffer.lock().await.push(tagged);

                        if let Some(file) = appender.as_mut() {
                            let mut bytes = line.clone().into_bytes();
                            bytes.push(b'\n');
                            if let Err(write_error) = file.write_all(&bytes).await {
                                warn!("latest.log write failed: {}", write_error);
                                appender = None;
                            }
                        }

                        if !initialized && INIT_SENTINELS.iter().any(|s| line.contains(s)) {
                            initialized = true;
                            events.instance_state(&instance_name, InstanceUiState::Initialized);
                        }

                        pending_emits.push(InstanceLoggingPayload {
                            instance_name: instance_name.clone(),
                            category: kind,
                            line,
                        });
                    }
                    // Both stdio streams closed: the child is exiting.
                    None => break,
                }
            }
            _ = emit_tick.tick() => {
                for payload in pending_emits.drain(..) {
                    events.instance_logging(payload);
                }
            }
            changed = shutdown_rx.changed(), if !shutdown_closed => {
                match changed {
                    Ok(()) if *shutdown_rx.borrow() => {
                        info!("Shutdown requested for '{}'", instance_name);
                        state = SupervisorState::Killed;
                        terminate_child(&mut child, pid).await;
                        // The child is gone; don't wait on stragglers that
                        // inherited the stdio pipes.
                        break;
                    }
                    Ok(()) => {}
                    Err(_) => shutdown_closed = true,
                }
            }
        }
    }

    let exit_code = match child.wait().await {
        Ok(status) => {
            let code = status.code();
            if state != SupervisorState::Killed {
                state = match code {
                    Some(0) => SupervisorState::Exited,
                    _ => SupervisorState::Crashed,
                };
            }
            code
        }
        Err(wait_error) => {
            error!("Waiting on '{}' failed: {}", instance_name, wait_error);
            state = SupervisorState::Crashed;
            None
        }
    };

    info!(
        "Instance '{}' finished ({:?}, code {:?})",
        instance_name, state, exit_code
    );

    if let Some(mut file) = appender.take() {
        let _ = file.flush().await;
    }

    let rotated_name = rotate_latest_log(&dirs).await;
    log_store
        .seal(&instance_name, rotated_name.as_deref().unwrap_or("latest"))
        .await;

    // Flush any buffered lines, then the exit event. `instance-exited` is
    // always the last event for a run.
    for payload in pending_emits.drain(..) {
        events.instance_logging(payload);
    }
    events.instance_exited(&instance_name, exit_code);

    exit_code
}

async fn open_latest_log(dirs: &InstanceDirs) -> Option<tokio::fs::File> {
    let logs_dir = dirs.logs_dir();
    if let Err(create_error) = tokio::fs::create_dir_all(&logs_dir).await {
        warn!("Cannot create logs dir {:?}: {}", logs_dir, create_error);
        return None;
    }
    match tokio::fs::File::create(dirs.latest_log()).await {
        Ok(file) => Some(file),
        Err(create_error) => {
            warn!("Cannot open latest.log: {}", create_error);
            None
        }
    }
}

/// `logs/latest.log` → `logs/<timestamp>.log`; old rotations are purged.
/// Returns the rotated basename.
async fn rotate_latest_log(dirs: &InstanceDirs) -> Option<String> {
    let latest = dirs.latest_log();
    if !latest.exists() {
        return None;
    }

    // rfc3339 with `:` replaced so the name is valid on every filesystem.
    let stamp = Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        .replace(':', "-");
    let rotated_name = format!("{}.log", stamp);
    let rotated = dirs.logs_dir().join(&rotated_name);

    if let Err(rename_error) = tokio::fs::rename(&latest, &rotated).await {
        warn!("Log rotation failed: {}", rename_error);
        return None;
    }

    purge_rotated_logs(&dirs.logs_dir()).await;
    Some(rotated_name)
}

async fn purge_rotated_logs(logs_dir: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(logs_dir).await else {
        return;
    };

    let mut rotated: Vec<PathBuf> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".log") && name != "latest.log" {
            rotated.push(entry.path());
        }
    }

    rotated.sort();
    rotated.reverse();
    for stale in rotated.into_iter().skip(MAX_ROTATED_LOGS) {
        debug!("Purging rotated log {:?}", stale);
        let _ = tokio::fs::remove_file(stale).await;
    }
}

/// SIGTERM, wait up to `TERM_GRACE`, then SIGKILL.
async fn terminate_child(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        let _ = std::process::Command::new("kill")
            .args(["-15", &pid.to_string()])
            .status();
        if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
        warn!("Process {} ignored SIGTERM, killing", pid);
    }

    #[cfg(windows)]
    if let Some(pid) = pid {
        let _ = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T"])
            .status();
        if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }

    let _ = child.kill().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_lines_flip_initialization() {
        assert!(INIT_SENTINELS
            .iter()
            .any(|s| "[09:00:01] [Render thread/INFO]: Setting user: Steve".contains(s)));
        assert!(INIT_SENTINELS
            .iter()
            .any(|s| "[09:00:04] [Render thread/INFO]: Initializing LWJGL OpenAL".contains(s)));
        assert!(!INIT_SENTINELS
            .iter()
            .any(|s| "[09:00:00] [main/INFO]: Loading mods".contains(s)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn supervises_a_short_lived_process() {
        let tmp = tempdir::TempDir::new("supervisor").unwrap();
        let dirs = InstanceDirs::new(tmp.path());
        let log_store = Arc::new(LogStore::new());

        let running = spawn_supervised(
            EventSink::disabled(),
            Arc::clone(&log_store),
            dirs.clone(),
            "T".to_string(),
            PathBuf::from("/bin/sh"),
            vec![
                "-c".to_string(),
                "echo '[x/INFO]: Setting user: T'; echo '[x/ERROR]: boom' 1>&2".to_string(),
            ],
        )
        .await
        .unwrap();

        let code = running.done.await.unwrap();
        assert_eq!(code, Some(0));

        // latest.log was rotated on exit.
        assert!(!dirs.latest_log().exists());
        let rotated: Vec<_> = std::fs::read_dir(dirs.logs_dir())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .collect();
        assert_eq!(rotated.len(), 1);

        let content = std::fs::read_to_string(rotated[0].path()).unwrap();
        assert!(content.contains("Setting user: T"));
        assert!(content.contains("boom"));

        // The live buffer was sealed.
        assert!(log_store.live_snapshot("T").await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_terminates_a_stubborn_child() {
        let tmp = tempdir::TempDir::new("supervisor").unwrap();
        let dirs = InstanceDirs::new(tmp.path());
        let log_store = Arc::new(LogStore::new());

        let running = spawn_supervised(
            EventSink::disabled(),
            log_store,
            dirs,
            "T".to_string(),
            PathBuf::from("/bin/sh"),
            vec!["-c".to_string(), "exec sleep 600".to_string()],
        )
        .await
        .unwrap();

        running.request_shutdown();
        let code = running.done.await.unwrap();
        // Terminated by signal: no exit code.
        assert_eq!(code, None);
    }
}
