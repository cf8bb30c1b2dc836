// ─── Event Surface ───
// Typed payloads emitted to the frontend. The sink wraps an optional
// AppHandle so headless (CLI) launches reuse the same code paths.

use serde::Serialize;
use tauri::Emitter;
use tracing::debug;

/// Per-line category reported with `instance-logging`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Info,
    Warn,
    Error,
}

/// UI-visible lifecycle of a launched instance. Distinct from the
/// supervisor's own process state; flips on log sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstanceUiState {
    Initializing,
    Initialized,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceLoggingPayload {
    pub instance_name: String,
    pub category: LogCategory,
    pub line: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatePayload {
    pub instance_name: String,
    pub state: InstanceUiState,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceExitedPayload {
    pub instance_name: String,
    pub code: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationErrorPayload {
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DownloadProgressPayload {
    pub total: u64,
    pub completed: u64,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

/// Event emitter handed to everything that reports back to the UI.
///
/// `EventSink::disabled()` is used by the `--instance` headless launch; all
/// emits become debug logs.
#[derive(Clone)]
pub struct EventSink {
    handle: Option<tauri::AppHandle>,
}

impl EventSink {
    pub fn new(handle: tauri::AppHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    fn emit<P: Serialize + Clone>(&self, event: &str, payload: P) {
        match &self.handle {
            Some(handle) => {
                // A torn-down webview is not an error worth surfacing.
                let _ = handle.emit(event, payload);
            }
            None => debug!("event {} (headless, dropped)", event),
        }
    }

    pub fn instance_done(&self, instance_name: &str) {
        self.emit("instance-done", instance_name.to_string());
    }

    pub fn new_instance(&self, instance_name: &str) {
        self.emit("new-instance", instance_name.to_string());
    }

    pub fn instance_logging(&self, payload: InstanceLoggingPayload) {
        self.emit("instance-logging", payload);
    }

    pub fn instance_state(&self, instance_name: &str, state: InstanceUiState) {
        self.emit(
            "instance-state",
            InstanceStatePayload {
                instance_name: instance_name.to_string(),
                state,
            },
        );
    }

    pub fn instance_exited(&self, instance_name: &str, code: Option<i32>) {
        self.emit(
            "instance-exited",
            InstanceExitedPayload {
                instance_name: instance_name.to_string(),
                code,
            },
        );
    }

    pub fn authentication_error(&self, kind: &str, detail: String) {
        self.emit(
            "authentication-error",
            AuthenticationErrorPayload {
                kind: kind.to_string(),
                detail,
            },
        );
    }

    pub fn download_progress(&self, payload: DownloadProgressPayload) {
        self.emit("download-progress", payload);
    }
}
