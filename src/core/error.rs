use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the entire launcher backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} failed with HTTP {status}")]
    Network { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Size mismatch for {path:?}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    // ── Upstream JSON shape ─────────────────────────────
    #[error("Unexpected JSON shape at {context}: {source}")]
    Schema {
        context: String,
        source: serde_json::Error,
    },

    #[error("Unexpected XML shape at {context}: {detail}")]
    XmlSchema { context: String, detail: String },

    // ── Versions / modloaders ───────────────────────────
    #[error("Unknown Minecraft version: {0}")]
    UnknownVersion(String),

    #[error("{loader} {loader_version} is not available for Minecraft {vanilla}")]
    ModloaderUnsupported {
        loader: String,
        loader_version: String,
        vanilla: String,
    },

    #[error("Install processor {step} exited with code {exit_code:?}: {stderr_tail}")]
    InstallProcessor {
        step: usize,
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    // ── Authentication ──────────────────────────────────
    #[error(transparent)]
    Auth(#[from] AuthenticationError),

    // ── Instances ───────────────────────────────────────
    #[error("Instance already exists: {0}")]
    AlreadyExists(String),

    #[error("Instance is already running: {0}")]
    AlreadyRunning(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── Filesystem ──────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Zip archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    // ── Child process ───────────────────────────────────
    #[error("Child process error: {0}")]
    Child(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl From<serde_json::Error> for LauncherError {
    fn from(source: serde_json::Error) -> Self {
        LauncherError::Schema {
            context: "<unlocated>".into(),
            source,
        }
    }
}

/// Authentication errors carry the subkinds the UI distinguishes.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("This Microsoft account has no Xbox account")]
    NoXboxAccount,

    #[error("Xbox Live is not available in this account's region")]
    RegionBanned,

    #[error("This account is a child account and must be added to a family")]
    ChildAccount,

    #[error("The stored refresh token was rejected, please sign in again")]
    RefreshRejected,

    #[error("The device code expired before authorization completed")]
    DeviceCodeExpired,

    #[error("Xbox error {xerr}: {message}")]
    Xbox { xerr: u32, message: String },

    #[error("{error_type}: {description}")]
    Microsoft {
        error_type: String,
        description: String,
    },

    #[error("XSTS response is missing the user hash")]
    MissingUserHash,

    #[error("This account does not own Minecraft")]
    NoEntitlement,

    #[error("Minecraft profile error {error}: {message}")]
    Profile { error: String, message: String },

    #[error("Authentication request to {url} failed with HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("Authentication request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl AuthenticationError {
    /// Stable tag used in `authentication-error` event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthenticationError::NoXboxAccount => "NoXboxAccount",
            AuthenticationError::RegionBanned => "RegionBanned",
            AuthenticationError::ChildAccount => "ChildAccount",
            AuthenticationError::RefreshRejected => "RefreshRejected",
            AuthenticationError::DeviceCodeExpired => "DeviceCodeExpired",
            AuthenticationError::Xbox { .. } => "Xbox",
            AuthenticationError::Microsoft { .. } => "Microsoft",
            AuthenticationError::MissingUserHash => "MissingUserHash",
            AuthenticationError::NoEntitlement => "NoEntitlement",
            AuthenticationError::Profile { .. } => "Profile",
            AuthenticationError::Http { .. } => "Http",
            AuthenticationError::Request(_) => "Request",
        }
    }
}

// ── Serialization for Tauri IPC ─────────────────────────
// Commands return `LauncherError` directly; the frontend receives a
// `kind` tag plus a human readable `detail` string and renders it.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("kind", self.kind())?;
        map.serialize_entry("detail", &self.to_string())?;
        map.serialize_entry("retriable", &self.is_retriable())?;
        map.end()
    }
}

impl LauncherError {
    pub fn kind(&self) -> &'static str {
        match self {
            LauncherError::Http(_) | LauncherError::Network { .. } => "network",
            LauncherError::Integrity { .. } | LauncherError::SizeMismatch { .. } => "integrity",
            LauncherError::Schema { .. } | LauncherError::XmlSchema { .. } => "schema",
            LauncherError::UnknownVersion(_) => "unknown_version",
            LauncherError::ModloaderUnsupported { .. } => "modloader_unsupported",
            LauncherError::InstallProcessor { .. } => "install_processor",
            LauncherError::Auth(_) => "auth",
            LauncherError::AlreadyExists(_) => "already_exists",
            LauncherError::AlreadyRunning(_) => "already_running",
            LauncherError::NotFound(_) => "not_found",
            LauncherError::Config(_) => "config",
            LauncherError::Io { .. }
            | LauncherError::Archive(_)
            | LauncherError::Keyring(_) => "filesystem",
            LauncherError::Child(_) => "child",
        }
    }

    /// Whether retrying the same operation can reasonably succeed.
    /// Integrity and auth failures never retry.
    pub fn is_retriable(&self) -> bool {
        match self {
            LauncherError::Http(source) => {
                source.is_connect() || source.is_timeout() || is_server_error(source)
            }
            LauncherError::Network { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Attach a path to a bare IO error produced by `tokio::fs` calls.
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> LauncherError {
        let path = path.into();
        move |source| LauncherError::Io { path, source }
    }
}

fn is_server_error(error: &reqwest::Error) -> bool {
    error
        .status()
        .map(|status| status.is_server_error())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(
            LauncherError::UnknownVersion("1.0".into()).kind(),
            "unknown_version"
        );
        assert_eq!(
            LauncherError::Auth(AuthenticationError::RefreshRejected).kind(),
            "auth"
        );
        assert_eq!(
            LauncherError::AlreadyRunning("T".into()).kind(),
            "already_running"
        );
    }

    #[test]
    fn auth_subkind_tags() {
        assert_eq!(AuthenticationError::RefreshRejected.kind(), "RefreshRejected");
        assert_eq!(AuthenticationError::NoXboxAccount.kind(), "NoXboxAccount");
        assert_eq!(
            AuthenticationError::DeviceCodeExpired.kind(),
            "DeviceCodeExpired"
        );
    }

    #[test]
    fn integrity_is_never_retriable() {
        let err = LauncherError::Integrity {
            path: PathBuf::from("a"),
            expected: "00".into(),
            actual: "ff".into(),
        };
        assert!(!err.is_retriable());
    }

    #[test]
    fn serializes_with_kind_and_detail() {
        let err = LauncherError::AlreadyExists("Skyblock".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "already_exists");
        assert!(json["detail"].as_str().unwrap().contains("Skyblock"));
    }
}
