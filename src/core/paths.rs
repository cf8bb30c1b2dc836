use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};

pub const LAUNCHER_NAME: &str = "Meridian";
pub const LAUNCHER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How many launcher log files are kept in `launcher_logs/`.
const MAX_LAUNCHER_LOGS: usize = 10;

/// On-disk layout of the launcher data directory.
///
/// ```text
/// <app_config_dir>/
///   accounts.json
///   instances/<name>/{instance.json, minecraft/, natives/, screenshots/, logs/}
///   versions/<id>/<id>.json
///   libraries/<group-path>/<artifact>/<version>/...
///   assets/{indexes/<id>.json, objects/<xx>/<sha1>}
///   forge/<vanilla>-<forge>/          # installer cache + processor outputs
///   launcher_logs/
/// ```
#[derive(Debug, Clone)]
pub struct LauncherPaths {
    root: PathBuf,
}

impl LauncherPaths {
    pub fn new() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: base.join(LAUNCHER_NAME),
        }
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn accounts_file(&self) -> PathBuf {
        self.root.join("accounts.json")
    }

    pub fn instances_dir(&self) -> PathBuf {
        self.root.join("instances")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    /// `versions/<id>/<id>.json`
    pub fn version_json(&self, version_id: &str) -> PathBuf {
        self.versions_dir()
            .join(version_id)
            .join(format!("{}.json", version_id))
    }

    /// Client jars live next to their version json: `versions/<id>/<id>.jar`.
    pub fn client_jar(&self, version_id: &str) -> PathBuf {
        self.versions_dir()
            .join(version_id)
            .join(format!("{}.jar", version_id))
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn asset_indexes_dir(&self) -> PathBuf {
        self.assets_dir().join("indexes")
    }

    pub fn asset_objects_dir(&self) -> PathBuf {
        self.assets_dir().join("objects")
    }

    /// Content-addressed asset object path: `assets/objects/<xx>/<sha1>`.
    pub fn asset_object(&self, hash: &str) -> PathBuf {
        self.asset_objects_dir().join(&hash[..2]).join(hash)
    }

    /// Cache for Forge installers and their processor outputs.
    pub fn forge_cache_dir(&self, vanilla: &str, forge_version: &str) -> PathBuf {
        self.root
            .join("forge")
            .join(format!("{}-{}", vanilla, forge_version))
    }

    pub fn launcher_logs_dir(&self) -> PathBuf {
        self.root.join("launcher_logs")
    }

    pub fn ensure_base_dirs(&self) -> LauncherResult<()> {
        for dir in [
            self.root.clone(),
            self.instances_dir(),
            self.versions_dir(),
            self.libraries_dir(),
            self.asset_indexes_dir(),
            self.asset_objects_dir(),
            self.launcher_logs_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(LauncherError::io(dir))?;
        }
        Ok(())
    }
}

impl Default for LauncherPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove launcher log files beyond the `MAX_LAUNCHER_LOGS` most recent.
/// Log file names are timestamp-suffixed so lexicographic order is
/// chronological.
pub fn purge_launcher_logs(logs_dir: &Path) -> std::io::Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(logs_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|ext| ext == "log").unwrap_or(false))
        .collect();

    entries.sort();
    entries.reverse();

    for stale in entries.iter().skip(MAX_LAUNCHER_LOGS) {
        if let Err(error) = std::fs::remove_file(stale) {
            warn!("Cannot purge old launcher log {:?}: {}", stale, error);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_object_path_uses_hash_prefix() {
        let paths = LauncherPaths::with_root(PathBuf::from("/data"));
        let object = paths.asset_object("da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(
            object,
            PathBuf::from("/data/assets/objects/da/da39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
    }

    #[test]
    fn version_json_is_nested_in_version_dir() {
        let paths = LauncherPaths::with_root(PathBuf::from("/data"));
        assert_eq!(
            paths.version_json("1.20.1"),
            PathBuf::from("/data/versions/1.20.1/1.20.1.json")
        );
    }

    #[test]
    fn purge_keeps_newest_logs() {
        let tmp = tempdir::TempDir::new("launcher-logs").unwrap();
        for index in 0..(MAX_LAUNCHER_LOGS + 5) {
            let name = format!("launcher_log_2026-01-{:02}.log", index + 1);
            std::fs::write(tmp.path().join(name), b"x").unwrap();
        }

        purge_launcher_logs(tmp.path()).unwrap();

        let remaining = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(remaining, MAX_LAUNCHER_LOGS);
        // The newest file must survive.
        assert!(tmp
            .path()
            .join(format!("launcher_log_2026-01-{:02}.log", MAX_LAUNCHER_LOGS + 5))
            .exists());
    }
}
