// ─── Java Detection ───
// Finds installed JVMs and picks one satisfying a version descriptor's
// java hint. An instance's `jvm_path_override` bypasses all of this.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Serialize)]
pub struct JavaInstallation {
    pub path: PathBuf,
    pub version: String,
    pub major: u32,
}

/// Probe `JAVA_HOME`, `PATH`, and the platform-conventional install roots.
pub fn detect_installations_sync() -> Vec<JavaInstallation> {
    let mut installations: Vec<JavaInstallation> = Vec::new();
    let mut consider = |binary: PathBuf| {
        if !binary.exists() {
            return;
        }
        if let Some(found) = probe(&binary) {
            if !installations.iter().any(|known| known.path == found.path) {
                installations.push(found);
            }
        }
    };

    if let Ok(java_home) = std::env::var("JAVA_HOME") {
        consider(PathBuf::from(java_home).join("bin").join(java_binary_name()));
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let separator = if cfg!(windows) { ';' } else { ':' };
        for dir in path_var.split(separator) {
            consider(PathBuf::from(dir).join(java_binary_name()));
        }
    }

    for root in platform_roots() {
        let Ok(entries) = std::fs::read_dir(root) else {
            continue;
        };
        for entry in entries.flatten() {
            consider(entry.path().join("bin").join(java_binary_name()));
            // macOS bundles nest the actual home.
            consider(entry.path().join("Contents/Home/bin").join(java_binary_name()));
        }
    }

    if installations.is_empty() {
        warn!("No Java installations detected");
    } else {
        info!("Detected {} Java installations", installations.len());
    }
    installations
}

pub async fn detect_installations() -> Vec<JavaInstallation> {
    tokio::task::spawn_blocking(detect_installations_sync)
        .await
        .unwrap_or_default()
}

/// Newest installation with `major` or above; exact majors win.
pub async fn find_java_binary(major: u32) -> LauncherResult<PathBuf> {
    let installations = detect_installations().await;

    if let Some(exact) = installations.iter().find(|java| java.major == major) {
        info!("Using Java {} at {:?}", exact.major, exact.path);
        return Ok(exact.path.clone());
    }

    let mut compatible: Vec<&JavaInstallation> = installations
        .iter()
        .filter(|java| java.major >= major)
        .collect();
    compatible.sort_by_key(|java| java.major);

    match compatible.first() {
        Some(java) => {
            warn!(
                "Exact Java {} not found, using Java {} at {:?}",
                major, java.major, java.path
            );
            Ok(java.path.clone())
        }
        None => Err(LauncherError::Config(format!(
            "No Java {} (or newer) installation found",
            major
        ))),
    }
}

fn java_binary_name() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

fn platform_roots() -> Vec<&'static Path> {
    if cfg!(windows) {
        vec![
            Path::new(r"C:\Program Files\Java"),
            Path::new(r"C:\Program Files\Eclipse Adoptium"),
            Path::new(r"C:\Program Files\Microsoft"),
        ]
    } else if cfg!(target_os = "macos") {
        vec![Path::new("/Library/Java/JavaVirtualMachines")]
    } else {
        vec![Path::new("/usr/lib/jvm"), Path::new("/usr/local/lib/jvm")]
    }
}

fn probe(binary: &Path) -> Option<JavaInstallation> {
    let output = Command::new(binary).arg("-version").output().ok()?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!("Probing {:?}: {}", binary, stderr.lines().next().unwrap_or(""));

    let version = parse_quoted_version(&stderr)?;
    let canonical = std::fs::canonicalize(binary).unwrap_or_else(|_| binary.to_path_buf());
    Some(JavaInstallation {
        path: canonical,
        major: parse_major(&version),
        version,
    })
}

/// `java -version` prints e.g. `openjdk version "17.0.8" 2023-07-18`.
fn parse_quoted_version(output: &str) -> Option<String> {
    let line = output.lines().next()?;
    let start = line.find('"')?;
    let end = line[start + 1..].find('"')?;
    Some(line[start + 1..start + 1 + end].to_string())
}

/// `1.8.0_372` is major 8; everything modern leads with the major.
fn parse_major(version: &str) -> u32 {
    let mut parts = version.split(['.', '_', '+']);
    match parts.next().and_then(|p| p.parse::<u32>().ok()) {
        Some(1) => parts.next().and_then(|p| p.parse().ok()).unwrap_or(8),
        Some(major) => major,
        None => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modern_version_line() {
        let output = "openjdk version \"17.0.8\" 2023-07-18\nOpenJDK Runtime Environment";
        assert_eq!(parse_quoted_version(output).as_deref(), Some("17.0.8"));
        assert_eq!(parse_major("17.0.8"), 17);
        assert_eq!(parse_major("21"), 21);
    }

    #[test]
    fn parses_legacy_version_scheme() {
        assert_eq!(parse_major("1.8.0_372"), 8);
    }
}
