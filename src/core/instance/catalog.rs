// ─── Instance Catalog ───
// On-disk directory of instance configurations under `instances/`.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::error::{LauncherError, LauncherResult};

use super::model::{InstanceConfig, InstanceDirs};

pub struct InstanceCatalog {
    instances_dir: PathBuf,
}

impl InstanceCatalog {
    pub fn new(instances_dir: PathBuf) -> Self {
        Self { instances_dir }
    }

    pub fn dirs(&self, instance_name: &str) -> InstanceDirs {
        InstanceDirs::new(&self.instances_dir.join(instance_name))
    }

    /// Create the instance directory skeleton and persist `instance.json`.
    pub async fn create(&self, config: &InstanceConfig) -> LauncherResult<InstanceDirs> {
        let dirs = self.dirs(&config.instance_name);
        if dirs.root().exists() {
            return Err(LauncherError::AlreadyExists(config.instance_name.clone()));
        }

        for dir in [
            dirs.minecraft_dir(),
            dirs.natives_dir(),
            dirs.logs_dir(),
            dirs.screenshots_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(LauncherError::io(dir))?;
        }

        self.save(config).await?;
        info!("Created instance '{}'", config.instance_name);
        Ok(dirs)
    }

    pub async fn save(&self, config: &InstanceConfig) -> LauncherResult<()> {
        let path = self.dirs(&config.instance_name).config_file();
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(LauncherError::io(path))?;
        Ok(())
    }

    pub async fn load(&self, instance_name: &str) -> LauncherResult<InstanceConfig> {
        let path = self.dirs(instance_name).config_file();
        if !path.exists() {
            return Err(LauncherError::NotFound(format!(
                "instance {}",
                instance_name
            )));
        }
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(LauncherError::io(path.clone()))?;
        let config: InstanceConfig =
            serde_json::from_str(&json).map_err(|source| LauncherError::Schema {
                context: format!("{:?}", path),
                source,
            })?;
        Ok(config)
    }

    /// All parseable instances, sorted by name with numeric-aware collation.
    pub async fn list(&self) -> LauncherResult<Vec<InstanceConfig>> {
        let mut instances = Vec::new();
        if !self.instances_dir.exists() {
            return Ok(instances);
        }

        let mut entries = tokio::fs::read_dir(&self.instances_dir)
            .await
            .map_err(LauncherError::io(self.instances_dir.clone()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(LauncherError::io(self.instances_dir.clone()))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match self.load(&name).await {
                Ok(config) => instances.push(config),
                Err(error) => warn!("Skipping unreadable instance {:?}: {}", path, error),
            }
        }

        instances.sort_by(|a, b| natural_compare(&a.instance_name, &b.instance_name));
        Ok(instances)
    }

    pub async fn delete(&self, instance_name: &str) -> LauncherResult<()> {
        let dirs = self.dirs(instance_name);
        if !dirs.root().exists() {
            return Err(LauncherError::NotFound(format!(
                "instance {}",
                instance_name
            )));
        }
        tokio::fs::remove_dir_all(dirs.root())
            .await
            .map_err(LauncherError::io(dirs.root().to_path_buf()))?;
        info!("Deleted instance '{}'", instance_name);
        Ok(())
    }

    /// `.png` files under `screenshots/`, newest first. Screenshot names
    /// are timestamp-prefixed so reverse lexicographic order is reverse
    /// chronological.
    pub async fn screenshots(&self, instance_name: &str) -> LauncherResult<Vec<PathBuf>> {
        let dir = self.dirs(instance_name).screenshots_dir();
        let mut shots = Vec::new();
        if !dir.exists() {
            return Ok(shots);
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(LauncherError::io(dir.clone()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(LauncherError::io(dir.clone()))?
        {
            let path = entry.path();
            if path.extension().map(|ext| ext == "png").unwrap_or(false) {
                shots.push(path);
            }
        }

        shots.sort();
        shots.reverse();
        Ok(shots)
    }

    /// Basenames of rotated log files, newest first, excluding `latest.log`.
    pub async fn rotated_logs(&self, instance_name: &str) -> LauncherResult<Vec<String>> {
        let dir = self.dirs(instance_name).logs_dir();
        let mut logs = Vec::new();
        if !dir.exists() {
            return Ok(logs);
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(LauncherError::io(dir.clone()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(LauncherError::io(dir.clone()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".log") && name != "latest.log" {
                logs.push(name);
            }
        }

        logs.sort();
        logs.reverse();
        Ok(logs)
    }
}

/// Numeric-aware string comparison: `Minecraft 2` sorts before
/// `Minecraft 10`.
pub fn natural_compare(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(lc), Some(rc)) => {
                if lc.is_ascii_digit() && rc.is_ascii_digit() {
                    let lnum = take_number(&mut left);
                    let rnum = take_number(&mut right);
                    match lnum.cmp(&rnum) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                } else {
                    match lc.cmp(&rc) {
                        Ordering::Equal => {
                            left.next();
                            right.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars>) -> u128 {
    let mut value: u128 = 0;
    while let Some(c) = chars.peek() {
        match c.to_digit(10) {
            Some(digit) => {
                value = value.saturating_mul(10).saturating_add(digit as u128);
                chars.next();
            }
            None => break,
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::model::{ModloaderType, Resolution};

    fn config(name: &str) -> InstanceConfig {
        InstanceConfig {
            instance_name: name.into(),
            vanilla_version: "1.20.1".into(),
            modloader_type: ModloaderType::None,
            modloader_version: String::new(),
            jvm_path_override: None,
            additional_jvm_arguments: String::new(),
            resolution: Resolution::default(),
            record_playtime: true,
            override_options_txt: false,
            override_servers_dat: false,
            author: "You".into(),
            created_at: chrono::Utc::now(),
            playtime_seconds: 0,
        }
    }

    #[test]
    fn natural_order_beats_lexicographic() {
        let mut names = vec!["Minecraft 10", "Minecraft 2", "Alpha", "minecraft 1"];
        names.sort_by(|a, b| natural_compare(a, b));
        assert_eq!(names, vec!["Alpha", "Minecraft 2", "Minecraft 10", "minecraft 1"]);
    }

    #[test]
    fn equal_numbers_fall_through_to_suffix() {
        assert_eq!(natural_compare("v2a", "v2b"), Ordering::Less);
        assert_eq!(natural_compare("v02", "v2"), Ordering::Equal);
    }

    #[tokio::test]
    async fn create_then_list_contains_exactly_one_entry() {
        let tmp = tempdir::TempDir::new("catalog").unwrap();
        let catalog = InstanceCatalog::new(tmp.path().join("instances"));
        tokio::fs::create_dir_all(tmp.path().join("instances"))
            .await
            .unwrap();

        catalog.create(&config("T")).await.unwrap();
        let listed = catalog.list().await.unwrap();
        assert_eq!(
            listed
                .iter()
                .filter(|entry| entry.instance_name == "T")
                .count(),
            1
        );

        // The skeleton exists.
        let dirs = catalog.dirs("T");
        assert!(dirs.minecraft_dir().is_dir());
        assert!(dirs.logs_dir().is_dir());
        assert!(dirs.screenshots_dir().is_dir());
        assert!(dirs.natives_dir().is_dir());
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let tmp = tempdir::TempDir::new("catalog").unwrap();
        let catalog = InstanceCatalog::new(tmp.path().join("instances"));
        tokio::fs::create_dir_all(tmp.path().join("instances"))
            .await
            .unwrap();

        catalog.create(&config("T")).await.unwrap();
        assert!(matches!(
            catalog.create(&config("T")).await,
            Err(LauncherError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn screenshots_sort_descending() {
        let tmp = tempdir::TempDir::new("catalog").unwrap();
        let catalog = InstanceCatalog::new(tmp.path().join("instances"));
        tokio::fs::create_dir_all(tmp.path().join("instances"))
            .await
            .unwrap();
        catalog.create(&config("T")).await.unwrap();

        let shots_dir = catalog.dirs("T").screenshots_dir();
        for name in ["2026-01-01_10.00.00.png", "2026-02-01_10.00.00.png", "note.txt"] {
            tokio::fs::write(shots_dir.join(name), b"").await.unwrap();
        }

        let shots = catalog.screenshots("T").await.unwrap();
        assert_eq!(shots.len(), 2);
        assert!(shots[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("2026-02-01"));
    }
}
