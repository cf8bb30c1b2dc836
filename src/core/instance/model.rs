use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Modloader overlaid on the vanilla profile. Serialized capitalized, the
/// way the frontend displays it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModloaderType {
    None,
    Fabric,
    Forge,
}

impl ModloaderType {
    pub fn from_id(id: &str) -> Self {
        match id.to_ascii_lowercase().as_str() {
            "fabric" => ModloaderType::Fabric,
            "forge" => ModloaderType::Forge,
            _ => ModloaderType::None,
        }
    }
}

impl std::fmt::Display for ModloaderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModloaderType::None => write!(f, "None"),
            ModloaderType::Fabric => write!(f, "Fabric"),
            ModloaderType::Forge => write!(f, "Forge"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub maximized: bool,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 854,
            height: 480,
            maximized: false,
        }
    }
}

/// Persisted as `instances/<name>/instance.json`. The instance name is
/// unique (case sensitive) and always equals the directory name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub instance_name: String,
    pub vanilla_version: String,
    pub modloader_type: ModloaderType,
    /// Empty string when `modloader_type` is `None`.
    pub modloader_version: String,
    #[serde(default)]
    pub jvm_path_override: Option<PathBuf>,
    #[serde(default)]
    pub additional_jvm_arguments: String,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_true")]
    pub record_playtime: bool,
    #[serde(default)]
    pub override_options_txt: bool,
    #[serde(default)]
    pub override_servers_dat: bool,
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub playtime_seconds: u64,
}

fn default_true() -> bool {
    true
}

/// Directory layout under one instance.
#[derive(Debug, Clone)]
pub struct InstanceDirs {
    root: PathBuf,
}

impl InstanceDirs {
    pub fn new(instance_dir: &Path) -> Self {
        Self {
            root: instance_dir.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("instance.json")
    }

    /// Game working directory (`.minecraft` equivalent).
    pub fn minecraft_dir(&self) -> PathBuf {
        self.root.join("minecraft")
    }

    /// Rebuilt at every launch.
    pub fn natives_dir(&self) -> PathBuf {
        self.root.join("natives")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn latest_log(&self) -> PathBuf {
        self.logs_dir().join("latest.log")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join("screenshots")
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.minecraft_dir().join("mods")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InstanceConfig {
        InstanceConfig {
            instance_name: "Skyblock 3".into(),
            vanilla_version: "1.20.1".into(),
            modloader_type: ModloaderType::Fabric,
            modloader_version: "0.14.21".into(),
            jvm_path_override: None,
            additional_jvm_arguments: "-Xmx4G".into(),
            resolution: Resolution {
                width: 1920,
                height: 1080,
                maximized: false,
            },
            record_playtime: true,
            override_options_txt: false,
            override_servers_dat: true,
            author: "Steve".into(),
            created_at: "2026-03-01T12:00:00Z".parse().unwrap(),
            playtime_seconds: 0,
        }
    }

    #[test]
    fn json_round_trip_is_identity() {
        let original = config();
        let json = serde_json::to_string_pretty(&original).unwrap();
        let restored: InstanceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn modloader_type_serializes_capitalized() {
        assert_eq!(
            serde_json::to_string(&ModloaderType::None).unwrap(),
            "\"None\""
        );
        assert_eq!(ModloaderType::from_id("FABRIC"), ModloaderType::Fabric);
        assert_eq!(ModloaderType::from_id(""), ModloaderType::None);
    }

    #[test]
    fn missing_optional_fields_get_defaults() {
        let json = r#"{
            "instance_name": "T",
            "vanilla_version": "1.20.1",
            "modloader_type": "None",
            "modloader_version": "",
            "author": "You",
            "created_at": "2026-03-01T12:00:00Z"
        }"#;
        let config: InstanceConfig = serde_json::from_str(json).unwrap();
        assert!(config.record_playtime);
        assert_eq!(config.resolution, Resolution::default());
        assert_eq!(config.playtime_seconds, 0);
    }
}
