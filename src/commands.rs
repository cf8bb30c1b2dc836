// ─── RPC Surface ───
// Every command the frontend can invoke. Names and argument shapes are
// contractual; the heavy lifting lives in `core::state`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::auth::microsoft::{self, DeviceCodePrompt};
use crate::core::curseforge::{self, CategoryInfo, ModpackInformation, SearchQuery};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::LogCategory;
use crate::core::instance::logs::read_log_file;
use crate::core::instance::model::{InstanceConfig, ModloaderType, Resolution};
use crate::core::loaders::{fabric, forge};
use crate::core::state::app_state::{poll_and_activate, AppState};

type StateHandle<'a> = tauri::State<'a, Arc<AppState>>;

// ─── Manifests ───

#[derive(Debug, Serialize)]
pub struct ManifestBundle {
    pub vanilla_versions: Vec<VanillaVersionEntry>,
    pub fabric_versions: Vec<String>,
    pub forge_versions: HashMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VanillaVersionEntry {
    pub version: String,
    pub released_date: String,
    pub version_type: String,
}

#[tauri::command]
pub async fn obtain_manifests(state: StateHandle<'_>) -> LauncherResult<ManifestBundle> {
    let index = state.manifest_index().await?;

    let vanilla_versions = index
        .versions
        .iter()
        .map(|entry| VanillaVersionEntry {
            version: entry.id.clone(),
            released_date: entry.release_time.clone(),
            version_type: entry.version_type.clone(),
        })
        .collect();

    let fabric_versions = fabric::loader_versions(&state.http).await?;
    let forge_versions = forge::version_index(&state.http).await?;

    Ok(ManifestBundle {
        vanilla_versions,
        fabric_versions,
        forge_versions,
    })
}

// ─── Instance creation ───

/// Creation form sent by the UI.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSettings {
    pub instance_name: String,
    pub vanilla_version: String,
    pub modloader_type: String,
    #[serde(default)]
    pub modloader_version: String,
    #[serde(default)]
    pub additional_jvm_arguments: String,
    #[serde(default)]
    pub java_path_override: String,
    #[serde(default)]
    pub resolution_width: Option<u32>,
    #[serde(default)]
    pub resolution_height: Option<u32>,
    #[serde(default)]
    pub start_window_maximized: bool,
    #[serde(default = "default_true")]
    pub record_playtime: bool,
    #[serde(default)]
    pub override_options_txt: bool,
    #[serde(default)]
    pub override_servers_dat: bool,
}

fn default_true() -> bool {
    true
}

impl InstanceSettings {
    fn into_config(self) -> InstanceConfig {
        let defaults = Resolution::default();
        InstanceConfig {
            instance_name: self.instance_name,
            vanilla_version: self.vanilla_version,
            modloader_type: ModloaderType::from_id(&self.modloader_type),
            modloader_version: self.modloader_version,
            jvm_path_override: if self.java_path_override.is_empty() {
                None
            } else {
                Some(PathBuf::from(self.java_path_override))
            },
            additional_jvm_arguments: self.additional_jvm_arguments,
            resolution: Resolution {
                width: self.resolution_width.unwrap_or(defaults.width),
                height: self.resolution_height.unwrap_or(defaults.height),
                maximized: self.start_window_maximized,
            },
            record_playtime: self.record_playtime,
            override_options_txt: self.override_options_txt,
            override_servers_dat: self.override_servers_dat,
            author: "You".into(),
            created_at: chrono::Utc::now(),
            playtime_seconds: 0,
        }
    }
}

#[tauri::command]
pub async fn obtain_version(
    state: StateHandle<'_>,
    settings: InstanceSettings,
) -> LauncherResult<()> {
    let config = settings.into_config();
    let instance_name = config.instance_name.clone();
    state.install_instance(config).await?;
    state.events.instance_done(&instance_name);
    Ok(())
}

#[tauri::command]
pub async fn import_zip(state: StateHandle<'_>, zip_path: String) -> LauncherResult<()> {
    let instance_name = state.import_modpack_zip(&PathBuf::from(zip_path)).await?;
    state.events.instance_done(&instance_name);
    Ok(())
}

// ─── Instances ───

#[tauri::command]
pub async fn load_instances(state: StateHandle<'_>) -> LauncherResult<Vec<InstanceConfig>> {
    state.catalog.list().await
}

#[tauri::command]
pub async fn launch_instance(
    state: StateHandle<'_>,
    instance_name: String,
) -> LauncherResult<()> {
    // The returned handle only matters to the headless CLI path; the UI
    // follows the event stream.
    let _watcher = state.launch_instance(&instance_name).await?;
    Ok(())
}

#[tauri::command]
pub async fn delete_instance(
    state: StateHandle<'_>,
    instance_name: String,
) -> LauncherResult<()> {
    if state.is_running(&instance_name).await {
        state.stop_instance(&instance_name).await;
    }
    state.catalog.delete(&instance_name).await
}

#[tauri::command]
pub async fn open_folder(state: StateHandle<'_>, instance_name: String) -> LauncherResult<()> {
    let folder = state.catalog.dirs(&instance_name).root().to_path_buf();
    if !folder.exists() {
        return Err(LauncherError::NotFound(format!(
            "instance {}",
            instance_name
        )));
    }

    #[cfg(target_os = "windows")]
    let status = std::process::Command::new("explorer").arg(&folder).status();

    #[cfg(target_os = "macos")]
    let status = std::process::Command::new("open").arg(&folder).status();

    #[cfg(all(unix, not(target_os = "macos")))]
    let status = std::process::Command::new("xdg-open").arg(&folder).status();

    status.map_err(LauncherError::io(folder))?;
    Ok(())
}

// ─── Logs ───

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub line: String,
    pub line_type: &'static str,
}

fn line_type(category: LogCategory) -> &'static str {
    match category {
        LogCategory::Info => "",
        LogCategory::Warn => "warning",
        LogCategory::Error => "error",
    }
}

#[tauri::command]
pub async fn get_logs(
    state: StateHandle<'_>,
) -> LauncherResult<HashMap<String, HashMap<String, Vec<String>>>> {
    let mut result = HashMap::new();

    for config in state.catalog.list().await? {
        let name = config.instance_name;
        let mut per_instance: HashMap<String, Vec<String>> = HashMap::new();

        if let Some(lines) = state.log_store.live_snapshot(&name).await {
            per_instance.insert(
                "running".to_string(),
                lines.into_iter().map(|line| line.text).collect(),
            );
        }

        for log_id in state.catalog.rotated_logs(&name).await? {
            let path = state.catalog.dirs(&name).logs_dir().join(&log_id);
            match read_log_file(&path).await {
                Ok(lines) => {
                    per_instance.insert(
                        log_id,
                        lines.into_iter().map(|line| line.text).collect(),
                    );
                }
                Err(read_error) => {
                    tracing::warn!("Unreadable log {:?}: {}", path, read_error)
                }
            }
        }

        result.insert(name, per_instance);
    }

    Ok(result)
}

#[tauri::command]
pub async fn read_log_lines(
    state: StateHandle<'_>,
    instance_name: String,
    log_name: String,
) -> LauncherResult<Vec<LogLine>> {
    let tagged = if log_name == "running" {
        state
            .log_store
            .live_snapshot(&instance_name)
            .await
            .ok_or_else(|| {
                LauncherError::NotFound(format!("{} is not running", instance_name))
            })?
    } else {
        let path = state.catalog.dirs(&instance_name).logs_dir().join(&log_name);
        state
            .log_store
            .read_sealed(&instance_name, &log_name, &path)
            .await?
    };

    Ok(tagged
        .into_iter()
        .map(|line| LogLine {
            line_type: line_type(line.kind),
            line: line.text,
        })
        .collect())
}

// ─── Screenshots ───

#[tauri::command]
pub async fn get_screenshots(
    state: StateHandle<'_>,
) -> LauncherResult<HashMap<String, Vec<String>>> {
    let mut result = HashMap::new();
    for config in state.catalog.list().await? {
        let shots = state.catalog.screenshots(&config.instance_name).await?;
        result.insert(
            config.instance_name,
            shots
                .into_iter()
                .map(|path| path.to_string_lossy().to_string())
                .collect(),
        );
    }
    Ok(result)
}

// ─── Accounts ───

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub uuid: String,
    pub name: String,
    pub skin_url: String,
}

#[derive(Debug, Serialize)]
pub struct AccountsView {
    pub active_account: Option<String>,
    pub accounts: HashMap<String, AccountSummary>,
}

#[tauri::command]
pub async fn get_accounts(state: StateHandle<'_>) -> LauncherResult<AccountsView> {
    let accounts = state.accounts.lock().await;
    let summaries = accounts
        .accounts()
        .iter()
        .map(|(uuid, account)| {
            (
                uuid.clone(),
                AccountSummary {
                    uuid: account.uuid.clone(),
                    name: account.name.clone(),
                    skin_url: account.skin_url.clone(),
                },
            )
        })
        .collect();

    Ok(AccountsView {
        active_account: accounts.active_uuid().map(str::to_string),
        accounts: summaries,
    })
}

#[tauri::command]
pub async fn start_authentication_flow(
    state: StateHandle<'_>,
) -> LauncherResult<DeviceCodePrompt> {
    let grant = microsoft::start_device_code_flow(&state.http).await?;
    let prompt = DeviceCodePrompt::from(&grant);
    state.remember_device_flow(grant).await;
    Ok(prompt)
}

#[tauri::command]
pub async fn poll_device_code_authentication(
    state: StateHandle<'_>,
    device_code: String,
) -> LauncherResult<()> {
    poll_and_activate(&state, &device_code).await?;
    info!("Device code authentication completed");
    Ok(())
}

#[tauri::command]
pub async fn login_to_account(state: StateHandle<'_>, uuid: String) -> LauncherResult<()> {
    state.accounts.lock().await.activate(&uuid)
}

#[tauri::command]
pub async fn get_account_skin(state: StateHandle<'_>) -> LauncherResult<String> {
    let accounts = state.accounts.lock().await;
    accounts
        .active_account()
        .map(|account| account.skin_url.clone())
        .ok_or_else(|| LauncherError::NotFound("active account".into()))
}

// ─── CurseForge ───

#[tauri::command]
pub async fn get_curseforge_categories(
    state: StateHandle<'_>,
) -> LauncherResult<Vec<CategoryInfo>> {
    curseforge::categories(&state.http).await
}

#[tauri::command]
pub async fn search_curseforge(
    state: StateHandle<'_>,
    query: SearchQuery,
) -> LauncherResult<Vec<ModpackInformation>> {
    curseforge::search_modpacks(&state.http, &query).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_settings_map_to_config() {
        let settings: InstanceSettings = serde_json::from_str(
            r#"{
                "instanceName": "Skyblock",
                "vanillaVersion": "1.20.1",
                "modloaderType": "fabric",
                "modloaderVersion": "0.14.21",
                "additionalJvmArguments": "-Xmx6G",
                "javaPathOverride": "",
                "resolutionWidth": 1920,
                "resolutionHeight": 1080,
                "startWindowMaximized": true,
                "recordPlaytime": true,
                "overrideOptionsTxt": false,
                "overrideServersDat": false
            }"#,
        )
        .unwrap();
        let config = settings.into_config();
        assert_eq!(config.instance_name, "Skyblock");
        assert_eq!(config.modloader_type, ModloaderType::Fabric);
        assert_eq!(config.resolution.width, 1920);
        assert!(config.resolution.maximized);
        assert!(config.jvm_path_override.is_none());
    }

    #[test]
    fn minimal_settings_use_defaults() {
        let settings: InstanceSettings = serde_json::from_str(
            r#"{
                "instanceName": "T",
                "vanillaVersion": "1.20.1",
                "modloaderType": "None"
            }"#,
        )
        .unwrap();
        let config = settings.into_config();
        assert_eq!(config.modloader_type, ModloaderType::None);
        assert_eq!(config.modloader_version, "");
        assert!(config.record_playtime);
    }

    #[test]
    fn log_line_types_match_the_contract() {
        assert_eq!(line_type(LogCategory::Info), "");
        assert_eq!(line_type(LogCategory::Warn), "warning");
        assert_eq!(line_type(LogCategory::Error), "error");
    }
}
