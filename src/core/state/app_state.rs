// ─── Application State ───
// Wires every subsystem together and owns the orchestration flows behind
// the RPC surface: install, launch, import. Each shared concern sits
// behind its own lock so long launches never serialize unrelated commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::auth::microsoft::{self, DeviceCodeGrant};
use crate::core::auth::AccountManager;
use crate::core::curseforge;
use crate::core::downloader::{plan_profile_tasks, DownloadExecutor};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::EventSink;
use crate::core::http::build_http_client;
use crate::core::instance::model::{InstanceConfig, ModloaderType};
use crate::core::instance::{InstanceCatalog, LogStore};
use crate::core::launch::assembler::{self, LaunchAccount, LaunchInputs};
use crate::core::launch::supervisor::{spawn_supervised, RunningInstance};
use crate::core::loaders::{self, forge, OverlayContext};
use crate::core::natives;
use crate::core::paths::LauncherPaths;
use crate::core::version::manifest::VersionManifestIndex;
use crate::core::version::resolver::ResolvedProfile;

/// Entry in the single-writer lock table. Present from the moment a launch
/// is admitted until its supervisor finishes.
struct RunningEntry {
    pid: Option<u32>,
    shutdown: Option<watch::Sender<bool>>,
}

pub struct AppState {
    pub paths: LauncherPaths,
    pub http: reqwest::Client,
    pub events: EventSink,
    pub catalog: InstanceCatalog,
    pub log_store: Arc<LogStore>,
    pub accounts: Mutex<AccountManager>,
    /// The vanilla manifest index is fetched once per launcher session.
    manifest_cache: RwLock<Option<Arc<VersionManifestIndex>>>,
    /// Device-code grants waiting for the user to finish the web flow.
    pending_device_flows: Mutex<HashMap<String, DeviceCodeGrant>>,
    running: Mutex<HashMap<String, RunningEntry>>,
}

impl AppState {
    pub fn with_paths(paths: LauncherPaths, events: EventSink) -> LauncherResult<Self> {
        paths.ensure_base_dirs()?;
        let http = build_http_client()?;
        let catalog = InstanceCatalog::new(paths.instances_dir());
        let accounts = Mutex::new(AccountManager::load(paths.accounts_file()));

        Ok(Self {
            http,
            events,
            catalog,
            log_store: Arc::new(LogStore::new()),
            accounts,
            manifest_cache: RwLock::new(None),
            pending_device_flows: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            paths,
        })
    }

    // ─── Manifests ───

    pub async fn manifest_index(&self) -> LauncherResult<Arc<VersionManifestIndex>> {
        if let Some(cached) = self.manifest_cache.read().await.as_ref() {
            return Ok(Arc::clone(cached));
        }

        let mut slot = self.manifest_cache.write().await;
        // Another task may have won the race while we waited.
        if let Some(cached) = slot.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let index = Arc::new(VersionManifestIndex::fetch(&self.http).await?);
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    // ─── Device code flows ───

    pub async fn remember_device_flow(&self, grant: DeviceCodeGrant) {
        self.pending_device_flows
            .lock()
            .await
            .insert(grant.device_code.clone(), grant);
    }

    pub async fn take_device_flow(&self, device_code: &str) -> Option<DeviceCodeGrant> {
        self.pending_device_flows.lock().await.remove(device_code)
    }

    // ─── Install ───

    /// Resolve, download, and register a new instance. Emits `new-instance`
    /// on success; the caller decides about `instance-done`.
    pub async fn install_instance(&self, config: InstanceConfig) -> LauncherResult<()> {
        if self.catalog.dirs(&config.instance_name).root().exists() {
            return Err(LauncherError::AlreadyExists(config.instance_name.clone()));
        }

        let profile = self.resolve_for(&config).await?;
        self.download_profile(&profile, &config.vanilla_version)
            .await?;
        self.run_forge_processors_if_needed(&config, &profile)
            .await?;

        self.catalog.create(&config).await?;
        self.events.new_instance(&config.instance_name);
        info!("Instance '{}' installed", config.instance_name);
        Ok(())
    }

    async fn resolve_for(&self, config: &InstanceConfig) -> LauncherResult<ResolvedProfile> {
        let index = self.manifest_index().await?;
        let ctx = OverlayContext {
            client: &self.http,
            paths: &self.paths,
        };
        loaders::resolve_profile(
            &ctx,
            &index,
            &config.vanilla_version,
            config.modloader_type,
            &config.modloader_version,
        )
        .await
    }

    async fn download_profile(
        &self,
        profile: &ResolvedProfile,
        vanilla_id: &str,
    ) -> LauncherResult<()> {
        let tasks = plan_profile_tasks(&self.http, &self.paths, profile, vanilla_id).await?;
        DownloadExecutor::new(self.http.clone(), self.events.clone())
            .execute(tasks)
            .await
    }

    async fn run_forge_processors_if_needed(
        &self,
        config: &InstanceConfig,
        profile: &ResolvedProfile,
    ) -> LauncherResult<()> {
        if config.modloader_type != ModloaderType::Forge {
            return Ok(());
        }
        let java_bin = assembler::select_java_binary(config, profile).await?;
        forge::run_install_processors(
            &self.http,
            &self.paths,
            &config.vanilla_version,
            &config.modloader_version,
            &java_bin,
        )
        .await
    }

    // ─── Launch ───

    /// Full launch pipeline. Returns a handle resolving to the exit code;
    /// the event stream carries everything the UI needs.
    pub async fn launch_instance(
        self: &Arc<Self>,
        instance_name: &str,
    ) -> LauncherResult<JoinHandle<Option<i32>>> {
        let config = self.catalog.load(instance_name).await?;

        // Single writer per instance: admit or reject now, fill in the
        // process details after the spawn.
        {
            let mut running = self.running.lock().await;
            if running.contains_key(instance_name) {
                return Err(LauncherError::AlreadyRunning(instance_name.to_string()));
            }
            running.insert(
                instance_name.to_string(),
                RunningEntry {
                    pid: None,
                    shutdown: None,
                },
            );
        }

        match self.launch_admitted(&config).await {
            Ok(handle) => Ok(handle),
            Err(launch_error) => {
                self.running.lock().await.remove(instance_name);
                if let LauncherError::Auth(auth_error) = &launch_error {
                    self.events
                        .authentication_error(auth_error.kind(), auth_error.to_string());
                }
                Err(launch_error)
            }
        }
    }

    async fn launch_admitted(
        self: &Arc<Self>,
        config: &InstanceConfig,
    ) -> LauncherResult<JoinHandle<Option<i32>>> {
        // Token refresh comes first: no file work happens for a dead
        // session.
        let account = self.fresh_launch_account().await?;

        let profile = self.resolve_for(config).await?;
        self.download_profile(&profile, &config.vanilla_version)
            .await?;
        self.run_forge_processors_if_needed(config, &profile).await?;

        let dirs = self.catalog.dirs(&config.instance_name);
        natives::extract_natives(
            &dirs.natives_dir(),
            &self.paths.libraries_dir(),
            profile.native_libraries().cloned().collect(),
        )
        .await?;

        let java_bin = assembler::select_java_binary(config, &profile).await?;
        let arguments = assembler::assemble_command(&LaunchInputs {
            paths: &self.paths,
            config,
            dirs: &dirs,
            profile: &profile,
            account: &account,
        })?;

        let RunningInstance {
            instance_name,
            pid,
            shutdown,
            done,
        } = spawn_supervised(
            self.events.clone(),
            Arc::clone(&self.log_store),
            dirs,
            config.instance_name.clone(),
            java_bin,
            arguments,
        )
        .await?;

        if let Some(entry) = self.running.lock().await.get_mut(&instance_name) {
            entry.pid = pid;
            entry.shutdown = Some(shutdown);
        }

        let state = Arc::clone(self);
        let started_at = Instant::now();
        let record_playtime = config.record_playtime;
        let watcher = tokio::spawn(async move {
            let exit_code = done.await.ok().flatten();
            state.running.lock().await.remove(&instance_name);

            if record_playtime {
                let played = started_at.elapsed().as_secs();
                match state.catalog.load(&instance_name).await {
                    Ok(mut persisted) => {
                        persisted.playtime_seconds += played;
                        if let Err(save_error) = state.catalog.save(&persisted).await {
                            error!("Cannot persist playtime: {}", save_error);
                        }
                    }
                    Err(load_error) => {
                        warn!("Instance vanished while running: {}", load_error)
                    }
                }
            }
            exit_code
        });

        Ok(watcher)
    }

    /// Snapshot of the active account's tokens, refreshed if stale.
    async fn fresh_launch_account(&self) -> LauncherResult<LaunchAccount> {
        let mut accounts = self.accounts.lock().await;
        let active_uuid = accounts
            .active_uuid()
            .map(str::to_string)
            .ok_or_else(|| LauncherError::Config("No active account, sign in first".into()))?;

        let (account, session) = accounts.ensure_fresh(&self.http, &active_uuid).await?;
        Ok(LaunchAccount {
            name: account.name,
            uuid: account.uuid,
            access_token: session.minecraft_access_token,
            xuid: session.xbox_uhs,
        })
    }

    pub async fn is_running(&self, instance_name: &str) -> bool {
        self.running.lock().await.contains_key(instance_name)
    }

    /// Terminate a running child, e.g. before deleting its instance.
    pub async fn stop_instance(&self, instance_name: &str) {
        let running = self.running.lock().await;
        if let Some(entry) = running.get(instance_name) {
            if let Some(shutdown) = &entry.shutdown {
                let _ = shutdown.send(true);
            }
        }
    }

    /// Launcher shutdown: ask every child to terminate.
    pub async fn shutdown_all(&self) {
        let running = self.running.lock().await;
        for (name, entry) in running.iter() {
            info!("Shutting down '{}' (pid {:?})", name, entry.pid);
            if let Some(shutdown) = &entry.shutdown {
                let _ = shutdown.send(true);
            }
        }
    }

    // ─── Modpack import ───

    /// Import a CurseForge modpack zip: create the instance, copy the
    /// overrides, and download the pack's mods.
    pub async fn import_modpack_zip(&self, zip_path: &std::path::Path) -> LauncherResult<String> {
        let manifest = curseforge::read_modpack_manifest(zip_path).await?;

        let (modloader_type, modloader_version) = match manifest.primary_modloader() {
            Some((kind, version)) => (ModloaderType::from_id(&kind), version),
            None => (ModloaderType::None, String::new()),
        };

        let config = InstanceConfig {
            instance_name: manifest.name.clone(),
            vanilla_version: manifest.minecraft.version.clone(),
            modloader_type,
            modloader_version,
            jvm_path_override: None,
            additional_jvm_arguments: String::new(),
            resolution: Default::default(),
            record_playtime: true,
            override_options_txt: false,
            override_servers_dat: false,
            author: if manifest.author.is_empty() {
                "Imported".to_string()
            } else {
                manifest.author.clone()
            },
            created_at: chrono::Utc::now(),
            playtime_seconds: 0,
        };

        self.install_instance(config).await?;

        let dirs = self.catalog.dirs(&manifest.name);
        curseforge::extract_overrides(zip_path, &manifest.overrides, &dirs.minecraft_dir())
            .await?;

        let mod_tasks =
            curseforge::plan_mod_downloads(&self.http, &manifest.files, &dirs.mods_dir()).await?;
        DownloadExecutor::new(self.http.clone(), self.events.clone())
            .execute(mod_tasks)
            .await?;

        Ok(manifest.name)
    }
}

// Device-code authentication spans two commands; the flow itself lives in
// `auth::microsoft`, the pending-grant bookkeeping above.
pub async fn poll_and_activate(
    state: &AppState,
    device_code: &str,
) -> LauncherResult<()> {
    let (interval, expires_in) = match state.take_device_flow(device_code).await {
        Some(grant) => (grant.interval, grant.expires_in),
        // Grant unknown (e.g. launcher restarted mid-flow): poll with the
        // endpoint defaults.
        None => (5, 900),
    };

    let account =
        microsoft::poll_device_code(&state.http, device_code, interval, expires_in).await?;
    state.accounts.lock().await.add_and_activate(account).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::model::Resolution;

    fn test_state() -> Arc<AppState> {
        let tmp = tempdir::TempDir::new("state").unwrap();
        let paths = LauncherPaths::with_root(tmp.into_path());
        Arc::new(AppState::with_paths(paths, EventSink::disabled()).unwrap())
    }

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

    #[tokio::test]
    async fn second_launch_of_same_instance_is_rejected() {
        let state = test_state();
        state.catalog.create(&config("T")).await.unwrap();

        // Simulate an admitted launch holding the slot.
        state.running.lock().await.insert(
            "T".into(),
            RunningEntry {
                pid: Some(1),
                shutdown: None,
            },
        );

        let second = state.launch_instance("T").await;
        assert!(matches!(second, Err(LauncherError::AlreadyRunning(_))));

        // The original reservation is untouched.
        assert!(state.is_running("T").await);
    }

    #[tokio::test]
    async fn launch_without_account_fails_before_any_spawn() {
        let state = test_state();
        state.catalog.create(&config("T")).await.unwrap();

        let result = state.launch_instance("T").await;
        assert!(matches!(result, Err(LauncherError::Config(_))));
        // The failed launch released its reservation.
        assert!(!state.is_running("T").await);
    }

    #[tokio::test]
    async fn launch_of_unknown_instance_is_not_found() {
        let state = test_state();
        let result = state.launch_instance("missing").await;
        assert!(matches!(result, Err(LauncherError::NotFound(_))));
    }

    #[tokio::test]
    async fn device_flow_grants_are_single_use() {
        let state = test_state();
        let grant: DeviceCodeGrant = serde_json::from_str(
            r#"{
                "user_code": "ABCD",
                "device_code": "DEV-1",
                "verification_uri": "https://microsoft.com/link",
                "expires_in": 900,
                "interval": 5,
                "message": "enter ABCD"
            }"#,
        )
        .unwrap();

        state.remember_device_flow(grant).await;
        assert!(state.take_device_flow("DEV-1").await.is_some());
        assert!(state.take_device_flow("DEV-1").await.is_none());
    }
}
