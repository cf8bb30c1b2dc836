mod commands;
mod core;

use std::sync::Arc;

use tauri::Manager;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::core::events::EventSink;
use crate::core::paths::{purge_launcher_logs, LauncherPaths};
use crate::core::state::AppState;

/// Console + rolling file logging. `DEBUG=1` raises the default filter.
fn init_tracing(paths: &LauncherPaths) {
    let default_filter = if std::env::var("DEBUG").as_deref() == Ok("1") {
        "debug"
    } else {
        "info,meridian_lib=debug"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let logs_dir = paths.launcher_logs_dir();
    let _ = std::fs::create_dir_all(&logs_dir);
    let _ = purge_launcher_logs(&logs_dir);

    let stamp = chrono::Utc::now()
        .format("%Y-%m-%dT%H-%M-%S")
        .to_string();
    let log_file = std::fs::File::create(logs_dir.join(format!("launcher_log_{}.log", stamp)));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match log_file {
        Ok(file) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
            .init(),
        Err(_) => registry.init(),
    }
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let paths = LauncherPaths::new();
    init_tracing(&paths);
    info!("Meridian launcher starting");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(move |app| {
            let events = EventSink::new(app.handle().clone());
            let state = AppState::with_paths(paths.clone(), events)?;
            app.manage(Arc::new(state));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::obtain_manifests,
            commands::obtain_version,
            commands::import_zip,
            commands::load_instances,
            commands::launch_instance,
            commands::delete_instance,
            commands::open_folder,
            commands::get_logs,
            commands::read_log_lines,
            commands::get_screenshots,
            commands::get_accounts,
            commands::start_authentication_flow,
            commands::poll_device_code_authentication,
            commands::login_to_account,
            commands::get_account_skin,
            commands::get_curseforge_categories,
            commands::search_curseforge,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| {
            if let tauri::RunEvent::Exit = event {
                info!("Launcher exiting, stopping running instances");
                if let Some(state) = app_handle.try_state::<Arc<AppState>>() {
                    tauri::async_runtime::block_on(state.shutdown_all());
                }
            }
        });
}

/// Headless launch for `--instance <name>`: no webview, events become
/// debug logs, and the process exits with the game's exit code.
pub async fn run_headless(instance_name: String) -> i32 {
    let paths = LauncherPaths::new();
    init_tracing(&paths);
    info!("Headless launch of '{}'", instance_name);

    let state = match AppState::with_paths(paths, EventSink::disabled()) {
        Ok(state) => Arc::new(state),
        Err(state_error) => {
            error!("Cannot initialize launcher state: {}", state_error);
            return 1;
        }
    };

    match state.launch_instance(&instance_name).await {
        Ok(watcher) => match watcher.await {
            Ok(Some(code)) => code,
            Ok(None) => 1,
            Err(join_error) => {
                error!("Supervisor task failed: {}", join_error);
                1
            }
        },
        Err(launch_error) => {
            error!("Launch failed: {}", launch_error);
            1
        }
    }
}
