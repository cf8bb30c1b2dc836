// ─── Launch Assembler ───
// Builds the final process invocation from the resolved profile, the
// instance configuration, and the active account: placeholder
// substitution, classpath ordering, and argument assembly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::downloader::plan::logging_config_path;
use crate::core::error::LauncherResult;
use crate::core::instance::model::{InstanceConfig, InstanceDirs};
use crate::core::paths::{LauncherPaths, LAUNCHER_NAME, LAUNCHER_VERSION};
use crate::core::version::descriptor::ArgToken;
use crate::core::version::resolver::ResolvedProfile;
use crate::core::version::rules::{self, RuleHost};

/// Token snapshot the child is launched with. Changing the active account
/// later does not affect already-running instances.
#[derive(Debug, Clone)]
pub struct LaunchAccount {
    pub name: String,
    /// Undashed, as the profile endpoint returns it.
    pub uuid: String,
    pub access_token: String,
    pub xuid: String,
}

pub struct LaunchInputs<'a> {
    pub paths: &'a LauncherPaths,
    pub config: &'a InstanceConfig,
    pub dirs: &'a InstanceDirs,
    pub profile: &'a ResolvedProfile,
    pub account: &'a LaunchAccount,
}

/// Assemble the full argument vector:
/// `<additional_jvm_arguments> <jvm_args> <main_class> <game_args>`.
pub fn assemble_command(inputs: &LaunchInputs<'_>) -> LauncherResult<Vec<String>> {
    let substitutions = build_substitution_map(inputs);
    let features = feature_set();
    let host = RuleHost::current();

    let mut arguments: Vec<String> = Vec::new();

    for extra in inputs.config.additional_jvm_arguments.split_whitespace() {
        arguments.push(extra.to_string());
    }

    push_tokens(
        &mut arguments,
        &inputs.profile.jvm_args,
        &substitutions,
        &features,
        &host,
    );

    // The log4j configuration argument carries its own `${path}` template.
    if let Some(logging) = &inputs.profile.logging {
        let config_path =
            logging_config_path(inputs.paths, &logging.file.sha1, &logging.file.id);
        arguments.push(
            logging
                .argument
                .replace("${path}", &path_str(&config_path)),
        );
    }

    arguments.push(inputs.profile.main_class.clone());

    push_tokens(
        &mut arguments,
        &inputs.profile.game_args,
        &substitutions,
        &features,
        &host,
    );

    debug!("Assembled {} arguments", arguments.len());
    Ok(arguments)
}

fn push_tokens(
    arguments: &mut Vec<String>,
    tokens: &[ArgToken],
    substitutions: &HashMap<&'static str, String>,
    features: &HashMap<String, bool>,
    host: &RuleHost,
) {
    for token in tokens {
        match token {
            ArgToken::Literal(template) => {
                push_substituted(arguments, template, substitutions);
            }
            ArgToken::Conditional { rules: conditions, values } => {
                if rules::evaluate(conditions, host, features) {
                    for template in values {
                        push_substituted(arguments, template, substitutions);
                    }
                }
            }
        }
    }
}

/// Substitute placeholders in one token. Unknown placeholders become the
/// empty string but keep the token; tokens that collapse to nothing are
/// dropped entirely.
fn push_substituted(
    arguments: &mut Vec<String>,
    template: &str,
    substitutions: &HashMap<&'static str, String>,
) {
    let substituted = substitute(template, substitutions);
    if substituted.is_empty() && !template.is_empty() {
        debug!("Dropping argument that collapsed to empty: {}", template);
        return;
    }
    arguments.push(substituted);
}

pub fn substitute(template: &str, substitutions: &HashMap<&'static str, String>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        match rest[start..].find('}') {
            Some(end_offset) => {
                let key = &rest[start + 2..start + end_offset];
                if let Some(value) = substitutions.get(key) {
                    output.push_str(value);
                }
                // Unknown placeholders substitute to "".
                rest = &rest[start + end_offset + 1..];
            }
            None => {
                // Unterminated placeholder, keep the raw text.
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}

fn build_substitution_map(inputs: &LaunchInputs<'_>) -> HashMap<&'static str, String> {
    let game_dir = inputs.dirs.minecraft_dir();
    let mut map: HashMap<&'static str, String> = HashMap::new();

    map.insert("auth_player_name", inputs.account.name.clone());
    map.insert("auth_uuid", inputs.account.uuid.clone());
    map.insert("auth_access_token", inputs.account.access_token.clone());
    map.insert("auth_xuid", inputs.account.xuid.clone());
    map.insert("auth_session", inputs.account.access_token.clone());
    map.insert("user_type", "msa".to_string());
    map.insert("user_properties", "{}".to_string());
    map.insert("clientid", String::new());

    map.insert("version_name", inputs.profile.version_id.clone());
    map.insert("version_type", inputs.profile.version_type.clone());
    map.insert("game_directory", path_str(&game_dir));
    map.insert("assets_root", path_str(&inputs.paths.assets_dir()));
    map.insert(
        "game_assets",
        path_str(&inputs.paths.assets_dir().join("virtual").join("legacy")),
    );
    map.insert("assets_index_name", inputs.profile.asset_index.id.clone());
    map.insert("natives_directory", path_str(&inputs.dirs.natives_dir()));
    map.insert("launcher_name", LAUNCHER_NAME.to_string());
    map.insert("launcher_version", LAUNCHER_VERSION.to_string());
    map.insert("classpath", build_classpath(inputs));
    map.insert("classpath_separator", classpath_separator().to_string());
    map.insert("library_directory", path_str(&inputs.paths.libraries_dir()));
    map.insert(
        "resolution_width",
        inputs.config.resolution.width.to_string(),
    );
    map.insert(
        "resolution_height",
        inputs.config.resolution.height.to_string(),
    );

    map
}

// The instance always carries a resolution, so the width/height argument
// group is always wanted.
fn feature_set() -> HashMap<String, bool> {
    HashMap::from([("has_custom_resolution".to_string(), true)])
}

/// Classpath entries in resolution order, client jar last. Duplicate
/// paths are dropped (overlays can pin a library the vanilla profile also
/// lists).
fn build_classpath(inputs: &LaunchInputs<'_>) -> String {
    let libraries_dir = inputs.paths.libraries_dir();
    let mut seen = std::collections::HashSet::new();
    let mut entries: Vec<String> = Vec::new();

    for library in inputs.profile.classpath_libraries() {
        let path = libraries_dir.join(&library.relative_path);
        if seen.insert(path.clone()) {
            entries.push(path_str(&path));
        }
    }
    entries.push(path_str(
        &inputs.paths.client_jar(&inputs.config.vanilla_version),
    ));

    entries.join(classpath_separator())
}

fn classpath_separator() -> &'static str {
    if cfg!(windows) {
        ";"
    } else {
        ":"
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// The JVM binary for this instance: explicit override first, otherwise
/// detection against the profile's java hint.
pub async fn select_java_binary(
    config: &InstanceConfig,
    profile: &ResolvedProfile,
) -> LauncherResult<PathBuf> {
    if let Some(override_path) = &config.jvm_path_override {
        if !override_path.as_os_str().is_empty() {
            return Ok(override_path.clone());
        }
    }
    crate::core::java::find_java_binary(profile.java_major.unwrap_or(8)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::model::{ModloaderType, Resolution};

    fn profile() -> ResolvedProfile {
        let descriptor: crate::core::version::descriptor::VersionDescriptor =
            serde_json::from_str(
                r#"{
                    "id": "1.20.1",
                    "type": "release",
                    "mainClass": "net.minecraft.client.main.Main",
                    "assetIndex": { "id": "5", "url": "u", "sha1": "s", "size": 1 },
                    "downloads": { "client": { "url": "u", "sha1": "s", "size": 1 } },
                    "arguments": {
                        "jvm": ["-Djava.library.path=${natives_directory}", "-cp", "${classpath}"],
                        "game": [
                            "--username", "${auth_player_name}",
                            "--uuid", "${auth_uuid}",
                            "--clientId", "${clientid}",
                            { "rules": [{ "action": "allow", "features": { "has_custom_resolution": true } }],
                              "value": ["--width", "${resolution_width}", "--height", "${resolution_height}"] }
                        ]
                    },
                    "libraries": [
                        {
                            "name": "org.ow2.asm:asm:9.3",
                            "downloads": {
                                "artifact": {
                                    "path": "org/ow2/asm/asm/9.3/asm-9.3.jar",
                                    "url": "https://libraries.minecraft.net/org/ow2/asm/asm/9.3/asm-9.3.jar",
                                    "sha1": "0",
                                    "size": 1
                                }
                            }
                        }
                    ]
                }"#,
            )
            .unwrap();
        crate::core::version::resolver::resolve(&descriptor, &RuleHost::current()).unwrap()
    }

    fn config() -> InstanceConfig {
        InstanceConfig {
            instance_name: "T".into(),
            vanilla_version: "1.20.1".into(),
            modloader_type: ModloaderType::None,
            modloader_version: String::new(),
            jvm_path_override: None,
            additional_jvm_arguments: "-Xmx4G -Xms1G".into(),
            resolution: Resolution {
                width: 1280,
                height: 720,
                maximized: false,
            },
            record_playtime: true,
            override_options_txt: false,
            override_servers_dat: false,
            author: "You".into(),
            created_at: chrono::Utc::now(),
            playtime_seconds: 0,
        }
    }

    fn account() -> LaunchAccount {
        LaunchAccount {
            name: "Steve".into(),
            uuid: "069a79f444e94726a5befca90e38aaf5".into(),
            access_token: "token".into(),
            xuid: "0".into(),
        }
    }

    #[test]
    fn substitution_handles_multiple_and_unknown_placeholders() {
        let map = HashMap::from([("a", "1".to_string()), ("b", "2".to_string())]);
        assert_eq!(substitute("${a}-${b}-${missing}", &map), "1-2-");
        assert_eq!(substitute("plain", &map), "plain");
        assert_eq!(substitute("${unterminated", &map), "${unterminated");
    }

    #[test]
    fn assembles_in_documented_order() {
        let paths = LauncherPaths::with_root("/data".into());
        let config = config();
        let dirs = InstanceDirs::new(Path::new("/data/instances/T"));
        let profile = profile();
        let account = account();

        let arguments = assemble_command(&LaunchInputs {
            paths: &paths,
            config: &config,
            dirs: &dirs,
            profile: &profile,
            account: &account,
        })
        .unwrap();

        // Additional jvm args lead.
        assert_eq!(arguments[0], "-Xmx4G");
        assert_eq!(arguments[1], "-Xms1G");

        let main_position = arguments
            .iter()
            .position(|arg| arg == "net.minecraft.client.main.Main")
            .unwrap();
        let username_position = arguments.iter().position(|arg| arg == "Steve").unwrap();
        let cp_position = arguments.iter().position(|arg| arg == "-cp").unwrap();
        assert!(cp_position < main_position);
        assert!(main_position < username_position);

        // Feature-gated resolution arguments made it through.
        assert!(arguments.contains(&"--width".to_string()));
        assert!(arguments.contains(&"1280".to_string()));
    }

    #[test]
    fn classpath_ends_with_client_jar() {
        let paths = LauncherPaths::with_root("/data".into());
        let config = config();
        let dirs = InstanceDirs::new(Path::new("/data/instances/T"));
        let profile = profile();
        let account = account();

        let arguments = assemble_command(&LaunchInputs {
            paths: &paths,
            config: &config,
            dirs: &dirs,
            profile: &profile,
            account: &account,
        })
        .unwrap();

        let cp_position = arguments.iter().position(|arg| arg == "-cp").unwrap();
        let classpath = &arguments[cp_position + 1];
        let entries: Vec<&str> = classpath.split(classpath_separator()).collect();
        assert!(entries.first().unwrap().ends_with("asm-9.3.jar"));
        assert!(entries.last().unwrap().ends_with("1.20.1.jar"));
    }

    #[test]
    fn empty_placeholder_keeps_flag_but_drops_empty_value() {
        let paths = LauncherPaths::with_root("/data".into());
        let config = config();
        let dirs = InstanceDirs::new(Path::new("/data/instances/T"));
        let profile = profile();
        let account = account();

        let arguments = assemble_command(&LaunchInputs {
            paths: &paths,
            config: &config,
            dirs: &dirs,
            profile: &profile,
            account: &account,
        })
        .unwrap();

        // `${clientid}` is empty: the flag stays, the value token is
        // dropped.
        assert!(arguments.contains(&"--clientId".to_string()));
        let clientid_position = arguments
            .iter()
            .position(|arg| arg == "--clientId")
            .unwrap();
        assert_ne!(arguments.get(clientid_position + 1), Some(&String::new()));
    }
}
