// ─── Forge Overlay ───
// Forge ships an installer jar containing the launch profile
// (`version.json`) plus an install profile with processor steps that
// patch the client jar. Processors run exactly once per
// (vanilla, forge_version); their outputs are cached under the Forge
// cache directory.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::core::downloader::{DownloadExecutor, FetchRole, FetchTask};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::EventSink;
use crate::core::http;
use crate::core::maven::{MavenArtifact, FORGE_MAVEN};
use crate::core::paths::LauncherPaths;
use crate::core::version::descriptor::{LibraryEntry, VersionDescriptor};
use crate::core::version::resolver;

use super::{ModloaderOverlay, OverlayContext};

const INSTALLER_FILE: &str = "installer.jar";
const INSTALL_PROFILE_FILE: &str = "install_profile.json";
/// Marks a completed processor run.
const PROCESSED_MARKER: &str = ".processed";

// ─── Version index ───

#[derive(Debug, Deserialize)]
struct MavenMetadata {
    versioning: MavenVersioning,
}

#[derive(Debug, Deserialize)]
struct MavenVersioning {
    versions: MavenVersions,
}

#[derive(Debug, Deserialize)]
struct MavenVersions {
    #[serde(rename = "version", default)]
    version: Vec<String>,
}

/// The Forge Maven metadata lists every build as `<vanilla>-<forge>`;
/// group them per vanilla id for the manifest aggregation command.
pub async fn version_index(
    client: &reqwest::Client,
) -> LauncherResult<HashMap<String, Vec<String>>> {
    let url = format!("{}/net/minecraftforge/forge/maven-metadata.xml", FORGE_MAVEN);
    let xml = http::get_text(client, &url).await?;
    let metadata: MavenMetadata =
        quick_xml::de::from_str(&xml).map_err(|error| LauncherError::XmlSchema {
            context: url.clone(),
            detail: error.to_string(),
        })?;

    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for combined in metadata.versioning.versions.version {
        if let Some((vanilla, forge)) = combined.split_once('-') {
            grouped
                .entry(vanilla.to_string())
                .or_default()
                .push(forge.to_string());
        }
    }
    Ok(grouped)
}

// ─── Install profile ───

#[derive(Debug, Deserialize)]
pub struct InstallProfile {
    #[serde(default)]
    pub data: HashMap<String, SidedValue>,
    #[serde(default)]
    pub processors: Vec<ProcessorSpec>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SidedValue {
    pub client: String,
    #[allow(dead_code)]
    #[serde(default)]
    pub server: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessorSpec {
    #[serde(default)]
    pub sides: Option<Vec<String>>,
    pub jar: String,
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub outputs: Option<HashMap<String, String>>,
}

impl ProcessorSpec {
    fn runs_on_client(&self) -> bool {
        match &self.sides {
            Some(sides) => sides.iter().any(|side| side == "client"),
            None => true,
        }
    }
}

// ─── Overlay ───

pub struct ForgeOverlay;

#[async_trait]
impl ModloaderOverlay for ForgeOverlay {
    async fn overlay_descriptor(
        &self,
        ctx: &OverlayContext<'_>,
        vanilla: &VersionDescriptor,
        loader_version: &str,
    ) -> LauncherResult<VersionDescriptor> {
        let cache_dir = ctx.paths.forge_cache_dir(&vanilla.id, loader_version);
        let installer_path = cache_dir.join(INSTALLER_FILE);

        if !installer_path.exists() {
            download_installer(ctx, vanilla, loader_version, &installer_path).await?;
        }

        let (profile_raw, version_raw) = extract_installer_metadata(&installer_path).await?;

        // The install profile is needed again by the processor run.
        tokio::fs::write(cache_dir.join(INSTALL_PROFILE_FILE), &profile_raw)
            .await
            .map_err(LauncherError::io(cache_dir.join(INSTALL_PROFILE_FILE)))?;

        let descriptor = resolver::parse_descriptor(&version_raw, "forge version.json")?;
        resolver::cache_descriptor_json(&ctx.paths.version_json(&descriptor.id), version_raw.as_bytes())
            .await?;

        Ok(descriptor)
    }
}

async fn download_installer(
    ctx: &OverlayContext<'_>,
    vanilla: &VersionDescriptor,
    loader_version: &str,
    installer_path: &Path,
) -> LauncherResult<()> {
    let forge_id = format!("{}-{}", vanilla.id, loader_version);
    let url = format!(
        "{}/net/minecraftforge/forge/{}/forge-{}-installer.jar",
        FORGE_MAVEN, forge_id, forge_id
    );
    info!("Downloading Forge installer {}", forge_id);

    let executor = DownloadExecutor::new(ctx.client.clone(), EventSink::disabled());
    let result = executor
        .execute(vec![FetchTask {
            url,
            destination: installer_path.to_path_buf(),
            expected_sha1: None,
            expected_size: None,
            role: FetchRole::Library,
        }])
        .await;

    match result {
        Ok(()) => Ok(()),
        // An unknown build 404s on the Forge Maven.
        Err(LauncherError::Network { status: 404, .. }) => {
            Err(LauncherError::ModloaderUnsupported {
                loader: "Forge".into(),
                loader_version: loader_version.into(),
                vanilla: vanilla.id.clone(),
            })
        }
        Err(other) => Err(other),
    }
}

/// Pull `install_profile.json` and `version.json` out of the installer.
async fn extract_installer_metadata(installer_path: &Path) -> LauncherResult<(String, String)> {
    let path = installer_path.to_path_buf();
    tokio::task::spawn_blocking(move || -> LauncherResult<(String, String)> {
        let file = std::fs::File::open(&path).map_err(LauncherError::io(path.clone()))?;
        let mut archive = zip::ZipArchive::new(file)?;

        let mut profile_raw = String::new();
        archive
            .by_name(INSTALL_PROFILE_FILE)?
            .read_to_string(&mut profile_raw)
            .map_err(LauncherError::io(path.clone()))?;

        let mut version_raw = String::new();
        archive
            .by_name("version.json")?
            .read_to_string(&mut version_raw)
            .map_err(LauncherError::io(path.clone()))?;

        Ok((profile_raw, version_raw))
    })
    .await
    .map_err(|join| LauncherError::Child(format!("installer extraction panicked: {}", join)))?
}

// ─── Install processors ───

/// Run the install processors for `(vanilla_id, forge_version)` unless the
/// marker shows a previous successful run. Called after the profile's
/// downloads completed.
pub async fn run_install_processors(
    client: &reqwest::Client,
    paths: &LauncherPaths,
    vanilla_id: &str,
    forge_version: &str,
    java_bin: &Path,
) -> LauncherResult<()> {
    let cache_dir = paths.forge_cache_dir(vanilla_id, forge_version);
    let marker = cache_dir.join(PROCESSED_MARKER);
    if marker.exists() {
        debug!("Forge processors already ran for {}-{}", vanilla_id, forge_version);
        return Ok(());
    }

    let profile_path = cache_dir.join(INSTALL_PROFILE_FILE);
    let profile_raw = tokio::fs::read_to_string(&profile_path)
        .await
        .map_err(LauncherError::io(profile_path.clone()))?;
    let profile: InstallProfile =
        serde_json::from_str(&profile_raw).map_err(|source| LauncherError::Schema {
            context: format!("{:?}", profile_path),
            source,
        })?;

    let installer_path = cache_dir.join(INSTALLER_FILE);

    fetch_processor_libraries(client, paths, &profile, &installer_path).await?;

    let data = build_data_map(paths, &profile, &cache_dir, &installer_path, vanilla_id).await?;

    for (step, processor) in profile.processors.iter().enumerate() {
        if !processor.runs_on_client() {
            debug!("Skipping server-only processor {}", processor.jar);
            continue;
        }
        run_processor(paths, processor, step, &data, &cache_dir, java_bin).await?;
        validate_outputs(paths, processor, step, &data, &cache_dir)?;
    }

    tokio::fs::write(&marker, chrono::Utc::now().to_rfc3339())
        .await
        .map_err(LauncherError::io(marker))?;
    info!("Forge processors completed for {}-{}", vanilla_id, forge_version);
    Ok(())
}

/// Processor tooling comes from two places: regular downloads listed in
/// the install profile, and jars embedded in the installer under `maven/`.
async fn fetch_processor_libraries(
    client: &reqwest::Client,
    paths: &LauncherPaths,
    profile: &InstallProfile,
    installer_path: &Path,
) -> LauncherResult<()> {
    let mut tasks = Vec::new();
    for library in &profile.libraries {
        let Some(artifact) = library
            .downloads
            .as_ref()
            .and_then(|downloads| downloads.artifact.as_ref())
        else {
            continue;
        };
        if artifact.url.is_empty() {
            // Shipped inside the installer, extracted below.
            continue;
        }
        let coordinate = MavenArtifact::parse(&library.name)?;
        let relative = artifact
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| coordinate.relative_path());
        tasks.push(FetchTask {
            url: artifact.url.clone(),
            destination: paths.libraries_dir().join(relative),
            expected_sha1: Some(artifact.sha1.clone()),
            expected_size: Some(artifact.size),
            role: FetchRole::Library,
        });
    }

    info!("Fetching {} Forge processor libraries", tasks.len());
    DownloadExecutor::new(client.clone(), EventSink::disabled())
        .execute(tasks)
        .await?;

    extract_embedded_maven(installer_path, &paths.libraries_dir()).await
}

async fn extract_embedded_maven(
    installer_path: &Path,
    libraries_dir: &Path,
) -> LauncherResult<()> {
    let installer_path = installer_path.to_path_buf();
    let libraries_dir = libraries_dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> LauncherResult<()> {
        let file =
            std::fs::File::open(&installer_path).map_err(LauncherError::io(&installer_path))?;
        let mut archive = zip::ZipArchive::new(file)?;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let Some(name) = entry.enclosed_name().map(|p| p.to_owned()) else {
                continue;
            };
            let Ok(relative) = name.strip_prefix("maven") else {
                continue;
            };

            let destination = libraries_dir.join(relative);
            if destination.exists() {
                continue;
            }
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(LauncherError::io(parent.to_path_buf()))?;
            }
            let mut output =
                std::fs::File::create(&destination).map_err(LauncherError::io(&destination))?;
            std::io::copy(&mut entry, &mut output).map_err(LauncherError::io(&destination))?;
            debug!("Extracted embedded artifact {:?}", destination);
        }
        Ok(())
    })
    .await
    .map_err(|join| LauncherError::Child(format!("maven extraction panicked: {}", join)))?
}

/// Resolve the profile's `data` entries (client side) into literal
/// argument values.
async fn build_data_map(
    paths: &LauncherPaths,
    profile: &InstallProfile,
    cache_dir: &Path,
    installer_path: &Path,
    vanilla_id: &str,
) -> LauncherResult<HashMap<String, String>> {
    let mut data: HashMap<String, String> = HashMap::new();

    data.insert("SIDE".into(), "client".into());
    data.insert(
        "MINECRAFT_JAR".into(),
        paths.client_jar(vanilla_id).to_string_lossy().to_string(),
    );
    data.insert("MINECRAFT_VERSION".into(), vanilla_id.to_string());
    data.insert("ROOT".into(), cache_dir.to_string_lossy().to_string());
    data.insert(
        "INSTALLER".into(),
        installer_path.to_string_lossy().to_string(),
    );
    data.insert(
        "LIBRARY_DIR".into(),
        paths.libraries_dir().to_string_lossy().to_string(),
    );

    for (key, sided) in &profile.data {
        let value = &sided.client;
        let resolved = if let Some(coordinate) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            let artifact = MavenArtifact::parse(coordinate)?;
            paths
                .libraries_dir()
                .join(artifact.relative_path())
                .to_string_lossy()
                .to_string()
        } else if let Some(literal) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            literal.to_string()
        } else if let Some(embedded) = value.strip_prefix('/') {
            extract_installer_file(installer_path, embedded, cache_dir).await?
        } else {
            value.clone()
        };
        data.insert(key.clone(), resolved);
    }

    Ok(data)
}

/// Extract one embedded file (e.g. `data/client.lzma`) into the cache dir.
async fn extract_installer_file(
    installer_path: &Path,
    entry_name: &str,
    cache_dir: &Path,
) -> LauncherResult<String> {
    let installer_path = installer_path.to_path_buf();
    let destination = cache_dir.join(entry_name);
    let entry_name = entry_name.to_string();

    let destination_clone = destination.clone();
    tokio::task::spawn_blocking(move || -> LauncherResult<()> {
        let file =
            std::fs::File::open(&installer_path).map_err(LauncherError::io(&installer_path))?;
        let mut archive = zip::ZipArchive::new(file)?;
        let mut entry = archive.by_name(&entry_name)?;

        if let Some(parent) = destination_clone.parent() {
            std::fs::create_dir_all(parent).map_err(LauncherError::io(parent.to_path_buf()))?;
        }
        let mut output =
            std::fs::File::create(&destination_clone).map_err(LauncherError::io(&destination_clone))?;
        std::io::copy(&mut entry, &mut output).map_err(LauncherError::io(&destination_clone))?;
        Ok(())
    })
    .await
    .map_err(|join| LauncherError::Child(format!("data extraction panicked: {}", join)))??;

    Ok(destination.to_string_lossy().to_string())
}

async fn run_processor(
    paths: &LauncherPaths,
    processor: &ProcessorSpec,
    step: usize,
    data: &HashMap<String, String>,
    cache_dir: &Path,
    java_bin: &Path,
) -> LauncherResult<()> {
    let jar_artifact = MavenArtifact::parse(&processor.jar)?;
    let jar_path = paths.libraries_dir().join(jar_artifact.relative_path());

    let main_class = read_main_class(&jar_path).await?;

    let mut classpath: Vec<String> = vec![jar_path.to_string_lossy().to_string()];
    for entry in &processor.classpath {
        let artifact = MavenArtifact::parse(entry)?;
        classpath.push(
            paths
                .libraries_dir()
                .join(artifact.relative_path())
                .to_string_lossy()
                .to_string(),
        );
    }
    let separator = if cfg!(windows) { ";" } else { ":" };

    let mut arguments: Vec<String> = Vec::new();
    for arg in &processor.args {
        arguments.push(substitute_processor_token(paths, arg, data)?);
    }

    info!("Running Forge processor {} ({})", step, main_class);
    debug!("Processor args: {:?}", arguments);

    let mut command = std::process::Command::new(java_bin);
    command
        .arg("-cp")
        .arg(classpath.join(separator))
        .arg(&main_class)
        .args(&arguments)
        // Working directory pinned to the cache dir.
        .current_dir(cache_dir);

    let output = tokio::task::spawn_blocking(move || command.output())
        .await
        .map_err(|join| LauncherError::Child(format!("processor task panicked: {}", join)))?
        .map_err(|source| LauncherError::Child(format!("processor spawn failed: {}", source)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail_start = stderr.len().saturating_sub(800);
        return Err(LauncherError::InstallProcessor {
            step,
            exit_code: output.status.code(),
            stderr_tail: stderr[tail_start..].to_string(),
        });
    }
    Ok(())
}

/// Processor outputs may only land under the Forge cache dir or the
/// shared libraries tree.
fn validate_outputs(
    paths: &LauncherPaths,
    processor: &ProcessorSpec,
    step: usize,
    data: &HashMap<String, String>,
    cache_dir: &Path,
) -> LauncherResult<()> {
    let Some(outputs) = &processor.outputs else {
        return Ok(());
    };
    for key in outputs.keys() {
        let resolved = substitute_processor_token(paths, key, data)?;
        let output_path = PathBuf::from(&resolved);
        if !(output_path.starts_with(cache_dir) || output_path.starts_with(paths.libraries_dir()))
        {
            warn!("Processor {} declared an output outside its sandbox: {}", step, resolved);
            return Err(LauncherError::InstallProcessor {
                step,
                exit_code: None,
                stderr_tail: format!("output escapes the Forge cache: {}", resolved),
            });
        }
    }
    Ok(())
}

/// `[coordinate]` resolves to a library path, `{KEY}` to a data entry,
/// `'literal'` loses its quotes, everything else passes through.
fn substitute_processor_token(
    paths: &LauncherPaths,
    token: &str,
    data: &HashMap<String, String>,
) -> LauncherResult<String> {
    if let Some(coordinate) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let artifact = MavenArtifact::parse(coordinate)?;
        return Ok(paths
            .libraries_dir()
            .join(artifact.relative_path())
            .to_string_lossy()
            .to_string());
    }
    if let Some(key) = token.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        return Ok(data.get(key).cloned().unwrap_or_default());
    }
    if let Some(literal) = token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Ok(literal.to_string());
    }
    Ok(token.to_string())
}

/// `Main-Class` from the jar's own manifest.
async fn read_main_class(jar_path: &Path) -> LauncherResult<String> {
    let jar_path = jar_path.to_path_buf();
    tokio::task::spawn_blocking(move || -> LauncherResult<String> {
        let file = std::fs::File::open(&jar_path).map_err(LauncherError::io(&jar_path))?;
        let mut archive = zip::ZipArchive::new(file)?;
        let mut manifest = String::new();
        archive
            .by_name("META-INF/MANIFEST.MF")?
            .read_to_string(&mut manifest)
            .map_err(LauncherError::io(&jar_path))?;

        manifest
            .lines()
            .find_map(|line| line.strip_prefix("Main-Class:"))
            .map(|main_class| main_class.trim().to_string())
            .ok_or_else(|| {
                LauncherError::Config(format!("{:?} has no Main-Class in its manifest", jar_path))
            })
    })
    .await
    .map_err(|join| LauncherError::Child(format!("manifest read panicked: {}", join)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maven_metadata_groups_by_vanilla_version() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <metadata>
                <groupId>net.minecraftforge</groupId>
                <artifactId>forge</artifactId>
                <versioning>
                    <versions>
                        <version>1.20.1-47.1.0</version>
                        <version>1.20.1-47.2.0</version>
                        <version>1.19.4-45.1.0</version>
                    </versions>
                </versioning>
            </metadata>"#;
        let metadata: MavenMetadata = quick_xml::de::from_str(xml).unwrap();
        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for combined in metadata.versioning.versions.version {
            if let Some((vanilla, forge)) = combined.split_once('-') {
                grouped
                    .entry(vanilla.to_string())
                    .or_default()
                    .push(forge.to_string());
            }
        }
        assert_eq!(grouped["1.20.1"], vec!["47.1.0", "47.2.0"]);
        assert_eq!(grouped["1.19.4"], vec!["45.1.0"]);
    }

    #[test]
    fn install_profile_parses_processors_and_data() {
        let json = r#"{
            "spec": 1,
            "profile": "forge",
            "version": "1.20.1-forge-47.2.0",
            "data": {
                "MAPPINGS": { "client": "[de.oceanlabs.mcp:mcp_config:1.20.1@zip]", "server": "" },
                "BINPATCH": { "client": "/data/client.lzma", "server": "/data/server.lzma" },
                "MC_SLIM_SHA": { "client": "'abc123'", "server": "''" }
            },
            "processors": [
                {
                    "sides": ["client"],
                    "jar": "net.minecraftforge:binarypatcher:1.1.1:fatjar",
                    "classpath": ["net.sf.jopt-simple:jopt-simple:5.0.4"],
                    "args": ["--clean", "{MINECRAFT_JAR}", "--output", "{PATCHED}"]
                },
                {
                    "sides": ["server"],
                    "jar": "net.minecraftforge:installertools:1.3.0",
                    "args": []
                }
            ],
            "libraries": []
        }"#;
        let profile: InstallProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.processors.len(), 2);
        assert!(profile.processors[0].runs_on_client());
        assert!(!profile.processors[1].runs_on_client());
        assert_eq!(profile.data["MC_SLIM_SHA"].client, "'abc123'");
    }

    #[test]
    fn processor_token_substitution() {
        let paths = LauncherPaths::with_root("/data".into());
        let data = HashMap::from([("SIDE".to_string(), "client".to_string())]);

        assert_eq!(
            substitute_processor_token(&paths, "{SIDE}", &data).unwrap(),
            "client"
        );
        assert_eq!(
            substitute_processor_token(&paths, "'--verbose'", &data).unwrap(),
            "--verbose"
        );
        assert_eq!(
            substitute_processor_token(&paths, "--clean", &data).unwrap(),
            "--clean"
        );
        let jar = substitute_processor_token(
            &paths,
            "[net.sf.jopt-simple:jopt-simple:5.0.4]",
            &data,
        )
        .unwrap();
        assert!(jar.ends_with("jopt-simple-5.0.4.jar"));
        assert!(jar.starts_with("/data/libraries"));
    }

    #[test]
    fn unknown_data_key_becomes_empty() {
        let paths = LauncherPaths::with_root("/data".into());
        assert_eq!(
            substitute_processor_token(&paths, "{MISSING}", &HashMap::new()).unwrap(),
            ""
        );
    }
}
