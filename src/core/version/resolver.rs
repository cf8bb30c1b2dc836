// ─── Profile Resolver ───
// Turns raw (possibly inheriting) version descriptors into a flat,
// rule-evaluated ResolvedProfile the downloader and assembler consume.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http;
use crate::core::integrity;
use crate::core::maven::{MavenArtifact, MOJANG_LIBRARIES};
use crate::core::paths::LauncherPaths;
use crate::core::version::descriptor::{
    ArgToken, AssetIndexRef, ClientLogging, FileRef, LibraryEntry, VersionDescriptor,
};
use crate::core::version::manifest::VersionEntry;
use crate::core::version::rules::{self, RuleHost};

/// Whether a resolved library lands on the classpath or is a natives
/// archive extracted before launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryRole {
    Classpath,
    Native,
}

#[derive(Debug, Clone)]
pub struct ResolvedLibrary {
    pub coordinate: MavenArtifact,
    /// Path relative to the shared `libraries/` directory.
    pub relative_path: PathBuf,
    pub url: String,
    pub sha1: Option<String>,
    pub size: Option<u64>,
    pub role: LibraryRole,
    /// Path prefixes skipped during natives extraction.
    pub extract_exclude: Vec<String>,
}

/// Flat launch profile: every rule has been evaluated against the host,
/// inheritance is folded in, and libraries appear in resolution order with
/// later `group:artifact` duplicates superseding earlier ones.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub version_id: String,
    pub version_type: String,
    pub main_class: String,
    pub libraries: Vec<ResolvedLibrary>,
    pub asset_index: AssetIndexRef,
    pub client_jar: FileRef,
    pub jvm_args: Vec<ArgToken>,
    pub game_args: Vec<ArgToken>,
    pub logging: Option<ClientLogging>,
    pub java_major: Option<u32>,
    pub compliance_level: u32,
}

impl ResolvedProfile {
    pub fn classpath_libraries(&self) -> impl Iterator<Item = &ResolvedLibrary> {
        self.libraries
            .iter()
            .filter(|library| library.role == LibraryRole::Classpath)
    }

    pub fn native_libraries(&self) -> impl Iterator<Item = &ResolvedLibrary> {
        self.libraries
            .iter()
            .filter(|library| library.role == LibraryRole::Native)
    }
}

// ─── Descriptor fetching + disk cache ───

/// Fetch a vanilla version descriptor, reusing `versions/<id>/<id>.json`
/// when its hash still matches the manifest entry.
pub async fn fetch_vanilla_descriptor(
    client: &reqwest::Client,
    paths: &LauncherPaths,
    entry: &VersionEntry,
) -> LauncherResult<VersionDescriptor> {
    let cache_path = paths.version_json(&entry.id);

    let cached_valid = match &entry.sha1 {
        Some(sha1) => integrity::file_matches_sha1(&cache_path, sha1).await,
        None => cache_path.exists(),
    };

    if cached_valid {
        debug!("Loading version descriptor {} from disk", entry.id);
        let raw = tokio::fs::read_to_string(&cache_path)
            .await
            .map_err(LauncherError::io(cache_path.clone()))?;
        return parse_descriptor(&raw, &entry.id);
    }

    info!("Fetching version descriptor {}", entry.id);
    let raw = http::get_text(client, &entry.url).await?;
    let descriptor = parse_descriptor(&raw, &entry.id)?;
    cache_descriptor_json(&cache_path, raw.as_bytes()).await?;
    Ok(descriptor)
}

pub fn parse_descriptor(raw: &str, context: &str) -> LauncherResult<VersionDescriptor> {
    serde_json::from_str(raw).map_err(|source| LauncherError::Schema {
        context: format!("version descriptor {}", context),
        source,
    })
}

pub async fn cache_descriptor_json(cache_path: &PathBuf, raw: &[u8]) -> LauncherResult<()> {
    if let Some(parent) = cache_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(LauncherError::io(parent.to_path_buf()))?;
    }
    tokio::fs::write(cache_path, raw)
        .await
        .map_err(LauncherError::io(cache_path.clone()))?;
    Ok(())
}

// ─── Inheritance ───

/// Merge a child descriptor over its parent.
///
/// Arrays concatenate (child after parent); scalar fields from the child
/// override; `mainClass` from the child wins when present.
pub fn merge(parent: VersionDescriptor, child: VersionDescriptor) -> VersionDescriptor {
    let mut libraries = parent.libraries;
    libraries.extend(child.libraries);

    let arguments = match (parent.arguments, child.arguments) {
        (Some(mut base), Some(overlay)) => {
            base.game.extend(overlay.game);
            base.jvm = match (base.jvm, overlay.jvm) {
                (Some(mut jvm), Some(extra)) => {
                    jvm.extend(extra);
                    Some(jvm)
                }
                (jvm, extra) => extra.or(jvm),
            };
            Some(base)
        }
        (base, overlay) => overlay.or(base),
    };

    VersionDescriptor {
        id: child.id,
        // The chain is folded; the merged descriptor no longer inherits.
        inherits_from: parent.inherits_from,
        main_class: child.main_class.or(parent.main_class),
        version_type: child.version_type.or(parent.version_type),
        arguments,
        minecraft_arguments: child.minecraft_arguments.or(parent.minecraft_arguments),
        asset_index: child.asset_index.or(parent.asset_index),
        downloads: child.downloads.or(parent.downloads),
        libraries,
        logging: child.logging.or(parent.logging),
        java_version: child.java_version.or(parent.java_version),
        compliance_level: child.compliance_level.or(parent.compliance_level),
    }
}

// ─── Flattening ───

/// Resolve a fully merged descriptor against the host.
pub fn resolve(descriptor: &VersionDescriptor, host: &RuleHost) -> LauncherResult<ResolvedProfile> {
    let main_class = descriptor
        .main_class
        .clone()
        .ok_or_else(|| LauncherError::Config(format!("{} has no mainClass", descriptor.id)))?;

    let asset_index = descriptor
        .asset_index
        .clone()
        .ok_or_else(|| LauncherError::Config(format!("{} has no assetIndex", descriptor.id)))?;

    let client_jar = descriptor
        .downloads
        .as_ref()
        .and_then(|downloads| downloads.client.clone())
        .ok_or_else(|| {
            LauncherError::Config(format!("{} has no client download", descriptor.id))
        })?;

    let mut libraries: Vec<ResolvedLibrary> = Vec::new();
    let mut positions: HashMap<(String, String, Option<String>), usize> = HashMap::new();

    for entry in &descriptor.libraries {
        if let Some(rule_list) = &entry.rules {
            if !rules::evaluate(rule_list, host, &HashMap::new()) {
                debug!("Library filtered by rules: {}", entry.name);
                continue;
            }
        }

        for resolved in resolve_library(entry, host)? {
            let key = resolved.coordinate.overlay_key();
            // Later duplicates supersede earlier ones: drop the old entry
            // and append, so overlay libraries keep their position after
            // their vanilla counterparts.
            if let Some(index) = positions.remove(&key) {
                libraries.remove(index);
                for position in positions.values_mut() {
                    if *position > index {
                        *position -= 1;
                    }
                }
            }
            positions.insert(key, libraries.len());
            libraries.push(resolved);
        }
    }

    let (jvm_args, game_args) = flatten_arguments(descriptor, host);

    Ok(ResolvedProfile {
        version_id: descriptor.id.clone(),
        version_type: descriptor
            .version_type
            .clone()
            .unwrap_or_else(|| "release".to_string()),
        main_class,
        libraries,
        asset_index,
        client_jar,
        jvm_args,
        game_args,
        logging: descriptor
            .logging
            .as_ref()
            .and_then(|logging| logging.client.clone()),
        java_major: descriptor
            .java_version
            .as_ref()
            .map(|hint| hint.major_version),
        compliance_level: descriptor.compliance_level.unwrap_or(0),
    })
}

/// A single library entry can yield a classpath artifact, a natives
/// classifier, or both.
fn resolve_library(entry: &LibraryEntry, host: &RuleHost) -> LauncherResult<Vec<ResolvedLibrary>> {
    let coordinate = MavenArtifact::parse(&entry.name)?;
    let mut resolved = Vec::new();

    let downloads = entry.downloads.as_ref();

    if let Some(artifact) = downloads.and_then(|d| d.artifact.as_ref()) {
        let relative_path = artifact
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| coordinate.relative_path());
        resolved.push(ResolvedLibrary {
            role: if coordinate.is_natives() {
                LibraryRole::Native
            } else {
                LibraryRole::Classpath
            },
            relative_path,
            url: artifact.url.clone(),
            sha1: Some(artifact.sha1.clone()),
            size: Some(artifact.size),
            extract_exclude: entry
                .extract
                .as_ref()
                .map(|extract| extract.exclude.clone())
                .unwrap_or_default(),
            coordinate: coordinate.clone(),
        });
    } else if downloads.is_none() {
        // Fabric-style entry: only a coordinate plus an optional repo base.
        let repository = entry.url.as_deref().unwrap_or(MOJANG_LIBRARIES);
        resolved.push(ResolvedLibrary {
            role: if coordinate.is_natives() {
                LibraryRole::Native
            } else {
                LibraryRole::Classpath
            },
            relative_path: coordinate.relative_path(),
            url: coordinate.url(repository),
            sha1: None,
            size: None,
            extract_exclude: Vec::new(),
            coordinate: coordinate.clone(),
        });
    }

    // Platform natives, chosen via the explicit `natives` block.
    if let Some(natives) = &entry.natives {
        if let Some(classifier_template) = natives.get(host.os_name) {
            let classifier = classifier_template.replace("${arch}", pointer_width());
            let classifier_artifact = coordinate.with_classifier(&classifier);

            let from_classifiers = downloads
                .and_then(|d| d.classifiers.as_ref())
                .and_then(|classifiers| classifiers.get(&classifier));

            match from_classifiers {
                Some(artifact) => resolved.push(ResolvedLibrary {
                    role: LibraryRole::Native,
                    relative_path: artifact
                        .path
                        .as_ref()
                        .map(PathBuf::from)
                        .unwrap_or_else(|| classifier_artifact.relative_path()),
                    url: artifact.url.clone(),
                    sha1: Some(artifact.sha1.clone()),
                    size: Some(artifact.size),
                    extract_exclude: entry
                        .extract
                        .as_ref()
                        .map(|extract| extract.exclude.clone())
                        .unwrap_or_default(),
                    coordinate: classifier_artifact,
                }),
                None => debug!(
                    "No classifier {} published for {}",
                    classifier, entry.name
                ),
            }
        }
    }

    Ok(resolved)
}

/// `${arch}` in natives classifiers means pointer width, not ISA.
fn pointer_width() -> &'static str {
    if cfg!(target_pointer_width = "64") {
        "64"
    } else {
        "32"
    }
}

/// Flatten argument templates. OS-conditional tokens are decided here with
/// an empty feature set; feature-gated tokens stay conditional for the
/// assembler, which knows the instance configuration.
fn flatten_arguments(
    descriptor: &VersionDescriptor,
    host: &RuleHost,
) -> (Vec<ArgToken>, Vec<ArgToken>) {
    if let Some(arguments) = &descriptor.arguments {
        let jvm = arguments
            .jvm
            .as_deref()
            .map(|tokens| flatten_tokens(tokens, host))
            .unwrap_or_else(legacy_jvm_args);
        let game = flatten_tokens(&arguments.game, host);
        return (jvm, game);
    }

    // Legacy (<= 1.12) descriptors: one big game argument string and no jvm
    // section at all.
    let game = descriptor
        .minecraft_arguments
        .as_deref()
        .unwrap_or_default()
        .split_ascii_whitespace()
        .map(|token| ArgToken::Literal(token.to_string()))
        .collect();
    (legacy_jvm_args(), game)
}

fn legacy_jvm_args() -> Vec<ArgToken> {
    vec![
        ArgToken::Literal("-Djava.library.path=${natives_directory}".to_string()),
        ArgToken::Literal("-cp".to_string()),
        ArgToken::Literal("${classpath}".to_string()),
    ]
}

fn flatten_tokens(tokens: &[ArgToken], host: &RuleHost) -> Vec<ArgToken> {
    let mut flattened = Vec::new();
    for token in tokens {
        match token {
            ArgToken::Literal(value) => flattened.push(ArgToken::Literal(value.clone())),
            ArgToken::Conditional { rules: conditions, values } => {
                if rules::mentions_features(conditions) {
                    flattened.push(token.clone());
                } else if rules::evaluate(conditions, host, &HashMap::new()) {
                    flattened.extend(values.iter().cloned().map(ArgToken::Literal));
                }
            }
        }
    }
    flattened
}
