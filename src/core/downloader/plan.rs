// ─── Fetch Planning ───
// Turns a ResolvedProfile into the concrete list of files that must exist
// on disk: libraries, natives, the client jar, the asset index and every
// asset object it references, and the optional logging config.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http;
use crate::core::integrity;
use crate::core::paths::LauncherPaths;
use crate::core::version::resolver::{LibraryRole, ResolvedProfile};

use super::executor::{FetchRole, FetchTask};

const ASSET_BASE_URL: &str = "https://resources.download.minecraft.net";

/// `assets/indexes/<id>.json`: virtual name → content-addressed object.
#[derive(Debug, Deserialize)]
pub struct AssetIndexDocument {
    pub objects: HashMap<String, AssetObjectRef>,
}

#[derive(Debug, Deserialize)]
pub struct AssetObjectRef {
    pub hash: String,
    pub size: u64,
}

/// Produce the full task list for `profile`. The asset index JSON itself is
/// fetched (and verified) eagerly since the asset object tasks derive from
/// its content.
pub async fn plan_profile_tasks(
    client: &reqwest::Client,
    paths: &LauncherPaths,
    profile: &ResolvedProfile,
    vanilla_id: &str,
) -> LauncherResult<Vec<FetchTask>> {
    let mut tasks = Vec::new();

    for library in &profile.libraries {
        tasks.push(FetchTask {
            url: library.url.clone(),
            destination: paths.libraries_dir().join(&library.relative_path),
            expected_sha1: library.sha1.clone(),
            expected_size: library.size,
            role: match library.role {
                LibraryRole::Classpath => FetchRole::Library,
                LibraryRole::Native => FetchRole::Native,
            },
        });
    }

    tasks.push(FetchTask {
        url: profile.client_jar.url.clone(),
        destination: paths.client_jar(vanilla_id),
        expected_sha1: Some(profile.client_jar.sha1.clone()),
        expected_size: Some(profile.client_jar.size),
        role: FetchRole::ClientJar,
    });

    if let Some(logging) = &profile.logging {
        tasks.push(FetchTask {
            url: logging.file.url.clone(),
            destination: logging_config_path(paths, &logging.file.sha1, &logging.file.id),
            expected_sha1: Some(logging.file.sha1.clone()),
            expected_size: Some(logging.file.size),
            role: FetchRole::LoggingConfig,
        });
    }

    let index = ensure_asset_index(client, paths, profile).await?;
    // The index itself is already on disk and verified; its task is a
    // planned no-op that keeps the manifest complete.
    tasks.push(FetchTask {
        url: profile.asset_index.url.clone(),
        destination: paths
            .asset_indexes_dir()
            .join(format!("{}.json", profile.asset_index.id)),
        expected_sha1: Some(profile.asset_index.sha1.clone()),
        expected_size: Some(profile.asset_index.size),
        role: FetchRole::AssetIndex,
    });

    let mut missing = 0usize;
    for object in index.objects.values() {
        let destination = paths.asset_object(&object.hash);
        // The store is content addressed, so existence is verification
        // enough here; corrupted objects are caught by the executor's
        // re-hash when they are planned.
        missing += usize::from(!destination.exists());
        tasks.push(FetchTask {
            url: format!("{}/{}/{}", ASSET_BASE_URL, &object.hash[..2], object.hash),
            destination,
            expected_sha1: Some(object.hash.clone()),
            expected_size: Some(object.size),
            role: FetchRole::AssetObject,
        });
    }

    info!(
        "Planned {} tasks ({} asset objects missing of {})",
        tasks.len(),
        missing,
        index.objects.len()
    );
    Ok(tasks)
}

/// Logging configs sit in the content-addressed object store, keyed by
/// their hash but named by their upstream id so the JVM argument stays
/// readable.
pub fn logging_config_path(
    paths: &LauncherPaths,
    sha1: &str,
    file_id: &str,
) -> std::path::PathBuf {
    paths.asset_objects_dir().join(&sha1[..2]).join(file_id)
}

/// Fetch and cache `assets/indexes/<id>.json`, reusing a cached copy whose
/// hash still matches the profile reference.
async fn ensure_asset_index(
    client: &reqwest::Client,
    paths: &LauncherPaths,
    profile: &ResolvedProfile,
) -> LauncherResult<AssetIndexDocument> {
    let index_path = paths
        .asset_indexes_dir()
        .join(format!("{}.json", profile.asset_index.id));

    let bytes = if integrity::file_matches_sha1(&index_path, &profile.asset_index.sha1).await {
        tokio::fs::read(&index_path)
            .await
            .map_err(LauncherError::io(index_path.clone()))?
    } else {
        let bytes = http::get_bytes(client, &profile.asset_index.url).await?;
        let actual = integrity::sha1_hex(&bytes);
        if !actual.eq_ignore_ascii_case(&profile.asset_index.sha1) {
            return Err(LauncherError::Integrity {
                path: index_path,
                expected: profile.asset_index.sha1.clone(),
                actual,
            });
        }
        if let Some(parent) = index_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(LauncherError::io(parent.to_path_buf()))?;
        }
        tokio::fs::write(&index_path, &bytes)
            .await
            .map_err(LauncherError::io(index_path.clone()))?;
        bytes
    };

    serde_json::from_slice(&bytes).map_err(|source| LauncherError::Schema {
        context: format!("asset index {}", profile.asset_index.id),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_index_document_parses() {
        let json = r#"{
            "objects": {
                "minecraft/sounds/random/click.ogg": {
                    "hash": "d8617f0f5f2b35e8d62eb64a2ee7820b1bdbc6f7",
                    "size": 5873
                },
                "pack.mcmeta": {
                    "hash": "3a4453ecce3c39b93f884b09b70ab72e5b731e28",
                    "size": 113
                }
            }
        }"#;
        let index: AssetIndexDocument = serde_json::from_str(json).unwrap();
        assert_eq!(index.objects.len(), 2);
        assert_eq!(index.objects["pack.mcmeta"].size, 113);
    }

    #[test]
    fn logging_config_lands_in_object_store() {
        let paths = LauncherPaths::with_root("/data".into());
        let path = logging_config_path(
            &paths,
            "aabbccddeeff00112233445566778899aabbccdd",
            "client-1.12.xml",
        );
        assert_eq!(
            path,
            std::path::PathBuf::from("/data/assets/objects/aa/client-1.12.xml")
        );
    }
}
