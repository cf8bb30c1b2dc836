// ─── Version Manifest Index ───
// The Mojang version manifest v2: source of truth for known vanilla
// versions. Fetched at most once per launcher session.

use serde::Deserialize;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http;

const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Top-level manifest. Entry order is upstream order (newest first) and is
/// preserved for the UI.
#[derive(Debug, Deserialize)]
pub struct VersionManifestIndex {
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    /// `release`, `snapshot`, `old_beta`, `old_alpha`.
    #[serde(rename = "type")]
    pub version_type: String,
    pub url: String,
    #[serde(rename = "releaseTime")]
    pub release_time: String,
    /// SHA-1 of the version descriptor behind `url`; used to validate the
    /// on-disk descriptor cache.
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifestIndex {
    pub async fn fetch(client: &reqwest::Client) -> LauncherResult<Self> {
        info!("Fetching Minecraft version manifest");
        let manifest: VersionManifestIndex = http::get_json(client, VERSION_MANIFEST_URL).await?;
        info!("Manifest lists {} versions", manifest.versions.len());
        Ok(manifest)
    }

    pub fn find(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|entry| entry.id == id)
    }

    /// Like `find` but with the resolver's typed failure.
    pub fn require(&self, id: &str) -> LauncherResult<&VersionEntry> {
        self.find(id)
            .ok_or_else(|| LauncherError::UnknownVersion(id.to_string()))
    }
}
