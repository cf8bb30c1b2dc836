// ─── Fabric Overlay ───
// Fabric Meta serves a launch profile per (game version, loader version)
// that inherits from the vanilla descriptor.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http;
use crate::core::version::descriptor::VersionDescriptor;
use crate::core::version::resolver;

use super::{ModloaderOverlay, OverlayContext};

const FABRIC_META_BASE: &str = "https://meta.fabricmc.net/v2";

#[derive(Debug, Deserialize)]
struct LoaderListEntry {
    loader: LoaderVersionRef,
}

#[derive(Debug, Deserialize)]
struct LoaderVersionRef {
    version: String,
}

#[derive(Debug, Deserialize)]
struct GlobalLoaderEntry {
    version: String,
}

/// Every published loader version, newest first. Used by the manifest
/// aggregation command.
pub async fn loader_versions(client: &reqwest::Client) -> LauncherResult<Vec<String>> {
    let url = format!("{}/versions/loader", FABRIC_META_BASE);
    let entries: Vec<GlobalLoaderEntry> = http::get_json(client, &url).await?;
    Ok(entries.into_iter().map(|entry| entry.version).collect())
}

/// Loader versions valid for one game version; validates the pair.
pub async fn loader_versions_for(
    client: &reqwest::Client,
    game_version: &str,
) -> LauncherResult<Vec<String>> {
    let url = format!("{}/versions/loader/{}", FABRIC_META_BASE, game_version);
    let entries: Vec<LoaderListEntry> = http::get_json(client, &url).await?;
    Ok(entries
        .into_iter()
        .map(|entry| entry.loader.version)
        .collect())
}

pub struct FabricOverlay;

#[async_trait]
impl ModloaderOverlay for FabricOverlay {
    async fn overlay_descriptor(
        &self,
        ctx: &OverlayContext<'_>,
        vanilla: &VersionDescriptor,
        loader_version: &str,
    ) -> LauncherResult<VersionDescriptor> {
        // 1️⃣ Validate the pair against Fabric's own game-version list
        let supported = loader_versions_for(ctx.client, &vanilla.id).await?;
        if !supported.iter().any(|version| version == loader_version) {
            return Err(LauncherError::ModloaderUnsupported {
                loader: "Fabric".into(),
                loader_version: loader_version.into(),
                vanilla: vanilla.id.clone(),
            });
        }

        // 2️⃣ Fetch the launch profile
        info!("Fetching Fabric profile {} for {}", loader_version, vanilla.id);
        let url = format!(
            "{}/versions/loader/{}/{}/profile/json",
            FABRIC_META_BASE, vanilla.id, loader_version
        );
        let raw = http::get_text(ctx.client, &url).await?;
        let descriptor = resolver::parse_descriptor(&raw, "fabric profile")?;

        // 3️⃣ Cache beside the vanilla descriptors so relaunches skip the
        // meta server
        let cache_path = ctx.paths.version_json(&descriptor.id);
        resolver::cache_descriptor_json(&cache_path, raw.as_bytes()).await?;

        Ok(descriptor)
    }
}
