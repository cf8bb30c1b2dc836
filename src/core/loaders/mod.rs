// ─── Modloader Overlay ───
// Fabric and Forge publish profiles that extend a vanilla version; the
// overlay fetches them as child descriptors and merges them onto the
// vanilla base before resolution.

pub mod fabric;
pub mod forge;

use async_trait::async_trait;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::model::ModloaderType;
use crate::core::paths::LauncherPaths;
use crate::core::version::descriptor::VersionDescriptor;
use crate::core::version::manifest::VersionManifestIndex;
use crate::core::version::resolver::{self, ResolvedProfile};
use crate::core::version::rules::RuleHost;

pub struct OverlayContext<'a> {
    pub client: &'a reqwest::Client,
    pub paths: &'a LauncherPaths,
}

/// Produces the loader's profile for `(vanilla, loader_version)` as a
/// descriptor that inherits from the vanilla one.
#[async_trait]
pub trait ModloaderOverlay: Send + Sync {
    async fn overlay_descriptor(
        &self,
        ctx: &OverlayContext<'_>,
        vanilla: &VersionDescriptor,
        loader_version: &str,
    ) -> LauncherResult<VersionDescriptor>;
}

pub fn overlay_for(modloader: ModloaderType) -> Option<Box<dyn ModloaderOverlay>> {
    match modloader {
        ModloaderType::None => None,
        ModloaderType::Fabric => Some(Box::new(fabric::FabricOverlay)),
        ModloaderType::Forge => Some(Box::new(forge::ForgeOverlay)),
    }
}

/// Full resolution pipeline: manifest entry → vanilla descriptor →
/// optional overlay merge → flat profile.
pub async fn resolve_profile(
    ctx: &OverlayContext<'_>,
    index: &VersionManifestIndex,
    vanilla_id: &str,
    modloader: ModloaderType,
    loader_version: &str,
) -> LauncherResult<ResolvedProfile> {
    let entry = index.require(vanilla_id)?;
    let mut vanilla = resolver::fetch_vanilla_descriptor(ctx.client, ctx.paths, entry).await?;

    // Vanilla descriptors occasionally inherit themselves (combined
    // snapshots); fold the whole chain before any overlay.
    let mut depth = 0;
    while let Some(parent_id) = vanilla.inherits_from.clone() {
        depth += 1;
        if depth > 8 {
            return Err(LauncherError::Config(format!(
                "inheritsFrom chain too deep at {}",
                parent_id
            )));
        }
        let parent_entry = index.require(&parent_id)?;
        let parent =
            resolver::fetch_vanilla_descriptor(ctx.client, ctx.paths, parent_entry).await?;
        vanilla = resolver::merge(parent, vanilla);
    }

    let merged = match overlay_for(modloader) {
        Some(overlay) => {
            if loader_version.is_empty() {
                return Err(LauncherError::Config(format!(
                    "{} requires a modloader version",
                    modloader
                )));
            }
            let child = overlay
                .overlay_descriptor(ctx, &vanilla, loader_version)
                .await?;
            resolver::merge(vanilla, child)
        }
        None => vanilla,
    };

    resolver::resolve(&merged, &RuleHost::current())
}
