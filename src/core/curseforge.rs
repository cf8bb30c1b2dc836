// ─── CurseForge Adapters ───
// Read-only API surface for the modpack browser plus the zip import path.
// None of this sits on the launch path.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::core::downloader::{FetchRole, FetchTask};
use crate::core::error::{LauncherError, LauncherResult};

const API_URL: &str = "https://api.curseforge.com/v1";
const FORGECDN_URL: &str = "https://edge.forgecdn.net/files";
/// Minecraft's game id on CurseForge.
const GAME_ID_MINECRAFT: &str = "432";
/// The modpack class.
const CLASS_ID_MODPACKS: u32 = 4471;

const API_KEY: &str = "$2a$10$5BgCleD8.rLQ5Ix17Xm2lOjgfoeTJV26a1BXmmpwrOemgI517.nuC";

fn api_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", HeaderValue::from_static(API_KEY));
    headers.insert("Accept", HeaderValue::from_static("application/json"));
    headers
}

// ─── Categories ───

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInfo {
    pub id: u32,
    pub name: String,
    pub icon_url: String,
}

#[derive(Debug, Deserialize)]
struct CategoriesResponse {
    data: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryEntry {
    id: u32,
    name: String,
    #[serde(default)]
    icon_url: String,
}

pub async fn categories(client: &reqwest::Client) -> LauncherResult<Vec<CategoryInfo>> {
    let response = client
        .get(format!("{}/categories", API_URL))
        .headers(api_headers())
        .query(&[
            ("gameId", GAME_ID_MINECRAFT.to_string()),
            ("classId", CLASS_ID_MODPACKS.to_string()),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(LauncherError::Network {
            url: format!("{}/categories", API_URL),
            status: status.as_u16(),
        });
    }

    let body: CategoriesResponse = response.json().await?;
    Ok(body
        .data
        .into_iter()
        .map(|entry| CategoryInfo {
            id: entry.id,
            name: entry.name,
            icon_url: entry.icon_url,
        })
        .collect())
}

// ─── Search ───

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub page: u32,
    #[serde(default)]
    pub search_filter: String,
    #[serde(default)]
    pub selected_version: String,
    #[serde(default)]
    pub selected_category: Option<u32>,
    #[serde(default)]
    pub selected_sort: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModpackInformation {
    pub id: u32,
    pub name: String,
    pub summary: String,
    pub thumbnail_url: String,
    pub authors: Vec<String>,
    pub download_count: u64,
    pub website_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchEntry {
    id: u32,
    name: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    download_count: u64,
    #[serde(default)]
    logo: Option<SearchImage>,
    #[serde(default)]
    authors: Vec<SearchAuthor>,
    #[serde(default)]
    links: Option<SearchLinks>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchImage {
    #[serde(default)]
    thumbnail_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchLinks {
    website_url: Option<String>,
}

const PAGE_SIZE: u32 = 40;

pub async fn search_modpacks(
    client: &reqwest::Client,
    query: &SearchQuery,
) -> LauncherResult<Vec<ModpackInformation>> {
    let mut params: Vec<(&str, String)> = vec![
        ("gameId", GAME_ID_MINECRAFT.to_string()),
        ("classId", CLASS_ID_MODPACKS.to_string()),
        ("pageSize", PAGE_SIZE.to_string()),
        ("index", (query.page * PAGE_SIZE).to_string()),
        ("sortOrder", "desc".to_string()),
    ];
    if !query.search_filter.is_empty() {
        params.push(("searchFilter", query.search_filter.clone()));
    }
    if !query.selected_version.is_empty() {
        params.push(("gameVersion", query.selected_version.clone()));
    }
    if let Some(category) = query.selected_category {
        params.push(("categoryId", category.to_string()));
    }
    params.push((
        "sortField",
        query.selected_sort.unwrap_or(1).to_string(),
    ));

    let response = client
        .get(format!("{}/mods/search", API_URL))
        .headers(api_headers())
        .query(&params)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(LauncherError::Network {
            url: format!("{}/mods/search", API_URL),
            status: status.as_u16(),
        });
    }

    let body: SearchResponse = response.json().await?;
    Ok(body
        .data
        .into_iter()
        .map(|entry| ModpackInformation {
            id: entry.id,
            name: entry.name,
            summary: entry.summary,
            thumbnail_url: entry
                .logo
                .map(|logo| logo.thumbnail_url)
                .unwrap_or_default(),
            authors: entry.authors.into_iter().map(|author| author.name).collect(),
            download_count: entry.download_count,
            website_url: entry.links.and_then(|links| links.website_url),
        })
        .collect())
}

// ─── Modpack zip import ───

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModpackManifest {
    pub minecraft: ModpackGameInfo,
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub files: Vec<ModpackFileRef>,
    #[serde(default = "default_overrides")]
    pub overrides: String,
}

fn default_overrides() -> String {
    "overrides".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModpackGameInfo {
    pub version: String,
    #[serde(rename = "modLoaders", default)]
    pub modloaders: Vec<ModpackModloader>,
}

#[derive(Debug, Deserialize)]
pub struct ModpackModloader {
    /// e.g. `fabric-0.14.21` or `forge-47.2.0`.
    pub id: String,
    #[serde(default)]
    pub primary: bool,
}

impl ModpackManifest {
    /// The primary modloader id split into `(loader, version)`.
    pub fn primary_modloader(&self) -> Option<(String, String)> {
        let loader = self
            .modloaders
            .iter()
            .find(|candidate| candidate.primary)
            .or_else(|| self.modloaders.first())?;
        let (kind, version) = loader.id.split_once('-')?;
        Some((kind.to_string(), version.to_string()))
    }
}

/// Read `manifest.json` out of a modpack zip.
pub async fn read_modpack_manifest(zip_path: &Path) -> LauncherResult<ModpackManifest> {
    let zip_path = zip_path.to_path_buf();
    tokio::task::spawn_blocking(move || -> LauncherResult<ModpackManifest> {
        let file = std::fs::File::open(&zip_path).map_err(LauncherError::io(&zip_path))?;
        let mut archive = zip::ZipArchive::new(file)?;
        let mut raw = String::new();
        archive
            .by_name("manifest.json")?
            .read_to_string(&mut raw)
            .map_err(LauncherError::io(&zip_path))?;
        serde_json::from_str(&raw).map_err(|source| LauncherError::Schema {
            context: "modpack manifest.json".into(),
            source,
        })
    })
    .await
    .map_err(|join| LauncherError::Child(format!("manifest read panicked: {}", join)))?
}

/// Copy the pack's `overrides/` tree into the instance's game directory.
pub async fn extract_overrides(
    zip_path: &Path,
    overrides_prefix: &str,
    minecraft_dir: &Path,
) -> LauncherResult<()> {
    let zip_path = zip_path.to_path_buf();
    let prefix = PathBuf::from(overrides_prefix);
    let minecraft_dir = minecraft_dir.to_path_buf();

    tokio::task::spawn_blocking(move || -> LauncherResult<()> {
        let file = std::fs::File::open(&zip_path).map_err(LauncherError::io(&zip_path))?;
        let mut archive = zip::ZipArchive::new(file)?;

        let mut copied = 0usize;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let Some(name) = entry.enclosed_name().map(|p| p.to_owned()) else {
                continue;
            };
            let Ok(relative) = name.strip_prefix(&prefix) else {
                continue;
            };

            let destination = minecraft_dir.join(relative);
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(LauncherError::io(parent.to_path_buf()))?;
            }
            let mut output =
                std::fs::File::create(&destination).map_err(LauncherError::io(&destination))?;
            std::io::copy(&mut entry, &mut output).map_err(LauncherError::io(&destination))?;
            copied += 1;
        }
        info!("Copied {} override files", copied);
        Ok(())
    })
    .await
    .map_err(|join| LauncherError::Child(format!("overrides extraction panicked: {}", join)))?
}

#[derive(Debug, Deserialize)]
struct FilesResponse {
    data: Vec<FileData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    id: u32,
    file_name: String,
    #[serde(default)]
    hashes: Vec<FileHash>,
    #[serde(default)]
    file_length: u64,
    /// Null when the author disabled third-party downloads; the ForgeCDN
    /// layout is derivable from the file id.
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileHash {
    value: String,
    /// 1 = SHA-1, 2 = MD5.
    algo: u8,
}

impl FileData {
    fn resolved_url(&self) -> String {
        match &self.download_url {
            Some(url) => url.clone(),
            None => {
                let id = self.id.to_string();
                let (head, tail) = id.split_at(4.min(id.len()));
                format!("{}/{}/{}/{}", FORGECDN_URL, head, tail, self.file_name)
            }
        }
    }

    fn sha1(&self) -> Option<String> {
        self.hashes
            .iter()
            .find(|hash| hash.algo == 1)
            .map(|hash| hash.value.clone())
    }
}

// Unused fields exist in the manifest shape and are kept for clarity.
#[allow(unused)]
#[derive(Debug, Deserialize)]
pub struct ModpackFileRef {
    #[serde(rename = "projectID")]
    pub project_id: u32,
    #[serde(rename = "fileID")]
    pub file_id: u32,
    #[serde(default)]
    pub required: bool,
}

/// Resolve the pack's file list into download tasks targeting `mods_dir`.
pub async fn plan_mod_downloads(
    client: &reqwest::Client,
    files: &[ModpackFileRef],
    mods_dir: &Path,
) -> LauncherResult<Vec<FetchTask>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let file_ids: Vec<u32> = files.iter().map(|file| file.file_id).collect();
    let response = client
        .post(format!("{}/mods/files", API_URL))
        .headers(api_headers())
        .header("Content-Type", "application/json")
        .body(json!({ "fileIds": file_ids }).to_string())
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(LauncherError::Network {
            url: format!("{}/mods/files", API_URL),
            status: status.as_u16(),
        });
    }

    let body: FilesResponse = response.json().await?;

    // The endpoint may return duplicates for the same file id.
    let mut seen: HashSet<u32> = HashSet::new();
    let mut tasks = Vec::new();
    for file in body.data {
        if !seen.insert(file.id) {
            continue;
        }
        let sha1 = file.sha1();
        if sha1.is_none() {
            warn!("No SHA-1 published for mod file {}", file.file_name);
        }
        debug!("Planned mod download {}", file.file_name);
        tasks.push(FetchTask {
            url: file.resolved_url(),
            destination: mods_dir.join(&file.file_name),
            expected_sha1: sha1,
            expected_size: Some(file.file_length).filter(|length| *length > 0),
            role: FetchRole::Mod,
        });
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_identifies_primary_modloader() {
        let json = r#"{
            "minecraft": {
                "version": "1.20.1",
                "modLoaders": [
                    { "id": "fabric-0.14.21", "primary": true }
                ]
            },
            "manifestType": "minecraftModpack",
            "manifestVersion": 1,
            "name": "All the Blocks",
            "version": "3.1",
            "author": "someone",
            "files": [
                { "projectID": 238222, "fileID": 4509341, "required": true }
            ],
            "overrides": "overrides"
        }"#;
        let manifest: ModpackManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.minecraft.version, "1.20.1");
        assert_eq!(
            manifest.primary_modloader(),
            Some(("fabric".to_string(), "0.14.21".to_string()))
        );
        assert_eq!(manifest.files.len(), 1);
    }

    #[test]
    fn forgecdn_fallback_splits_the_file_id() {
        let file = FileData {
            id: 4509341,
            file_name: "mod.jar".into(),
            hashes: vec![],
            file_length: 0,
            download_url: None,
        };
        assert_eq!(
            file.resolved_url(),
            "https://edge.forgecdn.net/files/4509/341/mod.jar"
        );
    }

    #[test]
    fn sha1_hash_is_selected_by_algo() {
        let file = FileData {
            id: 1,
            file_name: "mod.jar".into(),
            hashes: vec![
                FileHash {
                    value: "md5md5".into(),
                    algo: 2,
                },
                FileHash {
                    value: "da39a3ee5e6b4b0d3255bfef95601890afd80709".into(),
                    algo: 1,
                },
            ],
            file_length: 10,
            download_url: Some("https://cdn/mod.jar".into()),
        };
        assert_eq!(
            file.sha1().as_deref(),
            Some("da39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
    }
}
