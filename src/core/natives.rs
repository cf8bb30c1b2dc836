// ─── Natives Extractor ───
// Unpacks platform-native archives into the per-instance natives directory.
// The directory is rebuilt on every launch because the set of natives can
// change with the resolved profile.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::resolver::ResolvedLibrary;

/// Entries under these prefixes are never extracted.
const ALWAYS_EXCLUDED: &[&str] = &["META-INF/"];

/// Clear and repopulate `<instance>/natives/` from the profile's native
/// libraries. Archive IO runs on the blocking pool.
pub async fn extract_natives(
    natives_dir: &Path,
    libraries_dir: &Path,
    natives: Vec<ResolvedLibrary>,
) -> LauncherResult<()> {
    if natives_dir.exists() {
        tokio::fs::remove_dir_all(natives_dir)
            .await
            .map_err(LauncherError::io(natives_dir.to_path_buf()))?;
    }
    tokio::fs::create_dir_all(natives_dir)
        .await
        .map_err(LauncherError::io(natives_dir.to_path_buf()))?;

    let natives_dir = natives_dir.to_path_buf();
    let libraries_dir = libraries_dir.to_path_buf();

    tokio::task::spawn_blocking(move || -> LauncherResult<()> {
        for library in &natives {
            let archive_path = libraries_dir.join(&library.relative_path);
            debug!("Extracting natives from {:?}", archive_path);
            extract_archive(&archive_path, &natives_dir, &library.extract_exclude)?;
        }
        info!("Extracted {} native archives", natives.len());
        Ok(())
    })
    .await
    .map_err(|join| LauncherError::Child(format!("natives extraction panicked: {}", join)))?
}

fn extract_archive(
    archive_path: &Path,
    natives_dir: &Path,
    exclude: &[String],
) -> LauncherResult<()> {
    let file = std::fs::File::open(archive_path).map_err(LauncherError::io(archive_path))?;
    let mut archive = zip::ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        // Zip-slip guard plus the entry's relative path in one call.
        let entry_path = match entry.enclosed_name() {
            Some(name) => name.to_owned(),
            None => continue,
        };

        if is_excluded(&entry_path, exclude) {
            debug!("Skipping excluded entry {:?}", entry_path);
            continue;
        }

        let destination = natives_dir.join(&entry_path);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(LauncherError::io(parent.to_path_buf()))?;
        }

        // Write to a sibling temp file and rename so a crashed extraction
        // never leaves a truncated native behind.
        let temp = destination.with_extension("extract-tmp");
        {
            let mut output = std::fs::File::create(&temp).map_err(LauncherError::io(&temp))?;
            std::io::copy(&mut entry, &mut output).map_err(LauncherError::io(&temp))?;
        }
        std::fs::rename(&temp, &destination).map_err(LauncherError::io(&destination))?;
    }
    Ok(())
}

fn is_excluded(entry_path: &Path, exclude: &[String]) -> bool {
    ALWAYS_EXCLUDED
        .iter()
        .map(|prefix| Path::new(prefix))
        .chain(exclude.iter().map(Path::new))
        .any(|prefix| entry_path.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn exclusion_covers_meta_inf_and_custom_prefixes() {
        let exclude = vec!["docs/".to_string()];
        assert!(is_excluded(Path::new("META-INF/MANIFEST.MF"), &exclude));
        assert!(is_excluded(Path::new("docs/readme.txt"), &exclude));
        assert!(!is_excluded(Path::new("liblwjgl.so"), &exclude));
    }

    #[tokio::test]
    async fn extracts_and_clears_previous_session() {
        let tmp = tempdir::TempDir::new("natives").unwrap();
        let libraries_dir = tmp.path().join("libraries");
        let natives_dir = tmp.path().join("natives");
        std::fs::create_dir_all(libraries_dir.join("org")).unwrap();

        make_archive(
            &libraries_dir.join("org/native.jar"),
            &[
                ("liblwjgl.so", b"elf".as_slice()),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0".as_slice()),
            ],
        );

        // A leftover from the previous session must vanish.
        std::fs::create_dir_all(&natives_dir).unwrap();
        std::fs::write(natives_dir.join("stale.so"), b"old").unwrap();

        let library = ResolvedLibrary {
            coordinate: crate::core::maven::MavenArtifact::parse(
                "org:native:1.0:natives-linux",
            )
            .unwrap(),
            relative_path: PathBuf::from("org/native.jar"),
            url: String::new(),
            sha1: None,
            size: None,
            role: crate::core::version::resolver::LibraryRole::Native,
            extract_exclude: vec![],
        };

        extract_natives(&natives_dir, &libraries_dir, vec![library])
            .await
            .unwrap();

        assert!(natives_dir.join("liblwjgl.so").exists());
        assert!(!natives_dir.join("META-INF").exists());
        assert!(!natives_dir.join("stale.so").exists());
    }
}
