use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::error::{LauncherError, LauncherResult};

/// A parsed `group:artifact:version[:classifier][@extension]` coordinate.
///
/// Coordinates are the identity of every library a version descriptor
/// references; the canonical on-disk path and the Maven-style download URL
/// are both derived from them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MavenArtifact {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
    /// File extension, `jar` unless the coordinate overrides it with `@`.
    pub extension: String,
}

impl MavenArtifact {
    pub fn parse(coordinate: &str) -> LauncherResult<Self> {
        let (coordinate, extension) = match coordinate.rsplit_once('@') {
            Some((left, ext)) if !ext.contains(':') => (left, ext),
            _ => (coordinate, "jar"),
        };

        let parts: Vec<&str> = coordinate.split(':').collect();
        match parts[..] {
            [group, artifact, version] => Ok(Self {
                group: group.into(),
                artifact: artifact.into(),
                version: version.into(),
                classifier: None,
                extension: extension.into(),
            }),
            [group, artifact, version, classifier] => Ok(Self {
                group: group.into(),
                artifact: artifact.into(),
                version: version.into(),
                classifier: Some(classifier.into()),
                extension: extension.into(),
            }),
            _ => Err(LauncherError::Config(format!(
                "Invalid Maven coordinate: {}",
                coordinate
            ))),
        }
    }

    /// Merge key for the modloader overlay: classifier variants coexist,
    /// plain duplicates supersede each other.
    pub fn overlay_key(&self) -> (String, String, Option<String>) {
        (
            self.group.clone(),
            self.artifact.clone(),
            self.classifier.clone(),
        )
    }

    /// Natives jars are recognizable by their classifier.
    pub fn is_natives(&self) -> bool {
        self.classifier
            .as_deref()
            .map(|classifier| classifier.starts_with("natives-"))
            .unwrap_or(false)
    }

    pub fn with_classifier(&self, classifier: &str) -> Self {
        let mut variant = self.clone();
        variant.classifier = Some(classifier.into());
        variant
    }

    fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact, self.version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        }
    }

    /// Path relative to the shared `libraries/` directory, mirroring the
    /// Maven repository layout:
    /// `<group-as-path>/<artifact>/<version>/<artifact>-<version>[-<classifier>].<ext>`
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for segment in self.group.split('.') {
            path.push(segment);
        }
        path.join(&self.artifact)
            .join(&self.version)
            .join(self.file_name())
    }

    /// Download URL under `repository`.
    pub fn url(&self, repository: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            repository.trim_end_matches('/'),
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.file_name()
        )
    }
}

impl fmt::Display for MavenArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_coordinate() {
        let artifact = MavenArtifact::parse("com.mojang:brigadier:1.1.8").unwrap();
        assert_eq!(artifact.group, "com.mojang");
        assert_eq!(artifact.artifact, "brigadier");
        assert_eq!(artifact.version, "1.1.8");
        assert_eq!(artifact.classifier, None);
        assert_eq!(artifact.extension, "jar");
    }

    #[test]
    fn parses_natives_classifier() {
        let artifact = MavenArtifact::parse("org.lwjgl:lwjgl:3.3.1:natives-linux").unwrap();
        assert!(artifact.is_natives());
        assert_eq!(
            artifact.relative_path(),
            PathBuf::from("org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar")
        );
    }

    #[test]
    fn extension_override() {
        let artifact =
            MavenArtifact::parse("de.oceanlabs.mcp:mcp_config:1.20.1-20230612.114412@zip").unwrap();
        assert_eq!(artifact.extension, "zip");
        assert!(artifact.file_name().ends_with(".zip"));
    }

    #[test]
    fn url_matches_maven_layout() {
        let artifact = MavenArtifact::parse("net.fabricmc:fabric-loader:0.14.21").unwrap();
        assert_eq!(
            artifact.url("https://maven.fabricmc.net/"),
            "https://maven.fabricmc.net/net/fabricmc/fabric-loader/0.14.21/fabric-loader-0.14.21.jar"
        );
    }

    #[test]
    fn classifier_variants_have_distinct_overlay_keys() {
        let plain = MavenArtifact::parse("org.lwjgl:lwjgl:3.3.1").unwrap();
        let natives = plain.with_classifier("natives-windows");
        assert_ne!(plain.overlay_key(), natives.overlay_key());
    }

    #[test]
    fn rejects_malformed_coordinate() {
        assert!(MavenArtifact::parse("only-two:parts").is_err());
    }
}
