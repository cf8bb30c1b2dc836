// ─── Version Descriptor ───
// The raw version JSON as published upstream (Mojang, Fabric meta, Forge
// installer). Nothing here is evaluated; the resolver flattens it.

use std::collections::HashMap;

use serde::de::{Error as DeError, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// A version profile, possibly inheriting from a parent via `inheritsFrom`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub id: String,
    #[serde(default)]
    pub inherits_from: Option<String>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(rename = "type", default)]
    pub version_type: Option<String>,
    #[serde(default)]
    pub arguments: Option<ArgumentsSection>,
    /// Legacy pre-1.13 form: a single space-separated game argument string.
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexRef>,
    #[serde(default)]
    pub downloads: Option<DescriptorDownloads>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
    #[serde(default)]
    pub java_version: Option<JavaVersionHint>,
    #[serde(default)]
    pub compliance_level: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArgumentsSection {
    #[serde(default)]
    pub game: Vec<ArgToken>,
    /// Missing in some older Forge profiles that only add game arguments.
    #[serde(default)]
    pub jvm: Option<Vec<ArgToken>>,
}

/// One argument template entry: either a literal string (placeholders
/// intact) or a rule-gated group of values.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ArgToken {
    Literal(String),
    Conditional {
        rules: Vec<Rule>,
        #[serde(rename = "value", deserialize_with = "string_or_seq")]
        values: Vec<String>,
    },
}

/// An allow/disallow clause gated by host attributes and feature flags.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
    #[serde(default)]
    pub features: Option<HashMap<String, bool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
    /// A regex matched against the host OS version string.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndexRef {
    pub id: String,
    pub url: String,
    pub sha1: String,
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DescriptorDownloads {
    pub client: Option<FileRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub url: String,
    pub sha1: String,
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryEntry {
    /// `group:artifact:version[:classifier]`
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    /// Fabric-style entries carry no `downloads` block, only a repository
    /// base the coordinate resolves against.
    #[serde(default)]
    pub url: Option<String>,
    /// `os name → classifier` for platform natives; `${arch}` may appear.
    #[serde(default)]
    pub natives: Option<HashMap<String, String>>,
    #[serde(default)]
    pub extract: Option<ExtractRules>,
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<ArtifactRef>,
    #[serde(default)]
    pub classifiers: Option<HashMap<String, ArtifactRef>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactRef {
    /// Path relative to the libraries root, as published upstream.
    #[serde(default)]
    pub path: Option<String>,
    pub url: String,
    pub sha1: String,
    pub size: u64,
}

/// Path prefixes to skip when extracting a natives archive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    pub client: Option<ClientLogging>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientLogging {
    /// e.g. `-Dlog4j.configurationFile=${path}`
    pub argument: String,
    pub file: LoggingFile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingFile {
    pub id: String,
    pub url: String,
    pub sha1: String,
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionHint {
    pub major_version: u32,
}

/// Upstream writes conditional argument values either as a bare string or
/// as an array of strings.
fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrSeq;

    impl<'de> Visitor<'de> for StringOrSeq {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or an array of strings")
        }

        fn visit_str<E: DeError>(self, value: &str) -> Result<Self::Value, E> {
            Ok(vec![value.to_string()])
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut values = Vec::new();
            while let Some(value) = seq.next_element::<String>()? {
                values.push(value);
            }
            Ok(values)
        }
    }

    deserializer.deserialize_any(StringOrSeq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_conditional_tokens() {
        let json = r#"[
            "--username",
            "${auth_player_name}",
            {
                "rules": [{ "action": "allow", "features": { "has_custom_resolution": true } }],
                "value": ["--width", "${resolution_width}"]
            },
            {
                "rules": [{ "action": "allow", "os": { "name": "osx" } }],
                "value": "-XstartOnFirstThread"
            }
        ]"#;
        let tokens: Vec<ArgToken> = serde_json::from_str(json).unwrap();
        assert_eq!(tokens.len(), 4);
        assert!(matches!(&tokens[0], ArgToken::Literal(s) if s == "--username"));
        match &tokens[2] {
            ArgToken::Conditional { values, .. } => assert_eq!(values.len(), 2),
            _ => panic!("expected conditional token"),
        }
        match &tokens[3] {
            ArgToken::Conditional { values, .. } => {
                assert_eq!(values, &vec!["-XstartOnFirstThread".to_string()])
            }
            _ => panic!("expected conditional token"),
        }
    }

    #[test]
    fn library_with_natives_block() {
        let json = r#"{
            "name": "org.lwjgl:lwjgl:3.2.2",
            "downloads": {
                "artifact": {
                    "path": "org/lwjgl/lwjgl/3.2.2/lwjgl-3.2.2.jar",
                    "url": "https://libraries.minecraft.net/org/lwjgl/lwjgl/3.2.2/lwjgl-3.2.2.jar",
                    "sha1": "9e7cde1e0e8b8e9a35c5eef40de5a40bd6e1967d",
                    "size": 318331
                },
                "classifiers": {
                    "natives-linux": {
                        "path": "org/lwjgl/lwjgl/3.2.2/lwjgl-3.2.2-natives-linux.jar",
                        "url": "https://libraries.minecraft.net/org/lwjgl/lwjgl/3.2.2/lwjgl-3.2.2-natives-linux.jar",
                        "sha1": "ea1d577b9dbbbe44bd3d3a53dfd9cbbb32b345e2",
                        "size": 87484
                    }
                }
            },
            "natives": { "linux": "natives-linux", "windows": "natives-windows-${arch}" },
            "extract": { "exclude": ["META-INF/"] }
        }"#;
        let library: LibraryEntry = serde_json::from_str(json).unwrap();
        let natives = library.natives.unwrap();
        assert_eq!(natives["windows"], "natives-windows-${arch}");
        assert_eq!(library.extract.unwrap().exclude, vec!["META-INF/"]);
    }

    #[test]
    fn inherits_from_and_legacy_arguments() {
        let json = r#"{
            "id": "fabric-loader-0.14.21-1.20.1",
            "inheritsFrom": "1.20.1",
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
            "minecraftArguments": "--username ${auth_player_name} --gameDir ${game_directory}"
        }"#;
        let descriptor: VersionDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.inherits_from.as_deref(), Some("1.20.1"));
        assert!(descriptor.minecraft_arguments.is_some());
        assert!(descriptor.arguments.is_none());
    }
}
