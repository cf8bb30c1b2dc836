pub mod descriptor;
pub mod manifest;
pub mod resolver;
pub mod rules;

pub use descriptor::{ArgToken, LibraryEntry, Rule, RuleAction, VersionDescriptor};
pub use manifest::{VersionEntry, VersionManifestIndex};
pub use resolver::{LibraryRole, ResolvedLibrary, ResolvedProfile};
pub use rules::RuleHost;
