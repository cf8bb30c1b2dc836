pub mod catalog;
pub mod logs;
pub mod model;

pub use catalog::InstanceCatalog;
pub use logs::{classify_line, LogBuffer, LogStore, TaggedLine};
pub use model::{InstanceConfig, InstanceDirs, ModloaderType, Resolution};
