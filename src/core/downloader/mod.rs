pub mod executor;
pub mod plan;

pub use executor::{DownloadExecutor, FetchRole, FetchTask};
pub use plan::{plan_profile_tasks, AssetIndexDocument};
