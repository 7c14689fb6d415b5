pub mod driver;
pub mod orchestrator;

pub use driver::{SyncCommand, SyncDriver, SyncHandle, SyncStatus};
pub use orchestrator::{SyncDependencies, SyncOrchestrator, SyncReport, SyncSettings};
