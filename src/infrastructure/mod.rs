// HTTP plumbing shared by remote clients
pub mod core;

// In-memory collaborators for tests and offline runs
pub mod mock;

// Render sinks
pub mod render;

// Terminal web API client
pub mod terminal_api;

pub use mock::{MockTerminalClient, RecordingRenderGate};
pub use render::LoggingRenderGate;
pub use terminal_api::TerminalApiClient;
