// Market data domain
pub mod market;

// Port interfaces
pub mod ports;

// Engine lifecycle
pub mod sync;

// Domain-specific error types
pub mod errors;
