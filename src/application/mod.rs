// Per-granularity window maintenance and signal caching
pub mod market_data;

// Sync orchestration and tick scheduling
pub mod sync;
