// Market data domain
pub mod candle;
pub mod codec;
pub mod granularity;
pub mod signal;
pub mod snapshot;
pub mod window;
