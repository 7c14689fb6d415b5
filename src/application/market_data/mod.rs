// Market data processing modules
pub mod boundary_reconciler;
pub mod signal_cache;
