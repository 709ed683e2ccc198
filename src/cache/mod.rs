//! Caching of external resolution results.

pub mod resolution_cache;

pub use resolution_cache::{CacheEntry, CacheStats, Fingerprint, ResolutionCache};
