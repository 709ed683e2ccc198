//! # Resolution Cache
//!
//! Time-bounded cache in front of slow identifier resolution calls, with at
//! most one in-flight fetch per fingerprint.
//!
//! ## Semantics
//!
//! - A fresh entry is returned without calling the fetch function.
//! - On a miss the first caller runs the fetch; concurrent callers for the same
//!   fingerprint wait on that single call and receive its result.
//! - Successful resolutions (including `NotFound`) live for the success TTL.
//! - Terminal failures are stored as `Error` entries for the failure TTL.
//! - Transient failures are returned to the waiting callers but never stored,
//!   so the next request fetches again.
//! - Expiry is per entry: `Error` entries use the failure TTL, everything
//!   else the success TTL. A TTL of zero means the entry is expired as soon
//!   as it is written.

use crate::config::CacheConfig;
use crate::constants::FINGERPRINT_SEPARATOR;
use crate::external::{ExternalCallError, Resolution, ResolutionStatus};
use chrono::{DateTime, Utc};
use moka::Expiry;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache key: resolver identity plus normalized input identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Identifiers are trimmed; case is preserved since many namespaces are case sensitive
    pub fn new(resolver: &str, identifier: &str) -> Self {
        Self(format!(
            "{resolver}{FINGERPRINT_SEPARATOR}{}",
            identifier.trim()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.replace(FINGERPRINT_SEPARATOR, ":"))
    }
}

/// A cached resolution
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub resolution: Resolution,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn status(&self) -> ResolutionStatus {
        self.resolution.status
    }
}

/// Point-in-time cache counters
///
/// `entries` comes from moka and only reflects maintenance that has already
/// run; see [`ResolutionCache::run_pending_tasks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
    pub fetches: u64,
    pub entries: u64,
}

/// Success TTL for resolved and not-found entries, failure TTL for errors
#[derive(Debug, Clone, Copy)]
struct ResolutionExpiry {
    success_ttl: Duration,
    failure_ttl: Duration,
}

impl Expiry<Fingerprint, CacheEntry> for ResolutionExpiry {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        match value.status() {
            ResolutionStatus::Error => Some(self.failure_ttl),
            _ => Some(self.success_ttl),
        }
    }
}

pub struct ResolutionCache {
    cache: moka::future::Cache<Fingerprint, CacheEntry>,
    success_ttl: Duration,
    failure_ttl: Duration,
    lookups: AtomicU64,
    fetches: AtomicU64,
}

impl ResolutionCache {
    pub fn new(success_ttl: Duration, failure_ttl: Duration) -> Self {
        Self::with_capacity(CacheConfig::default().max_entries, success_ttl, failure_ttl)
    }

    pub fn with_capacity(max_entries: u64, success_ttl: Duration, failure_ttl: Duration) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(max_entries)
            .expire_after(ResolutionExpiry {
                success_ttl,
                failure_ttl,
            })
            .build();

        debug!(
            max_entries,
            success_ttl_ms = success_ttl.as_millis() as u64,
            failure_ttl_ms = failure_ttl.as_millis() as u64,
            "Resolution cache created"
        );

        Self {
            cache,
            success_ttl,
            failure_ttl,
            lookups: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_capacity(config.max_entries, config.success_ttl(), config.failure_ttl())
    }

    /// Return the cached entry or run `fetch` once for all concurrent callers
    ///
    /// Transient errors are handed back to every waiting caller and leave
    /// nothing behind; terminal errors become `Error` entries.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        fetch: F,
    ) -> Result<CacheEntry, ExternalCallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Resolution, ExternalCallError>>,
    {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let init = async {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %fingerprint, "Resolution cache MISS, fetching");
            let resolution = match fetch().await {
                Ok(resolution) => resolution,
                Err(error) if error.is_transient() => {
                    debug!(fingerprint = %fingerprint, error = %error, "Transient failure not cached");
                    return Err(error);
                }
                Err(error) => Resolution::failed(error.to_string()),
            };
            Ok(CacheEntry {
                fingerprint: fingerprint.clone(),
                resolution,
                created_at: Utc::now(),
            })
        };

        self.cache
            .try_get_with(fingerprint.clone(), init)
            .await
            .map_err(|shared| (*shared).clone())
    }

    /// Fresh entry for the fingerprint, if any
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.cache.get(fingerprint).await
    }

    pub async fn invalidate(&self, fingerprint: &Fingerprint) {
        self.cache.invalidate(fingerprint).await;
    }

    /// Drop every stored entry
    pub fn clear(&self) {
        self.cache.invalidate_all();
        debug!("Resolution cache cleared");
    }

    /// Apply pending evictions and invalidations so counts are current
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.lookups.load(Ordering::Relaxed);
        let fetches = self.fetches.load(Ordering::Relaxed);
        CacheStats {
            lookups,
            hits: lookups.saturating_sub(fetches),
            fetches,
            entries: self.cache.entry_count(),
        }
    }
}

impl fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("max_capacity", &self.cache.policy().max_capacity())
            .field("entry_count", &self.cache.entry_count())
            .field("success_ttl", &self.success_ttl)
            .field("failure_ttl", &self.failure_ttl)
            .finish()
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
