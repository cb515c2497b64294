use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::CoreError;

use super::backend::CacheBackend;
use super::cache_key::QueryIdentity;

/// What gets persisted per cached query. Overwritten wholesale, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: serde_json::Value,
    pub stored_at: DateTime<Utc>,
    pub ttl_ms: u64,
    /// Canonical query identity, for diagnostics
    pub source_key: String,
}

impl CacheEntry {
    /// Fresh while `now - stored_at < ttl`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.stored_at).num_milliseconds();
        age_ms < self.ttl_ms as i64
    }
}

/// Time-bounded result cache in front of the fan-out layer.
///
/// The cache is not an authority: an absent, expired, corrupt or
/// unreadable entry is a miss and the caller fetches. Only `set` reports
/// errors, and callers are expected to log and carry on.
#[derive(Clone)]
pub struct TtlCache {
    backend: Arc<dyn CacheBackend>,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache").finish_non_exhaustive()
    }
}

impl TtlCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn get<T: DeserializeOwned>(&self, identity: &QueryIdentity) -> Option<T> {
        self.get_at(identity, Utc::now())
    }

    /// [`get`](Self::get) evaluated at an explicit instant.
    pub fn get_at<T: DeserializeOwned>(
        &self,
        identity: &QueryIdentity,
        now: DateTime<Utc>,
    ) -> Option<T> {
        let name = identity.digest();
        let entry = self.load(&name)?;

        if !entry.is_fresh_at(now) {
            tracing::debug!(key = %entry.source_key, "Cache entry expired");
            self.delete_quietly(&name);
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(data) => {
                tracing::debug!(key = %entry.source_key, "Cache hit");
                Some(data)
            }
            Err(e) => {
                tracing::warn!(
                    key = %entry.source_key,
                    error = %e,
                    "Cached data has unexpected shape; treating as miss"
                );
                self.delete_quietly(&name);
                None
            }
        }
    }

    pub fn set<T: Serialize>(
        &self,
        identity: &QueryIdentity,
        data: &T,
        ttl: Duration,
    ) -> Result<(), CoreError> {
        self.set_at(identity, data, ttl, Utc::now())
    }

    /// [`set`](Self::set) with an explicit storage instant.
    pub fn set_at<T: Serialize>(
        &self,
        identity: &QueryIdentity,
        data: &T,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let data = serde_json::to_value(data).map_err(|e| {
            CoreError::Serialization(format!("Failed to serialize cached data: {e}"))
        })?;
        let entry = CacheEntry {
            data,
            stored_at: now,
            ttl_ms: ttl.as_millis() as u64,
            source_key: identity.canonical(),
        };
        let bytes = serde_json::to_vec(&entry).map_err(|e| {
            CoreError::Serialization(format!("Failed to serialize cache entry: {e}"))
        })?;
        self.backend.write(&identity.digest(), &bytes)
    }

    /// The stored entry for `identity` regardless of freshness. Unlike
    /// [`get`](Self::get) this reports backend and decode failures.
    pub fn entry(&self, identity: &QueryIdentity) -> Result<Option<CacheEntry>, CoreError> {
        self.read_entry(&identity.digest())
    }

    /// Drop the entry for `identity`, if any.
    pub fn invalidate(&self, identity: &QueryIdentity) -> Result<(), CoreError> {
        self.backend.delete(&identity.digest())
    }

    /// Delete every expired or unreadable entry. Returns how many went.
    pub fn sweep(&self) -> Result<usize, CoreError> {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, CoreError> {
        let mut removed = 0;
        for name in self.backend.list()? {
            let keep = self.load(&name).is_some_and(|entry| entry.is_fresh_at(now));
            if !keep {
                self.backend.delete(&name)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Swept expired cache entries");
        }
        Ok(removed)
    }

    /// Delete everything. Returns how many entries went.
    pub fn clear(&self) -> Result<usize, CoreError> {
        let names = self.backend.list()?;
        for name in &names {
            self.backend.delete(name)?;
        }
        Ok(names.len())
    }

    fn read_entry(&self, name: &str) -> Result<Option<CacheEntry>, CoreError> {
        match self.backend.read(name)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read and decode an entry; any failure is logged and reported as `None`.
    fn load(&self, name: &str) -> Option<CacheEntry> {
        match self.read_entry(name) {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => {
                tracing::debug!(entry = name, "Cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(
                    entry = name,
                    error = %e,
                    "Unreadable cache entry; treating as miss"
                );
                None
            }
        }
    }

    fn delete_quietly(&self, name: &str) {
        if let Err(e) = self.backend.delete(name) {
            tracing::warn!(entry = name, error = %e, "Failed to delete cache entry");
        }
    }
}
