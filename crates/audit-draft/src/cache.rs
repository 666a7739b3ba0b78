//! Read cache for versions and drafts using moka
//!
//! Nothing here invalidates itself on writes. Commits return the
//! [`CacheKey`]s they made stale and the caller applies them with
//! [`ReadCache::apply`].

use crate::store::DraftSnapshot;
use audit_model::{AnalysisVersion, VersionId};
use moka::future::Cache;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A cached read that a write can make stale
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A committed version
    Version(VersionId),
    /// The draft staged on a version
    Draft(VersionId),
    /// Finding listings of a version
    Findings(VersionId),
}

impl CacheKey {
    #[inline]
    #[must_use]
    pub fn version_id(&self) -> &VersionId {
        match self {
            Self::Version(id) | Self::Draft(id) | Self::Findings(id) => id,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(id) => write!(f, "version:{id}"),
            Self::Draft(id) => write!(f, "draft:{id}"),
            Self::Findings(id) => write!(f, "findings:{id}"),
        }
    }
}

/// Cached store reads
#[derive(Debug, Clone)]
pub struct ReadCache {
    versions: Cache<VersionId, Arc<AnalysisVersion>>,
    drafts: Cache<VersionId, Arc<DraftSnapshot>>,
}

impl ReadCache {
    /// Create a cache holding up to `max_capacity` entries of each kind
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            versions: Cache::new(max_capacity),
            drafts: Cache::new(max_capacity),
        }
    }

    /// Create a cache whose entries expire after `ttl`
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            versions: Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build(),
            drafts: Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build(),
        }
    }

    #[inline]
    pub async fn insert_version(&self, version: Arc<AnalysisVersion>) {
        self.versions.insert(version.id().clone(), version).await;
    }

    #[inline]
    pub async fn version(&self, id: &VersionId) -> Option<Arc<AnalysisVersion>> {
        self.versions.get(id).await
    }

    #[inline]
    pub async fn insert_draft(&self, snapshot: Arc<DraftSnapshot>) {
        self.drafts.insert(snapshot.base.id().clone(), snapshot).await;
    }

    #[inline]
    pub async fn draft(&self, version_id: &VersionId) -> Option<Arc<DraftSnapshot>> {
        self.drafts.get(version_id).await
    }

    /// Cached version, or fetch and cache it
    ///
    /// # Errors
    /// Whatever `fetch` returns; failures are not cached
    pub async fn version_or_fetch<E, F, Fut>(&self, id: &VersionId, fetch: F) -> Result<Arc<AnalysisVersion>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AnalysisVersion, E>>,
    {
        if let Some(cached) = self.version(id).await {
            return Ok(cached);
        }
        let version = Arc::new(fetch().await?);
        self.insert_version(Arc::clone(&version)).await;
        Ok(version)
    }

    /// Cached draft, or fetch and cache it
    ///
    /// # Errors
    /// Whatever `fetch` returns; failures are not cached
    pub async fn draft_or_fetch<E, F, Fut>(&self, version_id: &VersionId, fetch: F) -> Result<Arc<DraftSnapshot>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DraftSnapshot, E>>,
    {
        if let Some(cached) = self.draft(version_id).await {
            return Ok(cached);
        }
        let snapshot = Arc::new(fetch().await?);
        self.insert_draft(Arc::clone(&snapshot)).await;
        Ok(snapshot)
    }

    /// Drop the entries behind `keys`
    pub async fn apply(&self, keys: &[CacheKey]) {
        for key in keys {
            match key {
                // Findings are served from the cached version record
                CacheKey::Version(id) | CacheKey::Findings(id) => self.versions.invalidate(id).await,
                CacheKey::Draft(id) => self.drafts.invalidate(id).await,
            }
            tracing::trace!(key = %key, "cache entry invalidated");
        }
    }

    /// Invalidate all entries
    #[inline]
    pub fn invalidate_all(&self) {
        self.versions.invalidate_all();
        self.drafts.invalidate_all();
    }

    /// Approximate entry count across both caches
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.versions.entry_count() + self.drafts.entry_count()
    }
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_test_utils::scenario_base_version;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn fetches_once_then_serves_from_cache() {
        let cache = ReadCache::default();
        let calls = AtomicUsize::new(0);
        let id = VersionId::new("v1");

        for _ in 0..3 {
            let version = cache
                .version_or_fetch(&id, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(scenario_base_version())
                })
                .await
                .unwrap();
            assert_eq!(version.id(), &id);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let cache = ReadCache::default();
        let id = VersionId::new("v1");

        let result = cache.version_or_fetch(&id, || async { Err("offline") }).await;
        assert_eq!(result.unwrap_err(), "offline");
        assert!(cache.version(&id).await.is_none());
    }

    #[tokio::test]
    async fn apply_drops_named_entries_only() {
        let cache = ReadCache::default();
        let base = Arc::new(scenario_base_version());
        cache.insert_version(Arc::clone(&base)).await;
        cache
            .insert_draft(Arc::new(DraftSnapshot {
                base: AnalysisVersion::clone(&base),
                changes: Vec::new(),
            }))
            .await;

        cache.apply(&[CacheKey::Draft(base.id().clone())]).await;
        assert!(cache.draft(base.id()).await.is_none());
        assert!(cache.version(base.id()).await.is_some());

        cache.apply(&[CacheKey::Findings(base.id().clone())]).await;
        assert!(cache.version(base.id()).await.is_none());
    }

    #[test]
    fn keys_display_with_kind() {
        let key = CacheKey::Draft(VersionId::new("v1"));
        assert_eq!(key.to_string(), "draft:v1");
        assert_eq!(key.version_id().as_str(), "v1");
    }
}
