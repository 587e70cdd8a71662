//! Verdict caching for judges.
//!
//! Identical (kind, text, context) calls return the stored verdict instead of
//! calling the judge again. Only successful verdicts are cached.

use async_trait::async_trait;
use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use guardian_core::{CacheSettings, JudgeKind, JudgeVerdict};

use crate::judges::{Judge, JudgeError, JudgeRequest};

/// Cache key for judge verdicts.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: JudgeKind,
    text_hash: u64,
    context_hash: u64,
}

impl CacheKey {
    pub fn new(request: &JudgeRequest) -> Self {
        Self {
            kind: request.kind,
            text_hash: hash_str(&request.text),
            context_hash: request.context.as_deref().map(hash_str).unwrap_or(0),
        }
    }
}

fn hash_str(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// A judge decorated with a moka cache.
pub struct CachedJudge {
    inner: Arc<dyn Judge>,
    cache: Cache<CacheKey, JudgeVerdict>,
}

impl CachedJudge {
    pub fn new(inner: Arc<dyn Judge>, max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { inner, cache }
    }

    pub fn from_settings(inner: Arc<dyn Judge>, settings: &CacheSettings) -> Self {
        Self::new(inner, settings.max_entries, settings.ttl)
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl Judge for CachedJudge {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        let key = CacheKey::new(request);
        if let Some(verdict) = self.cache.get(&key).await {
            tracing::debug!(kind = %request.kind, "Judge cache hit");
            return Ok(verdict);
        }

        let verdict = self.inner.judge(request).await?;
        self.cache.insert(key, verdict.clone()).await;
        Ok(verdict)
    }
}
