// Copyright 2024 Felix Engl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Response cache: an in-memory TTL layer backed by an optional on-disk
//! store, keyed by the hex digest of the URL. Only HTML responses are
//! cached — the frontier re-fetches everything else every run.

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use url::Url;

use crate::config::CacheConfig;

/// A cached response body and the headers needed for conditional GETs
/// and staleness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub body: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub cached_at: OffsetDateTime,
}

fn cache_key(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    data_encoding::HEXLOWER.encode(&hasher.finalize())
}

fn is_html(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(false)
}

pub struct ResponseCache {
    enabled: bool,
    ttl: Option<std::time::Duration>,
    disk_dir: Option<PathBuf>,
    memory: Cache<String, Arc<CachedResponse>>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let mut builder = Cache::builder();
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            enabled: config.enabled,
            ttl: config.ttl,
            disk_dir: config.disk_cache_dir.clone(),
            memory: builder.build(),
        }
    }

    fn disk_path(&self, key: &str) -> Option<PathBuf> {
        self.disk_dir.as_ref().map(|dir| dir.join(format!("{key}.json")))
    }

    pub async fn get(&self, url: &Url) -> Option<Arc<CachedResponse>> {
        if !self.enabled {
            return None;
        }
        let key = cache_key(url);
        if let Some(hit) = self.memory.get(&key).await {
            log::debug!("cache hit (memory): {url}");
            return Some(hit);
        }
        let path = self.disk_path(&key)?;
        let raw = tokio::fs::read(&path).await.ok()?;
        let cached: CachedResponse = serde_json::from_slice(&raw).ok()?;
        if let Some(ttl) = self.ttl {
            let age = OffsetDateTime::now_utc() - cached.cached_at;
            if age > time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX) {
                let _ = tokio::fs::remove_file(&path).await;
                log::debug!("cache expired (disk): {url}");
                return None;
            }
        }
        log::debug!("cache hit (disk): {url}");
        let cached = Arc::new(cached);
        self.memory.insert(key, Arc::clone(&cached)).await;
        Some(cached)
    }

    pub async fn set(
        &self,
        url: &Url,
        content_type: Option<&str>,
        body: String,
        etag: Option<String>,
        last_modified: Option<String>,
    ) {
        if !self.enabled || !is_html(content_type) {
            return;
        }
        let key = cache_key(url);
        let entry = Arc::new(CachedResponse {
            body,
            etag,
            last_modified,
            cached_at: OffsetDateTime::now_utc(),
        });
        self.memory.insert(key.clone(), Arc::clone(&entry)).await;
        if let Some(path) = self.disk_path(&key) {
            if let Some(parent) = path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    log::warn!("failed to create cache dir {}: {e}", parent.display());
                    return;
                }
            }
            match serde_json::to_vec(entry.as_ref()) {
                Ok(bytes) => {
                    if let Err(e) = tokio::fs::write(&path, bytes).await {
                        log::warn!("failed to write cache file {}: {e}", path.display());
                    }
                }
                Err(e) => log::warn!("failed to serialize cache entry for {url}: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            ttl: None,
            disk_cache_dir: None,
        }
    }

    #[tokio::test]
    async fn memory_roundtrip_for_html() {
        let cache = ResponseCache::new(&config());
        let url = Url::parse("http://example.com/").unwrap();
        cache
            .set(&url, Some("text/html; charset=utf-8"), "<html></html>".into(), None, None)
            .await;
        let hit = cache.get(&url).await;
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().body, "<html></html>");
    }

    #[tokio::test]
    async fn non_html_is_never_cached() {
        let cache = ResponseCache::new(&config());
        let url = Url::parse("http://example.com/file.pdf").unwrap();
        cache
            .set(&url, Some("application/pdf"), "binary".into(), None, None)
            .await;
        assert!(cache.get(&url).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_is_always_a_miss() {
        let mut cfg = config();
        cfg.enabled = false;
        let cache = ResponseCache::new(&cfg);
        let url = Url::parse("http://example.com/").unwrap();
        cache
            .set(&url, Some("text/html"), "<html></html>".into(), None, None)
            .await;
        assert!(cache.get(&url).await.is_none());
    }
}
