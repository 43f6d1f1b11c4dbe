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

//! Per-host robots.txt: fetch, parse, cache. Any failure to fetch or
//! parse falls back to an allow-all entry — a broken robots.txt should
//! never stall the crawl.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use texting_robots::Robot;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum RobotsError {
    #[error("could not fetch robots.txt for {0}")]
    Fetch(String),
    #[error("url has no host: {0}")]
    NoHost(String),
}

/// A parsed robots.txt, or the fact that the host has none (or one we
/// could not retrieve — treated identically).
enum Entry {
    Present(Robot),
    Absent,
}

impl Entry {
    fn allowed(&self, path: &str) -> bool {
        match self {
            Entry::Present(robot) => robot.allowed(path),
            Entry::Absent => true,
        }
    }

    fn crawl_delay(&self) -> Option<Duration> {
        match self {
            Entry::Present(robot) => robot.delay.map(Duration::from_secs_f32),
            Entry::Absent => None,
        }
    }

    fn sitemaps(&self) -> Vec<Url> {
        match self {
            Entry::Present(robot) => robot
                .sitemaps
                .iter()
                .filter_map(|s| Url::parse(s).ok())
                .collect(),
            Entry::Absent => Vec::new(),
        }
    }
}

fn robots_txt_url(url: &Url) -> Result<Url, RobotsError> {
    let mut robots_url = url.clone();
    robots_url.set_path("/robots.txt");
    robots_url.set_query(None);
    robots_url.set_fragment(None);
    Ok(robots_url)
}

fn host_key(url: &Url) -> Result<String, RobotsError> {
    url.host_str()
        .map(|h| format!("{}://{h}", url.scheme()))
        .ok_or_else(|| RobotsError::NoHost(url.to_string()))
}

/// Per-host robots.txt cache with a TTL, backed by a `reqwest::Client`
/// for retrieval.
pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    cache: Cache<String, Arc<Entry>>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, user_agent: String, ttl: Duration) -> Self {
        Self {
            client,
            user_agent,
            cache: Cache::builder().time_to_live(ttl).build(),
        }
    }

    async fn entry_for(&self, url: &Url) -> Result<Arc<Entry>, RobotsError> {
        let key = host_key(url)?;
        if let Some(entry) = self.cache.get(&key).await {
            return Ok(entry);
        }
        let entry = Arc::new(self.fetch_entry(url).await);
        self.cache.insert(key, Arc::clone(&entry)).await;
        Ok(entry)
    }

    async fn fetch_entry(&self, url: &Url) -> Entry {
        let robots_url = match robots_txt_url(url) {
            Ok(u) => u,
            Err(_) => return Entry::Absent,
        };
        let response = match self.client.get(robots_url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("failed to fetch robots.txt at {robots_url}: {e}");
                return Entry::Absent;
            }
        };
        if !response.status().is_success() {
            log::debug!(
                "no robots.txt at {robots_url} (status {})",
                response.status()
            );
            return Entry::Absent;
        }
        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                log::warn!("failed to read robots.txt body at {robots_url}: {e}");
                return Entry::Absent;
            }
        };
        match Robot::new(&self.user_agent, bytes.as_ref()) {
            Ok(robot) => Entry::Present(robot),
            Err(e) => {
                log::warn!("failed to parse robots.txt at {robots_url}: {e}");
                Entry::Absent
            }
        }
    }

    /// Whether `url` may be fetched, per the cached robots.txt for its host.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        match self.entry_for(url).await {
            Ok(entry) => {
                let mut path = url.path().to_string();
                if let Some(query) = url.query() {
                    path.push('?');
                    path.push_str(query);
                }
                entry.allowed(&path)
            }
            Err(_) => true,
        }
    }

    /// The `Crawl-delay` directive for `url`'s host, if any.
    pub async fn crawl_delay(&self, url: &Url) -> Option<Duration> {
        self.entry_for(url).await.ok()?.crawl_delay()
    }

    /// Sitemap URLs advertised in the host's robots.txt.
    pub async fn sitemaps_for(&self, url: &Url) -> Vec<Url> {
        self.entry_for(url)
            .await
            .map(|e| e.sitemaps())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn robots_txt_url_replaces_path_and_strips_query() {
        let url = Url::parse("https://example.com/a/b?x=1#frag").unwrap();
        let robots = robots_txt_url(&url).unwrap();
        assert_eq!(robots.as_str(), "https://example.com/robots.txt");
    }

    #[test]
    fn absent_entry_allows_everything() {
        let entry = Entry::Absent;
        assert!(entry.allowed("/anything"));
        assert_eq!(entry.crawl_delay(), None);
        assert!(entry.sitemaps().is_empty());
    }
}
