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

//! The crawl coordination engine: claims URLs off the frontier, runs
//! each through rate-limit/cache/fetch/extract/enqueue, and drives the
//! pipeline. Everything else in this crate exists to be injected here.

use crate::budget::Budget;
use crate::cache::ResponseCache;
use crate::config::CrawlerConfig;
use crate::dedup::Deduplicator;
use crate::extractor::{run_extractors, Extractor};
use crate::fetch::{fetch_with_retry, Fetch, FetchOptions};
use crate::filter::Filter;
use crate::frontier::{Frontier, PushOutcome};
use crate::incremental::{IncrementalStore, RevisitRecord};
use crate::model::{
    ContentInfo, CrawlError, CrawlJob, CrawlMeta, DiscoveryMethod, FrontierItem, Headers,
    HttpInfo, PageArtifact,
};
use crate::pipeline::{run_pipeline, PipelineStage};
use crate::rate_limiter::RateLimiter;
use crate::robots::RobotsCache;
use crate::visited::VisitedSet;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use url::Url;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint (de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_SKIPPED_EXTERNAL_CAP: usize = 10_000;

fn link_selector() -> Selector {
    Selector::parse("a[href]").expect("static selector is valid")
}

/// Persisted `{ queue, visited_urls, results, metadata, saved_at }`
/// document from the external-interfaces checkpoint format.
#[derive(Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub queue: Vec<(String, u32)>,
    pub visited_urls: Vec<String>,
    pub results: HashMap<String, PageArtifact>,
    pub metadata: HashMap<String, String>,
    pub saved_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
struct ScopeState {
    seed_host: String,
    seed_path: String,
}

/// Computed once per run from the first seed URL; scope restrictions are
/// always anchored to the seed, never to whichever page is currently
/// being processed.
fn compute_scope(config: &CrawlerConfig) -> ScopeState {
    match config.seed_urls.first() {
        Some(seed) => ScopeState {
            seed_host: seed.host_str().unwrap_or_default().to_ascii_lowercase(),
            seed_path: normalized_seed_path(seed),
        },
        None => ScopeState {
            seed_host: String::new(),
            seed_path: "/".to_string(),
        },
    }
}

/// The coordination engine, owning every injected capability.
pub struct Scheduler {
    config: CrawlerConfig,
    fetcher: Arc<dyn Fetch>,
    frontier: Arc<Frontier>,
    visited: Arc<VisitedSet>,
    rate_limiter: Arc<RateLimiter>,
    robots: Option<Arc<RobotsCache>>,
    budget: Arc<Budget>,
    cache: Arc<ResponseCache>,
    dedup: Arc<Deduplicator>,
    incremental: Option<Arc<dyn IncrementalStore>>,
    filter: Option<Arc<Filter>>,
    extractors: Arc<Vec<Box<dyn Extractor>>>,
    pipeline_stages: Arc<Vec<Box<dyn PipelineStage>>>,
    results: Arc<Mutex<HashMap<String, PageArtifact>>>,
    robots_skipped: Arc<Mutex<Vec<Url>>>,
    skipped_external: Arc<Mutex<Vec<Url>>>,
    paused: Arc<AtomicBool>,
    run_id: Uuid,
    scope: ScopeState,
}

impl Scheduler {
    pub fn new(config: CrawlerConfig, fetcher: Arc<dyn Fetch>) -> Self {
        let robots = config.respect_robots_txt.then(|| {
            Arc::new(RobotsCache::new(
                reqwest::Client::new(),
                config.user_agent.as_str().into_owned(),
                Duration::from_secs(3600),
            ))
        });
        let scope = compute_scope(&config);
        Self {
            fetcher,
            frontier: Arc::new(Frontier::new(config.max_queue_size)),
            visited: Arc::new(VisitedSet::new()),
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            robots,
            budget: Arc::new(Budget::new(config.budget.clone())),
            cache: Arc::new(ResponseCache::new(&config.cache)),
            dedup: Arc::new(Deduplicator::new(config.dedup.clone())),
            incremental: None,
            filter: None,
            extractors: Arc::new(Vec::new()),
            pipeline_stages: Arc::new(Vec::new()),
            results: Arc::new(Mutex::new(HashMap::new())),
            robots_skipped: Arc::new(Mutex::new(Vec::new())),
            skipped_external: Arc::new(Mutex::new(Vec::new())),
            paused: Arc::new(AtomicBool::new(false)),
            run_id: Uuid::new_v4(),
            scope,
            config,
        }
    }

    pub fn with_incremental_store(mut self, store: Arc<dyn IncrementalStore>) -> Self {
        self.incremental = Some(store);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_extractors(mut self, extractors: Vec<Box<dyn Extractor>>) -> Self {
        self.extractors = Arc::new(extractors);
        self
    }

    pub fn with_pipeline_stages(mut self, stages: Vec<Box<dyn PipelineStage>>) -> Self {
        self.pipeline_stages = Arc::new(stages);
        self
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub async fn budget_stats(&self) -> crate::budget::BudgetStats {
        self.budget.stats()
    }

    async fn wait_while_paused(&self) {
        while self.paused.load(Ordering::SeqCst) {
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
        }
    }

    async fn record_skipped_external(&self, url: &Url) {
        let mut skipped = self.skipped_external.lock().await;
        if skipped.len() < DEFAULT_SKIPPED_EXTERNAL_CAP {
            skipped.push(url.clone());
        }
    }

    async fn record_robots_skipped(&self, url: &Url) {
        let mut skipped = self.robots_skipped.lock().await;
        if skipped.len() < DEFAULT_SKIPPED_EXTERNAL_CAP {
            skipped.push(url.clone());
        }
    }

    /// Enqueues `item` if `should_crawl` holds and the frontier has
    /// capacity, recording why it didn't for reporting purposes. Used
    /// only during sitemap bootstrap; the per-URL worker uses the
    /// equivalent method on [`SchedulerHandles`].
    async fn try_enqueue(&self, item: FrontierItem) {
        if item.depth > self.config.max_depth {
            return;
        }
        let is_external = self.config.scope.internal_only
            && !item
                .url
                .host_str()
                .is_some_and(|h| h.eq_ignore_ascii_case(&self.scope.seed_host));
        let within_path = !self.config.scope.same_path_only
            || self.scope.seed_path == "/"
            || item.url.path().starts_with(&self.scope.seed_path);
        let passes_filter = match &self.filter {
            Some(f) => f.is_allowed(&item.url),
            None => true,
        };

        if self.visited.contains(&item.url) || is_external || !within_path || !passes_filter {
            if is_external {
                self.record_skipped_external(&item.url).await;
            }
            return;
        }
        if let Some(robots) = &self.robots {
            if !robots.is_allowed(&item.url).await {
                self.record_robots_skipped(&item.url).await;
                return;
            }
        }
        if let PushOutcome::DroppedOverCapacity = self.frontier.push(item).await {
            log::debug!("frontier over capacity, dropping enqueue");
        }
    }

    /// Runs the crawl to completion: seeds the frontier, bootstraps
    /// sitemaps if configured, then drains the frontier with up to
    /// `max_workers` URLs in flight at once.
    pub async fn run(&self) -> CrawlJob {
        let job = CrawlJob::new(self.run_id, self.config.seed_urls.clone());

        for seed in &self.config.seed_urls {
            self.frontier.push(FrontierItem::seed(seed.clone())).await;
        }

        if self.config.sitemap_bootstrap {
            self.bootstrap_sitemaps().await;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        loop {
            self.wait_while_paused().await;

            if self.budget.is_exceeded() {
                break;
            }

            let item = match self.frontier.pop().await {
                Some(item) => item,
                None => {
                    if tasks.is_empty() {
                        break;
                    }
                    tasks.join_next().await;
                    continue;
                }
            };

            if item.depth > self.config.max_depth {
                continue;
            }
            if !self.visited.claim(&item.url) {
                continue;
            }

            let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore closed");
            if self.budget.can_crawl_page().is_err() {
                drop(permit);
                break;
            }
            let this = self.clone_handles();
            tasks.spawn(async move {
                let _permit = permit;
                this.process_url(item).await;
            });
        }

        while tasks.join_next().await.is_some() {}
        job
    }

    /// A cheap clone of the `Arc`-backed handles needed inside a
    /// spawned task, without cloning the scheduler's owned config.
    fn clone_handles(&self) -> SchedulerHandles {
        SchedulerHandles {
            config: self.config.clone(),
            fetcher: Arc::clone(&self.fetcher),
            frontier: Arc::clone(&self.frontier),
            visited: Arc::clone(&self.visited),
            rate_limiter: Arc::clone(&self.rate_limiter),
            robots: self.robots.clone(),
            budget: Arc::clone(&self.budget),
            cache: Arc::clone(&self.cache),
            dedup: Arc::clone(&self.dedup),
            incremental: self.incremental.clone(),
            filter: self.filter.clone(),
            extractors: Arc::clone(&self.extractors),
            pipeline_stages: Arc::clone(&self.pipeline_stages),
            results: Arc::clone(&self.results),
            robots_skipped: Arc::clone(&self.robots_skipped),
            skipped_external: Arc::clone(&self.skipped_external),
            run_id: self.run_id,
            scope: self.scope.clone(),
        }
    }

    async fn bootstrap_sitemaps(&self) {
        let mut candidates = self.config.sitemap_urls.clone();
        for seed in &self.config.seed_urls {
            if let Some(robots) = &self.robots {
                candidates.extend(robots.sitemaps_for(seed).await);
            }
            if candidates.is_empty() {
                candidates.extend(crate::sitemap::default_candidates(seed));
            }
        }
        let urls = crate::sitemap::collect_sitemap_urls(self.fetcher.as_ref(), candidates).await;
        if let Some(seed) = self.config.seed_urls.first() {
            for url in urls {
                self.try_enqueue(FrontierItem {
                    url,
                    depth: 0,
                    discovered_from: Some(seed.clone()),
                    discovery_method: DiscoveryMethod::Sitemap,
                })
                .await;
            }
        }
    }

    /// Serializes the current run state to the checkpoint format from
    /// the external-interfaces contract.
    pub async fn checkpoint(&self) -> Result<Checkpoint, SchedulerError> {
        Ok(Checkpoint {
            queue: self.frontier.snapshot().await,
            visited_urls: self.visited.snapshot(),
            results: self.results.lock().await.clone(),
            metadata: HashMap::new(),
            saved_at: OffsetDateTime::now_utc(),
        })
    }

    pub async fn save_checkpoint(&self, path: &std::path::Path) -> Result<(), SchedulerError> {
        let checkpoint = self.checkpoint().await?;
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    pub async fn load_checkpoint(
        config: CrawlerConfig,
        fetcher: Arc<dyn Fetch>,
        path: &std::path::Path,
    ) -> Result<Self, SchedulerError> {
        let bytes = tokio::fs::read(path).await?;
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
        let scheduler = Self::new(config, fetcher);
        for (url, depth) in checkpoint.queue {
            if let Ok(url) = Url::parse(&url) {
                scheduler.frontier.push(FrontierItem { url, depth, discovered_from: None, discovery_method: DiscoveryMethod::Link }).await;
            }
        }
        let restored_visited = VisitedSet::restore(checkpoint.visited_urls);
        let mut results = scheduler.results.lock().await;
        *results = checkpoint.results;
        drop(results);
        Ok(Self {
            visited: Arc::new(restored_visited),
            ..scheduler
        })
    }
}

fn normalized_seed_path(url: &Url) -> String {
    let path = url.path();
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// The subset of scheduler state a spawned per-URL task needs; split
/// out so `run`'s loop doesn't have to clone the whole `Scheduler`.
#[derive(Clone)]
struct SchedulerHandles {
    config: CrawlerConfig,
    fetcher: Arc<dyn Fetch>,
    frontier: Arc<Frontier>,
    visited: Arc<VisitedSet>,
    rate_limiter: Arc<RateLimiter>,
    robots: Option<Arc<RobotsCache>>,
    budget: Arc<Budget>,
    cache: Arc<ResponseCache>,
    dedup: Arc<Deduplicator>,
    incremental: Option<Arc<dyn IncrementalStore>>,
    filter: Option<Arc<Filter>>,
    extractors: Arc<Vec<Box<dyn Extractor>>>,
    pipeline_stages: Arc<Vec<Box<dyn PipelineStage>>>,
    results: Arc<Mutex<HashMap<String, PageArtifact>>>,
    robots_skipped: Arc<Mutex<Vec<Url>>>,
    skipped_external: Arc<Mutex<Vec<Url>>>,
    run_id: Uuid,
    scope: ScopeState,
}

impl SchedulerHandles {
    fn should_crawl(&self, url: &Url) -> bool {
        if self.visited.contains(url) {
            return false;
        }
        if self.config.scope.internal_only
            && !url.host_str().is_some_and(|h| h.eq_ignore_ascii_case(&self.scope.seed_host))
        {
            return false;
        }
        if self.config.scope.same_path_only
            && self.scope.seed_path != "/"
            && !url.path().starts_with(&self.scope.seed_path)
        {
            return false;
        }
        if let Some(filter) = &self.filter {
            if !filter.is_allowed(url) {
                return false;
            }
        }
        true
    }

    async fn try_enqueue(&self, item: FrontierItem) {
        if item.depth > self.config.max_depth {
            return;
        }
        if !self.should_crawl(&item.url) {
            if self.config.scope.internal_only
                && !item.url.host_str().is_some_and(|h| h.eq_ignore_ascii_case(&self.scope.seed_host))
            {
                let mut skipped = self.skipped_external.lock().await;
                if skipped.len() < DEFAULT_SKIPPED_EXTERNAL_CAP {
                    skipped.push(item.url.clone());
                }
            }
            return;
        }
        if let Some(robots) = &self.robots {
            if !robots.is_allowed(&item.url).await {
                let mut skipped = self.robots_skipped.lock().await;
                if skipped.len() < DEFAULT_SKIPPED_EXTERNAL_CAP {
                    skipped.push(item.url.clone());
                }
                return;
            }
        }
        if let PushOutcome::DroppedOverCapacity = self.frontier.push(item).await {
            log::debug!("frontier over capacity, dropping enqueue");
        }
    }

    /// The `_process_url` algorithm from the component design: one
    /// claimed URL, one sealed artifact, published to `results`
    /// regardless of success or failure.
    async fn process_url(&self, item: FrontierItem) {
        if let Some(robots) = &self.robots {
            if let Some(delay) = robots.crawl_delay(&item.url).await {
                if let Some(host) = item.url.host_str() {
                    self.rate_limiter.raise_domain_delay(&host.to_ascii_lowercase(), delay).await;
                }
            }
        }
        self.rate_limiter.wait(&item.url).await;

        let mut artifact = PageArtifact::new(
            item.url.clone(),
            CrawlMeta {
                depth: item.depth,
                discovered_from: item.discovered_from.clone(),
                discovery_method: item.discovery_method,
                run_id: self.run_id,
            },
        );

        let mut extra_headers = Headers::new();
        if let Some(incremental) = &self.incremental {
            extra_headers = incremental.conditional_headers(&item.url).await;
        }

        if let Some(cached) = self.cache.get(&item.url).await {
            self.run_cached_subpath(&mut artifact, &cached).await;
            self.seal(artifact).await;
            return;
        }

        let started = std::time::Instant::now();
        let outcome = fetch_with_retry(
            self.fetcher.as_ref(),
            &item.url,
            &FetchOptions {
                extra_headers,
                timeout: Some(self.config.request_timeout),
            },
            self.config.max_retries,
        )
        .await;
        let response_time = started.elapsed();

        if let Some(response) = &outcome.response {
            let retry_after = response
                .header("retry-after")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            self.rate_limiter
                .record_response(&item.url, response_time, outcome.status, retry_after)
                .await;
        }

        match &outcome.response {
            Some(response) if response.status == 304 => {
                artifact.http = Some(HttpInfo {
                    status: 304,
                    headers: response.headers.clone(),
                    content_type: response.content_type().map(str::to_string),
                    etag: response.header("etag").map(str::to_string),
                    last_modified: response.header("last-modified").map(str::to_string),
                    cache_control: response.header("cache-control").map(str::to_string),
                });
                artifact.push_error(CrawlError::not_modified());
            }
            Some(response) if (200..300).contains(&response.status) => {
                let content_type = response.content_type().map(str::to_string);
                artifact.http = Some(HttpInfo {
                    status: response.status,
                    headers: response.headers.clone(),
                    content_type: content_type.clone(),
                    etag: response.header("etag").map(str::to_string),
                    last_modified: response.header("last-modified").map(str::to_string),
                    cache_control: response.header("cache-control").map(str::to_string),
                });

                if content_type.as_deref().is_some_and(|ct| ct.contains("text/html")) {
                    let body = response.body_text();
                    self.process_html(&mut artifact, &body).await;
                    self.cache
                        .set(
                            &item.url,
                            content_type.as_deref(),
                            body,
                            response.header("etag").map(str::to_string),
                            response.header("last-modified").map(str::to_string),
                        )
                        .await;
                } else if content_type.as_deref().is_some_and(|ct| ct.contains("application/pdf")) {
                    match self.budget.can_download_file(response.body.len() as u64) {
                        Ok(()) => {
                            artifact.downloads.push(crate::model::DownloadRecord {
                                url: item.url.clone(),
                                content_type,
                                size_bytes: response.body.len(),
                                saved_path: None,
                            });
                        }
                        Err(reason) => {
                            artifact.push_error(CrawlError::pdf(reason));
                        }
                    }
                }

                if let Some(incremental) = &self.incremental {
                    incremental
                        .record_response(
                            &item.url,
                            RevisitRecord {
                                status: response.status,
                                etag: response.header("etag").map(str::to_string),
                                last_modified: response.header("last-modified").map(str::to_string),
                            },
                        )
                        .await;
                }
            }
            Some(response) => {
                artifact.http = Some(HttpInfo {
                    status: response.status,
                    headers: response.headers.clone(),
                    content_type: response.content_type().map(str::to_string),
                    etag: None,
                    last_modified: None,
                    cache_control: None,
                });
                artifact.push_error(CrawlError::fetch(
                    format!("http status {}", response.status),
                    Some(response.status),
                ));
            }
            None => {
                artifact.push_error(CrawlError::fetch(
                    outcome.error.unwrap_or_else(|| "unknown fetch failure".to_string()),
                    Some(outcome.status),
                ));
            }
        }

        if artifact.success() {
            let content_bytes = artifact
                .content
                .as_ref()
                .map(|c| c.size_bytes as u64)
                .unwrap_or(0);
            let download_bytes: u64 = artifact.downloads.iter().map(|d| d.size_bytes as u64).sum();
            self.budget.record_page(content_bytes + download_bytes);
        }

        self.seal(artifact).await;
    }

    async fn process_html(&self, artifact: &mut PageArtifact, body: &str) {
        if let Some(original) = self.dedup.check_and_record(&artifact.url, body) {
            artifact.duplicate_of.push(original);
            return;
        }

        artifact.content = Some(ContentInfo {
            body: bytes::Bytes::from(body.to_string()),
            size_bytes: body.len(),
        });

        run_extractors(&self.extractors, body, artifact).await;

        let links = discover_links(&artifact.url, body);
        for link in &links {
            let item = FrontierItem {
                url: link.clone(),
                depth: artifact.crawl.depth + 1,
                discovered_from: Some(artifact.url.clone()),
                discovery_method: DiscoveryMethod::Link,
            };
            self.try_enqueue(item).await;
        }
        artifact.links = links;
    }

    async fn run_cached_subpath(&self, artifact: &mut PageArtifact, cached: &crate::cache::CachedResponse) {
        artifact.http = Some(HttpInfo {
            status: 200,
            headers: Headers::new(),
            content_type: Some("text/html".to_string()),
            etag: cached.etag.clone(),
            last_modified: cached.last_modified.clone(),
            cache_control: None,
        });
        self.process_html(artifact, &cached.body).await;
    }

    async fn seal(&self, artifact: PageArtifact) {
        let key = artifact.url.to_string();
        let sealed = run_pipeline(&self.pipeline_stages, artifact).await;
        if let Some(sealed) = sealed {
            self.results.lock().await.insert(key, sealed);
        }
    }
}

/// Resolves every `<a href>` on `body` against `base`, keeping only
/// absolute http(s) targets.
fn discover_links(base: &Url, body: &str) -> Vec<Url> {
    let document = Html::parse_document(body);
    let selector = link_selector();
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::{Canned, MockFetcher};

    fn config(seed: &str) -> CrawlerConfig {
        let mut cfg = CrawlerConfig::default();
        cfg.seed_urls = vec![Url::parse(seed).unwrap()];
        cfg.respect_robots_txt = false;
        cfg.rate_limit.default_delay = Duration::from_millis(0);
        cfg
    }

    #[tokio::test]
    async fn depth_limit_stops_grandchildren() {
        let mock = Arc::new(MockFetcher::new());
        mock.route(
            "http://site/",
            Canned::html(r#"<a href="/a">a</a><a href="/b">b</a>"#),
        );
        mock.route("http://site/a", Canned::html(r#"<a href="/c">c</a>"#));
        mock.route("http://site/b", Canned::html(r#"<a href="/c">c</a>"#));
        mock.route("http://site/c", Canned::html("leaf"));

        let mut cfg = config("http://site/");
        cfg.max_depth = 1;
        let scheduler = Scheduler::new(cfg, mock);
        scheduler.run().await;

        let results = scheduler.results.lock().await;
        let urls: std::collections::HashSet<_> = results.keys().cloned().collect();
        assert!(urls.contains("http://site/"));
        assert!(urls.contains("http://site/a"));
        assert!(urls.contains("http://site/b"));
        assert!(!urls.contains("http://site/c"));
    }

    #[tokio::test]
    async fn domain_restriction_skips_external_links() {
        let mock = Arc::new(MockFetcher::new());
        mock.route(
            "http://site/",
            Canned::html(r#"<a href="http://site/x">x</a><a href="http://other/y">y</a>"#),
        );
        mock.route("http://site/x", Canned::html("leaf"));

        let mut cfg = config("http://site/");
        cfg.scope.internal_only = true;
        let scheduler = Scheduler::new(cfg, mock);
        scheduler.run().await;

        let results = scheduler.results.lock().await;
        assert!(results.contains_key("http://site/x"));
        assert!(!results.contains_key("http://other/y"));
    }

    #[tokio::test]
    async fn budget_page_cap_stops_after_limit() {
        let mock = Arc::new(MockFetcher::new());
        mock.route(
            "http://site/",
            Canned::html(
                r#"<a href="/a">a</a><a href="/b">b</a><a href="/c">c</a><a href="/d">d</a><a href="/e">e</a>"#,
            ),
        );
        for leaf in ["a", "b", "c", "d", "e"] {
            mock.route(&format!("http://site/{leaf}"), Canned::html("leaf"));
        }

        let mut cfg = config("http://site/");
        cfg.budget.max_pages = Some(3);
        cfg.max_workers = 1;
        let scheduler = Scheduler::new(cfg, mock);
        scheduler.run().await;

        let results = scheduler.results.lock().await;
        let successes = results.values().filter(|a| a.success()).count();
        assert_eq!(successes, 3);
    }

    #[tokio::test]
    async fn rate_limit_delay_is_enforced_across_sibling_pages() {
        let mock = Arc::new(MockFetcher::new());
        mock.route(
            "http://site/",
            Canned::html(r#"<a href="/a">a</a><a href="/b">b</a>"#),
        );
        mock.route("http://site/a", Canned::html("leaf"));
        mock.route("http://site/b", Canned::html("leaf"));

        let mut cfg = config("http://site/");
        cfg.rate_limit.default_delay = Duration::from_millis(50);
        cfg.max_workers = 1;
        let scheduler = Scheduler::new(cfg, mock);

        let started = std::time::Instant::now();
        scheduler.run().await;
        let elapsed = started.elapsed();

        let results = scheduler.results.lock().await;
        assert_eq!(results.len(), 3);
        assert!(elapsed >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn dedup_marks_second_identical_page_as_duplicate() {
        let mock = Arc::new(MockFetcher::new());
        let body = "Identical content with enough length to pass minimum threshold of one hundred characters for sure";
        mock.route(
            "http://site/",
            Canned::html(r#"<a href="/a">a</a><a href="/b">b</a>"#),
        );
        mock.route("http://site/a", Canned::html(body));
        mock.route("http://site/b", Canned::html(body));

        let cfg = config("http://site/");
        let scheduler = Scheduler::new(cfg, mock);
        scheduler.run().await;

        let results = scheduler.results.lock().await;
        let a = results.get("http://site/a").unwrap();
        let b = results.get("http://site/b").unwrap();
        assert!(!a.is_duplicate());
        assert!(b.is_duplicate());
    }

    #[tokio::test]
    async fn checkpoint_round_trips_results_and_visited_set() {
        let mock = Arc::new(MockFetcher::new());
        mock.route("http://site/", Canned::html(r#"<a href="/a">a</a>"#));
        mock.route("http://site/a", Canned::html("leaf"));

        let cfg = config("http://site/");
        let scheduler = Scheduler::new(cfg.clone(), Arc::clone(&mock) as Arc<dyn Fetch>);
        scheduler.run().await;

        let path = std::env::temp_dir().join(format!("weaver-checkpoint-test-{}.json", Uuid::new_v4()));
        scheduler.save_checkpoint(&path).await.unwrap();

        let resumed = Scheduler::load_checkpoint(cfg, mock, &path).await.unwrap();
        let resumed_results = resumed.results.lock().await;
        assert_eq!(resumed_results.len(), 2);
        assert!(resumed.visited.contains(&Url::parse("http://site/").unwrap()));
        assert!(resumed.visited.contains(&Url::parse("http://site/a").unwrap()));

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn oversized_pdf_is_declined_and_not_counted_as_a_download() {
        let mock = Arc::new(MockFetcher::new());
        mock.route("http://site/", Canned::pdf("x".repeat(1024)));

        let mut cfg = config("http://site/");
        cfg.budget.max_file_size_bytes = Some(128);
        let scheduler = Scheduler::new(cfg, mock);
        scheduler.run().await;

        let results = scheduler.results.lock().await;
        let artifact = results.get("http://site/").unwrap();
        assert!(artifact.downloads.is_empty());

        let stats = scheduler.budget_stats().await;
        assert_eq!(stats.bytes_downloaded, 0);
    }

    #[tokio::test]
    async fn accepted_pdf_counts_its_bytes_toward_bandwidth() {
        let mock = Arc::new(MockFetcher::new());
        let body = "x".repeat(256);
        mock.route("http://site/", Canned::pdf(body.clone()));

        let cfg = config("http://site/");
        let scheduler = Scheduler::new(cfg, mock);
        scheduler.run().await;

        let results = scheduler.results.lock().await;
        let artifact = results.get("http://site/").unwrap();
        assert_eq!(artifact.downloads.len(), 1);

        let stats = scheduler.budget_stats().await;
        assert_eq!(stats.bytes_downloaded, body.len() as u64);
    }

    #[tokio::test]
    async fn not_modified_revisit_does_not_count_against_page_budget() {
        let mock = Arc::new(MockFetcher::new());
        mock.route("http://site/", Canned::html("leaf"));

        let mut cfg = config("http://site/");
        cfg.budget.max_pages = Some(1);
        let scheduler = Scheduler::new(cfg.clone(), Arc::clone(&mock) as Arc<dyn Fetch>);
        scheduler.run().await;

        let stats = scheduler.budget_stats().await;
        assert_eq!(stats.pages_crawled, 1);

        mock.route("http://site/", Canned {
            status: 304,
            ..Canned::html("")
        });
        let second = Scheduler::new(cfg, mock);
        second.run().await;

        let results = second.results.lock().await;
        let artifact = results.get("http://site/").unwrap();
        assert!(!artifact.success());

        let second_stats = second.budget_stats().await;
        assert_eq!(second_stats.pages_crawled, 0);
    }
}
