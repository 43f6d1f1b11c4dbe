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

//! Crawl configuration: every tunable named in the component design,
//! loadable from a layered TOML + environment source via the `config`
//! crate, and validated before any network I/O happens.

use crate::error::{Result, WeaverError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};
use url::Url;

/// The selected user agent string.
#[derive(Debug, Default, Clone, Deserialize, Serialize, EnumString, Display, Eq, PartialEq)]
pub enum UserAgent {
    /// A different random user agent per request.
    #[strum(ascii_case_insensitive = true)]
    Spoof,
    #[default]
    #[strum(ascii_case_insensitive = true)]
    Default,
    #[strum(default, ascii_case_insensitive = true)]
    Custom(String),
}

impl UserAgent {
    const DEFAULT_UA: &'static str =
        concat!("weaver/", env!("CARGO_PKG_VERSION"), " (+politeness-first)");

    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        match self {
            UserAgent::Spoof => std::borrow::Cow::Borrowed(ua_generator::ua::spoof_ua()),
            UserAgent::Default => std::borrow::Cow::Borrowed(Self::DEFAULT_UA),
            UserAgent::Custom(s) => std::borrow::Cow::Borrowed(s.as_str()),
        }
    }
}

/// Scope rules restricting which discovered links are eligible.
#[derive(Debug, Clone, Deserialize, Serialize, Default, Eq, PartialEq)]
#[serde(default)]
pub struct ScopeConfig {
    /// Only follow links whose host matches the seed's host.
    pub internal_only: bool,
    /// Only follow links whose path is prefixed by the seed's path.
    pub same_path_only: bool,
    /// Maximum cardinality of the skipped-external report before entries are dropped.
    pub skipped_external_cap: usize,
}

fn default_skipped_external_cap() -> usize {
    10_000
}

impl ScopeConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.skipped_external_cap == 0 {
            self.skipped_external_cap = default_skipped_external_cap();
        }
        self
    }
}

/// Budget limits. `None` means unlimited for that dimension.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_pages: Option<u64>,
    pub max_bandwidth_bytes: Option<u64>,
    pub max_time: Option<Duration>,
    pub max_file_size_bytes: Option<u64>,
}

impl BudgetConfig {
    fn validate(&self) -> Result<()> {
        if self.max_pages == Some(0) {
            return Err(WeaverError::InvalidBudgetLimit {
                field: "max_pages",
                value: 0.0,
            });
        }
        if self.max_bandwidth_bytes == Some(0) {
            return Err(WeaverError::InvalidBudgetLimit {
                field: "max_bandwidth_bytes",
                value: 0.0,
            });
        }
        if self.max_file_size_bytes == Some(0) {
            return Err(WeaverError::InvalidBudgetLimit {
                field: "max_file_size_bytes",
                value: 0.0,
            });
        }
        if matches!(self.max_time, Some(d) if d.is_zero()) {
            return Err(WeaverError::InvalidBudgetLimit {
                field: "max_time",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Rate-limiter tuning, including the optional dynamic-adjustment knobs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub default_delay: Duration,
    pub dynamic: bool,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub sensitivity: Sensitivity,
    pub adjustment_factor: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_delay: Duration::from_millis(100),
            dynamic: false,
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(10),
            sensitivity: Sensitivity::Medium,
            adjustment_factor: 1.5,
        }
    }
}

/// Named sensitivity tiers for the dynamic rate limiter (§4.3).
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    pub fn multiplier(self) -> f64 {
        match self {
            Sensitivity::Low => 0.5,
            Sensitivity::Medium => 1.0,
            Sensitivity::High => 1.5,
        }
    }
}

/// Cache tuning.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Option<Duration>,
    pub disk_cache_dir: Option<std::path::PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: None,
            disk_cache_dir: None,
        }
    }
}

/// Deduplicator tuning.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    pub normalize_content: bool,
    pub min_content_length: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            normalize_content: true,
            min_content_length: 100,
        }
    }
}

/// Top-level crawl configuration. Every tunable named in §4 of the
/// component design lives here; nothing else reaches into process-wide
/// globals or environment variables directly.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CrawlerConfig {
    pub seed_urls: Vec<Url>,
    pub user_agent: UserAgent,
    pub max_depth: u32,
    pub max_queue_size: Option<usize>,
    pub max_workers: usize,
    pub respect_robots_txt: bool,
    pub sitemap_bootstrap: bool,
    pub sitemap_urls: Vec<Url>,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub scope: ScopeConfig,
    pub budget: BudgetConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub dedup: DedupConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seed_urls: Vec::new(),
            user_agent: UserAgent::default(),
            max_depth: 3,
            max_queue_size: None,
            max_workers: 4,
            respect_robots_txt: true,
            sitemap_bootstrap: false,
            sitemap_urls: Vec::new(),
            request_timeout: Duration::from_secs(15),
            max_retries: 2,
            scope: ScopeConfig::default().with_defaults(),
            budget: BudgetConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}

impl CrawlerConfig {
    /// Loads configuration by layering a base TOML, an optional override
    /// file, and `WEAVER_`-prefixed environment variables, matching the
    /// layered pattern used elsewhere in the stack.
    pub fn load(override_path: Option<&std::path::Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&CrawlerConfig::default())?);
        if let Some(path) = override_path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix("WEAVER").separator("__"));
        let loaded: CrawlerConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validates construction-time invariants from §7: non-http(s) seed
    /// schemes and non-positive budget limits must be rejected before
    /// any fetch happens.
    pub fn validate(&self) -> Result<()> {
        for seed in &self.seed_urls {
            validate_seed_scheme(seed)?;
        }
        self.budget.validate()
    }
}

pub fn validate_seed_scheme(url: &Url) -> Result<()> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(WeaverError::InvalidSeedScheme(url.to_string()));
    }
    if url.host_str().is_none() {
        return Err(WeaverError::SeedMissingHost(url.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_seed() {
        let mut cfg = CrawlerConfig::default();
        cfg.seed_urls.push(Url::parse("ftp://example.com/").unwrap());
        assert!(matches!(
            cfg.validate(),
            Err(WeaverError::InvalidSeedScheme(_))
        ));
    }

    #[test]
    fn rejects_zero_page_budget() {
        let mut cfg = CrawlerConfig::default();
        cfg.budget.max_pages = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_config() {
        let mut cfg = CrawlerConfig::default();
        cfg.seed_urls.push(Url::parse("https://example.com/").unwrap());
        assert!(cfg.validate().is_ok());
    }
}
