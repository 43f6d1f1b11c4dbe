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

//! Command-line surface for the `weaver` binary. Output formatting and
//! database sinks are injected capabilities with no CLI surface here;
//! this only wires up enough to start, pause, and checkpoint a crawl.

use clap::Parser;
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "A polite, concurrent web crawler", long_about = None)]
pub struct WeaverArgs {
    /// One or more seed URLs to start crawling from.
    #[arg(required_unless_present = "resume_from")]
    pub seeds: Vec<Url>,

    /// Maximum link depth from the seed(s).
    #[arg(short, long, default_value_t = 3)]
    pub depth: u32,

    /// Number of URLs processed concurrently.
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Only follow links on the seed's host.
    #[arg(long)]
    pub internal_only: bool,

    /// Only follow links under the seed's path prefix.
    #[arg(long)]
    pub same_path_only: bool,

    /// Ignore robots.txt disallow rules.
    #[arg(long)]
    pub ignore_robots: bool,

    /// Bootstrap the frontier from the seed host's sitemap.
    #[arg(long)]
    pub sitemap: bool,

    /// Stop after this many pages.
    #[arg(long)]
    pub max_pages: Option<u64>,

    /// Stop after this many bytes downloaded.
    #[arg(long)]
    pub max_bandwidth_bytes: Option<u64>,

    /// A TOML file layered on top of the default configuration.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Resume from a previously saved checkpoint instead of seeding fresh.
    #[arg(long)]
    pub resume_from: Option<PathBuf>,

    /// Write a checkpoint to this path when the run finishes.
    #[arg(long)]
    pub checkpoint_to: Option<PathBuf>,

    /// Log level.
    #[arg(long, default_value_t = log::LevelFilter::Info)]
    pub log_level: log::LevelFilter,

    /// Log to this file instead of the console.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl WeaverArgs {
    /// Applies the CLI flags onto a base configuration, matching the
    /// "CLI overrides file/defaults" layering used elsewhere in the stack.
    pub fn apply(&self, mut config: crate::config::CrawlerConfig) -> crate::config::CrawlerConfig {
        if !self.seeds.is_empty() {
            config.seed_urls = self.seeds.clone();
        }
        config.max_depth = self.depth;
        config.max_workers = self.workers;
        config.scope.internal_only = self.internal_only;
        config.scope.same_path_only = self.same_path_only;
        config.respect_robots_txt = !self.ignore_robots;
        config.sitemap_bootstrap = self.sitemap;
        if self.max_pages.is_some() {
            config.budget.max_pages = self.max_pages;
        }
        if self.max_bandwidth_bytes.is_some() {
            config.budget.max_bandwidth_bytes = self.max_bandwidth_bytes;
        }
        config
    }
}
