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

//! A polite, concurrent web crawler built around a claim-once frontier,
//! per-domain politeness, and a pluggable pipeline of extractors and sinks.

pub mod budget;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod filter;
pub mod frontier;
pub mod incremental;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod rate_limiter;
pub mod robots;
pub mod scheduler;
pub mod sitemap;
pub mod visited;

pub use config::CrawlerConfig;
pub use error::WeaverError;
pub use model::{CrawlError, CrawlJob, CrawlMeta, FrontierItem, PageArtifact};
pub use scheduler::Scheduler;
