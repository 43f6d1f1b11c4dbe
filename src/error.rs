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

//! Error types shared across the crawl coordination engine.
//!
//! Per-URL failures never reach these types directly: they are caught at
//! the worker boundary and folded into a [`crate::model::CrawlError`] on
//! the artifact instead (see `scheduler::process_url`). These error
//! enums are reserved for construction-time and component-internal
//! failures that the spec requires to surface before any network I/O.

use thiserror::Error;

/// Errors raised while building a [`crate::config::CrawlerConfig`] or
/// wiring a [`crate::scheduler::Scheduler`] together, before the crawl starts.
#[derive(Error, Debug)]
pub enum WeaverError {
    #[error("seed url '{0}' is not http or https")]
    InvalidSeedScheme(String),

    #[error("seed url has no host: {0}")]
    SeedMissingHost(String),

    #[error("budget limit must be positive, got {value} for {field}")]
    InvalidBudgetLimit { field: &'static str, value: f64 },

    #[error("invalid filter regex: {0}")]
    InvalidFilterRegex(#[from] regex::Error),

    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WeaverError>;
