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

use super::{ContentInfo, CrawlError, CrawlMeta, HttpInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use time::OffsetDateTime;
use url::Url;

/// A tagged value produced by a built-in or plugin extractor. A plain
/// `any` type would work but would push every consumer back into
/// runtime type checks; this is the sum over the concrete shapes the
/// built-in extractors (and well-behaved plugins) actually produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractedValue {
    Text(String),
    List(Vec<String>),
    ListOfMaps(Vec<HashMap<String, String>>),
    Numbers(HashMap<String, f64>),
}

/// Record of a non-HTML payload (currently: PDFs) saved alongside the
/// artifact rather than parsed for links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub url: Url,
    pub content_type: Option<String>,
    pub size_bytes: usize,
    pub saved_path: Option<PathBuf>,
}

/// The sealed record of one claimed URL's outcome. Exactly one is
/// produced per claim, success or failure, and it is never mutated
/// after being stored in the results map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageArtifact {
    pub url: Url,
    pub fetched_at: OffsetDateTime,
    pub http: Option<HttpInfo>,
    pub content: Option<ContentInfo>,
    pub extracted: HashMap<String, ExtractedValue>,
    pub links: Vec<Url>,
    pub crawl: CrawlMeta,
    pub errors: Vec<CrawlError>,
    pub downloads: Vec<DownloadRecord>,
    pub duplicate_of: Vec<Url>,
}

impl PageArtifact {
    pub fn new(url: Url, crawl: CrawlMeta) -> Self {
        Self {
            url,
            fetched_at: OffsetDateTime::now_utc(),
            http: None,
            content: None,
            extracted: HashMap::new(),
            links: Vec::new(),
            crawl,
            errors: Vec::new(),
            downloads: Vec::new(),
            duplicate_of: Vec::new(),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        !self.duplicate_of.is_empty()
    }

    pub fn push_error(&mut self, error: CrawlError) {
        self.errors.push(error);
    }

    pub fn status(&self) -> Option<u16> {
        self.http.as_ref().map(|h| h.status)
    }

    pub fn success(&self) -> bool {
        self.status().is_some_and(|s| (200..400).contains(&s) && s != 304)
            && !self.errors.iter().any(|e| {
                matches!(
                    e.code,
                    crate::model::CrawlErrorCode::Fetch
                        | crate::model::CrawlErrorCode::Unknown
                        | crate::model::CrawlErrorCode::NotModified
                )
            })
    }
}
