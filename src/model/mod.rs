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

//! The data model shared by every component: the frontier item, the
//! per-URL metadata attached to a claim, and the sealed [`PageArtifact`].

mod artifact;

pub use artifact::{DownloadRecord, ExtractedValue, PageArtifact};

use case_insensitive_string::CaseInsensitiveString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

/// Case-insensitive header map, keyed the way HTTP headers are compared.
pub type Headers = HashMap<CaseInsensitiveString, String>;

/// How a URL entered the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Seed,
    Link,
    Sitemap,
}

/// A pending unit of work: a URL at a known depth, with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierItem {
    pub url: Url,
    pub depth: u32,
    pub discovered_from: Option<Url>,
    pub discovery_method: DiscoveryMethod,
}

impl FrontierItem {
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            depth: 0,
            discovered_from: None,
            discovery_method: DiscoveryMethod::Seed,
        }
    }

    pub fn child(&self, url: Url, method: DiscoveryMethod) -> Self {
        Self {
            discovered_from: Some(self.url.clone()),
            depth: self.depth + 1,
            discovery_method: method,
            url,
        }
    }
}

/// Normalizes a URL for visited-set comparison: lowercases scheme and
/// host, strips the fragment, and otherwise leaves path and query as
/// given. Must be applied uniformly everywhere the visited set and the
/// frontier compare URLs, or §9's "claim" serialization point leaks.
pub fn normalize_for_visited(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let scheme = normalized.scheme().to_ascii_lowercase();
    let host = normalized.host_str().unwrap_or("").to_ascii_lowercase();
    let rest = &normalized[url::Position::BeforePath..];
    format!("{scheme}://{host}{rest}")
}

/// Metadata about a fetch response, independent of the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpInfo {
    pub status: u16,
    pub headers: Headers,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub cache_control: Option<String>,
}

/// The downloaded body, kept in memory for the scope of one crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentInfo {
    #[serde(with = "serde_bytes_as_vec")]
    pub body: bytes::Bytes,
    pub size_bytes: usize,
}

mod serde_bytes_as_vec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &bytes::Bytes, s: S) -> Result<S::Ok, S::Error> {
        bytes.as_ref().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bytes::Bytes, D::Error> {
        let raw = Vec::<u8>::deserialize(d)?;
        Ok(bytes::Bytes::from(raw))
    }
}

/// Provenance recorded on every artifact, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlMeta {
    pub depth: u32,
    pub discovered_from: Option<Url>,
    pub discovery_method: DiscoveryMethod,
    pub run_id: Uuid,
}

/// The error taxonomy from the error handling design: every per-URL
/// failure is tagged with one of these codes rather than propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlErrorCode {
    Fetch,
    NotModified,
    Extractor,
    Pdf,
    Unknown,
}

/// A single error recorded on a [`PageArtifact`]. Never raised past the
/// worker that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlError {
    pub code: CrawlErrorCode,
    pub message: String,
    pub source: Option<String>,
    pub http_status: Option<u16>,
}

impl CrawlError {
    pub fn fetch(message: impl Into<String>, http_status: Option<u16>) -> Self {
        Self {
            code: CrawlErrorCode::Fetch,
            message: message.into(),
            source: None,
            http_status,
        }
    }

    pub fn not_modified() -> Self {
        Self {
            code: CrawlErrorCode::NotModified,
            message: "304 Not Modified".to_string(),
            source: None,
            http_status: Some(304),
        }
    }

    pub fn extractor(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: CrawlErrorCode::Extractor,
            message: message.into(),
            source: Some(name.into()),
            http_status: None,
        }
    }

    pub fn pdf(message: impl Into<String>) -> Self {
        Self {
            code: CrawlErrorCode::Pdf,
            message: message.into(),
            source: None,
            http_status: None,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            code: CrawlErrorCode::Unknown,
            message: message.into(),
            source: None,
            http_status: None,
        }
    }
}

/// One scheduler invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub run_id: Uuid,
    pub started_at: OffsetDateTime,
    pub seed_urls: Vec<Url>,
}

impl CrawlJob {
    pub fn new(run_id: Uuid, seed_urls: Vec<Url>) -> Self {
        Self {
            run_id,
            started_at: OffsetDateTime::now_utc(),
            seed_urls,
        }
    }
}
