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

//! Content-based deduplication: two different URLs that serve the same
//! body are recorded as duplicates of whichever URL claimed the content
//! hash first.

use crate::config::DedupConfig;
use scraper::Html;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

#[derive(Default)]
struct Inner {
    hash_to_original: HashMap<String, Url>,
}

pub struct Deduplicator {
    config: DedupConfig,
    inner: Mutex<Inner>,
}

/// Strips tags that vary without changing meaning (script/style/
/// noscript bodies, comments) and collapses whitespace, so near-
/// identical pages with different embedded timestamps still hash equal.
fn normalize(body: &str) -> String {
    let document = Html::parse_document(body);
    let text: String = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    data_encoding::HEXLOWER.encode(&hasher.finalize())
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Checks `body` against content seen so far for `url`. Returns the
    /// URL that first claimed this content hash, if `body` is a
    /// duplicate of something already recorded; otherwise records `url`
    /// as the owner of this hash and returns `None`.
    pub fn check_and_record(&self, url: &Url, body: &str) -> Option<Url> {
        if !self.config.enabled || body.len() < self.config.min_content_length {
            return None;
        }
        let normalized = if self.config.normalize_content {
            normalize(body)
        } else {
            body.to_string()
        };
        let hash = hash_content(&normalized);

        let mut inner = self.inner.lock().expect("dedup lock poisoned");
        if let Some(original) = inner.hash_to_original.get(&hash) {
            if original != url {
                log::debug!("duplicate content: {url} duplicates {original}");
                return Some(original.clone());
            }
            return None;
        }
        inner.hash_to_original.insert(hash, url.clone());
        None
    }

    pub fn distinct_count(&self) -> usize {
        self.inner.lock().expect("dedup lock poisoned").hash_to_original.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DedupConfig {
        DedupConfig {
            enabled: true,
            normalize_content: true,
            min_content_length: 0,
        }
    }

    #[test]
    fn second_url_with_identical_content_is_a_duplicate() {
        let dedup = Deduplicator::new(config());
        let a = Url::parse("http://example.com/a").unwrap();
        let b = Url::parse("http://example.com/b").unwrap();
        let body = "<html><body><p>hello world</p></body></html>";
        assert_eq!(dedup.check_and_record(&a, body), None);
        assert_eq!(dedup.check_and_record(&b, body), Some(a));
    }

    #[test]
    fn whitespace_differences_still_match_when_normalized() {
        let dedup = Deduplicator::new(config());
        let a = Url::parse("http://example.com/a").unwrap();
        let b = Url::parse("http://example.com/b").unwrap();
        dedup.check_and_record(&a, "<p>hello   world</p>");
        assert_eq!(
            dedup.check_and_record(&b, "<p>hello\nworld</p>"),
            Some(a)
        );
    }

    #[test]
    fn below_min_length_is_never_a_duplicate() {
        let mut cfg = config();
        cfg.min_content_length = 1000;
        let dedup = Deduplicator::new(cfg);
        let a = Url::parse("http://example.com/a").unwrap();
        let b = Url::parse("http://example.com/b").unwrap();
        dedup.check_and_record(&a, "short");
        assert_eq!(dedup.check_and_record(&b, "short"), None);
    }

    #[test]
    fn disabled_dedup_never_flags_duplicates() {
        let mut cfg = config();
        cfg.enabled = false;
        let dedup = Deduplicator::new(cfg);
        let a = Url::parse("http://example.com/a").unwrap();
        let b = Url::parse("http://example.com/b").unwrap();
        dedup.check_and_record(&a, "same");
        assert_eq!(dedup.check_and_record(&b, "same"), None);
    }
}
