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

//! Incremental (conditional-GET) revisit support: an optional store
//! that remembers the last `ETag`/`Last-Modified` seen for a URL so a
//! re-crawl can send `If-None-Match`/`If-Modified-Since`.

use crate::model::Headers;
use async_trait::async_trait;
use case_insensitive_string::CaseInsensitiveString;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct RevisitRecord {
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// The injected incremental-store capability.
#[async_trait]
pub trait IncrementalStore: Send + Sync {
    async fn conditional_headers(&self, url: &Url) -> Headers;
    async fn record_response(&self, url: &Url, record: RevisitRecord);
}

/// An in-process incremental store, good enough for a single crawl run;
/// a durable implementation would persist this map instead.
#[derive(Default)]
pub struct MemoryIncrementalStore {
    records: Mutex<HashMap<Url, RevisitRecord>>,
}

impl MemoryIncrementalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IncrementalStore for MemoryIncrementalStore {
    async fn conditional_headers(&self, url: &Url) -> Headers {
        let records = self.records.lock().expect("incremental store lock poisoned");
        let mut headers = Headers::new();
        if let Some(record) = records.get(url) {
            if let Some(etag) = &record.etag {
                headers.insert(CaseInsensitiveString::from("if-none-match"), etag.clone());
            }
            if let Some(last_modified) = &record.last_modified {
                headers.insert(
                    CaseInsensitiveString::from("if-modified-since"),
                    last_modified.clone(),
                );
            }
        }
        headers
    }

    async fn record_response(&self, url: &Url, record: RevisitRecord) {
        self.records
            .lock()
            .expect("incremental store lock poisoned")
            .insert(url.clone(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_visit_carries_conditional_headers() {
        let store = MemoryIncrementalStore::new();
        let url = Url::parse("http://example.com/a").unwrap();
        assert!(store.conditional_headers(&url).await.is_empty());
        store
            .record_response(
                &url,
                RevisitRecord {
                    status: 200,
                    etag: Some("\"abc\"".into()),
                    last_modified: None,
                },
            )
            .await;
        let headers = store.conditional_headers(&url).await;
        assert_eq!(
            headers.get(&CaseInsensitiveString::from("if-none-match")),
            Some(&"\"abc\"".to_string())
        );
    }
}
