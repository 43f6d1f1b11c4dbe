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

//! The fetch orchestrator: a thin, retrying wrapper around an injected
//! [`Fetch`] capability. The scheduler only ever talks to this trait, so
//! tests can swap in a [`MockFetcher`] without touching the network.

use crate::model::Headers;
use async_trait::async_trait;
use case_insensitive_string::CaseInsensitiveString;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

/// Options threaded through to one `fetch` call.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub extra_headers: Headers,
    pub timeout: Option<Duration>,
}

/// A fetched response, independent of whatever HTTP stack produced it.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: bytes::Bytes,
}

impl FetchResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(&CaseInsensitiveString::from("content-type")).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&CaseInsensitiveString::from(name)).map(String::as_str)
    }
}

/// The injected fetch capability. A real implementation wraps
/// `reqwest::Client`; tests use [`MockFetcher`].
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> Result<FetchResponse, FetchError>;
}

/// Classified outcome of one fetch attempt, mapping transport failures
/// onto the pseudo-HTTP-status taxonomy so downstream code only ever
/// branches on a status code.
pub struct ClassifiedOutcome {
    pub status: u16,
    pub retriable: bool,
    pub response: Option<FetchResponse>,
    pub error: Option<String>,
}

fn classify_error(err: &FetchError) -> ClassifiedOutcome {
    let FetchError::Request(e) = err;
    let (status, retriable) = if e.is_timeout() {
        (408, true)
    } else if e.is_connect() {
        (503, true)
    } else if e.is_redirect() {
        (310, false)
    } else {
        (500, true)
    };
    ClassifiedOutcome {
        status,
        retriable,
        response: None,
        error: Some(e.to_string()),
    }
}

/// Retries a fetch up to `max_retries` times per the taxonomy in the
/// component design: timeouts and 5xx are retriable, 4xx and too-many-
/// redirects are not.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetch,
    url: &Url,
    opts: &FetchOptions,
    max_retries: u32,
) -> ClassifiedOutcome {
    let mut attempt = 0;
    loop {
        match fetcher.fetch(url, opts).await {
            Ok(response) => {
                let status = response.status;
                let retriable = (500..600).contains(&status);
                if retriable && attempt < max_retries {
                    attempt += 1;
                    log::debug!("retrying {url} after status {status} (attempt {attempt})");
                    continue;
                }
                return ClassifiedOutcome {
                    status,
                    retriable: false,
                    response: Some(response),
                    error: None,
                };
            }
            Err(e) => {
                let classified = classify_error(&e);
                if classified.retriable && attempt < max_retries {
                    attempt += 1;
                    log::debug!(
                        "retrying {url} after transport error (attempt {attempt}): {e}"
                    );
                    continue;
                }
                return classified;
            }
        }
    }
}

/// The real `Fetch` implementation, backed by a shared `reqwest::Client`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> Result<FetchResponse, FetchError> {
        let mut request = self.client.get(url.clone());
        for (name, value) in &opts.extra_headers {
            request = request.header(name.as_ref(), value);
        }
        if let Some(timeout) = opts.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (CaseInsensitiveString::from(name.as_str()), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;
        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A canned response for one URL, with an optional artificial delay
    /// to exercise rate-limit/timing assertions without real sleeps.
    #[derive(Debug, Clone)]
    pub struct Canned {
        pub status: u16,
        pub headers: Headers,
        pub body: String,
        pub delay: Option<Duration>,
    }

    impl Canned {
        pub fn html(body: impl Into<String>) -> Self {
            let mut headers = Headers::new();
            headers.insert(CaseInsensitiveString::from("content-type"), "text/html".into());
            Self {
                status: 200,
                headers,
                body: body.into(),
                delay: None,
            }
        }

        pub fn pdf(body: impl Into<String>) -> Self {
            let mut headers = Headers::new();
            headers.insert(
                CaseInsensitiveString::from("content-type"),
                "application/pdf".into(),
            );
            Self {
                status: 200,
                headers,
                body: body.into(),
                delay: None,
            }
        }
    }

    /// An in-memory `Fetch` implementation mapping URLs to canned
    /// responses, used instead of a network-mocking crate.
    #[derive(Default)]
    pub struct MockFetcher {
        routes: Mutex<HashMap<String, Canned>>,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route(&self, url: &str, response: Canned) {
            self.routes
                .lock()
                .expect("mock fetcher lock poisoned")
                .insert(url.to_string(), response);
        }
    }

    #[async_trait]
    impl Fetch for MockFetcher {
        async fn fetch(&self, url: &Url, _opts: &FetchOptions) -> Result<FetchResponse, FetchError> {
            let canned = self
                .routes
                .lock()
                .expect("mock fetcher lock poisoned")
                .get(url.as_str())
                .cloned();
            match canned {
                Some(canned) => {
                    if let Some(delay) = canned.delay {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(FetchResponse {
                        status: canned.status,
                        headers: canned.headers,
                        body: bytes::Bytes::from(canned.body),
                    })
                }
                None => Ok(FetchResponse {
                    status: 404,
                    headers: Headers::new(),
                    body: bytes::Bytes::new(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{Canned, MockFetcher};
    use super::*;

    #[tokio::test]
    async fn successful_fetch_returns_body() {
        let mock = MockFetcher::new();
        mock.route("http://example.com/", Canned::html("<html></html>"));
        let outcome = fetch_with_retry(
            &mock,
            &Url::parse("http://example.com/").unwrap(),
            &FetchOptions::default(),
            2,
        )
        .await;
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.response.unwrap().body_text(), "<html></html>");
    }

    #[tokio::test]
    async fn missing_route_yields_404_without_retry() {
        let mock = MockFetcher::new();
        let outcome = fetch_with_retry(
            &mock,
            &Url::parse("http://example.com/missing").unwrap(),
            &FetchOptions::default(),
            2,
        )
        .await;
        assert_eq!(outcome.status, 404);
    }
}
