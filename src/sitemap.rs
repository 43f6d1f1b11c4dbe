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

//! Sitemap bootstrap: pulls candidate sitemap URLs from robots.txt and
//! user configuration, parses `<urlset>`/`<sitemapindex>` documents, and
//! hands back the leaf URLs for the scheduler to enqueue at depth 0.

use crate::fetch::{Fetch, FetchOptions};
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use sitemap::structs::Location;
use std::collections::HashSet;
use std::io::Cursor;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum SitemapError {
    #[error("fetch error: {0}")]
    Fetch(#[from] crate::fetch::FetchError),
}

/// Recursively resolves `candidates` (a sitemap index entry, or a plain
/// urlset) into the leaf page URLs they describe. Cycles (a sitemap
/// that points at itself or an ancestor) are broken by `visited`.
pub async fn collect_sitemap_urls(
    fetcher: &dyn Fetch,
    candidates: Vec<Url>,
) -> Vec<Url> {
    let mut visited = HashSet::new();
    let mut queue = candidates;
    let mut leaves = Vec::new();

    while let Some(sitemap_url) = queue.pop() {
        if !visited.insert(sitemap_url.clone()) {
            continue;
        }
        match fetch_and_parse(fetcher, &sitemap_url).await {
            Ok(ParsedSitemap::Index(children)) => {
                for child in children {
                    if !visited.contains(&child) {
                        queue.push(child);
                    }
                }
            }
            Ok(ParsedSitemap::UrlSet(urls)) => leaves.extend(urls),
            Err(e) => {
                log::warn!("failed to parse sitemap {sitemap_url}: {e}");
            }
        }
    }
    leaves
}

enum ParsedSitemap {
    Index(Vec<Url>),
    UrlSet(Vec<Url>),
}

async fn fetch_and_parse(fetcher: &dyn Fetch, url: &Url) -> Result<ParsedSitemap, SitemapError> {
    let response = fetcher.fetch(url, &FetchOptions::default()).await?;
    Ok(parse_sitemap_body(&response.body))
}

fn parse_sitemap_body(body: &[u8]) -> ParsedSitemap {
    let reader = SiteMapReader::new(Cursor::new(body));
    let mut index_children = Vec::new();
    let mut urlset_entries = Vec::new();
    for entity in reader {
        match entity {
            SiteMapEntity::Url(entry) => {
                if let Location::Url(loc) = entry.loc {
                    urlset_entries.push(loc);
                }
            }
            SiteMapEntity::SiteMap(entry) => {
                if let Location::Url(loc) = entry.loc {
                    index_children.push(loc);
                }
            }
            SiteMapEntity::Err(e) => {
                log::debug!("sitemap parse error entry: {e}");
            }
        }
    }
    if !index_children.is_empty() {
        ParsedSitemap::Index(index_children)
    } else {
        ParsedSitemap::UrlSet(urlset_entries)
    }
}

/// The default candidate locations to try when no sitemap was
/// advertised via robots.txt or configuration.
pub fn default_candidates(host_url: &Url) -> Vec<Url> {
    let mut base = host_url.clone();
    base.set_path("/sitemap.xml");
    base.set_query(None);
    let mut index = host_url.clone();
    index.set_path("/sitemap_index.xml");
    index.set_query(None);
    vec![base, index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::{Canned, MockFetcher};

    const INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>http://example.com/sitemap-a.xml</loc></sitemap>
</sitemapindex>"#;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>http://example.com/a</loc></url>
  <url><loc>http://example.com/b</loc></url>
</urlset>"#;

    #[tokio::test]
    async fn resolves_index_into_leaf_urls() {
        let mock = MockFetcher::new();
        mock.route("http://example.com/sitemap.xml", Canned {
            status: 200,
            headers: Default::default(),
            body: INDEX.to_string(),
            delay: None,
        });
        mock.route("http://example.com/sitemap-a.xml", Canned {
            status: 200,
            headers: Default::default(),
            body: URLSET.to_string(),
            delay: None,
        });
        let urls = collect_sitemap_urls(
            &mock,
            vec![Url::parse("http://example.com/sitemap.xml").unwrap()],
        )
        .await;
        assert_eq!(urls.len(), 2);
    }

    #[tokio::test]
    async fn self_referencing_index_does_not_loop() {
        let mock = MockFetcher::new();
        let looping = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <sitemap><loc>http://example.com/sitemap.xml</loc></sitemap>
        </sitemapindex>"#;
        mock.route("http://example.com/sitemap.xml", Canned {
            status: 200,
            headers: Default::default(),
            body: looping.to_string(),
            delay: None,
        });
        let urls = collect_sitemap_urls(
            &mock,
            vec![Url::parse("http://example.com/sitemap.xml").unwrap()],
        )
        .await;
        assert!(urls.is_empty());
    }
}
