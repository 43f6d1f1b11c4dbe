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

//! The extractor plugin contract. Field-level extraction (tables,
//! images, keywords, content metadata) is an external collaborator;
//! this module only defines the seam the scheduler calls through and
//! runs registered extractors in order, folding failures into
//! `CrawlError::extractor` rather than aborting the URL.

use crate::model::{CrawlError, ExtractedValue, PageArtifact};
use async_trait::async_trait;
use futures::FutureExt;

/// One named field-extraction plugin. Implementations must not mutate
/// the artifact directly; their return value is merged into
/// `artifact.extracted` under their own `name()`.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(&self, body: &str, artifact: &PageArtifact) -> Option<ExtractedValue>;
}

/// Runs `extractors` in registration order against `body`, merging
/// successful outputs into `artifact.extracted` and recording a
/// `CrawlError::extractor` for any that panics are not caught here —
/// only the `None`/`Some` contract is honored, since plugin panics are
/// a scheduler-level concern (`catch_unwind` at the call site).
pub async fn run_extractors(extractors: &[Box<dyn Extractor>], body: &str, artifact: &mut PageArtifact) {
    for extractor in extractors {
        let result = std::panic::AssertUnwindSafe(extractor.extract(body, artifact))
            .catch_unwind()
            .await;
        match result {
            Ok(Some(value)) => {
                artifact.extracted.insert(extractor.name().to_string(), value);
            }
            Ok(None) => {}
            Err(_) => {
                artifact.push_error(CrawlError::extractor(
                    extractor.name(),
                    "extractor panicked",
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CrawlMeta, DiscoveryMethod};
    use uuid::Uuid;

    struct UppercaseTitle;

    #[async_trait]
    impl Extractor for UppercaseTitle {
        fn name(&self) -> &str {
            "title"
        }
        async fn extract(&self, body: &str, _artifact: &PageArtifact) -> Option<ExtractedValue> {
            Some(ExtractedValue::Text(body.to_uppercase()))
        }
    }

    struct AlwaysPanics;

    #[async_trait]
    impl Extractor for AlwaysPanics {
        fn name(&self) -> &str {
            "broken"
        }
        async fn extract(&self, _body: &str, _artifact: &PageArtifact) -> Option<ExtractedValue> {
            panic!("boom")
        }
    }

    fn artifact() -> PageArtifact {
        PageArtifact::new(
            url::Url::parse("http://example.com/").unwrap(),
            CrawlMeta {
                depth: 0,
                discovered_from: None,
                discovery_method: DiscoveryMethod::Seed,
                run_id: Uuid::new_v4(),
            },
        )
    }

    #[tokio::test]
    async fn successful_extractor_populates_field() {
        let extractors: Vec<Box<dyn Extractor>> = vec![Box::new(UppercaseTitle)];
        let mut artifact = artifact();
        run_extractors(&extractors, "hello", &mut artifact).await;
        assert!(matches!(
            artifact.extracted.get("title"),
            Some(ExtractedValue::Text(t)) if t == "HELLO"
        ));
    }

    #[tokio::test]
    async fn panicking_extractor_is_recorded_and_others_still_run() {
        let extractors: Vec<Box<dyn Extractor>> =
            vec![Box::new(AlwaysPanics), Box::new(UppercaseTitle)];
        let mut artifact = artifact();
        run_extractors(&extractors, "hi", &mut artifact).await;
        assert_eq!(artifact.errors.len(), 1);
        assert!(artifact.extracted.contains_key("title"));
    }
}
