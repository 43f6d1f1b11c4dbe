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

//! Pipeline runner: an ordered chain of sink stages applied to each
//! sealed artifact. A stage that drops the artifact (returns `None`)
//! stops the chain; a stage that panics reverts to the pre-stage
//! snapshot and the chain continues with the next stage.

use crate::model::PageArtifact;
use async_trait::async_trait;
use futures::FutureExt;

/// One sink stage. Output formatters and database sinks are external
/// collaborators implementing this trait; none are built in here.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    async fn process(&self, artifact: PageArtifact) -> Option<PageArtifact>;
}

/// Runs `stages` in order over `artifact`, returning the final artifact
/// (or `None` if some stage dropped it).
pub async fn run_pipeline(
    stages: &[Box<dyn PipelineStage>],
    mut artifact: PageArtifact,
) -> Option<PageArtifact> {
    for stage in stages {
        let snapshot = artifact.clone();
        let result = std::panic::AssertUnwindSafe(stage.process(artifact))
            .catch_unwind()
            .await;
        match result {
            Ok(Some(next)) => artifact = next,
            Ok(None) => return None,
            Err(_) => {
                log::warn!("pipeline stage panicked for {}, reverting", snapshot.url);
                artifact = snapshot;
            }
        }
    }
    Some(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CrawlMeta, DiscoveryMethod};
    use uuid::Uuid;

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

    struct TagStage(&'static str);

    #[async_trait]
    impl PipelineStage for TagStage {
        async fn process(&self, mut artifact: PageArtifact) -> Option<PageArtifact> {
            artifact
                .extracted
                .insert(self.0.to_string(), crate::model::ExtractedValue::Text("ok".into()));
            Some(artifact)
        }
    }

    struct DropStage;

    #[async_trait]
    impl PipelineStage for DropStage {
        async fn process(&self, _artifact: PageArtifact) -> Option<PageArtifact> {
            None
        }
    }

    struct PanicStage;

    #[async_trait]
    impl PipelineStage for PanicStage {
        async fn process(&self, _artifact: PageArtifact) -> Option<PageArtifact> {
            panic!("boom")
        }
    }

    #[tokio::test]
    async fn stages_run_in_order() {
        let stages: Vec<Box<dyn PipelineStage>> = vec![Box::new(TagStage("a")), Box::new(TagStage("b"))];
        let result = run_pipeline(&stages, artifact()).await.unwrap();
        assert!(result.extracted.contains_key("a"));
        assert!(result.extracted.contains_key("b"));
    }

    #[tokio::test]
    async fn dropping_stage_stops_the_chain() {
        let stages: Vec<Box<dyn PipelineStage>> = vec![Box::new(TagStage("a")), Box::new(DropStage), Box::new(TagStage("b"))];
        assert!(run_pipeline(&stages, artifact()).await.is_none());
    }

    #[tokio::test]
    async fn panicking_stage_reverts_and_chain_continues() {
        let stages: Vec<Box<dyn PipelineStage>> = vec![Box::new(TagStage("a")), Box::new(PanicStage), Box::new(TagStage("b"))];
        let result = run_pipeline(&stages, artifact()).await.unwrap();
        assert!(result.extracted.contains_key("a"));
        assert!(result.extracted.contains_key("b"));
    }
}
