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

//! The frontier: a bounded FIFO of [`FrontierItem`]s. Enqueue is the
//! only place capacity is enforced; dequeue never blocks forever since
//! the scheduler stops submitting once the frontier is empty and no
//! tasks are in flight.

use crate::model::FrontierItem;
use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};

/// Outcome of a push, so callers can log the over-capacity case the
/// way the spec requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    DroppedOverCapacity,
}

pub struct Frontier {
    items: Mutex<VecDeque<FrontierItem>>,
    max_queue_size: Option<usize>,
    notify: Notify,
}

impl Frontier {
    pub fn new(max_queue_size: Option<usize>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            max_queue_size,
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, item: FrontierItem) -> PushOutcome {
        let mut items = self.items.lock().await;
        if let Some(cap) = self.max_queue_size {
            if items.len() >= cap {
                log::debug!("frontier at capacity ({cap}), dropping {}", item.url);
                return PushOutcome::DroppedOverCapacity;
            }
        }
        items.push_back(item);
        drop(items);
        self.notify.notify_one();
        PushOutcome::Accepted
    }

    /// Non-blocking pop, used by the single-worker loop.
    pub async fn pop(&self) -> Option<FrontierItem> {
        self.items.lock().await.pop_front()
    }

    /// Blocks until an item is available or `notify_closed` is signaled
    /// via a dropped `Notify` (the scheduler instead checks
    /// `is_empty`/in-flight counts between waits — see scheduler.rs).
    pub async fn pop_wait(&self) -> Option<FrontierItem> {
        loop {
            if let Some(item) = self.pop().await {
                return Some(item);
            }
            let notified = self.notify.notified();
            if self.items.lock().await.is_empty() {
                notified.await;
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// A stable ordering snapshot of `(url, depth)` tuples for checkpointing.
    pub async fn snapshot(&self) -> Vec<(String, u32)> {
        self.items
            .lock()
            .await
            .iter()
            .map(|item| (item.url.to_string(), item.depth))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiscoveryMethod;
    use url::Url;

    fn item(u: &str, depth: u32) -> FrontierItem {
        FrontierItem {
            url: Url::parse(u).unwrap(),
            depth,
            discovered_from: None,
            discovery_method: DiscoveryMethod::Seed,
        }
    }

    #[tokio::test]
    async fn preserves_fifo_order() {
        let frontier = Frontier::new(None);
        frontier.push(item("http://example.com/1", 0)).await;
        frontier.push(item("http://example.com/2", 0)).await;
        assert_eq!(frontier.pop().await.unwrap().url.as_str(), "http://example.com/1");
        assert_eq!(frontier.pop().await.unwrap().url.as_str(), "http://example.com/2");
    }

    #[tokio::test]
    async fn drops_second_item_when_capacity_is_one() {
        let frontier = Frontier::new(Some(1));
        assert_eq!(
            frontier.push(item("http://example.com/1", 0)).await,
            PushOutcome::Accepted
        );
        assert_eq!(
            frontier.push(item("http://example.com/2", 0)).await,
            PushOutcome::DroppedOverCapacity
        );
        assert_eq!(frontier.len().await, 1);
    }
}
