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

//! The visited set: the single serialization point for "has anyone
//! already started processing this URL". Everything else about
//! enqueueing is advisory; `claim` is the only operation that grants
//! exclusive ownership of a URL's fetch/extract body.

use crate::model::normalize_for_visited;
use std::collections::HashSet;
use std::sync::Mutex;
use url::Url;

#[derive(Debug, Default)]
pub struct VisitedSet {
    claimed: Mutex<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically checks membership and inserts if absent. Returns
    /// `true` only to the single caller that wins the race for `url`;
    /// every later caller for the same URL gets `false` and must
    /// discard its work silently.
    pub fn claim(&self, url: &Url) -> bool {
        let key = normalize_for_visited(url);
        let mut claimed = self.claimed.lock().expect("visited set lock poisoned");
        claimed.insert(key)
    }

    pub fn contains(&self, url: &Url) -> bool {
        let key = normalize_for_visited(url);
        self.claimed.lock().expect("visited set lock poisoned").contains(&key)
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().expect("visited set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.claimed
            .lock()
            .expect("visited set lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Restores a visited set from a checkpoint. Keys are already
    /// normalized by whoever produced the snapshot.
    pub fn restore(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            claimed: Mutex::new(keys.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_claim_wins() {
        let visited = VisitedSet::new();
        let url = Url::parse("http://example.com/a").unwrap();
        assert!(visited.claim(&url));
        assert!(!visited.claim(&url));
        assert!(!visited.claim(&url));
    }

    #[test]
    fn distinct_urls_both_claim() {
        let visited = VisitedSet::new();
        assert!(visited.claim(&Url::parse("http://example.com/a").unwrap()));
        assert!(visited.claim(&Url::parse("http://example.com/b").unwrap()));
        assert_eq!(visited.len(), 2);
    }

    #[test]
    fn claim_is_race_safe_under_concurrency() {
        use std::sync::Arc;
        let visited = Arc::new(VisitedSet::new());
        let url = Url::parse("http://example.com/contended").unwrap();
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let visited = Arc::clone(&visited);
                let url = url.clone();
                std::thread::spawn(move || visited.claim(&url))
            })
            .collect();
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
