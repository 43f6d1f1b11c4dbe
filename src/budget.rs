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

//! Crawl-wide resource budget: page count, bandwidth, wall-clock time,
//! per-file size. Once any limit trips, the budget latches exceeded and
//! stays that way for the rest of the run.

use crate::config::BudgetConfig;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Usage {
    pages_crawled: u64,
    bytes_downloaded: u64,
    exceeded_reason: Option<String>,
}

/// Snapshot of budget usage, handed to the exceeded callback and usable
/// for progress reporting.
#[derive(Debug, Clone)]
pub struct BudgetStats {
    pub pages_crawled: u64,
    pub bytes_downloaded: u64,
    pub elapsed: Duration,
    pub exceeded_reason: Option<String>,
}

pub struct Budget {
    limits: BudgetConfig,
    start: Instant,
    usage: Mutex<Usage>,
    on_exceeded: Option<Box<dyn Fn(&str, &BudgetStats) + Send + Sync>>,
}

impl Budget {
    pub fn new(limits: BudgetConfig) -> Self {
        Self {
            limits,
            start: Instant::now(),
            usage: Mutex::new(Usage::default()),
            on_exceeded: None,
        }
    }

    pub fn with_callback(
        limits: BudgetConfig,
        on_exceeded: impl Fn(&str, &BudgetStats) + Send + Sync + 'static,
    ) -> Self {
        Self {
            limits,
            start: Instant::now(),
            usage: Mutex::new(Usage::default()),
            on_exceeded: Some(Box::new(on_exceeded)),
        }
    }

    fn stats_locked(&self, usage: &Usage) -> BudgetStats {
        BudgetStats {
            pages_crawled: usage.pages_crawled,
            bytes_downloaded: usage.bytes_downloaded,
            elapsed: self.start.elapsed(),
            exceeded_reason: usage.exceeded_reason.clone(),
        }
    }

    pub fn stats(&self) -> BudgetStats {
        let usage = self.usage.lock().expect("budget lock poisoned");
        self.stats_locked(&usage)
    }

    /// Whether another page may start. Returns the latched reason if
    /// the budget is already (or newly) exceeded.
    pub fn can_crawl_page(&self) -> Result<(), String> {
        let mut reason = None;
        {
            let mut usage = self.usage.lock().expect("budget lock poisoned");
            if let Some(existing) = &usage.exceeded_reason {
                return Err(existing.clone());
            }
            if let Some(max_pages) = self.limits.max_pages {
                if usage.pages_crawled >= max_pages {
                    reason = Some(format!("page limit reached ({max_pages} pages)"));
                }
            }
            if reason.is_none() {
                if let Some(max_time) = self.limits.max_time {
                    if self.start.elapsed() >= max_time {
                        reason = Some(format!("time limit reached ({max_time:?})"));
                    }
                }
            }
            if reason.is_none() {
                if let Some(max_bytes) = self.limits.max_bandwidth_bytes {
                    if usage.bytes_downloaded >= max_bytes {
                        reason = Some(format!("bandwidth limit reached ({max_bytes} bytes)"));
                    }
                }
            }
            if let Some(ref r) = reason {
                log::warn!("budget exceeded: {r}");
                usage.exceeded_reason = Some(r.clone());
            }
        }

        if let Some(reason) = reason {
            if let Some(callback) = &self.on_exceeded {
                let stats = self.stats();
                callback(&reason, &stats);
            }
            return Err(reason);
        }
        Ok(())
    }

    /// Whether a file of `size_bytes` may be downloaded without
    /// exceeding the per-file or bandwidth limits. Does not latch the
    /// budget: a single oversized file is just skipped.
    pub fn can_download_file(&self, size_bytes: u64) -> Result<(), String> {
        let usage = self.usage.lock().expect("budget lock poisoned");
        if let Some(max_file) = self.limits.max_file_size_bytes {
            if size_bytes > max_file {
                return Err(format!(
                    "file size ({size_bytes} bytes) exceeds limit ({max_file} bytes)"
                ));
            }
        }
        if let Some(max_bytes) = self.limits.max_bandwidth_bytes {
            if usage.bytes_downloaded + size_bytes > max_bytes {
                return Err(format!("would exceed bandwidth limit ({max_bytes} bytes)"));
            }
        }
        Ok(())
    }

    pub fn record_page(&self, bytes_downloaded: u64) {
        let mut usage = self.usage.lock().expect("budget lock poisoned");
        usage.pages_crawled += 1;
        usage.bytes_downloaded += bytes_downloaded;
        log::debug!(
            "budget: pages={}, bytes={}",
            usage.pages_crawled,
            usage.bytes_downloaded
        );
    }

    pub fn is_exceeded(&self) -> bool {
        self.usage.lock().expect("budget lock poisoned").exceeded_reason.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn limits() -> BudgetConfig {
        BudgetConfig {
            max_pages: Some(2),
            max_bandwidth_bytes: None,
            max_time: None,
            max_file_size_bytes: None,
        }
    }

    #[test]
    fn allows_up_to_page_limit_then_rejects() {
        let budget = Budget::new(limits());
        assert!(budget.can_crawl_page().is_ok());
        budget.record_page(100);
        assert!(budget.can_crawl_page().is_ok());
        budget.record_page(100);
        assert!(budget.can_crawl_page().is_err());
    }

    #[test]
    fn callback_fires_exactly_once_outside_lock() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let budget = Budget::with_callback(limits(), move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        budget.record_page(10);
        budget.record_page(10);
        let _ = budget.can_crawl_page();
        let _ = budget.can_crawl_page();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn oversized_file_rejected_without_latching_budget() {
        let mut cfg = limits();
        cfg.max_file_size_bytes = Some(1_000);
        let budget = Budget::new(cfg);
        assert!(budget.can_download_file(2_000).is_err());
        assert!(!budget.is_exceeded());
    }
}
