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

//! Per-domain politeness. The sleep happens while the per-state lock is
//! held — see the design notes on "sleep inside lock": releasing the
//! lock before sleeping would let two workers both observe "enough time
//! has passed" and fire together.

use crate::config::{RateLimitConfig, Sensitivity};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

#[derive(Debug, Default)]
struct DynamicStats {
    response_times: VecDeque<Duration>,
    successes: u64,
    errors: u64,
}

const RESPONSE_TIME_WINDOW: usize = 10;
const MIN_SAMPLES: u64 = 5;

struct Inner {
    domain_delays: HashMap<String, Duration>,
    last_request: HashMap<String, Instant>,
    dynamic_stats: HashMap<String, DynamicStats>,
}

/// Per-domain last-request tracking with optional dynamic adjustment
/// based on observed response times, error rates, and 429s.
pub struct RateLimiter {
    default_delay: Duration,
    dynamic: bool,
    min_delay: Duration,
    max_delay: Duration,
    sensitivity: Sensitivity,
    adjustment_factor: f64,
    inner: Mutex<Inner>,
}

fn host_of(url: &Url) -> String {
    url.host_str().unwrap_or("unknown").to_ascii_lowercase()
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            default_delay: config.default_delay,
            dynamic: config.dynamic,
            min_delay: config.min_delay,
            max_delay: config.max_delay,
            sensitivity: config.sensitivity,
            adjustment_factor: config.adjustment_factor,
            inner: Mutex::new(Inner {
                domain_delays: HashMap::new(),
                last_request: HashMap::new(),
                dynamic_stats: HashMap::new(),
            }),
        }
    }

    /// Overwrites a domain's delay if `delay` is larger than what is
    /// currently configured, per the robots `Crawl-delay` override rule.
    pub async fn raise_domain_delay(&self, host: &str, delay: Duration) {
        let mut inner = self.inner.lock().await;
        let current = inner
            .domain_delays
            .get(host)
            .copied()
            .unwrap_or(self.default_delay);
        if delay > current {
            inner.domain_delays.insert(host.to_ascii_lowercase(), delay);
        }
    }

    pub async fn set_domain_delay(&self, host: &str, delay: Duration) {
        self.inner
            .lock()
            .await
            .domain_delays
            .insert(host.to_ascii_lowercase(), delay);
    }

    pub async fn domain_delay(&self, host: &str) -> Duration {
        self.inner
            .lock()
            .await
            .domain_delays
            .get(&host.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_delay)
    }

    /// Waits as long as needed to respect the domain's delay, then
    /// records the request time. The whole thing runs under one lock.
    pub async fn wait(&self, url: &Url) {
        let host = host_of(url);
        let mut inner = self.inner.lock().await;
        let delay = inner
            .domain_delays
            .get(&host)
            .copied()
            .unwrap_or(self.default_delay);
        if delay.is_zero() {
            return;
        }
        let now = Instant::now();
        if let Some(&last) = inner.last_request.get(&host) {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }
        inner.last_request.insert(host, Instant::now());
    }

    /// Feeds a response observation into the dynamic adjustment rules
    /// from the component design. A no-op when dynamic mode is off.
    pub async fn record_response(
        &self,
        url: &Url,
        response_time: Duration,
        status: u16,
        retry_after: Option<Duration>,
    ) {
        if !self.dynamic {
            return;
        }
        let host = host_of(url);
        let mut inner = self.inner.lock().await;
        let current_delay = inner
            .domain_delays
            .get(&host)
            .copied()
            .unwrap_or(self.default_delay);

        let stats = inner.dynamic_stats.entry(host.clone()).or_default();
        stats.response_times.push_back(response_time);
        if stats.response_times.len() > RESPONSE_TIME_WINDOW {
            stats.response_times.pop_front();
        }
        if (200..400).contains(&status) {
            stats.successes += 1;
        } else {
            stats.errors += 1;
        }

        if status == 429 {
            let new_delay = retry_after.unwrap_or_else(|| {
                current_delay.mul_f64(self.adjustment_factor * 2.0)
            });
            let new_delay = new_delay.min(self.max_delay);
            inner.domain_delays.insert(host, new_delay);
            log::warn!("rate limit hit for {host_for_log}, increased delay to {new_delay:?}", host_for_log = url.host_str().unwrap_or(""));
            return;
        }

        let total = stats.successes + stats.errors;
        if total >= MIN_SAMPLES {
            let error_rate = stats.errors as f64 / total as f64;
            if error_rate > 0.3 {
                let new_delay = current_delay
                    .mul_f64(1.0 + self.sensitivity.multiplier() * 0.2)
                    .min(self.max_delay);
                inner.domain_delays.insert(host, new_delay);
                return;
            }

            if stats.response_times.len() >= MIN_SAMPLES as usize {
                let avg = stats.response_times.iter().sum::<Duration>() / stats.response_times.len() as u32;
                if avg > Duration::from_secs(2) {
                    let new_delay = current_delay
                        .mul_f64(1.0 + self.sensitivity.multiplier() * 0.1)
                        .min(self.max_delay);
                    inner.domain_delays.insert(host, new_delay);
                } else if avg < Duration::from_millis(500) && error_rate < 0.1 {
                    let new_delay = current_delay
                        .div_f64(1.0 + self.sensitivity.multiplier() * 0.1)
                        .max(self.min_delay);
                    inner.domain_delays.insert(host, new_delay);
                }
            }
        }
    }
}
