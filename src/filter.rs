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

//! URL filtering: regex allow/block lists, extension allow/block lists,
//! query-parameter-name allow/block lists, and an optional user
//! callback. A URL must clear every configured list to be allowed.

use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Composable URL acceptance rules. An empty allow-list means "allow
/// anything not otherwise blocked"; a non-empty allow-list means "only
/// these are allowed".
#[derive(Default)]
pub struct Filter {
    allowed_patterns: Vec<Regex>,
    blocked_patterns: Vec<Regex>,
    allowed_extensions: HashSet<String>,
    blocked_extensions: HashSet<String>,
    allowed_query_params: HashSet<String>,
    blocked_query_params: HashSet<String>,
    callback: Option<Box<dyn Fn(&Url) -> bool + Send + Sync>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_pattern(mut self, pattern: Regex) -> Self {
        self.allowed_patterns.push(pattern);
        self
    }

    pub fn block_pattern(mut self, pattern: Regex) -> Self {
        self.blocked_patterns.push(pattern);
        self
    }

    pub fn allow_extension(mut self, ext: impl Into<String>) -> Self {
        self.allowed_extensions.insert(ext.into().to_ascii_lowercase());
        self
    }

    pub fn block_extension(mut self, ext: impl Into<String>) -> Self {
        self.blocked_extensions.insert(ext.into().to_ascii_lowercase());
        self
    }

    pub fn block_query_param(mut self, name: impl Into<String>) -> Self {
        self.blocked_query_params.insert(name.into());
        self
    }

    pub fn allow_query_param(mut self, name: impl Into<String>) -> Self {
        self.allowed_query_params.insert(name.into());
        self
    }

    pub fn with_callback(mut self, callback: impl Fn(&Url) -> bool + Send + Sync + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    fn extension_of(url: &Url) -> Option<String> {
        url.path_segments()?
            .next_back()
            .and_then(|last| last.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    pub fn is_allowed(&self, url: &Url) -> bool {
        if !self.blocked_patterns.is_empty()
            && self.blocked_patterns.iter().any(|p| p.is_match(url.as_str()))
        {
            return false;
        }
        if !self.allowed_patterns.is_empty()
            && !self.allowed_patterns.iter().any(|p| p.is_match(url.as_str()))
        {
            return false;
        }

        if let Some(ext) = Self::extension_of(url) {
            if self.blocked_extensions.contains(&ext) {
                return false;
            }
            if !self.allowed_extensions.is_empty() && !self.allowed_extensions.contains(&ext) {
                return false;
            }
        }

        let query_names: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        if !self.blocked_query_params.is_empty()
            && query_names.iter().any(|q| self.blocked_query_params.contains(q))
        {
            return false;
        }
        if !self.allowed_query_params.is_empty()
            && !query_names.iter().any(|q| self.allowed_query_params.contains(q))
        {
            return false;
        }

        if let Some(callback) = &self.callback {
            if !callback(url) {
                return false;
            }
        }

        true
    }
}
