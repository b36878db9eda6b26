// Copyright 2025 Chateval Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Fact classification cache
//!
//! Memoizes judge classifications per (judge model, candidate answer,
//! ground truth) for the lifetime of one evaluation run. Precision, recall,
//! correctness and completeness all classify the same pair, so the key does
//! not include the metric mode.

use crate::schema::ClassifiedFacts;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Model identifier used when the judge does not report one
pub const UNKNOWN_MODEL: &str = "unknown-model";

/// Exact-match key; no normalization of case or whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactCacheKey {
    model: String,
    answer: String,
    ground_truth: String,
}

impl FactCacheKey {
    pub fn new(model: Option<&str>, answer: &str, ground_truth: &str) -> Self {
        let model = match model {
            Some(name) if !name.is_empty() => name,
            _ => UNKNOWN_MODEL,
        };

        Self {
            model: model.to_string(),
            answer: answer.to_string(),
            ground_truth: ground_truth.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Unbounded, run-scoped cache of fact classifications.
///
/// Safe to share across concurrently running metrics. Two metrics racing on
/// the same key may both call the judge; the last write wins.
pub struct FactClassificationCache {
    cache: Cache<FactCacheKey, ClassifiedFacts>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl FactClassificationCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().build(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn get(&self, key: &FactCacheKey) -> Option<ClassifiedFacts> {
        match self.cache.get(key).await {
            Some(facts) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(facts)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set(&self, key: FactCacheKey, facts: ClassifiedFacts) {
        self.cache.insert(key, facts).await;
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for FactClassificationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}
