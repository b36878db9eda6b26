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

//! # Chateval answer metrics
//!
//! LLM-judged scoring of chat answers against ground truth.
//!
//! ## Features
//!
//! - **Factual precision/recall and correctness/completeness**: a judge
//!   classifies statements into TP/FP/FN; scores are ratios over those counts
//! - **Absence of factual contradictions, context relevancy, coherence**:
//!   extract-then-verdict pipelines scored as the fraction of non-"no" verdicts
//! - **Fact classification cache**: one judge call per (model, answer, ground
//!   truth) per run, shared between metric instances
//! - **Invalid-JSON retry**: transparent retries when a judge emits malformed JSON
//! - **Two judge capabilities**: schema-capable judges return structured output,
//!   text-only judges are parsed from raw text
//!
//! ## Example
//!
//! ```rust,ignore
//! use chateval_evals::cache::FactClassificationCache;
//! use chateval_evals::evaluators::{FactualMode, FactualPrecisionRecall};
//! use chateval_evals::judge::OpenAIJudge;
//! use chateval_evals::retry::InvalidJsonRetry;
//! use chateval_evals::Metric;
//! use chateval_core::TestCase;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let judge = OpenAIJudge::new(std::env::var("OPENAI_API_KEY").unwrap(), "gpt-4o-mini".into());
//!     let judge = Arc::new(InvalidJsonRetry::new(Arc::new(judge), 3).unwrap());
//!     let cache = Arc::new(FactClassificationCache::new());
//!
//!     let mut recall = FactualPrecisionRecall::new(judge, FactualMode::Recall)
//!         .with_cache(cache);
//!
//!     let case = TestCase::new("What noises do animals make?", "Dogs bark.")
//!         .with_expected_output("Pigs oink. Dogs bark.");
//!     let score = recall.a_measure(&case).await.unwrap();
//!     println!("recall = {score}");
//! }
//! ```

use async_trait::async_trait;
use chateval_core::TestCase;
use thiserror::Error;

pub mod cache;
pub mod config;
pub mod evaluators;
pub mod json_output;
pub mod judge;
pub mod prompts;
pub mod retry;
pub mod runner;
pub mod schema;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{FactCacheKey, FactClassificationCache};
pub use config::{JudgeConfig, JudgeProvider, MetricConfig, MetricName, MetricSuite, TaskConfig};
pub use evaluators::{
    AbsenceOfFactualContradictions, CoherenceMetric, ContextRelevancyMetric, CorrectnessMode,
    FactualCorrectnessCompleteness, FactualMode, FactualPrecisionRecall, MetricOptions,
};
pub use judge::{JudgeCapability, JudgeError, JudgeModel};
pub use retry::InvalidJsonRetry;
pub use runner::{log_metric_errors, summarize, EvaluationRunner, MetricSummary, RunnerConfig};

/// Core trait that all metrics implement
///
/// A metric instance is single-owner: `a_measure` takes `&mut self` and
/// records the outcome of the last measurement in [`MetricState`].
#[async_trait]
pub trait Metric: Send + Sync {
    /// Human-readable name (e.g. "Factual Recall")
    fn name(&self) -> &str;

    /// Effective pass/fail threshold (1.0 in strict mode)
    fn threshold(&self) -> f64;

    /// Synchronous measurement is not supported by any judge-backed metric.
    fn measure(&mut self, _test_case: &TestCase) -> Result<f64, EvalError> {
        Err(EvalError::Unsupported(format!(
            "Synchronous evaluation is not supported by '{}'. Use a_measure instead.",
            self.name()
        )))
    }

    /// Score a test case, updating the instance state
    async fn a_measure(&mut self, test_case: &TestCase) -> Result<f64, EvalError>;

    /// State recorded by the last measurement
    fn state(&self) -> &MetricState;

    /// True when the last measurement recorded no error and passed the threshold
    fn is_successful(&self) -> bool {
        let state = self.state();
        state.error.is_none() && state.success == Some(true)
    }
}

/// Outcome of the last measurement of a metric instance
#[derive(Debug, Clone, Default)]
pub struct MetricState {
    /// Last score; NaN when the metric could not produce a meaningful number
    pub score: Option<f64>,

    pub reason: Option<String>,

    pub success: Option<bool>,

    /// Soft error that did not abort the measurement
    pub error: Option<String>,

    /// Accumulated judge cost in USD. `None` means cost is not tracked
    /// (text-only judges); `Some(0.0)` onwards means tracked.
    pub evaluation_cost: Option<f64>,

    pub verbose_logs: Option<String>,
}

impl MetricState {
    /// Clear the previous outcome. Cost tracking starts at zero for judges
    /// that report cost.
    pub(crate) fn reset(&mut self, tracks_cost: bool) {
        *self = MetricState {
            evaluation_cost: tracks_cost.then_some(0.0),
            ..Default::default()
        };
    }

    pub(crate) fn add_cost(&mut self, cost: Option<f64>) {
        if let Some(cost) = cost {
            self.evaluation_cost = Some(self.evaluation_cost.unwrap_or(0.0) + cost);
        }
    }
}

/// Errors that can occur during evaluation
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Missing test case params: {0}")]
    MissingParams(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Judge(#[from] JudgeError),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
