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

//! Fact classification metrics
//!
//! Both families classify the statements of a candidate answer and its
//! ground truth into true positives (TP), false positives (FP) and false
//! negatives (FN) with one judge call, then score a ratio over the counts:
//!
//! - precision / correctness: TP / (TP + FP)
//! - recall / completeness: TP / (TP + FN)
//!
//! The classification is shared through [`FactClassificationCache`], so a
//! suite running all four metrics on one answer pays for one judge call.

use super::{check_params, pretty_list, verbose_logs, MetricOptions};
use crate::cache::{FactCacheKey, FactClassificationCache};
use crate::judge::{generate_structured, JudgeCapability, JudgeError, JudgeModel};
use crate::prompts;
use crate::schema::{ClassifiedFacts, FactClassificationResult};
use crate::{EvalError, Metric, MetricState};
use async_trait::async_trait;
use chateval_core::{TestCase, TestCaseParam};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

pub const DEFAULT_THRESHOLD: f64 = 0.5;

const REQUIRED_PARAMS: [TestCaseParam; 3] = [
    TestCaseParam::Input,
    TestCaseParam::ActualOutput,
    TestCaseParam::ExpectedOutput,
];

/// Which confusion-matrix cells form the ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ratio {
    /// TP / (TP + FP): of what the answer claims, how much is supported
    OverClaimed,
    /// TP / (TP + FN): of what should be said, how much was said
    OverExpected,
}

impl Ratio {
    /// NaN when the denominator is zero
    fn score(self, facts: &ClassifiedFacts) -> f64 {
        let (tp, fp, fn_) = facts.counts();
        let denominator = match self {
            Ratio::OverClaimed => tp + fp,
            Ratio::OverExpected => tp + fn_,
        };

        if denominator == 0 {
            f64::NAN
        } else {
            tp as f64 / denominator as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactualMode {
    Precision,
    Recall,
}

impl FactualMode {
    fn ratio(self) -> Ratio {
        match self {
            FactualMode::Precision => Ratio::OverClaimed,
            FactualMode::Recall => Ratio::OverExpected,
        }
    }

    fn metric_name(self) -> &'static str {
        match self {
            FactualMode::Precision => "Factual Precision",
            FactualMode::Recall => "Factual Recall",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectnessMode {
    Correctness,
    Completeness,
}

impl CorrectnessMode {
    fn ratio(self) -> Ratio {
        match self {
            CorrectnessMode::Correctness => Ratio::OverClaimed,
            CorrectnessMode::Completeness => Ratio::OverExpected,
        }
    }

    fn metric_name(self) -> &'static str {
        match self {
            CorrectnessMode::Correctness => "Factual Correctness",
            CorrectnessMode::Completeness => "Factual Completeness",
        }
    }
}

/// Classification step and state shared by both metric families
struct FactClassifier {
    judge: Arc<dyn JudgeModel>,
    cache: Arc<FactClassificationCache>,
    options: MetricOptions,
    state: MetricState,
    confusion_matrix: ClassifiedFacts,
    cache_hit: bool,
}

impl FactClassifier {
    fn new(judge: Arc<dyn JudgeModel>) -> Self {
        Self {
            judge,
            cache: Arc::new(FactClassificationCache::new()),
            options: MetricOptions::new(DEFAULT_THRESHOLD),
            state: MetricState::default(),
            confusion_matrix: ClassifiedFacts::default(),
            cache_hit: false,
        }
    }

    async fn measure(
        &mut self,
        metric: &str,
        ratio: Ratio,
        test_case: &TestCase,
    ) -> Result<f64, EvalError> {
        check_params(metric, test_case, &REQUIRED_PARAMS)?;

        self.state
            .reset(self.judge.capability() == JudgeCapability::SchemaCapable);

        let answer = test_case.actual_output.as_deref().unwrap_or_default();
        let ground_truth = test_case.expected_output.as_deref().unwrap_or_default();

        self.confusion_matrix = self.classify(&test_case.input, answer, ground_truth).await?;
        debug!(
            "Confusion matrix for test input: '{}': {:?}",
            test_case.input, self.confusion_matrix
        );

        Ok(self.finalise(metric, ratio, &test_case.input))
    }

    async fn classify(
        &mut self,
        input: &str,
        answer: &str,
        ground_truth: &str,
    ) -> Result<ClassifiedFacts, EvalError> {
        let key = FactCacheKey::new(Some(self.judge.model_name()), answer, ground_truth);

        if let Some(cached) = self.cache.get(&key).await {
            debug!(model = key.model(), "Fact classification cache hit");
            self.cache_hit = true;
            return Ok(cached);
        }
        self.cache_hit = false;

        let prompt = prompts::factual::classify_facts(answer, ground_truth);
        let facts = match generate_structured::<FactClassificationResult>(
            self.judge.as_ref(),
            &prompt,
        )
        .await
        {
            Ok(judged) => {
                self.state.add_cost(judged.cost);
                judged.value.classified_facts
            }
            Err(JudgeError::Parse(message)) => {
                error!(
                    "Failed to parse fallback JSON for test input: {}: {}",
                    input, message
                );
                return Ok(ClassifiedFacts::default());
            }
            Err(e) => return Err(e.into()),
        };

        if facts.has_facts() {
            self.cache.set(key, facts.clone()).await;
        }

        Ok(facts)
    }

    fn finalise(&mut self, metric: &str, ratio: Ratio, input: &str) -> f64 {
        if !self.confusion_matrix.has_facts() {
            let message = format!(
                "Error: no facts were classified. confusion_matrix is empty for input: {}.",
                input
            );
            error!("{}", message);
            self.state.error = Some(message);
            self.state.score = Some(f64::NAN);
            self.state.success = Some(false);
            return f64::NAN;
        }

        let score = self.options.apply_strict(ratio.score(&self.confusion_matrix));
        self.state.score = Some(score);
        self.state.reason = self.reason();
        self.state.success = Some(self.options.passes(&self.state));

        let (tp, fp, fn_) = self.confusion_matrix.counts();
        self.state.verbose_logs = Some(verbose_logs(
            metric,
            &[
                format!("Mode: {}", metric),
                format!("Cache hit: {}", self.cache_hit),
                format!("TP: {}, FP: {}, FN: {}", tp, fp, fn_),
                format!(
                    "TP statements:\n{}",
                    pretty_list(&self.confusion_matrix.true_positives)
                ),
                format!("Score: {}", score),
                format!(
                    "Reason: {}",
                    self.state.reason.as_deref().unwrap_or("Reason omitted")
                ),
            ],
            self.options.verbose_mode,
        ));

        score
    }

    fn reason(&self) -> Option<String> {
        if !self.options.include_reason {
            return None;
        }

        Some(
            serde_json::json!({
                "true_positive_statements": self.confusion_matrix.true_positives,
                "false_positive_statements": self.confusion_matrix.false_positives,
            })
            .to_string(),
        )
    }
}

/// Factual precision or recall of an answer against its ground truth
pub struct FactualPrecisionRecall {
    mode: FactualMode,
    classifier: FactClassifier,
}

impl FactualPrecisionRecall {
    pub fn new(judge: Arc<dyn JudgeModel>, mode: FactualMode) -> Self {
        Self {
            mode,
            classifier: FactClassifier::new(judge),
        }
    }

    /// Share classifications with other metrics of the same run
    pub fn with_cache(mut self, cache: Arc<FactClassificationCache>) -> Self {
        self.classifier.cache = cache;
        self
    }

    pub fn with_options(mut self, options: MetricOptions) -> Self {
        self.classifier.options = options;
        self
    }

    pub fn mode(&self) -> FactualMode {
        self.mode
    }

    /// Classification used by the last measurement
    pub fn confusion_matrix(&self) -> &ClassifiedFacts {
        &self.classifier.confusion_matrix
    }

    /// Whether the last measurement reused a cached classification
    pub fn used_cache(&self) -> bool {
        self.classifier.cache_hit
    }
}

#[async_trait]
impl Metric for FactualPrecisionRecall {
    fn name(&self) -> &str {
        self.mode.metric_name()
    }

    fn threshold(&self) -> f64 {
        self.classifier.options.effective_threshold()
    }

    async fn a_measure(&mut self, test_case: &TestCase) -> Result<f64, EvalError> {
        let name = self.mode.metric_name();
        self.classifier
            .measure(name, self.mode.ratio(), test_case)
            .await
    }

    fn state(&self) -> &MetricState {
        &self.classifier.state
    }
}

/// Factual correctness or completeness of an answer against its ground truth
pub struct FactualCorrectnessCompleteness {
    mode: CorrectnessMode,
    classifier: FactClassifier,
}

impl FactualCorrectnessCompleteness {
    pub fn new(judge: Arc<dyn JudgeModel>, mode: CorrectnessMode) -> Self {
        Self {
            mode,
            classifier: FactClassifier::new(judge),
        }
    }

    pub fn with_cache(mut self, cache: Arc<FactClassificationCache>) -> Self {
        self.classifier.cache = cache;
        self
    }

    pub fn with_options(mut self, options: MetricOptions) -> Self {
        self.classifier.options = options;
        self
    }

    pub fn mode(&self) -> CorrectnessMode {
        self.mode
    }

    pub fn confusion_matrix(&self) -> &ClassifiedFacts {
        &self.classifier.confusion_matrix
    }

    pub fn used_cache(&self) -> bool {
        self.classifier.cache_hit
    }
}

#[async_trait]
impl Metric for FactualCorrectnessCompleteness {
    fn name(&self) -> &str {
        self.mode.metric_name()
    }

    fn threshold(&self) -> f64 {
        self.classifier.options.effective_threshold()
    }

    async fn a_measure(&mut self, test_case: &TestCase) -> Result<f64, EvalError> {
        let name = self.mode.metric_name();
        self.classifier
            .measure(name, self.mode.ratio(), test_case)
            .await
    }

    fn state(&self) -> &MetricState {
        &self.classifier.state
    }
}
