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

//! Context relevancy
//!
//! Checks whether the retrieved passages carry the information the question
//! needs. Facts are extracted from each passage, information needs from the
//! question, and each need gets a verdict against the facts.

use super::{check_params, judge_result, pretty_list, verbose_logs, MetricOptions};
use crate::judge::{JudgeCapability, JudgeModel};
use crate::prompts::context_relevancy as prompt;
use crate::schema::{ContextTruthCollection, InformationNeedsCollection, ScoreReason, VerdictCollection};
use crate::{EvalError, Metric, MetricState};
use async_trait::async_trait;
use chateval_core::{StructuredContext, TestCase, TestCaseParam};
use std::sync::Arc;

pub const DEFAULT_THRESHOLD: f64 = 0.8;

const NAME: &str = "Context Relevancy";

const REQUIRED_PARAMS: [TestCaseParam; 2] = [TestCaseParam::Input, TestCaseParam::ActualOutput];

pub struct ContextRelevancyMetric {
    judge: Arc<dyn JudgeModel>,
    options: MetricOptions,
    state: MetricState,
    truths: ContextTruthCollection,
    information_needs: InformationNeedsCollection,
    verdicts: VerdictCollection,
}

impl ContextRelevancyMetric {
    pub fn new(judge: Arc<dyn JudgeModel>) -> Self {
        Self {
            judge,
            options: MetricOptions::new(DEFAULT_THRESHOLD),
            state: MetricState::default(),
            truths: ContextTruthCollection::default(),
            information_needs: InformationNeedsCollection::default(),
            verdicts: VerdictCollection::default(),
        }
    }

    pub fn with_options(mut self, options: MetricOptions) -> Self {
        self.options = options;
        self
    }

    pub fn information_needs(&self) -> &InformationNeedsCollection {
        &self.information_needs
    }

    pub fn verdicts(&self) -> &VerdictCollection {
        &self.verdicts
    }

    async fn generate_truths(
        &mut self,
        contexts: &[StructuredContext],
    ) -> Result<ContextTruthCollection, EvalError> {
        let retrieval_context: Vec<String> = contexts
            .iter()
            .map(StructuredContext::to_flattened_context_content)
            .collect();
        let prompt = prompt::truths(&retrieval_context);
        judge_result(self.judge.as_ref(), &mut self.state, &prompt).await
    }

    async fn generate_verdicts(&mut self) -> Result<VerdictCollection, EvalError> {
        if self.information_needs.information_needs.is_empty() {
            return Ok(VerdictCollection::default());
        }

        let prompt = prompt::verdicts(
            &self.information_needs.information_needs,
            &self.truths.truths,
        );
        judge_result(self.judge.as_ref(), &mut self.state, &prompt).await
    }

    async fn generate_reason(&mut self, input: &str, score: f64) -> Result<Option<String>, EvalError> {
        if !self.options.include_reason {
            return Ok(None);
        }

        let unmet_needs = self.verdicts.negative_reasons();
        let prompt = prompt::reason(&unmet_needs, input, score);
        let result: ScoreReason = judge_result(self.judge.as_ref(), &mut self.state, &prompt).await?;
        Ok(Some(result.reason))
    }
}

#[async_trait]
impl Metric for ContextRelevancyMetric {
    fn name(&self) -> &str {
        NAME
    }

    fn threshold(&self) -> f64 {
        self.options.effective_threshold()
    }

    async fn a_measure(&mut self, test_case: &TestCase) -> Result<f64, EvalError> {
        check_params(NAME, test_case, &REQUIRED_PARAMS)?;

        let contexts = test_case.structured_contexts.as_deref().ok_or_else(|| {
            EvalError::MissingParams(format!(
                "structured_contexts cannot be None for the '{}' metric",
                NAME
            ))
        })?;

        self.state
            .reset(self.judge.capability() == JudgeCapability::SchemaCapable);

        self.truths = self.generate_truths(contexts).await?;

        let needs_prompt = prompt::information_needs(&test_case.input);
        self.information_needs =
            judge_result(self.judge.as_ref(), &mut self.state, &needs_prompt).await?;

        self.verdicts = self.generate_verdicts().await?;

        let score = self.options.apply_strict(self.verdicts.score_verdicts());
        self.state.score = Some(score);
        self.state.reason = self.generate_reason(&test_case.input, score).await?;
        self.state.success = Some(self.options.passes(&self.state));
        self.state.verbose_logs = Some(verbose_logs(
            NAME,
            &[
                format!("Truths: {}", pretty_list(&self.truths.truths)),
                format!(
                    "Information Needs:\n{}",
                    pretty_list(&self.information_needs.information_needs)
                ),
                format!("Verdicts:\n{}", pretty_list(&self.verdicts.verdicts)),
                format!(
                    "Score: {}\nReason: {}",
                    score,
                    self.state.reason.as_deref().unwrap_or("None")
                ),
            ],
            self.options.verbose_mode,
        ));

        Ok(score)
    }

    fn state(&self) -> &MetricState {
        &self.state
    }
}
