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

//! Absence of factual contradictions
//!
//! Truths are extracted from the ground truth and claims from the answer;
//! every claim then gets a verdict against the truths. The score is the
//! fraction of claims that do not contradict the ground truth.

use super::{check_params, judge_result, pretty_list, verbose_logs, MetricOptions};
use crate::judge::{JudgeCapability, JudgeModel};
use crate::prompts::contradictions as prompt;
use crate::schema::{ClaimCollection, ScoreReason, TruthCollection, VerdictCollection};
use crate::{EvalError, Metric, MetricState};
use async_trait::async_trait;
use chateval_core::{TestCase, TestCaseParam};
use std::sync::Arc;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

const NAME: &str = "Absence of Factual Contradictions";

const REQUIRED_PARAMS: [TestCaseParam; 3] = [
    TestCaseParam::Input,
    TestCaseParam::ActualOutput,
    TestCaseParam::ExpectedOutput,
];

pub struct AbsenceOfFactualContradictions {
    judge: Arc<dyn JudgeModel>,
    options: MetricOptions,
    state: MetricState,
    truths: TruthCollection,
    claims: ClaimCollection,
    verdicts: VerdictCollection,
}

impl AbsenceOfFactualContradictions {
    pub fn new(judge: Arc<dyn JudgeModel>) -> Self {
        Self {
            judge,
            options: MetricOptions::new(DEFAULT_THRESHOLD),
            state: MetricState::default(),
            truths: TruthCollection::default(),
            claims: ClaimCollection::default(),
            verdicts: VerdictCollection::default(),
        }
    }

    pub fn with_options(mut self, options: MetricOptions) -> Self {
        self.options = options;
        self
    }

    /// Verdicts of the last measurement, one per extracted claim
    pub fn verdicts(&self) -> &VerdictCollection {
        &self.verdicts
    }

    async fn generate_verdicts(&mut self) -> Result<VerdictCollection, EvalError> {
        if self.claims.claims.is_empty() {
            return Ok(VerdictCollection::default());
        }

        let prompt = prompt::generate_verdicts(&self.claims.claims, &self.truths.truths);
        judge_result(self.judge.as_ref(), &mut self.state, &prompt).await
    }

    async fn generate_reason(&mut self, score: f64) -> Result<Option<String>, EvalError> {
        if !self.options.include_reason {
            return Ok(None);
        }

        let contradictions = self.verdicts.negative_reasons();
        let prompt = prompt::generate_reason(score, &contradictions);
        let result: ScoreReason = judge_result(self.judge.as_ref(), &mut self.state, &prompt).await?;
        Ok(Some(result.reason))
    }
}

#[async_trait]
impl Metric for AbsenceOfFactualContradictions {
    fn name(&self) -> &str {
        NAME
    }

    fn threshold(&self) -> f64 {
        self.options.effective_threshold()
    }

    async fn a_measure(&mut self, test_case: &TestCase) -> Result<f64, EvalError> {
        check_params(NAME, test_case, &REQUIRED_PARAMS)?;

        self.state
            .reset(self.judge.capability() == JudgeCapability::SchemaCapable);

        let expected_output = test_case.expected_output.as_deref().unwrap_or_default();
        let actual_output = test_case.actual_output.as_deref().unwrap_or_default();

        let truths_prompt = prompt::generate_truths(expected_output);
        self.truths = judge_result(self.judge.as_ref(), &mut self.state, &truths_prompt).await?;

        let claims_prompt = prompt::generate_claims(actual_output);
        self.claims = judge_result(self.judge.as_ref(), &mut self.state, &claims_prompt).await?;

        self.verdicts = self.generate_verdicts().await?;

        let score = self.options.apply_strict(self.verdicts.score_verdicts());
        self.state.score = Some(score);
        self.state.reason = self.generate_reason(score).await?;
        self.state.success = Some(self.options.passes(&self.state));
        self.state.verbose_logs = Some(verbose_logs(
            NAME,
            &[
                format!("Truths:\n{}", pretty_list(&self.truths.truths)),
                format!("Claims:\n{}", pretty_list(&self.claims.claims)),
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
