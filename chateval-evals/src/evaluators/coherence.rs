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

//! Coherence of an answer on its own terms, without a ground truth

use super::{check_params, judge_result, pretty_list, verbose_logs, MetricOptions};
use crate::judge::{JudgeCapability, JudgeModel};
use crate::prompts::coherence as prompt;
use crate::schema::{ScoreReason, StatementCollection, VerdictCollection};
use crate::{EvalError, Metric, MetricState};
use async_trait::async_trait;
use chateval_core::{TestCase, TestCaseParam};
use std::sync::Arc;

pub const DEFAULT_THRESHOLD: f64 = 0.8;

const NAME: &str = "Coherence";

const REQUIRED_PARAMS: [TestCaseParam; 2] = [TestCaseParam::Input, TestCaseParam::ActualOutput];

pub struct CoherenceMetric {
    judge: Arc<dyn JudgeModel>,
    options: MetricOptions,
    state: MetricState,
    statements: StatementCollection,
    verdicts: VerdictCollection,
}

impl CoherenceMetric {
    pub fn new(judge: Arc<dyn JudgeModel>) -> Self {
        Self {
            judge,
            options: MetricOptions::new(DEFAULT_THRESHOLD),
            state: MetricState::default(),
            statements: StatementCollection::default(),
            verdicts: VerdictCollection::default(),
        }
    }

    pub fn with_options(mut self, options: MetricOptions) -> Self {
        self.options = options;
        self
    }

    pub fn verdicts(&self) -> &VerdictCollection {
        &self.verdicts
    }
}

#[async_trait]
impl Metric for CoherenceMetric {
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

        let actual_output = test_case.actual_output.as_deref().unwrap_or_default();

        let statements_prompt = prompt::statements(&test_case.input, actual_output);
        self.statements =
            judge_result(self.judge.as_ref(), &mut self.state, &statements_prompt).await?;

        self.verdicts = if self.statements.statements.is_empty() {
            VerdictCollection::default()
        } else {
            let verdicts_prompt = prompt::verdicts(&test_case.input, &self.statements.statements);
            judge_result(self.judge.as_ref(), &mut self.state, &verdicts_prompt).await?
        };

        let score = self.options.apply_strict(self.verdicts.score_verdicts());
        self.state.score = Some(score);

        if self.options.include_reason {
            let incoherences = self.verdicts.negative_reasons();
            let reason_prompt = prompt::reason(score, &incoherences);
            let result: ScoreReason =
                judge_result(self.judge.as_ref(), &mut self.state, &reason_prompt).await?;
            self.state.reason = Some(result.reason);
        }

        self.state.success = Some(self.options.passes(&self.state));
        self.state.verbose_logs = Some(verbose_logs(
            NAME,
            &[
                format!("Statements:\n{}", pretty_list(&self.statements.statements)),
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
