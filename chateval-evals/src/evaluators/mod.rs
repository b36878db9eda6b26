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

//! LLM-judged answer metrics

pub mod coherence;
pub mod contradictions;
pub mod context_relevancy;
pub mod factual;

pub use coherence::CoherenceMetric;
pub use contradictions::AbsenceOfFactualContradictions;
pub use context_relevancy::ContextRelevancyMetric;
pub use factual::{
    CorrectnessMode, FactualCorrectnessCompleteness, FactualMode, FactualPrecisionRecall,
};

use crate::judge::{generate_structured, JudgeModel, JudgeSchema};
use crate::{EvalError, MetricState};
use chateval_core::{TestCase, TestCaseParam};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Options shared by every metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricOptions {
    /// Pass/fail cutoff in [0, 1]
    pub threshold: f64,

    /// Ask the judge for a textual explanation of the score
    pub include_reason: bool,

    /// Scores below the threshold become 0 and the threshold becomes 1
    pub strict_mode: bool,

    /// Log the intermediate steps of every measurement
    pub verbose_mode: bool,
}

impl MetricOptions {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            include_reason: true,
            strict_mode: false,
            verbose_mode: false,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_include_reason(mut self, include_reason: bool) -> Self {
        self.include_reason = include_reason;
        self
    }

    pub fn with_strict_mode(mut self, strict_mode: bool) -> Self {
        self.strict_mode = strict_mode;
        self
    }

    pub fn with_verbose_mode(mut self, verbose_mode: bool) -> Self {
        self.verbose_mode = verbose_mode;
        self
    }

    /// Threshold used for the success check: 1.0 in strict mode
    pub fn effective_threshold(&self) -> f64 {
        if self.strict_mode {
            1.0
        } else {
            self.threshold
        }
    }

    /// Force a failing score to zero in strict mode. NaN passes through.
    pub(crate) fn apply_strict(&self, score: f64) -> f64 {
        if self.strict_mode && score < self.effective_threshold() {
            0.0
        } else {
            score
        }
    }

    /// No error recorded and the score reaches the threshold
    pub(crate) fn passes(&self, state: &MetricState) -> bool {
        if state.error.is_some() {
            return false;
        }
        matches!(state.score, Some(score) if score >= self.effective_threshold())
    }
}

/// Fail with [`EvalError::MissingParams`] when `required` fields are absent
pub(crate) fn check_params(
    metric: &str,
    test_case: &TestCase,
    required: &[TestCaseParam],
) -> Result<(), EvalError> {
    let missing = test_case.missing(required);
    if missing.is_empty() {
        return Ok(());
    }

    let names: Vec<String> = missing.iter().map(|p| format!("'{}'", p)).collect();
    Err(EvalError::MissingParams(format!(
        "{} cannot be None for the '{}' metric",
        names.join(", "),
        metric
    )))
}

/// Ask the judge for a `T`, adding the call's cost to `state`
pub(crate) async fn judge_result<T: JudgeSchema>(
    judge: &dyn JudgeModel,
    state: &mut MetricState,
    prompt: &str,
) -> Result<T, EvalError> {
    let judged = generate_structured::<T>(judge, prompt).await?;
    state.add_cost(judged.cost);
    Ok(judged.value)
}

/// Render the step log of one measurement, logging it when `verbose` is set
pub(crate) fn verbose_logs(metric: &str, steps: &[String], verbose: bool) -> String {
    let header = format!("{} Verbose Logs", metric);
    let logs = format!(
        "{}\n{}\n\n{}",
        header,
        "=".repeat(header.len()),
        steps.join("\n\n")
    );

    if verbose {
        info!("{}", logs);
    }

    logs
}

/// Render a list for the verbose log, one item per line
pub(crate) fn pretty_list<T: std::fmt::Debug>(items: &[T]) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }

    let lines: Vec<String> = items.iter().map(|item| format!("    {:?}", item)).collect();
    format!("[\n{}\n]", lines.join(",\n"))
}
