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

use serde::{Deserialize, Serialize};

/// Outcome of one metric on one test case in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOutput {
    /// Zero-based repetition index
    pub run: usize,

    /// Human-readable metric name (e.g. "Factual Recall")
    pub metric: String,

    /// Score in [0, 1]; `None` when the metric errored or had nothing to score
    pub score: Option<f64>,

    /// Judge cost in USD; `None` when the judge does not report cost
    pub cost: Option<f64>,

    pub reason: Option<String>,

    pub success: Option<bool>,

    pub error: Option<String>,
}

impl MetricOutput {
    /// Whether this row carries a usable score. Rows with an error or a
    /// missing score are excluded from averages.
    pub fn is_scored(&self) -> bool {
        self.error.is_none() && self.score.is_some()
    }
}

/// All metric outputs for one test case, across every run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub name: String,
    pub input: String,
    pub actual_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    pub retrieval_context: Vec<String>,
    pub run_metric_outputs: Vec<MetricOutput>,
}

impl EvaluationResult {
    /// Outputs that carry an error, in recorded order
    pub fn errors(&self) -> impl Iterator<Item = &MetricOutput> {
        self.run_metric_outputs.iter().filter(|o| o.error.is_some())
    }
}
