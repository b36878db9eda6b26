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

//! Batch runner: evaluates test cases against a metric suite, `n_runs` times

use crate::cache::FactClassificationCache;
use crate::config::{MetricSuite, TaskConfig};
use crate::{EvalError, Metric};
use chateval_core::{EvaluationResult, MetricOutput, TestCase};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub n_runs: usize,

    /// Test cases in flight at once
    pub max_concurrent: usize,

    /// Record a failing measurement as an error row instead of aborting
    pub ignore_errors: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            n_runs: 1,
            max_concurrent: 40,
            ignore_errors: true,
        }
    }
}

impl From<&TaskConfig> for RunnerConfig {
    fn from(task: &TaskConfig) -> Self {
        Self {
            n_runs: task.n_runs,
            max_concurrent: task.max_concurrent,
            ignore_errors: task.ignore_errors,
        }
    }
}

pub struct EvaluationRunner {
    config: RunnerConfig,
}

impl EvaluationRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Evaluate every case with fresh metric instances per case and run.
    ///
    /// One fact classification cache is shared by all runs and metrics of
    /// this call. Results come back in input order, one per case.
    pub async fn run(
        &self,
        cases: &[TestCase],
        suite: &MetricSuite,
    ) -> Result<Vec<EvaluationResult>, EvalError> {
        let started = Instant::now();
        let cache = Arc::new(FactClassificationCache::new());
        let n_runs = self.config.n_runs.max(1);
        let concurrency = self.config.max_concurrent.max(1);

        info!(
            cases = cases.len(),
            metrics = suite.len(),
            "Running evaluation"
        );

        let mut outputs: Vec<Vec<MetricOutput>> = vec![Vec::new(); cases.len()];

        for run in 0..n_runs {
            info!("Running evaluation iteration {}/{}...", run + 1, n_runs);

            // Without ignore_errors the first failure stops the stream, so no
            // further case is started.
            let cache = &cache;
            let mut run_outputs: Vec<(usize, Vec<MetricOutput>)> =
                stream::iter(cases.iter().enumerate())
                    .map(move |(index, case)| async move {
                        self.evaluate_case(run, case, suite, cache)
                            .await
                            .map(|case_outputs| (index, case_outputs))
                    })
                    .buffer_unordered(concurrency)
                    .try_collect()
                    .await?;

            run_outputs.sort_by_key(|(index, _)| *index);
            for (index, case_outputs) in run_outputs {
                outputs[index].extend(case_outputs);
            }
        }

        let stats = cache.stats();
        debug!(
            hits = stats.hits,
            misses = stats.misses,
            "Fact classification cache"
        );
        info!(
            "Evaluation complete in {:.2}s",
            started.elapsed().as_secs_f64()
        );

        Ok(cases
            .iter()
            .zip(outputs)
            .map(|(case, run_metric_outputs)| EvaluationResult {
                name: case.name.clone(),
                input: case.input.clone(),
                actual_output: case.actual_output.clone().unwrap_or_default(),
                expected_output: case.expected_output.clone(),
                retrieval_context: case.retrieval_context.clone(),
                run_metric_outputs,
            })
            .collect())
    }

    async fn evaluate_case(
        &self,
        run: usize,
        case: &TestCase,
        suite: &MetricSuite,
        cache: &Arc<FactClassificationCache>,
    ) -> Result<Vec<MetricOutput>, EvalError> {
        let mut metrics = suite.instantiate(cache);
        let mut outputs = Vec::with_capacity(metrics.len());

        for metric in metrics.iter_mut() {
            let output = match metric.a_measure(case).await {
                Ok(_) => metric_output(run, metric.as_ref()),
                Err(e) if self.config.ignore_errors => MetricOutput {
                    run,
                    metric: metric.name().to_string(),
                    score: None,
                    cost: metric.state().evaluation_cost,
                    reason: None,
                    success: Some(false),
                    error: Some(e.to_string()),
                },
                Err(e) => return Err(e),
            };
            outputs.push(output);
        }

        Ok(outputs)
    }
}

/// Record the state of a metric after a completed measurement. NaN scores
/// are stored as `None`.
fn metric_output(run: usize, metric: &dyn Metric) -> MetricOutput {
    let state = metric.state();
    MetricOutput {
        run,
        metric: metric.name().to_string(),
        score: state.score.filter(|score| !score.is_nan()),
        cost: state.evaluation_cost,
        reason: state.reason.clone(),
        success: Some(metric.is_successful()),
        error: state.error.clone(),
    }
}

/// Warn once per errored metric row
pub fn log_metric_errors(results: &[EvaluationResult]) {
    for result in results {
        for output in result.errors() {
            warn!(
                case = %result.name,
                run = output.run,
                metric = %output.metric,
                "Metric error: {}",
                output.error.as_deref().unwrap_or_default()
            );
        }
    }
}

/// Mean score of one metric over every scored row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: String,

    /// `None` when no row of this metric was scored
    pub mean: Option<f64>,

    pub scored: usize,

    /// Rows excluded from the mean because of an error or missing score
    pub excluded: usize,
}

/// Per-metric means in order of first appearance. Errored and unscored rows
/// are excluded from the mean and counted separately.
pub fn summarize(results: &[EvaluationResult]) -> Vec<MetricSummary> {
    let mut summaries: Vec<(MetricSummary, f64)> = Vec::new();

    for output in results.iter().flat_map(|r| r.run_metric_outputs.iter()) {
        let position = match summaries.iter().position(|(s, _)| s.metric == output.metric) {
            Some(position) => position,
            None => {
                summaries.push((
                    MetricSummary {
                        metric: output.metric.clone(),
                        mean: None,
                        scored: 0,
                        excluded: 0,
                    },
                    0.0,
                ));
                summaries.len() - 1
            }
        };

        let (summary, total) = &mut summaries[position];
        match output.score {
            Some(score) if output.is_scored() => {
                summary.scored += 1;
                *total += score;
            }
            _ => summary.excluded += 1,
        }
    }

    summaries
        .into_iter()
        .map(|(mut summary, total)| {
            if summary.scored > 0 {
                summary.mean = Some(total / summary.scored as f64);
            }
            summary
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JudgeConfig, MetricConfig, MetricName};
    use crate::judge::{JudgeError, JudgeModel};
    use crate::schema::{Verdict, VerdictCollection};
    use crate::test_support::ScriptedJudge;
    use serde_json::json;

    fn judge_config() -> JudgeConfig {
        JudgeConfig {
            provider: None,
            model: "gpt-4o".to_string(),
            temperature: 0.0,
            base_url: None,
        }
    }

    fn metric(name: MetricName) -> MetricConfig {
        let mut config = MetricConfig::new(name, judge_config());
        config.include_reason = false;
        config
    }

    fn case(name: &str) -> TestCase {
        TestCase::new("What noises do animals make?", "Dogs bark.")
            .with_name(name)
            .with_expected_output("Pigs oink. Dogs bark.")
    }

    fn classification() -> serde_json::Value {
        json!({"classified_facts": {"TP": ["Dogs bark."], "FP": [], "FN": ["Pigs oink."]}})
    }

    #[tokio::test]
    async fn test_runs_share_one_cache() {
        let judge = Arc::new(
            ScriptedJudge::schema_capable("gpt-4o").with_structured(classification(), Some(0.01)),
        );
        let shared: Arc<dyn JudgeModel> = judge.clone();
        let suite = MetricSuite::new()
            .with_metric(metric(MetricName::FactualPrecision), shared.clone())
            .with_metric(metric(MetricName::FactualRecall), shared);

        let runner = EvaluationRunner::new(RunnerConfig {
            n_runs: 2,
            max_concurrent: 4,
            ignore_errors: false,
        });
        let results = runner.run(&[case("animals")], &suite).await.unwrap();

        assert_eq!(judge.calls(), 1);
        assert_eq!(results.len(), 1);

        let outputs = &results[0].run_metric_outputs;
        let summary: Vec<(usize, &str, Option<f64>)> = outputs
            .iter()
            .map(|o| (o.run, o.metric.as_str(), o.score))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "Factual Precision", Some(1.0)),
                (0, "Factual Recall", Some(0.5)),
                (1, "Factual Precision", Some(1.0)),
                (1, "Factual Recall", Some(0.5)),
            ]
        );
        assert_eq!(outputs[0].cost, Some(0.01));
        assert_eq!(outputs[1].cost, Some(0.0));
        assert_eq!(results[0].expected_output.as_deref(), Some("Pigs oink. Dogs bark."));
    }

    #[tokio::test]
    async fn test_errors_are_recorded_when_ignored() {
        let judge: Arc<dyn JudgeModel> = Arc::new(
            ScriptedJudge::schema_capable("gpt-4o")
                .with_structured(json!({"classified_facts": {"TP": [], "FP": [], "FN": []}}), None)
                .with_error(JudgeError::RateLimitExceeded),
        );
        let suite = MetricSuite::new()
            .with_metric(metric(MetricName::FactualCorrectness), judge.clone())
            .with_metric(metric(MetricName::Coherence), judge);

        let runner = EvaluationRunner::new(RunnerConfig::default());
        let results = runner.run(&[case("greeting")], &suite).await.unwrap();

        let outputs = &results[0].run_metric_outputs;
        assert_eq!(outputs[0].score, None);
        assert!(outputs[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("Error: no facts were classified."));
        assert_eq!(outputs[1].error.as_deref(), Some("Rate limit exceeded"));
        assert_eq!(outputs[1].success, Some(false));
        assert_eq!(results[0].errors().count(), 2);

        log_metric_errors(&results);
    }

    #[tokio::test]
    async fn test_first_error_aborts_without_ignore_errors() {
        let judge: Arc<dyn JudgeModel> = Arc::new(
            ScriptedJudge::schema_capable("gpt-4o").with_error(JudgeError::RateLimitExceeded),
        );
        let suite = MetricSuite::new().with_metric(metric(MetricName::Coherence), judge);

        let runner = EvaluationRunner::new(RunnerConfig {
            ignore_errors: false,
            ..Default::default()
        });
        let err = runner.run(&[case("a")], &suite).await.unwrap_err();
        assert!(matches!(err, EvalError::Judge(JudgeError::RateLimitExceeded)));
    }

    #[tokio::test]
    async fn test_no_case_starts_after_a_failure() {
        let judge = Arc::new(
            ScriptedJudge::schema_capable("gpt-4o")
                .with_error(JudgeError::RateLimitExceeded)
                .with_structured(json!({"statements": ["s"]}), None)
                .with_value(&VerdictCollection::new(vec![Verdict::yes()]), None),
        );
        let shared: Arc<dyn JudgeModel> = judge.clone();
        let suite = MetricSuite::new().with_metric(metric(MetricName::Coherence), shared);

        let runner = EvaluationRunner::new(RunnerConfig {
            n_runs: 2,
            max_concurrent: 1,
            ignore_errors: false,
        });
        let err = runner
            .run(&[case("a"), case("b")], &suite)
            .await
            .unwrap_err();

        assert!(matches!(err, EvalError::Judge(JudgeError::RateLimitExceeded)));
        assert_eq!(judge.calls(), 1);
    }

    #[tokio::test]
    async fn test_precision_without_claims_is_unscored_but_not_an_error() {
        let judge: Arc<dyn JudgeModel> = Arc::new(
            ScriptedJudge::schema_capable("gpt-4o").with_structured(
                json!({"classified_facts": {"TP": [], "FP": [], "FN": ["Pigs oink."]}}),
                None,
            ),
        );
        let suite = MetricSuite::new()
            .with_metric(metric(MetricName::FactualPrecision), judge.clone())
            .with_metric(metric(MetricName::FactualRecall), judge);

        let runner = EvaluationRunner::new(RunnerConfig::default());
        let results = runner.run(&[case("silent")], &suite).await.unwrap();

        let outputs = &results[0].run_metric_outputs;
        assert_eq!(outputs[0].metric, "Factual Precision");
        assert_eq!(outputs[0].score, None);
        assert_eq!(outputs[0].error, None);
        assert_eq!(outputs[0].success, Some(false));
        assert_eq!(outputs[1].score, Some(0.0));
        assert_eq!(results[0].errors().count(), 0);

        let summaries = summarize(&results);
        assert_eq!(summaries[0].scored, 0);
        assert_eq!(summaries[0].excluded, 1);
        assert_eq!(summaries[0].mean, None);
        assert_eq!(summaries[1].mean, Some(0.0));
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let verdicts = VerdictCollection::new(vec![Verdict::yes()]);
        let mut judge = ScriptedJudge::schema_capable("gpt-4o");
        for _ in 0..5 {
            judge = judge
                .with_structured(json!({"statements": ["s"]}), None)
                .with_value(&verdicts, None);
        }
        let judge: Arc<dyn JudgeModel> = Arc::new(judge);
        let suite = MetricSuite::new().with_metric(metric(MetricName::Coherence), judge);

        let cases: Vec<TestCase> = (0..5).map(|i| case(&format!("case-{}", i))).collect();
        let runner = EvaluationRunner::new(RunnerConfig {
            max_concurrent: 1,
            ..Default::default()
        });
        let results = runner.run(&cases, &suite).await.unwrap();

        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["case-0", "case-1", "case-2", "case-3", "case-4"]);
        assert!(results
            .iter()
            .all(|r| r.run_metric_outputs[0].score == Some(1.0)));
    }

    #[test]
    fn test_summarize_excludes_unscored_rows() {
        let row = |metric: &str, score: Option<f64>, error: Option<&str>| MetricOutput {
            run: 0,
            metric: metric.to_string(),
            score,
            cost: None,
            reason: None,
            success: None,
            error: error.map(str::to_string),
        };
        let result = EvaluationResult {
            name: "n".to_string(),
            input: "q".to_string(),
            actual_output: "a".to_string(),
            expected_output: None,
            retrieval_context: vec![],
            run_metric_outputs: vec![
                row("Factual Recall", Some(0.5), None),
                row("Factual Recall", None, Some("Error: no facts were classified.")),
                row("Coherence", Some(1.0), None),
                row("Factual Recall", Some(1.0), None),
            ],
        };

        let summaries = summarize(&[result]);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].metric, "Factual Recall");
        assert_eq!(summaries[0].mean, Some(0.75));
        assert_eq!(summaries[0].scored, 2);
        assert_eq!(summaries[0].excluded, 1);
        assert_eq!(summaries[1].mean, Some(1.0));
    }
}
