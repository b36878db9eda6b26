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

//! Task configuration: which metrics to run, with which judge
//!
//! ```toml
//! n_runs = 3
//!
//! [[metrics]]
//! name = "factual_precision"
//! threshold = 0.6
//! model = "gpt-4o-mini"
//!
//! [[metrics]]
//! name = "context_relevancy"
//! threshold = 0.8
//! [metrics.llm_judge]
//! provider = "anthropic"
//! model = "claude-3-5-haiku-20241022"
//! ```
//!
//! A metric takes either an `llm_judge` table or flat `model`, `provider`,
//! `temperature` and `base_url` keys, which are folded into `llm_judge`.

use crate::cache::FactClassificationCache;
use crate::evaluators::{
    coherence, context_relevancy, contradictions, factual, AbsenceOfFactualContradictions,
    CoherenceMetric, ContextRelevancyMetric, CorrectnessMode, FactualCorrectnessCompleteness,
    FactualMode, FactualPrecisionRecall, MetricOptions,
};
use crate::judge::{AnthropicJudge, JudgeModel, OpenAIJudge};
use crate::retry::InvalidJsonRetry;
use crate::{EvalError, Metric};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    FactualPrecision,
    FactualRecall,
    FactualCorrectness,
    FactualCompleteness,
    AbsenceOfFactualContradictions,
    ContextRelevancy,
    Coherence,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::FactualPrecision => "factual_precision",
            MetricName::FactualRecall => "factual_recall",
            MetricName::FactualCorrectness => "factual_correctness",
            MetricName::FactualCompleteness => "factual_completeness",
            MetricName::AbsenceOfFactualContradictions => "absence_of_factual_contradictions",
            MetricName::ContextRelevancy => "context_relevancy",
            MetricName::Coherence => "coherence",
        }
    }

    pub fn default_threshold(&self) -> f64 {
        match self {
            MetricName::FactualPrecision
            | MetricName::FactualRecall
            | MetricName::FactualCorrectness
            | MetricName::FactualCompleteness => factual::DEFAULT_THRESHOLD,
            MetricName::AbsenceOfFactualContradictions => contradictions::DEFAULT_THRESHOLD,
            MetricName::ContextRelevancy => context_relevancy::DEFAULT_THRESHOLD,
            MetricName::Coherence => coherence::DEFAULT_THRESHOLD,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeProvider {
    OpenAI,
    Anthropic,
}

impl JudgeProvider {
    /// Guess the provider from a model id when none is configured
    pub fn infer(model: &str) -> Self {
        if model.starts_with("claude") || model.contains("anthropic.") {
            JudgeProvider::Anthropic
        } else {
            JudgeProvider::OpenAI
        }
    }

    pub fn api_key_var(&self) -> &'static str {
        match self {
            JudgeProvider::OpenAI => "OPENAI_API_KEY",
            JudgeProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

/// Judge model used by one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Inferred from the model id when absent
    #[serde(default)]
    pub provider: Option<JudgeProvider>,

    pub model: String,

    #[serde(default)]
    pub temperature: f64,

    /// Override the provider's API endpoint (e.g. a proxy)
    #[serde(default)]
    pub base_url: Option<String>,
}

impl JudgeConfig {
    pub fn provider(&self) -> JudgeProvider {
        self.provider
            .unwrap_or_else(|| JudgeProvider::infer(&self.model))
    }

    /// Build the judge, reading its API key from the environment, and wrap
    /// it in the invalid-JSON retry wrapper
    pub fn instantiate(&self, max_attempts: i32) -> Result<Arc<dyn JudgeModel>, EvalError> {
        self.instantiate_with(max_attempts, |var| std::env::var(var).ok())
    }

    pub(crate) fn instantiate_with(
        &self,
        max_attempts: i32,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Arc<dyn JudgeModel>, EvalError> {
        let provider = self.provider();
        let api_key = lookup(provider.api_key_var()).ok_or_else(|| {
            EvalError::Configuration(format!(
                "{} must be set to use judge model '{}'",
                provider.api_key_var(),
                self.model
            ))
        })?;

        let judge: Arc<dyn JudgeModel> = match provider {
            JudgeProvider::OpenAI => {
                let mut judge = OpenAIJudge::new(api_key, self.model.clone())
                    .with_temperature(self.temperature);
                if let Some(base_url) = &self.base_url {
                    judge = judge.with_base_url(base_url.clone());
                }
                Arc::new(judge)
            }
            JudgeProvider::Anthropic => {
                let mut judge = AnthropicJudge::new(api_key, self.model.clone())
                    .with_temperature(self.temperature);
                if let Some(base_url) = &self.base_url {
                    judge = judge.with_base_url(base_url.clone());
                }
                Arc::new(judge)
            }
        };

        Ok(Arc::new(InvalidJsonRetry::new(judge, max_attempts)?))
    }
}

/// One configured metric
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawMetricConfig")]
pub struct MetricConfig {
    pub name: MetricName,
    pub threshold: f64,
    pub llm_judge: JudgeConfig,
    pub include_reason: bool,
    pub strict_mode: bool,
    pub verbose_mode: bool,
}

impl MetricConfig {
    pub fn new(name: MetricName, llm_judge: JudgeConfig) -> Self {
        Self {
            name,
            threshold: name.default_threshold(),
            llm_judge,
            include_reason: true,
            strict_mode: false,
            verbose_mode: false,
        }
    }

    pub fn options(&self) -> MetricOptions {
        MetricOptions::new(self.threshold)
            .with_include_reason(self.include_reason)
            .with_strict_mode(self.strict_mode)
            .with_verbose_mode(self.verbose_mode)
    }

    /// Fresh metric instance. Fact classification metrics share `cache`.
    pub fn build(
        &self,
        judge: Arc<dyn JudgeModel>,
        cache: &Arc<FactClassificationCache>,
    ) -> Box<dyn Metric> {
        let options = self.options();
        match self.name {
            MetricName::FactualPrecision => Box::new(
                FactualPrecisionRecall::new(judge, FactualMode::Precision)
                    .with_cache(cache.clone())
                    .with_options(options),
            ),
            MetricName::FactualRecall => Box::new(
                FactualPrecisionRecall::new(judge, FactualMode::Recall)
                    .with_cache(cache.clone())
                    .with_options(options),
            ),
            MetricName::FactualCorrectness => Box::new(
                FactualCorrectnessCompleteness::new(judge, CorrectnessMode::Correctness)
                    .with_cache(cache.clone())
                    .with_options(options),
            ),
            MetricName::FactualCompleteness => Box::new(
                FactualCorrectnessCompleteness::new(judge, CorrectnessMode::Completeness)
                    .with_cache(cache.clone())
                    .with_options(options),
            ),
            MetricName::AbsenceOfFactualContradictions => {
                Box::new(AbsenceOfFactualContradictions::new(judge).with_options(options))
            }
            MetricName::ContextRelevancy => {
                Box::new(ContextRelevancyMetric::new(judge).with_options(options))
            }
            MetricName::Coherence => Box::new(CoherenceMetric::new(judge).with_options(options)),
        }
    }
}

/// Metric config as written in TOML, before flat judge keys are folded
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMetricConfig {
    name: MetricName,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    llm_judge: Option<JudgeConfig>,
    #[serde(default)]
    provider: Option<JudgeProvider>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default = "default_true")]
    include_reason: bool,
    #[serde(default)]
    strict_mode: bool,
    #[serde(default)]
    verbose_mode: bool,
}

impl TryFrom<RawMetricConfig> for MetricConfig {
    type Error = String;

    fn try_from(raw: RawMetricConfig) -> Result<Self, Self::Error> {
        let flat_keys: Vec<&str> = [
            ("model", raw.model.is_some()),
            ("provider", raw.provider.is_some()),
            ("temperature", raw.temperature.is_some()),
            ("base_url", raw.base_url.is_some()),
        ]
        .into_iter()
        .filter_map(|(key, set)| set.then_some(key))
        .collect();

        let llm_judge = match (raw.llm_judge, raw.model) {
            (Some(_), _) if !flat_keys.is_empty() => {
                return Err(format!(
                    "metric '{}' sets both llm_judge and {}; use one",
                    raw.name,
                    flat_keys.join(", ")
                ))
            }
            (Some(judge), _) => judge,
            (None, Some(model)) => JudgeConfig {
                provider: raw.provider,
                model,
                temperature: raw.temperature.unwrap_or(0.0),
                base_url: raw.base_url,
            },
            (None, None) => {
                return Err(format!(
                    "metric '{}' needs an llm_judge table or a model key",
                    raw.name
                ))
            }
        };

        Ok(MetricConfig {
            name: raw.name,
            threshold: raw.threshold.unwrap_or_else(|| raw.name.default_threshold()),
            llm_judge,
            include_reason: raw.include_reason,
            strict_mode: raw.strict_mode,
            verbose_mode: raw.verbose_mode,
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_n_runs() -> usize {
    1
}

fn default_max_concurrent() -> usize {
    40
}

fn default_invalid_json_max_attempts() -> i32 {
    InvalidJsonRetry::DEFAULT_MAX_ATTEMPTS
}

/// Top-level evaluation task
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub metrics: Vec<MetricConfig>,

    /// Repetitions of the whole evaluation
    #[serde(default = "default_n_runs")]
    pub n_runs: usize,

    /// Test cases evaluated concurrently
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Attempts per judge call when the judge emits invalid JSON
    #[serde(default = "default_invalid_json_max_attempts")]
    pub invalid_json_max_attempts: i32,

    /// Record failing measurements instead of aborting the run
    #[serde(default = "default_true")]
    pub ignore_errors: bool,
}

impl TaskConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, EvalError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EvalError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if self.metrics.is_empty() {
            return Err(EvalError::Configuration(
                "at least one metric must be configured".to_string(),
            ));
        }
        if self.n_runs == 0 {
            return Err(EvalError::Configuration(
                "n_runs must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(EvalError::Configuration(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.invalid_json_max_attempts <= 0 {
            return Err(EvalError::Configuration(
                "max_attempts must be a positive integer to enable invalid JSON retries"
                    .to_string(),
            ));
        }
        for metric in &self.metrics {
            if !(0.0..=1.0).contains(&metric.threshold) {
                return Err(EvalError::Configuration(format!(
                    "threshold for '{}' must be between 0 and 1, got {}",
                    metric.name, metric.threshold
                )));
            }
        }

        Ok(())
    }

    /// Instantiate one judge per configured metric
    pub fn metric_suite(&self) -> Result<MetricSuite, EvalError> {
        let mut suite = MetricSuite::new();
        for metric in &self.metrics {
            let judge = metric.llm_judge.instantiate(self.invalid_json_max_attempts)?;
            suite = suite.with_metric(metric.clone(), judge);
        }
        Ok(suite)
    }
}

/// Configured metrics with their judges, ready to be instantiated per run
#[derive(Default)]
pub struct MetricSuite {
    entries: Vec<(MetricConfig, Arc<dyn JudgeModel>)>,
}

impl MetricSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metric(mut self, config: MetricConfig, judge: Arc<dyn JudgeModel>) -> Self {
        self.entries.push((config, judge));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fresh metric instances, in configured order, sharing `cache`
    pub fn instantiate(&self, cache: &Arc<FactClassificationCache>) -> Vec<Box<dyn Metric>> {
        self.entries
            .iter()
            .map(|(config, judge)| config.build(judge.clone(), cache))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::JudgeCapability;
    use std::io::Write;

    const TASK: &str = r#"
n_runs = 2

[[metrics]]
name = "factual_precision"
threshold = 0.6
model = "gpt-4o-mini"
temperature = 0.2

[[metrics]]
name = "context_relevancy"
strict_mode = true
[metrics.llm_judge]
provider = "anthropic"
model = "claude-3-5-haiku-20241022"
"#;

    #[test]
    fn test_parse_task() {
        let config = TaskConfig::from_toml_str(TASK).unwrap();

        assert_eq!(config.n_runs, 2);
        assert_eq!(config.max_concurrent, 40);
        assert_eq!(config.invalid_json_max_attempts, 3);
        assert!(config.ignore_errors);

        let precision = &config.metrics[0];
        assert_eq!(precision.name, MetricName::FactualPrecision);
        assert_eq!(precision.threshold, 0.6);
        assert_eq!(
            precision.llm_judge,
            JudgeConfig {
                provider: None,
                model: "gpt-4o-mini".to_string(),
                temperature: 0.2,
                base_url: None,
            }
        );
        assert_eq!(precision.llm_judge.provider(), JudgeProvider::OpenAI);

        let relevancy = &config.metrics[1];
        assert_eq!(relevancy.threshold, 0.8);
        assert!(relevancy.strict_mode);
        assert!(relevancy.include_reason);
        assert_eq!(relevancy.llm_judge.provider(), JudgeProvider::Anthropic);
        assert_eq!(relevancy.options().effective_threshold(), 1.0);
    }

    #[test]
    fn test_metric_needs_a_judge() {
        let err = TaskConfig::from_toml_str("[[metrics]]\nname = \"coherence\"\n").unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
        assert!(err.to_string().contains("needs an llm_judge table or a model key"));
    }

    #[test]
    fn test_flat_judge_keys_conflict_with_llm_judge() {
        for flat in ["provider = \"openai\"", "temperature = 0.7", "base_url = \"http://proxy\""] {
            let toml = format!(
                "[[metrics]]\nname = \"coherence\"\n{}\n[metrics.llm_judge]\nmodel = \"gpt-4o\"\n",
                flat
            );
            let err = TaskConfig::from_toml_str(&toml).unwrap_err();
            assert!(matches!(err, EvalError::Config(_)), "{}", flat);
            assert!(err.to_string().contains("sets both llm_judge and"), "{}", flat);
        }

        let toml = "[[metrics]]\nname = \"coherence\"\n[metrics.llm_judge]\nmodel = \"gpt-4o\"\ntemperature = 0.7\n";
        let config = TaskConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.metrics[0].llm_judge.temperature, 0.7);
    }

    #[test]
    fn test_unknown_metric_name() {
        let err = TaskConfig::from_toml_str("[[metrics]]\nname = \"bias\"\nmodel = \"gpt-4o\"\n")
            .unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            ("metrics = []\n", "at least one metric"),
            (
                "n_runs = 0\n[[metrics]]\nname = \"coherence\"\nmodel = \"gpt-4o\"\n",
                "n_runs",
            ),
            (
                "max_concurrent = 0\n[[metrics]]\nname = \"coherence\"\nmodel = \"gpt-4o\"\n",
                "max_concurrent",
            ),
            (
                "invalid_json_max_attempts = 0\n[[metrics]]\nname = \"coherence\"\nmodel = \"gpt-4o\"\n",
                "max_attempts must be a positive integer",
            ),
            (
                "[[metrics]]\nname = \"coherence\"\nmodel = \"gpt-4o\"\nthreshold = 1.5\n",
                "between 0 and 1",
            ),
        ];

        for (toml, expected) in cases {
            let err = TaskConfig::from_toml_str(toml).unwrap_err();
            assert!(matches!(err, EvalError::Configuration(_)), "{}", toml);
            assert!(err.to_string().contains(expected), "{}", err);
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TASK.as_bytes()).unwrap();

        let config = TaskConfig::from_file(file.path()).unwrap();
        assert_eq!(config.metrics.len(), 2);

        let err = TaskConfig::from_file("/nonexistent/task.toml").unwrap_err();
        assert!(matches!(err, EvalError::Io(_)));
    }

    #[test]
    fn test_instantiate_judges() {
        let openai = JudgeConfig {
            provider: None,
            model: "gpt-4o".to_string(),
            temperature: 0.0,
            base_url: None,
        };
        let judge = openai
            .instantiate_with(3, |var| (var == "OPENAI_API_KEY").then(|| "sk-test".to_string()))
            .unwrap();
        assert_eq!(judge.model_name(), "gpt-4o");
        assert_eq!(judge.capability(), JudgeCapability::SchemaCapable);

        let anthropic = JudgeConfig {
            provider: Some(JudgeProvider::Anthropic),
            model: "claude-3-5-haiku-20241022".to_string(),
            temperature: 0.0,
            base_url: Some("http://localhost:9999".to_string()),
        };
        let err = anthropic.instantiate_with(3, |_| None).err().unwrap();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));

        let judge = anthropic
            .instantiate_with(3, |_| Some("key".to_string()))
            .unwrap();
        assert_eq!(judge.capability(), JudgeCapability::TextOnly);
    }

    #[test]
    fn test_suite_instantiates_fresh_metrics_in_order() {
        let config = TaskConfig::from_toml_str(TASK).unwrap();
        let judge: Arc<dyn JudgeModel> =
            Arc::new(crate::test_support::ScriptedJudge::schema_capable("gpt-4o"));

        let suite = config
            .metrics
            .iter()
            .fold(MetricSuite::new(), |suite, metric| {
                suite.with_metric(metric.clone(), judge.clone())
            });
        let cache = Arc::new(FactClassificationCache::new());
        let metrics = suite.instantiate(&cache);

        assert_eq!(suite.len(), 2);
        let names: Vec<&str> = metrics.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["Factual Precision", "Context Relevancy"]);
        assert_eq!(metrics[0].threshold(), 0.6);
        assert_eq!(metrics[1].threshold(), 1.0);
    }
}
