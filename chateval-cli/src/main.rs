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

use anyhow::{Context, Result};
use chateval_core::{EvaluationResult, EvaluationTestCase, TestCase};
use chateval_evals::{
    log_metric_errors, summarize, EvaluationRunner, RunnerConfig, TaskConfig,
};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Score chat answers with LLM-judged metrics
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the task configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// JSONL file of evaluation cases
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write one JSON result per line (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of runs (overrides config file)
    #[arg(long)]
    n_runs: Option<usize>,

    /// Abort on the first failing measurement instead of recording it
    #[arg(long)]
    fail_fast: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chateval=info,chateval_evals=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let mut config = TaskConfig::from_file(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(n_runs) = args.n_runs {
        config.n_runs = n_runs;
    }
    if args.fail_fast {
        config.ignore_errors = false;
    }
    config.validate()?;

    let cases = read_cases(&args.input)?;
    info!("Loaded {} evaluation cases", cases.len());

    let suite = config.metric_suite().context("failed to set up judge models")?;
    let runner = EvaluationRunner::new(RunnerConfig::from(&config));
    let results = runner.run(&cases, &suite).await?;

    log_metric_errors(&results);
    for summary in summarize(&results) {
        match summary.mean {
            Some(mean) => info!(
                "{}: mean {:.3} over {} scores ({} excluded)",
                summary.metric, mean, summary.scored, summary.excluded
            ),
            None => info!("{}: no scores ({} excluded)", summary.metric, summary.excluded),
        }
    }

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_results(BufWriter::new(file), &results)?;
            info!("Wrote {} results to {}", results.len(), path.display());
        }
        None => write_results(io::stdout().lock(), &results)?,
    }

    Ok(())
}

/// Read JSONL evaluation cases, skipping blank lines
fn read_cases(path: &Path) -> Result<Vec<TestCase>> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut cases = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }

        let case: EvaluationTestCase = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid evaluation case", path.display(), index + 1))?;
        cases.push(case.to_test_case());
    }

    Ok(cases)
}

fn write_results<W: Write>(mut writer: W, results: &[EvaluationResult]) -> Result<()> {
    for result in results {
        serde_json::to_writer(&mut writer, result)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chateval_core::MetricOutput;

    #[test]
    fn test_read_cases() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"question": "How do I renew?", "ideal_answer": "Online.", "llm_answer": "Online.", "structured_contexts": []}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"question": "Can I claim?", "llm_answer": "Yes.", "structured_contexts": []}}"#
        )
        .unwrap();

        let cases = read_cases(file.path()).unwrap();

        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].expected_output.as_deref(), Some("Online."));
        assert_eq!(cases[1].expected_output, None);
        assert_eq!(cases[1].structured_contexts, Some(vec![]));
    }

    #[test]
    fn test_read_cases_reports_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"question": "q"}}"#).unwrap();

        let err = read_cases(file.path()).unwrap_err();
        assert!(err.to_string().ends_with(":1: invalid evaluation case"));
    }

    #[test]
    fn test_write_results_as_jsonl() {
        let result = EvaluationResult {
            name: "case-1".to_string(),
            input: "q".to_string(),
            actual_output: "a".to_string(),
            expected_output: None,
            retrieval_context: vec![],
            run_metric_outputs: vec![MetricOutput {
                run: 0,
                metric: "Coherence".to_string(),
                score: Some(1.0),
                cost: None,
                reason: None,
                success: Some(true),
                error: None,
            }],
        };

        let mut buffer = Vec::new();
        write_results(&mut buffer, &[result.clone(), result]).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["run_metric_outputs"][0]["metric"], "Coherence");
        assert!(parsed.get("expected_output").is_none());
    }
}
