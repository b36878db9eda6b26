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

//! Test cases and the structured retrieval contexts attached to them

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One retrieved passage, as returned by the answering system's search step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredContext {
    pub title: String,
    pub heading_hierarchy: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub html_content: String,
    pub exact_path: String,
    pub base_path: String,
}

impl StructuredContext {
    /// Plain flattening: title, heading path, description, then the body.
    pub fn to_flattened_string(&self) -> String {
        format!(
            "{}\n{}\n{}\n\n{}",
            self.title,
            self.heading_hierarchy.join(" > "),
            self.description.as_deref().unwrap_or_default(),
            self.html_content
        )
    }

    /// Labelled flattening used in judge prompts, split into a
    /// "Context:" block describing the page and a "Content:" block.
    pub fn to_flattened_context_content(&self) -> String {
        format!(
            "Context:\nPage Title: {}\nPage description: {}\nHeadings: {}\n\nContent:\n{}",
            self.title,
            self.description.as_deref().unwrap_or_default(),
            self.heading_hierarchy.join(" > "),
            self.html_content
        )
    }
}

/// Fields of a [`TestCase`] that a metric may require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestCaseParam {
    Input,
    ActualOutput,
    ExpectedOutput,
    StructuredContexts,
}

impl TestCaseParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestCaseParam::Input => "input",
            TestCaseParam::ActualOutput => "actual_output",
            TestCaseParam::ExpectedOutput => "expected_output",
            TestCaseParam::StructuredContexts => "structured_contexts",
        }
    }
}

impl fmt::Display for TestCaseParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single question/answer pair handed to a metric
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCase {
    /// Stable name used to group results across runs
    pub name: String,

    /// The user's question
    pub input: String,

    /// The answer under evaluation
    pub actual_output: Option<String>,

    /// The ground-truth answer
    pub expected_output: Option<String>,

    /// Plain-text retrieval context
    #[serde(default)]
    pub retrieval_context: Vec<String>,

    /// Structured passages, only needed by context relevancy
    #[serde(default)]
    pub structured_contexts: Option<Vec<StructuredContext>>,
}

impl TestCase {
    pub fn new(input: impl Into<String>, actual_output: impl Into<String>) -> Self {
        Self {
            name: Uuid::new_v4().to_string(),
            input: input.into(),
            actual_output: Some(actual_output.into()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_expected_output(mut self, expected_output: impl Into<String>) -> Self {
        self.expected_output = Some(expected_output.into());
        self
    }

    pub fn with_structured_contexts(mut self, contexts: Vec<StructuredContext>) -> Self {
        self.retrieval_context = contexts
            .iter()
            .map(StructuredContext::to_flattened_string)
            .collect();
        self.structured_contexts = Some(contexts);
        self
    }

    /// Whether `param` is present on this test case
    pub fn has(&self, param: TestCaseParam) -> bool {
        match param {
            TestCaseParam::Input => true,
            TestCaseParam::ActualOutput => self.actual_output.is_some(),
            TestCaseParam::ExpectedOutput => self.expected_output.is_some(),
            TestCaseParam::StructuredContexts => self.structured_contexts.is_some(),
        }
    }

    /// Required params that are absent, in the order given
    pub fn missing(&self, required: &[TestCaseParam]) -> Vec<TestCaseParam> {
        required.iter().copied().filter(|p| !self.has(*p)).collect()
    }
}

/// A labelled input row: a question, the answer the system gave, the
/// passages it retrieved, and optionally an ideal answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationTestCase {
    pub question: String,
    #[serde(default)]
    pub ideal_answer: Option<String>,
    pub llm_answer: String,
    pub structured_contexts: Vec<StructuredContext>,
}

impl EvaluationTestCase {
    pub fn to_test_case(&self) -> TestCase {
        let mut case = TestCase::new(self.question.clone(), self.llm_answer.clone())
            .with_structured_contexts(self.structured_contexts.clone());
        case.expected_output = self.ideal_answer.clone();
        case
    }
}
