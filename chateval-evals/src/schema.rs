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

//! Result shapes requested from the judge, and the scoring rules over them

use crate::judge::JudgeSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn string_array() -> Value {
    json!({"type": "array", "items": {"type": "string"}})
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

// ============================================================================
// Fact classification
// ============================================================================

/// Statements of a candidate answer and its ground truth, partitioned into
/// true positives, false positives and false negatives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedFacts {
    /// Correct and supported by the ground truth
    #[serde(rename = "TP", default)]
    pub true_positives: Vec<String>,

    /// Unsupported by or contradicting the ground truth
    #[serde(rename = "FP", default)]
    pub false_positives: Vec<String>,

    /// In the ground truth but missing from the answer
    #[serde(rename = "FN", default)]
    pub false_negatives: Vec<String>,
}

impl ClassifiedFacts {
    pub fn has_facts(&self) -> bool {
        !(self.true_positives.is_empty()
            && self.false_positives.is_empty()
            && self.false_negatives.is_empty())
    }

    /// (tp, fp, fn) counts
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.true_positives.len(),
            self.false_positives.len(),
            self.false_negatives.len(),
        )
    }

    fn json_schema() -> Value {
        object_schema(
            json!({"TP": string_array(), "FP": string_array(), "FN": string_array()}),
            &["TP", "FP", "FN"],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactClassificationResult {
    pub classified_facts: ClassifiedFacts,
}

impl JudgeSchema for FactClassificationResult {
    const NAME: &'static str = "FactClassificationResult";

    fn json_schema() -> Value {
        object_schema(
            json!({"classified_facts": ClassifiedFacts::json_schema()}),
            &["classified_facts"],
        )
    }
}

// ============================================================================
// Verdicts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    Yes,
    No,
    Idk,
}

/// Judgment over one claim, need or statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub verdict: VerdictKind,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn yes() -> Self {
        Self {
            verdict: VerdictKind::Yes,
            reason: None,
        }
    }

    pub fn idk() -> Self {
        Self {
            verdict: VerdictKind::Idk,
            reason: None,
        }
    }

    pub fn no(reason: impl Into<String>) -> Self {
        Self {
            verdict: VerdictKind::No,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerdictCollection {
    pub verdicts: Vec<Verdict>,
}

impl VerdictCollection {
    pub fn new(verdicts: Vec<Verdict>) -> Self {
        Self { verdicts }
    }

    /// Fraction of verdicts that are not "no". An empty collection scores 1.0:
    /// nothing was evaluable, so nothing failed.
    pub fn score_verdicts(&self) -> f64 {
        if self.verdicts.is_empty() {
            return 1.0;
        }

        let passing = self
            .verdicts
            .iter()
            .filter(|v| v.verdict != VerdictKind::No)
            .count();
        passing as f64 / self.verdicts.len() as f64
    }

    /// Reasons attached to "no" verdicts, skipping empty ones
    pub fn negative_reasons(&self) -> Vec<String> {
        self.verdicts
            .iter()
            .filter(|v| v.verdict == VerdictKind::No)
            .filter_map(|v| v.reason.clone())
            .filter(|r| !r.is_empty())
            .collect()
    }
}

impl JudgeSchema for VerdictCollection {
    const NAME: &'static str = "VerdictCollection";

    fn json_schema() -> Value {
        object_schema(
            json!({
                "verdicts": {
                    "type": "array",
                    "items": object_schema(
                        json!({
                            "verdict": {"type": "string", "enum": ["yes", "no", "idk"]},
                            "reason": {"type": ["string", "null"]}
                        }),
                        &["verdict", "reason"],
                    )
                }
            }),
            &["verdicts"],
        )
    }
}

// ============================================================================
// Extraction collections
// ============================================================================

macro_rules! string_collection {
    ($(#[$meta:meta])* $name:ident, $field:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub $field: Vec<String>,
        }

        impl JudgeSchema for $name {
            const NAME: &'static str = stringify!($name);

            fn json_schema() -> Value {
                object_schema(json!({ stringify!($field): string_array() }), &[stringify!($field)])
            }
        }
    };
}

string_collection!(
    /// Atomic statements extracted from a ground-truth answer
    TruthCollection,
    truths
);
string_collection!(
    /// Atomic claims extracted from a candidate answer
    ClaimCollection,
    claims
);
string_collection!(
    /// Pieces of information a question asks for
    InformationNeedsCollection,
    information_needs
);
string_collection!(
    /// Discrete statements of an answer, judged for coherence
    StatementCollection,
    statements
);

/// Facts extracted from one retrieved passage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextTruth {
    pub context: String,
    pub facts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextTruthCollection {
    pub truths: Vec<ContextTruth>,
}

impl JudgeSchema for ContextTruthCollection {
    const NAME: &'static str = "ContextTruthCollection";

    fn json_schema() -> Value {
        object_schema(
            json!({
                "truths": {
                    "type": "array",
                    "items": object_schema(
                        json!({"context": {"type": "string"}, "facts": string_array()}),
                        &["context", "facts"],
                    )
                }
            }),
            &["truths"],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReason {
    pub reason: String,
}

impl JudgeSchema for ScoreReason {
    const NAME: &'static str = "ScoreReason";

    fn json_schema() -> Value {
        object_schema(json!({"reason": {"type": "string"}}), &["reason"])
    }
}
