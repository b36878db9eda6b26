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

//! Fact classification prompt shared by the precision/recall and
//! correctness/completeness metrics

pub fn classify_facts(answer: &str, ground_truth: &str) -> String {
    format!(
        r#"You are comparing an ANSWER to a GROUND TRUTH answer for the same question.

Break both texts into short, self-contained factual statements. Then classify
every statement into exactly one of:

- "TP" (true positive): a statement in the ANSWER that is supported by the GROUND TRUTH.
- "FP" (false positive): a statement in the ANSWER that is not supported by, or contradicts, the GROUND TRUTH.
- "FN" (false negative): a statement in the GROUND TRUTH that is missing from the ANSWER.

A statement must appear in only one list. Ignore greetings, hedging and
formatting. Do not invent statements that appear in neither text.

ANSWER:
{answer}

GROUND TRUTH:
{ground_truth}

Respond in JSON:
{{
  "classified_facts": {{
    "TP": ["<statement>", ...],
    "FP": ["<statement>", ...],
    "FN": ["<statement>", ...]
  }}
}}"#,
        answer = answer,
        ground_truth = ground_truth
    )
}
