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

use super::json_list;

pub fn generate_truths(text: &str) -> String {
    format!(
        r#"Extract the factual statements made in the TEXT below.

Each statement must be atomic, self-contained and understandable without the
rest of the text. Keep names, dates and numbers exactly as written.

TEXT:
{text}

Respond in JSON:
{{
  "truths": ["<statement>", ...]
}}"#,
        text = text
    )
}

pub fn generate_claims(text: &str) -> String {
    format!(
        r#"Extract the factual claims made in the TEXT below.

Each claim must be atomic, self-contained and understandable without the rest
of the text. Only include claims the text actually makes; do not add
background knowledge.

TEXT:
{text}

Respond in JSON:
{{
  "claims": ["<claim>", ...]
}}"#,
        text = text
    )
}

pub fn generate_verdicts(claims: &[String], ground_truth: &[String]) -> String {
    format!(
        r#"For each CLAIM, decide whether it contradicts the GROUND TRUTH statements.

- "no": the claim directly contradicts one or more ground truth statements.
  Give a reason naming the conflicting statement.
- "yes": the claim is consistent with the ground truth.
- "idk": the ground truth says nothing about the claim.

Return exactly one verdict per claim, in the same order as the claims. Only
"no" verdicts need a reason; use null otherwise.

GROUND TRUTH:
{ground_truth}

CLAIMS:
{claims}

Respond in JSON:
{{
  "verdicts": [
    {{"verdict": "yes" | "no" | "idk", "reason": "<reason>" | null}},
    ...
  ]
}}"#,
        ground_truth = json_list(ground_truth),
        claims = json_list(claims)
    )
}

pub fn generate_reason(score: f64, contradictions: &[String]) -> String {
    format!(
        r#"An answer was checked for factual contradictions against a ground truth.
Its absence-of-contradictions score is {score:.2} (1.0 means no contradictions).

CONTRADICTIONS FOUND:
{contradictions}

Write a concise explanation of the score, referring to the contradictions if
there are any. Do not mention the score scale.

Respond in JSON:
{{
  "reason": "<explanation>"
}}"#,
        score = score,
        contradictions = json_list(contradictions)
    )
}
