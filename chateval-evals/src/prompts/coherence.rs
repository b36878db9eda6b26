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

pub fn statements(input: &str, actual_output: &str) -> String {
    format!(
        r#"Split the ANSWER into its discrete statements, in order.

Keep each statement close to the original wording. The QUESTION is given for
context only; do not extract statements from it.

QUESTION:
{input}

ANSWER:
{actual_output}

Respond in JSON:
{{
  "statements": ["<statement>", ...]
}}"#,
        input = input,
        actual_output = actual_output
    )
}

pub fn verdicts(input: &str, statements: &[String]) -> String {
    format!(
        r#"Judge the coherence of each STATEMENT within the answer it belongs to.

A statement is coherent when it is logically consistent with the other
statements, keeps the same perspective and terminology, and follows from the
QUESTION being answered.

- "yes": coherent.
- "no": contradicts another statement, breaks the flow, or does not follow
  from the question. Give a reason.
- "idk": cannot be judged.

Return exactly one verdict per statement, in order. Only "no" verdicts need a
reason; use null otherwise.

QUESTION:
{input}

STATEMENTS:
{statements}

Respond in JSON:
{{
  "verdicts": [
    {{"verdict": "yes" | "no" | "idk", "reason": "<reason>" | null}},
    ...
  ]
}}"#,
        input = input,
        statements = json_list(statements)
    )
}

pub fn reason(score: f64, incoherences: &[String]) -> String {
    format!(
        r#"An answer was checked for coherence. Its coherence score is {score:.2}
(1.0 means fully coherent).

INCOHERENCES:
{incoherences}

Write a concise explanation of the score, referring to the incoherences if
there are any.

Respond in JSON:
{{
  "reason": "<explanation>"
}}"#,
        score = score,
        incoherences = json_list(incoherences)
    )
}
