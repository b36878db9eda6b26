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
use crate::schema::ContextTruth;

pub fn truths(retrieval_context: &[String]) -> String {
    format!(
        r#"Below are passages retrieved to answer a user's question. For each passage,
extract the factual statements it contains.

Use the passage's page title as "context". Each fact must be atomic and
self-contained. Skip navigation text and boilerplate.

PASSAGES:
{retrieval_context}

Respond in JSON:
{{
  "truths": [
    {{"context": "<page title>", "facts": ["<fact>", ...]}},
    ...
  ]
}}"#,
        retrieval_context = retrieval_context.join("\n\n---\n\n")
    )
}

pub fn information_needs(input: &str) -> String {
    format!(
        r#"List the distinct pieces of information a complete answer to the QUESTION
must provide.

Each information need must be atomic and phrased as a statement of what must
be known. Do not answer the question.

QUESTION:
{input}

Respond in JSON:
{{
  "information_needs": ["<information need>", ...]
}}"#,
        input = input
    )
}

pub fn verdicts(information_needs: &[String], extracted_truths: &[ContextTruth]) -> String {
    format!(
        r#"For each INFORMATION NEED, decide whether the EXTRACTED TRUTHS satisfy it.

- "yes": at least one extracted fact provides the needed information.
- "idk": the facts are related but only partially address the need.
- "no": nothing in the facts addresses the need. Give a reason describing
  what is missing.

Return exactly one verdict per information need, in order. Only "no"
verdicts need a reason; use null otherwise.

INFORMATION NEEDS:
{information_needs}

EXTRACTED TRUTHS:
{extracted_truths}

Respond in JSON:
{{
  "verdicts": [
    {{"verdict": "yes" | "no" | "idk", "reason": "<reason>" | null}},
    ...
  ]
}}"#,
        information_needs = json_list(information_needs),
        extracted_truths = json_list(extracted_truths)
    )
}

pub fn reason(unmet_needs: &[String], input: &str, score: f64) -> String {
    format!(
        r#"Retrieved context was checked against the information a question needs.
The context relevancy score is {score:.2} (1.0 means every need is covered).

QUESTION:
{input}

UNMET NEEDS:
{unmet_needs}

Write a concise explanation of the score, naming the unmet needs if there are
any.

Respond in JSON:
{{
  "reason": "<explanation>"
}}"#,
        score = score,
        input = input,
        unmet_needs = json_list(unmet_needs)
    )
}
