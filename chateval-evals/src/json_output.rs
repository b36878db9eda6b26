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

//! Recovering JSON objects from free-form judge output

use crate::judge::JudgeError;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

pub const INVALID_JSON_MESSAGE: &str =
    "Evaluation LLM outputted an invalid JSON. Please use a better evaluation model.";

fn trailing_comma() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([\]}])").expect("static regex"))
}

/// Strip a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```") {
        let after_start = &trimmed[start + 3..];
        let json_start = if after_start.starts_with("json") {
            after_start.find('\n').map(|i| i + 1).unwrap_or(after_start.len())
        } else if after_start.starts_with('\n') {
            1
        } else {
            0
        };
        let content = &after_start[json_start..];
        if let Some(end) = content.find("```") {
            return content[..end].trim();
        }
    }

    trimmed
}

/// Extract and parse the outermost JSON object in `response`.
///
/// Takes the span from the first `{` to the last `}`, closing the object if
/// the final brace is missing, and drops trailing commas before `]` / `}`.
pub fn trim_and_load_json(response: &str) -> Result<Value, JudgeError> {
    let text = strip_code_fence(response);

    let start = text
        .find('{')
        .ok_or_else(|| JudgeError::InvalidJson(INVALID_JSON_MESSAGE.to_string()))?;

    let candidate = match text.rfind('}') {
        Some(end) if end > start => text[start..=end].to_string(),
        Some(_) => return Err(JudgeError::InvalidJson(INVALID_JSON_MESSAGE.to_string())),
        None => format!("{}}}", &text[start..]),
    };

    let cleaned = trailing_comma().replace_all(&candidate, "$1");

    serde_json::from_str(&cleaned).map_err(|e| {
        tracing::debug!("Judge output is not valid JSON ({}): {}", e, response);
        JudgeError::InvalidJson(INVALID_JSON_MESSAGE.to_string())
    })
}
