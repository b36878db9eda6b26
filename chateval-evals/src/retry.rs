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

//! Retry wrapper for judges that occasionally emit malformed JSON

use crate::judge::{JudgeCapability, JudgeError, JudgeModel, JudgeOutput, ResultSchema};
use crate::EvalError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Wraps a judge and retries calls that fail with [`JudgeError::InvalidJson`].
///
/// Other errors pass through on the first failure. Retries are immediate.
/// Model name and capability are those of the wrapped judge.
pub struct InvalidJsonRetry {
    inner: Arc<dyn JudgeModel>,
    max_attempts: u32,
}

impl InvalidJsonRetry {
    pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

    /// `max_attempts` counts the first call; it must be positive.
    pub fn new(inner: Arc<dyn JudgeModel>, max_attempts: i32) -> Result<Self, EvalError> {
        if max_attempts <= 0 {
            return Err(EvalError::Configuration(
                "max_attempts must be a positive integer to enable invalid JSON retries"
                    .to_string(),
            ));
        }

        Ok(Self {
            inner,
            max_attempts: max_attempts as u32,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

fn attempts_remaining_detail(remaining: u32) -> String {
    if remaining > 1 {
        format!("{} attempts left", remaining)
    } else {
        "last attempt remaining".to_string()
    }
}

#[async_trait]
impl JudgeModel for InvalidJsonRetry {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn capability(&self) -> JudgeCapability {
        self.inner.capability()
    }

    async fn generate(
        &self,
        prompt: &str,
        schema: Option<&ResultSchema>,
    ) -> Result<JudgeOutput, JudgeError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.generate(prompt, schema).await {
                Err(e) if e.is_invalid_json() && attempt < self.max_attempts => {
                    warn!(
                        model = self.inner.model_name(),
                        "LLM judge emitted invalid JSON; retrying ({})",
                        attempts_remaining_detail(self.max_attempts - attempt)
                    );
                }
                result => return result,
            }
        }
    }
}
