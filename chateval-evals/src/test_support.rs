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

//! Scripted judge double shared by unit tests

use crate::judge::{JudgeCapability, JudgeContent, JudgeError, JudgeModel, JudgeOutput, ResultSchema};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Replays queued responses in order and records every prompt it receives
pub(crate) struct ScriptedJudge {
    name: String,
    capability: JudgeCapability,
    responses: Mutex<VecDeque<Result<JudgeOutput, JudgeError>>>,
    prompts: Mutex<Vec<String>>,
    schemas: Mutex<Vec<Option<&'static str>>>,
}

impl ScriptedJudge {
    fn new(name: &str, capability: JudgeCapability) -> Self {
        Self {
            name: name.to_string(),
            capability,
            responses: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            schemas: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn schema_capable(name: &str) -> Self {
        Self::new(name, JudgeCapability::SchemaCapable)
    }

    pub(crate) fn text_only(name: &str) -> Self {
        Self::new(name, JudgeCapability::TextOnly)
    }

    pub(crate) fn with_structured(self, value: serde_json::Value, cost: Option<f64>) -> Self {
        self.responses.lock().push_back(Ok(JudgeOutput {
            content: JudgeContent::Structured(value),
            cost,
        }));
        self
    }

    /// Queue a typed result, as a schema-capable judge would return it
    pub(crate) fn with_value<T: Serialize>(self, value: &T, cost: Option<f64>) -> Self {
        let value = serde_json::to_value(value).expect("serializable test value");
        self.with_structured(value, cost)
    }

    pub(crate) fn with_text(self, text: &str) -> Self {
        self.responses.lock().push_back(Ok(JudgeOutput {
            content: JudgeContent::Text(text.to_string()),
            cost: None,
        }));
        self
    }

    pub(crate) fn with_error(self, error: JudgeError) -> Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub(crate) fn schemas(&self) -> Vec<Option<&'static str>> {
        self.schemas.lock().clone()
    }
}

#[async_trait]
impl JudgeModel for ScriptedJudge {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> JudgeCapability {
        self.capability
    }

    async fn generate(
        &self,
        prompt: &str,
        schema: Option<&ResultSchema>,
    ) -> Result<JudgeOutput, JudgeError> {
        self.prompts.lock().push(prompt.to_string());
        self.schemas.lock().push(schema.map(|s| s.name));
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(JudgeError::ApiError("no scripted response left".to_string())))
    }
}
