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

//! Judge model abstraction for LLM-judged metrics
//!
//! A judge comes in one of two capabilities, fixed when it is constructed:
//!
//! - [`JudgeCapability::SchemaCapable`]: accepts a result schema and returns
//!   output already shaped by it, together with the cost of the call.
//! - [`JudgeCapability::TextOnly`]: returns raw text; the caller extracts the
//!   JSON object and builds the result from it. Cost is not tracked.
//!
//! [`generate_structured`] hides the difference from metrics.

use crate::json_output::trim_and_load_json;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are an expert evaluator. Respond only with valid JSON.";

/// How a judge deals with requested result schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeCapability {
    SchemaCapable,
    TextOnly,
}

/// A named JSON schema describing the expected judge result
#[derive(Debug, Clone)]
pub struct ResultSchema {
    pub name: &'static str,
    pub schema: Value,
}

/// Raw output of one judge call
#[derive(Debug, Clone)]
pub enum JudgeContent {
    Structured(Value),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct JudgeOutput {
    pub content: JudgeContent,
    /// Cost in USD, when the judge can compute it
    pub cost: Option<f64>,
}

/// Trait for judge models used by metrics
#[async_trait]
pub trait JudgeModel: Send + Sync {
    /// Model identifier, used as part of the fact classification cache key
    fn model_name(&self) -> &str;

    fn capability(&self) -> JudgeCapability;

    /// Send a prompt, optionally asking for output shaped by `schema`.
    ///
    /// Returns [`JudgeError::InvalidJson`] when the judge itself could not
    /// turn its output into JSON for a requested schema.
    async fn generate(
        &self,
        prompt: &str,
        schema: Option<&ResultSchema>,
    ) -> Result<JudgeOutput, JudgeError>;
}

/// Result types a judge can be asked to produce
pub trait JudgeSchema: DeserializeOwned + Send {
    const NAME: &'static str;

    fn json_schema() -> Value;

    fn result_schema() -> ResultSchema {
        ResultSchema {
            name: Self::NAME,
            schema: Self::json_schema(),
        }
    }
}

/// A typed judge result with the cost of producing it
#[derive(Debug, Clone)]
pub struct Judged<T> {
    pub value: T,
    /// Always `None` for text-only judges
    pub cost: Option<f64>,
}

/// Ask `judge` for a `T`, using the schema path or the text path depending
/// on the judge's capability.
///
/// Failures to build `T` from a text-only judge's output are reported as
/// [`JudgeError::Parse`].
pub async fn generate_structured<T: JudgeSchema>(
    judge: &dyn JudgeModel,
    prompt: &str,
) -> Result<Judged<T>, JudgeError> {
    match judge.capability() {
        JudgeCapability::SchemaCapable => {
            let schema = T::result_schema();
            let output = judge.generate(prompt, Some(&schema)).await?;
            let value = match output.content {
                JudgeContent::Structured(value) => value,
                JudgeContent::Text(text) => trim_and_load_json(&text)?,
            };
            let value = serde_json::from_value(value).map_err(|e| JudgeError::SchemaMismatch {
                schema: T::NAME,
                message: e.to_string(),
            })?;
            Ok(Judged {
                value,
                cost: output.cost,
            })
        }
        JudgeCapability::TextOnly => {
            let output = judge.generate(prompt, None).await?;
            let text = match output.content {
                JudgeContent::Text(text) => text,
                JudgeContent::Structured(value) => value.to_string(),
            };
            let data = trim_and_load_json(&text).map_err(|e| JudgeError::Parse(e.to_string()))?;
            let value = serde_json::from_value(data)
                .map_err(|e| JudgeError::Parse(format!("{} fields: {}", T::NAME, e)))?;
            Ok(Judged { value, cost: None })
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Calculate cost based on per-token pricing
    pub fn calculate_cost(&self, cost_per_input: f64, cost_per_output: f64) -> f64 {
        (self.prompt_tokens as f64 * cost_per_input)
            + (self.completion_tokens as f64 * cost_per_output)
    }
}

/// Errors from judge models
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The judge could not produce valid JSON for a requested schema.
    /// Transient: the same prompt may succeed when retried.
    #[error("{0}")]
    InvalidJson(String),

    /// Text-only output could not be turned into the requested result
    #[error("Failed to parse judge output: {0}")]
    Parse(String),

    #[error("Judge output does not match {schema}: {message}")]
    SchemaMismatch {
        schema: &'static str,
        message: String,
    },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JudgeError {
    pub fn is_invalid_json(&self) -> bool {
        matches!(self, JudgeError::InvalidJson(_))
    }
}

/// OpenAI-compatible chat completions judge. Schema-capable.
pub struct OpenAIJudge {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f64,
    client: reqwest::Client,
}

impl OpenAIJudge {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cost per token (input, output). `None` for models without a price,
    /// dated snapshots are priced as their base model.
    pub fn cost_per_token(&self) -> Option<(f64, f64)> {
        let model = self.model.as_str();
        if model.starts_with("gpt-4o-mini") {
            Some((0.00000015, 0.0000006)) // $0.15/$0.60 per 1M
        } else if model.starts_with("gpt-4o") {
            Some((0.0000025, 0.000010)) // $2.50/$10 per 1M
        } else if model.starts_with("gpt-4-turbo") {
            Some((0.000010, 0.000030)) // $10/$30 per 1M
        } else {
            debug!(model, "No pricing for judge model; cost not tracked");
            None
        }
    }
}

#[async_trait]
impl JudgeModel for OpenAIJudge {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn capability(&self) -> JudgeCapability {
        JudgeCapability::SchemaCapable
    }

    async fn generate(
        &self,
        prompt: &str,
        schema: Option<&ResultSchema>,
    ) -> Result<JudgeOutput, JudgeError> {
        let mut request = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": SYSTEM_PROMPT
                },
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": self.temperature
        });

        if let Some(schema) = schema {
            request["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": true
                }
            });
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(JudgeError::RateLimitExceeded);
            }
            return Err(JudgeError::ApiError(error_text));
        }

        let response_data: Value = response.json().await?;

        let content = response_data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(JudgeError::InvalidResponse("Missing content".to_string()))?
            .to_string();

        let usage_data = &response_data["usage"];
        let usage = TokenUsage {
            prompt_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: usage_data["total_tokens"].as_u64().unwrap_or(0) as u32,
        };
        let cost = self
            .cost_per_token()
            .map(|(input_cost, output_cost)| usage.calculate_cost(input_cost, output_cost));

        let content = match schema {
            Some(_) => JudgeContent::Structured(trim_and_load_json(&content)?),
            None => JudgeContent::Text(content),
        };

        Ok(JudgeOutput {
            content,
            cost,
        })
    }
}

/// Anthropic messages judge. Text-only: schemas are never sent, the caller
/// parses the returned text.
pub struct AnthropicJudge {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f64,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicJudge {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.anthropic.com/v1".to_string(),
            temperature: 0.0,
            max_tokens: 6000,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Pick the first content block carrying text. Reasoning models put a
    /// thinking block first, which has no `text` field.
    fn first_text_block(response_data: &Value) -> Option<&str> {
        response_data["content"]
            .as_array()?
            .iter()
            .find_map(|block| block.get("text").and_then(Value::as_str))
    }
}

#[async_trait]
impl JudgeModel for AnthropicJudge {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn capability(&self) -> JudgeCapability {
        JudgeCapability::TextOnly
    }

    async fn generate(
        &self,
        prompt: &str,
        _schema: Option<&ResultSchema>,
    ) -> Result<JudgeOutput, JudgeError> {
        let request = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "system": SYSTEM_PROMPT,
            "temperature": self.temperature
        });

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(JudgeError::RateLimitExceeded);
            }
            return Err(JudgeError::ApiError(error_text));
        }

        let response_data: Value = response.json().await?;

        let text = Self::first_text_block(&response_data)
            .ok_or(JudgeError::InvalidResponse("No text content block".to_string()))?
            .to_string();

        Ok(JudgeOutput {
            content: JudgeContent::Text(text),
            cost: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ClaimCollection, ScoreReason};
    use crate::test_support::ScriptedJudge;
    use mockito::Matcher;

    fn openai_body(content: &str) -> String {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150}
        })
        .to_string()
    }

    #[test]
    fn test_token_usage_cost() {
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
        };

        // GPT-4o-mini pricing: $0.15/$0.60 per 1M
        let cost = usage.calculate_cost(0.00000015, 0.0000006);

        // 100 * 0.00000015 + 50 * 0.0000006 = 0.000015 + 0.00003 = 0.000045
        assert!((cost - 0.000045).abs() < 0.0000001);
    }

    #[tokio::test]
    async fn test_openai_judge_structured_output_and_cost() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "response_format": {"type": "json_schema", "json_schema": {"name": "ScoreReason"}}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(openai_body("{\"reason\": \"Consistent with the ground truth.\"}"))
            .create_async()
            .await;

        let judge = OpenAIJudge::new("test".to_string(), "gpt-4o-mini".to_string())
            .with_base_url(server.url());

        let judged = generate_structured::<ScoreReason>(&judge, "explain").await.unwrap();

        mock.assert_async().await;
        assert_eq!(judged.value.reason, "Consistent with the ground truth.");
        assert!((judged.cost.unwrap() - 0.000045).abs() < 1e-12);
    }

    #[test]
    fn test_pricing_by_model_family() {
        let judge = |model: &str| OpenAIJudge::new("test".to_string(), model.to_string());

        assert_eq!(judge("gpt-4o-mini").cost_per_token(), Some((0.00000015, 0.0000006)));
        assert_eq!(
            judge("gpt-4o-2024-08-06").cost_per_token(),
            Some((0.0000025, 0.000010))
        );
        assert_eq!(judge("o3-pro").cost_per_token(), None);
    }

    #[tokio::test]
    async fn test_unpriced_model_reports_no_cost() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(openai_body("{\"reason\": \"Fine.\"}"))
            .create_async()
            .await;

        let judge = OpenAIJudge::new("test".to_string(), "o3-pro".to_string())
            .with_base_url(server.url());

        let judged = generate_structured::<ScoreReason>(&judge, "explain").await.unwrap();
        assert_eq!(judged.value.reason, "Fine.");
        assert!(judged.cost.is_none());
    }

    #[tokio::test]
    async fn test_openai_judge_invalid_json_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(openai_body("I would rather not."))
            .create_async()
            .await;

        let judge = OpenAIJudge::new("test".to_string(), "gpt-4o".to_string())
            .with_base_url(server.url());

        let err = judge
            .generate("prompt", Some(&ScoreReason::result_schema()))
            .await
            .unwrap_err();
        assert!(err.is_invalid_json());
    }

    #[tokio::test]
    async fn test_openai_judge_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let judge = OpenAIJudge::new("test".to_string(), "gpt-4o".to_string())
            .with_base_url(server.url());

        let err = judge.generate("prompt", None).await.unwrap_err();
        assert!(matches!(err, JudgeError::RateLimitExceeded));
        assert!(!err.is_invalid_json());
    }

    #[tokio::test]
    async fn test_anthropic_judge_skips_reasoning_blocks() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "content": [
                        {"type": "thinking", "thinking": "Let me list the claims."},
                        {"type": "text", "text": "```json\n{\"claims\": [\"Dogs bark.\"]}\n```"}
                    ],
                    "usage": {"input_tokens": 10, "output_tokens": 5}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let judge = AnthropicJudge::new("test".to_string(), "claude-3-5-haiku-20241022".to_string())
            .with_base_url(server.url());
        assert_eq!(judge.capability(), JudgeCapability::TextOnly);

        let judged = generate_structured::<ClaimCollection>(&judge, "extract").await.unwrap();
        assert_eq!(judged.value.claims, vec!["Dogs bark.".to_string()]);
        assert!(judged.cost.is_none());
    }

    #[tokio::test]
    async fn test_anthropic_judge_without_text_block() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content": [{"type": "thinking", "thinking": "hmm"}]}"#)
            .create_async()
            .await;

        let judge = AnthropicJudge::new("test".to_string(), "claude".to_string())
            .with_base_url(server.url());

        let err = judge.generate("prompt", None).await.unwrap_err();
        assert!(matches!(err, JudgeError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_text_only_parse_failure_is_parse_error() {
        let judge = ScriptedJudge::text_only("text-model").with_text("no json here");

        let err = generate_structured::<ClaimCollection>(&judge, "extract")
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::Parse(_)));
        assert!(!err.is_invalid_json());
    }

    #[tokio::test]
    async fn test_text_only_wrong_fields_is_parse_error() {
        let judge = ScriptedJudge::text_only("text-model").with_text(r#"{"statements": []}"#);

        let err = generate_structured::<ClaimCollection>(&judge, "extract")
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::Parse(_)));
    }

    #[tokio::test]
    async fn test_schema_capable_mismatch() {
        let judge = ScriptedJudge::schema_capable("native")
            .with_structured(serde_json::json!({"reason": 3}), Some(0.1));

        let err = generate_structured::<ScoreReason>(&judge, "explain")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JudgeError::SchemaMismatch {
                schema: "ScoreReason",
                ..
            }
        ));
    }
}
