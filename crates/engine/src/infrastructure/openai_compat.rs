//! Generation backend client (OpenAI-compatible API).
//!
//! Works against any backend exposing `/v1/chat/completions`, which covers
//! Ollama and most hosted gateways. Model selection and the base URL are
//! configuration; the engine never chooses models itself.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::infrastructure::ports::{
    GeneratedText, GenerationError, GenerationPort, GenerationRequest,
};
use crate::infrastructure::settings::{DEFAULT_BACKEND_BASE_URL, DEFAULT_BACKEND_MODEL};

/// Client for an OpenAI-compatible chat completion API
#[derive(Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create client from environment variables.
    ///
    /// Uses `TALEWEAVER_BACKEND_URL` and `TALEWEAVER_BACKEND_MODEL`,
    /// falling back to defaults if not set.
    pub fn from_env() -> Self {
        let base_url = std::env::var("TALEWEAVER_BACKEND_URL")
            .unwrap_or_else(|_| DEFAULT_BACKEND_BASE_URL.to_string());
        let model = std::env::var("TALEWEAVER_BACKEND_MODEL")
            .unwrap_or_else(|_| DEFAULT_BACKEND_MODEL.to_string());
        Self::new(&base_url, &model)
    }
}

impl Default for OpenAiCompatClient {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_BASE_URL, DEFAULT_BACKEND_MODEL)
    }
}

#[async_trait]
impl GenerationPort for OpenAiCompatClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedText, GenerationError> {
        // The schema hint becomes a system-level format instruction; the
        // parser still treats whatever comes back as untrusted.
        let format_hint = format!(
            "Respond with a single JSON object containing the fields: {}.",
            request.schema_hint.field_names().join(", ")
        );

        let api_request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ApiMessage {
                    role: "system".to_string(),
                    content: Some(format_hint),
                },
                ApiMessage {
                    role: "user".to_string(),
                    content: Some(request.prompt.clone()),
                },
            ],
            temperature: None,
            max_tokens: None,
        };

        let timeout = request.timeout;
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(timeout)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(timeout)
                } else {
                    GenerationError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;
            return Err(GenerationError::RequestFailed(error_text));
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        convert_response(api_response)
    }
}

fn convert_response(response: ChatCompletionResponse) -> Result<GeneratedText, GenerationError> {
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        GenerationError::InvalidResponse("No choices in backend response".to_string())
    })?;

    let truncated = choice.finish_reason.as_deref() == Some("length");

    Ok(GeneratedText {
        content: choice.message.content.unwrap_or_default(),
        truncated,
    })
}

// =============================================================================
// OpenAI API types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_marks_length_stops_as_truncated() {
        let response = ChatCompletionResponse {
            choices: vec![ApiChoice {
                message: ApiMessage {
                    role: "assistant".into(),
                    content: Some("{\"narrative\": \"cut of".into()),
                },
                finish_reason: Some("length".into()),
            }],
        };

        let text = convert_response(response).expect("has a choice");
        assert!(text.truncated);
        assert!(text.content.starts_with("{\"narrative\""));
    }

    #[test]
    fn convert_rejects_empty_choice_list() {
        let response = ChatCompletionResponse { choices: vec![] };
        assert!(matches!(
            convert_response(response),
            Err(GenerationError::InvalidResponse(_))
        ));
    }
}
