//! OpenAI-compatible `/chat/completions` implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::internal::ai::{
    client::Provider,
    completion::{CompletionError, CompletionModel, CompletionRequest, CompletionResponse, Message},
    providers::openai::client::Client,
};

/// Chat completion backend talking to an OpenAI-compatible endpoint.
///
/// The model id comes from each request, so one instance serves every session.
#[derive(Clone, Debug)]
pub struct ChatCompletions {
    client: Client,
}

impl ChatCompletions {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.client.base_url)
    }
}

// ================================================================
// OpenAI API Types
// ================================================================

/// OpenAI chat completion request.
#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI choice.
#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

/// OpenAI chat completion response.
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

/// OpenAI API error wrapper.
#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

fn parse_response(response: OpenAIResponse) -> Result<CompletionResponse, CompletionError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::ResponseError("No choices in response".to_string()))?;
    let content = choice
        .message
        .content
        .ok_or_else(|| CompletionError::ResponseError("Choice has no content".to_string()))?;
    Ok(CompletionResponse {
        content,
        model: response.model,
    })
}

#[async_trait]
impl CompletionModel for ChatCompletions {
    async fn completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let body = OpenAIRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        let req_builder = self.client.http_client.post(self.endpoint()).json(&body);
        let req_builder = self.client.provider.on_request(req_builder);

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending completion request"
        );
        let response = req_builder.send().await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            if let Ok(error_response) = serde_json::from_str::<OpenAIErrorResponse>(&response_text)
            {
                return Err(CompletionError::ProviderError(error_response.error.message));
            }
            return Err(CompletionError::ProviderError(format!(
                "{status}: {response_text}"
            )));
        }

        let openai_response: OpenAIResponse = serde_json::from_str(&response_text)?;
        parse_response(openai_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_request_serialization() {
        let messages = vec![
            Message::system("You are a helpful assistant."),
            Message::user("Hello!"),
        ];
        let request = OpenAIRequest {
            model: "meta-llama/Meta-Llama-3-8B-Instruct",
            messages: &messages,
            temperature: Some(0.7),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "meta-llama/Meta-Llama-3-8B-Instruct");
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hello!");
    }

    #[test]
    fn test_temperature_omitted_when_unset() {
        let messages = vec![Message::user("hi")];
        let request = OpenAIRequest {
            model: "m",
            messages: &messages,
            temperature: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_openai_response_deserialization() {
        let json = r#"
        {
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1677652288,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello there!"
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 9,
                "completion_tokens": 12,
                "total_tokens": 21
            }
        }
        "#;

        let response: OpenAIResponse = serde_json::from_str(json).unwrap();
        let parsed = parse_response(response).unwrap();
        assert_eq!(parsed.content, "Hello there!");
        assert_eq!(parsed.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_empty_choices_is_response_error() {
        let response: OpenAIResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let err = parse_response(response).unwrap_err();
        assert!(matches!(err, CompletionError::ResponseError(_)));
    }

    #[test]
    fn test_endpoint() {
        let client = Client::with_base_url("https://api.deepinfra.com/v1/openai/", "k".into());
        let model = ChatCompletions::new(client);
        assert_eq!(
            model.endpoint(),
            "https://api.deepinfra.com/v1/openai/chat/completions"
        );
    }
}
