//! Chat-completions client for the text-generation service.

use super::prompts::SYSTEM_INSTRUCTION;
use super::{CommentaryError, TextGenerator, UnconfiguredGenerator};
use crate::config::{CommentaryConfig, API_KEY_ENV};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, config: &CommentaryConfig) -> Result<Self, CommentaryError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.resolved_model(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TextGenerator for OpenAiClient {
    fn complete_json(&self, prompt: &str, max_tokens: u32) -> Result<Value, CommentaryError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(model = %self.model, max_tokens, "text-generation request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CommentaryError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = response.json()?;
        json_content(body)
    }
}

/// The first choice's content, parsed as a JSON object.
fn json_content(body: ChatResponse) -> Result<Value, CommentaryError> {
    let content = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(CommentaryError::EmptyResponse)?;

    let value: Value = serde_json::from_str(&content)?;
    if !value.is_object() {
        return Err(CommentaryError::UnexpectedShape(
            "expected a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// The configured client when `OPENAI_API_KEY` is set, otherwise a generator
/// that fails every call with the missing-credentials code.
pub fn generator_from_env(
    config: &CommentaryConfig,
) -> Result<Box<dyn TextGenerator>, CommentaryError> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => {
            let client = OpenAiClient::new(key.trim(), config)?;
            tracing::info!(model = client.model(), "text generation configured");
            Ok(Box::new(client))
        }
        _ => {
            tracing::warn!(env = API_KEY_ENV, "no API key; commentary will be degraded");
            Ok(Box::new(UnconfiguredGenerator))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(body: Value) -> ChatResponse {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn request_asks_for_a_json_object() {
        let request = ChatRequest {
            model: "gpt-4-turbo",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.7,
            max_tokens: 500,
            response_format: ResponseFormat { kind: "json_object" },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"], json!({"type": "json_object"}));
        assert_eq!(value["max_tokens"], 500);
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn first_choice_content_is_parsed() {
        let body = response(json!({
            "choices": [{"message": {"content": "{\"response\": \"ok\"}"}}]
        }));
        assert_eq!(json_content(body).unwrap(), json!({"response": "ok"}));
    }

    #[test]
    fn missing_or_blank_content_is_empty_response() {
        for body in [
            json!({"choices": []}),
            json!({}),
            json!({"choices": [{"message": {"content": null}}]}),
            json!({"choices": [{"message": {"content": "  "}}]}),
        ] {
            let err = json_content(response(body)).unwrap_err();
            assert!(matches!(err, CommentaryError::EmptyResponse));
        }
    }

    #[test]
    fn non_json_and_non_object_content_are_rejected() {
        let body = response(json!({"choices": [{"message": {"content": "Sure! Here you go"}}]}));
        assert!(matches!(
            json_content(body).unwrap_err(),
            CommentaryError::MalformedJson(_)
        ));

        let body = response(json!({"choices": [{"message": {"content": "[1, 2]"}}]}));
        assert!(matches!(
            json_content(body).unwrap_err(),
            CommentaryError::UnexpectedShape(_)
        ));
    }
}
