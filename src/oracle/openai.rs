use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::error::{CitypulseError, Result};
use crate::oracle::{OraclePrompt, ReasoningOracle};

/// Request body for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
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

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One failed attempt, tagged with whether it is worth retrying.
struct AttemptError {
    retryable: bool,
    error: CitypulseError,
}

/// OpenAI-compatible chat completions client
///
/// Any endpoint that speaks `/chat/completions` works; the base URL is
/// configurable. Rate limits (429) and server errors (5xx) are retried with
/// exponential backoff.
pub struct OpenAiOracle {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_retries: usize,
    retry_delay: Duration,
}

impl OpenAiOracle {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| CitypulseError::Oracle(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.0,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Build from the `[oracle]` config section. Fails if the API key
    /// variable is not set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.oracle_api_key()?;
        Ok(Self::new(&config.oracle.base_url, api_key, &config.oracle.model)?
            .with_temperature(config.oracle.temperature)
            .with_max_retries(config.oracle.max_retries))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Initial backoff delay; doubled after each retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request<'a>(&'a self, prompt: &'a OraclePrompt) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &prompt.user,
        });

        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            response_format: prompt.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }

    async fn request_once(&self, prompt: &OraclePrompt) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| AttemptError {
                retryable: e.is_timeout() || e.is_connect(),
                error: CitypulseError::Oracle(format!("Network error: {}", e)),
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(AttemptError {
                retryable: is_retryable(status),
                error: CitypulseError::Oracle(format!("Oracle API error {}: {}", status, body)),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| AttemptError {
            retryable: false,
            error: CitypulseError::Oracle(format!("Failed to parse response: {}", e)),
        })?;

        extract_content(parsed).map_err(|error| AttemptError {
            retryable: false,
            error,
        })
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn extract_content(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| CitypulseError::Oracle("Empty response from oracle API".to_string()))
}

#[async_trait]
impl ReasoningOracle for OpenAiOracle {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &OraclePrompt) -> Result<String> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = self.retry_delay;

        loop {
            match self.request_once(prompt).await {
                Ok(content) => {
                    log::debug!(
                        "Oracle API call took {:?} (attempt {})",
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(content);
                }
                Err(failure) if failure.retryable && attempt < self.max_retries => {
                    log::warn!(
                        "Retry {}/{} after error: {}",
                        attempt + 1,
                        self.max_retries,
                        failure.error
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2; // Exponential backoff
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> OpenAiOracle {
        OpenAiOracle::new("https://api.example.com/v1/", "test-key", "gpt-4o-mini").unwrap()
    }

    #[test]
    fn test_oracle_new() {
        let oracle = oracle();
        assert_eq!(oracle.name(), "gpt-4o-mini");
        assert_eq!(oracle.endpoint(), "https://api.example.com/v1/chat/completions");
        assert_eq!(oracle.max_retries, 3);
    }

    #[test]
    fn test_request_body_text_mode() {
        let oracle = oracle().with_temperature(0.2);
        let prompt = OraclePrompt {
            system: None,
            user: "Summarize".to_string(),
            json_mode: false,
        };
        let body = serde_json::to_value(oracle.build_request(&prompt)).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("response_format").is_none());
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_request_body_json_mode_with_system() {
        let oracle = oracle();
        let prompt = OraclePrompt {
            system: Some("You are a traffic incident analyst.".to_string()),
            user: "Classify".to_string(),
            json_mode: true,
        };
        let body = serde_json::to_value(oracle.build_request(&prompt)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Classify");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_extract_content() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "  ok  "}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(parsed).unwrap(), "ok");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(extract_content(empty), Err(CitypulseError::Oracle(_))));

        let null: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(extract_content(null).is_err());
    }

    // Live API calls need a real key and are not exercised here.
}
