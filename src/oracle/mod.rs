//! Reasoning oracle: the only component that leaves the process.
//!
//! [`ReasoningOracle`] is the raw text-in/text-out provider. [`OracleAdapter`]
//! wraps one with the call contract the pipeline relies on: per-call timeout,
//! cancellation, and schema validation with a single corrective retry.

pub mod cancel;
pub mod openai;
pub mod schema;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use openai::OpenAiOracle;
pub use schema::{FieldKind, FieldSpec, ResponseSchema};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CitypulseError, Result};

/// Rendered prompt handed to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OraclePrompt {
    pub system: Option<String>,
    pub user: String,
    /// Ask the provider for a bare JSON object.
    pub json_mode: bool,
}

#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &OraclePrompt) -> Result<String>;
}

/// A structured request: an instruction, the facts it refers to, and
/// optionally the shape the answer must take.
#[derive(Debug, Clone, Default)]
pub struct OracleRequest {
    pub prompt: String,
    pub context: Map<String, Value>,
    pub response_schema: Option<ResponseSchema>,
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    fn render(&self) -> String {
        let mut out = self.prompt.trim().to_string();
        if !self.context.is_empty() {
            let context = serde_json::to_string_pretty(&self.context)
                .unwrap_or_else(|_| "{}".to_string());
            out.push_str("\n\nContext:\n");
            out.push_str(&context);
        }
        if let Some(schema) = &self.response_schema {
            out.push_str("\n\n");
            out.push_str(&schema.instructions());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OracleResponse {
    Text(String),
    Fields(Map<String, Value>),
}

impl OracleResponse {
    pub fn into_text(self) -> Result<String> {
        match self {
            OracleResponse::Text(text) => Ok(text),
            OracleResponse::Fields(_) => Err(CitypulseError::SchemaViolation(
                "expected free text, got structured fields".to_string(),
            )),
        }
    }

    pub fn into_fields(self) -> Result<Map<String, Value>> {
        match self {
            OracleResponse::Fields(fields) => Ok(fields),
            OracleResponse::Text(_) => Err(CitypulseError::SchemaViolation(
                "expected structured fields, got free text".to_string(),
            )),
        }
    }
}

/// Call contract around a [`ReasoningOracle`].
#[derive(Clone)]
pub struct OracleAdapter {
    oracle: Arc<dyn ReasoningOracle>,
    timeout: Duration,
    system_instruction: Option<String>,
}

impl OracleAdapter {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, timeout: Duration) -> Self {
        Self {
            oracle,
            timeout,
            system_instruction: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    pub async fn infer(&self, request: &OracleRequest) -> Result<OracleResponse> {
        self.infer_with_cancel(request, &CancelToken::never()).await
    }

    /// Run one request. With a schema, output that fails validation gets one
    /// corrective follow-up; a second failure surfaces as `SchemaViolation`.
    pub async fn infer_with_cancel(
        &self,
        request: &OracleRequest,
        cancel: &CancelToken,
    ) -> Result<OracleResponse> {
        let prompt = OraclePrompt {
            system: self.system_instruction.clone(),
            user: request.render(),
            json_mode: request.response_schema.is_some(),
        };
        let text = self.call(&prompt, cancel).await?;

        let Some(schema) = &request.response_schema else {
            return Ok(OracleResponse::Text(text.trim().to_string()));
        };

        let violation = match schema.parse(&text) {
            Ok(fields) => return Ok(OracleResponse::Fields(fields)),
            Err(e) => e,
        };
        log::warn!(
            "Oracle '{}' response rejected ({}), retrying with correction",
            self.oracle.name(),
            violation
        );

        let corrective = OraclePrompt {
            user: format!(
                "{}\n\nYour previous reply was rejected: {}\nPrevious reply:\n{}\n\nReply again with only the JSON object described above.",
                prompt.user,
                violation,
                text.trim()
            ),
            ..prompt
        };
        let retry_text = self.call(&corrective, cancel).await?;
        schema.parse(&retry_text).map(OracleResponse::Fields)
    }

    async fn call(&self, prompt: &OraclePrompt, cancel: &CancelToken) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(CitypulseError::StageTimeout(
                "oracle call cancelled before start".to_string(),
            ));
        }

        let start = std::time::Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(CitypulseError::StageTimeout(format!(
                    "oracle '{}' call cancelled after {:?}",
                    self.oracle.name(),
                    start.elapsed()
                )));
            }
            outcome = tokio::time::timeout(self.timeout, self.oracle.generate(prompt)) => outcome,
        };

        match outcome {
            Ok(result) => {
                log::debug!("Oracle '{}' call took {:?}", self.oracle.name(), start.elapsed());
                result
            }
            Err(_) => Err(CitypulseError::StageTimeout(format!(
                "oracle '{}' exceeded {:?}",
                self.oracle.name(),
                self.timeout
            ))),
        }
    }
}
