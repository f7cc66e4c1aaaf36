//! Response schemas for structured oracle output.
//!
//! A schema is a flat list of typed fields. Oracle output is free text, so
//! the JSON object is first extracted (fenced block or the outermost braces)
//! and then checked field by field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CitypulseError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    /// One of a closed set of strings, matched case-insensitively.
    Enum { values: Vec<String> },
}

impl FieldKind {
    fn describe(&self) -> String {
        match self {
            FieldKind::String => "string".to_string(),
            FieldKind::Enum { values } => format!("one of [{}]", values.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::String)
    }

    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        Self::with_kind(name, FieldKind::Enum { values })
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check one value, returning its normalized form.
    fn check(&self, value: &Value) -> std::result::Result<Value, String> {
        match &self.kind {
            FieldKind::String => match value.as_str().map(str::trim) {
                Some(s) if !s.is_empty() || !self.required => Ok(Value::String(s.to_string())),
                Some(_) => Err(format!("field '{}' must not be empty", self.name)),
                None => Err(format!("field '{}' must be a string", self.name)),
            },
            FieldKind::Enum { values } => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| format!("field '{}' must be a string", self.name))?;
                let needle = raw.trim();
                values
                    .iter()
                    .find(|v| v.eq_ignore_ascii_case(needle))
                    .map(|v| Value::String(v.clone()))
                    .ok_or_else(|| {
                        format!(
                            "field '{}' has value '{}', expected one of [{}]",
                            self.name,
                            raw,
                            values.join(", ")
                        )
                    })
            }
        }
    }
}

/// Expected shape of a structured oracle response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Prompt text telling the oracle what to return.
    pub fn instructions(&self) -> String {
        let mut out = String::from(
            "Respond with a single JSON object and nothing else. Fields:\n",
        );
        for field in &self.fields {
            out.push_str(&format!(
                "- \"{}\" ({}{})",
                field.name,
                field.kind.describe(),
                if field.required { ", required" } else { ", optional" }
            ));
            if let Some(description) = &field.description {
                out.push_str(": ");
                out.push_str(description);
            }
            out.push('\n');
        }
        out
    }

    /// Validate a parsed value. The result holds only schema fields, with enum
    /// values normalized to their canonical spelling.
    pub fn validate(&self, value: &Value) -> Result<Map<String, Value>> {
        let object = value.as_object().ok_or_else(|| {
            CitypulseError::SchemaViolation("response is not a JSON object".to_string())
        })?;

        let mut fields = Map::new();
        for spec in &self.fields {
            match object.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(CitypulseError::SchemaViolation(format!(
                            "missing required field '{}'",
                            spec.name
                        )));
                    }
                }
                Some(value) => {
                    let normalized = spec.check(value).map_err(CitypulseError::SchemaViolation)?;
                    fields.insert(spec.name.clone(), normalized);
                }
            }
        }
        Ok(fields)
    }

    /// Extract, parse and validate a JSON object from raw oracle text.
    pub fn parse(&self, text: &str) -> Result<Map<String, Value>> {
        let json = extract_json(text).ok_or_else(|| {
            CitypulseError::SchemaViolation("no JSON object found in response".to_string())
        })?;
        let value: Value = serde_json::from_str(json)
            .map_err(|e| CitypulseError::SchemaViolation(format!("invalid JSON: {}", e)))?;
        self.validate(&value)
    }
}

/// Locate a JSON object inside model output: a ```json fenced block if
/// present, otherwise the span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```") {
        let after_fence = &text[start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let open = text.find('{')?;
    let close = text.rfind('}')?;
    (close > open).then(|| &text[open..=close])
}
