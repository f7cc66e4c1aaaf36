use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for CityPulse
#[derive(Error, Debug)]
pub enum CitypulseError {
    /// Graph query or mutation referenced a node that is not in the graph
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Malformed retrieval, graph or sensor request
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Oracle output failed validation after the corrective retry
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Oracle exceeded its deadline or was cancelled
    #[error("Stage timeout: {0}")]
    StageTimeout(String),

    /// Oracle transport or provider errors
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parse errors (graph definitions, corpus files)
    #[error("Parse error: {0}")]
    Parse(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// Convenient Result type using CitypulseError
pub type Result<T> = std::result::Result<T, CitypulseError>;

/// Identifier of one simulation tick.
pub type TickId = u64;

/// Pipeline stage names, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Vehicle,
    Incident,
    TrafficLight,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Vehicle => "vehicle",
            Stage::Incident => "incident",
            Stage::TrafficLight => "traffic_light",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure of one pipeline stage, tagged with the tick it aborted.
#[derive(Error, Debug)]
#[error("tick {tick} failed at {stage} stage: {source}")]
pub struct StageError {
    pub tick: TickId,
    pub stage: Stage,
    #[source]
    pub source: CitypulseError,
}

impl StageError {
    pub fn new(tick: TickId, stage: Stage, source: CitypulseError) -> Self {
        Self { tick, stage, source }
    }

    /// True when the underlying cause is an oracle deadline or cancellation.
    pub fn is_timeout(&self) -> bool {
        matches!(self.source, CitypulseError::StageTimeout(_))
    }

    pub fn is_schema_violation(&self) -> bool {
        matches!(self.source, CitypulseError::SchemaViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CitypulseError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CitypulseError = io_err.into();
        assert!(matches!(err, CitypulseError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CitypulseError = json_err.into();
        assert!(matches!(err, CitypulseError::Json(_)));
    }

    #[test]
    fn test_stage_error_display_names_tick_and_stage() {
        let err = StageError::new(
            42,
            Stage::TrafficLight,
            CitypulseError::UnknownNode("R9".to_string()),
        );
        let text = err.to_string();
        assert!(text.contains("tick 42"));
        assert!(text.contains("traffic_light"));
        assert!(text.contains("R9"));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_stage_error_classifiers() {
        let timeout = StageError::new(1, Stage::Vehicle, CitypulseError::StageTimeout("5s".into()));
        assert!(timeout.is_timeout());
        let schema = StageError::new(1, Stage::Incident, CitypulseError::SchemaViolation("x".into()));
        assert!(schema.is_schema_violation());
    }
}
